/// provide oplog sync blocking apis.
mod client;
mod connection;
#[doc(hidden)]
pub mod mongo_syncer;
mod shutdown;

pub use client::{CursorOptions, DbClient, DocCursor};
pub use connection::Connection;
pub use shutdown::{Shutdown, ShutdownSignal};
