#[doc(hidden)]
pub mod applier;
#[doc(hidden)]
pub mod backfill;
pub mod checkpoint;
pub mod namespace;
#[doc(hidden)]
pub mod oplog_helper;
#[doc(hidden)]
pub mod replay;
pub mod status;
mod syncer;
#[doc(hidden)]
pub mod tail;
mod time_helper;

pub use applier::{ApplyOutcome, OplogApplier};
pub use checkpoint::Progress;
pub use syncer::OplogSyncer;
pub use tail::TailStop;
