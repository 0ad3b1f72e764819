//! Oplog sync lib, which continuously replays the oplog of one mongodb replica set against another mongodb.
//!
//! The entry point is [OplogSyncer]: it resolves where replication starts, replays history between
//! that point and the oplog head ("backfill"), then keeps polling the source oplog forever ("tail").
//! Every entry goes through a [NamespaceFilter] which picks the configured database (and collections)
//! and rewrites the namespace to the destination database, and then through an [OplogApplier].
//!
//! [StatusReporter] is a read-only helper which compares per-collection document counts between
//! source and destination.
//!
//! # OplogSyncer example:
//! ```no_run
//! use oplog_sync::{Connection, OplogSyncer, Shutdown, SyncerConfig};
//!
//! let conf: SyncerConfig = toml::from_str(r#"
//!     [src]
//!     url = "mongodb://localhost:27017"
//!     db = "shop"
//!     [dst]
//!     url = "mongodb://localhost:27018"
//!     db = "shop_copy"
//! "#).unwrap();
//! let source = Connection::connect("Source", conf.get_src()).unwrap();
//! let target = Connection::connect("Destination", conf.get_dst()).unwrap();
//! let (handle, signal) = Shutdown::new();
//! handle.trigger_on_interrupt().unwrap();
//! let syncer = OplogSyncer::new(&source, &target, &conf);
//! syncer.sync_forever(&signal).unwrap();
//! ```

#![warn(missing_docs)]

#[doc(hidden)]
pub mod blocking;
pub mod cmd_oplog;
mod config;
mod error;
pub mod oplog;

/// mongodb internal database for admin.
const ADMIN_DB_NAME: &str = "admin";
/// mongodb internal database which saves oplogs.
const OPLOG_DB: &str = "local";
/// mongodb internal collection which saves oplogs.
const OPLOG_COLL: &str = "oplog.rs";

/// oplog namespace key name.
const NAMESPACE_KEY: &str = "ns";
/// oplog timestamp key name.
const TIMESTAMP_KEY: &str = "ts";
/// document identifier key name.
const ID_KEY: &str = "_id";

/// databases which are never synced, or reported by status.
const SYSTEM_DBS: [&str; 3] = ["admin", "config", "local"];

pub use blocking::mongo_syncer::checkpoint::{
    CheckpointResolver, CheckpointStore, MongoCheckpointStore, NoopCheckpointStore, ResumePoint,
    StartPlan,
};
pub use blocking::mongo_syncer::namespace::NamespaceFilter;
pub use blocking::mongo_syncer::status::{DbStatus, StatusReporter, StatusRow};
pub use blocking::mongo_syncer::{ApplyOutcome, OplogApplier, OplogSyncer, Progress, TailStop};
pub use blocking::{Connection, CursorOptions, DbClient, DocCursor, Shutdown, ShutdownSignal};
pub use config::{ConnConfig, MissingSourcePolicy, SyncOptions, SyncerConfig};
pub use error::{Result, SyncError};
pub use oplog::{OpKind, OplogEntry};
