//! Where replication starts, and how far it has gone.
//!
//! Replication progress lives in memory only.  By default nothing is persisted, the resume point
//! is given by operator through `since` option.  A [CheckpointStore] can be plugged in to save
//! progress somewhere and load it back on next run.

use super::oplog_helper;
use super::time_helper;
use crate::blocking::DbClient;
use crate::{Result, SyncOptions, ID_KEY, TIMESTAMP_KEY};
use bson::{doc, Bson, Document, Timestamp};
use tracing::{info, warn};

/// Lower bound for next oplog query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResumePoint {
    /// oplogs strictly after the timestamp.
    After(Timestamp),
    /// oplogs at or after the timestamp.
    From(Timestamp),
}

impl ResumePoint {
    /// the timestamp of the bound.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            ResumePoint::After(ts) | ResumePoint::From(ts) => *ts,
        }
    }

    /// mongodb filter for `ts` field.
    pub fn to_filter(&self) -> Document {
        match self {
            ResumePoint::After(ts) => doc! {"$gt": *ts},
            ResumePoint::From(ts) => doc! {"$gte": *ts},
        }
    }
}

/// Replication progress of one run, shared by backfill and tail.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    resume: ResumePoint,
    last_seen: Option<Timestamp>,
    op_count: u64,
}

impl Progress {
    /// create a progress which resumes from `resume`.
    pub fn new(resume: ResumePoint) -> Self {
        Progress {
            resume,
            last_seen: None,
            op_count: 0,
        }
    }

    /// where next oplog query begins.
    pub fn resume_point(&self) -> ResumePoint {
        self.resume
    }

    /// timestamp of the latest consumed oplog.
    pub fn last_seen(&self) -> Option<Timestamp> {
        self.last_seen
    }

    /// how many oplogs are routed to applier.
    pub fn op_count(&self) -> u64 {
        self.op_count
    }

    /// Is the oplog with timestamp `ts` the one consumed just now.
    ///
    /// Oplog timestamps are unique, and queries resume at the last seen timestamp inclusively,
    /// so the first oplog of a re-opened cursor may be delivered again.
    pub(crate) fn is_seen(&self, ts: Timestamp) -> bool {
        self.last_seen == Some(ts)
    }

    pub(crate) fn advance(&mut self, ts: Timestamp) {
        self.resume = ResumePoint::From(ts);
        self.last_seen = Some(ts);
    }

    pub(crate) fn next_op(&mut self) -> u64 {
        self.op_count += 1;
        self.op_count
    }
}

/// Saves replication progress across runs.
pub trait CheckpointStore {
    /// load saved timestamp, None if nothing is saved.
    fn load(&self) -> Result<Option<Timestamp>>;

    /// save timestamp `ts`, which is consumed already.
    fn save(&self, ts: Timestamp) -> Result<()>;
}

/// A store which saves nothing, so every run starts from `since` option.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCheckpointStore;

impl CheckpointStore for NoopCheckpointStore {
    fn load(&self) -> Result<Option<Timestamp>> {
        Ok(None)
    }

    fn save(&self, _ts: Timestamp) -> Result<()> {
        Ok(())
    }
}

const CHECKPOINT_ID: &str = "oplog_sync";

/// A store which saves the checkpoint as one record in a mongodb collection.
///
/// The record looks like `{ _id: "oplog_sync", ts: Timestamp }`.
pub struct MongoCheckpointStore<'a> {
    client: &'a dyn DbClient,
    db: String,
    coll: String,
}

impl<'a> MongoCheckpointStore<'a> {
    /// create a store in collection `coll` of database `db`.
    pub fn new(client: &'a dyn DbClient, db: &str, coll: &str) -> Self {
        MongoCheckpointStore {
            client,
            db: db.to_string(),
            coll: coll.to_string(),
        }
    }
}

impl CheckpointStore for MongoCheckpointStore<'_> {
    fn load(&self) -> Result<Option<Timestamp>> {
        let rec = self
            .client
            .find_one(&self.db, &self.coll, doc! {ID_KEY: CHECKPOINT_ID})?;
        match rec {
            Some(d) => Ok(Some(d.get_timestamp(TIMESTAMP_KEY)?)),
            None => Ok(None),
        }
    }

    fn save(&self, ts: Timestamp) -> Result<()> {
        self.client.replace_one(
            &self.db,
            &self.coll,
            Bson::String(CHECKPOINT_ID.to_string()),
            doc! {ID_KEY: CHECKPOINT_ID, TIMESTAMP_KEY: ts},
        )
    }
}

/// Where a run starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartPlan {
    /// the newest oplog on source when the run starts.
    pub head: Timestamp,
    /// replay history in `(since, head]` before tailing, None means no backfill.
    pub backfill_since: Option<Timestamp>,
}

impl StartPlan {
    /// Resume point of tail runner, if backfill consumes nothing.
    pub fn initial_resume(&self) -> ResumePoint {
        ResumePoint::After(self.head)
    }
}

/// Determine the starting point of replication.
pub struct CheckpointResolver<'a> {
    source: &'a dyn DbClient,
    options: &'a SyncOptions,
}

impl<'a> CheckpointResolver<'a> {
    /// create a new resolver reading oplog from `source`.
    pub fn new(source: &'a dyn DbClient, options: &'a SyncOptions) -> Self {
        CheckpointResolver { source, options }
    }

    /// Read oplog head and decide whether history needs to be replayed.
    ///
    /// An explicit `since` option wins over the value loaded from `store`.  It fails when the oplog
    /// head can't be read.
    pub fn resolve(&self, store: &dyn CheckpointStore) -> Result<StartPlan> {
        let head = oplog_helper::get_latest_ts(self.source)?;
        let head_time = time_helper::to_datetime(&head);

        let backfill_since = if self.options.get_since() > 0 {
            Some(Timestamp {
                time: self.options.get_since(),
                increment: self.options.get_ordinal(),
            })
        } else {
            let loaded = store.load()?;
            if let Some(ts) = loaded {
                info!(checkpoint = %time_helper::to_datetime(&ts), "Loaded saved checkpoint.");
            }
            loaded
        };

        match backfill_since {
            Some(since) => {
                let since_time = time_helper::to_datetime(&since);
                info!(%since_time, %head_time, "Checkpoint resolved, replay history then tail.");
                self.warn_if_history_lost(since);
            }
            None => info!(%head_time, "Checkpoint resolved, tail oplogs after head."),
        }
        Ok(StartPlan {
            head,
            backfill_since,
        })
    }

    fn warn_if_history_lost(&self, since: Timestamp) {
        match oplog_helper::get_earliest_ts(self.source) {
            Ok(earliest) if (earliest.time, earliest.increment) > (since.time, since.increment) => {
                let earliest_time = time_helper::to_datetime(&earliest);
                warn!(%earliest_time, "Oplogs before earliest oplog are gone, some history can't be replayed.");
            }
            Ok(_) => {}
            Err(e) => warn!(?e, "Can't read earliest oplog."),
        }
    }
}
