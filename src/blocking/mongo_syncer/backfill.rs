//! Replay history between a checkpoint and the oplog head observed at start.

use super::checkpoint::Progress;
use super::oplog_helper;
use super::replay::Replayer;
use super::time_helper;
use crate::blocking::DbClient;
use crate::{Result, OPLOG_COLL, OPLOG_DB};
use bson::Timestamp;
use tracing::{error, info};

/// Bounded replay of oplogs in `(since, head]`.
pub struct BackfillRunner<'a> {
    source: &'a dyn DbClient,
    replayer: &'a Replayer<'a>,
}

impl<'a> BackfillRunner<'a> {
    /// create a new runner.
    pub fn new(source: &'a dyn DbClient, replayer: &'a Replayer<'a>) -> Self {
        BackfillRunner { source, replayer }
    }

    /// Replay oplogs in `(since, head]`, `progress` is advanced for every consumed oplog.
    ///
    /// When the cursor can't be opened or breaks, backfill stops and returns Ok, tail runner
    /// continues from `progress`.  It returns error only when applying an oplog fails.
    pub fn run(&self, since: Timestamp, head: Timestamp, progress: &mut Progress) -> Result<()> {
        let start_time = time_helper::to_datetime(&since);
        let end_time = time_helper::to_datetime(&head);
        info!(%start_time, %end_time, "Backfill: begin to replay oplogs.");

        let query = oplog_helper::backfill_query(since, head, self.replayer.filter().scope_filter());
        let cursor = match self.source.open_cursor(
            OPLOG_DB,
            OPLOG_COLL,
            query,
            oplog_helper::oplog_cursor_options(),
        ) {
            Ok(cursor) => cursor,
            Err(e) => {
                error!(?e, "Backfill: open oplog cursor failed, skip to tail.");
                return Ok(());
            }
        };

        let begin_count = progress.op_count();
        for doc in cursor {
            match doc {
                Ok(doc) => self.replayer.consume(doc, progress)?,
                Err(e) => {
                    error!(?e, "Backfill: oplog cursor broken, skip to tail.");
                    break;
                }
            }
        }

        info!(
            applied = progress.op_count() - begin_count,
            resume = ?progress.resume_point(),
            "Backfill: replay oplogs complete."
        );
        Ok(())
    }
}
