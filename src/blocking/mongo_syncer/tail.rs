//! Keep polling new oplogs after backfill.
//!
//! The runner is a small state machine:
//!
//! ```text
//! Polling --open cursor--> Draining --cursor exhausted--> Idle --sleep--> Polling --> ...
//!    |                         |                            |
//!    +------------ shutdown is checked before every step ---+
//! ```
//!
//! It has no terminal state under normal operation.  It stops when shutdown is requested, or when
//! applying an oplog fails.

use super::checkpoint::{CheckpointStore, Progress};
use super::oplog_helper;
use super::replay::Replayer;
use crate::blocking::{DbClient, DocCursor, ShutdownSignal};
use crate::{Result, OPLOG_COLL, OPLOG_DB};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why tail runner stops without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStop {
    /// Shutdown is requested.
    Cancelled,
}

enum TailState<'c> {
    Polling,
    Draining(DocCursor<'c>),
    Idle,
}

/// Unbounded polling of source oplogs.
pub struct TailRunner<'a> {
    source: &'a dyn DbClient,
    replayer: &'a Replayer<'a>,
    store: &'a dyn CheckpointStore,
    poll_delay: Duration,
}

impl<'a> TailRunner<'a> {
    /// create a new runner, which waits `poll_delay` after all available oplogs are drained.
    pub fn new(
        source: &'a dyn DbClient,
        replayer: &'a Replayer<'a>,
        store: &'a dyn CheckpointStore,
        poll_delay: Duration,
    ) -> Self {
        TailRunner {
            source,
            replayer,
            store,
            poll_delay,
        }
    }

    /// Tail oplogs from `progress` until `signal` fires or applying fails.
    pub fn run(&self, progress: &mut Progress, signal: &ShutdownSignal) -> Result<TailStop> {
        info!(resume = ?progress.resume_point(), "Tailing...");
        let mut state = TailState::Polling;
        loop {
            if signal.is_triggered() {
                return Ok(Self::cancelled(progress));
            }

            state = match state {
                TailState::Polling => {
                    let query = oplog_helper::tail_query(
                        &progress.resume_point(),
                        self.replayer.filter().scope_filter(),
                    );
                    match self.source.open_cursor(
                        OPLOG_DB,
                        OPLOG_COLL,
                        query,
                        oplog_helper::oplog_cursor_options(),
                    ) {
                        Ok(cursor) => TailState::Draining(cursor),
                        Err(e) => {
                            warn!(?e, "Tail: open oplog cursor failed, retry later.");
                            TailState::Idle
                        }
                    }
                }
                TailState::Draining(mut cursor) => match cursor.next() {
                    Some(Ok(doc)) => {
                        self.replayer.consume(doc, progress)?;
                        TailState::Draining(cursor)
                    }
                    Some(Err(e)) => {
                        warn!(?e, "Tail: oplog cursor broken, reopen later.");
                        drop(cursor);
                        self.save_checkpoint(progress);
                        TailState::Idle
                    }
                    None => {
                        debug!("Tail: no more oplogs for now, close cursor.");
                        drop(cursor);
                        self.save_checkpoint(progress);
                        TailState::Idle
                    }
                },
                TailState::Idle => {
                    if !signal.sleep(self.poll_delay) {
                        return Ok(Self::cancelled(progress));
                    }
                    TailState::Polling
                }
            };
        }
    }

    fn cancelled(progress: &Progress) -> TailStop {
        info!(op_count = progress.op_count(), "Tail: shutdown requested, stop tailing.");
        TailStop::Cancelled
    }

    fn save_checkpoint(&self, progress: &Progress) {
        if let Some(ts) = progress.last_seen() {
            if let Err(e) = self.store.save(ts) {
                warn!(?e, "Tail: save checkpoint failed.");
            }
        }
    }
}
