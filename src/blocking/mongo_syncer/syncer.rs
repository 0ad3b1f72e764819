use super::applier::OplogApplier;
use super::backfill::BackfillRunner;
use super::checkpoint::{
    CheckpointResolver, CheckpointStore, MongoCheckpointStore, NoopCheckpointStore, Progress,
};
use super::namespace::NamespaceFilter;
use super::replay::Replayer;
use super::tail::{TailRunner, TailStop};
use crate::blocking::{DbClient, ShutdownSignal};
use crate::{Result, SyncerConfig};
use tracing::{info, warn};

/// Replicate the configured source database into destination database by replaying oplogs.
///
/// A run resolves checkpoint, builds namespace scope, replays history when asked, and then tails
/// the source oplog until shutdown or an unrecoverable error.
pub struct OplogSyncer<'a> {
    source: &'a dyn DbClient,
    target: &'a dyn DbClient,
    conf: &'a SyncerConfig,
    store: Box<dyn CheckpointStore + 'a>,
}

impl<'a> OplogSyncer<'a> {
    /// Create a new syncer.
    ///
    /// When `checkpoint_collection` is configured, checkpoint is saved into that collection of
    /// destination database, otherwise nothing is saved.
    pub fn new(source: &'a dyn DbClient, target: &'a dyn DbClient, conf: &'a SyncerConfig) -> Self {
        let store: Box<dyn CheckpointStore + 'a> = match conf.get_sync().get_checkpoint_collection() {
            Some(coll) => Box::new(MongoCheckpointStore::new(
                target,
                conf.get_dst().get_db(),
                coll,
            )),
            None => Box::new(NoopCheckpointStore),
        };
        OplogSyncer {
            source,
            target,
            conf,
            store,
        }
    }

    /// Use another checkpoint store.
    pub fn with_checkpoint_store(mut self, store: Box<dyn CheckpointStore + 'a>) -> Self {
        self.store = store;
        self
    }

    /// Sync oplogs until `signal` fires, return the progress at that time.
    ///
    /// Any error is fatal for the run, operator needs to restart it.
    pub fn sync_forever(&self, signal: &ShutdownSignal) -> Result<Progress> {
        let sync_opts = self.conf.get_sync();
        let plan = CheckpointResolver::new(self.source, sync_opts).resolve(self.store.as_ref())?;
        let filter = NamespaceFilter::build(self.source, self.conf)?;
        let applier = OplogApplier::new(self.source, self.target, sync_opts.get_on_missing_source());
        let replayer = Replayer::new(&filter, &applier);

        let mut progress = Progress::new(plan.initial_resume());
        if let Some(since) = plan.backfill_since {
            if signal.is_triggered() {
                return Ok(progress);
            }
            BackfillRunner::new(self.source, &replayer).run(since, plan.head, &mut progress)?;
            if let Some(ts) = progress.last_seen() {
                if let Err(e) = self.store.save(ts) {
                    warn!(?e, "Backfill: save checkpoint failed.");
                }
            }
        }

        let tail = TailRunner::new(
            self.source,
            &replayer,
            self.store.as_ref(),
            sync_opts.get_poll_delay(),
        );
        match tail.run(&mut progress, signal)? {
            TailStop::Cancelled => {
                info!(op_count = progress.op_count(), resume = ?progress.resume_point(), "Sync stopped.")
            }
        }
        Ok(progress)
    }
}
