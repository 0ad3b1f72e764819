use super::applier::OplogApplier;
use super::checkpoint::Progress;
use super::namespace::NamespaceFilter;
use crate::oplog::OplogEntry;
use crate::Result;
use bson::Document;
use tracing::{debug, warn};

/// Per oplog handling shared by backfill and tail.
///
/// Oplogs are handled strictly one by one in the order the cursor returns them.
pub struct Replayer<'a> {
    filter: &'a NamespaceFilter,
    applier: &'a OplogApplier<'a>,
}

impl<'a> Replayer<'a> {
    /// create a new replayer.
    pub fn new(filter: &'a NamespaceFilter, applier: &'a OplogApplier<'a>) -> Self {
        Replayer { filter, applier }
    }

    /// namespace filter in use.
    pub fn filter(&self) -> &NamespaceFilter {
        self.filter
    }

    /// Consume one raw oplog `doc`.
    ///
    /// Oplogs which can't be decoded are skipped.  It returns error only when applying fails.
    pub fn consume(&self, doc: Document, progress: &mut Progress) -> Result<()> {
        let entry = match OplogEntry::from_doc(doc) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(?e, "Decode oplog failed, skip it.");
                return Ok(());
            }
        };

        if progress.is_seen(entry.timestamp) {
            debug!(ts = ?entry.timestamp, "Oplog is consumed already.");
            return Ok(());
        }
        progress.advance(entry.timestamp);

        if entry.is_noop() {
            return Ok(());
        }
        let routed = match self.filter.route(&entry)? {
            Some(routed) => routed,
            None => {
                debug!(ns = %entry.namespace, "Oplog is out of scope.");
                return Ok(());
            }
        };

        let op_count = progress.next_op();
        self.applier
            .apply(op_count, self.filter.src_db(), &routed)?;
        Ok(())
    }
}
