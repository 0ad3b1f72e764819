//! Apply one routed oplog against destination mongodb.

use crate::blocking::DbClient;
use crate::cmd_oplog::CmdOplog;
use crate::oplog::{OpKind, OplogEntry};
use crate::{MissingSourcePolicy, Result, SyncError, ADMIN_DB_NAME, ID_KEY};
use bson::{doc, Bson, Document};
use tracing::{info, warn};

/// Server error code `NoMatchingDocument`.
const NO_MATCHING_DOCUMENT: i32 = 47;
const NO_MATCHING_DOCUMENT_NAME: &str = "NoMatchingDocument";
/// Message reported by servers which don't give a structured code for a missing document.
const MISSING_DOCUMENT_MSG: &str = "Expected _id";

/// How an oplog is handled by [OplogApplier].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The operation is applied.
    Applied,
    /// Destination doesn't have the document the operation expects, which means it's already applied.
    SkippedMissingDocument,
    /// The document of an update oplog is gone on source, and policy says skip.
    SkippedMissingSource,
}

/// Check if a failed `applyOps` means that the target document is missing on destination.
///
/// Structured error code is checked first.  Only when the server gives no code, we fall back to
/// match the error message, it's a compatibility shim for such servers.
pub fn is_missing_document(code: i32, code_name: &str, message: &str) -> bool {
    if code == NO_MATCHING_DOCUMENT || code_name == NO_MATCHING_DOCUMENT_NAME {
        return true;
    }
    code == 0 && code_name.is_empty() && message.contains(MISSING_DOCUMENT_MSG)
}

fn reply_is_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(ok)) => *ok == 1.0,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        Some(Bson::Boolean(ok)) => *ok,
        _ => false,
    }
}

/// Replay oplogs on destination.
pub struct OplogApplier<'a> {
    source: &'a dyn DbClient,
    target: &'a dyn DbClient,
    on_missing_source: MissingSourcePolicy,
}

impl<'a> OplogApplier<'a> {
    /// create a new applier, `source` is used to re-read documents of update oplogs.
    pub fn new(
        source: &'a dyn DbClient,
        target: &'a dyn DbClient,
        on_missing_source: MissingSourcePolicy,
    ) -> Self {
        OplogApplier {
            source,
            target,
            on_missing_source,
        }
    }

    /// Apply `entry` which namespace is already rewritten to destination.
    ///
    /// `src_db` is the source database, it's used to read the current document for update oplog.
    /// `op_count` is only used in log.
    pub fn apply(&self, op_count: u64, src_db: &str, entry: &OplogEntry) -> Result<ApplyOutcome> {
        let outcome = match entry.kind {
            OpKind::Update => self.apply_update(src_db, entry)?,
            _ => self.apply_ops(entry)?,
        };
        info!(op_count, ns = %entry.namespace, op = %entry.kind, ?outcome, "Applied oplog");
        Ok(outcome)
    }

    /// Update oplog only contains a delta whose format depends on server version, so instead of
    /// replaying it, we read the whole document from source and replace the destination one.
    fn apply_update(&self, src_db: &str, entry: &OplogEntry) -> Result<ApplyOutcome> {
        let (dst_db, coll) = entry.split_namespace().ok_or_else(|| {
            SyncError::InvalidOplog(format!("invalid namespace {:?}", entry.namespace))
        })?;
        let id = entry.target_id()?.clone();

        let current = self
            .source
            .find_one(src_db, coll, doc! {ID_KEY: id.clone()})?;
        match current {
            Some(document) => {
                self.target.replace_one(dst_db, coll, id, document)?;
                Ok(ApplyOutcome::Applied)
            }
            None => {
                let ns = format!("{}.{}", src_db, coll);
                match self.on_missing_source {
                    MissingSourcePolicy::Abort => Err(SyncError::SourceDocMissing { ns, id }),
                    MissingSourcePolicy::Skip => {
                        warn!(%ns, %id, "Source document of update oplog is gone, skip it.");
                        Ok(ApplyOutcome::SkippedMissingSource)
                    }
                }
            }
        }
    }

    fn apply_ops(&self, entry: &OplogEntry) -> Result<ApplyOutcome> {
        if let Some(cmd) = CmdOplog::from_entry(entry) {
            info!(?cmd, ns = %entry.namespace, "Begin to apply command oplog...");
        }

        let command = doc! {"applyOps": [entry.to_apply_doc()]};
        match self.target.run_admin_command(ADMIN_DB_NAME, command) {
            Ok(reply) if reply_is_ok(&reply) => Ok(ApplyOutcome::Applied),
            Ok(reply) => {
                let code = reply.get_i32("code").unwrap_or(0);
                let code_name = reply.get_str("codeName").unwrap_or("");
                let message = reply.get_str("errmsg").unwrap_or("");
                if is_missing_document(code, code_name, message) {
                    warn!(ns = %entry.namespace, %message, "Target document is missing, skip it.");
                    Ok(ApplyOutcome::SkippedMissingDocument)
                } else {
                    Err(SyncError::ApplyOplogError(reply))
                }
            }
            Err(SyncError::Command {
                code,
                code_name,
                message,
            }) if is_missing_document(code, &code_name, &message) => {
                warn!(ns = %entry.namespace, %message, "Target document is missing, skip it.");
                Ok(ApplyOutcome::SkippedMissingDocument)
            }
            Err(e) => Err(e),
        }
    }
}
