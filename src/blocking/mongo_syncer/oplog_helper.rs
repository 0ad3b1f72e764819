use super::checkpoint::ResumePoint;
use crate::blocking::{CursorOptions, DbClient};
use crate::{Result, SyncError, NAMESPACE_KEY, OPLOG_COLL, OPLOG_DB, TIMESTAMP_KEY};
use bson::{doc, Document, Timestamp};

/// How many oplogs are fetched per round trip.
const OPLOG_BATCH_SIZE: u32 = 1000;

/// Get timestamp of the newest oplog on `client`, which is the oplog head.
pub fn get_latest_ts(client: &dyn DbClient) -> Result<Timestamp> {
    client
        .find_latest(OPLOG_DB, OPLOG_COLL)?
        .map(|d| d.get_timestamp(TIMESTAMP_KEY).map_err(SyncError::from))
        .unwrap_or_else(|| Err(SyncError::EmptyOplog))
}

/// Get timestamp of the oldest oplog still kept on `client`.
pub fn get_earliest_ts(client: &dyn DbClient) -> Result<Timestamp> {
    let mut cursor = client.open_cursor(
        OPLOG_DB,
        OPLOG_COLL,
        doc! {},
        CursorOptions {
            sort: Some(doc! {"$natural": 1}),
            batch_size: Some(1),
        },
    )?;
    match cursor.next() {
        Some(d) => Ok(d?.get_timestamp(TIMESTAMP_KEY)?),
        None => Err(SyncError::EmptyOplog),
    }
}

/// Query oplogs in `(since, head]` in given namespace `scope`.
pub fn backfill_query(since: Timestamp, head: Timestamp, scope: Document) -> Document {
    doc! {
        TIMESTAMP_KEY: {"$gt": since, "$lte": head},
        NAMESPACE_KEY: scope,
    }
}

/// Query oplogs from `resume` point in given namespace `scope`, without upper bound.
pub fn tail_query(resume: &ResumePoint, scope: Document) -> Document {
    doc! {
        TIMESTAMP_KEY: resume.to_filter(),
        NAMESPACE_KEY: scope,
    }
}

/// Oplogs are read in natural order, which is the commit order.
pub fn oplog_cursor_options() -> CursorOptions {
    CursorOptions {
        sort: None,
        batch_size: Some(OPLOG_BATCH_SIZE),
    }
}
