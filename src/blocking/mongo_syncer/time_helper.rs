use chrono::{Local, TimeZone};
use mongodb::bson::Timestamp;

/// Format oplog timestamp as local time, only used for log.
pub fn to_datetime(ts: &Timestamp) -> String {
    match Local.timestamp_opt(ts.time as i64, 0).single() {
        Some(t) => format!("{} (#{})", t.to_rfc3339(), ts.increment),
        None => format!("{}:{}", ts.time, ts.increment),
    }
}
