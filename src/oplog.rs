//! Most oplog information comes from here:
//! https://github.com/mongodb/mongo/blob/master/src/mongo/db/repl/oplog_entry.idl
//! https://github.com/mongodb/mongo/blob/master/src/mongo/db/repl/optime_and_wall_time_base.idl
//!
//! Useful fields:
//! ts: The time when the oplog entry was created. (Timestamp)
//! h: The operation id, only exists on old server versions. (i64)
//! v: Version (i32)
//! op: The operation type. (enum OpKind)
//! ns: The namespace on which to apply the operation. (String)
//! o: The operation applied. (Document)
//! o2: Additional information about the operation applied, for update it's the selector. (Document)
//!
//! For `op` field, the definition of OpKind:
//! "c": Command
//! "i": Insert
//! "u": Update
//! "d": Delete
//! "n": Noop

use crate::{Result, SyncError, ID_KEY};
use bson::{doc, Bson, Document, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One decoded oplog entry.
///
/// Only the fields needed to replay an operation are kept, everything else (collection uuid,
/// session information, wall clock...) is dropped when decoding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OplogEntry {
    /// The time when the oplog entry was created.
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
    /// Operation id.
    #[serde(rename = "h", default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<i64>,
    /// Oplog format version.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    /// The operation type.
    #[serde(rename = "op")]
    pub kind: OpKind,
    /// The namespace on which to apply the operation.
    #[serde(rename = "ns")]
    pub namespace: String,
    /// The operation applied.
    #[serde(rename = "o", default)]
    pub object: Document,
    /// Selector of the target document, exists for update.
    #[serde(rename = "o2", default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Document>,
}

/// The type of an operation in the oplog.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// represent by "i"
    #[serde(rename = "i")]
    Insert,
    /// represent by "u"
    #[serde(rename = "u")]
    Update,
    /// represent by "d"
    #[serde(rename = "d")]
    Delete,
    /// represent by "c"
    #[serde(rename = "c")]
    Command,
    /// represent by "n", which is useless.
    #[serde(rename = "n")]
    Noop,
}

impl OpKind {
    /// the short name used in oplog.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "i",
            OpKind::Update => "u",
            OpKind::Delete => "d",
            OpKind::Command => "c",
            OpKind::Noop => "n",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OplogEntry {
    /// Decode an oplog entry from raw oplog document.
    pub fn from_doc(doc: Document) -> Result<Self> {
        Ok(bson::from_document(doc)?)
    }

    /// Is it a noop oplog.
    pub fn is_noop(&self) -> bool {
        self.kind == OpKind::Noop
    }

    /// Split namespace into database name and collection name.
    ///
    /// Collection is the remainder after the first `.`, so it may contain `.` itself.
    pub fn split_namespace(&self) -> Option<(&str, &str)> {
        self.namespace.split_once('.')
    }

    /// Get the identifier of the target document from selector.
    pub fn target_id(&self) -> Result<&Bson> {
        self.query
            .as_ref()
            .and_then(|q| q.get(ID_KEY))
            .ok_or_else(|| {
                SyncError::InvalidOplog(format!(
                    "{} oplog on {:?} doesn't contain `o2._id`",
                    self.kind, self.namespace
                ))
            })
    }

    /// Return a new entry which is the same as `self` except namespace.
    pub fn with_namespace(&self, namespace: String) -> Self {
        OplogEntry {
            namespace,
            ..self.clone()
        }
    }

    /// Build the single operation document which is submitted by `applyOps` command.
    pub fn to_apply_doc(&self) -> Document {
        let mut op = doc! {
            "ts": self.timestamp,
        };
        if let Some(h) = self.history_id {
            op.insert("h", h);
        }
        if let Some(v) = self.version {
            op.insert("v", v);
        }
        op.insert("op", self.kind.as_str());
        op.insert("ns", self.namespace.as_str());
        op.insert("o", self.object.clone());
        if let Some(o2) = &self.query {
            op.insert("o2", o2.clone());
        }
        op
    }
}
