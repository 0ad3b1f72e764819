//! Provide structured command type oplog definition.

use bson::Document;
use tracing::warn;

use crate::oplog::{OpKind, OplogEntry};
use crate::{Result, SyncError};

/// collection namespace.
#[derive(Debug, PartialEq)]
pub struct CollNs<'a> {
    /// database name.
    db_name: &'a str,
    /// collection name.
    coll_name: &'a str,
}

impl<'a> CollNs<'a> {
    /// construct a namespace from `db_name` and `coll_name`.
    pub fn new(db_name: &'a str, coll_name: &'a str) -> Self {
        CollNs { db_name, coll_name }
    }

    /// parse a full namespace like "db.coll".
    pub fn parse(ns: &'a str) -> Option<Self> {
        ns.split_once('.')
            .map(|(db_name, coll_name)| CollNs::new(db_name, coll_name))
    }

    /// database name.
    pub fn db_name(&self) -> &'a str {
        self.db_name
    }

    /// collection name.
    pub fn coll_name(&self) -> &'a str {
        self.coll_name
    }
}

/// Structured command type oplog definition.
///
/// Basically, use [CmdOplog::from_entry] to parse a command oplog, it's used to describe what a
/// command does, and to find out which parts of the command refer to a database by name.
#[derive(Debug, PartialEq)]
pub enum CmdOplog<'a> {
    /// rename collection command.
    RenameCollection {
        /// rename namespace from.
        from: CollNs<'a>,
        /// rename namespace to.
        to: CollNs<'a>,
    },
    /// drop collection command.
    DropCollection(CollNs<'a>),
    /// create collection command.
    CreateCollection(CollNs<'a>),
    /// drop database command.
    DropDatabase(&'a str),
    /// drop indexes command.
    DropIndexes {
        /// relative namespace to drop index.
        ns: CollNs<'a>,
        /// index name.
        name: &'a str,
    },
    /// create indexes command.
    CreateIndexes {
        /// relative namespace to create index.
        ns: CollNs<'a>,
        /// index name.
        name: &'a str,
    },
    /// any other command, keep the command name only.
    Other(&'a str),
}

impl<'a> CmdOplog<'a> {
    /// Parse command oplog `entry` to create the item.
    ///
    /// It returns None when `entry` is not a command oplog, or the command is malformed.
    ///
    /// # Example
    /// ```
    /// use oplog_sync::cmd_oplog::{CmdOplog, CollNs};
    /// use oplog_sync::OplogEntry;
    /// use bson::{doc, Timestamp};
    /// let entry = OplogEntry::from_doc(doc! {
    ///     "ts": Timestamp { time: 1, increment: 0 },
    ///     "op": "c",
    ///     "ns": "a.$cmd",
    ///     "o": {"renameCollection": "a.b", "to": "a.c"},
    /// }).unwrap();
    /// assert_eq!(
    ///     CmdOplog::from_entry(&entry),
    ///     Some(CmdOplog::RenameCollection {
    ///         from: CollNs::new("a", "b"),
    ///         to: CollNs::new("a", "c")
    ///     })
    /// );
    /// ```
    pub fn from_entry(entry: &'a OplogEntry) -> Option<Self> {
        if entry.kind != OpKind::Command {
            return None;
        }
        let (db, _) = entry.split_namespace()?;
        let obj = &entry.object;
        let name = obj.keys().next()?.as_str();

        let parsed = match name {
            // obj structure:
            // {"renameCollection": "ns", "to": "ns"}
            "renameCollection" => {
                let from = obj.get_str("renameCollection").ok().and_then(CollNs::parse);
                let to = obj.get_str("to").ok().and_then(CollNs::parse);
                from.zip(to)
                    .map(|(from, to)| CmdOplog::RenameCollection { from, to })
            }
            // { "drop": "coll" }
            "drop" => obj
                .get_str("drop")
                .ok()
                .map(|coll| CmdOplog::DropCollection(CollNs::new(db, coll))),
            // { "create": "coll" }
            "create" => obj
                .get_str("create")
                .ok()
                .map(|coll| CmdOplog::CreateCollection(CollNs::new(db, coll))),
            // { "dropDatabase": 1 }
            "dropDatabase" => Some(CmdOplog::DropDatabase(db)),
            // { "createIndexes": "coll", "key": {"x": 1}, "name": "index_name" }
            "createIndexes" => obj
                .get_str("createIndexes")
                .ok()
                .zip(obj.get_str("name").ok())
                .map(|(coll, name)| CmdOplog::CreateIndexes {
                    ns: CollNs::new(db, coll),
                    name,
                }),
            // { "dropIndexes": "coll", "index": "index_name"}
            "dropIndexes" => obj
                .get_str("dropIndexes")
                .ok()
                .zip(obj.get_str("index").ok())
                .map(|(coll, name)| CmdOplog::DropIndexes {
                    ns: CollNs::new(db, coll),
                    name,
                }),
            other => Some(CmdOplog::Other(other)),
        };

        if parsed.is_none() {
            warn!(?obj, "Get a command oplog which is malformed.");
        }
        parsed
    }
}

/// Rewrite database references inside the command object of `entry` from `src_db` to `dst_db`.
///
/// Only `renameCollection` carries full namespaces in its body, other commands name the collection
/// only and rely on the oplog namespace which is rewritten by namespace filter.
pub fn remap_command_obj(entry: &OplogEntry, src_db: &str, dst_db: &str) -> Result<Document> {
    let mut obj = entry.object.clone();
    if src_db == dst_db {
        return Ok(obj);
    }

    if let Some(CmdOplog::RenameCollection { from, to }) = CmdOplog::from_entry(entry) {
        for (key, ns) in [("renameCollection", from), ("to", to)] {
            if ns.db_name() == src_db {
                obj.insert(key, format!("{}.{}", dst_db, ns.coll_name()));
            }
        }
    } else if entry.kind == OpKind::Command && obj.contains_key("renameCollection") {
        return Err(SyncError::InvalidOplog(format!(
            "renameCollection oplog with invalid namespace: {:?}",
            obj
        )));
    }
    Ok(obj)
}
