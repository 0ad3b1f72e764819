//! In memory cluster used to drive the sync engine without mongodb.
//!
//! Only the queries issued by the engine are understood: `$gt`, `$gte`, `$lt`, `$lte` and
//! equality on top level fields.  Namespace scope (`ns: {$in: [...]}`) is ignored, the engine
//! filters namespaces again when handling every oplog.
#![allow(dead_code)]

use bson::oid::ObjectId;
use bson::{doc, Bson, Document, Timestamp};
use oplog_sync::{
    CheckpointStore, ConnConfig, CursorOptions, DbClient, DocCursor, Result, Shutdown,
    SyncError, SyncOptions, SyncerConfig,
};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

pub const OPLOG_DB: &str = "local";
pub const OPLOG_COLL: &str = "oplog.rs";

pub fn ts(time: u32, increment: u32) -> Timestamp {
    Timestamp { time, increment }
}

pub fn oid(n: u8) -> ObjectId {
    let mut bytes = [0; 12];
    bytes[11] = n;
    ObjectId::from_bytes(bytes)
}

pub fn insert_op(time: u32, ns: &str, id: i32) -> Document {
    doc! {"ts": ts(time, 0), "h": 0_i64, "v": 2, "op": "i", "ns": ns, "o": {"_id": id, "n": time as i64}}
}

pub fn update_op(time: u32, ns: &str, id: i32) -> Document {
    doc! {"ts": ts(time, 0), "v": 2, "op": "u", "ns": ns, "o": {"$v": 1, "$set": {"n": time as i64}}, "o2": {"_id": id}}
}

pub fn delete_op(time: u32, ns: &str, id: i32) -> Document {
    doc! {"ts": ts(time, 0), "v": 2, "op": "d", "ns": ns, "o": {"_id": id}}
}

pub fn noop_op(time: u32) -> Document {
    doc! {"ts": ts(time, 0), "op": "n", "ns": "", "o": {"msg": "periodic noop"}}
}

/// source `shop` replicated into destination `mirror`.
pub fn config(colls: &[&str]) -> SyncerConfig {
    let mut sync = SyncOptions::default();
    sync.set_poll_delay_secs(0);
    SyncerConfig::new(
        ConnConfig::new("mongodb://source", "shop")
            .with_colls(colls.iter().map(|c| c.to_string()).collect()),
        ConnConfig::new("mongodb://target", "mirror"),
        sync,
    )
}

pub fn missing_document_reply() -> Document {
    doc! {
        "ok": 0.0,
        "code": 47,
        "codeName": "NoMatchingDocument",
        "errmsg": "Expected _id field in update oplog entry",
    }
}

pub fn unauthorized_reply() -> Document {
    doc! {"ok": 0.0, "code": 13, "codeName": "Unauthorized", "errmsg": "not authorized on admin"}
}

#[derive(Default)]
pub struct FakeClient {
    databases: Vec<String>,
    oplogs: RefCell<Vec<Document>>,
    arriving: RefCell<VecDeque<Vec<Document>>>,
    collections: RefCell<BTreeMap<(String, String), Vec<Document>>>,
    apply_replies: RefCell<VecDeque<Result<Document>>>,
    applied: RefCell<Vec<Document>>,
    oplog_queries: RefCell<Vec<Document>>,
    opens: Cell<usize>,
    failing_opens: Cell<usize>,
    broken_cursor_after: Cell<Option<usize>>,
    stop_on_open: RefCell<Option<(usize, Shutdown)>>,
}

impl FakeClient {
    pub fn new(databases: &[&str]) -> Self {
        FakeClient {
            databases: databases.iter().map(|db| db.to_string()).collect(),
            ..FakeClient::default()
        }
    }

    pub fn with_oplogs(self, oplogs: Vec<Document>) -> Self {
        self.oplogs.borrow_mut().extend(oplogs);
        self
    }

    /// oplogs written on source right before next oplog query.
    pub fn arriving(self, oplogs: Vec<Document>) -> Self {
        self.arriving.borrow_mut().push_back(oplogs);
        self
    }

    pub fn with_doc(self, db: &str, coll: &str, doc: Document) -> Self {
        self.collections
            .borrow_mut()
            .entry((db.to_string(), coll.to_string()))
            .or_default()
            .push(doc);
        self
    }

    /// reply of next `applyOps`, it's `{ok: 1}` when nothing is scripted.
    pub fn reply_apply(self, reply: Result<Document>) -> Self {
        self.apply_replies.borrow_mut().push_back(reply);
        self
    }

    /// next `n` oplog queries fail.
    pub fn failing_opens(self, n: usize) -> Self {
        self.failing_opens.set(n);
        self
    }

    /// next oplog cursor breaks after `n` documents.
    pub fn broken_cursor_after(self, n: usize) -> Self {
        self.broken_cursor_after.set(Some(n));
        self
    }

    /// trigger `shutdown` when the `n`th oplog query is issued.
    pub fn stop_on_open(self, n: usize, shutdown: Shutdown) -> Self {
        *self.stop_on_open.borrow_mut() = Some((n, shutdown));
        self
    }

    /// operations submitted through `applyOps`.
    pub fn applied(&self) -> Vec<Document> {
        self.applied.borrow().clone()
    }

    /// `(op, ns, _id)` of operations submitted through `applyOps`.
    pub fn applied_summary(&self) -> Vec<(String, String, Bson)> {
        self.applied
            .borrow()
            .iter()
            .map(|op| {
                (
                    op.get_str("op").unwrap_or_default().to_string(),
                    op.get_str("ns").unwrap_or_default().to_string(),
                    op.get_document("o")
                        .ok()
                        .and_then(|o| o.get("_id").cloned())
                        .unwrap_or(Bson::Null),
                )
            })
            .collect()
    }

    /// queries of oplog cursors, probing queries without `ts` are not recorded.
    pub fn oplog_queries(&self) -> Vec<Document> {
        self.oplog_queries.borrow().clone()
    }

    pub fn docs(&self, db: &str, coll: &str) -> Vec<Document> {
        self.collections
            .borrow()
            .get(&(db.to_string(), coll.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn read(&self, db: &str, coll: &str) -> Vec<Document> {
        if db == OPLOG_DB && coll == OPLOG_COLL {
            self.oplogs.borrow().clone()
        } else {
            self.docs(db, coll)
        }
    }

    fn upsert(&self, db: &str, coll: &str, doc: Document) {
        let mut collections = self.collections.borrow_mut();
        let docs = collections
            .entry((db.to_string(), coll.to_string()))
            .or_default();
        match docs.iter_mut().find(|d| d.get("_id") == doc.get("_id")) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    fn execute(&self, op: &Document) {
        let (db, coll) = match op.get_str("ns").ok().and_then(|ns| ns.split_once('.')) {
            Some(parts) => parts,
            None => return,
        };
        let object = op.get_document("o").cloned().unwrap_or_default();
        match op.get_str("op") {
            Ok("i") => self.upsert(db, coll, object),
            Ok("d") => {
                if let Some(docs) = self
                    .collections
                    .borrow_mut()
                    .get_mut(&(db.to_string(), coll.to_string()))
                {
                    docs.retain(|d| d.get("_id") != object.get("_id"));
                }
            }
            _ => {}
        }
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::Timestamp(a), Bson::Timestamp(b)) => {
            Some((a.time, a.increment).cmp(&(b.time, b.increment)))
        }
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
        (Bson::Int32(a), Bson::Int32(b)) => Some(a.cmp(b)),
        (Bson::Int64(a), Bson::Int64(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, cond)| {
        let value = doc.get(key);
        match cond {
            Bson::Document(ops) if ops.keys().all(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, bound)| {
                    let ord = value.and_then(|v| compare(v, bound));
                    match op.as_str() {
                        "$gt" => ord == Some(Ordering::Greater),
                        "$gte" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                        "$lt" => ord == Some(Ordering::Less),
                        "$lte" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                        _ => true,
                    }
                })
            }
            expected => value == Some(expected),
        }
    })
}

impl DbClient for FakeClient {
    fn list_database_names(&self) -> Result<Vec<String>> {
        Ok(self.databases.clone())
    }

    fn list_collection_names(&self, db: &str) -> Result<Vec<String>> {
        Ok(self
            .collections
            .borrow()
            .keys()
            .filter(|(d, _)| d == db)
            .map(|(_, coll)| coll.clone())
            .collect())
    }

    fn find_latest(&self, db: &str, coll: &str) -> Result<Option<Document>> {
        Ok(self.read(db, coll).pop())
    }

    fn find_one(&self, db: &str, coll: &str, filter: Document) -> Result<Option<Document>> {
        Ok(self
            .read(db, coll)
            .into_iter()
            .find(|d| matches(d, &filter)))
    }

    fn count(&self, db: &str, coll: &str, filter: Document) -> Result<u64> {
        Ok(self
            .read(db, coll)
            .iter()
            .filter(|d| matches(d, &filter))
            .count() as u64)
    }

    fn run_admin_command(&self, _db: &str, command: Document) -> Result<Document> {
        let ops = command.get_array("applyOps")?.clone();
        self.applied.borrow_mut().extend(ops.iter().filter_map(|op| op.as_document().cloned()));

        let reply = self
            .apply_replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(doc! {"applied": 1, "ok": 1.0}));
        if let Ok(reply) = &reply {
            if matches!(reply.get_f64("ok"), Ok(ok) if ok == 1.0) {
                ops.iter().filter_map(Bson::as_document).for_each(|op| self.execute(op));
            }
        }
        reply
    }

    fn open_cursor(
        &self,
        db: &str,
        coll: &str,
        query: Document,
        options: CursorOptions,
    ) -> Result<DocCursor<'_>> {
        let is_oplog_query = db == OPLOG_DB && coll == OPLOG_COLL && query.contains_key("ts");
        if is_oplog_query {
            self.opens.set(self.opens.get() + 1);
            self.oplog_queries.borrow_mut().push(query.clone());

            let mut stop = self.stop_on_open.borrow_mut();
            if matches!(stop.as_ref(), Some((n, _)) if *n == self.opens.get()) {
                if let Some((_, shutdown)) = stop.take() {
                    shutdown.trigger();
                }
            }

            if self.failing_opens.get() > 0 {
                self.failing_opens.set(self.failing_opens.get() - 1);
                return Err(SyncError::Command {
                    code: 6,
                    code_name: "HostUnreachable".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            if let Some(oplogs) = self.arriving.borrow_mut().pop_front() {
                self.oplogs.borrow_mut().extend(oplogs);
            }
        }

        let mut docs: Vec<Document> = self
            .read(db, coll)
            .into_iter()
            .filter(|d| matches(d, &query))
            .collect();
        if options.sort == Some(doc! {"$natural": -1}) {
            docs.reverse();
        }

        let mut results: Vec<Result<Document>> = docs.into_iter().map(Ok).collect();
        if is_oplog_query {
            if let Some(n) = self.broken_cursor_after.take() {
                results.truncate(n);
                results.push(Err(SyncError::Command {
                    code: 43,
                    code_name: "CursorNotFound".to_string(),
                    message: "cursor id not found".to_string(),
                }));
            }
        }
        Ok(Box::new(results.into_iter()))
    }

    fn replace_one(&self, db: &str, coll: &str, id: Bson, mut doc: Document) -> Result<()> {
        doc.insert("_id", id);
        self.upsert(db, coll, doc);
        Ok(())
    }
}

/// Checkpoint store which remembers every saved timestamp.
#[derive(Default)]
pub struct RecordingStore {
    pub loaded: Option<Timestamp>,
    pub saved: RefCell<Vec<Timestamp>>,
}

impl CheckpointStore for RecordingStore {
    fn load(&self) -> Result<Option<Timestamp>> {
        Ok(self.loaded)
    }

    fn save(&self, ts: Timestamp) -> Result<()> {
        self.saved.borrow_mut().push(ts);
        Ok(())
    }
}
