use crate::Result;
use bson::{Bson, Document};

/// Lazy cursor over documents, every `next` may block on network.
pub type DocCursor<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// Options used to open a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorOptions {
    /// sort specification, None means natural order.
    pub sort: Option<Document>,
    /// how many documents to fetch per round trip.
    pub batch_size: Option<u32>,
}

/// What the sync engine needs from one mongodb cluster.
///
/// [Connection](crate::Connection) implements it with a pooled mongodb client.  All operations
/// are blocking.
pub trait DbClient {
    /// list all database names.
    fn list_database_names(&self) -> Result<Vec<String>>;

    /// list all collection names in database `db`.
    fn list_collection_names(&self, db: &str) -> Result<Vec<String>>;

    /// find the newest document in natural order.
    fn find_latest(&self, db: &str, coll: &str) -> Result<Option<Document>>;

    /// find one document which matches `filter`.
    fn find_one(&self, db: &str, coll: &str, filter: Document) -> Result<Option<Document>>;

    /// count documents which match `filter`.
    fn count(&self, db: &str, coll: &str, filter: Document) -> Result<u64>;

    /// run `command` against database `db` on primary.
    ///
    /// When the server executes the command and reports a failure, it returns
    /// [SyncError::Command](crate::SyncError::Command).
    fn run_admin_command(&self, db: &str, command: Document) -> Result<Document>;

    /// open a cursor over documents which match `query`.
    fn open_cursor(
        &self,
        db: &str,
        coll: &str,
        query: Document,
        options: CursorOptions,
    ) -> Result<DocCursor<'_>>;

    /// replace the whole document identified by `id` with `doc`, insert it if not exists.
    fn replace_one(&self, db: &str, coll: &str, id: Bson, doc: Document) -> Result<()>;
}
