use super::client::{CursorOptions, DbClient, DocCursor};
use crate::error::{Result, SyncError};
use crate::{ConnConfig, ADMIN_DB_NAME, ID_KEY};
use bson::{doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{
    ClientOptions, Credential, FindOneOptions, FindOptions, ReadPreference, ReplaceOptions,
    SelectionCriteria, Tls, TlsOptions,
};
use mongodb::sync::{Client, Collection};
use std::time::Duration;
use tracing::info;

const MAX_POOL_SIZE: u32 = 100;
const MAX_IDLE_TIME: Duration = Duration::from_secs(60);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// A pooled connection to one mongodb cluster.
#[derive(Clone, Debug)]
pub struct Connection {
    /// used in log, like "Source" or "Destination".
    name: String,
    client: Client,
}

impl Connection {
    /// Create a new connection from given `config`, and ping the server to make sure that it's alive.
    pub fn connect(name: &str, config: &ConnConfig) -> Result<Connection> {
        let mut options = ClientOptions::parse(config.get_url())?;
        options.max_pool_size = Some(MAX_POOL_SIZE);
        options.max_idle_time = Some(MAX_IDLE_TIME);
        options.connect_timeout = Some(OPERATION_TIMEOUT);
        options.server_selection_timeout = Some(OPERATION_TIMEOUT);
        if config.is_tls() {
            options.tls = Some(Tls::Enabled(TlsOptions::default()));
        }
        if let Some(username) = config.get_username() {
            let mut credential = options.credential.take().unwrap_or_default();
            credential.username = Some(username.to_string());
            credential.password = config.get_password().map(String::from);
            options.credential = Some(credential);
        }

        let client = Client::with_options(options)?;
        client
            .database(ADMIN_DB_NAME)
            .run_command(doc! {"ping": 1}, None)?;
        info!(%name, "Mongo init done");

        Ok(Connection {
            name: name.to_string(),
            client,
        })
    }

    /// Check if we have enough permissions to read database `db_name`.
    pub fn check_permissions(&self, uri: &str, db_name: &str) -> Result<()> {
        if let Err(e) = self.client.database(db_name).list_collection_names(None) {
            return Err(SyncError::PermissionError {
                uri: uri.to_string(),
                db: db_name.to_string(),
                detail: e,
            });
        }
        Ok(())
    }

    /// Close the connection, pooled connections are released when the client is dropped.
    pub fn close(self) {
        info!(name = %self.name, "Mongo close connection");
    }

    /// get the underlying mongodb client.
    pub fn get_client(&self) -> &Client {
        &self.client
    }

    fn coll(&self, db: &str, coll: &str) -> Collection<Document> {
        self.client.database(db).collection(coll)
    }
}

/// Keep server side command failures structured, so callers can check the error code.
fn command_error(e: MongoError) -> SyncError {
    match e.kind.as_ref() {
        ErrorKind::Command(err) => SyncError::Command {
            code: err.code,
            code_name: err.code_name.clone(),
            message: err.message.clone(),
        },
        _ => SyncError::MongoError(e),
    }
}

impl DbClient for Connection {
    fn list_database_names(&self) -> Result<Vec<String>> {
        Ok(self.client.list_database_names(None, None)?)
    }

    fn list_collection_names(&self, db: &str) -> Result<Vec<String>> {
        Ok(self.client.database(db).list_collection_names(None)?)
    }

    fn find_latest(&self, db: &str, coll: &str) -> Result<Option<Document>> {
        Ok(self.coll(db, coll).find_one(
            None,
            FindOneOptions::builder()
                .sort(doc! {"$natural": -1})
                .build(),
        )?)
    }

    fn find_one(&self, db: &str, coll: &str, filter: Document) -> Result<Option<Document>> {
        Ok(self.coll(db, coll).find_one(filter, None)?)
    }

    fn count(&self, db: &str, coll: &str, filter: Document) -> Result<u64> {
        Ok(self.coll(db, coll).count_documents(filter, None)?)
    }

    fn run_admin_command(&self, db: &str, command: Document) -> Result<Document> {
        self.client
            .database(db)
            .run_command(
                command,
                SelectionCriteria::ReadPreference(ReadPreference::Primary),
            )
            .map_err(command_error)
    }

    fn open_cursor(
        &self,
        db: &str,
        coll: &str,
        query: Document,
        options: CursorOptions,
    ) -> Result<DocCursor<'_>> {
        let mut find_options = FindOptions::default();
        find_options.sort = options.sort;
        find_options.batch_size = options.batch_size;
        let cursor = self.coll(db, coll).find(query, find_options)?;
        Ok(Box::new(cursor.map(|doc| doc.map_err(SyncError::from))))
    }

    fn replace_one(&self, db: &str, coll: &str, id: Bson, doc: Document) -> Result<()> {
        self.coll(db, coll).replace_one(
            doc! {ID_KEY: id},
            doc,
            ReplaceOptions::builder().upsert(true).build(),
        )?;
        Ok(())
    }
}
