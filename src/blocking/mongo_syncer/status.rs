//! Read-only report of document counts on source and destination.

use crate::blocking::DbClient;
use crate::{Result, SyncerConfig, ID_KEY, SYSTEM_DBS};
use bson::{doc, Bson};
use comfy_table::Table;
use tracing::warn;

/// Count result of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    /// source database name.
    pub db: String,
    /// collection name.
    pub collection: String,
    /// documents on source.
    pub source: u64,
    /// documents on destination.
    pub destination: u64,
}

impl StatusRow {
    /// source count minus destination count.
    pub fn diff(&self) -> i64 {
        self.source as i64 - self.destination as i64
    }
}

/// Reported collections of one source database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStatus {
    /// source database name.
    pub db: String,
    /// collections with an ObjectId `_id`, may be empty.
    pub rows: Vec<StatusRow>,
}

/// Compare collections between source and destination.
pub struct StatusReporter<'a> {
    source: &'a dyn DbClient,
    target: &'a dyn DbClient,
    conf: &'a SyncerConfig,
}

impl<'a> StatusReporter<'a> {
    /// create a new reporter.
    pub fn new(source: &'a dyn DbClient, target: &'a dyn DbClient, conf: &'a SyncerConfig) -> Self {
        StatusReporter {
            source,
            target,
            conf,
        }
    }

    /// Databases to report, the configured source database, or all non-system databases.
    pub fn databases(&self) -> Result<Vec<String>> {
        let src_db = self.conf.get_src().get_db();
        Ok(self
            .source
            .list_database_names()?
            .into_iter()
            .filter(|db| {
                if src_db.is_empty() {
                    !SYSTEM_DBS.contains(&db.as_str())
                } else {
                    db == src_db
                }
            })
            .collect())
    }

    /// Count documents up to the newest one of each collection on both sides.
    ///
    /// Only collections whose newest document has an ObjectId `_id` are reported, counting
    /// `_id < newest` makes both sides comparable while source is still written.
    /// Every listed database is returned, even when none of its collections is reported.
    pub fn report(&self) -> Result<Vec<DbStatus>> {
        let mut report = vec![];
        for db in self.databases()? {
            let rows = self.collection_rows(&db);
            report.push(DbStatus { db, rows });
        }
        Ok(report)
    }

    fn collection_rows(&self, db: &str) -> Vec<StatusRow> {
        let dst_db = self.target_db(db);
        let colls = match self.source.list_collection_names(db) {
            Ok(colls) => colls,
            Err(e) => {
                warn!(%db, ?e, "List collections failed.");
                return vec![];
            }
        };

        let mut rows = vec![];
        for coll in colls {
            let last_id = match self.source.find_latest(db, &coll) {
                Ok(Some(last)) => match last.get(ID_KEY) {
                    Some(Bson::ObjectId(id)) => *id,
                    _ => continue,
                },
                Ok(None) => continue,
                Err(e) => {
                    warn!(%db, %coll, ?e, "Read last record failed.");
                    continue;
                }
            };

            let filter = doc! {ID_KEY: {"$lt": last_id}};
            let counts = self
                .source
                .count(db, &coll, filter.clone())
                .and_then(|source| {
                    self.target
                        .count(dst_db, &coll, filter)
                        .map(|destination| (source, destination))
                });
            match counts {
                Ok((source, destination)) => rows.push(StatusRow {
                    db: db.to_string(),
                    collection: coll,
                    source,
                    destination,
                }),
                Err(e) => warn!(%db, %coll, ?e, "Count records failed."),
            }
        }
        rows
    }

    fn target_db<'b>(&'b self, src_db: &'b str) -> &'b str {
        let dst_db = self.conf.get_dst().get_db();
        if self.conf.get_src().get_db().is_empty() || dst_db.is_empty() {
            src_db
        } else {
            dst_db
        }
    }
}

/// Render `report` as a text table, one header row per database followed by its collections.
pub fn render_table(report: &[DbStatus]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["DB", "Collection", "Source", "Destination", "Diff"]);
    for status in report {
        table.add_row(vec![status.db.as_str(), "", "", "", ""]);
        for row in status.rows.iter() {
            table.add_row(vec![
                String::new(),
                row.collection.clone(),
                row.source.to_string(),
                row.destination.to_string(),
                row.diff().to_string(),
            ]);
        }
    }
    format!("{}\n", table)
}
