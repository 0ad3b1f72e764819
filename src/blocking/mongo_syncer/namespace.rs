//! Pick oplogs of the configured database (and collections), and rewrite them for destination.

use crate::blocking::DbClient;
use crate::cmd_oplog::remap_command_obj;
use crate::oplog::{OpKind, OplogEntry};
use crate::{Result, SyncError, SyncerConfig};
use bson::{doc, Bson, Document, Regex};
use tracing::info;

/// Namespace scope of one run.
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    src_db: String,
    dst_db: String,
    colls: Vec<String>,
    patterns: Vec<Regex>,
}

impl NamespaceFilter {
    /// Create a filter from configuration without checking source databases.
    pub fn new(conf: &SyncerConfig) -> Self {
        NamespaceFilter {
            src_db: conf.get_src().get_db().to_string(),
            dst_db: conf.get_dst().get_db().to_string(),
            colls: conf.get_src().get_colls().to_vec(),
            patterns: vec![],
        }
    }

    /// Create a filter and compute namespace patterns from databases which exist on `source`.
    ///
    /// Fails with [SyncError::NoDatabases] when the configured database is not found.
    pub fn build(source: &dyn DbClient, conf: &SyncerConfig) -> Result<Self> {
        let mut filter = NamespaceFilter::new(conf);
        filter.patterns = source
            .list_database_names()?
            .into_iter()
            .filter(|db| db == &filter.src_db)
            .map(|db| Regex {
                pattern: format!("^{}\\.", regex_escape(&db)),
                options: String::new(),
            })
            .collect();

        if filter.patterns.is_empty() {
            return Err(SyncError::NoDatabases);
        }
        info!(src_db = %filter.src_db, dst_db = %filter.dst_db, colls = ?filter.colls, "Namespace scope built.");
        Ok(filter)
    }

    /// source database name.
    pub fn src_db(&self) -> &str {
        &self.src_db
    }

    /// destination database name.
    pub fn dst_db(&self) -> &str {
        &self.dst_db
    }

    /// namespace patterns in scope.
    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    /// mongodb filter for oplog `ns` field.
    pub fn scope_filter(&self) -> Document {
        let patterns: Vec<Bson> = self
            .patterns
            .iter()
            .cloned()
            .map(Bson::RegularExpression)
            .collect();
        doc! {"$in": patterns}
    }

    /// Check if `entry` is in scope, return the namespace on destination.
    ///
    /// Noop oplogs are never accepted.
    pub fn accept(&self, entry: &OplogEntry) -> Option<String> {
        if entry.is_noop() {
            return None;
        }
        let coll = entry
            .namespace
            .strip_prefix(self.src_db.as_str())?
            .strip_prefix('.')?;
        if !self.colls.is_empty() && !self.colls.iter().any(|c| c == coll) {
            return None;
        }
        Some(format!("{}.{}", self.dst_db, coll))
    }

    /// Rewrite `entry` for destination, None if it's out of scope.
    pub fn route(&self, entry: &OplogEntry) -> Result<Option<OplogEntry>> {
        let namespace = match self.accept(entry) {
            None => return Ok(None),
            Some(ns) => ns,
        };
        let mut routed = entry.with_namespace(namespace);
        if entry.kind == OpKind::Command {
            routed.object = remap_command_obj(entry, &self.src_db, &self.dst_db)?;
        }
        Ok(Some(routed))
    }
}

fn regex_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
