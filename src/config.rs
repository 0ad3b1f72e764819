//! oplog syncer basic configuration, express in toml.
//!
//! Basic configuration file example:
//! ```toml
//! [src]
//! # source db url, need to be a replica set.
//! url = "mongodb://localhost:27017"
//! db = "shop"
//! # collections to sync, absent or empty means all collections.
//! colls = ["orders"]
//!
//! [dst]
//! url = "mongodb://localhost:27018"
//! db = "shop_copy"
//! tls = true
//!
//! [sync]
//! poll_delay_secs = 5
//! on_missing_source = "skip"
//! checkpoint_collection = "sync_time_record"
//! ```
use crate::{Result, SyncError};
use serde::Deserialize;
use std::time::Duration;

/// Global oplog syncer configuration.
///
/// It's built once at startup and passed by reference to every component.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SyncerConfig {
    #[serde(default)]
    src: ConnConfig,
    #[serde(default)]
    dst: ConnConfig,
    #[serde(default)]
    sync: SyncOptions,
}

impl SyncerConfig {
    /// create a new configuration.
    pub fn new(src: ConnConfig, dst: ConnConfig, sync: SyncOptions) -> Self {
        SyncerConfig { src, dst, sync }
    }

    /// parse configuration from toml file content.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// get source connection config.
    pub fn get_src(&self) -> &ConnConfig {
        &self.src
    }

    /// get destination connection config.
    pub fn get_dst(&self) -> &ConnConfig {
        &self.dst
    }

    /// get sync options.
    pub fn get_sync(&self) -> &SyncOptions {
        &self.sync
    }

    /// get mutable source connection config, used to apply command line overrides.
    pub fn src_mut(&mut self) -> &mut ConnConfig {
        &mut self.src
    }

    /// get mutable destination connection config, used to apply command line overrides.
    pub fn dst_mut(&mut self) -> &mut ConnConfig {
        &mut self.dst
    }

    /// get mutable sync options, used to apply command line overrides.
    pub fn sync_mut(&mut self) -> &mut SyncOptions {
        &mut self.sync
    }

    /// Check that the configuration is enough to run oplog sync.
    pub fn validate(&self) -> Result<()> {
        self.src.validate("src", true)?;
        self.dst.validate("dst", true)
    }

    /// Check that the configuration is enough to report status, database names are optional here.
    pub fn validate_for_status(&self) -> Result<()> {
        self.src.validate("src", false)?;
        self.dst.validate("dst", false)
    }
}

/// Connection configuration for one cluster.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ConnConfig {
    /// mongodb url, begins with 'mongodb://'
    #[serde(default)]
    url: String,
    /// database name.
    #[serde(default)]
    db: String,
    /// collections to sync, empty means sync all collections.
    #[serde(default)]
    colls: Vec<String>,
    /// is tls enabled.
    #[serde(default)]
    tls: bool,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl ConnConfig {
    /// create a new connection config with given `url` and `db`.
    pub fn new(url: impl Into<String>, db: impl Into<String>) -> Self {
        ConnConfig {
            url: url.into(),
            db: db.into(),
            ..ConnConfig::default()
        }
    }

    /// set collections allow-list, empty items are dropped.
    pub fn with_colls(mut self, colls: Vec<String>) -> Self {
        self.set_colls(colls);
        self
    }

    /// get mongodb url.
    pub fn get_url(&self) -> &str {
        &self.url
    }

    /// get database name.
    pub fn get_db(&self) -> &str {
        &self.db
    }

    /// get collections allow-list, empty means all collections.
    pub fn get_colls(&self) -> &[String] {
        &self.colls
    }

    /// is tls enabled.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// get username.
    pub fn get_username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// get password.
    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// set mongodb url.
    pub fn set_url(&mut self, url: String) {
        self.url = url;
    }

    /// set database name.
    pub fn set_db(&mut self, db: String) {
        self.db = db;
    }

    /// set collections allow-list, empty items are dropped.
    pub fn set_colls(&mut self, colls: Vec<String>) {
        self.colls = colls
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }

    /// enable or disable tls.
    pub fn set_tls(&mut self, tls: bool) {
        self.tls = tls;
    }

    /// set credentials.
    pub fn set_credential(&mut self, username: Option<String>, password: Option<String>) {
        if username.is_some() {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
    }

    fn validate(&self, name: &str, require_db: bool) -> Result<()> {
        if self.url.is_empty() {
            return Err(SyncError::ConfigError(format!("{} url is required", name)));
        }
        if require_db && self.db.is_empty() {
            return Err(SyncError::ConfigError(format!(
                "{} database name is required",
                name
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(SyncError::ConfigError(format!(
                "{} password is given without username",
                name
            )));
        }
        Ok(())
    }
}

/// What to do when an update oplog targets a document which is gone on the source.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingSourcePolicy {
    /// stop the run with an error.
    Abort,
    /// log a warning and continue with next oplog.
    Skip,
}

impl Default for MissingSourcePolicy {
    fn default() -> Self {
        MissingSourcePolicy::Abort
    }
}

impl std::str::FromStr for MissingSourcePolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(MissingSourcePolicy::Abort),
            "skip" => Ok(MissingSourcePolicy::Skip),
            other => Err(SyncError::ConfigError(format!(
                "unknown missing source policy {:?}, expect `abort` or `skip`",
                other
            ))),
        }
    }
}

/// Detail sync options.
#[derive(Deserialize, Debug, Clone)]
pub struct SyncOptions {
    /// seconds since the unix epoch to replay history from, 0 means start from now.
    #[serde(default)]
    since: u32,
    /// ordinal for operations within `since` second.
    #[serde(default)]
    ordinal: u32,
    /// how long tail runner waits after drained current oplogs.
    #[serde(default = "default_poll_delay_secs")]
    poll_delay_secs: u64,
    #[serde(default)]
    on_missing_source: MissingSourcePolicy,
    /// destination collection which saves sync checkpoint, None means checkpoint is not saved.
    #[serde(default)]
    checkpoint_collection: Option<String>,
}

fn default_poll_delay_secs() -> u64 {
    5
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            since: 0,
            ordinal: 0,
            poll_delay_secs: default_poll_delay_secs(),
            on_missing_source: MissingSourcePolicy::default(),
            checkpoint_collection: None,
        }
    }
}

impl SyncOptions {
    /// get since seconds.
    pub fn get_since(&self) -> u32 {
        self.since
    }

    /// get since ordinal.
    pub fn get_ordinal(&self) -> u32 {
        self.ordinal
    }

    /// get tail poll delay.
    pub fn get_poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    /// get missing source document policy.
    pub fn get_on_missing_source(&self) -> MissingSourcePolicy {
        self.on_missing_source
    }

    /// get checkpoint collection name.
    pub fn get_checkpoint_collection(&self) -> Option<&str> {
        self.checkpoint_collection.as_deref()
    }

    /// set since checkpoint.
    pub fn set_since(&mut self, since: u32, ordinal: u32) {
        self.since = since;
        self.ordinal = ordinal;
    }

    /// set tail poll delay in seconds.
    pub fn set_poll_delay_secs(&mut self, secs: u64) {
        self.poll_delay_secs = secs;
    }

    /// set missing source document policy.
    pub fn set_on_missing_source(&mut self, policy: MissingSourcePolicy) {
        self.on_missing_source = policy;
    }

    /// set checkpoint collection name.
    pub fn set_checkpoint_collection(&mut self, coll: String) {
        self.checkpoint_collection = Some(coll);
    }
}
