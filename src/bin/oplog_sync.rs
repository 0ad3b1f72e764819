use clap::{ArgAction, Parser, Subcommand};
use oplog_sync::blocking::mongo_syncer::status::render_table;
use oplog_sync::{Connection, OplogSyncer, Result, Shutdown, StatusReporter, SyncerConfig};
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(version, author, about)]
struct Opts {
    /// configuration file path, flags and environment variables override it.
    #[clap(long, env = "OPLOG_SYNC_CONFIG")]
    config: Option<String>,
    /// source database uri, must be a replica set.
    #[clap(long, env = "OPLOG_SYNC_SRC")]
    src: Option<String>,
    /// source database name.
    #[clap(long, env = "OPLOG_SYNC_SRC_DB")]
    src_db: Option<String>,
    /// source collections to sync, separated by ',', absent means all collections.
    #[clap(long, env = "OPLOG_SYNC_SRC_COLLECTIONS", value_delimiter = ',')]
    src_collections: Option<Vec<String>>,
    /// source username, overrides the one in uri.
    #[clap(long, env = "OPLOG_SYNC_SRC_USERNAME")]
    src_username: Option<String>,
    /// source password.
    #[clap(long, env = "OPLOG_SYNC_SRC_PASSWORD")]
    src_password: Option<String>,
    /// enable tls for source.
    #[clap(long, env = "OPLOG_SYNC_SRC_TLS", action = ArgAction::SetTrue)]
    src_tls: bool,
    /// destination database uri.
    #[clap(long, env = "OPLOG_SYNC_DST")]
    dst: Option<String>,
    /// destination database name.
    #[clap(long, env = "OPLOG_SYNC_DST_DB")]
    dst_db: Option<String>,
    /// destination username, overrides the one in uri.
    #[clap(long, env = "OPLOG_SYNC_DST_USERNAME")]
    dst_username: Option<String>,
    /// destination password.
    #[clap(long, env = "OPLOG_SYNC_DST_PASSWORD")]
    dst_password: Option<String>,
    /// enable tls for destination.
    #[clap(long, env = "OPLOG_SYNC_DST_TLS", action = ArgAction::SetTrue)]
    dst_tls: bool,
    /// log file path, if not specified, all log information will be output to stdout.
    #[clap(long, env = "OPLOG_SYNC_LOG_PATH")]
    log_path: Option<String>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay source oplogs on destination, forever.
    Sync {
        /// seconds since the unix epoch to replay history from, 0 means start from now.
        #[clap(long, env = "OPLOG_SYNC_SINCE", default_value_t = 0)]
        since: u32,
        /// ordinal for operations within `since` second.
        #[clap(long, env = "OPLOG_SYNC_ORDINAL", default_value_t = 0)]
        ordinal: u32,
        /// seconds to wait after current oplogs are drained.
        #[clap(long, env = "OPLOG_SYNC_POLL_DELAY")]
        poll_delay: Option<u64>,
        /// what to do when source document of an update oplog is gone: `abort` or `skip`.
        #[clap(long, env = "OPLOG_SYNC_ON_MISSING_SOURCE")]
        on_missing_source: Option<String>,
        /// destination collection which saves sync checkpoint.
        #[clap(long, env = "OPLOG_SYNC_CHECKPOINT_COLLECTION")]
        checkpoint_collection: Option<String>,
    },
    /// Compare document counts of source and destination collections.
    Status,
}

impl Opts {
    fn to_config(&self) -> Result<SyncerConfig> {
        let mut conf = match &self.config {
            Some(path) => SyncerConfig::from_toml(&fs::read_to_string(path)?)?,
            None => SyncerConfig::default(),
        };

        let src = conf.src_mut();
        if let Some(url) = &self.src {
            src.set_url(url.clone());
        }
        if let Some(db) = &self.src_db {
            src.set_db(db.clone());
        }
        if let Some(colls) = &self.src_collections {
            src.set_colls(colls.clone());
        }
        if self.src_tls {
            src.set_tls(true);
        }
        src.set_credential(self.src_username.clone(), self.src_password.clone());

        let dst = conf.dst_mut();
        if let Some(url) = &self.dst {
            dst.set_url(url.clone());
        }
        if let Some(db) = &self.dst_db {
            dst.set_db(db.clone());
        }
        if self.dst_tls {
            dst.set_tls(true);
        }
        dst.set_credential(self.dst_username.clone(), self.dst_password.clone());

        if let Command::Sync {
            since,
            ordinal,
            poll_delay,
            on_missing_source,
            checkpoint_collection,
        } = &self.command
        {
            let sync = conf.sync_mut();
            if *since > 0 {
                sync.set_since(*since, *ordinal);
            }
            if let Some(secs) = poll_delay {
                sync.set_poll_delay_secs(*secs);
            }
            if let Some(policy) = on_missing_source {
                sync.set_on_missing_source(policy.parse()?);
            }
            if let Some(coll) = checkpoint_collection {
                sync.set_checkpoint_collection(coll.clone());
            }
            conf.validate()?;
        } else {
            conf.validate_for_status()?;
        }
        Ok(conf)
    }
}

fn run(opts: &Opts) -> Result<()> {
    let conf = opts.to_config()?;
    let source = Connection::connect("Source", conf.get_src())?;
    let target = Connection::connect("Destination", conf.get_dst())?;

    match opts.command {
        Command::Sync { .. } => {
            source.check_permissions(conf.get_src().get_url(), conf.get_src().get_db())?;
            let (shutdown, signal) = Shutdown::new();
            shutdown.trigger_on_interrupt()?;
            let syncer = OplogSyncer::new(&source, &target, &conf);
            let progress = syncer.sync_forever(&signal)?;
            info!(
                op_count = progress.op_count(),
                resume = ?progress.resume_point(),
                "Sync complete."
            );
        }
        Command::Status => {
            let report = StatusReporter::new(&source, &target, &conf).report()?;
            print!("{}", render_table(&report));
        }
    }

    source.close();
    target.close();
    Ok(())
}

fn main() {
    let opts: Opts = Opts::parse();
    let collector = tracing_subscriber::fmt();
    let (non_blocking, guard) = match opts.log_path.as_deref().map(Path::new) {
        Some(path) => {
            let dir_name = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| path.as_os_str());
            let file_appender = tracing_appender::rolling::daily(dir_name, file_name);
            tracing_appender::non_blocking(file_appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };
    collector.with_writer(non_blocking).init();

    if let Err(e) = run(&opts) {
        error!(?e, "Oplog sync failed.");
        eprintln!("Error: {}", e);
        drop(guard);
        std::process::exit(1);
    }
}
