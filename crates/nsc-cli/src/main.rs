use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use nsc_config::{
    report_unused_keys, resolve_database_url, CollectorConfig, ConfigCommand, LoadedConfig,
    UnusedKeyPolicy,
};
use nsc_db::PgCatalogStore;
use nsc_ingest::{read_listings, validate, DuplicateFilter, InputFormat, RejectCounts};
use nsc_reconcile::{ingest, BatchReconciler, ChangePropagator, ReconcileConfig};

#[derive(Parser)]
#[command(name = "nsc")]
#[command(about = "Number shop collector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands (connection URL from NSC_DATABASE_URL)
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Reconcile a crawler output file against the catalog table
    Collect {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Crawler output (CSV with header, or JSON lines)
        #[arg(long)]
        input: PathBuf,

        /// csv | jsonl (default: from file extension)
        #[arg(long)]
        format: Option<String>,

        /// Overrides collector.batch_size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Push flagged catalog rows to the dependent table and clear the flags
    Propagate {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Dry run: dedupe + validate an input file without touching the store
    Validate {
        #[arg(long)]
        input: PathBuf,

        /// csv | jsonl (default: from file extension)
        #[arg(long)]
        format: Option<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = nsc_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = nsc_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_shop_results={} has_mobile_numbers={}",
                        s.ok, s.has_catalog_table, s.has_dependent_table
                    );
                    if s.has_catalog_table {
                        println!("flagged_rows={}", nsc_db::count_flagged(&pool).await?);
                    }
                }
                DbCmd::Migrate => {
                    nsc_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Collect {
            config_paths,
            input,
            format,
            batch_size,
        } => {
            let loaded = load_config(&config_paths)?;
            let mut cfg = typed_config(&loaded, ConfigCommand::Collect)?;
            if let Some(n) = batch_size {
                cfg.collector.batch_size = n;
                cfg.validate()?;
            }
            let format = input_format(&input, format.as_deref())?;

            let pool = connect(&cfg).await?;
            let listings = read_listings(&input, format)?;
            info!(
                records = listings.len(),
                batch_size = cfg.collector.batch_size,
                flag_policy = cfg.collector.flag_policy.as_str(),
                config_hash = %loaded.config_hash,
                "collect starting"
            );

            let reconciler = BatchReconciler::new(
                PgCatalogStore::new(pool),
                ReconcileConfig {
                    batch_size: cfg.collector.batch_size,
                    flag_policy: cfg.collector.flag_policy,
                },
            )?;
            let report = ingest(futures_util::stream::iter(listings), reconciler).await;

            println!("config_hash={}", loaded.config_hash);
            println!("records_read={}", report.records_read);
            println!("accepted={}", report.accepted);
            print_rejects(&report.rejected);
            let s = &report.summary;
            println!("batches_committed={}", s.batches_committed);
            println!("batches_failed={}", s.batches_failed);
            println!("inserted={}", s.inserted);
            println!("updated={}", s.updated);
            println!("status_changes={}", s.status_changes);

            if s.batches_failed > 0 {
                bail!(
                    "{} batch(es) failed and were rolled back; re-run collect to retry",
                    s.batches_failed
                );
            }
        }

        Commands::Propagate { config_paths } => {
            let loaded = load_config(&config_paths)?;
            let cfg = typed_config(&loaded, ConfigCommand::Propagate)?;
            let pool = connect(&cfg).await?;

            let report = ChangePropagator::new(PgCatalogStore::new(pool))
                .propagate()
                .await?;

            println!("rows_selected={}", report.rows_selected);
            println!("new_listings={}", report.new_listings);
            println!("status_changes={}", report.status_changes);
            println!("propagated={}", report.propagated);
            println!("deactivated={}", report.deactivated);
            println!("dependents_missing={}", report.dependents_missing);
            println!("claims_lost={}", report.claims_lost);
        }

        Commands::Validate { input, format } => {
            let format = input_format(&input, format.as_deref())?;
            let listings = read_listings(&input, format)?;

            let mut dedupe = DuplicateFilter::new();
            let mut rejected = RejectCounts::default();
            let mut accepted = 0_u64;
            for raw in &listings {
                match dedupe.check(raw).and_then(|()| validate(raw)) {
                    Ok(_) => accepted += 1,
                    Err(reason) => {
                        rejected.record(&reason);
                        warn!(
                            key = %raw.catalog_key,
                            source = %raw.source_name,
                            field = reason.field(),
                            reason = %reason,
                            "record rejected"
                        );
                    }
                }
            }

            println!("records_read={}", listings.len());
            println!("accepted={}", accepted);
            print_rejects(&rejected);
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries the key=value report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    nsc_config::load_layered_yaml(&path_refs)
}

fn typed_config(loaded: &LoadedConfig, command: ConfigCommand) -> Result<CollectorConfig> {
    let unused = report_unused_keys(command, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &unused.unused_leaf_pointers {
        warn!(command = %unused.command, key = %ptr, "unused config key");
    }
    loaded.collector()
}

/// Startup connection. Failing here is fatal and happens before any batch work.
async fn connect(cfg: &CollectorConfig) -> Result<nsc_db::PgPool> {
    let url = resolve_database_url(&cfg.database)?;
    nsc_db::connect(url.expose(), cfg.database.max_connections)
        .await
        .with_context(|| format!("database unreachable (url from {})", url.env_var))
}

fn input_format(path: &Path, explicit: Option<&str>) -> Result<InputFormat> {
    match explicit {
        Some(f) => InputFormat::parse(f),
        None => Ok(InputFormat::from_path(path)),
    }
}

fn print_rejects(r: &RejectCounts) {
    println!("rejected={}", r.total());
    println!("rejected_missing_field={}", r.missing_field);
    println!("rejected_bad_key_length={}", r.bad_key_length);
    println!("rejected_unknown_source={}", r.unknown_source);
    println!("rejected_status_not_allowed={}", r.status_not_allowed);
    println!("rejected_duplicate={}", r.duplicate);
}
