//! Ontology CLI - discover relationships in a database schema
//!
//! Usage:
//!   ontology scan <datasource>
//!   ontology discover <datasource> [--legacy]
//!   ontology relationships <datasource>
//!
//! `<datasource>` is either a name from `[datasources]` in ontology.toml or a
//! path to a SQLite database file.
//!
//! Examples:
//!   ontology discover ./data/shop.db
//!   ontology --store /tmp/store.db discover shop --legacy
//!   RUST_LOG=ontology_engine=debug ontology discover shop

use clap::{Parser, Subcommand};
use ontology_engine::config::{DatasourceSettings, Driver, Settings};
use ontology_engine::datasource::SqliteDatasource;
use ontology_engine::discovery::{RelationshipDiscovery, TracingProgress};
use ontology_engine::report::{render_relationships, render_summary};
use ontology_engine::store::{SchemaRepository, SqliteStore};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "ontology")]
#[command(about = "Ontology - deterministic relationship discovery for database schemas")]
#[command(version)]
struct Cli {
    /// Relationship store path (overrides ontology.toml)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a datasource's schema into the store
    Scan {
        /// Datasource name or SQLite file path
        datasource: String,
    },

    /// Scan, then run FK resolution and PK matching
    Discover {
        /// Datasource name or SQLite file path
        datasource: String,

        /// Use legacy `_id` pattern matching for this run only
        #[arg(long)]
        legacy: bool,
    },

    /// List stored relationships for a datasource
    Relationships {
        /// Datasource name or SQLite file path
        datasource: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan { datasource } => cmd_scan(cli.store, &datasource).await,
        Commands::Discover { datasource, legacy } => {
            cmd_discover(cli.store, &datasource, legacy).await
        }
        Commands::Relationships { datasource } => cmd_relationships(cli.store, &datasource),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Everything a command needs to talk to one datasource.
struct Context {
    settings: Settings,
    store: Arc<SqliteStore>,
    name: String,
    datasource: DatasourceSettings,
}

impl Context {
    fn load(store_override: Option<PathBuf>, datasource: &str) -> CliResult<Self> {
        let settings = Settings::load()?;

        let store_path = match store_override {
            Some(path) => path,
            None => settings.store.resolved_path()?,
        };
        let store = Arc::new(SqliteStore::open(&store_path)?);

        // Unknown names are treated as SQLite file paths.
        let config = match settings.datasources.get(datasource) {
            Some(config) => config.clone(),
            None => DatasourceSettings {
                driver: Driver::Sqlite.as_str().to_string(),
                connection_string: datasource.to_string(),
                project: None,
            },
        };

        Ok(Self {
            settings,
            store,
            name: datasource.to_string(),
            datasource: config,
        })
    }

    fn register(&self) -> CliResult<(Uuid, Uuid)> {
        let project_id = self.datasource.project_id();
        let datasource_id = self.store.register_datasource(
            &self.name,
            project_id,
            self.datasource.driver_type()?.as_str(),
            &self.datasource.connection_string,
        )?;
        Ok((project_id, datasource_id))
    }

    fn open_datasource(&self) -> CliResult<SqliteDatasource> {
        match self.datasource.driver_type()? {
            Driver::Sqlite => Ok(SqliteDatasource::open(
                self.datasource.resolved_connection_string()?,
            )?),
        }
    }

    fn registered_id(&self) -> CliResult<Uuid> {
        match self.store.find_datasource(&self.name)? {
            Some((id, _)) => Ok(id),
            None => Err(format!("datasource '{}' has not been scanned", self.name).into()),
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

async fn scan(ctx: &Context, source: &SqliteDatasource, cancel: &CancellationToken) -> CliResult<Uuid> {
    let (_, datasource_id) = ctx.register()?;

    let mut scan = source.scan_schema(datasource_id, cancel).await?;
    let known_tables = ctx.store.list_tables(datasource_id).await?;
    let known_columns = ctx.store.list_columns(datasource_id).await?;
    scan.reuse_ids(&known_tables, &known_columns);
    ctx.store.save_snapshot(datasource_id, &scan)?;

    info!(
        datasource = %ctx.name,
        tables = scan.tables.len(),
        columns = scan.columns.len(),
        foreign_keys = scan.foreign_keys.len(),
        "schema scanned"
    );
    Ok(datasource_id)
}

async fn cmd_scan(store: Option<PathBuf>, datasource: &str) -> CliResult<()> {
    let ctx = Context::load(store, datasource)?;
    let source = ctx.open_datasource()?;
    let cancel = cancel_on_interrupt();

    scan(&ctx, &source, &cancel).await?;
    Ok(())
}

async fn cmd_discover(store: Option<PathBuf>, datasource: &str, legacy: bool) -> CliResult<()> {
    let ctx = Context::load(store, datasource)?;
    let source = Arc::new(ctx.open_datasource()?);
    let cancel = cancel_on_interrupt();

    let datasource_id = scan(&ctx, &source, &cancel).await?;
    let project_id = ctx.datasource.project_id();
    ctx.store
        .init_project_settings(project_id, ctx.settings.discovery.legacy_pattern_matching)?;

    let mut discovery = RelationshipDiscovery::new(Arc::clone(&ctx.store), source)
        .with_candidate_config(ctx.settings.discovery.candidate_config())
        .with_acceptance(ctx.settings.discovery.acceptance_config())
        .with_progress(Arc::new(TracingProgress));
    if legacy {
        discovery = discovery.with_legacy_pattern_matching(true);
    }

    let report = discovery.run(project_id, datasource_id, &cancel).await?;
    println!("{}", render_summary(&report));
    println!();
    println!(
        "{}",
        render_relationships(&ctx.store.list_relationship_details(datasource_id)?)
    );
    Ok(())
}

fn cmd_relationships(store: Option<PathBuf>, datasource: &str) -> CliResult<()> {
    let ctx = Context::load(store, datasource)?;
    let datasource_id = ctx.registered_id()?;
    println!(
        "{}",
        render_relationships(&ctx.store.list_relationship_details(datasource_id)?)
    );
    Ok(())
}
