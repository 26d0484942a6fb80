//! Command-line database browser.
//!
//! Reads saved connections from a JSON file and runs the same read-only
//! operations the desktop browser offers: list tables or the catalog
//! tree, page through rows with filters, run ad-hoc SELECTs and inspect
//! table schemas.
//!
//! # Security Guarantees
//! - Only `SELECT`/`WITH` (plus `PRAGMA` on SQLite) statements are executed
//! - Credentials are never printed or logged

mod output;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use datafrost_core::{
    AdapterRegistry, BrowserService, ConnectionId, ConnectionStore, CredentialMap,
    JsonFileConnectionStore, MemoryConnectionStore, PageRequest, logging::init_logging,
};
use output::OutputFormat;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "datafrost")]
#[command(about = "Read-only database browser")]
#[command(version)]
#[command(long_about = "
Datafrost - browse SQLite, Turso, PostgreSQL, BigQuery and Snowflake

Connections are read from a JSON file of saved records:

  [{\"id\": 1, \"name\": \"local\", \"type\": \"sqlite\", \"credentials\": {\"path\": \"app.db\"}}]

EXAMPLES:
  datafrost adapters
  datafrost tables 1
  datafrost data 1 users --limit 10 --page 2 --filters '[{\"column\":\"age\",\"operator\":\"gte\",\"value\":\"21\"}]'
  datafrost query 1 'SELECT count(*) FROM users'
  datafrost test --type postgres --credentials '{\"mode\":\"url\",\"url\":\"postgres://localhost/app\"}'
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    pub quiet: bool,

    /// Saved connections file
    #[arg(
        long,
        global = true,
        env = "DATAFROST_CONNECTIONS",
        default_value = "connections.json",
        help = "JSON file holding saved connection records"
    )]
    pub connections: PathBuf,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Command {
    /// List supported adapter types
    Adapters,
    /// List saved connections
    Connections,
    /// Test a saved connection or unsaved credentials
    Test(TestArgs),
    /// List tables and views
    Tables(ConnectionArg),
    /// Show the database → schema → table tree
    Tree(ConnectionArg),
    /// Browse one page of a table
    Data(DataArgs),
    /// Run a read-only SQL statement
    Query(QueryArgs),
    /// Show a table's columns, indexes and constraints
    Schema(TableArgs),
}

#[derive(Args)]
pub struct ConnectionArg {
    /// Saved connection ID
    pub id: ConnectionId,
}

#[derive(Args)]
pub struct TableArgs {
    /// Saved connection ID
    pub id: ConnectionId,
    /// Table name (or full path for hierarchical catalogs)
    pub table: String,
}

#[derive(Args)]
pub struct DataArgs {
    #[command(flatten)]
    pub target: TableArgs,

    /// Rows per page (default 25)
    #[arg(long)]
    pub limit: Option<u32>,

    /// 1-based page number
    #[arg(long)]
    pub page: Option<u32>,

    /// JSON array of {column, operator, value} filters
    #[arg(long)]
    pub filters: Option<String>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Saved connection ID
    pub id: ConnectionId,
    /// SQL text
    pub sql: String,
}

#[derive(Args)]
pub struct TestArgs {
    /// Saved connection ID to test
    #[arg(conflicts_with_all = ["adapter_type", "credentials"])]
    pub id: Option<ConnectionId>,

    /// Adapter type for unsaved credentials
    #[arg(long = "type", requires = "credentials")]
    pub adapter_type: Option<String>,

    /// Credentials as a JSON object
    #[arg(long, requires = "adapter_type")]
    pub credentials: Option<String>,
}

async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn ConnectionStore>> {
    match &cli.command {
        Command::Adapters => Ok(Arc::new(MemoryConnectionStore::new())),
        Command::Test(args) if args.id.is_none() => Ok(Arc::new(MemoryConnectionStore::new())),
        _ => {
            let store = JsonFileConnectionStore::open(&cli.global.connections)
                .await
                .with_context(|| {
                    format!(
                        "could not load connections from {}",
                        cli.global.connections.display()
                    )
                })?;
            Ok(Arc::new(store))
        }
    }
}

fn render<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    table: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    let text = match format {
        OutputFormat::Json => output::json(value)?,
        OutputFormat::Table => table(value),
    };
    println!("{}", text);
    Ok(())
}

async fn run(cli: &Cli, service: &BrowserService, store: &dyn ConnectionStore) -> anyhow::Result<()> {
    let format = cli.global.format;
    match &cli.command {
        Command::Adapters => render(format, &service.list_adapters(), |a| output::adapters(a)),
        Command::Connections => {
            let records = store.list().await?;
            match format {
                OutputFormat::Json => {
                    let summary: Vec<_> = records
                        .iter()
                        .map(|r| serde_json::json!({"id": r.id, "name": r.name, "type": r.adapter_type}))
                        .collect();
                    println!("{}", output::json(&summary)?);
                }
                OutputFormat::Table => println!("{}", output::connections(&records)),
            }
            Ok(())
        }
        Command::Test(args) => {
            match (args.id, &args.adapter_type, &args.credentials) {
                (Some(id), _, _) => service.test_existing(id).await?,
                (None, Some(adapter_type), Some(credentials)) => {
                    let credentials: CredentialMap = serde_json::from_str(credentials)
                        .context("--credentials must be a JSON object")?;
                    service.test_connection(adapter_type, &credentials).await?;
                }
                _ => anyhow::bail!("give a connection ID or both --type and --credentials"),
            }
            println!("Connection successful");
            Ok(())
        }
        Command::Tables(args) => {
            let tables = service.list_tables(args.id).await?;
            render(format, &tables, |t| output::tables(t))
        }
        Command::Tree(args) => {
            let tree = service.list_tree(args.id).await?;
            render(format, &tree, |t| output::tree(t))
        }
        Command::Data(args) => {
            let mut request = PageRequest::new(args.limit, args.page);
            if let Some(filters) = &args.filters {
                request = request.with_filters_json(filters)?;
            }
            let result = service
                .get_table_data(args.target.id, &args.target.table, &request)
                .await?;
            render(format, &result, output::query_result)
        }
        Command::Query(args) => {
            let result = service.execute_query(args.id, &args.sql).await?;
            render(format, &result, output::query_result)
        }
        Command::Schema(args) => {
            let schema = service.get_table_schema(args.id, &args.table).await?;
            render(format, &schema, output::schema)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let store = open_store(&cli).await?;
    let service = BrowserService::new(Arc::clone(&store), Arc::new(AdapterRegistry::with_defaults()));

    let outcome = run(&cli, &service, store.as_ref()).await;
    service.shutdown().await;

    if let Err(e) = &outcome {
        tracing::error!("{:#}", e);
    }
    outcome
}
