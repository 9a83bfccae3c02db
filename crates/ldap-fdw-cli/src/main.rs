mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, Table};
use datafusion::prelude::{col, lit, SessionContext};
use ldap_fdw_common::config::AppConfig;
use ldap_fdw_common::error::LdapFdwResult;
use ldap_fdw_common::logging::init_logger;
use ldap_fdw_datafusion::LdapTableProvider;
use ldap_fdw_scan::options::{load_options, resolve_table_options};
use ldap_fdw_scan::{
    DirectoryConnector, DirectoryScan, EffectiveConfig, Ldap3Connector, MemoryOptionCatalog,
    ObjectKind, ScanRequest, IDENTITY_COLUMN,
};
use log::{debug, info};

#[derive(Parser)]
#[command(name = "ldap-fdw")]
#[command(about = "Query LDAP directories as relational tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check options as they would be declared on a server, user mapping or foreign table
    Validate {
        #[arg(long, value_enum)]
        kind: OptionKind,

        /// Options as KEY=VALUE
        #[arg(value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },
    /// Scan a foreign table and print its rows
    Scan {
        #[command(flatten)]
        table: TableArgs,

        /// Only return the entry with this distinguished name
        #[arg(long)]
        dn: Option<String>,

        /// Describe the search without contacting the server
        #[arg(long, default_value = "false")]
        explain: bool,
    },
    /// Run a SQL query over a foreign table
    Sql {
        #[command(flatten)]
        table: TableArgs,

        /// The name of the table in the query
        #[arg(long = "table", default_value = "ldap")]
        name: String,

        query: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "kebab-case")]
enum OptionKind {
    Server,
    UserMapping,
    Table,
}

impl From<OptionKind> for ObjectKind {
    fn from(value: OptionKind) -> Self {
        match value {
            OptionKind::Server => ObjectKind::Server,
            OptionKind::UserMapping => ObjectKind::UserMapping,
            OptionKind::Table => ObjectKind::Table,
        }
    }
}

#[derive(clap::Args)]
struct TableArgs {
    /// Server option as KEY=VALUE
    #[arg(long = "server-option", value_parser = parse_key_value)]
    server_options: Vec<(String, String)>,

    /// User mapping option as KEY=VALUE
    #[arg(long = "user-option", value_parser = parse_key_value)]
    user_options: Vec<(String, String)>,

    /// Foreign table option as KEY=VALUE
    #[arg(long = "table-option", value_parser = parse_key_value)]
    table_options: Vec<(String, String)>,

    /// Declared column, in order
    #[arg(long = "column", default_values_t = [IDENTITY_COLUMN.to_string()])]
    columns: Vec<String>,

    /// Read entries from a JSON file instead of connecting to a server
    #[arg(long)]
    memory: Option<PathBuf>,
}

const TABLE_NAME: &str = "ldap";
const SERVER_NAME: &str = "ldap_server";

impl TableArgs {
    /// Declares the server, user mapping and table, then resolves the table options.
    fn resolve(&self) -> LdapFdwResult<EffectiveConfig> {
        let mut catalog = MemoryOptionCatalog::new();
        catalog.create_server(SERVER_NAME, self.server_options.clone())?;
        catalog.create_user_mapping(SERVER_NAME, self.user_options.clone())?;
        catalog.create_foreign_table(TABLE_NAME, SERVER_NAME, self.table_options.clone())?;
        resolve_table_options(&catalog, TABLE_NAME)
    }

    fn connector(
        &self,
        app_config: &AppConfig,
        config: &EffectiveConfig,
    ) -> LdapFdwResult<Arc<dyn DirectoryConnector>> {
        Ok(match &self.memory {
            Some(path) => {
                debug!("reading directory entries from {}", path.display());
                Arc::new(memory::load_memory_directory(path, config)?)
            }
            None => Arc::new(Ldap3Connector::new(&app_config.session)),
        })
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE but got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { kind, options } => {
            let kind = ObjectKind::from(kind);
            load_options(kind, options)?;
            println!("options are valid for {kind}");
        }
        Commands::Scan {
            table,
            dn,
            explain,
        } => {
            let app_config = AppConfig::load()?;
            let config = table.resolve()?;
            let connector = table.connector(&app_config, &config)?;
            let request = ScanRequest {
                columns: table.columns.clone(),
                projection: None,
                filters: dn
                    .map(|dn| vec![col(IDENTITY_COLUMN).eq(lit(dn))])
                    .unwrap_or_default(),
                explain_only: explain,
            };
            let output = tokio::task::spawn_blocking(move || run_scan(connector, config, request))
                .await??;
            println!("{output}");
        }
        Commands::Sql { table, name, query } => {
            let app_config = AppConfig::load()?;
            let config = table.resolve()?;
            let connector = table.connector(&app_config, &config)?;
            let provider = LdapTableProvider::try_new(
                name.as_str(),
                table.columns.clone(),
                config,
                connector,
                app_config.execution.batch_size,
            )?;
            let ctx = SessionContext::new();
            ctx.register_table(name.as_str(), Arc::new(provider))?;
            info!("running query over table {name}");
            ctx.sql(&query).await?.show().await?;
        }
    }
    Ok(())
}

/// Runs the scan to completion and renders its rows as a table.
fn run_scan(
    connector: Arc<dyn DirectoryConnector>,
    config: EffectiveConfig,
    request: ScanRequest,
) -> LdapFdwResult<String> {
    let explain_only = request.explain_only;
    let mut table = Table::new();
    table.set_header(request.columns.iter().map(Cell::new));
    let mut scan = DirectoryScan::begin(connector, config, request)?;
    if explain_only {
        return Ok(scan.explain());
    }
    let mut rows = 0;
    while let Some(row) = scan.next_row()? {
        table.add_row(row.into_iter().map(|v| Cell::new(v.unwrap_or_default())));
        rows += 1;
    }
    scan.end();
    Ok(format!("{table}\n{rows} row(s)"))
}
