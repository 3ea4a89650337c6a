//! sqlgate CLI
//!
//! Runs untrusted SQL through the gateway from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use sqlgate::prelude::*;

/// Read-only SQL gateway.
#[derive(Parser)]
#[command(name = "sqlgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (overrides the configuration file).
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// JSON configuration file.
    #[arg(short, long, env = "SQLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Allowed relations, comma-separated (overrides the configuration file).
    #[arg(short, long, env = "SQLGATE_ALLOWED_RELATIONS", value_delimiter = ',')]
    allow: Vec<String>,

    /// SQL grammar (sqlite, postgres, mysql, generic).
    #[arg(long)]
    dialect: Option<SqlDialect>,

    /// Maximum number of pooled connections.
    #[arg(long)]
    max_connections: Option<u32>,

    /// Open the database read-only.
    #[arg(long)]
    read_only: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check and run a query, printing the result as JSON.
    Query {
        /// The SQL text.
        sql: String,
    },

    /// Check a query without running it, listing every violation.
    Check {
        /// The SQL text.
        sql: String,
    },
}

impl Cli {
    fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::from_json_file(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(database) = &self.database {
            config.pool.database_url.clone_from(database);
        }
        if !self.allow.is_empty() {
            config.policy.allowed_relations.clone_from(&self.allow);
        }
        if let Some(dialect) = self.dialect {
            config.policy.dialect = dialect;
        }
        if let Some(max) = self.max_connections {
            config.pool.max_connections = max;
        }
        if self.read_only {
            config.pool.read_only = true;
        }
        Ok(config)
    }
}

fn error_body(error: &GatewayError) -> serde_json::Value {
    json!({
        "error": error.to_string(),
        "code": error.code(),
        "status": error.status_code(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.gateway_config()?;

    match &cli.command {
        Commands::Query { sql } => {
            let gateway = QueryGateway::connect(config).await?;
            match gateway.execute_query(sql).await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    println!("{}", serde_json::to_string_pretty(&error_body(&e))?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::Check { sql } => {
            let policy = QueryPolicy::new(config.policy)?;
            let violations = match policy.diagnose(sql) {
                Ok(violations) => violations,
                Err(rejection) => vec![rejection],
            };

            if violations.is_empty() {
                let query = policy.authorize(sql)?;
                info!(relations = ?query.relation_names(), "Query allowed");
                println!("{}", json!({ "allowed": true, "relations": query.relation_names() }));
                return Ok(ExitCode::SUCCESS);
            }

            let reasons: Vec<_> = violations
                .iter()
                .map(|v| json!({ "code": v.code(), "error": v.to_string() }))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "allowed": false, "violations": reasons }))?
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
