//! # fraudgraph CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `load` - Bulk-load the CSV dataset
//! - `status` - Show node and edge counts
//! - `query` - Run one fraud-pattern query
//! - `export` - Write a snapshot of the graph to a file
//! - `server` - Start the HTTP server

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use fraudgraph_core::{FraudGraphError, Query};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// fraudgraph - fraud-pattern property graph
///
/// Loads users, accounts, devices, IPs, documents and transactions from CSV
/// and answers fixed fraud-pattern queries over them.
#[derive(Parser, Debug)]
#[command(name = "fraudgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true, default_value = "fraudgraph.db")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "file" (snapshot file)
    #[arg(short = 'B', long, global = true, value_enum, default_value = "redb")]
    pub backend: Backend,

    /// Configuration file (default: ./fraudgraph.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Load the CSV dataset into the graph
    Load {
        /// Dataset directory (overrides [data].dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Rows per committed batch (overrides [loader].batch_size)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Load sources one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Show graph status
    Status,

    /// Run a fraud-pattern query
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },

    /// Export a snapshot of the graph
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Start HTTP server
    Server {
        /// Host to bind to (overrides [server].host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides [server].port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// One subcommand per query shape.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum QueryCommand {
    /// Users sharing a device and the IPs they are known from
    FraudRing {
        /// External device key
        device_id: String,
    },

    /// Transactions of at least the given amount with both accounts' owners
    Laundering {
        #[arg(long)]
        min_amount: f64,
    },

    /// Low-balance accounts with transaction activity
    GhostAccounts {
        #[arg(long)]
        max_balance: f64,

        #[arg(long, default_value = "1")]
        min_activity: usize,
    },

    /// Documents shared by more than one user
    IdentityTheft,

    /// Where money went from an account
    MoneyTrail {
        /// External account key
        account_id: String,

        /// Hops to follow (1-3)
        #[arg(short, long, default_value = "3")]
        depth: usize,
    },

    /// A user's shared devices, co-users and known IPs
    Risk {
        /// External user key
        user_id: String,
    },

    /// Transactions within a radius of a point
    Geo {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        radius_km: f64,
    },
}

impl From<QueryCommand> for Query {
    fn from(command: QueryCommand) -> Self {
        match command {
            QueryCommand::FraudRing { device_id } => Query::FraudRing { device_id },
            QueryCommand::Laundering { min_amount } => Query::Laundering { min_amount },
            QueryCommand::GhostAccounts {
                max_balance,
                min_activity,
            } => Query::GhostAccounts {
                max_balance,
                min_activity,
            },
            QueryCommand::IdentityTheft => Query::IdentityTheft,
            QueryCommand::MoneyTrail { account_id, depth } => {
                Query::MoneyTrail { account_id, depth }
            }
            QueryCommand::Risk { user_id } => Query::RiskContext { user_id },
            QueryCommand::Geo {
                lat,
                lon,
                radius_km,
            } => Query::GeoRadius {
                lat,
                lon,
                radius_km,
            },
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

pub async fn execute(cli: Cli) -> Result<(), FraudGraphError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let target = Target {
        database: cli.database,
        backend: cli.backend,
        json_mode: cli.json_mode,
    };

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&target, force),
        Some(Commands::Load {
            dir,
            batch_size,
            sequential,
        }) => {
            let mut config = config;
            if let Some(dir) = dir {
                config.data.dir = dir;
            }
            if let Some(batch_size) = batch_size {
                config.loader.batch_size = batch_size;
            }
            if sequential {
                config.loader.parallel = false;
            }
            cmd_load(&target, &config)
        }
        Some(Commands::Status) | None => cmd_status(&target),
        Some(Commands::Query { query }) => cmd_query(&target, &query.into()),
        Some(Commands::Export { output }) => cmd_export(&target, &output),
        Some(Commands::Server { host, port }) => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            cmd_server(&target, &host, port).await
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
