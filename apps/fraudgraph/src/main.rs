//! # fraudgraph
//!
//! Fraud-pattern property graph: bulk CSV loading and fixed fraud queries.
//!
//! ## Usage
//!
//! ```bash
//! fraudgraph init
//! fraudgraph load --dir data/dgraph
//! fraudgraph query fraud-ring D1
//! fraudgraph query money-trail A1 --depth 2
//! fraudgraph server --port 8080
//! ```

use clap::Parser;
use fraudgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "fraudgraph=info,fraudgraph_core=info,tower_http=debug";
const VERBOSE_FILTER: &str = "fraudgraph=debug,fraudgraph_core=debug,tower_http=debug";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // FRAUDGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("FRAUDGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  fraudgraph v{}
  users, accounts, devices, IPs, documents, transactions
"#,
        env!("CARGO_PKG_VERSION")
    );
}
