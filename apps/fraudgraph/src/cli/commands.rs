//! # CLI Command Implementations

use crate::api;
use crate::config::AppConfig;
use crate::source;
use fraudgraph_core::{
    FraudGraphError, LoadReport, LoaderOptions, Query, Session, graph_from_bytes, graph_to_bytes,
    formats::MAX_PERSISTENCE_PAYLOAD_SIZE,
};
use std::path::{Path, PathBuf};

// =============================================================================
// TARGET DATABASE
// =============================================================================

/// How the database file is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// redb database, every batch its own transaction.
    Redb,
    /// Snapshot file, loaded into memory and rewritten after changes.
    File,
}

impl Backend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::File => "file",
        }
    }
}

/// Database selected by the global flags.
#[derive(Debug, Clone)]
pub struct Target {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
}

// =============================================================================
// PATH VALIDATION
// =============================================================================

/// Resolve an output path against its canonicalized parent directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, FraudGraphError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        FraudGraphError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;
    if !canonical_parent.is_dir() {
        return Err(FraudGraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| FraudGraphError::IoError("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), FraudGraphError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FraudGraphError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

pub fn cmd_init(target: &Target, force: bool) -> Result<(), FraudGraphError> {
    if target.database.exists() {
        if !force {
            return Err(FraudGraphError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&target.database)
            .map_err(|e| FraudGraphError::IoError(format!("Remove database: {}", e)))?;
    }

    let session = open_session(target, LoaderOptions::default())?;
    save_session(&session, target)?;
    println!(
        "Initialized new {} database at {:?}",
        target.backend.as_str(),
        target.database
    );
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load the configured dataset. Fails after saving if any batch failed.
pub fn cmd_load(target: &Target, config: &AppConfig) -> Result<(), FraudGraphError> {
    let session = open_session(target, config.loader.into())?;
    let dataset = source::read_dataset(&config.data)?;
    let report = session.load(&dataset)?;
    save_session(&session, target)?;

    if target.json_mode {
        print_json(&report)?;
    } else {
        print_load_report(&report);
    }

    match report.failed_batches() {
        0 => Ok(()),
        failed => Err(FraudGraphError::BatchCommit(format!(
            "{} batch(es) failed; their rows were not loaded",
            failed
        ))),
    }
}

fn print_load_report(report: &LoadReport) {
    println!("Load Summary");
    println!("============");
    println!(
        "{:<32} {:>8} {:>8} {:>8} {:>9} {:>8} {:>7}",
        "source", "rows", "loaded", "skipped", "unmatched", "partial", "failed"
    );
    for summary in report.summaries() {
        println!(
            "{:<32} {:>8} {:>8} {:>8} {:>9} {:>8} {:>7}",
            summary.source,
            summary.rows,
            summary.loaded,
            summary.skipped,
            summary.unmatched,
            summary.partial,
            summary.failed_batches.len()
        );
        for defect in summary.defects.iter().take(5) {
            println!("    line {}: {}", defect.line, defect.reason);
        }
        if summary.defects.len() > 5 {
            println!("    ... {} more defects", summary.defects.len() - 5);
        }
        for failure in &summary.failed_batches {
            println!(
                "    batch lines {}-{} failed: {}",
                failure.first_line, failure.last_line, failure.reason
            );
        }
    }
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(target: &Target) -> Result<(), FraudGraphError> {
    let session = open_session(target, LoaderOptions::default())?;
    let metrics = session.metrics()?;

    if target.json_mode {
        let output = serde_json::json!({
            "database": target.database.to_string_lossy(),
            "backend": target.backend.as_str(),
            "node_count": metrics.node_count,
            "edge_count": metrics.edge_count,
            "nodes_by_kind": metrics.nodes_by_kind,
            "edges_by_label": metrics.edges_by_label,
        });
        return print_json(&output);
    }

    println!("fraudgraph Status");
    println!("=================");
    println!("Database: {:?}", target.database);
    println!("Backend:  {}", target.backend.as_str());
    println!();
    println!("Nodes: {}", metrics.node_count);
    for (kind, count) in &metrics.nodes_by_kind {
        println!("  {:<14} {}", kind, count);
    }
    println!("Edges: {}", metrics.edge_count);
    for (label, count) in &metrics.edges_by_label {
        println!("  {:<14} {}", label, count);
    }
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

pub fn cmd_query(target: &Target, query: &Query) -> Result<(), FraudGraphError> {
    let session = open_session(target, LoaderOptions::default())?;
    let result = session.execute(query)?;

    if target.json_mode {
        let output = serde_json::json!({
            "shape": query.shape(),
            "matched": !result.is_empty(),
            "result": result,
        });
        return print_json(&output);
    }

    if result.is_empty() {
        println!("No match for {}", query.shape());
        return Ok(());
    }
    print_json(&result)
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write a snapshot of either backend to `output`.
pub fn cmd_export(target: &Target, output: &Path) -> Result<(), FraudGraphError> {
    let output = validate_output_path(output)?;
    let session = open_session(target, LoaderOptions::default())?;
    let data = graph_to_bytes(&session.snapshot()?)?;

    std::fs::write(&output, &data)
        .map_err(|e| FraudGraphError::IoError(format!("Write file: {}", e)))?;
    println!("Exported {} bytes to {:?}", data.len(), output);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

pub async fn cmd_server(target: &Target, host: &str, port: u16) -> Result<(), FraudGraphError> {
    let session = open_session(target, LoaderOptions::default())?;

    println!("fraudgraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", target.backend.as_str());
    println!("  Database: {:?}", target.database);
    println!();
    println!("Endpoints:");
    println!("  POST /query  - Execute a fraud-pattern query");
    println!("  GET  /status - Node and edge counts");
    println!("  POST /export - Snapshot of the graph (base64)");
    println!("  GET  /health - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&format!("{}:{}", host, port), session).await
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the target database, creating an empty one if it does not exist.
pub fn open_session(target: &Target, options: LoaderOptions) -> Result<Session, FraudGraphError> {
    let session = match target.backend {
        Backend::Redb => Session::with_redb(&target.database)?,
        Backend::File if target.database.exists() => {
            let size = std::fs::metadata(&target.database)
                .map_err(|e| FraudGraphError::IoError(format!("Cannot read file metadata: {}", e)))?
                .len();
            if usize::try_from(size).map_or(true, |s| s > MAX_PERSISTENCE_PAYLOAD_SIZE) {
                return Err(FraudGraphError::DeserializationError(format!(
                    "Database file of {} bytes exceeds maximum allowed {} bytes",
                    size, MAX_PERSISTENCE_PAYLOAD_SIZE
                )));
            }
            let data = std::fs::read(&target.database)
                .map_err(|e| FraudGraphError::IoError(format!("Read db: {}", e)))?;
            Session::with_graph(graph_from_bytes(&data)?)
        }
        Backend::File => Session::new(),
    };
    Ok(session.with_loader_options(options))
}

/// Persist an in-memory session to the snapshot file. redb sessions are
/// already durable.
pub fn save_session(session: &Session, target: &Target) -> Result<(), FraudGraphError> {
    if session.is_persistent() {
        return Ok(());
    }
    let data = graph_to_bytes(&session.snapshot()?)?;
    std::fs::write(&target.database, &data)
        .map_err(|e| FraudGraphError::IoError(format!("Write db: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
