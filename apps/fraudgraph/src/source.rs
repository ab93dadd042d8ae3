//! # CSV Sources
//!
//! Reads the dataset files named in [`DataConfig`] into loader sources.
//! Header names are trimmed and stripped of a UTF-8 byte order mark; a
//! missing file is logged and read as an empty source.

use crate::config::DataConfig;
use fraudgraph_core::{
    Dataset, EdgeLabel, EdgeSource, EdgeSpec, FlowColumns, FlowSource, FraudGraphError, NodeKind,
    NodeSource, SourceRow,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

const BOM: char = '\u{feff}';

/// Parse CSV text with a header row.
///
/// Row line numbers are the physical lines records start on, header = 1.
/// Records the reader cannot decode are logged and skipped.
pub fn read_rows<R: Read>(name: &str, reader: R) -> Result<Vec<SourceRow>, FraudGraphError> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv
        .headers()
        .map_err(|e| FraudGraphError::DeserializationError(format!("{}: header: {}", name, e)))?
        .iter()
        .map(|h| h.trim_start_matches(BOM).trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(source = name, error = %e, "unreadable csv record skipped");
                continue;
            }
        };
        let line = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(index + 2);

        let fields: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(SourceRow::new(line, fields));
    }
    Ok(rows)
}

/// Read one file. A missing file is an empty source.
pub fn read_file(path: &Path) -> Result<Vec<SourceRow>, FraudGraphError> {
    let name = path.display().to_string();
    if !path.exists() {
        tracing::warn!(path = %name, "source file not found, treating as empty");
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)
        .map_err(|e| FraudGraphError::IoError(format!("open {}: {}", name, e)))?;
    let rows = read_rows(&name, file)?;
    tracing::debug!(path = %name, rows = rows.len(), "source read");
    Ok(rows)
}

/// Read every configured source into a [`Dataset`].
pub fn read_dataset(config: &DataConfig) -> Result<Dataset, FraudGraphError> {
    let node_files = [
        (NodeKind::User, &config.users),
        (NodeKind::Account, &config.accounts),
        (NodeKind::Device, &config.devices),
        (NodeKind::IpAddress, &config.ips),
        (NodeKind::Document, &config.documents),
        (NodeKind::Transaction, &config.transactions),
    ];
    let edge_files = [
        (EdgeLabel::OwnsAccount, &config.user_accounts),
        (EdgeLabel::UsesDevice, &config.user_devices),
        (EdgeLabel::KnownIps, &config.user_ips),
        (EdgeLabel::HasDocument, &config.user_documents),
        (EdgeLabel::HasIp, &config.device_ips),
    ];

    let mut dataset = Dataset::default();
    for (kind, file) in node_files {
        dataset.nodes.push(NodeSource {
            name: file.clone(),
            kind,
            rows: read_file(&config.path(file))?,
        });
    }
    for (label, file) in edge_files {
        dataset.edges.push(EdgeSource {
            name: file.clone(),
            spec: EdgeSpec::standard(label),
            rows: read_file(&config.path(file))?,
        });
    }
    dataset.flows.push(FlowSource {
        name: config.transaction_flow.clone(),
        columns: FlowColumns::default(),
        rows: read_file(&config.path(&config.transaction_flow))?,
    });
    Ok(dataset)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_trimmed_and_bom_stripped() {
        let text = "\u{feff}user_id , name\nU1, Alice \n";
        let rows = read_rows("users", text.as_bytes()).expect("read");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("user_id"), Some("U1"));
        assert_eq!(rows[0].field("name"), Some(" Alice "));
    }

    #[test]
    fn line_numbers_count_the_header() {
        let text = "device_id\nD1\nD2\nD3\n";
        let rows = read_rows("devices", text.as_bytes()).expect("read");
        let lines: Vec<usize> = rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
    }

    #[test]
    fn short_rows_are_kept_with_missing_fields() {
        let text = "account_id,balance,risk_score\nA1,10.0\n";
        let rows = read_rows("accounts", text.as_bytes()).expect("read");
        assert_eq!(rows[0].value("balance"), Some("10.0"));
        assert_eq!(rows[0].value("risk_score"), None);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rows = read_file(&dir.path().join("absent.csv")).expect("read");
        assert!(rows.is_empty());
    }

    #[test]
    fn dataset_follows_configured_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("nodes_devices.csv"), "device_id\nD1\n").expect("write");
        std::fs::write(
            dir.path().join("edges_users_devices.csv"),
            "user_id,device_id\nU1,D1\n",
        )
        .expect("write");

        let config = DataConfig {
            dir: dir.path().to_path_buf(),
            ..DataConfig::default()
        };
        let dataset = read_dataset(&config).expect("dataset");

        assert_eq!(dataset.nodes.len(), 6);
        assert_eq!(dataset.edges.len(), 5);
        assert_eq!(dataset.flows.len(), 1);

        let devices = dataset
            .nodes
            .iter()
            .find(|s| s.kind == NodeKind::Device)
            .expect("device source");
        assert_eq!(devices.rows.len(), 1);

        let uses = dataset
            .edges
            .iter()
            .find(|s| s.spec.label == EdgeLabel::UsesDevice)
            .expect("uses_device source");
        assert_eq!(uses.spec.source_column, "user_id");
        assert_eq!(uses.rows.len(), 1);
    }
}
