//! # Bulk Loader
//!
//! Turns tabular rows into nodes and edges and commits them in batches.
//!
//! ## Phases
//!
//! 1. Node sources, one worker per kind. Each row is transformed, its key
//!    resolved (allocating a handle on first sight) and the node staged.
//! 2. Barrier: every node batch has finished.
//! 3. Edge and flow sources, one worker each. Endpoints are looked up only;
//!    an unresolved endpoint is counted, never allocated.
//!
//! ## Failure handling
//!
//! - A row that fails its transform is recorded as a defect and skipped.
//! - A batch is committed atomically and retried on transient errors. If it
//!   still fails it is recorded in the summary and the keys it allocated are
//!   released; earlier and later batches are unaffected.

pub mod transform;

use crate::batch::{Batch, CommitReceipt};
use crate::graph::GraphStore;
use crate::primitives::{DEFAULT_BATCH_SIZE, DEFAULT_COMMIT_ATTEMPTS};
use crate::resolver::{Resolver, normalize_key};
use crate::{Edge, EdgeLabel, FraudGraphError, Node, NodeAttributes, NodeKind, TransformError};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, error, info, warn};

pub use transform::Transform;

// =============================================================================
// INPUT
// =============================================================================

/// One source row: named string fields plus its line number for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    pub line: usize,
    pub fields: BTreeMap<String, String>,
}

impl SourceRow {
    #[must_use]
    pub fn new(line: usize, fields: BTreeMap<String, String>) -> Self {
        Self { line, fields }
    }

    /// Build a row from `(column, value)` pairs. Column names are trimmed.
    pub fn from_pairs<'a>(line: usize, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            line,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Raw field, present even when empty.
    #[must_use]
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Trimmed, non-empty field.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&str> {
        self.field(column)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Columns of a plain edge source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec {
    pub label: EdgeLabel,
    pub source_column: String,
    pub target_column: String,
}

impl EdgeSpec {
    #[must_use]
    pub fn new(
        label: EdgeLabel,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            label,
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }

    /// Endpoint columns named after the endpoint kinds' key columns.
    #[must_use]
    pub fn standard(label: EdgeLabel) -> Self {
        let (from, to) = label.endpoints();
        Self::new(label, from.key_column(), to.key_column())
    }

    #[must_use]
    pub fn source_kind(&self) -> NodeKind {
        self.label.endpoints().0
    }

    #[must_use]
    pub fn target_kind(&self) -> NodeKind {
        self.label.endpoints().1
    }
}

/// Columns of the transaction flow source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowColumns {
    pub tx: String,
    pub from_account: String,
    pub to_account: String,
    pub used_device: String,
    pub used_ip: String,
}

impl Default for FlowColumns {
    fn default() -> Self {
        Self {
            tx: "tx_id".to_string(),
            from_account: "from_account".to_string(),
            to_account: "to_account".to_string(),
            used_device: "used_device".to_string(),
            used_ip: "used_ip".to_string(),
        }
    }
}

impl FlowColumns {
    fn endpoints(&self) -> [(EdgeLabel, &str); 4] {
        [
            (EdgeLabel::FromAccount, self.from_account.as_str()),
            (EdgeLabel::ToAccount, self.to_account.as_str()),
            (EdgeLabel::UsedDevice, self.used_device.as_str()),
            (EdgeLabel::UsedIp, self.used_ip.as_str()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct NodeSource {
    pub name: String,
    pub kind: NodeKind,
    pub rows: Vec<SourceRow>,
}

#[derive(Debug, Clone)]
pub struct EdgeSource {
    pub name: String,
    pub spec: EdgeSpec,
    pub rows: Vec<SourceRow>,
}

#[derive(Debug, Clone)]
pub struct FlowSource {
    pub name: String,
    pub columns: FlowColumns,
    pub rows: Vec<SourceRow>,
}

/// Everything one load run consumes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub nodes: Vec<NodeSource>,
    pub edges: Vec<EdgeSource>,
    pub flows: Vec<FlowSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Attempts per batch, first try included.
    pub commit_attempts: usize,
    /// Run independent sources on the rayon pool.
    pub parallel: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
            parallel: true,
        }
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDefect {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub first_line: usize,
    pub last_line: usize,
    /// Staged items the batch would have written.
    pub staged: usize,
    pub reason: String,
}

/// Per-source counts. Row problems are aggregated here instead of raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub source: String,
    pub rows: usize,
    /// Rows whose node or edge(s) committed.
    pub loaded: usize,
    /// Rows rejected by a transform.
    pub skipped: usize,
    /// Edge rows with an unresolved endpoint (flow rows: nothing resolved).
    pub unmatched: usize,
    /// Flow rows committed with only some endpoints connected.
    pub partial: usize,
    /// Edges that already existed.
    pub duplicates: usize,
    pub committed_batches: usize,
    pub defects: Vec<RowDefect>,
    pub failed_batches: Vec<BatchFailure>,
}

impl LoadSummary {
    fn new(source: &str, rows: usize) -> Self {
        Self {
            source: source.to_string(),
            rows,
            ..Self::default()
        }
    }

    fn defect(&mut self, line: usize, reason: impl Display) {
        self.skipped += 1;
        self.defects.push(RowDefect {
            line,
            reason: reason.to_string(),
        });
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub nodes: Vec<LoadSummary>,
    pub edges: Vec<LoadSummary>,
}

impl LoadReport {
    pub fn summaries(&self) -> impl Iterator<Item = &LoadSummary> {
        self.nodes.iter().chain(&self.edges)
    }

    #[must_use]
    pub fn failed_batches(&self) -> usize {
        self.summaries().map(|s| s.failed_batches.len()).sum()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed_batches() > 0
    }
}

// =============================================================================
// BULK LOADER
// =============================================================================

enum EdgeJob<'d> {
    Edges(&'d EdgeSource),
    Flows(&'d FlowSource),
}

/// Owns the resolver for one load run against a store.
pub struct BulkLoader<'s, S: GraphStore> {
    store: &'s S,
    resolver: Resolver,
    options: LoaderOptions,
}

impl<'s, S: GraphStore> BulkLoader<'s, S> {
    /// Create a loader whose resolver is seeded from the store's key index.
    pub fn new(store: &'s S, options: LoaderOptions) -> Result<Self, FraudGraphError> {
        let resolver = Resolver::seeded(&store.view()?)?;
        Ok(Self {
            store,
            resolver,
            options,
        })
    }

    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Load node rows of one kind.
    pub fn load_nodes<F>(
        &self,
        source: &str,
        kind: NodeKind,
        key_column: &str,
        rows: &[SourceRow],
        transform: F,
    ) -> LoadSummary
    where
        F: Fn(&SourceRow) -> Result<NodeAttributes, TransformError>,
    {
        let mut summary = LoadSummary::new(source, rows.len());
        info!(source, %kind, rows = rows.len(), "loading nodes");

        for chunk in rows.chunks(self.options.batch_size.max(1)) {
            let mut batch = Batch::new();
            let mut fresh: Vec<&str> = Vec::new();

            for row in chunk {
                let prepared = row
                    .field(key_column)
                    .ok_or_else(|| TransformError::new(key_column, "missing column"))
                    .and_then(|raw| normalize_key(key_column, raw))
                    .and_then(|key| {
                        let attributes = transform(row)?;
                        if attributes.kind() != kind {
                            return Err(TransformError::new(
                                key_column,
                                format!("transform produced a {} record", attributes.kind()),
                            ));
                        }
                        Ok((key, attributes))
                    });

                match prepared {
                    Ok((key, attributes)) => {
                        let resolution = self.resolver.resolve(kind, key);
                        if resolution.fresh {
                            fresh.push(key);
                        }
                        batch.push_node(Node::new(resolution.handle, key, attributes));
                    }
                    Err(e) => {
                        warn!(source, line = row.line, error = %e, "skipping row");
                        summary.defect(row.line, e);
                    }
                }
            }

            let staged = batch.nodes().len();
            let committed = self.commit_chunk(&mut summary, chunk, &batch, || {
                self.resolver.release(kind, fresh.iter().copied());
            });
            if committed.is_some() {
                summary.loaded += staged;
            }
        }

        log_summary(&summary);
        summary
    }

    /// Load one edge label from rows of `(source key, target key)`.
    pub fn load_edges(&self, source: &str, spec: &EdgeSpec, rows: &[SourceRow]) -> LoadSummary {
        let mut summary = LoadSummary::new(source, rows.len());
        info!(source, label = %spec.label, rows = rows.len(), "loading edges");

        for chunk in rows.chunks(self.options.batch_size.max(1)) {
            let mut batch = Batch::new();

            for row in chunk {
                // An empty or missing key resolves to nothing.
                let from_key = row.value(&spec.source_column).unwrap_or_default();
                let to_key = row.value(&spec.target_column).unwrap_or_default();

                let from = self.resolver.lookup(spec.source_kind(), from_key);
                let to = self.resolver.lookup(spec.target_kind(), to_key);
                match (from, to) {
                    (Ok(from), Ok(to)) => batch.push_edge(Edge::new(from, spec.label, to)),
                    (from, to) => {
                        debug!(
                            source,
                            line = row.line,
                            from_key,
                            to_key,
                            from_found = from.is_ok(),
                            to_found = to.is_ok(),
                            "unmatched edge"
                        );
                        summary.unmatched += 1;
                    }
                }
            }

            let staged = batch.edges().len();
            if let Some(receipt) = self.commit_chunk(&mut summary, chunk, &batch, || {}) {
                summary.loaded += staged;
                summary.duplicates += receipt.edges_existing;
            }
        }

        log_summary(&summary);
        summary
    }

    /// Load transaction flows: up to four independent endpoints per row.
    ///
    /// A row with some endpoints unresolved still commits the ones that
    /// resolved and is counted as partial.
    pub fn load_flow_edges(
        &self,
        source: &str,
        columns: &FlowColumns,
        rows: &[SourceRow],
    ) -> LoadSummary {
        let mut summary = LoadSummary::new(source, rows.len());
        info!(source, rows = rows.len(), "loading transaction flows");

        for chunk in rows.chunks(self.options.batch_size.max(1)) {
            let mut batch = Batch::new();
            let mut staged_rows = 0;
            let mut staged_partial = 0;

            for row in chunk {
                let tx_key = row.value(&columns.tx).unwrap_or_default();
                let Ok(tx) = self.resolver.lookup(NodeKind::Transaction, tx_key) else {
                    debug!(source, line = row.line, tx_key, "unknown transaction");
                    summary.unmatched += 1;
                    continue;
                };

                let mut linked = 0;
                let mut missing = 0;
                for (label, column) in columns.endpoints() {
                    let Some(key) = row.value(column) else {
                        continue;
                    };
                    match self.resolver.lookup(label.endpoints().1, key) {
                        Ok(to) => {
                            batch.push_edge(Edge::new(tx, label, to));
                            linked += 1;
                        }
                        Err(e) => {
                            debug!(source, line = row.line, error = %e, "unresolved flow endpoint");
                            missing += 1;
                        }
                    }
                }

                match (linked, missing) {
                    (0, _) => summary.unmatched += 1,
                    (_, 0) => staged_rows += 1,
                    _ => {
                        staged_rows += 1;
                        staged_partial += 1;
                    }
                }
            }

            if let Some(receipt) = self.commit_chunk(&mut summary, chunk, &batch, || {}) {
                summary.loaded += staged_rows;
                summary.partial += staged_partial;
                summary.duplicates += receipt.edges_existing;
            }
        }

        log_summary(&summary);
        summary
    }

    /// Load a whole dataset: every node source, then every edge source.
    pub fn load_dataset(&self, dataset: &Dataset) -> LoadReport {
        let mut by_kind: BTreeMap<NodeKind, Vec<&NodeSource>> = BTreeMap::new();
        for source in &dataset.nodes {
            by_kind.entry(source.kind).or_default().push(source);
        }

        // One worker per kind.
        let nodes = self.run_phase(by_kind.into_values().collect(), |sources: Vec<&NodeSource>| {
            sources
                .into_iter()
                .map(|s| {
                    let convert = transform::for_kind(s.kind);
                    self.load_nodes(&s.name, s.kind, s.kind.key_column(), &s.rows, convert)
                })
                .collect()
        });

        let jobs: Vec<EdgeJob<'_>> = dataset
            .edges
            .iter()
            .map(EdgeJob::Edges)
            .chain(dataset.flows.iter().map(EdgeJob::Flows))
            .collect();
        let edges = self.run_phase(jobs, |job| match job {
            EdgeJob::Edges(s) => vec![self.load_edges(&s.name, &s.spec, &s.rows)],
            EdgeJob::Flows(s) => vec![self.load_flow_edges(&s.name, &s.columns, &s.rows)],
        });

        LoadReport { nodes, edges }
    }

    /// Run jobs to completion, on the rayon pool when enabled.
    ///
    /// A job that panics is re-raised on the calling thread.
    fn run_phase<J, F>(&self, jobs: Vec<J>, work: F) -> Vec<LoadSummary>
    where
        J: Send,
        F: Fn(J) -> Vec<LoadSummary> + Send + Sync,
    {
        if !self.options.parallel || jobs.len() <= 1 {
            return jobs.into_iter().flat_map(&work).collect();
        }

        jobs.into_par_iter().flat_map_iter(&work).collect()
    }

    /// Commit one chunk's batch, recording the outcome.
    fn commit_chunk(
        &self,
        summary: &mut LoadSummary,
        chunk: &[SourceRow],
        batch: &Batch,
        on_failure: impl FnOnce(),
    ) -> Option<CommitReceipt> {
        if batch.is_empty() {
            return None;
        }
        match self.commit_with_retry(batch) {
            Ok(receipt) => {
                summary.committed_batches += 1;
                Some(receipt)
            }
            Err(e) => {
                on_failure();
                let failure = BatchFailure {
                    first_line: chunk.first().map_or(0, |r| r.line),
                    last_line: chunk.last().map_or(0, |r| r.line),
                    staged: batch.len(),
                    reason: e.to_string(),
                };
                error!(
                    source = %summary.source,
                    first_line = failure.first_line,
                    last_line = failure.last_line,
                    error = %e,
                    "batch failed"
                );
                summary.failed_batches.push(failure);
                None
            }
        }
    }

    fn commit_with_retry(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
        let attempts = self.options.commit_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.commit(batch) {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "batch commit failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_summary(summary: &LoadSummary) {
    info!(
        source = %summary.source,
        rows = summary.rows,
        loaded = summary.loaded,
        skipped = summary.skipped,
        unmatched = summary.unmatched,
        partial = summary.partial,
        failed_batches = summary.failed_batches.len(),
        "source done"
    );
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphRead, MemoryStore, MemoryView};
    use crate::{AttrValue, Direction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A store whose next `failures` commits fail transiently.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl GraphStore for FlakyStore {
        type View<'a> = MemoryView<'a>;

        fn view(&self) -> Result<MemoryView<'_>, FraudGraphError> {
            self.inner.view()
        }

        fn commit(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(FraudGraphError::BatchCommit("injected".to_string()));
            }
            self.inner.commit(batch)
        }
    }

    fn account_row(line: usize, id: &str, balance: &str) -> SourceRow {
        SourceRow::from_pairs(
            line,
            [
                ("account_id", id),
                ("balance", balance),
                ("risk_score", "0.1"),
                ("is_flagged", "false"),
            ],
        )
    }

    fn account_rows(n: usize) -> Vec<SourceRow> {
        (1..=n)
            .map(|i| account_row(i + 1, &format!("A{i}"), "100"))
            .collect()
    }

    fn load_accounts(loader: &BulkLoader<'_, impl GraphStore>, rows: &[SourceRow]) -> LoadSummary {
        loader.load_nodes(
            "accounts",
            NodeKind::Account,
            "account_id",
            rows,
            transform::account,
        )
    }

    #[test]
    fn malformed_row_is_skipped_not_fatal() {
        let store = MemoryStore::new();
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");

        let mut rows = account_rows(10);
        rows[4] = account_row(6, "A5", "not-a-number");
        let summary = load_accounts(&loader, &rows);

        assert_eq!(summary.loaded, 9);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.defects.len(), 1);
        assert_eq!(summary.defects[0].line, 6);

        let view = store.view().expect("view");
        assert_eq!(view.count_kind(NodeKind::Account).expect("count"), 9);
        assert_eq!(view.lookup_key(NodeKind::Account, "A5").expect("lookup"), None);
        assert!(loader.resolver().lookup(NodeKind::Account, "A5").is_err());
    }

    #[test]
    fn keys_are_trimmed() {
        let store = MemoryStore::new();
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        load_accounts(&loader, &[account_row(2, "  A1 ", "5")]);

        let view = store.view().expect("view");
        assert!(view.lookup_key(NodeKind::Account, "A1").expect("lookup").is_some());
    }

    #[test]
    fn duplicate_keys_collapse_to_one_node() {
        let store = MemoryStore::new();
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let rows = vec![account_row(2, "A1", "5"), account_row(3, "A1", "7")];
        load_accounts(&loader, &rows);

        let view = store.view().expect("view");
        let node = view
            .find_by_key(NodeKind::Account, "A1")
            .expect("find")
            .expect("exists");
        assert_eq!(view.count_kind(NodeKind::Account).expect("count"), 1);
        assert_eq!(node.attribute("balance"), Some(AttrValue::Float(7.0)));
    }

    #[test]
    fn transient_failure_is_retried() {
        let store = FlakyStore::new(2);
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let summary = load_accounts(&loader, &account_rows(3));

        assert!(summary.is_clean());
        assert_eq!(summary.loaded, 3);
    }

    #[test]
    fn exhausted_retries_fail_only_that_batch() {
        let store = FlakyStore::new(3);
        let options = LoaderOptions {
            batch_size: 2,
            ..LoaderOptions::default()
        };
        let loader = BulkLoader::new(&store, options).expect("loader");
        let summary = load_accounts(&loader, &account_rows(4));

        assert_eq!(summary.failed_batches.len(), 1);
        assert_eq!(summary.failed_batches[0].first_line, 2);
        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.committed_batches, 1);

        // Keys of the failed batch were released, so edges cannot target them.
        assert!(loader.resolver().lookup(NodeKind::Account, "A1").is_err());
        assert!(loader.resolver().lookup(NodeKind::Account, "A3").is_ok());
        let view = store.view().expect("view");
        assert_eq!(view.count_kind(NodeKind::Account).expect("count"), 2);
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        seed(&store);
        store
    }

    fn seed(store: &MemoryStore) {
        let loader = BulkLoader::new(store, LoaderOptions::default()).expect("loader");
        let users: Vec<_> = ["U1", "U2"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                SourceRow::from_pairs(
                    i + 2,
                    [
                        ("user_id", *id),
                        ("name", "n"),
                        ("email", "e"),
                        ("phone", "p"),
                        ("address_hash", "h"),
                        ("risk_score", "0.5"),
                        ("is_flagged", "false"),
                    ],
                )
            })
            .collect();
        loader.load_nodes("users", NodeKind::User, "user_id", &users, transform::user);
        load_accounts(&loader, &account_rows(2));
    }

    #[test]
    fn unresolved_endpoints_are_counted() {
        let store = seeded_store();
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let rows = vec![
            SourceRow::from_pairs(2, [("user_id", "U1"), ("account_id", "A1")]),
            SourceRow::from_pairs(3, [("user_id", "U9"), ("account_id", "A1")]),
            SourceRow::from_pairs(4, [("user_id", "U2"), ("account_id", "A9")]),
            SourceRow::from_pairs(5, [("user_id", "U2")]),
            SourceRow::from_pairs(6, [("user_id", "U1"), ("account_id", "")]),
            SourceRow::from_pairs(7, [("user_id", "  "), ("account_id", "A2")]),
        ];
        let summary = loader.load_edges("owns", &EdgeSpec::standard(EdgeLabel::OwnsAccount), &rows);

        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.unmatched, 5);
        assert_eq!(summary.skipped, 0);
        assert!(summary.defects.is_empty());
        assert_eq!(store.view().expect("view").node_count().expect("count"), 4);
    }

    #[test]
    fn reloading_edges_is_idempotent() {
        let store = seeded_store();
        let rows = vec![
            SourceRow::from_pairs(2, [("user_id", "U1"), ("account_id", "A1")]),
            SourceRow::from_pairs(3, [("user_id", "U2"), ("account_id", "A1")]),
        ];
        let spec = EdgeSpec::standard(EdgeLabel::OwnsAccount);

        let first = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        first.load_edges("owns", &spec, &rows);
        let count = store.view().expect("view").edge_count().expect("count");

        let second = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let summary = second.load_edges("owns", &spec, &rows);

        assert_eq!(summary.duplicates, 2);
        assert_eq!(store.view().expect("view").edge_count().expect("count"), count);
    }

    #[test]
    fn flows_connect_partially() {
        let store = seeded_store();
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let tx = |line: usize, id: &'static str| {
            SourceRow::from_pairs(
                line,
                [("tx_id", id), ("amount", "10"), ("tx_ts", "2024-01-01")],
            )
        };
        loader.load_nodes(
            "transactions",
            NodeKind::Transaction,
            "tx_id",
            &[tx(2, "T1"), tx(3, "T2")],
            transform::transaction,
        );

        let flows = vec![
            SourceRow::from_pairs(
                2,
                [
                    ("tx_id", "T1"),
                    ("from_account", "A1"),
                    ("to_account", "A2"),
                    ("used_device", "D404"),
                    ("used_ip", ""),
                ],
            ),
            SourceRow::from_pairs(3, [("tx_id", "T2"), ("from_account", "A9")]),
            SourceRow::from_pairs(4, [("tx_id", "T404"), ("from_account", "A1")]),
            SourceRow::from_pairs(5, [("tx_id", ""), ("from_account", "A1")]),
        ];
        let summary = loader.load_flow_edges("flows", &FlowColumns::default(), &flows);

        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.partial, 1);
        assert_eq!(summary.unmatched, 3);
        assert_eq!(summary.skipped, 0);

        let view = store.view().expect("view");
        let t1 = view
            .lookup_key(NodeKind::Transaction, "T1")
            .expect("lookup")
            .expect("exists");
        assert_eq!(
            view.count_neighbors(t1, EdgeLabel::ToAccount, Direction::Forward)
                .expect("count"),
            1
        );
        assert_eq!(
            view.count_neighbors(t1, EdgeLabel::UsedDevice, Direction::Forward)
                .expect("count"),
            0
        );
    }

    /// A store that panics on any batch holding a device.
    struct DevicePanicStore {
        inner: MemoryStore,
    }

    impl GraphStore for DevicePanicStore {
        type View<'a> = MemoryView<'a>;

        fn view(&self) -> Result<MemoryView<'_>, FraudGraphError> {
            self.inner.view()
        }

        fn commit(&self, batch: &Batch) -> Result<CommitReceipt, FraudGraphError> {
            if batch.nodes().iter().any(|n| n.kind() == NodeKind::Device) {
                unreachable!("device commit");
            }
            self.inner.commit(batch)
        }
    }

    fn device_and_document_dataset() -> Dataset {
        Dataset {
            nodes: vec![
                NodeSource {
                    name: "devices".into(),
                    kind: NodeKind::Device,
                    rows: vec![SourceRow::from_pairs(2, [("device_id", "D1")])],
                },
                NodeSource {
                    name: "documents".into(),
                    kind: NodeKind::Document,
                    rows: vec![SourceRow::from_pairs(
                        2,
                        [("document_id", "DOC1"), ("doc_type", "passport")],
                    )],
                },
            ],
            ..Dataset::default()
        }
    }

    #[test]
    #[should_panic(expected = "device commit")]
    fn worker_panic_reaches_caller_in_parallel() {
        let store = DevicePanicStore {
            inner: MemoryStore::new(),
        };
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let _ = loader.load_dataset(&device_and_document_dataset());
    }

    #[test]
    #[should_panic(expected = "device commit")]
    fn worker_panic_reaches_caller_sequentially() {
        let store = DevicePanicStore {
            inner: MemoryStore::new(),
        };
        let options = LoaderOptions {
            parallel: false,
            ..LoaderOptions::default()
        };
        let loader = BulkLoader::new(&store, options).expect("loader");
        let _ = loader.load_dataset(&device_and_document_dataset());
    }

    #[test]
    fn dataset_loads_nodes_before_edges() {
        let store = MemoryStore::new();
        let loader = BulkLoader::new(&store, LoaderOptions::default()).expect("loader");
        let dataset = Dataset {
            nodes: vec![
                NodeSource {
                    name: "accounts".into(),
                    kind: NodeKind::Account,
                    rows: account_rows(2),
                },
                NodeSource {
                    name: "devices".into(),
                    kind: NodeKind::Device,
                    rows: vec![SourceRow::from_pairs(2, [("device_id", "D1")])],
                },
                NodeSource {
                    name: "transactions".into(),
                    kind: NodeKind::Transaction,
                    rows: vec![SourceRow::from_pairs(
                        2,
                        [("tx_id", "T1"), ("amount", "5"), ("tx_ts", "t")],
                    )],
                },
            ],
            edges: vec![],
            flows: vec![FlowSource {
                name: "flows".into(),
                columns: FlowColumns::default(),
                rows: vec![SourceRow::from_pairs(
                    2,
                    [
                        ("tx_id", "T1"),
                        ("from_account", "A1"),
                        ("to_account", "A2"),
                        ("used_device", "D1"),
                    ],
                )],
            }],
        };

        let report = loader.load_dataset(&dataset);
        assert!(!report.has_failures());
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.edges.len(), 1);
        assert_eq!(report.edges[0].loaded, 1);
        assert_eq!(store.view().expect("view").edge_count().expect("count"), 3);
    }
}
