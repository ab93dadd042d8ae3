//! # Core Type Definitions
//!
//! This module contains all core types for the fraud graph:
//! - Node and edge identifiers (`Handle`, `NodeKind`, `EdgeLabel`, `Direction`, `Edge`)
//! - Typed node records (`Node`, `NodeAttributes` and the per-kind attribute structs)
//! - Attribute values and predicates (`AttrValue`, `AttrPredicate`)
//! - Error types (`FraudGraphError`, `TransformError`)
//!
//! ## Ordering Guarantees
//!
//! Identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet` collections,
//! which keeps scans and traversals reproducible between runs.

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// HANDLES
// =============================================================================

/// Opaque, stable internal identifier of a node.
///
/// Handles are allocated by the resolver and never derived from external keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// NODE KINDS
// =============================================================================

/// The six node types of the fraud graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    User,
    Account,
    Device,
    IpAddress,
    Document,
    Transaction,
}

impl NodeKind {
    /// Every kind, in code order.
    pub const ALL: [NodeKind; 6] = [
        NodeKind::User,
        NodeKind::Account,
        NodeKind::Device,
        NodeKind::IpAddress,
        NodeKind::Document,
        NodeKind::Transaction,
    ];

    /// Stable one-byte code used by the on-disk indexes.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            NodeKind::User => 1,
            NodeKind::Account => 2,
            NodeKind::Device => 3,
            NodeKind::IpAddress => 4,
            NodeKind::Document => 5,
            NodeKind::Transaction => 6,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Zero-based position in [`NodeKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        (self.code() - 1) as usize
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::User => "user",
            NodeKind::Account => "account",
            NodeKind::Device => "device",
            NodeKind::IpAddress => "ip_address",
            NodeKind::Document => "document",
            NodeKind::Transaction => "transaction",
        }
    }

    /// Name of the source column carrying the external key.
    #[must_use]
    pub const fn key_column(self) -> &'static str {
        match self {
            NodeKind::User => "user_id",
            NodeKind::Account => "account_id",
            NodeKind::Device => "device_id",
            NodeKind::IpAddress => "ip_addr",
            NodeKind::Document => "document_id",
            NodeKind::Transaction => "tx_id",
        }
    }

    /// Attribute names readable through [`Node::attribute`], key column included.
    #[must_use]
    pub const fn attributes(self) -> &'static [&'static str] {
        match self {
            NodeKind::User => &[
                "user_id",
                "name",
                "email",
                "phone",
                "address_hash",
                "risk_score",
                "is_flagged",
            ],
            NodeKind::Account => &["account_id", "balance", "risk_score", "is_flagged"],
            NodeKind::Device => &["device_id", "location"],
            NodeKind::IpAddress => &["ip_addr", "reputation", "location"],
            NodeKind::Document => &["document_id", "doc_type"],
            NodeKind::Transaction => &["tx_id", "amount", "timestamp", "tx_type", "location"],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = FraudGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(NodeKind::User),
            "account" => Ok(NodeKind::Account),
            "device" => Ok(NodeKind::Device),
            "ip" | "ip_address" | "ipaddress" => Ok(NodeKind::IpAddress),
            "document" => Ok(NodeKind::Document),
            "transaction" | "tx" => Ok(NodeKind::Transaction),
            other => Err(FraudGraphError::QueryInput(format!(
                "unknown node kind: {other}"
            ))),
        }
    }
}

// =============================================================================
// EDGE LABELS
// =============================================================================

/// The nine directed edge labels. Each label has a fixed endpoint schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
    OwnsAccount,
    HasDocument,
    UsesDevice,
    KnownIps,
    HasIp,
    FromAccount,
    ToAccount,
    UsedDevice,
    UsedIp,
}

impl EdgeLabel {
    pub const ALL: [EdgeLabel; 9] = [
        EdgeLabel::OwnsAccount,
        EdgeLabel::HasDocument,
        EdgeLabel::UsesDevice,
        EdgeLabel::KnownIps,
        EdgeLabel::HasIp,
        EdgeLabel::FromAccount,
        EdgeLabel::ToAccount,
        EdgeLabel::UsedDevice,
        EdgeLabel::UsedIp,
    ];

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            EdgeLabel::OwnsAccount => 1,
            EdgeLabel::HasDocument => 2,
            EdgeLabel::UsesDevice => 3,
            EdgeLabel::KnownIps => 4,
            EdgeLabel::HasIp => 5,
            EdgeLabel::FromAccount => 6,
            EdgeLabel::ToAccount => 7,
            EdgeLabel::UsedDevice => 8,
            EdgeLabel::UsedIp => 9,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.code() == code)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeLabel::OwnsAccount => "owns_account",
            EdgeLabel::HasDocument => "has_document",
            EdgeLabel::UsesDevice => "uses_device",
            EdgeLabel::KnownIps => "known_ips",
            EdgeLabel::HasIp => "has_ip",
            EdgeLabel::FromAccount => "from_account",
            EdgeLabel::ToAccount => "to_account",
            EdgeLabel::UsedDevice => "used_device",
            EdgeLabel::UsedIp => "used_ip",
        }
    }

    /// `(source kind, target kind)` every edge with this label must connect.
    #[must_use]
    pub const fn endpoints(self) -> (NodeKind, NodeKind) {
        match self {
            EdgeLabel::OwnsAccount => (NodeKind::User, NodeKind::Account),
            EdgeLabel::HasDocument => (NodeKind::User, NodeKind::Document),
            EdgeLabel::UsesDevice => (NodeKind::User, NodeKind::Device),
            EdgeLabel::KnownIps => (NodeKind::User, NodeKind::IpAddress),
            EdgeLabel::HasIp => (NodeKind::Device, NodeKind::IpAddress),
            EdgeLabel::FromAccount => (NodeKind::Transaction, NodeKind::Account),
            EdgeLabel::ToAccount => (NodeKind::Transaction, NodeKind::Account),
            EdgeLabel::UsedDevice => (NodeKind::Transaction, NodeKind::Device),
            EdgeLabel::UsedIp => (NodeKind::Transaction, NodeKind::IpAddress),
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeLabel {
    type Err = FraudGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| FraudGraphError::QueryInput(format!("unknown edge label: {s}")))
    }
}

/// Traversal direction relative to an edge's definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow `from -> to`.
    Forward,
    /// Follow `to -> from` ("who points at me").
    Reverse,
}

/// A directed labeled edge between two handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: Handle,
    pub label: EdgeLabel,
    pub to: Handle,
}

impl Edge {
    #[must_use]
    pub const fn new(from: Handle, label: EdgeLabel, to: Handle) -> Self {
        Self { from, label, to }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.label, self.to)
    }
}

// =============================================================================
// NODE RECORDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserAttrs {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address_hash: String,
    pub risk_score: f64,
    pub is_flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountAttrs {
    pub balance: f64,
    pub risk_score: f64,
    pub is_flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceAttrs {
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IpAttrs {
    pub reputation: i64,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentAttrs {
    pub doc_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionAttrs {
    pub amount: f64,
    /// Source timestamp, kept verbatim.
    pub timestamp: String,
    pub tx_type: String,
    pub location: Option<GeoPoint>,
}

/// Per-kind attribute record. The variant determines the node's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeAttributes {
    User(UserAttrs),
    Account(AccountAttrs),
    Device(DeviceAttrs),
    IpAddress(IpAttrs),
    Document(DocumentAttrs),
    Transaction(TransactionAttrs),
}

impl NodeAttributes {
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            NodeAttributes::User(_) => NodeKind::User,
            NodeAttributes::Account(_) => NodeKind::Account,
            NodeAttributes::Device(_) => NodeKind::Device,
            NodeAttributes::IpAddress(_) => NodeKind::IpAddress,
            NodeAttributes::Document(_) => NodeKind::Document,
            NodeAttributes::Transaction(_) => NodeKind::Transaction,
        }
    }

    /// Read a non-key attribute by name. Absent optional values yield `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AttrValue> {
        match (self, name) {
            (NodeAttributes::User(u), "name") => Some(AttrValue::Text(u.name.clone())),
            (NodeAttributes::User(u), "email") => Some(AttrValue::Text(u.email.clone())),
            (NodeAttributes::User(u), "phone") => Some(AttrValue::Text(u.phone.clone())),
            (NodeAttributes::User(u), "address_hash") => {
                Some(AttrValue::Text(u.address_hash.clone()))
            }
            (NodeAttributes::User(u), "risk_score") => Some(AttrValue::Float(u.risk_score)),
            (NodeAttributes::User(u), "is_flagged") => Some(AttrValue::Bool(u.is_flagged)),
            (NodeAttributes::Account(a), "balance") => Some(AttrValue::Float(a.balance)),
            (NodeAttributes::Account(a), "risk_score") => Some(AttrValue::Float(a.risk_score)),
            (NodeAttributes::Account(a), "is_flagged") => Some(AttrValue::Bool(a.is_flagged)),
            (NodeAttributes::Device(d), "location") => d.location.map(AttrValue::Geo),
            (NodeAttributes::IpAddress(i), "reputation") => Some(AttrValue::Int(i.reputation)),
            (NodeAttributes::IpAddress(i), "location") => i.location.map(AttrValue::Geo),
            (NodeAttributes::Document(d), "doc_type") => Some(AttrValue::Text(d.doc_type.clone())),
            (NodeAttributes::Transaction(t), "amount") => Some(AttrValue::Float(t.amount)),
            (NodeAttributes::Transaction(t), "timestamp") => {
                Some(AttrValue::Text(t.timestamp.clone()))
            }
            (NodeAttributes::Transaction(t), "tx_type") => Some(AttrValue::Text(t.tx_type.clone())),
            (NodeAttributes::Transaction(t), "location") => t.location.map(AttrValue::Geo),
            _ => None,
        }
    }
}

/// A typed node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub handle: Handle,
    /// External source key (trimmed).
    pub key: String,
    pub attributes: NodeAttributes,
}

impl Node {
    #[must_use]
    pub fn new(handle: Handle, key: impl Into<String>, attributes: NodeAttributes) -> Self {
        Self {
            handle,
            key: key.into(),
            attributes,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.attributes.kind()
    }

    /// Read an attribute by name; the kind's key column yields the external key.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        if name == self.kind().key_column() {
            return Some(AttrValue::Text(self.key.clone()));
        }
        self.attributes.get(name)
    }
}

// =============================================================================
// ATTRIBUTE VALUES & PREDICATES
// =============================================================================

/// A single attribute value read from a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    Text(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Geo(GeoPoint),
}

impl AttrValue {
    /// Numeric view of the value. Non-finite floats are treated as malformed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) if v.is_finite() => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Exact-match or range predicate for attribute scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrPredicate {
    Equals(AttrValue),
    AtMost(f64),
    AtLeast(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
}

impl AttrPredicate {
    /// Evaluate against a value.
    ///
    /// Returns `None` when the value cannot be compared (type mismatch,
    /// non-finite number, invalid geo-point). Callers treat that as a defect.
    #[must_use]
    pub fn evaluate(&self, value: &AttrValue) -> Option<bool> {
        match self {
            AttrPredicate::Equals(expected) => match (expected, value) {
                (AttrValue::Text(a), AttrValue::Text(b)) => Some(a == b),
                (AttrValue::Bool(a), AttrValue::Bool(b)) => Some(a == b),
                (AttrValue::Geo(a), AttrValue::Geo(b)) => b.is_valid().then_some(a == b),
                (a, b) => {
                    let (a, b) = (a.as_f64()?, b.as_f64()?);
                    Some(a == b)
                }
            },
            AttrPredicate::AtMost(max) => value.as_f64().map(|v| v <= *max),
            AttrPredicate::AtLeast(min) => value.as_f64().map(|v| v >= *min),
            AttrPredicate::Between(lo, hi) => value.as_f64().map(|v| *lo <= v && v <= *hi),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// A row that could not be converted into a typed record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column '{column}': {reason}")]
pub struct TransformError {
    pub column: String,
    pub reason: String,
}

impl TransformError {
    #[must_use]
    pub fn new(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur in the fraud graph.
///
/// - No silent failures
/// - Use `Result<T, FraudGraphError>` for fallible operations
/// - Per-row problems are aggregated by the loader instead of raised
#[derive(Debug, Error)]
pub enum FraudGraphError {
    /// An external key has no node of the requested kind.
    #[error("no {kind} with key {key:?}")]
    ResolutionMiss { kind: NodeKind, key: String },

    /// A source row failed type conversion.
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    /// The store could not commit a batch; nothing from it is visible.
    #[error("batch commit failed: {0}")]
    BatchCommit(String),

    /// Malformed query parameters.
    #[error("invalid query input: {0}")]
    QueryInput(String),

    /// An edge endpoint has the wrong kind for its label.
    #[error("{label} expects a {expected} at {handle}, found {found}")]
    SchemaMismatch {
        label: EdgeLabel,
        handle: Handle,
        expected: NodeKind,
        found: NodeKind,
    },

    /// An edge references a handle with no node.
    #[error("dangling edge: {0}")]
    DanglingEdge(Edge),

    /// A node record disagrees with what the store already holds for its handle or key.
    #[error("conflicting node record: {0}")]
    Conflict(String),

    #[error("node not found: {0}")]
    NodeNotFound(Handle),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl FraudGraphError {
    /// Whether retrying the same operation unchanged could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            FraudGraphError::BatchCommit(_) | FraudGraphError::IoError(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_code(kind.code()), Some(kind));
            assert_eq!(NodeKind::ALL[kind.index()], kind);
        }
        for label in EdgeLabel::ALL {
            assert_eq!(EdgeLabel::from_code(label.code()), Some(label));
            assert_eq!(label.as_str().parse::<EdgeLabel>().ok(), Some(label));
        }
        assert_eq!(NodeKind::from_code(0), None);
        assert_eq!(EdgeLabel::from_code(42), None);
    }

    #[test]
    fn flow_labels_start_at_transactions() {
        for label in [
            EdgeLabel::FromAccount,
            EdgeLabel::ToAccount,
            EdgeLabel::UsedDevice,
            EdgeLabel::UsedIp,
        ] {
            assert_eq!(label.endpoints().0, NodeKind::Transaction);
        }
        assert_eq!(
            EdgeLabel::HasIp.endpoints(),
            (NodeKind::Device, NodeKind::IpAddress)
        );
    }

    #[test]
    fn key_column_reads_external_key() {
        let node = Node::new(
            Handle(7),
            "D-1",
            NodeAttributes::Device(DeviceAttrs::default()),
        );
        assert_eq!(
            node.attribute("device_id"),
            Some(AttrValue::Text("D-1".to_string()))
        );
        assert_eq!(node.attribute("location"), None);
        assert_eq!(node.attribute("balance"), None);
    }

    #[test]
    fn every_listed_attribute_is_readable() {
        let user = Node::new(Handle(1), "U", NodeAttributes::User(UserAttrs::default()));
        for name in NodeKind::User.attributes() {
            assert!(user.attribute(name).is_some(), "{name}");
        }
    }

    #[test]
    fn predicates_compare_numbers() {
        assert_eq!(AttrPredicate::AtMost(100.0).evaluate(&AttrValue::Float(50.0)), Some(true));
        assert_eq!(AttrPredicate::AtLeast(100.0).evaluate(&AttrValue::Float(50.0)), Some(false));
        assert_eq!(AttrPredicate::Between(1.0, 3.0).evaluate(&AttrValue::Int(3)), Some(true));
        assert_eq!(
            AttrPredicate::Equals(AttrValue::Int(60)).evaluate(&AttrValue::Float(60.0)),
            Some(true)
        );
    }

    #[test]
    fn predicates_flag_malformed_values() {
        assert_eq!(AttrPredicate::AtMost(1.0).evaluate(&AttrValue::Float(f64::NAN)), None);
        assert_eq!(
            AttrPredicate::AtMost(1.0).evaluate(&AttrValue::Text("x".to_string())),
            None
        );
        assert_eq!(
            AttrPredicate::Equals(AttrValue::Text("a".to_string())).evaluate(&AttrValue::Bool(true)),
            None
        );
    }

    #[test]
    fn kind_parsing_accepts_aliases() {
        assert_eq!("IP".parse::<NodeKind>().ok(), Some(NodeKind::IpAddress));
        assert_eq!("tx".parse::<NodeKind>().ok(), Some(NodeKind::Transaction));
        assert!("planet".parse::<NodeKind>().is_err());
    }

    #[test]
    fn transient_errors() {
        assert!(FraudGraphError::IoError("disk".into()).is_transient());
        assert!(!FraudGraphError::QueryInput("x".into()).is_transient());
    }
}
