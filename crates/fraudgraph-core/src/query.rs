//! # Query Module
//!
//! The seven fraud-pattern query shapes and their structured results.
//!
//! - Queries are typed values, validated before execution
//! - Results carry typed node references, never formatted text
//! - An empty result means "no match"; errors are reserved for bad input

use crate::geo::GeoPoint;
use crate::primitives::MAX_TRAIL_DEPTH;
use crate::{Direction, EdgeLabel, FraudGraphError, Handle, Node, NodeAttributes};
use serde::{Deserialize, Serialize};

// =============================================================================
// QUERIES
// =============================================================================

fn default_trail_depth() -> usize {
    MAX_TRAIL_DEPTH
}

/// One fraud-pattern query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Query {
    /// Users sharing a device, with the IPs each of them is known from.
    FraudRing { device_id: String },

    /// Transactions of at least `min_amount`, with both accounts and their owners.
    Laundering { min_amount: f64 },

    /// Accounts with `balance <= max_balance` and at least `min_activity`
    /// transactions in or out.
    GhostAccounts {
        max_balance: f64,
        min_activity: usize,
    },

    /// Documents linked to more than one user.
    IdentityTheft,

    /// Where money went from an account, bounded by depth.
    MoneyTrail {
        account_id: String,
        #[serde(default = "default_trail_depth")]
        depth: usize,
    },

    /// A user's shared devices, co-users and known IPs.
    RiskContext { user_id: String },

    /// Transactions within `radius_km` of a point.
    GeoRadius { lat: f64, lon: f64, radius_km: f64 },
}

impl Query {
    #[must_use]
    pub fn fraud_ring(device_id: impl Into<String>) -> Self {
        Self::FraudRing {
            device_id: device_id.into(),
        }
    }

    #[must_use]
    pub fn money_trail(account_id: impl Into<String>) -> Self {
        Self::MoneyTrail {
            account_id: account_id.into(),
            depth: MAX_TRAIL_DEPTH,
        }
    }

    #[must_use]
    pub fn risk_context(user_id: impl Into<String>) -> Self {
        Self::RiskContext {
            user_id: user_id.into(),
        }
    }

    /// Short name of the shape, as used in the JSON tag.
    #[must_use]
    pub const fn shape(&self) -> &'static str {
        match self {
            Query::FraudRing { .. } => "fraud_ring",
            Query::Laundering { .. } => "laundering",
            Query::GhostAccounts { .. } => "ghost_accounts",
            Query::IdentityTheft => "identity_theft",
            Query::MoneyTrail { .. } => "money_trail",
            Query::RiskContext { .. } => "risk_context",
            Query::GeoRadius { .. } => "geo_radius",
        }
    }

    /// Reject malformed parameters before touching the store.
    pub fn validate(&self) -> Result<(), FraudGraphError> {
        match self {
            Query::FraudRing { device_id: key }
            | Query::RiskContext { user_id: key } => require_key(key),
            Query::Laundering { min_amount } => require_finite("min_amount", *min_amount),
            Query::GhostAccounts { max_balance, .. } => {
                require_finite("max_balance", *max_balance)
            }
            Query::IdentityTheft => Ok(()),
            Query::MoneyTrail { account_id, depth } => {
                require_key(account_id)?;
                if !(1..=MAX_TRAIL_DEPTH).contains(depth) {
                    return Err(FraudGraphError::QueryInput(format!(
                        "depth must be between 1 and {MAX_TRAIL_DEPTH}, got {depth}"
                    )));
                }
                Ok(())
            }
            Query::GeoRadius {
                lat,
                lon,
                radius_km,
            } => {
                if !GeoPoint::new(*lat, *lon).is_valid() {
                    return Err(FraudGraphError::QueryInput(format!(
                        "invalid centre ({lat}, {lon})"
                    )));
                }
                require_finite("radius_km", *radius_km)?;
                if *radius_km < 0.0 {
                    return Err(FraudGraphError::QueryInput(
                        "radius_km must not be negative".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn require_key(key: &str) -> Result<(), FraudGraphError> {
    if key.trim().is_empty() {
        return Err(FraudGraphError::QueryInput("empty key".to_string()));
    }
    Ok(())
}

fn require_finite(name: &str, value: f64) -> Result<(), FraudGraphError> {
    if !value.is_finite() {
        return Err(FraudGraphError::QueryInput(format!(
            "{name} must be a finite number"
        )));
    }
    Ok(())
}

// =============================================================================
// NODE REFERENCES
// =============================================================================

/// Typed projection of a node record into a result row.
pub(crate) trait FromNode: Sized {
    fn from_node(node: &Node) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub handle: Handle,
    pub user_id: String,
    pub name: String,
    pub risk_score: f64,
    pub is_flagged: bool,
}

impl FromNode for UserRef {
    fn from_node(node: &Node) -> Option<Self> {
        let NodeAttributes::User(u) = &node.attributes else {
            return None;
        };
        Some(Self {
            handle: node.handle,
            user_id: node.key.clone(),
            name: u.name.clone(),
            risk_score: u.risk_score,
            is_flagged: u.is_flagged,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRef {
    pub handle: Handle,
    pub account_id: String,
    pub balance: f64,
    pub risk_score: f64,
    pub is_flagged: bool,
}

impl FromNode for AccountRef {
    fn from_node(node: &Node) -> Option<Self> {
        let NodeAttributes::Account(a) = &node.attributes else {
            return None;
        };
        Some(Self {
            handle: node.handle,
            account_id: node.key.clone(),
            balance: a.balance,
            risk_score: a.risk_score,
            is_flagged: a.is_flagged,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub handle: Handle,
    pub device_id: String,
    pub location: Option<GeoPoint>,
}

impl FromNode for DeviceRef {
    fn from_node(node: &Node) -> Option<Self> {
        let NodeAttributes::Device(d) = &node.attributes else {
            return None;
        };
        Some(Self {
            handle: node.handle,
            device_id: node.key.clone(),
            location: d.location,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRef {
    pub handle: Handle,
    pub ip_addr: String,
    pub reputation: i64,
}

impl FromNode for IpRef {
    fn from_node(node: &Node) -> Option<Self> {
        let NodeAttributes::IpAddress(ip) = &node.attributes else {
            return None;
        };
        Some(Self {
            handle: node.handle,
            ip_addr: node.key.clone(),
            reputation: ip.reputation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub handle: Handle,
    pub document_id: String,
    pub doc_type: String,
}

impl FromNode for DocumentRef {
    fn from_node(node: &Node) -> Option<Self> {
        let NodeAttributes::Document(d) = &node.attributes else {
            return None;
        };
        Some(Self {
            handle: node.handle,
            document_id: node.key.clone(),
            doc_type: d.doc_type.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub handle: Handle,
    pub tx_id: String,
    pub amount: f64,
    pub timestamp: String,
    pub tx_type: String,
    pub location: Option<GeoPoint>,
}

impl FromNode for TransactionRef {
    fn from_node(node: &Node) -> Option<Self> {
        let NodeAttributes::Transaction(t) = &node.attributes else {
            return None;
        };
        Some(Self {
            handle: node.handle,
            tx_id: node.key.clone(),
            amount: t.amount,
            timestamp: t.timestamp.clone(),
            tx_type: t.tx_type.clone(),
            location: t.location,
        })
    }
}

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingMember {
    pub user: UserRef,
    pub ips: Vec<IpRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRing {
    pub device: DeviceRef,
    pub users: Vec<RingMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedAccount {
    pub account: AccountRef,
    pub owners: Vec<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunderingHit {
    pub transaction: TransactionRef,
    pub source: Vec<OwnedAccount>,
    pub target: Vec<OwnedAccount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostAccount {
    pub account: AccountRef,
    /// Transactions paying into the account.
    pub incoming: usize,
    /// Transactions paying out of the account.
    pub outgoing: usize,
}

impl GhostAccount {
    #[must_use]
    pub fn activity(&self) -> usize {
        self.incoming + self.outgoing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedDocument {
    pub document: DocumentRef,
    pub users: Vec<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrailEntity {
    Account(AccountRef),
    Transaction(TransactionRef),
}

impl TrailEntity {
    #[must_use]
    pub fn handle(&self) -> Handle {
        match self {
            TrailEntity::Account(a) => a.handle,
            TrailEntity::Transaction(t) => t.handle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailNode {
    /// Edges between the root and this node.
    pub depth: usize,
    pub entity: TrailEntity,
}

/// One traversed edge of a money trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailStep {
    pub from: Handle,
    pub label: EdgeLabel,
    pub direction: Direction,
    pub to: Handle,
}

/// Breadth-first tree of everything reachable from the root within `depth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyTrail {
    pub root: AccountRef,
    pub depth: usize,
    /// Every reached node once, in visiting order; the root first at depth 0.
    pub nodes: Vec<TrailNode>,
    pub steps: Vec<TrailStep>,
}

impl MoneyTrail {
    /// Deepest level actually reached.
    #[must_use]
    pub fn reached_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedDevice {
    pub device: DeviceRef,
    /// Other users of the device, origin user excluded.
    pub co_users: Vec<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub own_risk: f64,
    pub max_co_user_risk: Option<f64>,
    pub flagged_co_users: usize,
    /// Known IPs whose reputation exceeds the risky threshold.
    pub risky_ips: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContext {
    pub user: UserRef,
    pub devices: Vec<SharedDevice>,
    pub ips: Vec<IpRef>,
    pub summary: RiskSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoHit {
    pub transaction: TransactionRef,
    pub distance_km: f64,
    pub devices: Vec<DeviceRef>,
}

/// Result of [`Query`] execution, one variant per shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "result", rename_all = "snake_case")]
pub enum QueryResult {
    FraudRing(Option<FraudRing>),
    Laundering(Vec<LaunderingHit>),
    GhostAccounts(Vec<GhostAccount>),
    IdentityTheft(Vec<SharedDocument>),
    MoneyTrail(Option<MoneyTrail>),
    RiskContext(Option<RiskContext>),
    GeoRadius(Vec<GeoHit>),
}

impl QueryResult {
    /// `true` when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            QueryResult::FraudRing(r) => r.is_none(),
            QueryResult::Laundering(v) => v.is_empty(),
            QueryResult::GhostAccounts(v) => v.is_empty(),
            QueryResult::IdentityTheft(v) => v.is_empty(),
            QueryResult::MoneyTrail(t) => t.is_none(),
            QueryResult::RiskContext(r) => r.is_none(),
            QueryResult::GeoRadius(v) => v.is_empty(),
        }
    }

    /// Number of top-level records.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            QueryResult::FraudRing(r) => usize::from(r.is_some()),
            QueryResult::Laundering(v) => v.len(),
            QueryResult::GhostAccounts(v) => v.len(),
            QueryResult::IdentityTheft(v) => v.len(),
            QueryResult::MoneyTrail(t) => usize::from(t.is_some()),
            QueryResult::RiskContext(r) => usize::from(r.is_some()),
            QueryResult::GeoRadius(v) => v.len(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
