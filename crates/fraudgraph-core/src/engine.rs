//! # Query Engine
//!
//! Executes [`Query`] shapes against a read-only view.
//!
//! Each shape is a free function over any [`GraphRead`], so callers that
//! already hold a view can run several queries against the same state.
//! [`QueryEngine`] opens one view per call and drops it on return.
//!
//! Unresolved keys produce empty results. Scanned nodes with malformed
//! attributes are skipped with a warning.

use crate::geo::GeoPoint;
use crate::graph::{GraphRead, GraphStore};
use crate::primitives::RISKY_IP_REPUTATION;
use crate::query::{
    AccountRef, DeviceRef, DocumentRef, FraudRing, FromNode, GeoHit, GhostAccount, IpRef,
    LaunderingHit, MoneyTrail, OwnedAccount, Query, QueryResult, RingMember, RiskContext,
    RiskSummary, SharedDevice, SharedDocument, TrailEntity, TrailNode, TrailStep, TransactionRef,
    UserRef,
};
use crate::{AttrPredicate, Direction, EdgeLabel, FraudGraphError, Handle, NodeKind};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Edges a money trail follows from each reached node.
///
/// From an account: transactions it paid into (reverse `from_account`).
/// From a transaction: the account it paid (forward `to_account`).
const TRAIL_EDGES: [(EdgeLabel, Direction); 2] = [
    (EdgeLabel::ToAccount, Direction::Forward),
    (EdgeLabel::FromAccount, Direction::Reverse),
];

// =============================================================================
// QUERY ENGINE
// =============================================================================

/// Stateless executor bound to a store.
pub struct QueryEngine<'s, S: GraphStore> {
    store: &'s S,
}

impl<'s, S: GraphStore> QueryEngine<'s, S> {
    #[must_use]
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Validate and run a query against the current committed state.
    pub fn execute(&self, query: &Query) -> Result<QueryResult, FraudGraphError> {
        execute(&self.store.view()?, query)
    }
}

/// Validate and run a query against an open view.
pub fn execute<V: GraphRead + ?Sized>(
    view: &V,
    query: &Query,
) -> Result<QueryResult, FraudGraphError> {
    query.validate()?;
    debug!(shape = query.shape(), "executing query");
    Ok(match query {
        Query::FraudRing { device_id } => QueryResult::FraudRing(fraud_ring(view, device_id)?),
        Query::Laundering { min_amount } => {
            QueryResult::Laundering(laundering(view, *min_amount)?)
        }
        Query::GhostAccounts {
            max_balance,
            min_activity,
        } => QueryResult::GhostAccounts(ghost_accounts(view, *max_balance, *min_activity)?),
        Query::IdentityTheft => QueryResult::IdentityTheft(identity_theft(view)?),
        Query::MoneyTrail { account_id, depth } => {
            QueryResult::MoneyTrail(money_trail(view, account_id, *depth)?)
        }
        Query::RiskContext { user_id } => QueryResult::RiskContext(risk_context(view, user_id)?),
        Query::GeoRadius {
            lat,
            lon,
            radius_km,
        } => QueryResult::GeoRadius(geo_radius(view, GeoPoint::new(*lat, *lon), *radius_km)?),
    })
}

// =============================================================================
// HELPERS
// =============================================================================

/// Fetch a node and project it. A missing node or wrong kind is skipped.
fn fetch<V: GraphRead + ?Sized, T: FromNode>(
    view: &V,
    handle: Handle,
) -> Result<Option<T>, FraudGraphError> {
    let Some(node) = view.node(handle)? else {
        warn!(%handle, "adjacency points at a missing node");
        return Ok(None);
    };
    let projected = T::from_node(&node);
    if projected.is_none() {
        warn!(%handle, kind = %node.kind(), "unexpected node kind in adjacency");
    }
    Ok(projected)
}

/// Project every neighbor of `handle` over `label`.
fn related<V: GraphRead + ?Sized, T: FromNode>(
    view: &V,
    handle: Handle,
    label: EdgeLabel,
    direction: Direction,
) -> Result<Vec<T>, FraudGraphError> {
    let mut out = Vec::new();
    for neighbor in view.neighbors(handle, label, direction)? {
        if let Some(item) = fetch(view, neighbor)? {
            out.push(item);
        }
    }
    Ok(out)
}

fn resolve_root<V: GraphRead + ?Sized>(
    view: &V,
    kind: NodeKind,
    key: &str,
) -> Result<Option<Handle>, FraudGraphError> {
    let handle = view.lookup_key(kind, key.trim())?;
    if handle.is_none() {
        debug!(%kind, key, "query key not found");
    }
    Ok(handle)
}

fn owned_accounts<V: GraphRead + ?Sized>(
    view: &V,
    tx: Handle,
    label: EdgeLabel,
) -> Result<Vec<OwnedAccount>, FraudGraphError> {
    related::<_, AccountRef>(view, tx, label, Direction::Forward)?
        .into_iter()
        .map(|account| {
            let owners = related(view, account.handle, EdgeLabel::OwnsAccount, Direction::Reverse)?;
            Ok(OwnedAccount { account, owners })
        })
        .collect()
}

// =============================================================================
// QUERY SHAPES
// =============================================================================

/// Users of a device (reverse `uses_device`), each with its known IPs.
pub fn fraud_ring<V: GraphRead + ?Sized>(
    view: &V,
    device_id: &str,
) -> Result<Option<FraudRing>, FraudGraphError> {
    let Some(handle) = resolve_root(view, NodeKind::Device, device_id)? else {
        return Ok(None);
    };
    let Some(device) = fetch::<_, DeviceRef>(view, handle)? else {
        return Ok(None);
    };

    let users = related::<_, UserRef>(view, handle, EdgeLabel::UsesDevice, Direction::Reverse)?
        .into_iter()
        .map(|user| {
            let ips = related(view, user.handle, EdgeLabel::KnownIps, Direction::Forward)?;
            Ok(RingMember { user, ips })
        })
        .collect::<Result<_, FraudGraphError>>()?;

    Ok(Some(FraudRing { device, users }))
}

/// Transactions with `amount >= min_amount`, joined to both accounts and
/// their owners. Results follow scan order.
pub fn laundering<V: GraphRead + ?Sized>(
    view: &V,
    min_amount: f64,
) -> Result<Vec<LaunderingHit>, FraudGraphError> {
    let hits = view.find_by_attribute(
        NodeKind::Transaction,
        "amount",
        &AttrPredicate::AtLeast(min_amount),
    )?;

    hits.iter()
        .filter_map(TransactionRef::from_node)
        .map(|transaction| {
            let source = owned_accounts(view, transaction.handle, EdgeLabel::FromAccount)?;
            let target = owned_accounts(view, transaction.handle, EdgeLabel::ToAccount)?;
            Ok(LaunderingHit {
                transaction,
                source,
                target,
            })
        })
        .collect()
}

/// Low-balance accounts with high transaction activity.
///
/// The balance filter runs in the store; the activity threshold is an
/// aggregate and runs here afterwards.
pub fn ghost_accounts<V: GraphRead + ?Sized>(
    view: &V,
    max_balance: f64,
    min_activity: usize,
) -> Result<Vec<GhostAccount>, FraudGraphError> {
    let candidates = view.find_by_attribute(
        NodeKind::Account,
        "balance",
        &AttrPredicate::AtMost(max_balance),
    )?;

    let mut out = Vec::new();
    for account in candidates.iter().filter_map(AccountRef::from_node) {
        let incoming =
            view.count_neighbors(account.handle, EdgeLabel::ToAccount, Direction::Reverse)?;
        let outgoing =
            view.count_neighbors(account.handle, EdgeLabel::FromAccount, Direction::Reverse)?;
        if incoming + outgoing >= min_activity {
            out.push(GhostAccount {
                account,
                incoming,
                outgoing,
            });
        }
    }
    Ok(out)
}

/// Documents held by more than one user.
pub fn identity_theft<V: GraphRead + ?Sized>(
    view: &V,
) -> Result<Vec<SharedDocument>, FraudGraphError> {
    let mut out = Vec::new();
    for node in view.scan(NodeKind::Document)? {
        if view.count_neighbors(node.handle, EdgeLabel::HasDocument, Direction::Reverse)? <= 1 {
            continue;
        }
        let Some(document) = DocumentRef::from_node(&node) else {
            continue;
        };
        let users = related(view, node.handle, EdgeLabel::HasDocument, Direction::Reverse)?;
        out.push(SharedDocument { document, users });
    }
    Ok(out)
}

/// Breadth-first money trail from an account, at most `depth` edges deep.
///
/// Each handle is expanded once; an edge into an already visited handle is
/// not recorded as a step.
pub fn money_trail<V: GraphRead + ?Sized>(
    view: &V,
    account_id: &str,
    depth: usize,
) -> Result<Option<MoneyTrail>, FraudGraphError> {
    let Some(root_handle) = resolve_root(view, NodeKind::Account, account_id)? else {
        return Ok(None);
    };
    let Some(root) = fetch::<_, AccountRef>(view, root_handle)? else {
        return Ok(None);
    };

    let mut visited = BTreeSet::from([root_handle]);
    let mut nodes = vec![TrailNode {
        depth: 0,
        entity: TrailEntity::Account(root.clone()),
    }];
    let mut steps = Vec::new();
    let mut frontier = vec![root_handle];

    for level in 1..=depth {
        let mut next = Vec::new();
        for &from in &frontier {
            for (label, direction) in TRAIL_EDGES {
                for to in view.neighbors(from, label, direction)? {
                    if !visited.insert(to) {
                        continue;
                    }
                    let Some(entity) = trail_entity(view, to)? else {
                        continue;
                    };
                    steps.push(TrailStep {
                        from,
                        label,
                        direction,
                        to,
                    });
                    nodes.push(TrailNode {
                        depth: level,
                        entity,
                    });
                    next.push(to);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(Some(MoneyTrail {
        root,
        depth,
        nodes,
        steps,
    }))
}

fn trail_entity<V: GraphRead + ?Sized>(
    view: &V,
    handle: Handle,
) -> Result<Option<TrailEntity>, FraudGraphError> {
    let Some(node) = view.node(handle)? else {
        warn!(%handle, "adjacency points at a missing node");
        return Ok(None);
    };
    Ok(AccountRef::from_node(&node)
        .map(TrailEntity::Account)
        .or_else(|| TransactionRef::from_node(&node).map(TrailEntity::Transaction)))
}

/// Two-hop neighbourhood of a user: shared devices with their other users,
/// plus the user's known IPs.
pub fn risk_context<V: GraphRead + ?Sized>(
    view: &V,
    user_id: &str,
) -> Result<Option<RiskContext>, FraudGraphError> {
    let Some(handle) = resolve_root(view, NodeKind::User, user_id)? else {
        return Ok(None);
    };
    let Some(user) = fetch::<_, UserRef>(view, handle)? else {
        return Ok(None);
    };

    let mut devices = Vec::new();
    for device in related::<_, DeviceRef>(view, handle, EdgeLabel::UsesDevice, Direction::Forward)? {
        let co_users = related::<_, UserRef>(
            view,
            device.handle,
            EdgeLabel::UsesDevice,
            Direction::Reverse,
        )?
        .into_iter()
        .filter(|u| u.handle != handle)
        .collect();
        devices.push(SharedDevice { device, co_users });
    }
    let ips: Vec<IpRef> = related(view, handle, EdgeLabel::KnownIps, Direction::Forward)?;

    let summary = summarize_risk(&user, &devices, &ips);
    Ok(Some(RiskContext {
        user,
        devices,
        ips,
        summary,
    }))
}

fn summarize_risk(user: &UserRef, devices: &[SharedDevice], ips: &[IpRef]) -> RiskSummary {
    let mut co_users: Vec<&UserRef> = devices.iter().flat_map(|d| &d.co_users).collect();
    co_users.sort_by_key(|u| u.handle);
    co_users.dedup_by_key(|u| u.handle);

    let max_co_user_risk = co_users
        .iter()
        .map(|u| u.risk_score)
        .filter(|r| r.is_finite())
        .reduce(f64::max);

    RiskSummary {
        own_risk: user.risk_score,
        max_co_user_risk,
        flagged_co_users: co_users.iter().filter(|u| u.is_flagged).count(),
        risky_ips: ips
            .iter()
            .filter(|ip| ip.reputation > RISKY_IP_REPUTATION)
            .count(),
    }
}

/// Transactions within `radius_km` of `center`, with the devices used.
pub fn geo_radius<V: GraphRead + ?Sized>(
    view: &V,
    center: GeoPoint,
    radius_km: f64,
) -> Result<Vec<GeoHit>, FraudGraphError> {
    let mut out = Vec::new();
    for node in view.scan(NodeKind::Transaction)? {
        let Some(transaction) = TransactionRef::from_node(&node) else {
            continue;
        };
        let Some(location) = transaction.location else {
            continue;
        };
        if !location.is_valid() {
            warn!(handle = %node.handle, key = %node.key, "skipping transaction with invalid location");
            continue;
        }
        let distance_km = center.distance_km(&location);
        if distance_km > radius_km {
            continue;
        }
        let devices = related(view, node.handle, EdgeLabel::UsedDevice, Direction::Forward)?;
        out.push(GeoHit {
            transaction,
            distance_km,
            devices,
        });
    }
    Ok(out)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::graph::{Graph, MemoryStore};
    use crate::{
        AccountAttrs, DeviceAttrs, DocumentAttrs, Edge, IpAttrs, Node, NodeAttributes,
        TransactionAttrs, UserAttrs,
    };

    struct Fixture {
        batch: Batch,
        next: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                batch: Batch::new(),
                next: 0,
            }
        }

        fn node(&mut self, key: &str, attributes: NodeAttributes) -> Handle {
            let handle = Handle(self.next);
            self.next += 1;
            self.batch.push_node(Node::new(handle, key, attributes));
            handle
        }

        fn user(&mut self, key: &str, risk: f64, flagged: bool) -> Handle {
            self.node(
                key,
                NodeAttributes::User(UserAttrs {
                    name: key.to_lowercase(),
                    risk_score: risk,
                    is_flagged: flagged,
                    ..UserAttrs::default()
                }),
            )
        }

        fn account(&mut self, key: &str, balance: f64) -> Handle {
            self.node(
                key,
                NodeAttributes::Account(AccountAttrs {
                    balance,
                    ..AccountAttrs::default()
                }),
            )
        }

        fn tx(&mut self, key: &str, amount: f64, location: Option<GeoPoint>) -> Handle {
            self.node(
                key,
                NodeAttributes::Transaction(TransactionAttrs {
                    amount,
                    location,
                    ..TransactionAttrs::default()
                }),
            )
        }

        fn edge(&mut self, from: Handle, label: EdgeLabel, to: Handle) {
            self.batch.push_edge(Edge::new(from, label, to));
        }

        fn transfer(&mut self, key: &str, amount: f64, from: Handle, to: Handle) -> Handle {
            let tx = self.tx(key, amount, None);
            self.edge(tx, EdgeLabel::FromAccount, from);
            self.edge(tx, EdgeLabel::ToAccount, to);
            tx
        }

        fn build(self) -> Graph {
            let mut graph = Graph::new();
            graph.apply(&self.batch).expect("fixture batch");
            graph
        }
    }

    #[test]
    fn fraud_ring_collects_users_and_ips() {
        let mut f = Fixture::new();
        let device = f.node("D1", NodeAttributes::Device(DeviceAttrs::default()));
        let u1 = f.user("U1", 0.1, false);
        let u2 = f.user("U2", 0.9, true);
        let ip = f.node(
            "10.0.0.1",
            NodeAttributes::IpAddress(IpAttrs {
                reputation: 80,
                location: None,
            }),
        );
        f.edge(u1, EdgeLabel::UsesDevice, device);
        f.edge(u2, EdgeLabel::UsesDevice, device);
        f.edge(u2, EdgeLabel::KnownIps, ip);
        let graph = f.build();

        let ring = fraud_ring(&graph, "D1").expect("query").expect("ring");
        assert_eq!(ring.device.device_id, "D1");
        let keys: Vec<_> = ring.users.iter().map(|m| m.user.user_id.as_str()).collect();
        assert_eq!(keys, ["U1", "U2"]);
        assert!(ring.users[0].ips.is_empty());
        assert_eq!(ring.users[1].ips[0].ip_addr, "10.0.0.1");

        assert_eq!(fraud_ring(&graph, "D404").expect("query"), None);
    }

    #[test]
    fn laundering_joins_accounts_and_owners() {
        let mut f = Fixture::new();
        let owner = f.user("U1", 0.0, false);
        let a = f.account("A1", 10.0);
        let b = f.account("A2", 20.0);
        f.edge(owner, EdgeLabel::OwnsAccount, a);
        f.transfer("T1", 5_000.0, a, b);
        f.transfer("T2", 50.0, a, b);
        let graph = f.build();

        let hits = laundering(&graph, 1_000.0).expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].transaction.tx_id, "T1");
        assert_eq!(hits[0].source[0].account.account_id, "A1");
        assert_eq!(hits[0].source[0].owners[0].user_id, "U1");
        assert_eq!(hits[0].target[0].account.account_id, "A2");
        assert!(hits[0].target[0].owners.is_empty());
    }

    #[test]
    fn ghost_accounts_two_stage_filter() {
        let mut f = Fixture::new();
        let busy = f.account("X", 50.0);
        let quiet = f.account("Y", 50.0);
        let rich = f.account("Z", 5_000.0);
        let other = f.account("O", 1_000.0);
        f.transfer("T1", 1.0, busy, other);
        f.transfer("T2", 1.0, other, busy);
        f.transfer("T3", 1.0, busy, rich);
        f.transfer("T4", 1.0, quiet, rich);
        let graph = f.build();

        let ghosts = ghost_accounts(&graph, 100.0, 2).expect("query");
        assert_eq!(ghosts.len(), 1);
        assert_eq!(ghosts[0].account.account_id, "X");
        assert_eq!(ghosts[0].incoming, 1);
        assert_eq!(ghosts[0].outgoing, 2);
        assert_eq!(ghosts[0].activity(), 3);
    }

    #[test]
    fn identity_theft_needs_two_holders() {
        let mut f = Fixture::new();
        let shared = f.node(
            "DOC1",
            NodeAttributes::Document(DocumentAttrs {
                doc_type: "passport".into(),
            }),
        );
        let single = f.node("DOC2", NodeAttributes::Document(DocumentAttrs::default()));
        let u1 = f.user("U1", 0.0, false);
        let u2 = f.user("U2", 0.0, false);
        f.edge(u1, EdgeLabel::HasDocument, shared);
        f.edge(u2, EdgeLabel::HasDocument, shared);
        f.edge(u1, EdgeLabel::HasDocument, single);
        let graph = f.build();

        let docs = identity_theft(&graph).expect("query");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.document_id, "DOC1");
        assert_eq!(docs[0].users.len(), 2);
    }

    #[test]
    fn money_trail_stops_on_cycles() {
        let mut f = Fixture::new();
        let a = f.account("A", 0.0);
        let b = f.account("B", 0.0);
        let c = f.account("C", 0.0);
        f.transfer("T1", 1.0, a, b);
        f.transfer("T2", 1.0, b, c);
        f.transfer("T3", 1.0, c, a);
        let graph = f.build();

        let trail = money_trail(&graph, "A", 3).expect("query").expect("trail");
        let handles: Vec<_> = trail.nodes.iter().map(|n| n.entity.handle()).collect();
        let unique: BTreeSet<_> = handles.iter().copied().collect();
        assert_eq!(handles.len(), unique.len());
        assert!(trail.reached_depth() <= 3);
        assert_eq!(trail.steps.len(), trail.nodes.len() - 1);

        // A -> T1 -> B -> T2: depth 3 stops before C.
        let keys: Vec<_> = trail
            .nodes
            .iter()
            .map(|n| match &n.entity {
                TrailEntity::Account(a) => a.account_id.clone(),
                TrailEntity::Transaction(t) => t.tx_id.clone(),
            })
            .collect();
        assert_eq!(keys, ["A", "T1", "B", "T2"]);
    }

    #[test]
    fn money_trail_depth_one() {
        let mut f = Fixture::new();
        let a = f.account("A", 0.0);
        let b = f.account("B", 0.0);
        f.transfer("T1", 1.0, a, b);
        let graph = f.build();

        let trail = money_trail(&graph, "A", 1).expect("query").expect("trail");
        assert_eq!(trail.nodes.len(), 2);
        assert_eq!(trail.steps[0].label, EdgeLabel::FromAccount);
        assert_eq!(trail.steps[0].direction, Direction::Reverse);
        assert_eq!(money_trail(&graph, "nope", 3).expect("query"), None);
    }

    #[test]
    fn risk_context_excludes_origin() {
        let mut f = Fixture::new();
        let me = f.user("U1", 0.2, false);
        let peer = f.user("U2", 0.8, true);
        let device = f.node("D1", NodeAttributes::Device(DeviceAttrs::default()));
        let bad_ip = f.node(
            "1.1.1.1",
            NodeAttributes::IpAddress(IpAttrs {
                reputation: 90,
                location: None,
            }),
        );
        let ok_ip = f.node(
            "2.2.2.2",
            NodeAttributes::IpAddress(IpAttrs {
                reputation: 50,
                location: None,
            }),
        );
        f.edge(me, EdgeLabel::UsesDevice, device);
        f.edge(peer, EdgeLabel::UsesDevice, device);
        f.edge(me, EdgeLabel::KnownIps, bad_ip);
        f.edge(me, EdgeLabel::KnownIps, ok_ip);
        let graph = f.build();

        let ctx = risk_context(&graph, "U1").expect("query").expect("context");
        assert_eq!(ctx.devices.len(), 1);
        assert_eq!(ctx.devices[0].co_users.len(), 1);
        assert_eq!(ctx.devices[0].co_users[0].user_id, "U2");
        assert_eq!(ctx.summary.max_co_user_risk, Some(0.8));
        assert_eq!(ctx.summary.flagged_co_users, 1);
        assert_eq!(ctx.summary.risky_ips, 1);
    }

    #[test]
    fn geo_radius_filters_by_distance() {
        let center = GeoPoint::new(40.4168, -3.7038);
        let mut f = Fixture::new();
        let here = f.tx("T1", 1.0, Some(center));
        let _far = f.tx("T2", 1.0, Some(GeoPoint::new(48.8566, 2.3522)));
        let _nowhere = f.tx("T3", 1.0, None);
        let _broken = f.tx("T4", 1.0, Some(GeoPoint::new(f64::NAN, 0.0)));
        let device = f.node("D1", NodeAttributes::Device(DeviceAttrs::default()));
        f.edge(here, EdgeLabel::UsedDevice, device);
        let graph = f.build();

        let hits = geo_radius(&graph, center, 0.1).expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].transaction.tx_id, "T1");
        assert!(hits[0].distance_km < 1e-9);
        assert_eq!(hits[0].devices[0].device_id, "D1");

        assert!(geo_radius(&graph, center, 50.0).expect("query").len() == 1);
    }

    #[test]
    fn engine_validates_before_reading() {
        let store = MemoryStore::new();
        let engine = QueryEngine::new(&store);
        assert!(matches!(
            engine.execute(&Query::Laundering {
                min_amount: f64::NAN
            }),
            Err(FraudGraphError::QueryInput(_))
        ));
        let result = engine.execute(&Query::fraud_ring("D1")).expect("query");
        assert!(result.is_empty());
    }
}
