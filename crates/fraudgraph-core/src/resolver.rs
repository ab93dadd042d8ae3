//! # Identifier Resolver
//!
//! Converts external source keys into internal handles. This is the only
//! place that allocates handles.
//!
//! - `resolve` allocates on first sight and is idempotent afterwards.
//! - `lookup` never allocates; edge loading uses it exclusively.
//!
//! Each node kind has its own map behind its own lock, so different kinds
//! resolve concurrently while inserts within one kind are serialized.

use crate::graph::GraphRead;
use crate::primitives::MAX_KEY_LENGTH;
use crate::{FraudGraphError, Handle, NodeKind, TransformError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of [`Resolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub handle: Handle,
    /// `true` when this call allocated the handle.
    pub fresh: bool,
}

/// Per-kind `external key -> handle` maps plus a shared handle allocator.
#[derive(Debug)]
pub struct Resolver {
    maps: [Mutex<BTreeMap<String, Handle>>; 6],
    next: AtomicU64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn starting_at(next: u64) -> Self {
        Self {
            maps: std::array::from_fn(|_| Mutex::new(BTreeMap::new())),
            next: AtomicU64::new(next),
        }
    }

    /// Rebuild the maps from a store's key index.
    ///
    /// Loading the same rows into an existing graph then resolves to the
    /// handles already committed, and new handles never collide with them.
    pub fn seeded<V: GraphRead + ?Sized>(view: &V) -> Result<Self, FraudGraphError> {
        let resolver = Self::starting_at(view.next_handle()?);
        for kind in NodeKind::ALL {
            let keys = view.keys(kind)?;
            resolver.maps[kind.index()].lock().extend(keys);
        }
        Ok(resolver)
    }

    /// Resolve-or-allocate the handle for `(kind, key)`.
    pub fn resolve(&self, kind: NodeKind, key: &str) -> Resolution {
        let mut map = self.maps[kind.index()].lock();
        if let Some(&handle) = map.get(key) {
            return Resolution {
                handle,
                fresh: false,
            };
        }
        let handle = Handle(self.next.fetch_add(1, Ordering::Relaxed));
        map.insert(key.to_string(), handle);
        Resolution {
            handle,
            fresh: true,
        }
    }

    /// Non-allocating lookup.
    pub fn lookup(&self, kind: NodeKind, key: &str) -> Result<Handle, FraudGraphError> {
        self.maps[kind.index()]
            .lock()
            .get(key)
            .copied()
            .ok_or_else(|| FraudGraphError::ResolutionMiss {
                kind,
                key: key.to_string(),
            })
    }

    /// Forget keys whose nodes never committed.
    ///
    /// Their handles are not reused; the allocator only moves forward.
    pub fn release<'k>(&self, kind: NodeKind, keys: impl IntoIterator<Item = &'k str>) {
        let mut map = self.maps[kind.index()].lock();
        for key in keys {
            map.remove(key);
        }
    }

    #[must_use]
    pub fn len(&self, kind: NodeKind) -> usize {
        self.maps[kind.index()].lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(|map| map.lock().is_empty())
    }
}

/// Trim an external key and check it is usable.
pub fn normalize_key<'a>(column: &str, raw: &'a str) -> Result<&'a str, TransformError> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(TransformError::new(column, "empty key"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(TransformError::new(
            column,
            format!("key longer than {MAX_KEY_LENGTH} bytes"),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::graph::{Graph, GraphStore, MemoryStore};
    use crate::{Node, NodeAttributes, UserAttrs};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn resolve_is_idempotent() {
        let resolver = Resolver::new();
        let first = resolver.resolve(NodeKind::User, "U1");
        let second = resolver.resolve(NodeKind::User, "U1");

        assert!(first.fresh);
        assert!(!second.fresh);
        assert_eq!(first.handle, second.handle);
    }

    #[test]
    fn kinds_have_separate_key_spaces() {
        let resolver = Resolver::new();
        let user = resolver.resolve(NodeKind::User, "X");
        let device = resolver.resolve(NodeKind::Device, "X");
        assert_ne!(user.handle, device.handle);
    }

    #[test]
    fn lookup_never_allocates() {
        let resolver = Resolver::new();
        assert!(matches!(
            resolver.lookup(NodeKind::Account, "A1"),
            Err(FraudGraphError::ResolutionMiss { .. })
        ));
        assert_eq!(resolver.len(NodeKind::Account), 0);
        assert!(resolver.is_empty());
    }

    #[test]
    fn release_forgets_keys() {
        let resolver = Resolver::new();
        let first = resolver.resolve(NodeKind::User, "U1");
        resolver.release(NodeKind::User, ["U1"]);
        assert!(resolver.lookup(NodeKind::User, "U1").is_err());

        let again = resolver.resolve(NodeKind::User, "U1");
        assert!(again.fresh);
        assert_ne!(again.handle, first.handle);
    }

    #[test]
    fn seeded_from_store() {
        let store = MemoryStore::with_graph(Graph::new());
        let mut batch = Batch::new();
        batch.push_node(Node::new(
            Handle(4),
            "U1",
            NodeAttributes::User(UserAttrs::default()),
        ));
        store.commit(&batch).expect("commit");

        let resolver = Resolver::seeded(&store.view().expect("view")).expect("seed");
        assert_eq!(resolver.lookup(NodeKind::User, "U1").expect("lookup"), Handle(4));
        assert_eq!(resolver.resolve(NodeKind::User, "U2").handle, Handle(5));
    }

    #[test]
    fn concurrent_resolution_within_a_kind() {
        let resolver = Arc::new(Resolver::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                thread::spawn(move || {
                    (0..100)
                        .map(|i| resolver.resolve(NodeKind::User, &format!("U{i}")).handle)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<Handle>> = workers
            .into_iter()
            .map(|w| w.join().expect("join"))
            .collect();
        for other in &results[1..] {
            assert_eq!(other, &results[0]);
        }
        assert_eq!(resolver.len(NodeKind::User), 100);
    }

    #[test]
    fn keys_are_trimmed_and_checked() {
        assert_eq!(normalize_key("user_id", "  U1 ").expect("key"), "U1");
        assert!(normalize_key("user_id", "   ").is_err());
        assert!(normalize_key("user_id", &"x".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }
}
