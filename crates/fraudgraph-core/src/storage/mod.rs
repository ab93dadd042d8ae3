//! # Storage Module
//!
//! Persistent storage backends for the node/edge store.

mod redb_graph;

pub use redb_graph::{RedbGraph, RedbView};
