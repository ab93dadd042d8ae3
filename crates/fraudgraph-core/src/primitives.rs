//! # Primitives
//!
//! Fixed runtime constants for the graph, loader and query engine.
//! These are compiled into the binary and are immutable at runtime.

/// Maximum number of edges a money-trail traversal may follow from its start.
pub const MAX_TRAIL_DEPTH: usize = 3;

/// Mean Earth radius used by the haversine distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// IP reputation above which an address counts as risky.
pub const RISKY_IP_REPUTATION: i64 = 50;

// =============================================================================
// LOADER DEFAULTS
// =============================================================================

/// Rows per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Commit attempts per batch before it is reported as failed.
pub const DEFAULT_COMMIT_ATTEMPTS: usize = 3;

/// Maximum length in bytes of an external key.
///
/// Keys longer than this are rejected as transform errors.
pub const MAX_KEY_LENGTH: usize = 256;

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// Magic bytes for the snapshot file header.
///
/// - File Header = Magic Bytes ("FRGR") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"FRGR";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;
