//! # Snapshot Format
//!
//! Header (5 bytes) + postcard-serialized [`SerializableGraph`].
//! - 4 bytes: magic ("FRGR")
//! - 1 byte: version
//!
//! Size and header are checked before the payload is decoded, and decoding
//! rebuilds the graph through the same validation a batch commit runs.

use crate::graph::{Graph, SerializableGraph};
use crate::{FraudGraphError, primitives};

/// Largest snapshot accepted by [`graph_from_bytes`].
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 512 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), FraudGraphError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(FraudGraphError::DeserializationError(
                "not a fraudgraph snapshot (bad magic bytes)".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(FraudGraphError::DeserializationError(format!(
                "unsupported snapshot version {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FraudGraphError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(FraudGraphError::DeserializationError(format!(
                "snapshot too short: {} bytes, header needs {HEADER_SIZE}",
                bytes.len()
            )));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION
// =============================================================================

/// Encode a graph as a snapshot.
pub fn graph_to_bytes(graph: &Graph) -> Result<Vec<u8>, FraudGraphError> {
    let payload = postcard::to_stdvec(&SerializableGraph::from(graph))
        .map_err(|e| FraudGraphError::SerializationError(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&PersistenceHeader::new().to_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a snapshot.
pub fn graph_from_bytes(bytes: &[u8]) -> Result<Graph, FraudGraphError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(FraudGraphError::DeserializationError(format!(
            "snapshot of {} bytes exceeds the {MAX_PERSISTENCE_PAYLOAD_SIZE} byte limit",
            bytes.len()
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let serializable: SerializableGraph = postcard::from_bytes(&bytes[HEADER_SIZE..])
        .map_err(|e| FraudGraphError::DeserializationError(format!("bad snapshot payload: {e}")))?;
    Graph::try_from(serializable)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::graph::GraphRead;
    use crate::{DeviceAttrs, Edge, EdgeLabel, Handle, Node, NodeAttributes, UserAttrs};

    fn sample() -> Graph {
        let mut batch = Batch::new();
        batch.push_node(Node::new(
            Handle(0),
            "U1",
            NodeAttributes::User(UserAttrs::default()),
        ));
        batch.push_node(Node::new(
            Handle(1),
            "D1",
            NodeAttributes::Device(DeviceAttrs::default()),
        ));
        batch.push_edge(Edge::new(Handle(0), EdgeLabel::UsesDevice, Handle(1)));
        let mut graph = Graph::new();
        graph.apply(&batch).expect("apply");
        graph
    }

    #[test]
    fn header_layout() {
        let bytes = PersistenceHeader::new().to_bytes();
        assert_eq!(&bytes[..4], b"FRGR");
        assert_eq!(bytes[4], primitives::FORMAT_VERSION);
        assert_eq!(
            PersistenceHeader::from_bytes(&bytes).expect("parse"),
            PersistenceHeader::new()
        );
    }

    #[test]
    fn save_load_save_is_stable() {
        let bytes = graph_to_bytes(&sample()).expect("encode");
        let restored = graph_from_bytes(&bytes).expect("decode");
        assert_eq!(restored.edge_count().expect("count"), 1);
        assert_eq!(graph_to_bytes(&restored).expect("encode"), bytes);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(graph_from_bytes(b"FRG").is_err());

        let mut bytes = graph_to_bytes(&sample()).expect("encode");
        bytes[0] = b'X';
        assert!(graph_from_bytes(&bytes).is_err());

        let mut bytes = graph_to_bytes(&sample()).expect("encode");
        bytes[4] = 99;
        assert!(graph_from_bytes(&bytes).is_err());

        let mut bytes = PersistenceHeader::new().to_bytes().to_vec();
        bytes.extend_from_slice(&[0xff; 8]);
        assert!(graph_from_bytes(&bytes).is_err());
    }
}
