//! Binary snapshot codec.
//!
//! A graph snapshot is a single opaque, versioned byte stream produced by
//! `bincode`. The wire shape mirrors the in-memory layout closely enough
//! that encode/decode is a straight walk rather than a translation:
//!
//! ```text
//! [header: magic, version]
//! [label dictionary]        name -> LabelId
//! [relation dictionary]     name -> RelationId
//! [attribute dictionary]    name -> AttrId
//! [node section]            one record per live node (id, labels, attrs)
//! [edge section]            one record per live edge (id, src, dst, rel, attrs)
//! ```
//!
//! Tombstoned ids inside a [`crate::datablock::DataBlock`] are not written:
//! a snapshot only ever holds live records. `decode_graph` restores each
//! node and edge at its original id rather than renumbering into a
//! compacted space, so ids from before the snapshot stay stable across a
//! save/load round trip; the matrices are re-derived from the edge section
//! rather than serialized directly — a `SparseBoolMatrix` is a cache over
//! the edge list, not a second source of truth.

use serde::{Deserialize, Serialize};

use super::{StorageError, StorageResult};
use crate::value::AttributeSet;

const MAGIC: u32 = 0x4752_4150; // "GRAP"
const VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: u32,
    version: u32,
}

/// A node as written to / read from a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u64,
    pub labels: Vec<u32>,
    pub attrs: AttributeSet,
}

/// An edge as written to / read from a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: u64,
    pub src: u64,
    pub dst: u64,
    pub relation: u32,
    pub attrs: AttributeSet,
}

/// A fully decoded snapshot, before it is folded into live `Graph` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub label_names: Vec<(u32, String)>,
    pub relation_names: Vec<(u32, String)>,
    pub attr_names: Vec<(u32, String)>,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    header: SnapshotHeader,
    body: GraphSnapshot,
}

/// Encodes a graph snapshot into the versioned byte stream written to disk.
pub fn encode_graph(snapshot: &GraphSnapshot) -> StorageResult<Vec<u8>> {
    let envelope = Envelope {
        header: SnapshotHeader { magic: MAGIC, version: VERSION },
        body: snapshot.clone(),
    };
    bincode::serialize(&envelope).map_err(|e| StorageError::Codec(e.to_string()))
}

/// Decodes a byte stream previously produced by [`encode_graph`].
pub fn decode_graph(bytes: &[u8]) -> StorageResult<GraphSnapshot> {
    let envelope: Envelope =
        bincode::deserialize(bytes).map_err(|e| StorageError::Codec(e.to_string()))?;

    if envelope.header.magic != MAGIC {
        return Err(StorageError::Codec("bad magic bytes in snapshot header".to_string()));
    }
    if envelope.header.version != VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: envelope.header.version,
            expected: VERSION,
        });
    }

    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GraphSnapshot {
        GraphSnapshot {
            label_names: vec![(0, "Person".to_string())],
            relation_names: vec![(0, "KNOWS".to_string())],
            attr_names: vec![(0, "name".to_string())],
            nodes: vec![NodeRecord { id: 1, labels: vec![0], attrs: AttributeSet::new() }],
            edges: vec![EdgeRecord { id: 1, src: 1, dst: 1, relation: 0, attrs: AttributeSet::new() }],
        }
    }

    #[test]
    fn roundtrip_preserves_content() {
        let snap = sample();
        let bytes = encode_graph(&snap).unwrap();
        let decoded = decode_graph(&bytes).unwrap();

        assert_eq!(decoded.nodes.len(), 1);
        assert_eq!(decoded.edges.len(), 1);
        assert_eq!(decoded.label_names, snap.label_names);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_graph(&sample()).unwrap();
        bytes[0] ^= 0xFF;
        assert!(decode_graph(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_stream() {
        let bytes = encode_graph(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode_graph(truncated).is_err());
    }

    #[test]
    fn rejects_future_version() {
        let envelope = Envelope {
            header: SnapshotHeader { magic: MAGIC, version: VERSION + 1 },
            body: sample(),
        };
        let bytes = bincode::serialize(&envelope).unwrap();
        let err = decode_graph(&bytes).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedVersion { found, .. } if found == VERSION + 1));
    }
}
