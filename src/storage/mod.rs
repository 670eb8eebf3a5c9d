//! Storage Module
//!
//! Persistence for a graph: a write-ahead log for durability between
//! snapshots, and a binary codec for the snapshot itself.
//!
//! ## Persistence Model
//!
//! - Every mutation is applied in memory, then appended to the WAL with the
//!   id the in-memory apply actually assigned — ids can come from a reused
//!   tombstoned slot, so the WAL entry is written from the real outcome
//!   rather than a prediction, and a crash before the append is logged is
//!   indistinguishable from the mutation never having happened.
//! - A snapshot is a full, versioned encoding of live graph state.
//! - Startup recovery loads the newest snapshot, then replays any WAL
//!   entries logged after it.

pub mod codec;
pub mod error;
pub mod wal;

pub use codec::{decode_graph, encode_graph, EdgeRecord, GraphSnapshot, NodeRecord};
pub use error::{StorageError, StorageResult};
pub use wal::{replay_wal, Wal, WalEntry, WalOp};
