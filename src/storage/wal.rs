//! Write-Ahead Log (WAL) for graph mutations.
//!
//! Provides O(1) append-only durability for node/edge/attribute writes ahead
//! of the periodic full snapshot (see [`super::codec`]).
//!
//! ## Architecture
//!
//! ```text
//! Graph::create_node/create_edge/... -> WAL (append, O(1)) -> periodic snapshot
//!                                            |
//!                                            v
//!                                   recovery on startup (replay WAL)
//! ```
//!
//! ## WAL Entry Format
//!
//! Each entry is a JSON line (chosen for debuggability over compactness —
//! the WAL is a thin durability layer ahead of the binary snapshot, not the
//! primary storage format):
//! ```json
//! {"op":"create_node","id":1,"labels":[0],"ts":1234567890}
//! {"op":"set_node_attr","id":1,"attr":3,"value":{"Int":42},"ts":1234567891}
//! {"op":"delete_edge","id":7,"ts":1234567892}
//! ```

use crate::value::AttrValue;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use super::{StorageError, StorageResult};

/// A single graph mutation, as durably logged ahead of being applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WalOp {
    CreateNode { id: u64, labels: Vec<u32> },
    DeleteNode { id: u64 },
    CreateEdge { id: u64, src: u64, dst: u64, relation: u32 },
    DeleteEdge { id: u64 },
    SetNodeAttr { id: u64, attr: u32, value: AttrValue },
    RemoveNodeAttr { id: u64, attr: u32 },
    SetEdgeAttr { id: u64, attr: u32, value: AttrValue },
    RemoveEdgeAttr { id: u64, attr: u32 },
}

/// A single WAL entry: an operation plus the millisecond timestamp it was
/// logged at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalEntry {
    #[serde(flatten)]
    pub op: WalOp,
    pub ts: u64,
}

impl WalEntry {
    fn now(op: WalOp) -> Self {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        WalEntry { op, ts }
    }
}

/// Write-ahead log for a single graph.
pub struct Wal {
    wal_dir: PathBuf,
    writer: Option<BufWriter<File>>,
    current_file: PathBuf,
    entries_since_compaction: usize,
    compaction_threshold: usize,
}

impl Wal {
    /// Opens (creating if absent) the WAL directory for a graph.
    pub fn new(wal_dir: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&wal_dir)?;

        let current_file = wal_dir.join("current.wal");

        Ok(Wal {
            wal_dir,
            writer: None,
            current_file,
            entries_since_compaction: 0,
            compaction_threshold: 1000,
        })
    }

    fn ensure_writer(&mut self) -> StorageResult<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.current_file)?;
            self.writer = Some(BufWriter::new(file));
        }
        Ok(self.writer.as_mut().unwrap())
    }

    /// Appends an entry and flushes immediately — durability takes priority
    /// over append throughput here, bulk ingest is expected to batch at a
    /// higher layer before calling this per entry.
    pub fn append(&mut self, entry: WalEntry) -> StorageResult<()> {
        let writer = self.ensure_writer()?;

        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{json}")?;
        writer.flush()?;

        self.entries_since_compaction += 1;
        Ok(())
    }

    pub fn log(&mut self, op: WalOp) -> StorageResult<()> {
        self.append(WalEntry::now(op))
    }

    /// Reads every entry currently on disk, in append order, for recovery.
    pub fn read_all(&self) -> StorageResult<Vec<WalEntry>> {
        if !self.current_file.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.current_file)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (offset, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: WalEntry = serde_json::from_str(&line).map_err(|e| {
                StorageError::CorruptWal {
                    offset: offset as u64,
                    reason: e.to_string(),
                }
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Archives the current WAL file and starts a fresh one. Called after a
    /// successful snapshot makes the logged mutations redundant.
    pub fn clear(&mut self) -> StorageResult<()> {
        self.writer = None;

        if self.current_file.exists() {
            let archive_name = format!(
                "wal_{}.archived",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs()
            );
            let archive_path = self.wal_dir.join(archive_name);
            fs::rename(&self.current_file, archive_path)?;
        }

        self.entries_since_compaction = 0;
        Ok(())
    }

    pub fn needs_compaction(&self) -> bool {
        self.compaction_threshold > 0 && self.entries_since_compaction >= self.compaction_threshold
    }

    pub fn set_compaction_threshold(&mut self, threshold: usize) {
        self.compaction_threshold = threshold;
    }

    pub fn entries_since_compaction(&self) -> usize {
        self.entries_since_compaction
    }

    pub fn file_size(&self) -> u64 {
        fs::metadata(&self.current_file).map(|m| m.len()).unwrap_or(0)
    }
}

/// Replays logged entries by handing each one to `apply`, in the order they
/// were written. `apply` is expected to be a `Graph` method closure; WAL
/// replay has no graph-shape knowledge of its own, it only guarantees order.
pub fn replay_wal<F>(entries: &[WalEntry], mut apply: F) -> StorageResult<()>
where
    F: FnMut(&WalOp) -> StorageResult<()>,
{
    for entry in entries {
        apply(&entry.op)?;
    }
    Ok(())
}
