//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (`GRAPHCORE_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [storage]
//! data_dir = "/var/lib/graphcore/data"
//!
//! [graph]
//! node_block_cap = 65536
//! maintain_transposed_relations = true
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! GRAPHCORE_STORAGE__DATA_DIR=/custom/path
//! GRAPHCORE_GRAPH__BULK_DELETE_THRESHOLD=5000
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub graph: GraphConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Durability and snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for WAL files and snapshots.
    pub data_dir: PathBuf,

    /// Enable write-ahead logging between snapshots. Disabling this trades
    /// crash durability for ingest throughput (demos, benchmarks).
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Number of WAL entries after which a snapshot + WAL truncation runs.
    #[serde(default = "default_wal_compaction_threshold")]
    pub wal_compaction_threshold: usize,
}

/// Graph-engine tuning knobs.
///
/// Field names mirror the block-allocation and sparse-matrix terminology
/// the rest of the crate uses internally rather than generic "performance"
/// naming — these values are read directly by `DataBlock`, `DeltaMatrix` and
/// `Graph::bulk_delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Initial capacity (in records) reserved per node `DataBlock`.
    #[serde(default = "default_node_block_cap")]
    pub node_block_cap: usize,

    /// Initial capacity reserved per edge `DataBlock`.
    #[serde(default = "default_edge_block_cap")]
    pub edge_block_cap: usize,

    /// Maintain a transposed companion matrix per relation type so reverse
    /// traversal avoids a runtime transpose. Costs memory, saves CPU.
    #[serde(default = "default_true")]
    pub maintain_transposed_relations: bool,

    /// Fraction of a `DeltaMatrix`'s pending entries (relative to the base
    /// matrix's non-zero count) that triggers an eager flush outside the
    /// normal FLUSH_RESIZE sync point.
    #[serde(default = "default_delta_flush_ratio")]
    pub delta_flush_ratio: f64,

    /// Below this many deleted ids, deletes tombstone in place. At or above
    /// it, `Graph::bulk_delete` rebuilds the affected matrices instead of
    /// accumulating tombstones one at a time.
    #[serde(default = "default_bulk_delete_threshold")]
    pub bulk_delete_threshold: usize,

    /// Maximum distinct labels a graph will intern before `LabelCapExceeded`.
    #[serde(default = "default_label_cap")]
    pub label_cap: usize,

    /// Maximum distinct relation types a graph will intern.
    #[serde(default = "default_relation_cap")]
    pub relation_cap: usize,
}

fn default_true() -> bool {
    true
}
fn default_wal_compaction_threshold() -> usize {
    10_000
}
fn default_node_block_cap() -> usize {
    16_384
}
fn default_edge_block_cap() -> usize {
    16_384
}
fn default_delta_flush_ratio() -> f64 {
    0.25
}
fn default_bulk_delete_threshold() -> usize {
    4
}
fn default_label_cap() -> usize {
    10_000
}
fn default_relation_cap() -> usize {
    10_000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Loads configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`GRAPHCORE_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("GRAPHCORE_").split("__"))
            .extract()
    }

    /// Loads configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRAPHCORE_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                enable_wal: true,
                wal_compaction_threshold: default_wal_compaction_threshold(),
            },
            graph: GraphConfig {
                node_block_cap: default_node_block_cap(),
                edge_block_cap: default_edge_block_cap(),
                maintain_transposed_relations: true,
                delta_flush_ratio: default_delta_flush_ratio(),
                bulk_delete_threshold: default_bulk_delete_threshold(),
                label_cap: default_label_cap(),
                relation_cap: default_relation_cap(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
