//! Configuration for LodeDB
//!
//! The server is configured from a flat YAML file with camelCase keys:
//!
//! ```yaml
//! host: 127.0.0.1
//! port: 7654
//! dataDir: ./data
//! maxLineBytes: 1048576
//! maxConnections: 128
//! walFsync: periodic
//! walFsyncIntervalMs: 100
//! walFsyncBytes: 1048576
//! memtableMaxBytes: 33554432
//! sstableIndexStride: 16
//! auth:            # optional; presence enables authentication
//!   username: admin
//!   password: secret
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LodeError, Result};

/// Main configuration for a LodeDB server instance
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network configuration
    // -------------------------------------------------------------------------
    /// TCP bind address
    pub host: String,

    /// TCP port (0 lets the OS pick, useful for tests)
    pub port: u16,

    /// Max bytes in a single statement line; longer lines close the connection
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Max concurrent client connections; excess connections are dropped
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    // -------------------------------------------------------------------------
    // Storage configuration
    // -------------------------------------------------------------------------
    /// Parent directory of all per-table directories
    pub data_dir: PathBuf,

    /// WAL durability policy
    #[serde(default)]
    pub wal_fsync: WalFsync,

    /// Max interval between fsyncs under the `periodic` policy
    #[serde(default = "default_wal_fsync_interval_ms")]
    pub wal_fsync_interval_ms: u64,

    /// Dirty-byte threshold that forces an immediate fsync under `periodic`
    #[serde(default = "default_wal_fsync_bytes")]
    pub wal_fsync_bytes: u64,

    /// Memtable size (bytes of encoded records) that triggers a flush
    #[serde(default = "default_memtable_max_bytes")]
    pub memtable_max_bytes: usize,

    /// One sparse index entry per this many SSTable records
    #[serde(default = "default_sstable_index_stride")]
    pub sstable_index_stride: usize,

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    /// Admin credentials; if present, auth is enabled and this user is
    /// installed in SYSTEM.USERS on every startup (config wins)
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// WAL fsync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalFsync {
    /// fsync after every append (safest, slowest)
    Always,

    /// background ticker fsyncs at most every `walFsyncIntervalMs`; an
    /// appender past `walFsyncBytes` dirty bytes syncs immediately
    #[default]
    Periodic,

    /// never fsync; OS flush only
    Off,
}

/// Admin credentials from the `auth` config section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

fn default_max_line_bytes() -> usize {
    1024 * 1024
}

fn default_max_connections() -> usize {
    128
}

fn default_wal_fsync_interval_ms() -> u64 {
    100
}

fn default_wal_fsync_bytes() -> u64 {
    1024 * 1024
}

fn default_memtable_max_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_sstable_index_stride() -> usize {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_line_bytes: default_max_line_bytes(),
            max_connections: default_max_connections(),
            data_dir: PathBuf::from("./lodedb_data"),
            wal_fsync: WalFsync::default(),
            wal_fsync_interval_ms: default_wal_fsync_interval_ms(),
            wal_fsync_bytes: default_wal_fsync_bytes(),
            memtable_max_bytes: default_memtable_max_bytes(),
            sstable_index_stride: default_sstable_index_stride(),
            auth: None,
        }
    }
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            LodeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|e| LodeError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<()> {
        if self.sstable_index_stride == 0 {
            return Err(LodeError::Config("sstableIndexStride must be >= 1".into()));
        }
        if self.max_line_bytes == 0 {
            return Err(LodeError::Config("maxLineBytes must be >= 1".into()));
        }
        if self.memtable_max_bytes == 0 {
            return Err(LodeError::Config("memtableMaxBytes must be >= 1".into()));
        }
        Ok(())
    }

    /// `host:port` string for TcpListener::bind
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The subset of settings each table engine needs
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            memtable_max_bytes: self.memtable_max_bytes,
            sstable_index_stride: self.sstable_index_stride,
            wal_fsync: self.wal_fsync,
            wal_fsync_interval_ms: self.wal_fsync_interval_ms,
            wal_fsync_bytes: self.wal_fsync_bytes,
        }
    }
}

/// Per-table engine settings, derived from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub memtable_max_bytes: usize,
    pub sstable_index_stride: usize,
    pub wal_fsync: WalFsync,
    pub wal_fsync_interval_ms: u64,
    pub wal_fsync_bytes: u64,
}
