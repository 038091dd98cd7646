//! WAL Writer
//!
//! Appends framed records to the segment file and drives the fsync policy.
//! All three policies collapse into one dirty-byte counter, a last-sync
//! instant, and a predicate checked after each append and on the ticker.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, WalFsync};
use crate::error::Result;

/// Appends records to one WAL segment
pub struct WalWriter {
    path: PathBuf,
    file: File,
    fsync: WalFsync,
    fsync_interval: Duration,
    fsync_bytes: u64,
    /// Bytes appended since the last fsync
    dirty_bytes: u64,
    last_sync: Instant,
}

impl WalWriter {
    /// Open a segment for appending, creating it if absent
    pub fn open(path: &Path, cfg: &EngineConfig) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            fsync: cfg.wal_fsync,
            fsync_interval: Duration::from_millis(cfg.wal_fsync_interval_ms),
            fsync_bytes: cfg.wal_fsync_bytes,
            dirty_bytes: 0,
            last_sync: Instant::now(),
        })
    }

    /// Append one framed record; blocks until durable per policy
    pub fn append(&mut self, framed: &[u8]) -> Result<()> {
        self.file.write_all(framed)?;
        self.dirty_bytes += framed.len() as u64;
        match self.fsync {
            WalFsync::Always => self.sync()?,
            WalFsync::Periodic => {
                if self.dirty_bytes > self.fsync_bytes {
                    self.sync()?;
                }
            }
            WalFsync::Off => {}
        }
        Ok(())
    }

    /// Force an fsync and reset the dirty counter
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.dirty_bytes = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Ticker entry point for the `periodic` policy: fsync if dirty and the
    /// interval has elapsed
    pub fn tick(&mut self) -> Result<()> {
        if self.fsync == WalFsync::Periodic
            && self.dirty_bytes > 0
            && self.last_sync.elapsed() >= self.fsync_interval
        {
            self.sync()?;
        }
        Ok(())
    }

    /// Fsync only if there are unsynced bytes (shutdown path)
    pub fn sync_if_dirty(&mut self) -> Result<()> {
        if self.dirty_bytes > 0 {
            self.sync()?;
        }
        Ok(())
    }

    pub fn dirty_bytes(&self) -> u64 {
        self.dirty_bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
