//! Table Engine
//!
//! One LSM stack per table: WAL + memtable + SSTable list.
//!
//! ## Concurrency model
//!
//! - **Writes** (put/delete/flush/truncate): serialized by the engine's
//!   write lock, held across WAL append + memtable mutation so recovery
//!   replay order always matches what the memtable observed.
//! - **Reads** (get/scan): take the read lock just long enough to snapshot
//!   the memtable contents and the SSTable list, then proceed without it.
//!   A flush installs the new reader and swaps the memtable under the
//!   write lock; readers holding an older snapshot are unaffected.
//!
//! ## Recovery on open
//!
//! Leftover `sst-*.dat.tmp` files (flushes that never committed) are
//! deleted, committed SSTables load in creation-sequence order, and every
//! WAL segment replays into the memtable with torn tails truncated.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::codec::Record;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::memtable::{Memtable, RowEntry};
use crate::storage::merge::MergeIterator;
use crate::storage::sstable::{SSTableBuilder, SSTableReader};
use crate::value::{Row, Value};
use crate::wal::{self, WalWriter};

const WAL_PREFIX: &str = "wal-";
const WAL_SUFFIX: &str = ".log";
const SST_PREFIX: &str = "sst-";
const SST_SUFFIX: &str = ".dat";
const TMP_SUFFIX: &str = ".tmp";

/// The LSM storage engine for a single table
pub struct TableEngine {
    dir: PathBuf,
    cfg: EngineConfig,
    inner: RwLock<EngineInner>,
}

struct EngineInner {
    wal: WalWriter,
    memtable: Memtable,
    /// Oldest first; scans and gets walk it newest-to-oldest
    sstables: Vec<Arc<SSTableReader>>,
    /// Next file sequence number (shared by WAL and SSTable files)
    next_seq: u64,
}

impl TableEngine {
    /// Open or create the engine for a table directory
    pub fn open(dir: PathBuf, cfg: EngineConfig) -> Result<Self> {
        fs::create_dir_all(&dir)?;

        let files = scan_dir(&dir)?;
        let mut next_seq = files.max_seq + 1;

        let mut sstables = Vec::with_capacity(files.sstables.len());
        for (seq, path) in &files.sstables {
            sstables.push(Arc::new(SSTableReader::open(path, *seq)?));
        }

        let mut memtable = Memtable::new();
        for (_, path) in &files.wals {
            let replayed = wal::replay(path)?;
            if replayed.truncated {
                warn!(path = %path.display(), "WAL segment had a torn tail");
            }
            for (record, len) in replayed.records {
                memtable.apply(record, len);
            }
        }

        // Keep appending to the newest segment, or start a fresh one
        let wal_path = match files.wals.last() {
            Some((_, path)) => path.clone(),
            None => {
                let seq = next_seq;
                next_seq += 1;
                dir.join(format!("{}{}{}", WAL_PREFIX, seq, WAL_SUFFIX))
            }
        };
        let wal = WalWriter::open(&wal_path, &cfg)?;

        debug!(
            dir = %dir.display(),
            sstables = sstables.len(),
            replayed = memtable.len(),
            "table engine open"
        );

        Ok(Self {
            dir,
            cfg,
            inner: RwLock::new(EngineInner {
                wal,
                memtable,
                sstables,
                next_seq,
            }),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Point lookup: memtable first, then SSTables newest to oldest;
    /// the first hit wins and a tombstone means not-found
    pub fn get(&self, pk: &Value) -> Result<Option<Row>> {
        let (mem_hit, sstables) = {
            let inner = self.inner.read();
            (inner.memtable.get(pk).cloned(), inner.sstables.clone())
        };

        if let Some(entry) = mem_hit {
            return Ok(match entry {
                RowEntry::Row(row) => Some(row),
                RowEntry::Tombstone => None,
            });
        }
        for sst in sstables.iter().rev() {
            if let Some(entry) = sst.get(pk)? {
                return Ok(match entry {
                    RowEntry::Row(row) => Some(row),
                    RowEntry::Tombstone => None,
                });
            }
        }
        Ok(None)
    }

    /// Ordered scan of live rows, up to `limit` (`Some(0)` yields nothing)
    pub fn scan(&self, descending: bool, limit: Option<usize>) -> Result<Vec<Row>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let (mem_snapshot, sstables) = {
            let inner = self.inner.read();
            (inner.memtable.snapshot(descending), inner.sstables.clone())
        };

        let mut sources: Vec<Box<dyn Iterator<Item = Result<(Value, RowEntry)>> + '_>> =
            Vec::with_capacity(1 + sstables.len());
        sources.push(Box::new(mem_snapshot.into_iter().map(Ok)));
        for sst in sstables.iter().rev() {
            if descending {
                sources.push(Box::new(sst.iter_desc()));
            } else {
                sources.push(Box::new(sst.iter()));
            }
        }

        let mut merge = MergeIterator::new(sources, descending)?;
        let mut rows = Vec::new();
        while let Some((_, row)) = merge.next_row()? {
            rows.push(row);
            if limit.is_some_and(|n| rows.len() >= n) {
                break;
            }
        }
        Ok(rows)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Upsert a full row under its primary key
    pub fn put(&self, pk: Value, row: Row) -> Result<()> {
        self.write(Record::Put { pk, row })
    }

    /// Write a tombstone for the primary key
    pub fn delete(&self, pk: Value) -> Result<()> {
        self.write(Record::Delete { pk })
    }

    fn write(&self, record: Record) -> Result<()> {
        let framed = record.encode();
        let mut inner = self.inner.write();
        inner.wal.append(&framed)?;
        inner.memtable.apply(record, framed.len());
        if inner.memtable.bytes() > self.cfg.memtable_max_bytes {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Flush the memtable to a new SSTable and rotate the WAL
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.write();
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut EngineInner) -> Result<()> {
        if inner.memtable.is_empty() {
            return Ok(());
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let path = self.sst_path(seq);

        let mut builder = SSTableBuilder::create(&path, self.cfg.sstable_index_stride)?;
        for (pk, entry) in inner.memtable.iter() {
            let record = match entry {
                RowEntry::Row(row) => Record::Put {
                    pk: pk.clone(),
                    row: row.clone(),
                },
                RowEntry::Tombstone => Record::Delete { pk: pk.clone() },
            };
            builder.add(&record)?;
        }
        builder.finish()?;

        let reader = Arc::new(SSTableReader::open(&path, seq)?);
        let records = reader.record_count();
        inner.sstables.push(reader);
        inner.memtable.clear();
        self.rotate_wal(inner)?;

        info!(path = %path.display(), records, "flushed memtable to sstable");
        Ok(())
    }

    /// Discard all rows but keep the schema: drop every SSTable and start
    /// a fresh WAL
    pub fn truncate(&self) -> Result<()> {
        let mut inner = self.inner.write();
        for sst in inner.sstables.drain(..) {
            fs::remove_file(sst.path())?;
        }
        inner.memtable.clear();
        self.rotate_wal(&mut inner)?;
        info!(dir = %self.dir.display(), "table truncated");
        Ok(())
    }

    /// Delete the table's directory and everything in it; the engine is
    /// unusable afterwards
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.sstables.clear();
        inner.memtable.clear();
        fs::remove_dir_all(&self.dir)?;
        info!(dir = %self.dir.display(), "table destroyed");
        Ok(())
    }

    /// Install a fresh WAL segment and remove all older ones; called after
    /// the data they protected became durable (or was discarded)
    fn rotate_wal(&self, inner: &mut EngineInner) -> Result<()> {
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let path = self.dir.join(format!("{}{}{}", WAL_PREFIX, seq, WAL_SUFFIX));
        inner.wal = WalWriter::open(&path, &self.cfg)?;

        for (_, stale) in scan_dir(&self.dir)?.wals {
            if stale != path {
                fs::remove_file(&stale)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Periodic-fsync ticker entry point; skips the tick when the engine
    /// is busy rather than stalling behind a writer
    pub fn wal_tick(&self) -> Result<()> {
        if let Some(mut inner) = self.inner.try_write() {
            inner.wal.tick()?;
        }
        Ok(())
    }

    /// Fsync pending WAL bytes (shutdown path)
    pub fn sync(&self) -> Result<()> {
        self.inner.write().wal.sync_if_dirty()
    }

    // =========================================================================
    // Accessors (for tests and the bench)
    // =========================================================================

    pub fn sstable_count(&self) -> usize {
        self.inner.read().sstables.len()
    }

    pub fn memtable_len(&self) -> usize {
        self.inner.read().memtable.len()
    }

    pub fn memtable_bytes(&self) -> usize {
        self.inner.read().memtable.bytes()
    }

    fn sst_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}{}{}", SST_PREFIX, seq, SST_SUFFIX))
    }
}

// =============================================================================
// Directory scan
// =============================================================================

struct DirFiles {
    /// (seq, path) ascending by seq
    sstables: Vec<(u64, PathBuf)>,
    /// (seq, path) ascending by seq
    wals: Vec<(u64, PathBuf)>,
    max_seq: u64,
}

/// List committed storage files, deleting uncommitted `.tmp` leftovers
fn scan_dir(dir: &Path) -> Result<DirFiles> {
    let mut sstables = Vec::new();
    let mut wals = Vec::new();
    let mut max_seq = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };

        if name.ends_with(TMP_SUFFIX) {
            warn!(file = name, "removing uncommitted flush leftover");
            fs::remove_file(entry.path())?;
            continue;
        }
        if let Some(seq) = parse_seq(name, SST_PREFIX, SST_SUFFIX) {
            max_seq = max_seq.max(seq);
            sstables.push((seq, entry.path()));
        } else if let Some(seq) = parse_seq(name, WAL_PREFIX, WAL_SUFFIX) {
            max_seq = max_seq.max(seq);
            wals.push((seq, entry.path()));
        }
    }

    sstables.sort_by_key(|(seq, _)| *seq);
    wals.sort_by_key(|(seq, _)| *seq);
    Ok(DirFiles {
        sstables,
        wals,
        max_seq,
    })
}

fn parse_seq(name: &str, prefix: &str, suffix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?
        .strip_suffix(suffix)?
        .parse()
        .ok()
}

impl std::fmt::Debug for TableEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEngine")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}
