//! SSTable Reader
//!
//! Memory-mapped reader. The sparse index (one pk + offset per stride
//! records) is decoded into memory on open; `get` binary-searches it for
//! the greatest indexed pk ≤ target and walks forward from there, so a
//! lookup touches at most one stride's worth of records.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Buf;
use memmap2::Mmap;

use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};
use crate::codec::{self, Record};
use crate::error::{LodeError, Result};
use crate::memtable::RowEntry;
use crate::value::Value;

/// Reader for one immutable SSTable file
pub struct SSTableReader {
    path: PathBuf,
    seq: u64,
    mmap: Mmap,
    /// (first pk of stride, body offset), ascending
    index: Vec<(Value, u64)>,
    record_count: u64,
    /// End of the record body == start of the sparse index
    body_end: u64,
}

impl SSTableReader {
    /// Open and validate an SSTable; `seq` is the file's creation sequence
    pub fn open(path: &Path, seq: u64) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(path, "file shorter than header + footer"));
        }
        // Safety: the file is immutable once renamed into place; nothing
        // remaps or writes it while the reader is alive.
        let mmap = unsafe { Mmap::map(&file)? };

        let mut header = &mmap[..HEADER_SIZE as usize];
        if header.get_u32_le() != MAGIC {
            return Err(corrupt(path, "bad header magic"));
        }
        let version = header.get_u16_le();
        if version != VERSION {
            return Err(corrupt(path, &format!("unsupported version {}", version)));
        }

        let mut footer = &mmap[(len - FOOTER_SIZE) as usize..];
        let body_end = footer.get_u64_le();
        let record_count = footer.get_u64_le();
        if footer.get_u32_le() != MAGIC {
            return Err(corrupt(path, "bad footer magic"));
        }
        if body_end < HEADER_SIZE || body_end > len - FOOTER_SIZE {
            return Err(corrupt(path, "index offset out of range"));
        }

        let mut index_bytes = &mmap[body_end as usize..(len - FOOTER_SIZE) as usize];
        let count = codec::get_varuint(&mut index_bytes)?;
        let mut index = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if index_bytes.len() < 8 {
                return Err(corrupt(path, "sparse index truncated"));
            }
            let offset = index_bytes.get_u64_le();
            let pk = codec::get_value(&mut index_bytes)?;
            index.push((pk, offset));
        }
        if !index_bytes.is_empty() {
            return Err(corrupt(path, "trailing bytes after sparse index"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            seq,
            mmap,
            index,
            record_count,
            body_end,
        })
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Point lookup; `Some(Tombstone)` means the pk is deleted here and
    /// older tables must not be consulted
    pub fn get(&self, pk: &Value) -> Result<Option<RowEntry>> {
        let slot = self.index.partition_point(|(k, _)| k <= pk);
        if slot == 0 {
            return Ok(None);
        }
        let mut offset = self.index[slot - 1].1;
        while offset < self.body_end {
            let (record, consumed) = self.record_at(offset)?;
            match record.pk().cmp(pk) {
                std::cmp::Ordering::Less => offset += consumed,
                std::cmp::Ordering::Equal => return Ok(Some(entry_of(record))),
                std::cmp::Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// All records in ascending pk order
    pub fn iter(&self) -> AscIter<'_> {
        AscIter {
            reader: self,
            offset: HEADER_SIZE,
        }
    }

    /// All records in descending pk order; walks the sparse index chunks
    /// in reverse so memory stays bounded by one stride
    pub fn iter_desc(&self) -> DescIter<'_> {
        DescIter {
            reader: self,
            next_slot: self.index.len(),
            chunk_end: self.body_end,
            chunk: Vec::new(),
            failed: false,
        }
    }

    fn record_at(&self, offset: u64) -> Result<(Record, u64)> {
        let mut slice = &self.mmap[offset as usize..self.body_end as usize];
        let before = slice.len();
        let record = Record::decode(&mut slice)?;
        Ok((record, (before - slice.len()) as u64))
    }
}

fn entry_of(record: Record) -> RowEntry {
    match record {
        Record::Put { row, .. } => RowEntry::Row(row),
        Record::Delete { .. } => RowEntry::Tombstone,
    }
}

fn corrupt(path: &Path, msg: &str) -> LodeError {
    LodeError::Corrupt(format!("{}: {}", path.display(), msg))
}

/// Forward iterator over (pk, entry)
pub struct AscIter<'a> {
    reader: &'a SSTableReader,
    offset: u64,
}

impl Iterator for AscIter<'_> {
    type Item = Result<(Value, RowEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.reader.body_end {
            return None;
        }
        match self.reader.record_at(self.offset) {
            Ok((record, consumed)) => {
                self.offset += consumed;
                Some(Ok((record.pk().clone(), entry_of(record))))
            }
            Err(e) => {
                self.offset = self.reader.body_end;
                Some(Err(e))
            }
        }
    }
}

/// Backward iterator over (pk, entry)
pub struct DescIter<'a> {
    reader: &'a SSTableReader,
    /// Next sparse index slot to load, counting down
    next_slot: usize,
    /// Exclusive end offset of the next chunk
    chunk_end: u64,
    /// Current chunk, drained from the back
    chunk: Vec<(Value, RowEntry)>,
    failed: bool,
}

impl DescIter<'_> {
    fn load_chunk(&mut self) -> Result<()> {
        self.next_slot -= 1;
        let mut offset = self.reader.index[self.next_slot].1;
        let end = self.chunk_end;
        self.chunk_end = offset;
        while offset < end {
            let (record, consumed) = self.reader.record_at(offset)?;
            self.chunk.push((record.pk().clone(), entry_of(record)));
            offset += consumed;
        }
        Ok(())
    }
}

impl Iterator for DescIter<'_> {
    type Item = Result<(Value, RowEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.chunk.is_empty() {
            if self.next_slot == 0 {
                return None;
            }
            if let Err(e) = self.load_chunk() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        self.chunk.pop().map(Ok)
    }
}
