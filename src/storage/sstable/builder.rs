//! SSTable Builder
//!
//! Writes sorted records to a new SSTable file. The caller feeds records
//! in ascending pk order (the memtable iterator already is); `finish`
//! writes the sparse index and footer, fsyncs, and renames the `.tmp`
//! file into place — only the rename commits the table's existence.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;

use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};
use crate::codec::{self, Record};
use crate::error::{LodeError, Result};
use crate::value::Value;

/// Builder for creating new SSTables from sorted records
pub struct SSTableBuilder {
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    /// One sparse index entry per this many records
    stride: usize,
    /// Current write position (body offsets for the index)
    offset: u64,
    record_count: u64,
    index: Vec<(Value, u64)>,
    last_pk: Option<Value>,
}

impl SSTableBuilder {
    /// Start building `path`; data goes to `path.tmp` until `finish`
    pub fn create(path: &Path, stride: usize) -> Result<Self> {
        let tmp_path = tmp_path_for(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.put_u32_le(MAGIC);
        header.put_u16_le(VERSION);
        writer.write_all(&header)?;

        Ok(Self {
            final_path: path.to_path_buf(),
            tmp_path,
            writer,
            stride: stride.max(1),
            offset: HEADER_SIZE,
            record_count: 0,
            index: Vec::new(),
            last_pk: None,
        })
    }

    /// Append one record; pks must arrive in strictly ascending order
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if let Some(last) = &self.last_pk {
            if record.pk() <= last {
                return Err(LodeError::Internal(
                    "sstable records must be added in ascending pk order".into(),
                ));
            }
        }
        self.last_pk = Some(record.pk().clone());

        if self.record_count % self.stride as u64 == 0 {
            self.index.push((record.pk().clone(), self.offset));
        }

        let framed = record.encode();
        self.writer.write_all(&framed)?;
        self.offset += framed.len() as u64;
        self.record_count += 1;
        Ok(())
    }

    /// Write index + footer, fsync, and rename into place
    pub fn finish(mut self) -> Result<()> {
        let index_offset = self.offset;

        let mut tail = Vec::new();
        codec::put_varuint(&mut tail, self.index.len() as u64);
        for (pk, offset) in &self.index {
            tail.put_u64_le(*offset);
            codec::put_value(&mut tail, pk);
        }

        let mut footer = Vec::with_capacity(FOOTER_SIZE as usize);
        footer.put_u64_le(index_offset);
        footer.put_u64_le(self.record_count);
        footer.put_u32_le(MAGIC);
        tail.extend_from_slice(&footer);

        self.writer.write_all(&tail)?;
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| LodeError::Internal(format!("sstable flush failed: {}", e)))?;
        file.sync_all()?;
        drop(file);

        // The rename is the commit point
        fs::rename(&self.tmp_path, &self.final_path)?;
        if let Some(dir) = self.final_path.parent() {
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    }
}

/// `sst-<seq>.dat` → `sst-<seq>.dat.tmp`
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
