//! Merge iterator across the memtable and N SSTables
//!
//! Produces `(pk, row)` pairs in the requested direction. When the same pk
//! appears in multiple sources, only the freshest wins: the memtable has
//! rank 0, then SSTables newest to oldest. Tombstones shadow older
//! versions and are filtered from the output.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::memtable::RowEntry;
use crate::value::{Row, Value};

/// One source's pending entry, used for heap-based merge ordering
struct HeapItem {
    pk: Value,
    /// Freshness rank: 0 = memtable, then SSTables newest first
    rank: usize,
    entry: RowEntry,
    descending: bool,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.pk == other.pk && self.rank == other.rank
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse the pk comparison for ascending
        // scans. On pk ties the lower rank (fresher source) pops first.
        let by_pk = if self.descending {
            self.pk.cmp(&other.pk)
        } else {
            other.pk.cmp(&self.pk)
        };
        by_pk.then_with(|| other.rank.cmp(&self.rank))
    }
}

type Source<'a> = Box<dyn Iterator<Item = Result<(Value, RowEntry)>> + 'a>;

/// K-way merge of pre-sorted sources, freshest-source-wins per pk
pub struct MergeIterator<'a> {
    sources: Vec<Source<'a>>,
    heap: BinaryHeap<HeapItem>,
    descending: bool,
    last_pk: Option<Value>,
}

impl<'a> MergeIterator<'a> {
    /// `sources` must be ordered freshest first and each sorted in the
    /// scan direction
    pub fn new(sources: Vec<Source<'a>>, descending: bool) -> Result<Self> {
        let mut merge = Self {
            sources,
            heap: BinaryHeap::new(),
            descending,
            last_pk: None,
        };
        for rank in 0..merge.sources.len() {
            merge.advance(rank)?;
        }
        Ok(merge)
    }

    fn advance(&mut self, rank: usize) -> Result<()> {
        if let Some(item) = self.sources[rank].next() {
            let (pk, entry) = item?;
            self.heap.push(HeapItem {
                pk,
                rank,
                entry,
                descending: self.descending,
            });
        }
        Ok(())
    }

    /// Next live row, or `None` when all sources are exhausted
    pub fn next_row(&mut self) -> Result<Option<(Value, Row)>> {
        while let Some(item) = self.heap.pop() {
            self.advance(item.rank)?;

            // Shadowed older version of a pk we already emitted or decided on
            if self.last_pk.as_ref() == Some(&item.pk) {
                continue;
            }
            self.last_pk = Some(item.pk.clone());

            match item.entry {
                RowEntry::Row(row) => return Ok(Some((item.pk, row))),
                RowEntry::Tombstone => continue,
            }
        }
        Ok(None)
    }
}
