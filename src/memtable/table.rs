//! Memtable implementation

use std::collections::BTreeMap;

use super::RowEntry;
use crate::codec::Record;
use crate::value::Value;

/// Ordered in-memory table of recent writes
pub struct Memtable {
    entries: BTreeMap<Value, RowEntry>,
    /// Bytes of encoded records applied since the last clear; the engine
    /// flushes when this exceeds `memtableMaxBytes`
    bytes: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            bytes: 0,
        }
    }

    /// Apply a record (put or tombstone), overwriting any previous entry
    /// for the pk; `encoded_len` is the record's framed byte length
    pub fn apply(&mut self, record: Record, encoded_len: usize) {
        match record {
            Record::Put { pk, row } => {
                self.entries.insert(pk, RowEntry::Row(row));
            }
            Record::Delete { pk } => {
                self.entries.insert(pk, RowEntry::Tombstone);
            }
        }
        self.bytes += encoded_len;
    }

    pub fn get(&self, pk: &Value) -> Option<&RowEntry> {
        self.entries.get(pk)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Value, &RowEntry)> {
        self.entries.iter()
    }

    /// Owned copy of all entries in scan order, taken under the engine's
    /// read lock so scans can proceed without holding it
    pub fn snapshot(&self, descending: bool) -> Vec<(Value, RowEntry)> {
        let iter = self.entries.iter().map(|(k, v)| (k.clone(), v.clone()));
        if descending {
            iter.rev().collect()
        } else {
            iter.collect()
        }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    fn put(pk: i64, name: &str) -> Record {
        let mut row = Row::new();
        row.insert("id".into(), Value::Int(pk));
        row.insert("name".into(), Value::Varchar(name.into()));
        Record::Put {
            pk: Value::Int(pk),
            row,
        }
    }

    #[test]
    fn last_write_wins() {
        let mut mem = Memtable::new();
        mem.apply(put(1, "a"), 10);
        mem.apply(put(1, "b"), 10);
        match mem.get(&Value::Int(1)) {
            Some(RowEntry::Row(row)) => {
                assert_eq!(row.get("name"), Some(&Value::Varchar("b".into())))
            }
            other => panic!("unexpected entry: {:?}", other),
        }
        assert_eq!(mem.len(), 1);
        assert_eq!(mem.bytes(), 20);
    }

    #[test]
    fn tombstone_overwrites_row() {
        let mut mem = Memtable::new();
        mem.apply(put(1, "a"), 10);
        mem.apply(Record::Delete { pk: Value::Int(1) }, 5);
        assert_eq!(mem.get(&Value::Int(1)), Some(&RowEntry::Tombstone));
    }

    #[test]
    fn snapshot_orders_both_ways() {
        let mut mem = Memtable::new();
        for pk in [2, 1, 3] {
            mem.apply(put(pk, "x"), 10);
        }
        let asc: Vec<_> = mem.snapshot(false).into_iter().map(|(k, _)| k).collect();
        let desc: Vec<_> = mem.snapshot(true).into_iter().map(|(k, _)| k).collect();
        assert_eq!(asc, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(desc, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }
}
