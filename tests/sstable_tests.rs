//! Tests for SSTable building and reading
//!
//! These tests verify:
//! - Build + reopen round trips through the sparse index
//! - Point lookups inside and between index entries
//! - Forward and backward scans
//! - The rename-commit discipline (no .tmp file survives finish)

use std::path::PathBuf;

use lodedb::codec::Record;
use lodedb::memtable::RowEntry;
use lodedb::storage::sstable::{SSTableBuilder, SSTableReader};
use lodedb::value::{Row, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sst-1.dat");
    (temp_dir, path)
}

fn put_record(pk: i64) -> Record {
    let mut row = Row::new();
    row.insert("id".into(), Value::Int(pk));
    row.insert("name".into(), Value::Varchar(format!("row{}", pk)));
    Record::Put {
        pk: Value::Int(pk),
        row,
    }
}

/// Build a table holding pks 0, 2, 4, … 2(n-1) with the given stride
fn build_even_pks(path: &PathBuf, n: i64, stride: usize) {
    let mut builder = SSTableBuilder::create(path, stride).unwrap();
    for pk in (0..n).map(|i| i * 2) {
        builder.add(&put_record(pk)).unwrap();
    }
    builder.finish().unwrap();
}

// =============================================================================
// Build / Read Tests
// =============================================================================

#[test]
fn build_and_point_lookup() {
    let (_temp, path) = setup();
    build_even_pks(&path, 10, 3);

    let reader = SSTableReader::open(&path, 1).unwrap();
    assert_eq!(reader.record_count(), 10);

    // Every stored pk is found, with its row intact
    for pk in (0..10).map(|i| i * 2) {
        match reader.get(&Value::Int(pk)).unwrap() {
            Some(RowEntry::Row(row)) => {
                assert_eq!(row.get("id"), Some(&Value::Int(pk)));
            }
            other => panic!("pk {} missing: {:?}", pk, other),
        }
    }

    // Gaps, below-range, and above-range all miss
    assert_eq!(reader.get(&Value::Int(3)).unwrap(), None);
    assert_eq!(reader.get(&Value::Int(-1)).unwrap(), None);
    assert_eq!(reader.get(&Value::Int(100)).unwrap(), None);
}

#[test]
fn lookup_works_for_every_stride() {
    let (temp, _) = setup();
    for stride in [1usize, 2, 4, 16, 64] {
        let path = temp.path().join(format!("sst-{}.dat", stride));
        build_even_pks(&path, 23, stride);
        let reader = SSTableReader::open(&path, 1).unwrap();
        for pk in (0..23).map(|i| i * 2) {
            assert!(
                reader.get(&Value::Int(pk)).unwrap().is_some(),
                "stride {} pk {}",
                stride,
                pk
            );
        }
        assert_eq!(reader.get(&Value::Int(7)).unwrap(), None);
    }
}

#[test]
fn tombstones_read_back_as_tombstones() {
    let (_temp, path) = setup();
    let mut builder = SSTableBuilder::create(&path, 4).unwrap();
    builder.add(&put_record(1)).unwrap();
    builder.add(&Record::Delete { pk: Value::Int(2) }).unwrap();
    builder.add(&put_record(3)).unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path, 1).unwrap();
    assert_eq!(
        reader.get(&Value::Int(2)).unwrap(),
        Some(RowEntry::Tombstone)
    );
    assert!(matches!(
        reader.get(&Value::Int(1)).unwrap(),
        Some(RowEntry::Row(_))
    ));
}

#[test]
fn out_of_order_add_is_rejected() {
    let (_temp, path) = setup();
    let mut builder = SSTableBuilder::create(&path, 4).unwrap();
    builder.add(&put_record(5)).unwrap();
    assert!(builder.add(&put_record(3)).is_err());
    assert!(builder.add(&put_record(5)).is_err());
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn forward_and_backward_scans_are_reverses() {
    let (_temp, path) = setup();
    build_even_pks(&path, 11, 4);
    let reader = SSTableReader::open(&path, 1).unwrap();

    let asc: Vec<Value> = reader
        .iter()
        .map(|r| r.unwrap().0)
        .collect();
    let mut desc: Vec<Value> = reader
        .iter_desc()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(asc.len(), 11);
    desc.reverse();
    assert_eq!(asc, desc);
}

#[test]
fn varchar_pks_scan_in_byte_order() {
    let (_temp, path) = setup();
    let mut builder = SSTableBuilder::create(&path, 2).unwrap();
    for name in ["alpha", "beta", "delta", "gamma"] {
        let mut row = Row::new();
        row.insert("name".into(), Value::Varchar(name.into()));
        builder
            .add(&Record::Put {
                pk: Value::Varchar(name.into()),
                row,
            })
            .unwrap();
    }
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path, 1).unwrap();
    let keys: Vec<Value> = reader.iter().map(|r| r.unwrap().0).collect();
    assert_eq!(
        keys,
        vec![
            Value::Varchar("alpha".into()),
            Value::Varchar("beta".into()),
            Value::Varchar("delta".into()),
            Value::Varchar("gamma".into()),
        ]
    );
    assert!(matches!(
        reader.get(&Value::Varchar("delta".into())).unwrap(),
        Some(RowEntry::Row(_))
    ));
}

// =============================================================================
// Commit Discipline Tests
// =============================================================================

#[test]
fn finish_leaves_no_tmp_file() {
    let (temp, path) = setup();
    build_even_pks(&path, 3, 2);

    let names: Vec<String> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["sst-1.dat".to_string()]);
}

#[test]
fn unfinished_builder_leaves_only_tmp() {
    let (temp, path) = setup();
    let mut builder = SSTableBuilder::create(&path, 2).unwrap();
    builder.add(&put_record(1)).unwrap();
    drop(builder); // simulated crash before finish

    assert!(!path.exists());
    assert!(temp.path().join("sst-1.dat.tmp").exists());
}
