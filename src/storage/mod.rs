//! Storage Module
//!
//! Persistent storage layer: immutable sorted table files plus the k-way
//! merge that combines them with the memtable for ordered scans.

pub mod merge;
pub mod sstable;
