//! SSTable Module
//!
//! Sorted String Table — immutable on-disk sorted row storage, one file
//! per flush (`sst-<seq>.dat`).
//!
//! ## File format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                         │
//! │   Magic: u32_le (4) | Version: u16_le (2)                │
//! ├──────────────────────────────────────────────────────────┤
//! │ Body (variable)                                          │
//! │   framed records in ascending pk order                   │
//! │   (same codec as the WAL; DELETE records are tombstones) │
//! ├──────────────────────────────────────────────────────────┤
//! │ Sparse index (variable)                                  │
//! │   varuint(count) { Offset: u64_le | pk value }           │
//! │   one entry per `sstableIndexStride` records             │
//! ├──────────────────────────────────────────────────────────┤
//! │ Footer (20 bytes)                                        │
//! │   IndexOffset: u64_le | RecordCount: u64_le | Magic: u32 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The builder writes to `sst-<seq>.dat.tmp` and renames into place after
//! an fsync; the rename is the only commit point. Recovery deletes any
//! leftover `.tmp` files.

mod builder;
mod reader;

pub use builder::SSTableBuilder;
pub use reader::SSTableReader;

/// Magic bytes identifying a LodeDB SSTable file ("LODE")
pub(crate) const MAGIC: u32 = 0x4C4F_4445;

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2)
pub(crate) const HEADER_SIZE: u64 = 6;

/// Footer size: IndexOffset (8) + RecordCount (8) + Magic (4)
pub(crate) const FOOTER_SIZE: u64 = 20;
