//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging, one segment
//! file per table (`wal-<seq>.log`).
//!
//! ## Responsibilities
//! - Append framed records before any memtable mutation
//! - Enforce the configured fsync policy (`always` / `periodic` / `off`)
//! - Replay records in append order on engine open
//! - Truncate torn tail records left by a crash
//!
//! ## File format
//! ```text
//! ┌─────────────────────────────┐
//! │ varuint(len) │ record body  │
//! ├─────────────────────────────┤
//! │ varuint(len) │ record body  │
//! └─────────────────────────────┘
//! ```
//!
//! There are no checksums; a record whose length prefix or body does not
//! fully decode is a torn tail and the file is truncated back to the last
//! intact record on replay.

mod reader;
mod writer;

pub use reader::{replay, WalReplay};
pub use writer::WalWriter;
