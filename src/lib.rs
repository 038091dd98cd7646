//! # LodeDB
//!
//! A single-node, persistent, row-oriented keyspace/table database with:
//! - An LSM storage engine per table (WAL, memtable, SSTables)
//! - A catalog persisted inside the built-in SYSTEM keyspace
//! - A small SQL-like dialect over a line-delimited TCP protocol
//! - Optional authentication with per-keyspace ownership and grants
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │            (line in → one JSON line out)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Parser → Executor                           │
//! │        (auth gate, catalog resolve, type check)             │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!     ┌─────────────┐               ┌──────────────┐
//!     │   Catalog   │               │ Table Engine │
//!     │  (SYSTEM)   │               │  (per table) │
//!     └─────────────┘               └──────┬───────┘
//!                              ┌───────────┼───────────┐
//!                              ▼           ▼           ▼
//!                          ┌──────┐  ┌──────────┐ ┌─────────┐
//!                          │ WAL  │  │ MemTable │ │ SSTables│
//!                          └──────┘  └──────────┘ └─────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod value;
pub mod codec;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;
pub mod catalog;
pub mod sql;
pub mod exec;
pub mod db;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use db::Database;
pub use engine::TableEngine;
pub use error::{LodeError, Result};
pub use network::Server;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LodeDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
