//! Per-connection session state
//!
//! A small connection-scoped record: the current `USE` keyspace and the
//! authenticated principal. Never stored in any process-wide map; a
//! failed statement leaves it untouched.

/// An authenticated user
#[derive(Debug, Clone)]
pub struct Principal {
    pub username: String,
    pub is_admin: bool,
}

/// Mutable per-connection state
#[derive(Debug, Default)]
pub struct Session {
    /// Current keyspace from `USE`, if any
    pub keyspace: Option<String>,

    /// Authenticated principal, if any
    pub principal: Option<Principal>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}
