//! The built-in SYSTEM keyspace
//!
//! SYSTEM holds the catalog's own persistence plus auth metadata, stored
//! as ordinary tables. Their schemas are hard-coded here so the catalog
//! can open their engines before reading any catalog row (breaking the
//! catalog-in-SYSTEM-in-catalog cycle).

use crate::catalog::schema::{Column, Schema};
use crate::value::{DataType, Row, Value};

pub const SYSTEM_KEYSPACE: &str = "SYSTEM";

pub const KEYSPACES_TABLE: &str = "KEYSPACES";
pub const TABLES_TABLE: &str = "TABLES";
pub const USERS_TABLE: &str = "USERS";
pub const KEYSPACE_OWNERS_TABLE: &str = "KEYSPACE_OWNERS";
pub const KEYSPACE_GRANTS_TABLE: &str = "KEYSPACE_GRANTS";

/// Admin principal level in `USERS.level`
pub const LEVEL_ADMIN: i64 = 0;
/// Regular user level in `USERS.level`
pub const LEVEL_USER: i64 = 1;

fn column(name: &str, data_type: DataType) -> Column {
    Column {
        name: name.to_string(),
        data_type,
    }
}

fn schema(columns: Vec<Column>, pk: &str) -> Schema {
    // Hard-coded definitions; the pk is always a declared column
    Schema {
        columns,
        primary_key: pk.to_string(),
    }
}

/// All SYSTEM tables with their fixed schemas, in listing order
pub fn system_tables() -> Vec<(&'static str, Schema)> {
    vec![
        (
            KEYSPACES_TABLE,
            schema(
                vec![
                    column("name", DataType::Varchar),
                    column("created_at", DataType::Int64),
                ],
                "name",
            ),
        ),
        (
            TABLES_TABLE,
            schema(
                vec![
                    column("qualified", DataType::Varchar),
                    column("keyspace", DataType::Varchar),
                    column("table", DataType::Varchar),
                    column("schema_json", DataType::Varchar),
                    column("pk_column", DataType::Varchar),
                    column("created_at", DataType::Int64),
                ],
                "qualified",
            ),
        ),
        (
            USERS_TABLE,
            schema(
                vec![
                    column("username", DataType::Varchar),
                    column("password", DataType::Varchar),
                    column("level", DataType::Int64),
                    column("enabled", DataType::Boolean),
                    column("created_at", DataType::Int64),
                ],
                "username",
            ),
        ),
        (
            KEYSPACE_OWNERS_TABLE,
            schema(
                vec![
                    column("keyspace", DataType::Varchar),
                    column("owner_username", DataType::Varchar),
                    column("created_at", DataType::Int64),
                ],
                "keyspace",
            ),
        ),
        (
            KEYSPACE_GRANTS_TABLE,
            schema(
                vec![
                    column("keyspace_username", DataType::Varchar),
                    column("created_at", DataType::Int64),
                ],
                "keyspace_username",
            ),
        ),
    ]
}

/// Composite key of a `KEYSPACE_GRANTS` row
pub fn grant_key(keyspace: &str, username: &str) -> String {
    format!("{}#{}", keyspace, username)
}

/// A decoded `SYSTEM.USERS` row
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    pub level: i64,
    pub enabled: bool,
}

impl UserRecord {
    pub fn is_admin(&self) -> bool {
        self.level == LEVEL_ADMIN
    }
}

/// Decode a USERS row; rows with missing or mistyped fields are ignored
pub fn user_from_row(row: &Row) -> Option<UserRecord> {
    Some(UserRecord {
        username: row_str(row, "username")?.to_string(),
        password: row_str(row, "password")?.to_string(),
        level: row_int(row, "level")?,
        enabled: matches!(row.get("enabled"), Some(Value::Bool(true))),
    })
}

pub fn row_str<'a>(row: &'a Row, col: &str) -> Option<&'a str> {
    match row.get(col) {
        Some(Value::Varchar(s)) => Some(s),
        _ => None,
    }
}

pub fn row_int(row: &Row, col: &str) -> Option<i64> {
    match row.get(col) {
        Some(Value::Int(n)) => Some(*n),
        _ => None,
    }
}
