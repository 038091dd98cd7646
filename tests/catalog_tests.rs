//! Tests for the catalog and the SYSTEM keyspace
//!
//! These tests verify:
//! - Bootstrap creates a self-describing SYSTEM keyspace
//! - Keyspace/table DDL persists across reopen
//! - DROP KEYSPACE cascades to tables, grants, and on-disk state
//! - Auth metadata lookups (users, owners, grants)

use std::path::Path;

use lodedb::catalog::schema::{Column, Schema};
use lodedb::catalog::Catalog;
use lodedb::config::{Config, EngineConfig, WalFsync};
use lodedb::value::{DataType, Row, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn engine_config() -> EngineConfig {
    let mut cfg = Config::default().engine_config();
    cfg.wal_fsync = WalFsync::Always;
    cfg
}

fn open(dir: &Path) -> Catalog {
    Catalog::open(dir, engine_config()).unwrap()
}

fn users_schema() -> Schema {
    Schema::new(
        vec![
            Column {
                name: "id".into(),
                data_type: DataType::Int64,
            },
            Column {
                name: "name".into(),
                data_type: DataType::Varchar,
            },
        ],
        "id".into(),
    )
    .unwrap()
}

// =============================================================================
// Bootstrap Tests
// =============================================================================

#[test]
fn bootstrap_creates_system() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());

    assert!(catalog.keyspace_exists("SYSTEM"));
    assert_eq!(catalog.list_keyspaces(), vec!["SYSTEM".to_string()]);
    assert_eq!(
        catalog.list_tables("SYSTEM").unwrap(),
        vec![
            "KEYSPACES".to_string(),
            "KEYSPACE_GRANTS".to_string(),
            "KEYSPACE_OWNERS".to_string(),
            "TABLES".to_string(),
            "USERS".to_string(),
        ]
    );
}

#[test]
fn system_describes_itself_after_reopen() {
    let temp = TempDir::new().unwrap();
    drop(open(temp.path()));

    let catalog = open(temp.path());
    let schema = catalog.table_schema("SYSTEM", "USERS").unwrap();
    assert_eq!(schema.primary_key, "username");
}

// =============================================================================
// DDL Tests
// =============================================================================

#[test]
fn keyspace_and_table_ddl_persist() {
    let temp = TempDir::new().unwrap();
    {
        let catalog = open(temp.path());
        catalog.create_keyspace("myapp", false).unwrap();
        catalog
            .create_table("myapp", "users", users_schema(), false)
            .unwrap();
    }

    let catalog = open(temp.path());
    assert!(catalog.keyspace_exists("myapp"));
    assert_eq!(catalog.list_tables("myapp").unwrap(), vec!["users"]);
    assert_eq!(catalog.table_schema("myapp", "users").unwrap(), users_schema());
}

#[test]
fn create_keyspace_idempotency_rules() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());

    catalog.create_keyspace("ks", false).unwrap();
    catalog.create_keyspace("ks", true).unwrap();
    let err = catalog.create_keyspace("ks", false).unwrap_err();
    assert_eq!(err.wire_kind(), "already_exists");
}

#[test]
fn missing_references_are_not_found() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());

    assert_eq!(
        catalog.list_tables("nope").unwrap_err().wire_kind(),
        "not_found"
    );
    assert_eq!(
        catalog
            .create_table("nope", "t", users_schema(), false)
            .unwrap_err()
            .wire_kind(),
        "not_found"
    );
    assert_eq!(
        catalog.drop_keyspace("nope", false).unwrap_err().wire_kind(),
        "not_found"
    );
    catalog.drop_keyspace("nope", true).unwrap();
    catalog.drop_table("SYSTEM", "nope", true).unwrap();
}

#[test]
fn drop_keyspace_cascades() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());

    catalog.create_keyspace("ksA", false).unwrap();
    catalog
        .create_table("ksA", "users", users_schema(), false)
        .unwrap();
    let engine = catalog.engine("ksA", "users").unwrap();
    let mut row = Row::new();
    row.insert("id".into(), Value::Int(1));
    engine.put(Value::Int(1), row).unwrap();

    catalog.drop_keyspace("ksA", false).unwrap();
    assert!(!catalog.keyspace_exists("ksA"));
    assert!(!temp.path().join("ksA").exists());

    // And it stays gone after a reopen
    drop(catalog);
    let catalog = open(temp.path());
    assert!(!catalog.keyspace_exists("ksA"));
}

#[test]
fn drop_table_removes_storage() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());
    catalog.create_keyspace("ks", false).unwrap();
    catalog
        .create_table("ks", "t", users_schema(), false)
        .unwrap();
    catalog.engine("ks", "t").unwrap();

    catalog.drop_table("ks", "t", false).unwrap();
    assert!(!temp.path().join("ks").join("t").exists());
    assert_eq!(
        catalog.table_schema("ks", "t").unwrap_err().wire_kind(),
        "not_found"
    );
}

// =============================================================================
// Auth Metadata Tests
// =============================================================================

#[test]
fn ensure_admin_config_wins() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());

    catalog.ensure_admin("admin", "secret1").unwrap();
    let user = catalog.lookup_user("admin").unwrap().unwrap();
    assert!(user.is_admin());
    assert_eq!(user.password, "secret1");

    catalog.ensure_admin("admin", "secret2").unwrap();
    let user = catalog.lookup_user("admin").unwrap().unwrap();
    assert_eq!(user.password, "secret2");

    assert!(catalog.lookup_user("nobody").unwrap().is_none());
}

#[test]
fn ownership_and_grants() {
    let temp = TempDir::new().unwrap();
    let catalog = open(temp.path());
    catalog.create_keyspace("ksA", false).unwrap();
    catalog.create_keyspace("ksB", false).unwrap();

    let owners = catalog.engine("SYSTEM", "KEYSPACE_OWNERS").unwrap();
    let mut row = Row::new();
    row.insert("keyspace".into(), Value::Varchar("ksA".into()));
    row.insert("owner_username".into(), Value::Varchar("alice".into()));
    row.insert("created_at".into(), Value::Int(0));
    owners.put(Value::Varchar("ksA".into()), row).unwrap();

    let grants = catalog.engine("SYSTEM", "KEYSPACE_GRANTS").unwrap();
    let mut row = Row::new();
    row.insert("keyspace_username".into(), Value::Varchar("ksB#alice".into()));
    row.insert("created_at".into(), Value::Int(0));
    grants.put(Value::Varchar("ksB#alice".into()), row).unwrap();

    assert!(catalog.user_can_access("ksA", "alice").unwrap());
    assert!(catalog.user_can_access("ksB", "alice").unwrap());
    assert!(!catalog.user_can_access("ksA", "bob").unwrap());
    assert!(!catalog.user_can_access("ksC", "alice").unwrap());

    // Dropping the keyspace removes the grant row too
    catalog.drop_keyspace("ksB", false).unwrap();
    assert!(!catalog.user_can_access("ksB", "alice").unwrap());
}
