//! Catalog Module
//!
//! Process-wide registry of keyspaces, tables, and schemas, persisted
//! inside the SYSTEM keyspace as ordinary tables.
//!
//! ## Responsibilities
//! - Keyspace/table DDL with write-through to SYSTEM.KEYSPACES / TABLES
//! - Lazy table-engine cache (one engine per table, opened on first use)
//! - Auth metadata lookups (SYSTEM.USERS / KEYSPACE_OWNERS / KEYSPACE_GRANTS)
//!
//! ## Bootstrap
//! SYSTEM's schemas are hard-coded ([`system`]) and its engines open
//! before any catalog row is read; the in-memory index is then rebuilt by
//! scanning SYSTEM.KEYSPACES and SYSTEM.TABLES. On first boot the SYSTEM
//! keyspace describes itself with seed rows.

pub mod schema;
pub mod system;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::TableEngine;
use crate::error::{LodeError, Result};
use crate::value::{Row, Value};
use schema::Schema;
use system::{
    grant_key, row_str, system_tables, user_from_row, UserRecord, KEYSPACES_TABLE,
    KEYSPACE_GRANTS_TABLE, KEYSPACE_OWNERS_TABLE, SYSTEM_KEYSPACE, TABLES_TABLE, USERS_TABLE,
};

/// Keyspace/table registry with lazy engine cache
pub struct Catalog {
    data_dir: PathBuf,
    engine_cfg: EngineConfig,

    /// keyspace → table → schema; DDL holds the write lock, reads the
    /// shared lock. Never held across engine I/O.
    inner: RwLock<BTreeMap<String, BTreeMap<String, Schema>>>,

    /// Open engines keyed `"<keyspace>.<table>"`
    engines: Mutex<HashMap<String, Arc<TableEngine>>>,
}

impl Catalog {
    /// Open the catalog, bootstrapping SYSTEM and rebuilding the index
    pub fn open(data_dir: &Path, engine_cfg: EngineConfig) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let mut map = BTreeMap::new();
        let mut sys: BTreeMap<String, Schema> = BTreeMap::new();
        for (table, schema) in system_tables() {
            sys.insert(table.to_string(), schema);
        }
        map.insert(SYSTEM_KEYSPACE.to_string(), sys);

        let catalog = Self {
            data_dir: data_dir.to_path_buf(),
            engine_cfg,
            inner: RwLock::new(map),
            engines: Mutex::new(HashMap::new()),
        };

        catalog.seed_system()?;
        catalog.load_index()?;
        Ok(catalog)
    }

    /// First-boot seed rows: SYSTEM describes itself
    fn seed_system(&self) -> Result<()> {
        let keyspaces = self.engine(SYSTEM_KEYSPACE, KEYSPACES_TABLE)?;
        if keyspaces.get(&str_val(SYSTEM_KEYSPACE))?.is_some() {
            return Ok(());
        }
        info!(data_dir = %self.data_dir.display(), "initializing data directory");

        let now = now_millis();
        let mut row = Row::new();
        row.insert("name".into(), str_val(SYSTEM_KEYSPACE));
        row.insert("created_at".into(), Value::Int(now));
        self.system_put(KEYSPACES_TABLE, row)?;

        for (table, schema) in system_tables() {
            let mut row = Row::new();
            row.insert("qualified".into(), str_val(&qualified(SYSTEM_KEYSPACE, table)));
            row.insert("keyspace".into(), str_val(SYSTEM_KEYSPACE));
            row.insert("table".into(), str_val(table));
            row.insert("schema_json".into(), str_val(&schema.to_json()?));
            row.insert("pk_column".into(), str_val(&schema.primary_key));
            row.insert("created_at".into(), Value::Int(now));
            self.system_put(TABLES_TABLE, row)?;
        }
        Ok(())
    }

    /// Rebuild the in-memory index by scanning SYSTEM.KEYSPACES / TABLES
    fn load_index(&self) -> Result<()> {
        let keyspaces = self.engine(SYSTEM_KEYSPACE, KEYSPACES_TABLE)?;
        for row in keyspaces.scan(false, None)? {
            let Some(name) = row_str(&row, "name") else {
                continue;
            };
            if name == SYSTEM_KEYSPACE {
                continue;
            }
            self.inner
                .write()
                .entry(name.to_string())
                .or_insert_with(BTreeMap::new);
        }

        let tables = self.engine(SYSTEM_KEYSPACE, TABLES_TABLE)?;
        for row in tables.scan(false, None)? {
            let (Some(ks), Some(table), Some(raw)) = (
                row_str(&row, "keyspace"),
                row_str(&row, "table"),
                row_str(&row, "schema_json"),
            ) else {
                continue;
            };
            if ks == SYSTEM_KEYSPACE {
                continue;
            }
            let schema = Schema::from_json(raw)?;
            let mut inner = self.inner.write();
            match inner.get_mut(ks) {
                Some(ks_map) => {
                    ks_map.insert(table.to_string(), schema);
                }
                None => {
                    warn!(keyspace = ks, table, "table row without keyspace row; skipping");
                }
            }
        }

        let inner = self.inner.read();
        debug!(keyspaces = inner.len() - 1, "catalog index loaded");
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn keyspace_exists(&self, keyspace: &str) -> bool {
        self.inner.read().contains_key(keyspace)
    }

    /// All keyspace names, sorted, SYSTEM included
    pub fn list_keyspaces(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Table names of one keyspace, sorted
    pub fn list_tables(&self, keyspace: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let tables = inner
            .get(keyspace)
            .ok_or_else(|| LodeError::NotFound(format!("keyspace {}", keyspace)))?;
        Ok(tables.keys().cloned().collect())
    }

    pub fn table_schema(&self, keyspace: &str, table: &str) -> Result<Schema> {
        let inner = self.inner.read();
        inner
            .get(keyspace)
            .and_then(|t| t.get(table))
            .cloned()
            .ok_or_else(|| LodeError::NotFound(format!("table {}", qualified(keyspace, table))))
    }

    /// The table's engine, opened on first reference
    pub fn engine(&self, keyspace: &str, table: &str) -> Result<Arc<TableEngine>> {
        {
            let inner = self.inner.read();
            inner
                .get(keyspace)
                .and_then(|t| t.get(table))
                .ok_or_else(|| {
                    LodeError::NotFound(format!("table {}", qualified(keyspace, table)))
                })?;
        }

        let key = qualified(keyspace, table);
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(&key) {
            return Ok(engine.clone());
        }
        let engine = Arc::new(TableEngine::open(
            self.table_dir(keyspace, table),
            self.engine_cfg,
        )?);
        engines.insert(key, engine.clone());
        Ok(engine)
    }

    /// Every currently open engine (fsync ticker and shutdown)
    pub fn open_engines(&self) -> Vec<Arc<TableEngine>> {
        self.engines.lock().values().cloned().collect()
    }

    // =========================================================================
    // DDL
    // =========================================================================

    pub fn create_keyspace(&self, name: &str, if_not_exists: bool) -> Result<()> {
        if self.keyspace_exists(name) {
            if if_not_exists {
                return Ok(());
            }
            return Err(LodeError::AlreadyExists(format!("keyspace {}", name)));
        }

        fs::create_dir_all(self.data_dir.join(name))?;
        let mut row = Row::new();
        row.insert("name".into(), str_val(name));
        row.insert("created_at".into(), Value::Int(now_millis()));
        self.system_put(KEYSPACES_TABLE, row)?;

        self.inner
            .write()
            .insert(name.to_string(), BTreeMap::new());
        info!(keyspace = name, "keyspace created");
        Ok(())
    }

    /// Drop a keyspace and everything in it: tables, engines, on-disk
    /// state, ownership and grant rows
    pub fn drop_keyspace(&self, name: &str, if_exists: bool) -> Result<()> {
        let tables = match self.inner.read().get(name) {
            Some(tables) => tables.keys().cloned().collect::<Vec<_>>(),
            None => {
                if if_exists {
                    return Ok(());
                }
                return Err(LodeError::NotFound(format!("keyspace {}", name)));
            }
        };

        for table in &tables {
            self.drop_table_storage(name, table)?;
            self.system_delete(TABLES_TABLE, str_val(&qualified(name, table)))?;
        }
        self.system_delete(KEYSPACE_OWNERS_TABLE, str_val(name))?;

        let prefix = format!("{}#", name);
        let grants = self.engine(SYSTEM_KEYSPACE, KEYSPACE_GRANTS_TABLE)?;
        for row in grants.scan(false, None)? {
            if let Some(key) = row_str(&row, "keyspace_username") {
                if key.starts_with(&prefix) {
                    grants.delete(str_val(key))?;
                }
            }
        }

        self.system_delete(KEYSPACES_TABLE, str_val(name))?;
        match fs::remove_dir_all(self.data_dir.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.inner.write().remove(name);
        info!(keyspace = name, tables = tables.len(), "keyspace dropped");
        Ok(())
    }

    pub fn create_table(
        &self,
        keyspace: &str,
        table: &str,
        schema: Schema,
        if_not_exists: bool,
    ) -> Result<()> {
        {
            let inner = self.inner.read();
            let ks_map = inner
                .get(keyspace)
                .ok_or_else(|| LodeError::NotFound(format!("keyspace {}", keyspace)))?;
            if ks_map.contains_key(table) {
                if if_not_exists {
                    return Ok(());
                }
                return Err(LodeError::AlreadyExists(format!(
                    "table {}",
                    qualified(keyspace, table)
                )));
            }
        }

        fs::create_dir_all(self.table_dir(keyspace, table))?;
        let mut row = Row::new();
        row.insert("qualified".into(), str_val(&qualified(keyspace, table)));
        row.insert("keyspace".into(), str_val(keyspace));
        row.insert("table".into(), str_val(table));
        row.insert("schema_json".into(), str_val(&schema.to_json()?));
        row.insert("pk_column".into(), str_val(&schema.primary_key));
        row.insert("created_at".into(), Value::Int(now_millis()));
        self.system_put(TABLES_TABLE, row)?;

        let mut inner = self.inner.write();
        if let Some(ks_map) = inner.get_mut(keyspace) {
            ks_map.insert(table.to_string(), schema);
        }
        info!(keyspace, table, "table created");
        Ok(())
    }

    pub fn drop_table(&self, keyspace: &str, table: &str, if_exists: bool) -> Result<()> {
        {
            let inner = self.inner.read();
            let exists = inner
                .get(keyspace)
                .is_some_and(|ks_map| ks_map.contains_key(table));
            if !exists {
                if if_exists {
                    return Ok(());
                }
                return Err(LodeError::NotFound(format!(
                    "table {}",
                    qualified(keyspace, table)
                )));
            }
        }

        self.drop_table_storage(keyspace, table)?;
        self.system_delete(TABLES_TABLE, str_val(&qualified(keyspace, table)))?;

        let mut inner = self.inner.write();
        if let Some(ks_map) = inner.get_mut(keyspace) {
            ks_map.remove(table);
        }
        info!(keyspace, table, "table dropped");
        Ok(())
    }

    /// Close and delete a table's storage, whether or not its engine is open
    fn drop_table_storage(&self, keyspace: &str, table: &str) -> Result<()> {
        let engine = self.engines.lock().remove(&qualified(keyspace, table));
        match engine {
            Some(engine) => engine.destroy()?,
            None => match fs::remove_dir_all(self.table_dir(keyspace, table)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    // =========================================================================
    // Auth metadata
    // =========================================================================

    /// Install or overwrite the configured admin user (config wins)
    pub fn ensure_admin(&self, username: &str, password: &str) -> Result<()> {
        let mut row = Row::new();
        row.insert("username".into(), str_val(username));
        row.insert("password".into(), str_val(password));
        row.insert("level".into(), Value::Int(system::LEVEL_ADMIN));
        row.insert("enabled".into(), Value::Bool(true));
        row.insert("created_at".into(), Value::Int(now_millis()));
        self.system_put(USERS_TABLE, row)?;
        info!(username, "admin user installed from config");
        Ok(())
    }

    pub fn lookup_user(&self, username: &str) -> Result<Option<UserRecord>> {
        let users = self.engine(SYSTEM_KEYSPACE, USERS_TABLE)?;
        Ok(users
            .get(&str_val(username))?
            .as_ref()
            .and_then(user_from_row))
    }

    /// Whether a user owns or is granted the keyspace
    pub fn user_can_access(&self, keyspace: &str, username: &str) -> Result<bool> {
        let owners = self.engine(SYSTEM_KEYSPACE, KEYSPACE_OWNERS_TABLE)?;
        if let Some(row) = owners.get(&str_val(keyspace))? {
            if row_str(&row, "owner_username") == Some(username) {
                return Ok(true);
            }
        }
        let grants = self.engine(SYSTEM_KEYSPACE, KEYSPACE_GRANTS_TABLE)?;
        Ok(grants.get(&str_val(&grant_key(keyspace, username)))?.is_some())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn system_put(&self, table: &str, row: Row) -> Result<()> {
        let schema = self.table_schema(SYSTEM_KEYSPACE, table)?;
        let pk = row
            .get(&schema.primary_key)
            .cloned()
            .ok_or_else(|| LodeError::Internal(format!("system row missing pk for {}", table)))?;
        self.engine(SYSTEM_KEYSPACE, table)?.put(pk, row)
    }

    fn system_delete(&self, table: &str, pk: Value) -> Result<()> {
        self.engine(SYSTEM_KEYSPACE, table)?.delete(pk)
    }

    fn table_dir(&self, keyspace: &str, table: &str) -> PathBuf {
        self.data_dir.join(keyspace).join(table)
    }
}

fn qualified(keyspace: &str, table: &str) -> String {
    format!("{}.{}", keyspace, table)
}

fn str_val(s: &str) -> Value {
    Value::Varchar(s.to_string())
}

/// Unix millis for `created_at` columns
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
