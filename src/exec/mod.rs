//! Executor Module
//!
//! Runs parsed statements: auth gate, identifier resolution through the
//! catalog and the session's `USE` keyspace, literal type-checking
//! against the schema, engine/catalog dispatch, and JSON envelope
//! construction.

pub mod response;
pub mod session;

use std::sync::Arc;

use serde_json::{json, Value as Json};
use tracing::error;

use crate::catalog::schema::{Column, Schema};
use crate::catalog::system::SYSTEM_KEYSPACE;
use crate::db::Database;
use crate::error::{LodeError, Result};
use crate::sql::{self, Literal, Projection, ScanOrder, Statement, TableRef};
use crate::value::{Row, Value};
use session::{Principal, Session};

/// Statement executor bound to one database
pub struct Executor {
    db: Arc<Database>,
}

impl Executor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Execute one statement line, always yielding a response object
    pub fn execute(&self, session: &mut Session, line: &str) -> Json {
        match self.run(session, line) {
            Ok(response) => response,
            Err(e) => {
                if e.wire_kind() == "internal_error" {
                    error!(error = %e, "statement failed");
                }
                response::failure(&e)
            }
        }
    }

    fn run(&self, session: &mut Session, line: &str) -> Result<Json> {
        let statement = sql::parse(line)?;

        // With auth enabled, AUTH is the only statement an unauthenticated
        // session may run
        if self.db.auth_enabled()
            && session.principal.is_none()
            && !matches!(statement, Statement::Auth { .. })
        {
            return Err(LodeError::Unauthorized);
        }

        match statement {
            Statement::Ping => Ok(json!({ "ok": true, "result": "PONG" })),
            Statement::Auth { username, password } => self.auth(session, &username, &password),
            Statement::Use { keyspace } => self.use_keyspace(session, keyspace),
            Statement::ShowKeyspaces => self.show_keyspaces(session),
            Statement::ShowTables { keyspace } => self.show_tables(session, &keyspace),
            Statement::DescribeTable { table } => self.describe(session, &table),
            Statement::ShowCreateTable { table } => self.show_create(session, &table),
            Statement::CreateKeyspace {
                keyspace,
                if_not_exists,
            } => self.create_keyspace(session, &keyspace, if_not_exists),
            Statement::DropKeyspace { keyspace, if_exists } => {
                self.drop_keyspace(session, &keyspace, if_exists)
            }
            Statement::CreateTable {
                table,
                columns,
                primary_key,
                if_not_exists,
            } => self.create_table(session, &table, columns, primary_key, if_not_exists),
            Statement::DropTable { table, if_exists } => {
                self.drop_table(session, &table, if_exists)
            }
            Statement::TruncateTable { table } => self.truncate(session, &table),
            Statement::Insert {
                table,
                columns,
                rows,
            } => self.insert(session, &table, columns, rows),
            Statement::Select {
                table,
                projection,
                filter,
                order,
                limit,
            } => self.select(session, &table, projection, filter, order, limit),
            Statement::Update {
                table,
                assignments,
                filter,
            } => self.update(session, &table, assignments, filter),
            Statement::Delete { table, filter } => self.delete(session, &table, filter),
            Statement::Flush { table } => self.flush(session, &table),
        }
    }

    // =========================================================================
    // Session statements
    // =========================================================================

    fn auth(&self, session: &mut Session, username: &str, password: &str) -> Result<Json> {
        let user = self
            .db
            .catalog()
            .lookup_user(username)?
            .ok_or(LodeError::BadAuth)?;
        if !user.enabled || user.password != password {
            return Err(LodeError::BadAuth);
        }
        session.principal = Some(Principal {
            is_admin: user.is_admin(),
            username: user.username,
        });
        Ok(response::success())
    }

    fn use_keyspace(&self, session: &mut Session, keyspace: String) -> Result<Json> {
        self.check_keyspace(session, &keyspace, false)?;
        if !self.db.catalog().keyspace_exists(&keyspace) {
            return Err(LodeError::NotFound(format!("keyspace {}", keyspace)));
        }
        session.keyspace = Some(keyspace);
        Ok(response::success())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    fn show_keyspaces(&self, session: &Session) -> Result<Json> {
        let all = self.db.catalog().list_keyspaces();
        let visible: Vec<String> = match session.principal.as_ref() {
            Some(p) if p.is_admin => all,
            Some(p) => {
                let mut owned = Vec::new();
                for name in all {
                    if name != SYSTEM_KEYSPACE
                        && self.db.catalog().user_can_access(&name, &p.username)?
                    {
                        owned.push(name);
                    }
                }
                owned
            }
            None => all.into_iter().filter(|k| k != SYSTEM_KEYSPACE).collect(),
        };
        Ok(json!({ "ok": true, "keyspaces": visible }))
    }

    fn show_tables(&self, session: &Session, keyspace: &str) -> Result<Json> {
        self.check_keyspace(session, keyspace, false)?;
        let tables = self.db.catalog().list_tables(keyspace)?;
        Ok(json!({ "ok": true, "tables": tables }))
    }

    fn describe(&self, session: &Session, table: &TableRef) -> Result<Json> {
        let (keyspace, table, schema) = self.resolve(session, table)?;
        Ok(response::describe_json(&keyspace, &table, &schema))
    }

    fn show_create(&self, session: &Session, table: &TableRef) -> Result<Json> {
        let (keyspace, table, schema) = self.resolve(session, table)?;
        Ok(json!({
            "ok": true,
            "keyspace": keyspace,
            "table": table,
            "create": schema.create_statement(&keyspace, &table),
        }))
    }

    // =========================================================================
    // DDL
    // =========================================================================

    fn create_keyspace(
        &self,
        session: &Session,
        keyspace: &str,
        if_not_exists: bool,
    ) -> Result<Json> {
        self.check_keyspace(session, keyspace, true)?;
        self.db.catalog().create_keyspace(keyspace, if_not_exists)?;
        Ok(response::success())
    }

    fn drop_keyspace(&self, session: &Session, keyspace: &str, if_exists: bool) -> Result<Json> {
        self.check_keyspace(session, keyspace, true)?;
        if keyspace.eq_ignore_ascii_case(SYSTEM_KEYSPACE) {
            // Reserved even for admins
            return Err(LodeError::Forbidden);
        }
        self.db.catalog().drop_keyspace(keyspace, if_exists)?;
        Ok(response::success())
    }

    fn create_table(
        &self,
        session: &Session,
        table: &TableRef,
        columns: Vec<(String, crate::value::DataType)>,
        primary_key: String,
        if_not_exists: bool,
    ) -> Result<Json> {
        let keyspace = self.keyspace_of(session, table)?;
        self.check_keyspace(session, &keyspace, false)?;
        let columns = columns
            .into_iter()
            .map(|(name, data_type)| Column { name, data_type })
            .collect();
        let schema = Schema::new(columns, primary_key)?;
        self.db
            .catalog()
            .create_table(&keyspace, &table.table, schema, if_not_exists)?;
        Ok(response::success())
    }

    fn drop_table(&self, session: &Session, table: &TableRef, if_exists: bool) -> Result<Json> {
        let keyspace = self.keyspace_of(session, table)?;
        self.check_keyspace(session, &keyspace, false)?;
        self.db
            .catalog()
            .drop_table(&keyspace, &table.table, if_exists)?;
        Ok(response::success())
    }

    fn truncate(&self, session: &Session, table: &TableRef) -> Result<Json> {
        let (keyspace, table, _) = self.resolve(session, table)?;
        self.db.catalog().engine(&keyspace, &table)?.truncate()?;
        Ok(response::success())
    }

    fn flush(&self, session: &Session, table: &TableRef) -> Result<Json> {
        let (keyspace, table, _) = self.resolve(session, table)?;
        self.db.catalog().engine(&keyspace, &table)?.flush()?;
        Ok(response::success())
    }

    // =========================================================================
    // DML
    // =========================================================================

    fn insert(
        &self,
        session: &Session,
        table: &TableRef,
        columns: Vec<String>,
        tuples: Vec<Vec<Literal>>,
    ) -> Result<Json> {
        let (keyspace, table, schema) = self.resolve(session, table)?;

        for (i, name) in columns.iter().enumerate() {
            if schema.column(name).is_none() {
                return Err(LodeError::Schema(format!("unknown column \"{}\"", name)));
            }
            if columns[..i].contains(name) {
                return Err(LodeError::Schema(format!("duplicate column \"{}\"", name)));
            }
        }
        if !columns.contains(&schema.primary_key) {
            return Err(LodeError::Schema(format!(
                "INSERT must include primary key \"{}\"",
                schema.primary_key
            )));
        }

        // Bind every tuple before writing any of them
        let mut bound: Vec<(Value, Row)> = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            if tuple.len() != columns.len() {
                return Err(LodeError::Schema(format!(
                    "expected {} values, got {}",
                    columns.len(),
                    tuple.len()
                )));
            }
            let mut row = Row::new();
            for (name, literal) in columns.iter().zip(tuple) {
                let column = schema.column(name).ok_or_else(|| {
                    LodeError::Schema(format!("unknown column \"{}\"", name))
                })?;
                row.insert(name.clone(), literal.bind(column.data_type)?);
            }
            let pk = row
                .get(&schema.primary_key)
                .cloned()
                .filter(|v| !v.is_null())
                .ok_or_else(|| LodeError::Schema("primary key must not be null".into()))?;
            bound.push((pk, row));
        }

        let engine = self.db.catalog().engine(&keyspace, &table)?;
        for (pk, row) in bound {
            engine.put(pk, row)?;
        }
        Ok(response::success())
    }

    fn select(
        &self,
        session: &Session,
        table: &TableRef,
        projection: Projection,
        filter: Option<(String, Literal)>,
        order: Option<(String, ScanOrder)>,
        limit: Option<u64>,
    ) -> Result<Json> {
        let (keyspace, table, schema) = self.resolve(session, table)?;

        let projected: Vec<String> = match projection {
            Projection::All => schema.column_names(),
            Projection::Columns(columns) => {
                for name in &columns {
                    if schema.column(name).is_none() {
                        return Err(LodeError::Schema(format!("unknown column \"{}\"", name)));
                    }
                }
                columns
            }
        };
        let engine = self.db.catalog().engine(&keyspace, &table)?;

        if let Some((column, literal)) = filter {
            let pk = self.bind_pk(&schema, &column, &literal)?;
            return Ok(match engine.get(&pk)? {
                Some(row) => json!({
                    "ok": true,
                    "found": true,
                    "row": response::row_json(&projected, &row),
                }),
                None => json!({ "ok": true, "found": false }),
            });
        }

        if let Some((column, _)) = &order {
            if *column != schema.primary_key {
                return Err(LodeError::Schema(format!(
                    "ORDER BY is only supported on the primary key \"{}\"",
                    schema.primary_key
                )));
            }
        }
        let descending = matches!(order, Some((_, ScanOrder::Descending)));
        let rows = engine.scan(descending, limit.map(|n| n as usize))?;
        let rows: Vec<Json> = rows
            .iter()
            .map(|row| response::row_json(&projected, row))
            .collect();
        Ok(json!({ "ok": true, "rows": rows }))
    }

    fn update(
        &self,
        session: &Session,
        table: &TableRef,
        assignments: Vec<(String, Literal)>,
        filter: (String, Literal),
    ) -> Result<Json> {
        let (keyspace, table, schema) = self.resolve(session, table)?;

        let mut changes: Vec<(String, Value)> = Vec::with_capacity(assignments.len());
        for (name, literal) in &assignments {
            let column = schema
                .column(name)
                .ok_or_else(|| LodeError::Schema(format!("unknown column \"{}\"", name)))?;
            if *name == schema.primary_key {
                return Err(LodeError::Schema("cannot SET the primary key".into()));
            }
            changes.push((name.clone(), literal.bind(column.data_type)?));
        }

        let (column, literal) = filter;
        let pk = self.bind_pk(&schema, &column, &literal)?;
        let engine = self.db.catalog().engine(&keyspace, &table)?;

        // Upsert: keep the existing row's other columns, or start a fresh
        // row carrying just the pk
        let mut row = engine.get(&pk)?.unwrap_or_default();
        row.insert(schema.primary_key.clone(), pk.clone());
        for (name, value) in changes {
            row.insert(name, value);
        }
        engine.put(pk, row)?;
        Ok(response::success())
    }

    fn delete(
        &self,
        session: &Session,
        table: &TableRef,
        filter: (String, Literal),
    ) -> Result<Json> {
        let (keyspace, table, schema) = self.resolve(session, table)?;
        let (column, literal) = filter;
        let pk = self.bind_pk(&schema, &column, &literal)?;
        self.db.catalog().engine(&keyspace, &table)?.delete(pk)?;
        Ok(response::success())
    }

    // =========================================================================
    // Resolution and access control
    // =========================================================================

    /// Resolve a table reference to (keyspace, table, schema), applying
    /// access control
    fn resolve(&self, session: &Session, table: &TableRef) -> Result<(String, String, Schema)> {
        let keyspace = self.keyspace_of(session, table)?;
        self.check_keyspace(session, &keyspace, false)?;
        let schema = self.db.catalog().table_schema(&keyspace, &table.table)?;
        Ok((keyspace, table.table.clone(), schema))
    }

    fn keyspace_of(&self, session: &Session, table: &TableRef) -> Result<String> {
        table
            .keyspace
            .clone()
            .or_else(|| session.keyspace.clone())
            .ok_or_else(|| {
                LodeError::NotFound("no keyspace selected; qualify the table or USE one".into())
            })
    }

    /// Authorization matrix for one keyspace reference. `admin_op` marks
    /// keyspace DDL, which regular users may never run.
    fn check_keyspace(&self, session: &Session, keyspace: &str, admin_op: bool) -> Result<()> {
        let is_system = keyspace.eq_ignore_ascii_case(SYSTEM_KEYSPACE);
        if !self.db.auth_enabled() {
            // Open server: everything but SYSTEM is fair game
            if is_system {
                return Err(LodeError::Forbidden);
            }
            return Ok(());
        }
        let principal = session.principal.as_ref().ok_or(LodeError::Unauthorized)?;
        if principal.is_admin {
            return Ok(());
        }
        if is_system || admin_op {
            return Err(LodeError::Forbidden);
        }
        if self
            .db
            .catalog()
            .user_can_access(keyspace, &principal.username)?
        {
            Ok(())
        } else {
            Err(LodeError::Forbidden)
        }
    }

    /// Bind a WHERE literal against the primary key column
    fn bind_pk(&self, schema: &Schema, column: &str, literal: &Literal) -> Result<Value> {
        if column != schema.primary_key {
            return Err(LodeError::Schema(format!(
                "WHERE is only supported on the primary key \"{}\"",
                schema.primary_key
            )));
        }
        let pk = literal.bind(schema.pk_type())?;
        if pk.is_null() {
            return Err(LodeError::Schema("primary key must not be null".into()));
        }
        Ok(pk)
    }
}
