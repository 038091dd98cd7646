//! Table schemas
//!
//! A schema is an ordered column list plus the designated single-column
//! primary key. Schemas are immutable after CREATE TABLE and persist in
//! `SYSTEM.TABLES` as the serde_json `schema_json` column.

use serde::{Deserialize, Serialize};

use crate::error::{LodeError, Result};
use crate::value::DataType;

/// One column: name (case-sensitive as written) and fixed type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// Ordered column list + primary key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub primary_key: String,
}

impl Schema {
    /// Validate and build: the pk must be a declared column and column
    /// names must be unique
    pub fn new(columns: Vec<Column>, primary_key: String) -> Result<Self> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(LodeError::Schema(format!(
                    "duplicate column \"{}\"",
                    col.name
                )));
            }
        }
        if !columns.iter().any(|c| c.name == primary_key) {
            return Err(LodeError::Schema(format!(
                "primary key \"{}\" is not a declared column",
                primary_key
            )));
        }
        Ok(Self {
            columns,
            primary_key,
        })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Type of the primary key column
    pub fn pk_type(&self) -> DataType {
        // The constructor guarantees the pk column exists
        self.columns
            .iter()
            .find(|c| c.name == self.primary_key)
            .map(|c| c.data_type)
            .unwrap_or(DataType::Varchar)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LodeError::Internal(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| LodeError::Corrupt(format!("bad schema_json: {}", e)))
    }

    /// Reconstructed DDL text for SHOW CREATE TABLE
    pub fn create_statement(&self, keyspace: &str, table: &str) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type.name()))
            .collect();
        format!(
            "CREATE TABLE {}.{} ({}, PRIMARY KEY ({}));",
            keyspace,
            table,
            cols.join(", "),
            self.primary_key
        )
    }
}
