//! Parsed statement forms

use crate::error::{LodeError, Result};
use crate::value::{self, DataType, Value};

/// A literal as written; bound to a [`Value`] once the column type is known
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Null,
}

impl Literal {
    /// Bind against a declared column type. Strings double as date and
    /// timestamp literals, distinguished here by the column's type.
    pub fn bind(&self, data_type: DataType) -> Result<Value> {
        match (self, data_type) {
            (Literal::Null, _) => Ok(Value::Null),
            (Literal::Int(n), DataType::Int64) => Ok(Value::Int(*n)),
            (Literal::Str(s), DataType::Varchar) => Ok(Value::Varchar(s.clone())),
            (Literal::Bool(b), DataType::Boolean) => Ok(Value::Bool(*b)),
            (Literal::Str(s), DataType::Date) => value::parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| type_err("date literal must be YYYY-MM-DD")),
            (Literal::Str(s), DataType::Timestamp) => value::parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| type_err("timestamp literal must be ISO-8601 with offset")),
            (Literal::Bytes(b), DataType::Binary) => Ok(Value::Binary(b.clone())),
            (other, data_type) => Err(type_err(&format!(
                "{} literal does not fit column type {}",
                other.kind_name(),
                data_type.name()
            ))),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int64",
            Literal::Str(_) => "string",
            Literal::Bool(_) => "boolean",
            Literal::Bytes(_) => "binary",
            Literal::Null => "null",
        }
    }
}

fn type_err(msg: &str) -> LodeError {
    LodeError::Schema(msg.to_string())
}

/// `keyspace.table`, or a bare table resolved against the session keyspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub keyspace: Option<String>,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `SELECT *`: all schema columns in schema order
    All,
    /// Explicit column list, in the order written
    Columns(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// One parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Ping,
    Auth {
        username: String,
        password: String,
    },
    Use {
        keyspace: String,
    },
    ShowKeyspaces,
    ShowTables {
        keyspace: String,
    },
    ShowCreateTable {
        table: TableRef,
    },
    DescribeTable {
        table: TableRef,
    },
    CreateKeyspace {
        keyspace: String,
        if_not_exists: bool,
    },
    DropKeyspace {
        keyspace: String,
        if_exists: bool,
    },
    CreateTable {
        table: TableRef,
        columns: Vec<(String, DataType)>,
        primary_key: String,
        if_not_exists: bool,
    },
    DropTable {
        table: TableRef,
        if_exists: bool,
    },
    TruncateTable {
        table: TableRef,
    },
    Insert {
        table: TableRef,
        columns: Vec<String>,
        rows: Vec<Vec<Literal>>,
    },
    Select {
        table: TableRef,
        projection: Projection,
        filter: Option<(String, Literal)>,
        order: Option<(String, ScanOrder)>,
        limit: Option<u64>,
    },
    Update {
        table: TableRef,
        assignments: Vec<(String, Literal)>,
        filter: (String, Literal),
    },
    Delete {
        table: TableRef,
        filter: (String, Literal),
    },
    Flush {
        table: TableRef,
    },
}
