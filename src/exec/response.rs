//! Response envelopes
//!
//! Every statement produces exactly one JSON object on one line:
//! `{"ok":true, …}` with op-specific fields, or
//! `{"ok":false,"error":"<kind>"}`.

use serde_json::{json, Map, Value as Json};

use crate::catalog::schema::Schema;
use crate::error::LodeError;
use crate::value::Row;

/// Bare `{"ok":true}`
pub fn success() -> Json {
    json!({ "ok": true })
}

/// Failure envelope with the error's wire kind
pub fn failure(error: &LodeError) -> Json {
    json!({ "ok": false, "error": error.wire_kind() })
}

/// Project a row into a JSON object; absent columns render as null
pub fn row_json(projection: &[String], row: &Row) -> Json {
    let mut object = Map::with_capacity(projection.len());
    for column in projection {
        let value = row
            .get(column)
            .map(|v| v.to_json())
            .unwrap_or(Json::Null);
        object.insert(column.clone(), value);
    }
    Json::Object(object)
}

/// DESCRIBE TABLE payload
pub fn describe_json(keyspace: &str, table: &str, schema: &Schema) -> Json {
    let columns: Vec<Json> = schema
        .columns
        .iter()
        .map(|c| json!({ "name": c.name, "type": c.data_type.name() }))
        .collect();
    json!({
        "ok": true,
        "keyspace": keyspace,
        "table": table,
        "primaryKey": schema.primary_key,
        "columns": columns,
    })
}
