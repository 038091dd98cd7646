//! Tagged binary record codec
//!
//! One record format is shared by the WAL and the SSTable body:
//!
//! ```text
//! record   := varuint(len) body
//! body     := u8(kind) pk_value [varuint(column_count) { column }]
//! column   := varuint(name_len) name_bytes value
//! value    := u8(tag) payload
//! tag      := 0 NULL | 1 INT64 | 2 VARCHAR | 3 BOOL | 4 DATE | 5 TIMESTAMP | 6 BINARY
//! ```
//!
//! `kind` 0 is a PUT (columns follow), `kind` 1 a DELETE (pk only).
//! Varuints are LEB128. There are no checksums: the length framing plus
//! whole-record discipline is the integrity mechanism, and a record that
//! does not fully decode is treated as a torn tail by the WAL reader.

use bytes::{Buf, BufMut};

use crate::error::{LodeError, Result};
use crate::value::{self, Row, Value};

/// Record kind byte: a live row
pub const KIND_PUT: u8 = 0;
/// Record kind byte: a tombstone
pub const KIND_DELETE: u8 = 1;

const TAG_NULL: u8 = 0;
const TAG_INT64: u8 = 1;
const TAG_VARCHAR: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_DATE: u8 = 4;
const TAG_TIMESTAMP: u8 = 5;
const TAG_BINARY: u8 = 6;

/// Upper bound on any framed length; anything larger is corruption
const MAX_RECORD_LEN: u64 = 1 << 30;

/// A durable mutation: the unit stored in the WAL and in SSTable bodies
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Put { pk: Value, row: Row },
    Delete { pk: Value },
}

impl Record {
    pub fn pk(&self) -> &Value {
        match self {
            Record::Put { pk, .. } => pk,
            Record::Delete { pk } => pk,
        }
    }

    /// Encode as a length-framed record
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(64);
        match self {
            Record::Put { pk, row } => {
                body.put_u8(KIND_PUT);
                put_value(&mut body, pk);
                put_varuint(&mut body, row.len() as u64);
                for (name, val) in row {
                    put_varuint(&mut body, name.len() as u64);
                    body.put_slice(name.as_bytes());
                    put_value(&mut body, val);
                }
            }
            Record::Delete { pk } => {
                body.put_u8(KIND_DELETE);
                put_value(&mut body, pk);
            }
        }
        let mut framed = Vec::with_capacity(body.len() + 4);
        put_varuint(&mut framed, body.len() as u64);
        framed.extend_from_slice(&body);
        framed
    }

    /// Decode one length-framed record, advancing `buf` past it
    pub fn decode(buf: &mut &[u8]) -> Result<Record> {
        let len = get_varuint(buf)?;
        if len > MAX_RECORD_LEN {
            return Err(corrupt("record length out of range"));
        }
        if (buf.len() as u64) < len {
            return Err(corrupt("record body shorter than framed length"));
        }
        let (mut body, rest) = buf.split_at(len as usize);
        *buf = rest;

        let kind = get_u8(&mut body)?;
        let pk = get_value(&mut body)?;
        let record = match kind {
            KIND_PUT => {
                let count = get_varuint(&mut body)?;
                let mut row = Row::new();
                for _ in 0..count {
                    let name_len = get_varuint(&mut body)? as usize;
                    if body.len() < name_len {
                        return Err(corrupt("column name truncated"));
                    }
                    let name = std::str::from_utf8(&body[..name_len])
                        .map_err(|_| corrupt("column name is not UTF-8"))?
                        .to_string();
                    body.advance(name_len);
                    let val = get_value(&mut body)?;
                    row.insert(name, val);
                }
                Record::Put { pk, row }
            }
            KIND_DELETE => Record::Delete { pk },
            other => return Err(corrupt(&format!("unknown record kind {}", other))),
        };
        if !body.is_empty() {
            return Err(corrupt("trailing bytes in record body"));
        }
        Ok(record)
    }
}

// =============================================================================
// Value encoding
// =============================================================================

pub fn put_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.put_u8(TAG_NULL),
        Value::Int(n) => {
            buf.put_u8(TAG_INT64);
            buf.put_i64_le(*n);
        }
        Value::Varchar(s) => {
            buf.put_u8(TAG_VARCHAR);
            put_varuint(buf, s.len() as u64);
            buf.put_slice(s.as_bytes());
        }
        Value::Bool(b) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(u8::from(*b));
        }
        Value::Date(d) => {
            buf.put_u8(TAG_DATE);
            buf.put_i32_le(value::date_to_days(d));
        }
        Value::Timestamp(t) => {
            buf.put_u8(TAG_TIMESTAMP);
            buf.put_i64_le(value::timestamp_to_millis(t));
        }
        Value::Binary(b) => {
            buf.put_u8(TAG_BINARY);
            put_varuint(buf, b.len() as u64);
            buf.put_slice(b);
        }
    }
}

pub fn get_value(buf: &mut &[u8]) -> Result<Value> {
    let tag = get_u8(buf)?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_INT64 => Ok(Value::Int(get_i64_le(buf)?)),
        TAG_VARCHAR => {
            let len = get_varuint(buf)? as usize;
            if buf.len() < len {
                return Err(corrupt("varchar payload truncated"));
            }
            let s = std::str::from_utf8(&buf[..len])
                .map_err(|_| corrupt("varchar payload is not UTF-8"))?
                .to_string();
            buf.advance(len);
            Ok(Value::Varchar(s))
        }
        TAG_BOOL => match get_u8(buf)? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(corrupt(&format!("invalid bool payload {}", other))),
        },
        TAG_DATE => {
            if buf.len() < 4 {
                return Err(corrupt("date payload truncated"));
            }
            let days = buf.get_i32_le();
            value::date_from_days(days)
                .map(Value::Date)
                .ok_or_else(|| corrupt("date payload out of range"))
        }
        TAG_TIMESTAMP => {
            let millis = get_i64_le(buf)?;
            value::timestamp_from_millis(millis)
                .map(Value::Timestamp)
                .ok_or_else(|| corrupt("timestamp payload out of range"))
        }
        TAG_BINARY => {
            let len = get_varuint(buf)? as usize;
            if buf.len() < len {
                return Err(corrupt("binary payload truncated"));
            }
            let bytes = buf[..len].to_vec();
            buf.advance(len);
            Ok(Value::Binary(bytes))
        }
        other => Err(corrupt(&format!("unknown value tag {}", other))),
    }
}

// =============================================================================
// Primitives
// =============================================================================

/// LEB128 unsigned
pub fn put_varuint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

pub fn get_varuint(buf: &mut &[u8]) -> Result<u64> {
    let mut v: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = get_u8(buf)?;
        v |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(v);
        }
        shift += 7;
        if shift >= 64 {
            return Err(corrupt("varuint too long"));
        }
    }
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(corrupt("unexpected end of record"));
    }
    Ok(buf.get_u8())
}

fn get_i64_le(buf: &mut &[u8]) -> Result<i64> {
    if buf.len() < 8 {
        return Err(corrupt("unexpected end of record"));
    }
    Ok(buf.get_i64_le())
}

fn corrupt(msg: &str) -> LodeError {
    LodeError::Corrupt(msg.to_string())
}
