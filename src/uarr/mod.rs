//! UArr: the schemaless, byte-stable binary value codec (C1).
//!
//! Encoding of equal inputs is bit-identical: maps always emit entries in
//! the name table's insertion order (themselves lexicographically sorted
//! by key so two calls with the same logical object always agree), and
//! integers/floats are written little-endian.
//!
//! Header layout (36 bytes):
//!
//! ```text
//! offset  0..4   magic "UAR1"
//! offset  4..6   format version (u16 LE)
//! offset  6..20  reserved (zero)
//! offset 20..28  total length in bytes (u64 LE), header + body
//! offset 28..36  reserved (zero)
//! offset 36..    tagged body
//! ```

use crate::errors::FxdError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAGIC: [u8; 4] = *b"UAR1";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 36;

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL_FALSE: u8 = 1;
    pub const BOOL_TRUE: u8 = 2;
    pub const I32: u8 = 3;
    pub const I64: u8 = 4;
    pub const F64: u8 = 5;
    pub const STRING: u8 = 6;
    pub const ARRAY: u8 = 7;
    pub const OBJECT: u8 = 8;
}

/// A UArr value. `Object` keys are resolved against a detached name table so
/// decoders can reuse string pools across records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

/// Encode a scalar/array value with no object members (no name table
/// needed). Objects must go through [`encode_with_names`].
///
/// # Errors
/// Returns `InvalidArgument` if the value (or a nested value) is an
/// `Object`.
pub fn encode(value: &Value) -> Result<Vec<u8>, FxdError> {
    if contains_object(value) {
        return Err(FxdError::InvalidArgument(
            "encode() cannot serialize Object values; use encode_with_names".into(),
        ));
    }
    let mut body = Vec::new();
    write_value(&mut body, value, &[]);
    Ok(frame(body))
}

/// Encode a value that may contain objects, returning the frame plus the
/// detached, sorted name table referenced by object member indices.
pub fn encode_with_names(value: &Value) -> Result<(Vec<u8>, Vec<String>), FxdError> {
    let mut names: Vec<String> = Vec::new();
    collect_names(value, &mut names);
    names.sort();
    names.dedup();
    let mut body = Vec::new();
    write_value(&mut body, value, &names);
    Ok((frame(body), names))
}

/// Decode a frame produced by [`encode`] (no object members).
///
/// # Errors
/// Returns `InvalidFormat(InvalidMagic)` on header mismatch, `InvalidFormat`
/// (Truncated) when the declared length exceeds the buffer, and
/// `InvalidFormat` if an object tag is encountered with no name table.
pub fn decode(bytes: &[u8]) -> Result<Value, FxdError> {
    decode_with_names(bytes, &[])
}

/// Decode a frame produced by [`encode_with_names`], given that same name
/// table.
///
/// # Errors
/// Returns `InvalidFormat(InvalidMagic)` on header mismatch and
/// `InvalidFormat` (Truncated) when the declared length exceeds the buffer.
pub fn decode_with_names(bytes: &[u8], names: &[String]) -> Result<Value, FxdError> {
    if bytes.len() < HEADER_LEN {
        return Err(FxdError::InvalidFormat("Truncated: buffer shorter than header".into()));
    }
    if bytes[0..4] != MAGIC {
        return Err(FxdError::InvalidFormat("InvalidMagic".into()));
    }
    let total_len = u64::from_le_bytes(bytes[20..28].try_into().unwrap());
    let total_len = crate::utils::num::u64_to_usize(total_len)
        .ok_or_else(|| FxdError::InvalidFormat("Truncated: length overflow".into()))?;
    if total_len > bytes.len() {
        return Err(FxdError::InvalidFormat("Truncated: declared length exceeds buffer".into()));
    }
    let mut cursor = HEADER_LEN;
    let value = read_value(&bytes[..total_len], &mut cursor, names)?;
    Ok(value)
}

fn frame(body: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0u8; HEADER_LEN];
    out[0..4].copy_from_slice(&MAGIC);
    out[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    let total = crate::utils::num::usize_to_u64(HEADER_LEN + body.len());
    out[20..28].copy_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&body);
    out
}

fn contains_object(v: &Value) -> bool {
    match v {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(contains_object),
        _ => false,
    }
}

fn collect_names(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, val) in map {
                out.push(k.clone());
                collect_names(val, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|i| collect_names(i, out)),
        _ => {}
    }
}

fn name_index(names: &[String], name: &str) -> u32 {
    names.binary_search_by(|n| n.as_str().cmp(name)).map(|i| i as u32).unwrap_or(u32::MAX)
}

fn write_value(out: &mut Vec<u8>, v: &Value, names: &[String]) {
    match v {
        Value::Null => out.push(tag::NULL),
        Value::Bool(false) => out.push(tag::BOOL_FALSE),
        Value::Bool(true) => out.push(tag::BOOL_TRUE),
        Value::I32(i) => {
            out.push(tag::I32);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::I64(i) => {
            out.push(tag::I64);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::F64(f) => {
            out.push(tag::F64);
            out.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => {
            out.push(tag::STRING);
            write_bytes(out, s.as_bytes());
        }
        Value::Array(items) => {
            out.push(tag::ARRAY);
            out.extend_from_slice(&crate::utils::num::usize_to_u64(items.len()).to_le_bytes());
            for item in items {
                write_value(out, item, names);
            }
        }
        Value::Object(map) => {
            out.push(tag::OBJECT);
            out.extend_from_slice(&crate::utils::num::usize_to_u64(map.len()).to_le_bytes());
            for (k, val) in map {
                out.extend_from_slice(&name_index(names, k).to_le_bytes());
                write_value(out, val, names);
            }
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&crate::utils::num::usize_to_u64(bytes.len()).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_value(buf: &[u8], cursor: &mut usize, names: &[String]) -> Result<Value, FxdError> {
    let tag = *take(buf, cursor, 1)?.first().ok_or_else(|| trunc())?;
    Ok(match tag {
        tag::NULL => Value::Null,
        tag::BOOL_FALSE => Value::Bool(false),
        tag::BOOL_TRUE => Value::Bool(true),
        tag::I32 => Value::I32(i32::from_le_bytes(take(buf, cursor, 4)?.try_into().unwrap())),
        tag::I64 => Value::I64(i64::from_le_bytes(take(buf, cursor, 8)?.try_into().unwrap())),
        tag::F64 => Value::F64(f64::from_le_bytes(take(buf, cursor, 8)?.try_into().unwrap())),
        tag::STRING => {
            let bytes = read_bytes(buf, cursor)?;
            Value::String(String::from_utf8(bytes).map_err(|e| {
                FxdError::InvalidFormat(format!("non-utf8 string: {e}"))
            })?)
        }
        tag::ARRAY => {
            let len = read_len(buf, cursor)?;
            let mut items = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                items.push(read_value(buf, cursor, names)?);
            }
            Value::Array(items)
        }
        tag::OBJECT => {
            let len = read_len(buf, cursor)?;
            let mut map = BTreeMap::new();
            for _ in 0..len {
                let idx = u32::from_le_bytes(take(buf, cursor, 4)?.try_into().unwrap());
                let key = names
                    .get(idx as usize)
                    .cloned()
                    .ok_or_else(|| FxdError::InvalidFormat("unknown name index".into()))?;
                map.insert(key, read_value(buf, cursor, names)?);
            }
            Value::Object(map)
        }
        other => return Err(FxdError::InvalidFormat(format!("unknown tag {other}"))),
    })
}

fn read_len(buf: &[u8], cursor: &mut usize) -> Result<usize, FxdError> {
    let raw = u64::from_le_bytes(take(buf, cursor, 8)?.try_into().unwrap());
    crate::utils::num::u64_to_usize(raw).ok_or_else(trunc)
}

fn read_bytes(buf: &[u8], cursor: &mut usize) -> Result<Vec<u8>, FxdError> {
    let len = read_len(buf, cursor)?;
    Ok(take(buf, cursor, len)?.to_vec())
}

fn take<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], FxdError> {
    let end = cursor.checked_add(len).ok_or_else(trunc)?;
    if end > buf.len() {
        return Err(trunc());
    }
    let slice = &buf[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn trunc() -> FxdError {
    FxdError::InvalidFormat("Truncated".into())
}
