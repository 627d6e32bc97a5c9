//! The UArr codec round-trips nested structures including objects, and
//! rejects malformed input rather than panicking.

use fxd_core::uarr::{decode, decode_with_names, encode, encode_with_names, Value};
use std::collections::BTreeMap;

#[test]
fn scalar_and_array_round_trip_without_a_name_table() {
    let value = Value::Array(vec![
        Value::Null,
        Value::Bool(true),
        Value::I32(-7),
        Value::I64(9_000_000_000),
        Value::F64(1.5),
        Value::String("hello".to_string()),
    ]);
    let bytes = encode(&value).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn nested_object_round_trips_through_name_table() {
    let mut inner = BTreeMap::new();
    inner.insert("lang".to_string(), Value::String("rust".to_string()));
    inner.insert("priority".to_string(), Value::I32(3));
    let mut outer = BTreeMap::new();
    outer.insert("meta".to_string(), Value::Object(inner));
    outer.insert("children".to_string(), Value::Array(vec![Value::String("a".to_string())]));
    let value = Value::Object(outer);

    let (bytes, names) = encode_with_names(&value).unwrap();
    let decoded = decode_with_names(&bytes, &names).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn equal_objects_encode_to_identical_bytes() {
    let mut a = BTreeMap::new();
    a.insert("z".to_string(), Value::I32(1));
    a.insert("a".to_string(), Value::I32(2));
    let value = Value::Object(a);

    let (bytes1, _) = encode_with_names(&value).unwrap();
    let (bytes2, _) = encode_with_names(&value).unwrap();
    assert_eq!(bytes1, bytes2);
}

#[test]
fn encode_rejects_object_without_name_table_path() {
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), Value::Null);
    let value = Value::Object(map);
    assert!(encode(&value).is_err());
}

#[test]
fn decode_rejects_truncated_buffer() {
    let bytes = encode(&Value::I32(1)).unwrap();
    let truncated = &bytes[..bytes.len() - 2];
    assert!(decode(truncated).is_err());
}

#[test]
fn decode_rejects_bad_magic() {
    let mut bytes = encode(&Value::Bool(true)).unwrap();
    bytes[0] = b'X';
    assert!(decode(&bytes).is_err());
}
