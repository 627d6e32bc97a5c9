//! Property: encoding then decoding any scalar/array `Value` yields the
//! original value back, for arbitrary inputs proptest can generate.

use fxd_core::uarr::{decode, encode, Value};
use proptest::prelude::*;

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::I32),
        any::<i64>().prop_map(Value::I64),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::F64),
        ".{0,32}".prop_map(Value::String),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 32, 8, |inner| {
        prop::collection::vec(inner, 0..8).prop_map(Value::Array)
    })
}

proptest! {
    #[test]
    fn scalar_or_array_round_trips(value in arb_value()) {
        let bytes = encode(&value).unwrap();
        let decoded = decode(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
    }
}
