//! Property: wrapping an arbitrary body and scanning it back out always
//! recovers that body (modulo the canonical single-trailing-newline
//! form) with a matching checksum, for any language's comment style.

use fxd_core::marker::{to_patches, wrap};
use proptest::prelude::*;
use std::collections::HashMap;

fn arb_lang() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("rust"),
        Just("python"),
        Just("html"),
        Just("sql"),
        Just("ini"),
        Just("javascript"),
    ]
}

proptest! {
    #[test]
    fn wrap_then_scan_recovers_body_and_checksum(
        body in "[a-zA-Z0-9_ ]{0,20}(\n[a-zA-Z0-9_ ]{0,20}){0,5}",
        lang in arb_lang(),
    ) {
        let rendered = wrap("sid", &body, lang, &HashMap::new());
        let patches = to_patches(&rendered);
        prop_assert_eq!(patches.len(), 1);
        prop_assert!(patches[0].checksum_matches());
        let expected = if body.is_empty() || body.ends_with('\n') { body.clone() } else { format!("{body}\n") };
        prop_assert_eq!(&patches[0].body, &expected);
    }
}
