//! Property tests for the compact-token codec.

use iap::jws;
use iap::JsonMap;
use proptest::prelude::*;
use serde_json::Value;

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(".{0,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn json_object() -> impl Strategy<Value = JsonMap> {
    prop::collection::btree_map(".{0,8}", json_value(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn encode_then_decode_returns_the_parts(
        header in json_object(),
        payload in json_object(),
        signature in prop::collection::vec(any::<u8>(), 1..96),
    ) {
        let token = jws::encode(&header, &payload, &signature).unwrap();
        prop_assert!(!token.contains('='));
        prop_assert_eq!(token.matches('.').count(), 2);

        let decoded = jws::decode(&token).unwrap();
        prop_assert_eq!(&decoded.header, &header);
        prop_assert_eq!(&decoded.payload, &payload);
        prop_assert_eq!(&decoded.signature, &signature);
        prop_assert_eq!(decoded.signing_input(), &token[..token.rfind('.').unwrap()]);
    }

    #[test]
    fn decode_never_panics_on_arbitrary_text(token in ".{0,128}") {
        let _ = jws::decode(&token);
    }
}
