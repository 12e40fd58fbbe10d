//! JSON patch round-trip property: apply(copy(prev), diff(prev, next)) == next.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use proptest::prelude::*;
use serde_json::{Map, Value};

use tandem_core::sync::{apply_patch, create_patch};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z~/]{0,6}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-c~/]{1,3}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
    })
}

proptest! {
    #[test]
    fn patch_round_trip(prev in arb_json(), next in arb_json()) {
        let ops = create_patch(&prev, &next);
        let mut target = prev.clone();
        apply_patch(&mut target, &ops).unwrap();
        prop_assert_eq!(target, next);
    }

    #[test]
    fn identical_trees_diff_to_nothing(v in arb_json()) {
        prop_assert!(create_patch(&v, &v.clone()).is_empty());
    }

    #[test]
    fn patch_survives_the_wire(prev in arb_json(), next in arb_json()) {
        let ops = create_patch(&prev, &next);
        let text = serde_json::to_string(&ops).unwrap();
        let back: Vec<tandem_core::sync::PatchOp> = serde_json::from_str(&text).unwrap();
        let mut target = prev.clone();
        apply_patch(&mut target, &back).unwrap();
        prop_assert_eq!(target, next);
    }
}
