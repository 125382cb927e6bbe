//! Property test: randomly generated acyclic value trees survive a full
//! encode/decode round trip structurally intact.

use objectra::{duplicate, Registry, Value};
use proptest::prelude::*;

fn value_tree() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Undefined),
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::array),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::set),
            prop::collection::vec((inner.clone(), inner.clone()), 0..3).prop_map(Value::map),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4)
                .prop_map(|fields| Value::object(fields)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn acyclic_trees_round_trip(original in value_tree()) {
        let registry = Registry::with_builtins().unwrap();
        let copy = duplicate(&registry, &original).unwrap();
        prop_assert!(Value::deep_equal(&original, &copy));
    }

    #[test]
    fn duplication_is_stable_under_repetition(original in value_tree()) {
        let registry = Registry::with_builtins().unwrap();
        let once = duplicate(&registry, &original).unwrap();
        let twice = duplicate(&registry, &once).unwrap();
        prop_assert!(Value::deep_equal(&once, &twice));
    }
}
