// Property tests for parameter encoding and request combining
// Combining must not depend on which of two requests arrived first

use mwapi_core::{combine_params, encode_params, params, ParamValue, Params, Scalar, WireParams};
use proptest::prelude::*;

fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        "[a-z|]{0,6}".prop_map(Scalar::String),
        (-1000i64..1000).prop_map(Scalar::Integer),
        any::<bool>().prop_map(Scalar::Bool),
        Just(Scalar::Null),
    ]
}

fn value_strategy() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        scalar_strategy().prop_map(ParamValue::Scalar),
        prop::collection::vec(scalar_strategy(), 0..4).prop_map(ParamValue::List),
        prop::collection::vec("[a-z]{1,8}", 0..4).prop_map(|items| ParamValue::set(items)),
    ]
}

fn params_strategy() -> impl Strategy<Value = Params> {
    prop::collection::vec(
        (
            prop::sample::select(vec![
                "action", "meta", "list", "prop", "titles", "generator", "formatversion",
            ]),
            value_strategy(),
        ),
        0..5,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    })
}

fn sorted(wire: WireParams) -> Vec<(String, Option<String>)> {
    let mut pairs: Vec<_> = wire
        .into_iter()
        .map(|(key, value)| (key, value.as_text().map(str::to_string)))
        .collect();
    pairs.sort();
    pairs
}

proptest! {
    #[test]
    fn prop_combine_is_commutative(a in params_strategy(), b in params_strategy()) {
        let ab = combine_params(&a, &b);
        let ba = combine_params(&b, &a);
        prop_assert_eq!(ab.is_some(), ba.is_some());
        if let (Some(ab), Some(ba)) = (ab, ba) {
            prop_assert_eq!(sorted(encode_params(&ab)), sorted(encode_params(&ba)));
        }
    }

    #[test]
    fn prop_request_combines_with_itself(a in params_strategy()) {
        let specifies = |key: &str| a.get(key).is_some_and(|value| value.encode_text().is_some());
        prop_assume!(!(specifies("generator") && specifies("titles")));
        let merged = combine_params(&a, &a);
        prop_assert!(merged.is_some());
        prop_assert_eq!(sorted(encode_params(&merged.unwrap())), sorted(encode_params(&a)));
    }

    #[test]
    fn prop_encoding_is_pure(value in value_strategy()) {
        prop_assert_eq!(value.encode_text(), value.clone().encode_text());
    }

    #[test]
    fn prop_generator_never_merges_with_titles(title in "[A-Z][a-z]{0,8}", generator in "[a-z]{1,8}") {
        let with_generator = params! {"action" => "query", "generator" => generator};
        let with_titles = params! {"action" => "query", "titles" => title};
        prop_assert!(combine_params(&with_generator, &with_titles).is_none());
        prop_assert!(combine_params(&with_titles, &with_generator).is_none());
    }
}

#[test]
fn test_set_union_wire_value() {
    let a = params! {"action" => "query", "meta" => ParamValue::set(["siteinfo"])};
    let b = params! {"action" => "query", "meta" => ParamValue::set(["userinfo"])};
    let merged = combine_params(&a, &b).unwrap();
    assert_eq!(encode_params(&merged)["meta"].as_text(), Some("siteinfo|userinfo"));
    let merged = combine_params(&b, &a).unwrap();
    assert_eq!(encode_params(&merged)["meta"].as_text(), Some("siteinfo|userinfo"));
}
