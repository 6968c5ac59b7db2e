//! Property-based tests using proptest
//!
//! These tests verify name conversion, update masks, mutate batching and
//! error translation using randomized inputs.

use gads_client::ads::client::normalize_customer_id;
use gads_client::ads::errors::translate;
use gads_client::request::case::to_snake_case;
use gads_client::request::field_mask::field_mask;
use gads_client::request::{build_mutate_request, MutateOperation, MutateOptions};
use gads_client::AdsError;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tonic::{Code, Status};

/// Generate a scalar JSON value, defaults included
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,5}".prop_map(Value::String),
    ]
}

/// Generate a flat entity with snake_case keys and a resource name
fn arb_entity() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z][a-z_]{0,9}", arb_scalar(), 0..12).prop_map(|fields| {
        let mut map: Map<String, Value> = fields.into_iter().collect();
        map.insert(
            "resource_name".to_string(),
            Value::String("customers/1234567890/campaigns/1".to_string()),
        );
        map
    })
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() != Some(0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn arb_entity_type() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("campaign"),
        Just("adGroup"),
        Just("AdGroupAd"),
        Just("campaign_budget"),
        Just("adGroupCriterion"),
    ]
}

proptest! {
    /// snake_case conversion is idempotent and never leaves uppercase
    #[test]
    fn test_snake_case_idempotent(name in "[a-zA-Z][a-zA-Z0-9]{0,24}") {
        let once = to_snake_case(&name);
        prop_assert_eq!(to_snake_case(&once), once.clone());
        prop_assert!(!once.chars().any(|c| c.is_uppercase()));
        prop_assert!(!once.starts_with('_'));
    }

    /// The mask is exactly the set fields, never the resource name
    #[test]
    fn test_field_mask_matches_set_fields(entity in arb_entity()) {
        let paths = field_mask(&Value::Object(entity.clone())).paths;

        let mut expected: Vec<String> = entity
            .iter()
            .filter(|(key, value)| key.as_str() != "resource_name" && is_set(value))
            .map(|(key, _)| key.clone())
            .collect();
        expected.sort();

        let mut actual = paths.clone();
        actual.sort();
        prop_assert_eq!(actual, expected);
        prop_assert!(!paths.iter().any(|p| p == "resource_name"));
    }

    /// Batched operations keep caller order
    #[test]
    fn test_mutate_batch_preserves_order(entities in prop::collection::vec(arb_entity_type(), 1..20)) {
        let operations: Vec<MutateOperation> = entities
            .iter()
            .enumerate()
            .map(|(i, entity)| MutateOperation::create(entity, json!({"name": format!("item-{}", i)})))
            .collect();

        let body = build_mutate_request("1234567890", &operations, &MutateOptions::default()).unwrap();
        let envelopes = body["mutate_operations"].as_array().unwrap();
        prop_assert_eq!(envelopes.len(), entities.len());

        for (i, (envelope, entity)) in envelopes.iter().zip(&entities).enumerate() {
            let key = format!("{}_operation", to_snake_case(entity));
            let expected = format!("item-{}", i);
            prop_assert_eq!(envelope[key.as_str()]["create"]["name"].as_str(), Some(expected.as_str()));
        }
    }

    /// Statuses without failure metadata pass through unchanged
    #[test]
    fn test_translate_identity(code in 0i32..17, message in "[ -~]{0,40}") {
        let status = Status::new(Code::from_i32(code), message.clone());
        match translate(status) {
            AdsError::Transport(status) => {
                prop_assert_eq!(status.code(), Code::from_i32(code));
                prop_assert_eq!(status.message(), message.as_str());
            }
            other => prop_assert!(false, "expected transport error, got {:?}", other),
        }
    }

    /// Dashed and plain customer ids normalize to the same digits
    #[test]
    fn test_customer_id_normalization(digits in "[0-9]{10}") {
        let dashed = format!("{}-{}-{}", &digits[0..3], &digits[3..6], &digits[6..10]);
        prop_assert_eq!(normalize_customer_id(&dashed).unwrap(), digits.clone());
        prop_assert_eq!(normalize_customer_id(&digits).unwrap(), digits);
    }
}
