//! Mutate request building
//!
//! Turns caller-supplied [`MutateOperation`]s into the operation envelopes the
//! API expects and decorates mutate responses with decoded partial failures.

use super::case::{snake_case_keys, to_snake_case};
use super::field_mask::{field_mask, strip_nulls};
use crate::ads::errors::{extract_partial_failures, AdsError, AdsResult};
use crate::ads::failure::{GoogleAdsError, GoogleAdsFailure, RpcStatus};
use crate::ads::services::{RpcResponse, ServiceName};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Policy exemption field, carried on the operation rather than the entity
const EXEMPT_KEYS_FIELD: &str = "exempt_policy_violation_keys";

/// What an operation does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Remove,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Remove => "remove",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "remove" | "delete" => Ok(OperationKind::Remove),
            other => Err(AdsError::InvalidRequest(format!("Unknown operation: {}", other))),
        }
    }
}

/// One entity operation as the caller describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutateOperation {
    /// Entity type, e.g. `campaign`, `adGroupAd`
    pub entity: String,
    pub operation: OperationKind,
    /// Entity payload; for removes, the resource name (or an object holding it)
    pub resource: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exempt_policy_violation_keys: Option<Vec<Value>>,
    /// Explicit update mask; derived from the resource when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<Vec<String>>,
}

impl MutateOperation {
    pub fn create(entity: &str, resource: Value) -> Self {
        Self {
            entity: entity.to_string(),
            operation: OperationKind::Create,
            resource,
            exempt_policy_violation_keys: None,
            update_mask: None,
        }
    }

    pub fn update(entity: &str, resource: Value) -> Self {
        Self {
            entity: entity.to_string(),
            operation: OperationKind::Update,
            resource,
            exempt_policy_violation_keys: None,
            update_mask: None,
        }
    }

    pub fn remove(entity: &str, resource_name: &str) -> Self {
        Self {
            entity: entity.to_string(),
            operation: OperationKind::Remove,
            resource: Value::String(resource_name.to_string()),
            exempt_policy_violation_keys: None,
            update_mask: None,
        }
    }

    pub fn with_exempt_policy_violation_keys(mut self, keys: Vec<Value>) -> Self {
        self.exempt_policy_violation_keys = Some(keys);
        self
    }

    pub fn with_update_mask<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_mask = Some(paths.into_iter().map(Into::into).collect());
        self
    }
}

/// Request-level mutate flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateOptions {
    #[serde(default)]
    pub partial_failure: bool,
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
}

impl MutateOptions {
    pub fn partial_failure() -> Self {
        Self {
            partial_failure: true,
            ..Self::default()
        }
    }

    fn apply(&self, body: &mut Map<String, Value>) {
        body.insert("partial_failure".to_string(), Value::Bool(self.partial_failure));
        body.insert("validate_only".to_string(), Value::Bool(self.validate_only));
        if let Some(content_type) = &self.response_content_type {
            body.insert(
                "response_content_type".to_string(),
                Value::String(content_type.clone()),
            );
        }
    }
}

/// Build the inner operation (`{"create": ...}`, `{"update": ..., "update_mask": ...}`,
/// `{"remove": ...}`) and return it with the snake_case entity type
pub fn build_operation(op: &MutateOperation) -> AdsResult<(String, Value)> {
    let entity = to_snake_case(op.entity.trim());
    if entity.is_empty() {
        return Err(AdsError::InvalidRequest("Operation is missing an entity type".to_string()));
    }

    let inner = match op.operation {
        OperationKind::Create => {
            let mut resource = entity_object(op, &entity)?;
            let embedded = resource.remove(EXEMPT_KEYS_FIELD);
            let keys = match (&op.exempt_policy_violation_keys, embedded) {
                (Some(keys), _) => keys.clone(),
                (None, Some(Value::Array(keys))) => keys,
                (None, Some(other)) => {
                    return Err(AdsError::InvalidRequest(format!(
                        "{} must be a list, got {}",
                        EXEMPT_KEYS_FIELD, other
                    )))
                }
                (None, None) => Vec::new(),
            };

            let mut inner = Map::new();
            inner.insert("create".to_string(), Value::Object(resource));
            if !keys.is_empty() {
                inner.insert(EXEMPT_KEYS_FIELD.to_string(), Value::Array(keys));
            }
            Value::Object(inner)
        }
        OperationKind::Update => {
            let mut resource = entity_object(op, &entity)?;
            if resource.remove(EXEMPT_KEYS_FIELD).is_some() || op.exempt_policy_violation_keys.is_some() {
                tracing::warn!("Ignoring policy exemption keys on {} update", entity);
            }
            if !resource.contains_key("resource_name") {
                return Err(AdsError::InvalidRequest(format!(
                    "{} update requires a resource_name",
                    entity
                )));
            }

            let resource = Value::Object(resource);
            let paths: Vec<String> = match &op.update_mask {
                Some(paths) => paths
                    .iter()
                    .map(|path| path.split('.').map(to_snake_case).collect::<Vec<_>>().join("."))
                    .filter(|path| !path.is_empty())
                    .collect(),
                None => field_mask(&resource).paths,
            };
            if paths.is_empty() {
                return Err(AdsError::InvalidRequest(format!(
                    "{} update does not change any field",
                    entity
                )));
            }

            json!({
                "update": resource,
                "update_mask": { "paths": paths },
            })
        }
        OperationKind::Remove => {
            let resource_name = match &op.resource {
                Value::String(name) => name.clone(),
                Value::Object(map) => map
                    .get("resource_name")
                    .or_else(|| map.get("resourceName"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            if resource_name.is_empty() {
                return Err(AdsError::InvalidRequest(format!(
                    "{} remove requires a resource name",
                    entity
                )));
            }
            json!({ "remove": resource_name })
        }
    };

    Ok((entity, inner))
}

/// Snake-cased, null-free entity object of a create/update
fn entity_object(op: &MutateOperation, entity: &str) -> AdsResult<Map<String, Value>> {
    match strip_nulls(snake_case_keys(op.resource.clone())) {
        Value::Object(map) => Ok(map),
        other => Err(AdsError::InvalidRequest(format!(
            "{} {} expects an object, got {}",
            entity, op.operation, other
        ))),
    }
}

/// `GoogleAdsService.Mutate` body: one envelope per operation, caller order kept
pub fn build_mutate_request(
    customer_id: &str,
    operations: &[MutateOperation],
    options: &MutateOptions,
) -> AdsResult<Value> {
    if operations.is_empty() {
        return Err(AdsError::InvalidRequest("No operations to mutate".to_string()));
    }

    let mutate_operations = operations
        .iter()
        .map(|op| {
            let (entity, inner) = build_operation(op)?;
            let mut envelope = Map::new();
            envelope.insert(format!("{}_operation", entity), inner);
            Ok(Value::Object(envelope))
        })
        .collect::<AdsResult<Vec<_>>>()?;

    let mut body = Map::new();
    body.insert("customer_id".to_string(), Value::String(customer_id.to_string()));
    body.insert("mutate_operations".to_string(), Value::Array(mutate_operations));
    options.apply(&mut body);

    Ok(Value::Object(body))
}

/// Per-service mutate (`CampaignService.MutateCampaigns`, ...). All operations
/// must target the same entity type.
pub fn build_service_mutate_request(
    customer_id: &str,
    operations: &[MutateOperation],
    options: &MutateOptions,
) -> AdsResult<(ServiceName, &'static str, Value)> {
    let Some(first) = operations.first() else {
        return Err(AdsError::InvalidRequest("No operations to mutate".to_string()));
    };
    let entity = to_snake_case(first.entity.trim());
    let Some((service, method)) = ServiceName::for_entity(&entity) else {
        return Err(AdsError::UnknownService(format!("no mutate service for entity '{}'", entity)));
    };

    let inner_operations = operations
        .iter()
        .map(|op| {
            let (op_entity, inner) = build_operation(op)?;
            if op_entity != entity {
                return Err(AdsError::InvalidRequest(format!(
                    "Mixed entity types in one {} call: {} and {}",
                    method, entity, op_entity
                )));
            }
            Ok(inner)
        })
        .collect::<AdsResult<Vec<_>>>()?;

    let mut body = Map::new();
    body.insert("customer_id".to_string(), Value::String(customer_id.to_string()));
    body.insert("operations".to_string(), Value::Array(inner_operations));
    options.apply(&mut body);

    Ok((service, method, Value::Object(body)))
}

/// Mutate result with decoded partial failures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutateResponse {
    /// Per-operation results, index-aligned with the submitted operations
    pub results: Vec<Value>,
    /// Raw partial failure status, if the service returned one
    pub partial_failure_error: Option<RpcStatus>,
    /// Failures decoded from `partial_failure_error`
    pub mutate_operation_responses: Vec<GoogleAdsFailure>,
}

impl MutateResponse {
    /// Decode a stub response; `results_field` names the per-operation results
    /// array (`mutate_operation_responses` or `results`)
    pub fn from_rpc(response: RpcResponse, results_field: &str) -> AdsResult<Self> {
        let mutate_operation_responses =
            extract_partial_failures(response.partial_failure_error.as_ref())?;

        let results = match response.body {
            Value::Object(mut map) => match map.remove(results_field) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        Ok(Self {
            results,
            partial_failure_error: response.partial_failure_error,
            mutate_operation_responses,
        })
    }

    /// Errors attributed to the operation at `index`
    pub fn operation_errors(&self, index: usize) -> Vec<&GoogleAdsError> {
        self.mutate_operation_responses
            .iter()
            .flat_map(|failure| failure.errors_for_operation(index))
            .collect()
    }

    /// True when the operation at `index` carries no error
    pub fn operation_succeeded(&self, index: usize) -> bool {
        self.operation_errors(index).is_empty()
    }

    pub fn has_partial_failures(&self) -> bool {
        self.mutate_operation_responses
            .iter()
            .any(|failure| !failure.errors.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::failure::{ErrorLocation, FieldPathElement, FAILURE_TYPE_URL};
    use prost::Message;

    #[test]
    fn test_update_mask_contains_only_changed_field() {
        let op = MutateOperation::update(
            "campaign",
            json!({"resourceName": "customers/1234567890/campaigns/42", "name": "Renamed"}),
        );
        let (entity, inner) = build_operation(&op).unwrap();

        assert_eq!(entity, "campaign");
        assert_eq!(inner["update_mask"]["paths"], json!(["name"]));
        assert_eq!(inner["update"]["resource_name"], "customers/1234567890/campaigns/42");
    }

    #[test]
    fn test_create_moves_exemption_keys_to_envelope() {
        let op = MutateOperation::create(
            "adGroupCriterion",
            json!({
                "adGroup": "customers/1/adGroups/2",
                "keyword": {"text": "cheap flights", "matchType": "BROAD"},
                "exemptPolicyViolationKeys": ["POLICY_X"]
            }),
        );
        let (entity, inner) = build_operation(&op).unwrap();

        assert_eq!(entity, "ad_group_criterion");
        assert_eq!(inner[EXEMPT_KEYS_FIELD], json!(["POLICY_X"]));
        assert!(inner["create"].get(EXEMPT_KEYS_FIELD).is_none());
        assert_eq!(inner["create"]["keyword"]["match_type"], "BROAD");
        assert!(inner.get("update_mask").is_none());
    }

    #[test]
    fn test_explicit_exemption_keys_win() {
        let op = MutateOperation::create("ad_group_ad", json!({"status": "PAUSED"}))
            .with_exempt_policy_violation_keys(vec![json!({"policy_name": "trademark"})]);
        let (_, inner) = build_operation(&op).unwrap();
        assert_eq!(inner[EXEMPT_KEYS_FIELD], json!([{"policy_name": "trademark"}]));
    }

    #[test]
    fn test_create_without_keys_has_no_exemption_field() {
        let op = MutateOperation::create("campaign", json!({"name": "New", "startDate": null}));
        let (_, inner) = build_operation(&op).unwrap();
        assert!(inner.get(EXEMPT_KEYS_FIELD).is_none());
        assert_eq!(inner["create"], json!({"name": "New"}));
    }

    #[test]
    fn test_explicit_update_mask() {
        let op = MutateOperation::update(
            "adGroup",
            json!({"resourceName": "customers/1/adGroups/2", "status": "PAUSED", "cpcBidMicros": 0}),
        )
        .with_update_mask(["status", "cpcBidMicros"]);
        let (_, inner) = build_operation(&op).unwrap();
        // An explicit mask can clear a field to its default
        assert_eq!(inner["update_mask"]["paths"], json!(["status", "cpc_bid_micros"]));
    }

    #[test]
    fn test_update_without_changes_is_rejected() {
        let op = MutateOperation::update("campaign", json!({"resource_name": "customers/1/campaigns/2"}));
        assert!(matches!(build_operation(&op), Err(AdsError::InvalidRequest(_))));

        let op = MutateOperation::update("campaign", json!({"name": "x"}));
        assert!(matches!(build_operation(&op), Err(AdsError::InvalidRequest(_))));
    }

    #[test]
    fn test_remove_accepts_string_or_object() {
        let (_, inner) = build_operation(&MutateOperation::remove("label", "customers/1/labels/9")).unwrap();
        assert_eq!(inner, json!({"remove": "customers/1/labels/9"}));

        let op = MutateOperation {
            entity: "label".to_string(),
            operation: OperationKind::Remove,
            resource: json!({"resourceName": "customers/1/labels/10"}),
            exempt_policy_violation_keys: None,
            update_mask: None,
        };
        let (_, inner) = build_operation(&op).unwrap();
        assert_eq!(inner, json!({"remove": "customers/1/labels/10"}));
    }

    #[test]
    fn test_batch_preserves_order_and_flags() {
        let ops = vec![
            MutateOperation::create("campaignBudget", json!({"amountMicros": 5_000_000})),
            MutateOperation::remove("campaign", "customers/1/campaigns/3"),
            MutateOperation::update("AdGroup", json!({"resourceName": "customers/1/adGroups/4", "name": "n"})),
        ];
        let body = build_mutate_request("1234567890", &ops, &MutateOptions::partial_failure()).unwrap();

        let envelopes = body["mutate_operations"].as_array().unwrap();
        assert_eq!(envelopes.len(), 3);
        assert!(envelopes[0].get("campaign_budget_operation").is_some());
        assert!(envelopes[1].get("campaign_operation").is_some());
        assert!(envelopes[2].get("ad_group_operation").is_some());
        assert_eq!(body["customer_id"], "1234567890");
        assert_eq!(body["partial_failure"], true);
        assert_eq!(body["validate_only"], false);
        assert!(body.get("response_content_type").is_none());
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(build_mutate_request("1", &[], &MutateOptions::default()).is_err());
    }

    #[test]
    fn test_service_mutate_routes_by_entity() {
        let ops = vec![
            MutateOperation::create("campaign", json!({"name": "a"})),
            MutateOperation::remove("campaign", "customers/1/campaigns/2"),
        ];
        let (service, method, body) =
            build_service_mutate_request("1", &ops, &MutateOptions::default()).unwrap();
        assert_eq!(service, ServiceName::CampaignService);
        assert_eq!(method, "MutateCampaigns");
        assert_eq!(body["operations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_service_mutate_rejects_mixed_entities() {
        let ops = vec![
            MutateOperation::create("campaign", json!({"name": "a"})),
            MutateOperation::create("ad_group", json!({"name": "b"})),
        ];
        let err = build_service_mutate_request("1", &ops, &MutateOptions::default()).unwrap_err();
        assert!(matches!(err, AdsError::InvalidRequest(_)));
    }

    fn failure_for_ops(indices: &[i32]) -> GoogleAdsFailure {
        GoogleAdsFailure {
            errors: indices
                .iter()
                .map(|&i| GoogleAdsError {
                    error_code: None,
                    message: format!("op {} failed", i),
                    location: Some(ErrorLocation {
                        field_path_elements: vec![FieldPathElement {
                            field_name: "mutate_operations".to_string(),
                            index: Some(i),
                        }],
                    }),
                })
                .collect(),
            request_id: String::new(),
        }
    }

    #[test]
    fn test_mutate_response_decorates_partial_failures() {
        let response = RpcResponse {
            body: json!({"mutate_operation_responses": [{}, {"campaign_result": {"resource_name": "customers/1/campaigns/5"}}, {}]}),
            partial_failure_error: Some(RpcStatus {
                code: 3,
                message: "Multiple errors in 'details'.".to_string(),
                details: vec![prost_types::Any {
                    type_url: FAILURE_TYPE_URL.to_string(),
                    value: failure_for_ops(&[0, 2]).encode_to_vec(),
                }],
            }),
        };

        let result = MutateResponse::from_rpc(response, "mutate_operation_responses").unwrap();
        assert_eq!(result.results.len(), 3);
        assert_eq!(result.mutate_operation_responses.len(), 1);
        assert_eq!(result.mutate_operation_responses[0].errors.len(), 2);
        assert!(!result.operation_succeeded(0));
        assert!(result.operation_succeeded(1));
        assert!(!result.operation_succeeded(2));
        assert!(result.has_partial_failures());
    }

    #[test]
    fn test_mutate_response_without_failures() {
        let response = RpcResponse::new(json!({"results": [{"resource_name": "customers/1/labels/1"}]}));
        let result = MutateResponse::from_rpc(response, "results").unwrap();
        assert!(result.mutate_operation_responses.is_empty());
        assert!(!result.has_partial_failures());
        assert_eq!(result.results.len(), 1);
    }

    #[test]
    fn test_operation_kind_from_str() {
        assert_eq!("Update".parse::<OperationKind>().unwrap(), OperationKind::Update);
        assert_eq!("delete".parse::<OperationKind>().unwrap(), OperationKind::Remove);
        assert!("upsert".parse::<OperationKind>().is_err());
    }
}
