//! Service registry
//!
//! Maps Google Ads service names to the stubs that talk to them. The generated
//! RPC stubs themselves live outside this crate: they are plugged in through
//! [`StubFactory`] and driven through [`ServiceStub`].

use super::errors::{AdsError, AdsResult};
use super::failure::RpcStatus;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tonic::{Request, Status};

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "googleads.googleapis.com:443";

/// Request handed to a stub: method name plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub body: Value,
}

impl RpcRequest {
    pub fn new(method: &str, body: Value) -> Self {
        Self {
            method: method.to_string(),
            body,
        }
    }
}

/// Response returned by a stub
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcResponse {
    pub body: Value,
    /// `partial_failure_error` of a mutate response, when the service sent one
    pub partial_failure_error: Option<RpcStatus>,
}

impl RpcResponse {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            partial_failure_error: None,
        }
    }
}

/// Server-streaming response
pub type RpcStream = BoxStream<'static, Result<RpcResponse, Status>>;

/// An initialized RPC client bound to one service
#[async_trait]
pub trait ServiceStub: Send + Sync {
    /// Unary call; headers travel in the request metadata
    async fn unary(&self, request: Request<RpcRequest>) -> Result<RpcResponse, Status>;

    /// Server-streaming call
    async fn server_streaming(&self, request: Request<RpcRequest>) -> Result<RpcStream, Status> {
        Err(Status::unimplemented(format!(
            "{} does not support streaming",
            request.get_ref().method
        )))
    }

    /// Release the underlying connection
    async fn close(&self);
}

/// Transport settings handed to every stub at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub endpoint: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Builds stubs for services
pub trait StubFactory: Send + Sync {
    /// Construct a stub; services the factory cannot build yield
    /// [`AdsError::UnknownService`]
    fn create(
        &self,
        service: ServiceName,
        transport: &TransportOptions,
    ) -> AdsResult<Arc<dyn ServiceStub>>;
}

/// Google Ads services this client knows how to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceName {
    GoogleAdsService,
    CustomerService,
    CampaignService,
    CampaignBudgetService,
    CampaignCriterionService,
    AdGroupService,
    AdGroupAdService,
    AdGroupCriterionService,
    AssetService,
    BiddingStrategyService,
    ConversionActionService,
    ConversionUploadService,
    LabelService,
    UserListService,
    GeoTargetConstantService,
    KeywordPlanIdeaService,
    RecommendationService,
}

impl ServiceName {
    pub const ALL: &'static [ServiceName] = &[
        ServiceName::GoogleAdsService,
        ServiceName::CustomerService,
        ServiceName::CampaignService,
        ServiceName::CampaignBudgetService,
        ServiceName::CampaignCriterionService,
        ServiceName::AdGroupService,
        ServiceName::AdGroupAdService,
        ServiceName::AdGroupCriterionService,
        ServiceName::AssetService,
        ServiceName::BiddingStrategyService,
        ServiceName::ConversionActionService,
        ServiceName::ConversionUploadService,
        ServiceName::LabelService,
        ServiceName::UserListService,
        ServiceName::GeoTargetConstantService,
        ServiceName::KeywordPlanIdeaService,
        ServiceName::RecommendationService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::GoogleAdsService => "GoogleAdsService",
            ServiceName::CustomerService => "CustomerService",
            ServiceName::CampaignService => "CampaignService",
            ServiceName::CampaignBudgetService => "CampaignBudgetService",
            ServiceName::CampaignCriterionService => "CampaignCriterionService",
            ServiceName::AdGroupService => "AdGroupService",
            ServiceName::AdGroupAdService => "AdGroupAdService",
            ServiceName::AdGroupCriterionService => "AdGroupCriterionService",
            ServiceName::AssetService => "AssetService",
            ServiceName::BiddingStrategyService => "BiddingStrategyService",
            ServiceName::ConversionActionService => "ConversionActionService",
            ServiceName::ConversionUploadService => "ConversionUploadService",
            ServiceName::LabelService => "LabelService",
            ServiceName::UserListService => "UserListService",
            ServiceName::GeoTargetConstantService => "GeoTargetConstantService",
            ServiceName::KeywordPlanIdeaService => "KeywordPlanIdeaService",
            ServiceName::RecommendationService => "RecommendationService",
        }
    }

    /// Fully qualified gRPC service path
    pub fn grpc_path(&self) -> String {
        format!(
            "google.ads.googleads.{}.services.{}",
            super::failure::API_VERSION,
            self.as_str()
        )
    }

    /// Service and mutate method owning a snake_case entity type
    pub fn for_entity(entity: &str) -> Option<(ServiceName, &'static str)> {
        let mapping = match entity {
            "campaign" => (ServiceName::CampaignService, "MutateCampaigns"),
            "campaign_budget" => (ServiceName::CampaignBudgetService, "MutateCampaignBudgets"),
            "campaign_criterion" => (ServiceName::CampaignCriterionService, "MutateCampaignCriteria"),
            "ad_group" => (ServiceName::AdGroupService, "MutateAdGroups"),
            "ad_group_ad" => (ServiceName::AdGroupAdService, "MutateAdGroupAds"),
            "ad_group_criterion" => (ServiceName::AdGroupCriterionService, "MutateAdGroupCriteria"),
            "asset" => (ServiceName::AssetService, "MutateAssets"),
            "bidding_strategy" => (ServiceName::BiddingStrategyService, "MutateBiddingStrategies"),
            "conversion_action" => (ServiceName::ConversionActionService, "MutateConversionActions"),
            "label" => (ServiceName::LabelService, "MutateLabels"),
            "user_list" => (ServiceName::UserListService, "MutateUserLists"),
            _ => return None,
        };
        Some(mapping)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceName {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceName::ALL
            .iter()
            .copied()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| AdsError::UnknownService(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names_round_trip_through_from_str() {
        for service in ServiceName::ALL {
            assert_eq!(service.as_str().parse::<ServiceName>().unwrap(), *service);
        }
    }

    #[test]
    fn test_unknown_service_is_checked_error() {
        let err = "CampaignDraftServiceX".parse::<ServiceName>().unwrap_err();
        assert!(matches!(err, AdsError::UnknownService(ref name) if name == "CampaignDraftServiceX"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_grpc_path() {
        assert_eq!(
            ServiceName::GoogleAdsService.grpc_path(),
            "google.ads.googleads.v19.services.GoogleAdsService"
        );
    }

    #[test]
    fn test_for_entity() {
        assert_eq!(
            ServiceName::for_entity("ad_group_criterion"),
            Some((ServiceName::AdGroupCriterionService, "MutateAdGroupCriteria"))
        );
        assert_eq!(ServiceName::for_entity("adGroup"), None);
    }
}
