//! Google Ads failure model
//!
//! Protobuf messages for the structured failure payload the API attaches to
//! failed calls (as binary metadata) and to partially failed mutate responses
//! (as an `Any` inside `partial_failure_error.details`).
//!
//! Only the fields this crate reads are modelled; prost skips the rest when
//! decoding, so payloads from the live service decode cleanly.

use std::fmt;

/// API version the failure key and type URL belong to
pub const API_VERSION: &str = "v19";

/// Binary metadata key carrying an encoded [`GoogleAdsFailure`] on error responses
pub const FAILURE_METADATA_KEY: &str = "google.ads.googleads.v19.errors.googleadsfailure-bin";

/// Type URL of a [`GoogleAdsFailure`] packed into a `google.protobuf.Any`
pub const FAILURE_TYPE_URL: &str =
    "type.googleapis.com/google.ads.googleads.v19.errors.GoogleAdsFailure";

/// Field names that index into the submitted operations list
const OPERATION_FIELDS: &[&str] = &["operations", "mutate_operations"];

/// Describes how a Google Ads API call failed
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GoogleAdsFailure {
    /// The list of errors that occurred
    #[prost(message, repeated, tag = "1")]
    pub errors: Vec<GoogleAdsError>,
    /// The unique ID of the request that produced this failure
    #[prost(string, tag = "2")]
    pub request_id: String,
}

/// A single error inside a [`GoogleAdsFailure`]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GoogleAdsError {
    #[prost(message, optional, tag = "1")]
    pub error_code: Option<ErrorCode>,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, optional, tag = "4")]
    pub location: Option<ErrorLocation>,
}

/// Error category plus the numeric value of the category's enum
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorCode {
    #[prost(
        oneof = "error_code::Kind",
        tags = "1, 2, 3, 4, 5, 7, 8, 9, 10, 11, 12, 13, 14, 15, 17, 18, 21, 26, 29, 32, 44, 46, 47, 48, 49, 52, 53, 54, 55, 56, 57, 66, 68, 90, 102"
    )]
    pub kind: Option<error_code::Kind>,
}

pub mod error_code {
    /// Which error enum the code belongs to
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(int32, tag = "1")]
        RequestError(i32),
        #[prost(int32, tag = "2")]
        BiddingStrategyError(i32),
        #[prost(int32, tag = "3")]
        UrlFieldError(i32),
        #[prost(int32, tag = "4")]
        ListOperationError(i32),
        #[prost(int32, tag = "5")]
        QueryError(i32),
        #[prost(int32, tag = "7")]
        MutateError(i32),
        #[prost(int32, tag = "8")]
        FieldMaskError(i32),
        #[prost(int32, tag = "9")]
        AuthorizationError(i32),
        #[prost(int32, tag = "10")]
        InternalError(i32),
        #[prost(int32, tag = "11")]
        QuotaError(i32),
        #[prost(int32, tag = "12")]
        AdError(i32),
        #[prost(int32, tag = "13")]
        AdGroupError(i32),
        #[prost(int32, tag = "14")]
        CampaignBudgetError(i32),
        #[prost(int32, tag = "15")]
        CampaignError(i32),
        #[prost(int32, tag = "17")]
        AuthenticationError(i32),
        #[prost(int32, tag = "18")]
        AdGroupCriterionError(i32),
        #[prost(int32, tag = "21")]
        AdGroupAdError(i32),
        #[prost(int32, tag = "26")]
        BiddingError(i32),
        #[prost(int32, tag = "29")]
        CampaignCriterionError(i32),
        #[prost(int32, tag = "32")]
        CriterionError(i32),
        #[prost(int32, tag = "44")]
        MultiplierError(i32),
        #[prost(int32, tag = "46")]
        NotEmptyError(i32),
        #[prost(int32, tag = "47")]
        NullError(i32),
        #[prost(int32, tag = "48")]
        OperatorError(i32),
        #[prost(int32, tag = "49")]
        RangeError(i32),
        #[prost(int32, tag = "52")]
        SettingError(i32),
        #[prost(int32, tag = "53")]
        StringFormatError(i32),
        #[prost(int32, tag = "54")]
        StringLengthError(i32),
        #[prost(int32, tag = "55")]
        OperationAccessDeniedError(i32),
        #[prost(int32, tag = "56")]
        ResourceAccessDeniedError(i32),
        #[prost(int32, tag = "57")]
        ResourceCountLimitExceededError(i32),
        #[prost(int32, tag = "66")]
        HeaderError(i32),
        #[prost(int32, tag = "68")]
        PolicyFindingError(i32),
        #[prost(int32, tag = "90")]
        CustomerError(i32),
        #[prost(int32, tag = "102")]
        FieldError(i32),
    }

    impl Kind {
        /// snake_case name of the error category, as the API spells it
        pub fn category(&self) -> &'static str {
            match self {
                Kind::RequestError(_) => "request_error",
                Kind::BiddingStrategyError(_) => "bidding_strategy_error",
                Kind::UrlFieldError(_) => "url_field_error",
                Kind::ListOperationError(_) => "list_operation_error",
                Kind::QueryError(_) => "query_error",
                Kind::MutateError(_) => "mutate_error",
                Kind::FieldMaskError(_) => "field_mask_error",
                Kind::AuthorizationError(_) => "authorization_error",
                Kind::InternalError(_) => "internal_error",
                Kind::QuotaError(_) => "quota_error",
                Kind::AdError(_) => "ad_error",
                Kind::AdGroupError(_) => "ad_group_error",
                Kind::CampaignBudgetError(_) => "campaign_budget_error",
                Kind::CampaignError(_) => "campaign_error",
                Kind::AuthenticationError(_) => "authentication_error",
                Kind::AdGroupCriterionError(_) => "ad_group_criterion_error",
                Kind::AdGroupAdError(_) => "ad_group_ad_error",
                Kind::BiddingError(_) => "bidding_error",
                Kind::CampaignCriterionError(_) => "campaign_criterion_error",
                Kind::CriterionError(_) => "criterion_error",
                Kind::MultiplierError(_) => "multiplier_error",
                Kind::NotEmptyError(_) => "not_empty_error",
                Kind::NullError(_) => "null_error",
                Kind::OperatorError(_) => "operator_error",
                Kind::RangeError(_) => "range_error",
                Kind::SettingError(_) => "setting_error",
                Kind::StringFormatError(_) => "string_format_error",
                Kind::StringLengthError(_) => "string_length_error",
                Kind::OperationAccessDeniedError(_) => "operation_access_denied_error",
                Kind::ResourceAccessDeniedError(_) => "resource_access_denied_error",
                Kind::ResourceCountLimitExceededError(_) => "resource_count_limit_exceeded_error",
                Kind::HeaderError(_) => "header_error",
                Kind::PolicyFindingError(_) => "policy_finding_error",
                Kind::CustomerError(_) => "customer_error",
                Kind::FieldError(_) => "field_error",
            }
        }

        /// Numeric value within the category enum
        pub fn value(&self) -> i32 {
            match *self {
                Kind::RequestError(v)
                | Kind::BiddingStrategyError(v)
                | Kind::UrlFieldError(v)
                | Kind::ListOperationError(v)
                | Kind::QueryError(v)
                | Kind::MutateError(v)
                | Kind::FieldMaskError(v)
                | Kind::AuthorizationError(v)
                | Kind::InternalError(v)
                | Kind::QuotaError(v)
                | Kind::AdError(v)
                | Kind::AdGroupError(v)
                | Kind::CampaignBudgetError(v)
                | Kind::CampaignError(v)
                | Kind::AuthenticationError(v)
                | Kind::AdGroupCriterionError(v)
                | Kind::AdGroupAdError(v)
                | Kind::BiddingError(v)
                | Kind::CampaignCriterionError(v)
                | Kind::CriterionError(v)
                | Kind::MultiplierError(v)
                | Kind::NotEmptyError(v)
                | Kind::NullError(v)
                | Kind::OperatorError(v)
                | Kind::RangeError(v)
                | Kind::SettingError(v)
                | Kind::StringFormatError(v)
                | Kind::StringLengthError(v)
                | Kind::OperationAccessDeniedError(v)
                | Kind::ResourceAccessDeniedError(v)
                | Kind::ResourceCountLimitExceededError(v)
                | Kind::HeaderError(v)
                | Kind::PolicyFindingError(v)
                | Kind::CustomerError(v)
                | Kind::FieldError(v) => v,
            }
        }
    }
}

/// Where in the request an error occurred
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorLocation {
    #[prost(message, repeated, tag = "2")]
    pub field_path_elements: Vec<FieldPathElement>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldPathElement {
    #[prost(string, tag = "1")]
    pub field_name: String,
    #[prost(int32, optional, tag = "3")]
    pub index: Option<i32>,
}

/// `google.rpc.Status`, as carried by `partial_failure_error`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

impl GoogleAdsError {
    /// Error category and value, e.g. `("request_error", 3)`
    pub fn kind(&self) -> Option<(&'static str, i32)> {
        self.error_code
            .as_ref()
            .and_then(|code| code.kind.as_ref())
            .map(|kind| (kind.category(), kind.value()))
    }

    /// Index of the operation this error belongs to, if the location names one
    pub fn operation_index(&self) -> Option<usize> {
        self.location
            .as_ref()?
            .field_path_elements
            .iter()
            .find(|el| OPERATION_FIELDS.contains(&el.field_name.as_str()))
            .and_then(|el| el.index)
            .and_then(|idx| usize::try_from(idx).ok())
    }

    /// Dotted field path, e.g. `operations[1].create.name`
    pub fn field_path(&self) -> String {
        let Some(location) = self.location.as_ref() else {
            return String::new();
        };
        location
            .field_path_elements
            .iter()
            .map(|el| match el.index {
                Some(idx) => format!("{}[{}]", el.field_name, idx),
                None => el.field_name.clone(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl GoogleAdsFailure {
    /// Errors attributed to the operation at `index`
    pub fn errors_for_operation(&self, index: usize) -> Vec<&GoogleAdsError> {
        self.errors
            .iter()
            .filter(|err| err.operation_index() == Some(index))
            .collect()
    }
}

impl fmt::Display for GoogleAdsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.first() {
            None => write!(f, "no error details"),
            Some(first) => {
                match first.kind() {
                    Some((category, value)) => write!(f, "{} ({}={})", first.message, category, value)?,
                    None => write!(f, "{}", first.message)?,
                }
                if self.errors.len() > 1 {
                    write!(f, " and {} more", self.errors.len() - 1)?;
                }
                Ok(())
            }
        }
    }
}
