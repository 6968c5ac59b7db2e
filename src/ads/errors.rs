//! Error types and failure translation
//!
//! Every fallible operation in the crate returns [`AdsError`]. Failed RPCs are
//! routed through [`translate`], which looks for an embedded
//! [`GoogleAdsFailure`] in the status metadata; partially failed mutates go
//! through [`extract_partial_failures`].

use super::failure::{GoogleAdsFailure, RpcStatus, FAILURE_METADATA_KEY, FAILURE_TYPE_URL};
use prost::Message;
use tonic::Status;

/// Result alias used across the crate
pub type AdsResult<T> = std::result::Result<T, AdsError>;

/// Google Ads client error types
#[derive(Debug, thiserror::Error)]
pub enum AdsError {
    /// Missing or invalid configuration (customer ids, endpoints, config files)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Service name that has no stub mapping
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Credential material is missing or malformed
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The token endpoint rejected the exchange
    #[error("Token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },

    /// Signing the service-account assertion failed
    #[error("JWT signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// HTTP request to the token endpoint failed
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Application Default Credentials lookup failed
    #[error("Application default credentials error: {0}")]
    DefaultCredentials(String),

    /// Caller-supplied request data could not be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transport failure without an embedded Google Ads failure
    #[error("RPC failed: {0}")]
    Transport(Status),

    /// Transport failure carrying a decoded Google Ads failure
    #[error("Google Ads API failure: {failure}")]
    GoogleAds {
        failure: GoogleAdsFailure,
        status: Status,
    },

    /// A failure payload was present but could not be decoded
    #[error("Malformed Google Ads failure payload: {reason}")]
    MalformedFailure {
        reason: String,
        status: Option<Status>,
    },
}

impl AdsError {
    /// Setup problems that retrying will never fix
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AdsError::Configuration(_) | AdsError::UnknownService(_) | AdsError::InvalidCredentials(_)
        )
    }

    /// The decoded failure, if this error carries one
    pub fn failure(&self) -> Option<&GoogleAdsFailure> {
        match self {
            AdsError::GoogleAds { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// The underlying RPC status, if any
    pub fn status(&self) -> Option<&Status> {
        match self {
            AdsError::Transport(status) | AdsError::GoogleAds { status, .. } => Some(status),
            AdsError::MalformedFailure { status, .. } => status.as_ref(),
            _ => None,
        }
    }

    /// Request id reported by the API, from the failure or the response metadata
    pub fn request_id(&self) -> Option<String> {
        if let Some(failure) = self.failure() {
            if !failure.request_id.is_empty() {
                return Some(failure.request_id.clone());
            }
        }
        self.status()?
            .metadata()
            .get("request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

/// Access to binary metadata on a failed call.
///
/// This is the only place the crate reaches into transport error internals.
pub trait FailureMetadata {
    /// `None` when the key is absent, `Some(Err)` when present but unreadable
    fn binary_metadata(&self, key: &str) -> Option<Result<Vec<u8>, String>>;
}

impl FailureMetadata for Status {
    fn binary_metadata(&self, key: &str) -> Option<Result<Vec<u8>, String>> {
        let value = self.metadata().get_bin(key)?;
        Some(
            value
                .to_bytes()
                .map(|bytes| bytes.to_vec())
                .map_err(|e| e.to_string()),
        )
    }
}

/// Decode an encoded [`GoogleAdsFailure`]
pub fn decode_failure(buf: &[u8]) -> Result<GoogleAdsFailure, prost::DecodeError> {
    GoogleAdsFailure::decode(buf)
}

/// Translate a failed call into an [`AdsError`].
///
/// Without the failure metadata key the status is returned untouched inside
/// [`AdsError::Transport`].
pub fn translate(status: Status) -> AdsError {
    let payload = status.binary_metadata(FAILURE_METADATA_KEY);

    match payload {
        None => AdsError::Transport(status),
        Some(Err(reason)) => {
            tracing::warn!("Unreadable failure metadata: {}", reason);
            AdsError::MalformedFailure {
                reason,
                status: Some(status),
            }
        }
        Some(Ok(buf)) => match decode_failure(&buf) {
            Ok(failure) => {
                tracing::debug!(
                    "Decoded Google Ads failure with {} error(s), request_id={}",
                    failure.errors.len(),
                    failure.request_id
                );
                AdsError::GoogleAds { failure, status }
            }
            Err(e) => {
                tracing::warn!("Failed to decode Google Ads failure: {}", e);
                AdsError::MalformedFailure {
                    reason: e.to_string(),
                    status: Some(status),
                }
            }
        },
    }
}

/// Decode the Google Ads failures packed into a `partial_failure_error`.
///
/// Detail entries of other types are skipped; a matching entry that fails to
/// decode is an error.
pub fn extract_partial_failures(status: Option<&RpcStatus>) -> AdsResult<Vec<GoogleAdsFailure>> {
    let Some(status) = status else {
        return Ok(Vec::new());
    };

    status
        .details
        .iter()
        .filter(|detail| detail.type_url == FAILURE_TYPE_URL)
        .map(|detail| {
            decode_failure(&detail.value).map_err(|e| AdsError::MalformedFailure {
                reason: e.to_string(),
                status: None,
            })
        })
        .collect()
}
