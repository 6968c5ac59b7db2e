//! Google Ads API client
//!
//! Credentials, a TTL cache of service stubs, request builders for search and
//! mutate calls, and translation of failed calls into structured
//! [`GoogleAdsFailure`](ads::failure::GoogleAdsFailure) errors. The generated RPC
//! stubs are supplied by the caller through [`StubFactory`](ads::services::StubFactory).

pub mod ads;
pub mod config;
pub mod request;

pub use ads::client::{ClientOptions, Customer, CustomerOptions, GoogleAdsClient};
pub use ads::errors::{AdsError, AdsResult};
pub use ads::services::{ServiceName, ServiceStub, StubFactory};

/// Version injected at compile time via GADS_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("GADS_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
