//! Google Ads API interaction module
//!
//! # Module Structure
//!
//! - [`auth`] - OAuth refresh-token, service-account and ADC credentials
//! - [`cache`] - TTL cache of service stubs with lease-based closing
//! - [`client`] - [`client::GoogleAdsClient`] and the per-customer facade
//! - [`errors`] - [`errors::AdsError`] and failure translation
//! - [`failure`] - protobuf model of `GoogleAdsFailure`
//! - [`http`] - token endpoint HTTP client and error formatting
//! - [`services`] - service names and the stub traits
//!
//! # Example
//!
//! ```ignore
//! use gads_client::ads::client::{ClientOptions, CustomerOptions, GoogleAdsClient};
//! use gads_client::ads::services::StubFactory;
//!
//! async fn example(factory: std::sync::Arc<dyn StubFactory>) -> gads_client::AdsResult<()> {
//!     let options = ClientOptions::new("client-id", "client-secret", "dev-token");
//!     let client = GoogleAdsClient::new(options, factory)?;
//!     let customer = client
//!         .customer(CustomerOptions::new("123-456-7890").with_refresh_token("1//token"))
//!         .await?;
//!     let rows = customer.query("SELECT campaign.id FROM campaign").await?;
//!     customer.close().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod errors;
pub mod failure;
pub mod http;
pub mod services;
