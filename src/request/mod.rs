//! Request building
//!
//! Turns caller input into the JSON bodies handed to service stubs.
//!
//! - [`query`] - GAQL search and search-stream requests
//! - [`mutate`] - mutate operation envelopes and responses
//! - [`field_mask`] - update masks derived from entity payloads
//! - [`case`] - snake_case conversion of entity and field names

pub mod case;
pub mod field_mask;
pub mod mutate;
pub mod query;

pub use mutate::{
    build_mutate_request, build_service_mutate_request, MutateOperation, MutateOptions, MutateResponse,
    OperationKind,
};
pub use query::{build_search_request, build_search_stream_request, QueryBuilder, SearchOptions, SearchPage};
