//! Harvesting of following/followers lists from a cursor-paginated private API.
//!
//! This crate provides:
//! - [`PaginatedFetcher`], which walks every page of a relation list with
//!   bounded retry, rate-limit awareness and a small-page truncation re-check
//! - [`AuthBundle`] credentials and the [`CredentialRefresher`] seam
//! - Endpoint shapes for the REST `friendships` API and the GraphQL API
//!
//! A run either returns the whole list or fails; partial lists are never
//! surfaced.

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod fetcher;
pub mod profile;

// Re-export main types
pub use auth::{AuthBundle, CredentialRefresher};
pub use config::{FallbackTrigger, FetchConfig};
pub use endpoint::Endpoint;
pub use error::FetchError;
pub use fetcher::{FetchOutcome, FetchReport, PaginatedFetcher};
pub use profile::ProfileCounts;
