//! Xray Client - REST capability for the JFrog platform
//!
//! This crate provides the HTTP plumbing the provider relies on:
//!
//! - **RestClient**: reqwest-backed client bound to a platform URL, carrying
//!   a bearer token once authenticated. Exposes the system endpoints used
//!   while negotiating a session (versions, license, OIDC exchange, usage).
//! - **PolicyApi**: the CRUD seam over `/xray/api/v2/policies`, implemented
//!   by `RestClient` and by `InMemoryPolicyApi`.
//!
//! ## Retries and timeouts
//!
//! Requests are issued once. The only timeout is the reqwest client timeout.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod api;
pub mod client;
pub mod error;
pub mod memory;

// Re-exports
pub use api::PolicyApi;
pub use client::RestClient;
pub use error::{ClientError, ClientResult};
pub use memory::{InMemoryPolicyApi, RecordedWrite, WriteKind};
