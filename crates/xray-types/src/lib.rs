//! Xray Types - Wire contract for Xray policies
//!
//! These types mirror the JSON payloads accepted and returned by the Xray
//! V2 policies API (`/xray/api/v2/policies`). Both the REST client and the
//! provider speak in these types; the provider owns the translation between
//! declared configuration and this wire shape.
//!
//! ## Key Concepts
//!
//! - **PolicyFamily**: security / license / operational risk
//! - **WirePolicy**: a whole policy object, as sent on create and update
//! - **WireRule**: one ordered rule with free-form criteria and actions

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod family;
pub mod policy;

pub use family::{PolicyFamily, UnknownFamily};
pub use policy::{FieldMap, WirePolicy, WireRule};
