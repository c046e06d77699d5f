//! Xray Provider - declarative management of Xray policies
//!
//! Reconciles declared security, license and operational-risk policies
//! against a JFrog Xray server:
//!
//! - **Session**: validates configuration, resolves a bearer token (explicit
//!   or OIDC), checks the license tier and records server versions
//! - **Schema**: per-family criteria plus shared actions, composed once into
//!   a [`PolicySchema`] that validates and normalises policy fields
//! - **Reconciler**: create, read, update, delete and import of one policy,
//!   with drift detection and schema migration
//! - **Apply**: converges a whole desired-state file, recording results in a
//!   local state file
//!
//! ## Example
//!
//! ```ignore
//! use xray_provider::{Applier, DesiredState, Provider, ProviderConfig, StateFile};
//!
//! let provider = Provider::new();
//! let session = provider.configure(ProviderConfig::load(None)?, "cli").await?;
//! let desired = DesiredState::from_yaml(&std::fs::read_to_string("policies.yaml")?)?;
//! let mut state = StateFile::load("state.json".as_ref())?;
//!
//! let report = Applier::new(&provider, &session).apply(&desired, &mut state).await;
//! state.save("state.json".as_ref())?;
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod apply;
pub mod config;
pub mod error;
pub mod policy;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod schema;
pub mod session;
pub mod state;

// Re-exports
pub use apply::{Action, Applier, ApplyReport, DeclaredPolicy, DesiredState};
pub use config::ProviderConfig;
pub use error::{
    Diagnostic, ProviderError, ProviderResult, ReconcileError, ReconcileResult, Severity,
    StateError, ValidationError,
};
pub use policy::{PolicyConfig, PolicyState, Rule, RuleConfig};
pub use provider::Provider;
pub use reconciler::{PolicyResource, ReadOutcome};
pub use schema::{FieldDescriptor, FieldKind, PolicySchema, Strictness};
pub use session::{Session, SessionBuilder, PRODUCT_ID};
pub use state::StateFile;
