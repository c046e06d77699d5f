//! Provider registry
//!
//! Owns one [`PolicyResource`] per policy family, keyed by resource type
//! name. Schemas are composed once here, before any lifecycle call.

use crate::config::ProviderConfig;
use crate::error::ProviderResult;
use crate::reconciler::PolicyResource;
use crate::session::Session;
use std::collections::BTreeMap;
use xray_types::PolicyFamily;

/// Registered resource types and session negotiation
#[derive(Debug, Clone)]
pub struct Provider {
    resources: BTreeMap<&'static str, PolicyResource>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    pub fn new() -> Self {
        let resources = PolicyFamily::ALL
            .into_iter()
            .map(PolicyResource::new)
            .map(|resource| (resource.type_name(), resource))
            .collect();
        Self { resources }
    }

    /// Resource handler for a type name such as `xray_license_policy`
    pub fn resource(&self, type_name: &str) -> Option<&PolicyResource> {
        self.resources.get(type_name)
    }

    /// Registered type names, sorted
    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn resources(&self) -> impl Iterator<Item = &PolicyResource> {
        self.resources.values()
    }

    /// Negotiate the session every lifecycle call will share
    pub async fn configure(
        &self,
        config: ProviderConfig,
        host_version: &str,
    ) -> ProviderResult<Session> {
        Session::builder(config)
            .with_host_version(host_version)
            .build()
            .await
    }
}
