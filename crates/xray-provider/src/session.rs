//! Session negotiation
//!
//! A [`Session`] is built once per provider run from [`ProviderConfig`]:
//!
//! 1. validate the configuration (no network access)
//! 2. build the REST client
//! 3. resolve the bearer token (OIDC exchange, then the explicit token)
//! 4. check the platform license tier
//! 5. record the platform and Xray versions
//! 6. report usage in the background
//!
//! The resulting session is immutable and shared by reference with every
//! lifecycle call.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use semver::Version;
use std::fmt;
use std::sync::Arc;
use xray_client::{ClientError, PolicyApi, RestClient};

/// Identifier sent as `User-Agent` and in usage reports
pub const PRODUCT_ID: &str = concat!("xray-provider/", env!("CARGO_PKG_VERSION"));

/// License tiers that include the policies API
pub const SUPPORTED_LICENSE_TIERS: [&str; 2] = ["Enterprise", "Commercial"];

/// Authenticated connection to one platform
pub struct Session {
    base_url: String,
    access_token: String,
    client: Arc<dyn PolicyApi>,
    artifactory_version: String,
    xray_version: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("artifactory_version", &self.artifactory_version)
            .field("xray_version", &self.xray_version)
            .finish()
    }
}

impl Session {
    /// Start negotiating a session
    pub fn builder(config: ProviderConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Assemble a session from already negotiated parts.
    ///
    /// A blank access token is rejected; a session is always authenticated.
    pub fn from_parts(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        client: Arc<dyn PolicyApi>,
        artifactory_version: impl Into<String>,
        xray_version: impl Into<String>,
    ) -> ProviderResult<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(ProviderError::Auth("access token is empty".to_string()));
        }

        Ok(Self {
            base_url: base_url.into(),
            access_token,
            client,
            artifactory_version: artifactory_version.into(),
            xray_version: xray_version.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn artifactory_version(&self) -> &str {
        &self.artifactory_version
    }

    pub fn xray_version(&self) -> &str {
        &self.xray_version
    }

    /// Policies endpoint
    pub fn policies(&self) -> &dyn PolicyApi {
        self.client.as_ref()
    }

    /// Whether the Xray version is at least `minimum`.
    ///
    /// A version that cannot be parsed counts as capable.
    pub fn supports(&self, minimum: &Version) -> bool {
        match parse_version(&self.xray_version) {
            Some(version) => version >= *minimum,
            None => true,
        }
    }
}

/// Parse `3.82.0`, `v3.82` or `3.82.0-rc1`; missing components are zero
fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let core = raw.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some(Version::new(major, minor, patch))
}

/// Negotiates a [`Session`]
#[derive(Debug)]
pub struct SessionBuilder {
    config: ProviderConfig,
    host_version: String,
}

impl SessionBuilder {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            host_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Version of the host driving the provider, used in the usage report
    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub async fn build(self) -> ProviderResult<Session> {
        self.config.validate()?;
        let url = self.config.url.as_deref().unwrap_or_default().trim();

        let client = RestClient::build(url, PRODUCT_ID)
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        let token = self.resolve_token(&client).await?;
        let client = client
            .with_bearer_token(&token)
            .map_err(|e| ProviderError::Auth(e.to_string()))?;

        if self.config.check_license {
            match client.check_license(&SUPPORTED_LICENSE_TIERS).await {
                Ok(()) => {}
                Err(e @ ClientError::UnsupportedLicense { .. }) => {
                    return Err(ProviderError::License(e.to_string()))
                }
                Err(e) => return Err(ProviderError::client("check license", e)),
            }
        } else {
            tracing::debug!("License check disabled");
        }

        let artifactory_version = client
            .artifactory_version()
            .await
            .map_err(|e| ProviderError::client("get platform version", e))?;
        let xray_version = client
            .xray_version()
            .await
            .map_err(|e| ProviderError::client("get Xray version", e))?;

        tracing::info!(
            url = %client.base_url(),
            artifactory_version = %artifactory_version,
            xray_version = %xray_version,
            "Session established"
        );

        spawn_usage_report(client.clone(), &self.host_version);

        Ok(Session {
            base_url: client.base_url().to_string(),
            access_token: token,
            client: Arc::new(client),
            artifactory_version,
            xray_version,
        })
    }

    /// OIDC exchange first, then the explicit token overrides it
    async fn resolve_token(&self, client: &RestClient) -> ProviderResult<String> {
        let mut token = String::new();

        if let Some(provider_name) = &self.config.oidc_provider_name {
            match non_empty(&self.config.oidc_subject_token) {
                Some(subject_token) => {
                    token = client
                        .oidc_token_exchange(provider_name, subject_token)
                        .await
                        .map_err(|e| {
                            ProviderError::Auth(format!(
                                "OIDC token exchange with '{}' failed: {}",
                                provider_name, e
                            ))
                        })?;
                    if token.is_empty() {
                        tracing::warn!(provider = %provider_name, "OIDC token exchange returned no token");
                    } else {
                        tracing::debug!(provider = %provider_name, "OIDC token exchange succeeded");
                    }
                }
                None => {
                    tracing::warn!(
                        provider = %provider_name,
                        "OIDC provider configured but no subject token available, skipping exchange"
                    );
                }
            }
        }

        if let Some(access_token) = non_empty(&self.config.access_token) {
            token = access_token.to_string();
        }

        if token.is_empty() {
            return Err(ProviderError::Auth(
                "no access token: set access_token or configure OIDC".to_string(),
            ));
        }
        Ok(token)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Fire and forget; the outcome is only logged. Skipped outside a tokio runtime.
fn spawn_usage_report(client: RestClient, host_version: &str) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("No tokio runtime, usage report skipped");
        return;
    };
    let features = vec![format!("Host/{}", host_version)];
    runtime.spawn(async move {
        if let Err(e) = client.send_usage(&features).await {
            tracing::debug!(error = %e, "Usage report failed");
        }
    });
}
