//! Provider configuration
//!
//! Values come from an optional config file (YAML, TOML or JSON). Fields the
//! file leaves unset fall back to environment variables, checked in order,
//! and finally to built-in defaults.

use crate::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// URL used when neither the file nor the environment provides one
pub const DEFAULT_URL: &str = "http://localhost:8081";

/// Environment variables for `url`, highest priority first
pub const URL_ENV: [&str; 2] = ["XRAY_URL", "JFROG_URL"];

/// Environment variables for `access_token`, highest priority first
pub const ACCESS_TOKEN_ENV: [&str; 2] = ["XRAY_ACCESS_TOKEN", "JFROG_ACCESS_TOKEN"];

/// Environment variable carrying the workload identity token for OIDC
pub const OIDC_SUBJECT_TOKEN_ENV: &str = "TFC_WORKLOAD_IDENTITY_TOKEN";

/// Provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Platform URL
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token. Wins over a token obtained through OIDC.
    #[serde(default)]
    pub access_token: Option<String>,

    /// OIDC integration name configured on the platform
    #[serde(default)]
    pub oidc_provider_name: Option<String>,

    /// Identity token presented in the OIDC exchange
    #[serde(default)]
    pub oidc_subject_token: Option<String>,

    /// Pre-flight license tier check
    #[serde(default = "default_true")]
    pub check_license: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: None,
            access_token: None,
            oidc_provider_name: None,
            oidc_subject_token: None,
            check_license: true,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("access_token", &redacted(&self.access_token))
            .field("oidc_provider_name", &self.oidc_provider_name)
            .field("oidc_subject_token", &redacted(&self.oidc_subject_token))
            .field("check_license", &self.check_license)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Load configuration from an optional file, then apply environment
    /// defaults from the process environment
    pub fn load(path: Option<&str>) -> ProviderResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let mut loaded: ProviderConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        loaded.apply_env_defaults(|name| std::env::var(name).ok());
        Ok(loaded)
    }

    /// Fill unset fields from `lookup`, trying each variable in order.
    ///
    /// `url` ends up set in every case, falling back to [`DEFAULT_URL`].
    pub fn apply_env_defaults<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
        };

        if self.url.is_none() {
            self.url = Some(first_set(&URL_ENV[..]).unwrap_or_else(|| DEFAULT_URL.to_string()));
        }
        if self.access_token.is_none() {
            self.access_token = first_set(&ACCESS_TOKEN_ENV[..]);
        }
        if self.oidc_subject_token.is_none() {
            self.oidc_subject_token = first_set(&[OIDC_SUBJECT_TOKEN_ENV][..]);
        }
    }

    /// Checks that need no network access
    pub fn validate(&self) -> ProviderResult<()> {
        match self.url.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(ProviderError::Config("you must supply a URL".to_string()))
            }
            Some(_) => {}
        }

        if let Some(name) = &self.oidc_provider_name {
            if name.trim().is_empty() {
                return Err(ProviderError::Config(
                    "oidc_provider_name must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
