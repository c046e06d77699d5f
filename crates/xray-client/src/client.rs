//! HTTP client for the JFrog platform

use crate::api::PolicyApi;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use xray_types::WirePolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const POLICIES_PATH: [&str; 4] = ["xray", "api", "v2", "policies"];

/// HTTP client bound to one platform URL.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: Url,
    product_id: String,
    token: Option<String>,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_str())
            .field("product_id", &self.product_id)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

/// `GET /artifactory/api/system/version`
#[derive(Debug, Deserialize)]
struct ArtifactoryVersionResponse {
    version: String,
}

/// `GET /xray/api/v1/system/version`
#[derive(Debug, Deserialize)]
struct XrayVersionResponse {
    xray_version: String,
}

/// `GET /artifactory/api/system/license`
#[derive(Debug, Deserialize)]
struct LicenseResponse {
    #[serde(rename = "type")]
    license_type: String,
}

/// RFC 8693 token exchange request accepted by the Access service
#[derive(Debug, Serialize)]
struct OidcTokenRequest<'a> {
    grant_type: &'a str,
    subject_token_type: &'a str,
    subject_token: &'a str,
    provider_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct OidcTokenResponse {
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageReport<'a> {
    product_id: &'a str,
    features: Vec<UsageFeature<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageFeature<'a> {
    feature_id: &'a str,
}

impl RestClient {
    /// Create a client for `url`, tagging every request with `product_id`.
    ///
    /// Only absolute `http` and `https` URLs are accepted.
    pub fn build(url: &str, product_id: &str) -> ClientResult<Self> {
        let base_url = parse_base_url(url)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(product_id)
            .build()?;

        Ok(Self {
            client,
            base_url,
            product_id: product_id.to_string(),
            token: None,
        })
    }

    /// Attach bearer authentication
    pub fn with_bearer_token(mut self, token: &str) -> ClientResult<Self> {
        if token.trim().is_empty() {
            return Err(ClientError::MissingCredentials);
        }
        self.token = Some(token.to_string());
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    // ========== System API ==========

    /// Platform (Artifactory) version
    pub async fn artifactory_version(&self) -> ClientResult<String> {
        let response: ArtifactoryVersionResponse = self
            .get(&["artifactory", "api", "system", "version"])
            .await?;
        Ok(response.version)
    }

    /// Xray version
    pub async fn xray_version(&self) -> ClientResult<String> {
        let response: XrayVersionResponse =
            self.get(&["xray", "api", "v1", "system", "version"]).await?;
        Ok(response.xray_version)
    }

    /// License type reported by the platform, e.g. `Enterprise Plus`
    pub async fn license_type(&self) -> ClientResult<String> {
        let response: LicenseResponse = self
            .get(&["artifactory", "api", "system", "license"])
            .await?;
        Ok(response.license_type)
    }

    /// Fail unless the platform license matches one of `tiers`.
    ///
    /// Matching is a case-insensitive substring test, so `Enterprise Plus`
    /// satisfies `Enterprise`.
    pub async fn check_license(&self, tiers: &[&str]) -> ClientResult<()> {
        let found = self.license_type().await?;
        let lowered = found.to_lowercase();

        if tiers
            .iter()
            .any(|tier| lowered.contains(&tier.to_lowercase()))
        {
            Ok(())
        } else {
            Err(ClientError::UnsupportedLicense {
                found,
                required: tiers.iter().map(|t| t.to_string()).collect(),
            })
        }
    }

    /// Exchange an OIDC identity token for a platform access token.
    ///
    /// Returns an empty string when the service answers without a token.
    pub async fn oidc_token_exchange(
        &self,
        provider_name: &str,
        subject_token: &str,
    ) -> ClientResult<String> {
        let request = OidcTokenRequest {
            grant_type: "urn:ietf:params:oauth:grant-type:token-exchange",
            subject_token_type: "urn:ietf:params:oauth:token-type:id_token",
            subject_token,
            provider_name,
        };

        let response: OidcTokenResponse = self
            .post(&["access", "api", "v1", "oidc", "token"], &request)
            .await?;
        Ok(response.access_token)
    }

    /// Report feature usage to the platform
    pub async fn send_usage(&self, features: &[String]) -> ClientResult<()> {
        let report = UsageReport {
            product_id: &self.product_id,
            features: features
                .iter()
                .map(|f| UsageFeature { feature_id: f })
                .collect(),
        };

        let url = self.endpoint(&["artifactory", "api", "system", "usage"], None)?;
        let request = self.request(Method::POST, url).json(&report);
        self.send_discarding(request).await
    }

    // ========== Internal HTTP helpers ==========

    fn endpoint(&self, segments: &[&str], project_key: Option<&str>) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(segments);

        if let Some(key) = project_key {
            url.query_pairs_mut().append_pair("projectKey", key);
        }
        Ok(url)
    }

    fn policy_endpoint(&self, name: Option<&str>, project_key: Option<&str>) -> ClientResult<Url> {
        let mut segments: Vec<&str> = POLICIES_PATH.to_vec();
        if let Some(name) = name {
            segments.push(name);
        }
        self.endpoint(&segments, project_key)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(method = %method, url = %url, "Sending request");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ClientResult<T> {
        let url = self.endpoint(segments, None)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> ClientResult<T> {
        let url = self.endpoint(segments, None)?;
        let response = self.request(Method::POST, url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn send_discarding(&self, request: RequestBuilder) -> ClientResult<()> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::from_status(status, message))
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();

        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::from_status(status, message))
        }
    }
}

#[async_trait]
impl PolicyApi for RestClient {
    async fn get_policy(&self, name: &str, project_key: Option<&str>) -> ClientResult<WirePolicy> {
        let url = self.policy_endpoint(Some(name), project_key)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    async fn create_policy(
        &self,
        policy: &WirePolicy,
        project_key: Option<&str>,
    ) -> ClientResult<()> {
        let url = self.policy_endpoint(None, project_key)?;
        let request = self.request(Method::POST, url).json(policy);
        self.send_discarding(request).await
    }

    async fn update_policy(
        &self,
        name: &str,
        policy: &WirePolicy,
        project_key: Option<&str>,
    ) -> ClientResult<()> {
        let url = self.policy_endpoint(Some(name), project_key)?;
        let request = self.request(Method::PUT, url).json(policy);
        self.send_discarding(request).await
    }

    async fn delete_policy(&self, name: &str, project_key: Option<&str>) -> ClientResult<()> {
        let url = self.policy_endpoint(Some(name), project_key)?;
        let request = self.request(Method::DELETE, url);
        self.send_discarding(request).await
    }
}

fn parse_base_url(url: &str) -> ClientResult<Url> {
    let invalid = |reason: &str| ClientError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xray_types::PolicyFamily;

    const PRODUCT: &str = "xray-provider/test";

    fn sample_policy() -> WirePolicy {
        WirePolicy {
            name: "no gpl".into(),
            description: None,
            family: PolicyFamily::License,
            rules: vec![],
            author: None,
            created: None,
            modified: None,
        }
    }

    #[test]
    fn test_url_validation() {
        assert!(RestClient::build("http://localhost:8081", PRODUCT).is_ok());
        assert!(RestClient::build("https://acme.jfrog.io/", PRODUCT).is_ok());
        assert!(matches!(
            RestClient::build("ftp://acme.jfrog.io", PRODUCT),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RestClient::build("not a url", PRODUCT),
            Err(ClientError::InvalidUrl { .. })
        ));
        assert!(matches!(
            RestClient::build("", PRODUCT),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        let client = RestClient::build("http://localhost:8081", PRODUCT).unwrap();
        assert!(matches!(
            client.with_bearer_token("  "),
            Err(ClientError::MissingCredentials)
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = RestClient::build("http://localhost:8081", PRODUCT)
            .unwrap()
            .with_bearer_token("secret-token")
            .unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("authenticated: true"));
    }

    #[test]
    fn test_policy_endpoint_encoding() {
        let client = RestClient::build("https://acme.jfrog.io/", PRODUCT).unwrap();
        let url = client
            .policy_endpoint(Some("no gpl"), Some("proj1"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://acme.jfrog.io/xray/api/v2/policies/no%20gpl?projectKey=proj1"
        );
    }

    #[tokio::test]
    async fn test_versions_and_bearer_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/api/system/version"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "7.77.3" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/xray/api/v1/system/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "xray_version": "3.86.4", "xray_revision": "abc" })),
            )
            .mount(&server)
            .await;

        let client = RestClient::build(&server.uri(), PRODUCT)
            .unwrap()
            .with_bearer_token("tok")
            .unwrap();

        assert_eq!(client.artifactory_version().await.unwrap(), "7.77.3");
        assert_eq!(client.xray_version().await.unwrap(), "3.86.4");
    }

    #[tokio::test]
    async fn test_check_license_tiers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifactory/api/system/license"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "type": "Enterprise Plus" })))
            .mount(&server)
            .await;

        let client = RestClient::build(&server.uri(), PRODUCT).unwrap();
        assert!(client.check_license(&["Enterprise", "Commercial"]).await.is_ok());
        assert!(matches!(
            client.check_license(&["Commercial"]).await,
            Err(ClientError::UnsupportedLicense { .. })
        ));
    }

    #[tokio::test]
    async fn test_oidc_exchange_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/access/api/v1/oidc/token"))
            .and(body_json(json!({
                "grant_type": "urn:ietf:params:oauth:grant-type:token-exchange",
                "subject_token_type": "urn:ietf:params:oauth:token-type:id_token",
                "subject_token": "id-token",
                "provider_name": "github"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "exchanged" })))
            .mount(&server)
            .await;

        let client = RestClient::build(&server.uri(), PRODUCT).unwrap();
        let token = client.oidc_token_exchange("github", "id-token").await.unwrap();
        assert_eq!(token, "exchanged");
    }

    #[tokio::test]
    async fn test_policy_calls_map_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xray/api/v2/policies/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Policy not found"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/xray/api/v2/policies"))
            .and(query_param("projectKey", "proj1"))
            .respond_with(ResponseTemplate::new(409).set_body_string("Policy already exists"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/xray/api/v2/policies/no%20gpl"))
            .respond_with(ResponseTemplate::new(400).set_body_string("rule name is required"))
            .mount(&server)
            .await;

        let client = RestClient::build(&server.uri(), PRODUCT).unwrap();
        let policy = sample_policy();

        assert!(client.get_policy("missing", None).await.unwrap_err().is_not_found());
        assert!(matches!(
            client.create_policy(&policy, Some("proj1")).await,
            Err(ClientError::Conflict(m)) if m == "Policy already exists"
        ));
        assert!(matches!(
            client.update_policy("no gpl", &policy, None).await,
            Err(ClientError::Rejected { status: 400, message }) if message == "rule name is required"
        ));
    }
}
