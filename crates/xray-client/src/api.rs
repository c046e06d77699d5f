//! Policy API trait

use crate::error::ClientResult;
use async_trait::async_trait;
use xray_types::WirePolicy;

/// CRUD access to Xray policies.
///
/// Implementations return raw client errors; interpreting a `NotFound` as
/// drift or as success is up to the caller. `project_key` scopes the call to
/// a platform project when set.
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Fetch a policy by name
    async fn get_policy(&self, name: &str, project_key: Option<&str>) -> ClientResult<WirePolicy>;

    /// Create a policy
    async fn create_policy(&self, policy: &WirePolicy, project_key: Option<&str>)
        -> ClientResult<()>;

    /// Replace a policy as a whole
    async fn update_policy(
        &self,
        name: &str,
        policy: &WirePolicy,
        project_key: Option<&str>,
    ) -> ClientResult<()>;

    /// Delete a policy by name
    async fn delete_policy(&self, name: &str, project_key: Option<&str>) -> ClientResult<()>;
}
