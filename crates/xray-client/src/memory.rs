//! In-memory implementation of the policy API
//!
//! Behaves like the Xray policies endpoint closely enough for development
//! and testing: names are unique per project, the server stamps author and
//! timestamps, and missing policies answer with `NotFound`. Every write is
//! recorded with its exact JSON body.

use crate::api::PolicyApi;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use xray_types::WirePolicy;

const SERVER_AUTHOR: &str = "admin";

/// Kind of write received by the in-memory server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

/// A write as it reached the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub kind: WriteKind,
    pub name: String,
    pub project_key: Option<String>,
    /// Serialized request body, absent for deletes
    pub body: Option<String>,
}

type PolicyKey = (Option<String>, String);

/// In-memory policy store
#[derive(Debug, Default)]
pub struct InMemoryPolicyApi {
    policies: DashMap<PolicyKey, WirePolicy>,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl InMemoryPolicyApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Stored policy, as the server would return it
    pub fn stored(&self, name: &str, project_key: Option<&str>) -> Option<WirePolicy> {
        self.policies
            .get(&key(name, project_key))
            .map(|p| p.value().clone())
    }

    /// Insert a policy directly, bypassing validation and recording
    pub fn seed(&self, policy: WirePolicy, project_key: Option<&str>) {
        self.policies
            .insert(key(&policy.name, project_key), policy);
    }

    /// Writes received so far, oldest first
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(
        &self,
        kind: WriteKind,
        name: &str,
        project_key: Option<&str>,
        body: Option<&WirePolicy>,
    ) -> ClientResult<()> {
        let body = body.map(serde_json::to_string).transpose()?;
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedWrite {
                kind,
                name: name.to_string(),
                project_key: project_key.map(str::to_string),
                body,
            });
        Ok(())
    }

    fn validate(policy: &WirePolicy) -> ClientResult<()> {
        if policy.rules.is_empty() {
            return Err(rejected("Policy must contain at least one rule"));
        }

        let mut seen = HashSet::new();
        for rule in &policy.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(rejected(&format!(
                    "Rule names must be unique, '{}' is repeated",
                    rule.name
                )));
            }
        }
        Ok(())
    }
}

fn key(name: &str, project_key: Option<&str>) -> PolicyKey {
    (project_key.map(str::to_string), name.to_string())
}

fn rejected(message: &str) -> ClientError {
    ClientError::Rejected {
        status: 400,
        message: message.to_string(),
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl PolicyApi for InMemoryPolicyApi {
    async fn get_policy(&self, name: &str, project_key: Option<&str>) -> ClientResult<WirePolicy> {
        self.stored(name, project_key)
            .ok_or_else(|| ClientError::NotFound(format!("Policy {} not found", name)))
    }

    async fn create_policy(
        &self,
        policy: &WirePolicy,
        project_key: Option<&str>,
    ) -> ClientResult<()> {
        self.record(WriteKind::Create, &policy.name, project_key, Some(policy))?;
        Self::validate(policy)?;

        let k = key(&policy.name, project_key);
        if self.policies.contains_key(&k) {
            return Err(ClientError::Conflict(format!(
                "Policy {} already exists",
                policy.name
            )));
        }

        let timestamp = now();
        let mut stored = policy.without_server_fields();
        stored.author = Some(SERVER_AUTHOR.to_string());
        stored.created = Some(timestamp.clone());
        stored.modified = Some(timestamp);
        self.policies.insert(k, stored);
        Ok(())
    }

    async fn update_policy(
        &self,
        name: &str,
        policy: &WirePolicy,
        project_key: Option<&str>,
    ) -> ClientResult<()> {
        self.record(WriteKind::Update, name, project_key, Some(policy))?;
        Self::validate(policy)?;

        let mut entry = self
            .policies
            .get_mut(&key(name, project_key))
            .ok_or_else(|| ClientError::NotFound(format!("Policy {} not found", name)))?;

        let mut replaced = policy.without_server_fields();
        replaced.author = entry.author.clone();
        replaced.created = entry.created.clone();
        replaced.modified = Some(now());
        *entry = replaced;
        Ok(())
    }

    async fn delete_policy(&self, name: &str, project_key: Option<&str>) -> ClientResult<()> {
        self.record(WriteKind::Delete, name, project_key, None)?;
        self.policies
            .remove(&key(name, project_key))
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("Policy {} not found", name)))
    }
}
