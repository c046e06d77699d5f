//! Declared policy configuration and reconciled policy state

use serde::{Deserialize, Serialize};
use xray_types::{FieldMap, PolicyFamily, WirePolicy, WireRule};

/// A policy as the user declares it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Platform project owning the policy
    #[serde(default)]
    pub project_key: Option<String>,

    #[serde(default, alias = "rule")]
    pub rules: Vec<RuleConfig>,
}

/// One declared rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,

    /// Explicit priority; defaults to the rule's position (1-based)
    #[serde(default)]
    pub priority: Option<u32>,

    #[serde(default)]
    pub criteria: FieldMap,

    #[serde(default)]
    pub actions: FieldMap,
}

/// Reconciled state of one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    pub name: String,

    #[serde(rename = "type")]
    pub family: PolicyFamily,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,

    /// Rules in evaluation order
    pub rules: Vec<Rule>,

    /// Schema version the state was written with
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// One normalised rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub priority: u32,
    pub criteria: FieldMap,
    pub actions: FieldMap,
}

impl PolicyState {
    /// Import identifier: `name`, or `name:project_key` for project policies
    pub fn import_id(&self) -> String {
        match &self.project_key {
            Some(key) => format!("{}:{}", self.name, key),
            None => self.name.clone(),
        }
    }

    /// Copy without `author`, `created` and `modified`
    pub fn without_server_fields(&self) -> Self {
        Self {
            author: None,
            created: None,
            modified: None,
            ..self.clone()
        }
    }

    /// Take the server-assigned fields from `observed`
    pub fn merge_server_fields(mut self, observed: &PolicyState) -> Self {
        self.author = observed.author.clone();
        self.created = observed.created.clone();
        self.modified = observed.modified.clone();
        self
    }

    /// Wire payload for this state, without server-assigned fields
    pub fn to_wire(&self) -> WirePolicy {
        WirePolicy {
            name: self.name.clone(),
            description: self.description.clone(),
            family: self.family,
            rules: self
                .rules
                .iter()
                .map(|rule| WireRule {
                    name: rule.name.clone(),
                    priority: rule.priority,
                    criteria: rule.criteria.clone(),
                    actions: rule.actions.clone(),
                })
                .collect(),
            author: None,
            created: None,
            modified: None,
        }
    }
}

/// Split an import id into name and project key
pub fn parse_import_id(id: &str) -> (&str, Option<&str>) {
    match id.rsplit_once(':') {
        Some((name, key)) if !name.is_empty() && !key.is_empty() => (name, Some(key)),
        _ => (id, None),
    }
}

/// Field paths where `observed` differs from `expected`.
///
/// Server-assigned fields and the schema version are ignored.
pub fn drift(expected: &PolicyState, observed: &PolicyState) -> Vec<String> {
    let mut paths = Vec::new();

    if expected.description != observed.description {
        paths.push("description".to_string());
    }

    if expected.rules.len() != observed.rules.len() {
        paths.push("rules".to_string());
        return paths;
    }

    for (index, (want, have)) in expected.rules.iter().zip(&observed.rules).enumerate() {
        let prefix = format!("rules[{}]", index);
        if want.name != have.name {
            paths.push(format!("{}.name", prefix));
        }
        if want.priority != have.priority {
            paths.push(format!("{}.priority", prefix));
        }
        diff_block(&format!("{}.criteria", prefix), &want.criteria, &have.criteria, &mut paths);
        diff_block(&format!("{}.actions", prefix), &want.actions, &have.actions, &mut paths);
    }

    paths
}

fn diff_block(prefix: &str, want: &FieldMap, have: &FieldMap, paths: &mut Vec<String>) {
    let keys = want
        .keys()
        .chain(have.keys())
        .collect::<std::collections::BTreeSet<_>>();
    for key in keys {
        if want.get(key) != have.get(key) {
            paths.push(format!("{}.{}", prefix, key));
        }
    }
}
