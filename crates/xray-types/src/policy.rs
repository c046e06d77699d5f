//! Policy payloads for the V2 policies API

use crate::PolicyFamily;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form JSON object used for criteria and actions blocks
pub type FieldMap = Map<String, Value>;

/// A policy as exchanged with Xray
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePolicy {
    /// Policy name, unique on the server
    pub name: String,

    /// Free text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Policy family
    #[serde(rename = "type")]
    pub family: PolicyFamily,

    /// Ordered rules
    #[serde(default)]
    pub rules: Vec<WireRule>,

    /// Server-assigned author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Server-assigned creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    /// Server-assigned modification timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl WirePolicy {
    /// Copy of this policy without the server-assigned fields.
    ///
    /// This is what goes out on create and update.
    pub fn without_server_fields(&self) -> Self {
        Self {
            author: None,
            created: None,
            modified: None,
            ..self.clone()
        }
    }
}

/// One rule of a policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRule {
    pub name: String,

    /// Evaluation priority, lower first
    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub criteria: FieldMap,

    #[serde(default)]
    pub actions: FieldMap,
}
