//! Policy family discriminator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The family a policy belongs to. Determines which criteria are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyFamily {
    /// Vulnerability policies (severity or CVSS based)
    Security,

    /// OSS license compliance policies
    License,

    /// Operational risk policies (EOL, release cadence, ...)
    OperationalRisk,
}

impl PolicyFamily {
    /// All families, in a stable order
    pub const ALL: [PolicyFamily; 3] = [
        PolicyFamily::Security,
        PolicyFamily::License,
        PolicyFamily::OperationalRisk,
    ];

    /// Wire name used in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyFamily::Security => "security",
            PolicyFamily::License => "license",
            PolicyFamily::OperationalRisk => "operational_risk",
        }
    }
}

impl fmt::Display for PolicyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognised family name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown policy family: {0}")]
pub struct UnknownFamily(pub String);

impl FromStr for PolicyFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security" => Ok(PolicyFamily::Security),
            "license" => Ok(PolicyFamily::License),
            "operational_risk" => Ok(PolicyFamily::OperationalRisk),
            other => Err(UnknownFamily(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_wire_names() {
        assert_eq!(
            serde_json::to_value(PolicyFamily::OperationalRisk).unwrap(),
            serde_json::json!("operational_risk")
        );
        let family: PolicyFamily = serde_json::from_str("\"license\"").unwrap();
        assert_eq!(family, PolicyFamily::License);
    }

    #[test]
    fn test_family_from_str() {
        for family in PolicyFamily::ALL {
            assert_eq!(family.as_str().parse::<PolicyFamily>().unwrap(), family);
        }
        assert!("watch".parse::<PolicyFamily>().is_err());
    }
}
