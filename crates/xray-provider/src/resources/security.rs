//! Security policies

use super::actions::common_actions;
use crate::schema::{fields, FieldDescriptor, Fields, PolicySchema, Validation};
use serde_json::json;

pub const TYPE_NAME: &str = "xray_security_policy";

pub const DESCRIPTION: &str =
    "Xray security policy, managed through the v2 policies API with bearer token auth";

fn cvss_score(description: &'static str) -> FieldDescriptor {
    FieldDescriptor::float(description)
        .required()
        .with_validation(Validation::Range {
            min: 0.0,
            max: 10.0,
        })
}

pub fn criteria() -> Fields {
    fields([
        (
            "min_severity",
            FieldDescriptor::enumeration(
                &["All Severities", "Critical", "High", "Medium", "Low"],
                true,
                "Minimum severity of the vulnerabilities that trigger a violation",
            ),
        ),
        (
            "cvss_range",
            FieldDescriptor::block(
                fields([
                    ("from", cvss_score("Lowest CVSS score that triggers a violation")),
                    ("to", cvss_score("Highest CVSS score that triggers a violation")),
                ]),
                "CVSS score range that triggers a violation",
            ),
        ),
        (
            "fix_version_dependant",
            FieldDescriptor::bool("Only raise violations for vulnerabilities with a fix version")
                .with_default(json!(false)),
        ),
        (
            "malicious_package",
            FieldDescriptor::bool("Raise violations for known malicious packages")
                .with_default(json!(false)),
        ),
        (
            "vulnerability_ids",
            FieldDescriptor::string_set("CVE or Xray ids that trigger a violation")
                .with_validation(Validation::NonEmpty),
        ),
    ])
}

/// Security policies use the common actions unchanged
pub fn action_overrides() -> Fields {
    Fields::new()
}

pub fn schema() -> PolicySchema {
    PolicySchema::compose(criteria(), &common_actions(), action_overrides())
        .with_version(1)
        .with_exclusive_criteria("min_severity", "cvss_range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::schema::Strictness;

    #[test]
    fn test_severity_and_range_are_exclusive() {
        let input = json!({
            "min_severity": "High",
            "cvss_range": { "from": 7, "to": 10 },
        });
        let err = schema()
            .normalize_criteria(input.as_object().unwrap(), "rules[0].criteria", Strictness::Declared)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ConflictingFields { .. }));
    }

    #[test]
    fn test_all_severities_accepted() {
        let input = json!({ "min_severity": "all severities" });
        let out = schema()
            .normalize_criteria(input.as_object().unwrap(), "criteria", Strictness::Declared)
            .unwrap();
        assert_eq!(out["min_severity"], json!("All Severities"));
        assert_eq!(out["malicious_package"], json!(false));
    }
}
