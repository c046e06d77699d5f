//! License policies

use super::actions::{common_actions, custom_severity};
use crate::schema::{fields, FieldDescriptor, Fields, PolicySchema, Validation};
use serde_json::json;

pub const TYPE_NAME: &str = "xray_license_policy";

pub const DESCRIPTION: &str =
    "Xray license policy, managed through the v2 policies API with bearer token auth";

pub fn criteria() -> Fields {
    fields([
        (
            "banned_licenses",
            FieldDescriptor::string_set("OSS license names that may not be attached to a component")
                .with_validation(Validation::LicenseName),
        ),
        (
            "allowed_licenses",
            FieldDescriptor::string_set("OSS license names that may be attached to a component")
                .with_validation(Validation::LicenseName),
        ),
        (
            "allow_unknown",
            FieldDescriptor::bool("Raise a violation for artifacts with unknown licenses")
                .with_default(json!(true)),
        ),
        (
            "multi_license_permissive",
            FieldDescriptor::bool(
                "Skip the violation when at least one of several detected licenses is valid",
            )
            .with_default(json!(false))
            .since_version(1),
        ),
    ])
}

pub fn action_overrides() -> Fields {
    fields([("custom_severity", custom_severity())])
}

pub fn schema() -> PolicySchema {
    PolicySchema::compose(criteria(), &common_actions(), action_overrides()).with_version(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Strictness;
    use serde_json::Value;

    #[test]
    fn test_allow_and_deny_lists_pass_through() {
        let input = json!({
            "banned_licenses": ["GPL-3.0", "AGPL-3.0"],
            "allowed_licenses": ["MIT"],
        });
        let out = schema()
            .normalize_criteria(input.as_object().unwrap(), "criteria", Strictness::Declared)
            .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({
                "banned_licenses": ["AGPL-3.0", "GPL-3.0"],
                "allowed_licenses": ["MIT"],
                "allow_unknown": true,
                "multi_license_permissive": false,
            })
        );
    }

    #[test]
    fn test_custom_severity_case_insensitive() {
        let input = json!({ "custom_severity": "low" });
        let out = schema()
            .normalize_actions(input.as_object().unwrap(), "actions", Strictness::Declared)
            .unwrap();
        assert_eq!(out["custom_severity"], json!("Low"));
    }
}
