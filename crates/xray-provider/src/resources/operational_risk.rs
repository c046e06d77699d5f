//! Operational-risk policies

use super::actions::{common_actions, custom_severity};
use crate::schema::{fields, FieldDescriptor, Fields, PolicySchema, Validation};
use serde_json::json;

pub const TYPE_NAME: &str = "xray_operational_risk_policy";

pub const DESCRIPTION: &str =
    "Xray operational risk policy, managed through the v2 policies API with bearer token auth";

fn threshold(description: &'static str) -> FieldDescriptor {
    FieldDescriptor::int(description).with_validation(Validation::NonNegative)
}

fn custom_criteria() -> Fields {
    fields([
        (
            "use_and_condition",
            FieldDescriptor::bool("Require every condition to match instead of any")
                .with_default(json!(false)),
        ),
        (
            "is_eol",
            FieldDescriptor::bool("Match components that reached end of life")
                .with_default(json!(false)),
        ),
        (
            "release_date_greater_than_months",
            threshold("Match components whose latest release is older than this many months"),
        ),
        (
            "newer_versions_greater_than",
            threshold("Match components with more newer versions than this"),
        ),
        (
            "release_cadence_per_year_less_than",
            threshold("Match components with fewer releases per year than this"),
        ),
        (
            "commits_less_than",
            threshold("Match components with fewer commits in the last year than this"),
        ),
        (
            "committers_less_than",
            threshold("Match components with fewer committers in the last year than this"),
        ),
        (
            "risk",
            FieldDescriptor::enumeration(
                &["high", "medium", "low"],
                true,
                "Risk level assigned to matching components",
            )
            .required(),
        ),
    ])
}

pub fn criteria() -> Fields {
    fields([
        (
            "op_risk_min_risk",
            FieldDescriptor::enumeration(
                &["High", "Medium", "Low"],
                true,
                "Minimum operational risk that triggers a violation",
            ),
        ),
        (
            "op_risk_custom",
            FieldDescriptor::block(custom_criteria(), "Custom operational risk conditions"),
        ),
    ])
}

pub fn action_overrides() -> Fields {
    fields([("custom_severity", custom_severity())])
}

pub fn schema() -> PolicySchema {
    PolicySchema::compose(criteria(), &common_actions(), action_overrides())
        .with_version(1)
        .with_exclusive_criteria("op_risk_min_risk", "op_risk_custom")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::schema::Strictness;

    #[test]
    fn test_custom_conditions_normalized() {
        let input = json!({
            "op_risk_custom": {
                "is_eol": true,
                "commits_less_than": 10,
                "risk": "HIGH",
            }
        });
        let out = schema()
            .normalize_criteria(input.as_object().unwrap(), "criteria", Strictness::Declared)
            .unwrap();
        assert_eq!(
            out["op_risk_custom"],
            json!({
                "is_eol": true,
                "commits_less_than": 10,
                "risk": "high",
                "use_and_condition": false,
            })
        );
    }

    #[test]
    fn test_custom_conditions_require_risk() {
        let input = json!({ "op_risk_custom": { "is_eol": true } });
        let err = schema()
            .normalize_criteria(input.as_object().unwrap(), "criteria", Strictness::Declared)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                path: "criteria.op_risk_custom.risk".into()
            }
        );
    }

    #[test]
    fn test_min_risk_and_custom_are_exclusive() {
        let input = json!({
            "op_risk_min_risk": "Low",
            "op_risk_custom": { "risk": "low" },
        });
        assert!(matches!(
            schema().normalize_criteria(input.as_object().unwrap(), "criteria", Strictness::Declared),
            Err(ValidationError::ConflictingFields { .. })
        ));
    }
}
