//! Actions shared by every policy family

use crate::schema::{fields, FieldDescriptor, Fields, Validation};
use semver::Version;
use serde_json::json;

/// Actions the server only accepts from a minimum Xray version
pub fn version_gated_actions() -> Vec<(&'static str, Version)> {
    vec![("block_release_bundle_promotion", Version::new(3, 82, 0))]
}

/// Actions common to security, license and operational-risk policies
pub fn common_actions() -> Fields {
    fields([
        (
            "mails",
            FieldDescriptor::string_set("Email addresses notified when the policy is violated")
                .with_validation(Validation::NonEmpty),
        ),
        (
            "webhooks",
            FieldDescriptor::string_set("Webhook names invoked when the policy is violated")
                .with_validation(Validation::NonEmpty),
        ),
        (
            "block_download",
            FieldDescriptor::block(
                fields([
                    (
                        "unscanned",
                        FieldDescriptor::bool("Block download of artifacts not scanned yet")
                            .with_default(json!(false)),
                    ),
                    (
                        "active",
                        FieldDescriptor::bool("Block download of artifacts that violate the policy")
                            .with_default(json!(false)),
                    ),
                ]),
                "Download blocking",
            )
            .with_default(json!({ "unscanned": false, "active": false })),
        ),
        (
            "block_release_bundle_distribution",
            FieldDescriptor::bool("Block distribution of release bundles with violations")
                .with_default(json!(false)),
        ),
        (
            "block_release_bundle_promotion",
            FieldDescriptor::bool("Block promotion of release bundles with violations")
                .with_default(json!(false))
                .since_version(1),
        ),
        (
            "fail_build",
            FieldDescriptor::bool("Fail builds that violate the policy")
                .with_default(json!(false)),
        ),
        (
            "notify_deployer",
            FieldDescriptor::bool("Notify the user who deployed the violating artifact")
                .with_default(json!(false)),
        ),
        (
            "notify_watch_recipients",
            FieldDescriptor::bool("Notify the recipients of watches using the policy")
                .with_default(json!(false)),
        ),
        (
            "create_ticket_enabled",
            FieldDescriptor::bool("Create a Jira ticket for each violation")
                .with_default(json!(false)),
        ),
        (
            "build_failure_grace_period_in_days",
            FieldDescriptor::int("Days a build may keep violating before it fails")
                .with_validation(Validation::NonNegative),
        ),
    ])
}

/// `custom_severity` action override, shared by license and operational risk
pub fn custom_severity() -> FieldDescriptor {
    FieldDescriptor::enumeration(
        &["Critical", "High", "Medium", "Low"],
        true,
        "Severity of the violation raised when the criteria match",
    )
    .with_default(json!("High"))
}
