//! Policy lifecycle against the in-memory policies endpoint.
//!
//! Verifies that:
//! - create then read returns the declared policy with server fields added
//! - update is a full replace that only changes what the declaration changed
//! - delete is idempotent and a deleted policy reads as absent
//! - invalid declarations fail before any request
//! - server conflicts and rejections map to their own errors

use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use xray_client::{InMemoryPolicyApi, WriteKind};
use xray_provider::policy::drift;
use xray_provider::{
    PolicyConfig, PolicyResource, ReadOutcome, ReconcileError, Session, ValidationError,
};
use xray_types::{PolicyFamily, WirePolicy, WireRule};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session_with(api: &Arc<InMemoryPolicyApi>, xray_version: &str) -> Session {
    Session::from_parts(
        "http://localhost:8081",
        "test-token",
        api.clone(),
        "7.77.5",
        xray_version,
    )
    .unwrap()
}

fn setup() -> (Arc<InMemoryPolicyApi>, Session) {
    let api = Arc::new(InMemoryPolicyApi::new());
    let session = session_with(&api, "3.85.2");
    (api, session)
}

fn license_config(severity: &str) -> PolicyConfig {
    serde_yaml::from_str(&format!(
        r#"
name: no-gpl
description: Ban GPL
rules:
  - name: r1
    criteria:
      banned_licenses: [GPL-3.0]
      allow_unknown: true
    actions:
      custom_severity: {}
"#,
        severity
    ))
    .unwrap()
}

fn license() -> PolicyResource {
    PolicyResource::new(PolicyFamily::License)
}

fn body(api: &InMemoryPolicyApi, index: usize) -> Value {
    let writes = api.writes();
    serde_json::from_str(writes[index].body.as_deref().unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Create / Read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn license_policy_create_then_read() {
    let (api, session) = setup();

    let created = license().create(&session, &license_config("High")).await.unwrap();
    assert_eq!(created.author.as_deref(), Some("admin"));
    assert!(created.created.is_some());
    assert_eq!(created.rules[0].criteria["banned_licenses"], json!(["GPL-3.0"]));
    assert_eq!(created.rules[0].criteria["allow_unknown"], json!(true));
    assert_eq!(created.rules[0].actions["custom_severity"], json!("High"));

    let read = license().read(&session, "no-gpl", None).await.unwrap();
    let ReadOutcome::Present(observed) = read else {
        panic!("policy should exist");
    };
    assert_eq!(observed.without_server_fields(), created.without_server_fields());
    assert_eq!(api.len(), 1);
}

#[tokio::test]
async fn create_sends_defaults_and_priority() {
    let (api, session) = setup();
    license().create(&session, &license_config("High")).await.unwrap();

    let sent = body(&api, 0);
    assert_eq!(sent["type"], json!("license"));
    assert_eq!(sent["rules"][0]["priority"], json!(1));
    assert_eq!(sent["rules"][0]["criteria"]["multi_license_permissive"], json!(false));
    assert_eq!(
        sent["rules"][0]["actions"]["block_download"],
        json!({ "active": false, "unscanned": false })
    );
    assert!(sent.get("author").is_none());
}

#[tokio::test]
async fn wire_round_trip_preserves_state() {
    let (_api, session) = setup();
    let created = license().create(&session, &license_config("Medium")).await.unwrap();

    let rebuilt = license().state_from_wire(created.to_wire(), None).unwrap();
    assert_eq!(rebuilt, created.without_server_fields());
}

#[tokio::test]
async fn read_drops_unknown_fields_and_fills_defaults() {
    let (api, session) = setup();
    api.seed(
        WirePolicy {
            name: "legacy".into(),
            description: None,
            family: PolicyFamily::License,
            rules: vec![
                WireRule {
                    name: "second".into(),
                    priority: 2,
                    criteria: json!({ "banned_licenses": ["MIT", "GPL-2.0", "MIT"], "future_flag": true })
                        .as_object()
                        .cloned()
                        .unwrap(),
                    actions: Default::default(),
                },
                WireRule {
                    name: "first".into(),
                    priority: 1,
                    criteria: Default::default(),
                    actions: Default::default(),
                },
            ],
            author: Some("someone".into()),
            created: None,
            modified: None,
        },
        None,
    );

    let state = license()
        .read(&session, "legacy", None)
        .await
        .unwrap()
        .into_state()
        .unwrap();

    // Server order is kept
    assert_eq!(state.rules[0].name, "second");
    assert_eq!(state.rules[0].criteria["banned_licenses"], json!(["GPL-2.0", "MIT"]));
    assert!(!state.rules[0].criteria.contains_key("future_flag"));
    assert_eq!(state.rules[0].criteria["allow_unknown"], json!(true));
    assert_eq!(state.rules[1].actions["custom_severity"], json!("High"));
}

#[tokio::test]
async fn read_of_other_family_fails() {
    let (_api, session) = setup();
    PolicyResource::new(PolicyFamily::Security)
        .create(
            &session,
            &serde_yaml::from_str(
                "name: shared\nrules:\n  - name: r1\n    criteria:\n      min_severity: High\n",
            )
            .unwrap(),
        )
        .await
        .unwrap();

    let err = license().read(&session, "shared", None).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::FamilyMismatch {
            expected: PolicyFamily::License,
            found: PolicyFamily::Security,
            ..
        }
    ));
}

#[tokio::test]
async fn duplicate_create_is_already_exists() {
    let (_api, session) = setup();
    license().create(&session, &license_config("High")).await.unwrap();

    let err = license()
        .create(&session, &license_config("High"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::AlreadyExists { .. }));
}

#[tokio::test]
async fn server_rejection_message_is_kept() {
    let (api, session) = setup();
    let mut config = license_config("High");
    config.rules.push(config.rules[0].clone());

    let err = license().create(&session, &config).await.unwrap_err();
    match err {
        ReconcileError::RemoteValidation { name, message } => {
            assert_eq!(name, "no-gpl");
            assert_eq!(message, "Rule names must be unique, 'r1' is repeated");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(api.is_empty());
}

// ---------------------------------------------------------------------------
// Client-side validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_declarations_send_nothing() {
    let (api, session) = setup();

    let cases = [
        (
            "unknown field",
            "name: p\nrules:\n  - name: r1\n    criteria:\n      bogus: 1\n",
        ),
        (
            "foreign criterion",
            "name: p\nrules:\n  - name: r1\n    criteria:\n      min_severity: High\n",
        ),
        ("empty rules", "name: p\nrules: []\n"),
        (
            "invalid enum",
            "name: p\nrules:\n  - name: r1\n    actions:\n      custom_severity: Severe\n",
        ),
        (
            "type mismatch",
            "name: p\nrules:\n  - name: r1\n    criteria:\n      allow_unknown: sometimes\n",
        ),
    ];

    for (label, yaml) in cases {
        let config: PolicyConfig = serde_yaml::from_str(yaml).unwrap();
        let err = license().create(&session, &config).await.unwrap_err();
        assert!(
            matches!(err, ReconcileError::Validation(_)),
            "{}: {}",
            label,
            err
        );
    }
    assert!(api.writes().is_empty());
}

#[tokio::test]
async fn foreign_criterion_names_owner() {
    let (_api, session) = setup();
    let config: PolicyConfig = serde_yaml::from_str(
        "name: p\nrules:\n  - name: r1\n    criteria:\n      banned_licenses: [MIT]\n",
    )
    .unwrap();

    let err = PolicyResource::new(PolicyFamily::OperationalRisk)
        .create(&session, &config)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid policy: rules[0].criteria.banned_licenses: not valid for operational_risk policies (it is a license criterion)"
    );
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_resends_everything_but_changes_only_severity() {
    let (api, session) = setup();
    let created = license().create(&session, &license_config("High")).await.unwrap();

    let updated = license()
        .update(&session, created, &license_config("Low"))
        .await
        .unwrap();
    assert_eq!(updated.rules[0].actions["custom_severity"], json!("Low"));

    let writes = api.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1].kind, WriteKind::Update);

    let mut expected = body(&api, 0);
    expected["rules"][0]["actions"]["custom_severity"] = json!("Low");
    assert_eq!(body(&api, 1), expected);
}

#[tokio::test]
async fn update_keeps_server_fields() {
    let (_api, session) = setup();
    let created = license().create(&session, &license_config("High")).await.unwrap();
    let created_at = created.created.clone();

    let updated = license()
        .update(&session, created, &license_config("Critical"))
        .await
        .unwrap();
    assert_eq!(updated.created, created_at);
    assert_eq!(updated.author.as_deref(), Some("admin"));
}

#[tokio::test]
async fn rename_is_rejected() {
    let (api, session) = setup();
    let created = license().create(&session, &license_config("High")).await.unwrap();

    let mut renamed = license_config("High");
    renamed.name = "no-agpl".into();
    let err = license().update(&session, created, &renamed).await.unwrap_err();

    assert!(matches!(err, ReconcileError::ImmutableIdentifier { .. }));
    assert_eq!(api.writes().len(), 1);
}

#[tokio::test]
async fn update_of_missing_policy_is_not_found() {
    let (_api, session) = setup();
    let prior = license().plan(&license_config("High")).unwrap();

    let err = license()
        .update(&session, prior, &license_config("Low"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { .. }));
}

#[tokio::test]
async fn old_state_is_migrated_on_update() {
    let (api, session) = setup();
    let mut created = license().create(&session, &license_config("High")).await.unwrap();

    created.schema_version = 0;
    created.rules[0].criteria.remove("multi_license_permissive");

    license()
        .update(&session, created, &license_config("High"))
        .await
        .unwrap();
    assert_eq!(
        body(&api, 1)["rules"][0]["criteria"]["multi_license_permissive"],
        json!(false)
    );
}

#[tokio::test]
async fn state_from_newer_schema_is_rejected() {
    let (_api, session) = setup();
    let mut created = license().create(&session, &license_config("High")).await.unwrap();
    created.schema_version = 7;

    let err = license()
        .update(&session, created, &license_config("Low"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Validation(ValidationError::UnsupportedSchemaVersion { found: 7, .. })
    ));
}

// ---------------------------------------------------------------------------
// Delete / Import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_twice_succeeds_and_read_is_absent() {
    let (api, session) = setup();
    let created = license().create(&session, &license_config("High")).await.unwrap();

    license().delete(&session, &created).await.unwrap();
    license().delete(&session, &created).await.unwrap();

    let outcome = license().read(&session, "no-gpl", None).await.unwrap();
    assert_eq!(outcome, ReadOutcome::Absent);
    assert!(api.is_empty());
}

#[tokio::test]
async fn import_by_name_and_project() {
    let (_api, session) = setup();
    let mut config = license_config("High");
    config.project_key = Some("proj1".into());
    license().create(&session, &config).await.unwrap();

    let imported = license().import(&session, "no-gpl:proj1").await.unwrap();
    assert_eq!(imported.project_key.as_deref(), Some("proj1"));
    assert_eq!(imported.import_id(), "no-gpl:proj1");

    // Not visible outside its project
    let err = license().import(&session, "no-gpl").await.unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { .. }));
}

// ---------------------------------------------------------------------------
// Version gating and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gated_action_not_sent_to_old_xray() {
    let api = Arc::new(InMemoryPolicyApi::new());
    let session = session_with(&api, "3.81.0");

    let created = license().create(&session, &license_config("High")).await.unwrap();
    let sent = body(&api, 0);
    assert!(sent["rules"][0]["actions"]
        .get("block_release_bundle_promotion")
        .is_none());
    assert_eq!(
        created.rules[0].actions["block_release_bundle_promotion"],
        json!(false)
    );
}

#[tokio::test]
async fn gated_action_falls_back_to_default_on_old_xray() {
    let api = Arc::new(InMemoryPolicyApi::new());
    let session = session_with(&api, "3.81.0");
    let resource = license();

    let mut config = license_config("High");
    config.rules[0]
        .actions
        .insert("block_release_bundle_promotion".into(), json!(true));

    let created = resource.create(&session, &config).await.unwrap();
    assert_eq!(
        created.rules[0].actions["block_release_bundle_promotion"],
        json!(false)
    );
    assert!(body(&api, 0)["rules"][0]["actions"]
        .get("block_release_bundle_promotion")
        .is_none());

    // What the server reports back matches the recorded state
    let observed = resource
        .refresh(&session, &created)
        .await
        .unwrap()
        .into_state()
        .unwrap();
    assert!(drift(&created, &observed).is_empty());

    let planned = resource.plan_for(&session, &config).unwrap();
    assert!(drift(&planned, &observed).is_empty());
}

#[tokio::test]
async fn gated_action_kept_for_new_xray() {
    let (_api, session) = setup();
    let mut config = license_config("High");
    config.rules[0]
        .actions
        .insert("block_release_bundle_promotion".into(), json!(true));

    let created = license().create(&session, &config).await.unwrap();
    assert_eq!(
        created.rules[0].actions["block_release_bundle_promotion"],
        json!(true)
    );
}

#[tokio::test]
async fn gated_action_sent_to_new_xray() {
    let (api, session) = setup();
    license().create(&session, &license_config("High")).await.unwrap();
    assert_eq!(
        body(&api, 0)["rules"][0]["actions"]["block_release_bundle_promotion"],
        json!(false)
    );
}

#[tokio::test]
async fn concurrent_creates_share_one_session() {
    let (api, session) = setup();
    let resource = license();

    let configs: Vec<PolicyConfig> = (0..10)
        .map(|i| {
            let mut config = license_config("High");
            config.name = format!("policy-{}", i);
            config
        })
        .collect();

    let results = join_all(configs.iter().map(|c| resource.create(&session, c))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(api.len(), 10);
}
