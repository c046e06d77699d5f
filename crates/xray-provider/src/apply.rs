//! Desired-state reconciliation
//!
//! The [`Applier`] compares a declared set of policies against the state file
//! and the server, then creates, updates, replaces or deletes policies to
//! converge. Undeclared policies are deleted first, then the declared ones are
//! reconciled concurrently. A failure on one
//! policy becomes a [`Diagnostic`] and never stops the others.

use crate::error::{Diagnostic, ReconcileError, ReconcileResult, Severity, ValidationError};
use crate::policy::{drift, PolicyConfig, PolicyState};
use crate::provider::Provider;
use crate::reconciler::{PolicyResource, ReadOutcome};
use crate::session::Session;
use crate::state::{address, StateFile};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Declared policies, as read from a YAML or JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub policies: Vec<DeclaredPolicy>,
}

/// One declared policy with its resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredPolicy {
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(flatten)]
    pub config: PolicyConfig,
}

impl DesiredState {
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }
}

/// What happened to one policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    /// Deleted outside the provider and created again
    Recreated,
    /// Identity changed; deleted and created
    Replaced,
    Updated,
    Unchanged,
    Deleted,
    Imported,
    Refreshed,
    /// Gone from the server during a refresh
    Removed,
    Failed,
}

/// Outcome for one policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
    pub address: String,
    pub action: Action,
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub resources: Vec<ResourceReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ApplyReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn action(&self, address: &str) -> Option<Action> {
        self.resources
            .iter()
            .find(|r| r.address == address)
            .map(|r| r.action)
    }

    fn record(&mut self, address: String, action: Action) {
        self.resources.push(ResourceReport { address, action });
    }

    fn fail(&mut self, address: String, err: &ReconcileError) {
        tracing::error!(resource = %address, error = %err, "Reconciliation failed");
        self.diagnostics
            .push(Diagnostic::from(err).for_resource(address.clone()));
        self.record(address, Action::Failed);
    }
}

/// Result of reconciling one resource
struct Outcome {
    address: String,
    type_name: &'static str,
    result: ReconcileResult<(Action, Option<PolicyState>)>,
    warnings: Vec<Diagnostic>,
}

impl Outcome {
    fn new(
        address: String,
        type_name: &'static str,
        result: ReconcileResult<(Action, Option<PolicyState>)>,
    ) -> Self {
        Self {
            address,
            type_name,
            result,
            warnings: Vec::new(),
        }
    }
}

/// Drives lifecycle calls for a set of policies over one session
pub struct Applier<'a> {
    provider: &'a Provider,
    session: &'a Session,
}

impl<'a> Applier<'a> {
    pub fn new(provider: &'a Provider, session: &'a Session) -> Self {
        Self { provider, session }
    }

    /// Converge the server and `state` on `desired`.
    ///
    /// Policies in `state` that `desired` no longer declares are deleted.
    pub async fn apply(&self, desired: &DesiredState, state: &mut StateFile) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut declared = Vec::new();
        let mut seen = BTreeSet::new();

        for policy in &desired.policies {
            let addr = address(&policy.type_name, &policy.config.name);
            if !seen.insert(addr.clone()) {
                report.diagnostics.push(
                    Diagnostic::error("Duplicate policy", "declared more than once")
                        .for_resource(addr.clone()),
                );
                report.record(addr, Action::Failed);
                continue;
            }
            let Some(resource) = self.provider.resource(&policy.type_name) else {
                report.fail(addr, &unknown_type(&policy.type_name));
                continue;
            };
            let prior = state.get(&addr).map(|stored| stored.state.clone());
            declared.push((addr, resource, &policy.config, prior));
        }

        let orphans: Vec<_> = state
            .resources
            .iter()
            .filter(|(addr, _)| !seen.contains(*addr))
            .map(|(addr, stored)| (addr.clone(), stored.type_name.clone(), stored.state.clone()))
            .collect();

        // Orphans go first: a policy that changed type keeps its server name
        let deletes = join_all(
            orphans
                .into_iter()
                .map(|(addr, type_name, prior)| self.delete_orphan(addr, type_name, prior)),
        )
        .await;
        let upserts = join_all(
            declared
                .into_iter()
                .map(|(addr, resource, config, prior)| self.upsert(addr, resource, config, prior)),
        )
        .await;

        for outcome in deletes.into_iter().chain(upserts) {
            Self::settle(outcome, state, &mut report);
        }
        report
    }

    /// Read every managed policy back from the server and record drift
    pub async fn refresh(&self, state: &mut StateFile) -> ApplyReport {
        let mut report = ApplyReport::default();
        let entries: Vec<_> = state
            .resources
            .iter()
            .map(|(addr, stored)| (addr.clone(), stored.type_name.clone(), stored.state.clone()))
            .collect();

        let outcomes = join_all(entries.into_iter().map(|(addr, type_name, prior)| async move {
            let Some(resource) = self.provider.resource(&type_name) else {
                return Outcome::new(addr, "", Err(unknown_type(&type_name)));
            };
            let prior = match resource.upgrade_state(prior) {
                Ok(prior) => prior,
                Err(e) => return Outcome::new(addr, resource.type_name(), Err(e)),
            };

            let mut warnings = Vec::new();
            let result = match resource.refresh(self.session, &prior).await {
                Ok(ReadOutcome::Present(observed)) => {
                    let changed = drift(&prior, &observed);
                    if !changed.is_empty() {
                        warnings.push(drift_warning(&addr, &changed));
                    }
                    Ok((Action::Refreshed, Some(observed)))
                }
                Ok(ReadOutcome::Absent) => {
                    warnings.push(
                        Diagnostic::warning(
                            "Policy deleted outside the provider",
                            "removed from state; the next apply creates it again",
                        )
                        .for_resource(addr.clone()),
                    );
                    Ok((Action::Removed, None))
                }
                Err(e) => Err(e),
            };

            Outcome {
                warnings,
                ..Outcome::new(addr, resource.type_name(), result)
            }
        }))
        .await;

        for outcome in outcomes {
            Self::settle(outcome, state, &mut report);
        }
        report
    }

    /// Delete managed policies; all of them when `addresses` is empty
    pub async fn destroy(&self, addresses: &[String], state: &mut StateFile) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut targets = Vec::new();

        for (addr, stored) in &state.resources {
            if addresses.is_empty() || addresses.contains(addr) {
                targets.push((addr.clone(), stored.type_name.clone(), stored.state.clone()));
            }
        }
        for addr in addresses {
            if state.get(addr).is_none() {
                report.diagnostics.push(
                    Diagnostic::error("Unknown resource", "not present in the state file")
                        .for_resource(addr.clone()),
                );
            }
        }

        let outcomes = join_all(
            targets
                .into_iter()
                .map(|(addr, type_name, prior)| self.delete_orphan(addr, type_name, prior)),
        )
        .await;

        for outcome in outcomes {
            Self::settle(outcome, state, &mut report);
        }
        report
    }

    /// Adopt an existing policy into `state`
    pub async fn import(&self, type_name: &str, id: &str, state: &mut StateFile) -> ApplyReport {
        let mut report = ApplyReport::default();

        let outcome = match self.provider.resource(type_name) {
            Some(resource) => {
                let result = resource
                    .import(self.session, id)
                    .await
                    .map(|imported| (Action::Imported, Some(imported)));
                let addr = match &result {
                    Ok((_, Some(imported))) => address(type_name, &imported.name),
                    _ => address(type_name, id),
                };
                Outcome::new(addr, resource.type_name(), result)
            }
            None => Outcome::new(address(type_name, id), "", Err(unknown_type(type_name))),
        };

        Self::settle(outcome, state, &mut report);
        report
    }

    async fn upsert(
        &self,
        addr: String,
        resource: &PolicyResource,
        config: &PolicyConfig,
        prior: Option<PolicyState>,
    ) -> Outcome {
        let mut warnings = Vec::new();
        let result = self
            .converge(&addr, resource, config, prior, &mut warnings)
            .await;
        Outcome {
            warnings,
            ..Outcome::new(addr, resource.type_name(), result)
        }
    }

    async fn converge(
        &self,
        addr: &str,
        resource: &PolicyResource,
        config: &PolicyConfig,
        prior: Option<PolicyState>,
        warnings: &mut Vec<Diagnostic>,
    ) -> ReconcileResult<(Action, Option<PolicyState>)> {
        let session = self.session;

        let Some(prior) = prior else {
            let created = resource.create(session, config).await?;
            return Ok((Action::Created, Some(created)));
        };
        let prior = resource.upgrade_state(prior)?;

        if resource.requires_replace(&prior, config) {
            // Validate before deleting anything
            resource.plan_for(session, config)?;
            resource.delete(session, &prior).await?;
            let created = resource.create(session, config).await?;
            return Ok((Action::Replaced, Some(created)));
        }

        let observed = match resource.refresh(session, &prior).await? {
            ReadOutcome::Present(observed) => observed,
            ReadOutcome::Absent => {
                warnings.push(
                    Diagnostic::warning(
                        "Policy deleted outside the provider",
                        "created again from the declared configuration",
                    )
                    .for_resource(addr),
                );
                let created = resource.create(session, config).await?;
                return Ok((Action::Recreated, Some(created)));
            }
        };

        let planned = resource.plan_for(session, config)?;
        if drift(&planned, &observed).is_empty() {
            return Ok((Action::Unchanged, Some(planned.merge_server_fields(&observed))));
        }

        let outside = drift(&prior, &observed);
        if !outside.is_empty() {
            warnings.push(drift_warning(addr, &outside));
        }

        let updated = resource.update(session, prior, config).await?;
        Ok((Action::Updated, Some(updated)))
    }

    async fn delete_orphan(&self, addr: String, type_name: String, prior: PolicyState) -> Outcome {
        let Some(resource) = self.provider.resource(&type_name) else {
            return Outcome::new(addr, "", Err(unknown_type(&type_name)));
        };
        let result = resource
            .delete(self.session, &prior)
            .await
            .map(|()| (Action::Deleted, None));
        Outcome::new(addr, resource.type_name(), result)
    }

    fn settle(outcome: Outcome, state: &mut StateFile, report: &mut ApplyReport) {
        report.diagnostics.extend(outcome.warnings);

        match outcome.result {
            Ok((action, Some(new_state))) => {
                tracing::info!(resource = %outcome.address, action = ?action, "Reconciled");
                if address(outcome.type_name, &new_state.name) != outcome.address {
                    state.remove(&outcome.address);
                }
                state.insert(outcome.type_name, new_state);
                report.record(outcome.address, action);
            }
            Ok((action, None)) => {
                tracing::info!(resource = %outcome.address, action = ?action, "Reconciled");
                state.remove(&outcome.address);
                report.record(outcome.address, action);
            }
            Err(e) => report.fail(outcome.address, &e),
        }
    }
}

fn unknown_type(type_name: &str) -> ReconcileError {
    ReconcileError::Validation(ValidationError::InvalidValue {
        path: "type".to_string(),
        reason: format!("'{}' is not a supported resource type", type_name),
    })
}

fn drift_warning(addr: &str, fields: &[String]) -> Diagnostic {
    Diagnostic::warning(
        "Policy changed outside the provider",
        format!("changed fields: {}", fields.join(", ")),
    )
    .for_resource(addr)
}
