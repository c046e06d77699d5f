//! Policy lifecycle: create, read, update, delete and import
//!
//! One [`PolicyResource`] exists per policy family. Lifecycle calls take the
//! shared [`Session`] by reference and may run concurrently for distinct
//! policies. Each call is issued once; errors propagate without retry.

use crate::error::{ReconcileError, ReconcileResult, ValidationError};
use crate::policy::{drift, parse_import_id, PolicyConfig, PolicyState, Rule};
use crate::resources;
use crate::schema::{PolicySchema, Strictness};
use crate::session::Session;
use xray_types::{PolicyFamily, WirePolicy};

/// Result of reading a policy from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(PolicyState),
    /// Deleted outside the provider; the host should plan a recreate
    Absent,
}

impl ReadOutcome {
    pub fn into_state(self) -> Option<PolicyState> {
        match self {
            ReadOutcome::Present(state) => Some(state),
            ReadOutcome::Absent => None,
        }
    }
}

/// Lifecycle handler for one policy family
#[derive(Debug, Clone)]
pub struct PolicyResource {
    type_name: &'static str,
    family: PolicyFamily,
    schema: PolicySchema,
    description: &'static str,
}

impl PolicyResource {
    pub fn new(family: PolicyFamily) -> Self {
        Self {
            type_name: resources::type_name(family),
            family,
            schema: resources::schema_for(family),
            description: resources::description(family),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn family(&self) -> PolicyFamily {
        self.family
    }

    pub fn schema(&self) -> &PolicySchema {
        &self.schema
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Validate a declared policy and build the state it should produce.
    ///
    /// No network access; every schema violation is reported here.
    pub fn plan(&self, config: &PolicyConfig) -> ReconcileResult<PolicyState> {
        if config.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if config.rules.is_empty() {
            return Err(ValidationError::EmptyRules.into());
        }

        let mut rules = Vec::with_capacity(config.rules.len());
        for (index, rule) in config.rules.iter().enumerate() {
            let prefix = format!("rules[{}]", index);

            if rule.name.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    path: format!("{}.name", prefix),
                    reason: "must not be empty".to_string(),
                }
                .into());
            }

            let criteria_path = format!("{}.criteria", prefix);
            for key in rule.criteria.keys() {
                if let Some(owner) = resources::criteria_owner(key, self.family) {
                    return Err(ValidationError::IncompatibleCriteria {
                        path: format!("{}.{}", criteria_path, key),
                        family: self.family,
                        owner,
                    }
                    .into());
                }
            }

            rules.push(Rule {
                name: rule.name.clone(),
                priority: rule.priority.unwrap_or(index as u32 + 1),
                criteria: self.schema.normalize_criteria(
                    &rule.criteria,
                    &criteria_path,
                    Strictness::Declared,
                )?,
                actions: self.schema.normalize_actions(
                    &rule.actions,
                    &format!("{}.actions", prefix),
                    Strictness::Declared,
                )?,
            });
        }

        Ok(PolicyState {
            name: config.name.clone(),
            family: self.family,
            description: non_empty(config.description.as_deref()),
            project_key: non_empty(config.project_key.as_deref()),
            rules,
            schema_version: self.schema.version(),
            author: None,
            created: None,
            modified: None,
        })
    }

    /// [`plan`](Self::plan) against the connected Xray. Version-gated actions
    /// it cannot hold are reset to their defaults so the planned state matches
    /// what the server reports back.
    pub fn plan_for(
        &self,
        session: &Session,
        config: &PolicyConfig,
    ) -> ReconcileResult<PolicyState> {
        let mut planned = self.plan(config)?;

        for (action, minimum) in resources::actions::version_gated_actions() {
            if session.supports(&minimum) {
                continue;
            }
            let default = self
                .schema
                .actions()
                .get(action)
                .and_then(|field| field.default.clone());

            for rule in &mut planned.rules {
                let Some(value) = rule.actions.get_mut(action) else {
                    continue;
                };
                if Some(&*value) != default.as_ref() {
                    tracing::warn!(
                        policy = %planned.name,
                        rule = %rule.name,
                        action = action,
                        required = %minimum,
                        xray_version = %session.xray_version(),
                        "Action not supported by this Xray version, using its default"
                    );
                }
                match &default {
                    Some(default) => *value = default.clone(),
                    None => {
                        rule.actions.remove(action);
                    }
                }
            }
        }

        Ok(planned)
    }

    /// Whether moving from `prior` to `config` changes the policy identity
    pub fn requires_replace(&self, prior: &PolicyState, config: &PolicyConfig) -> bool {
        prior.name != config.name
            || prior.project_key.as_deref() != non_empty(config.project_key.as_deref()).as_deref()
    }

    /// Migrate state written by an older schema version
    pub fn upgrade_state(&self, mut state: PolicyState) -> ReconcileResult<PolicyState> {
        let current = self.schema.version();
        if state.schema_version > current {
            return Err(ValidationError::UnsupportedSchemaVersion {
                found: state.schema_version,
                supported: current,
            }
            .into());
        }
        if state.schema_version == current {
            return Ok(state);
        }

        tracing::info!(
            policy = %state.name,
            from = state.schema_version,
            to = current,
            "Migrating policy state"
        );
        for rule in &mut state.rules {
            self.schema
                .migrate_criteria(&mut rule.criteria, state.schema_version);
            self.schema.migrate_actions(&mut rule.actions, state.schema_version);
        }
        state.schema_version = current;
        Ok(state)
    }

    /// Translate a server response into state.
    ///
    /// Rule order is the server's. Fields unknown to the schema are dropped
    /// and omitted fields receive their defaults.
    pub fn state_from_wire(
        &self,
        wire: WirePolicy,
        project_key: Option<&str>,
    ) -> ReconcileResult<PolicyState> {
        if wire.family != self.family {
            return Err(ReconcileError::FamilyMismatch {
                name: wire.name,
                expected: self.family,
                found: wire.family,
            });
        }

        let mut rules = Vec::with_capacity(wire.rules.len());
        for (index, rule) in wire.rules.into_iter().enumerate() {
            let prefix = format!("rules[{}]", index);
            rules.push(Rule {
                criteria: self.schema.normalize_criteria(
                    &rule.criteria,
                    &format!("{}.criteria", prefix),
                    Strictness::Remote,
                )?,
                actions: self.schema.normalize_actions(
                    &rule.actions,
                    &format!("{}.actions", prefix),
                    Strictness::Remote,
                )?,
                priority: if rule.priority == 0 {
                    index as u32 + 1
                } else {
                    rule.priority
                },
                name: rule.name,
            });
        }

        Ok(PolicyState {
            name: wire.name,
            family: wire.family,
            description: non_empty(wire.description.as_deref()),
            project_key: non_empty(project_key),
            rules,
            schema_version: self.schema.version(),
            author: wire.author,
            created: wire.created,
            modified: wire.modified,
        })
    }

    /// Request body for `state`, without actions the connected Xray rejects
    pub fn wire_payload(&self, session: &Session, state: &PolicyState) -> WirePolicy {
        let mut wire = state.to_wire();

        for (action, minimum) in resources::actions::version_gated_actions() {
            if session.supports(&minimum) {
                continue;
            }
            let mut stripped = false;
            for rule in &mut wire.rules {
                stripped |= rule.actions.remove(action).is_some();
            }
            if stripped {
                tracing::debug!(
                    policy = %state.name,
                    action = action,
                    required = %minimum,
                    "Action not sent to this Xray version"
                );
            }
        }

        wire
    }

    pub async fn create(
        &self,
        session: &Session,
        config: &PolicyConfig,
    ) -> ReconcileResult<PolicyState> {
        let planned = self.plan_for(session, config)?;
        let project_key = planned.project_key.as_deref();

        tracing::info!(policy = %planned.name, family = %self.family, "Creating policy");

        let payload = self.wire_payload(session, &planned);
        session
            .policies()
            .create_policy(&payload, project_key)
            .await
            .map_err(|e| ReconcileError::remote("create", &planned.name, e))?;

        let observed = self.read_back(session, &planned).await?;
        tracing::info!(policy = %planned.name, family = %self.family, "Policy created");
        Ok(planned.merge_server_fields(&observed))
    }

    /// Read a policy. A missing policy is [`ReadOutcome::Absent`], not an error.
    pub async fn read(
        &self,
        session: &Session,
        name: &str,
        project_key: Option<&str>,
    ) -> ReconcileResult<ReadOutcome> {
        match session.policies().get_policy(name, project_key).await {
            Ok(wire) => self
                .state_from_wire(wire, project_key)
                .map(ReadOutcome::Present),
            Err(e) if e.is_not_found() => {
                tracing::info!(policy = %name, family = %self.family, "Policy not found on the server");
                Ok(ReadOutcome::Absent)
            }
            Err(e) => Err(ReconcileError::remote("read", name, e)),
        }
    }

    /// Read the policy behind `prior` and log any drift from it
    pub async fn refresh(
        &self,
        session: &Session,
        prior: &PolicyState,
    ) -> ReconcileResult<ReadOutcome> {
        let outcome = self
            .read(session, &prior.name, prior.project_key.as_deref())
            .await?;

        if let ReadOutcome::Present(observed) = &outcome {
            let changed = drift(prior, observed);
            if !changed.is_empty() {
                tracing::info!(
                    policy = %prior.name,
                    family = %self.family,
                    fields = ?changed,
                    "Policy changed outside the provider"
                );
            }
        }

        Ok(outcome)
    }

    /// Replace the policy with `config`. The whole policy is resent.
    pub async fn update(
        &self,
        session: &Session,
        prior: PolicyState,
        config: &PolicyConfig,
    ) -> ReconcileResult<PolicyState> {
        let prior = self.upgrade_state(prior)?;
        let planned = self.plan_for(session, config)?;

        if self.requires_replace(&prior, config) {
            return Err(ReconcileError::ImmutableIdentifier {
                from: prior.import_id(),
                to: planned.import_id(),
            });
        }

        tracing::info!(policy = %planned.name, family = %self.family, "Updating policy");

        let payload = self.wire_payload(session, &planned);
        session
            .policies()
            .update_policy(&planned.name, &payload, planned.project_key.as_deref())
            .await
            .map_err(|e| ReconcileError::remote("update", &planned.name, e))?;

        let observed = self.read_back(session, &planned).await?;
        tracing::info!(policy = %planned.name, family = %self.family, "Policy updated");
        Ok(planned.merge_server_fields(&observed))
    }

    /// Delete the policy. Deleting a missing policy succeeds.
    pub async fn delete(&self, session: &Session, state: &PolicyState) -> ReconcileResult<()> {
        tracing::info!(policy = %state.name, family = %self.family, "Deleting policy");

        match session
            .policies()
            .delete_policy(&state.name, state.project_key.as_deref())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(policy = %state.name, "Policy already deleted");
                Ok(())
            }
            Err(e) => Err(ReconcileError::remote("delete", &state.name, e)),
        }
    }

    /// Adopt an existing policy by `name` or `name:project_key`
    pub async fn import(&self, session: &Session, id: &str) -> ReconcileResult<PolicyState> {
        let (name, project_key) = parse_import_id(id);
        tracing::info!(policy = %name, family = %self.family, "Importing policy");

        self.read(session, name, project_key)
            .await?
            .into_state()
            .ok_or_else(|| ReconcileError::NotFound {
                name: name.to_string(),
            })
    }

    async fn read_back(
        &self,
        session: &Session,
        planned: &PolicyState,
    ) -> ReconcileResult<PolicyState> {
        self.read(session, &planned.name, planned.project_key.as_deref())
            .await?
            .into_state()
            .ok_or_else(|| ReconcileError::NotFound {
                name: planned.name.clone(),
            })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
