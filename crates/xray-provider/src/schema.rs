//! Policy schemas: field descriptors and the criteria/actions composer
//!
//! A [`PolicySchema`] is built once per policy family from three field maps:
//! the family's criteria, the actions shared by every family, and the
//! family's action overrides. The schema then validates declared input and
//! normalises both declared and remote values into one canonical JSON form:
//!
//! - enum values take the spelling of the allowed value they matched
//! - string sets are sorted and deduplicated
//! - numbers are stored as `i64` (`Int`) or `f64` (`Float`)
//! - absent fields with a documented default receive it

use crate::error::ValidationError;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use xray_types::FieldMap;

/// Ordered mapping from field name to descriptor
pub type Fields = BTreeMap<String, FieldDescriptor>;

/// Build a [`Fields`] map from `(name, descriptor)` pairs
pub fn fields<I>(items: I) -> Fields
where
    I: IntoIterator<Item = (&'static str, FieldDescriptor)>,
{
    items
        .into_iter()
        .map(|(name, descriptor)| (name.to_string(), descriptor))
        .collect()
}

/// Union of two field maps; entries of `overrides` replace entries of `base`
pub fn merge_maps(base: &Fields, overrides: Fields) -> Fields {
    let mut merged = base.clone();
    merged.extend(overrides);
    merged
}

/// Type of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Bool,
    Int,
    Float,
    /// Unordered set of strings
    StringSet,
    /// One of a fixed set of strings
    Enum {
        allowed: Vec<&'static str>,
        ignore_case: bool,
    },
    /// Nested object
    Block { fields: Fields },
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Enum { .. } => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::Int => "an integer",
            FieldKind::Float => "a number",
            FieldKind::StringSet => "a list of strings",
            FieldKind::Block { .. } => "an object",
        }
    }
}

/// Extra value constraint. Applies to each element of a string set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Validation {
    NonEmpty,
    /// OSS license identifier, e.g. `GPL-3.0` or `Apache-2.0`
    LicenseName,
    Range { min: f64, max: f64 },
    NonNegative,
}

/// Definition of one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    /// Schema version that introduced the field
    pub since_version: u32,
}

impl FieldDescriptor {
    fn new(kind: FieldKind, description: &'static str) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            description,
            validation: None,
            since_version: 0,
        }
    }

    pub fn string(description: &'static str) -> Self {
        Self::new(FieldKind::String, description)
    }

    pub fn bool(description: &'static str) -> Self {
        Self::new(FieldKind::Bool, description)
    }

    pub fn int(description: &'static str) -> Self {
        Self::new(FieldKind::Int, description)
    }

    pub fn float(description: &'static str) -> Self {
        Self::new(FieldKind::Float, description)
    }

    pub fn string_set(description: &'static str) -> Self {
        Self::new(FieldKind::StringSet, description)
    }

    pub fn enumeration(
        allowed: &[&'static str],
        ignore_case: bool,
        description: &'static str,
    ) -> Self {
        Self::new(
            FieldKind::Enum {
                allowed: allowed.to_vec(),
                ignore_case,
            },
            description,
        )
    }

    pub fn block(fields: Fields, description: &'static str) -> Self {
        Self::new(FieldKind::Block { fields }, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn since_version(mut self, version: u32) -> Self {
        self.since_version = version;
        self
    }

    /// Validate `value` and return its canonical form
    pub fn normalize(
        &self,
        value: &Value,
        path: &str,
        strictness: Strictness,
    ) -> Result<Value, ValidationError> {
        let mismatch = || ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: self.kind.expected(),
        };

        match &self.kind {
            FieldKind::String => {
                let s = value.as_str().ok_or_else(mismatch)?;
                self.check_str(s, path)?;
                Ok(Value::String(s.to_string()))
            }
            FieldKind::Bool => value.as_bool().map(Value::Bool).ok_or_else(mismatch),
            FieldKind::Int => {
                let n = value.as_i64().ok_or_else(mismatch)?;
                self.check_number(n as f64, path)?;
                Ok(Value::from(n))
            }
            FieldKind::Float => {
                let n = value.as_f64().ok_or_else(mismatch)?;
                self.check_number(n, path)?;
                Ok(Value::from(n))
            }
            FieldKind::StringSet => {
                let items = value.as_array().ok_or_else(mismatch)?;
                let mut set = BTreeSet::new();
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, index);
                    let s = item.as_str().ok_or_else(|| ValidationError::TypeMismatch {
                        path: item_path.clone(),
                        expected: "a string",
                    })?;
                    self.check_str(s, &item_path)?;
                    set.insert(s.to_string());
                }
                Ok(Value::Array(set.into_iter().map(Value::String).collect()))
            }
            FieldKind::Enum {
                allowed,
                ignore_case,
            } => {
                let s = value.as_str().ok_or_else(mismatch)?;
                allowed
                    .iter()
                    .find(|candidate| {
                        if *ignore_case {
                            candidate.eq_ignore_ascii_case(s)
                        } else {
                            **candidate == s
                        }
                    })
                    .map(|canonical| Value::String(canonical.to_string()))
                    .ok_or_else(|| ValidationError::InvalidEnum {
                        path: path.to_string(),
                        value: s.to_string(),
                        allowed: allowed.join(", "),
                    })
            }
            FieldKind::Block { fields } => {
                // A single-element list is accepted for blocks declared as lists
                let object = match value {
                    Value::Object(map) => map,
                    Value::Array(items) if items.len() == 1 => {
                        items[0].as_object().ok_or_else(mismatch)?
                    }
                    _ => return Err(mismatch()),
                };
                normalize_block(fields, object, path, strictness).map(Value::Object)
            }
        }
    }

    fn check_str(&self, s: &str, path: &str) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidValue {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        match self.validation {
            Some(Validation::NonEmpty) if s.trim().is_empty() => Err(invalid("must not be empty")),
            Some(Validation::LicenseName) => {
                if s.trim().is_empty() {
                    Err(invalid("license name must not be empty"))
                } else if s.trim() != s {
                    Err(invalid("license name must not have surrounding whitespace"))
                } else if s.chars().any(|c| c.is_control() || c == ',') {
                    Err(invalid("license name must be a single license identifier"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    fn check_number(&self, n: f64, path: &str) -> Result<(), ValidationError> {
        match self.validation {
            Some(Validation::Range { min, max }) if n < min || n > max => {
                Err(ValidationError::InvalidValue {
                    path: path.to_string(),
                    reason: format!("must be between {} and {}", min, max),
                })
            }
            Some(Validation::NonNegative) if n < 0.0 => Err(ValidationError::InvalidValue {
                path: path.to_string(),
                reason: "must not be negative".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// How strictly input is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// User configuration: unknown fields, bad values and missing required
    /// fields are errors
    Declared,

    /// Server responses: unknown fields are dropped, values that do not fit
    /// the schema are kept verbatim
    Remote,
}

/// Normalise one object against `fields`, applying defaults
pub fn normalize_block(
    fields: &Fields,
    input: &FieldMap,
    path: &str,
    strictness: Strictness,
) -> Result<FieldMap, ValidationError> {
    let mut out = FieldMap::new();

    for (name, value) in input {
        let field_path = format!("{}.{}", path, name);

        let Some(descriptor) = fields.get(name) else {
            match strictness {
                Strictness::Declared => {
                    return Err(ValidationError::UnknownField { path: field_path })
                }
                Strictness::Remote => {
                    tracing::debug!(field = %field_path, "Dropping field unknown to the schema");
                    continue;
                }
            }
        };

        if value.is_null() {
            continue;
        }

        match descriptor.normalize(value, &field_path, strictness) {
            Ok(normalized) => {
                out.insert(name.clone(), normalized);
            }
            Err(e) if strictness == Strictness::Remote => {
                tracing::warn!(field = %field_path, error = %e, "Keeping remote value that does not fit the schema");
                out.insert(name.clone(), value.clone());
            }
            Err(e) => return Err(e),
        }
    }

    for (name, descriptor) in fields {
        if out.contains_key(name) {
            continue;
        }
        if let Some(default) = &descriptor.default {
            out.insert(name.clone(), default.clone());
        } else if descriptor.required && strictness == Strictness::Declared {
            return Err(ValidationError::MissingField {
                path: format!("{}.{}", path, name),
            });
        }
    }

    Ok(out)
}

/// Composed schema of one policy family
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySchema {
    version: u32,
    criteria: Fields,
    actions: Fields,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclusive_criteria: Vec<(String, String)>,
}

impl PolicySchema {
    /// Compose a schema from family criteria, the common actions and the
    /// family's action overrides. Overrides win on name collisions.
    pub fn compose(criteria: Fields, common_actions: &Fields, action_overrides: Fields) -> Self {
        Self {
            version: 0,
            criteria,
            actions: merge_maps(common_actions, action_overrides),
            exclusive_criteria: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Declare two criteria that cannot be set together
    pub fn with_exclusive_criteria(mut self, first: &str, second: &str) -> Self {
        self.exclusive_criteria
            .push((first.to_string(), second.to_string()));
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn criteria(&self) -> &Fields {
        &self.criteria
    }

    pub fn actions(&self) -> &Fields {
        &self.actions
    }

    pub fn normalize_criteria(
        &self,
        input: &FieldMap,
        path: &str,
        strictness: Strictness,
    ) -> Result<FieldMap, ValidationError> {
        let normalized = normalize_block(&self.criteria, input, path, strictness)?;

        if strictness == Strictness::Declared {
            for (first, second) in &self.exclusive_criteria {
                if normalized.contains_key(first) && normalized.contains_key(second) {
                    return Err(ValidationError::ConflictingFields {
                        path: path.to_string(),
                        first: first.clone(),
                        second: second.clone(),
                    });
                }
            }
        }

        Ok(normalized)
    }

    pub fn normalize_actions(
        &self,
        input: &FieldMap,
        path: &str,
        strictness: Strictness,
    ) -> Result<FieldMap, ValidationError> {
        normalize_block(&self.actions, input, path, strictness)
    }

    /// Fill fields introduced after `from_version` with their defaults
    pub fn migrate_criteria(&self, block: &mut FieldMap, from_version: u32) {
        migrate_block(&self.criteria, block, from_version);
    }

    pub fn migrate_actions(&self, block: &mut FieldMap, from_version: u32) {
        migrate_block(&self.actions, block, from_version);
    }
}

fn migrate_block(fields: &Fields, block: &mut FieldMap, from_version: u32) {
    for (name, descriptor) in fields {
        if descriptor.since_version <= from_version || block.contains_key(name) {
            continue;
        }
        if let Some(default) = &descriptor.default {
            block.insert(name.clone(), default.clone());
        }
    }
}
