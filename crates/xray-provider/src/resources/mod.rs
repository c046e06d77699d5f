//! Policy family definitions
//!
//! Each family contributes its own criteria and action overrides; the
//! actions every family shares live in [`actions`]:
//!
//! - **Security**: severity threshold or CVSS range, known vulnerability ids
//! - **License**: banned and allowed license lists
//! - **Operational risk**: component health (end of life, cadence, activity)

pub mod actions;
pub mod license;
pub mod operational_risk;
pub mod security;

use crate::schema::{Fields, PolicySchema};
use xray_types::PolicyFamily;

/// Resource type name of a family, e.g. `xray_license_policy`
pub fn type_name(family: PolicyFamily) -> &'static str {
    match family {
        PolicyFamily::Security => security::TYPE_NAME,
        PolicyFamily::License => license::TYPE_NAME,
        PolicyFamily::OperationalRisk => operational_risk::TYPE_NAME,
    }
}

/// One-line description shown by `schema`
pub fn description(family: PolicyFamily) -> &'static str {
    match family {
        PolicyFamily::Security => security::DESCRIPTION,
        PolicyFamily::License => license::DESCRIPTION,
        PolicyFamily::OperationalRisk => operational_risk::DESCRIPTION,
    }
}

/// Criteria fields of a family
pub fn criteria_for(family: PolicyFamily) -> Fields {
    match family {
        PolicyFamily::Security => security::criteria(),
        PolicyFamily::License => license::criteria(),
        PolicyFamily::OperationalRisk => operational_risk::criteria(),
    }
}

/// Composed schema of a family
pub fn schema_for(family: PolicyFamily) -> PolicySchema {
    match family {
        PolicyFamily::Security => security::schema(),
        PolicyFamily::License => license::schema(),
        PolicyFamily::OperationalRisk => operational_risk::schema(),
    }
}

/// The other family that owns criterion `key`, if `family` does not
pub fn criteria_owner(key: &str, family: PolicyFamily) -> Option<PolicyFamily> {
    if criteria_for(family).contains_key(key) {
        return None;
    }
    PolicyFamily::ALL
        .into_iter()
        .filter(|other| *other != family)
        .find(|other| criteria_for(*other).contains_key(key))
}
