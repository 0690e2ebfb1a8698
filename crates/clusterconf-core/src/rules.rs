//! Named change-safety rules
//!
//! Schemas reference rules by name through the `x-unsafe-rules` extension.
//! The set of rules is closed: a schema naming a rule that does not exist
//! fails to load, so a typo can never silently disable a check.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum edit distance for rule name suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Reason a rule rejected an old/new value pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleViolation {
    pub message: String,
}

impl RuleViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error returned when parsing an unknown rule name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rule '{name}'")]
pub struct UnknownRuleName {
    pub name: String,
}

/// Change-safety rule that can be attached to a schema property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    /// Master replicas may not drop to zero, nor shrink below two
    UpdateReplicas,
    /// Zones may only be removed while at least three masters remain
    DeleteZones,
}

impl RuleKind {
    pub const ALL: [RuleKind; 2] = [RuleKind::UpdateReplicas, RuleKind::DeleteZones];

    /// Name used in schema extensions
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpdateReplicas => "updateReplicas",
            Self::DeleteZones => "deleteZones",
        }
    }

    /// Run this rule against the old and new value of a field
    pub fn check(self, old: &JsonValue, new: &JsonValue) -> Result<(), RuleViolation> {
        match self {
            Self::UpdateReplicas => update_replicas(old, new),
            Self::DeleteZones => delete_zones(old, new),
        }
    }

    /// Closest known rule name, for error hints
    pub fn suggest(name: &str) -> Option<&'static str> {
        Self::ALL
            .iter()
            .map(|rule| (rule.as_str(), strsim::levenshtein(name, rule.as_str())))
            .filter(|(_, distance)| *distance <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(_, distance)| *distance)
            .map(|(candidate, _)| candidate)
    }
}

impl FromStr for RuleKind {
    type Err = UnknownRuleName;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.as_str() == name)
            .ok_or_else(|| UnknownRuleName {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn replicas_of(value: &JsonValue) -> Result<Option<i64>, RuleViolation> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| RuleViolation::new(format!("replicas must be an integer, got {n}"))),
        other => Err(RuleViolation::new(format!(
            "replicas must be an integer, got {other}"
        ))),
    }
}

fn update_replicas(old: &JsonValue, new: &JsonValue) -> Result<(), RuleViolation> {
    let Some(new_replicas) = replicas_of(new)? else {
        return Ok(());
    };

    if new_replicas == 0 {
        return Err(RuleViolation::new("got unacceptable replicas value: 0"));
    }

    if let Some(old_replicas) = replicas_of(old)? {
        if new_replicas < old_replicas && new_replicas < 2 {
            return Err(RuleViolation::new(format!(
                "scaling down from {old_replicas} to {new_replicas} replicas is not allowed, \
                 at least 2 replicas must remain"
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZonesLayout {
    #[serde(default)]
    zones: Option<Vec<String>>,
    #[serde(default)]
    master_node_group: Option<MasterReplicas>,
}

#[derive(Debug, Default, Deserialize)]
struct MasterReplicas {
    #[serde(default)]
    replicas: Option<i64>,
}

impl ZonesLayout {
    fn decode(value: &JsonValue) -> Result<Self, RuleViolation> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| RuleViolation::new(format!("unable to read zones layout: {e}")))
    }

    fn zone_count(&self) -> usize {
        self.zones.as_ref().map_or(0, Vec::len)
    }

    fn master_replicas(&self) -> i64 {
        self.master_node_group
            .as_ref()
            .and_then(|group| group.replicas)
            .unwrap_or(0)
    }
}

fn delete_zones(old: &JsonValue, new: &JsonValue) -> Result<(), RuleViolation> {
    let old = ZonesLayout::decode(old)?;
    let new = ZonesLayout::decode(new)?;

    if new.zone_count() < old.zone_count() && new.master_replicas() < 3 {
        return Err(RuleViolation::new(format!(
            "removing zones ({} -> {}) requires at least 3 master replicas, got {}",
            old.zone_count(),
            new.zone_count(),
            new.master_replicas()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_names_round_trip() {
        for rule in RuleKind::ALL {
            assert_eq!(rule.as_str().parse::<RuleKind>().unwrap(), rule);
        }
        assert!("updatereplicas".parse::<RuleKind>().is_err());
    }

    #[test]
    fn test_suggest_close_names() {
        assert_eq!(RuleKind::suggest("updateReplica"), Some("updateReplicas"));
        assert_eq!(RuleKind::suggest("deleteZone"), Some("deleteZones"));
        assert_eq!(RuleKind::suggest("somethingElse"), None);
    }

    #[test]
    fn test_update_replicas_rejects_zero() {
        assert!(RuleKind::UpdateReplicas.check(&json!(3), &json!(0)).is_err());
        assert!(RuleKind::UpdateReplicas.check(&JsonValue::Null, &json!(0)).is_err());
    }

    #[test]
    fn test_update_replicas_scale_down() {
        assert!(RuleKind::UpdateReplicas.check(&json!(3), &json!(1)).is_err());
        assert!(RuleKind::UpdateReplicas.check(&json!(3), &json!(2)).is_ok());
        assert!(RuleKind::UpdateReplicas.check(&json!(2), &json!(1)).is_err());
    }

    #[test]
    fn test_update_replicas_scale_up() {
        assert!(RuleKind::UpdateReplicas.check(&json!(1), &json!(3)).is_ok());
        assert!(RuleKind::UpdateReplicas.check(&json!(1), &json!(1)).is_ok());
        assert!(RuleKind::UpdateReplicas.check(&JsonValue::Null, &json!(1)).is_ok());
    }

    #[test]
    fn test_update_replicas_rejects_non_integers() {
        let err = RuleKind::UpdateReplicas
            .check(&json!(3), &json!("two"))
            .unwrap_err();
        assert!(err.message.contains("must be an integer"));
    }

    #[test]
    fn test_delete_zones_with_single_master() {
        let old = json!({"zones": ["a", "b"], "masterNodeGroup": {"replicas": 1}});
        let new = json!({"zones": ["a"], "masterNodeGroup": {"replicas": 1}});
        assert!(RuleKind::DeleteZones.check(&old, &new).is_err());
    }

    #[test]
    fn test_delete_zones_with_three_masters() {
        let old = json!({"zones": ["a", "b"], "masterNodeGroup": {"replicas": 3}});
        let new = json!({"zones": ["a"], "masterNodeGroup": {"replicas": 3}});
        assert!(RuleKind::DeleteZones.check(&old, &new).is_ok());
    }

    #[test]
    fn test_delete_zones_adding_zone_is_safe() {
        let old = json!({"zones": ["a"], "masterNodeGroup": {"replicas": 1}});
        let new = json!({"zones": ["a", "b"], "masterNodeGroup": {"replicas": 1}});
        assert!(RuleKind::DeleteZones.check(&old, &new).is_ok());
    }

    #[test]
    fn test_delete_zones_ignores_unrelated_fields() {
        let old = json!({"zones": ["a", "b"], "layout": "Standard", "masterNodeGroup": {"replicas": 1, "instanceClass": {}}});
        let new = json!({"zones": ["a", "b"], "layout": "Standard", "masterNodeGroup": {"replicas": 1, "instanceClass": {"cores": 4}}});
        assert!(RuleKind::DeleteZones.check(&old, &new).is_ok());
    }
}
