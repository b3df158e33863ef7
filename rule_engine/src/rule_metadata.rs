// Identity and classification types for automation rules
//
// This module defines the small vocabulary every rule is built from:
// the opaque identifiers of rules and of the entities they address
// (extensions, profiles, groups), the target type of a rule and the
// actions that may be applied to those targets.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

// These newtypes make the code more readable and keep the different
// identifier spaces apart. An extension id can never be handed to a
// function expecting a profile id by accident.

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Unique identifier for a rule.
///
/// Assigned once at creation as `rule_<unix-millis>_<random>` and never
/// changed afterwards, not even when the rule is edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Generate a fresh rule id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        RuleId(format!("rule_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    /// Wrap an existing id (loaded from storage or an import file).
    pub fn new(id: impl Into<String>) -> Self {
        RuleId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        RuleId(s.to_string())
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        RuleId(s)
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an installed browser extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    pub fn new(id: impl Into<String>) -> Self {
        ExtensionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExtensionId {
    fn from(s: &str) -> Self {
        ExtensionId(s.to_string())
    }
}

impl std::fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a saved profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        ProfileId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        ProfileId(s.to_string())
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a user defined group. Group names double as their keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(name: impl Into<String>) -> Self {
        GroupName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupName {
    fn from(s: &str) -> Self {
        GroupName(s.to_string())
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Target type and actions
// ============================================================================

/// Which kind of entity a rule acts on.
///
/// Fixed at creation. Determines the allowed actions and what the
/// rule's `targetIds` refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Extension,
    Profile,
    Group,
}

impl TargetType {
    /// Returns all target types in display order
    pub fn all() -> [TargetType; 3] {
        [TargetType::Extension, TargetType::Profile, TargetType::Group]
    }

    /// Actions a rule of this target type may carry
    pub fn allowed_actions(&self) -> &'static [RuleAction] {
        match self {
            TargetType::Extension => &[RuleAction::Enable, RuleAction::Disable],
            TargetType::Profile => &[RuleAction::Apply],
            TargetType::Group => &[RuleAction::Enable, RuleAction::Disable, RuleAction::Toggle],
        }
    }

    pub fn allows(&self, action: RuleAction) -> bool {
        self.allowed_actions().contains(&action)
    }
}

impl Default for TargetType {
    fn default() -> Self {
        TargetType::Extension
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::Extension => write!(f, "extension"),
            TargetType::Profile => write!(f, "profile"),
            TargetType::Group => write!(f, "group"),
        }
    }
}

/// Action applied to a rule's targets when its trigger fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Turn the targets on
    Enable,
    /// Turn the targets off
    Disable,
    /// Apply a saved profile
    Apply,
    /// Flip every member of a group
    Toggle,
}

impl RuleAction {
    /// Enable and Disable set an explicit state. Apply and Toggle do not.
    pub fn is_direct(&self) -> bool {
        matches!(self, RuleAction::Enable | RuleAction::Disable)
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Enable => write!(f, "enable"),
            RuleAction::Disable => write!(f, "disable"),
            RuleAction::Apply => write!(f, "apply"),
            RuleAction::Toggle => write!(f, "toggle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_rule_id_shape() {
        let id = RuleId::generate();
        let parts: Vec<&str> = id.as_str().splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "rule");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_rule_ids_differ() {
        assert_ne!(RuleId::generate(), RuleId::generate());
    }

    #[test]
    fn test_allowed_actions_per_target_type() {
        assert!(TargetType::Extension.allows(RuleAction::Enable));
        assert!(!TargetType::Extension.allows(RuleAction::Toggle));
        assert!(TargetType::Profile.allows(RuleAction::Apply));
        assert!(!TargetType::Profile.allows(RuleAction::Enable));
        assert!(TargetType::Group.allows(RuleAction::Toggle));
        assert!(!TargetType::Group.allows(RuleAction::Apply));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&TargetType::Group).unwrap(), "\"group\"");
        assert_eq!(serde_json::to_string(&RuleAction::Toggle).unwrap(), "\"toggle\"");
        let id: RuleId = serde_json::from_str("\"rule_1_abc\"").unwrap();
        assert_eq!(id.as_str(), "rule_1_abc");
    }
}
