// Rule definition
//
// A rule combines a trigger, a target selection and an action. Rules are
// persisted and exported as JSON objects with camelCase field names:
//
//   { "id": "rule_1700000000000_k3j9x0a1b", "name": "Work mode",
//     "tags": ["work"], "targetType": "group", "targetIds": ["Dev tools"],
//     "action": "enable", "trigger": {"type": "time", "time": "09:00",
//     "days": [1,2,3,4,5]}, "enabled": true }

use serde::{Deserialize, Serialize};

use crate::rule_metadata::{RuleAction, RuleId, TargetType};
use crate::trigger::{Trigger, TriggerKind};

fn default_enabled() -> bool {
    true
}

/// A user defined automation directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Immutable identifier
    pub id: RuleId,
    /// Display name, unique ignoring case
    pub name: String,
    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
    /// Kind of entity addressed by `target_ids`
    #[serde(default)]
    pub target_type: TargetType,
    /// Extension ids, a single profile id, or group names
    #[serde(default)]
    pub target_ids: Vec<String>,
    pub action: RuleAction,
    pub trigger: Trigger,
    /// Disabled rules are kept and editable but never fire
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Editable contents of a rule, as submitted from the rule form.
///
/// Everything except identity and enabled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub target_type: TargetType,
    #[serde(default)]
    pub target_ids: Vec<String>,
    pub action: RuleAction,
    pub trigger: Trigger,
}

impl RuleDraft {
    pub fn new(
        name: impl Into<String>,
        target_type: TargetType,
        target_ids: impl IntoIterator<Item = impl Into<String>>,
        action: RuleAction,
        trigger: Trigger,
    ) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            target_type,
            target_ids: target_ids.into_iter().map(Into::into).collect(),
            action,
            trigger,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl Rule {
    /// Create a new enabled rule with a freshly generated id
    pub fn create(draft: RuleDraft) -> Self {
        Self::with_id(RuleId::generate(), draft)
    }

    /// Create an enabled rule with a caller supplied id. Name and trigger
    /// are stored in canonical form.
    pub fn with_id(id: RuleId, draft: RuleDraft) -> Self {
        Self {
            id,
            name: draft.name.trim().to_string(),
            tags: clean_tags(draft.tags),
            target_type: draft.target_type,
            target_ids: draft.target_ids,
            action: draft.action,
            trigger: draft.trigger.normalized(),
            enabled: true,
        }
    }

    /// Copy of this rule with the draft's contents. Id and enabled state
    /// are preserved.
    pub fn edited(&self, draft: RuleDraft) -> Self {
        let mut rule = Self::with_id(self.id.clone(), draft);
        rule.enabled = self.enabled;
        rule
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn trigger_kind(&self) -> TriggerKind {
        self.trigger.kind()
    }

    /// Target ids shared with another rule, in this rule's order
    pub fn shared_targets(&self, other: &Rule) -> Vec<String> {
        self.target_ids
            .iter()
            .filter(|id| other.target_ids.contains(id))
            .cloned()
            .collect()
    }

    /// Editable contents of this rule
    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            name: self.name.clone(),
            tags: self.tags.clone(),
            target_type: self.target_type,
            target_ids: self.target_ids.clone(),
            action: self.action,
            trigger: self.trigger.clone(),
        }
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
