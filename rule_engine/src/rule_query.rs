// Rule list filtering
//
// Derives the visible subset of a rule collection from a free-text query
// and three dropdown filters. All active filters are ANDed together and
// input order is preserved. Filtering never mutates the collection.

use serde::{Deserialize, Serialize};

use crate::rule::Rule;
use crate::rule_metadata::TargetType;
use crate::trigger::TriggerKind;

// ============================================================================
// Filter values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Enabled,
    Disabled,
}

impl StatusFilter {
    fn accepts(&self, rule: &Rule) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Enabled => rule.enabled,
            StatusFilter::Disabled => !rule.enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerFilter {
    #[default]
    All,
    Time,
    Url,
}

impl TriggerFilter {
    fn accepts(&self, rule: &Rule) -> bool {
        match self {
            TriggerFilter::All => true,
            TriggerFilter::Time => rule.trigger_kind() == TriggerKind::Time,
            TriggerFilter::Url => rule.trigger_kind() == TriggerKind::Url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetTypeFilter {
    #[default]
    All,
    Extension,
    Profile,
    Group,
}

impl TargetTypeFilter {
    fn accepts(&self, rule: &Rule) -> bool {
        match self {
            TargetTypeFilter::All => true,
            TargetTypeFilter::Extension => rule.target_type == TargetType::Extension,
            TargetTypeFilter::Profile => rule.target_type == TargetType::Profile,
            TargetTypeFilter::Group => rule.target_type == TargetType::Group,
        }
    }
}

// ============================================================================
// Query Builder
// ============================================================================

/// Fluent query over a rule collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleQuery {
    /// Case-insensitive substring of the name or any tag
    pub text: String,
    pub status: StatusFilter,
    pub trigger: TriggerFilter,
    pub target_type: TargetTypeFilter,
}

impl RuleQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerFilter) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_target_type(mut self, target_type: TargetTypeFilter) -> Self {
        self.target_type = target_type;
        self
    }

    /// True when no filter narrows the collection
    pub fn is_unfiltered(&self) -> bool {
        self.text.trim().is_empty()
            && self.status == StatusFilter::All
            && self.trigger == TriggerFilter::All
            && self.target_type == TargetTypeFilter::All
    }

    /// Whether a single rule passes every active filter
    pub fn matches(&self, rule: &Rule) -> bool {
        self.matches_text(rule)
            && self.status.accepts(rule)
            && self.trigger.accepts(rule)
            && self.target_type.accepts(rule)
    }

    fn matches_text(&self, rule: &Rule) -> bool {
        let needle = self.text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        rule.name.to_lowercase().contains(&needle)
            || rule.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }

    /// Matching rules in input order
    pub fn filter<'a>(&self, rules: &'a [Rule]) -> Vec<&'a Rule> {
        rules.iter().filter(|r| self.matches(r)).collect()
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Collection level counts for list headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub time_triggers: usize,
    pub url_triggers: usize,
    pub extension_targets: usize,
    pub profile_targets: usize,
    pub group_targets: usize,
}

impl RuleSummary {
    pub fn of(rules: &[Rule]) -> Self {
        let mut summary = RuleSummary {
            total: rules.len(),
            ..Default::default()
        };
        for rule in rules {
            if rule.enabled {
                summary.enabled += 1;
            } else {
                summary.disabled += 1;
            }
            match rule.trigger_kind() {
                TriggerKind::Time => summary.time_triggers += 1,
                TriggerKind::Url => summary.url_triggers += 1,
            }
            match rule.target_type {
                TargetType::Extension => summary.extension_targets += 1,
                TargetType::Profile => summary.profile_targets += 1,
                TargetType::Group => summary.group_targets += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDraft;
    use crate::rule_metadata::{RuleAction, RuleId};
    use crate::trigger::Trigger;

    fn sample() -> Vec<Rule> {
        vec![
            Rule::with_id(
                RuleId::from("r1"),
                RuleDraft::new(
                    "Work Morning",
                    TargetType::Group,
                    ["Dev"],
                    RuleAction::Enable,
                    Trigger::at("09:00", [1]),
                )
                .with_tags(["office"]),
            ),
            Rule::with_id(
                RuleId::from("r2"),
                RuleDraft::new(
                    "Video",
                    TargetType::Extension,
                    ["ext1"],
                    RuleAction::Disable,
                    Trigger::on_url("youtube.com"),
                )
                .with_tags(["Focus"]),
            )
            .with_enabled(false),
            Rule::with_id(
                RuleId::from("r3"),
                RuleDraft::new(
                    "Evening",
                    TargetType::Profile,
                    ["p1"],
                    RuleAction::Apply,
                    Trigger::at("18:00", [1, 2]),
                ),
            ),
        ]
    }

    fn ids(rules: Vec<&Rule>) -> Vec<&str> {
        rules.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_status_filter_preserves_order() {
        let rules = sample();
        let visible = RuleQuery::new().with_status(StatusFilter::Enabled).filter(&rules);
        assert_eq!(ids(visible), vec!["r1", "r3"]);
    }

    #[test]
    fn test_text_matches_name_or_tag_ignoring_case() {
        let rules = sample();
        assert_eq!(ids(RuleQuery::new().with_text("MORNING").filter(&rules)), vec!["r1"]);
        assert_eq!(ids(RuleQuery::new().with_text("focus").filter(&rules)), vec!["r2"]);
        assert_eq!(RuleQuery::new().with_text("  ").filter(&rules).len(), 3);
    }

    #[test]
    fn test_filters_are_anded() {
        let rules = sample();
        let query = RuleQuery::new()
            .with_trigger(TriggerFilter::Time)
            .with_target_type(TargetTypeFilter::Profile);
        assert_eq!(ids(query.filter(&rules)), vec!["r3"]);

        let none = RuleQuery::new()
            .with_trigger(TriggerFilter::Url)
            .with_status(StatusFilter::Enabled);
        assert!(none.filter(&rules).is_empty());
    }

    #[test]
    fn test_filter_is_repeatable() {
        let rules = sample();
        let query = RuleQuery::new().with_text("e");
        assert_eq!(query.filter(&rules), query.filter(&rules));
    }

    #[test]
    fn test_summary_counts() {
        let summary = RuleSummary::of(&sample());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.enabled, 2);
        assert_eq!(summary.disabled, 1);
        assert_eq!(summary.time_triggers, 2);
        assert_eq!(summary.url_triggers, 1);
        assert_eq!(summary.group_targets, 1);
        assert!(RuleQuery::new().is_unfiltered());
    }
}
