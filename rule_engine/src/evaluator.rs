// Trigger evaluation and action resolution
//
// Given a clock reading or a visited URL, picks the enabled rules whose
// trigger fires and turns their actions into concrete per-extension state
// changes against a catalog snapshot. Applying the changes (through the
// platform's management API) and deciding when to evaluate are left to
// the caller.

use chrono::{Datelike, Timelike};
use log::debug;

use crate::catalog::TargetCatalog;
use crate::rule::Rule;
use crate::rule_metadata::{ExtensionId, RuleAction, RuleId, TargetType};

/// Desired enabled state for one extension, caused by one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub extension_id: ExtensionId,
    pub enabled: bool,
    pub rule_id: RuleId,
}

/// Evaluates rules against one catalog snapshot
#[derive(Debug, Clone, Copy)]
pub struct RuleEvaluator<'a> {
    catalog: &'a TargetCatalog,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(catalog: &'a TargetCatalog) -> Self {
        Self { catalog }
    }

    /// Enabled rules whose time trigger fires at `now`, in stored order
    pub fn due_at<'r, T: Datelike + Timelike>(&self, rules: &'r [Rule], now: &T) -> Vec<&'r Rule> {
        rules
            .iter()
            .filter(|r| r.enabled && r.trigger.fires_at(now))
            .collect()
    }

    /// Enabled rules whose URL trigger matches a visited URL, in stored order
    pub fn matching_url<'r>(&self, rules: &'r [Rule], visited: &str) -> Vec<&'r Rule> {
        rules
            .iter()
            .filter(|r| r.enabled && r.trigger.fires_on_url(visited))
            .collect()
    }

    /// State changes one rule asks for. Targets missing from the catalog
    /// are skipped.
    pub fn resolve(&self, rule: &Rule) -> Vec<StateChange> {
        let change = |extension_id: &ExtensionId, enabled: bool| StateChange {
            extension_id: extension_id.clone(),
            enabled,
            rule_id: rule.id.clone(),
        };

        let mut changes = Vec::new();
        match rule.target_type {
            TargetType::Extension => {
                let enabled = match rule.action {
                    RuleAction::Enable => true,
                    RuleAction::Disable => false,
                    _ => return changes,
                };
                for id in &rule.target_ids {
                    match self.catalog.extension(id) {
                        Some(ext) => changes.push(change(&ext.id, enabled)),
                        None => debug!("rule {} targets missing extension {}", rule.id, id),
                    }
                }
            }
            TargetType::Profile => {
                if rule.action != RuleAction::Apply {
                    return changes;
                }
                for id in &rule.target_ids {
                    let Some(profile) = self.catalog.profile(id) else {
                        debug!("rule {} targets missing profile {}", rule.id, id);
                        continue;
                    };
                    for (ext_id, enabled) in &profile.extension_states {
                        if self.catalog.extension(ext_id.as_str()).is_some() {
                            changes.push(change(ext_id, *enabled));
                        }
                    }
                }
            }
            TargetType::Group => {
                for name in &rule.target_ids {
                    let Some(group) = self.catalog.group(name) else {
                        debug!("rule {} targets missing group {}", rule.id, name);
                        continue;
                    };
                    for member in &group.members {
                        let Some(ext) = self.catalog.extension(member.as_str()) else {
                            continue;
                        };
                        let enabled = match rule.action {
                            RuleAction::Enable => true,
                            RuleAction::Disable => false,
                            RuleAction::Toggle => !ext.enabled,
                            RuleAction::Apply => continue,
                        };
                        changes.push(change(&ext.id, enabled));
                    }
                }
            }
        }
        changes
    }

    /// Combined changes of several fired rules.
    ///
    /// When rules disagree on an extension the later rule wins. Changes
    /// that match the extension's current state are dropped.
    pub fn plan<'r>(&self, fired: impl IntoIterator<Item = &'r Rule>) -> Vec<StateChange> {
        let mut planned: Vec<StateChange> = Vec::new();
        for rule in fired {
            for change in self.resolve(rule) {
                planned.retain(|c| c.extension_id != change.extension_id);
                planned.push(change);
            }
        }
        planned.retain(|c| {
            self.catalog
                .extension(c.extension_id.as_str())
                .map(|ext| ext.enabled != c.enabled)
                .unwrap_or(false)
        });
        planned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Extension, Group, Profile};
    use crate::rule::RuleDraft;
    use crate::rule_metadata::ProfileId;
    use crate::trigger::Trigger;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn catalog() -> TargetCatalog {
        let mut states = BTreeMap::new();
        states.insert(ExtensionId::from("a"), false);
        states.insert(ExtensionId::from("b"), true);
        states.insert(ExtensionId::from("uninstalled"), true);

        TargetCatalog::default()
            .with_extensions([
                Extension::new("a", "Alpha", true),
                Extension::new("b", "Beta", false),
            ])
            .with_profiles([Profile {
                id: ProfileId::from("p1"),
                name: "Work".into(),
                extension_states: states,
            }])
            .with_groups([Group::new("Both", ["a", "b", "gone"])])
    }

    fn rule(
        id: &str,
        target_type: TargetType,
        targets: &[&str],
        action: RuleAction,
        trigger: Trigger,
    ) -> Rule {
        Rule::with_id(
            RuleId::from(id),
            RuleDraft::new(id, target_type, targets.iter().copied(), action, trigger),
        )
    }

    /// Extension rule on a URL trigger
    fn ext(id: &str, targets: &[&str], action: RuleAction) -> Rule {
        rule(id, TargetType::Extension, targets, action, Trigger::on_url("x"))
    }

    fn states(changes: &[StateChange]) -> Vec<(&str, bool)> {
        changes.iter().map(|c| (c.extension_id.as_str(), c.enabled)).collect()
    }

    #[test]
    fn test_due_rules_skip_disabled() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let at = |id: &str, time: &str| {
            rule(id, TargetType::Extension, &["a"], RuleAction::Enable, Trigger::at(time, [1]))
        };
        let rules = vec![
            at("on", "09:00"),
            at("off", "09:00").with_enabled(false),
            at("later", "10:00"),
        ];
        let catalog = catalog();
        let due = RuleEvaluator::new(&catalog).due_at(&rules, &now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id.as_str(), "on");
    }

    #[test]
    fn test_matching_url() {
        let rules = vec![rule(
            "yt",
            TargetType::Extension,
            &["a"],
            RuleAction::Disable,
            Trigger::on_url("youtube.com"),
        )];
        let catalog = catalog();
        let evaluator = RuleEvaluator::new(&catalog);
        assert_eq!(
            evaluator
                .matching_url(&rules, "https://www.youtube.com/watch?v=1")
                .len(),
            1
        );
        assert!(evaluator.matching_url(&rules, "https://example.com").is_empty());
    }

    #[test]
    fn test_resolve_profile_skips_uninstalled() {
        let catalog = catalog();
        let apply =
            rule("p", TargetType::Profile, &["p1"], RuleAction::Apply, Trigger::on_url("x"));
        let changes = RuleEvaluator::new(&catalog).resolve(&apply);
        assert_eq!(states(&changes), vec![("a", false), ("b", true)]);
    }

    #[test]
    fn test_resolve_group_toggle_flips_current_state() {
        let catalog = catalog();
        let toggle =
            rule("t", TargetType::Group, &["Both"], RuleAction::Toggle, Trigger::on_url("x"));
        let changes = RuleEvaluator::new(&catalog).resolve(&toggle);
        assert_eq!(states(&changes), vec![("a", false), ("b", true)]);
    }

    #[test]
    fn test_plan_later_rule_wins_and_drops_noops() {
        let catalog = catalog();
        let first =
            rule("1", TargetType::Group, &["Both"], RuleAction::Disable, Trigger::on_url("x"));
        let second = ext("2", &["a"], RuleAction::Enable);
        let plan = RuleEvaluator::new(&catalog).plan([&first, &second]);
        // a: disabled by group, re-enabled by rule 2 -> already enabled, dropped
        // b: disabled by group -> already disabled, dropped
        assert!(plan.is_empty());

        let enable_b = ext("3", &["b", "missing"], RuleAction::Enable);
        let plan = RuleEvaluator::new(&catalog).plan([&enable_b]);
        assert_eq!(states(&plan), vec![("b", true)]);
        assert_eq!(plan[0].rule_id.as_str(), "3");
    }
}
