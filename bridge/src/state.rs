//! In-memory application state of the rule manager page.

use rule_engine::{Rule, RuleId, RuleQuery, RuleSummary, TargetCatalog};
use std::collections::BTreeSet;

/// Everything the rule list view is derived from
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Rules in stored order, as last acknowledged by storage
    rules: Vec<Rule>,
    /// Storage revision `rules` was read or written at
    revision: u64,
    selected: BTreeSet<RuleId>,
    query: RuleQuery,
    catalog: TargetCatalog,
}

impl AppState {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    pub fn query(&self) -> &RuleQuery {
        &self.query
    }

    pub fn rule(&self, id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.id == id)
    }

    /// Rules passing the active query
    pub fn visible(&self) -> Vec<&Rule> {
        self.query.filter(&self.rules)
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary::of(&self.rules)
    }

    pub fn is_selected(&self, id: &RuleId) -> bool {
        self.selected.contains(id)
    }

    /// Selected rule ids in stored order
    pub fn selected_ids(&self) -> Vec<RuleId> {
        self.rules
            .iter()
            .filter(|r| self.selected.contains(&r.id))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn selection_len(&self) -> usize {
        self.selected.len()
    }

    /// Replace the collection after storage acknowledged it. Selection
    /// entries for rules that no longer exist are dropped.
    pub fn replace_rules(&mut self, rules: Vec<Rule>, revision: u64) {
        self.rules = rules;
        self.revision = revision;
        let existing: BTreeSet<RuleId> = self.rules.iter().map(|r| r.id.clone()).collect();
        self.selected.retain(|id| existing.contains(id));
    }

    pub fn set_catalog(&mut self, catalog: TargetCatalog) {
        self.catalog = catalog;
    }

    pub fn set_query(&mut self, query: RuleQuery) {
        self.query = query;
    }

    /// Returns false when `id` is not a known rule
    pub fn select(&mut self, id: &RuleId, selected: bool) -> bool {
        if self.rule(id).is_none() {
            return false;
        }
        if selected {
            self.selected.insert(id.clone());
        } else {
            self.selected.remove(id);
        }
        true
    }

    /// Add every currently visible rule to the selection
    pub fn select_visible(&mut self) {
        let visible: Vec<RuleId> = self.visible().iter().map(|r| r.id.clone()).collect();
        self.selected.extend(visible);
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }
}
