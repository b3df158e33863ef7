//! Rule controller.
//!
//! Owns the [`AppState`] and turns every user intent, expressed as a
//! [`RuleCommand`], into validation, conflict detection and a whole
//! collection save through the storage worker. In-memory state is replaced
//! only after the worker acknowledges the write, so a failed save leaves
//! the previous collection (and the caller's draft) untouched.

use chrono::{Datelike, Timelike};
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;

use rule_engine::{
    export_rules, merge_by_id, parse_rules, ConflictDetector, ImportError, Rule, RuleConflict,
    RuleDraft, RuleEvaluator, RuleId, RuleQuery, RuleValidator, StateChange, TargetCatalog,
    ValidationResult,
};

use crate::config::BridgeConfig;
use crate::errors::PersistenceError;
use crate::management::ManagementApi;
use crate::state::AppState;
use crate::worker::BridgeHandle;

/// Asks the user before a destructive action
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Gate that approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmationGate for AlwaysConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// User intent handled by [`RuleController::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCommand {
    /// Re-read rules and the target catalog
    Reload,
    Create(RuleDraft),
    Update { id: RuleId, draft: RuleDraft },
    /// Flip the enabled flag only; skips validation and conflict checks
    SetEnabled { id: RuleId, enabled: bool },
    Delete(RuleId),
    Select { id: RuleId, selected: bool },
    SelectVisible,
    ClearSelection,
    BulkDelete,
    BulkSetEnabled(bool),
    /// Merge the contents of an exported rule file
    Import(String),
    SetQuery(RuleQuery),
}

impl RuleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RuleCommand::Reload => "reload",
            RuleCommand::Create(_) => "create",
            RuleCommand::Update { .. } => "update",
            RuleCommand::SetEnabled { .. } => "set_enabled",
            RuleCommand::Delete(_) => "delete",
            RuleCommand::Select { .. } => "select",
            RuleCommand::SelectVisible => "select_visible",
            RuleCommand::ClearSelection => "clear_selection",
            RuleCommand::BulkDelete => "bulk_delete",
            RuleCommand::BulkSetEnabled(_) => "bulk_set_enabled",
            RuleCommand::Import(_) => "import",
            RuleCommand::SetQuery(_) => "set_query",
        }
    }
}

/// What a successful command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Reloaded { rules: usize },
    Saved(RuleId),
    Deleted(usize),
    Toggled(usize),
    Imported { added: usize, replaced: usize },
    SelectionChanged(usize),
    QueryChanged { visible: usize },
    /// The user declined the confirmation prompt
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error("Invalid rule: {0}")]
    Validation(ValidationResult),

    #[error(transparent)]
    Conflict(#[from] RuleConflict),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Rule {0} not found")]
    NotFound(RuleId),

    #[error("No rules selected")]
    EmptySelection,
}

/// Single owner of the rule manager's state
pub struct RuleController {
    bridge: BridgeHandle,
    management: Arc<dyn ManagementApi>,
    confirm: Arc<dyn ConfirmationGate>,
    validator: RuleValidator,
    detector: ConflictDetector,
    host_extension_id: Option<String>,
    state: AppState,
}

impl RuleController {
    /// Build a controller and load rules plus the target catalog
    pub async fn open(
        bridge: BridgeHandle,
        management: Arc<dyn ManagementApi>,
        confirm: Arc<dyn ConfirmationGate>,
        config: &BridgeConfig,
    ) -> Result<Self, ControllerError> {
        let mut controller = Self {
            bridge,
            management,
            confirm,
            validator: RuleValidator::new(),
            detector: ConflictDetector::new(),
            host_extension_id: config.host_extension_id.clone(),
            state: AppState::default(),
        };
        controller.reload().await?;
        Ok(controller)
    }

    pub fn with_validator(mut self, validator: RuleValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn dispatch(
        &mut self,
        command: RuleCommand,
    ) -> Result<CommandOutcome, ControllerError> {
        debug!("dispatching {}", command.name());
        match command {
            RuleCommand::Reload => {
                self.reload().await?;
                Ok(CommandOutcome::Reloaded {
                    rules: self.state.rules().len(),
                })
            }
            RuleCommand::Create(draft) => self.save_rule(Rule::create(draft)).await,
            RuleCommand::Update { id, draft } => {
                let existing = self.require(&id)?;
                let edited = existing.edited(draft);
                self.save_rule(edited).await
            }
            RuleCommand::SetEnabled { id, enabled } => {
                self.require(&id)?;
                let next = self
                    .state
                    .rules()
                    .iter()
                    .map(|r| if r.id == id { r.clone().with_enabled(enabled) } else { r.clone() })
                    .collect();
                self.commit(next).await?;
                Ok(CommandOutcome::Toggled(1))
            }
            RuleCommand::Delete(id) => {
                let rule = self.require(&id)?;
                if !self.confirm.confirm(&format!("Delete rule \"{}\"?", rule.name)) {
                    return Ok(CommandOutcome::Cancelled);
                }
                let next = self.state.rules().iter().filter(|r| r.id != id).cloned().collect();
                self.commit(next).await?;
                info!("deleted rule {}", id);
                Ok(CommandOutcome::Deleted(1))
            }
            RuleCommand::Select { id, selected } => {
                if !self.state.select(&id, selected) {
                    return Err(ControllerError::NotFound(id));
                }
                Ok(CommandOutcome::SelectionChanged(self.state.selection_len()))
            }
            RuleCommand::SelectVisible => {
                self.state.select_visible();
                Ok(CommandOutcome::SelectionChanged(self.state.selection_len()))
            }
            RuleCommand::ClearSelection => {
                self.state.clear_selection();
                Ok(CommandOutcome::SelectionChanged(0))
            }
            RuleCommand::BulkDelete => self.bulk_delete().await,
            RuleCommand::BulkSetEnabled(enabled) => self.bulk_set_enabled(enabled).await,
            RuleCommand::Import(contents) => self.import(&contents).await,
            RuleCommand::SetQuery(query) => {
                self.state.set_query(query);
                Ok(CommandOutcome::QueryChanged {
                    visible: self.state.visible().len(),
                })
            }
        }
    }

    /// Pretty printed JSON of the whole collection
    pub fn export(&self) -> Result<String, ControllerError> {
        Ok(export_rules(self.state.rules())?)
    }

    /// Re-read profiles, groups and the installed extensions
    pub async fn refresh_catalog(&mut self) -> Result<(), ControllerError> {
        let catalog = self.load_catalog().await?;
        self.state.set_catalog(catalog);
        Ok(())
    }

    async fn load_catalog(&self) -> Result<TargetCatalog, ControllerError> {
        let (profiles, groups) = self.bridge.get_targets().await?;
        let catalog = TargetCatalog::snapshot(
            self.management.installed(),
            self.host_extension_id.as_deref(),
            profiles,
            groups,
        );
        debug!(
            "catalog: {} extensions, {} profiles, {} groups",
            catalog.extensions().len(),
            catalog.profiles().len(),
            catalog.groups().len()
        );
        Ok(catalog)
    }

    /// Fire time triggers due at `now` and apply the resulting changes
    pub async fn fire_at<T: Datelike + Timelike>(
        &mut self,
        now: &T,
    ) -> Result<Vec<StateChange>, ControllerError> {
        let plan = {
            let evaluator = RuleEvaluator::new(self.state.catalog());
            evaluator.plan(evaluator.due_at(self.state.rules(), now))
        };
        self.apply(plan).await
    }

    /// Fire URL triggers matching a visited URL and apply the resulting changes
    pub async fn fire_on_url(&mut self, url: &str) -> Result<Vec<StateChange>, ControllerError> {
        let plan = {
            let evaluator = RuleEvaluator::new(self.state.catalog());
            evaluator.plan(evaluator.matching_url(self.state.rules(), url))
        };
        self.apply(plan).await
    }

    /// Rules and catalog are both fetched before either is adopted
    async fn reload(&mut self) -> Result<(), ControllerError> {
        let snapshot = self.bridge.get_rules().await?;
        let catalog = self.load_catalog().await?;
        self.state.replace_rules(snapshot.rules, snapshot.revision);
        self.state.set_catalog(catalog);
        info!(
            "loaded {} rules at revision {}",
            self.state.rules().len(),
            self.state.revision()
        );
        Ok(())
    }

    fn require(&self, id: &RuleId) -> Result<&Rule, ControllerError> {
        self.state
            .rule(id)
            .ok_or_else(|| ControllerError::NotFound(id.clone()))
    }

    /// Validate, check for conflicts, then insert or replace by id
    async fn save_rule(&mut self, rule: Rule) -> Result<CommandOutcome, ControllerError> {
        let result = self
            .validator
            .validate(&rule, self.state.rules(), self.state.catalog());
        if !result.valid {
            debug!("rule \"{}\" rejected: {}", rule.name, result);
            return Err(ControllerError::Validation(result));
        }

        if let Some(conflict) = self.detector.find_conflict(&rule, self.state.rules()) {
            warn!("{}", conflict);
            return Err(conflict.into());
        }

        let id = rule.id.clone();
        let mut next = self.state.rules().to_vec();
        match next.iter().position(|r| r.id == id) {
            Some(pos) => next[pos] = rule,
            None => next.push(rule),
        }
        self.commit(next).await?;
        Ok(CommandOutcome::Saved(id))
    }

    async fn bulk_delete(&mut self) -> Result<CommandOutcome, ControllerError> {
        let ids = self.state.selected_ids();
        if ids.is_empty() {
            return Err(ControllerError::EmptySelection);
        }
        if !self.confirm.confirm(&format!("Delete {} selected rules?", ids.len())) {
            return Ok(CommandOutcome::Cancelled);
        }

        let next = self
            .state
            .rules()
            .iter()
            .filter(|r| !ids.contains(&r.id))
            .cloned()
            .collect();
        self.commit(next).await?;
        self.state.clear_selection();
        info!("deleted {} rules", ids.len());
        Ok(CommandOutcome::Deleted(ids.len()))
    }

    async fn bulk_set_enabled(&mut self, enabled: bool) -> Result<CommandOutcome, ControllerError> {
        let ids = self.state.selected_ids();
        if ids.is_empty() {
            return Err(ControllerError::EmptySelection);
        }

        let next = self
            .state
            .rules()
            .iter()
            .map(|r| {
                if ids.contains(&r.id) {
                    r.clone().with_enabled(enabled)
                } else {
                    r.clone()
                }
            })
            .collect();
        self.commit(next).await?;
        self.state.clear_selection();
        Ok(CommandOutcome::Toggled(ids.len()))
    }

    async fn import(&mut self, contents: &str) -> Result<CommandOutcome, ControllerError> {
        let imported = parse_rules(contents)?;
        let merged = merge_by_id(self.state.rules(), imported);

        for conflict in self.detector.scan(&merged.rules) {
            warn!("imported rules conflict: {}", conflict);
        }

        self.commit(merged.rules).await?;
        info!("imported rules: {} added, {} replaced", merged.added, merged.replaced);
        Ok(CommandOutcome::Imported {
            added: merged.added,
            replaced: merged.replaced,
        })
    }

    /// Save `next` against the revision the current state was read at and
    /// adopt it once acknowledged
    async fn commit(&mut self, next: Vec<Rule>) -> Result<u64, ControllerError> {
        let revision = self
            .bridge
            .save_rules(next.clone(), Some(self.state.revision()))
            .await
            .map_err(|e| {
                if e.needs_reload() {
                    warn!("save not confirmed ({}); reload before retrying", e);
                }
                e
            })?;
        self.state.replace_rules(next, revision);
        Ok(revision)
    }

    async fn apply(&mut self, plan: Vec<StateChange>) -> Result<Vec<StateChange>, ControllerError> {
        if plan.is_empty() {
            return Ok(plan);
        }

        let mut applied = Vec::with_capacity(plan.len());
        for change in plan {
            match self.management.set_enabled(&change.extension_id, change.enabled) {
                Ok(()) => {
                    debug!(
                        "rule {} set {} enabled={}",
                        change.rule_id, change.extension_id, change.enabled
                    );
                    applied.push(change);
                }
                Err(e) => warn!("rule {}: {}", change.rule_id, e),
            }
        }

        self.refresh_catalog().await?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKeys;
    use crate::management::InMemoryManagement;
    use crate::repository::RuleRepository;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::worker::StorageWorker;
    use chrono::NaiveDate;
    use rule_engine::{Extension, RuleAction, StatusFilter, TargetType, Trigger};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Decline(AtomicUsize);

    impl ConfirmationGate for Decline {
        fn confirm(&self, _prompt: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    fn management() -> Arc<InMemoryManagement> {
        Arc::new(InMemoryManagement::new(vec![
            Extension::new("ext1", "One", true),
            Extension::new("ext2", "Two", false),
        ]))
    }

    async fn controller_with(
        management: Arc<InMemoryManagement>,
        confirm: Arc<dyn ConfirmationGate>,
    ) -> RuleController {
        let config = BridgeConfig::default();
        let repository = RuleRepository::new(MemoryStore::new(1 << 20), StorageKeys::default());
        let (bridge, _task) = StorageWorker::new(repository).spawn(&config);
        RuleController::open(bridge, management, confirm, &config).await.unwrap()
    }

    async fn controller() -> RuleController {
        controller_with(management(), Arc::new(AlwaysConfirm)).await
    }

    fn morning(name: &str, action: RuleAction) -> RuleDraft {
        RuleDraft::new(name, TargetType::Extension, ["ext1"], action, Trigger::at("09:00", [1]))
    }

    #[tokio::test]
    async fn test_create_persists_and_updates_state() {
        let mut ctl = controller().await;
        let outcome = ctl
            .dispatch(RuleCommand::Create(morning("Work", RuleAction::Enable)))
            .await
            .unwrap();
        let CommandOutcome::Saved(id) = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert_eq!(ctl.state().rules().len(), 1);
        assert_eq!(ctl.state().revision(), 1);
        assert!(ctl.state().rule(&id).unwrap().enabled);
    }

    #[tokio::test]
    async fn test_invalid_rule_leaves_state_untouched() {
        let mut ctl = controller().await;
        let err = ctl
            .dispatch(RuleCommand::Create(morning("  ", RuleAction::Enable)))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
        assert!(ctl.state().rules().is_empty());
        assert_eq!(ctl.state().revision(), 0);
    }

    #[tokio::test]
    async fn test_conflicting_rule_is_blocked() {
        let mut ctl = controller().await;
        ctl.dispatch(RuleCommand::Create(morning("On", RuleAction::Enable)))
            .await
            .unwrap();
        let err = ctl
            .dispatch(RuleCommand::Create(morning("Off", RuleAction::Disable)))
            .await
            .unwrap_err();
        let ControllerError::Conflict(conflict) = err else {
            panic!("expected conflict, got {:?}", err);
        };
        assert_eq!(conflict.shared_targets, vec!["ext1".to_string()]);
        assert_eq!(ctl.state().rules().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_enabled_flag_and_position() {
        let mut ctl = controller().await;
        let CommandOutcome::Saved(first) = ctl
            .dispatch(RuleCommand::Create(morning("First", RuleAction::Enable)))
            .await
            .unwrap()
        else {
            panic!("not saved");
        };
        ctl.dispatch(RuleCommand::Create(RuleDraft::new(
            "Second",
            TargetType::Extension,
            ["ext2"],
            RuleAction::Enable,
            Trigger::on_url("docs.rs"),
        )))
        .await
        .unwrap();
        ctl.dispatch(RuleCommand::SetEnabled {
            id: first.clone(),
            enabled: false,
        })
        .await
        .unwrap();

        ctl.dispatch(RuleCommand::Update {
            id: first.clone(),
            draft: morning("First renamed", RuleAction::Disable),
        })
        .await
        .unwrap();

        let rules = ctl.state().rules();
        assert_eq!(rules[0].id, first);
        assert_eq!(rules[0].name, "First renamed");
        assert!(!rules[0].enabled);
    }

    #[tokio::test]
    async fn test_unknown_rule_is_not_found() {
        let mut ctl = controller().await;
        let err = ctl
            .dispatch(RuleCommand::Delete(RuleId::from("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_declined_bulk_delete_keeps_rules() {
        let gate = Arc::new(Decline(AtomicUsize::new(0)));
        let mut ctl = controller_with(management(), gate.clone()).await;
        ctl.dispatch(RuleCommand::Create(morning("A", RuleAction::Enable)))
            .await
            .unwrap();
        ctl.dispatch(RuleCommand::SelectVisible).await.unwrap();

        let outcome = ctl.dispatch(RuleCommand::BulkDelete).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Cancelled);
        assert_eq!(gate.0.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.state().rules().len(), 1);
        assert_eq!(ctl.state().selection_len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_ops_need_a_selection() {
        let mut ctl = controller().await;
        let err = ctl.dispatch(RuleCommand::BulkSetEnabled(false)).await.unwrap_err();
        assert!(matches!(err, ControllerError::EmptySelection));
    }

    #[tokio::test]
    async fn test_bulk_disable_is_one_save() {
        let mut ctl = controller().await;
        ctl.dispatch(RuleCommand::Create(morning("A", RuleAction::Enable)))
            .await
            .unwrap();
        ctl.dispatch(RuleCommand::Create(RuleDraft::new(
            "B",
            TargetType::Extension,
            ["ext2"],
            RuleAction::Disable,
            Trigger::on_url("news"),
        )))
        .await
        .unwrap();
        ctl.dispatch(RuleCommand::SelectVisible).await.unwrap();
        let before = ctl.state().revision();

        let outcome = ctl.dispatch(RuleCommand::BulkSetEnabled(false)).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Toggled(2));
        assert_eq!(ctl.state().revision(), before + 1);
        assert_eq!(ctl.state().selection_len(), 0);

        let visible = ctl
            .dispatch(RuleCommand::SetQuery(RuleQuery::new().with_status(StatusFilter::Enabled)))
            .await
            .unwrap();
        assert_eq!(visible, CommandOutcome::QueryChanged { visible: 0 });
    }

    #[tokio::test]
    async fn test_fire_at_applies_changes() {
        let mgmt = management();
        let mut ctl = controller_with(mgmt.clone(), Arc::new(AlwaysConfirm)).await;
        ctl.dispatch(RuleCommand::Create(RuleDraft::new(
            "Evening",
            TargetType::Extension,
            ["ext1"],
            RuleAction::Disable,
            Trigger::at("18:30", [1]),
        )))
        .await
        .unwrap();

        // 2024-01-01 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        let applied = ctl.fire_at(&monday).await.unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(mgmt.is_enabled("ext1"), Some(false));
        assert!(!ctl.state().catalog().extension("ext1").unwrap().enabled);

        let tuesday = monday + chrono::Duration::days(1);
        assert!(ctl.fire_at(&tuesday).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_then_import_replaces_in_place() {
        let mut ctl = controller().await;
        ctl.dispatch(RuleCommand::Create(morning("A", RuleAction::Enable)))
            .await
            .unwrap();
        let exported = ctl.export().unwrap();

        let outcome = ctl.dispatch(RuleCommand::Import(exported)).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Imported { added: 0, replaced: 1 });
        assert_eq!(ctl.state().rules().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_rules_and_catalog_together() {
        let config = BridgeConfig::default();
        let store = MemoryStore::new(1 << 20);
        let repository = RuleRepository::new(store.clone(), StorageKeys::default());
        let (bridge, _task) = StorageWorker::new(repository).spawn(&config);
        let mut ctl = RuleController::open(bridge, management(), Arc::new(AlwaysConfirm), &config)
            .await
            .unwrap();

        // another writer adds a rule, and the group map becomes unreadable
        let rule = Rule::create(morning("Elsewhere", RuleAction::Enable));
        store
            .put("rules", &serde_json::to_value(vec![rule]).unwrap(), None)
            .unwrap();
        store
            .put("extensionManagerGroups_v4", &serde_json::json!("not a map"), None)
            .unwrap();

        let err = ctl.dispatch(RuleCommand::Reload).await.unwrap_err();
        assert!(matches!(err, ControllerError::Persistence(PersistenceError::Corrupt { .. })));
        assert!(ctl.state().rules().is_empty());
        assert_eq!(ctl.state().revision(), 0);
        assert_eq!(ctl.state().catalog().extensions().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_import_is_atomic() {
        let mut ctl = controller().await;
        ctl.dispatch(RuleCommand::Create(morning("A", RuleAction::Enable)))
            .await
            .unwrap();
        let revision = ctl.state().revision();

        let err = ctl
            .dispatch(RuleCommand::Import(
                r#"[{"id": "ok", "name": "x"}, {"name": "no id"}]"#.into(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Import(_)));
        assert_eq!(ctl.state().revision(), revision);
        assert_eq!(ctl.state().rules().len(), 1);
    }
}
