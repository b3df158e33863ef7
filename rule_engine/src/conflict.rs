// Conflict detection between enabled rules
//
// Two enabled rules conflict when:
// 1. their triggers overlap (see `Trigger::overlaps`)
// 2. they have the same target type and share at least one target
// 3. their actions on the shared targets contradict each other or leave
//    the resulting state ambiguous
//
// Rules of different target types are never compared, so a group rule and
// an extension rule touching the same extension are not reported.

use thiserror::Error;

use crate::rule::Rule;
use crate::rule_metadata::{RuleAction, RuleId, TargetType};
use crate::trigger::TriggerKind;

/// Why two rules collide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Enable on one side, disable on the other
    OpposingActions,
    /// Both rules apply the same profile
    ProfileCollision,
    /// A group toggle races a direct enable/disable of the same group
    AmbiguousToggle,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::OpposingActions => write!(f, "opposite actions"),
            ConflictType::ProfileCollision => write!(f, "same profile applied twice"),
            ConflictType::AmbiguousToggle => write!(f, "toggle combined with a direct action"),
        }
    }
}

/// First conflict found for a candidate rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Rule \"{candidate_name}\" conflicts with \"{existing_name}\" on {target_type} {} ({trigger_kind} trigger, {conflict_type})",
    .shared_targets.join(", ")
)]
pub struct RuleConflict {
    pub candidate_name: String,
    pub existing_id: RuleId,
    pub existing_name: String,
    pub target_type: TargetType,
    pub shared_targets: Vec<String>,
    pub trigger_kind: TriggerKind,
    pub conflict_type: ConflictType,
}

/// Pairwise conflict checks over rule collections
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// Find the first enabled rule in `rules` that conflicts with `candidate`.
    ///
    /// Rules are scanned in stored order. The candidate's own previous
    /// version (same id) and disabled rules are skipped. A disabled
    /// candidate never conflicts.
    pub fn find_conflict(&self, candidate: &Rule, rules: &[Rule]) -> Option<RuleConflict> {
        if !candidate.enabled {
            return None;
        }

        rules
            .iter()
            .filter(|existing| existing.enabled && existing.id != candidate.id)
            .find_map(|existing| self.check_pair(candidate, existing))
    }

    /// Every conflicting pair among the enabled rules of a collection,
    /// reported from the later rule's point of view.
    pub fn scan(&self, rules: &[Rule]) -> Vec<RuleConflict> {
        let mut conflicts = Vec::new();
        for i in 0..rules.len() {
            for j in 0..i {
                let (later, earlier) = (&rules[i], &rules[j]);
                if !later.enabled || !earlier.enabled {
                    continue;
                }
                if let Some(conflict) = self.check_pair(later, earlier) {
                    conflicts.push(conflict);
                }
            }
        }
        conflicts
    }

    /// Check if two rules conflict
    fn check_pair(&self, candidate: &Rule, existing: &Rule) -> Option<RuleConflict> {
        if candidate.target_type != existing.target_type {
            return None;
        }
        if !candidate.trigger.overlaps(&existing.trigger) {
            return None;
        }

        let shared = candidate.shared_targets(existing);
        if shared.is_empty() {
            return None;
        }

        let conflict_type =
            Self::actions_conflict(candidate.target_type, candidate.action, existing.action)?;

        Some(RuleConflict {
            candidate_name: candidate.name.clone(),
            existing_id: existing.id.clone(),
            existing_name: existing.name.clone(),
            target_type: candidate.target_type,
            shared_targets: shared,
            trigger_kind: candidate.trigger_kind(),
            conflict_type,
        })
    }

    fn actions_conflict(
        target_type: TargetType,
        a: RuleAction,
        b: RuleAction,
    ) -> Option<ConflictType> {
        match target_type {
            TargetType::Extension => {
                (a.is_direct() && b.is_direct() && a != b).then_some(ConflictType::OpposingActions)
            }
            TargetType::Profile => (a == RuleAction::Apply && b == RuleAction::Apply)
                .then_some(ConflictType::ProfileCollision),
            TargetType::Group => {
                let toggle_vs_direct = (a == RuleAction::Toggle && b.is_direct())
                    || (b == RuleAction::Toggle && a.is_direct());
                if toggle_vs_direct {
                    Some(ConflictType::AmbiguousToggle)
                } else if a.is_direct() && b.is_direct() && a != b {
                    Some(ConflictType::OpposingActions)
                } else {
                    None
                }
            }
        }
    }
}
