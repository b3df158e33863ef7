// Rule validation
//
// Checks the shape of a candidate rule before it is conflict checked and
// saved. Every failed check yields its own error scoped to one form field,
// so the caller can highlight exactly the offending input. Validation is
// pure: it only reads the candidate, the existing rules and a catalog
// snapshot.

use thiserror::Error;

use crate::catalog::TargetCatalog;
use crate::rule::Rule;
use crate::rule_metadata::{RuleAction, TargetType};
use crate::trigger::{parse_clock, Trigger, MAX_WEEKDAY};

/// Form field an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleField {
    Name,
    Targets,
    Action,
    TriggerTime,
    TriggerDays,
    TriggerUrl,
}

impl std::fmt::Display for RuleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuleField::Name => "name",
            RuleField::Targets => "targets",
            RuleField::Action => "action",
            RuleField::TriggerTime => "trigger.time",
            RuleField::TriggerDays => "trigger.days",
            RuleField::TriggerUrl => "trigger.url",
        };
        write!(f, "{}", name)
    }
}

/// Validation error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Rule name is required")]
    EmptyName,

    #[error("A rule named \"{0}\" already exists")]
    DuplicateName(String),

    #[error("Select at least one {0}")]
    NoTargets(TargetType),

    #[error("Select only one profile ({0} selected)")]
    MultipleProfiles(usize),

    #[error("Action \"{action}\" is not available for {target_type} targets")]
    ActionNotAllowed {
        action: RuleAction,
        target_type: TargetType,
    },

    #[error("Unknown {target_type} targets: {}", .ids.join(", "))]
    UnknownTargets {
        target_type: TargetType,
        ids: Vec<String>,
    },

    #[error("Trigger time is required")]
    MissingTime,

    #[error("Trigger time \"{0}\" is not a valid HH:MM time")]
    InvalidTime(String),

    #[error("Select at least one day")]
    NoDays,

    #[error("Invalid weekday index {0} (expected 0-6)")]
    InvalidDay(u8),

    #[error("URL pattern is required")]
    EmptyUrl,
}

impl ValidationError {
    /// The form field this error should be shown next to
    pub fn field(&self) -> RuleField {
        match self {
            ValidationError::EmptyName | ValidationError::DuplicateName(_) => RuleField::Name,
            ValidationError::NoTargets(_)
            | ValidationError::MultipleProfiles(_)
            | ValidationError::UnknownTargets { .. } => RuleField::Targets,
            ValidationError::ActionNotAllowed { .. } => RuleField::Action,
            ValidationError::MissingTime | ValidationError::InvalidTime(_) => {
                RuleField::TriggerTime
            }
            ValidationError::NoDays | ValidationError::InvalidDay(_) => RuleField::TriggerDays,
            ValidationError::EmptyUrl => RuleField::TriggerUrl,
        }
    }
}

/// Validation outcome with every field error found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    /// Errors scoped to one field
    pub fn errors_for(&self, field: RuleField) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.field() == field).collect()
    }

    /// (field, message) pairs in the order the checks ran
    pub fn field_messages(&self) -> Vec<(RuleField, String)> {
        self.errors.iter().map(|e| (e.field(), e.to_string())).collect()
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field(), e))
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Validates candidate rules against existing rules and a catalog snapshot
#[derive(Debug, Clone)]
pub struct RuleValidator {
    /// Reject target ids the catalog does not know
    check_target_existence: bool,
}

impl RuleValidator {
    pub fn new() -> Self {
        Self {
            check_target_existence: true,
        }
    }

    pub fn check_target_existence(mut self, check: bool) -> Self {
        self.check_target_existence = check;
        self
    }

    /// Run every check on `candidate`.
    ///
    /// `existing` may contain the candidate's previous version (same id);
    /// it is ignored for the name uniqueness check.
    pub fn validate(
        &self,
        candidate: &Rule,
        existing: &[Rule],
        catalog: &TargetCatalog,
    ) -> ValidationResult {
        let mut result = ValidationResult::valid();

        self.validate_name(candidate, existing, &mut result);
        self.validate_targets(candidate, catalog, &mut result);
        self.validate_action(candidate, &mut result);
        self.validate_trigger(&candidate.trigger, &mut result);

        result
    }

    fn validate_name(&self, candidate: &Rule, existing: &[Rule], result: &mut ValidationResult) {
        let name = candidate.name.trim();
        if name.is_empty() {
            result.add_error(ValidationError::EmptyName);
            return;
        }

        let lowered = name.to_lowercase();
        let duplicate = existing
            .iter()
            .filter(|r| r.id != candidate.id)
            .any(|r| r.name.trim().to_lowercase() == lowered);
        if duplicate {
            result.add_error(ValidationError::DuplicateName(name.to_string()));
        }
    }

    fn validate_targets(
        &self,
        candidate: &Rule,
        catalog: &TargetCatalog,
        result: &mut ValidationResult,
    ) {
        let count = candidate.target_ids.len();
        if count == 0 {
            result.add_error(ValidationError::NoTargets(candidate.target_type));
            return;
        }
        if candidate.target_type == TargetType::Profile && count != 1 {
            result.add_error(ValidationError::MultipleProfiles(count));
        }

        if self.check_target_existence {
            let unknown = catalog.unknown_targets(candidate.target_type, &candidate.target_ids);
            if !unknown.is_empty() {
                result.add_error(ValidationError::UnknownTargets {
                    target_type: candidate.target_type,
                    ids: unknown,
                });
            }
        }
    }

    fn validate_action(&self, candidate: &Rule, result: &mut ValidationResult) {
        if !candidate.target_type.allows(candidate.action) {
            result.add_error(ValidationError::ActionNotAllowed {
                action: candidate.action,
                target_type: candidate.target_type,
            });
        }
    }

    fn validate_trigger(&self, trigger: &Trigger, result: &mut ValidationResult) {
        match trigger {
            Trigger::Time { time, days } => {
                if time.trim().is_empty() {
                    result.add_error(ValidationError::MissingTime);
                } else if parse_clock(time).is_none() {
                    result.add_error(ValidationError::InvalidTime(time.clone()));
                }

                if days.is_empty() {
                    result.add_error(ValidationError::NoDays);
                }
                if let Some(day) = days.iter().find(|d| **d > MAX_WEEKDAY) {
                    result.add_error(ValidationError::InvalidDay(*day));
                }
            }
            Trigger::Url { url } => {
                if url.trim().is_empty() {
                    result.add_error(ValidationError::EmptyUrl);
                }
            }
        }
    }
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::new()
    }
}
