pub mod rule_metadata;
pub mod trigger;
pub mod rule;
pub mod catalog;
pub mod validator;
pub mod conflict;
pub mod rule_query;
pub mod schema;
pub mod evaluator;

pub use rule_metadata::{ExtensionId, GroupName, ProfileId, RuleAction, RuleId, TargetType};

pub use trigger::{parse_clock, Trigger, TriggerKind};

pub use rule::{Rule, RuleDraft};

pub use catalog::{
    Extension, ExtensionIcon, Group, GroupMap, Profile, ProfileMap, TargetCatalog,
};

pub use validator::{
    RuleField,              // Form field an error belongs to
    RuleValidator,          // Shape and cross-entity checks
    ValidationError,        // Field scoped error
    ValidationResult,       // Validation outcome
};

pub use conflict::{
    ConflictDetector,       // Pairwise conflict checks
    ConflictType,           // Why two rules collide
    RuleConflict,           // First conflict found
};

pub use rule_query::{
    RuleQuery,              // Filter builder for rule lists
    RuleSummary,            // Collection level counts
    StatusFilter,
    TargetTypeFilter,
    TriggerFilter,
};

pub use schema::{
    export_rules, merge_by_id, parse_rules, rules_from_value, ImportError, MergeOutcome,
    SchemaVersion,
};

pub use evaluator::{RuleEvaluator, StateChange};
