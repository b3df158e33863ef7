// Versioned rule schema: parsing, migration, export and merge
//
// Stored collections and import files are JSON arrays of rule objects.
// Older records may predate the target type field and carry their targets
// under `extensionIds`. Each record is classified by schema version and
// upgraded through an ordered table of migrations before it is
// deserialized, so the rest of the engine only ever sees current rules.

use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::rule::Rule;
use crate::rule_metadata::TargetType;

/// Schema generations of a rule record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// Extension-only rules with `extensionIds`, no `targetType`
    V1,
    /// `targetType` + `targetIds`
    V2,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V2;

    /// Classify a raw record
    pub fn detect(record: &Map<String, Value>) -> Self {
        if record.contains_key("extensionIds") {
            SchemaVersion::V1
        } else {
            SchemaVersion::V2
        }
    }
}

type Migration = fn(&mut Map<String, Value>);

/// Ordered migrations, each upgrading records of the given version by one step
const MIGRATIONS: &[(SchemaVersion, Migration)] = &[(SchemaVersion::V1, migrate_v1_to_v2)];

/// `extensionIds` becomes `targetIds`; a missing `targetType` means extension
fn migrate_v1_to_v2(record: &mut Map<String, Value>) {
    if let Some(ids) = record.remove("extensionIds") {
        if !record.contains_key("targetIds") {
            record.insert("targetIds".to_string(), ids);
        }
    }
    if !record.contains_key("targetType") {
        record.insert(
            "targetType".to_string(),
            Value::String(TargetType::Extension.to_string()),
        );
    }
}

/// Bring a raw record up to the current schema in place.
/// Returns the version the record started at.
pub fn upgrade(record: &mut Map<String, Value>) -> SchemaVersion {
    let original = SchemaVersion::detect(record);
    let mut version = original;
    for (from, migration) in MIGRATIONS {
        if version == *from {
            migration(record);
            version = SchemaVersion::detect(record);
        }
    }
    if original < SchemaVersion::CURRENT {
        debug!("migrated rule record from {:?} to {:?}", original, version);
    }
    original
}

/// Parse Errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Rule file must contain an array of rules")]
    NotAnArray,

    #[error("Entry {0} is not a rule object")]
    NotAnObject(usize),

    #[error("Entry {0} has no id")]
    MissingId(usize),

    #[error("Entry {index} is not a valid rule: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Parse a rule file. Fails as a whole on the first bad entry.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>, ImportError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ImportError::JsonParseError(e.to_string()))?;
    rules_from_value(value)
}

/// Upgrade and deserialize an already parsed JSON array
pub fn rules_from_value(value: Value) -> Result<Vec<Rule>, ImportError> {
    let entries = match value {
        Value::Array(entries) => entries,
        _ => return Err(ImportError::NotAnArray),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut record = match entry {
                Value::Object(record) => record,
                _ => return Err(ImportError::NotAnObject(index)),
            };

            let has_id = record
                .get("id")
                .and_then(Value::as_str)
                .map(|id| !id.trim().is_empty())
                .unwrap_or(false);
            if !has_id {
                return Err(ImportError::MissingId(index));
            }

            upgrade(&mut record);
            serde_json::from_value(Value::Object(record)).map_err(|e| ImportError::InvalidRule {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Serialize a collection as a pretty printed JSON array
pub fn export_rules(rules: &[Rule]) -> Result<String, ImportError> {
    serde_json::to_string_pretty(rules).map_err(|e| ImportError::SerializationError(e.to_string()))
}

/// Result of merging imported rules into a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub rules: Vec<Rule>,
    pub added: usize,
    pub replaced: usize,
}

/// Merge on id: imported rules replace existing rules in place, new ids
/// are appended in file order.
pub fn merge_by_id(existing: &[Rule], imported: Vec<Rule>) -> MergeOutcome {
    let mut rules = existing.to_vec();
    let mut added = 0;
    let mut replaced = 0;

    for rule in imported {
        match rules.iter().position(|r| r.id == rule.id) {
            Some(pos) => {
                rules[pos] = rule;
                replaced += 1;
            }
            None => {
                rules.push(rule);
                added += 1;
            }
        }
    }

    MergeOutcome {
        rules,
        added,
        replaced,
    }
}
