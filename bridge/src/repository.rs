//! Rule store and target stores over a key-value backend.
//!
//! The rule collection is read and written as a whole; there is no per-rule
//! update. Stored records are migrated to the current schema on load.

use log::{debug, info};
use rule_engine::{rules_from_value, GroupMap, ProfileMap, Rule};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::StorageKeys;
use crate::errors::PersistenceError;
use crate::storage::KeyValueStore;
use crate::types::RuleSnapshot;

/// Typed access to the persisted collections
pub struct RuleRepository<S: KeyValueStore> {
    store: S,
    keys: StorageKeys,
}

impl<S: KeyValueStore> RuleRepository<S> {
    pub fn new(store: S, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Read every rule. A missing key is an empty collection at revision 0.
    pub fn load_all(&self) -> Result<RuleSnapshot, PersistenceError> {
        let key = &self.keys.rules;
        let Some(stored) = self.store.get(key)? else {
            return Ok(RuleSnapshot::default());
        };

        let rules = rules_from_value(stored.value).map_err(|e| PersistenceError::corrupt(key, e))?;
        debug!("loaded {} rules at revision {}", rules.len(), stored.revision);

        Ok(RuleSnapshot {
            rules,
            revision: stored.revision,
        })
    }

    /// Overwrite the rule collection. Returns the new revision.
    pub fn save_all(
        &self,
        rules: &[Rule],
        base_revision: Option<u64>,
    ) -> Result<u64, PersistenceError> {
        let value = serde_json::to_value(rules).map_err(|e| PersistenceError::Corrupt {
            key: self.keys.rules.clone(),
            reason: e.to_string(),
        })?;
        let revision = self.store.put(&self.keys.rules, &value, base_revision)?;
        info!("saved {} rules (revision {})", rules.len(), revision);
        Ok(revision)
    }

    pub fn load_profiles(&self) -> Result<ProfileMap, PersistenceError> {
        self.load_map(&self.keys.profiles)
    }

    pub fn load_groups(&self) -> Result<GroupMap, PersistenceError> {
        self.load_map(&self.keys.groups)
    }

    pub fn save_profiles(&self, profiles: &ProfileMap) -> Result<u64, PersistenceError> {
        self.save_map(&self.keys.profiles, profiles)
    }

    pub fn save_groups(&self, groups: &GroupMap) -> Result<u64, PersistenceError> {
        self.save_map(&self.keys.groups, groups)
    }

    fn load_map<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, PersistenceError> {
        match self.store.get(key)? {
            None => Ok(T::default()),
            Some(stored) if stored.value.is_null() => Ok(T::default()),
            Some(stored) => {
                serde_json::from_value(stored.value).map_err(|e| PersistenceError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn save_map<T: serde::Serialize>(&self, key: &str, map: &T) -> Result<u64, PersistenceError> {
        let value: Value = serde_json::to_value(map).map_err(|e| PersistenceError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.store.put(key, &value, None)?)
    }
}
