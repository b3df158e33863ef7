//! Read-only snapshot of the entities a rule can address.
//!
//! Extensions come from the platform's management listing, profiles and
//! groups from their own stores. A catalog is assembled fresh on every
//! refresh and never mutated while a validation or evaluation pass runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::rule_metadata::{ExtensionId, GroupName, ProfileId, TargetType};

/// Icon reported by the management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionIcon {
    pub size: u32,
    pub url: String,
}

/// An installed extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub id: ExtensionId,
    pub name: String,
    #[serde(default)]
    pub icons: Vec<ExtensionIcon>,
    /// Current enabled state as reported by the platform
    #[serde(default)]
    pub enabled: bool,
}

impl Extension {
    pub fn new(id: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: ExtensionId::new(id),
            name: name.into(),
            icons: Vec::new(),
            enabled,
        }
    }
}

/// Named snapshot of desired extension states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    #[serde(default)]
    pub extension_states: BTreeMap<ExtensionId, bool>,
}

/// Named set of extensions managed as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: GroupName,
    #[serde(default)]
    pub members: Vec<ExtensionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut_action: Option<String>,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: GroupName::new(name),
            members: members.into_iter().map(|m| ExtensionId::new(m)).collect(),
            shortcut: None,
            shortcut_action: None,
        }
    }
}

/// Profiles as persisted: profile id -> profile
pub type ProfileMap = BTreeMap<String, Profile>;

/// Groups as persisted: group name -> group
pub type GroupMap = BTreeMap<String, Group>;

/// Immutable view of all addressable entities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetCatalog {
    extensions: Vec<Extension>,
    profiles: Vec<Profile>,
    groups: Vec<Group>,
}

impl TargetCatalog {
    /// Assemble a catalog, dropping the host extension from the listing
    pub fn snapshot(
        extensions: Vec<Extension>,
        host_extension_id: Option<&str>,
        profiles: ProfileMap,
        groups: GroupMap,
    ) -> Self {
        let extensions = extensions
            .into_iter()
            .filter(|e| Some(e.id.as_str()) != host_extension_id)
            .collect();
        Self {
            extensions,
            profiles: profiles.into_values().collect(),
            groups: groups.into_values().collect(),
        }
    }

    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = Extension>) -> Self {
        self.extensions.extend(extensions);
        self
    }

    pub fn with_profiles(mut self, profiles: impl IntoIterator<Item = Profile>) -> Self {
        self.profiles.extend(profiles);
        self
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = Group>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn extension(&self, id: &str) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.id.as_str() == id)
    }

    pub fn profile(&self, id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id.as_str() == id)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name.as_str() == name)
    }

    /// Whether `id` names an entity of the given type
    pub fn contains(&self, target_type: TargetType, id: &str) -> bool {
        match target_type {
            TargetType::Extension => self.extension(id).is_some(),
            TargetType::Profile => self.profile(id).is_some(),
            TargetType::Group => self.group(id).is_some(),
        }
    }

    /// Ids from `ids` that do not resolve, deduplicated, in input order
    pub fn unknown_targets(&self, target_type: TargetType, ids: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| !self.contains(target_type, id))
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    /// Display name for a target, falling back to the raw id
    pub fn display_name(&self, target_type: TargetType, id: &str) -> String {
        match target_type {
            TargetType::Extension => self.extension(id).map(|e| e.name.clone()),
            TargetType::Profile => self.profile(id).map(|p| p.name.clone()),
            TargetType::Group => self.group(id).map(|g| g.name.to_string()),
        }
        .unwrap_or_else(|| id.to_string())
    }
}
