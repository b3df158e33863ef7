//! # Bridge message types
//!
//! Requests sent to the storage worker and the replies it sends back. The
//! JSON shape follows the extension's runtime messages, e.g.
//! `{"type": "SAVE_RULES", "payload": [...], "baseRevision": 3}`.

use rule_engine::{GroupMap, ProfileMap, Rule};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Request handled by the storage worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    /// Overwrite the whole rule collection
    SaveRules {
        payload: Vec<Rule>,
        /// Revision the payload was derived from
        #[serde(rename = "baseRevision", default, skip_serializing_if = "Option::is_none")]
        base_revision: Option<u64>,
    },
    /// Read the whole rule collection
    GetRules,
    /// Read profiles and groups
    GetTargets,
}

impl BridgeMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::SaveRules { .. } => "SAVE_RULES",
            BridgeMessage::GetRules => "GET_RULES",
            BridgeMessage::GetTargets => "GET_TARGETS",
        }
    }
}

/// Rule collection together with the revision it was read at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub rules: Vec<Rule>,
    pub revision: u64,
}

/// Successful worker reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BridgeReply {
    Saved { revision: u64 },
    Rules(RuleSnapshot),
    Targets { profiles: ProfileMap, groups: GroupMap },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::{RuleAction, RuleDraft, RuleId, TargetType, Trigger};
    use serde_json::json;

    #[test]
    fn save_rules_message_matches_runtime_shape() {
        let rule = Rule::with_id(
            RuleId::from("rule_1_a"),
            RuleDraft::new(
                "Night",
                TargetType::Extension,
                ["ext1"],
                RuleAction::Disable,
                Trigger::at("22:00", [0, 6]),
            ),
        );
        let message = BridgeMessage::SaveRules {
            payload: vec![rule],
            base_revision: Some(4),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "SAVE_RULES");
        assert_eq!(value["baseRevision"], 4);
        assert_eq!(value["payload"][0]["targetIds"], json!(["ext1"]));

        let back: BridgeMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, message);
        assert_eq!(back.kind(), "SAVE_RULES");
    }

    #[test]
    fn save_rules_without_revision_is_accepted() {
        let message: BridgeMessage =
            serde_json::from_value(json!({"type": "SAVE_RULES", "payload": []})).unwrap();
        assert_eq!(
            message,
            BridgeMessage::SaveRules { payload: vec![], base_revision: None }
        );
        let get: BridgeMessage = serde_json::from_value(json!({"type": "GET_RULES"})).unwrap();
        assert_eq!(get, BridgeMessage::GetRules);
    }
}
