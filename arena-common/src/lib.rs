// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_BOT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_BOT_THINKING_DELAY_MS: u64 = 0;
pub const DEFAULT_PLAN_MAX_DEPTH: usize = 8;
/// Bots keep opening-hand cards up to this base mana cost.
pub const MULLIGAN_MAX_KEPT_COST: u32 = 3;

/// Opaque handle for one running match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

/// Opaque handle for a human or bot account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(GameId);
string_id!(PlayerId);

/// Correlation token threaded through every decision request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceToken(String);

impl TraceToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Human,
    Bot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    EndTurn,
    PlayCard,
    PhysicalAttack,
    HeroPower,
    Discover,
    Battlecry,
    Other,
}

/// One option offered by the rules engine. This layer never builds these; it
/// only hands one of them back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl GameAction {
    pub fn new(action_type: ActionType, label: impl Into<String>) -> Self {
        Self {
            action_type,
            label: label.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn end_turn() -> Self {
        Self::new(ActionType::EndTurn, "end turn")
    }

    pub fn is_end_turn(&self) -> bool {
        self.action_type == ActionType::EndTurn
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub controller: Controller,
    #[serde(default)]
    pub snapshot: serde_json::Value,
    pub legal_actions: Vec<GameAction>,
    #[serde(default)]
    pub trace: Option<TraceToken>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Decided,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub action_index: usize,
    pub action: GameAction,
    pub resolution: Resolution,
    pub trace: TraceToken,
}

impl ActionResponse {
    /// Builds the response by copying `legal_actions[index]` out of the request.
    /// Returns `None` when the index is out of range.
    pub fn pick(
        request: &ActionRequest,
        index: usize,
        resolution: Resolution,
        trace: TraceToken,
    ) -> Option<Self> {
        let action = request.legal_actions.get(index)?.clone();
        Some(Self {
            game_id: request.game_id.clone(),
            player_id: request.player_id.clone(),
            action_index: index,
            action,
            resolution,
            trace,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    MatchEnded,
    Forfeit,
    ServerDrain,
    Requested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::MatchEnded => "match_ended",
            Self::Forfeit => "forfeit",
            Self::ServerDrain => "server_drain",
            Self::Requested => "requested",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchEventType {
    MatchStarted,
    MatchFinished,
    MatchAborted,
}

/// Lifecycle event published by the match runner on its output topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvent {
    pub game_id: GameId,
    pub event_type: MatchEventType,
    #[serde(default)]
    pub players: Vec<PlayerId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulliganCard {
    pub card_id: String,
    pub base_mana_cost: u32,
}

/// Opening hand offered to a bot seat before the first turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulliganRequest {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub cards: Vec<MulliganCard>,
    #[serde(default)]
    pub trace: Option<TraceToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulliganResponse {
    pub discarded: Vec<MulliganCard>,
    pub trace: TraceToken,
}

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

pub fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
}

pub fn parse_env_bool(var_name: &str, default: bool) -> bool {
    std::env::var(var_name)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            if normalized.is_empty() {
                default
            } else {
                !matches!(normalized.as_str(), "0" | "false" | "no" | "off")
            }
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(actions: Vec<GameAction>) -> ActionRequest {
        ActionRequest {
            game_id: GameId::new("g-1"),
            player_id: PlayerId::new("p-1"),
            controller: Controller::Bot,
            snapshot: serde_json::Value::Null,
            legal_actions: actions,
            trace: None,
        }
    }

    #[test]
    fn pick_copies_the_indexed_legal_action() {
        let req = request(vec![
            GameAction::new(ActionType::PlayCard, "fireball"),
            GameAction::end_turn(),
        ]);
        let response =
            ActionResponse::pick(&req, 1, Resolution::Decided, TraceToken::new("t")).unwrap();
        assert_eq!(response.action_index, 1);
        assert_eq!(response.action, req.legal_actions[1]);
        assert_eq!(response.game_id.as_str(), "g-1");
    }

    #[test]
    fn pick_rejects_out_of_range_index() {
        let req = request(vec![GameAction::end_turn()]);
        assert!(ActionResponse::pick(&req, 3, Resolution::Decided, TraceToken::new("t")).is_none());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let encoded = serde_json::to_string(&GameId::new("abc")).unwrap();
        assert_eq!(encoded, "\"abc\"");
        let decoded: PlayerId = serde_json::from_str("\"bot-7\"").unwrap();
        assert_eq!(decoded, PlayerId::new("bot-7"));
    }

    #[test]
    fn action_request_defaults_optional_fields() {
        let raw = r#"{
            "game_id": "g",
            "player_id": "p",
            "controller": "human",
            "legal_actions": [{"action_type": "END_TURN"}]
        }"#;
        let parsed: ActionRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.controller, Controller::Human);
        assert!(parsed.trace.is_none());
        assert!(parsed.legal_actions[0].is_end_turn());
        assert!(parsed.snapshot.is_null());
    }

    #[test]
    fn generated_trace_tokens_are_unique() {
        assert_ne!(TraceToken::generate(), TraceToken::generate());
    }

    #[test]
    fn normalize_optional_string_drops_blank_values() {
        assert_eq!(normalize_optional_string(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional_string(Some(" v1 ".to_string())),
            Some("v1".to_string())
        );
        assert_eq!(normalize_optional_string(None), None);
    }

    #[test]
    fn expand_env_vars_replaces_unset_with_empty() {
        let expanded = expand_env_vars("key=${ARENA_COMMON_SURELY_UNSET_VAR};");
        assert_eq!(expanded, "key=;");
    }
}
