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

use std::time::Duration;

use arena_common::{CancelReason, GameId, PlayerId};

/// Failure of the cluster-wide key/value store. Always transient.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("player {player_id} is already bound to game {game_id}")]
    AlreadyBound { player_id: PlayerId, game_id: GameId },

    #[error("corrupt session record for {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("session record {key} kept changing; gave up")]
    Contended { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Provisioning(#[from] anyhow::Error),
}

/// Why a decision provider did not produce an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionFault {
    #[error("decision timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("decision cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("decision provider failed: {0}")]
    Compute(String),
}

impl DecisionFault {
    pub fn compute(reason: impl Into<String>) -> Self {
        Self::Compute(reason.into())
    }
}

/// Errors surfaced to the rules engine. Everything else is recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("match {game_id} was cancelled: {reason}")]
    Cancelled { game_id: GameId, reason: CancelReason },

    #[error("request for match {game_id} carried no legal actions")]
    NoLegalActions { game_id: GameId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("no decision is pending for player {player_id} in game {game_id}")]
    NoPendingPrompt { game_id: GameId, player_id: PlayerId },

    #[error("prompt {prompt_id} is no longer current")]
    StalePrompt { prompt_id: String },

    #[error("action index {index} is outside the {available} legal actions")]
    IllegalChoice { index: usize, available: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SessionError::AlreadyBound {
            player_id: PlayerId::new("bot-1"),
            game_id: GameId::new("g-9"),
        };
        assert_eq!(err.to_string(), "player bot-1 is already bound to game g-9");

        let err = DecisionFault::Cancelled(CancelReason::ServerDrain);
        assert_eq!(err.to_string(), "decision cancelled: server_drain");

        let err = StoreError::unavailable("no quorum");
        assert_eq!(err.to_string(), "store unavailable: no quorum");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
        assert_send_sync::<SessionError>();
        assert_send_sync::<AssignmentError>();
        assert_send_sync::<BridgeError>();
        assert_send_sync::<DecisionFault>();
    }
}
