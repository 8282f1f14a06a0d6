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

//! Turn decision bridge and bot coordination for the arena match runner.

pub mod behavior;
pub mod bot_assignment;
pub mod bridge;
pub mod cancel;
pub mod config;
pub mod error;
pub mod plan_cache;
pub mod recovery;
pub mod session_index;
pub mod store;
pub mod worker_pool;

pub use behavior::{
    ActionPrompt, BehaviorSource, BotStrategy, BotWorker, HumanSessions, PlanningStrategy,
    RandomStrategy, SourceKind, mulligan, mulligan_discards,
};
pub use bot_assignment::{AccountDirectory, AccountProvisioner, BotAssignmentService, BotLease};
pub use bridge::{ActionBridge, BridgePhase};
pub use cancel::{CancelToken, MatchCancellation};
pub use config::{BotStrategyKind, BridgeConfig};
pub use error::{
    AssignmentError, BridgeError, ConfigError, DecisionFault, SessionError, StoreError,
    SubmitError,
};
pub use plan_cache::{DecisionPlan, DecisionPlanCache};
pub use session_index::{SessionBinding, SessionIndex};
pub use store::{DynamoStore, MemoryStore, StateStore, StoreKey};
