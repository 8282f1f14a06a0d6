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

//! Decision providers the bridge can suspend on.

mod bot_worker;
mod human;
mod mulligan;
mod strategy;

use std::time::Duration;

use arena_common::{ActionRequest, TraceToken};
use async_trait::async_trait;
use serde::Serialize;

use crate::{cancel::CancelToken, error::DecisionFault};

pub use bot_worker::BotWorker;
pub use human::{ActionPrompt, HumanSessions};
pub use mulligan::{mulligan, mulligan_discards};
pub use strategy::{BotStrategy, PlanningStrategy, RandomStrategy, strategy_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    HumanNetworkSession,
    BotWorker,
}

#[async_trait]
pub trait BehaviorSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Ceiling the bridge enforces on `decide`.
    fn timeout(&self) -> Duration;

    /// Returns an index into `request.legal_actions`. `cancel` fires when the
    /// match is cancelled or released; the bridge stops waiting on its own, so
    /// sources only consult it for work that outlives the call.
    async fn decide(
        &self,
        request: &ActionRequest,
        trace: &TraceToken,
        cancel: &CancelToken,
    ) -> Result<usize, DecisionFault>;
}
