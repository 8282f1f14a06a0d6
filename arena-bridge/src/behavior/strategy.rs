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

use std::sync::Arc;

use arena_common::{ActionType, GameAction, PlayerId};
use rand::Rng;

use crate::{config::BotStrategyKind, plan_cache::DecisionPlan, worker_pool::Interrupt};

/// Synchronous bot search. Runs on a blocking worker thread, so it may take as
/// long as it likes but should poll `interrupt` and give up once it is raised.
/// Whatever is left in `plan` afterwards is persisted for the next turn.
pub trait BotStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decide(
        &self,
        snapshot: &serde_json::Value,
        player_id: &PlayerId,
        actions: &[GameAction],
        plan: &mut DecisionPlan,
        interrupt: &Interrupt,
    ) -> Result<usize, String>;
}

pub fn strategy_for(kind: BotStrategyKind, plan_max_depth: usize) -> Arc<dyn BotStrategy> {
    match kind {
        BotStrategyKind::Planning => Arc::new(PlanningStrategy::new(plan_max_depth)),
        BotStrategyKind::Random => Arc::new(RandomStrategy),
    }
}

/// Follows the cached plan while it still fits the offered options, and
/// otherwise ranks the options by kind and writes a fresh plan.
#[derive(Debug, Clone)]
pub struct PlanningStrategy {
    max_depth: usize,
}

impl PlanningStrategy {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    fn priority(action_type: ActionType) -> u8 {
        match action_type {
            ActionType::Discover | ActionType::Battlecry => 5,
            ActionType::PlayCard => 4,
            ActionType::HeroPower => 3,
            ActionType::PhysicalAttack => 2,
            ActionType::Other => 1,
            ActionType::EndTurn => 0,
        }
    }
}

impl BotStrategy for PlanningStrategy {
    fn name(&self) -> &'static str {
        "planning"
    }

    fn decide(
        &self,
        _snapshot: &serde_json::Value,
        _player_id: &PlayerId,
        actions: &[GameAction],
        plan: &mut DecisionPlan,
        interrupt: &Interrupt,
    ) -> Result<usize, String> {
        if actions.is_empty() {
            return Err("no options to choose from".to_string());
        }

        if let Some(next) = plan.peek_next() {
            if usize::try_from(next).is_ok_and(|index| index < actions.len()) {
                plan.pop_next();
                return Ok(next as usize);
            }
            plan.clear();
        }

        let mut ranked: Vec<usize> = Vec::with_capacity(actions.len());
        for index in 0..actions.len() {
            if interrupt.is_raised() {
                return Err("search interrupted".to_string());
            }
            ranked.push(index);
        }
        ranked.sort_by_key(|&index| std::cmp::Reverse(Self::priority(actions[index].action_type)));

        let chosen = ranked[0];
        if actions[chosen].is_end_turn() {
            return Ok(chosen);
        }

        // Taking `chosen` consumes it, so later options shift down by one.
        let follow_up = ranked[1..]
            .iter()
            .map(|&index| if index > chosen { index - 1 } else { index })
            .take(self.max_depth - 1)
            .map(|index| index as i32);
        *plan = DecisionPlan::new(follow_up);
        Ok(chosen)
    }
}

/// Uniform pick. Keeps no plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStrategy;

impl BotStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn decide(
        &self,
        _snapshot: &serde_json::Value,
        _player_id: &PlayerId,
        actions: &[GameAction],
        plan: &mut DecisionPlan,
        _interrupt: &Interrupt,
    ) -> Result<usize, String> {
        if actions.is_empty() {
            return Err("no options to choose from".to_string());
        }
        plan.clear();
        Ok(rand::rng().random_range(0..actions.len()))
    }
}
