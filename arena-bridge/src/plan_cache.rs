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

//! Per-game cache of a bot's in-progress search trace.
//!
//! This is a best-effort cache shared across nodes. Nothing here ever fails
//! the caller: a missing or unreadable plan just means the bot searches again.

use std::{collections::VecDeque, sync::Arc};

use arena_common::GameId;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::store::{StateStore, StoreKey};

pub const PLAN_NAMESPACE: &str = "bots/index-plans";

/// Ordered option indices still to be played. The front is the next choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionPlan(VecDeque<i32>);

impl DecisionPlan {
    pub fn new(indices: impl IntoIterator<Item = i32>) -> Self {
        Self(indices.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn peek_next(&self) -> Option<i32> {
        self.0.front().copied()
    }

    pub fn pop_next(&mut self) -> Option<i32> {
        self.0.pop_front()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn to_vec(&self) -> Vec<i32> {
        self.0.iter().copied().collect()
    }
}

#[derive(Clone)]
pub struct DecisionPlanCache {
    store: Arc<dyn StateStore>,
}

impl DecisionPlanCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn key(game_id: &GameId) -> StoreKey {
        StoreKey::new(PLAN_NAMESPACE, game_id)
    }

    #[instrument(name = "plan_cache.load", skip_all, fields(game_id = %game_id))]
    pub async fn load_plan(&self, game_id: &GameId) -> Option<DecisionPlan> {
        let raw = match self.store.get(&Self::key(game_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                warn!(game_id = %game_id, error = %error, "plan cache load failed; searching from scratch");
                return None;
            }
        };

        match serde_json::from_slice::<DecisionPlan>(&raw) {
            Ok(plan) if plan.is_empty() => None,
            Ok(plan) => {
                debug!(game_id = %game_id, plan_len = plan.len(), "loaded cached decision plan");
                Some(plan)
            }
            Err(error) => {
                warn!(game_id = %game_id, error = %error, "discarding undecodable decision plan");
                None
            }
        }
    }

    /// Stores the plan, or removes the entry when the plan is empty.
    #[instrument(name = "plan_cache.save", skip_all, fields(game_id = %game_id, plan_len = plan.len()))]
    pub async fn save_plan(&self, game_id: &GameId, plan: &DecisionPlan) {
        let key = Self::key(game_id);
        let result = if plan.is_empty() {
            self.store.remove(&key).await
        } else {
            match serde_json::to_vec(plan) {
                Ok(payload) => self.store.put(&key, payload).await,
                Err(error) => {
                    warn!(game_id = %game_id, error = %error, "failed to encode decision plan");
                    return;
                }
            }
        };

        if let Err(error) = result {
            warn!(game_id = %game_id, error = %error, "plan cache save failed; partial search progress dropped");
        }
    }

    pub async fn clear(&self, game_id: &GameId) {
        self.save_plan(game_id, &DecisionPlan::default()).await;
    }
}
