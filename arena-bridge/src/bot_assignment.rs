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

use arena_common::{GameId, PlayerId};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{AssignmentError, SessionError},
    session_index::SessionIndex,
};

/// Creates bot accounts when every known bot is busy.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    async fn create_bot_account(&self) -> anyhow::Result<PlayerId>;
}

/// Lists existing bot accounts, the candidate pool for assignment.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn list_bot_accounts(&self) -> anyhow::Result<Vec<PlayerId>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotLease {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub provisioned: bool,
}

#[derive(Clone)]
pub struct BotAssignmentService {
    sessions: SessionIndex,
    provisioner: Arc<dyn AccountProvisioner>,
}

impl BotAssignmentService {
    pub fn new(sessions: SessionIndex, provisioner: Arc<dyn AccountProvisioner>) -> Self {
        Self {
            sessions,
            provisioner,
        }
    }

    /// Returns a bot from `pool` that is not in any game, or a freshly
    /// provisioned bot when all of them are busy. Does not bind.
    #[instrument(name = "bots.acquire_idle", skip_all, fields(pool = pool.len()))]
    pub async fn acquire_idle_bot(&self, pool: &[PlayerId]) -> Result<PlayerId, AssignmentError> {
        for candidate in shuffled(pool) {
            if self.is_idle(&candidate).await {
                debug!(player_id = %candidate, "selected idle bot");
                return Ok(candidate);
            }
        }
        self.provision().await
    }

    /// Acquires an idle bot and binds it to `game_id` in one step. Losing a
    /// bind race to another node moves on to the next candidate.
    #[instrument(name = "bots.acquire_and_bind", skip_all, fields(game_id = %game_id, pool = pool.len()))]
    pub async fn acquire_and_bind(
        &self,
        pool: &[PlayerId],
        game_id: &GameId,
    ) -> Result<BotLease, AssignmentError> {
        for candidate in shuffled(pool) {
            if !self.is_idle(&candidate).await {
                continue;
            }
            match self.sessions.bind(&candidate, game_id).await {
                Ok(()) => {
                    info!(player_id = %candidate, game_id = %game_id, "bound idle bot to game");
                    return Ok(BotLease {
                        player_id: candidate,
                        game_id: game_id.clone(),
                        provisioned: false,
                    });
                }
                Err(SessionError::AlreadyBound { .. }) => {
                    debug!(player_id = %candidate, "idle bot was claimed concurrently");
                }
                Err(error @ (SessionError::Store(_) | SessionError::Contended { .. })) => {
                    warn!(player_id = %candidate, error = %error, "failed to bind bot; trying next candidate");
                }
                Err(error) => return Err(error.into()),
            }
        }

        let player_id = self.provision().await?;
        self.sessions.bind(&player_id, game_id).await?;
        info!(player_id = %player_id, game_id = %game_id, "bound newly provisioned bot to game");
        Ok(BotLease {
            player_id,
            game_id: game_id.clone(),
            provisioned: true,
        })
    }

    /// Unknown membership counts as busy so a partition never double-books a bot.
    async fn is_idle(&self, candidate: &PlayerId) -> bool {
        match self.sessions.is_bound(candidate).await {
            Ok(bound) => !bound,
            Err(error) => {
                warn!(player_id = %candidate, error = %error, "bot membership unreadable; skipping");
                false
            }
        }
    }

    async fn provision(&self) -> Result<PlayerId, AssignmentError> {
        let player_id = self.provisioner.create_bot_account().await.map_err(|error| {
            warn!(error = %error, "bot account provisioning failed");
            AssignmentError::Provisioning(error)
        })?;
        info!(player_id = %player_id, "provisioned new bot account");
        Ok(player_id)
    }
}

fn shuffled(pool: &[PlayerId]) -> Vec<PlayerId> {
    let mut candidates = pool.to_vec();
    candidates.shuffle(&mut rand::rng());
    candidates
}
