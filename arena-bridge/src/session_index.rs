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

//! Cluster-wide map of which game each player currently occupies.
//!
//! The forward record (player -> game) is authoritative and written with a
//! conditional put. The reverse record (game -> players) is updated with
//! compare-and-swap and cross-checked against forward records on read.

use std::sync::Arc;

use arena_common::{GameId, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    error::SessionError,
    store::{StateStore, StoreKey},
};

pub const PLAYER_NAMESPACE: &str = "sessions/players";
pub const GAME_NAMESPACE: &str = "sessions/games";

const OCCUPANCY_RETRIES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBinding {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub bound_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GameOccupancy {
    players: Vec<PlayerId>,
}

#[derive(Clone)]
pub struct SessionIndex {
    store: Arc<dyn StateStore>,
}

impl SessionIndex {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn player_key(player_id: &PlayerId) -> StoreKey {
        StoreKey::new(PLAYER_NAMESPACE, player_id)
    }

    fn game_key(game_id: &GameId) -> StoreKey {
        StoreKey::new(GAME_NAMESPACE, game_id)
    }

    /// Records that `player_id` is in `game_id`. Fails with `AlreadyBound` if
    /// the player already has a live binding, whichever game it names.
    pub async fn bind(&self, player_id: &PlayerId, game_id: &GameId) -> Result<(), SessionError> {
        let key = Self::player_key(player_id);
        let binding = SessionBinding {
            player_id: player_id.clone(),
            game_id: game_id.clone(),
            bound_at: Utc::now(),
        };
        let payload = encode(&key, &binding)?;

        // A concurrent unbind can land between the failed put and the read, so
        // retry once before reporting the conflict.
        let mut attempts = 0;
        loop {
            attempts += 1;
            if self.store.put_if_absent(&key, payload.clone()).await? {
                break;
            }
            if let Some(existing) = self.binding_of(player_id).await? {
                return Err(SessionError::AlreadyBound {
                    player_id: player_id.clone(),
                    game_id: existing.game_id,
                });
            }
            if attempts >= 2 {
                return Err(SessionError::AlreadyBound {
                    player_id: player_id.clone(),
                    game_id: game_id.clone(),
                });
            }
        }

        let recorded = self
            .update_occupancy(game_id, |occupancy| {
                if !occupancy.players.contains(player_id) {
                    occupancy.players.push(player_id.clone());
                }
            })
            .await;
        if let Err(error) = recorded {
            // Without the reverse record nothing would ever release this binding.
            if let Err(rollback) = self.store.compare_and_swap(&key, Some(payload), None).await {
                warn!(
                    player_id = %player_id,
                    game_id = %game_id,
                    error = %rollback,
                    "failed to roll back session binding"
                );
            }
            return Err(error);
        }

        info!(player_id = %player_id, game_id = %game_id, "session bound");
        Ok(())
    }

    /// Removes the player's binding. Unbinding an unbound player is a no-op.
    pub async fn unbind(&self, player_id: &PlayerId) -> Result<(), SessionError> {
        let Some(binding) = self.binding_of(player_id).await? else {
            debug!(player_id = %player_id, "unbind ignored; player not bound");
            return Ok(());
        };
        self.store.remove(&Self::player_key(player_id)).await?;
        self.prune_occupant(&binding.game_id, player_id).await?;

        info!(player_id = %player_id, game_id = %binding.game_id, "session unbound");
        Ok(())
    }

    pub async fn is_bound(&self, player_id: &PlayerId) -> Result<bool, SessionError> {
        Ok(self.store.contains_key(&Self::player_key(player_id)).await?)
    }

    pub async fn game_of(&self, player_id: &PlayerId) -> Result<Option<GameId>, SessionError> {
        Ok(self
            .binding_of(player_id)
            .await?
            .map(|binding| binding.game_id))
    }

    pub async fn binding_of(
        &self,
        player_id: &PlayerId,
    ) -> Result<Option<SessionBinding>, SessionError> {
        self.read(&Self::player_key(player_id)).await
    }

    /// Players whose live binding names `game_id`.
    pub async fn occupants_of(&self, game_id: &GameId) -> Result<Vec<PlayerId>, SessionError> {
        let occupancy: GameOccupancy = self
            .read(&Self::game_key(game_id))
            .await?
            .unwrap_or_default();

        let mut occupants = Vec::with_capacity(occupancy.players.len());
        for player_id in occupancy.players {
            if self.game_of(&player_id).await?.as_ref() == Some(game_id) {
                occupants.push(player_id);
            }
        }
        Ok(occupants)
    }

    /// Unbinds every occupant of a finished game and drops its reverse record.
    pub async fn release_game(&self, game_id: &GameId) -> Result<Vec<PlayerId>, SessionError> {
        let game_key = Self::game_key(game_id);
        let mut released = Vec::new();
        for _ in 0..OCCUPANCY_RETRIES {
            let Some(raw) = self.store.get(&game_key).await? else {
                info!(game_id = %game_id, released = released.len(), "released game sessions");
                return Ok(released);
            };
            let occupancy: GameOccupancy = decode(&game_key, &raw)?;
            for player_id in occupancy.players {
                if released.contains(&player_id) {
                    continue;
                }
                if self.game_of(&player_id).await?.as_ref() == Some(game_id) {
                    self.store.remove(&Self::player_key(&player_id)).await?;
                    released.push(player_id);
                }
            }
            // A bind that lands meanwhile changes the record and forces another pass.
            if self.store.compare_and_swap(&game_key, Some(raw), None).await? {
                info!(game_id = %game_id, released = released.len(), "released game sessions");
                return Ok(released);
            }
        }
        Err(SessionError::Contended {
            key: game_key.to_string(),
        })
    }

    async fn prune_occupant(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<(), SessionError> {
        self.update_occupancy(game_id, |occupancy| {
            occupancy.players.retain(|entry| entry != player_id);
        })
        .await
    }

    /// Read-modify-write of the reverse record, retried on concurrent change.
    /// An empty record is deleted.
    async fn update_occupancy(
        &self,
        game_id: &GameId,
        edit: impl Fn(&mut GameOccupancy),
    ) -> Result<(), SessionError> {
        let game_key = Self::game_key(game_id);
        for _ in 0..OCCUPANCY_RETRIES {
            let current = self.store.get(&game_key).await?;
            let mut occupancy: GameOccupancy = match &current {
                Some(raw) => decode(&game_key, raw)?,
                None => GameOccupancy::default(),
            };
            edit(&mut occupancy);
            let replacement = if occupancy.players.is_empty() {
                None
            } else {
                Some(encode(&game_key, &occupancy)?)
            };
            if replacement == current {
                return Ok(());
            }
            if self
                .store
                .compare_and_swap(&game_key, current, replacement)
                .await?
            {
                return Ok(());
            }
            debug!(game_id = %game_id, "occupancy changed concurrently; retrying");
        }
        Err(SessionError::Contended {
            key: game_key.to_string(),
        })
    }

    async fn read<T: DeserializeOwned>(&self, key: &StoreKey) -> Result<Option<T>, SessionError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        decode(key, &raw).map(Some)
    }
}

fn decode<T: DeserializeOwned>(key: &StoreKey, raw: &[u8]) -> Result<T, SessionError> {
    serde_json::from_slice(raw).map_err(|error| SessionError::CorruptRecord {
        key: key.to_string(),
        reason: error.to_string(),
    })
}
fn encode<T: Serialize>(key: &StoreKey, value: &T) -> Result<Vec<u8>, SessionError> {
    serde_json::to_vec(value).map_err(|error| SessionError::CorruptRecord {
        key: key.to_string(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{error::StoreError, store::MemoryStore};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Adds latency to every call so concurrent read-modify-writes interleave.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl StateStore for SlowStore {
        async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(key).await
        }

        async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.remove(key).await
        }

        async fn contains_key(&self, key: &StoreKey) -> Result<bool, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.contains_key(key).await
        }

        async fn compare_and_swap(
            &self,
            key: &StoreKey,
            expected: Option<Vec<u8>>,
            replacement: Option<Vec<u8>>,
        ) -> Result<bool, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.compare_and_swap(key, expected, replacement).await
        }
    }

    /// Accepts player records but refuses every write to game records.
    #[derive(Default)]
    pub(crate) struct GameRecordsDown {
        pub(crate) inner: MemoryStore,
    }

    impl GameRecordsDown {
        fn check(key: &StoreKey) -> Result<(), StoreError> {
            if key.as_str().starts_with(GAME_NAMESPACE) {
                return Err(StoreError::unavailable("game shard down"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StateStore for GameRecordsDown {
        async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &StoreKey, value: Vec<u8>) -> Result<(), StoreError> {
            Self::check(key)?;
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &StoreKey) -> Result<(), StoreError> {
            Self::check(key)?;
            self.inner.remove(key).await
        }

        async fn contains_key(&self, key: &StoreKey) -> Result<bool, StoreError> {
            self.inner.contains_key(key).await
        }

        async fn compare_and_swap(
            &self,
            key: &StoreKey,
            expected: Option<Vec<u8>>,
            replacement: Option<Vec<u8>>,
        ) -> Result<bool, StoreError> {
            Self::check(key)?;
            self.inner.compare_and_swap(key, expected, replacement).await
        }
    }

    fn index() -> (Arc<MemoryStore>, SessionIndex) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), SessionIndex::new(store))
    }

    #[tokio::test]
    async fn bind_is_exclusive_until_unbind() {
        let (_, index) = index();
        let player = PlayerId::new("p-1");
        let g1 = GameId::new("g-1");
        let g2 = GameId::new("g-2");

        index.bind(&player, &g1).await.unwrap();
        let err = index.bind(&player, &g2).await.unwrap_err();
        match err {
            SessionError::AlreadyBound { player_id, game_id } => {
                assert_eq!(player_id, player);
                assert_eq!(game_id, g1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(index.game_of(&player).await.unwrap(), Some(g1.clone()));

        index.unbind(&player).await.unwrap();
        index.bind(&player, &g2).await.unwrap();
        assert_eq!(index.game_of(&player).await.unwrap(), Some(g2));
    }

    #[tokio::test]
    async fn rebinding_same_game_is_still_rejected() {
        let (_, index) = index();
        let player = PlayerId::new("p-1");
        let game = GameId::new("g-1");
        index.bind(&player, &game).await.unwrap();
        assert!(matches!(
            index.bind(&player, &game).await,
            Err(SessionError::AlreadyBound { .. })
        ));
    }

    #[tokio::test]
    async fn unbind_is_idempotent() {
        let (_, index) = index();
        let player = PlayerId::new("p-1");
        index.unbind(&player).await.unwrap();
        index.bind(&player, &GameId::new("g")).await.unwrap();
        index.unbind(&player).await.unwrap();
        index.unbind(&player).await.unwrap();
        assert!(!index.is_bound(&player).await.unwrap());
    }

    #[tokio::test]
    async fn occupants_track_bind_and_unbind() {
        let (store, index) = index();
        let game = GameId::new("g-1");
        let alice = PlayerId::new("alice");
        let bot = PlayerId::new("bot-3");

        index.bind(&alice, &game).await.unwrap();
        index.bind(&bot, &game).await.unwrap();
        assert_eq!(
            index.occupants_of(&game).await.unwrap(),
            vec![alice.clone(), bot.clone()]
        );

        index.unbind(&alice).await.unwrap();
        assert_eq!(index.occupants_of(&game).await.unwrap(), vec![bot.clone()]);

        index.unbind(&bot).await.unwrap();
        assert!(index.occupants_of(&game).await.unwrap().is_empty());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn release_game_unbinds_everyone() {
        let (store, index) = index();
        let game = GameId::new("g-1");
        let players = [PlayerId::new("a"), PlayerId::new("b")];
        for player in &players {
            index.bind(player, &game).await.unwrap();
        }

        let released = index.release_game(&game).await.unwrap();
        assert_eq!(released.len(), 2);
        for player in &players {
            assert!(!index.is_bound(player).await.unwrap());
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn occupants_skip_players_rebound_elsewhere() {
        let (store, index) = index();
        let g1 = GameId::new("g-1");
        let g2 = GameId::new("g-2");
        let player = PlayerId::new("p");
        index.bind(&player, &g1).await.unwrap();

        // Simulate another node rewriting the forward record without pruning g-1.
        store.remove(&SessionIndex::player_key(&player)).await.unwrap();
        index.bind(&player, &g2).await.unwrap();

        assert!(index.occupants_of(&g1).await.unwrap().is_empty());
        assert_eq!(index.occupants_of(&g2).await.unwrap(), vec![player]);
    }

    #[tokio::test]
    async fn store_faults_surface_from_bind() {
        let (store, index) = index();
        store.set_unavailable(true);
        let err = index
            .bind(&PlayerId::new("p"), &GameId::new("g"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn concurrent_binds_into_one_game_keep_every_occupant() {
        let index = SessionIndex::new(Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(2),
        }));
        let game = GameId::new("g-race");
        let human = PlayerId::new("human");
        let bot = PlayerId::new("bot");

        let (first, second) = tokio::join!(index.bind(&human, &game), index.bind(&bot, &game));
        first.unwrap();
        second.unwrap();

        let mut occupants = index.occupants_of(&game).await.unwrap();
        occupants.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(occupants, vec![bot.clone(), human.clone()]);

        let released = index.release_game(&game).await.unwrap();
        assert_eq!(released.len(), 2);
        assert!(!index.is_bound(&human).await.unwrap());
        assert!(!index.is_bound(&bot).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_unbinds_leave_no_stale_occupants() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(2),
        });
        let index = SessionIndex::new(store.clone());
        let game = GameId::new("g-leave");
        let players = [PlayerId::new("a"), PlayerId::new("b"), PlayerId::new("c")];
        for player in &players {
            index.bind(player, &game).await.unwrap();
        }

        let (a, b) = tokio::join!(index.unbind(&players[0]), index.unbind(&players[1]));
        a.unwrap();
        b.unwrap();

        assert_eq!(index.occupants_of(&game).await.unwrap(), vec![players[2].clone()]);
        index.unbind(&players[2]).await.unwrap();
        assert_eq!(store.inner.len().await, 0);
    }

    #[tokio::test]
    async fn failed_occupancy_update_rolls_back_the_binding() {
        let store = Arc::new(GameRecordsDown::default());
        let index = SessionIndex::new(store.clone());
        let player = PlayerId::new("bot-1");

        let err = index.bind(&player, &GameId::new("g-1")).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::Unavailable { .. })));
        assert!(!index.is_bound(&player).await.unwrap());
        assert_eq!(store.inner.len().await, 0);
    }
}
