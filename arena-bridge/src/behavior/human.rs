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

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use arena_common::{ActionRequest, GameAction, GameId, PlayerId, TraceToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BehaviorSource, SourceKind};
use crate::{
    cancel::CancelToken,
    error::{DecisionFault, SubmitError},
};

/// What a connected client is shown while the server waits on its choice.
#[derive(Debug, Clone, Serialize)]
pub struct ActionPrompt {
    pub prompt_id: String,
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub legal_actions: Vec<GameAction>,
    pub snapshot: serde_json::Value,
    pub trace_id: TraceToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

struct PendingPrompt {
    prompt: ActionPrompt,
    responder: oneshot::Sender<usize>,
}

type PromptKey = (GameId, PlayerId);
type PendingMap = HashMap<PromptKey, PendingPrompt>;

/// Outstanding decision prompts for human players, answered over the network.
#[derive(Clone)]
pub struct HumanSessions {
    pending: Arc<Mutex<PendingMap>>,
    timeout: Duration,
}

impl HumanSessions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        lock_pending(&self.pending)
    }

    pub fn pending_prompt(&self, game_id: &GameId, player_id: &PlayerId) -> Option<ActionPrompt> {
        self.lock()
            .get(&(game_id.clone(), player_id.clone()))
            .map(|pending| pending.prompt.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Delivers the player's choice. An out-of-range index leaves the prompt
    /// open so the client can retry.
    pub fn submit(
        &self,
        game_id: &GameId,
        player_id: &PlayerId,
        prompt_id: &str,
        action_index: usize,
    ) -> Result<(), SubmitError> {
        let key = (game_id.clone(), player_id.clone());
        let mut pending = self.lock();
        let Some(entry) = pending.get(&key) else {
            return Err(SubmitError::NoPendingPrompt {
                game_id: game_id.clone(),
                player_id: player_id.clone(),
            });
        };
        if entry.prompt.prompt_id != prompt_id {
            return Err(SubmitError::StalePrompt {
                prompt_id: prompt_id.to_string(),
            });
        }
        let available = entry.prompt.legal_actions.len();
        if action_index >= available {
            return Err(SubmitError::IllegalChoice {
                index: action_index,
                available,
            });
        }

        let Some(entry) = pending.remove(&key) else {
            return Err(SubmitError::NoPendingPrompt {
                game_id: game_id.clone(),
                player_id: player_id.clone(),
            });
        };
        drop(pending);

        entry
            .responder
            .send(action_index)
            .map_err(|_| SubmitError::NoPendingPrompt {
                game_id: game_id.clone(),
                player_id: player_id.clone(),
            })?;
        info!(game_id = %game_id, player_id = %player_id, action_index, "human decision submitted");
        Ok(())
    }

    /// Withdraws every prompt addressed to `player_id`; their waits fail at once.
    pub fn disconnect(&self, player_id: &PlayerId) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|(_, player), _| player != player_id);
        let withdrawn = before - pending.len();
        if withdrawn > 0 {
            info!(player_id = %player_id, withdrawn, "player disconnected; prompts withdrawn");
        }
        withdrawn
    }

    pub fn release_game(&self, game_id: &GameId) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|(game, _), _| game != game_id);
        before - pending.len()
    }
}

fn lock_pending(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the prompt when the wait ends, unless it was replaced meanwhile.
struct WithdrawOnDrop {
    pending: Arc<Mutex<PendingMap>>,
    key: PromptKey,
    prompt_id: String,
}

impl Drop for WithdrawOnDrop {
    fn drop(&mut self) {
        let mut pending = lock_pending(&self.pending);
        if pending
            .get(&self.key)
            .is_some_and(|entry| entry.prompt.prompt_id == self.prompt_id)
        {
            pending.remove(&self.key);
            debug!(prompt_id = %self.prompt_id, "prompt withdrawn");
        }
    }
}

#[async_trait]
impl BehaviorSource for HumanSessions {
    fn kind(&self) -> SourceKind {
        SourceKind::HumanNetworkSession
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn decide(
        &self,
        request: &ActionRequest,
        trace: &TraceToken,
        _cancel: &CancelToken,
    ) -> Result<usize, DecisionFault> {
        let issued_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(issued_at);
        let prompt = ActionPrompt {
            prompt_id: Uuid::new_v4().to_string(),
            game_id: request.game_id.clone(),
            player_id: request.player_id.clone(),
            legal_actions: request.legal_actions.clone(),
            snapshot: request.snapshot.clone(),
            trace_id: trace.clone(),
            issued_at,
            expires_at,
        };
        let key = (request.game_id.clone(), request.player_id.clone());
        let (responder, choice) = oneshot::channel();

        let _withdraw = WithdrawOnDrop {
            pending: self.pending.clone(),
            key: key.clone(),
            prompt_id: prompt.prompt_id.clone(),
        };
        let prompt_id = prompt.prompt_id.clone();
        let replaced = self
            .lock()
            .insert(key, PendingPrompt { prompt, responder })
            .is_some();
        if replaced {
            warn!(
                game_id = %request.game_id,
                player_id = %request.player_id,
                "replaced an unanswered prompt"
            );
        }
        info!(prompt_id = %prompt_id, options = request.legal_actions.len(), "awaiting human decision");

        choice
            .await
            .map_err(|_| DecisionFault::compute("player session closed before answering"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::MatchCancellation;
    use arena_common::{ActionType, Controller};

    fn request() -> ActionRequest {
        ActionRequest {
            game_id: GameId::new("g-1"),
            player_id: PlayerId::new("alice"),
            controller: Controller::Human,
            snapshot: serde_json::Value::Null,
            legal_actions: vec![
                GameAction::new(ActionType::PlayCard, "frostbolt"),
                GameAction::end_turn(),
            ],
            trace: None,
        }
    }

    async fn wait_for_prompt(sessions: &HumanSessions) -> ActionPrompt {
        let req = request();
        for _ in 0..200 {
            if let Some(prompt) = sessions.pending_prompt(&req.game_id, &req.player_id) {
                return prompt;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("prompt never appeared");
    }

    fn spawn_decide(
        sessions: &HumanSessions,
    ) -> tokio::task::JoinHandle<Result<usize, DecisionFault>> {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            let cancel = MatchCancellation::new().token();
            sessions.decide(&request(), &TraceToken::new("t"), &cancel).await
        })
    }

    #[tokio::test]
    async fn submitted_choice_resumes_the_waiter() {
        let sessions = HumanSessions::new(Duration::from_secs(60));
        let waiter = spawn_decide(&sessions);

        let prompt = wait_for_prompt(&sessions).await;
        assert_eq!(prompt.legal_actions.len(), 2);
        assert!(prompt.expires_at > prompt.issued_at);

        sessions
            .submit(&prompt.game_id, &prompt.player_id, &prompt.prompt_id, 1)
            .unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(1));
        assert_eq!(sessions.pending_count(), 0);
    }

    #[tokio::test]
    async fn submit_validates_prompt_and_index() {
        let sessions = HumanSessions::new(Duration::from_secs(60));
        let waiter = spawn_decide(&sessions);
        let prompt = wait_for_prompt(&sessions).await;

        assert!(matches!(
            sessions.submit(&prompt.game_id, &prompt.player_id, "old-prompt", 0),
            Err(SubmitError::StalePrompt { .. })
        ));
        assert!(matches!(
            sessions.submit(&prompt.game_id, &prompt.player_id, &prompt.prompt_id, 2),
            Err(SubmitError::IllegalChoice { index: 2, available: 2 })
        ));
        assert!(matches!(
            sessions.submit(&prompt.game_id, &PlayerId::new("bob"), &prompt.prompt_id, 0),
            Err(SubmitError::NoPendingPrompt { .. })
        ));

        sessions
            .submit(&prompt.game_id, &prompt.player_id, &prompt.prompt_id, 0)
            .unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(0));
    }

    #[tokio::test]
    async fn disconnect_fails_the_wait_immediately() {
        let sessions = HumanSessions::new(Duration::from_secs(60));
        let waiter = spawn_decide(&sessions);
        wait_for_prompt(&sessions).await;

        assert_eq!(sessions.disconnect(&PlayerId::new("alice")), 1);
        assert!(matches!(
            waiter.await.unwrap(),
            Err(DecisionFault::Compute(_))
        ));
    }

    #[tokio::test]
    async fn abandoned_wait_withdraws_its_prompt() {
        let sessions = HumanSessions::new(Duration::from_secs(60));
        let req = request();
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            sessions.decide(&req, &TraceToken::new("t"), &MatchCancellation::new().token()),
        )
        .await;
        assert!(result.is_err());
        assert!(sessions.pending_prompt(&req.game_id, &req.player_id).is_none());
    }

    #[tokio::test]
    async fn release_game_drops_its_prompts() {
        let sessions = HumanSessions::new(Duration::from_secs(60));
        let waiter = spawn_decide(&sessions);
        wait_for_prompt(&sessions).await;

        assert_eq!(sessions.release_game(&GameId::new("g-1")), 1);
        assert!(waiter.await.unwrap().is_err());
    }
}
