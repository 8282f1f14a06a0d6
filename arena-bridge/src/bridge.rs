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

//! Suspends a turn on a decision provider and resumes it with exactly one
//! legal action, or with a cancellation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use arena_common::{
    ActionRequest, ActionResponse, CancelReason, Controller, GameId, Resolution, TraceToken,
};
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    behavior::{BehaviorSource, BotWorker, HumanSessions, SourceKind, strategy_for},
    cancel::{CancelToken, MatchCancellation},
    config::BridgeConfig,
    error::{BridgeError, DecisionFault},
    plan_cache::DecisionPlanCache,
    recovery,
    store::StateStore,
    worker_pool::WorkerPool,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgePhase {
    Idle,
    AwaitingDecision,
    Resolved,
    Faulted,
}

#[derive(Default)]
struct MatchEntry {
    cancellation: MatchCancellation,
    phase: Option<BridgePhase>,
    last_outcome: Option<BridgePhase>,
}

pub struct ActionBridge {
    human: Arc<dyn BehaviorSource>,
    bot: Arc<dyn BehaviorSource>,
    plan_cache: DecisionPlanCache,
    thinking_delay: Duration,
    matches: Mutex<HashMap<GameId, MatchEntry>>,
}

impl ActionBridge {
    pub fn new(
        human: Arc<dyn BehaviorSource>,
        bot: Arc<dyn BehaviorSource>,
        plan_cache: DecisionPlanCache,
        thinking_delay: Duration,
    ) -> Self {
        Self {
            human,
            bot,
            plan_cache,
            thinking_delay,
            matches: Mutex::new(HashMap::new()),
        }
    }

    /// Wires the standard providers: `humans` for human seats and a
    /// `BotWorker` running the configured strategy for bot seats.
    pub fn from_config(
        config: &BridgeConfig,
        store: Arc<dyn StateStore>,
        humans: HumanSessions,
    ) -> Self {
        let plan_cache = DecisionPlanCache::new(store);
        let bot = BotWorker::new(
            plan_cache.clone(),
            WorkerPool::new(config.worker_pool_size),
            strategy_for(config.strategy, config.plan_max_depth),
            config.bot_decision_timeout,
        );
        Self::new(
            Arc::new(humans),
            Arc::new(bot),
            plan_cache,
            config.bot_thinking_delay,
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GameId, MatchEntry>> {
        self.matches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn source_for(&self, controller: Controller) -> &Arc<dyn BehaviorSource> {
        match controller {
            Controller::Human => &self.human,
            Controller::Bot => &self.bot,
        }
    }

    /// Returns one element of `request.legal_actions`, or `Cancelled` when
    /// the match is cancelled first. Provider faults never escape.
    pub async fn request_action(
        &self,
        request: ActionRequest,
    ) -> Result<ActionResponse, BridgeError> {
        let trace = request.trace.clone().unwrap_or_else(TraceToken::generate);
        let span = info_span!(
            "bridge.request_action",
            game_id = %request.game_id,
            player_id = %request.player_id,
            trace_id = %trace,
            controller = ?request.controller,
        );
        self.resolve(request, trace).instrument(span).await
    }

    async fn resolve(
        &self,
        request: ActionRequest,
        trace: TraceToken,
    ) -> Result<ActionResponse, BridgeError> {
        if request.legal_actions.is_empty() {
            warn!("decision requested with no legal actions");
            return Err(BridgeError::NoLegalActions {
                game_id: request.game_id,
            });
        }

        let mut token = self.begin(&request.game_id)?;
        let search_token = token.clone();
        let source = self.source_for(request.controller).clone();
        let limit = source.timeout();
        let started = Instant::now();
        debug!(
            source = ?source.kind(),
            timeout_ms = limit.as_millis() as u64,
            options = request.legal_actions.len(),
            "dispatching decision"
        );

        let outcome = tokio::select! {
            biased;
            reason = token.cancelled() => Err(DecisionFault::Cancelled(reason)),
            result = tokio::time::timeout(limit, source.decide(&request, &trace, &search_token)) => {
                result.unwrap_or(Err(DecisionFault::Timeout { after: limit }))
            }
        };

        // Closing a match also tears down its prompts, so a provider fault
        // observed after cancellation is reported as the cancellation.
        let outcome = match (outcome, token.reason()) {
            (Err(DecisionFault::Cancelled(reason)), _) | (Err(_), Some(reason)) => {
                Err(DecisionFault::Cancelled(reason))
            }
            (outcome, _) => outcome,
        };

        let outcome = match outcome {
            Ok(index) if source.kind() == SourceKind::BotWorker => self
                .pace(started, &mut token)
                .await
                .map(|()| index)
                .map_err(DecisionFault::Cancelled),
            other => other,
        };

        let response = outcome.and_then(|index| {
            ActionResponse::pick(&request, index, Resolution::Decided, trace.clone()).ok_or_else(
                || {
                    DecisionFault::compute(format!(
                        "provider chose index {index} of {} options",
                        request.legal_actions.len()
                    ))
                },
            )
        });

        match response {
            Ok(response) => {
                self.finish(&request.game_id, BridgePhase::Resolved);
                info!(
                    action_index = response.action_index,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "decision resolved"
                );
                Ok(response)
            }
            Err(fault) => {
                self.finish(&request.game_id, BridgePhase::Faulted);
                recovery::recover(&fault, &request, trace)
            }
        }
    }

    /// Registers the pending decision, refusing matches already cancelled.
    fn begin(&self, game_id: &GameId) -> Result<CancelToken, BridgeError> {
        let mut matches = self.lock();
        let entry = matches.entry(game_id.clone()).or_default();
        if let Some(reason) = entry.cancellation.reason() {
            return Err(BridgeError::Cancelled {
                game_id: game_id.clone(),
                reason,
            });
        }
        entry.phase = Some(BridgePhase::AwaitingDecision);
        Ok(entry.cancellation.token())
    }

    /// Holds a successful bot decision until the thinking delay has elapsed
    /// since dispatch.
    async fn pace(&self, started: Instant, token: &mut CancelToken) -> Result<(), CancelReason> {
        let remaining = self.thinking_delay.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(remaining) => Ok(()),
            reason = token.cancelled() => Err(reason),
        }
    }

    /// Passes through `outcome` (`Resolved` or `Faulted`) back to `Idle`.
    fn finish(&self, game_id: &GameId, outcome: BridgePhase) {
        if let Some(entry) = self.lock().get_mut(game_id) {
            entry.last_outcome = Some(outcome);
            entry.phase = Some(BridgePhase::Idle);
        }
        debug!(outcome = ?outcome, "decision finished; match idle");
    }

    pub fn phase_of(&self, game_id: &GameId) -> BridgePhase {
        self.lock()
            .get(game_id)
            .and_then(|entry| entry.phase)
            .unwrap_or(BridgePhase::Idle)
    }

    /// How the match's most recent decision ended, if it has had one.
    pub fn last_outcome(&self, game_id: &GameId) -> Option<BridgePhase> {
        self.lock().get(game_id).and_then(|entry| entry.last_outcome)
    }

    /// Fails every in-flight and future request for the match with
    /// `Cancelled` until `release_match` is called. Returns false if the
    /// match was already cancelled.
    pub fn cancel_match(&self, game_id: &GameId, reason: CancelReason) -> bool {
        let fired = self
            .lock()
            .entry(game_id.clone())
            .or_default()
            .cancellation
            .cancel(reason);
        if fired {
            info!(game_id = %game_id, reason = %reason, "match cancelled");
        }
        fired
    }

    /// Forgets the match and drops its cached bot plan. Anything still in
    /// flight for the match observes a `MatchEnded` cancellation.
    pub async fn release_match(&self, game_id: &GameId) {
        let entry = self.lock().remove(game_id);
        let removed = entry.is_some();
        if let Some(entry) = entry {
            entry.cancellation.cancel(CancelReason::MatchEnded);
        }
        self.plan_cache.clear(game_id).await;
        debug!(game_id = %game_id, removed, "match released");
    }

    pub fn tracked_matches(&self) -> usize {
        self.lock().len()
    }
}
