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
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    time::Duration,
};

use arena_common::{ActionRequest, TraceToken};
use async_trait::async_trait;
use tracing::{Instrument, debug, info_span, warn};

use super::{BehaviorSource, SourceKind, strategy::BotStrategy};
use crate::{
    cancel::CancelToken,
    error::DecisionFault,
    plan_cache::DecisionPlanCache,
    worker_pool::{Interrupt, WorkerPool},
};

/// Runs a bot search on the worker pool, seeded from and written back to the
/// shared plan cache.
pub struct BotWorker {
    cache: DecisionPlanCache,
    pool: WorkerPool,
    strategy: Arc<dyn BotStrategy>,
    timeout: Duration,
}

impl BotWorker {
    pub fn new(
        cache: DecisionPlanCache,
        pool: WorkerPool,
        strategy: Arc<dyn BotStrategy>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            pool,
            strategy,
            timeout,
        }
    }
}

#[async_trait]
impl BehaviorSource for BotWorker {
    fn kind(&self) -> SourceKind {
        SourceKind::BotWorker
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn decide(
        &self,
        request: &ActionRequest,
        trace: &TraceToken,
        cancel: &CancelToken,
    ) -> Result<usize, DecisionFault> {
        let interrupt = Interrupt::new();
        // Dropping this call (timeout, cancellation) stops the search early.
        let _stop = interrupt.raise_on_drop();

        let span = info_span!(
            "bot_worker.decide",
            strategy = self.strategy.name(),
            trace_id = %trace,
        );
        let cache = self.cache.clone();
        let pool = self.pool.clone();
        let strategy = self.strategy.clone();
        let game_id = request.game_id.clone();
        let player_id = request.player_id.clone();
        let snapshot = request.snapshot.clone();
        let actions = request.legal_actions.clone();
        let cancel = cancel.clone();

        // Detached so the plan is saved even if the caller stops waiting.
        let search = tokio::spawn(
            async move {
                let plan = cache.load_plan(&game_id).await.unwrap_or_default();
                debug!(plan_len = plan.len(), "starting bot search");

                let run = pool
                    .run(move || {
                        let mut plan = plan;
                        let outcome = catch_unwind(AssertUnwindSafe(|| {
                            strategy.decide(&snapshot, &player_id, &actions, &mut plan, &interrupt)
                        }));
                        (outcome, plan)
                    })
                    .await;
                let (outcome, plan) = match run {
                    Ok(finished) => finished,
                    Err(fault) => return Err(fault),
                };

                // A cancelled match is being torn down; its plan must not outlive it.
                if let Some(reason) = cancel.reason() {
                    debug!(reason = %reason, "match cancelled; plan discarded");
                } else {
                    cache.save_plan(&game_id, &plan).await;
                    if cancel.reason().is_some() {
                        cache.clear(&game_id).await;
                    }
                }

                match outcome {
                    Ok(Ok(index)) => Ok::<usize, DecisionFault>(index),
                    Ok(Err(reason)) => {
                        warn!(reason = %reason, "bot strategy failed");
                        Err(DecisionFault::Compute(reason))
                    }
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        warn!(reason = %reason, "bot strategy panicked");
                        Err(DecisionFault::compute(format!("strategy panicked: {reason}")))
                    }
                }
            }
            .instrument(span),
        );

        match search.await {
            Ok(result) => result,
            Err(error) => Err(DecisionFault::compute(format!("bot search task failed: {error}"))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
