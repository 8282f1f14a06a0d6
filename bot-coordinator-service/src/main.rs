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

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use arena_bridge::{
    AccountDirectory, AccountProvisioner, ActionBridge, ActionPrompt, AssignmentError,
    BotAssignmentService, BotLease, BridgeConfig, BridgeError, DynamoStore, HumanSessions,
    MemoryStore, SessionBinding, SessionError, SessionIndex, StateStore, SubmitError, mulligan,
};
use arena_common::{
    ActionRequest, ActionResponse, CancelReason, GameId, MatchEvent, MatchEventType,
    MulliganRequest, MulliganResponse, PlayerId, parse_env_bool,
};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rdkafka::{
    Message,
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    bridge: Arc<ActionBridge>,
    humans: HumanSessions,
    sessions: SessionIndex,
    assignment: BotAssignmentService,
    directory: Arc<dyn AccountDirectory>,
}

#[derive(Clone)]
struct AccountsClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone)]
struct MatchEventConsumerConfig {
    bootstrap_servers: String,
    topic_prefix: String,
    group_id: String,
}

#[derive(Debug, Deserialize)]
struct DecisionSubmission {
    prompt_id: String,
    action_index: usize,
}

#[derive(Debug, Serialize)]
struct DecisionAccepted {
    accepted: bool,
    prompt_id: String,
    action_index: usize,
}

#[derive(Debug, Default, Deserialize)]
struct CancelMatchRequest {
    #[serde(default)]
    reason: Option<CancelReason>,
}

#[derive(Debug, Serialize)]
struct CancelMatchResponse {
    game_id: GameId,
    cancelled: bool,
    reason: CancelReason,
    withdrawn_prompts: usize,
}

#[derive(Debug, Default, Deserialize)]
struct AcquireBotRequest {
    #[serde(default)]
    candidate_ids: Option<Vec<PlayerId>>,
}

#[derive(Debug, Serialize)]
struct OccupantsResponse {
    game_id: GameId,
    players: Vec<PlayerId>,
}

#[derive(Debug, Deserialize)]
struct BindSessionRequest {
    player_id: PlayerId,
    game_id: GameId,
}

#[derive(Debug, Serialize)]
struct UnbindSessionResponse {
    player_id: PlayerId,
    unbound: bool,
    withdrawn_prompts: usize,
}

#[derive(Debug, Deserialize)]
struct BotAccountSummary {
    player_id: PlayerId,
}

#[derive(Debug, Serialize)]
struct CreateBotAccountRequest {
    display_name: String,
    email: String,
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct CreateBotAccountResponse {
    player_id: PlayerId,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "bot_coordinator_service=debug,arena_bridge=debug,tower_http=info".to_string()
        }))
        .init();

    let config = BridgeConfig::from_env();
    let store: Arc<dyn StateStore> = match DynamoStore::from_env().await {
        Some(store) => Arc::new(store),
        None => {
            warn!("no cluster store configured; bridge state is local to this node");
            Arc::new(MemoryStore::new())
        }
    };
    let accounts = Arc::new(AccountsClient::from_env());
    let state = build_state(&config, store, accounts.clone(), accounts);
    info!(
        bot_thinking_delay_ms = config.bot_thinking_delay.as_millis() as u64,
        bot_decision_timeout_ms = config.bot_decision_timeout.as_millis() as u64,
        network_decision_timeout_ms = config.network_decision_timeout.as_millis() as u64,
        worker_pool_size = config.worker_pool_size,
        strategy = ?config.strategy,
        "bot-coordinator loaded bridge config"
    );

    if parse_env_bool("BOT_COORDINATOR_MOCK_KAFKA", false) {
        info!("BOT_COORDINATOR_MOCK_KAFKA set; match event consumer disabled");
    } else {
        let consumer_state = state.clone();
        let consumer_config = MatchEventConsumerConfig::from_env();
        tokio::spawn(async move {
            if let Err(error) = run_match_event_consumer(consumer_state, consumer_config).await {
                warn!(error = %error, "bot-coordinator match event consumer stopped");
            }
        });
    }

    let app = build_router(state);
    let bind_addr = parse_bind_addr("BOT_COORDINATOR_BIND", "0.0.0.0:8092")?;
    info!(%bind_addr, "bot-coordinator-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(
    config: &BridgeConfig,
    store: Arc<dyn StateStore>,
    directory: Arc<dyn AccountDirectory>,
    provisioner: Arc<dyn AccountProvisioner>,
) -> AppState {
    let humans = HumanSessions::new(config.network_decision_timeout);
    let sessions = SessionIndex::new(store.clone());
    AppState {
        bridge: Arc::new(ActionBridge::from_config(config, store, humans.clone())),
        humans,
        assignment: BotAssignmentService::new(sessions.clone(), provisioner),
        sessions,
        directory,
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/internal/v3/games/{game_id}/actions",
            post(request_action_handler),
        )
        .route(
            "/internal/v3/games/{game_id}/players/{player_id}/prompt",
            get(get_prompt_handler),
        )
        .route(
            "/internal/v3/games/{game_id}/players/{player_id}/decision",
            post(submit_decision_handler),
        )
        .route(
            "/internal/v3/games/{game_id}/players/{player_id}/mulligan",
            post(mulligan_handler),
        )
        .route(
            "/internal/v3/games/{game_id}/cancel",
            post(cancel_match_handler),
        )
        .route(
            "/internal/v3/games/{game_id}/bots/acquire",
            post(acquire_bot_handler),
        )
        .route(
            "/internal/v3/games/{game_id}/occupants",
            get(occupants_handler),
        )
        .route("/internal/v3/sessions", post(bind_session_handler))
        .route(
            "/internal/v3/sessions/{player_id}",
            get(get_session_handler).delete(unbind_session_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

impl AccountsClient {
    fn from_env() -> Self {
        let base_url = std::env::var("ACCOUNTS_BASE_URL")
            .ok()
            .unwrap_or_else(|| "http://account-service:8080".to_string());

        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn error_body(response: reqwest::Response) -> String {
        response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_string())
    }
}

#[async_trait]
impl AccountDirectory for AccountsClient {
    async fn list_bot_accounts(&self) -> anyhow::Result<Vec<PlayerId>> {
        let response = self
            .client
            .get(self.endpoint("internal/v3/accounts"))
            .query(&[("bot", "true")])
            .send()
            .await
            .context("failed to call account service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = Self::error_body(response).await;
            anyhow::bail!("account service returned {status}: {body}");
        }

        let accounts = response
            .json::<Vec<BotAccountSummary>>()
            .await
            .context("invalid bot account listing")?;
        Ok(accounts.into_iter().map(|account| account.player_id).collect())
    }
}

#[async_trait]
impl AccountProvisioner for AccountsClient {
    async fn create_bot_account(&self) -> anyhow::Result<PlayerId> {
        let suffix = Uuid::new_v4().simple().to_string();
        let payload = CreateBotAccountRequest {
            display_name: format!("Bot-{}", &suffix[..8]),
            email: format!("bot-{suffix}@bots.arena.local"),
            bot: true,
        };
        let response = self
            .client
            .post(self.endpoint("internal/v3/accounts/bots"))
            .json(&payload)
            .send()
            .await
            .context("failed to call account service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = Self::error_body(response).await;
            anyhow::bail!("bot account creation returned {status}: {body}");
        }

        let created = response
            .json::<CreateBotAccountResponse>()
            .await
            .context("invalid bot account creation response")?;
        Ok(created.player_id)
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "service": "bot-coordinator-service"}))
}

async fn request_action_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    if request.game_id != game_id {
        return Err(ApiError::bad_request(format!(
            "request game_id {} does not match path {}",
            request.game_id, game_id
        )));
    }
    let response = state.bridge.request_action(request).await?;
    Ok(Json(response))
}

async fn mulligan_handler(
    Path((game_id, player_id)): Path<(GameId, PlayerId)>,
    Json(request): Json<MulliganRequest>,
) -> Result<Json<MulliganResponse>, ApiError> {
    if request.game_id != game_id || request.player_id != player_id {
        return Err(ApiError::bad_request(format!(
            "mulligan for {}/{} does not match path {}/{}",
            request.game_id, request.player_id, game_id, player_id
        )));
    }
    Ok(Json(mulligan(&request)))
}

async fn get_prompt_handler(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(GameId, PlayerId)>,
) -> Result<Json<ActionPrompt>, ApiError> {
    state
        .humans
        .pending_prompt(&game_id, &player_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "no pending prompt for player {player_id} in game {game_id}"
            ))
        })
}

async fn submit_decision_handler(
    State(state): State<AppState>,
    Path((game_id, player_id)): Path<(GameId, PlayerId)>,
    Json(request): Json<DecisionSubmission>,
) -> Result<Json<DecisionAccepted>, ApiError> {
    state.humans.submit(
        &game_id,
        &player_id,
        &request.prompt_id,
        request.action_index,
    )?;
    Ok(Json(DecisionAccepted {
        accepted: true,
        prompt_id: request.prompt_id,
        action_index: request.action_index,
    }))
}

async fn cancel_match_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<CancelMatchRequest>,
) -> Result<Json<CancelMatchResponse>, ApiError> {
    let reason = request.reason.unwrap_or(CancelReason::Requested);
    let cancelled = state.bridge.cancel_match(&game_id, reason);
    let withdrawn_prompts = state.humans.release_game(&game_id);
    Ok(Json(CancelMatchResponse {
        game_id,
        cancelled,
        reason,
        withdrawn_prompts,
    }))
}

async fn acquire_bot_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(request): Json<AcquireBotRequest>,
) -> Result<Json<BotLease>, ApiError> {
    let pool = match request.candidate_ids {
        Some(candidates) => candidates,
        None => state.directory.list_bot_accounts().await.map_err(|error| {
            ApiError::bad_gateway(format!("bot account listing failed: {error:#}"))
        })?,
    };
    let lease = state.assignment.acquire_and_bind(&pool, &game_id).await?;
    Ok(Json(lease))
}

async fn occupants_handler(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<OccupantsResponse>, ApiError> {
    let players = state.sessions.occupants_of(&game_id).await?;
    Ok(Json(OccupantsResponse { game_id, players }))
}

async fn bind_session_handler(
    State(state): State<AppState>,
    Json(request): Json<BindSessionRequest>,
) -> Result<Json<SessionBinding>, ApiError> {
    state
        .sessions
        .bind(&request.player_id, &request.game_id)
        .await?;
    state
        .sessions
        .binding_of(&request.player_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::conflict("binding vanished before it could be read"))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(player_id): Path<PlayerId>,
) -> Result<Json<SessionBinding>, ApiError> {
    state
        .sessions
        .binding_of(&player_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("player {player_id} is not in a game")))
}

async fn unbind_session_handler(
    State(state): State<AppState>,
    Path(player_id): Path<PlayerId>,
) -> Result<Json<UnbindSessionResponse>, ApiError> {
    state.sessions.unbind(&player_id).await?;
    let withdrawn_prompts = state.humans.disconnect(&player_id);
    Ok(Json(UnbindSessionResponse {
        player_id,
        unbound: true,
        withdrawn_prompts,
    }))
}

impl MatchEventConsumerConfig {
    fn from_env() -> Self {
        Self {
            bootstrap_servers: std::env::var("KAFKA_BOOTSTRAP_SERVERS")
                .ok()
                .unwrap_or_else(|| "kafka:9092".to_string()),
            topic_prefix: std::env::var("MATCH_EVENT_TOPIC_PREFIX")
                .ok()
                .unwrap_or_else(|| "match.events".to_string()),
            group_id: std::env::var("BOT_COORDINATOR_CONSUMER_GROUP_ID")
                .ok()
                .unwrap_or_else(|| "bot-coordinator-v3".to_string()),
        }
    }

    fn topic_pattern(&self) -> String {
        format!("^{}\\..*\\.v1$", self.topic_prefix.replace('.', "\\."))
    }
}

async fn run_match_event_consumer(
    state: AppState,
    config: MatchEventConsumerConfig,
) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("topic.metadata.refresh.interval.ms", "1000")
        .create()
        .context("failed to create bot-coordinator Kafka consumer")?;

    let pattern = config.topic_pattern();
    consumer
        .subscribe(&[&pattern])
        .context("failed to subscribe match event topic pattern")?;

    info!(
        pattern = %pattern,
        group_id = %config.group_id,
        "bot-coordinator subscribed to match event topics"
    );

    loop {
        let message = match consumer.recv().await {
            Ok(message) => message,
            Err(error) => {
                warn!(?error, "bot-coordinator kafka recv error");
                tokio::time::sleep(Duration::from_millis(300)).await;
                continue;
            }
        };

        let Some(payload) = message.payload() else {
            let _ = consumer.commit_message(&message, CommitMode::Async);
            continue;
        };

        match serde_json::from_slice::<MatchEvent>(payload) {
            Ok(event) => {
                if let Some(reason) = closing_reason(event.event_type) {
                    let released =
                        close_match(&state, &event.game_id, reason, &event.players).await;
                    info!(
                        game_id = %event.game_id,
                        event_type = ?event.event_type,
                        released_players = released,
                        "bot-coordinator closed match"
                    );
                }
            }
            Err(error) => {
                warn!(?error, "bot-coordinator failed to parse match event");
            }
        }

        if let Err(error) = consumer.commit_message(&message, CommitMode::Async) {
            warn!(?error, "bot-coordinator failed to commit message");
        }
    }
}

fn closing_reason(event_type: MatchEventType) -> Option<CancelReason> {
    match event_type {
        MatchEventType::MatchStarted => None,
        MatchEventType::MatchFinished => Some(CancelReason::MatchEnded),
        MatchEventType::MatchAborted => Some(CancelReason::Requested),
    }
}

/// Fails in-flight decisions, drops bridge state and unbinds every occupant,
/// including any `players` named by the event that are still bound to the
/// match. Returns how many players were released.
async fn close_match(
    state: &AppState,
    game_id: &GameId,
    reason: CancelReason,
    players: &[PlayerId],
) -> usize {
    state.bridge.cancel_match(game_id, reason);
    state.humans.release_game(game_id);
    state.bridge.release_match(game_id).await;
    let mut released = match state.sessions.release_game(game_id).await {
        Ok(players) => players.len(),
        Err(error) => {
            warn!(game_id = %game_id, error = %error, "failed to release match sessions");
            0
        }
    };

    for player_id in players {
        match state.sessions.game_of(player_id).await {
            Ok(Some(bound)) if &bound == game_id => {
                match state.sessions.unbind(player_id).await {
                    Ok(()) => released += 1,
                    Err(error) => {
                        warn!(player_id = %player_id, error = %error, "failed to unbind match player");
                    }
                }
            }
            Ok(_) => {}
            Err(error) => {
                warn!(player_id = %player_id, error = %error, "failed to read match player binding");
            }
        }
    }
    released
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Cancelled { .. } => Self::conflict(error.to_string()),
            BridgeError::NoLegalActions { .. } => Self::bad_request(error.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::NoPendingPrompt { .. } => Self::not_found(error.to_string()),
            SubmitError::StalePrompt { .. } => Self::conflict(error.to_string()),
            SubmitError::IllegalChoice { .. } => Self::bad_request(error.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::AlreadyBound { .. } => Self::conflict(error.to_string()),
            SessionError::CorruptRecord { .. }
            | SessionError::Contended { .. }
            | SessionError::Store(_) => Self::unavailable(error.to_string()),
        }
    }
}

impl From<AssignmentError> for ApiError {
    fn from(error: AssignmentError) -> Self {
        match error {
            AssignmentError::Session(error) => error.into(),
            AssignmentError::Provisioning(error) => {
                Self::bad_gateway(format!("bot provisioning failed: {error:#}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "bot-coordinator request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
