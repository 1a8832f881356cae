use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use questline::config::RuntimeConfig;
use questline::db::SqliteProgressStore;
use questline::objective::{spawn_writer, ProgressStore};
use questline::package::{HotReloadEvent, PackageLoader};
use questline::world::{GameEvent, Integrations, SandboxPlayer, SandboxWorld};
use questline::{ObjectId, PlayerId, QuestError, QuestRuntime};

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
struct AppState {
    rt: Arc<QuestRuntime>,
    world: Arc<SandboxWorld>,
    loader: Arc<PackageLoader>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn parse_id(raw: &str) -> Result<ObjectId, axum::response::Response> {
    raw.parse::<ObjectId>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))
}

#[derive(Serialize)]
struct ObjectiveInfo {
    id: ObjectId,
    status: &'static str,
    data: serde_json::Value,
}

#[derive(Serialize)]
struct ReloadResponse {
    failed: usize,
    diagnostics: Vec<String>,
}

#[derive(Deserialize)]
struct SelectRequest {
    index: usize,
}

#[derive(Deserialize)]
struct NavigateRequest {
    command: String,
}

#[derive(Deserialize)]
struct VariableQuery {
    /// Package used to qualify a short variable name
    #[serde(default = "default_package")]
    package: String,
}

fn default_package() -> String {
    "default".to_string()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "conversations": state.rt.conversations().active_count(),
        "broken_definitions": state.rt.packages().diagnostics().len(),
    }))
}

async fn reload_packages(State(state): State<AppState>) -> impl IntoResponse {
    match state.loader.reload(&state.rt) {
        Ok(failed) => {
            let diagnostics = state
                .rt
                .packages()
                .diagnostics()
                .iter()
                .map(|d| format!("{} '{}': {}", d.kind, d.id, d.message))
                .collect();
            (StatusCode::OK, Json(ReloadResponse { failed, diagnostics })).into_response()
        }
        Err(e) => {
            error!("Reload failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn post_event(
    State(state): State<AppState>,
    Path(player): Path<String>,
    Json(event): Json<GameEvent>,
) -> impl IntoResponse {
    if event.player_id().as_str() != player {
        return error_response(StatusCode::BAD_REQUEST, "event belongs to another player");
    }
    // The sandbox has no physics; a hit projectile settles where it struck
    if let GameEvent::ProjectileHit {
        projectile_id,
        location,
        ..
    } = &event
    {
        state.world.track_projectile(projectile_id, location.clone());
    }
    state.rt.dispatch(&event);
    StatusCode::ACCEPTED.into_response()
}

async fn list_objectives(State(state): State<AppState>, Path(player): Path<String>) -> impl IntoResponse {
    let player = PlayerId::new(player);
    let objectives = state.rt.objectives();
    let infos: Vec<ObjectiveInfo> = objectives
        .active(&player)
        .into_iter()
        .filter_map(|id| {
            let record = objectives.record(&player, &id)?;
            Some(ObjectiveInfo {
                status: objectives.status(&player, &id).as_str(),
                id,
                data: record.data,
            })
        })
        .collect();
    Json(infos)
}

async fn start_objective(
    State(state): State<AppState>,
    Path((player, objective)): Path<(String, String)>,
) -> impl IntoResponse {
    let objective = match parse_id(&objective) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.rt.start_objective(&PlayerId::new(player), &objective) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e),
    }
}

async fn cancel_objective(
    State(state): State<AppState>,
    Path((player, objective)): Path<(String, String)>,
) -> impl IntoResponse {
    let objective = match parse_id(&objective) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.rt.cancel_objective(&PlayerId::new(player), &objective) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e),
    }
}

async fn start_conversation(
    State(state): State<AppState>,
    Path((player, conversation)): Path<(String, String)>,
) -> impl IntoResponse {
    let conversation = match parse_id(&conversation) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.rt.start_conversation(&PlayerId::new(player), &conversation) {
        Ok(conversation_state) => (StatusCode::OK, Json(conversation_state)).into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e),
    }
}

async fn select_option(
    State(state): State<AppState>,
    Path(player): Path<String>,
    Json(request): Json<SelectRequest>,
) -> impl IntoResponse {
    match state.rt.select_option(&PlayerId::new(player), request.index) {
        Ok(conversation_state) => (StatusCode::OK, Json(conversation_state)).into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e),
    }
}

async fn navigate_conversation(
    State(state): State<AppState>,
    Path(player): Path<String>,
    Json(request): Json<NavigateRequest>,
) -> impl IntoResponse {
    match state.rt.navigate_conversation(&PlayerId::new(player), &request.command) {
        Ok(handled) => (StatusCode::OK, Json(serde_json::json!({ "handled": handled }))).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e),
    }
}

async fn end_conversation(State(state): State<AppState>, Path(player): Path<String>) -> impl IntoResponse {
    if state.rt.end_conversation(&PlayerId::new(player)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn take_frames(State(state): State<AppState>, Path(player): Path<String>) -> impl IntoResponse {
    Json(state.world.take_frames(&PlayerId::new(player)))
}

async fn put_player_state(
    State(state): State<AppState>,
    Path(player): Path<String>,
    Json(data): Json<SandboxPlayer>,
) -> impl IntoResponse {
    let player = PlayerId::new(player);
    info!("Player {} state set ({})", player, data.name);
    state.world.join(&player, data);
    StatusCode::NO_CONTENT
}

async fn remove_player(State(state): State<AppState>, Path(player): Path<String>) -> impl IntoResponse {
    let player = PlayerId::new(player);
    state.rt.player_quit(&player);
    state.world.leave(&player);
    info!("Player {} left", player);
    StatusCode::NO_CONTENT
}

async fn get_variable(
    State(state): State<AppState>,
    Path((player, variable)): Path<(String, String)>,
    axum::extract::Query(query): axum::extract::Query<VariableQuery>,
) -> impl IntoResponse {
    match state.rt.variable(&PlayerId::new(player), &variable, &query.package) {
        Ok(value) => (StatusCode::OK, Json(serde_json::json!({ "value": value }))).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), QuestError> {
    // Initialize logging
    let filter = match "questline=info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RuntimeConfig::load(std::path::Path::new("config.toml"))?;

    let store = Arc::new(SqliteProgressStore::new(&config.database_url).await?);
    let records = store.load_all().await?;
    let (persist, writer) = spawn_writer(store, Duration::from_secs(config.autosave_secs));

    let world = Arc::new(SandboxWorld::new());
    let rt = QuestRuntime::builder(world.clone(), world.clone())
        .integrations(Integrations {
            economy: Some(world.clone()),
            stats: Some(world.clone()),
        })
        .persistence(persist.clone())
        .default_io(&config.default_conversation_io)
        .build()?;
    let rt = Arc::new(rt);

    let loader = Arc::new(PackageLoader::new(&config.data_dir));
    let failed = loader.reload(&rt)?;
    if failed > 0 {
        warn!("{} definitions failed to load", failed);
    }
    let restored = rt.restore(records);
    info!("Restored {} active objectives", restored);

    if config.hot_reload {
        let mut reload_rx = loader.start_file_watcher(rt.clone());
        tokio::spawn(async move {
            while let Some(event) = reload_rx.recv().await {
                match event {
                    HotReloadEvent::Reloaded { path, failed } => {
                        info!("Packages reloaded after change to {} ({} failed)", path, failed)
                    }
                    HotReloadEvent::Error(e) => warn!("Package reload error: {}", e),
                }
            }
        });
    }

    // Spawn tick loop
    let tick_rt = rt.clone();
    let tick_millis = config.tick_millis;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_millis));
        loop {
            interval.tick().await;
            tick_rt.tick();
        }
    });

    let state = AppState {
        rt,
        world,
        loader,
    };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/reload", post(reload_packages))
        // Player state and game events
        .route("/players/:player", axum::routing::delete(remove_player))
        .route("/players/:player/state", axum::routing::put(put_player_state))
        .route("/players/:player/events", post(post_event))
        .route("/players/:player/frames", get(take_frames))
        .route("/players/:player/variables/:id", get(get_variable))
        // Objectives
        .route("/players/:player/objectives", get(list_objectives))
        .route(
            "/players/:player/objectives/:id",
            post(start_objective).delete(cancel_objective),
        )
        // Conversations
        .route("/players/:player/conversations/:id", post(start_conversation))
        .route("/players/:player/conversation/select", post(select_option))
        .route("/players/:player/conversation/navigate", post(navigate_conversation))
        .route("/players/:player/conversation", axum::routing::delete(end_conversation))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Quest server listening on http://{}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, saving pending progress");
    persist.flush().await;
    writer.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
