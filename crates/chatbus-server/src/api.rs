use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, State},
    http::Method,
    routing::{get, post},
    Json, Router,
};
use chatbus_core::{Chat, ContactEntry, NewMessage, UserLookup, UserPatch, WriteBehindStats};
use chatbus_store::{Message, Session, User, UserId};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<Chat>,
    pub config: Arc<ServerConfig>,
}

/// `Path` extractor whose rejection renders as a JSON `BadRequest`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServerError))]
struct ApiPath<T>(T);

/// `Json` extractor whose rejection renders as a JSON `BadRequest`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
struct ApiJson<T>(T);

type ApiResult<T> = Result<Json<T>, ServerError>;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(app_info))
        .route("/health", get(health_check))
        // users
        .route("/api/users", get(list_users))
        .route("/api/user", post(create_user))
        .route(
            "/api/user/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/user.uuid/:uuid", get(get_user_by_uuid))
        // sessions
        .route("/api/sessions", get(list_sessions))
        .route("/api/session/:id", post(create_session).delete(delete_session))
        // contacts
        .route("/api/contacts/:session_id", get(list_contacts))
        .route(
            "/api/contact/:session_id/:user_id",
            post(create_contact).delete(delete_contact),
        )
        // messages
        .route("/api/messages/:session_id", get(poll_messages))
        .route("/api/messages/:session_id/:after", get(poll_messages))
        .route("/api/messages/:session_id/:after/:nano", get(poll_messages))
        .route("/api/message/:session_id", post(send_message))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct AppInfoResponse {
    name: String,
    environment: String,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
    outbox: WriteBehindStats,
}

/// Body of a successful mutation that has nothing else to return.
#[derive(Serialize)]
struct Ack {
    ok: bool,
}

const ACK: Ack = Ack { ok: true };

#[derive(Deserialize)]
struct NewUserRequest {
    uuid: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
struct ContactPath {
    session_id: Uuid,
    user_id: UserId,
}

#[derive(Deserialize)]
struct PollPath {
    session_id: Uuid,
    after: Option<i64>,
    nano: Option<i64>,
}

async fn app_info(State(state): State<AppState>) -> Json<AppInfoResponse> {
    Json(AppInfoResponse {
        name: state.config.app_name.clone(),
        environment: state.config.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.chat.sessions().len().await,
        outbox: state.chat.outbox_stats(),
    })
}

// ─── Users ───

async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(Json(state.chat.list_users().await?))
}

async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewUserRequest>,
) -> ApiResult<User> {
    let user = state.chat.create_user(&req.uuid, &req.display_name).await?;
    Ok(Json(user))
}

async fn get_user(State(state): State<AppState>, ApiPath(id): ApiPath<UserId>) -> ApiResult<User> {
    Ok(Json(state.chat.get_user(UserLookup::Id(id)).await?))
}

async fn get_user_by_uuid(
    State(state): State<AppState>,
    ApiPath(uuid): ApiPath<String>,
) -> ApiResult<User> {
    Ok(Json(state.chat.get_user(UserLookup::Uuid(uuid)).await?))
}

async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> ApiResult<User> {
    Ok(Json(state.chat.update_user(id, patch).await?))
}

async fn delete_user(State(state): State<AppState>, ApiPath(id): ApiPath<UserId>) -> ApiResult<Ack> {
    state.chat.delete_user(id).await?;
    info!(user = id, "User deleted via API");
    Ok(Json(ACK))
}

// ─── Sessions ───

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.chat.list_sessions().await)
}

/// `POST /api/session/:user_id`.  Shares the route with `DELETE`, whose
/// parameter is a session id.
async fn create_session(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Session> {
    Ok(Json(state.chat.create_session(user_id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Ack> {
    state.chat.delete_session(id).await?;
    Ok(Json(ACK))
}

// ─── Contacts ───

async fn list_contacts(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<Uuid>,
) -> ApiResult<Vec<ContactEntry>> {
    Ok(Json(state.chat.list_contacts(session_id).await?))
}

async fn create_contact(
    State(state): State<AppState>,
    ApiPath(path): ApiPath<ContactPath>,
) -> ApiResult<Ack> {
    state
        .chat
        .create_contact(path.session_id, path.user_id)
        .await?;
    Ok(Json(ACK))
}

async fn delete_contact(
    State(state): State<AppState>,
    ApiPath(path): ApiPath<ContactPath>,
) -> ApiResult<Ack> {
    state
        .chat
        .delete_contact(path.session_id, path.user_id)
        .await?;
    Ok(Json(ACK))
}

// ─── Messages ───

async fn poll_messages(
    State(state): State<AppState>,
    ApiPath(path): ApiPath<PollPath>,
) -> ApiResult<Vec<Message>> {
    let messages = state
        .chat
        .poll_messages(
            path.session_id,
            path.after.unwrap_or(0),
            path.nano.unwrap_or(0),
        )
        .await?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<Uuid>,
    ApiJson(message): ApiJson<NewMessage>,
) -> ApiResult<Message> {
    Ok(Json(state.chat.send_message(session_id, message).await?))
}

/// Serve the API on `addr` until `shutdown` resolves, then finish in-flight
/// requests and return.
pub async fn serve<F>(state: AppState, addr: std::net::SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
