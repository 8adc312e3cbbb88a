pub mod auth;
pub mod config;
pub mod exchange;
pub mod store;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use exchange_core::{
    Assignment, Credential, ErrorKind, ExchangeError, ParticipantId, Role, WishlistEntry,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::{RequestContext, SharedSecret};
use crate::config::Config;
use crate::exchange::{Exchange, Policy};
use crate::store::{AssignmentDetails, ExchangeStore, MemoryStore, RosterEntry};

#[derive(Clone)]
pub struct AppState {
    exchange: Arc<Exchange>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange: Arc::new(exchange),
        }
    }

    /// Opens the store, wires the shared-secret boundary and makes sure the
    /// configured admin exists.
    pub async fn from_config(config: &Config) -> Result<Self, ExchangeError> {
        let store: Arc<dyn ExchangeStore> = match &config.persist_path {
            Some(path) => Arc::new(MemoryStore::with_persistence(path.clone())?),
            None => Arc::new(MemoryStore::new()),
        };
        let policy = Policy {
            wishlist_edits_after_shuffle: config.allow_wishlist_edits_after_shuffle,
        };
        let mut exchange = Exchange::new(
            store,
            Arc::new(SharedSecret::new(config.admin_password.clone())),
            policy,
        );
        if let Some(seed) = config.shuffle_seed {
            exchange = exchange.with_seed(seed);
        }
        exchange
            .bootstrap_admin(
                &config.admin_username,
                Credential::new(config.admin_password.clone()),
            )
            .await?;
        Ok(Self::new(exchange))
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/participants", get(list_participants).post(create_participant))
        .route("/participants/:id", delete(delete_participant))
        .route("/participants/:id/wishlist", get(get_wishlist).put(save_wishlist))
        .route("/participants/:id/assignment", get(get_assignment))
        .route("/state", get(get_state))
        .route("/shuffle", post(shuffle))
        .route("/reset", post(reset))
        .route("/assignments", get(list_assignments))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Domain failures rendered as `{"kind": ..., "message": ...}`.
#[derive(Debug)]
pub struct ApiError(ExchangeError);

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict | ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if kind == ErrorKind::Internal {
            error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                kind,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ParticipantView {
    id: ParticipantId,
    username: String,
    role: Role,
    wishlist_completed: bool,
    wishlist: Option<WishlistEntry>,
}

impl From<RosterEntry> for ParticipantView {
    fn from(entry: RosterEntry) -> Self {
        Self {
            id: entry.participant.id,
            username: entry.participant.username,
            role: entry.participant.role,
            wishlist_completed: entry.participant.wishlist_completed,
            wishlist: entry.wishlist,
        }
    }
}

#[derive(Serialize)]
struct ReceiverView {
    id: ParticipantId,
    username: String,
}

#[derive(Serialize)]
struct AssignmentView {
    receiver_id: ParticipantId,
    receiver: ReceiverView,
    wishlist: Option<WishlistEntry>,
}

impl From<AssignmentDetails> for AssignmentView {
    fn from(details: AssignmentDetails) -> Self {
        Self {
            receiver_id: details.assignment.receiver_id,
            receiver: ReceiverView {
                id: details.receiver.id,
                username: details.receiver.username,
            },
            wishlist: details.wishlist,
        }
    }
}

#[derive(Serialize)]
struct StateView {
    shuffle_completed: bool,
}

#[derive(Deserialize)]
struct CreateParticipantRequest {
    username: String,
    credential: String,
}

#[derive(Deserialize)]
struct WishlistRequest {
    item1: Option<String>,
    item2: Option<String>,
    item3: Option<String>,
}

#[derive(Deserialize)]
struct ShuffleParams {
    seed: Option<u64>,
}

#[derive(Serialize)]
struct ShuffleResponse {
    shuffle_completed: bool,
    assignments: usize,
}

async fn list_participants(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let roster = state.exchange.list_participants()?;
    Ok(Json(
        roster
            .into_iter()
            .map(ParticipantView::from)
            .collect::<Vec<_>>(),
    ))
}

async fn create_participant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateParticipantRequest>,
) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::from_headers(headers);
    let participant = state
        .exchange
        .create_participant(&ctx, &payload.username, &payload.credential)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ParticipantView::from(RosterEntry {
            participant,
            wishlist: None,
        })),
    ))
}

async fn delete_participant(
    State(state): State<AppState>,
    Path(id): Path<ParticipantId>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::from_headers(headers);
    state.exchange.delete_participant(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_wishlist(
    State(state): State<AppState>,
    Path(id): Path<ParticipantId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.exchange.wishlist(id)?))
}

async fn save_wishlist(
    State(state): State<AppState>,
    Path(id): Path<ParticipantId>,
    Json(payload): Json<WishlistRequest>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .exchange
        .save_wishlist(
            id,
            payload.item1.as_deref(),
            payload.item2.as_deref(),
            payload.item3.as_deref(),
        )
        .await?;
    Ok(Json(entry))
}

async fn get_assignment(
    State(state): State<AppState>,
    Path(id): Path<ParticipantId>,
) -> ApiResult<impl IntoResponse> {
    let details = state.exchange.assignment_for(id)?;
    Ok(Json(details.map(AssignmentView::from)))
}

async fn get_state(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let app_state = state.exchange.app_state()?;
    Ok(Json(StateView {
        shuffle_completed: app_state.shuffle_completed,
    }))
}

async fn shuffle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ShuffleParams>,
) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::from_headers(headers);
    let assignments = state.exchange.shuffle(&ctx, params.seed).await?;
    Ok(Json(ShuffleResponse {
        shuffle_completed: true,
        assignments: assignments.len(),
    }))
}

async fn reset(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::from_headers(headers);
    state.exchange.reset(&ctx).await?;
    Ok(Json(StateView {
        shuffle_completed: false,
    }))
}

async fn list_assignments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::from_headers(headers);
    let assignments: Vec<Assignment> = state.exchange.list_assignments(&ctx).await?;
    Ok(Json(assignments))
}
