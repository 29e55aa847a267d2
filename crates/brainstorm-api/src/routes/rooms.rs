//! Routes for the Room & Turn bounded context.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{
    Json, Router,
    routing::{get, post},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use brainstorm_room::application::export::UTF8_BOM;
use brainstorm_room::application::query_handlers::{ParticipantView, RoomView};
use brainstorm_room::application::{command_handlers, query_handlers, subscriptions};
use brainstorm_room::domain::aggregates::{AdvanceOutcome, RoomStatus, SubmitOutcome};
use brainstorm_room::domain::commands;
use brainstorm_room::domain::events::ContributionSource;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    /// The brainstorming topic.
    pub topic: String,
    /// Number of turns.
    pub turn_count: u32,
    /// Minutes per turn, one entry per turn.
    pub durations: Vec<u32>,
}

/// Request body for POST /{room_id}/join.
#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    /// The participant's name.
    pub name: String,
}

/// Request body for POST /{room_id}/ready.
#[derive(Debug, Deserialize)]
pub struct SetReadyRequest {
    /// The participant.
    pub name: String,
    /// The desired ready flag.
    pub ready: bool,
}

/// Request body for POST /{room_id}/active.
#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    /// The participant.
    pub name: String,
    /// The desired active flag.
    pub active: bool,
}

/// Request body for POST /{room_id}/advance.
#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    /// The turn the admin saw when pressing the button (0 to start).
    pub from_turn: u32,
}

/// Request body for POST /{room_id}/contributions.
#[derive(Debug, Deserialize)]
pub struct SubmitContributionRequest {
    /// The contributing participant.
    pub name: String,
    /// The turn being closed.
    pub turn: u32,
    /// The contribution text.
    #[serde(default)]
    pub text: String,
    /// `explicit` unless the client's countdown fired.
    #[serde(default = "explicit")]
    pub source: ContributionSource,
}

fn explicit() -> ContributionSource {
    ContributionSource::Explicit
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The room the command applied to.
    pub room_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Response body for POST /{room_id}/advance.
#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    /// The room the command applied to.
    pub room_id: Uuid,
    /// `false` when the room had already left `from_turn`.
    pub advanced: bool,
    /// The room's turn after the command.
    pub current_turn: u32,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Response body for POST /{room_id}/contributions.
#[derive(Debug, Serialize)]
pub struct SubmitContributionResponse {
    /// The room the command applied to.
    pub room_id: Uuid,
    /// `false` when the turn was already closed for this participant.
    pub accepted: bool,
    /// Whether this submission completed the room.
    pub completed_room: bool,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

fn event_ids<T>(result: &command_handlers::RoomCommandResult<T>) -> Vec<Uuid> {
    result.stored_events.iter().map(|e| e.event_id).collect()
}

/// POST /
#[instrument(skip(state, request), fields(topic = %request.topic))]
async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::CreateRoom {
        correlation_id: Uuid::new_v4(),
        topic: request.topic,
        turn_count: request.turn_count,
        durations: request.durations,
    };

    info!(correlation_id = %command.correlation_id, "handling create_room command");

    let result = command_handlers::handle_create_room(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse {
            room_id: result.aggregate_id,
            event_ids: event_ids(&result),
        }),
    ))
}

/// GET /{room_id}
#[instrument(skip(state))]
async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomView>, ApiError> {
    let view = query_handlers::get_room_view(room_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// POST /{room_id}/join
#[instrument(skip(state, request), fields(name = %request.name))]
async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::JoinRoom {
        correlation_id: Uuid::new_v4(),
        room_id,
        name: request.name,
    };

    info!(correlation_id = %command.correlation_id, "handling join_room command");

    let result = command_handlers::handle_join_room(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse {
            room_id,
            event_ids: event_ids(&result),
        }),
    ))
}

/// POST /{room_id}/ready
#[instrument(skip(state, request), fields(name = %request.name, ready = request.ready))]
async fn set_ready(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<SetReadyRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::SetReady {
        correlation_id: Uuid::new_v4(),
        room_id,
        name: request.name,
        ready: request.ready,
    };

    info!(correlation_id = %command.correlation_id, "handling set_ready command");

    let result = command_handlers::handle_set_ready(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok(Json(CommandResponse {
        room_id,
        event_ids: event_ids(&result),
    }))
}

/// POST /{room_id}/active
#[instrument(skip(state, request), fields(name = %request.name, active = request.active))]
async fn set_active(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::SetActive {
        correlation_id: Uuid::new_v4(),
        room_id,
        name: request.name,
        active: request.active,
    };

    info!(correlation_id = %command.correlation_id, "handling set_active command");

    let result = command_handlers::handle_set_active(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    Ok(Json(CommandResponse {
        room_id,
        event_ids: event_ids(&result),
    }))
}

/// POST /{room_id}/advance
#[instrument(skip(state, request), fields(from_turn = request.from_turn))]
async fn advance(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let command = commands::StartOrAdvance {
        correlation_id: Uuid::new_v4(),
        room_id,
        from_turn: request.from_turn,
    };

    info!(correlation_id = %command.correlation_id, "handling start_or_advance command");

    let result = command_handlers::handle_start_or_advance(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    let (advanced, current_turn) = match result.outcome {
        AdvanceOutcome::Advanced { turn } => (true, turn),
        AdvanceOutcome::AlreadyAdvanced { current_turn } => (false, current_turn),
    };
    Ok(Json(AdvanceResponse {
        room_id,
        advanced,
        current_turn,
        event_ids: event_ids(&result),
    }))
}

/// POST /{room_id}/contributions
#[instrument(skip(state, request), fields(name = %request.name, turn = request.turn))]
async fn submit_contribution(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Json(request): Json<SubmitContributionRequest>,
) -> Result<Json<SubmitContributionResponse>, ApiError> {
    let command = commands::SubmitContribution {
        correlation_id: Uuid::new_v4(),
        room_id,
        name: request.name,
        turn: request.turn,
        text: request.text,
        source: request.source,
    };

    info!(correlation_id = %command.correlation_id, "handling submit_contribution command");

    let result = command_handlers::handle_submit_contribution(
        &command,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;

    let (accepted, completed_room) = match result.outcome {
        SubmitOutcome::Accepted { completed_room } => (true, completed_room),
        SubmitOutcome::AlreadyClosed => (false, false),
    };
    Ok(Json(SubmitContributionResponse {
        room_id,
        accepted,
        completed_room,
        event_ids: event_ids(&result),
    }))
}

/// GET /{room_id}/participants/{name}
#[instrument(skip(state))]
async fn get_participant(
    State(state): State<AppState>,
    Path((room_id, name)): Path<(Uuid, String)>,
) -> Result<Json<ParticipantView>, ApiError> {
    let view = query_handlers::get_participant_view(
        room_id,
        &name,
        state.clock.as_ref(),
        &*state.event_repository,
    )
    .await?;
    Ok(Json(view))
}

/// GET /{room_id}/export
#[instrument(skip(state))]
async fn export(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let table = query_handlers::export_contributions(room_id, &*state.event_repository).await?;
    let body = format!("{UTF8_BOM}{}", table.to_delimited()?);

    info!(rows = table.rows.len(), "exporting contributions");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", table.file_name()),
            ),
        ],
        body,
    )
        .into_response())
}

/// GET /{room_id}/stream
///
/// Server-sent events: the current room view first, then one event per
/// change. The stream ends after the completed view is sent.
#[instrument(skip(state))]
async fn stream_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = subscriptions::subscribe_room(
        room_id,
        state.event_repository.clone(),
        state.event_feed.as_ref(),
    )
    .await?;
    let first = subscription.current();

    let stream = futures::stream::unfold(
        (subscription, Some(first), false),
        move |(mut subscription, pending, finished)| async move {
            if finished {
                return None;
            }
            let view = match pending {
                Some(view) => view,
                None => match subscription.changed().await {
                    Ok(view) => view,
                    Err(e) => {
                        warn!(%room_id, error = %e, "room stream ended");
                        return None;
                    }
                },
            };
            let finished = view.status == RoomStatus::Completed;
            let event = match Event::default().event("room").json_data(&view) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "room view could not be encoded");
                    return None;
                }
            };
            Some((Ok(event), (subscription, None, finished)))
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Returns the router for the room context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_room))
        .route("/{room_id}", get(get_room))
        .route("/{room_id}/join", post(join_room))
        .route("/{room_id}/ready", post(set_ready))
        .route("/{room_id}/active", post(set_active))
        .route("/{room_id}/advance", post(advance))
        .route("/{room_id}/contributions", post(submit_contribution))
        .route("/{room_id}/participants/{name}", get(get_participant))
        .route("/{room_id}/export", get(export))
        .route("/{room_id}/stream", get(stream_room))
}
