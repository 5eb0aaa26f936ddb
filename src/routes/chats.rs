use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::chat_dto::{
        ChatDetail, ChatSummary, MessageResponse, OpenChatResponse, SendMessageRequest,
        StartChatRequest, StartChatResponse, UnreadCountResponse,
    },
    error::Result,
    middleware::AuthAccount,
    AppState,
};

/// Chat list for the caller, most recent activity first
#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "chats",
    responses(
        (status = 200, description = "Chats visible to the caller", body = [ChatSummary]),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Store unavailable, retry")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_chats(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
) -> Result<impl IntoResponse> {
    let chats = state.chat_service.list_chats(caller).await?;
    Ok(Json(chats))
}

/// Start (or find) the caller's chat with a shelter about an animal
#[utoipa::path(
    post,
    path = "/api/chats",
    tag = "chats",
    request_body = StartChatRequest,
    responses(
        (status = 201, description = "Chat created", body = StartChatResponse),
        (status = 200, description = "Existing chat returned", body = StartChatResponse),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Caller cannot start adoption chats"),
        (status = 404, description = "Shelter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn start_chat(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<StartChatRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let (opening, message) = if payload.with_interest_message {
        let started = state
            .chat_service
            .request_adoption(caller, payload.shelter_id, payload.animal_id, payload.animal_name)
            .await?;
        let message = started.opening.first_message.clone().map(MessageResponse::from);
        (started.opening, message)
    } else {
        let opening = state
            .chat_service
            .get_or_create_chat(caller, payload.shelter_id, payload.animal_id, payload.animal_name)
            .await?;
        (opening, None)
    };

    let status = if opening.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(StartChatResponse {
            chat_id: opening.chat.id,
            created: opening.created,
            message,
        }),
    ))
}

/// Aggregate unread count across the caller's chats
#[utoipa::path(
    get,
    path = "/api/chats/unread",
    tag = "chats",
    responses(
        (status = 200, description = "Sum of the caller's unread counters", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unread_count(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
) -> Result<impl IntoResponse> {
    let count = state.chat_service.unread_total(caller).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Chat header: both parties and the animal
#[utoipa::path(
    get,
    path = "/api/chats/{id}",
    tag = "chats",
    params(("id" = Uuid, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Chat detail", body = ChatDetail),
        (status = 403, description = "Caller is not a party"),
        (status = 404, description = "Chat not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_chat(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = state.chat_service.chat_detail(chat_id, caller).await?;
    Ok(Json(detail))
}

/// Messages in display order. Does not mark anything read.
#[utoipa::path(
    get,
    path = "/api/chats/{id}/messages",
    tag = "chats",
    params(("id" = Uuid, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageResponse]),
        (status = 403, description = "Caller is not a party"),
        (status = 404, description = "Chat not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.chat_service.list_messages(chat_id, caller).await?;
    let messages: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(Json(messages))
}

/// Send a message; push delivery happens in the background
#[utoipa::path(
    post,
    path = "/api/chats/{id}/messages",
    tag = "chats",
    params(("id" = Uuid, Path, description = "Chat ID")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageResponse),
        (status = 400, description = "Empty content"),
        (status = 403, description = "Caller is not a party"),
        (status = 404, description = "Chat not found"),
        (status = 503, description = "Store unavailable, retry")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
    Path(chat_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let delivery = state
        .chat_service
        .send_message(chat_id, caller, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(MessageResponse::from(delivery.message))))
}

/// Reset the caller's unread counter and mark incoming messages read
#[utoipa::path(
    post,
    path = "/api/chats/{id}/open",
    tag = "chats",
    params(("id" = Uuid, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Chat opened", body = OpenChatResponse),
        (status = 403, description = "Caller is not a party"),
        (status = 404, description = "Chat not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn open_chat(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.chat_service.open_chat(chat_id, caller).await?;
    Ok(Json(OpenChatResponse::from(outcome)))
}
