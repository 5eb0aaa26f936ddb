pub mod accounts;
pub mod chats;
pub mod health;

use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use utoipa::OpenApi;

use crate::dto::account_dto::{PushTokenRequest, PushTokenResponse};
use crate::dto::chat_dto::{
    ChatDetail, ChatSummary, MessageResponse, OpenChatResponse, PartySummary, SendMessageRequest,
    StartChatRequest, StartChatResponse, UnreadCountResponse,
};
use crate::middleware::{rate_limit, require_bearer_auth};
use crate::models::chat::PartyRole;
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        chats::list_chats,
        chats::start_chat,
        chats::unread_count,
        chats::get_chat,
        chats::list_messages,
        chats::send_message,
        chats::open_chat,
        accounts::register_push_token,
    ),
    components(schemas(
        PartyRole,
        PartySummary,
        ChatSummary,
        ChatDetail,
        MessageResponse,
        StartChatRequest,
        StartChatResponse,
        SendMessageRequest,
        OpenChatResponse,
        UnreadCountResponse,
        PushTokenRequest,
        PushTokenResponse,
    )),
    tags(
        (name = "chats", description = "Adopter and shelter conversations"),
        (name = "accounts", description = "Caller account settings")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

/// Full application router. Cross-cutting layers (CORS, tracing) are added
/// by the binary.
pub fn router(state: AppState, public_rps: u32) -> Router {
    let api = Router::new()
        .route("/api/chats", get(chats::list_chats).post(chats::start_chat))
        .route("/api/chats/unread", get(chats::unread_count))
        .route("/api/chats/:id", get(chats::get_chat))
        .route(
            "/api/chats/:id/messages",
            get(chats::list_messages).post(chats::send_message),
        )
        .route("/api/chats/:id/open", post(chats::open_chat))
        .route(
            "/api/accounts/me/push-token",
            put(accounts::register_push_token),
        )
        .route_layer(middleware::from_fn_with_state(
            rate_limit::new_rps_state(public_rps),
            rate_limit::rps_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(api)
        .with_state(state)
}
