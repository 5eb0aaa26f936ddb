use axum::{extract::State, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    dto::account_dto::{PushTokenRequest, PushTokenResponse},
    error::Result,
    middleware::AuthAccount,
    AppState,
};

/// Register or clear the caller's push subscription id
#[utoipa::path(
    put,
    path = "/api/accounts/me/push-token",
    tag = "accounts",
    request_body = PushTokenRequest,
    responses(
        (status = 200, description = "Subscription updated", body = PushTokenResponse),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn register_push_token(
    State(state): State<AppState>,
    AuthAccount(caller): AuthAccount,
    Json(payload): Json<PushTokenRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let subscribed = state
        .account_service
        .register_push_token(caller, payload.token.as_deref())
        .await?;
    Ok(Json(PushTokenResponse { subscribed }))
}
