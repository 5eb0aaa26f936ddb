use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// A null or blank token clears the subscription.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PushTokenRequest {
    #[validate(length(max = 255))]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct PushTokenResponse {
    pub subscribed: bool,
}
