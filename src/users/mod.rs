pub mod password;
pub mod service;
pub mod types;

pub use service::UsersService;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};

use crate::users::types::{MqttAuthRequest, MqttAuthResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/mqtt/auth", post(mqtt_auth_handler))
}

/// Broker auth hook. Always answers 200 with allow/deny; a body the broker
/// mangled counts as deny rather than an HTTP error.
async fn mqtt_auth_handler(State(state): State<AppState>, body: Bytes) -> Json<MqttAuthResponse> {
    let req: MqttAuthRequest = serde_json::from_slice(&body).unwrap_or_default();
    Json(state.users.mqtt_auth(&req).await)
}
