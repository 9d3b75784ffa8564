//! Command-style entry point. Every inbound operation is a `{cmd, ...}`
//! message; the command names are part of the wire contract and must not
//! change.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::devices::types::TopicInput;
use crate::error::RegistryError;
use crate::users::types::UserLookup;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/rpc", post(dispatch))
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    cmd: String,
    #[serde(flatten)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct CredentialsPayload {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPasswordPayload {
    user_id: Option<u64>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserIdPayload {
    user_id: u64,
}

#[derive(Debug, Deserialize)]
struct UsernamePayload {
    username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRegisterPayload {
    user_id: u64,
    device_name: Option<String>,
    #[serde(default)]
    device_topics: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceIdPayload {
    user_id: u64,
    device_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceTopicsPayload {
    user_id: u64,
    device_id: u64,
    device_topics: TopicInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceTopicPayload {
    user_id: u64,
    device_id: u64,
    device_topic: String,
}

// The body is parsed by hand so an unreadable envelope comes back in the
// same {error, message} shape as every other failure, not as an extractor
// rejection.
async fn dispatch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, RegistryError> {
    let req: RpcRequest = serde_json::from_slice(&body)
        .map_err(|e| RegistryError::InvalidInput(format!("Malformed payload: {e}")))?;

    let result = match req.cmd.as_str() {
        "users.signin" => {
            let p: CredentialsPayload = parse(req.payload)?;
            to_json(
                state
                    .users
                    .sign_in(p.username.as_deref(), p.password.as_deref())
                    .await?,
            )?
        }
        "users.register" => {
            let p: CredentialsPayload = parse(req.payload)?;
            to_json(
                state
                    .users
                    .register(p.username.as_deref(), p.password.as_deref())
                    .await?,
            )?
        }
        "users.unregister" => {
            let p: UserPasswordPayload = parse(req.payload)?;
            to_json(
                state
                    .users
                    .unregister(p.user_id, p.password.as_deref())
                    .await?,
            )?
        }
        "users.details" => {
            let p: UserIdPayload = parse(req.payload)?;
            to_json(
                state
                    .users
                    .get_user_details(UserLookup::Id(p.user_id))
                    .await?,
            )?
        }
        "users.details.by.name" => {
            let p: UsernamePayload = parse(req.payload)?;
            to_json(
                state
                    .users
                    .get_user_details(UserLookup::Name(p.username))
                    .await?,
            )?
        }
        "users.mqtt.password" => {
            let p: UserPasswordPayload = parse(req.payload)?;
            to_json(
                state
                    .users
                    .update_mqtt_password(p.user_id, p.password.as_deref())
                    .await?,
            )?
        }
        "devices.register" => {
            let p: DeviceRegisterPayload = parse(req.payload)?;
            let topics = p.device_topics.unwrap_or_default();
            to_json(
                state
                    .devices
                    .register(p.user_id, p.device_name.as_deref(), &topics)
                    .await?,
            )?
        }
        "devices.unregister" => {
            let p: DeviceIdPayload = parse(req.payload)?;
            to_json(state.devices.unregister(p.user_id, p.device_id).await?)?
        }
        "devices.list" => {
            let p: UserIdPayload = parse(req.payload)?;
            to_json(state.devices.list(p.user_id).await?)?
        }
        "devices.details" => {
            let p: DeviceIdPayload = parse(req.payload)?;
            to_json(state.devices.get_details(p.user_id, p.device_id).await?)?
        }
        "devices.topics.add" => {
            let p: DeviceTopicsPayload = parse(req.payload)?;
            to_json(
                state
                    .devices
                    .add_topics(p.user_id, p.device_id, p.device_topics)
                    .await?,
            )?
        }
        "devices.topics.remove" => {
            let p: DeviceTopicsPayload = parse(req.payload)?;
            to_json(
                state
                    .devices
                    .remove_topics(p.user_id, p.device_id, p.device_topics)
                    .await?,
            )?
        }
        // The original broker exposed this under the longer alias; both stay
        // routable.
        "device.topic.check" | "user.device.topic.check" => {
            let p: DeviceTopicPayload = parse(req.payload)?;
            to_json(
                state
                    .devices
                    .check_topic(p.user_id, p.device_id, &p.device_topic)
                    .await?,
            )?
        }
        other => {
            return Err(RegistryError::InvalidInput(format!(
                "Unknown command: {other}"
            )))
        }
    };

    Ok(Json(result))
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, RegistryError> {
    serde_json::from_value(payload)
        .map_err(|e| RegistryError::InvalidInput(format!("Malformed payload: {e}")))
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, RegistryError> {
    serde_json::to_value(value).map_err(|e| RegistryError::Internal(e.into()))
}
