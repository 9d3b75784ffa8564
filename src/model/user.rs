use serde::{Deserialize, Serialize};

pub const USERNAME_MAX_LEN: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: String,
    /// Secondary hash checked by the MQTT broker auth hook; falls back to
    /// `password_hash` when unset.
    #[serde(default)]
    pub mqtt_password_hash: Option<String>,
    pub created_ts: i64,
}
