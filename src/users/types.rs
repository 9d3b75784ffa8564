use serde::{Deserialize, Serialize};

use crate::model::user::User;
use crate::token::TokenUser;

/// Public identity. Never carries a password hash.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub id: u64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: String,
}

impl From<&User> for UserDetail {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenDetail {
    pub user: TokenUser,
    pub token: TokenPair,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MqttAuthRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MqttAuthResponse {
    pub result: &'static str,
}

impl MqttAuthResponse {
    pub fn allow() -> Self {
        Self { result: "allow" }
    }

    pub fn deny() -> Self {
        Self { result: "deny" }
    }
}

/// Lookup argument for user details: numeric id or unique username.
#[derive(Debug, Clone)]
pub enum UserLookup {
    Id(u64),
    Name(String),
}
