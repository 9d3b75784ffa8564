use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUser {
    pub sub: u64,
    pub username: String,
}

/// One signed token as returned by the auth service.
#[derive(Debug, Deserialize)]
pub struct SignedToken {
    pub user: TokenUser,
    pub token: String,
}

/// External authority that issues signed tokens for a verified identity.
/// Token creation never happens locally; this is an opaque remote call.
#[async_trait]
pub trait TokenSigner: Send + Sync {
    async fn sign(
        &self,
        user_id: u64,
        username: &str,
        token_type: TokenType,
    ) -> anyhow::Result<SignedToken>;
}

/// HTTP client for the auth service's `auth.token.sign` command.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenSigner for AuthClient {
    async fn sign(
        &self,
        user_id: u64,
        username: &str,
        token_type: TokenType,
    ) -> anyhow::Result<SignedToken> {
        let res = self
            .http
            .post(format!("{}/rpc", self.base_url))
            .json(&json!({
                "cmd": "auth.token.sign",
                "userId": user_id,
                "username": username,
                "type": token_type.as_str(),
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(res.json::<SignedToken>().await?)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Echoes the identity back with a deterministic opaque token.
    pub struct StaticSigner;

    #[async_trait]
    impl TokenSigner for StaticSigner {
        async fn sign(
            &self,
            user_id: u64,
            username: &str,
            token_type: TokenType,
        ) -> anyhow::Result<SignedToken> {
            Ok(SignedToken {
                user: TokenUser {
                    sub: user_id,
                    username: username.to_string(),
                },
                token: format!("{}-token-{user_id}", token_type.as_str()),
            })
        }
    }

    /// Fails every call, standing in for a dead or timing-out auth service.
    pub struct FailingSigner;

    #[async_trait]
    impl TokenSigner for FailingSigner {
        async fn sign(
            &self,
            _user_id: u64,
            _username: &str,
            _token_type: TokenType,
        ) -> anyhow::Result<SignedToken> {
            anyhow::bail!("auth service unreachable")
        }
    }
}
