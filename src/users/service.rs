use std::sync::Arc;

use crate::db::{DbLayer, DuplicateUsername};
use crate::error::RegistryError;
use crate::model::user::USERNAME_MAX_LEN;
use crate::token::{TokenSigner, TokenType};
use crate::users::password::{hash_password, verify_password};
use crate::users::types::{
    MqttAuthRequest, MqttAuthResponse, TokenDetail, TokenPair, UserDetail, UserLookup,
};

pub struct UsersService {
    db: Arc<DbLayer>,
    signer: Arc<dyn TokenSigner>,
}

impl UsersService {
    pub fn new(db: Arc<DbLayer>, signer: Arc<dyn TokenSigner>) -> Self {
        Self { db, signer }
    }

    /// Verifies credentials and delegates token issuance to the auth
    /// service. Both the access and refresh call must succeed; a partial
    /// token pair is never returned.
    pub async fn sign_in(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<TokenDetail, RegistryError> {
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
            _ => {
                return Err(RegistryError::InvalidInput(
                    "Undefined username or password".into(),
                ))
            }
        };

        let user = self
            .db
            .find_user_by_name(username)
            .await?
            .ok_or_else(|| RegistryError::NotFound("User doesn't exist".into()))?;

        if !verify_password(&user.password_hash, password)? {
            return Err(RegistryError::Unauthorized("Incorrect password".into()));
        }

        let (access, refresh) = tokio::try_join!(
            self.signer.sign(user.id, &user.username, TokenType::Access),
            self.signer.sign(user.id, &user.username, TokenType::Refresh),
        )
        .map_err(|e| {
            tracing::warn!(user_id = user.id, error = %e, "token delegation failed");
            RegistryError::Upstream("Unable to sign JWT token".into())
        })?;

        Ok(TokenDetail {
            user: access.user,
            token: TokenPair {
                access_token: access.token,
                refresh_token: refresh.token,
            },
        })
    }

    pub async fn register(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<UserDetail, RegistryError> {
        let (Some(username), Some(password)) = (username, password) else {
            return Err(RegistryError::InvalidInput(
                "Undefined username or password".into(),
            ));
        };
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(RegistryError::InvalidInput("Username is too long".into()));
        }

        if self.db.find_user_by_name(username).await?.is_some() {
            return Err(RegistryError::Conflict("Username already exists".into()));
        }

        let hash = hash_password(password)?;
        let user = match self.db.create_user(username, &hash).await {
            Ok(user) => user,
            Err(e) if e.is::<DuplicateUsername>() => {
                return Err(RegistryError::Conflict("Username already exists".into()));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = user.id, username, "user registered");
        Ok(UserDetail::from(&user))
    }

    /// Deletes the user after re-verifying the password; owned devices and
    /// topics go with it. Returns the identity as it existed before deletion.
    pub async fn unregister(
        &self,
        user_id: Option<u64>,
        password: Option<&str>,
    ) -> Result<UserDetail, RegistryError> {
        let (Some(user_id), Some(password)) = (user_id, password) else {
            return Err(RegistryError::InvalidInput(
                "Undefined user id or password".into(),
            ));
        };

        let user = self
            .db
            .load_user(user_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound("User does not exist".into()))?;

        if !verify_password(&user.password_hash, password)? {
            return Err(RegistryError::Unauthorized("Incorrect password".into()));
        }

        self.db.delete_user(user_id).await?;

        tracing::info!(user_id, "user unregistered");
        Ok(UserDetail::from(&user))
    }

    pub async fn get_user_details(&self, lookup: UserLookup) -> Result<UserDetail, RegistryError> {
        let user = match lookup {
            UserLookup::Id(user_id) => self.db.load_user(user_id).await?,
            UserLookup::Name(ref username) => self.db.find_user_by_name(username).await?,
        };

        user.as_ref()
            .map(UserDetail::from)
            .ok_or_else(|| RegistryError::NotFound("User does not exist".into()))
    }

    /// Boolean gate for the MQTT broker's auth hook. Never fails: missing
    /// input, unknown users and storage trouble all come back as deny.
    /// Verification prefers the broker-specific hash and falls back to the
    /// primary password hash when none is set.
    pub async fn mqtt_auth(&self, req: &MqttAuthRequest) -> MqttAuthResponse {
        let (Some(username), Some(password)) = (req.username.as_deref(), req.password.as_deref())
        else {
            return MqttAuthResponse::deny();
        };
        if username.is_empty() || password.is_empty() {
            return MqttAuthResponse::deny();
        }

        let user = match self.db.find_user_by_name(username).await {
            Ok(Some(user)) => user,
            Ok(None) => return MqttAuthResponse::deny(),
            Err(e) => {
                tracing::warn!(username, error = %e, "mqtt auth lookup failed");
                return MqttAuthResponse::deny();
            }
        };

        let hash = user
            .mqtt_password_hash
            .as_deref()
            .unwrap_or(&user.password_hash);

        match verify_password(hash, password) {
            Ok(true) => MqttAuthResponse::allow(),
            _ => MqttAuthResponse::deny(),
        }
    }

    pub async fn update_mqtt_password(
        &self,
        user_id: Option<u64>,
        password: Option<&str>,
    ) -> Result<UserDetail, RegistryError> {
        let (Some(user_id), Some(password)) = (user_id, password) else {
            return Err(RegistryError::InvalidInput(
                "Undefined user id or password".into(),
            ));
        };

        let mut user = self
            .db
            .load_user(user_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound("User does not exist".into()))?;

        user.mqtt_password_hash = Some(hash_password(password)?);
        self.db.save_user(&user).await?;

        Ok(UserDetail::from(&user))
    }
}
