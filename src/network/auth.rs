//! Auth Service (spec.md §4.4).
//!
//! Register/login against the user repository. The shape — a config-driven
//! service with a thiserror error enum and `jsonwebtoken` for token
//! handling — follows the teacher's `auth.rs`, but the direction of travel
//! is reversed: the teacher validates externally issued tokens, this
//! service hashes passwords with `argon2` and *issues* its own opaque
//! per-login token, placed on the wire in `LoginResult::token`. Per spec.md
//! §4.4 the token is a client convenience; the server identifies the user
//! by session state, not by re-presenting it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::AuthError;
use crate::network::protocol::{LoginResult, RegisterResult, ServerMessage};
use crate::network::session::{SessionId, SessionRegistry, SessionUser};
use crate::repository::models::User;
use crate::repository::Repository;

/// Claims embedded in the opaque session token handed back on login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokenClaims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
}

pub struct AuthService {
    repo: Arc<dyn Repository>,
    sessions: Arc<SessionRegistry>,
    token_secret: String,
    /// Argon2 time cost (spec.md §6 `password_hash_cost`). Argon2 has no
    /// notion of a bcrypt-style single "cost" knob, so this feeds the
    /// iteration count (`t_cost`) while memory/parallelism stay at the
    /// crate's defaults; see DESIGN.md.
    password_hash_cost: u32,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn Repository>,
        sessions: Arc<SessionRegistry>,
        token_secret: String,
        password_hash_cost: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            sessions,
            token_secret,
            password_hash_cost,
        })
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, session_id: SessionId, username: String, password: String) {
        let reply = match self.try_register(username, password).await {
            Ok(()) => RegisterResult {
                success: true,
                error: None,
            },
            Err(e) => RegisterResult {
                success: false,
                error: Some(e.to_string()),
            },
        };
        self.sessions
            .send_to(session_id, ServerMessage::RegisterResult(reply))
            .await;
    }

    async fn try_register(&self, username: String, password: String) -> Result<(), AuthError> {
        if self
            .repo
            .find_user_by_username(&username)
            .await
            .map_err(|_| AuthError::HashingFailed("repository error".to_string()))?
            .is_some()
        {
            return Err(AuthError::UsernameTaken);
        }

        let hash = hash_password(&password, self.password_hash_cost)?;
        let user = User::new(username, hash);
        self.repo
            .create_user(user)
            .await
            .map_err(|e| AuthError::HashingFailed(e.to_string()))?;
        Ok(())
    }

    /// Never distinguishes unknown-user from bad-password on the wire
    /// (spec.md §4.4).
    #[instrument(skip(self, password))]
    pub async fn login(&self, session_id: SessionId, username: String, password: String) {
        match self.try_login(&username, &password).await {
            Ok((user, token)) => {
                let result = self
                    .sessions
                    .authenticate(
                        session_id,
                        SessionUser {
                            user_id: user.id,
                            username: user.username.clone(),
                            rating: user.rating,
                        },
                    )
                    .await;
                if result.is_err() {
                    warn!(%session_id, "login succeeded but session vanished before it could be promoted");
                    return;
                }
                self.sessions
                    .send_to(
                        session_id,
                        ServerMessage::LoginResult(LoginResult {
                            success: true,
                            user_id: Some(user.id.to_string()),
                            username: Some(user.username.clone()),
                            rating: Some(user.rating),
                            token: Some(token),
                            error: None,
                        }),
                    )
                    .await;
                info!(%session_id, user_id = %user.id, "login succeeded");
            }
            Err(_) => {
                self.sessions
                    .send_to(
                        session_id,
                        ServerMessage::LoginResult(LoginResult {
                            success: false,
                            user_id: None,
                            username: None,
                            rating: None,
                            token: None,
                            error: Some("invalid username or password".to_string()),
                        }),
                    )
                    .await;
            }
        }
    }

    async fn try_login(&self, username: &str, password: &str) -> Result<(User, String), AuthError> {
        let user = self
            .repo
            .find_user_by_username(username)
            .await
            .map_err(|_| AuthError::UnknownUser)?
            .ok_or(AuthError::UnknownUser)?;

        verify_password(password, &user.password_hash)?;

        let token = self.issue_token(user.id.to_string())?;
        Ok((user, token))
    }

    fn issue_token(&self, subject: String) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the epoch")
            .as_secs();
        let claims = SessionTokenClaims {
            sub: subject,
            iat: now,
            exp: now + 24 * 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.token_secret.as_bytes()),
        )
        .map_err(|e| AuthError::HashingFailed(e.to_string()))
    }
}

/// Argon2's own defaults are 19456 KiB of memory and 1-way parallelism;
/// only `t_cost` (iteration count) is configurable here.
const ARGON2_M_COST: u32 = 19_456;
const ARGON2_P_COST: u32 = 1;

fn hash_password(password: &str, t_cost: u32) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let params = Params::new(ARGON2_M_COST, t_cost.max(1), ARGON2_P_COST, None)
        .map_err(|e| AuthError::HashingFailed(e.to_string()))?;
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::HashingFailed(e.to_string()))
}

/// The PHC hash string carries its own algorithm/version/cost parameters, so
/// verification always uses those rather than `password_hash_cost` — a
/// stored hash keeps working even if the configured cost changes later.
fn verify_password(password: &str, stored_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|_| AuthError::BadCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::BadCredentials)
}
