//! Accounts, password verification and browser sessions.
//!
//! A session token has the shape `ys_<id>_<secret>`. Only a SHA-256 digest of
//! the secret is stored, and presented secrets are compared in constant time.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::users::{normalize_username, validate_password};

const TOKEN_PREFIX: &str = "ys";
const SESSION_ID_LEN: usize = 16;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

#[derive(Debug, Clone)]
pub struct SignUpCommand {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub async fn sign_up(&self, cmd: SignUpCommand) -> Result<UserRecord, AuthError> {
        let username = normalize_username(&cmd.username)?;
        validate_password(&cmd.password)?;

        if self.users.find_user_by_username(&username).await?.is_some() {
            return Err(AuthError::UsernameTaken(username));
        }

        let password_hash = hash_password(cmd.password).await?;
        let result = self
            .users
            .create_user(CreateUserParams {
                username: username.clone(),
                first_name: cmd.first_name.trim().to_string(),
                last_name: cmd.last_name.trim().to_string(),
                password_hash,
            })
            .await;

        match result {
            Ok(user) => {
                info!(
                    target = "yatube::application::auth",
                    user_id = user.id,
                    username = %user.username,
                    "User account created"
                );
                Ok(user)
            }
            Err(RepoError::Duplicate { .. }) => Err(AuthError::UsernameTaken(username)),
            Err(err) => Err(err.into()),
        }
    }

    /// Verify credentials and open a new session for the user.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, AuthError> {
        let user = self
            .users
            .find_user_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let now = OffsetDateTime::now_utc();
        let purged = self.sessions.delete_expired_sessions(now).await?;
        if purged > 0 {
            debug!(
                target = "yatube::application::auth",
                purged, "Purged expired sessions"
            );
        }

        self.start_session(&user).await
    }

    pub async fn start_session(&self, user: &UserRecord) -> Result<IssuedSession, AuthError> {
        let id = Self::generate_session_id();
        let secret = Self::generate_secret();
        let token = format!("{TOKEN_PREFIX}_{id}_{secret}");
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;

        let session = self
            .sessions
            .create_session(CreateSessionParams {
                id,
                user_id: user.id,
                secret_hash: Self::hash_secret(&secret),
                expires_at,
            })
            .await?;

        Ok(IssuedSession {
            token,
            expires_at: session.expires_at,
        })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parsed) = Self::parse_token(token) {
            self.sessions.delete_session(&parsed.id).await?;
        }
        Ok(())
    }

    /// Resolve a session token to its user. Unknown, malformed or expired
    /// tokens resolve to `None`.
    pub async fn authenticate(&self, token: &str) -> Result<Option<UserRecord>, AuthError> {
        let Some(parsed) = Self::parse_token(token) else {
            return Ok(None);
        };
        let Some(session) = self.sessions.find_session(&parsed.id).await? else {
            return Ok(None);
        };

        if session.is_expired_at(OffsetDateTime::now_utc()) {
            return Ok(None);
        }

        let hashed_input = Self::hash_secret(&parsed.secret);
        if session.secret_hash.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(None);
        }

        Ok(self.users.find_user(session.user_id).await?)
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_session_id() -> String {
        Uuid::new_v4().simple().to_string()[..SESSION_ID_LEN].to_string()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str) -> Option<ParsedToken> {
        let mut parts = token.splitn(3, '_');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let id = parts.next()?;
        let secret = parts.next()?;
        if id.is_empty() || secret.len() < MIN_SECRET_LEN {
            return None;
        }
        Some(ParsedToken {
            id: id.to_string(),
            secret: secret.to_string(),
        })
    }
}

struct ParsedToken {
    id: String,
    secret: String,
}

/// Hash a password into a PHC string with Argon2id.
pub async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hashing(err.to_string()))
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

pub async fn verify_password(password: String, password_hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&password_hash).map_err(|err| AuthError::Hashing(err.to_string()))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::Hashing(err.to_string())),
        }
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}
