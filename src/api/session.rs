//! Per-client session state: authentication flag, user and flash queue.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use super::ApiError;
use crate::services::UserInfo;

const LOGGED_IN_KEY: &str = "logged_in";
const USER_KEY: &str = "user";
const FLASH_KEY: &str = "_flashes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

impl FlashLevel {
    #[must_use]
    pub const fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "flash-success",
            Self::Error => "flash-error",
        }
    }
}

/// One-shot message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

/// Handler-facing view of the session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    session: Session,
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| ApiError::internal(format!("Session unavailable: {msg}")))?;
        Ok(Self { session })
    }
}

impl SessionContext {
    pub async fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self
            .session
            .get::<bool>(LOGGED_IN_KEY)
            .await?
            .unwrap_or(false))
    }

    /// Email of the authenticated user, if any.
    pub async fn user(&self) -> Result<Option<String>, ApiError> {
        Ok(self.session.get::<String>(USER_KEY).await?)
    }

    /// Marks the session as logged in. The session id is cycled first so a
    /// pre-login id cannot be reused.
    pub async fn authenticate(&self, user: &UserInfo) -> Result<(), ApiError> {
        self.session.cycle_id().await?;
        self.session.insert(LOGGED_IN_KEY, true).await?;
        self.session.insert(USER_KEY, &user.email).await?;
        Ok(())
    }

    /// Drops every key and deletes the session record.
    pub async fn clear(&self) -> Result<(), ApiError> {
        self.session.flush().await?;
        Ok(())
    }

    pub async fn push_flash(
        &self,
        level: FlashLevel,
        message: impl Into<String>,
    ) -> Result<(), ApiError> {
        let mut flashes = self
            .session
            .get::<Vec<Flash>>(FLASH_KEY)
            .await?
            .unwrap_or_default();
        flashes.push(Flash {
            level,
            message: message.into(),
        });
        self.session.insert(FLASH_KEY, flashes).await?;
        Ok(())
    }

    pub async fn error(&self, message: impl Into<String>) -> Result<(), ApiError> {
        self.push_flash(FlashLevel::Error, message).await
    }

    pub async fn success(&self, message: impl Into<String>) -> Result<(), ApiError> {
        self.push_flash(FlashLevel::Success, message).await
    }

    /// Removes and returns all pending flashes.
    pub async fn take_flashes(&self) -> Result<Vec<Flash>, ApiError> {
        Ok(self
            .session
            .remove::<Vec<Flash>>(FLASH_KEY)
            .await?
            .unwrap_or_default())
    }
}
