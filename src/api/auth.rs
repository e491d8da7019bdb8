use axum::{
    Form,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::render::Page;
use super::{ApiError, AppState, SessionContext};
use crate::services::AuthError;

pub const LOGIN_REQUIRED: &str = "You need to be logged in to access this page.";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password.";
pub const EMAIL_TAKEN: &str = "Email already exists. Please use a different email.";
pub const ACCOUNT_CREATED: &str = "Account created successfully.";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Redirects anonymous callers to `/login` before the handler (and its body
/// extractors) run.
pub async fn require_login(
    session: SessionContext,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if session.is_authenticated().await? {
        if let Some(user) = session.user().await? {
            tracing::Span::current().record("user_id", user.as_str());
        }
        return Ok(next.run(request).await);
    }

    info!(path = %request.uri().path(), "Anonymous request to protected page");
    session.error(LOGIN_REQUIRED).await?;
    Ok(Redirect::to("/login").into_response())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /register
pub async fn register_page(session: SessionContext) -> Result<Response, ApiError> {
    Page::new("register.html", "Register").render(&session).await
}

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, ApiError> {
    match state
        .auth
        .register(&form.name, &form.email, &form.password)
        .await
    {
        Ok(user) => {
            info!(user_id = user.id, "Account created");
            session.success(ACCOUNT_CREATED).await?;
            Ok(Redirect::to("/login"))
        }
        Err(AuthError::EmailTaken) => {
            session.error(EMAIL_TAKEN).await?;
            Ok(Redirect::to("/register"))
        }
        Err(AuthError::Validation(msg)) => {
            session.error(msg).await?;
            Ok(Redirect::to("/register"))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /login
pub async fn login_page(session: SessionContext) -> Result<Response, ApiError> {
    Page::new("login.html", "Log in").render(&session).await
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, ApiError> {
    match state.auth.login(&form.email, &form.password).await {
        Ok(user) => {
            session.authenticate(&user).await?;
            info!(user_id = user.id, "User logged in");
            Ok(Redirect::to(&state.profile.post_login_route))
        }
        Err(AuthError::InvalidCredentials | AuthError::Validation(_)) => {
            warn!("Failed login attempt");
            session.error(INVALID_CREDENTIALS).await?;
            Ok(Redirect::to("/login"))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /logout
pub async fn logout(session: SessionContext) -> Result<Redirect, ApiError> {
    session.clear().await?;
    Ok(Redirect::to("/"))
}
