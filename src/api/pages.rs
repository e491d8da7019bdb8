use axum::{extract::State, http::StatusCode, response::Response};
use std::sync::Arc;

use super::render::Page;
use super::{ApiError, AppState, SessionContext};

/// Decision threshold shown on the explainer page.
fn threshold_text(threshold: f32) -> String {
    format!("{threshold:.2}")
}

/// GET /
pub async fn index(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    let heading = match state.profile.variant {
        crate::domain::Variant::Animal => "Cat or dog?",
        crate::domain::Variant::Medical => "Scan classification",
    };

    Page::new("index.html", "Welcome")
        .with("heading", heading)
        .with("positive", &state.profile.labels.positive)
        .with("negative", &state.profile.labels.negative)
        .render(&session)
        .await
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    let user = session.user().await?.unwrap_or_default();

    Page::new("dashboard.html", "Dashboard")
        .with("user", user)
        .with("positive", &state.profile.labels.positive)
        .with("negative", &state.profile.labels.negative)
        .render(&session)
        .await
}

/// GET /home
pub async fn home(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    let user = session.user().await?.unwrap_or_default();
    let segment_link = if state.classification.has_segmenter() {
        r#"<li><a class="button" href="/segment">Segment a scan</a></li>"#.to_string()
    } else {
        String::new()
    };

    Page::new("home.html", "Home")
        .with("user", user)
        .with_html("segment_link", segment_link)
        .render(&session)
        .await
}

/// GET /faq
pub async fn faq(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    Page::new("faq.html", "FAQ")
        .with("extensions", state.profile.extension_list())
        .render(&session)
        .await
}

/// GET /Howitworks
pub async fn how_it_works(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    let profile = &state.profile;

    Page::new("howitworks.html", "How it works")
        .with("extensions", profile.extension_list())
        .with("size", profile.image_size.to_string())
        .with("threshold", threshold_text(profile.decision_threshold))
        .with("positive", &profile.labels.positive)
        .with("negative", &profile.labels.negative)
        .render(&session)
        .await
}

pub async fn not_found(session: SessionContext) -> Result<Response, ApiError> {
    Page::new("error.html", "Not Found")
        .status(StatusCode::NOT_FOUND)
        .with("status", "404")
        .with("message", "The page you requested does not exist.")
        .render(&session)
        .await
}
