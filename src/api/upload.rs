use axum::{
    extract::{Multipart, State, multipart::MultipartError, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::info;

use super::render::{self, Page};
use super::{ApiError, AppState, SessionContext};
use crate::services::{ClassificationOutcome, ClassifyError, Task, UploadedFile};

const TOO_LARGE: &str = "The uploaded file is too large.";

const fn field_name(task: Task) -> &'static str {
    match task {
        Task::Classify => "my_image",
        Task::Segment => "seg_image",
    }
}

const fn form_path(task: Task) -> &'static str {
    match task {
        Task::Classify => "/uploadmri",
        Task::Segment => "/segment",
    }
}

fn form_page(state: &AppState, task: Task) -> Page {
    let page = match task {
        Task::Classify => Page::new("uploadmri.html", "Classify"),
        Task::Segment => Page::new("segment.html", "Segment"),
    };
    page.with("extensions", state.profile.extension_list())
        .with_attr("accept", state.profile.accept_attribute())
}

fn ensure_available(state: &AppState, task: Task) -> Result<(), ApiError> {
    if task == Task::Segment && !state.classification.has_segmenter() {
        return Err(ApiError::not_found("Segmentation model"));
    }
    Ok(())
}

/// Pulls the named file part out of the form. Other parts are skipped.
async fn read_upload(
    mut multipart: Multipart,
    field: &str,
) -> Result<Option<UploadedFile>, MultipartError> {
    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }
        let filename = part.file_name().unwrap_or_default().to_string();
        let bytes = part.bytes().await?;
        return Ok(Some(UploadedFile { filename, bytes }));
    }
    Ok(None)
}

async fn show_form(
    state: &AppState,
    session: &SessionContext,
    task: Task,
) -> Result<Response, ApiError> {
    ensure_available(state, task)?;
    form_page(state, task).render(session).await
}

async fn handle_upload(
    state: &AppState,
    session: &SessionContext,
    task: Task,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    ensure_available(state, task)?;
    let back = || Redirect::to(form_path(task)).into_response();

    let upload = match multipart {
        Ok(multipart) => match read_upload(multipart, field_name(task)).await {
            Ok(upload) => upload,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                metrics::counter!("upload_rejections_total", "reason" => "too_large").increment(1);
                session.error(TOO_LARGE).await?;
                return Ok(back());
            }
            Err(e) => {
                info!(error = %e.body_text(), "Malformed multipart body");
                None
            }
        },
        Err(rejection) => {
            info!(error = %rejection.body_text(), "Request is not a multipart form");
            None
        }
    };

    match state.classification.run(task, upload).await {
        Ok(outcome) => render_result(state, session, &outcome).await,
        Err(ClassifyError::Unavailable) => Err(ApiError::not_found("Segmentation model")),
        Err(e) => match e.user_message() {
            Some(message) => {
                session.error(message).await?;
                Ok(back())
            }
            None => Err(ApiError::internal(e.to_string())),
        },
    }
}

async fn render_result(
    state: &AppState,
    session: &SessionContext,
    outcome: &ClassificationOutcome,
) -> Result<Response, ApiError> {
    let confidence = outcome.classification.confidence.to_string();
    let result = render::render_fragment(
        "partials/result.html",
        &[
            ("label", outcome.classification.label.as_str()),
            ("confidence", confidence.as_str()),
            ("filename", outcome.filename.as_str()),
        ],
    )
    .map_err(|e| ApiError::internal(e.to_string()))?;

    form_page(state, outcome.task)
        .with_html("result", result)
        .render(session)
        .await
}

/// GET /uploadmri
pub async fn upload_page(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    show_form(&state, &session, Task::Classify).await
}

/// POST /uploadmri
pub async fn upload(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    handle_upload(&state, &session, Task::Classify, multipart).await
}

/// GET /segment
pub async fn segment_page(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    show_form(&state, &session, Task::Segment).await
}

/// POST /segment
pub async fn segment(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    handle_upload(&state, &session, Task::Segment, multipart).await
}
