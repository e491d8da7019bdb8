use axum::{Router, extract::DefaultBodyLimit, middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer, cookie::Key, cookie::SameSite};
use tower_sessions_sqlx_store::SqliteStore;
use sea_orm::ConnectionTrait;

use crate::config::Config;
use crate::db::Store;
use crate::domain::DeploymentProfile;
use crate::services::{AuthService, ClassificationService, Model, SeaOrmAuthService};
use metrics_exporter_prometheus::PrometheusHandle;

mod assets;
pub mod auth;
mod error;
mod observability;
mod pages;
pub mod render;
pub mod session;
mod upload;

pub use error::ApiError;
pub use session::SessionContext;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub profile: Arc<DeploymentProfile>,

    pub store: Store,

    pub auth: Arc<dyn AuthService>,

    pub classification: Arc<ClassificationService>,

    /// Session records live in the application database so expired ones can
    /// be reaped.
    pub session_store: SqliteStore,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

/// Builds state around models that are already loaded. The upload
/// directory and the session table are created if missing.
pub async fn create_app_state(
    config: Config,
    store: Store,
    classifier: Arc<dyn Model>,
    segmenter: Option<Arc<dyn Model>>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    use anyhow::Context;

    let profile = config.profile.resolve();

    tokio::fs::create_dir_all(&config.uploads.directory)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory {}",
                config.uploads.directory
            )
        })?;

    if store.conn.get_database_backend() != sea_orm::DbBackend::Sqlite {
        anyhow::bail!("Session storage requires a SQLite database");
    }
    let session_store = SqliteStore::new(store.conn.get_sqlite_connection_pool().clone());
    session_store
        .migrate()
        .await
        .context("Failed to create session table")?;

    let auth: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        config.security.clone(),
    ));

    let classification = Arc::new(ClassificationService::from_config(
        &config, &profile, classifier, segmenter,
    ));

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        profile: Arc::new(profile),
        store,
        auth,
        classification,
        session_store,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

/// Opens the database and loads the configured models. Any failure here is
/// a startup error.
pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let models = config.models.clone();
    let (classifier, segmenter) = tokio::task::spawn_blocking(move || {
        crate::services::inference::load_configured_models(&models)
    })
    .await??;

    create_app_state(config, store, classifier, segmenter, prometheus_handle).await
}

pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let config = &state.config;

    let key = if config.session.secret.is_empty() {
        Key::generate()
    } else {
        Key::try_from(config.session.secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {e}"))?
    };

    let session_layer = SessionManagerLayer::new(state.session_store.clone())
        .with_name("imgclass_session")
        .with_secure(config.server.secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            config.session.idle_timeout_minutes.saturating_mul(60),
        )))
        .with_signed(key);

    let body_limit = config.server.max_upload_bytes;

    let protected_routes = create_protected_router(&state);

    Ok(Router::new()
        .merge(protected_routes)
        .route("/", get(pages::index))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/faq", get(pages::faq))
        .route("/Howitworks", get(pages::how_it_works))
        .route("/healthz", get(observability::healthz))
        .route("/static/{*path}", get(assets::serve_asset))
        .fallback(pages::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(session_layer)
        .with_state(state)
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http()))
}

fn create_protected_router(state: &AppState) -> Router<Arc<AppState>> {
    let mut routes = Router::new()
        .route("/uploadmri", get(upload::upload_page).post(upload::upload))
        .route("/segment", get(upload::segment_page).post(upload::segment))
        .route("/dashboard", get(pages::dashboard))
        .route("/home", get(pages::home));

    if state.prometheus_handle.is_some() {
        routes = routes.route("/metrics", get(observability::get_metrics));
    }

    routes.route_layer(middleware::from_fn(auth::require_login))
}
