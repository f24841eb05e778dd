//! adboard is a classifieds backend: ads, comments and accounts, each ad and
//! avatar backed by an image file it owns.
#![forbid(unsafe_code)]

mod account;
mod ad;
mod asset;
mod clock;
mod comment;
mod crypto;
mod database;
pub mod error;
mod guard;
mod identity;
mod router;
pub mod telemetry;
#[cfg(test)]
mod testing;

pub mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::account::{AccountManager, AvatarPolicy};
use crate::ad::AdManager;
use crate::asset::store::AssetStore;
use crate::clock::{Clock, SystemClock};
use crate::comment::CommentManager;
use crate::crypto::PasswordHasher;
use crate::database::Repositories;

/// Environment variable overriding the `config.yaml` location.
const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    credentials: Option<(&str, &str)>,
    content_type: &str,
    body: impl Into<axum::body::Body>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use base64::Engine;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, content_type);

    if let Some((email, password)) = credentials {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{email}:{password}"));
        request = request.header(header::AUTHORIZATION, format!("Basic {encoded}"));
    }

    app.oneshot(request.body(body.into()).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub ads: AdManager,
    pub comments: CommentManager,
    pub accounts: AccountManager,
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Wire managers onto a record store and the image buckets.
    pub fn new(
        config: Arc<config::Configuration>,
        repositories: Repositories,
        hasher: Arc<dyn PasswordHasher>,
        assets: AssetStore,
        clock: Arc<dyn Clock>,
        metrics: PrometheusHandle,
    ) -> Self {
        let storage = &config.storage;

        let ads = AdManager::new(
            Arc::clone(&repositories.ads),
            Arc::clone(&repositories.identities),
            assets.clone(),
            storage.max_file_size,
        );
        let comments = CommentManager::new(
            Arc::clone(&repositories.ads),
            Arc::clone(&repositories.comments),
            Arc::clone(&repositories.identities),
            clock,
        );
        let accounts = AccountManager::new(
            Arc::clone(&repositories.identities),
            hasher,
            assets,
            AvatarPolicy {
                max_file_size: storage.max_file_size,
                naming: storage.avatar_naming,
            },
            config.allow_admin_registration,
        );

        Self {
            config,
            ads,
            comments,
            accounts,
            metrics,
        }
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `POST /login` goes to `login`.
        .route("/login", post(router::auth::login))
        // `POST /register` goes to `register`.
        .route("/register", post(router::auth::register))
        // Public image retrieval.
        .route("/ads-images/{filename}", get(router::images::ad_image))
        .route("/avatars/{filename}", get(router::images::avatar))
        // `GET /metrics` renders the Prometheus registry.
        .route("/metrics", get(render_metrics))
        .nest("/ads", router::ads::router(state.clone()))
        .nest("/users", router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_default();
    let config = config::Configuration::default().path(path).read();

    let repositories = match config.postgres {
        Some(ref config) => {
            let db = database::Database::new(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?;

            // execute migrations scripts on start.
            sqlx::migrate!().run(&db.postgres).await?;

            Repositories::postgres(&db)
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, records are kept in memory"
            );
            Repositories::memory()
        },
    };

    let hasher = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    let assets = AssetStore::new(
        config.storage.avatar_dir.clone(),
        config.storage.ad_image_dir.clone(),
    );
    assets.init().await;

    let metrics = telemetry::setup_metrics_recorder()?;

    Ok(AppState::new(
        config,
        repositories,
        hasher,
        assets,
        Arc::new(SystemClock),
        metrics,
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn test_metrics_route() {
        let fixture = Fixture::new().await;

        let response =
            make_request(fixture.app(), Method::GET, "/metrics", None, "", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            make_request(fixture.app(), Method::GET, "/unknown", None, "", Body::empty()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
