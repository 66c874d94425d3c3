use anyhow::{anyhow, Context, Result};
use axum::{
  extract::{DefaultBodyLimit, MatchedPath, Request},
  http::header,
  middleware::{self, Next},
  response::{Html, IntoResponse},
  routing::{get, post},
  Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::future::ready;
use std::{path::Path, sync::Arc};
use tokio::signal;
use tokio::time::{Duration, Instant};
use tower_http::{
  catch_panic::CatchPanicLayer,
  timeout::TimeoutLayer,
  trace::{self, TraceLayer},
};
use tracing::{info, Level};
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use crate::config::{AppConfig, Config, StorageType};
use crate::storage::{self, Storage};

mod error;
mod retrieve;
mod upload;

pub use error::AppError;
pub use upload::UPLOAD_FIELD;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const FAVICON_PNG: &[u8] = include_bytes!("../../static/favicon.png");

/// Metric label for requests that matched no route.
const UNMATCHED_PATH: &str = "unmatched";

#[derive(OpenApi)]
#[openapi(
  paths(upload::upload, retrieve::retrieve),
  components(schemas(upload::UploadForm)),
  info(
    title = "Rusty Stash API",
    version = "0.1.0",
    description = "Content addressed image stash. Uploads are normalized to JPEG and served back by digest"
  )
)]
struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
  storage_client: Arc<dyn Storage>,
}

impl AppState {
  pub fn new(storage_client: Arc<dyn Storage>) -> Self {
    Self { storage_client }
  }
}

/// Builds the storage backend selected in `cfg` and the router on top of it.
pub fn bootstrap(cfg: &Config) -> Result<Router> {
  let storage_client = storage_client(cfg)?;

  router(&cfg.app, AppState::new(storage_client))
}

fn storage_client(cfg: &Config) -> Result<Arc<dyn Storage>> {
  let client: Arc<dyn Storage> = match cfg.storage.storage_type {
    StorageType::Local => {
      let local = cfg
        .storage
        .local
        .as_ref()
        .context("local storage config is missing")?;
      let path = Path::new(&local.path).to_path_buf();
      info!("storing images in {}", path.display());
      Arc::new(storage::local::Client::new(path))
    }
    StorageType::S3 => {
      let storage_config = match &cfg.storage.s3 {
        Some(s3) => s3,
        None => return Err(anyhow!("S3 storage config is missing")),
      };

      let cred = aws_sdk_s3::config::Credentials::new(
        storage_config.access_key_id.clone(),
        storage_config.secret_access_key.clone(),
        None,
        None,
        "loaded-from-custom-env",
      );

      let s3_config = aws_sdk_s3::config::Builder::new()
        .endpoint_url(storage_config.endpoint.clone())
        .credentials_provider(cred)
        .region(aws_sdk_s3::config::Region::new(
          storage_config.region.clone(),
        ))
        .force_path_style(storage_config.force_path_style) // apply bucketname as path param instead of pre-domain
        .behavior_version_latest()
        .build();

      let client = aws_sdk_s3::Client::from_conf(s3_config);
      info!("storing images in bucket {}", storage_config.bucket);
      Arc::new(storage::s3::Client::new(
        client,
        storage_config.bucket.as_str(),
        storage_config.prefix.as_deref(),
      ))
    }
    StorageType::Memory => {
      info!("storing images in memory, they will not survive a restart");
      Arc::new(storage::memory::Client::new())
    }
  };

  Ok(client)
}

pub fn router(cfg: &AppConfig, state: AppState) -> Result<Router> {
  let upload_app = Router::new()
    .route("/upload", post(upload::upload))
    .layer(DefaultBodyLimit::max(body_limit_bytes(cfg.max_body_size_mb)?));

  let public_app = Router::new()
    .route("/", get(index))
    .route("/favicon.ico", get(favicon))
    .route("/:id", get(retrieve::retrieve));

  let mut app = Router::new()
    .merge(upload_app)
    .merge(public_app)
    .with_state(state);

  // Conditionally add OpenAPI routes if enabled
  if cfg.enable_openapi.unwrap_or(false) {
    app = app
      .merge(Redoc::with_url(
        "/redoc",
        serde_json::to_value(ApiDoc::openapi()).context("failed to serialize OpenAPI document")?,
      ))
      .route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
      );
  }

  let app = app.layer((
    middleware::from_fn(track_metrics),
    TraceLayer::new_for_http()
      .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
      .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
    TimeoutLayer::new(Duration::from_secs(60)),
    CatchPanicLayer::new(),
  ));

  Ok(app)
}

fn body_limit_bytes(max_body_size_mb: usize) -> Result<usize> {
  max_body_size_mb
    .checked_mul(1024 * 1024)
    .with_context(|| format!("max_body_size_mb {} is too large", max_body_size_mb))
}

async fn index() -> Html<&'static str> {
  Html(INDEX_HTML)
}

async fn favicon() -> impl IntoResponse {
  ([(header::CONTENT_TYPE, "image/png")], FAVICON_PNG)
}

pub async fn serve(router: Router, listen: &str) -> Result<()> {
  let listener = tokio::net::TcpListener::bind(listen)
    .await
    .with_context(|| format!("failed to bind to address {}", listen))?;
  info!("listening on {}", listen);

  axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("error running HTTP server")
}

async fn healthz() -> &'static str {
  "pong"
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      tracing::error!("failed to install Ctrl+C handler: {}", e);
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!("failed to install signal handler: {}", e);
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
      _ = ctrl_c => {},
      _ = terminate => {},
  }
}

pub async fn serve_metrics(listen: &str) -> Result<()> {
  let app = metrics_app()?;

  let listener = tokio::net::TcpListener::bind(listen)
    .await
    .with_context(|| format!("failed to bind to address {}", listen))?;
  info!("serving metrics on {}", listen);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("error running metrics HTTP server")
}

fn metrics_app() -> Result<Router> {
  let recorder_handle = setup_metrics_recorder()?;
  Ok(
    Router::new()
      .route("/metrics", get(move || ready(recorder_handle.render())))
      .route("/healthz", get(healthz)),
  )
}

fn setup_metrics_recorder() -> Result<PrometheusHandle> {
  const EXPONENTIAL_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
  ];

  let handle = PrometheusBuilder::new()
    .set_buckets_for_metric(
      Matcher::Full("http_requests_duration_seconds".to_string()),
      EXPONENTIAL_SECONDS,
    )?
    .install_recorder()?;

  Ok(handle)
}

fn path_label(req: &Request) -> String {
  match req.extensions().get::<MatchedPath>() {
    Some(matched_path) => matched_path.as_str().to_owned(),
    None => UNMATCHED_PATH.to_owned(),
  }
}

async fn track_metrics(req: Request, next: Next) -> impl IntoResponse {
  let start = Instant::now();
  let path = path_label(&req);
  let method = req.method().clone();

  let response = next.run(req).await;

  let latency = start.elapsed().as_secs_f64();
  let status = response.status().as_u16().to_string();

  let labels = [
    ("method", method.to_string()),
    ("path", path),
    ("status", status),
  ];

  metrics::counter!("http_requests_total", &labels).increment(1);
  metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

  response
}
