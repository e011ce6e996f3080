//! tiercache server
//!
//! Runs a tiered cache in front of Redis (or an in-memory store) and exposes
//! its operational surface over HTTP.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        tiercache                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Health server (:8081)         Metrics server (:8080)       │
//! │  /healthz  /readyz             /metrics  /stats             │
//! │        │                              │                     │
//! │        └──────────┬───────────────────┘                     │
//! │              TieredCache ──▶ RemoteStore                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::config::CacheSettings;
use tiercache::error::{Error, Result};
use tiercache::monitoring::{HealthCheck, PrometheusExporter};
use tiercache::store::{InMemoryStore, RemoteStore};
use tiercache::{TieredCache, Warmup};

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - two-tier cache with circuit breaking and warm-up
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (YAML, or JSON with a .json extension)
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Remote store URL (overrides the settings file)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Directory of JSON documents used to seed warm-up keys
    #[arg(long, env = "TIERCACHE_SEED_DIR")]
    seed_dir: Option<PathBuf>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Clone)]
struct AppState {
    cache: Arc<TieredCache>,
    health: Arc<HealthCheck>,
    exporter: Arc<PrometheusExporter>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting tiercache");

    let mut settings = match &args.config {
        Some(path) => {
            info!("  Settings file: {}", path.display());
            CacheSettings::from_file(path)?
        }
        None => CacheSettings::default(),
    };
    if let Some(url) = &args.redis_url {
        settings.remote.url = Some(url.clone());
    }
    settings.validate()?;

    let store = build_store(&settings).await?;
    let cache = Arc::new(TieredCache::new(store, settings.cache_config()?));
    let health = Arc::new(HealthCheck::new(Arc::clone(&cache)));
    let exporter = Arc::new(PrometheusExporter::new("tiercache")?);

    let state = AppState {
        cache: Arc::clone(&cache),
        health: Arc::clone(&health),
        exporter,
    };

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_state).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_state).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Warm up, then report ready
    let warmup = build_warmup(&settings, args.seed_dir.as_deref())?;
    let result = warmup.run_with_retry(&cache).await;
    if result.error_count > 0 {
        warn!(
            "Warm-up left {} keys unloaded; serving anyway",
            result.error_count
        );
    }
    health.set_ready(true);
    info!("tiercache ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    health.set_ready(false);
    cache.shutdown().await;

    info!("tiercache shutdown complete");
    Ok(())
}

// =============================================================================
// Wiring
// =============================================================================

async fn build_store(settings: &CacheSettings) -> Result<Arc<dyn RemoteStore>> {
    if let Some(store) = connect_remote(settings).await? {
        return Ok(store);
    }

    info!("  Remote store: in-memory");
    Ok(Arc::new(InMemoryStore::new()))
}

#[cfg(feature = "redis-store")]
async fn connect_remote(settings: &CacheSettings) -> Result<Option<Arc<dyn RemoteStore>>> {
    use tiercache::store::{RedisStore, RedisStoreConfig};

    let Some(url) = &settings.remote.url else {
        return Ok(None);
    };
    let config = RedisStoreConfig {
        url: url.clone(),
        command_timeout: settings.remote_command_timeout()?,
    };
    let store = RedisStore::connect(&config).await?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "redis-store"))]
async fn connect_remote(settings: &CacheSettings) -> Result<Option<Arc<dyn RemoteStore>>> {
    if settings.remote.url.is_some() {
        warn!("Built without the redis-store feature; ignoring remote URL");
    }
    Ok(None)
}

/// Warm-up that loads `<seed_dir>/<category>/<key>.json` for each configured key
fn build_warmup(settings: &CacheSettings, seed_dir: Option<&Path>) -> Result<Warmup> {
    let config = settings.warmup_config()?;
    let categories: Vec<String> = config.keys.keys().cloned().collect();
    let mut warmup = Warmup::new(config);

    let Some(seed_dir) = seed_dir else {
        if !categories.is_empty() {
            warn!("Warm-up keys configured without --seed-dir; they will be reported as failed");
        }
        return Ok(warmup);
    };

    for category in categories {
        let dir = seed_dir.join(&category);
        warmup = warmup.with_resolver(category, move |key: String| {
            let path = dir.join(format!("{}.json", key.replace(':', "_")));
            async move {
                let raw = tokio::fs::read(&path).await.map_err(|e| {
                    anyhow::anyhow!("failed to read seed {}: {}", path.display(), e)
                })?;
                let value: serde_json::Value = serde_json::from_slice(&raw)?;
                Ok::<_, anyhow::Error>(value)
            }
        });
    }

    Ok(warmup)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// HTTP
// =============================================================================

mod http {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::{Response, StatusCode};
    use serde::Serialize;

    pub type HttpResponse = Response<Full<Bytes>>;

    pub fn respond(
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) -> HttpResponse {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
        match serde_json::to_vec(value) {
            Ok(body) => respond(status, "application/json", body),
            Err(e) => respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("serialization error: {}", e),
            ),
        }
    }

    pub fn not_found() -> HttpResponse {
        respond(StatusCode::NOT_FOUND, "text/plain", "not found")
    }
}

async fn serve<F, Fut>(addr: &str, name: &'static str, state: AppState, handler: F) -> Result<()>
where
    F: Fn(AppState, String) -> Fut + Copy + Send + Sync + 'static,
    Fut: std::future::Future<Output = http::HttpResponse> + Send + 'static,
{
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} server address: {}", name, e)))?;

    let listener = TcpListener::bind(addr).await?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                let response = handler(state.clone(), req.uri().path().to_string());
                async move { Ok::<_, std::convert::Infallible>(response.await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("{} server connection error: {}", name, e);
            }
        });
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, state: AppState) -> Result<()> {
    serve(addr, "Health", state, health_handler).await
}

async fn health_handler(state: AppState, path: String) -> http::HttpResponse {
    use hyper::StatusCode;

    let response = match path.as_str() {
        "/healthz" | "/livez" => state.health.liveness(),
        "/readyz" => state.health.readiness().await,
        _ => return http::not_found(),
    };

    let status = if response.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    http::json(status, &response)
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, state: AppState) -> Result<()> {
    serve(addr, "Metrics", state, metrics_handler).await
}

async fn metrics_handler(state: AppState, path: String) -> http::HttpResponse {
    use hyper::StatusCode;

    match path.as_str() {
        "/metrics" => match state.exporter.scrape(&state.cache) {
            Ok(text) => http::respond(StatusCode::OK, state.exporter.content_type(), text),
            Err(e) => http::respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                e.to_string(),
            ),
        },
        "/stats" => http::json(
            StatusCode::OK,
            &serde_json::json!({
                "metrics": state.cache.metrics(),
                "circuit_breaker": state.cache.circuit_breaker_state(),
                "fast_tier": state.cache.memory_cache_stats(),
                "pending_resolutions": state.cache.pending_resolutions(),
            }),
        ),
        _ => http::not_found(),
    }
}
