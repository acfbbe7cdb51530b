//! Prometheus metrics and Kubernetes probe endpoints.
//!
//! Serves `/metrics`, `/healthz` (liveness) and `/readyz` (readiness). The
//! controller is ready once the object caches completed their first listing.

use aws_client::{ApiObserver, CallOutcome};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Controller metrics plus the readiness flag.
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounter,
    reconcile_errors: IntCounterVec,
    managed_services: IntGauge,
    aws_requests: IntCounterVec,
    ready: AtomicBool,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create and register every metric on a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_total = IntCounter::new("nlb_reconcile_total", "Total number of Service reconciles")?;
        let reconcile_errors = IntCounterVec::new(
            Opts::new("nlb_reconcile_errors_total", "Total number of failed Service reconciles"),
            &["service"],
        )?;
        let managed_services = IntGauge::new(
            "nlb_managed_services",
            "Number of Services with a converged load balancer",
        )?;
        let aws_requests = IntCounterVec::new(
            Opts::new("nlb_aws_api_requests_total", "Total number of AWS API requests"),
            &["operation", "outcome"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_errors.clone()))?;
        registry.register(Box::new(managed_services.clone()))?;
        registry.register(Box::new(aws_requests.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_errors,
            managed_services,
            aws_requests,
            ready: AtomicBool::new(false),
        })
    }

    /// Count one reconcile attempt.
    pub fn reconcile_started(&self) {
        self.reconcile_total.inc();
    }

    /// Count one failed reconcile of `service` (`namespace/name`).
    pub fn reconcile_failed(&self, service: &str) {
        self.reconcile_errors.with_label_values(&[service]).inc();
    }

    pub fn set_managed_services(&self, count: usize) {
        self.managed_services
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        info!("Caches synced, controller marked ready");
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl ApiObserver for Metrics {
    fn observe(&self, operation: &'static str, outcome: CallOutcome) {
        self.aws_requests
            .with_label_values(&[operation, outcome.as_str()])
            .inc();
    }
}

/// Router with the metrics and probe endpoints.
pub fn router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serve [`router`] on `0.0.0.0:port` until the server fails.
pub async fn serve(metrics: Arc<Metrics>, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port, "Metrics server listening");
    axum::serve(listener, router(metrics)).await
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        ),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                e.to_string(),
            )
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(metrics): State<Arc<Metrics>>) -> StatusCode {
    if metrics.is_ready() {
        StatusCode::OK
    } else {
        debug!("Readiness probe: caches not synced yet");
        StatusCode::SERVICE_UNAVAILABLE
    }
}
