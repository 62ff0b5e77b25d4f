//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "function_controller_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).expect("reconciliations metric registers");

    /// Total number of failed reconciliations
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "function_controller_reconciliation_errors_total",
        "Total number of failed reconciliations",
        &["kind"]
    ).expect("reconciliation errors metric registers");

    /// Keys given up on after the retry ceiling or a permanent error
    pub static ref DROPPED_KEYS: CounterVec = register_counter_vec!(
        "function_controller_dropped_keys_total",
        "Objects given up on until their next change",
        &["kind"]
    ).expect("dropped keys metric registers");

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "function_controller_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).expect("reconcile duration metric registers");

    /// Finalizer cleanups completed
    pub static ref CLEANUPS: CounterVec = register_counter_vec!(
        "function_controller_cleanups_total",
        "Total number of completed cleanups",
        &["kind"]
    ).expect("cleanups metric registers");

    /// Whether the local cache of a kind has completed its first list
    pub static ref CACHE_SYNCED: GaugeVec = register_gauge_vec!(
        "function_controller_cache_synced",
        "Local cache synced (1) or not (0)",
        &["kind"]
    ).expect("cache synced metric registers");
}

/// Record whether the cache of `kind` is synced
pub fn set_cache_synced(kind: &str, synced: bool) {
    CACHE_SYNCED
        .with_label_values(&[kind])
        .set(if synced { 1.0 } else { 0.0 });
}

/// Every registered cache has synced
fn caches_synced() -> bool {
    let families = prometheus::gather();
    let samples: Vec<f64> = families
        .iter()
        .filter(|family| family.get_name() == "function_controller_cache_synced")
        .flat_map(|family| family.get_metric().iter().map(|m| m.get_gauge().get_value()))
        .collect();
    !samples.is_empty() && samples.iter().all(|value| *value >= 1.0)
}

/// Serve metrics and health checks until `cancel` fires
pub async fn serve(port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }

    info!("Metrics server stopped");
    Ok(())
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" => text_response(StatusCode::OK, "ok"),
        "/readyz" if caches_synced() => text_response(StatusCode::OK, "ok"),
        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "caches not synced"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Generate metrics response
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_follows_cache_sync() {
        set_cache_synced("ReadinessCheck", false);
        assert!(!caches_synced());
        set_cache_synced("ReadinessCheck", true);
        assert!(caches_synced());
    }
}
