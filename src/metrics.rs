//! A3: coverage metrics, exposed over a minimal `/metrics` HTTP endpoint.

use {
    axum::{routing::get, Router},
    prometheus::{Encoder, IntGauge, Registry, TextEncoder},
    std::{net::SocketAddr, sync::Arc},
};

pub struct Metrics {
    registry: Registry,
    pub resolved_tokens: IntGauge,
    pub complex_tokens: IntGauge,
    pub batches_processed: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let resolved_tokens =
            IntGauge::new("resolved_tokens", "Tokens with both balance and allowance slots resolved")
                .expect("valid metric");
        let complex_tokens = IntGauge::new("complex_tokens", "Tokens classified as complex").expect("valid metric");
        let batches_processed =
            IntGauge::new("batches_processed", "Driver batches completed so far").expect("valid metric");

        registry.register(Box::new(resolved_tokens.clone())).expect("unique metric");
        registry.register(Box::new(complex_tokens.clone())).expect("unique metric");
        registry
            .register(Box::new(batches_processed.clone()))
            .expect("unique metric");

        Self {
            registry,
            resolved_tokens,
            complex_tokens,
            batches_processed,
        }
    }

    fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .expect("prometheus text encoding never fails for well-formed metrics");
        String::from_utf8(buffer).expect("prometheus output is always valid utf-8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the `/metrics` server as a background task and returns immediately.
pub fn serve(metrics: Arc<Metrics>, addr: SocketAddr) -> tokio::task::JoinHandle<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move { metrics.render() }
        }),
    );

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app).await {
                    tracing::error!(?err, "metrics server stopped unexpectedly");
                }
            }
            Err(err) => tracing::error!(?err, %addr, "failed to bind metrics server"),
        }
    })
}
