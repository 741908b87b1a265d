//! # Prometheus Metrics
//!
//! Operational metrics for the registry node, scraped at `/metrics` on the
//! metrics port. All names carry the `credvault_` prefix.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Issuers newly granted the issuer capability.
    pub issuers_added_total: IntCounter,
    pub credential_types_added_total: IntCounter,
    pub credentials_issued_total: IntCounter,
    /// Registry calls refused for permissions, bad ids, or bad input.
    pub registry_rejections_total: IntCounter,
    pub blobs_published_total: IntCounter,
    pub blobs_fetched_total: IntCounter,
    /// Latency of every API request, in seconds.
    pub http_request_duration_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("credvault".into()), None)?;

        let issuers_added_total = counter(
            &registry,
            "issuers_added_total",
            "Addresses newly granted the issuer capability",
        )?;
        let credential_types_added_total = counter(
            &registry,
            "credential_types_added_total",
            "Credential types created",
        )?;
        let credentials_issued_total =
            counter(&registry, "credentials_issued_total", "Credentials issued")?;
        let registry_rejections_total = counter(
            &registry,
            "registry_rejections_total",
            "Registry calls rejected",
        )?;
        let blobs_published_total = counter(
            &registry,
            "blobs_published_total",
            "Blobs accepted by the blob endpoint",
        )?;
        let blobs_fetched_total = counter(
            &registry,
            "blobs_fetched_total",
            "Blobs served by the blob endpoint",
        )?;

        let http_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "API request latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            issuers_added_total,
            credential_types_added_total,
            credentials_issued_total,
            registry_rejections_total,
            blobs_published_total,
            blobs_fetched_total,
            http_request_duration_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
