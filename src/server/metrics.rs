//! Prometheus Metrics
//!
//! Request counters live in a private registry owned by the server state.
//! Cache statistics are copied into gauges on every scrape.

use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::CacheStats;
use crate::error::{Error, Result};

/// Server metrics registry
pub struct ServerMetrics {
    registry: Registry,
    requests: IntCounterVec,
    bytes_sent: IntCounterVec,
    in_flight: IntGauge,
    cache: IntGaugeVec,
}

fn prometheus_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registry: {}", e))
}

impl ServerMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("s3layer_http_requests_total", "Total number of S3 API requests"),
            &["method", "status"],
        )
        .map_err(prometheus_error)?;
        let bytes_sent = IntCounterVec::new(
            Opts::new("s3layer_bytes_sent_total", "Object bytes sent to clients"),
            &["source"],
        )
        .map_err(prometheus_error)?;
        let in_flight = IntGauge::new(
            "s3layer_requests_in_flight",
            "Number of S3 API requests being served",
        )
        .map_err(prometheus_error)?;
        let cache = IntGaugeVec::new(
            Opts::new("s3layer_cache", "Object cache statistics"),
            &["stat"],
        )
        .map_err(prometheus_error)?;

        registry
            .register(Box::new(requests.clone()))
            .map_err(prometheus_error)?;
        registry
            .register(Box::new(bytes_sent.clone()))
            .map_err(prometheus_error)?;
        registry
            .register(Box::new(in_flight.clone()))
            .map_err(prometheus_error)?;
        registry
            .register(Box::new(cache.clone()))
            .map_err(prometheus_error)?;

        Ok(Self {
            registry,
            requests,
            bytes_sent,
            in_flight,
            cache,
        })
    }

    pub fn record_request(&self, method: &str, status: u16) {
        self.requests
            .with_label_values(&[method, &status.to_string()])
            .inc();
    }

    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.with_label_values(&["object"]).inc_by(bytes);
    }

    pub fn request_started(&self) {
        self.in_flight.inc();
    }

    pub fn request_finished(&self) {
        self.in_flight.dec();
    }

    pub fn requests_total(&self, method: &str, status: u16) -> u64 {
        self.requests
            .with_label_values(&[method, &status.to_string()])
            .get()
    }

    /// Encode the registry in the Prometheus text format
    pub fn render(&self, cache: Option<&CacheStats>) -> Result<(String, Vec<u8>)> {
        if let Some(stats) = cache {
            for (name, value) in [
                ("hits", stats.hits),
                ("misses", stats.misses),
                ("waits", stats.waits),
                ("fills_started", stats.fills_started),
                ("fills_completed", stats.fills_completed),
                ("fills_purged", stats.fills_purged),
                ("evictions", stats.evictions),
                ("invalidations", stats.invalidations),
                ("size_bytes", stats.size_bytes),
                ("reserved_bytes", stats.reserved_bytes),
                ("capacity_bytes", stats.capacity),
                ("entries", stats.entries as u64),
            ] {
                self.cache
                    .with_label_values(&[name])
                    .set(value.min(i64::MAX as u64) as i64);
            }
        }

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prometheus_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
