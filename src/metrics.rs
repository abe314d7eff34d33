use std::time::Duration;

use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,
    request_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    inflight_requests: IntGauge,
    relay_errors_total: IntCounterVec,
    token_acquisitions_total: IntCounterVec,
    upstream_duration_seconds: HistogramVec,
}

pub struct InflightGuard<'a> {
    metrics: &'a RelayMetrics,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_total = IntCounterVec::new(
            opts!(
                "relay_http_requests_total",
                "Total HTTP requests processed by the chat relay"
            ),
            &["path", "method", "status"],
        )
        .expect("valid request_total metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["path", "method"],
        )
        .expect("valid request_duration_seconds metric");

        let inflight_requests = IntGauge::new(
            "relay_inflight_requests",
            "Current in-flight chat requests",
        )
        .expect("valid inflight_requests metric");

        let relay_errors_total = IntCounterVec::new(
            opts!(
                "relay_errors_total",
                "Failed chat relays by error kind"
            ),
            &["kind"],
        )
        .expect("valid relay_errors_total metric");

        let token_acquisitions_total = IntCounterVec::new(
            opts!(
                "relay_token_acquisitions_total",
                "Bearer token acquisitions by outcome"
            ),
            &["outcome"],
        )
        .expect("valid token_acquisitions_total metric");

        let upstream_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_upstream_duration_seconds",
                "Outbound call latency in seconds by pipeline stage",
            ),
            &["stage"],
        )
        .expect("valid upstream_duration_seconds metric");

        registry
            .register(Box::new(request_total.clone()))
            .expect("register request_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("register request_duration_seconds");
        registry
            .register(Box::new(inflight_requests.clone()))
            .expect("register inflight_requests");
        registry
            .register(Box::new(relay_errors_total.clone()))
            .expect("register relay_errors_total");
        registry
            .register(Box::new(token_acquisitions_total.clone()))
            .expect("register token_acquisitions_total");
        registry
            .register(Box::new(upstream_duration_seconds.clone()))
            .expect("register upstream_duration_seconds");

        Self {
            registry,
            request_total,
            request_duration_seconds,
            inflight_requests,
            relay_errors_total,
            token_acquisitions_total,
            upstream_duration_seconds,
        }
    }

    pub fn inflight_guard(&self) -> InflightGuard<'_> {
        self.inflight_requests.inc();
        InflightGuard { metrics: self }
    }

    pub fn observe_request(&self, path: &str, method: &str, status: u16, duration: Duration) {
        let status_label = status.to_string();
        self.request_total
            .with_label_values(&[path, method, &status_label])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[path, method])
            .observe(duration.as_secs_f64());
    }

    pub fn observe_error(&self, kind: &str) {
        self.relay_errors_total.with_label_values(&[kind]).inc();
    }

    pub fn observe_token(&self, outcome: &str) {
        self.token_acquisitions_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn observe_upstream(&self, stage: &str, duration: Duration) {
        self.upstream_duration_seconds
            .with_label_values(&[stage])
            .observe(duration.as_secs_f64());
    }

    pub fn render(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|error| error.to_string())?;
        String::from_utf8(buffer).map_err(|error| error.to_string())
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.inflight_requests.dec();
    }
}
