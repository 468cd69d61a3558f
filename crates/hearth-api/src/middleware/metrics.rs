// SPDX-License-Identifier: BUSL-1.1
//! # Prometheus Metrics
//!
//! HTTP request metrics are recorded by [`metrics_middleware`]. Dispute
//! counters are incremented by the handlers. The `hearth_disputes{status}`
//! gauge is refreshed from the store on each `/metrics` scrape.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use hearth_disputes::{DisputeCounts, DisputeStatus, SettlementOperation};
use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    disputes_filed_total: IntCounterVec,
    disputes_resolved_total: IntCounterVec,
    settlement_operations_total: IntCounterVec,
    disputes: GaugeVec,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

fn counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("metric can be created")
}

impl ApiMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = counter(
            "hearth_http_requests_total",
            "Total HTTP requests",
            &["method", "path", "status"],
        );
        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "hearth_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["method", "path"],
        )
        .expect("metric can be created");
        let http_errors_total = counter(
            "hearth_http_errors_total",
            "Total HTTP errors (4xx and 5xx)",
            &["method", "path", "status"],
        );

        let disputes_filed_total = counter(
            "hearth_disputes_filed_total",
            "Disputes filed, by filer role",
            &["role"],
        );
        let disputes_resolved_total = counter(
            "hearth_disputes_resolved_total",
            "Disputes resolved, by resolution action",
            &["action"],
        );
        let settlement_operations_total = counter(
            "hearth_settlement_operations_total",
            "Settlement operations attempted, by kind and final status",
            &["kind", "status"],
        );
        let disputes = GaugeVec::new(
            Opts::new("hearth_disputes", "Disputes currently in each status"),
            &["status"],
        )
        .expect("metric can be created");

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(http_requests_total.clone()),
            Box::new(http_request_duration_seconds.clone()),
            Box::new(http_errors_total.clone()),
            Box::new(disputes_filed_total.clone()),
            Box::new(disputes_resolved_total.clone()),
            Box::new(settlement_operations_total.clone()),
            Box::new(disputes.clone()),
        ];
        for c in collectors {
            registry.register(c).expect("metric can be registered");
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                disputes_filed_total,
                disputes_resolved_total,
                settlement_operations_total,
                disputes,
            }),
        }
    }

    fn sum(counter: &IntCounterVec) -> u64 {
        counter
            .collect()
            .iter()
            .flat_map(|mf| mf.get_metric())
            .map(|m| m.get_counter().get_value() as u64)
            .sum()
    }

    pub fn requests(&self) -> u64 {
        Self::sum(&self.inner.http_requests_total)
    }

    pub fn errors(&self) -> u64 {
        Self::sum(&self.inner.http_errors_total)
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    // -- Domain counters --

    pub fn dispute_filed(&self, role: &str) {
        self.inner.disputes_filed_total.with_label_values(&[role]).inc();
    }

    pub fn dispute_resolved(&self, action: &str) {
        self.inner
            .disputes_resolved_total
            .with_label_values(&[action])
            .inc();
    }

    pub fn settlements(&self, ops: &[SettlementOperation]) {
        for op in ops {
            self.inner
                .settlement_operations_total
                .with_label_values(&[op.kind.as_str(), op.status.as_str()])
                .inc();
        }
    }

    pub fn filed_count(&self, role: &str) -> u64 {
        self.inner.disputes_filed_total.with_label_values(&[role]).get()
    }

    /// Refresh the per-status gauge (pull model).
    pub fn set_dispute_counts(&self, counts: &DisputeCounts) {
        for status in DisputeStatus::ALL {
            self.inner
                .disputes
                .with_label_values(&[status.as_str()])
                .set(counts.get(status) as f64);
        }
    }

    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace UUID path segments with `{id}` to bound label cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.len() == 36
                && segment.chars().enumerate().all(|(i, c)| {
                    if i == 8 || i == 13 || i == 18 || i == 23 {
                        c == '-'
                    } else {
                        c.is_ascii_hexdigit()
                    }
                })
            {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.record_request(
            &method,
            &path,
            response.status().as_u16(),
            start.elapsed().as_secs_f64(),
        );
    }
    response
}
