//! Request counters and response-time window
//!
//! Owned by the monitor and shared through `Arc`; each instance carries its
//! own Prometheus registry so tests never see each other's counts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::errors::{ConsoleError, Result};

/// Response-time samples kept for the rolling average
pub const MAX_RESPONSE_SAMPLES: usize = 1000;

fn metric_error(e: prometheus::Error) -> ConsoleError {
    ConsoleError::Config(format!("Metric registration failed: {}", e))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub queries: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub uptime_secs: u64,
    pub zones: i64,
    pub records: i64,
}

pub struct ConsoleMetrics {
    registry: Registry,
    queries: IntCounter,
    errors: IntCounter,
    response_time: Histogram,
    zones: IntGauge,
    records: IntGauge,
    uptime: IntGauge,
    samples: RwLock<VecDeque<f64>>,
    started: Instant,
}

impl ConsoleMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let queries = IntCounter::new("atlas_console_requests_total", "Requests handled by the gateway")
            .map_err(metric_error)?;
        let errors = IntCounter::new("atlas_console_errors_total", "Requests that ended in an error")
            .map_err(metric_error)?;
        let response_time = Histogram::with_opts(
            HistogramOpts::new("atlas_console_response_seconds", "Gateway response time in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .map_err(metric_error)?;
        let zones = IntGauge::new("atlas_console_zones", "Zones across all tenants").map_err(metric_error)?;
        let records =
            IntGauge::new("atlas_console_records", "Active records across all tenants").map_err(metric_error)?;
        let uptime = IntGauge::new("atlas_console_uptime_seconds", "Seconds since start").map_err(metric_error)?;

        registry.register(Box::new(queries.clone())).map_err(metric_error)?;
        registry.register(Box::new(errors.clone())).map_err(metric_error)?;
        registry.register(Box::new(response_time.clone())).map_err(metric_error)?;
        registry.register(Box::new(zones.clone())).map_err(metric_error)?;
        registry.register(Box::new(records.clone())).map_err(metric_error)?;
        registry.register(Box::new(uptime.clone())).map_err(metric_error)?;

        Ok(ConsoleMetrics {
            registry,
            queries,
            errors,
            response_time,
            zones,
            records,
            uptime,
            samples: RwLock::new(VecDeque::with_capacity(MAX_RESPONSE_SAMPLES)),
            started: Instant::now(),
        })
    }

    /// Count one handled request and its response time
    pub fn record_query(&self, elapsed: Duration) {
        self.queries.inc();
        self.response_time.observe(elapsed.as_secs_f64());
        let mut samples = self.samples.write();
        if samples.len() == MAX_RESPONSE_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_error(&self) {
        self.errors.inc();
    }

    pub fn set_zone_totals(&self, zones: i64, records: i64) {
        self.zones.set(zones);
        self.records.set(records);
    }

    pub fn queries(&self) -> u64 {
        self.queries.get()
    }

    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Errors over queries; zero before the first query
    pub fn error_rate(&self) -> f64 {
        let queries = self.queries();
        if queries == 0 {
            return 0.0;
        }
        self.errors() as f64 / queries as f64
    }

    pub fn average_response_ms(&self) -> f64 {
        let samples = self.samples.read();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.read().len()
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries: self.queries(),
            errors: self.errors(),
            error_rate: self.error_rate(),
            avg_response_time_ms: self.average_response_ms(),
            uptime_secs: self.uptime().as_secs(),
            zones: self.zones.get(),
            records: self.records.get(),
        }
    }

    /// Prometheus text exposition
    pub fn render_prometheus(&self) -> Result<String> {
        self.uptime.set(self.uptime().as_secs() as i64);
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| ConsoleError::Config(format!("Metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_bounded() {
        let metrics = ConsoleMetrics::new().unwrap();
        for _ in 0..MAX_RESPONSE_SAMPLES {
            metrics.record_query(Duration::from_millis(10));
        }
        for _ in 0..10 {
            metrics.record_query(Duration::from_millis(110));
        }
        assert_eq!(metrics.sample_count(), MAX_RESPONSE_SAMPLES);
        assert_eq!(metrics.queries(), 1010);
        assert!((metrics.average_response_ms() - 11.0).abs() < 0.01);
    }

    #[test]
    fn test_error_rate() {
        let metrics = ConsoleMetrics::new().unwrap();
        assert_eq!(metrics.error_rate(), 0.0);
        for _ in 0..4 {
            metrics.record_query(Duration::from_millis(1));
        }
        metrics.record_error();
        assert!((metrics.error_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = ConsoleMetrics::new().unwrap();
        let b = ConsoleMetrics::new().unwrap();
        a.record_error();
        assert_eq!(b.errors(), 0);

        a.set_zone_totals(3, 42);
        let text = a.render_prometheus().unwrap();
        assert!(text.contains("atlas_console_errors_total 1"));
        assert!(text.contains("atlas_console_records 42"));
    }
}
