//! In-process counters and latency histograms, rendered in the
//! Prometheus text exposition format.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

const HIST_BUCKETS_MS: [f64; 12] = [
    1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    request_latency_ms: HashMap<String, Histogram>,
    requests_total: HashMap<String, u64>,
    errors_total: HashMap<String, u64>,
    risk_scores_total: HashMap<String, u64>,
    simulation_fallbacks_total: u64,
    abi_sources_total: HashMap<String, u64>,
}

#[derive(Clone)]
struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        let v = if value.is_finite() && value >= 0.0 {
            value
        } else {
            0.0
        };
        self.count = self.count.saturating_add(1);
        self.sum += v;

        for (i, b) in self.buckets.iter().enumerate() {
            if v <= *b {
                self.counts[i] = self.counts[i].saturating_add(1);
            }
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            buckets: HIST_BUCKETS_MS.to_vec(),
            counts: vec![0; HIST_BUCKETS_MS.len()],
            count: 0,
            sum: 0.0,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::default())),
        }
    }

    pub fn observe_request(&self, endpoint: &str, latency_ms: f64) {
        if let Ok(mut guard) = self.inner.lock() {
            let v = guard
                .requests_total
                .entry(endpoint.to_string())
                .or_insert(0);
            *v = v.saturating_add(1);
            guard
                .request_latency_ms
                .entry(endpoint.to_string())
                .or_default()
                .observe(latency_ms);
        }
    }

    pub fn inc_error(&self, endpoint: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            let v = guard.errors_total.entry(endpoint.to_string()).or_insert(0);
            *v = v.saturating_add(1);
        }
    }

    pub fn inc_risk_score(&self, level: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            let v = guard
                .risk_scores_total
                .entry(level.to_string())
                .or_insert(0);
            *v = v.saturating_add(1);
        }
    }

    pub fn inc_simulation_fallback(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.simulation_fallbacks_total =
                guard.simulation_fallbacks_total.saturating_add(1);
        }
    }

    pub fn inc_abi_source(&self, source: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            let v = guard
                .abi_sources_total
                .entry(source.to_string())
                .or_insert(0);
            *v = v.saturating_add(1);
        }
    }

    pub fn render_prometheus(&self) -> String {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => return "# metrics unavailable\n".to_string(),
        };

        let mut out = String::new();

        for (endpoint, hist) in guard.request_latency_ms.iter() {
            render_histogram(
                &mut out,
                "safewatch_request_latency_ms",
                &[("endpoint", endpoint.as_str())],
                hist,
            );
        }
        render_counter_map(
            &mut out,
            "safewatch_requests_total",
            "endpoint",
            &guard.requests_total,
        );
        render_counter_map(
            &mut out,
            "safewatch_errors_total",
            "endpoint",
            &guard.errors_total,
        );
        render_counter_map(
            &mut out,
            "safewatch_risk_scores_total",
            "level",
            &guard.risk_scores_total,
        );
        render_counter_map(
            &mut out,
            "safewatch_abi_sources_total",
            "source",
            &guard.abi_sources_total,
        );
        out.push_str("# TYPE safewatch_simulation_fallbacks_total counter\n");
        out.push_str(&format!(
            "safewatch_simulation_fallbacks_total {}\n",
            guard.simulation_fallbacks_total
        ));

        out
    }
}

fn render_counter_map(
    out: &mut String,
    metric: &str,
    label_name: &str,
    map: &HashMap<String, u64>,
) {
    out.push_str(&format!("# TYPE {metric} counter\n"));
    for (k, v) in map {
        out.push_str(&format!(
            "{metric}{{{label_name}=\"{}\"}} {v}\n",
            escape_label_value(k)
        ));
    }
}

fn render_histogram(out: &mut String, metric: &str, labels: &[(&str, &str)], h: &Histogram) {
    out.push_str(&format!("# TYPE {metric} histogram\n"));

    let base = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect::<Vec<_>>()
        .join(",");

    for (i, b) in h.buckets.iter().enumerate() {
        out.push_str(&format!(
            "{metric}_bucket{{{base},le=\"{b}\"}} {}\n",
            h.counts.get(i).copied().unwrap_or(0)
        ));
    }
    out.push_str(&format!(
        "{metric}_bucket{{{base},le=\"+Inf\"}} {}\n",
        h.count
    ));
    out.push_str(&format!("{metric}_sum{{{base}}} {}\n", h.sum));
    out.push_str(&format!("{metric}_count{{{base}}} {}\n", h.count));
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
