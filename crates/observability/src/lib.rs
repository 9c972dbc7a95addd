use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// In-process counters reported on `/health`. Every update is mirrored to the
/// `metrics` facade so an installed recorder can export it.
#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    voice_queries_total: AtomicU64,
    default_fallback_total: AtomicU64,
    weather_lookups_total: AtomicU64,
    disease_predictions_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub voice_queries_total: u64,
    pub default_fallback_total: u64,
    pub weather_lookups_total: u64,
    pub disease_predictions_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("growwise_requests_total").increment(1);
    }

    pub fn record_voice_query(&self, category: &'static str, fell_back: bool) {
        self.voice_queries_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("growwise_voice_queries_total", "category" => category).increment(1);
        if fell_back {
            self.default_fallback_total.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("growwise_voice_default_fallback_total").increment(1);
        }
    }

    pub fn inc_weather_lookup(&self) {
        self.weather_lookups_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("growwise_weather_lookups_total").increment(1);
    }

    pub fn record_disease_prediction(&self, disease: &'static str) {
        self.disease_predictions_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("growwise_disease_predictions_total", "disease" => disease).increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("growwise_request_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            voice_queries_total: self.voice_queries_total.load(Ordering::Relaxed),
            default_fallback_total: self.default_fallback_total.load(Ordering::Relaxed),
            weather_lookups_total: self.weather_lookups_total.load(Ordering::Relaxed),
            disease_predictions_total: self.disease_predictions_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

/// JSON logs on stderr, filtered by `RUST_LOG` or an info-level default for
/// `service_name` and the shared crates. Safe to call more than once.
pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

fn default_directives(service_name: &str) -> String {
    ["growwise_services", "growwise_storage", "tower_http"]
        .into_iter()
        .fold(format!("{service_name}=info"), |directives, target| {
            format!("{directives},{target}=info")
        })
}
