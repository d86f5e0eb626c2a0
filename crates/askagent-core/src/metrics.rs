use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct AgentMetrics {
    searches: Counter<u64>,
    search_results: Counter<u64>,
    model_calls: Counter<u64>,
    model_latency_ms: Histogram<f64>,
    requests: Counter<u64>,
}

static METRICS: OnceCell<AgentMetrics> = OnceCell::new();

fn handles() -> &'static AgentMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("askagent");
        AgentMetrics {
            searches: meter
                .u64_counter("search_calls_total")
                .with_description("Search adapter invocations by outcome")
                .init(),
            search_results: meter
                .u64_counter("search_results_total")
                .with_description("Search results accepted into agent state")
                .init(),
            model_calls: meter
                .u64_counter("model_calls_total")
                .with_description("Model backend invocations by status")
                .init(),
            model_latency_ms: meter
                .f64_histogram("model_latency_ms")
                .with_description("Model backend latency in milliseconds")
                .init(),
            requests: meter
                .u64_counter("agent_requests_total")
                .with_description("Completed agent requests by mode and outcome")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("ASKAGENT_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "ASKAGENT_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export agent metrics."
        );
    }
    Ok(())
}

/// Record one search adapter call (no-op if no provider installed).
pub fn record_search(outcome: &str, results: usize) {
    let metrics = handles();
    let attrs = [KeyValue::new("outcome", outcome.to_string())];
    metrics.searches.add(1, &attrs);
    metrics.search_results.add(results as u64, &attrs);
}

pub fn record_model_call(status: &str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [KeyValue::new("status", status.to_string())];
    metrics.model_calls.add(1, &attrs);
    metrics.model_latency_ms.record(duration_ms as f64, &attrs);
}

pub fn record_request(mode: &str, outcome: &str) {
    let attrs = [
        KeyValue::new("mode", mode.to_string()),
        KeyValue::new("outcome", outcome.to_string()),
    ];
    handles().requests.add(1, &attrs);
}
