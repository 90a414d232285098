use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    invocation_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    detections_drawn: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        // TODO: deprecated crate to be replaced with an OLTP exporter
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("blob_detect");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let invocation_counter = meter
            .u64_counter("invocations_total")
            .with_description("Blob invocations by outcome")
            .build();

        let boundaries =
            generate_boundaries((100, 500, 2000, 10000, 30000), (100, 250, 1000, 5000));

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of prediction service calls in milliseconds")
            .build();

        let detections_drawn = meter
            .u64_counter("detections_drawn_total")
            .with_description("Detections drawn onto output images")
            .build();

        Ok(Metrics {
            request_counter,
            invocation_counter,
            prediction_duration,
            detections_drawn,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    /// `outcome` is `success` or a failure kind.
    pub fn record_invocation(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.invocation_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64) {
        self.prediction_duration.record(duration_ms, &[]);
    }

    pub fn record_detections_drawn(&self, count: u64) {
        self.detections_drawn.add(count, &[]);
    }
}

/// Histogram boundaries made of four linear runs between consecutive `parts`,
/// each with its own step.
fn generate_boundaries(
    parts: (i32, i32, i32, i32, i32),
    steps: (usize, usize, usize, usize),
) -> Vec<f64> {
    let first_part = (parts.0..=parts.1).step_by(steps.0);
    let middle_part = (parts.1..=parts.2).step_by(steps.1);
    let end_part = (parts.2..=parts.3).step_by(steps.2);
    let tail_part = (parts.3..=parts.4).step_by(steps.3);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (2, 22, 26, 46, 146);
        let get = generate_boundaries(parts, (10, 2, 20, 100));
        let expected = vec![2.0, 12.0, 22.0, 24.0, 26.0, 46.0, 146.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_prediction_boundaries() {
        let get = generate_boundaries((100, 500, 2000, 10000, 30000), (100, 250, 1000, 5000));

        assert_eq!(get.first(), Some(&100.0));
        assert_eq!(get.last(), Some(&30000.0));
        assert_eq!(get.len(), 5 + 6 + 8 + 4);
        assert!(get.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_invocation("success");
        metrics.record_detections_drawn(3);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.iter().any(|n| n.starts_with("invocations_total")));
        assert!(names.iter().any(|n| n.starts_with("detections_drawn_total")));
    }
}
