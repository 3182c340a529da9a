//! Prometheus metrics for the ingest pipeline
//!
//! Every metric is labelled by topic id.

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

pub struct Metrics {
    pub registry: Registry,
    pub messages_received: IntCounterVec,
    pub messages_dispatched: IntCounterVec,
    pub decode_failures: IntCounterVec,
    pub out_of_order: IntCounterVec,
    pub verifications: IntCounterVec,
    pub transport_errors: IntCounterVec,
    pub current_sequence_number: IntGaugeVec,
    pub sequence_length: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_received = IntCounterVec::new(
            Opts::new("mirror_messages_received_total", "Topic messages received from the transport"),
            &["topic"],
        )?;

        let messages_dispatched = IntCounterVec::new(
            Opts::new("mirror_messages_dispatched_total", "Domain events handed to the event handler"),
            &["topic"],
        )?;

        let decode_failures = IntCounterVec::new(
            Opts::new("mirror_decode_failures_total", "Unprocessable topic messages"),
            &["topic"],
        )?;

        let out_of_order = IntCounterVec::new(
            Opts::new("mirror_out_of_order_total", "Messages behind the current sequence position"),
            &["topic"],
        )?;

        let verifications = IntCounterVec::new(
            Opts::new("mirror_verifications_total", "Running hash verifications by outcome"),
            &["topic", "outcome"],
        )?;

        let transport_errors = IntCounterVec::new(
            Opts::new("mirror_transport_errors_total", "Errors reported by the feed transport"),
            &["topic"],
        )?;

        let current_sequence_number = IntGaugeVec::new(
            Opts::new("mirror_current_sequence_number", "Tracked sequence position"),
            &["topic"],
        )?;

        let sequence_length = IntGaugeVec::new(
            Opts::new("mirror_sequence_length", "Last verified sequence position"),
            &["topic"],
        )?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(messages_dispatched.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;
        registry.register(Box::new(out_of_order.clone()))?;
        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(transport_errors.clone()))?;
        registry.register(Box::new(current_sequence_number.clone()))?;
        registry.register(Box::new(sequence_length.clone()))?;

        Ok(Self {
            registry,
            messages_received,
            messages_dispatched,
            decode_failures,
            out_of_order,
            verifications,
            transport_errors,
            current_sequence_number,
            sequence_length,
        })
    }
}

/// Gauges hold i64; sequence numbers beyond that saturate
pub(crate) fn gauge_value(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_gather() {
        let metrics = Metrics::new().unwrap();
        metrics.messages_received.with_label_values(&["0.0.1"]).inc();
        metrics
            .verifications
            .with_label_values(&["0.0.1", "ok"])
            .inc();

        let families = metrics.registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"mirror_messages_received_total"));
        assert!(names.contains(&"mirror_verifications_total"));
    }

    #[test]
    fn test_gauge_value_saturates() {
        assert_eq!(gauge_value(7), 7);
        assert_eq!(gauge_value(u64::MAX), i64::MAX);
    }
}
