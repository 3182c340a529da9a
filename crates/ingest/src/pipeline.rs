use std::sync::Arc;

use mirror_middleware::TopicMessage;
use tracing::{debug, warn};

use crate::decoder::decode;
use crate::dispatcher::{Dispatcher, EventHandler};
use crate::integrity::{IntegrityOutcome, IntegrityTrigger, RunningHashVerifier};
use crate::metrics::{gauge_value, Metrics};
use crate::sequence::{GapPolicy, SequenceAdvance, SequenceTracker};
use crate::state::SharedFeedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Payload could not be decoded; nothing was dispatched
    Unprocessable,
    /// Event dispatched, with the result of the integrity check that preceded it
    Dispatched { integrity: IntegrityOutcome },
}

/// Per-message processing: decode, track sequence, verify, dispatch
#[derive(Clone)]
pub struct FeedPipeline {
    state: SharedFeedState,
    tracker: SequenceTracker,
    trigger: IntegrityTrigger,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
}

impl FeedPipeline {
    pub fn new(
        state: SharedFeedState,
        verifier: Arc<dyn RunningHashVerifier>,
        handler: Arc<dyn EventHandler>,
        metrics: Arc<Metrics>,
        gap_policy: GapPolicy,
    ) -> Self {
        Self {
            tracker: SequenceTracker::new(state.clone(), gap_policy),
            trigger: IntegrityTrigger::new(state.clone(), verifier),
            dispatcher: Dispatcher::new(handler),
            state,
            metrics,
        }
    }

    pub fn state(&self) -> &SharedFeedState {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run one message through the pipeline. Never fails: decode and
    /// verification errors are logged and absorbed here.
    pub async fn process(&self, message: TopicMessage) -> ProcessOutcome {
        let topic = message.topic_id.to_string();
        let seq = message.sequence_number;
        debug!(topic = %topic, sequence = seq, bytes = message.contents.len(), "message received");
        self.metrics.messages_received.with_label_values(&[&topic]).inc();

        let payload = match decode(&message.contents) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    topic = %topic,
                    sequence = seq,
                    error = %e,
                    payload = %String::from_utf8_lossy(&message.contents),
                    "unprocessable message"
                );
                self.metrics.decode_failures.with_label_values(&[&topic]).inc();
                let advance = self.tracker.record_unprocessable(seq).await;
                self.record_advance(&topic, advance);
                return ProcessOutcome::Unprocessable;
            }
        };

        let advance = self.tracker.record_decoded(seq).await;
        self.record_advance(&topic, advance);

        let integrity = self.trigger.check().await;
        match integrity {
            IntegrityOutcome::Verified { sequence_length } => {
                self.metrics.verifications.with_label_values(&[&topic, "ok"]).inc();
                self.metrics
                    .sequence_length
                    .with_label_values(&[&topic])
                    .set(gauge_value(sequence_length));
            }
            IntegrityOutcome::Failed => {
                self.metrics.verifications.with_label_values(&[&topic, "failed"]).inc();
            }
            IntegrityOutcome::NotRequired => {}
        }

        self.dispatcher.dispatch(&message, payload).await;
        self.metrics.messages_dispatched.with_label_values(&[&topic]).inc();

        ProcessOutcome::Dispatched { integrity }
    }

    fn record_advance(&self, topic: &str, advance: SequenceAdvance) {
        if let SequenceAdvance::OutOfOrder { .. } = advance {
            self.metrics.out_of_order.with_label_values(&[topic]).inc();
        }
        self.metrics
            .current_sequence_number
            .with_label_values(&[topic])
            .set(gauge_value(advance.position()));
    }
}
