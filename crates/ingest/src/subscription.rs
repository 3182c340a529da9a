//! Subscription lifecycle
//!
//! [`SubscriptionManager::start_listening`] opens the single feed subscription.
//! A transport task reads the subscription and forwards messages over a
//! bounded channel to one consumer task, which runs them through the
//! [`FeedPipeline`] strictly in delivery order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mirror_middleware::{FeedTransport, StartPosition, TopicId, TopicMessage};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::metrics::Metrics;
use crate::pipeline::{FeedPipeline, ProcessOutcome};
use crate::state::SharedFeedState;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub start: StartPosition,
    /// Messages buffered between the transport and the pipeline
    pub channel_capacity: usize,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            start: StartPosition::Beginning,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Counts of what the consumer processed before the feed ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerSummary {
    pub processed: u64,
    pub dispatched: u64,
    pub unprocessable: u64,
}

/// Running listener tasks for one subscription
pub struct ListenerTask {
    transport: JoinHandle<()>,
    consumer: JoinHandle<ListenerSummary>,
}

impl ListenerTask {
    /// Wait for the feed to end and every delivered message to be processed
    pub async fn wait(self) -> Result<ListenerSummary, JoinError> {
        self.transport.await?;
        self.consumer.await
    }
}

/// Owns the single feed subscription
pub struct SubscriptionManager {
    transport: Arc<dyn FeedTransport>,
    pipeline: FeedPipeline,
    options: SubscriptionOptions,
    listening: Arc<AtomicBool>,
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        pipeline: FeedPipeline,
        options: SubscriptionOptions,
    ) -> Self {
        Self {
            transport,
            pipeline,
            options,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Returns a handle to the listening flag
    pub fn listening_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.listening)
    }

    pub fn state(&self) -> &SharedFeedState {
        self.pipeline.state()
    }

    /// Start consuming `topic` from the configured start position.
    ///
    /// Idempotent: once listening, further calls do nothing and return `None`.
    /// Subscription failures are logged by the transport task rather than
    /// returned. Must be called from within a Tokio runtime.
    pub fn start_listening(&self, topic: TopicId) -> Option<ListenerTask> {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(topic = %topic, "already listening, ignoring start request");
            return None;
        }

        info!(
            topic = %topic,
            start = ?self.options.start,
            channel_capacity = self.options.channel_capacity,
            "starting feed subscription"
        );

        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));

        let transport = tokio::spawn(forward_feed(
            Arc::clone(&self.transport),
            topic,
            self.options.start,
            tx,
            Arc::clone(self.pipeline.metrics()),
        ));
        let consumer = tokio::spawn(consume_feed(self.pipeline.clone(), topic, rx));

        Some(ListenerTask {
            transport,
            consumer,
        })
    }
}

/// Read the subscription and forward messages to the consumer.
/// Delivery errors are logged and skipped; the feed ends only at end of stream.
async fn forward_feed(
    transport: Arc<dyn FeedTransport>,
    topic: TopicId,
    start: StartPosition,
    tx: mpsc::Sender<TopicMessage>,
    metrics: Arc<Metrics>,
) {
    let label = topic.to_string();

    let mut subscription = match transport.subscribe(topic, start).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!(topic = %topic, error = %e, "failed to subscribe to feed");
            metrics.transport_errors.with_label_values(&[&label]).inc();
            return;
        }
    };

    loop {
        match subscription.next().await {
            Ok(Some(message)) => {
                if tx.send(message).await.is_err() {
                    error!(topic = %topic, "feed consumer stopped, closing subscription");
                    break;
                }
            }
            Ok(None) => {
                info!(topic = %topic, "feed ended");
                break;
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "feed delivery error");
                metrics.transport_errors.with_label_values(&[&label]).inc();
            }
        }
    }
}

async fn consume_feed(
    pipeline: FeedPipeline,
    topic: TopicId,
    mut rx: mpsc::Receiver<TopicMessage>,
) -> ListenerSummary {
    pipeline.state().write().await.topic_id = Some(topic);

    let mut summary = ListenerSummary::default();
    while let Some(message) = rx.recv().await {
        summary.processed += 1;
        match pipeline.process(message).await {
            ProcessOutcome::Dispatched { .. } => summary.dispatched += 1,
            ProcessOutcome::Unprocessable => summary.unprocessable += 1,
        }
    }

    info!(
        topic = %topic,
        processed = summary.processed,
        dispatched = summary.dispatched,
        unprocessable = summary.unprocessable,
        "feed consumer finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{DomainEvent, EventHandler};
    use crate::integrity::UncheckedVerifier;
    use crate::sequence::GapPolicy;
    use crate::state::FeedState;
    use async_trait::async_trait;
    use mirror_middleware::{InMemoryFeedTransport, TopicSubscription, TransportError};
    use std::sync::atomic::AtomicUsize;

    const TOPIC: TopicId = TopicId::new(0, 0, 42);

    #[derive(Default)]
    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: DomainEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(transport: Arc<dyn FeedTransport>, handler: Arc<CountingHandler>) -> SubscriptionManager {
        let pipeline = FeedPipeline::new(
            FeedState::default().into_shared(),
            Arc::new(UncheckedVerifier),
            handler,
            Arc::new(Metrics::new().unwrap()),
            GapPolicy::Increment,
        );
        SubscriptionManager::new(transport, pipeline, SubscriptionOptions::default())
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let transport = Arc::new(InMemoryFeedTransport::new());
        let handler = Arc::new(CountingHandler::default());
        let manager = manager(transport.clone(), handler.clone());

        transport.publish(TOPIC, r#"{"n":1}"#);
        transport.publish(TOPIC, r#"{"n":2}"#);
        transport.close(TOPIC);

        let task = manager.start_listening(TOPIC).expect("first start");
        assert!(manager.is_listening());
        assert!(manager.start_listening(TOPIC).is_none());

        let summary = task.wait().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);
        assert_eq!(transport.subscription_count(), 1);

        // Still listening after the feed ends; there is no reset
        assert!(manager.start_listening(TOPIC).is_none());
    }

    #[tokio::test]
    async fn test_records_topic_in_state() {
        let transport = Arc::new(InMemoryFeedTransport::new());
        let manager = manager(transport.clone(), Arc::new(CountingHandler::default()));
        transport.close(TOPIC);

        manager.start_listening(TOPIC).unwrap().wait().await.unwrap();
        assert_eq!(manager.state().read().await.topic_id, Some(TOPIC));
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_logged_not_returned() {
        struct Unreachable;

        #[async_trait]
        impl FeedTransport for Unreachable {
            async fn subscribe(
                &self,
                _topic: TopicId,
                _start: StartPosition,
            ) -> Result<Box<dyn TopicSubscription>, TransportError> {
                Err(TransportError::ConnectionFailed("no route to host".to_string()))
            }
        }

        let manager = manager(Arc::new(Unreachable), Arc::new(CountingHandler::default()));
        let task = manager.start_listening(TOPIC).expect("start");
        let summary = task.wait().await.unwrap();

        assert_eq!(summary, ListenerSummary::default());
        assert!(manager.is_listening());
    }

    #[tokio::test]
    async fn test_small_channel_preserves_order() {
        let transport = Arc::new(InMemoryFeedTransport::new());
        for i in 0..20 {
            transport.publish(TOPIC, format!(r#"{{"i":{}}}"#, i));
        }
        transport.close(TOPIC);

        let pipeline = FeedPipeline::new(
            FeedState::default().into_shared(),
            Arc::new(UncheckedVerifier),
            Arc::new(CountingHandler::default()),
            Arc::new(Metrics::new().unwrap()),
            GapPolicy::Increment,
        );
        let options = SubscriptionOptions {
            channel_capacity: 1,
            ..SubscriptionOptions::default()
        };
        let manager = SubscriptionManager::new(transport, pipeline, options);

        let summary = manager.start_listening(TOPIC).unwrap().wait().await.unwrap();
        assert_eq!(summary.dispatched, 20);
        assert_eq!(manager.state().read().await.current_sequence_number, 20);
    }
}
