use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::TransportError;
use crate::topic::{ConsensusTimestamp, TopicId};
use crate::transport::{FeedTransport, StartPosition, TopicMessage, TopicSubscription};

const CHANNEL_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone)]
enum FeedItem {
    Message(TopicMessage),
    Error(String),
}

/// Retained history plus live tail for one topic
struct TopicLog {
    history: Vec<FeedItem>,
    next_sequence: u64,
    /// `None` once the topic has been closed
    tx: Option<broadcast::Sender<FeedItem>>,
}

impl TopicLog {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            next_sequence: 1,
            tx: Some(broadcast::channel(CHANNEL_BUFFER_SIZE).0),
        }
    }

    fn append(&mut self, item: FeedItem) {
        self.history.push(item.clone());
        if let Some(tx) = &self.tx {
            let _ = tx.send(item);
        }
    }
}

/// In-memory mirror node: every subscription replays the topic's history
/// from its start position, then follows newly published messages.
pub struct InMemoryFeedTransport {
    topics: DashMap<TopicId, TopicLog>,
    subscriptions: AtomicUsize,
}

impl InMemoryFeedTransport {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            subscriptions: AtomicUsize::new(0),
        }
    }

    /// Publish a payload, assigning the next sequence number and the current time
    pub fn publish(&self, topic: TopicId, contents: impl Into<Bytes>) -> TopicMessage {
        let mut log = self.topics.entry(topic).or_insert_with(TopicLog::new);
        let msg = TopicMessage {
            topic_id: topic,
            contents: contents.into(),
            sequence_number: log.next_sequence,
            consensus_timestamp: ConsensusTimestamp::now(),
        };
        log.next_sequence += 1;
        log.append(FeedItem::Message(msg.clone()));
        msg
    }

    /// Deliver a fully specified envelope as-is (sequence number and timestamp included)
    pub fn push(&self, msg: TopicMessage) {
        let mut log = self.topics.entry(msg.topic_id).or_insert_with(TopicLog::new);
        log.next_sequence = log.next_sequence.max(msg.sequence_number.saturating_add(1));
        log.append(FeedItem::Message(msg));
    }

    /// Deliver a transport error to subscribers of the topic
    pub fn inject_error(&self, topic: TopicId, reason: impl Into<String>) {
        let mut log = self.topics.entry(topic).or_insert_with(TopicLog::new);
        log.append(FeedItem::Error(reason.into()));
    }

    /// End the topic: subscribers drain what was delivered and then see end of stream
    pub fn close(&self, topic: TopicId) {
        let mut log = self.topics.entry(topic).or_insert_with(TopicLog::new);
        log.tx = None;
    }

    /// Number of `subscribe` calls served so far
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryFeedTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemorySubscription {
    backlog: VecDeque<FeedItem>,
    rx: Option<broadcast::Receiver<FeedItem>>,
    start: StartPosition,
}

impl InMemorySubscription {
    /// Maps a feed item to a delivery, `None` for messages before the start position
    fn deliver(&self, item: FeedItem) -> Option<Result<Option<TopicMessage>, TransportError>> {
        match item {
            FeedItem::Message(msg) if self.start.includes(msg.consensus_timestamp) => {
                Some(Ok(Some(msg)))
            }
            FeedItem::Message(_) => None,
            FeedItem::Error(reason) => Some(Err(TransportError::Stream(reason))),
        }
    }
}

#[async_trait]
impl TopicSubscription for InMemorySubscription {
    async fn next(&mut self) -> Result<Option<TopicMessage>, TransportError> {
        while let Some(item) = self.backlog.pop_front() {
            if let Some(delivery) = self.deliver(item) {
                return delivery;
            }
        }

        loop {
            let Some(rx) = self.rx.as_mut() else {
                return Ok(None);
            };
            match rx.recv().await {
                Ok(item) => {
                    if let Some(delivery) = self.deliver(item) {
                        return delivery;
                    }
                }
                Err(RecvError::Lagged(skipped)) => return Err(TransportError::Lagged(skipped)),
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return Ok(None);
                }
            }
        }
    }
}

#[async_trait]
impl FeedTransport for InMemoryFeedTransport {
    async fn subscribe(
        &self,
        topic: TopicId,
        start: StartPosition,
    ) -> Result<Box<dyn TopicSubscription>, TransportError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        // Snapshot and live receiver are taken under the same entry lock so no
        // message is missed or seen twice.
        let log = self.topics.entry(topic).or_insert_with(TopicLog::new);
        let backlog = log.history.iter().cloned().collect();
        let rx = log.tx.as_ref().map(|tx| tx.subscribe());

        Ok(Box::new(InMemorySubscription { backlog, rx, start }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: TopicId = TopicId::new(0, 0, 1001);

    #[tokio::test]
    async fn test_publish_subscribe() {
        let transport = InMemoryFeedTransport::new();
        let mut sub = transport
            .subscribe(TOPIC, StartPosition::Beginning)
            .await
            .unwrap();
        transport.publish(TOPIC, "hello");

        let msg = sub.next().await.unwrap().unwrap();
        assert_eq!(msg.topic_id, TOPIC);
        assert_eq!(msg.contents, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_sequence_numbers_start_at_one() {
        let transport = InMemoryFeedTransport::new();
        let first = transport.publish(TOPIC, "1");
        let second = transport.publish(TOPIC, "2");
        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_backfill_then_live_tail() {
        let transport = InMemoryFeedTransport::new();
        transport.publish(TOPIC, "old");

        let mut sub = transport
            .subscribe(TOPIC, StartPosition::Beginning)
            .await
            .unwrap();
        transport.publish(TOPIC, "new");

        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(first.contents, Bytes::from("old"));
        assert_eq!(second.contents, Bytes::from("new"));
    }

    #[tokio::test]
    async fn test_start_time_filters_backfill() {
        let transport = InMemoryFeedTransport::new();
        for (seq, secs) in [(1, 10), (2, 20), (3, 30)] {
            transport.push(TopicMessage {
                topic_id: TOPIC,
                contents: Bytes::from("x"),
                sequence_number: seq,
                consensus_timestamp: ConsensusTimestamp::new(secs, 0),
            });
        }
        transport.close(TOPIC);

        let start = StartPosition::Time(ConsensusTimestamp::new(20, 0));
        let mut sub = transport.subscribe(TOPIC, start).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().sequence_number, 2);
        assert_eq!(sub.next().await.unwrap().unwrap().sequence_number, 3);
        assert!(sub.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_errors_do_not_end_subscription() {
        let transport = InMemoryFeedTransport::new();
        transport.inject_error(TOPIC, "connection reset");
        transport.publish(TOPIC, "after");
        transport.close(TOPIC);

        let mut sub = transport
            .subscribe(TOPIC, StartPosition::Beginning)
            .await
            .unwrap();
        assert!(matches!(sub.next().await, Err(TransportError::Stream(_))));
        assert_eq!(
            sub.next().await.unwrap().unwrap().contents,
            Bytes::from("after")
        );
        assert!(sub.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_ends_live_subscription() {
        let transport = InMemoryFeedTransport::new();
        let mut sub = transport
            .subscribe(TOPIC, StartPosition::Beginning)
            .await
            .unwrap();
        transport.close(TOPIC);
        assert!(sub.next().await.unwrap().is_none());
        assert_eq!(transport.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_push_advances_next_sequence() {
        let transport = InMemoryFeedTransport::new();
        transport.push(TopicMessage {
            topic_id: TOPIC,
            contents: Bytes::from("x"),
            sequence_number: 41,
            consensus_timestamp: ConsensusTimestamp::new(1, 0),
        });
        assert_eq!(transport.publish(TOPIC, "y").sequence_number, 42);
    }
}
