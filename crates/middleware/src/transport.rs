use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::topic::{ConsensusTimestamp, TopicId};

/// Message envelope delivered by the mirror node for one topic entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    pub topic_id: TopicId,
    pub contents: Bytes,
    pub sequence_number: u64,
    pub consensus_timestamp: ConsensusTimestamp,
}

/// Position to start delivery from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Full backfill from the first message of the topic, then live tail
    #[default]
    Beginning,
    /// Messages with a consensus timestamp at or after the given time
    Time(ConsensusTimestamp),
}

impl StartPosition {
    /// Whether a message with this consensus timestamp falls inside the requested range
    pub fn includes(&self, ts: ConsensusTimestamp) -> bool {
        match self {
            StartPosition::Beginning => true,
            StartPosition::Time(start) => ts >= *start,
        }
    }
}

impl From<ConsensusTimestamp> for StartPosition {
    /// A start time of zero means the beginning of the feed
    fn from(ts: ConsensusTimestamp) -> Self {
        if ts == ConsensusTimestamp::EPOCH {
            StartPosition::Beginning
        } else {
            StartPosition::Time(ts)
        }
    }
}

/// Subscription handle for receiving topic messages in consensus order
#[async_trait]
pub trait TopicSubscription: Send {
    /// Receive the next message (waits until available).
    ///
    /// `Ok(None)` means the feed has ended. An `Err` reports a delivery error;
    /// the subscription stays usable and later calls may yield more messages.
    async fn next(&mut self) -> Result<Option<TopicMessage>, TransportError>;
}

/// Transport abstraction for mirror node topic subscriptions
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Subscribe to a topic starting at the given position
    async fn subscribe(
        &self,
        topic: TopicId,
        start: StartPosition,
    ) -> Result<Box<dyn TopicSubscription>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_message_creation() {
        let msg = TopicMessage {
            topic_id: TopicId::new(0, 0, 1234),
            contents: Bytes::from(r#"{"type":"post"}"#),
            sequence_number: 1,
            consensus_timestamp: ConsensusTimestamp::new(1703318400, 0),
        };

        assert_eq!(msg.topic_id.to_string(), "0.0.1234");
        assert_eq!(msg.sequence_number, 1);
    }

    #[test]
    fn test_start_position_from_epoch_is_beginning() {
        assert_eq!(
            StartPosition::from(ConsensusTimestamp::EPOCH),
            StartPosition::Beginning
        );
        assert_eq!(
            StartPosition::from(ConsensusTimestamp::new(5, 0)),
            StartPosition::Time(ConsensusTimestamp::new(5, 0))
        );
    }

    #[test]
    fn test_start_position_includes() {
        let start = StartPosition::Time(ConsensusTimestamp::new(100, 0));
        assert!(!start.includes(ConsensusTimestamp::new(99, 999_999_999)));
        assert!(start.includes(ConsensusTimestamp::new(100, 0)));
        assert!(StartPosition::Beginning.includes(ConsensusTimestamp::EPOCH));
    }
}
