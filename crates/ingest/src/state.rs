use std::sync::Arc;

use mirror_middleware::TopicId;
use tokio::sync::RwLock;

/// Feed position shared between the pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    /// Last sequence position consumed; never decreases
    pub current_sequence_number: u64,
    /// Checkpoint: last position whose running hash has been verified
    pub sequence_length: u64,
    /// Topic being consumed, recorded when listening starts
    pub topic_id: Option<TopicId>,
}

pub type SharedFeedState = Arc<RwLock<FeedState>>;

impl FeedState {
    /// State resuming from a previously verified checkpoint
    pub fn with_checkpoint(sequence_length: u64) -> Self {
        Self {
            sequence_length,
            ..Self::default()
        }
    }

    pub fn for_topic(topic_id: TopicId) -> Self {
        Self {
            topic_id: Some(topic_id),
            ..Self::default()
        }
    }

    pub fn into_shared(self) -> SharedFeedState {
        Arc::new(RwLock::new(self))
    }
}
