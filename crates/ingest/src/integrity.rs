//! Running-hash integrity trigger
//!
//! When the tracked position moves past the verified checkpoint, the external
//! verifier is asked to validate the topic's hash chain up to that position.
//! The call is awaited, so the next message always compares against the
//! checkpoint the previous verification produced.

use std::sync::Arc;

use async_trait::async_trait;
use mirror_middleware::TopicId;
use tracing::{error, info, warn};

use crate::error::VerificationError;
use crate::state::SharedFeedState;

/// External running-hash verification routine
#[async_trait]
pub trait RunningHashVerifier: Send + Sync {
    /// Validate the running hash of `topic` through sequence number `through`.
    ///
    /// Returns the verified feed length, which becomes the new checkpoint.
    /// Must be safe to call redundantly.
    async fn verify(&self, topic: TopicId, through: u64) -> Result<u64, VerificationError>;
}

/// Accepts the requested position without recomputing any hash.
///
/// For replaying captures from a trusted source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncheckedVerifier;

#[async_trait]
impl RunningHashVerifier for UncheckedVerifier {
    async fn verify(&self, _topic: TopicId, through: u64) -> Result<u64, VerificationError> {
        Ok(through)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityOutcome {
    /// Position is within the checkpoint (or no topic is recorded)
    NotRequired,
    Verified { sequence_length: u64 },
    Failed,
}

#[derive(Clone)]
pub struct IntegrityTrigger {
    state: SharedFeedState,
    verifier: Arc<dyn RunningHashVerifier>,
}

impl IntegrityTrigger {
    pub fn new(state: SharedFeedState, verifier: Arc<dyn RunningHashVerifier>) -> Self {
        Self { state, verifier }
    }

    /// Verify if the current position is past the checkpoint.
    ///
    /// Verification errors are logged and reported as [`IntegrityOutcome::Failed`];
    /// they never change the sequence position.
    pub async fn check(&self) -> IntegrityOutcome {
        let (topic, current, checkpoint) = {
            let state = self.state.read().await;
            (state.topic_id, state.current_sequence_number, state.sequence_length)
        };

        if current <= checkpoint {
            return IntegrityOutcome::NotRequired;
        }

        let Some(topic) = topic else {
            warn!(current, checkpoint, "no topic recorded, skipping running hash verification");
            return IntegrityOutcome::NotRequired;
        };

        match self.verifier.verify(topic, current).await {
            Ok(verified) => {
                let mut state = self.state.write().await;
                state.sequence_length = state.sequence_length.max(verified);
                info!(
                    topic = %topic,
                    through = current,
                    sequence_length = state.sequence_length,
                    "running hash verified"
                );
                IntegrityOutcome::Verified {
                    sequence_length: state.sequence_length,
                }
            }
            Err(e) => {
                error!(
                    topic = %topic,
                    through = current,
                    checkpoint,
                    error = %e,
                    "running hash verification failed"
                );
                IntegrityOutcome::Failed
            }
        }
    }
}
