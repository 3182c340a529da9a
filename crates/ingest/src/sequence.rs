//! Sequence position tracking
//!
//! Decoded messages adopt the transport's sequence number, so the position
//! resynchronises to the feed on every success. Unprocessable messages advance
//! the position according to the configured [`GapPolicy`]. The position never
//! moves backwards.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::state::SharedFeedState;

/// How an unprocessable message moves the sequence position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GapPolicy {
    /// Assume the message occupied exactly one sequence slot
    #[default]
    Increment,
    /// Adopt the sequence number carried by the message envelope
    AdoptTransport,
}

impl FromStr for GapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increment" => Ok(GapPolicy::Increment),
            "adopt-transport" => Ok(GapPolicy::AdoptTransport),
            other => Err(format!(
                "unknown gap policy '{}', expected 'increment' or 'adopt-transport'",
                other
            )),
        }
    }
}

impl fmt::Display for GapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapPolicy::Increment => f.write_str("increment"),
            GapPolicy::AdoptTransport => f.write_str("adopt-transport"),
        }
    }
}

/// Result of recording one message against the position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceAdvance {
    /// Position moved (or stayed, for a redelivery of the current message)
    Advanced { from: u64, to: u64 },
    /// Message is behind the current position; position left unchanged
    OutOfOrder { current: u64, received: u64 },
}

impl SequenceAdvance {
    /// Position after the update
    pub fn position(&self) -> u64 {
        match self {
            SequenceAdvance::Advanced { to, .. } => *to,
            SequenceAdvance::OutOfOrder { current, .. } => *current,
        }
    }
}

#[derive(Clone)]
pub struct SequenceTracker {
    state: SharedFeedState,
    policy: GapPolicy,
}

impl SequenceTracker {
    pub fn new(state: SharedFeedState, policy: GapPolicy) -> Self {
        Self { state, policy }
    }

    pub fn policy(&self) -> GapPolicy {
        self.policy
    }

    /// Record a successfully decoded message with transport sequence `sequence_number`
    pub async fn record_decoded(&self, sequence_number: u64) -> SequenceAdvance {
        let mut state = self.state.write().await;
        adopt(&mut state.current_sequence_number, sequence_number)
    }

    /// Record a message that failed to decode
    pub async fn record_unprocessable(&self, sequence_number: u64) -> SequenceAdvance {
        let mut state = self.state.write().await;
        match self.policy {
            GapPolicy::Increment => {
                let from = state.current_sequence_number;
                let to = from.saturating_add(1);
                state.current_sequence_number = to;
                SequenceAdvance::Advanced { from, to }
            }
            GapPolicy::AdoptTransport => adopt(&mut state.current_sequence_number, sequence_number),
        }
    }
}

fn adopt(current: &mut u64, received: u64) -> SequenceAdvance {
    if received < *current {
        warn!(
            current = *current,
            received, "out-of-order message, keeping current sequence position"
        );
        return SequenceAdvance::OutOfOrder {
            current: *current,
            received,
        };
    }

    let from = *current;
    *current = received;
    SequenceAdvance::Advanced { from, to: received }
}
