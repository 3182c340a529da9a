//! mirror-ingest: Topic feed ingestion pipeline
//!
//! Subscribes to a mirror node topic and turns each raw message into a domain
//! event: decode, track the sequence position, verify the running hash when the
//! position passes the checkpoint, and dispatch to an event handler.

pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod integrity;
pub mod metrics;
pub mod pipeline;
pub mod sequence;
pub mod server;
pub mod sink;
pub mod state;
pub mod subscription;

pub use decoder::{decode, DecodedPayload};
pub use dispatcher::{Dispatcher, DomainEvent, EventHandler};
pub use error::{DecodeError, ServerError, SinkError, VerificationError};
pub use integrity::{IntegrityOutcome, IntegrityTrigger, RunningHashVerifier, UncheckedVerifier};
pub use metrics::Metrics;
pub use pipeline::{FeedPipeline, ProcessOutcome};
pub use sequence::{GapPolicy, SequenceAdvance, SequenceTracker};
pub use server::{create_router, run_server, ServerState};
pub use sink::JsonLinesSink;
pub use state::{FeedState, SharedFeedState};
pub use subscription::{ListenerSummary, ListenerTask, SubscriptionManager, SubscriptionOptions};
