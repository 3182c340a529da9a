//! mirror-middleware: Pluggable feed transport abstractions
//!
//! Provides the trait-based subscription API for mirror node topics, with an
//! in-memory implementation for testing and a JSON-lines replay transport.

pub mod error;
pub mod memory;
pub mod replay;
pub mod topic;
pub mod transport;

pub use error::TransportError;
pub use memory::InMemoryFeedTransport;
pub use replay::JsonlReplayTransport;
pub use topic::{ConsensusTimestamp, TopicId};
pub use transport::{FeedTransport, StartPosition, TopicMessage, TopicSubscription};
