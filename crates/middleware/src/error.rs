use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("invalid topic id: {0}")]
    InvalidTopic(String),
    #[error("invalid consensus timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("subscriber lagged, {0} messages skipped")]
    Lagged(u64),
    #[error("stream error: {0}")]
    Stream(String),
}
