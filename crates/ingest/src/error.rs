use thiserror::Error;

/// A feed message this consumer cannot interpret
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON without fields. Scalars and arrays are treated as unprocessable
    /// rather than dispatched as empty events.
    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Running-hash verification failed; the checkpoint stays where it was
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("running hash mismatch: {0}")]
    Failed(String),
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("metrics encoding failed: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("metrics output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
