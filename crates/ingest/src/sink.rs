use std::path::Path;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::error;

use crate::dispatcher::{DomainEvent, EventHandler};
use crate::error::SinkError;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes each domain event as one JSON line.
/// Write failures are logged here and never reach the pipeline.
pub struct JsonLinesSink {
    writer: Mutex<BoxedWriter>,
}

impl JsonLinesSink {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Append to a file, creating it if needed
    pub async fn append_to(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self::new(file))
    }

    async fn write_event(&self, event: &DomainEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event).map_err(std::io::Error::from)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JsonLinesSink {
    async fn handle(&self, event: DomainEvent) {
        if let Err(e) = self.write_event(&event).await {
            error!(id = ?event.id(), error = %e, "failed to write event");
        }
    }
}
