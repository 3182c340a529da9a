//! JSON-lines replay transport
//!
//! Replays a capture of mirror node topic messages, one REST-style record per
//! line:
//!
//! ```text
//! {"topic_id":"0.0.1234","sequence_number":1,"consensus_timestamp":"1700000000.000000001","message":"eyJ0eXBlIjoicG9zdCJ9"}
//! ```
//!
//! `message` is base64, as the mirror node REST API returns it. Records for
//! other topics are skipped; malformed lines are reported as transport errors
//! without ending the replay.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::TransportError;
use crate::topic::{ConsensusTimestamp, TopicId};
use crate::transport::{FeedTransport, StartPosition, TopicMessage, TopicSubscription};

/// One mirror node topic message record
#[derive(Debug, Deserialize)]
struct MirrorMessageRecord {
    topic_id: TopicId,
    sequence_number: u64,
    consensus_timestamp: ConsensusTimestamp,
    message: String,
}

impl MirrorMessageRecord {
    fn into_message(self) -> Result<TopicMessage, TransportError> {
        let contents = STANDARD
            .decode(self.message.as_bytes())
            .map_err(|e| {
                TransportError::InvalidMessage(format!(
                    "sequence {}: message is not base64: {}",
                    self.sequence_number, e
                ))
            })?;

        Ok(TopicMessage {
            topic_id: self.topic_id,
            contents: Bytes::from(contents),
            sequence_number: self.sequence_number,
            consensus_timestamp: self.consensus_timestamp,
        })
    }
}

/// Transport that replays a JSON-lines capture file
pub struct JsonlReplayTransport {
    path: PathBuf,
}

impl JsonlReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct ReplaySubscription {
    /// `None` once the file is exhausted or unreadable
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
    line_number: usize,
    topic: TopicId,
    start: StartPosition,
}

#[async_trait]
impl TopicSubscription for ReplaySubscription {
    async fn next(&mut self) -> Result<Option<TopicMessage>, TransportError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            // Raw bytes: a line that is not UTF-8 is a bad record, not a broken stream
            self.buf.clear();
            match reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => {
                    self.reader = None;
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => {
                    self.reader = None;
                    return Err(TransportError::Stream(e.to_string()));
                }
            }
            self.line_number += 1;

            if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let record: MirrorMessageRecord = serde_json::from_slice(&self.buf).map_err(|e| {
                TransportError::InvalidMessage(format!("line {}: {}", self.line_number, e))
            })?;

            if record.topic_id != self.topic || !self.start.includes(record.consensus_timestamp) {
                continue;
            }

            return record.into_message().map(Some);
        }
    }
}

#[async_trait]
impl FeedTransport for JsonlReplayTransport {
    async fn subscribe(
        &self,
        topic: TopicId,
        start: StartPosition,
    ) -> Result<Box<dyn TopicSubscription>, TransportError> {
        let file = File::open(&self.path).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("open {}: {}", self.path.display(), e))
        })?;

        tracing::info!(path = %self.path.display(), topic = %topic, "replaying capture");

        Ok(Box::new(ReplaySubscription {
            reader: Some(BufReader::new(file)),
            buf: Vec::new(),
            line_number: 0,
            topic,
            start,
        }))
    }
}
