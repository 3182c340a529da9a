use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use mirror_middleware::TopicMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::decoder::DecodedPayload;

/// Domain event built from one decoded topic message.
///
/// A flat JSON object: `id` (sequence number), `timestamp` (RFC 3339 consensus
/// time) and every decoded field. Decoded fields named `id` or `timestamp`
/// replace the synthesized ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainEvent(Map<String, Value>);

impl DomainEvent {
    pub fn from_message(message: &TopicMessage, payload: DecodedPayload) -> Self {
        let timestamp = match message.consensus_timestamp.to_datetime() {
            Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => {
                warn!(
                    sequence = message.sequence_number,
                    consensus_timestamp = %message.consensus_timestamp,
                    "consensus timestamp has no calendar form"
                );
                Value::Null
            }
        };

        let mut fields = Map::with_capacity(payload.len() + 2);
        fields.insert("id".to_string(), Value::from(message.sequence_number));
        fields.insert("timestamp".to_string(), timestamp);
        fields.extend(payload);
        Self(fields)
    }

    pub fn id(&self) -> Option<u64> {
        self.0.get("id").and_then(Value::as_u64)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.0.get("timestamp").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// Downstream consumer of domain events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Takes ownership of the event. Implementations handle their own failures.
    async fn handle(&self, event: DomainEvent);
}

#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn EventHandler>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self { handler }
    }

    /// Build the event for a decoded message and hand it to the handler
    pub async fn dispatch(&self, message: &TopicMessage, payload: DecodedPayload) {
        let event = DomainEvent::from_message(message, payload);
        self.handler.handle(event).await;
    }
}
