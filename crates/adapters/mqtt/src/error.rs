//! MQTT adapter error types.

use robofleet_domain::error::FleetError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The request could not be queued for the event loop.
    #[error("MQTT client error: {0}")]
    Client(#[source] rumqttc::ClientError),

    /// Failed to encode or decode a JSON payload.
    #[error("invalid MQTT payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// A message arrived on a topic this adapter does not handle.
    #[error("unexpected topic {0}")]
    UnexpectedTopic(String),
}

impl From<MqttError> for FleetError {
    fn from(err: MqttError) -> Self {
        Self::transport(err)
    }
}
