//! JSON payloads exchanged with robots.

use serde::{Deserialize, Serialize};

use robofleet_app::device_report::{DeviceReport, ReportKind};
use robofleet_domain::command::RobotCommand;
use robofleet_domain::id::RobotId;
use robofleet_domain::robot::ConnectionStatus;
use robofleet_domain::time::Timestamp;

use crate::error::MqttError;
use crate::topic::Channel;

/// Outbound message: the command fields plus the time it was issued.
#[derive(Debug, Serialize)]
struct CommandEnvelope<'a> {
    #[serde(flatten)]
    command: &'a RobotCommand,
    timestamp: Timestamp,
}

/// Serialize a command as published on the commands topic.
///
/// # Errors
///
/// Returns [`MqttError::Payload`] if serialization fails.
pub fn encode_command(command: &RobotCommand, timestamp: Timestamp) -> Result<Vec<u8>, MqttError> {
    serde_json::to_vec(&CommandEnvelope { command, timestamp }).map_err(MqttError::Payload)
}

#[derive(Debug, Deserialize)]
struct Telemetry {
    #[serde(default)]
    status: Option<ConnectionStatus>,
    #[serde(default)]
    battery: Option<i32>,
    #[serde(default)]
    dustbin: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SessionEvent {
    SessionStarted,
    SessionCompleted {
        area: f64,
        energy: f64,
    },
    SessionFailed {
        code: String,
        #[serde(default)]
        message: Option<String>,
    },
    SessionError {
        code: String,
        #[serde(default)]
        message: Option<String>,
    },
}

impl From<SessionEvent> for ReportKind {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::SessionStarted => Self::SessionStarted,
            SessionEvent::SessionCompleted { area, energy } => {
                Self::SessionCompleted { area, energy }
            }
            SessionEvent::SessionFailed { code, message } => Self::SessionFailed { code, message },
            SessionEvent::SessionError { code, message } => Self::SessionError { code, message },
        }
    }
}

/// Decode a message received on one of a robot's inbound channels.
///
/// # Errors
///
/// Returns [`MqttError::Payload`] when the body is not valid for the channel.
pub fn decode_report(
    robot_id: RobotId,
    channel: Channel,
    body: &[u8],
) -> Result<DeviceReport, MqttError> {
    let kind = match channel {
        Channel::Telemetry => {
            let Telemetry {
                status,
                battery,
                dustbin,
            } = serde_json::from_slice(body).map_err(MqttError::Payload)?;
            ReportKind::Telemetry {
                status,
                battery,
                dustbin,
            }
        }
        Channel::Events => serde_json::from_slice::<SessionEvent>(body)
            .map_err(MqttError::Payload)?
            .into(),
    };

    Ok(DeviceReport { robot_id, kind })
}
