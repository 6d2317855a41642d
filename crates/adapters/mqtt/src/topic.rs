//! Topic layout: `{base}/{robot_id}/{channel}`.

use robofleet_domain::id::RobotId;

use crate::error::MqttError;

/// Inbound channels a robot publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Periodic status, battery and dustbin snapshots.
    Telemetry,
    /// Session lifecycle notifications.
    Events,
}

impl Channel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Events => "events",
        }
    }
}

/// Builds and parses topics under a common prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn commands(&self, robot_id: RobotId) -> String {
        format!("{}/{robot_id}/commands", self.base)
    }

    #[must_use]
    pub fn ping(&self, robot_id: RobotId) -> String {
        format!("{}/{robot_id}/ping", self.base)
    }

    /// Wildcard filters covering every robot's inbound channels.
    #[must_use]
    pub fn subscriptions(&self) -> [String; 2] {
        [Channel::Telemetry, Channel::Events].map(|c| format!("{}/+/{}", self.base, c.as_str()))
    }

    /// Split an inbound topic into the robot it concerns and its channel.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::UnexpectedTopic`] when the topic is outside the
    /// prefix, carries a malformed robot id, or names an unknown channel.
    pub fn parse(&self, topic: &str) -> Result<(RobotId, Channel), MqttError> {
        let unexpected = || MqttError::UnexpectedTopic(topic.to_string());

        let rest = topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(unexpected)?;
        let (id, channel) = rest.split_once('/').ok_or_else(unexpected)?;
        let robot_id = id.parse::<RobotId>().map_err(|_| unexpected())?;
        let channel = match channel {
            "telemetry" => Channel::Telemetry,
            "events" => Channel::Events,
            _ => return Err(unexpected()),
        };

        Ok((robot_id, channel))
    }
}
