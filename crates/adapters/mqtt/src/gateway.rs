//! [`CommandGateway`] over MQTT.

use rumqttc::{AsyncClient, QoS};

use robofleet_app::ports::CommandGateway;
use robofleet_domain::command::RobotCommand;
use robofleet_domain::error::FleetError;
use robofleet_domain::id::RobotId;
use robofleet_domain::time::now;

use crate::error::MqttError;
use crate::payload::encode_command;
use crate::topic::Topics;

/// Publishes commands with QoS 1 and no retain flag.
///
/// `publish` only enqueues the packet for the event loop, so `Ok` means the
/// command is queued for at-least-once delivery, not that the robot got it.
#[derive(Clone)]
pub struct MqttCommandGateway {
    client: AsyncClient,
    topics: Topics,
}

impl MqttCommandGateway {
    #[must_use]
    pub fn new(client: AsyncClient, topics: Topics) -> Self {
        Self { client, topics }
    }

    async fn publish(&self, topic: String, command: &RobotCommand) -> Result<(), MqttError> {
        let payload = encode_command(command, now())?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(MqttError::Client)
    }
}

impl CommandGateway for MqttCommandGateway {
    async fn dispatch(&self, robot_id: RobotId, command: RobotCommand) -> Result<(), FleetError> {
        tracing::debug!(%robot_id, command = command.name(), "publishing command");
        self.publish(self.topics.commands(robot_id), &command)
            .await
            .map_err(|err| {
                tracing::warn!(%robot_id, command = command.name(), %err, "command publish failed");
                FleetError::from(err)
            })
    }

    async fn test_connection(&self, robot_id: RobotId) -> Result<bool, FleetError> {
        match self
            .publish(self.topics.ping(robot_id), &RobotCommand::Ping)
            .await
        {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(%robot_id, %err, "ping failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rumqttc::MqttOptions;

    use super::*;

    fn client() -> (MqttCommandGateway, rumqttc::EventLoop) {
        let options = MqttOptions::new("test", "localhost", 1883);
        let (client, event_loop) = AsyncClient::new(options, 8);
        (
            MqttCommandGateway::new(client, Topics::new("robots")),
            event_loop,
        )
    }

    #[tokio::test]
    async fn should_queue_command_while_event_loop_is_alive() {
        let (gateway, _event_loop) = client();
        let robot_id = RobotId::new();

        gateway.send_stop(robot_id).await.unwrap();
        assert!(gateway.test_connection(robot_id).await.unwrap());
    }

    #[tokio::test]
    async fn should_fail_with_transport_error_once_event_loop_is_gone() {
        let (gateway, event_loop) = client();
        drop(event_loop);
        let robot_id = RobotId::new();

        let err = gateway.send_pause(robot_id).await.unwrap_err();
        assert!(matches!(err, FleetError::Transport(_)));
        assert!(!gateway.test_connection(robot_id).await.unwrap());
    }
}
