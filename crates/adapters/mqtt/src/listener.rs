//! Drives the MQTT event loop and forwards robot reports.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use robofleet_app::device_report::DeviceReport;

use crate::payload::decode_report;
use crate::topic::Topics;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Owns the event loop; outbound publishes only progress while
/// [`ReportListener::run`] is polling.
pub struct ReportListener {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: Topics,
}

impl ReportListener {
    #[must_use]
    pub fn new(client: AsyncClient, event_loop: EventLoop, topics: Topics) -> Self {
        Self {
            client,
            event_loop,
            topics,
        }
    }

    /// Poll the broker until `cancel` fires or `sink` is closed.
    ///
    /// Subscriptions are renewed on every `ConnAck` so they survive
    /// reconnects. Connection errors are logged and retried after a delay.
    pub async fn run(mut self, sink: mpsc::Sender<DeviceReport>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("connected to MQTT broker");
                    self.subscribe();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let Some(report) = self.decode(&publish) else {
                        continue;
                    };
                    if sink.send(report).await.is_err() {
                        tracing::debug!("report sink closed, stopping listener");
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, "MQTT connection error, retrying");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        if let Err(err) = self.client.try_disconnect() {
            tracing::debug!(%err, "MQTT disconnect failed");
        }
    }

    fn subscribe(&self) {
        for filter in self.topics.subscriptions() {
            if let Err(err) = self.client.try_subscribe(&filter, QoS::AtLeastOnce) {
                tracing::warn!(%filter, %err, "MQTT subscribe failed");
            }
        }
    }

    fn decode(&self, publish: &Publish) -> Option<DeviceReport> {
        let decoded = self
            .topics
            .parse(&publish.topic)
            .and_then(|(robot_id, channel)| decode_report(robot_id, channel, &publish.payload));
        match decoded {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(topic = %publish.topic, %err, "dropping inbound message");
                None
            }
        }
    }
}
