//! # robofleet-adapter-mqtt
//!
//! MQTT adapter: the transport between the fleet core and physical robots.
//!
//! ## Responsibilities
//! - Implement the `CommandGateway` port: publish commands to
//!   `{base}/{robot_id}/commands` (and pings to `{base}/{robot_id}/ping`)
//!   with QoS 1, so a successful dispatch means "queued for at-least-once
//!   delivery"
//! - Drive the client event loop and decode inbound
//!   `{base}/{robot_id}/telemetry` and `{base}/{robot_id}/events` messages into
//!   [`DeviceReport`](robofleet_app::device_report::DeviceReport)s
//!
//! ## Dependency rule
//! Same as other adapters: depends on `robofleet-app` and `robofleet-domain`.

pub mod config;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod payload;
pub mod topic;

pub use config::MqttConfig;
pub use gateway::MqttCommandGateway;
pub use listener::ReportListener;

/// Create a connected gateway/listener pair sharing one MQTT client.
///
/// Nothing goes over the network until [`ReportListener::run`] polls the
/// event loop.
#[must_use]
pub fn connect(config: &MqttConfig) -> (MqttCommandGateway, ReportListener) {
    let mut options = rumqttc::MqttOptions::new(
        config.client_id.clone(),
        config.broker_host.clone(),
        config.broker_port,
    );
    options.set_keep_alive(std::time::Duration::from_secs(u64::from(
        config.keep_alive_secs,
    )));
    let (client, event_loop) = rumqttc::AsyncClient::new(options, config.channel_capacity);
    let topics = topic::Topics::new(config.base_topic.clone());

    (
        MqttCommandGateway::new(client.clone(), topics.clone()),
        ReportListener::new(client, event_loop, topics),
    )
}
