//! # robocleand: robot fleet daemon
//!
//! Composition root that wires all adapters together and runs the fleet
//! coordinator.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository and transport implementations (adapters)
//! - Construct application services, injecting adapters via port traits
//! - Run the schedule runner and, with MQTT enabled, the device-report pump
//! - Handle graceful shutdown on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use robofleet_adapter_mqtt::MqttCommandGateway;
use robofleet_adapter_storage_sqlite_sqlx::{
    SqliteRobotRepository, SqliteScheduleRepository, SqliteSessionRepository,
};
use robofleet_adapter_virtual::{LoggingGateway, VirtualProvisioner, VirtualVendor};
use robofleet_app::device_report::DeviceReport;
use robofleet_app::event_bus::InProcessEventBus;
use robofleet_app::ports::{CommandGateway, EventPublisher, RobotRepository, SessionRepository};
use robofleet_app::robot_locks::RobotLocks;
use robofleet_app::schedule_runner::ScheduleRunner;
use robofleet_app::services::fleet_orchestrator::FleetOrchestrator;
use robofleet_app::services::robot_service::RobotService;
use robofleet_app::services::schedule_service::ScheduleService;
use robofleet_domain::command::RobotCommand;
use robofleet_domain::error::FleetError;
use robofleet_domain::event::Event;
use robofleet_domain::id::RobotId;

use crate::config::Config;

/// The command transport selected by configuration.
enum Gateway {
    Mqtt(MqttCommandGateway),
    Logging(LoggingGateway),
}

impl CommandGateway for Gateway {
    async fn dispatch(&self, robot_id: RobotId, command: RobotCommand) -> Result<(), FleetError> {
        match self {
            Self::Mqtt(gateway) => gateway.dispatch(robot_id, command).await,
            Self::Logging(gateway) => gateway.dispatch(robot_id, command).await,
        }
    }

    async fn test_connection(&self, robot_id: RobotId) -> Result<bool, FleetError> {
        match self {
            Self::Mqtt(gateway) => gateway.test_connection(robot_id).await,
            Self::Logging(gateway) => gateway.test_connection(robot_id).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = robofleet_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let robots = Arc::new(SqliteRobotRepository::new(pool.clone()));
    let sessions = Arc::new(SqliteSessionRepository::new(pool.clone()));
    let schedules = Arc::new(SqliteScheduleRepository::new(pool));

    // Event bus
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let locks = Arc::new(RobotLocks::new());
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    tasks.spawn(log_events(event_bus.subscribe(), cancel.clone()));

    // Transport
    let (gateway, reports) = if config.mqtt.enabled {
        let (gateway, listener) = robofleet_adapter_mqtt::connect(&config.mqtt);
        let (sink, reports) = mpsc::channel(config.mqtt.channel_capacity);
        tasks.spawn(listener.run(sink, cancel.clone()));
        tracing::info!(
            host = %config.mqtt.broker_host,
            port = config.mqtt.broker_port,
            "MQTT transport enabled"
        );
        (Gateway::Mqtt(gateway), Some(reports))
    } else {
        tracing::warn!("MQTT disabled, robot commands are only logged");
        (Gateway::Logging(LoggingGateway::default()), None)
    };

    // Services
    let orchestrator = Arc::new(
        FleetOrchestrator::new(
            Arc::clone(&robots),
            sessions,
            gateway,
            Arc::clone(&event_bus),
            Arc::clone(&locks),
        )
        .with_dispatch_timeout(config.dispatch_timeout()),
    );
    let robot_service = RobotService::new(
        Arc::clone(&robots),
        VirtualVendor::default(),
        Arc::new(VirtualProvisioner::default()),
        Arc::clone(&event_bus),
        locks,
    )
    .with_provisioning_timeout(config.provisioning_timeout());
    let schedule_service = ScheduleService::new(Arc::clone(&schedules), robots, event_bus);

    let online = robot_service
        .list_online_robots(&cancel)
        .await
        .context("failed to load robots")?;
    let active = schedule_service
        .list_active_schedules(&cancel)
        .await
        .context("failed to load schedules")?;
    tracing::info!(
        online_robots = online.len(),
        active_schedules = active.len(),
        "fleet loaded"
    );

    // Background work
    if let Some(reports) = reports {
        tasks.spawn(pump_reports(reports, Arc::clone(&orchestrator)));
    }
    let runner = ScheduleRunner::new(schedules, orchestrator);
    let interval = config.tick_interval();
    let runner_cancel = cancel.clone();
    tasks.spawn(async move { runner.run(interval, runner_cancel).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    cancel.cancel();

    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            tracing::error!(%err, "background task failed");
        }
    }
    db.pool().close().await;

    Ok(())
}

/// Apply every decoded report; ends when the listener drops its sender.
async fn pump_reports<R, S, G, E>(
    mut reports: mpsc::Receiver<DeviceReport>,
    orchestrator: Arc<FleetOrchestrator<R, S, G, E>>,
) where
    R: RobotRepository + Send + Sync,
    S: SessionRepository + Send + Sync,
    G: CommandGateway + Send + Sync,
    E: EventPublisher + Send + Sync,
{
    while let Some(report) = reports.recv().await {
        let robot_id = report.robot_id;
        if let Err(err) = orchestrator.handle_report(report).await {
            tracing::warn!(%robot_id, %err, "device report not applied");
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<Event>, cancel: CancellationToken) {
    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(event) => tracing::debug!(
                robot_id = %event.robot_id,
                event = event.kind.name(),
                "domain event"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log lagging behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
