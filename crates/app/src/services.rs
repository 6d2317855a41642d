//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod fleet_orchestrator;
pub mod robot_service;
pub mod schedule_service;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use robofleet_domain::error::{FleetError, NotFoundError};
use robofleet_domain::event::Event;
use robofleet_domain::id::RobotId;

use crate::ports::EventPublisher;

/// Publish drained aggregate events. Failures are logged, never propagated:
/// the state change they describe is already committed.
pub(crate) async fn publish_all<E: EventPublisher>(publisher: &E, events: Vec<Event>) {
    for event in events {
        let kind = event.kind.name();
        if let Err(err) = publisher.publish(event).await {
            tracing::warn!(%err, event = kind, "failed to publish event");
        }
    }
}

pub(crate) fn robot_not_found(id: RobotId) -> FleetError {
    NotFoundError {
        entity: "Robot",
        id: id.to_string(),
    }
    .into()
}

/// Race `fut` against the caller's cancellation signal.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, FleetError>>,
) -> Result<T, FleetError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FleetError::Cancelled),
        result = fut => result,
    }
}
