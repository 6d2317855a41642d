//! Fleet orchestrator: cross-aggregate cleaning use-cases.
//!
//! Every command for a robot runs under that robot's lock, so the
//! check-then-act sequence "no active session, then create one" cannot
//! interleave with another command for the same robot. The session store's
//! one-active-session constraint backs this up across processes.
//!
//! Each command follows the same phases:
//! 1. load and validate (cancellable, nothing written yet),
//! 2. commit new state (not cancellable),
//! 3. publish drained events and dispatch the device command. Neither can
//!    undo the commit; failures are logged and reported in the outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use robofleet_domain::command::RobotCommand;
use robofleet_domain::error::{DomainError, FleetError, NotFoundError};
use robofleet_domain::id::{CleaningErrorId, RobotId, ScheduleId, SessionId, ZoneId};
use robofleet_domain::robot::{ConnectionStatus, Robot};
use robofleet_domain::session::{CleaningMode, CleaningSession, SessionStatus};
use robofleet_domain::time::Timestamp;

use crate::device_report::{DeviceReport, ReportKind};
use crate::ports::{CommandGateway, EventPublisher, RobotRepository, SessionRepository};
use crate::robot_locks::RobotLocks;
use crate::services::{cancellable, publish_all, robot_not_found};

/// Default bound on a single gateway dispatch.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Input of [`FleetOrchestrator::start_cleaning`].
#[derive(Debug, Clone)]
pub struct StartCleaning {
    pub robot_id: RobotId,
    pub mode: CleaningMode,
    pub zone_ids: Vec<ZoneId>,
    pub schedule_id: Option<ScheduleId>,
}

/// What happened to the device command after state was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Queued for at-least-once delivery.
    Queued,
    /// The gateway refused or failed.
    Failed(String),
    /// The gateway did not answer in time.
    TimedOut,
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Result of a successful [`FleetOrchestrator::start_cleaning`].
#[derive(Debug, Clone)]
pub struct CleaningStarted {
    pub robot: Robot,
    pub session: CleaningSession,
    pub dispatch: DispatchOutcome,
}

/// Result of a state-changing command that does not create a session.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub robot: Robot,
    /// The session that was cancelled, paused or resumed, if any.
    pub session: Option<CleaningSession>,
    pub dispatch: DispatchOutcome,
}

/// Coordinates robots, sessions and the command gateway.
pub struct FleetOrchestrator<R, S, G, E> {
    robots: R,
    sessions: S,
    gateway: G,
    publisher: E,
    locks: Arc<RobotLocks>,
    dispatch_timeout: Duration,
}

impl<R, S, G, E> FleetOrchestrator<R, S, G, E>
where
    R: RobotRepository + Send + Sync,
    S: SessionRepository + Send + Sync,
    G: CommandGateway + Send + Sync,
    E: EventPublisher + Send + Sync,
{
    /// Create a new orchestrator; `locks` must be shared with every other
    /// writer of robot state.
    pub fn new(robots: R, sessions: S, gateway: G, publisher: E, locks: Arc<RobotLocks>) -> Self {
        Self {
            robots,
            sessions,
            gateway,
            publisher,
            locks,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Start a cleaning run: plan a session, mark the robot busy, persist
    /// both, then ask the robot to start.
    ///
    /// Cancelling before the commit leaves no trace. Once committed, the
    /// command is dispatched regardless of cancellation.
    ///
    /// # Errors
    ///
    /// - [`FleetError::NotFound`] when the robot does not exist
    /// - [`DomainError::RobotNotReady`] when the robot is not online or its battery is too low
    /// - [`DomainError::SessionAlreadyActive`] when the robot already has an active session
    /// - [`FleetError::Cancelled`] when `cancel` fires before the commit
    /// - a storage error when persisting fails
    #[tracing::instrument(skip(self, request, cancel), fields(robot_id = %request.robot_id, mode = %request.mode))]
    pub async fn start_cleaning(
        &self,
        request: StartCleaning,
        cancel: &CancellationToken,
    ) -> Result<CleaningStarted, FleetError> {
        let robot_id = request.robot_id;
        let _guard = cancellable(cancel, async { Ok(self.locks.acquire(robot_id).await) }).await?;

        let mut robot = cancellable(cancel, self.load_robot(robot_id)).await?;
        robot.start_cleaning()?;
        if let Some(active) = cancellable(cancel, self.sessions.get_active_for_robot(robot_id)).await? {
            tracing::debug!(session_id = %active.id(), "robot already has an active session");
            return Err(DomainError::SessionAlreadyActive {
                robot_id: robot_id.to_string(),
            }
            .into());
        }
        let session = CleaningSession::plan(
            robot_id,
            request.mode,
            request.zone_ids,
            request.schedule_id,
        );
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }

        let events = robot.take_events();
        let session = self.sessions.add(session).await?;
        let robot = match self.robots.update(robot).await {
            Ok(robot) => robot,
            Err(err) => {
                self.abandon(session).await;
                return Err(err);
            }
        };
        publish_all(&self.publisher, events).await;
        tracing::info!(session_id = %session.id(), "cleaning session planned");

        let dispatch = self
            .dispatch(
                robot_id,
                RobotCommand::StartCleaning {
                    session_id: session.id(),
                    mode: session.mode(),
                    zones: session.zone_ids().to_vec(),
                },
            )
            .await;
        Ok(CleaningStarted {
            robot,
            session,
            dispatch,
        })
    }

    /// Cancel the active session, if any, and send the robot home.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`], [`FleetError::Cancelled`] before the commit,
    /// or a storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn stop_cleaning(
        &self,
        robot_id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, FleetError> {
        let _guard = cancellable(cancel, async { Ok(self.locks.acquire(robot_id).await) }).await?;
        let mut robot = cancellable(cancel, self.load_robot(robot_id)).await?;
        let mut session = cancellable(cancel, self.sessions.get_active_for_robot(robot_id)).await?;
        if let Some(session) = session.as_mut() {
            session.cancel()?;
        }
        robot.return_to_base();
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }

        // Robot before session: a failed write never leaves a cancelled
        // session on a busy robot.
        let events = robot.take_events();
        let robot = self.robots.update(robot).await?;
        let session = match session {
            Some(session) => Some(self.sessions.update(session).await?),
            None => None,
        };
        publish_all(&self.publisher, events).await;
        if let Some(session) = &session {
            tracing::info!(session_id = %session.id(), "cleaning session cancelled");
        }

        let dispatch = self.dispatch(robot_id, RobotCommand::Stop).await;
        Ok(CommandOutcome {
            robot,
            session,
            dispatch,
        })
    }

    /// Send the robot home without touching its session.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`], [`FleetError::Cancelled`] before the commit,
    /// or a storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn return_to_base(
        &self,
        robot_id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, FleetError> {
        let _guard = cancellable(cancel, async { Ok(self.locks.acquire(robot_id).await) }).await?;
        let mut robot = cancellable(cancel, self.load_robot(robot_id)).await?;
        robot.return_to_base();
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }

        let events = robot.take_events();
        let robot = self.robots.update(robot).await?;
        publish_all(&self.publisher, events).await;

        let dispatch = self.dispatch(robot_id, RobotCommand::ReturnToBase).await;
        Ok(CommandOutcome {
            robot,
            session: None,
            dispatch,
        })
    }

    /// Pause the robot's in-progress session.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`], [`DomainError::NoActiveSession`],
    /// [`DomainError::SessionNotInProgress`], [`FleetError::Cancelled`] or a
    /// storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn pause_cleaning(
        &self,
        robot_id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, FleetError> {
        self.steer_session(robot_id, cancel, CleaningSession::pause, RobotCommand::Pause)
            .await
    }

    /// Resume the robot's paused session.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`], [`DomainError::NoActiveSession`],
    /// [`DomainError::SessionNotPaused`], [`FleetError::Cancelled`] or a
    /// storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn resume_cleaning(
        &self,
        robot_id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome, FleetError> {
        self.steer_session(robot_id, cancel, CleaningSession::resume, RobotCommand::Resume)
            .await
    }

    async fn steer_session(
        &self,
        robot_id: RobotId,
        cancel: &CancellationToken,
        transition: fn(&mut CleaningSession) -> Result<(), DomainError>,
        command: RobotCommand,
    ) -> Result<CommandOutcome, FleetError> {
        let _guard = cancellable(cancel, async { Ok(self.locks.acquire(robot_id).await) }).await?;
        let robot = cancellable(cancel, self.load_robot(robot_id)).await?;
        let mut session = cancellable(cancel, self.sessions.get_active_for_robot(robot_id))
            .await?
            .ok_or(DomainError::NoActiveSession)?;
        transition(&mut session)?;
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }

        let session = self.sessions.update(session).await?;
        let dispatch = self.dispatch(robot_id, command).await;
        Ok(CommandOutcome {
            robot,
            session: Some(session),
            dispatch,
        })
    }

    /// Ping the robot through the gateway, bounded by the dispatch timeout.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`] for an unknown robot.
    pub async fn test_connection(&self, robot_id: RobotId) -> Result<bool, FleetError> {
        self.load_robot(robot_id).await?;
        match tokio::time::timeout(self.dispatch_timeout, self.gateway.test_connection(robot_id)).await {
            Ok(Ok(reachable)) => Ok(reachable),
            Ok(Err(err)) => {
                tracing::warn!(%robot_id, %err, "connection test failed");
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }

    /// Apply a report received from a robot.
    ///
    /// Reports may be duplicated or arrive late: one that no longer fits the
    /// robot's state is logged and ignored rather than returned as an error.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`] for an unknown robot, a domain error for an
    /// out-of-range telemetry value, or a storage error.
    #[tracing::instrument(skip(self, report), fields(robot_id = %report.robot_id))]
    pub async fn handle_report(&self, report: DeviceReport) -> Result<(), FleetError> {
        let robot_id = report.robot_id;
        let _guard = self.locks.acquire(robot_id).await;
        let mut robot = self.load_robot(robot_id).await?;

        let session = match report.kind {
            ReportKind::Telemetry {
                status,
                battery,
                dustbin,
            } => {
                if let Some(level) = battery {
                    robot.update_battery_level(level)?;
                }
                if let Some(level) = dustbin {
                    robot.update_dustbin_level(level)?;
                }
                if let Some(status) = status.filter(|s| *s != robot.status()) {
                    robot.update_status(status, Some("Reported by device"));
                }
                None
            }
            kind => {
                let Some(mut session) = self.sessions.get_active_for_robot(robot_id).await? else {
                    tracing::debug!(?kind, "session report without active session ignored");
                    return Ok(());
                };
                if let Err(err) = apply_session_report(&mut robot, &mut session, kind) {
                    tracing::debug!(%err, session_id = %session.id(), "stale session report ignored");
                    return Ok(());
                }
                Some(session)
            }
        };

        let events = robot.take_events();
        self.robots.update(robot).await?;
        if let Some(session) = session {
            self.sessions.update(session).await?;
        }
        publish_all(&self.publisher, events).await;
        Ok(())
    }

    /// Mark one fault of a session as dealt with.
    ///
    /// # Errors
    ///
    /// [`FleetError::NotFound`] for an unknown session,
    /// [`DomainError::UnknownCleaningError`] for an unknown fault, or a
    /// storage error.
    #[tracing::instrument(skip(self, resolution))]
    pub async fn resolve_session_error(
        &self,
        session_id: SessionId,
        error_id: CleaningErrorId,
        resolution: Option<String>,
    ) -> Result<CleaningSession, FleetError> {
        let robot_id = self.get_session(session_id).await?.robot_id();
        let _guard = self.locks.acquire(robot_id).await;
        let mut session = self.get_session(session_id).await?;
        session.resolve_error(error_id, resolution)?;
        self.sessions.update(session).await
    }

    /// # Errors
    ///
    /// [`FleetError::NotFound`] or a storage error.
    pub async fn get_session(&self, id: SessionId) -> Result<CleaningSession, FleetError> {
        self.sessions.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Session",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn active_session(
        &self,
        robot_id: RobotId,
    ) -> Result<Option<CleaningSession>, FleetError> {
        self.sessions.get_active_for_robot(robot_id).await
    }

    /// Every session of the robot, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn session_history(
        &self,
        robot_id: RobotId,
    ) -> Result<Vec<CleaningSession>, FleetError> {
        self.sessions.get_by_robot(robot_id).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn sessions_with_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<CleaningSession>, FleetError> {
        self.sessions.get_by_status(status).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn sessions_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<CleaningSession>, FleetError> {
        self.sessions.get_by_date_range(from, to).await
    }

    pub(crate) fn publisher(&self) -> &E {
        &self.publisher
    }

    async fn load_robot(&self, id: RobotId) -> Result<Robot, FleetError> {
        self.robots
            .get_by_id(id)
            .await?
            .ok_or_else(|| robot_not_found(id))
    }

    /// Roll back a session whose robot could not be updated.
    async fn abandon(&self, mut session: CleaningSession) {
        let session_id = session.id();
        if let Err(err) = session.cancel() {
            tracing::error!(%session_id, %err, "unable to cancel orphaned session");
            return;
        }
        if let Err(err) = self.sessions.update(session).await {
            tracing::error!(%session_id, %err, "unable to cancel orphaned session");
        }
    }

    async fn dispatch(&self, robot_id: RobotId, command: RobotCommand) -> DispatchOutcome {
        let name = command.name();
        match tokio::time::timeout(self.dispatch_timeout, self.gateway.dispatch(robot_id, command)).await {
            Ok(Ok(())) => {
                tracing::debug!(%robot_id, command = name, "command queued");
                DispatchOutcome::Queued
            }
            Ok(Err(err)) => {
                tracing::warn!(%robot_id, command = name, %err, "command dispatch failed");
                DispatchOutcome::Failed(err.to_string())
            }
            Err(_) => {
                tracing::warn!(%robot_id, command = name, timeout = ?self.dispatch_timeout, "command dispatch timed out");
                DispatchOutcome::TimedOut
            }
        }
    }
}

fn apply_session_report(
    robot: &mut Robot,
    session: &mut CleaningSession,
    kind: ReportKind,
) -> Result<(), DomainError> {
    match kind {
        ReportKind::SessionStarted => session.start(),
        ReportKind::SessionCompleted { area, energy } => {
            session.complete(area, energy)?;
            robot.return_to_base();
            Ok(())
        }
        ReportKind::SessionFailed { code, message } => {
            session.fail(&code, message.clone())?;
            let reason = message.unwrap_or_else(|| format!("Cleaning failed: {code}"));
            robot.update_status(ConnectionStatus::Error, Some(&reason));
            Ok(())
        }
        ReportKind::SessionError { code, message } => session.add_error(&code, message).map(|_| ()),
        ReportKind::Telemetry { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use robofleet_domain::event::EventKind;

    use super::*;
    use crate::testing::{
        InMemoryRobotRepo, InMemorySessionRepo, RecordingGateway, SpyPublisher, online_robot,
        shared,
    };

    type Orchestrator = FleetOrchestrator<
        Arc<InMemoryRobotRepo>,
        Arc<InMemorySessionRepo>,
        Arc<RecordingGateway>,
        Arc<SpyPublisher>,
    >;

    struct Fixture {
        robots: Arc<InMemoryRobotRepo>,
        sessions: Arc<InMemorySessionRepo>,
        gateway: Arc<RecordingGateway>,
        publisher: Arc<SpyPublisher>,
        orchestrator: Arc<Orchestrator>,
    }

    fn fixture(robot: Robot) -> Fixture {
        let robots = shared(InMemoryRobotRepo::with([robot]));
        let sessions = shared(InMemorySessionRepo::default());
        let gateway = shared(RecordingGateway::default());
        let publisher = shared(SpyPublisher::default());
        let orchestrator = FleetOrchestrator::new(
            Arc::clone(&robots),
            Arc::clone(&sessions),
            Arc::clone(&gateway),
            Arc::clone(&publisher),
            shared(RobotLocks::new()),
        )
        .with_dispatch_timeout(Duration::from_millis(50));
        Fixture {
            robots,
            sessions,
            gateway,
            publisher,
            orchestrator: Arc::new(orchestrator),
        }
    }

    fn start(robot_id: RobotId) -> StartCleaning {
        StartCleaning {
            robot_id,
            mode: CleaningMode::Full,
            zone_ids: vec![],
            schedule_id: None,
        }
    }

    async fn started(fx: &Fixture, robot_id: RobotId) -> CleaningStarted {
        fx.orchestrator
            .start_cleaning(start(robot_id), &CancellationToken::new())
            .await
            .unwrap()
    }

    fn report(robot_id: RobotId, kind: ReportKind) -> DeviceReport {
        DeviceReport { robot_id, kind }
    }

    #[tokio::test]
    async fn should_plan_session_mark_busy_and_dispatch() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let zone = ZoneId::new();

        let result = fx
            .orchestrator
            .start_cleaning(
                StartCleaning {
                    zone_ids: vec![zone],
                    ..start(id)
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.session.status(), SessionStatus::Planned);
        assert_eq!(result.robot.status(), ConnectionStatus::Busy);
        assert_eq!(result.dispatch, DispatchOutcome::Queued);
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::Busy);
        assert_eq!(fx.sessions.active_count(id), 1);
        assert_eq!(
            fx.gateway.sent(),
            vec![(
                id,
                RobotCommand::StartCleaning {
                    session_id: result.session.id(),
                    mode: CleaningMode::Full,
                    zones: vec![zone],
                }
            )]
        );
        assert_eq!(fx.publisher.names(), vec!["status_changed"]);
    }

    #[tokio::test]
    async fn should_fail_with_not_found_for_unknown_robot() {
        let fx = fixture(online_robot(80));
        let err = fx
            .orchestrator
            .start_cleaning(start(RobotId::new()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::NotFound(_)));
    }

    #[tokio::test]
    async fn should_refuse_when_battery_below_fifteen() {
        let robot = online_robot(14);
        let id = robot.id();
        let fx = fixture(robot);

        let err = fx
            .orchestrator
            .start_cleaning(start(id), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::Domain(DomainError::RobotNotReady { battery: 14, .. })
        ));
        assert!(fx.sessions.all().is_empty());
        assert!(fx.gateway.sent().is_empty());
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::Online);
    }

    #[tokio::test]
    async fn should_refuse_second_session_while_one_is_active() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let first = started(&fx, id).await;

        // The robot comes back online while its session is still planned.
        let mut robot = fx.robots.get(id);
        robot.update_status(ConnectionStatus::Online, None);
        fx.robots.store.lock().unwrap().insert(id, robot);

        let err = fx
            .orchestrator
            .start_cleaning(start(id), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FleetError::Domain(DomainError::SessionAlreadyActive { .. })
        ));
        assert_eq!(fx.sessions.active_count(id), 1);
        assert_eq!(
            fx.sessions.all()[0].id(),
            first.session.id()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_create_exactly_one_session_under_concurrent_starts() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = Arc::clone(&fx.orchestrator);
                tokio::spawn(async move {
                    orchestrator
                        .start_cleaning(start(id), &CancellationToken::new())
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(err.is_domain(), "unexpected error: {err}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(fx.sessions.active_count(id), 1);
    }

    #[tokio::test]
    async fn should_leave_no_trace_when_cancelled_before_commit() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx
            .orchestrator
            .start_cleaning(start(id), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cancelled));
        assert!(fx.sessions.all().is_empty());
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::Online);
        assert!(fx.robots.get(id).status_history().is_empty());
    }

    #[tokio::test]
    async fn should_keep_committed_state_when_dispatch_fails() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        fx.gateway.fail.store(true, Ordering::SeqCst);

        let result = started(&fx, id).await;
        assert!(matches!(result.dispatch, DispatchOutcome::Failed(_)));
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::Busy);
        assert_eq!(fx.sessions.active_count(id), 1);
    }

    #[tokio::test]
    async fn should_return_when_gateway_stalls() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        fx.gateway.stall.store(true, Ordering::SeqCst);

        let result = started(&fx, id).await;
        assert_eq!(result.dispatch, DispatchOutcome::TimedOut);
        assert_eq!(fx.sessions.active_count(id), 1);
    }

    #[tokio::test]
    async fn should_cancel_orphaned_session_when_robot_update_fails() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        fx.robots.fail_updates.store(true, Ordering::SeqCst);

        let err = fx
            .orchestrator
            .start_cleaning(start(id), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Storage(_)));
        assert_eq!(fx.sessions.active_count(id), 0);
        assert!(fx.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn should_cancel_active_session_and_return_home_when_stopped() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let run = started(&fx, id).await;

        let outcome = fx
            .orchestrator
            .stop_cleaning(id, &CancellationToken::new())
            .await
            .unwrap();

        let session = outcome.session.unwrap();
        assert_eq!(session.id(), run.session.id());
        assert_eq!(session.status(), SessionStatus::Cancelled);
        assert_eq!(outcome.robot.status(), ConnectionStatus::ReturningToBase);
        assert_eq!(fx.sessions.active_count(id), 0);
        assert_eq!(fx.gateway.sent().last().unwrap().1, RobotCommand::Stop);
    }

    #[tokio::test]
    async fn should_keep_session_active_when_stop_cannot_update_robot() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let run = started(&fx, id).await;
        fx.robots.fail_updates.store(true, Ordering::SeqCst);

        let err = fx
            .orchestrator
            .stop_cleaning(id, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FleetError::Storage(_)));
        assert_eq!(fx.sessions.active_count(id), 1);
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::Busy);
        assert_ne!(fx.gateway.sent().last().unwrap().1, RobotCommand::Stop);

        fx.robots.fail_updates.store(false, Ordering::SeqCst);
        let outcome = fx
            .orchestrator
            .stop_cleaning(id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.session.unwrap().id(), run.session.id());
        assert_eq!(fx.sessions.active_count(id), 0);
    }

    #[tokio::test]
    async fn should_return_home_when_stopped_without_session() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);

        let outcome = fx
            .orchestrator
            .stop_cleaning(id, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.session.is_none());
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::ReturningToBase);
    }

    #[tokio::test]
    async fn should_send_robot_home_and_publish_returning_event() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);

        fx.orchestrator
            .return_to_base(id, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fx.gateway.sent(), vec![(id, RobotCommand::ReturnToBase)]);
        assert_eq!(
            fx.publisher.names(),
            vec!["status_changed", "returning_to_base"]
        );
    }

    #[tokio::test]
    async fn should_pause_and_resume_running_session() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        started(&fx, id).await;
        let cancel = CancellationToken::new();

        assert!(matches!(
            fx.orchestrator.pause_cleaning(id, &cancel).await,
            Err(FleetError::Domain(DomainError::SessionNotInProgress { .. }))
        ));
        fx.orchestrator
            .handle_report(report(id, ReportKind::SessionStarted))
            .await
            .unwrap();

        let paused = fx.orchestrator.pause_cleaning(id, &cancel).await.unwrap();
        assert_eq!(paused.session.unwrap().status(), SessionStatus::Paused);
        let resumed = fx.orchestrator.resume_cleaning(id, &cancel).await.unwrap();
        assert_eq!(resumed.session.unwrap().status(), SessionStatus::InProgress);

        let commands: Vec<_> = fx.gateway.sent().into_iter().map(|(_, c)| c).collect();
        assert_eq!(commands[1..], [RobotCommand::Pause, RobotCommand::Resume]);
    }

    #[tokio::test]
    async fn should_fail_pause_without_active_session() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        assert!(matches!(
            fx.orchestrator
                .pause_cleaning(id, &CancellationToken::new())
                .await,
            Err(FleetError::Domain(DomainError::NoActiveSession))
        ));
    }

    #[tokio::test]
    async fn should_complete_session_from_device_report() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let run = started(&fx, id).await;

        fx.orchestrator
            .handle_report(report(id, ReportKind::SessionStarted))
            .await
            .unwrap();
        fx.orchestrator
            .handle_report(report(
                id,
                ReportKind::SessionCompleted {
                    area: 35.0,
                    energy: 0.2,
                },
            ))
            .await
            .unwrap();
        // Duplicate delivery is harmless.
        fx.orchestrator
            .handle_report(report(
                id,
                ReportKind::SessionCompleted {
                    area: 35.0,
                    energy: 0.2,
                },
            ))
            .await
            .unwrap();

        let session = fx.orchestrator.get_session(run.session.id()).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.area_cleaned(), Some(35.0));
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::ReturningToBase);
    }

    #[tokio::test]
    async fn should_fail_session_and_flag_robot_error_from_device_report() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let run = started(&fx, id).await;

        fx.orchestrator
            .handle_report(report(
                id,
                ReportKind::SessionError {
                    code: "CLIFF_SENSOR".to_string(),
                    message: None,
                },
            ))
            .await
            .unwrap();
        fx.orchestrator
            .handle_report(report(
                id,
                ReportKind::SessionFailed {
                    code: "WHEEL_STUCK".to_string(),
                    message: None,
                },
            ))
            .await
            .unwrap();

        let session = fx.orchestrator.get_session(run.session.id()).await.unwrap();
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(session.errors().len(), 2);
        assert_eq!(session.errors()[1].message, "Wheel is stuck, robot cannot move");
        assert_eq!(fx.robots.get(id).status(), ConnectionStatus::Error);

        let error_id = session.errors()[1].id;
        let resolved = fx
            .orchestrator
            .resolve_session_error(run.session.id(), error_id, Some("freed wheel".to_string()))
            .await
            .unwrap();
        assert!(resolved.errors()[1].resolved);
    }

    #[tokio::test]
    async fn should_apply_telemetry_only_when_values_change() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let telemetry = ReportKind::Telemetry {
            status: Some(ConnectionStatus::Charging),
            battery: Some(12),
            dustbin: Some(40),
        };

        fx.orchestrator
            .handle_report(report(id, telemetry.clone()))
            .await
            .unwrap();
        fx.orchestrator
            .handle_report(report(id, telemetry))
            .await
            .unwrap();

        let stored = fx.robots.get(id);
        assert_eq!(stored.status(), ConnectionStatus::Charging);
        assert_eq!(stored.battery_level(), 12);
        assert_eq!(stored.dustbin_level(), 40);
        assert_eq!(stored.status_history().len(), 1);
        let events = fx.publisher.events.lock().unwrap().clone();
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::BatteryLow { level: 12 }));
    }

    #[tokio::test]
    async fn should_ignore_session_report_without_active_session() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        let result = fx
            .orchestrator
            .handle_report(report(id, ReportKind::SessionStarted))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_list_sessions_by_status_and_history() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        started(&fx, id).await;
        fx.orchestrator
            .stop_cleaning(id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fx.orchestrator.session_history(id).await.unwrap().len(), 1);
        assert_eq!(
            fx.orchestrator
                .sessions_with_status(SessionStatus::Cancelled)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(fx.orchestrator.active_session(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_report_unreachable_robot_on_connection_test() {
        let robot = online_robot(80);
        let id = robot.id();
        let fx = fixture(robot);
        assert!(fx.orchestrator.test_connection(id).await.unwrap());
        fx.gateway.fail.store(true, Ordering::SeqCst);
        assert!(!fx.orchestrator.test_connection(id).await.unwrap());
    }
}
