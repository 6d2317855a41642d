//! Schedule runner: turns due schedule occurrences into cleaning sessions.
//!
//! Each tick loads the schedules due at `now` and handles exactly one
//! occurrence per schedule. An occurrence inside quiet hours, or one the
//! robot cannot take (busy, not ready), is skipped so the schedule does not
//! fire again for it. Infrastructure failures leave the schedule due, to be
//! retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use robofleet_domain::error::FleetError;
use robofleet_domain::id::{ScheduleId, SessionId};
use robofleet_domain::time::{Timestamp, now};

use crate::ports::{
    CommandGateway, EventPublisher, RobotRepository, ScheduleRepository, SessionRepository,
};
use crate::services::fleet_orchestrator::{FleetOrchestrator, StartCleaning};
use crate::services::{cancellable, publish_all};

/// Reason recorded when an occurrence falls inside quiet hours.
pub const QUIET_HOURS_REASON: &str = "quiet hours";

/// What a single tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub triggered: Vec<(ScheduleId, SessionId)>,
    pub skipped: Vec<ScheduleId>,
    /// Left due after an infrastructure error.
    pub failed: Vec<ScheduleId>,
}

pub struct ScheduleRunner<S, R, SS, G, E> {
    schedules: S,
    orchestrator: Arc<FleetOrchestrator<R, SS, G, E>>,
}

impl<S, R, SS, G, E> ScheduleRunner<S, R, SS, G, E>
where
    S: ScheduleRepository + Send + Sync,
    R: RobotRepository + Send + Sync,
    SS: SessionRepository + Send + Sync,
    G: CommandGateway + Send + Sync,
    E: EventPublisher + Send + Sync,
{
    pub fn new(schedules: S, orchestrator: Arc<FleetOrchestrator<R, SS, G, E>>) -> Self {
        Self {
            schedules,
            orchestrator,
        }
    }

    /// Evaluate every schedule due at `now`.
    ///
    /// Stops early, keeping what was already done, when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Cancelled`] when cancelled before the due
    /// schedules were loaded, or the storage error that prevented loading them.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn tick(
        &self,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<TickReport, FleetError> {
        let due = cancellable(cancel, self.schedules.get_due_for_execution(now)).await?;
        let mut report = TickReport::default();

        for schedule in due {
            if cancel.is_cancelled() {
                break;
            }
            let Some(occurrence) = schedule.due_occurrence(now) else {
                continue;
            };
            let schedule_id = schedule.id();

            let outcome = if schedule.is_quiet_at(occurrence) {
                tracing::info!(%schedule_id, %occurrence, "occurrence inside quiet hours skipped");
                report.skipped.push(schedule_id);
                Evaluation::Skipped(QUIET_HOURS_REASON.to_owned())
            } else {
                let request = StartCleaning {
                    robot_id: schedule.robot_id(),
                    mode: schedule.mode(),
                    zone_ids: schedule.zone_ids().to_vec(),
                    schedule_id: Some(schedule_id),
                };
                match self.orchestrator.start_cleaning(request, cancel).await {
                    Ok(started) => {
                        let session_id = started.session.id();
                        report.triggered.push((schedule_id, session_id));
                        Evaluation::Triggered(session_id)
                    }
                    Err(FleetError::Cancelled) => break,
                    Err(err) if err.is_domain() => {
                        tracing::info!(%schedule_id, %occurrence, %err, "scheduled occurrence skipped");
                        report.skipped.push(schedule_id);
                        Evaluation::Skipped(err.to_string())
                    }
                    Err(err) => {
                        tracing::warn!(%schedule_id, %err, "scheduled cleaning failed, will retry");
                        report.failed.push(schedule_id);
                        continue;
                    }
                }
            };

            if let Err(err) = self.record(schedule_id, occurrence, outcome).await {
                tracing::error!(%schedule_id, %err, "unable to record schedule evaluation");
            }
        }

        if !report.triggered.is_empty() || !report.skipped.is_empty() {
            tracing::debug!(
                triggered = report.triggered.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "schedule tick done"
            );
        }
        Ok(report)
    }

    /// Tick every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(?interval, "schedule runner started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick(now(), &cancel).await {
                        Ok(_) | Err(FleetError::Cancelled) => {}
                        Err(err) => tracing::error!(%err, "schedule tick failed"),
                    }
                }
            }
        }

        tracing::info!("schedule runner stopped");
    }

    /// Apply the evaluation to a freshly loaded copy, so edits made while
    /// the start was in flight are kept.
    async fn record(
        &self,
        schedule_id: ScheduleId,
        occurrence: Timestamp,
        outcome: Evaluation,
    ) -> Result<(), FleetError> {
        let Some(mut schedule) = self.schedules.get_by_id(schedule_id).await? else {
            tracing::debug!(%schedule_id, "schedule deleted during evaluation");
            return Ok(());
        };
        match outcome {
            Evaluation::Triggered(session_id) => {
                schedule.mark_triggered(occurrence, Some(session_id));
            }
            Evaluation::Skipped(reason) => schedule.skip_occurrence(occurrence, reason),
        }
        let events = schedule.take_events();
        self.schedules.update(schedule).await?;
        publish_all(self.orchestrator.publisher(), events).await;
        Ok(())
    }
}

enum Evaluation {
    Triggered(SessionId),
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{Duration as Span, Timelike};

    use robofleet_domain::id::RobotId;
    use robofleet_domain::robot::{ConnectionStatus, Robot};
    use robofleet_domain::schedule::CleaningSchedule;
    use robofleet_domain::session::SessionStatus;

    use super::*;
    use crate::robot_locks::RobotLocks;
    use crate::testing::{
        InMemoryRobotRepo, InMemoryScheduleRepo, InMemorySessionRepo, RecordingGateway,
        SpyPublisher, online_robot, shared,
    };

    type Runner = ScheduleRunner<
        Arc<InMemoryScheduleRepo>,
        Arc<InMemoryRobotRepo>,
        Arc<InMemorySessionRepo>,
        Arc<RecordingGateway>,
        Arc<SpyPublisher>,
    >;

    struct Fixture {
        robots: Arc<InMemoryRobotRepo>,
        sessions: Arc<InMemorySessionRepo>,
        schedules: Arc<InMemoryScheduleRepo>,
        gateway: Arc<RecordingGateway>,
        publisher: Arc<SpyPublisher>,
        runner: Runner,
    }

    fn fixture(robot: Robot) -> Fixture {
        let robots = shared(InMemoryRobotRepo::with([robot]));
        let sessions = shared(InMemorySessionRepo::default());
        let schedules = shared(InMemoryScheduleRepo::default());
        let gateway = shared(RecordingGateway::default());
        let publisher = shared(SpyPublisher::default());
        let orchestrator = FleetOrchestrator::new(
            Arc::clone(&robots),
            Arc::clone(&sessions),
            Arc::clone(&gateway),
            Arc::clone(&publisher),
            shared(RobotLocks::new()),
        )
        .with_dispatch_timeout(Duration::from_millis(200));
        Fixture {
            robots,
            sessions,
            schedules: Arc::clone(&schedules),
            gateway,
            publisher,
            runner: ScheduleRunner::new(schedules, Arc::new(orchestrator)),
        }
    }

    /// Every-minute schedule created a few minutes ago, so it is due now.
    fn every_minute(robot_id: RobotId) -> CleaningSchedule {
        CleaningSchedule::builder(robot_id, "* * * * *")
            .created_at(now() - Span::minutes(3))
            .build()
            .unwrap()
    }

    fn insert(fx: &Fixture, schedule: CleaningSchedule) -> ScheduleId {
        let id = schedule.id();
        fx.schedules.store.lock().unwrap().insert(id, schedule);
        id
    }

    #[tokio::test]
    async fn should_start_session_for_due_schedule() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let schedule_id = insert(&fx, every_minute(robot_id));
        let at = now();

        let report = fx.runner.tick(at, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.triggered.len(), 1);
        let (triggered, session_id) = report.triggered[0];
        assert_eq!(triggered, schedule_id);
        let session = fx.sessions.all().pop().unwrap();
        assert_eq!(session.id(), session_id);
        assert_eq!(session.schedule_id(), Some(schedule_id));
        assert_eq!(session.status(), SessionStatus::Planned);
        assert_eq!(fx.robots.get(robot_id).status(), ConnectionStatus::Busy);

        let stored = fx.schedules.get(schedule_id);
        assert!(stored.last_triggered_at().is_some());
        assert!(!stored.is_due(at));
        assert!(fx.publisher.names().contains(&"schedule_triggered"));
    }

    #[tokio::test]
    async fn should_fire_once_per_occurrence() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        insert(&fx, every_minute(robot_id));
        let at = now();
        let cancel = CancellationToken::new();

        fx.runner.tick(at, &cancel).await.unwrap();
        let again = fx.runner.tick(at, &cancel).await.unwrap();

        assert_eq!(again, TickReport::default());
        assert_eq!(fx.sessions.all().len(), 1);
    }

    #[tokio::test]
    async fn should_skip_occurrence_inside_quiet_hours() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let at = now();
        let mut schedule = every_minute(robot_id);
        let occurrence = schedule.due_occurrence(at).unwrap();
        let hour = i32::try_from(occurrence.hour()).unwrap();
        schedule.set_quiet_hours(hour, (hour + 1) % 24).unwrap();
        let schedule_id = insert(&fx, schedule);

        let report = fx.runner.tick(at, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.skipped, vec![schedule_id]);
        assert!(fx.sessions.all().is_empty());
        assert!(fx.publisher.names().contains(&"schedule_skipped"));
        assert!(fx.schedules.get(schedule_id).last_triggered_at().is_none());
    }

    #[tokio::test]
    async fn should_skip_occurrence_when_robot_cannot_clean() {
        let robot = online_robot(5);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let schedule_id = insert(&fx, every_minute(robot_id));
        let at = now();

        let report = fx.runner.tick(at, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.skipped, vec![schedule_id]);
        assert!(!fx.schedules.get(schedule_id).is_due(at));
        assert!(fx.sessions.all().is_empty());
    }

    #[tokio::test]
    async fn should_keep_edits_made_while_start_is_in_flight() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let schedule_id = insert(&fx, every_minute(robot_id));
        fx.gateway.stall.store(true, Ordering::SeqCst);
        let at = now();

        let deactivate = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut store = fx.schedules.store.lock().unwrap();
            let schedule = store.get_mut(&schedule_id).unwrap();
            schedule.deactivate();
            schedule.take_events();
        };
        let cancel = CancellationToken::new();
        let (report, ()) = tokio::join!(fx.runner.tick(at, &cancel), deactivate);

        assert_eq!(report.unwrap().triggered.len(), 1);
        let stored = fx.schedules.get(schedule_id);
        assert!(!stored.is_active());
        assert!(stored.last_triggered_at().is_some());
        assert!(stored.due_occurrence(at).is_none());
    }

    #[tokio::test]
    async fn should_drop_evaluation_of_schedule_deleted_during_start() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let schedule_id = insert(&fx, every_minute(robot_id));
        fx.gateway.stall.store(true, Ordering::SeqCst);

        let delete = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fx.schedules.store.lock().unwrap().remove(&schedule_id);
        };
        let cancel = CancellationToken::new();
        let (report, ()) = tokio::join!(fx.runner.tick(now(), &cancel), delete);

        assert_eq!(report.unwrap().triggered.len(), 1);
        assert!(fx.schedules.store.lock().unwrap().is_empty());
        assert!(!fx.publisher.names().contains(&"schedule_triggered"));
    }

    #[tokio::test]
    async fn should_leave_schedule_due_after_storage_failure() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let schedule_id = insert(&fx, every_minute(robot_id));
        fx.robots.fail_updates.store(true, Ordering::SeqCst);
        let at = now();

        let report = fx.runner.tick(at, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.failed, vec![schedule_id]);
        assert!(fx.schedules.get(schedule_id).is_due(at));

        fx.robots.fail_updates.store(false, Ordering::SeqCst);
        let retry = fx.runner.tick(at, &CancellationToken::new()).await.unwrap();
        assert_eq!(retry.triggered.len(), 1);
    }

    #[tokio::test]
    async fn should_ignore_inactive_and_future_schedules() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        let mut inactive = every_minute(robot_id);
        inactive.deactivate();
        insert(&fx, inactive);
        insert(
            &fx,
            CleaningSchedule::builder(robot_id, "0 3 * * *").build().unwrap(),
        );

        let report = fx.runner.tick(now(), &CancellationToken::new()).await.unwrap();

        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn should_do_nothing_when_cancelled() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        insert(&fx, every_minute(robot_id));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fx.runner.tick(now(), &cancel).await;

        assert!(matches!(result, Err(FleetError::Cancelled)));
        assert!(fx.sessions.all().is_empty());
    }

    #[tokio::test]
    async fn should_stop_run_loop_on_cancel() {
        let robot = online_robot(80);
        let robot_id = robot.id();
        let fx = fixture(robot);
        insert(&fx, every_minute(robot_id));
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });
        fx.runner.run(Duration::from_millis(10), cancel).await;

        assert_eq!(fx.sessions.all().len(), 1);
    }
}
