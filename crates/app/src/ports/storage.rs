//! Storage ports: persistence for robots, cleaning sessions and schedules.

use std::future::Future;
use std::sync::Arc;

use robofleet_domain::error::FleetError;
use robofleet_domain::id::{OwnerId, RobotId, ScheduleId, SessionId};
use robofleet_domain::robot::Robot;
use robofleet_domain::schedule::CleaningSchedule;
use robofleet_domain::session::{CleaningSession, SessionStatus};
use robofleet_domain::time::Timestamp;

/// Repository for [`Robot`] aggregates, including their status ledger and
/// maintenance items.
pub trait RobotRepository {
    /// Insert a newly registered robot.
    ///
    /// Fails with [`DomainError::DuplicateSerial`](robofleet_domain::error::DomainError::DuplicateSerial)
    /// when the serial number is already taken.
    fn add(&self, robot: Robot) -> impl Future<Output = Result<Robot, FleetError>> + Send;

    fn get_by_id(
        &self,
        id: RobotId,
    ) -> impl Future<Output = Result<Option<Robot>, FleetError>> + Send;

    fn get_by_serial(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<Option<Robot>, FleetError>> + Send;

    fn exists_by_serial(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send;

    fn get_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> impl Future<Output = Result<Vec<Robot>, FleetError>> + Send;

    /// Robots currently reporting [`ConnectionStatus::Online`](robofleet_domain::robot::ConnectionStatus::Online).
    fn get_online(&self) -> impl Future<Output = Result<Vec<Robot>, FleetError>> + Send;

    /// Persist the robot's current state and any ledger entries appended since it was loaded.
    fn update(&self, robot: Robot) -> impl Future<Output = Result<Robot, FleetError>> + Send;

    /// Remove the robot together with everything it owns.
    fn delete(&self, id: RobotId) -> impl Future<Output = Result<(), FleetError>> + Send;
}

/// Repository for [`CleaningSession`]s.
pub trait SessionRepository {
    /// Insert a new session.
    ///
    /// Must refuse a second non-terminal session for the same robot with
    /// [`DomainError::SessionAlreadyActive`](robofleet_domain::error::DomainError::SessionAlreadyActive).
    fn add(
        &self,
        session: CleaningSession,
    ) -> impl Future<Output = Result<CleaningSession, FleetError>> + Send;

    fn get_by_id(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<CleaningSession>, FleetError>> + Send;

    /// Every session of a robot, newest first.
    fn get_by_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send;

    /// The robot's planned, in-progress or paused session, if any.
    fn get_active_for_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Option<CleaningSession>, FleetError>> + Send;

    fn get_by_status(
        &self,
        status: SessionStatus,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send;

    /// Sessions started within `[from, to]`, newest first.
    fn get_by_date_range(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send;

    fn update(
        &self,
        session: CleaningSession,
    ) -> impl Future<Output = Result<CleaningSession, FleetError>> + Send;
}

/// Repository for [`CleaningSchedule`]s.
pub trait ScheduleRepository {
    fn add(
        &self,
        schedule: CleaningSchedule,
    ) -> impl Future<Output = Result<CleaningSchedule, FleetError>> + Send;

    fn get_by_id(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<CleaningSchedule>, FleetError>> + Send;

    fn get_by_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send;

    fn get_active(&self) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send;

    /// Active schedules with an unhandled occurrence at or before `now`.
    fn get_due_for_execution(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send;

    fn update(
        &self,
        schedule: CleaningSchedule,
    ) -> impl Future<Output = Result<CleaningSchedule, FleetError>> + Send;

    fn delete(&self, id: ScheduleId) -> impl Future<Output = Result<(), FleetError>> + Send;
}

impl<T: RobotRepository + Send + Sync> RobotRepository for Arc<T> {
    fn add(&self, robot: Robot) -> impl Future<Output = Result<Robot, FleetError>> + Send {
        (**self).add(robot)
    }

    fn get_by_id(
        &self,
        id: RobotId,
    ) -> impl Future<Output = Result<Option<Robot>, FleetError>> + Send {
        (**self).get_by_id(id)
    }

    fn get_by_serial(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<Option<Robot>, FleetError>> + Send {
        (**self).get_by_serial(serial_number)
    }

    fn exists_by_serial(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        (**self).exists_by_serial(serial_number)
    }

    fn get_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> impl Future<Output = Result<Vec<Robot>, FleetError>> + Send {
        (**self).get_by_owner(owner_id)
    }

    fn get_online(&self) -> impl Future<Output = Result<Vec<Robot>, FleetError>> + Send {
        (**self).get_online()
    }

    fn update(&self, robot: Robot) -> impl Future<Output = Result<Robot, FleetError>> + Send {
        (**self).update(robot)
    }

    fn delete(&self, id: RobotId) -> impl Future<Output = Result<(), FleetError>> + Send {
        (**self).delete(id)
    }
}

impl<T: SessionRepository + Send + Sync> SessionRepository for Arc<T> {
    fn add(
        &self,
        session: CleaningSession,
    ) -> impl Future<Output = Result<CleaningSession, FleetError>> + Send {
        (**self).add(session)
    }

    fn get_by_id(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<CleaningSession>, FleetError>> + Send {
        (**self).get_by_id(id)
    }

    fn get_by_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send {
        (**self).get_by_robot(robot_id)
    }

    fn get_active_for_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Option<CleaningSession>, FleetError>> + Send {
        (**self).get_active_for_robot(robot_id)
    }

    fn get_by_status(
        &self,
        status: SessionStatus,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send {
        (**self).get_by_status(status)
    }

    fn get_by_date_range(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send {
        (**self).get_by_date_range(from, to)
    }

    fn update(
        &self,
        session: CleaningSession,
    ) -> impl Future<Output = Result<CleaningSession, FleetError>> + Send {
        (**self).update(session)
    }
}

impl<T: ScheduleRepository + Send + Sync> ScheduleRepository for Arc<T> {
    fn add(
        &self,
        schedule: CleaningSchedule,
    ) -> impl Future<Output = Result<CleaningSchedule, FleetError>> + Send {
        (**self).add(schedule)
    }

    fn get_by_id(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<CleaningSchedule>, FleetError>> + Send {
        (**self).get_by_id(id)
    }

    fn get_by_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send {
        (**self).get_by_robot(robot_id)
    }

    fn get_active(&self) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send {
        (**self).get_active()
    }

    fn get_due_for_execution(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send {
        (**self).get_due_for_execution(now)
    }

    fn update(
        &self,
        schedule: CleaningSchedule,
    ) -> impl Future<Output = Result<CleaningSchedule, FleetError>> + Send {
        (**self).update(schedule)
    }

    fn delete(&self, id: ScheduleId) -> impl Future<Output = Result<(), FleetError>> + Send {
        (**self).delete(id)
    }
}
