//! Schedule service: use-cases for managing cleaning schedules.

use tokio_util::sync::CancellationToken;

use robofleet_domain::error::{FleetError, NotFoundError};
use robofleet_domain::id::{RobotId, ScheduleId, ZoneId};
use robofleet_domain::schedule::CleaningSchedule;
use robofleet_domain::session::CleaningMode;

use crate::ports::{EventPublisher, RobotRepository, ScheduleRepository};
use crate::services::{cancellable, publish_all, robot_not_found};

/// Input of [`ScheduleService::create_schedule`].
#[derive(Debug, Clone)]
pub struct CreateSchedule {
    pub robot_id: RobotId,
    pub expression: String,
    pub mode: CleaningMode,
    pub zone_ids: Vec<ZoneId>,
    pub timezone: Option<String>,
    pub quiet_hours: Option<(i32, i32)>,
}

/// Partial update of a schedule; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub expression: Option<String>,
    pub mode: Option<CleaningMode>,
    pub zone_ids: Option<Vec<ZoneId>>,
    pub timezone: Option<String>,
    /// `Some(None)` clears the quiet hours.
    pub quiet_hours: Option<Option<(i32, i32)>>,
}

/// Application service for schedule CRUD operations.
pub struct ScheduleService<S, R, E> {
    schedules: S,
    robots: R,
    publisher: E,
}

impl<S, R, E> ScheduleService<S, R, E>
where
    S: ScheduleRepository + Send + Sync,
    R: RobotRepository + Send + Sync,
    E: EventPublisher + Send + Sync,
{
    pub fn new(schedules: S, robots: R, publisher: E) -> Self {
        Self {
            schedules,
            robots,
            publisher,
        }
    }

    /// Create an active schedule for an existing robot.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] for an unknown robot, a domain error
    /// for an invalid expression, timezone or quiet hours, [`FleetError::Cancelled`],
    /// or a storage error.
    #[tracing::instrument(skip(self, request, cancel), fields(robot_id = %request.robot_id, expression = %request.expression))]
    pub async fn create_schedule(
        &self,
        request: CreateSchedule,
        cancel: &CancellationToken,
    ) -> Result<CleaningSchedule, FleetError> {
        if cancellable(cancel, self.robots.get_by_id(request.robot_id)).await?.is_none() {
            return Err(robot_not_found(request.robot_id));
        }
        let mut schedule = CleaningSchedule::create(
            request.robot_id,
            request.expression,
            request.mode,
            request.zone_ids,
            request.timezone.as_deref(),
        )?;
        if let Some((start, end)) = request.quiet_hours {
            schedule.set_quiet_hours(start, end)?;
        }
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        let events = schedule.take_events();
        let schedule = self.schedules.add(schedule).await?;
        publish_all(&self.publisher, events).await;
        Ok(schedule)
    }

    /// Apply a partial update. Either every change is valid and persisted, or
    /// nothing is.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`], a domain error for an invalid field,
    /// [`FleetError::Cancelled`], or a storage error.
    #[tracing::instrument(skip(self, update, cancel))]
    pub async fn update_schedule(
        &self,
        id: ScheduleId,
        update: ScheduleUpdate,
        cancel: &CancellationToken,
    ) -> Result<CleaningSchedule, FleetError> {
        let mut schedule = self.get_schedule(id, cancel).await?;
        if let Some(timezone) = update.timezone {
            schedule.update_timezone(timezone)?;
        }
        if let Some(expression) = update.expression {
            schedule.update_cron(expression)?;
        }
        if let Some(mode) = update.mode {
            schedule.update_mode(mode);
        }
        if let Some(zone_ids) = update.zone_ids {
            schedule.update_zones(zone_ids);
        }
        match update.quiet_hours {
            Some(Some((start, end))) => schedule.set_quiet_hours(start, end)?,
            Some(None) => schedule.clear_quiet_hours(),
            None => {}
        }
        self.save(schedule, cancel).await
    }

    /// Flip a schedule between active and inactive.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`], [`FleetError::Cancelled`] or a
    /// storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn toggle_schedule(
        &self,
        id: ScheduleId,
        cancel: &CancellationToken,
    ) -> Result<CleaningSchedule, FleetError> {
        let mut schedule = self.get_schedule(id, cancel).await?;
        schedule.toggle();
        self.save(schedule, cancel).await
    }

    /// Delete a schedule. Sessions it spawned keep existing.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`], [`FleetError::Cancelled`] or a
    /// storage error.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_schedule(
        &self,
        id: ScheduleId,
        cancel: &CancellationToken,
    ) -> Result<(), FleetError> {
        self.get_schedule(id, cancel).await?;
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        self.schedules.delete(id).await
    }

    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] when no schedule with `id` exists,
    /// or a storage error from the repository.
    pub async fn get_schedule(
        &self,
        id: ScheduleId,
        cancel: &CancellationToken,
    ) -> Result<CleaningSchedule, FleetError> {
        cancellable(cancel, self.schedules.get_by_id(id)).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Schedule",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_robot_schedules(
        &self,
        robot_id: RobotId,
        cancel: &CancellationToken,
    ) -> Result<Vec<CleaningSchedule>, FleetError> {
        cancellable(cancel, self.schedules.get_by_robot(robot_id)).await
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_active_schedules(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CleaningSchedule>, FleetError> {
        cancellable(cancel, self.schedules.get_active()).await
    }

    async fn save(
        &self,
        mut schedule: CleaningSchedule,
        cancel: &CancellationToken,
    ) -> Result<CleaningSchedule, FleetError> {
        if cancel.is_cancelled() {
            return Err(FleetError::Cancelled);
        }
        let events = schedule.take_events();
        let schedule = self.schedules.update(schedule).await?;
        publish_all(&self.publisher, events).await;
        Ok(schedule)
    }
}
