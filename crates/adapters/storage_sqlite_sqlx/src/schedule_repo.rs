//! `SQLite` implementation of [`ScheduleRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use robofleet_app::ports::ScheduleRepository;
use robofleet_domain::error::{FleetError, NotFoundError};
use robofleet_domain::id::{RobotId, ScheduleId};
use robofleet_domain::schedule::CleaningSchedule;
use robofleet_domain::session::CleaningMode;
use robofleet_domain::time::Timestamp;

use crate::codec::{parse, parse_optional_timestamp, parse_timestamp, parse_zones, timestamp, zones};
use crate::error::StorageError;

struct Wrapper(CleaningSchedule);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<CleaningSchedule> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let robot_id: String = row.try_get("robot_id")?;
        let expression: String = row.try_get("cron_expression")?;
        let timezone: String = row.try_get("timezone")?;
        let mode: String = row.try_get("cleaning_mode")?;
        let zone_ids: String = row.try_get("zone_ids")?;
        let active: bool = row.try_get("is_active")?;
        let created_at: String = row.try_get("created_at")?;
        let last_triggered_at: Option<String> = row.try_get("last_triggered_at")?;
        let last_evaluated_at: Option<String> = row.try_get("last_evaluated_at")?;
        let quiet_start: Option<i32> = row.try_get("quiet_hours_start")?;
        let quiet_end: Option<i32> = row.try_get("quiet_hours_end")?;

        let mut builder = CleaningSchedule::builder(parse::<RobotId>(&robot_id)?, expression)
            .id(parse(&id)?)
            .timezone(timezone)
            .mode(parse::<CleaningMode>(&mode)?)
            .zone_ids(parse_zones(&zone_ids)?)
            .active(active)
            .created_at(parse_timestamp(&created_at)?)
            .last_triggered_at(parse_optional_timestamp(last_triggered_at)?)
            .last_evaluated_at(parse_optional_timestamp(last_evaluated_at)?);
        if let (Some(start), Some(end)) = (quiet_start, quiet_end) {
            builder = builder.quiet_hours(start, end);
        }

        builder
            .build()
            .map(Self)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))
    }
}

const INSERT: &str = r"
    INSERT INTO cleaning_schedules (id, robot_id, cron_expression, timezone, cleaning_mode, zone_ids,
        is_active, created_at, last_triggered_at, last_evaluated_at, quiet_hours_start, quiet_hours_end)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE cleaning_schedules
    SET cron_expression = ?, timezone = ?, cleaning_mode = ?, zone_ids = ?, is_active = ?,
        last_triggered_at = ?, last_evaluated_at = ?, quiet_hours_start = ?, quiet_hours_end = ?
    WHERE id = ?
";

const SELECT_BY_ID: &str = "SELECT * FROM cleaning_schedules WHERE id = ?";
const SELECT_BY_ROBOT: &str =
    "SELECT * FROM cleaning_schedules WHERE robot_id = ? ORDER BY created_at";
const SELECT_ACTIVE: &str =
    "SELECT * FROM cleaning_schedules WHERE is_active = 1 ORDER BY created_at";
const DELETE_BY_ID: &str = "DELETE FROM cleaning_schedules WHERE id = ?";

/// `SQLite`-backed cleaning schedule repository.
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ScheduleRepository for SqliteScheduleRepository {
    async fn add(&self, schedule: CleaningSchedule) -> Result<CleaningSchedule, FleetError> {
        let quiet = schedule.quiet_hours();
        sqlx::query(INSERT)
            .bind(schedule.id().to_string())
            .bind(schedule.robot_id().to_string())
            .bind(schedule.expression())
            .bind(schedule.timezone())
            .bind(schedule.mode().to_string())
            .bind(zones(schedule.zone_ids())?)
            .bind(schedule.is_active())
            .bind(timestamp(schedule.created_at()))
            .bind(schedule.last_triggered_at().map(timestamp))
            .bind(schedule.last_evaluated_at().map(timestamp))
            .bind(quiet.map(|q| i32::from(q.start())))
            .bind(quiet.map(|q| i32::from(q.end())))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(schedule)
    }

    async fn get_by_id(&self, id: ScheduleId) -> Result<Option<CleaningSchedule>, FleetError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(Wrapper::maybe(row))
    }

    async fn get_by_robot(&self, robot_id: RobotId) -> Result<Vec<CleaningSchedule>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_ROBOT)
            .bind(robot_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn get_active(&self) -> Result<Vec<CleaningSchedule>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ACTIVE)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    /// Recurrences cannot be evaluated in SQL, so active schedules are
    /// filtered here.
    async fn get_due_for_execution(
        &self,
        now: Timestamp,
    ) -> Result<Vec<CleaningSchedule>, FleetError> {
        let active = self.get_active().await?;
        Ok(active.into_iter().filter(|s| s.is_due(now)).collect())
    }

    async fn update(&self, schedule: CleaningSchedule) -> Result<CleaningSchedule, FleetError> {
        let quiet = schedule.quiet_hours();
        let result = sqlx::query(UPDATE)
            .bind(schedule.expression())
            .bind(schedule.timezone())
            .bind(schedule.mode().to_string())
            .bind(zones(schedule.zone_ids())?)
            .bind(schedule.is_active())
            .bind(schedule.last_triggered_at().map(timestamp))
            .bind(schedule.last_evaluated_at().map(timestamp))
            .bind(quiet.map(|q| i32::from(q.start())))
            .bind(quiet.map(|q| i32::from(q.end())))
            .bind(schedule.id().to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Schedule",
                id: schedule.id().to_string(),
            }
            .into());
        }

        Ok(schedule)
    }

    async fn delete(&self, id: ScheduleId) -> Result<(), FleetError> {
        sqlx::query(DELETE_BY_ID)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}
