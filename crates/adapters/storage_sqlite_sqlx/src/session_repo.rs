//! `SQLite` implementation of [`SessionRepository`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};

use robofleet_app::ports::SessionRepository;
use robofleet_domain::error::{DomainError, FleetError, NotFoundError};
use robofleet_domain::id::{RobotId, ScheduleId, SessionId};
use robofleet_domain::session::{CleaningError, CleaningMode, CleaningSession, SessionStatus};
use robofleet_domain::time::Timestamp;

use crate::codec::{parse, parse_optional_timestamp, parse_timestamp, parse_zones, timestamp, zones};
use crate::error::{StorageError, conflict_or_storage};

struct Wrapper(CleaningSession);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let robot_id: String = row.try_get("robot_id")?;
        let schedule_id: Option<String> = row.try_get("schedule_id")?;
        let mode: String = row.try_get("cleaning_mode")?;
        let zone_ids: String = row.try_get("zone_ids")?;
        let status: String = row.try_get("status")?;
        let started_at: String = row.try_get("started_at")?;
        let finished_at: Option<String> = row.try_get("finished_at")?;
        let area_cleaned: Option<f64> = row.try_get("area_cleaned")?;
        let energy_consumed: Option<f64> = row.try_get("energy_consumed")?;

        let schedule_id = schedule_id.as_deref().map(parse::<ScheduleId>).transpose()?;
        let session = CleaningSession::builder(parse::<RobotId>(&robot_id)?)
            .id(parse(&id)?)
            .mode(parse::<CleaningMode>(&mode)?)
            .zone_ids(parse_zones(&zone_ids)?)
            .schedule_id(schedule_id)
            .status(parse::<SessionStatus>(&status)?)
            .started_at(parse_timestamp(&started_at)?)
            .finished_at(parse_optional_timestamp(finished_at)?)
            .metrics(area_cleaned, energy_consumed)
            .build();

        Ok(Self(session))
    }
}

struct ErrorRow(CleaningError);

impl<'r> FromRow<'r, SqliteRow> for ErrorRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let code: String = row.try_get("code")?;
        let message: String = row.try_get("message")?;
        let occurred_at: String = row.try_get("occurred_at")?;
        let resolved: bool = row.try_get("resolved")?;
        let resolution: Option<String> = row.try_get("resolution")?;

        Ok(Self(CleaningError {
            id: parse(&id)?,
            code,
            message,
            occurred_at: parse_timestamp(&occurred_at)?,
            resolved,
            resolution,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO cleaning_sessions (id, robot_id, schedule_id, cleaning_mode, zone_ids, status,
        started_at, finished_at, area_cleaned, energy_consumed)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE cleaning_sessions
    SET status = ?, finished_at = ?, area_cleaned = ?, energy_consumed = ?
    WHERE id = ?
";

const SELECT_BY_ID: &str = "SELECT * FROM cleaning_sessions WHERE id = ?";
const SELECT_BY_ROBOT: &str =
    "SELECT * FROM cleaning_sessions WHERE robot_id = ? ORDER BY started_at DESC";
const SELECT_ACTIVE_FOR_ROBOT: &str = r"
    SELECT * FROM cleaning_sessions
    WHERE robot_id = ? AND status IN ('planned', 'in_progress', 'paused')
    ORDER BY started_at DESC
    LIMIT 1
";
const SELECT_BY_STATUS: &str =
    "SELECT * FROM cleaning_sessions WHERE status = ? ORDER BY started_at DESC";
const SELECT_BY_DATE_RANGE: &str =
    "SELECT * FROM cleaning_sessions WHERE started_at BETWEEN ? AND ? ORDER BY started_at DESC";

const SELECT_ERRORS: &str =
    "SELECT * FROM cleaning_errors WHERE session_id = ? ORDER BY position";
const UPSERT_ERROR: &str = r"
    INSERT INTO cleaning_errors (id, session_id, position, code, message, occurred_at, resolved, resolution)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET resolved = excluded.resolved, resolution = excluded.resolution
";

/// `SQLite`-backed cleaning session repository.
///
/// The one-active-session rule is enforced by a partial unique index, so
/// two racing inserts for the same robot cannot both succeed even across
/// processes.
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn with_errors(&self, Wrapper(session): Wrapper) -> Result<CleaningSession, FleetError> {
        let errors: Vec<ErrorRow> = sqlx::query_as(SELECT_ERRORS)
            .bind(session.id().to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        if errors.is_empty() {
            return Ok(session);
        }

        // Rebuild through the builder so the error log stays private to the aggregate.
        let builder = CleaningSession::builder(session.robot_id())
            .id(session.id())
            .mode(session.mode())
            .zone_ids(session.zone_ids().to_vec())
            .schedule_id(session.schedule_id())
            .status(session.status())
            .started_at(session.started_at())
            .finished_at(session.finished_at())
            .metrics(session.area_cleaned(), session.energy_consumed());
        Ok(errors
            .into_iter()
            .fold(builder, |builder, ErrorRow(error)| builder.error(error))
            .build())
    }

    async fn fetch_all(&self, rows: Vec<Wrapper>) -> Result<Vec<CleaningSession>, FleetError> {
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(self.with_errors(row).await?);
        }
        Ok(sessions)
    }
}

async fn save_errors(
    conn: &mut SqliteConnection,
    session: &CleaningSession,
) -> Result<(), StorageError> {
    for (position, error) in session.errors().iter().enumerate() {
        sqlx::query(UPSERT_ERROR)
            .bind(error.id.to_string())
            .bind(session.id().to_string())
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&error.code)
            .bind(&error.message)
            .bind(timestamp(error.occurred_at))
            .bind(error.resolved)
            .bind(&error.resolution)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn already_active(session: &CleaningSession) -> impl FnOnce() -> DomainError {
    let robot_id = session.robot_id().to_string();
    move || DomainError::SessionAlreadyActive { robot_id }
}

impl SessionRepository for SqliteSessionRepository {
    async fn add(&self, session: CleaningSession) -> Result<CleaningSession, FleetError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(session.id().to_string())
            .bind(session.robot_id().to_string())
            .bind(session.schedule_id().map(|id| id.to_string()))
            .bind(session.mode().to_string())
            .bind(zones(session.zone_ids())?)
            .bind(session.status().to_string())
            .bind(timestamp(session.started_at()))
            .bind(session.finished_at().map(timestamp))
            .bind(session.area_cleaned())
            .bind(session.energy_consumed())
            .execute(&mut *tx)
            .await
            .map_err(|err| conflict_or_storage(err, already_active(&session)))?;
        save_errors(&mut tx, &session).await?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok(session)
    }

    async fn get_by_id(&self, id: SessionId) -> Result<Option<CleaningSession>, FleetError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => self.with_errors(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_by_robot(&self, robot_id: RobotId) -> Result<Vec<CleaningSession>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_ROBOT)
            .bind(robot_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        self.fetch_all(rows).await
    }

    async fn get_active_for_robot(
        &self,
        robot_id: RobotId,
    ) -> Result<Option<CleaningSession>, FleetError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_ACTIVE_FOR_ROBOT)
            .bind(robot_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => self.with_errors(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_by_status(&self, status: SessionStatus) -> Result<Vec<CleaningSession>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_STATUS)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        self.fetch_all(rows).await
    }

    async fn get_by_date_range(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<CleaningSession>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_DATE_RANGE)
            .bind(timestamp(from))
            .bind(timestamp(to))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        self.fetch_all(rows).await
    }

    async fn update(&self, session: CleaningSession) -> Result<CleaningSession, FleetError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let result = sqlx::query(UPDATE)
            .bind(session.status().to_string())
            .bind(session.finished_at().map(timestamp))
            .bind(session.area_cleaned())
            .bind(session.energy_consumed())
            .bind(session.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(|err| conflict_or_storage(err, already_active(&session)))?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Session",
                id: session.id().to_string(),
            }
            .into());
        }
        save_errors(&mut tx, &session).await?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok(session)
    }
}
