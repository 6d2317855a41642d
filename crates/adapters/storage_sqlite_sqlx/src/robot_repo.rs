//! `SQLite` implementation of [`RobotRepository`].
//!
//! A robot spans three tables: the `robots` row, its append-only
//! `robot_status_history` ledger and its `maintenance_items`. Writes touch all
//! three in one transaction.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};

use robofleet_app::ports::RobotRepository;
use robofleet_domain::error::{DomainError, FleetError, NotFoundError};
use robofleet_domain::id::{OwnerId, RobotId};
use robofleet_domain::maintenance::MaintenanceItem;
use robofleet_domain::robot::{ConnectionStatus, Robot, RobotBuilder, StatusChange};

use crate::codec::{parse, parse_optional_timestamp, parse_timestamp, percentage, timestamp};
use crate::error::{StorageError, conflict_or_storage};

/// Wrapper for converting a `robots` row into a builder; the owned
/// collections are attached afterwards.
struct Wrapper(RobotId, RobotBuilder);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let serial_number: String = row.try_get("serial_number")?;
        let model: String = row.try_get("model")?;
        let friendly_name: String = row.try_get("friendly_name")?;
        let owner_id: String = row.try_get("owner_id")?;
        let status: String = row.try_get("status")?;
        let battery_level: i64 = row.try_get("battery_level")?;
        let dustbin_level: i64 = row.try_get("dustbin_level")?;
        let firmware_version: String = row.try_get("firmware_version")?;
        let registered_at: String = row.try_get("registered_at")?;
        let last_seen_at: Option<String> = row.try_get("last_seen_at")?;

        let id: RobotId = parse(&id)?;
        let builder = Robot::builder()
            .id(id)
            .serial_number(serial_number)
            .model(model)
            .friendly_name(friendly_name)
            .owner_id(parse::<OwnerId>(&owner_id)?)
            .status(parse::<ConnectionStatus>(&status)?)
            .battery_level(percentage(battery_level)?)
            .dustbin_level(percentage(dustbin_level)?)
            .firmware_version(firmware_version)
            .registered_at(parse_timestamp(&registered_at)?)
            .last_seen_at(parse_optional_timestamp(last_seen_at)?);

        Ok(Self(id, builder))
    }
}

struct HistoryRow(StatusChange);

impl<'r> FromRow<'r, SqliteRow> for HistoryRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let previous: String = row.try_get("previous_status")?;
        let current: String = row.try_get("new_status")?;
        let reason: Option<String> = row.try_get("reason")?;
        let changed_at: String = row.try_get("changed_at")?;

        Ok(Self(StatusChange {
            id: parse(&id)?,
            previous: parse(&previous)?,
            current: parse(&current)?,
            reason,
            changed_at: parse_timestamp(&changed_at)?,
        }))
    }
}

struct ItemRow(MaintenanceItem);

impl<'r> FromRow<'r, SqliteRow> for ItemRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let item_type: String = row.try_get("item_type")?;
        let health: i64 = row.try_get("health")?;
        let last_replaced_at: String = row.try_get("last_replaced_at")?;

        MaintenanceItem::restore(
            parse(&id)?,
            parse(&item_type)?,
            percentage(health)?,
            parse_timestamp(&last_replaced_at)?,
        )
        .map(Self)
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
    }
}

const INSERT: &str = r"
    INSERT INTO robots (id, serial_number, model, friendly_name, owner_id, status,
        battery_level, dustbin_level, firmware_version, registered_at, last_seen_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const UPDATE: &str = r"
    UPDATE robots
    SET friendly_name = ?, owner_id = ?, status = ?, battery_level = ?, dustbin_level = ?,
        firmware_version = ?, last_seen_at = ?
    WHERE id = ?
";

const SELECT_BY_ID: &str = "SELECT * FROM robots WHERE id = ?";
const SELECT_BY_SERIAL: &str = "SELECT * FROM robots WHERE serial_number = ?";
const EXISTS_BY_SERIAL: &str = "SELECT EXISTS (SELECT 1 FROM robots WHERE serial_number = ?)";
const SELECT_BY_OWNER: &str = "SELECT * FROM robots WHERE owner_id = ? ORDER BY registered_at";
const SELECT_BY_STATUS: &str = "SELECT * FROM robots WHERE status = ? ORDER BY registered_at";
const DELETE_BY_ID: &str = "DELETE FROM robots WHERE id = ?";

const SELECT_HISTORY: &str =
    "SELECT * FROM robot_status_history WHERE robot_id = ? ORDER BY position";
const COUNT_HISTORY: &str = "SELECT COUNT(*) FROM robot_status_history WHERE robot_id = ?";
const INSERT_HISTORY: &str = r"
    INSERT INTO robot_status_history (id, robot_id, position, previous_status, new_status, reason, changed_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
";

const SELECT_ITEMS: &str = "SELECT * FROM maintenance_items WHERE robot_id = ? ORDER BY rowid";
const DELETE_ITEMS: &str = "DELETE FROM maintenance_items WHERE robot_id = ?";
const INSERT_ITEM: &str = r"
    INSERT INTO maintenance_items (id, robot_id, item_type, health, last_replaced_at, estimated_days_left)
    VALUES (?, ?, ?, ?, ?, ?)
";

/// `SQLite`-backed robot repository.
pub struct SqliteRobotRepository {
    pool: SqlitePool,
}

impl SqliteRobotRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, Wrapper(id, builder): Wrapper) -> Result<Robot, FleetError> {
        let history: Vec<HistoryRow> = sqlx::query_as(SELECT_HISTORY)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        let items: Vec<ItemRow> = sqlx::query_as(SELECT_ITEMS)
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let builder = history
            .into_iter()
            .fold(builder, |builder, HistoryRow(change)| builder.status_change(change));
        let builder = items
            .into_iter()
            .fold(builder, |builder, ItemRow(item)| builder.maintenance_item(item));
        Ok(builder.build().map_err(StorageError::from)?)
    }

    async fn hydrate_all(&self, rows: Vec<Wrapper>) -> Result<Vec<Robot>, FleetError> {
        let mut robots = Vec::with_capacity(rows.len());
        for row in rows {
            robots.push(self.hydrate(row).await?);
        }
        Ok(robots)
    }
}

async fn append_history(
    conn: &mut SqliteConnection,
    robot_id: RobotId,
    entries: &[StatusChange],
    offset: usize,
) -> Result<(), StorageError> {
    for (position, change) in entries.iter().enumerate().skip(offset) {
        sqlx::query(INSERT_HISTORY)
            .bind(change.id.to_string())
            .bind(robot_id.to_string())
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(change.previous.to_string())
            .bind(change.current.to_string())
            .bind(&change.reason)
            .bind(timestamp(change.changed_at))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn replace_items(
    conn: &mut SqliteConnection,
    robot_id: RobotId,
    items: &[MaintenanceItem],
) -> Result<(), StorageError> {
    sqlx::query(DELETE_ITEMS)
        .bind(robot_id.to_string())
        .execute(&mut *conn)
        .await?;
    for item in items {
        sqlx::query(INSERT_ITEM)
            .bind(item.id().to_string())
            .bind(robot_id.to_string())
            .bind(item.item_type().to_string())
            .bind(i64::from(item.health()))
            .bind(timestamp(item.last_replaced_at()))
            .bind(i64::from(item.estimated_days_left()))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl RobotRepository for SqliteRobotRepository {
    async fn add(&self, robot: Robot) -> Result<Robot, FleetError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        sqlx::query(INSERT)
            .bind(robot.id().to_string())
            .bind(robot.serial_number())
            .bind(robot.model())
            .bind(robot.friendly_name())
            .bind(robot.owner_id().to_string())
            .bind(robot.status().to_string())
            .bind(i64::from(robot.battery_level()))
            .bind(i64::from(robot.dustbin_level()))
            .bind(robot.firmware_version())
            .bind(timestamp(robot.registered_at()))
            .bind(robot.last_seen_at().map(timestamp))
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                conflict_or_storage(err, || {
                    DomainError::DuplicateSerial(robot.serial_number().to_string())
                })
            })?;
        append_history(&mut tx, robot.id(), robot.status_history(), 0).await?;
        replace_items(&mut tx, robot.id(), robot.maintenance_items()).await?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok(robot)
    }

    async fn get_by_id(&self, id: RobotId) -> Result<Option<Robot>, FleetError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_by_serial(&self, serial_number: &str) -> Result<Option<Robot>, FleetError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_SERIAL)
            .bind(serial_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn exists_by_serial(&self, serial_number: &str) -> Result<bool, FleetError> {
        let (exists,): (bool,) = sqlx::query_as(EXISTS_BY_SERIAL)
            .bind(serial_number)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(exists)
    }

    async fn get_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Robot>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_OWNER)
            .bind(owner_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        self.hydrate_all(rows).await
    }

    async fn get_online(&self) -> Result<Vec<Robot>, FleetError> {
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_BY_STATUS)
            .bind(ConnectionStatus::Online.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        self.hydrate_all(rows).await
    }

    async fn update(&self, robot: Robot) -> Result<Robot, FleetError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let result = sqlx::query(UPDATE)
            .bind(robot.friendly_name())
            .bind(robot.owner_id().to_string())
            .bind(robot.status().to_string())
            .bind(i64::from(robot.battery_level()))
            .bind(i64::from(robot.dustbin_level()))
            .bind(robot.firmware_version())
            .bind(robot.last_seen_at().map(timestamp))
            .bind(robot.id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        if result.rows_affected() == 0 {
            return Err(NotFoundError {
                entity: "Robot",
                id: robot.id().to_string(),
            }
            .into());
        }

        let (stored,): (i64,) = sqlx::query_as(COUNT_HISTORY)
            .bind(robot.id().to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(StorageError::from)?;
        let stored = usize::try_from(stored).unwrap_or_default();
        append_history(&mut tx, robot.id(), robot.status_history(), stored).await?;
        replace_items(&mut tx, robot.id(), robot.maintenance_items()).await?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok(robot)
    }

    async fn delete(&self, id: RobotId) -> Result<(), FleetError> {
        sqlx::query(DELETE_BY_ID)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}
