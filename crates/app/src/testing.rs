//! In-memory port implementations shared by the service tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use robofleet_domain::command::RobotCommand;
use robofleet_domain::error::{DomainError, FleetError};
use robofleet_domain::event::Event;
use robofleet_domain::id::{OwnerId, RobotId, ScheduleId, SessionId};
use robofleet_domain::robot::{ConnectionStatus, Robot};
use robofleet_domain::schedule::CleaningSchedule;
use robofleet_domain::session::{CleaningSession, SessionStatus};
use robofleet_domain::time::Timestamp;

use crate::ports::{
    CommandGateway, EventPublisher, FirmwareInfo, ProvisioningService, RobotRepository,
    ScheduleRepository, SessionRepository, VendorService, WifiCredentials,
};

#[derive(Debug)]
pub struct Unavailable;

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unavailable")
    }
}

impl std::error::Error for Unavailable {}

#[derive(Default)]
pub struct InMemoryRobotRepo {
    pub store: Mutex<HashMap<RobotId, Robot>>,
    pub fail_updates: AtomicBool,
}

impl InMemoryRobotRepo {
    pub fn with(robots: impl IntoIterator<Item = Robot>) -> Self {
        let repo = Self::default();
        {
            let mut store = repo.store.lock().unwrap();
            for robot in robots {
                store.insert(robot.id(), robot);
            }
        }
        repo
    }

    pub fn get(&self, id: RobotId) -> Robot {
        self.store.lock().unwrap().get(&id).cloned().unwrap()
    }
}

impl RobotRepository for InMemoryRobotRepo {
    fn add(&self, robot: Robot) -> impl Future<Output = Result<Robot, FleetError>> + Send {
        let mut store = self.store.lock().unwrap();
        let result = if store
            .values()
            .any(|r| r.serial_number() == robot.serial_number())
        {
            Err(DomainError::DuplicateSerial(robot.serial_number().to_string()).into())
        } else {
            store.insert(robot.id(), robot.clone());
            Ok(robot)
        };
        async { result }
    }

    fn get_by_id(
        &self,
        id: RobotId,
    ) -> impl Future<Output = Result<Option<Robot>, FleetError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn get_by_serial(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<Option<Robot>, FleetError>> + Send {
        let result = self
            .store
            .lock()
            .unwrap()
            .values()
            .find(|r| r.serial_number() == serial_number)
            .cloned();
        async { Ok(result) }
    }

    fn exists_by_serial(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        let result = self
            .store
            .lock()
            .unwrap()
            .values()
            .any(|r| r.serial_number() == serial_number);
        async move { Ok(result) }
    }

    fn get_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> impl Future<Output = Result<Vec<Robot>, FleetError>> + Send {
        let result: Vec<Robot> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.owner_id() == owner_id)
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn get_online(&self) -> impl Future<Output = Result<Vec<Robot>, FleetError>> + Send {
        let result: Vec<Robot> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status() == ConnectionStatus::Online)
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn update(&self, robot: Robot) -> impl Future<Output = Result<Robot, FleetError>> + Send {
        let result = if self.fail_updates.load(Ordering::SeqCst) {
            Err(FleetError::storage(Unavailable))
        } else {
            let mut store = self.store.lock().unwrap();
            if store.contains_key(&robot.id()) {
                store.insert(robot.id(), robot.clone());
                Ok(robot)
            } else {
                Err(FleetError::storage(Unavailable))
            }
        };
        async { result }
    }

    fn delete(&self, id: RobotId) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.store.lock().unwrap().remove(&id);
        async { Ok(()) }
    }
}

#[derive(Default)]
pub struct InMemorySessionRepo {
    pub store: Mutex<HashMap<SessionId, CleaningSession>>,
}

impl InMemorySessionRepo {
    pub fn all(&self) -> Vec<CleaningSession> {
        self.store.lock().unwrap().values().cloned().collect()
    }

    pub fn active_count(&self, robot_id: RobotId) -> usize {
        self.all()
            .iter()
            .filter(|s| s.robot_id() == robot_id && s.is_active())
            .count()
    }

    fn filtered(&self, keep: impl Fn(&CleaningSession) -> bool) -> Vec<CleaningSession> {
        let mut sessions: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|s| keep(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| std::cmp::Reverse(s.started_at()));
        sessions
    }
}

impl SessionRepository for InMemorySessionRepo {
    fn add(
        &self,
        session: CleaningSession,
    ) -> impl Future<Output = Result<CleaningSession, FleetError>> + Send {
        let mut store = self.store.lock().unwrap();
        let clash = store
            .values()
            .any(|s| s.robot_id() == session.robot_id() && s.is_active());
        let result = if clash {
            Err(DomainError::SessionAlreadyActive {
                robot_id: session.robot_id().to_string(),
            }
            .into())
        } else {
            store.insert(session.id(), session.clone());
            Ok(session)
        };
        async { result }
    }

    fn get_by_id(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<CleaningSession>, FleetError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn get_by_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send {
        let result = self.filtered(|s| s.robot_id() == robot_id);
        async { Ok(result) }
    }

    fn get_active_for_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Option<CleaningSession>, FleetError>> + Send {
        let result = self
            .filtered(|s| s.robot_id() == robot_id && s.is_active())
            .into_iter()
            .next();
        async { Ok(result) }
    }

    fn get_by_status(
        &self,
        status: SessionStatus,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send {
        let result = self.filtered(|s| s.status() == status);
        async { Ok(result) }
    }

    fn get_by_date_range(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> impl Future<Output = Result<Vec<CleaningSession>, FleetError>> + Send {
        let result = self.filtered(|s| s.started_at() >= from && s.started_at() <= to);
        async { Ok(result) }
    }

    fn update(
        &self,
        session: CleaningSession,
    ) -> impl Future<Output = Result<CleaningSession, FleetError>> + Send {
        self.store
            .lock()
            .unwrap()
            .insert(session.id(), session.clone());
        async { Ok(session) }
    }
}

#[derive(Default)]
pub struct InMemoryScheduleRepo {
    pub store: Mutex<HashMap<ScheduleId, CleaningSchedule>>,
}

impl InMemoryScheduleRepo {
    pub fn get(&self, id: ScheduleId) -> CleaningSchedule {
        self.store.lock().unwrap().get(&id).cloned().unwrap()
    }
}

impl ScheduleRepository for InMemoryScheduleRepo {
    fn add(
        &self,
        schedule: CleaningSchedule,
    ) -> impl Future<Output = Result<CleaningSchedule, FleetError>> + Send {
        self.store
            .lock()
            .unwrap()
            .insert(schedule.id(), schedule.clone());
        async { Ok(schedule) }
    }

    fn get_by_id(
        &self,
        id: ScheduleId,
    ) -> impl Future<Output = Result<Option<CleaningSchedule>, FleetError>> + Send {
        let result = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(result) }
    }

    fn get_by_robot(
        &self,
        robot_id: RobotId,
    ) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send {
        let result: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.robot_id() == robot_id)
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn get_active(&self) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send {
        let result: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn get_due_for_execution(
        &self,
        now: Timestamp,
    ) -> impl Future<Output = Result<Vec<CleaningSchedule>, FleetError>> + Send {
        let result: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        async { Ok(result) }
    }

    fn update(
        &self,
        schedule: CleaningSchedule,
    ) -> impl Future<Output = Result<CleaningSchedule, FleetError>> + Send {
        self.store
            .lock()
            .unwrap()
            .insert(schedule.id(), schedule.clone());
        async { Ok(schedule) }
    }

    fn delete(&self, id: ScheduleId) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.store.lock().unwrap().remove(&id);
        async { Ok(()) }
    }
}

/// Records every dispatched command; can be told to fail or stall.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(RobotId, RobotCommand)>>,
    pub fail: AtomicBool,
    pub stall: AtomicBool,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<(RobotId, RobotCommand)> {
        self.sent.lock().unwrap().clone()
    }
}

impl CommandGateway for RecordingGateway {
    fn dispatch(
        &self,
        robot_id: RobotId,
        command: RobotCommand,
    ) -> impl Future<Output = Result<(), FleetError>> + Send {
        let fail = self.fail.load(Ordering::SeqCst);
        let stall = self.stall.load(Ordering::SeqCst);
        if !fail {
            self.sent.lock().unwrap().push((robot_id, command));
        }
        async move {
            if stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if fail {
                Err(FleetError::transport(Unavailable))
            } else {
                Ok(())
            }
        }
    }

    fn test_connection(
        &self,
        _robot_id: RobotId,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        let reachable = !self.fail.load(Ordering::SeqCst);
        async move { Ok(reachable) }
    }
}

#[derive(Default)]
pub struct SpyPublisher {
    pub events: Mutex<Vec<Event>>,
}

impl SpyPublisher {
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.kind.name())
            .collect()
    }
}

impl EventPublisher for SpyPublisher {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), FleetError>> + Send {
        self.events.lock().unwrap().push(event);
        async { Ok(()) }
    }
}

/// Accepts serials starting with `RC-`; knows one newer firmware.
#[derive(Default)]
pub struct StubVendor {
    pub unreachable: AtomicBool,
}

impl VendorService for StubVendor {
    fn validate_serial_number(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        let result = if self.unreachable.load(Ordering::SeqCst) {
            Err(FleetError::transport(Unavailable))
        } else {
            Ok(serial_number.starts_with("RC-"))
        };
        async { result }
    }

    fn get_latest_firmware(
        &self,
        _model: &str,
        current_version: &str,
    ) -> impl Future<Output = Result<Option<FirmwareInfo>, FleetError>> + Send {
        let result = (current_version != "2.0.0").then(|| FirmwareInfo {
            version: "2.0.0".to_string(),
            release_notes: None,
            download_url: None,
        });
        async { Ok(result) }
    }
}

/// Records provisioned robots; can be told to fail.
#[derive(Default)]
pub struct RecordingProvisioner {
    pub provisioned: Mutex<Vec<RobotId>>,
    pub fail: AtomicBool,
}

impl ProvisioningService for RecordingProvisioner {
    fn provision_robot(
        &self,
        robot_id: RobotId,
        _credentials: WifiCredentials,
    ) -> impl Future<Output = Result<bool, FleetError>> + Send {
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(FleetError::transport(Unavailable))
        } else {
            self.provisioned.lock().unwrap().push(robot_id);
            Ok(true)
        };
        async { result }
    }
}

pub fn online_robot(battery: i32) -> Robot {
    Robot::builder()
        .serial_number(format!("RC-{}", RobotId::new()))
        .model("S7")
        .friendly_name("Hallway")
        .status(ConnectionStatus::Online)
        .battery_level(battery)
        .build()
        .unwrap()
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
