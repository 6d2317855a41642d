//! # robofleet-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `robofleet-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain aggregates and database rows
//! - Enforce "one active session per robot" with a partial unique index
//!
//! ## Dependency rule
//! Depends on `robofleet-app` (for port traits) and `robofleet-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod codec;
pub mod error;
pub mod pool;
pub mod robot_repo;
pub mod schedule_repo;
pub mod session_repo;

pub use pool::{Config, Database};
pub use robot_repo::SqliteRobotRepository;
pub use schedule_repo::SqliteScheduleRepository;
pub use session_repo::SqliteSessionRepository;
