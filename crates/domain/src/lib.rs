//! # robofleet-domain
//!
//! Pure domain model for coordinating a fleet of cleaning robots.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Robots** (connection state, battery and dustbin levels, status ledger)
//! - Define **Maintenance items** (wearable parts and their health)
//! - Define **Cleaning sessions** (one run, from planned to a terminal outcome)
//! - Define **Cleaning schedules** (cron recurrence, timezone, quiet hours)
//! - Define **Events** raised by aggregates and **Commands** sent to robots
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod command;
pub mod event;
pub mod maintenance;
pub mod recurrence;
pub mod robot;
pub mod schedule;
pub mod session;
