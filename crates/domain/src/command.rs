//! Imperative commands sent to a robot through the command gateway.

use serde::{Deserialize, Serialize};

use crate::id::{SessionId, ZoneId};
use crate::session::CleaningMode;

/// An instruction addressed to one robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RobotCommand {
    StartCleaning {
        session_id: SessionId,
        mode: CleaningMode,
        zones: Vec<ZoneId>,
    },
    ReturnToBase,
    Pause,
    Resume,
    Stop,
    Ping,
}

impl RobotCommand {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartCleaning { .. } => "start_cleaning",
            Self::ReturnToBase => "return_to_base",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Ping => "ping",
        }
    }
}
