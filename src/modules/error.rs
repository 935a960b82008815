use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::modules::geometry::{Direction, Position};
use crate::modules::world::AgentId;

/// Precondition failures raised by a world implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("agent {agent_id} cannot move {direction:?}")]
    CannotMove {
        agent_id: AgentId,
        direction: Direction,
    },
    #[error("agent {agent_id} cannot {action} at ({}, {})", .target.x, .target.y)]
    CannotAct {
        agent_id: AgentId,
        action: &'static str,
        target: Position,
    },
    #[error("position ({}, {}) is outside the map", .0.x, .0.y)]
    OutOfBounds(Position),
    #[error("agent {0} is not a controller")]
    NotController(AgentId),
    #[error("agent {0} not found")]
    UnknownAgent(AgentId),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
