//! Agent state and the per-tick entry point.

use tracing::warn;

use crate::modules::config::SwarmConfig;
use crate::modules::controller::{ControllerState, controller_tick};
use crate::modules::decision::Role;
use crate::modules::world::{AgentId, WorldInterface};
use crate::modules::worker::{WorkerState, worker_tick};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    /// A world call failed; the rest of the tick was skipped.
    Faulted,
}

#[derive(Clone, Debug)]
pub enum Brain {
    Controller(Box<ControllerState>),
    Worker(Box<WorkerState>),
}

/// Everything an agent remembers between ticks.
#[derive(Clone, Debug)]
pub struct Agent {
    id: AgentId,
    brain: Brain,
    faults: u64,
}

impl Agent {
    pub fn controller(id: AgentId) -> Self {
        Self {
            id,
            brain: Brain::Controller(Box::new(ControllerState::new())),
            faults: 0,
        }
    }

    pub fn worker(id: AgentId) -> Self {
        Self {
            id,
            brain: Brain::Worker(Box::new(WorkerState::new(Role::for_id(id)))),
            faults: 0,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn role(&self) -> Role {
        match &self.brain {
            Brain::Controller(_) => Role::Controller,
            Brain::Worker(state) => state.role(),
        }
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn as_controller(&self) -> Option<&ControllerState> {
        match &self.brain {
            Brain::Controller(state) => Some(state),
            Brain::Worker(_) => None,
        }
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }
}

/// Runs one tick for `agent`. World errors never escape: they are logged and
/// the agent simply loses the remainder of its turn.
pub fn run_tick<W: WorldInterface + ?Sized>(
    agent: &mut Agent,
    world: &mut W,
    config: &SwarmConfig,
) -> TickOutcome {
    let result = match &mut agent.brain {
        Brain::Controller(state) => controller_tick(state, world, config),
        Brain::Worker(state) => worker_tick(state, world, config),
    };
    match result {
        Ok(()) => TickOutcome::Completed,
        Err(err) => {
            agent.faults += 1;
            warn!(
                tick = world.tick(),
                agent = agent.id,
                role = agent.role().label(),
                error = %err,
                "tick aborted"
            );
            TickOutcome::Faulted
        }
    }
}
