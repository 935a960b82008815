pub mod modules;

pub use modules::agent::{Agent, Brain, TickOutcome, run_tick};
pub use modules::arena::{Arena, ArenaSetup, DeathReason, Event, TeamStats, TickResult, World};
pub use modules::budget::{FortificationPlanner, Layout, PlacementContext, PlacementReport};
pub use modules::config::SwarmConfig;
pub use modules::controller::{ControllerState, controller_tick};
pub use modules::decision::{
    Colony, DecisionContext, Perception, Role, Target, TargetKind, choose_target,
};
pub use modules::economy::{Forecast, RecoveryMode, ResourceFlowTracker, SpawnBlock, spawn_gate};
pub use modules::error::{ConfigError, WorldError};
pub use modules::formation::{BlockingLine, GuardianOrder, compute_blocking_line};
pub use modules::geometry::{COMPASS, Direction, MapClass, MapProfile, Position};
pub use modules::message::{Message, MessageKind, MessageQueue};
pub use modules::pathing::{PathSeeker, SeekOutcome};
pub use modules::phase::{AttackWindow, OpponentModel, OpponentProfile, Phase, PhaseMachine};
pub use modules::report::{RunReport, TeamReport};
pub use modules::table::{FocusTarget, SharedTable};
pub use modules::threat::{ThreatEstimator, ThreatLevel};
pub use modules::worker::{WorkerState, worker_tick};
pub use modules::world::{
    Action, AgentId, Entity, EntityKind, Mobility, SenseFilter, Team, WorldInterface,
};
