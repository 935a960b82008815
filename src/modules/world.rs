//! Abstract world interface consumed by the coordination core.
//!
//! Everything an agent may observe or do during its tick goes through these
//! traits; the in-memory arena is one implementation.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::modules::error::WorldError;
use crate::modules::geometry::{Direction, MapProfile, Position};
use crate::modules::message::Message;
use crate::modules::table::SharedTable;

pub type AgentId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub const fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Team::Red => 0,
            Team::Blue => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Controller,
    Worker,
    Resource,
    /// Roaming neutral creature that damages anything next to it.
    Hazard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entity {
    pub id: u64,
    pub kind: EntityKind,
    pub team: Option<Team>,
    pub position: Position,
    /// Health for units, amount for resources.
    pub health: i32,
}

impl Entity {
    pub fn is_controller(&self) -> bool {
        self.kind == EntityKind::Controller
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.kind, EntityKind::Controller | EntityKind::Worker)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenseFilter {
    Hostile,
    Friendly,
    Resources,
    Hazards,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Attack,
    /// Hand carried resource to the own controller.
    Deliver,
    Collect,
    /// Controller places a hazard tile that hurts hostile units.
    Fortify,
    Spawn,
    /// Pick up an adjacent, weaker hostile worker.
    Capture,
    Release,
}

impl Action {
    pub const fn label(&self) -> &'static str {
        match self {
            Action::Attack => "attack",
            Action::Deliver => "deliver",
            Action::Collect => "collect",
            Action::Fortify => "fortify",
            Action::Spawn => "spawn",
            Action::Capture => "capture",
            Action::Release => "release",
        }
    }
}

/// Movement half of the world interface.
pub trait Mobility {
    fn position(&self) -> Position;
    fn can_move(&self, dir: Direction) -> bool;
    /// Whether stepping onto `pos` would hurt this agent.
    fn is_hazardous(&self, pos: Position) -> bool;
    fn move_step(&mut self, dir: Direction) -> Result<(), WorldError>;

    /// Legal, and neither the destination nor its neighbours are hazardous.
    fn can_move_safely(&self, dir: Direction) -> bool {
        if !self.can_move(dir) {
            return false;
        }
        let dest = self.position().add(dir);
        if self.is_hazardous(dest) {
            return false;
        }
        !crate::modules::geometry::COMPASS
            .iter()
            .any(|d| self.is_hazardous(dest.add(*d)))
    }
}

/// Per-agent view of the world for the duration of one tick.
pub trait WorldInterface: Mobility {
    fn agent_id(&self) -> AgentId;
    fn team(&self) -> Team;
    fn tick(&self) -> u64;
    fn map(&self) -> MapProfile;
    fn health(&self) -> i32;
    /// Resource units carried by this agent.
    fn carried(&self) -> u32;
    fn holding(&self) -> Option<AgentId>;
    fn carry_capacity(&self) -> u32;
    /// The team's resource stock.
    fn stock(&self) -> u32;
    /// Stock consumed by one `Action::Spawn`.
    fn spawn_cost(&self) -> u32;
    fn sense_radius_sq(&self) -> i32;
    fn sense(&self, radius_sq: i32, filter: SenseFilter) -> Vec<Entity>;
    fn can_act(&self, action: Action, target: Position) -> bool;
    fn act(&mut self, action: Action, target: Position) -> Result<(), WorldError>;
    fn table(&self) -> &SharedTable;
    fn table_mut(&mut self) -> &mut SharedTable;
    /// False when the message was dropped.
    fn send_message(&mut self, message: Message) -> bool;
    fn drain_messages(&mut self, limit: usize) -> Vec<Message>;

    fn table_read(&self, slot: usize) -> u16 {
        self.table().read(slot)
    }

    fn table_write(&mut self, slot: usize, value: u16) {
        self.table_mut().write(slot, value);
    }

    fn sense_all(&self, filter: SenseFilter) -> Vec<Entity> {
        self.sense(self.sense_radius_sq(), filter)
    }
}
