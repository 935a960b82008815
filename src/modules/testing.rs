//! Scripted single-agent world for unit tests.

use std::collections::HashSet;

use crate::modules::error::WorldError;
use crate::modules::geometry::{Direction, MapProfile, Position};
use crate::modules::message::Message;
use crate::modules::table::SharedTable;
use crate::modules::world::{
    Action, AgentId, Entity, EntityKind, Mobility, SenseFilter, Team, WorldInterface,
};

pub struct MockWorld {
    pub id: AgentId,
    pub team: Team,
    pub kind: EntityKind,
    pub tick: u64,
    pub map: MapProfile,
    pub position: Position,
    pub health: i32,
    pub carried: u32,
    pub capacity: u32,
    pub holding: Option<AgentId>,
    pub stock: u32,
    pub spawn_cost: u32,
    pub sense_radius_sq: i32,
    pub entities: Vec<Entity>,
    pub walls: HashSet<Position>,
    pub hazards: HashSet<Position>,
    pub table: SharedTable,
    pub inbox: Vec<Message>,
    pub sent: Vec<Message>,
    pub acts: Vec<(Action, Position)>,
    next_entity: u64,
}

impl MockWorld {
    fn new(id: AgentId, kind: EntityKind, position: Position, sense_radius_sq: i32) -> Self {
        Self {
            id,
            team: Team::Red,
            kind,
            tick: 1,
            map: MapProfile::new(60, 60),
            position,
            health: 100,
            carried: 0,
            capacity: 20,
            holding: None,
            stock: 0,
            spawn_cost: 30,
            sense_radius_sq,
            entities: Vec::new(),
            walls: HashSet::new(),
            hazards: HashSet::new(),
            table: SharedTable::new(),
            inbox: Vec::new(),
            sent: Vec::new(),
            acts: Vec::new(),
            next_entity: 1000,
        }
    }

    pub fn worker(id: AgentId, position: Position) -> Self {
        Self::new(id, EntityKind::Worker, position, 36)
    }

    pub fn controller(id: AgentId, position: Position) -> Self {
        let mut world = Self::new(id, EntityKind::Controller, position, 100);
        world.health = 500;
        world
    }

    fn next_id(&mut self) -> u64 {
        self.next_entity += 1;
        self.next_entity
    }

    pub fn add_resource(&mut self, position: Position) -> u64 {
        let id = self.next_id();
        self.entities.push(Entity {
            id,
            kind: EntityKind::Resource,
            team: None,
            position,
            health: 40,
        });
        id
    }

    pub fn add_hostile(&mut self, kind: EntityKind, team: Team, position: Position, health: i32) -> u64 {
        let id = self.next_id();
        self.entities.push(Entity {
            id,
            kind,
            team: Some(team),
            position,
            health,
        });
        id
    }

    fn occupied(&self, pos: Position) -> bool {
        self.walls.contains(&pos)
            || self
                .entities
                .iter()
                .any(|e| e.position == pos && e.kind != EntityKind::Resource)
    }

    fn entity_at(&self, pos: Position, kind: EntityKind) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| e.position == pos && e.kind == kind)
    }
}

impl Mobility for MockWorld {
    fn position(&self) -> Position {
        self.position
    }

    fn can_move(&self, dir: Direction) -> bool {
        let dest = self.position.add(dir);
        dir != Direction::Center && self.map.contains(dest) && !self.occupied(dest)
    }

    fn is_hazardous(&self, pos: Position) -> bool {
        self.hazards.contains(&pos)
    }

    fn move_step(&mut self, dir: Direction) -> Result<(), WorldError> {
        if !self.can_move(dir) {
            return Err(WorldError::CannotMove {
                agent_id: self.id,
                direction: dir,
            });
        }
        self.position = self.position.add(dir);
        Ok(())
    }
}

impl WorldInterface for MockWorld {
    fn agent_id(&self) -> AgentId {
        self.id
    }

    fn team(&self) -> Team {
        self.team
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn map(&self) -> MapProfile {
        self.map
    }

    fn health(&self) -> i32 {
        self.health
    }

    fn carried(&self) -> u32 {
        self.carried
    }

    fn carry_capacity(&self) -> u32 {
        self.capacity
    }

    fn holding(&self) -> Option<AgentId> {
        self.holding
    }

    fn stock(&self) -> u32 {
        self.stock
    }

    fn spawn_cost(&self) -> u32 {
        self.spawn_cost
    }

    fn sense_radius_sq(&self) -> i32 {
        self.sense_radius_sq
    }

    fn sense(&self, radius_sq: i32, filter: SenseFilter) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|e| e.position.distance_squared(self.position) <= radius_sq)
            .filter(|e| match filter {
                SenseFilter::Hostile => e.is_unit() && e.team.is_some_and(|t| t != self.team),
                SenseFilter::Friendly => e.is_unit() && e.team == Some(self.team),
                SenseFilter::Resources => e.kind == EntityKind::Resource,
                SenseFilter::Hazards => e.kind == EntityKind::Hazard,
                SenseFilter::All => true,
            })
            .copied()
            .collect()
    }

    fn can_act(&self, action: Action, target: Position) -> bool {
        let adjacent = self.position.is_adjacent(target);
        match action {
            Action::Attack | Action::Capture => {
                adjacent
                    && self
                        .entities
                        .iter()
                        .any(|e| e.position == target && e.is_unit() && e.team != Some(self.team))
            }
            Action::Deliver => self.carried > 0,
            Action::Collect => adjacent && self.entity_at(target, EntityKind::Resource).is_some(),
            Action::Fortify => {
                self.kind == EntityKind::Controller
                    && self.map.contains(target)
                    && !self.occupied(target)
                    && !self.hazards.contains(&target)
            }
            Action::Spawn => {
                self.kind == EntityKind::Controller
                    && adjacent
                    && self.map.contains(target)
                    && !self.occupied(target)
                    && self.stock >= self.spawn_cost
            }
            Action::Release => self.holding.is_some() && adjacent && !self.occupied(target),
        }
    }

    fn act(&mut self, action: Action, target: Position) -> Result<(), WorldError> {
        if !self.can_act(action, target) {
            return Err(WorldError::CannotAct {
                agent_id: self.id,
                action: action.label(),
                target,
            });
        }
        match action {
            Action::Attack => {
                if let Some(e) = self.entities.iter_mut().find(|e| e.position == target) {
                    e.health -= 10;
                }
            }
            Action::Capture => {
                if let Some(idx) = self.entities.iter().position(|e| e.position == target) {
                    self.holding = Some(self.entities.remove(idx).id);
                }
            }
            Action::Deliver => {
                self.stock += self.carried;
                self.carried = 0;
            }
            Action::Collect => {
                if let Some(idx) = self.entity_at(target, EntityKind::Resource) {
                    let take = 10.min(self.capacity - self.carried) as i32;
                    self.entities[idx].health -= take;
                    self.carried += take as u32;
                }
            }
            Action::Fortify => {
                self.hazards.insert(target);
            }
            Action::Spawn => {
                self.stock -= self.spawn_cost;
                let id = self.next_id();
                self.entities.push(Entity {
                    id,
                    kind: EntityKind::Worker,
                    team: Some(self.team),
                    position: target,
                    health: 100,
                });
            }
            Action::Release => {
                self.holding = None;
            }
        }
        self.acts.push((action, target));
        Ok(())
    }

    fn table(&self) -> &SharedTable {
        &self.table
    }

    fn table_mut(&mut self) -> &mut SharedTable {
        &mut self.table
    }

    fn send_message(&mut self, message: Message) -> bool {
        self.sent.push(message);
        true
    }

    fn drain_messages(&mut self, limit: usize) -> Vec<Message> {
        let take = self.inbox.len().min(limit);
        self.inbox.drain(..take).collect()
    }
}
