//! In-memory two-team arena: the process loop around the coordination core.
//!
//! The arena owns every body, both teams' shared tables and message queues,
//! and the random source. Agents only ever see it through an [`AgentView`].

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::modules::agent::{Agent, TickOutcome, run_tick};
use crate::modules::config::SwarmConfig;
use crate::modules::controller::ControllerState;
use crate::modules::error::WorldError;
use crate::modules::geometry::{COMPASS, Direction, MapProfile, Position};
use crate::modules::message::{Message, MessageQueue};
use crate::modules::phase::Phase;
use crate::modules::table::SharedTable;
use crate::modules::world::{
    Action, AgentId, Entity, EntityKind, Mobility, SenseFilter, Team, WorldInterface,
};

pub const CONTROLLER_HEALTH: i32 = 500;
pub const WORKER_HEALTH: i32 = 100;
pub const WORKER_DAMAGE: i32 = 10;
pub const CONTROLLER_DAMAGE: i32 = 20;
pub const FORTIFICATION_DAMAGE: i32 = 30;
pub const HAZARD_DAMAGE: i32 = 15;
/// Controller health lost per tick while the team stock is empty.
pub const STARVATION_DAMAGE: i32 = 5;
pub const UPKEEP_PER_TICK: u32 = 3;
pub const SPAWN_COST: u32 = 30;
pub const FORTIFY_COST: u32 = 5;
pub const FORTIFY_RANGE_SQ: i32 = 100;
pub const CARRY_CAPACITY: u32 = 20;
pub const COLLECT_PER_ACTION: u32 = 10;
pub const DELIVERY_RANGE_SQ: i32 = 9;
pub const WORKER_SENSE_SQ: i32 = 36;
pub const CONTROLLER_SENSE_SQ: i32 = 100;
pub const RESOURCE_AMOUNT: u32 = 40;
/// Ticks between resource drops.
pub const RESOURCE_INTERVAL: u64 = 12;
pub const RESOURCE_CAP: usize = 40;
/// The hazard creature chases units inside this radius.
pub const HAZARD_CHASE_SQ: i32 = 25;
/// Cells around each base kept free of walls.
const BASE_CLEARING_SQ: i32 = 36;
const RESOURCE_ID_BASE: u64 = 1 << 40;
const HAZARD_ID: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeathReason {
    Combat,
    Fortification,
    Hazard,
    Starvation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    TickStarted {
        tick: u64,
    },
    TickCompleted {
        tick: u64,
    },
    AgentSpawned {
        agent_id: AgentId,
        team: Team,
        kind: EntityKind,
        position: Position,
    },
    AgentMoved {
        agent_id: AgentId,
        from: Position,
        to: Position,
    },
    AgentAttacked {
        attacker: AgentId,
        target: AgentId,
        damage: i32,
    },
    AgentDied {
        agent_id: AgentId,
        team: Team,
        reason: DeathReason,
    },
    ResourceCollected {
        agent_id: AgentId,
        position: Position,
        amount: u32,
    },
    ResourceDelivered {
        agent_id: AgentId,
        team: Team,
        amount: u32,
    },
    Fortified {
        team: Team,
        position: Position,
    },
    FortificationTriggered {
        owner: Team,
        victim: AgentId,
        position: Position,
    },
    AgentCaptured {
        captor: AgentId,
        captive: AgentId,
    },
    CaptiveReleased {
        captor: AgentId,
        captive: AgentId,
        position: Position,
    },
    PhaseChanged {
        team: Team,
        from: Phase,
        to: Phase,
    },
    TickFaulted {
        agent_id: AgentId,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub spawned: u64,
    pub deaths: u64,
    pub collected: u64,
    pub delivered: u64,
    pub fortifications: u64,
    pub fortification_hits: u64,
    pub attacks: u64,
    pub captures: u64,
    pub faults: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaSetup {
    pub width: i32,
    pub height: i32,
    pub seed: u64,
    pub starting_stock: u32,
    pub starting_workers: u32,
    /// Share of cells (in percent) turned into walls.
    pub wall_percent: u32,
    pub hazard_creature: bool,
}

impl Default for ArenaSetup {
    fn default() -> Self {
        Self {
            width: 40,
            height: 40,
            seed: 0,
            starting_stock: 1200,
            starting_workers: 2,
            wall_percent: 6,
            hazard_creature: true,
        }
    }
}

#[derive(Clone, Debug)]
struct Body {
    id: AgentId,
    team: Team,
    kind: EntityKind,
    position: Position,
    health: i32,
    carried: u32,
    holding: Option<AgentId>,
    held_by: Option<AgentId>,
    acted: bool,
    moved: bool,
    spawned: bool,
}

impl Body {
    fn entity(&self) -> Entity {
        Entity {
            id: self.id,
            kind: self.kind,
            team: Some(self.team),
            position: self.position,
            health: self.health,
        }
    }

    fn on_grid(&self) -> bool {
        self.held_by.is_none()
    }
}

#[derive(Clone, Debug)]
struct TeamState {
    stock: u32,
    table: SharedTable,
    queue: MessageQueue,
    controller: AgentId,
    stats: TeamStats,
}

/// World state shared by every agent view.
#[derive(Debug)]
pub struct World {
    tick: u64,
    map: MapProfile,
    walls: HashSet<Position>,
    resources: BTreeMap<Position, u32>,
    fortifications: HashMap<Position, Team>,
    bodies: BTreeMap<AgentId, Body>,
    occupied: HashMap<Position, AgentId>,
    teams: [TeamState; 2],
    hazard: Option<Position>,
    next_id: AgentId,
    events: Vec<Event>,
    newborn: Vec<AgentId>,
    winner: Option<Team>,
    rng: StdRng,
}

impl World {
    fn generate(setup: &ArenaSetup, config: &SwarmConfig) -> Self {
        let map = MapProfile::new(setup.width.max(8), setup.height.max(8));
        let red_base = Position::new(map.width / 5, map.height / 5);
        let blue_base = map.mirror(red_base);
        let team_state = || TeamState {
            stock: setup.starting_stock,
            table: SharedTable::new(),
            queue: MessageQueue::new(config.messages.retention_ticks),
            controller: 0,
            stats: TeamStats::default(),
        };
        let mut world = World {
            tick: 0,
            map,
            walls: HashSet::new(),
            resources: BTreeMap::new(),
            fortifications: HashMap::new(),
            bodies: BTreeMap::new(),
            occupied: HashMap::new(),
            teams: [team_state(), team_state()],
            hazard: None,
            next_id: 1,
            events: Vec::new(),
            newborn: Vec::new(),
            winner: None,
            rng: StdRng::seed_from_u64(setup.seed),
        };

        let cells = (map.width * map.height) as u32;
        let wall_pairs = cells * setup.wall_percent / 200;
        for _ in 0..wall_pairs {
            let pos = world.random_cell();
            let clear = [red_base, blue_base, map.center()]
                .iter()
                .all(|b| b.distance_squared(pos) > BASE_CLEARING_SQ);
            if clear {
                world.walls.insert(pos);
                world.walls.insert(map.mirror(pos));
            }
        }
        for _ in 0..6 {
            world.drop_resource_pair();
        }

        for (team, base) in [(Team::Red, red_base), (Team::Blue, blue_base)] {
            let controller = world.spawn_body(team, EntityKind::Controller, base);
            world.teams[team.index()].controller = controller;
        }
        for team in [Team::Red, Team::Blue] {
            for _ in 0..setup.starting_workers {
                let base = world.controller_position(team);
                if let Some(cell) = world.free_neighbour(base) {
                    world.spawn_body(team, EntityKind::Worker, cell);
                }
            }
        }
        if setup.hazard_creature {
            world.hazard = Some(map.center());
        }
        world
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn map(&self) -> MapProfile {
        self.map
    }

    pub fn winner(&self) -> Option<Team> {
        self.winner
    }

    pub fn stock(&self, team: Team) -> u32 {
        self.teams[team.index()].stock
    }

    pub fn table(&self, team: Team) -> &SharedTable {
        &self.teams[team.index()].table
    }

    pub fn stats(&self, team: Team) -> TeamStats {
        self.teams[team.index()].stats
    }

    pub fn hazard(&self) -> Option<Position> {
        self.hazard
    }

    pub fn controller_health(&self, team: Team) -> i32 {
        self.bodies
            .get(&self.teams[team.index()].controller)
            .map_or(0, |b| b.health)
    }

    pub fn controller_position(&self, team: Team) -> Position {
        self.bodies
            .get(&self.teams[team.index()].controller)
            .map_or(Position::origin(), |b| b.position)
    }

    pub fn worker_count(&self, team: Team) -> usize {
        self.bodies
            .values()
            .filter(|b| b.team == team && b.kind == EntityKind::Worker)
            .count()
    }

    pub fn resource_total(&self) -> u32 {
        self.resources.values().sum()
    }

    pub fn fortification_count(&self, team: Team) -> usize {
        self.fortifications.values().filter(|t| **t == team).count()
    }

    pub fn entity(&self, id: AgentId) -> Option<Entity> {
        self.bodies.get(&id).map(Body::entity)
    }

    fn random_cell(&mut self) -> Position {
        Position::new(
            self.rng.gen_range(0..self.map.width),
            self.rng.gen_range(0..self.map.height),
        )
    }

    fn is_free(&self, pos: Position) -> bool {
        self.map.contains(pos) && !self.walls.contains(&pos) && !self.occupied.contains_key(&pos)
    }

    fn free_neighbour(&self, pos: Position) -> Option<Position> {
        COMPASS
            .iter()
            .map(|d| pos.add(*d))
            .find(|cell| self.is_free(*cell) && !self.resources.contains_key(cell))
    }

    /// Drops a resource and its mirror image so neither side is favoured.
    fn drop_resource_pair(&mut self) {
        if self.resources.len() >= RESOURCE_CAP {
            return;
        }
        let pos = self.random_cell();
        let mirror = self.map.mirror(pos);
        for cell in [pos, mirror] {
            if self.is_free(cell) && !self.fortifications.contains_key(&cell) {
                *self.resources.entry(cell).or_insert(0) += RESOURCE_AMOUNT;
            }
        }
    }

    fn spawn_body(&mut self, team: Team, kind: EntityKind, position: Position) -> AgentId {
        let id = self.next_id;
        self.next_id += 1;
        let health = match kind {
            EntityKind::Controller => CONTROLLER_HEALTH,
            _ => WORKER_HEALTH,
        };
        self.bodies.insert(
            id,
            Body {
                id,
                team,
                kind,
                position,
                health,
                carried: 0,
                holding: None,
                held_by: None,
                acted: false,
                moved: false,
                spawned: false,
            },
        );
        self.occupied.insert(position, id);
        self.teams[team.index()].stats.spawned += 1;
        self.newborn.push(id);
        self.events.push(Event::AgentSpawned {
            agent_id: id,
            team,
            kind,
            position,
        });
        id
    }

    fn damage(&mut self, id: AgentId, amount: i32, reason: DeathReason) {
        let Some(body) = self.bodies.get_mut(&id) else {
            return;
        };
        body.health -= amount;
        if body.health <= 0 {
            self.kill(id, reason);
        }
    }

    fn kill(&mut self, id: AgentId, reason: DeathReason) {
        let Some(body) = self.bodies.remove(&id) else {
            return;
        };
        if body.on_grid() {
            self.occupied.remove(&body.position);
        }
        if let Some(captor) = body.held_by {
            if let Some(captor) = self.bodies.get_mut(&captor) {
                captor.holding = None;
            }
        }
        if let Some(captive) = body.holding {
            if let Some(captive_body) = self.bodies.get_mut(&captive) {
                captive_body.held_by = None;
                captive_body.position = body.position;
                self.occupied.insert(body.position, captive);
            }
        }
        let team_state = &mut self.teams[body.team.index()];
        team_state.stats.deaths += 1;
        team_state.queue.forget_agent(id);
        debug!(tick = self.tick, agent = id, team = %body.team, ?reason, "agent died");
        self.events.push(Event::AgentDied {
            agent_id: id,
            team: body.team,
            reason,
        });
        if body.kind == EntityKind::Controller && self.winner.is_none() {
            let winner = body.team.opponent();
            info!(tick = self.tick, %winner, "controller destroyed");
            self.winner = Some(winner);
        }
    }

    fn move_hazard(&mut self) {
        let Some(at) = self.hazard else {
            return;
        };
        let prey = self
            .bodies
            .values()
            .filter(|b| b.on_grid() && b.kind == EntityKind::Worker)
            .filter(|b| b.position.distance_squared(at) <= HAZARD_CHASE_SQ)
            .min_by_key(|b| (b.position.distance_squared(at), b.id))
            .map(|b| b.position);
        let first = match prey {
            Some(target) => at.direction_to(target),
            None => COMPASS[self.rng.gen_range(0..COMPASS.len())],
        };
        let mut dir = first;
        for _ in 0..COMPASS.len() {
            let next = at.add(dir);
            if dir != Direction::Center && self.is_free(next) {
                self.hazard = Some(next);
                break;
            }
            dir = dir.rotate_right();
        }

        if let Some(at) = self.hazard {
            let victims: Vec<AgentId> = self
                .bodies
                .values()
                .filter(|b| b.on_grid() && b.kind == EntityKind::Worker)
                .filter(|b| b.position.is_adjacent(at))
                .map(|b| b.id)
                .collect();
            for id in victims {
                self.damage(id, HAZARD_DAMAGE, DeathReason::Hazard);
            }
        }
    }

    fn upkeep(&mut self) {
        for team in [Team::Red, Team::Blue] {
            let state = &mut self.teams[team.index()];
            if state.stock >= UPKEEP_PER_TICK {
                state.stock -= UPKEEP_PER_TICK;
            } else {
                state.stock = 0;
                let controller = state.controller;
                self.damage(controller, STARVATION_DAMAGE, DeathReason::Starvation);
            }
        }
    }
}

/// One agent's window onto the arena for the duration of its tick.
pub struct AgentView<'a> {
    world: &'a mut World,
    id: AgentId,
    team: Team,
}

impl<'a> AgentView<'a> {
    fn new(world: &'a mut World, id: AgentId) -> Option<Self> {
        let team = world.bodies.get(&id)?.team;
        Some(Self { world, id, team })
    }

    fn body(&self) -> Option<&Body> {
        self.world.bodies.get(&self.id)
    }

    fn body_mut(&mut self) -> Result<&mut Body, WorldError> {
        self.world
            .bodies
            .get_mut(&self.id)
            .ok_or(WorldError::UnknownAgent(self.id))
    }

    fn team_state(&self) -> &TeamState {
        &self.world.teams[self.team.index()]
    }

    fn team_state_mut(&mut self) -> &mut TeamState {
        &mut self.world.teams[self.team.index()]
    }

    fn kind(&self) -> Option<EntityKind> {
        self.body().map(|b| b.kind)
    }

    fn hostile_at(&self, pos: Position) -> Option<&Body> {
        let id = self.world.occupied.get(&pos)?;
        self.world.bodies.get(id).filter(|b| b.team != self.team)
    }

    fn rejected(&self, action: Action, target: Position) -> WorldError {
        WorldError::CannotAct {
            agent_id: self.id,
            action: action.label(),
            target,
        }
    }
}

impl Mobility for AgentView<'_> {
    fn position(&self) -> Position {
        self.body().map_or(Position::origin(), |b| b.position)
    }

    fn can_move(&self, dir: Direction) -> bool {
        let Some(body) = self.body() else {
            return false;
        };
        dir != Direction::Center
            && !body.moved
            && body.kind == EntityKind::Worker
            && self.world.is_free(body.position.add(dir))
            && self.world.hazard != Some(body.position.add(dir))
    }

    fn is_hazardous(&self, pos: Position) -> bool {
        let enemy_trap = self
            .world
            .fortifications
            .get(&pos)
            .is_some_and(|owner| *owner != self.team);
        let creature = self.world.hazard.is_some_and(|h| h.is_adjacent(pos));
        enemy_trap || creature
    }

    fn move_step(&mut self, dir: Direction) -> Result<(), WorldError> {
        if !self.can_move(dir) {
            let from = self.position();
            if !self.world.map.contains(from.add(dir)) {
                return Err(WorldError::OutOfBounds(from.add(dir)));
            }
            return Err(WorldError::CannotMove {
                agent_id: self.id,
                direction: dir,
            });
        }
        let id = self.id;
        let body = self.body_mut()?;
        let from = body.position;
        let to = from.add(dir);
        body.position = to;
        body.moved = true;
        self.world.occupied.remove(&from);
        self.world.occupied.insert(to, id);
        self.world.events.push(Event::AgentMoved {
            agent_id: id,
            from,
            to,
        });

        if let Some(owner) = self.world.fortifications.get(&to).copied() {
            if owner != self.team {
                self.world.fortifications.remove(&to);
                self.world.teams[owner.index()].stats.fortification_hits += 1;
                self.world.events.push(Event::FortificationTriggered {
                    owner,
                    victim: id,
                    position: to,
                });
                self.world
                    .damage(id, FORTIFICATION_DAMAGE, DeathReason::Fortification);
            }
        }
        Ok(())
    }
}

impl WorldInterface for AgentView<'_> {
    fn agent_id(&self) -> AgentId {
        self.id
    }

    fn team(&self) -> Team {
        self.team
    }

    fn tick(&self) -> u64 {
        self.world.tick
    }

    fn map(&self) -> MapProfile {
        self.world.map
    }

    fn health(&self) -> i32 {
        self.body().map_or(0, |b| b.health)
    }

    fn carried(&self) -> u32 {
        self.body().map_or(0, |b| b.carried)
    }

    fn carry_capacity(&self) -> u32 {
        CARRY_CAPACITY
    }

    fn holding(&self) -> Option<AgentId> {
        self.body().and_then(|b| b.holding)
    }

    fn stock(&self) -> u32 {
        self.team_state().stock
    }

    fn spawn_cost(&self) -> u32 {
        SPAWN_COST
    }

    fn sense_radius_sq(&self) -> i32 {
        match self.kind() {
            Some(EntityKind::Controller) => CONTROLLER_SENSE_SQ,
            _ => WORKER_SENSE_SQ,
        }
    }

    fn sense(&self, radius_sq: i32, filter: SenseFilter) -> Vec<Entity> {
        let me = self.position();
        let within = |pos: Position| pos.distance_squared(me) <= radius_sq;
        let mut found = Vec::new();

        let wants_units = matches!(
            filter,
            SenseFilter::Hostile | SenseFilter::Friendly | SenseFilter::All
        );
        if wants_units {
            found.extend(
                self.world
                    .bodies
                    .values()
                    .filter(|b| b.id != self.id && b.on_grid() && within(b.position))
                    .filter(|b| match filter {
                        SenseFilter::Hostile => b.team != self.team,
                        SenseFilter::Friendly => b.team == self.team,
                        _ => true,
                    })
                    .map(Body::entity),
            );
        }
        if matches!(filter, SenseFilter::Resources | SenseFilter::All) {
            found.extend(
                self.world
                    .resources
                    .iter()
                    .filter(|(pos, _)| within(**pos))
                    .map(|(pos, amount)| Entity {
                        id: RESOURCE_ID_BASE + (pos.x as u64) * 4096 + pos.y as u64,
                        kind: EntityKind::Resource,
                        team: None,
                        position: *pos,
                        health: *amount as i32,
                    }),
            );
        }
        if matches!(filter, SenseFilter::Hazards | SenseFilter::All) {
            if let Some(hazard) = self.world.hazard.filter(|h| within(*h)) {
                found.push(Entity {
                    id: HAZARD_ID,
                    kind: EntityKind::Hazard,
                    team: None,
                    position: hazard,
                    health: 0,
                });
            }
        }
        found
    }

    fn can_act(&self, action: Action, target: Position) -> bool {
        let Some(body) = self.body() else {
            return false;
        };
        let adjacent = body.position.is_adjacent(target) && body.position != target;
        let is_worker = body.kind == EntityKind::Worker;
        let free_target = self.world.is_free(target) && self.world.hazard != Some(target);
        if action != Action::Spawn && body.acted {
            return false;
        }
        match action {
            Action::Attack => adjacent && self.hostile_at(target).is_some(),
            Action::Deliver => {
                is_worker
                    && body.carried > 0
                    && target == self.world.controller_position(self.team)
                    && body.position.distance_squared(target) <= DELIVERY_RANGE_SQ
            }
            Action::Collect => {
                is_worker
                    && body.position.is_adjacent(target)
                    && body.holding.is_none()
                    && body.carried < CARRY_CAPACITY
                    && self.world.resources.contains_key(&target)
            }
            Action::Fortify => {
                !is_worker
                    && free_target
                    && !self.world.fortifications.contains_key(&target)
                    && !self.world.resources.contains_key(&target)
                    && body.position.distance_squared(target) <= FORTIFY_RANGE_SQ
                    && self.team_state().stock >= FORTIFY_COST
            }
            Action::Spawn => {
                !is_worker
                    && !body.spawned
                    && adjacent
                    && free_target
                    && !self.world.resources.contains_key(&target)
                    && self.team_state().stock >= SPAWN_COST
            }
            Action::Capture => {
                is_worker
                    && adjacent
                    && body.carried == 0
                    && body.holding.is_none()
                    && self.hostile_at(target).is_some_and(|h| {
                        h.kind == EntityKind::Worker && h.health < body.health && h.holding.is_none()
                    })
            }
            Action::Release => body.holding.is_some() && adjacent && free_target,
        }
    }

    fn act(&mut self, action: Action, target: Position) -> Result<(), WorldError> {
        let controller_only = matches!(action, Action::Fortify | Action::Spawn);
        if controller_only && self.kind() != Some(EntityKind::Controller) {
            return Err(WorldError::NotController(self.id));
        }
        if !self.can_act(action, target) {
            return Err(self.rejected(action, target));
        }
        let id = self.id;
        let team = self.team;
        match action {
            Action::Attack => {
                let victim = self
                    .hostile_at(target)
                    .map(|b| b.id)
                    .ok_or_else(|| self.rejected(action, target))?;
                let damage = match self.kind() {
                    Some(EntityKind::Controller) => CONTROLLER_DAMAGE,
                    _ => WORKER_DAMAGE,
                };
                self.team_state_mut().stats.attacks += 1;
                self.world.events.push(Event::AgentAttacked {
                    attacker: id,
                    target: victim,
                    damage,
                });
                self.world.damage(victim, damage, DeathReason::Combat);
            }
            Action::Deliver => {
                let body = self.body_mut()?;
                let amount = body.carried;
                body.carried = 0;
                let state = self.team_state_mut();
                state.stock += amount;
                state.stats.delivered += amount as u64;
                self.world.events.push(Event::ResourceDelivered {
                    agent_id: id,
                    team,
                    amount,
                });
            }
            Action::Collect => {
                let available = self.world.resources.get(&target).copied().unwrap_or(0);
                let body = self.body_mut()?;
                let amount = COLLECT_PER_ACTION
                    .min(CARRY_CAPACITY - body.carried)
                    .min(available);
                body.carried += amount;
                if available <= amount {
                    self.world.resources.remove(&target);
                } else {
                    self.world.resources.insert(target, available - amount);
                }
                self.team_state_mut().stats.collected += amount as u64;
                self.world.events.push(Event::ResourceCollected {
                    agent_id: id,
                    position: target,
                    amount,
                });
            }
            Action::Fortify => {
                self.world.fortifications.insert(target, team);
                let state = self.team_state_mut();
                state.stock -= FORTIFY_COST;
                state.stats.fortifications += 1;
                self.world.events.push(Event::Fortified {
                    team,
                    position: target,
                });
            }
            Action::Spawn => {
                self.team_state_mut().stock -= SPAWN_COST;
                self.body_mut()?.spawned = true;
                self.world.spawn_body(team, EntityKind::Worker, target);
                return Ok(());
            }
            Action::Capture => {
                let captive = self
                    .hostile_at(target)
                    .map(|b| b.id)
                    .ok_or_else(|| self.rejected(action, target))?;
                self.world.occupied.remove(&target);
                if let Some(body) = self.world.bodies.get_mut(&captive) {
                    body.held_by = Some(id);
                }
                self.body_mut()?.holding = Some(captive);
                self.team_state_mut().stats.captures += 1;
                self.world
                    .events
                    .push(Event::AgentCaptured { captor: id, captive });
            }
            Action::Release => {
                let body = self.body_mut()?;
                let Some(captive) = body.holding.take() else {
                    return Err(self.rejected(action, target));
                };
                if let Some(captive_body) = self.world.bodies.get_mut(&captive) {
                    captive_body.held_by = None;
                    captive_body.position = target;
                    self.world.occupied.insert(target, captive);
                }
                self.world.events.push(Event::CaptiveReleased {
                    captor: id,
                    captive,
                    position: target,
                });
            }
        }
        self.body_mut()?.acted = true;
        Ok(())
    }

    fn table(&self) -> &SharedTable {
        &self.team_state().table
    }

    fn table_mut(&mut self) -> &mut SharedTable {
        &mut self.team_state_mut().table
    }

    fn send_message(&mut self, message: Message) -> bool {
        let tick = self.world.tick;
        let id = self.id;
        self.team_state_mut().queue.send(tick, id, message)
    }

    fn drain_messages(&mut self, limit: usize) -> Vec<Message> {
        let tick = self.world.tick;
        let id = self.id;
        self.team_state_mut().queue.drain(tick, id, limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickResult {
    pub tick: u64,
    pub events: Vec<Event>,
    pub faults: Vec<AgentId>,
    pub winner: Option<Team>,
}

/// Owns the world and every agent's memory, and drives the tick loop.
#[derive(Debug)]
pub struct Arena {
    world: World,
    agents: BTreeMap<AgentId, Agent>,
    config: SwarmConfig,
    setup: ArenaSetup,
}

impl Arena {
    pub fn new(setup: ArenaSetup, config: SwarmConfig) -> Self {
        let mut world = World::generate(&setup, &config);
        let founders: Vec<AgentId> = world.newborn.drain(..).collect();
        let agents: BTreeMap<AgentId, Agent> = founders
            .into_iter()
            .map(|id| (id, new_agent(&world, id)))
            .collect();
        world.events.clear();
        info!(
            width = world.map.width,
            height = world.map.height,
            seed = setup.seed,
            class = ?world.map.class(),
            agents = agents.len(),
            "arena ready"
        );
        Self {
            world,
            agents,
            config,
            setup,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn setup(&self) -> &ArenaSetup {
        &self.setup
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn controller_state(&self, team: Team) -> Option<&ControllerState> {
        let id = self.world.teams[team.index()].controller;
        self.agents.get(&id).and_then(Agent::as_controller)
    }

    pub fn step(&mut self) -> TickResult {
        let tick = self.world.tick + 1;
        self.world.tick = tick;
        self.world.events.push(Event::TickStarted { tick });

        for body in self.world.bodies.values_mut() {
            body.acted = false;
            body.moved = false;
            body.spawned = false;
        }
        self.world.move_hazard();
        self.world.upkeep();
        if tick % RESOURCE_INTERVAL == 0 {
            self.world.drop_resource_pair();
        }

        let mut faults = Vec::new();
        let scheduled: Vec<AgentId> = self
            .world
            .bodies
            .values()
            .filter(|b| b.on_grid())
            .map(|b| b.id)
            .collect();
        for id in scheduled {
            if self.world.winner.is_some() {
                break;
            }
            let Some(mut agent) = self.agents.remove(&id) else {
                continue;
            };
            let Some(mut view) = AgentView::new(&mut self.world, id) else {
                // Died earlier this tick.
                continue;
            };
            let team = view.team;
            let phase_before = view.table().phase();
            let outcome = run_tick(&mut agent, &mut view, &self.config);
            let phase_after = view.table().phase();

            if phase_before != phase_after {
                self.world.events.push(Event::PhaseChanged {
                    team,
                    from: phase_before,
                    to: phase_after,
                });
            }
            if outcome == TickOutcome::Faulted {
                faults.push(id);
                self.world.teams[team.index()].stats.faults += 1;
                self.world.events.push(Event::TickFaulted { agent_id: id });
            }
            if self.world.bodies.contains_key(&id) {
                self.agents.insert(id, agent);
            }
            let newborn: Vec<AgentId> = self.world.newborn.drain(..).collect();
            for child in newborn {
                self.agents.insert(child, new_agent(&self.world, child));
            }
        }

        for state in &mut self.world.teams {
            state.queue.expire(tick);
        }
        let dead: Vec<AgentId> = self
            .agents
            .keys()
            .filter(|id| !self.world.bodies.contains_key(id))
            .copied()
            .collect();
        for id in dead {
            self.agents.remove(&id);
        }

        self.world.events.push(Event::TickCompleted { tick });
        TickResult {
            tick,
            events: std::mem::take(&mut self.world.events),
            faults,
            winner: self.world.winner,
        }
    }

    /// Steps until a controller falls or `max_ticks` have run.
    pub fn run(&mut self, max_ticks: u64, mut on_tick: impl FnMut(&TickResult)) -> Option<Team> {
        while self.world.tick < max_ticks && self.world.winner.is_none() {
            let result = self.step();
            on_tick(&result);
        }
        self.world.winner
    }
}

fn new_agent(world: &World, id: AgentId) -> Agent {
    match world.bodies.get(&id).map(|b| b.kind) {
        Some(EntityKind::Controller) => Agent::controller(id),
        _ => Agent::worker(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_setup(seed: u64) -> ArenaSetup {
        ArenaSetup {
            width: 30,
            height: 30,
            seed,
            wall_percent: 0,
            hazard_creature: false,
            ..ArenaSetup::default()
        }
    }

    fn worker_view_of(world: &mut World, team: Team, at: Position) -> AgentId {
        world.spawn_body(team, EntityKind::Worker, at)
    }

    #[test]
    fn generation_is_symmetric_and_seeded() {
        let setup = ArenaSetup {
            seed: 7,
            ..ArenaSetup::default()
        };
        let a = Arena::new(setup.clone(), SwarmConfig::default());
        let b = Arena::new(setup, SwarmConfig::default());
        assert_eq!(a.world.walls, b.world.walls);
        assert_eq!(a.world.resources, b.world.resources);
        for wall in &a.world.walls {
            assert!(a.world.walls.contains(&a.world.map.mirror(*wall)));
        }
        assert_eq!(
            a.world.map.mirror(a.world.controller_position(Team::Red)),
            a.world.controller_position(Team::Blue)
        );
        assert_eq!(a.world.worker_count(Team::Red), 2);
    }

    #[test]
    fn same_seed_replays_identically() {
        let mut a = Arena::new(open_setup(3), SwarmConfig::default());
        let mut b = Arena::new(open_setup(3), SwarmConfig::default());
        for _ in 0..40 {
            assert_eq!(a.step(), b.step());
        }
        assert_eq!(a.world.table(Team::Red).slots(), b.world.table(Team::Red).slots());
    }

    #[test]
    fn upkeep_drains_stock_then_health() {
        let mut setup = open_setup(1);
        setup.starting_stock = 4;
        setup.starting_workers = 0;
        let mut arena = Arena::new(setup, SwarmConfig::default());
        arena.world.upkeep();
        assert_eq!(arena.world.stock(Team::Red), 1);
        arena.world.upkeep();
        assert_eq!(arena.world.stock(Team::Red), 0);
        assert_eq!(
            arena.world.controller_health(Team::Red),
            CONTROLLER_HEALTH - STARVATION_DAMAGE
        );
    }

    #[test]
    fn enemy_fortification_hurts_and_is_consumed() {
        let mut arena = Arena::new(open_setup(1), SwarmConfig::default());
        let world = &mut arena.world;
        let trap = Position::new(15, 16);
        world.fortifications.insert(trap, Team::Blue);
        let id = worker_view_of(world, Team::Red, Position::new(15, 15));

        let mut view = AgentView::new(world, id).unwrap();
        assert!(view.is_hazardous(trap));
        assert!(!view.can_move_safely(Direction::North));
        view.move_step(Direction::North).unwrap();

        assert_eq!(world.entity(id).unwrap().health, WORKER_HEALTH - FORTIFICATION_DAMAGE);
        assert!(!world.fortifications.contains_key(&trap));
        assert_eq!(world.stats(Team::Blue).fortification_hits, 1);
    }

    #[test]
    fn one_action_per_tick_and_one_move() {
        let mut arena = Arena::new(open_setup(1), SwarmConfig::default());
        let world = &mut arena.world;
        let me = worker_view_of(world, Team::Red, Position::new(12, 12));
        let foe = worker_view_of(world, Team::Blue, Position::new(13, 12));

        let mut view = AgentView::new(world, me).unwrap();
        view.act(Action::Attack, Position::new(13, 12)).unwrap();
        assert!(!view.can_act(Action::Attack, Position::new(13, 12)));
        assert!(view.act(Action::Attack, Position::new(13, 12)).is_err());
        view.move_step(Direction::North).unwrap();
        assert!(!view.can_move(Direction::North));

        assert_eq!(world.entity(foe).unwrap().health, WORKER_HEALTH - WORKER_DAMAGE);
    }

    #[test]
    fn workers_cannot_fortify_or_spawn() {
        let mut arena = Arena::new(open_setup(1), SwarmConfig::default());
        let world = &mut arena.world;
        let me = worker_view_of(world, Team::Red, Position::new(12, 12));
        let mut view = AgentView::new(world, me).unwrap();
        assert!(!view.can_act(Action::Fortify, Position::new(12, 13)));
        assert!(matches!(
            view.act(Action::Spawn, Position::new(12, 13)),
            Err(WorldError::NotController(id)) if id == me
        ));
    }

    #[test]
    fn capture_and_release_move_the_captive() {
        let mut arena = Arena::new(open_setup(1), SwarmConfig::default());
        let world = &mut arena.world;
        let me = worker_view_of(world, Team::Red, Position::new(12, 12));
        let foe = worker_view_of(world, Team::Blue, Position::new(13, 12));
        world.bodies.get_mut(&foe).unwrap().health = 50;

        let mut view = AgentView::new(world, me).unwrap();
        view.act(Action::Capture, Position::new(13, 12)).unwrap();
        assert_eq!(view.holding(), Some(foe));
        assert!(view.sense_all(SenseFilter::Hostile).iter().all(|e| e.id != foe));

        world.bodies.get_mut(&me).unwrap().acted = false;
        let mut view = AgentView::new(world, me).unwrap();
        view.act(Action::Release, Position::new(11, 12)).unwrap();
        assert_eq!(world.entity(foe).unwrap().position, Position::new(11, 12));
        assert_eq!(world.occupied.get(&Position::new(11, 12)), Some(&foe));
    }

    #[test]
    fn colonies_publish_tables_and_grow() {
        let mut arena = Arena::new(open_setup(11), SwarmConfig::default());
        let mut spawned = 0;
        for _ in 0..60 {
            let result = arena.step();
            spawned += result
                .events
                .iter()
                .filter(|e| matches!(e, Event::AgentSpawned { .. }))
                .count();
        }
        for team in [Team::Red, Team::Blue] {
            let table = arena.world.table(team);
            assert_eq!(table.own_base(), Some(arena.world.controller_position(team)));
            assert!(arena.world.fortification_count(team) + arena.world.stats(team).fortification_hits as usize >= 2);
        }
        assert!(spawned > 0, "controllers should have spawned workers");
    }

    #[test]
    fn killing_the_controller_ends_the_match() {
        let mut arena = Arena::new(open_setup(2), SwarmConfig::default());
        let blue = arena.world.teams[Team::Blue.index()].controller;
        arena.world.damage(blue, CONTROLLER_HEALTH, DeathReason::Combat);
        assert_eq!(arena.world.winner(), Some(Team::Red));
        let winner = arena.run(100, |_| {});
        assert_eq!(winner, Some(Team::Red));
        assert_eq!(arena.world.tick(), 0, "no ticks run after the match ended");
    }
}
