//! Per-tick routine for the colony controller.
//!
//! The controller is the only writer of most table fields: it aggregates
//! worker reports and its own sensing into threat, economy, phase and
//! formation state, then fortifies and spawns.

use tracing::{debug, info};

use crate::modules::budget::{FortificationPlanner, PlacementContext};
use crate::modules::config::SwarmConfig;
use crate::modules::decision;
use crate::modules::economy::{
    self, EconomyInputs, Forecast, RecoveryMode, ResourceFlowTracker, SpawnBlock, SpawnInputs,
};
use crate::modules::error::WorldError;
use crate::modules::formation;
use crate::modules::geometry::{COMPASS, Direction, Position};
use crate::modules::message::{BASE_HEALTH_BUCKET, Message};
use crate::modules::phase::{
    AttackWindow, DefenseReadiness, OpponentModel, OpponentProfile, Phase, PhaseInputs,
    PhaseMachine, Sightings, WindowInputs,
};
use crate::modules::threat::{MessageThreat, ThreatEstimator};
use crate::modules::world::{Action, Entity, EntityKind, SenseFilter, WorldInterface};

#[derive(Clone, Debug)]
pub struct ControllerState {
    threat: ThreatEstimator,
    message_threat: MessageThreat,
    flow: ResourceFlowTracker,
    forecast: Option<Forecast>,
    recovery: RecoveryMode,
    phase: Option<PhaseMachine>,
    opponent: OpponentModel,
    planner: FortificationPlanner,
    spawns: u32,
    last_block: Option<SpawnBlock>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            threat: ThreatEstimator::default(),
            message_threat: MessageThreat::default(),
            flow: ResourceFlowTracker::new(),
            forecast: None,
            recovery: RecoveryMode::default(),
            phase: None,
            opponent: OpponentModel::new(),
            planner: FortificationPlanner::new(),
            spawns: 0,
            last_block: None,
        }
    }
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawns(&self) -> u32 {
        self.spawns
    }

    pub fn phase(&self) -> Phase {
        self.phase.as_ref().map_or(Phase::Buildup, PhaseMachine::phase)
    }

    pub fn threat(&self) -> u32 {
        self.threat.level()
    }

    pub fn opponent(&self) -> OpponentProfile {
        self.opponent.profile()
    }

    pub fn attack_window(&self) -> Option<AttackWindow> {
        self.opponent.window()
    }

    pub fn fortifications(&self) -> u32 {
        self.planner.placed()
    }

    pub fn planner(&self) -> &FortificationPlanner {
        &self.planner
    }

    pub fn in_recovery(&self) -> bool {
        self.recovery.is_active()
    }

    pub fn forecast(&self) -> Option<Forecast> {
        self.forecast
    }
}

/// Worker reports relevant to the controller, folded from one drain.
#[derive(Default)]
struct Reports {
    threat: Option<u32>,
    early_sighting: bool,
}

pub fn controller_tick<W: WorldInterface + ?Sized>(
    state: &mut ControllerState,
    world: &mut W,
    config: &SwarmConfig,
) -> Result<(), WorldError> {
    let tick = world.tick();
    let map = world.map();
    let base = world.position();
    let stock = world.stock();
    let health = world.health();

    let table = world.table_mut();
    table.set_own_base(base);
    table.set_base_health(health);
    table.set_own_stock(stock);

    let reports = ingest_messages(world, tick, config);

    let hostiles = world.sense_all(SenseFilter::Hostile);
    let hostile_positions: Vec<Position> = hostiles.iter().map(|h| h.position).collect();

    let reported = state.message_threat.observe(tick, reports.threat, &config.messages);
    let threat = state
        .threat
        .update(tick, hostiles.len() as u32, reported, &config.threat);
    let table = world.table_mut();
    table.set_threat(threat);
    table.set_safe_ticks(state.threat.ticks_since_threat(), config.threat.safe_ticks_cap);

    let forecast = state.flow.observe(stock, &config.economy);
    state.forecast = Some(forecast);
    let recovery = state.recovery.update(
        &EconomyInputs {
            tick,
            stock,
            threat,
            spawns: state.spawns,
            base_health: health,
            forecast,
        },
        &config.economy,
    );
    let table = world.table_mut();
    table.set_starvation(forecast);
    table.set_recovery(recovery);

    let friends: Vec<Entity> = world
        .sense_all(SenseFilter::Friendly)
        .into_iter()
        .filter(|e| e.kind == EntityKind::Worker)
        .collect();
    let near_base = hostiles
        .iter()
        .filter(|h| h.position.distance_squared(base) <= config.strategy.near_base_sq)
        .count() as u32;
    let hostile_workers = hostiles.iter().filter(|h| h.kind == EntityKind::Worker).count();
    let army_advantage = friends.len() as i32 - hostile_workers as i32;
    let enemy_base_health = world.table().enemy_base_health();
    let profile = state.opponent.classify(
        &Sightings {
            tick,
            near_base,
            visible: hostiles.len() as u32,
            enemy_base_health,
        },
        &config.strategy,
    );
    let window = state.opponent.detect_window(
        &WindowInputs {
            tick,
            base_health: health,
            stock,
            army_advantage,
            near_base,
            threat,
            enemy_base_health,
        },
        &config.strategy,
        &config.phase,
    );
    let table = world.table_mut();
    table.set_opponent(profile);
    table.set_attack_window(window);
    table.set_army_advantage(army_advantage);

    let machine = state
        .phase
        .get_or_insert_with(|| PhaseMachine::new(map, &config.phase));
    if reports.early_sighting {
        machine.note_early_hostiles(tick, &config.phase);
    }
    let phase = machine.update(
        &PhaseInputs {
            tick,
            hostiles: hostiles.len() as u32,
            threat,
            spawn_count: state.spawns,
            readiness: DefenseReadiness {
                fortifications: state.planner.placed(),
                gave_up: state.planner.gave_up(),
                stalled: state.planner.stalled(),
            },
            window,
        },
        &config.phase,
    );
    world.table_mut().set_phase(phase);

    let focus = decision::pick_focus(&hostiles, &config.decision);
    let line = formation::compute_blocking_line(base, &hostile_positions, map, &config.formation);
    let friends: Vec<Position> = friends.iter().map(|e| e.position).collect();
    let defenders = formation::count_within(base, &friends, config.formation.defender_radius_sq);
    let hazard = world
        .sense_all(SenseFilter::Hazards)
        .into_iter()
        .map(|e| e.position)
        .filter(|p| p.distance_squared(base) <= config.decision.hazard_report_sq)
        .min_by_key(|p| p.distance_squared(base));

    let table = world.table_mut();
    table.set_focus(focus);
    table.set_blocking_line(line);
    table.set_defender_count(defenders);
    if let Some(hazard) = hazard {
        table.set_hazard(hazard, tick);
    }

    strike_adjacent(world, &hostiles, config)?;

    let toward = world
        .table()
        .enemy_base()
        .map_or_else(|| base.direction_to(map.mirror(base)), |enemy| base.direction_to(enemy));
    let placement = PlacementContext {
        tick,
        base,
        toward,
        threat,
        window_end: map.fortification_window_end(),
        minimum: config.spawn.fortifications_before_spawn,
    };
    if let Some(report) = state.planner.run_tick(world, &placement, &config.fortification)? {
        if let Some(cell) = report.placed {
            debug!(tick, layout = ?report.layout, x = cell.x, y = cell.y, "fortified");
        }
    }

    try_spawn(state, world, phase, threat, recovery, forecast, toward, config)?;
    Ok(())
}

fn ingest_messages<W: WorldInterface + ?Sized>(world: &mut W, tick: u64, config: &SwarmConfig) -> Reports {
    let mut reports = Reports::default();
    for message in world.drain_messages(config.messages.read_limit) {
        match message {
            Message::EnemyBaseSighting {
                position,
                health_bucket,
            } => {
                let table = world.table_mut();
                if table.enemy_base().is_none() {
                    info!(tick, x = position.x, y = position.y, "enemy base located");
                }
                table.set_enemy_base(position, tick);
                table.set_enemy_base_health(health_bucket as i32 * BASE_HEALTH_BUCKET);
            }
            Message::ThreatWarning { count, .. } => {
                let count = count as u32;
                reports.threat = Some(reports.threat.map_or(count, |c| c.max(count)));
            }
            Message::EnemySpotted { .. } => {
                if tick < config.phase.rush_window_end {
                    reports.early_sighting = true;
                }
            }
            Message::HazardBait { position } => {
                world.table_mut().set_hazard(position, tick);
            }
        }
    }
    reports
}

fn strike_adjacent<W: WorldInterface + ?Sized>(
    world: &mut W,
    hostiles: &[Entity],
    config: &SwarmConfig,
) -> Result<(), WorldError> {
    let me = world.position();
    let adjacent: Vec<Entity> = hostiles
        .iter()
        .filter(|h| me.is_adjacent(h.position))
        .copied()
        .collect();
    let focus = world.table().focus();
    if let Some(victim) = decision::select_attack(&adjacent, hostiles.len(), focus, &config.decision) {
        if world.can_act(Action::Attack, victim.position) {
            world.act(Action::Attack, victim.position)?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn try_spawn<W: WorldInterface + ?Sized>(
    state: &mut ControllerState,
    world: &mut W,
    phase: Phase,
    threat: u32,
    recovery: bool,
    forecast: Forecast,
    toward: Direction,
    config: &SwarmConfig,
) -> Result<(), WorldError> {
    let tick = world.tick();
    let inputs = SpawnInputs {
        tick,
        stock: world.stock(),
        cost: world.spawn_cost(),
        spawns: state.spawns,
        threat,
        phase,
        base_health: world.health(),
        recovery,
        forecast,
        fortifications: state.planner.placed(),
        fortification_done: state.planner.gave_up(),
        defense_timeout: config.phase.defense_timeout,
    };
    if let Err(block) = economy::spawn_gate(&inputs, &config.spawn) {
        if state.last_block != Some(block) {
            debug!(tick, ?block, stock = inputs.stock, "spawn held");
            state.last_block = Some(block);
        }
        return Ok(());
    }
    state.last_block = None;

    let me = world.position();
    let first = if toward == Direction::Center {
        Direction::North
    } else {
        toward
    };
    let mut dirs = vec![first];
    dirs.extend(COMPASS.iter().copied().filter(|d| *d != first));
    let Some(cell) = dirs
        .into_iter()
        .map(|d| me.add(d))
        .find(|cell| world.can_act(Action::Spawn, *cell))
    else {
        return Ok(());
    };
    world.act(Action::Spawn, cell)?;
    state.spawns += 1;
    world.table_mut().set_spawn_count(state.spawns);
    debug!(tick, spawns = state.spawns, x = cell.x, y = cell.y, "spawned worker");
    Ok(())
}
