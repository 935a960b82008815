//! Per-tick routine for workers.

use tracing::{debug, trace};

use crate::modules::config::SwarmConfig;
use crate::modules::decision::{
    self, Colony, DecisionContext, HuntSector, KitePhase, Perception, Role, Target, TargetKind,
    Waypoints,
};
use crate::modules::error::WorldError;
use crate::modules::formation;
use crate::modules::geometry::{COMPASS, Position};
use crate::modules::message::{Message, SendThrottle};
use crate::modules::pathing::{PathSeeker, SeekOutcome};
use crate::modules::world::{Action, Entity, WorldInterface};

/// Captives are dropped once the carrier is this close to base.
const RELEASE_NEAR_BASE_SQ: i32 = 8;

#[derive(Clone, Debug)]
pub struct WorkerState {
    role: Role,
    seeker: PathSeeker,
    kite: KitePhase,
    hunt: HuntSector,
    explore: Option<Position>,
    sentry_in_position: bool,
    throttle: SendThrottle,
    /// Enemy base learned from messages before the controller republished it.
    enemy_base: Option<Position>,
    held_since: Option<u64>,
    last_target: Option<Target>,
}

impl WorkerState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            seeker: PathSeeker::new(),
            kite: KitePhase::default(),
            hunt: HuntSector::default(),
            explore: None,
            sentry_in_position: false,
            throttle: SendThrottle::default(),
            enemy_base: None,
            held_since: None,
            last_target: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn last_target(&self) -> Option<Target> {
        self.last_target
    }

    pub fn seeker(&self) -> &PathSeeker {
        &self.seeker
    }
}

pub fn worker_tick<W: WorldInterface + ?Sized>(
    state: &mut WorkerState,
    world: &mut W,
    config: &SwarmConfig,
) -> Result<(), WorldError> {
    let tick = world.tick();
    let Some(mut colony) = Colony::from_table(world.table(), world.stock()) else {
        trace!(agent = world.agent_id(), "no base published yet");
        return Ok(());
    };

    for message in world.drain_messages(config.messages.read_limit) {
        if let Message::EnemyBaseSighting { position, .. } = message {
            state.enemy_base = Some(position);
        }
    }
    if colony.enemy_base.is_none() {
        colony.enemy_base = state.enemy_base;
    }

    let capacity = world.carry_capacity();
    let perception = Perception::gather(&*world, capacity);
    let first = immediate_actions(state, world, &perception, &colony, config)?;
    let attacked = first == Some(Action::Attack);
    let mut acted = first.is_some();

    let target = if world.holding().is_some() {
        acted |= release_captive(state, world, &colony, config)?;
        Target::new(TargetKind::ReturnToBase, colony.base, config.decision.recall_score)
    } else {
        let waypoints = refresh_waypoints(state, &perception, &colony, config);
        let ring = formation::sentry_ring(perception.map);
        state.sentry_in_position = ring.band.in_position(
            perception.position.distance_squared(colony.base),
            state.sentry_in_position,
        );
        decision::choose_target(&DecisionContext {
            role: state.role,
            perception: &perception,
            colony: &colony,
            waypoints,
            sentry_in_position: state.sentry_in_position,
            config,
        })
    };
    if state.last_target.map(|t| t.kind) != Some(target.kind) {
        debug!(
            tick,
            agent = perception.id,
            role = state.role.label(),
            kind = ?target.kind,
            x = target.location.x,
            y = target.location.y,
            score = target.score,
            "target changed"
        );
    }
    state.last_target = Some(target);

    move_toward(state, world, &perception, target, attacked, config)?;

    if !acted {
        let after = Perception::gather(&*world, capacity);
        immediate_actions(state, world, &after, &colony, config)?;
    }

    send_report(state, world, &perception, &colony, config);
    Ok(())
}

fn refresh_waypoints(
    state: &mut WorkerState,
    perception: &Perception,
    colony: &Colony,
    config: &SwarmConfig,
) -> Waypoints {
    let hunt = state.hunt.refresh(
        perception.id,
        perception.position,
        colony.base,
        perception.tick,
        perception.map,
        &config.decision,
    );
    let explore = *state
        .explore
        .get_or_insert_with(|| decision::exploration_waypoint(perception.id, colony.base, perception.map));
    Waypoints {
        hunt: Some(hunt),
        explore: Some(explore),
    }
}

/// Attack, capture, deliver or collect, whichever applies first.
fn immediate_actions<W: WorldInterface + ?Sized>(
    state: &mut WorkerState,
    world: &mut W,
    perception: &Perception,
    colony: &Colony,
    config: &SwarmConfig,
) -> Result<Option<Action>, WorldError> {
    let me = world.position();
    let cfg = &config.decision;

    let adjacent: Vec<Entity> = perception
        .hostile_workers
        .iter()
        .chain(perception.hostile_controller.iter())
        .filter(|e| me.is_adjacent(e.position))
        .copied()
        .collect();
    if let Some(victim) = decision::select_attack(&adjacent, perception.hostile_count(), colony.focus, cfg) {
        let free_handed = !perception.is_carrying() && world.holding().is_none();
        if free_handed
            && !victim.is_controller()
            && victim.health < perception.health
            && world.can_act(Action::Capture, victim.position)
        {
            world.act(Action::Capture, victim.position)?;
            state.held_since = Some(perception.tick);
            debug!(tick = perception.tick, agent = perception.id, captive = victim.id, "captured");
            return Ok(Some(Action::Capture));
        }
        if world.can_act(Action::Attack, victim.position) {
            world.act(Action::Attack, victim.position)?;
            return Ok(Some(Action::Attack));
        }
    }

    if world.carried() > 0
        && me.distance_squared(colony.base) <= cfg.delivery_range_sq
        && world.can_act(Action::Deliver, colony.base)
    {
        world.act(Action::Deliver, colony.base)?;
        return Ok(Some(Action::Deliver));
    }

    if world.carried() < world.carry_capacity() {
        let resource = perception
            .resources
            .iter()
            .filter(|r| me.is_adjacent(r.position))
            .find(|r| world.can_act(Action::Collect, r.position));
        if let Some(resource) = resource {
            world.act(Action::Collect, resource.position)?;
            return Ok(Some(Action::Collect));
        }
    }

    Ok(None)
}

/// Drops a held captive next to base, or anywhere once held too long.
fn release_captive<W: WorldInterface + ?Sized>(
    state: &mut WorkerState,
    world: &mut W,
    colony: &Colony,
    config: &SwarmConfig,
) -> Result<bool, WorldError> {
    let tick = world.tick();
    let me = world.position();
    let since = *state.held_since.get_or_insert(tick);
    let near_base = me.distance_squared(colony.base) <= RELEASE_NEAR_BASE_SQ;
    if !near_base && tick.saturating_sub(since) < config.decision.capture_hold_ticks {
        return Ok(false);
    }
    let Some(cell) = COMPASS
        .iter()
        .map(|dir| me.add(*dir))
        .find(|cell| world.can_act(Action::Release, *cell))
    else {
        return Ok(false);
    };
    world.act(Action::Release, cell)?;
    state.held_since = None;
    debug!(tick, agent = world.agent_id(), x = cell.x, y = cell.y, "captive released");
    Ok(true)
}

fn move_toward<W: WorldInterface + ?Sized>(
    state: &mut WorkerState,
    world: &mut W,
    perception: &Perception,
    target: Target,
    attacked: bool,
    config: &SwarmConfig,
) -> Result<(), WorldError> {
    let me = world.position();
    let holding_post = target.kind == TargetKind::HoldFormation
        && (target.location == me || (state.role == Role::Sentry && state.sentry_in_position));
    if holding_post || target.location == me {
        return Ok(());
    }

    let engaging = matches!(
        target.kind,
        TargetKind::AttackWorker | TargetKind::AttackController | TargetKind::Intercept
    );
    let goal = if engaging && !target.urgent {
        state.kite = state.kite.advance(
            me.distance_squared(target.location),
            attacked,
            perception.health,
            &config.decision,
        );
        match state.kite {
            KitePhase::Retreat { .. } => {
                let away = target.location.direction_to(me);
                perception.map.clamp(me.step(away, 2))
            }
            KitePhase::Approach | KitePhase::Attack => target.location,
        }
    } else {
        state.kite = KitePhase::Approach;
        target.location
    };

    // Melee targets occupy their cell; stop once adjacent.
    if engaging && goal == target.location && me.is_adjacent(goal) {
        return Ok(());
    }
    if matches!(target.kind, TargetKind::Deliver | TargetKind::ReturnToBase)
        && me.is_adjacent(target.location)
    {
        return Ok(());
    }

    let outcome = state.seeker.seek(world, goal, target.urgent)?;
    if outcome == SeekOutcome::Blocked {
        trace!(agent = perception.id, ?goal, "seek blocked");
    }
    Ok(())
}

/// Sends at most one report, highest priority first.
fn send_report<W: WorldInterface + ?Sized>(
    state: &mut WorkerState,
    world: &mut W,
    perception: &Perception,
    colony: &Colony,
    config: &SwarmConfig,
) {
    let tick = perception.tick;
    let base = colony.base;
    let mut candidates = Vec::with_capacity(4);

    if let Some(controller) = perception.hostile_controller {
        candidates.push(Message::enemy_base(controller.position, controller.health));
    }
    let nearest = perception
        .hostile_workers
        .iter()
        .chain(perception.hostile_controller.iter())
        .min_by_key(|h| h.position.distance_squared(base));
    if let Some(hostile) = nearest {
        let count = perception.hostile_count();
        if hostile.position.distance_squared(base) <= config.formation.block_trigger_dist_sq {
            candidates.push(Message::threat(hostile.position, count));
        }
        if tick < config.phase.rush_window_end {
            candidates.push(Message::spotted(hostile.position, count));
        }
    }
    if let Some(hazard) = perception.hazard {
        if hazard.distance_squared(base) <= config.decision.hazard_report_sq {
            candidates.push(Message::HazardBait { position: hazard });
        }
    }

    let Some(message) = candidates
        .into_iter()
        .find(|m| state.throttle.allows(m.kind(), tick, &config.messages))
    else {
        return;
    };
    if world.send_message(message) {
        state.throttle.record(message.kind(), tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::MockWorld;
    use crate::modules::world::{EntityKind, Team};

    #[test]
    fn forager_walks_to_and_collects_nearby_resource() {
        let mut world = MockWorld::worker(10, Position::new(12, 10));
        world.table.set_own_base(Position::new(10, 10));
        world.stock = 2000;
        world.add_resource(Position::new(15, 10));
        let config = SwarmConfig::default();
        let mut state = WorkerState::new(Role::Forager);

        worker_tick(&mut state, &mut world, &config).unwrap();
        assert_eq!(world.position, Position::new(13, 10));
        worker_tick(&mut state, &mut world, &config).unwrap();
        assert_eq!(world.position, Position::new(14, 10));
        assert_eq!(world.carried, 10, "collects once adjacent after moving");
        assert_eq!(state.last_target().map(|t| t.kind), Some(TargetKind::Collect));
    }

    #[test]
    fn carrier_delivers_at_base() {
        let mut world = MockWorld::worker(10, Position::new(12, 10));
        world.table.set_own_base(Position::new(10, 10));
        world.stock = 2000;
        world.carried = 10;
        let config = SwarmConfig::default();
        let mut state = WorkerState::new(Role::Forager);

        worker_tick(&mut state, &mut world, &config).unwrap();
        assert_eq!(world.carried, 0);
        assert_eq!(world.stock, 2010);
    }

    #[test]
    fn worker_waits_for_published_base() {
        let mut world = MockWorld::worker(10, Position::new(12, 10));
        let config = SwarmConfig::default();
        let mut state = WorkerState::new(Role::Forager);
        worker_tick(&mut state, &mut world, &config).unwrap();
        assert_eq!(world.position, Position::new(12, 10));
        assert!(world.acts.is_empty());
    }

    #[test]
    fn sighting_the_enemy_controller_sends_one_report() {
        let mut world = MockWorld::worker(99, Position::new(30, 30));
        world.table.set_own_base(Position::new(5, 5));
        world.stock = 2000;
        world.tick = 100;
        world.add_hostile(EntityKind::Controller, Team::Blue, Position::new(33, 30), 500);
        let config = SwarmConfig::default();
        let mut state = WorkerState::new(Role::Scout);

        worker_tick(&mut state, &mut world, &config).unwrap();
        assert_eq!(world.sent.len(), 1);
        assert!(matches!(world.sent[0], Message::EnemyBaseSighting { .. }));

        world.tick = 101;
        worker_tick(&mut state, &mut world, &config).unwrap();
        assert_eq!(world.sent.len(), 1, "throttled on the next tick");
    }
}
