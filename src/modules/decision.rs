//! Value-function target selection.
//!
//! Every tick a worker enumerates the candidates its role cares about, scores
//! them with `base * K / (K + d2 * weight)` plus flat bonuses, and follows the
//! single best one. Evaluation reads only its inputs; the per-agent caches
//! (hunt sector, exploration waypoint) are kept by the caller.

use crate::modules::config::{DecisionConfig, SwarmConfig};
use crate::modules::economy::Forecast;
use crate::modules::formation::{self, BlockingLine, GuardianOrder};
use crate::modules::geometry::{COMPASS, Direction, MapProfile, Position};
use crate::modules::phase::{AttackWindow, Phase};
use crate::modules::table::{FocusTarget, SharedTable};
use crate::modules::world::{AgentId, Entity, SenseFilter, WorldInterface};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Controller,
    Forager,
    Sentry,
    Guardian,
    Interceptor,
    Scout,
}

impl Role {
    /// Worker role assignment by id; stable for the agent's lifetime.
    pub fn for_id(id: AgentId) -> Role {
        match id % 100 {
            0..=54 => Role::Forager,
            55..=69 => Role::Sentry,
            70..=84 => Role::Guardian,
            85..=94 => Role::Interceptor,
            _ => Role::Scout,
        }
    }

    /// Sentries and interceptors forage while the colony recovers in calm.
    pub fn effective(self, recovery: bool, threat: u32) -> Role {
        match self {
            Role::Sentry | Role::Interceptor if recovery && threat <= 2 => Role::Forager,
            role => role,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Controller => "controller",
            Role::Forager => "forager",
            Role::Sentry => "sentry",
            Role::Guardian => "guardian",
            Role::Interceptor => "interceptor",
            Role::Scout => "scout",
        }
    }
}

/// Foragers that never stray far from base.
pub fn is_home_guard(id: AgentId) -> bool {
    id % 18 < 3
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    AttackController,
    AttackWorker,
    Collect,
    Deliver,
    ReturnToBase,
    HoldFormation,
    Intercept,
    Explore,
    Patrol,
    Flee,
    AttackEnemyBase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub kind: TargetKind,
    pub location: Position,
    pub score: i32,
    /// Allows stepping next to hazards on the way.
    pub urgent: bool,
}

impl Target {
    pub const fn new(kind: TargetKind, location: Position, score: i32) -> Self {
        Self {
            kind,
            location,
            score,
            urgent: false,
        }
    }

    pub const fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

/// Distance falloff shared by every candidate.
pub fn distance_score(base: i32, dist_sq: i32, config: &DecisionConfig) -> i32 {
    let denom = config.scale as i64 + dist_sq.max(0) as i64 * config.distance_weight as i64;
    (base as i64 * config.scale as i64 / denom.max(1)) as i32
}

/// Keeps the highest score; ties go to the candidate offered first.
#[derive(Default)]
struct Best(Option<Target>);

impl Best {
    fn offer(&mut self, candidate: Target) {
        if self.0.is_none_or(|best| candidate.score > best.score) {
            self.0 = Some(candidate);
        }
    }
}

/// What this agent sensed at the start of its tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Perception {
    pub id: AgentId,
    pub position: Position,
    pub health: i32,
    pub carried: u32,
    pub cargo_full: bool,
    pub tick: u64,
    pub map: MapProfile,
    pub hostile_workers: Vec<Entity>,
    pub hostile_controller: Option<Entity>,
    pub resources: Vec<Entity>,
    pub hazard: Option<Position>,
}

impl Perception {
    pub fn gather<W: WorldInterface + ?Sized>(world: &W, capacity: u32) -> Self {
        let hostiles = world.sense_all(SenseFilter::Hostile);
        let (controllers, workers): (Vec<Entity>, Vec<Entity>) =
            hostiles.into_iter().partition(|e| e.is_controller());
        let position = world.position();
        let hazard = world
            .sense_all(SenseFilter::Hazards)
            .into_iter()
            .map(|e| e.position)
            .min_by_key(|p| p.distance_squared(position));
        Self {
            id: world.agent_id(),
            position,
            health: world.health(),
            carried: world.carried(),
            cargo_full: world.carried() >= capacity,
            tick: world.tick(),
            map: world.map(),
            hostile_workers: workers,
            hostile_controller: controllers.into_iter().next(),
            resources: world.sense_all(SenseFilter::Resources),
            hazard,
        }
    }

    pub fn is_carrying(&self) -> bool {
        self.carried > 0
    }

    pub fn hostile_count(&self) -> usize {
        self.hostile_workers.len() + usize::from(self.hostile_controller.is_some())
    }

    pub fn nearest_resource(&self) -> Option<&Entity> {
        self.resources
            .iter()
            .min_by_key(|r| r.position.distance_squared(self.position))
    }
}

/// Colony-wide state as read back from the shared table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Colony {
    pub base: Position,
    pub enemy_base: Option<Position>,
    pub phase: Phase,
    pub threat: u32,
    pub stock: u32,
    pub recovery: bool,
    pub starvation: Forecast,
    pub base_health: i32,
    pub blocking_line: Option<BlockingLine>,
    pub focus: Option<FocusTarget>,
    pub attack_window: Option<AttackWindow>,
}

impl Colony {
    /// `None` until the controller has published the base position.
    pub fn from_table(table: &SharedTable, stock: u32) -> Option<Self> {
        Some(Self {
            base: table.own_base()?,
            enemy_base: table.enemy_base(),
            phase: table.phase(),
            threat: table.threat(),
            stock,
            recovery: table.recovery(),
            starvation: table.starvation(),
            base_health: table.base_health(),
            blocking_line: table.blocking_line(),
            focus: table.focus(),
            attack_window: table.attack_window(),
        })
    }

    fn striking(&self) -> bool {
        self.attack_window.is_some_and(AttackWindow::commits_strikers)
    }

    /// Best guess of the enemy base: the published sighting or the mirror image.
    pub fn enemy_base_guess(&self, map: MapProfile) -> Position {
        self.enemy_base.unwrap_or_else(|| map.mirror(self.base))
    }

    pub fn toward_enemy(&self, map: MapProfile) -> Direction {
        self.base.direction_to(self.enemy_base_guess(map))
    }
}

/// Cached waypoints the caller refreshes between ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Waypoints {
    pub hunt: Option<Position>,
    pub explore: Option<Position>,
}

pub struct DecisionContext<'a> {
    pub role: Role,
    pub perception: &'a Perception,
    pub colony: &'a Colony,
    pub waypoints: Waypoints,
    pub sentry_in_position: bool,
    pub config: &'a SwarmConfig,
}

impl DecisionContext<'_> {
    fn decision(&self) -> &DecisionConfig {
        &self.config.decision
    }

    fn dist_to_base(&self) -> i32 {
        self.perception.position.distance_squared(self.colony.base)
    }

    fn score(&self, base: i32, location: Position) -> i32 {
        distance_score(
            base,
            self.perception.position.distance_squared(location),
            self.decision(),
        )
    }

    fn economy_boost(&self) -> bool {
        self.colony.stock < self.decision().emergency_recall_stock || self.colony.recovery
    }

    fn return_home(&self, score: i32) -> Target {
        Target::new(TargetKind::ReturnToBase, self.colony.base, score)
    }
}

/// Picks the single best target for a worker.
pub fn choose_target(ctx: &DecisionContext<'_>) -> Target {
    if let Some(target) = override_target(ctx) {
        return target;
    }

    let role = ctx.role.effective(ctx.colony.recovery, ctx.colony.threat);
    let chosen = match role {
        Role::Controller => None,
        Role::Forager => Some(forager_target(ctx)),
        Role::Sentry => Some(sentry_target(ctx)),
        Role::Guardian => Some(guardian_target(ctx)),
        Role::Interceptor => Some(interceptor_target(ctx)),
        Role::Scout => Some(scout_target(ctx)),
    };

    match chosen {
        Some(target) if target.score > 0 => target,
        _ => ctx.return_home(0),
    }
}

/// Situations that pre-empt role logic, in priority order.
fn override_target(ctx: &DecisionContext<'_>) -> Option<Target> {
    let cfg = ctx.decision();
    let me = ctx.perception.position;
    let base = ctx.colony.base;

    if ctx.perception.health < cfg.wounded_health && ctx.dist_to_base() > cfg.wounded_return_sq {
        return Some(ctx.return_home(cfg.recall_score));
    }

    if let Some(hazard) = ctx.perception.hazard {
        if hazard.distance_squared(me) <= cfg.hazard_flee_sq {
            let away = match hazard.direction_to(me) {
                Direction::Center => me.direction_to(base),
                dir => dir,
            };
            let refuge = ctx.perception.map.clamp(me.step(away, 3));
            return Some(Target::new(TargetKind::Flee, refuge, cfg.recall_score));
        }
    }

    if let Some(line) = ctx.colony.blocking_line {
        let post = formation::blocker_post(
            ctx.perception.id,
            me,
            &line,
            ctx.colony.threat,
            &ctx.config.formation,
        );
        if let Some(post) = post {
            return Some(Target::new(TargetKind::HoldFormation, post, cfg.recall_score - 100));
        }
    }

    if ctx.role != Role::Guardian {
        let my_base_dist = ctx.dist_to_base();
        let bypass = ctx
            .perception
            .hostile_workers
            .iter()
            .filter(|h| {
                let to_base = h.position.distance_squared(base);
                h.position.distance_squared(me) > cfg.bypass_min_sq
                    && to_base < cfg.bypass_base_sq
                    && to_base < my_base_dist
            })
            .min_by_key(|h| h.position.distance_squared(base));
        if let Some(hostile) = bypass {
            let cut_off = hostile.position.midpoint(base);
            return Some(Target::new(TargetKind::Intercept, cut_off, cfg.recall_score).urgent());
        }
    }

    None
}

/// Squared roaming radius around base, or `None` when foragers may roam freely.
///
/// Recovery counts as an economy boost and keeps foragers closest to home; a
/// critically damaged base relaxes that slightly so deliveries still arrive.
pub fn leash_radius(perception: &Perception, colony: &Colony, config: &DecisionConfig) -> Option<i32> {
    let boost = colony.recovery || colony.stock < config.emergency_recall_stock;
    let base_critical =
        colony.base_health > 0 && colony.base_health < config.critical_base_health;
    let leash = if base_critical {
        config.critical_base_leash_sq
    } else if boost {
        config.boost_leash_sq
    } else if colony.phase == Phase::Attack && colony.stock < config.attack_leash_stock {
        config.attack_leash_sq
    } else {
        config.leash_sq
    };

    let unleashed = colony.stock < config.leash_removal_stock && !perception.is_carrying();
    let leash = if unleashed {
        None
    } else if perception.tick > config.late_tick {
        Some(leash.min(config.late_leash_sq))
    } else {
        Some(leash)
    };
    match (leash, perception.map.exploration_cap_sq()) {
        (Some(leash), Some(cap)) => Some(leash.min(cap)),
        (None, cap) => cap,
        (leash, None) => leash,
    }
}

fn delivery_target(ctx: &DecisionContext<'_>) -> Target {
    let cfg = ctx.decision();
    let dist = ctx.dist_to_base();
    let base_hurt = ctx.colony.base_health > 0 && ctx.colony.base_health < cfg.low_base_health;
    let forced = ctx.economy_boost()
        || base_hurt
        || ctx.colony.recovery
        || dist <= cfg.home_guard_radius_sq;
    let crisis = ctx.colony.stock < cfg.critical_stock || ctx.colony.starvation.critical;

    let mut target = if forced {
        let bonus = if dist < cfg.home_guard_radius_sq {
            cfg.forced_delivery_close_bonus
        } else {
            0
        };
        Target::new(TargetKind::Deliver, ctx.colony.base, cfg.forced_delivery + bonus)
    } else {
        Target::new(
            TargetKind::Deliver,
            ctx.colony.base,
            ctx.score(cfg.delivery_base, ctx.colony.base),
        )
    };
    if crisis {
        target = target.urgent();
    }
    target
}

fn offer_hostiles(ctx: &DecisionContext<'_>, best: &mut Best, worker_bonus: i32, controller_bonus: i32) {
    let cfg = ctx.decision();
    for hostile in &ctx.perception.hostile_workers {
        best.offer(Target::new(
            TargetKind::AttackWorker,
            hostile.position,
            ctx.score(cfg.enemy_worker_base + worker_bonus, hostile.position),
        ));
    }
    if let Some(controller) = ctx.perception.hostile_controller {
        best.offer(Target::new(
            TargetKind::AttackController,
            controller.position,
            ctx.score(cfg.enemy_worker_base + controller_bonus, controller.position),
        ));
    }
}

fn hunt_target(ctx: &DecisionContext<'_>, score: i32) -> Option<Target> {
    if let Some(resource) = ctx.perception.nearest_resource() {
        return Some(Target::new(TargetKind::Collect, resource.position, score));
    }
    ctx.waypoints
        .hunt
        .map(|hunt| Target::new(TargetKind::Explore, hunt, score))
}

fn forager_target(ctx: &DecisionContext<'_>) -> Target {
    let cfg = ctx.decision();
    let p = ctx.perception;
    let colony = ctx.colony;
    let dist = ctx.dist_to_base();

    if colony.stock < cfg.emergency_recall_stock || colony.starvation.warning {
        if colony.stock < cfg.critical_stock && !p.is_carrying() {
            if let Some(target) = hunt_target(ctx, cfg.recall_score) {
                return target;
            }
        } else if dist > cfg.home_guard_radius_sq {
            return ctx.return_home(cfg.recall_score);
        }
    }

    let mut best = Best::default();

    if is_home_guard(p.id) && dist > cfg.home_guard_radius_sq {
        best.offer(ctx.return_home(cfg.home_guard_score));
    }

    if p.is_carrying() {
        best.offer(delivery_target(ctx));
    }

    let window_bonus = if colony.attack_window.is_some() {
        cfg.attack_window_bonus
    } else {
        0
    };
    offer_hostiles(ctx, &mut best, 0, cfg.enemy_controller_bonus + window_bonus);

    if !p.cargo_full {
        let mut base_value = if colony.phase == Phase::Attack {
            cfg.resource_attack_base
        } else {
            cfg.resource_base
        };
        if colony.stock < cfg.emergency_recall_stock {
            base_value += cfg.economy_boost;
        }
        for resource in &p.resources {
            let mut value = base_value;
            if resource.position.distance_squared(colony.base) <= cfg.home_radius_sq {
                value += cfg.home_bonus;
            }
            best.offer(Target::new(
                TargetKind::Collect,
                resource.position,
                ctx.score(value, resource.position),
            ));
        }
    }

    if let Some(leash) = leash_radius(p, colony, cfg) {
        if dist > leash {
            return ctx.return_home(cfg.leash_score);
        }
    }

    if best.0.is_none() && colony.phase == Phase::Attack {
        match colony.enemy_base {
            Some(enemy) => best.offer(Target::new(
                TargetKind::AttackEnemyBase,
                enemy,
                ctx.score(cfg.enemy_base_score, enemy),
            )),
            None => {
                if let Some(explore) = ctx.waypoints.explore {
                    best.offer(Target::new(TargetKind::Explore, explore, cfg.enemy_base_score));
                }
            }
        }
    }

    if best.0.is_none() {
        match ctx.waypoints.hunt {
            Some(hunt) => best.offer(Target::new(TargetKind::Explore, hunt, 10)),
            None => best.offer(Target::new(TargetKind::Patrol, colony.base, 1)),
        }
    }

    best.0.unwrap_or_else(|| ctx.return_home(0))
}

fn sentry_target(ctx: &DecisionContext<'_>) -> Target {
    let cfg = ctx.decision();
    let p = ctx.perception;
    let mut best = Best::default();

    offer_hostiles(ctx, &mut best, cfg.sentry_bonus, cfg.sentry_controller_bonus);
    if p.is_carrying() {
        best.offer(delivery_target(ctx));
    }
    if !p.cargo_full {
        for resource in &p.resources {
            if resource.position.distance_squared(p.position) <= cfg.sentry_adjacent_resource_sq {
                best.offer(Target::new(
                    TargetKind::Collect,
                    resource.position,
                    ctx.score(cfg.resource_base, resource.position),
                ));
            }
        }
    }

    best.0.unwrap_or_else(|| {
        let post = formation::sentry_post(
            p.id,
            ctx.colony.base,
            ctx.colony.toward_enemy(p.map),
            p.map,
            &ctx.config.formation,
        );
        let location = if ctx.sentry_in_position { p.position } else { post };
        Target::new(TargetKind::HoldFormation, location, cfg.sentry_bonus)
    })
}

fn guardian_target(ctx: &DecisionContext<'_>) -> Target {
    let cfg = ctx.decision();
    let me = ctx.perception.position;
    let hostiles: Vec<Position> = ctx
        .perception
        .hostile_workers
        .iter()
        .map(|h| h.position)
        .collect();
    match formation::guardian_order(me, ctx.colony.base, &hostiles, &ctx.config.formation) {
        GuardianOrder::Intercept(hostile) => {
            Target::new(TargetKind::AttackWorker, hostile, cfg.recall_score).urgent()
        }
        GuardianOrder::Return => ctx.return_home(cfg.home_guard_score),
        GuardianOrder::StepOut(dir) => {
            Target::new(TargetKind::HoldFormation, me.add(dir), cfg.sentry_bonus)
        }
        GuardianOrder::Hold => Target::new(TargetKind::HoldFormation, me, cfg.sentry_bonus),
    }
}

fn interceptor_target(ctx: &DecisionContext<'_>) -> Target {
    let cfg = ctx.decision();
    let p = ctx.perception;

    if ctx.colony.threat >= cfg.interceptor_return_threat {
        return ctx.return_home(cfg.recall_score - 200);
    }

    let nearest = p
        .hostile_workers
        .iter()
        .chain(p.hostile_controller.iter())
        .filter(|h| h.position.distance_squared(p.position) <= cfg.interceptor_engage_sq)
        .min_by_key(|h| h.position.distance_squared(p.position));
    if let Some(hostile) = nearest {
        return Target::new(
            TargetKind::Intercept,
            hostile.position,
            ctx.score(cfg.enemy_worker_base + cfg.enemy_controller_bonus, hostile.position),
        );
    }

    if p.is_carrying() {
        return delivery_target(ctx);
    }

    let toward = ctx.colony.toward_enemy(p.map);
    let patrol = p.map.clamp(ctx.colony.base.step(toward, cfg.interceptor_patrol));
    Target::new(TargetKind::Patrol, patrol, cfg.enemy_base_score)
}

fn scout_target(ctx: &DecisionContext<'_>) -> Target {
    let cfg = ctx.decision();
    let p = ctx.perception;

    if let Some(controller) = p.hostile_controller {
        return Target::new(TargetKind::AttackController, controller.position, cfg.recall_score);
    }

    if ctx.colony.phase == Phase::Attack || ctx.colony.striking() {
        match (ctx.colony.enemy_base, ctx.waypoints.explore) {
            (Some(enemy), _) => {
                return Target::new(TargetKind::AttackEnemyBase, enemy, cfg.scout_enemy_base_score);
            }
            (None, Some(explore)) => {
                return Target::new(TargetKind::Explore, explore, cfg.scout_explore_score);
            }
            (None, None) => {}
        }
    }

    let target = forager_target(ctx);
    if target.kind == TargetKind::Patrol {
        if let Some(resource) = p.nearest_resource() {
            return Target::new(
                TargetKind::Collect,
                resource.position,
                ctx.score(cfg.resource_base, resource.position),
            );
        }
    }
    target
}

/// Chooses what to hit among adjacent hostiles.
///
/// `visible` is the number of hostiles sensed this tick; a crowd makes the
/// weakest worker worth finishing first.
pub fn select_attack<'a>(
    attackable: &'a [Entity],
    visible: usize,
    focus: Option<FocusTarget>,
    config: &DecisionConfig,
) -> Option<&'a Entity> {
    if let Some(controller) = attackable.iter().find(|e| e.is_controller()) {
        return Some(controller);
    }

    let weakest = if visible >= config.swarm_threshold {
        attackable
            .iter()
            .filter(|e| !e.is_controller())
            .min_by_key(|e| e.health)
            .map(|e| e.id)
    } else {
        None
    };

    let mut best: Option<(&Entity, i32)> = None;
    for hostile in attackable {
        let mut score = 1000 - hostile.health;
        if weakest == Some(hostile.id) {
            score += config.swarm_bonus;
        }
        if let Some(focus) = focus {
            if focus.matches(hostile.id) {
                if focus.health <= config.finishing_health {
                    score -= config.overkill_penalty;
                } else {
                    score += config.focus_bonus;
                }
            }
        }
        if hostile.health <= config.finishing_health {
            score += config.finishing_bonus;
        }
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((hostile, score));
        }
    }
    best.map(|(entity, _)| entity)
}

/// Target the controller asks every worker to converge on.
pub fn pick_focus(hostiles: &[Entity], config: &DecisionConfig) -> Option<(AgentId, i32)> {
    if hostiles.len() >= config.swarm_threshold {
        if let Some(weakest) = hostiles
            .iter()
            .filter(|e| !e.is_controller())
            .min_by_key(|e| e.health)
        {
            return Some((weakest.id, weakest.health));
        }
    }
    hostiles
        .iter()
        .max_by_key(|e| {
            let weight = if e.is_controller() { 10_000 } else { 1000 };
            // Ties resolve to the lowest id.
            (weight - e.health, std::cmp::Reverse(e.id))
        })
        .map(|e| (e.id, e.health))
}

/// Hit-and-run cycle for melee engagements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KitePhase {
    #[default]
    Approach,
    Attack,
    Retreat {
        remaining: u8,
    },
}

impl KitePhase {
    pub fn advance(self, dist_sq: i32, attacked: bool, health: i32, config: &DecisionConfig) -> KitePhase {
        match self {
            KitePhase::Approach | KitePhase::Attack if attacked => KitePhase::Retreat {
                remaining: if health < config.kite_retreat_health { 2 } else { 1 },
            },
            KitePhase::Approach | KitePhase::Attack => {
                if dist_sq <= config.engage_sq {
                    KitePhase::Attack
                } else {
                    KitePhase::Approach
                }
            }
            KitePhase::Retreat { remaining } if remaining > 1 => KitePhase::Retreat {
                remaining: remaining - 1,
            },
            KitePhase::Retreat { .. } => KitePhase::Approach,
        }
    }
}

/// Exploration goal for an id: one of four mirror images of the own base.
pub fn exploration_waypoint(id: AgentId, base: Position, map: MapProfile) -> Position {
    let waypoint = match id % 4 {
        0 => map.mirror(base),
        1 => Position::new(map.width - base.x - 1, base.y),
        2 => Position::new(base.x, map.height - base.y - 1),
        _ => map.center(),
    };
    map.clamp(waypoint)
}

/// Rotating resource-hunt sector around base, refreshed on a timer or on arrival.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HuntSector {
    sector: Option<usize>,
    target: Option<Position>,
    chosen_at: u64,
}

impl HuntSector {
    pub fn target(&self) -> Option<Position> {
        self.target
    }

    pub fn refresh(
        &mut self,
        id: AgentId,
        me: Position,
        base: Position,
        tick: u64,
        map: MapProfile,
        config: &DecisionConfig,
    ) -> Position {
        let stale = tick.saturating_sub(self.chosen_at) >= config.hunt_refresh_ticks;
        match self.target {
            Some(target) if !stale && me.distance_squared(target) > config.hunt_arrival_sq => target,
            _ => {
                let sector = match self.sector {
                    Some(previous) => (previous + 1) % COMPASS.len(),
                    None => (id % COMPASS.len() as u64) as usize,
                };
                let radius = (map.width / 3).max(12);
                let target = map.clamp(base.step(COMPASS[sector], radius));
                self.sector = Some(sector);
                self.target = Some(target);
                self.chosen_at = tick;
                target
            }
        }
    }
}
