use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::modules::config::{PhaseConfig, StrategyConfig};
use crate::modules::geometry::{MapClass, MapProfile};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Buildup,
    Defense,
    Attack,
}

impl Phase {
    pub const fn code(self) -> u16 {
        match self {
            Phase::Buildup => 1,
            Phase::Defense => 2,
            Phase::Attack => 3,
        }
    }

    pub const fn from_code(code: u16) -> Option<Phase> {
        match code {
            1 => Some(Phase::Buildup),
            2 => Some(Phase::Defense),
            3 => Some(Phase::Attack),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Phase::Buildup => "buildup",
            Phase::Defense => "defense",
            Phase::Attack => "attack",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What the opponent appears to be doing, judged from the controller's sightings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpponentProfile {
    #[default]
    Unknown,
    Rushing,
    Turtling,
    Balanced,
    Desperate,
}

impl OpponentProfile {
    pub const fn code(self) -> u16 {
        match self {
            OpponentProfile::Unknown => 0,
            OpponentProfile::Rushing => 1,
            OpponentProfile::Turtling => 2,
            OpponentProfile::Balanced => 3,
            OpponentProfile::Desperate => 4,
        }
    }

    pub const fn from_code(code: u16) -> Option<OpponentProfile> {
        match code {
            0 => Some(OpponentProfile::Unknown),
            1 => Some(OpponentProfile::Rushing),
            2 => Some(OpponentProfile::Turtling),
            3 => Some(OpponentProfile::Balanced),
            4 => Some(OpponentProfile::Desperate),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            OpponentProfile::Unknown => "unknown",
            OpponentProfile::Rushing => "rushing",
            OpponentProfile::Turtling => "turtling",
            OpponentProfile::Balanced => "balanced",
            OpponentProfile::Desperate => "desperate",
        }
    }
}

impl fmt::Display for OpponentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// An opening for offense. Listed in detection priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackWindow {
    WoundedBase,
    PostRush,
    ArmyAdvantage,
    Economy,
    TurtlePunish,
    LateGame,
}

impl AttackWindow {
    pub const fn code(self) -> u16 {
        match self {
            AttackWindow::PostRush => 1,
            AttackWindow::Economy => 2,
            AttackWindow::WoundedBase => 3,
            AttackWindow::ArmyAdvantage => 4,
            AttackWindow::LateGame => 5,
            AttackWindow::TurtlePunish => 6,
        }
    }

    /// Zero is "no window"; unknown codes read the same way.
    pub const fn from_code(code: u16) -> Option<AttackWindow> {
        match code {
            1 => Some(AttackWindow::PostRush),
            2 => Some(AttackWindow::Economy),
            3 => Some(AttackWindow::WoundedBase),
            4 => Some(AttackWindow::ArmyAdvantage),
            5 => Some(AttackWindow::LateGame),
            6 => Some(AttackWindow::TurtlePunish),
            _ => None,
        }
    }

    /// Windows strong enough to send strikers before the attack round.
    pub const fn commits_strikers(self) -> bool {
        matches!(
            self,
            AttackWindow::WoundedBase | AttackWindow::PostRush | AttackWindow::ArmyAdvantage
        )
    }
}

/// One tick of controller sensing, as fed to the opponent model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sightings {
    pub tick: u64,
    /// Hostiles inside the near-base radius.
    pub near_base: u32,
    /// Every hostile the controller senses.
    pub visible: u32,
    pub enemy_base_health: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowInputs {
    pub tick: u64,
    pub base_health: i32,
    pub stock: u32,
    /// Friendly workers minus hostile workers in sensing range.
    pub army_advantage: i32,
    pub near_base: u32,
    pub threat: u32,
    pub enemy_base_health: Option<i32>,
}

/// Classifies the opponent from cumulative sightings and tracks whether a
/// rush was weathered.
#[derive(Clone, Debug, Default)]
pub struct OpponentModel {
    profile: OpponentProfile,
    near_base_total: u32,
    seen_total: u32,
    rush_survived_at: Option<u64>,
    window: Option<AttackWindow>,
}

impl OpponentModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self) -> OpponentProfile {
        self.profile
    }

    pub fn window(&self) -> Option<AttackWindow> {
        self.window
    }

    pub fn rush_survived_at(&self) -> Option<u64> {
        self.rush_survived_at
    }

    pub fn recently_rushed(&self, tick: u64, config: &StrategyConfig) -> bool {
        self.rush_survived_at
            .is_some_and(|at| tick.saturating_sub(at) <= config.post_rush_ticks)
    }

    /// Sightings accumulate across ticks, so one lingering hostile counts once
    /// per tick it stays in view.
    pub fn classify(&mut self, sightings: &Sightings, config: &StrategyConfig) -> OpponentProfile {
        self.near_base_total = self.near_base_total.saturating_add(sightings.near_base);
        self.seen_total = self.seen_total.saturating_add(sightings.visible);

        let mut next = self.profile;
        if sightings.tick <= config.rush_detection_tick {
            if self.near_base_total >= config.rush_hostiles {
                next = OpponentProfile::Rushing;
            }
        } else if sightings.tick >= config.turtle_detection_tick
            && self.profile == OpponentProfile::Unknown
        {
            next = if self.seen_total < config.turtle_hostiles {
                OpponentProfile::Turtling
            } else {
                OpponentProfile::Balanced
            };
        }
        if sightings
            .enemy_base_health
            .is_some_and(|hp| hp > 0 && hp < config.desperate_base_health)
        {
            next = OpponentProfile::Desperate;
        }

        if self.profile == OpponentProfile::Rushing
            && sightings.near_base == 0
            && sightings.tick > config.rush_detection_tick
            && self.rush_survived_at.is_none()
        {
            self.rush_survived_at = Some(sightings.tick);
            info!(tick = sightings.tick, "rush weathered");
        }

        if next != self.profile {
            info!(tick = sightings.tick, from = %self.profile, to = %next, "opponent classified");
            self.profile = next;
        }
        next
    }

    pub fn detect_window(
        &mut self,
        inputs: &WindowInputs,
        strategy: &StrategyConfig,
        phase: &PhaseConfig,
    ) -> Option<AttackWindow> {
        let window = attack_window(
            inputs,
            self.profile,
            self.recently_rushed(inputs.tick, strategy),
            strategy,
            phase,
        );
        if window != self.window {
            debug!(tick = inputs.tick, from = ?self.window, to = ?window, "attack window");
            self.window = window;
        }
        window
    }
}

/// The highest-priority open window, or `None`. Every window is closed while
/// the base is under heavy pressure.
pub fn attack_window(
    inputs: &WindowInputs,
    profile: OpponentProfile,
    recently_rushed: bool,
    strategy: &StrategyConfig,
    phase: &PhaseConfig,
) -> Option<AttackWindow> {
    if inputs.near_base >= strategy.emergency_hostiles || inputs.threat >= phase.force_defense {
        return None;
    }
    let wounded = inputs
        .enemy_base_health
        .is_some_and(|hp| hp > 0 && hp < strategy.wounded_base_health);
    if wounded {
        Some(AttackWindow::WoundedBase)
    } else if recently_rushed && inputs.near_base == 0 {
        Some(AttackWindow::PostRush)
    } else if inputs.army_advantage >= strategy.army_advantage
        && inputs.base_health > strategy.army_min_base_health
    {
        Some(AttackWindow::ArmyAdvantage)
    } else if inputs.stock >= strategy.economy_stock
        && inputs.base_health > strategy.economy_min_base_health
    {
        Some(AttackWindow::Economy)
    } else if profile == OpponentProfile::Turtling && inputs.tick > strategy.turtle_punish_tick {
        Some(AttackWindow::TurtlePunish)
    } else if inputs.tick >= strategy.late_game_tick {
        Some(AttackWindow::LateGame)
    } else {
        None
    }
}

/// Fortification progress as seen by the phase machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefenseReadiness {
    pub fortifications: u32,
    pub gave_up: bool,
    pub stalled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseInputs {
    pub tick: u64,
    pub hostiles: u32,
    pub threat: u32,
    pub spawn_count: u32,
    pub readiness: DefenseReadiness,
    pub window: Option<AttackWindow>,
}

/// Tick from which the colony may switch to attack, scaled by map size.
pub fn attack_round(map: MapProfile, config: &PhaseConfig) -> u64 {
    let diagonal = map.diagonal().max(0) as u64;
    match map.class() {
        MapClass::Small => config.small_map_attack_round,
        MapClass::Medium => config.attack_round_base + diagonal / 3,
        MapClass::Large => config.attack_round_base + diagonal / 2,
    }
}

#[derive(Clone, Debug)]
pub struct PhaseMachine {
    phase: Phase,
    rush_detected: bool,
    attack_round: u64,
}

impl PhaseMachine {
    pub fn new(map: MapProfile, config: &PhaseConfig) -> Self {
        Self {
            phase: Phase::Buildup,
            rush_detected: false,
            attack_round: attack_round(map, config),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rush_detected(&self) -> bool {
        self.rush_detected
    }

    pub fn attack_round(&self) -> u64 {
        self.attack_round
    }

    /// Latches the rush flag if the report arrives inside the early window.
    pub fn note_early_hostiles(&mut self, tick: u64, config: &PhaseConfig) {
        if tick < config.rush_window_end && !self.rush_detected {
            self.rush_detected = true;
            info!(tick, "rush detected");
        }
    }

    pub fn update(&mut self, inputs: &PhaseInputs, config: &PhaseConfig) -> Phase {
        if inputs.hostiles > 0 {
            self.note_early_hostiles(inputs.tick, config);
        }

        let next = self.next_phase(inputs, config);
        if next != self.phase {
            info!(
                tick = inputs.tick,
                from = %self.phase,
                to = %next,
                threat = inputs.threat,
                hostiles = inputs.hostiles,
                "phase change"
            );
            self.phase = next;
        }
        next
    }

    fn next_phase(&self, inputs: &PhaseInputs, config: &PhaseConfig) -> Phase {
        let stay_defensive = self.rush_detected
            && inputs.tick < config.rush_window_end + config.rush_response_ticks;
        let force_defense = inputs.threat >= config.force_defense;
        let opening = inputs.window.is_some_and(AttackWindow::commits_strikers);
        let attack_ready = !stay_defensive
            && defense_ready(inputs, config)
            && (inputs.tick >= self.attack_round
                || inputs.spawn_count >= config.attack_spawn_count
                || opening);

        match self.phase {
            Phase::Buildup => {
                if force_defense {
                    Phase::Defense
                } else if attack_ready {
                    Phase::Attack
                } else if inputs.hostiles >= config.defense_trigger || self.rush_detected {
                    Phase::Defense
                } else {
                    Phase::Buildup
                }
            }
            Phase::Defense => {
                if force_defense {
                    Phase::Defense
                } else if inputs.hostiles == 0 && !stay_defensive {
                    Phase::Buildup
                } else if attack_ready {
                    Phase::Attack
                } else {
                    Phase::Defense
                }
            }
            Phase::Attack => {
                if force_defense {
                    Phase::Defense
                } else {
                    Phase::Attack
                }
            }
        }
    }
}

fn defense_ready(inputs: &PhaseInputs, config: &PhaseConfig) -> bool {
    let readiness = inputs.readiness;
    let stalled_early = readiness.stalled
        && readiness.fortifications < config.stall_fortification_floor
        && inputs.tick < config.defense_timeout
        && !readiness.gave_up;
    if stalled_early {
        return false;
    }
    readiness.fortifications >= config.min_fortifications
        || inputs.tick >= config.defense_timeout
        || readiness.gave_up
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(tick: u64, hostiles: u32, threat: u32) -> PhaseInputs {
        PhaseInputs {
            tick,
            hostiles,
            threat,
            spawn_count: 0,
            readiness: DefenseReadiness {
                fortifications: 4,
                gave_up: false,
                stalled: false,
            },
            window: None,
        }
    }

    fn large_map_machine(config: &PhaseConfig) -> PhaseMachine {
        PhaseMachine::new(MapProfile::new(60, 60), config)
    }

    #[test]
    fn forced_defense_from_attack_ignores_round() {
        let config = PhaseConfig {
            force_defense: 5,
            ..PhaseConfig::default()
        };
        let mut machine = large_map_machine(&config);
        machine.phase = Phase::Attack;

        for tick in [35, 400, 1999] {
            machine.phase = Phase::Attack;
            let next = machine.update(&inputs(tick, 6, 6), &config);
            assert_eq!(next, Phase::Defense, "tick {tick}");
        }
    }

    #[test]
    fn attack_waits_for_round_or_spawns() {
        let config = PhaseConfig::default();
        let mut machine = large_map_machine(&config);
        let round = machine.attack_round();
        assert_eq!(round, 50 + 84 / 2);

        assert_eq!(machine.update(&inputs(round - 1, 0, 0), &config), Phase::Buildup);
        assert_eq!(machine.update(&inputs(round, 0, 0), &config), Phase::Attack);

        let mut eager = large_map_machine(&config);
        let mut early = inputs(40, 0, 0);
        early.spawn_count = config.attack_spawn_count;
        assert_eq!(eager.update(&early, &config), Phase::Attack);
    }

    #[test]
    fn early_hostiles_latch_rush_and_hold_defense() {
        let config = PhaseConfig::default();
        let mut machine = large_map_machine(&config);

        assert_eq!(machine.update(&inputs(10, 1, 1), &config), Phase::Defense);
        assert!(machine.rush_detected());

        // Hostiles gone, but the rush window keeps the colony defensive.
        assert_eq!(machine.update(&inputs(40, 0, 0), &config), Phase::Defense);
        assert_eq!(machine.update(&inputs(59, 0, 0), &config), Phase::Defense);
        assert_eq!(machine.update(&inputs(60, 0, 0), &config), Phase::Buildup);
        assert!(machine.rush_detected(), "rush flag never clears");
    }

    #[test]
    fn late_hostiles_do_not_latch_rush() {
        let config = PhaseConfig::default();
        let mut machine = large_map_machine(&config);
        assert_eq!(machine.update(&inputs(31, 1, 1), &config), Phase::Buildup);
        assert!(!machine.rush_detected());
        assert_eq!(machine.update(&inputs(32, 2, 2), &config), Phase::Defense);
    }

    #[test]
    fn stalled_placement_blocks_attack_until_timeout() {
        let config = PhaseConfig::default();
        let mut machine = PhaseMachine::new(MapProfile::new(30, 30), &config);
        let mut stalled = inputs(12, 0, 0);
        stalled.spawn_count = config.attack_spawn_count;
        stalled.readiness = DefenseReadiness {
            fortifications: 3,
            gave_up: false,
            stalled: true,
        };
        assert_eq!(machine.update(&stalled, &config), Phase::Buildup);

        stalled.readiness.gave_up = true;
        assert_eq!(machine.update(&stalled, &config), Phase::Attack);
    }

    #[test]
    fn defense_returns_to_buildup_when_clear() {
        let config = PhaseConfig::default();
        let mut machine = large_map_machine(&config);
        assert_eq!(machine.update(&inputs(70, 3, 3), &config), Phase::Defense);
        assert_eq!(machine.update(&inputs(71, 0, 2), &config), Phase::Buildup);
    }

    #[test]
    fn striking_window_opens_attack_before_the_round() {
        let config = PhaseConfig::default();
        let mut machine = large_map_machine(&config);
        let mut early = inputs(70, 0, 0);
        early.window = Some(AttackWindow::Economy);
        assert_eq!(machine.update(&early, &config), Phase::Buildup);

        early.window = Some(AttackWindow::WoundedBase);
        assert_eq!(machine.update(&early, &config), Phase::Attack);
    }

    fn sightings(tick: u64, near_base: u32, visible: u32) -> Sightings {
        Sightings {
            tick,
            near_base,
            visible,
            enemy_base_health: None,
        }
    }

    #[test]
    fn early_pressure_marks_a_rusher_and_survival_is_stamped() {
        let config = StrategyConfig::default();
        let mut model = OpponentModel::new();
        assert_eq!(model.classify(&sightings(12, 1, 1), &config), OpponentProfile::Unknown);
        assert_eq!(model.classify(&sightings(13, 2, 2), &config), OpponentProfile::Rushing);

        // Still pressed after the detection window: nothing weathered yet.
        model.classify(&sightings(31, 1, 1), &config);
        assert_eq!(model.rush_survived_at(), None);
        model.classify(&sightings(32, 0, 0), &config);
        assert_eq!(model.rush_survived_at(), Some(32));
        model.classify(&sightings(40, 0, 0), &config);
        assert_eq!(model.rush_survived_at(), Some(32));

        assert!(model.recently_rushed(82, &config));
        assert!(!model.recently_rushed(83, &config));
        // A rusher is not re-judged at the turtle check.
        assert_eq!(model.classify(&sightings(50, 0, 0), &config), OpponentProfile::Rushing);
    }

    #[test]
    fn quiet_opening_reads_as_turtling_busy_one_as_balanced() {
        let config = StrategyConfig::default();
        let mut quiet = OpponentModel::new();
        quiet.classify(&sightings(20, 0, 1), &config);
        assert_eq!(quiet.classify(&sightings(49, 0, 0), &config), OpponentProfile::Unknown);
        assert_eq!(quiet.classify(&sightings(50, 0, 0), &config), OpponentProfile::Turtling);

        let mut busy = OpponentModel::new();
        busy.classify(&sightings(20, 0, 2), &config);
        assert_eq!(busy.classify(&sightings(50, 0, 0), &config), OpponentProfile::Balanced);
        // Once judged, the label sticks.
        assert_eq!(busy.classify(&sightings(90, 0, 0), &config), OpponentProfile::Balanced);
    }

    #[test]
    fn crippled_enemy_base_reads_as_desperate() {
        let config = StrategyConfig::default();
        let mut model = OpponentModel::new();
        let mut seen = sightings(60, 0, 4);
        seen.enemy_base_health = Some(90);
        assert_eq!(model.classify(&seen, &config), OpponentProfile::Desperate);

        let mut dead = OpponentModel::new();
        seen.enemy_base_health = Some(0);
        assert_eq!(dead.classify(&seen, &config), OpponentProfile::Balanced);
    }

    fn calm(tick: u64) -> WindowInputs {
        WindowInputs {
            tick,
            base_health: 500,
            stock: 400,
            army_advantage: 0,
            near_base: 0,
            threat: 0,
            enemy_base_health: None,
        }
    }

    #[test]
    fn windows_follow_priority_order() {
        let strategy = StrategyConfig::default();
        let phase = PhaseConfig::default();
        let open = |inputs: &WindowInputs, profile, rushed| {
            attack_window(inputs, profile, rushed, &strategy, &phase)
        };
        let unknown = OpponentProfile::Unknown;

        assert_eq!(open(&calm(80), unknown, false), None);
        assert_eq!(open(&calm(250), unknown, false), Some(AttackWindow::LateGame));
        assert_eq!(
            open(&calm(101), OpponentProfile::Turtling, false),
            Some(AttackWindow::TurtlePunish)
        );

        let rich = WindowInputs { stock: 800, ..calm(101) };
        assert_eq!(open(&rich, OpponentProfile::Turtling, false), Some(AttackWindow::Economy));
        let poor_base = WindowInputs { base_health: 300, ..rich };
        assert_eq!(open(&poor_base, unknown, false), None);

        let outnumbering = WindowInputs { army_advantage: 3, ..rich };
        assert_eq!(open(&outnumbering, unknown, false), Some(AttackWindow::ArmyAdvantage));
        assert_eq!(open(&outnumbering, unknown, true), Some(AttackWindow::PostRush));

        let wounded = WindowInputs {
            enemy_base_health: Some(340),
            ..outnumbering
        };
        assert_eq!(open(&wounded, unknown, true), Some(AttackWindow::WoundedBase));
    }

    #[test]
    fn emergency_closes_every_window() {
        let strategy = StrategyConfig::default();
        let phase = PhaseConfig::default();
        let wounded = WindowInputs {
            enemy_base_health: Some(100),
            ..calm(300)
        };
        let pressed = WindowInputs { near_base: 3, ..wounded };
        assert_eq!(
            attack_window(&pressed, OpponentProfile::Balanced, true, &strategy, &phase),
            None
        );
        let threatened = WindowInputs { threat: 5, ..wounded };
        assert_eq!(
            attack_window(&threatened, OpponentProfile::Balanced, true, &strategy, &phase),
            None
        );

        // One hostile near base only closes the post-rush window.
        let nudged = WindowInputs { near_base: 1, ..calm(60) };
        assert_eq!(
            attack_window(&nudged, OpponentProfile::Rushing, true, &strategy, &phase),
            None
        );
    }

    #[test]
    fn window_codes_leave_zero_for_none() {
        for window in [
            AttackWindow::WoundedBase,
            AttackWindow::PostRush,
            AttackWindow::ArmyAdvantage,
            AttackWindow::Economy,
            AttackWindow::TurtlePunish,
            AttackWindow::LateGame,
        ] {
            assert_ne!(window.code(), 0);
            assert_eq!(AttackWindow::from_code(window.code()), Some(window));
        }
        assert_eq!(AttackWindow::from_code(0), None);
        assert_eq!(OpponentProfile::from_code(OpponentProfile::Desperate.code()), Some(OpponentProfile::Desperate));
    }

    #[test]
    fn codes_round_trip() {
        for phase in [Phase::Buildup, Phase::Defense, Phase::Attack] {
            assert_eq!(Phase::from_code(phase.code()), Some(phase));
        }
        assert_eq!(Phase::from_code(0), None);
    }
}
