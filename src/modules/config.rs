use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::modules::error::ConfigError;

/// Tunable thresholds for every coordination subsystem.
///
/// Defaults are the tuned values; a JSON file may override any subset of
/// fields since every section is `#[serde(default)]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub messages: MessageConfig,
    pub threat: ThreatConfig,
    pub phase: PhaseConfig,
    pub strategy: StrategyConfig,
    pub formation: FormationConfig,
    pub economy: EconomyConfig,
    pub spawn: SpawnConfig,
    pub decision: DecisionConfig,
    pub fortification: FortificationConfig,
}

impl SwarmConfig {
    /// Loads a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let config: SwarmConfig = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.messages.read_limit == 0 {
            return Err(ConfigError::Invalid("messages.read_limit must be > 0".into()));
        }
        if self.economy.window <= 0 {
            return Err(ConfigError::Invalid("economy.window must be > 0".into()));
        }
        if self.economy.consumption_per_tick <= 0 {
            return Err(ConfigError::Invalid(
                "economy.consumption_per_tick must be > 0".into(),
            ));
        }
        if self.economy.warning_ticks < self.economy.critical_ticks {
            return Err(ConfigError::Invalid(format!(
                "economy.warning_ticks ({}) must be >= economy.critical_ticks ({})",
                self.economy.warning_ticks, self.economy.critical_ticks
            )));
        }
        if self.strategy.emergency_hostiles == 0 {
            return Err(ConfigError::Invalid(
                "strategy.emergency_hostiles must be > 0".into(),
            ));
        }
        if self.formation.line_slots == 0 {
            return Err(ConfigError::Invalid("formation.line_slots must be > 0".into()));
        }
        if self.formation.guardian_inner_sq >= self.formation.guardian_outer_sq {
            return Err(ConfigError::Invalid(format!(
                "formation.guardian_inner_sq ({}) must be < guardian_outer_sq ({})",
                self.formation.guardian_inner_sq, self.formation.guardian_outer_sq
            )));
        }
        if self.decision.scale <= 0 {
            return Err(ConfigError::Invalid("decision.scale must be > 0".into()));
        }
        if self.fortification.attempts_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "fortification.attempts_per_tick must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Messages a reader consumes per tick.
    pub read_limit: usize,
    /// Ticks after the send tick during which a message stays visible.
    pub retention_ticks: u64,
    pub threat_cap: u32,
    /// Ticks without a fresh threat report before the reported count decays.
    pub threat_decay_ticks: u64,
    pub min_send_gap: u64,
    pub threat_send_gap: u64,
    pub bait_send_gap: u64,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            read_limit: 4,
            retention_ticks: 1,
            threat_cap: 10,
            threat_decay_ticks: 3,
            min_send_gap: 3,
            threat_send_gap: 5,
            bait_send_gap: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// Ticks the level lingers (decaying) after the last nonzero reading.
    pub hysteresis_ticks: u64,
    pub safe_ticks_cap: u32,
    pub critical_level: u32,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            hysteresis_ticks: 3,
            safe_ticks_cap: 63,
            critical_level: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub defense_trigger: u32,
    pub force_defense: u32,
    /// Hostiles seen before this tick latch the rush flag.
    pub rush_window_end: u64,
    pub rush_response_ticks: u64,
    pub min_fortifications: u32,
    pub defense_timeout: u64,
    pub attack_spawn_count: u32,
    pub small_map_attack_round: u64,
    pub attack_round_base: u64,
    pub stall_fortification_floor: u32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            defense_trigger: 2,
            force_defense: 5,
            rush_window_end: 30,
            rush_response_ticks: 30,
            min_fortifications: 2,
            defense_timeout: 20,
            attack_spawn_count: 15,
            small_map_attack_round: 40,
            attack_round_base: 50,
            stall_fortification_floor: 8,
        }
    }
}

/// Opponent classification and attack window thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Classification as a rusher is only possible up to this tick.
    pub rush_detection_tick: u64,
    /// Cumulative hostile sightings near base that mark a rush.
    pub rush_hostiles: u32,
    pub turtle_detection_tick: u64,
    /// Fewer cumulative sightings than this by the detection tick means turtling.
    pub turtle_hostiles: u32,
    pub desperate_base_health: i32,
    /// Squared radius around base inside which hostiles count as pressing.
    pub near_base_sq: i32,
    /// Hostiles near base at which windows close entirely.
    pub emergency_hostiles: u32,
    pub post_rush_ticks: u64,
    pub wounded_base_health: i32,
    pub army_advantage: i32,
    pub army_min_base_health: i32,
    pub economy_stock: u32,
    pub economy_min_base_health: i32,
    pub turtle_punish_tick: u64,
    pub late_game_tick: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            rush_detection_tick: 30,
            rush_hostiles: 3,
            turtle_detection_tick: 50,
            turtle_hostiles: 2,
            desperate_base_health: 100,
            near_base_sq: 25,
            emergency_hostiles: 3,
            post_rush_ticks: 50,
            wounded_base_health: 350,
            army_advantage: 3,
            army_min_base_health: 250,
            economy_stock: 800,
            economy_min_base_health: 300,
            turtle_punish_tick: 100,
            late_game_tick: 250,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationConfig {
    pub block_min_hostiles: usize,
    pub block_trigger_dist_sq: i32,
    pub line_slots: u64,
    pub line_eligible_dist_sq: i32,
    pub line_arrival_dist_sq: i32,
    /// Out of ten, the share of ids that volunteer as blockers.
    pub blocker_share_tenths: u64,
    pub emergency_threat: u32,
    pub guardian_inner_sq: i32,
    pub guardian_outer_sq: i32,
    pub guardian_attack_dist_sq: i32,
    pub sentry_enemy_facing_percent: u64,
    pub shield_wall_percent: u64,
    pub shield_wall_distance: i32,
    pub defender_radius_sq: i32,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            block_min_hostiles: 1,
            block_trigger_dist_sq: 225,
            line_slots: 7,
            line_eligible_dist_sq: 36,
            line_arrival_dist_sq: 8,
            blocker_share_tenths: 7,
            emergency_threat: 3,
            guardian_inner_sq: 5,
            guardian_outer_sq: 13,
            guardian_attack_dist_sq: 9,
            sentry_enemy_facing_percent: 60,
            shield_wall_percent: 40,
            shield_wall_distance: 4,
            defender_radius_sq: 25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub window: i32,
    pub zero_income_ticks: u32,
    pub consumption_per_tick: i32,
    pub warning_ticks: i32,
    pub critical_ticks: i32,
    /// Published horizon when stock is not shrinking.
    pub safe_horizon: i32,
    pub calm_threat_max: u32,
    pub calm_stock: u32,
    pub calm_spawns: u32,
    pub starving_stock: u32,
    pub starving_spawns: u32,
    pub pressured_threat: u32,
    pub pressured_stock: u32,
    pub pressured_spawns: u32,
    pub base_health_floor: i32,
    pub base_health_spawns: u32,
    pub exit_stock: u32,
    pub exit_base_health: i32,
    pub exit_stale_ticks: u64,
    pub exit_forecast: i32,
    pub exit_forecast_with_stock: i32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            window: 10,
            zero_income_ticks: 5,
            consumption_per_tick: 3,
            warning_ticks: 30,
            critical_ticks: 15,
            safe_horizon: 999,
            calm_threat_max: 3,
            calm_stock: 800,
            calm_spawns: 5,
            starving_stock: 200,
            starving_spawns: 3,
            pressured_threat: 3,
            pressured_stock: 1000,
            pressured_spawns: 8,
            base_health_floor: 400,
            base_health_spawns: 5,
            exit_stock: 1000,
            exit_base_health: 450,
            exit_stale_ticks: 50,
            exit_forecast: 60,
            exit_forecast_with_stock: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub reserve: u32,
    pub attack_reserve: u32,
    pub min_after_spawn: u32,
    pub threatened_min_after_spawn: u32,
    pub threatened_level: u32,
    pub absolute_reserve: u32,
    pub absolute_reserve_after: u32,
    pub cap: u32,
    pub late_cap: u32,
    pub late_tick: u64,
    pub cap_stock: u32,
    pub pause_health: i32,
    pub slow_health: i32,
    pub critical_block_spawns: u32,
    pub recovery_override_threat: u32,
    pub fortifications_before_spawn: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            reserve: 50,
            attack_reserve: 100,
            min_after_spawn: 100,
            threatened_min_after_spawn: 150,
            threatened_level: 2,
            absolute_reserve: 300,
            absolute_reserve_after: 5,
            cap: 20,
            late_cap: 15,
            late_tick: 400,
            cap_stock: 500,
            pause_health: 150,
            slow_health: 300,
            critical_block_spawns: 5,
            recovery_override_threat: 3,
            fortifications_before_spawn: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Numerator constant `K` of the distance falloff.
    pub scale: i32,
    pub distance_weight: i32,
    pub delivery_base: i32,
    pub forced_delivery: i32,
    pub forced_delivery_close_bonus: i32,
    pub enemy_worker_base: i32,
    pub enemy_controller_bonus: i32,
    /// Added to the enemy controller's value while an attack window is open.
    pub attack_window_bonus: i32,
    pub resource_base: i32,
    pub resource_attack_base: i32,
    pub economy_boost: i32,
    pub home_bonus: i32,
    pub home_radius_sq: i32,
    pub emergency_recall_stock: u32,
    pub critical_stock: u32,
    pub home_guard_radius_sq: i32,
    pub recall_score: i32,
    pub home_guard_score: i32,
    pub leash_sq: i32,
    pub boost_leash_sq: i32,
    pub critical_base_leash_sq: i32,
    pub critical_base_health: i32,
    pub low_base_health: i32,
    pub attack_leash_sq: i32,
    pub attack_leash_stock: u32,
    pub late_tick: u64,
    pub late_leash_sq: i32,
    pub leash_removal_stock: u32,
    pub leash_score: i32,
    pub enemy_base_score: i32,
    pub swarm_threshold: usize,
    pub swarm_bonus: i32,
    pub focus_bonus: i32,
    pub overkill_penalty: i32,
    pub finishing_health: i32,
    pub finishing_bonus: i32,
    pub wounded_health: i32,
    pub wounded_return_sq: i32,
    pub hazard_flee_sq: i32,
    pub hazard_report_sq: i32,
    pub bypass_min_sq: i32,
    pub bypass_base_sq: i32,
    pub interceptor_patrol: i32,
    pub interceptor_return_threat: u32,
    pub interceptor_engage_sq: i32,
    pub engage_sq: i32,
    pub kite_retreat_health: i32,
    pub sentry_bonus: i32,
    pub sentry_controller_bonus: i32,
    pub sentry_adjacent_resource_sq: i32,
    pub scout_explore_score: i32,
    pub scout_enemy_base_score: i32,
    pub delivery_range_sq: i32,
    pub hunt_refresh_ticks: u64,
    pub hunt_arrival_sq: i32,
    pub capture_hold_ticks: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            scale: 1000,
            distance_weight: 15,
            delivery_base: 150,
            forced_delivery: 500,
            forced_delivery_close_bonus: 200,
            enemy_worker_base: 60,
            enemy_controller_bonus: 500,
            attack_window_bonus: 150,
            resource_base: 100,
            resource_attack_base: 30,
            economy_boost: 500,
            home_bonus: 50,
            home_radius_sq: 144,
            emergency_recall_stock: 500,
            critical_stock: 200,
            home_guard_radius_sq: 25,
            recall_score: 1000,
            home_guard_score: 500,
            leash_sq: 144,
            boost_leash_sq: 25,
            critical_base_leash_sq: 100,
            critical_base_health: 200,
            low_base_health: 300,
            attack_leash_sq: 225,
            attack_leash_stock: 1500,
            late_tick: 400,
            late_leash_sq: 100,
            leash_removal_stock: 150,
            leash_score: 150,
            enemy_base_score: 50,
            swarm_threshold: 3,
            swarm_bonus: 300,
            focus_bonus: 500,
            overkill_penalty: 200,
            finishing_health: 10,
            finishing_bonus: 300,
            wounded_health: 40,
            wounded_return_sq: 25,
            hazard_flee_sq: 18,
            hazard_report_sq: 64,
            bypass_min_sq: 16,
            bypass_base_sq: 36,
            interceptor_patrol: 15,
            interceptor_return_threat: 4,
            interceptor_engage_sq: 64,
            engage_sq: 8,
            kite_retreat_health: 60,
            sentry_bonus: 100,
            sentry_controller_bonus: 1000,
            sentry_adjacent_resource_sq: 8,
            scout_explore_score: 100,
            scout_enemy_base_score: 200,
            delivery_range_sq: 9,
            hunt_refresh_ticks: 10,
            hunt_arrival_sq: 9,
            capture_hold_ticks: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FortificationConfig {
    pub attempts_per_tick: u32,
    pub ring_failure_threshold: u32,
    pub line_failure_threshold: u32,
    /// Failed ticks since the last success beyond which placement stops for good.
    pub give_up_threshold: u32,
    pub target: u32,
    pub emergency_threat: u32,
    pub emergency_limit: u32,
}

impl Default for FortificationConfig {
    fn default() -> Self {
        Self {
            attempts_per_tick: 3,
            ring_failure_threshold: 5,
            line_failure_threshold: 5,
            give_up_threshold: 20,
            target: 15,
            emergency_threat: 2,
            emergency_limit: 10,
        }
    }
}
