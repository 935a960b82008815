//! Resource forecasting, recovery mode and spawn gating for the controller.

use tracing::info;

use crate::modules::config::{EconomyConfig, SpawnConfig};
use crate::modules::phase::Phase;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Forecast {
    /// Predicted ticks until the stock hits zero; `safe_horizon` when stable.
    pub ticks_to_zero: i32,
    pub warning: bool,
    pub critical: bool,
}

impl Forecast {
    pub fn from_horizon(ticks_to_zero: i32, config: &EconomyConfig) -> Self {
        Self {
            ticks_to_zero,
            warning: ticks_to_zero <= config.warning_ticks,
            critical: ticks_to_zero <= config.critical_ticks,
        }
    }

    pub fn safe(config: &EconomyConfig) -> Self {
        Self::from_horizon(config.safe_horizon, config)
    }
}

/// Exponentially smoothed per-tick stock delta.
#[derive(Clone, Debug, Default)]
pub struct ResourceFlowTracker {
    last: Option<i32>,
    sum: i32,
    samples: i32,
    zero_run: u32,
}

impl ResourceFlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn average(&self) -> i32 {
        if self.samples == 0 {
            0
        } else {
            self.sum / self.samples
        }
    }

    pub fn observe(&mut self, stock: u32, config: &EconomyConfig) -> Forecast {
        let stock = stock.min(i32::MAX as u32) as i32;
        let Some(last) = self.last.replace(stock) else {
            return Forecast::safe(config);
        };
        let delta = stock - last;

        if self.samples < config.window {
            self.sum += delta;
            self.samples += 1;
        } else {
            self.sum = self.sum - self.sum / config.window + delta;
        }

        let avg = self.sum / self.samples;
        if avg == 0 {
            self.zero_run = self.zero_run.saturating_add(1);
        } else {
            self.zero_run = 0;
        }

        let horizon = if avg == 0 && self.zero_run >= config.zero_income_ticks {
            // Income has stalled; only upkeep drains the stock.
            stock / config.consumption_per_tick
        } else if avg >= 0 {
            config.safe_horizon
        } else {
            (stock / -avg).min(config.safe_horizon)
        };
        Forecast::from_horizon(horizon, config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryReason {
    /// Quiet front but stock drained by spawning.
    CalmDrain,
    Starving,
    /// Under pressure with a thin reserve.
    Pressured,
    BaseHealth,
    StarvationForecast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EconomyInputs {
    pub tick: u64,
    pub stock: u32,
    pub threat: u32,
    pub spawns: u32,
    pub base_health: i32,
    pub forecast: Forecast,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryMode {
    active: Option<(RecoveryReason, u64)>,
}

impl RecoveryMode {
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn reason(&self) -> Option<RecoveryReason> {
        self.active.map(|(reason, _)| reason)
    }

    pub fn update(&mut self, inputs: &EconomyInputs, config: &EconomyConfig) -> bool {
        match self.active {
            None => {
                if let Some(reason) = entry_reason(inputs, config) {
                    info!(
                        tick = inputs.tick,
                        ?reason,
                        stock = inputs.stock,
                        base_health = inputs.base_health,
                        "economy recovery entered"
                    );
                    self.active = Some((reason, inputs.tick));
                }
            }
            Some((reason, entered)) => {
                if should_exit(reason, entered, inputs, config) {
                    info!(
                        tick = inputs.tick,
                        ?reason,
                        stock = inputs.stock,
                        ticks = inputs.tick.saturating_sub(entered),
                        "economy recovery exited"
                    );
                    self.active = None;
                }
            }
        }
        self.is_active()
    }
}

fn entry_reason(inputs: &EconomyInputs, config: &EconomyConfig) -> Option<RecoveryReason> {
    let EconomyInputs {
        stock,
        threat,
        spawns,
        base_health,
        forecast,
        ..
    } = *inputs;
    if threat <= config.calm_threat_max && stock < config.calm_stock && spawns > config.calm_spawns
    {
        Some(RecoveryReason::CalmDrain)
    } else if stock < config.starving_stock && spawns > config.starving_spawns {
        Some(RecoveryReason::Starving)
    } else if threat >= config.pressured_threat
        && stock < config.pressured_stock
        && spawns > config.pressured_spawns
    {
        Some(RecoveryReason::Pressured)
    } else if base_health < config.base_health_floor && spawns > config.base_health_spawns {
        Some(RecoveryReason::BaseHealth)
    } else if forecast.critical {
        Some(RecoveryReason::StarvationForecast)
    } else {
        None
    }
}

fn should_exit(
    reason: RecoveryReason,
    entered: u64,
    inputs: &EconomyInputs,
    config: &EconomyConfig,
) -> bool {
    let stocked = inputs.stock >= config.exit_stock;
    match reason {
        RecoveryReason::BaseHealth => {
            inputs.base_health > config.exit_base_health
                || (inputs.tick.saturating_sub(entered) > config.exit_stale_ticks && stocked)
        }
        RecoveryReason::StarvationForecast => {
            inputs.forecast.ticks_to_zero > config.exit_forecast
                || (stocked && inputs.forecast.ticks_to_zero > config.exit_forecast_with_stock)
        }
        RecoveryReason::CalmDrain | RecoveryReason::Starving | RecoveryReason::Pressured => stocked,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnBlock {
    Fortifying,
    BaseHealth,
    Starvation,
    Recovery,
    Cap,
    Reserve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnInputs {
    pub tick: u64,
    pub stock: u32,
    pub cost: u32,
    pub spawns: u32,
    pub threat: u32,
    pub phase: Phase,
    pub base_health: i32,
    pub recovery: bool,
    pub forecast: Forecast,
    pub fortifications: u32,
    pub fortification_done: bool,
    pub defense_timeout: u64,
}

pub fn spawn_gate(inputs: &SpawnInputs, config: &SpawnConfig) -> Result<(), SpawnBlock> {
    if inputs.fortifications < config.fortifications_before_spawn
        && inputs.tick < inputs.defense_timeout
        && !inputs.fortification_done
    {
        return Err(SpawnBlock::Fortifying);
    }
    if inputs.base_health < config.pause_health
        || (inputs.base_health < config.slow_health && inputs.tick % 2 == 1)
    {
        return Err(SpawnBlock::BaseHealth);
    }
    if inputs.forecast.critical && inputs.spawns > config.critical_block_spawns {
        return Err(SpawnBlock::Starvation);
    }
    if inputs.recovery && inputs.threat < config.recovery_override_threat {
        return Err(SpawnBlock::Recovery);
    }

    let cap = if inputs.tick > config.late_tick {
        config.late_cap
    } else {
        config.cap
    };
    if (inputs.stock < config.cap_stock || inputs.forecast.warning) && inputs.spawns >= cap {
        return Err(SpawnBlock::Cap);
    }

    let reserve = if inputs.phase == Phase::Attack {
        config.attack_reserve
    } else {
        config.reserve
    };
    let min_after = if inputs.threat >= config.threatened_level {
        config.threatened_min_after_spawn
    } else {
        config.min_after_spawn
    };
    if inputs.stock < inputs.cost + reserve {
        return Err(SpawnBlock::Reserve);
    }
    let after = inputs.stock - inputs.cost;
    if after < min_after
        || (inputs.spawns > config.absolute_reserve_after && after < config.absolute_reserve)
    {
        return Err(SpawnBlock::Reserve);
    }
    Ok(())
}
