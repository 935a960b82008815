use crate::modules::config::{MessageConfig, ThreatConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreatLevel {
    Calm,
    Elevated,
    Critical,
}

impl ThreatLevel {
    pub fn from_level(level: u32, config: &ThreatConfig) -> Self {
        if level == 0 {
            ThreatLevel::Calm
        } else if level < config.critical_level {
            ThreatLevel::Elevated
        } else {
            ThreatLevel::Critical
        }
    }
}

/// Hostile count reported over the message channel, decaying once reports
/// stop arriving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageThreat {
    level: u32,
    last_report: u64,
}

impl MessageThreat {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Call once per tick with the freshest reported count, if any arrived.
    pub fn observe(&mut self, tick: u64, report: Option<u32>, config: &MessageConfig) -> u32 {
        match report {
            Some(count) => {
                self.level = count.min(config.threat_cap);
                self.last_report = tick;
            }
            None => {
                if tick.saturating_sub(self.last_report) >= config.threat_decay_ticks
                    && self.level > 0
                {
                    self.level -= 1;
                }
            }
        }
        self.level
    }
}

/// Hysteresis filter over the raw threat reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThreatEstimator {
    level: u32,
    last_threat: Option<u64>,
    ticks_since_threat: u32,
}

impl ThreatEstimator {
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn ticks_since_threat(&self) -> u32 {
        self.ticks_since_threat
    }

    /// The level stays nonzero for `hysteresis_ticks` ticks after the raw
    /// reading drops to zero, shedding at most one per tick, then clears.
    ///
    /// The window is inclusive, so a reading that vanishes at tick `T` keeps
    /// the level up through `T + hysteresis_ticks - 1`. The safe counter is
    /// held at zero while the level is held and only counts calm ticks.
    pub fn update(
        &mut self,
        tick: u64,
        sensed: u32,
        message_threat: u32,
        config: &ThreatConfig,
    ) -> u32 {
        let raw = sensed.max(message_threat);
        if raw > 0 {
            self.level = raw;
            self.last_threat = Some(tick);
            self.ticks_since_threat = 0;
        } else {
            let recent = self
                .last_threat
                .is_some_and(|last| tick.saturating_sub(last) <= config.hysteresis_ticks);
            if recent && self.level > 0 {
                self.level = self.level.saturating_sub(1).max(1);
                self.ticks_since_threat = 0;
            } else {
                self.level = 0;
                self.ticks_since_threat = self.ticks_since_threat.saturating_add(1);
            }
        }
        self.level
    }
}
