//! Shared broadcast table: a flat array of bounded slots plus typed accessors.
//!
//! Every field is a lossy quantization of a richer value. Coordinates are
//! stored as `coordinate + 1` so that zero always reads as "unset"; health
//! values are shifted or divided down to fit the slot width.

use serde::{Deserialize, Serialize};

use crate::modules::economy::Forecast;
use crate::modules::formation::BlockingLine;
use crate::modules::geometry::{Direction, Position};
use crate::modules::phase::{AttackWindow, OpponentProfile, Phase};

/// Number of slots in the table.
pub const TABLE_SLOTS: usize = 48;
/// Bit width of every slot.
pub const SLOT_BITS: u32 = 10;
/// Largest value a slot can hold.
pub const SLOT_MAX: u16 = (1 << SLOT_BITS) - 1;

pub const SLOT_OWN_BASE_X: usize = 0;
pub const SLOT_OWN_BASE_Y: usize = 1;
pub const SLOT_ENEMY_BASE_X: usize = 2;
pub const SLOT_ENEMY_BASE_Y: usize = 3;
pub const SLOT_ENEMY_BASE_HEALTH: usize = 4;
pub const SLOT_SPAWN_COUNT: usize = 5;
pub const SLOT_FOCUS_ID: usize = 6;
pub const SLOT_FOCUS_HEALTH: usize = 7;
pub const SLOT_PHASE: usize = 8;
pub const SLOT_ENEMY_BASE_TICK: usize = 9;
pub const SLOT_THREAT: usize = 10;
pub const SLOT_HAZARD_X: usize = 11;
pub const SLOT_HAZARD_Y: usize = 12;
pub const SLOT_HAZARD_TICK: usize = 13;
pub const SLOT_LINE_X: usize = 14;
pub const SLOT_LINE_Y: usize = 15;
pub const SLOT_LINE_AXIS: usize = 16;
pub const SLOT_SAFE_TICKS: usize = 17;
pub const SLOT_DEFENDERS: usize = 18;
pub const SLOT_RECOVERY: usize = 19;
pub const SLOT_BASE_HEALTH: usize = 20;
pub const SLOT_FORECAST: usize = 21;
pub const SLOT_STARVATION_FLAGS: usize = 22;
pub const SLOT_OWN_STOCK: usize = 23;
pub const SLOT_OPPONENT: usize = 24;
pub const SLOT_ATTACK_WINDOW: usize = 25;
pub const SLOT_ARMY_ADVANTAGE: usize = 26;

/// Health fields shifted right by this many bits (scale factor 8).
pub const HEALTH_SHIFT: u32 = 3;
/// Largest quantized health value.
pub const HEALTH_QUANT_MAX: u16 = 63;
/// Base health is stored divided by this factor.
pub const BASE_HEALTH_SCALE: i32 = 10;
/// Stock is shifted right by this many bits.
pub const STOCK_SHIFT: u32 = 2;
/// Army advantage is stored with this offset so deficits stay non-negative.
pub const ARMY_OFFSET: i32 = 50;
/// Tick stamps wrap at this modulus.
pub const TICK_MODULUS: u64 = SLOT_MAX as u64 + 1;

const FLAG_WARNING: u16 = 1;
const FLAG_CRITICAL: u16 = 2;

pub fn pack_coord(coord: i32) -> u16 {
    (coord + 1).clamp(0, SLOT_MAX as i32) as u16
}

pub fn unpack_coord(raw: u16) -> Option<i32> {
    if raw == 0 {
        None
    } else {
        Some(raw as i32 - 1)
    }
}

pub fn quantize_health(health: i32) -> u16 {
    ((health.max(0) >> HEALTH_SHIFT) as u16).min(HEALTH_QUANT_MAX)
}

pub fn dequantize_health(raw: u16) -> i32 {
    (raw as i32) << HEALTH_SHIFT
}

pub fn pack_tick(tick: u64) -> u16 {
    (tick % TICK_MODULUS) as u16
}

/// Ticks elapsed since a wrapped stamp, assuming fewer than 1024 have passed.
pub fn ticks_since(stamp: u16, now: u64) -> u64 {
    (pack_tick(now) as u64 + TICK_MODULUS - stamp as u64) % TICK_MODULUS
}

/// Nonzero slot value for an agent id. Zero is reserved for "no focus", so ids
/// fold modulo 1023 and shift up by one.
pub fn focus_tag(id: u64) -> u16 {
    (id % SLOT_MAX as u64) as u16 + 1
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FocusTarget {
    /// Folded id as produced by [`focus_tag`].
    pub tag: u16,
    pub health: i32,
}

impl FocusTarget {
    pub fn new(id: u64, health: i32) -> Self {
        Self {
            tag: focus_tag(id),
            health,
        }
    }

    pub fn matches(&self, id: u64) -> bool {
        focus_tag(id) == self.tag
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedTable {
    slots: Vec<u16>,
}

impl Default for SharedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedTable {
    pub fn new() -> Self {
        Self {
            slots: vec![0; TABLE_SLOTS],
        }
    }

    /// Out-of-range slots read as unset.
    pub fn read(&self, slot: usize) -> u16 {
        self.slots.get(slot).copied().unwrap_or(0)
    }

    /// Last write wins; values beyond the slot width are clamped.
    pub fn write(&mut self, slot: usize, value: u16) {
        if let Some(cell) = self.slots.get_mut(slot) {
            *cell = value.min(SLOT_MAX);
        }
    }

    pub fn slots(&self) -> &[u16] {
        &self.slots
    }

    fn read_position(&self, slot_x: usize, slot_y: usize) -> Option<Position> {
        let x = unpack_coord(self.read(slot_x))?;
        let y = unpack_coord(self.read(slot_y))?;
        Some(Position::new(x, y))
    }

    fn write_position(&mut self, slot_x: usize, slot_y: usize, pos: Option<Position>) {
        match pos {
            Some(pos) => {
                self.write(slot_x, pack_coord(pos.x));
                self.write(slot_y, pack_coord(pos.y));
            }
            None => {
                self.write(slot_x, 0);
                self.write(slot_y, 0);
            }
        }
    }

    pub fn own_base(&self) -> Option<Position> {
        self.read_position(SLOT_OWN_BASE_X, SLOT_OWN_BASE_Y)
    }

    pub fn set_own_base(&mut self, pos: Position) {
        self.write_position(SLOT_OWN_BASE_X, SLOT_OWN_BASE_Y, Some(pos));
    }

    pub fn enemy_base(&self) -> Option<Position> {
        self.read_position(SLOT_ENEMY_BASE_X, SLOT_ENEMY_BASE_Y)
    }

    pub fn enemy_base_tick(&self) -> Option<u16> {
        self.enemy_base().map(|_| self.read(SLOT_ENEMY_BASE_TICK))
    }

    pub fn set_enemy_base(&mut self, pos: Position, tick: u64) {
        self.write_position(SLOT_ENEMY_BASE_X, SLOT_ENEMY_BASE_Y, Some(pos));
        self.write(SLOT_ENEMY_BASE_TICK, pack_tick(tick));
    }

    /// `None` when no sighting carried a health reading.
    pub fn enemy_base_health(&self) -> Option<i32> {
        match self.read(SLOT_ENEMY_BASE_HEALTH) {
            0 => None,
            raw => Some(dequantize_health(raw)),
        }
    }

    pub fn set_enemy_base_health(&mut self, health: i32) {
        self.write(SLOT_ENEMY_BASE_HEALTH, quantize_health(health).max(1));
    }

    pub fn spawn_count(&self) -> u32 {
        self.read(SLOT_SPAWN_COUNT) as u32
    }

    pub fn set_spawn_count(&mut self, count: u32) {
        self.write(SLOT_SPAWN_COUNT, count.min(SLOT_MAX as u32) as u16);
    }

    pub fn focus(&self) -> Option<FocusTarget> {
        match self.read(SLOT_FOCUS_ID) {
            0 => None,
            tag => Some(FocusTarget {
                tag,
                health: dequantize_health(self.read(SLOT_FOCUS_HEALTH)),
            }),
        }
    }

    pub fn set_focus(&mut self, target: Option<(u64, i32)>) {
        match target {
            Some((id, health)) => {
                self.write(SLOT_FOCUS_ID, focus_tag(id));
                self.write(SLOT_FOCUS_HEALTH, quantize_health(health));
            }
            None => {
                self.write(SLOT_FOCUS_ID, 0);
                self.write(SLOT_FOCUS_HEALTH, 0);
            }
        }
    }

    /// Unset reads as `Buildup`.
    pub fn phase(&self) -> Phase {
        Phase::from_code(self.read(SLOT_PHASE)).unwrap_or(Phase::Buildup)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.write(SLOT_PHASE, phase.code());
    }

    pub fn threat(&self) -> u32 {
        self.read(SLOT_THREAT) as u32
    }

    pub fn set_threat(&mut self, level: u32) {
        self.write(SLOT_THREAT, level.min(SLOT_MAX as u32) as u16);
    }

    pub fn hazard(&self) -> Option<(Position, u16)> {
        let pos = self.read_position(SLOT_HAZARD_X, SLOT_HAZARD_Y)?;
        Some((pos, self.read(SLOT_HAZARD_TICK)))
    }

    pub fn set_hazard(&mut self, pos: Position, tick: u64) {
        self.write_position(SLOT_HAZARD_X, SLOT_HAZARD_Y, Some(pos));
        self.write(SLOT_HAZARD_TICK, pack_tick(tick));
    }

    pub fn blocking_line(&self) -> Option<BlockingLine> {
        let center = self.read_position(SLOT_LINE_X, SLOT_LINE_Y)?;
        let raw_axis = self.read(SLOT_LINE_AXIS);
        if raw_axis == 0 {
            return None;
        }
        let axis = Direction::from_ordinal((raw_axis - 1) as u8)?;
        Some(BlockingLine { center, axis })
    }

    pub fn set_blocking_line(&mut self, line: Option<BlockingLine>) {
        match line {
            Some(line) => {
                self.write_position(SLOT_LINE_X, SLOT_LINE_Y, Some(line.center));
                self.write(SLOT_LINE_AXIS, line.axis.ordinal() as u16 + 1);
            }
            None => {
                self.write_position(SLOT_LINE_X, SLOT_LINE_Y, None);
                self.write(SLOT_LINE_AXIS, 0);
            }
        }
    }

    pub fn safe_ticks(&self) -> u32 {
        self.read(SLOT_SAFE_TICKS) as u32
    }

    pub fn set_safe_ticks(&mut self, ticks: u32, cap: u32) {
        self.write(SLOT_SAFE_TICKS, ticks.min(cap).min(SLOT_MAX as u32) as u16);
    }

    pub fn defender_count(&self) -> u32 {
        self.read(SLOT_DEFENDERS) as u32
    }

    pub fn set_defender_count(&mut self, count: u32) {
        self.write(SLOT_DEFENDERS, count.min(SLOT_MAX as u32) as u16);
    }

    pub fn recovery(&self) -> bool {
        self.read(SLOT_RECOVERY) != 0
    }

    pub fn set_recovery(&mut self, active: bool) {
        self.write(SLOT_RECOVERY, active as u16);
    }

    /// Zero means the base has not reported yet.
    pub fn base_health(&self) -> i32 {
        self.read(SLOT_BASE_HEALTH) as i32 * BASE_HEALTH_SCALE
    }

    pub fn set_base_health(&mut self, health: i32) {
        let scaled = (health.max(0) / BASE_HEALTH_SCALE).min(SLOT_MAX as i32);
        self.write(SLOT_BASE_HEALTH, scaled as u16);
    }

    pub fn starvation(&self) -> Forecast {
        let flags = self.read(SLOT_STARVATION_FLAGS);
        Forecast {
            ticks_to_zero: self.read(SLOT_FORECAST) as i32,
            warning: flags & FLAG_WARNING != 0,
            critical: flags & FLAG_CRITICAL != 0,
        }
    }

    pub fn set_starvation(&mut self, signal: Forecast) {
        let horizon = signal.ticks_to_zero.clamp(0, SLOT_MAX as i32) as u16;
        let mut flags = 0;
        if signal.warning {
            flags |= FLAG_WARNING;
        }
        if signal.critical {
            flags |= FLAG_CRITICAL;
        }
        self.write(SLOT_FORECAST, horizon);
        self.write(SLOT_STARVATION_FLAGS, flags);
    }

    /// Stock rounded down to a multiple of four.
    pub fn own_stock(&self) -> u32 {
        (self.read(SLOT_OWN_STOCK) as u32) << STOCK_SHIFT
    }

    pub fn set_own_stock(&mut self, stock: u32) {
        self.write(SLOT_OWN_STOCK, (stock >> STOCK_SHIFT).min(SLOT_MAX as u32) as u16);
    }

    pub fn opponent(&self) -> OpponentProfile {
        OpponentProfile::from_code(self.read(SLOT_OPPONENT)).unwrap_or_default()
    }

    pub fn set_opponent(&mut self, profile: OpponentProfile) {
        self.write(SLOT_OPPONENT, profile.code());
    }

    pub fn attack_window(&self) -> Option<AttackWindow> {
        AttackWindow::from_code(self.read(SLOT_ATTACK_WINDOW))
    }

    pub fn set_attack_window(&mut self, window: Option<AttackWindow>) {
        self.write(SLOT_ATTACK_WINDOW, window.map_or(0, AttackWindow::code));
    }

    /// Friendly minus hostile workers in the controller's view, saturating at the offset.
    pub fn army_advantage(&self) -> i32 {
        self.read(SLOT_ARMY_ADVANTAGE) as i32 - ARMY_OFFSET
    }

    pub fn set_army_advantage(&mut self, advantage: i32) {
        let raw = (advantage + ARMY_OFFSET).clamp(0, 2 * ARMY_OFFSET);
        self.write(SLOT_ARMY_ADVANTAGE, raw as u16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_round_trip_within_slot_bounds() {
        for coord in [0, 1, 17, 59, 500, SLOT_MAX as i32 - 1] {
            assert_eq!(unpack_coord(pack_coord(coord)), Some(coord));
        }
        assert_eq!(unpack_coord(0), None);
    }

    #[test]
    fn health_round_trip_loses_less_than_scale() {
        for health in [0, 1, 7, 8, 99, 250, 504] {
            let restored = dequantize_health(quantize_health(health));
            assert!(restored <= health);
            assert!(health - restored < 1 << HEALTH_SHIFT, "health {health}");
        }
        // Values past the field cap saturate.
        assert_eq!(dequantize_health(quantize_health(5000)), 504);
    }

    #[test]
    fn fresh_table_reads_as_unset() {
        let table = SharedTable::new();
        assert_eq!(table.own_base(), None);
        assert_eq!(table.enemy_base(), None);
        assert_eq!(table.focus(), None);
        assert_eq!(table.blocking_line(), None);
        assert_eq!(table.phase(), Phase::Buildup);
        assert!(!table.recovery());
        assert_eq!(table.opponent(), OpponentProfile::Unknown);
        assert_eq!(table.attack_window(), None);
    }

    #[test]
    fn strategy_fields_publish_and_clear() {
        let mut table = SharedTable::new();
        table.set_opponent(OpponentProfile::Turtling);
        table.set_attack_window(Some(AttackWindow::TurtlePunish));
        assert_eq!(table.opponent(), OpponentProfile::Turtling);
        assert_eq!(table.attack_window(), Some(AttackWindow::TurtlePunish));
        assert_eq!(table.read(SLOT_ATTACK_WINDOW), 6);

        table.set_attack_window(None);
        assert_eq!(table.attack_window(), None);
    }

    #[test]
    fn army_advantage_keeps_its_sign() {
        let mut table = SharedTable::new();
        table.set_army_advantage(-4);
        assert_eq!(table.army_advantage(), -4);
        table.set_army_advantage(7);
        assert_eq!(table.army_advantage(), 7);
        table.set_army_advantage(-80);
        assert_eq!(table.army_advantage(), -50);
        table.set_army_advantage(200);
        assert_eq!(table.army_advantage(), 50);
    }

    #[test]
    fn origin_is_distinguishable_from_unset() {
        let mut table = SharedTable::new();
        table.set_own_base(Position::origin());
        assert_eq!(table.own_base(), Some(Position::origin()));
    }

    #[test]
    fn writes_clamp_to_slot_width() {
        let mut table = SharedTable::new();
        table.write(SLOT_THREAT, u16::MAX);
        assert_eq!(table.read(SLOT_THREAT), SLOT_MAX);
        table.write(TABLE_SLOTS + 3, 9);
        assert_eq!(table.read(TABLE_SLOTS + 3), 0);
    }

    #[test]
    fn blocking_line_round_trips_and_clears() {
        let mut table = SharedTable::new();
        let line = BlockingLine {
            center: Position::new(12, 4),
            axis: Direction::NorthWest,
        };
        table.set_blocking_line(Some(line));
        assert_eq!(table.blocking_line(), Some(line));
        table.set_blocking_line(None);
        assert_eq!(table.blocking_line(), None);
    }

    #[test]
    fn focus_matches_folded_ids() {
        let mut table = SharedTable::new();
        table.set_focus(Some((1023 + 77, 95)));
        let focus = table.focus().unwrap();
        assert!(focus.matches(77));
        assert!(focus.matches(1023 + 77));
        assert!(!focus.matches(78));
        assert_eq!(focus.health, 88);
    }

    #[test]
    fn focus_on_ids_that_mask_to_zero_is_not_lost() {
        let mut table = SharedTable::new();
        for id in [0, 1023, 1024, 2048] {
            table.set_focus(Some((id, 40)));
            let focus = table.focus().expect("focus published");
            assert!(focus.matches(id), "id {id}");
            assert!(focus.tag >= 1 && focus.tag <= SLOT_MAX);
        }
        table.set_focus(None);
        assert_eq!(table.focus(), None);
    }

    #[test]
    fn tick_stamps_wrap() {
        let stamp = pack_tick(1020);
        assert_eq!(ticks_since(stamp, 1030), 10);
        assert_eq!(ticks_since(pack_tick(5), 5), 0);
    }

    #[test]
    fn base_health_and_stock_quantize_down() {
        let mut table = SharedTable::new();
        table.set_base_health(457);
        assert_eq!(table.base_health(), 450);
        table.set_own_stock(2503);
        assert_eq!(table.own_stock(), 2500);
        table.set_own_stock(1_000_000);
        assert_eq!(table.own_stock(), (SLOT_MAX as u32) << STOCK_SHIFT);
    }
}
