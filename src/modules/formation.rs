//! Formation geometry: the blocking line and the two defensive rings.
//!
//! The controller publishes line geometry through the shared table; every
//! worker derives its own slot from its id, so no assignment is ever stored.

use crate::modules::config::FormationConfig;
use crate::modules::geometry::{COMPASS, Direction, MapClass, MapProfile, Position};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockingLine {
    pub center: Position,
    /// Direction the line extends along; perpendicular to the threat.
    pub axis: Direction,
}

impl BlockingLine {
    /// Direction from base toward the threat.
    pub const fn facing(&self) -> Direction {
        self.axis.rotate_right().rotate_right()
    }

    pub const fn slot_position(&self, slot: i32) -> Position {
        self.center.step(self.axis, slot)
    }
}

/// Builds the line between base and the hostile centroid, or `None` when the
/// threat is too small or too far away to justify one.
pub fn compute_blocking_line(
    base: Position,
    hostiles: &[Position],
    map: MapProfile,
    config: &FormationConfig,
) -> Option<BlockingLine> {
    if hostiles.len() < config.block_min_hostiles || hostiles.is_empty() {
        return None;
    }
    let nearest = hostiles.iter().map(|h| h.distance_squared(base)).min()?;
    if nearest > config.block_trigger_dist_sq {
        return None;
    }

    let count = hostiles.len() as i32;
    let sum_x: i32 = hostiles.iter().map(|h| h.x).sum();
    let sum_y: i32 = hostiles.iter().map(|h| h.y).sum();
    let centroid = Position::new(sum_x / count, sum_y / count);
    let facing = base.direction_to(centroid);
    if facing == Direction::Center {
        return None;
    }

    // Closer threats pull the line in so defenders reach it in time.
    let distance = if nearest < 36 {
        2
    } else if nearest < 81 {
        3
    } else {
        4
    }
    .min(map.block_distance_cap());

    Some(BlockingLine {
        center: map.clamp(base.step(facing, distance)),
        axis: facing.perpendicular(),
    })
}

/// Line slot for an id: `(id mod slots) - slots / 2`.
pub fn line_slot(id: u64, slot_count: u64) -> i32 {
    let slot_count = slot_count.max(1);
    (id % slot_count) as i32 - (slot_count / 2) as i32
}

pub fn volunteers_for_line(id: u64, config: &FormationConfig) -> bool {
    (id >> 4) % 10 < config.blocker_share_tenths
}

/// Slot cell this agent should hold, if it is a blocker for `line`.
pub fn blocker_post(
    id: u64,
    position: Position,
    line: &BlockingLine,
    threat: u32,
    config: &FormationConfig,
) -> Option<Position> {
    if threat < config.emergency_threat || !volunteers_for_line(id, config) {
        return None;
    }
    if position.distance_squared(line.center) > config.line_eligible_dist_sq {
        return None;
    }
    Some(line.slot_position(line_slot(id, config.line_slots)))
}

pub fn holds_line(position: Position, post: Position, line: &BlockingLine, config: &FormationConfig) -> bool {
    position == post || position.distance_squared(line.center) <= config.line_arrival_dist_sq
}

/// Annulus around base described by squared radii.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingBand {
    pub inner_sq: i32,
    pub outer_sq: i32,
}

impl RingBand {
    /// Whether an agent at `dist_sq` counts as in position. Members already in
    /// position keep it on the boundary; newcomers must be strictly inside.
    pub fn in_position(&self, dist_sq: i32, was_in_position: bool) -> bool {
        if was_in_position {
            dist_sq >= self.inner_sq && dist_sq <= self.outer_sq
        } else {
            dist_sq > self.inner_sq && dist_sq < self.outer_sq
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentryRing {
    pub band: RingBand,
    pub distance: i32,
}

pub fn sentry_ring(map: MapProfile) -> SentryRing {
    match map.class() {
        MapClass::Small => SentryRing {
            band: RingBand {
                inner_sq: 9,
                outer_sq: 16,
            },
            distance: 4,
        },
        MapClass::Medium => SentryRing {
            band: RingBand {
                inner_sq: 16,
                outer_sq: 25,
            },
            distance: 5,
        },
        MapClass::Large => SentryRing {
            band: RingBand {
                inner_sq: 25,
                outer_sq: 36,
            },
            distance: 6,
        },
    }
}

pub fn guardian_band(config: &FormationConfig) -> RingBand {
    RingBand {
        inner_sq: config.guardian_inner_sq,
        outer_sq: config.guardian_outer_sq,
    }
}

fn ring_direction(id: u64, toward_enemy: Direction, config: &FormationConfig) -> Direction {
    if id % 100 < config.sentry_enemy_facing_percent && toward_enemy != Direction::Center {
        match (id / 100) % 3 {
            0 => toward_enemy.rotate_left(),
            1 => toward_enemy,
            _ => toward_enemy.rotate_right(),
        }
    } else {
        COMPASS[((id / 7) % 8) as usize]
    }
}

pub fn uses_shield_wall(id: u64, config: &FormationConfig) -> bool {
    (id >> 4) % 100 < config.shield_wall_percent
}

/// Sentry post: either a ring cell or a shield-wall cell in front of base.
pub fn sentry_post(
    id: u64,
    base: Position,
    toward_enemy: Direction,
    map: MapProfile,
    config: &FormationConfig,
) -> Position {
    let post = if uses_shield_wall(id, config) && toward_enemy != Direction::Center {
        let lateral = (id % 5) as i32 - 2;
        base.step(toward_enemy, config.shield_wall_distance)
            .step(toward_enemy.perpendicular(), lateral)
    } else {
        let dir = ring_direction(id, toward_enemy, config);
        base.step(dir, sentry_ring(map).distance)
    };
    map.clamp(post)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardianOrder {
    /// Drifted beyond the outer radius.
    Return,
    /// A hostile is slipping past toward base.
    Intercept(Position),
    /// Too close to base; make room.
    StepOut(Direction),
    Hold,
}

pub fn guardian_order(
    me: Position,
    base: Position,
    hostile_workers: &[Position],
    config: &FormationConfig,
) -> GuardianOrder {
    let my_dist = me.distance_squared(base);

    let bypass = hostile_workers
        .iter()
        .copied()
        .filter(|h| {
            let d = h.distance_squared(base);
            d <= config.guardian_attack_dist_sq && d < my_dist
        })
        .min_by_key(|h| h.distance_squared(base));
    if let Some(hostile) = bypass {
        return GuardianOrder::Intercept(hostile);
    }

    let band = guardian_band(config);
    if my_dist > band.outer_sq {
        GuardianOrder::Return
    } else if my_dist < band.inner_sq {
        let away = base.direction_to(me);
        GuardianOrder::StepOut(if away == Direction::Center {
            Direction::North
        } else {
            away
        })
    } else {
        GuardianOrder::Hold
    }
}

pub fn count_within(center: Position, positions: &[Position], radius_sq: i32) -> u32 {
    positions
        .iter()
        .filter(|p| p.distance_squared(center) <= radius_sq)
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_for_known_id_is_stable() {
        assert_eq!(line_slot(12345, 7), 1);
        assert_eq!(line_slot(12345, 7), line_slot(12345, 7));
        for id in 0..50 {
            let slot = line_slot(id, 7);
            assert!((-3..=3).contains(&slot));
        }
    }

    #[test]
    fn line_sits_between_base_and_threat() {
        let config = FormationConfig::default();
        let map = MapProfile::new(60, 60);
        let base = Position::new(10, 10);
        let hostiles = [Position::new(20, 10), Position::new(22, 11)];

        let line = compute_blocking_line(base, &hostiles, map, &config).unwrap();
        assert_eq!(line.facing(), Direction::East);
        assert_eq!(line.axis, Direction::North);
        assert_eq!(line.center, Position::new(14, 10));
    }

    #[test]
    fn off_axis_threat_still_faces_its_true_bearing() {
        let config = FormationConfig::default();
        let map = MapProfile::new(60, 60);
        let base = Position::new(10, 10);

        let line = compute_blocking_line(base, &[Position::new(20, 11)], map, &config).unwrap();
        assert_eq!(line.facing(), Direction::East);
        assert_eq!(line.axis, Direction::North);
        assert_eq!(line.center, Position::new(14, 10));

        let diagonal =
            compute_blocking_line(base, &[Position::new(17, 16)], map, &config).unwrap();
        assert_eq!(diagonal.facing(), Direction::NorthEast);
    }

    #[test]
    fn line_distance_shrinks_as_threat_closes() {
        let config = FormationConfig::default();
        let map = MapProfile::new(60, 60);
        let base = Position::new(10, 10);

        let close = compute_blocking_line(base, &[Position::new(14, 10)], map, &config).unwrap();
        assert_eq!(close.center, Position::new(12, 10));
        let mid = compute_blocking_line(base, &[Position::new(17, 10)], map, &config).unwrap();
        assert_eq!(mid.center, Position::new(13, 10));

        let small = MapProfile::new(30, 30);
        let capped = compute_blocking_line(base, &[Position::new(22, 10)], small, &config).unwrap();
        assert_eq!(capped.center, Position::new(13, 10));
    }

    #[test]
    fn no_line_for_distant_or_absent_threat() {
        let config = FormationConfig::default();
        let map = MapProfile::new(60, 60);
        let base = Position::new(10, 10);
        assert_eq!(compute_blocking_line(base, &[], map, &config), None);
        assert_eq!(
            compute_blocking_line(base, &[Position::new(40, 40)], map, &config),
            None
        );
    }

    #[test]
    fn distant_agents_are_not_pulled_onto_the_line() {
        let config = FormationConfig::default();
        let line = BlockingLine {
            center: Position::new(14, 10),
            axis: Direction::North,
        };
        // id 5: (5 >> 4) % 10 == 0 volunteers; slot 5 % 7 - 3 == 2.
        let near = blocker_post(5, Position::new(12, 12), &line, 3, &config);
        assert_eq!(near, Some(Position::new(14, 12)));
        assert_eq!(blocker_post(5, Position::new(30, 30), &line, 3, &config), None);
        assert_eq!(blocker_post(5, Position::new(12, 12), &line, 2, &config), None);
    }

    #[test]
    fn sentry_band_has_hysteresis() {
        let band = sentry_ring(MapProfile::new(60, 60)).band;
        assert!(!band.in_position(25, false));
        assert!(!band.in_position(36, false));
        assert!(band.in_position(30, false));
        assert!(band.in_position(25, true));
        assert!(band.in_position(36, true));
        assert!(!band.in_position(37, true));
    }

    #[test]
    fn guardian_intercepts_only_genuine_bypass() {
        let config = FormationConfig::default();
        let base = Position::new(10, 10);
        let me = Position::new(12, 11);

        // Hostile within attack range of base but farther than the guardian.
        let outside = [Position::new(13, 10)];
        assert_eq!(guardian_order(me, base, &outside, &config), GuardianOrder::Hold);

        let slipping = [Position::new(11, 10)];
        assert_eq!(
            guardian_order(me, base, &slipping, &config),
            GuardianOrder::Intercept(Position::new(11, 10))
        );
    }

    #[test]
    fn guardian_keeps_its_band() {
        let config = FormationConfig::default();
        let base = Position::new(10, 10);
        assert_eq!(
            guardian_order(Position::new(14, 14), base, &[], &config),
            GuardianOrder::Return
        );
        assert_eq!(
            guardian_order(Position::new(11, 10), base, &[], &config),
            GuardianOrder::StepOut(Direction::East)
        );
    }

    #[test]
    fn sentry_posts_stay_on_map() {
        let config = FormationConfig::default();
        let map = MapProfile::new(30, 30);
        for id in 0..200 {
            let post = sentry_post(id, Position::new(1, 1), Direction::NorthEast, map, &config);
            assert!(map.contains(post));
        }
    }
}
