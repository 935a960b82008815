use serde::{Deserialize, Serialize};

/// Maps with a diagonal below this are considered small.
pub const SMALL_MAP_DIAGONAL: i32 = 50;
/// Maps with a diagonal below this (and not small) are considered medium.
pub const MEDIUM_MAP_DIAGONAL: i32 = 70;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn origin() -> Self {
        Self { x: 0, y: 0 }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub const fn add(self, dir: Direction) -> Self {
        self.offset(dir.dx(), dir.dy())
    }

    /// Moves `n` steps along `dir`.
    pub const fn step(self, dir: Direction, n: i32) -> Self {
        self.offset(dir.dx() * n, dir.dy() * n)
    }

    pub const fn distance_squared(self, other: Position) -> i32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub const fn is_adjacent(self, other: Position) -> bool {
        self.distance_squared(other) <= 2
    }

    pub const fn direction_to(self, other: Position) -> Direction {
        Direction::from_delta(other.x - self.x, other.y - self.y)
    }

    pub const fn midpoint(self, other: Position) -> Position {
        Position {
            x: (self.x + other.x) / 2,
            y: (self.y + other.y) / 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    Center,
}

/// The eight movement directions in clockwise order starting at north.
pub const COMPASS: [Direction; 8] = [
    Direction::North,
    Direction::NorthEast,
    Direction::East,
    Direction::SouthEast,
    Direction::South,
    Direction::SouthWest,
    Direction::West,
    Direction::NorthWest,
];

impl Direction {
    pub const fn dx(self) -> i32 {
        match self {
            Direction::NorthEast | Direction::East | Direction::SouthEast => 1,
            Direction::SouthWest | Direction::West | Direction::NorthWest => -1,
            Direction::North | Direction::South | Direction::Center => 0,
        }
    }

    pub const fn dy(self) -> i32 {
        match self {
            Direction::NorthWest | Direction::North | Direction::NorthEast => 1,
            Direction::SouthWest | Direction::South | Direction::SouthEast => -1,
            Direction::West | Direction::East | Direction::Center => 0,
        }
    }

    pub const fn ordinal(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::NorthEast => 1,
            Direction::East => 2,
            Direction::SouthEast => 3,
            Direction::South => 4,
            Direction::SouthWest => 5,
            Direction::West => 6,
            Direction::NorthWest => 7,
            Direction::Center => 8,
        }
    }

    pub const fn from_ordinal(ordinal: u8) -> Option<Direction> {
        if ordinal < 8 {
            Some(COMPASS[ordinal as usize])
        } else if ordinal == 8 {
            Some(Direction::Center)
        } else {
            None
        }
    }

    /// Nearest of the eight compass directions by angle; `(0, 0)` is `Center`.
    ///
    /// A delta within 22.5 degrees of an axis snaps to that axis. The cutoff
    /// uses 5/12 as an integer stand-in for tan(22.5°).
    pub const fn from_delta(dx: i32, dy: i32) -> Direction {
        let (ax, ay) = (dx.abs(), dy.abs());
        let (sx, sy) = if ay * 12 < ax * 5 {
            (dx.signum(), 0)
        } else if ax * 12 < ay * 5 {
            (0, dy.signum())
        } else {
            (dx.signum(), dy.signum())
        };
        match (sx, sy) {
            (0, 1) => Direction::North,
            (1, 1) => Direction::NorthEast,
            (1, 0) => Direction::East,
            (1, -1) => Direction::SouthEast,
            (0, -1) => Direction::South,
            (-1, -1) => Direction::SouthWest,
            (-1, 0) => Direction::West,
            (-1, 1) => Direction::NorthWest,
            _ => Direction::Center,
        }
    }

    /// Rotates 45 degrees counter-clockwise.
    pub const fn rotate_left(self) -> Direction {
        match self {
            Direction::Center => Direction::Center,
            dir => COMPASS[((dir.ordinal() + 7) % 8) as usize],
        }
    }

    /// Rotates 45 degrees clockwise.
    pub const fn rotate_right(self) -> Direction {
        match self {
            Direction::Center => Direction::Center,
            dir => COMPASS[((dir.ordinal() + 1) % 8) as usize],
        }
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Center => Direction::Center,
            dir => COMPASS[((dir.ordinal() + 4) % 8) as usize],
        }
    }

    /// Perpendicular axis (90 degrees counter-clockwise).
    pub const fn perpendicular(self) -> Direction {
        self.rotate_left().rotate_left()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapClass {
    Small,
    Medium,
    Large,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapProfile {
    pub width: i32,
    pub height: i32,
}

impl MapProfile {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn diagonal(self) -> i32 {
        let sq = (self.width * self.width + self.height * self.height).max(0) as u32;
        sq.isqrt() as i32
    }

    pub fn class(self) -> MapClass {
        let diagonal = self.diagonal();
        if diagonal < SMALL_MAP_DIAGONAL {
            MapClass::Small
        } else if diagonal < MEDIUM_MAP_DIAGONAL {
            MapClass::Medium
        } else {
            MapClass::Large
        }
    }

    pub const fn contains(self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    pub fn clamp(self, pos: Position) -> Position {
        Position {
            x: pos.x.clamp(0, (self.width - 1).max(0)),
            y: pos.y.clamp(0, (self.height - 1).max(0)),
        }
    }

    /// Rotationally symmetric counterpart of `pos`.
    pub const fn mirror(self, pos: Position) -> Position {
        Position {
            x: self.width - pos.x - 1,
            y: self.height - pos.y - 1,
        }
    }

    pub const fn center(self) -> Position {
        Position {
            x: self.width / 2,
            y: self.height / 2,
        }
    }

    /// Upper bound on how far a blocking line may sit from base.
    pub fn block_distance_cap(self) -> i32 {
        match self.class() {
            MapClass::Small => 3,
            MapClass::Medium | MapClass::Large => 4,
        }
    }

    /// Last tick on which fortification placement runs unprompted.
    pub fn fortification_window_end(self) -> u64 {
        match self.class() {
            MapClass::Small => 15,
            MapClass::Medium => 25,
            MapClass::Large => 30,
        }
    }

    pub fn exploration_cap_sq(self) -> Option<i32> {
        match self.class() {
            MapClass::Small => Some(36),
            MapClass::Medium | MapClass::Large => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotations_are_inverse() {
        for dir in COMPASS {
            assert_eq!(dir.rotate_left().rotate_right(), dir);
            assert_eq!(dir.opposite().opposite(), dir);
        }
        assert_eq!(Direction::North.rotate_left(), Direction::NorthWest);
        assert_eq!(Direction::East.perpendicular(), Direction::North);
        assert_eq!(Direction::Center.rotate_left(), Direction::Center);
    }

    #[test]
    fn direction_from_delta_snaps_by_angle() {
        assert_eq!(Direction::from_delta(5, 3), Direction::NorthEast);
        assert_eq!(Direction::from_delta(5, 2), Direction::East);
        assert_eq!(Direction::from_delta(10, 1), Direction::East);
        assert_eq!(Direction::from_delta(-1, -7), Direction::South);
        assert_eq!(Direction::from_delta(-6, 5), Direction::NorthWest);
        assert_eq!(Direction::from_delta(0, -9), Direction::South);
        assert_eq!(Direction::from_delta(0, 0), Direction::Center);
        for dir in COMPASS {
            assert_eq!(Direction::from_delta(dir.dx(), dir.dy()), dir);
            assert_eq!(Direction::from_ordinal(dir.ordinal()), Some(dir));
        }
    }

    #[test]
    fn map_classes_follow_diagonal() {
        assert_eq!(MapProfile::new(30, 30).class(), MapClass::Small);
        assert_eq!(MapProfile::new(40, 40).class(), MapClass::Medium);
        assert_eq!(MapProfile::new(60, 60).class(), MapClass::Large);
        assert_eq!(MapProfile::new(60, 60).diagonal(), 84);
    }

    #[test]
    fn mirror_and_clamp_stay_on_map() {
        let map = MapProfile::new(20, 30);
        assert_eq!(map.mirror(Position::new(2, 3)), Position::new(17, 26));
        assert_eq!(map.clamp(Position::new(-4, 40)), Position::new(0, 29));
        assert!(map.contains(Position::new(19, 29)));
        assert!(!map.contains(Position::new(20, 0)));
    }
}
