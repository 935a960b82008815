//! Bug2-style path seeking: head straight for the target, and fall back to
//! following the obstruction's contour until real progress has been made.

use tracing::trace;

use crate::modules::error::WorldError;
use crate::modules::geometry::{Direction, Position};
use crate::modules::world::Mobility;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOutcome {
    Arrived,
    Moved(Direction),
    FollowingContour(Direction),
    Blocked,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekStats {
    pub steps: u64,
    pub contour_entries: u64,
    pub contour_exits: u64,
}

#[derive(Clone, Debug)]
pub struct PathSeeker {
    target: Option<Position>,
    following: bool,
    wall_dir: Direction,
    entry_position: Position,
    entry_distance: i32,
    stats: SeekStats,
}

impl Default for PathSeeker {
    fn default() -> Self {
        Self {
            target: None,
            following: false,
            wall_dir: Direction::North,
            entry_position: Position::origin(),
            entry_distance: i32::MAX,
            stats: SeekStats::default(),
        }
    }
}

impl PathSeeker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    /// Distance squared recorded when contour mode was last entered.
    pub fn entry_distance(&self) -> Option<i32> {
        self.following.then_some(self.entry_distance)
    }

    pub fn stats(&self) -> SeekStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.target = None;
        self.following = false;
    }

    /// Takes at most one step toward `target`. `urgent` ignores hazards.
    pub fn seek<M: Mobility + ?Sized>(
        &mut self,
        world: &mut M,
        target: Position,
        urgent: bool,
    ) -> Result<SeekOutcome, WorldError> {
        let me = world.position();
        if me == target {
            return Ok(SeekOutcome::Arrived);
        }
        if self.target != Some(target) {
            self.target = Some(target);
            self.following = false;
        }

        let direct = me.direction_to(target);
        if urgent {
            return self.seek_urgent(world, direct);
        }

        if self.following {
            let dist = me.distance_squared(target);
            if dist < self.entry_distance && me != self.entry_position {
                self.following = false;
                self.stats.contour_exits += 1;
                trace!(?me, dist, entry = self.entry_distance, "contour exit");
            } else {
                return self.follow_contour(world);
            }
        }

        for dir in [direct, direct.rotate_left(), direct.rotate_right()] {
            if world.can_move_safely(dir) {
                world.move_step(dir)?;
                self.stats.steps += 1;
                return Ok(SeekOutcome::Moved(dir));
            }
        }

        self.following = true;
        self.wall_dir = direct;
        self.entry_position = me;
        self.entry_distance = me.distance_squared(target);
        self.stats.contour_entries += 1;
        trace!(?me, entry = self.entry_distance, "contour entry");
        self.follow_contour(world)
    }

    fn follow_contour<M: Mobility + ?Sized>(
        &mut self,
        world: &mut M,
    ) -> Result<SeekOutcome, WorldError> {
        let mut dir = self.wall_dir;
        for _ in 0..8 {
            if world.can_move_safely(dir) {
                world.move_step(dir)?;
                self.stats.steps += 1;
                // Turn back toward the obstruction so the agent keeps hugging it.
                self.wall_dir = dir.perpendicular();
                return Ok(SeekOutcome::FollowingContour(dir));
            }
            dir = dir.rotate_right();
        }
        // Boxed in: start the next probe one step clockwise.
        self.wall_dir = self.wall_dir.rotate_right();
        Ok(SeekOutcome::Blocked)
    }

    fn seek_urgent<M: Mobility + ?Sized>(
        &mut self,
        world: &mut M,
        direct: Direction,
    ) -> Result<SeekOutcome, WorldError> {
        let candidates = [
            direct,
            direct.rotate_left(),
            direct.rotate_right(),
            direct.rotate_left().rotate_left(),
            direct.rotate_right().rotate_right(),
        ];
        for dir in candidates {
            if world.can_move(dir) {
                world.move_step(dir)?;
                self.stats.steps += 1;
                return Ok(SeekOutcome::Moved(dir));
            }
        }
        Ok(SeekOutcome::Blocked)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::modules::geometry::COMPASS;

    struct Grid {
        width: i32,
        height: i32,
        walls: HashSet<Position>,
        hazards: HashSet<Position>,
        at: Position,
    }

    impl Grid {
        fn new(width: i32, height: i32, at: Position) -> Self {
            Self {
                width,
                height,
                walls: HashSet::new(),
                hazards: HashSet::new(),
                at,
            }
        }

        fn open(&self, pos: Position) -> bool {
            pos.x >= 0
                && pos.y >= 0
                && pos.x < self.width
                && pos.y < self.height
                && !self.walls.contains(&pos)
        }
    }

    impl Mobility for Grid {
        fn position(&self) -> Position {
            self.at
        }

        fn can_move(&self, dir: Direction) -> bool {
            dir != Direction::Center && self.open(self.at.add(dir))
        }

        fn is_hazardous(&self, pos: Position) -> bool {
            self.hazards.contains(&pos)
        }

        fn move_step(&mut self, dir: Direction) -> Result<(), WorldError> {
            if !self.can_move(dir) {
                return Err(WorldError::CannotMove {
                    agent_id: 1,
                    direction: dir,
                });
            }
            self.at = self.at.add(dir);
            Ok(())
        }
    }

    #[test]
    fn open_ground_moves_directly() {
        let mut grid = Grid::new(10, 10, Position::new(1, 1));
        let mut seeker = PathSeeker::new();
        let target = Position::new(4, 4);
        for _ in 0..3 {
            let outcome = seeker.seek(&mut grid, target, false).unwrap();
            assert_eq!(outcome, SeekOutcome::Moved(Direction::NorthEast));
        }
        assert_eq!(seeker.seek(&mut grid, target, false).unwrap(), SeekOutcome::Arrived);
        assert_eq!(seeker.stats().contour_entries, 0);
    }

    #[test]
    fn contour_exit_only_after_real_progress() {
        let mut grid = Grid::new(12, 12, Position::new(2, 4));
        for y in 2..=6 {
            grid.walls.insert(Position::new(5, y));
        }
        let target = Position::new(9, 4);
        let mut seeker = PathSeeker::new();

        let mut entered = false;
        let mut arrived = false;
        for _ in 0..40 {
            let before = seeker.entry_distance();
            let outcome = seeker.seek(&mut grid, target, false).unwrap();
            if seeker.is_following() {
                entered = true;
            }
            if let (Some(entry), false) = (before, seeker.is_following()) {
                // The exit decision is made at the pre-move position.
                assert!(seeker.stats().contour_exits > 0);
                assert!(entry > 0);
            }
            if outcome == SeekOutcome::Arrived {
                arrived = true;
                break;
            }
        }
        assert!(entered, "wall should force contour mode");
        assert!(arrived, "seeker should get around the wall");
        assert_eq!(seeker.stats().contour_exits, 1);
    }

    #[test]
    fn never_exits_while_no_closer_than_entry() {
        let mut grid = Grid::new(12, 12, Position::new(2, 4));
        for y in 2..=6 {
            grid.walls.insert(Position::new(5, y));
        }
        let target = Position::new(9, 4);
        let mut seeker = PathSeeker::new();

        for _ in 0..40 {
            let pos = grid.at;
            let entry = seeker.entry_distance();
            seeker.seek(&mut grid, target, false).unwrap();
            if let Some(entry) = entry {
                if !seeker.is_following() {
                    assert!(pos.distance_squared(target) < entry);
                }
            }
            if grid.at == target {
                break;
            }
        }
        assert_eq!(grid.at, target);
    }

    #[test]
    fn new_target_resets_contour_mode() {
        let mut grid = Grid::new(12, 12, Position::new(4, 4));
        for y in 2..=6 {
            grid.walls.insert(Position::new(5, y));
        }
        let mut seeker = PathSeeker::new();
        seeker.seek(&mut grid, Position::new(9, 4), false).unwrap();
        assert!(seeker.is_following());

        let outcome = seeker.seek(&mut grid, Position::new(0, 3), false).unwrap();
        assert!(!seeker.is_following());
        assert_eq!(outcome, SeekOutcome::Moved(Direction::West));
    }

    #[test]
    fn boxed_in_contour_rotates_its_probe() {
        let mut grid = Grid::new(3, 3, Position::new(1, 1));
        for dir in COMPASS {
            grid.walls.insert(Position::new(1, 1).add(dir));
        }
        let mut seeker = PathSeeker::new();
        let target = Position::new(2, 1);
        assert_eq!(seeker.seek(&mut grid, target, false).unwrap(), SeekOutcome::Blocked);
        assert!(seeker.is_following());
        assert_eq!(seeker.wall_dir, Direction::SouthEast);

        // Opening the cell clockwise of the last probe lets the next tick take it.
        grid.walls.remove(&Position::new(1, 0));
        assert_eq!(
            seeker.seek(&mut grid, target, false).unwrap(),
            SeekOutcome::FollowingContour(Direction::South)
        );
    }

    #[test]
    fn hazards_are_avoided_unless_urgent() {
        let mut grid = Grid::new(10, 10, Position::new(1, 5));
        grid.hazards.insert(Position::new(3, 5));

        let mut careful = PathSeeker::new();
        let outcome = careful.seek(&mut grid, Position::new(8, 5), false).unwrap();
        assert!(!matches!(outcome, SeekOutcome::Moved(Direction::East)));

        grid.at = Position::new(1, 5);
        let mut urgent = PathSeeker::new();
        let outcome = urgent.seek(&mut grid, Position::new(8, 5), true).unwrap();
        assert_eq!(outcome, SeekOutcome::Moved(Direction::East));
    }
}
