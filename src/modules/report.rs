//! End-of-run summary written by `warren run --report`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::modules::arena::{Arena, TeamStats};
use crate::modules::phase::{OpponentProfile, Phase};
use crate::modules::world::Team;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamReport {
    pub team: Team,
    pub stock: u32,
    pub controller_health: i32,
    pub workers: usize,
    pub fortifications: usize,
    pub phase: Phase,
    pub opponent: OpponentProfile,
    pub stats: TeamStats,
    /// Raw shared-table slots at the end of the run.
    pub table: Vec<u16>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub winner: Option<Team>,
    /// Team with the healthier controller when the tick limit ended the run.
    pub leader: Option<Team>,
    pub ticks: u64,
    pub seed: u64,
    pub width: i32,
    pub height: i32,
    pub teams: Vec<TeamReport>,
    pub generated_at: String,
}

impl RunReport {
    pub fn from_arena(arena: &Arena) -> Self {
        let world = arena.world();
        let teams: Vec<TeamReport> = [Team::Red, Team::Blue]
            .into_iter()
            .map(|team| TeamReport {
                team,
                stock: world.stock(team),
                controller_health: world.controller_health(team),
                workers: world.worker_count(team),
                fortifications: world.fortification_count(team),
                phase: world.table(team).phase(),
                opponent: world.table(team).opponent(),
                stats: world.stats(team),
                table: world.table(team).slots().to_vec(),
            })
            .collect();
        let leader = world.winner().or_else(|| {
            let red = world.controller_health(Team::Red);
            let blue = world.controller_health(Team::Blue);
            match red.cmp(&blue) {
                std::cmp::Ordering::Greater => Some(Team::Red),
                std::cmp::Ordering::Less => Some(Team::Blue),
                std::cmp::Ordering::Equal => None,
            }
        });
        let map = world.map();
        Self {
            winner: world.winner(),
            leader,
            ticks: world.tick(),
            seed: arena.setup().seed,
            width: map.width,
            height: map.height,
            teams,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn team(&self, team: Team) -> Option<&TeamReport> {
        self.teams.iter().find(|t| t.team == team)
    }

    pub fn save(&self, path: &Path) -> io::Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(path.to_path_buf())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::arena::ArenaSetup;
    use crate::modules::config::SwarmConfig;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("warren-report-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn report_reflects_the_arena() {
        let mut arena = Arena::new(
            ArenaSetup {
                seed: 5,
                hazard_creature: false,
                ..ArenaSetup::default()
            },
            SwarmConfig::default(),
        );
        for _ in 0..10 {
            arena.step();
        }
        let report = RunReport::from_arena(&arena);
        assert_eq!(report.ticks, 10);
        assert_eq!(report.seed, 5);
        assert_eq!(report.teams.len(), 2);
        let red = report.team(Team::Red).unwrap();
        assert_eq!(red.table.len(), 48);
        assert!(red.controller_health > 0);
        assert_eq!(red.opponent, arena.world().table(Team::Red).opponent());
    }

    #[test]
    fn save_and_load() {
        let arena = Arena::new(ArenaSetup::default(), SwarmConfig::default());
        let report = RunReport::from_arena(&arena);
        let path = temp_path("nested/report.json");
        let saved = report.save(&path).unwrap();
        assert_eq!(saved, path);
        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        let _ = fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }
}
