//! Budgeted fortification placement.
//!
//! Scanning every candidate cell is too expensive for one tick, so the
//! planner checks a few candidates per tick and resumes where it stopped.
//! Repeated failures loosen the layout; too many failures retire the planner
//! for the rest of the run.

use tracing::{debug, info};

use crate::modules::config::FortificationConfig;
use crate::modules::error::WorldError;
use crate::modules::geometry::{COMPASS, Direction, Position};
use crate::modules::world::{Action, WorldInterface};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Ring,
    Line,
    Fallback,
    /// Close cells toward the threat; used while under pressure.
    Emergency,
}

/// Where fortifications may be placed.
pub trait FortifySite {
    fn can_fortify(&self, pos: Position) -> bool;
    fn fortify(&mut self, pos: Position) -> Result<(), WorldError>;
}

impl<W: WorldInterface + ?Sized> FortifySite for W {
    fn can_fortify(&self, pos: Position) -> bool {
        self.can_act(Action::Fortify, pos)
    }

    fn fortify(&mut self, pos: Position) -> Result<(), WorldError> {
        self.act(Action::Fortify, pos)
    }
}

/// Directions fanned out from `toward`: straight first, then alternating
/// left and right, the opposite direction last.
fn fan(toward: Direction) -> [Direction; 8] {
    let toward = if toward == Direction::Center {
        Direction::North
    } else {
        toward
    };
    let mut out = [toward; 8];
    let mut left = toward;
    let mut right = toward;
    let mut i = 1;
    while i < 7 {
        left = left.rotate_left();
        right = right.rotate_right();
        out[i] = left;
        out[i + 1] = right;
        i += 2;
    }
    out[7] = toward.opposite();
    out
}

pub fn layout_cells(layout: Layout, base: Position, toward: Direction) -> Vec<Position> {
    let fan = fan(toward);
    let toward = fan[0];
    let mut cells = Vec::new();
    match layout {
        Layout::Ring => {
            for dist in [4, 3, 2] {
                for dir in fan {
                    cells.push(base.step(dir, dist));
                }
            }
        }
        Layout::Line => {
            let perp = toward.perpendicular();
            for dist in (2..=5).rev() {
                for offset in [0, 1, -1, 2, -2] {
                    cells.push(base.step(toward, dist).step(perp, offset));
                }
            }
            for dist in 2..=4 {
                cells.push(base.step(toward.rotate_left(), dist));
                cells.push(base.step(toward.rotate_right(), dist));
            }
        }
        Layout::Fallback => {
            for dist in (2..=6).rev() {
                for dir in COMPASS {
                    for offset in [0, 1, -1, 2, -2] {
                        cells.push(base.step(dir, dist).step(dir.perpendicular(), offset));
                    }
                }
            }
        }
        Layout::Emergency => {
            for dist in [2, 3] {
                for dir in &fan[..3] {
                    cells.push(base.step(*dir, dist));
                }
            }
        }
    }
    let mut seen = std::collections::HashSet::new();
    cells.retain(|c| seen.insert(*c));
    cells
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementContext {
    pub tick: u64,
    pub base: Position,
    pub toward: Direction,
    pub threat: u32,
    /// Last tick of the unprompted placement window.
    pub window_end: u64,
    /// Placements the colony wants regardless of the window.
    pub minimum: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementReport {
    pub layout: Layout,
    pub attempts: u32,
    pub placed: Option<Position>,
}

#[derive(Clone, Debug)]
pub struct FortificationPlanner {
    layout: Layout,
    resume: usize,
    ring_failures: u32,
    line_failures: u32,
    failures_since_success: u32,
    pass_found_nothing: bool,
    placed: u32,
    gave_up: bool,
    stalled: bool,
}

impl Default for FortificationPlanner {
    fn default() -> Self {
        Self {
            layout: Layout::Ring,
            resume: 0,
            ring_failures: 0,
            line_failures: 0,
            failures_since_success: 0,
            pass_found_nothing: true,
            placed: 0,
            gave_up: false,
            stalled: false,
        }
    }
}

impl FortificationPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn placed(&self) -> u32 {
        self.placed
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn stalled(&self) -> bool {
        self.stalled
    }

    pub fn resume_index(&self) -> usize {
        self.resume
    }

    /// Whether the planner still wants to run this tick.
    pub fn wants_to_run(&self, ctx: &PlacementContext, config: &FortificationConfig) -> bool {
        !self.gave_up
            && self.placed < config.target
            && (ctx.tick <= ctx.window_end || self.placed < ctx.minimum)
    }

    pub fn run_tick<S: FortifySite + ?Sized>(
        &mut self,
        site: &mut S,
        ctx: &PlacementContext,
        config: &FortificationConfig,
    ) -> Result<Option<PlacementReport>, WorldError> {
        if !self.wants_to_run(ctx, config) {
            return Ok(None);
        }

        let emergency =
            ctx.threat >= config.emergency_threat && self.placed < config.emergency_limit;
        if emergency {
            let report = self.scan_emergency(site, ctx, config)?;
            return Ok(Some(report));
        }

        let layout = self.layout;
        let cells = layout_cells(layout, ctx.base, ctx.toward);
        let mut attempts = 0;
        let mut placed = None;
        let mut idx = self.resume.min(cells.len());
        while attempts < config.attempts_per_tick && !cells.is_empty() {
            if idx >= cells.len() {
                self.finish_pass(layout);
                idx = 0;
                if self.stalled {
                    break;
                }
            }
            let cell = cells[idx];
            idx += 1;
            attempts += 1;
            if site.can_fortify(cell) {
                site.fortify(cell)?;
                placed = Some(cell);
                break;
            }
        }
        self.resume = idx;

        match placed {
            Some(cell) => {
                self.placed += 1;
                self.pass_found_nothing = false;
                self.failures_since_success = 0;
                match layout {
                    Layout::Ring => self.ring_failures = 0,
                    Layout::Line => self.line_failures = 0,
                    Layout::Fallback | Layout::Emergency => {}
                }
                debug!(tick = ctx.tick, ?layout, x = cell.x, y = cell.y, "fortification placed");
            }
            None => self.record_failure(ctx.tick, config),
        }

        Ok(Some(PlacementReport {
            layout,
            attempts,
            placed,
        }))
    }

    fn scan_emergency<S: FortifySite + ?Sized>(
        &mut self,
        site: &mut S,
        ctx: &PlacementContext,
        config: &FortificationConfig,
    ) -> Result<PlacementReport, WorldError> {
        let cells = layout_cells(Layout::Emergency, ctx.base, ctx.toward);
        let mut attempts = 0;
        for cell in cells.into_iter().take(config.attempts_per_tick as usize) {
            attempts += 1;
            if site.can_fortify(cell) {
                site.fortify(cell)?;
                self.placed += 1;
                return Ok(PlacementReport {
                    layout: Layout::Emergency,
                    attempts,
                    placed: Some(cell),
                });
            }
        }
        Ok(PlacementReport {
            layout: Layout::Emergency,
            attempts,
            placed: None,
        })
    }

    /// Called when the scan wraps around the current layout.
    fn finish_pass(&mut self, layout: Layout) {
        if layout == Layout::Fallback && self.pass_found_nothing {
            self.stalled = true;
        }
        self.pass_found_nothing = true;
    }

    fn record_failure(&mut self, tick: u64, config: &FortificationConfig) {
        self.failures_since_success += 1;
        match self.layout {
            Layout::Ring => {
                self.ring_failures += 1;
                if self.ring_failures >= config.ring_failure_threshold {
                    info!(tick, failures = self.ring_failures, "fortification layout ring -> line");
                    self.switch_layout(Layout::Line);
                }
            }
            Layout::Line => {
                self.line_failures += 1;
                if self.line_failures >= config.line_failure_threshold {
                    info!(tick, failures = self.line_failures, "fortification layout line -> fallback");
                    self.switch_layout(Layout::Fallback);
                }
            }
            Layout::Fallback | Layout::Emergency => {}
        }

        if self.failures_since_success > config.give_up_threshold || self.stalled {
            self.gave_up = true;
            info!(
                tick,
                placed = self.placed,
                failures = self.failures_since_success,
                stalled = self.stalled,
                "fortification placement abandoned"
            );
        }
    }

    fn switch_layout(&mut self, layout: Layout) {
        self.layout = layout;
        self.resume = 0;
        self.pass_found_nothing = true;
    }
}
