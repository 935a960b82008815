use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use warren::{Arena, ArenaSetup, Event, RunReport, SwarmConfig, Team, TickResult};

#[derive(Parser)]
#[command(
    name = "warren",
    version,
    about = "Decentralized swarm coordination in a two-team arena",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a match between two identical colonies
    Run {
        /// Tick limit
        #[arg(short = 't', long, default_value_t = 500)]
        ticks: u64,
        /// Seed for map generation and hazard wandering
        #[arg(short = 's', long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 40)]
        width: i32,
        #[arg(long, default_value_t = 40)]
        height: i32,
        /// Workers each controller starts with
        #[arg(long, default_value_t = 2)]
        workers: u32,
        /// Starting stock per team
        #[arg(long, default_value_t = 1200)]
        stock: u32,
        /// Leave out the roaming hazard creature
        #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
        no_hazard: bool,
        /// JSON configuration (defaults apply when omitted)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
        /// Write a JSON run report here when the match ends
        #[arg(short = 'r', long)]
        report: Option<PathBuf>,
        /// Print a summary line every N ticks (0 disables)
        #[arg(long, default_value_t = 50)]
        every: u64,
        /// Print every event of every tick
        #[arg(short = 'v', long, action = ArgAction::SetTrue, default_value_t = false)]
        verbose: bool,
        /// Delay between ticks in milliseconds
        #[arg(short = 'd', long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Print the default configuration, or validate a file
    Config {
        /// Configuration file to validate
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

struct RunArgs {
    ticks: u64,
    setup: ArenaSetup,
    config: Option<PathBuf>,
    report: Option<PathBuf>,
    every: u64,
    verbose: bool,
    delay: Duration,
}

pub fn run() {
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli.command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn dispatch(command: Command) -> Result<(), String> {
    match command {
        Command::Run {
            ticks,
            seed,
            width,
            height,
            workers,
            stock,
            no_hazard,
            config,
            report,
            every,
            verbose,
            delay_ms,
        } => run_match(RunArgs {
            ticks,
            setup: ArenaSetup {
                width,
                height,
                seed,
                starting_stock: stock,
                starting_workers: workers,
                hazard_creature: !no_hazard,
                ..ArenaSetup::default()
            },
            config,
            report,
            every,
            verbose,
            delay: Duration::from_millis(delay_ms),
        }),
        Command::Config { check } => run_config(check),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SwarmConfig, String> {
    match path {
        None => Ok(SwarmConfig::default()),
        Some(path) => {
            if !path.exists() {
                return Err(format!("config file {} not found", path.display()));
            }
            SwarmConfig::load(path).map_err(|e| e.to_string())
        }
    }
}

fn run_config(check: Option<PathBuf>) -> Result<(), String> {
    match check {
        Some(path) => {
            load_config(Some(&path))?;
            println!("{}: ok", path.display());
        }
        None => {
            let json = SwarmConfig::default().to_json().map_err(|e| e.to_string())?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn run_match(args: RunArgs) -> Result<(), String> {
    if args.setup.width < 8 || args.setup.height < 8 {
        return Err("arena must be at least 8x8".into());
    }
    if args.setup.width > 1000 || args.setup.height > 1000 {
        return Err("arena must fit a 10-bit coordinate (at most 1000 per side)".into());
    }
    let config = load_config(args.config.as_ref())?;
    let mut arena = Arena::new(args.setup, config);
    println!(
        "Arena {}x{} seed={} | red base {:?} | blue base {:?}",
        arena.world().map().width,
        arena.world().map().height,
        arena.setup().seed,
        arena.world().controller_position(Team::Red),
        arena.world().controller_position(Team::Blue),
    );

    let mut faults = 0usize;
    let mut winner = None;
    while arena.world().tick() < args.ticks && winner.is_none() {
        let tick = arena.step();
        faults += tick.faults.len();
        winner = tick.winner;
        print_tick(&tick, args.verbose);
        if args.every > 0 && tick.tick % args.every == 0 {
            print_summary(&arena);
        }
        if !args.delay.is_zero() {
            thread::sleep(args.delay);
        }
    }

    let report = RunReport::from_arena(&arena);
    print_report(&report, faults);
    if let Some(path) = args.report {
        let saved = report
            .save(&path)
            .map_err(|e| format!("write report {}: {}", path.display(), e))?;
        println!("Report written to {}", saved.display());
    }
    if winner.is_none() && report.leader.is_none() {
        println!("Result: draw");
    }
    Ok(())
}

fn print_tick(tick: &TickResult, verbose: bool) {
    for event in &tick.events {
        if let Event::PhaseChanged { team, from, to } = event {
            println!("Tick {}: {} phase {} -> {}", tick.tick, team, from, to);
        } else if verbose {
            if let Some(line) = describe_event(event) {
                println!(" - {}", line);
            }
        }
    }
}

fn print_summary(arena: &Arena) {
    let world = arena.world();
    let line = [Team::Red, Team::Blue]
        .iter()
        .map(|team| {
            let table = world.table(*team);
            format!(
                "{}: hp={} stock={} workers={} phase={} threat={} window={}",
                team,
                world.controller_health(*team),
                world.stock(*team),
                world.worker_count(*team),
                table.phase(),
                table.threat(),
                table.attack_window().map_or("-".to_string(), |w| format!("{:?}", w))
            )
        })
        .collect::<Vec<_>>()
        .join(" | ");
    println!("Tick {} | {}", world.tick(), line);
}

fn print_report(report: &RunReport, faults: usize) {
    println!(
        "Finished after {} ticks | winner={} | leader={} | faulted ticks={}",
        report.ticks,
        report.winner.map_or("-".to_string(), |t| t.to_string()),
        report.leader.map_or("-".to_string(), |t| t.to_string()),
        faults
    );
    for team in &report.teams {
        println!(
            "{}: hp={} stock={} workers={} fortifications={} phase={} opponent={} | spawned={} deaths={} delivered={} attacks={} captures={} trap hits={}",
            team.team,
            team.controller_health,
            team.stock,
            team.workers,
            team.fortifications,
            team.phase,
            team.opponent,
            team.stats.spawned,
            team.stats.deaths,
            team.stats.delivered,
            team.stats.attacks,
            team.stats.captures,
            team.stats.fortification_hits,
        );
    }
}

fn describe_event(event: &Event) -> Option<String> {
    let line = match event {
        Event::TickStarted { tick } => format!("tick {} started", tick),
        Event::TickCompleted { tick } => format!("tick {} completed", tick),
        Event::AgentSpawned {
            agent_id,
            team,
            kind,
            position,
        } => format!(
            "{} {:?} #{} spawned at ({}, {})",
            team, kind, agent_id, position.x, position.y
        ),
        Event::AgentMoved { agent_id, from, to } => format!(
            "#{} moved ({}, {}) -> ({}, {})",
            agent_id, from.x, from.y, to.x, to.y
        ),
        Event::AgentAttacked {
            attacker,
            target,
            damage,
        } => format!("#{} hit #{} for {}", attacker, target, damage),
        Event::AgentDied {
            agent_id,
            team,
            reason,
        } => format!("{} #{} died ({:?})", team, agent_id, reason),
        Event::ResourceCollected {
            agent_id,
            position,
            amount,
        } => format!(
            "#{} collected {} at ({}, {})",
            agent_id, amount, position.x, position.y
        ),
        Event::ResourceDelivered {
            agent_id,
            team,
            amount,
        } => format!("#{} delivered {} to {}", agent_id, amount, team),
        Event::Fortified { team, position } => {
            format!("{} fortified ({}, {})", team, position.x, position.y)
        }
        Event::FortificationTriggered {
            owner,
            victim,
            position,
        } => format!(
            "{} trap at ({}, {}) hit #{}",
            owner, position.x, position.y, victim
        ),
        Event::AgentCaptured { captor, captive } => format!("#{} captured #{}", captor, captive),
        Event::CaptiveReleased {
            captor,
            captive,
            position,
        } => format!(
            "#{} released #{} at ({}, {})",
            captor, captive, position.x, position.y
        ),
        Event::PhaseChanged { .. } => return None,
        Event::TickFaulted { agent_id } => format!("#{} tick faulted", agent_id),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::parse_from([
            "warren", "run", "--ticks", "10", "--seed", "9", "--width", "30", "--no-hazard",
        ]);
        match cli.command {
            Command::Run {
                ticks,
                seed,
                width,
                height,
                no_hazard,
                ..
            } => {
                assert_eq!(ticks, 10);
                assert_eq!(seed, 9);
                assert_eq!(width, 30);
                assert_eq!(height, 40);
                assert!(no_hazard);
            }
            Command::Config { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn short_match_runs_to_the_limit() {
        let result = dispatch(Command::Run {
            ticks: 5,
            seed: 1,
            width: 30,
            height: 30,
            workers: 1,
            stock: 500,
            no_hazard: true,
            config: None,
            report: None,
            every: 0,
            verbose: true,
            delay_ms: 0,
        });
        assert!(result.is_ok());
    }

    #[test]
    fn tiny_arena_is_rejected() {
        let result = dispatch(Command::Run {
            ticks: 5,
            seed: 1,
            width: 4,
            height: 30,
            workers: 1,
            stock: 500,
            no_hazard: true,
            config: None,
            report: None,
            every: 0,
            verbose: false,
            delay_ms: 0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_is_an_error() {
        let result = run_config(Some(PathBuf::from("/nonexistent/warren.json")));
        assert!(result.is_err());
    }
}
