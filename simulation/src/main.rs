//! Courier - contact-based DTN simulation
//!
//! Runs scenario files or one of the built-in scenarios and prints
//! delivery, contact and search-coverage summaries.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use courier_routing::EngineRegistry;
use courier_simulation::{
    ContactReport, EventLog, MessageStatsReport, ScenarioConfig, SearchCoverage, World, scenarios,
};

#[derive(Parser)]
#[command(
    name = "courier",
    about = "Contact-based DTN routing simulation",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file and print summaries
    Run {
        /// Path to the scenario JSON file
        config: PathBuf,

        /// Override the scenario seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override the scenario end time (seconds)
        #[arg(short, long)]
        end_time: Option<f64>,

        /// Write every event as JSON lines to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Run one of the built-in scenarios
    Scenario {
        name: ScenarioName,

        /// Routing strategy for the random scenario
        #[arg(short, long, default_value = "epidemic")]
        engine: String,

        /// Seed for the search and random scenarios
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },

    /// Run a scenario file and print the final world snapshot as JSON
    Snapshot {
        /// Path to the scenario JSON file
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ScenarioName {
    /// Two hosts meet and part
    Contact,
    /// Multi-hop delivery along a chain
    Relay,
    /// A scripted courier ferries a message
    Courier,
    /// Searching agents look for targets
    Search,
    /// Random-waypoint hosts with generated traffic
    Random,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            seed,
            end_time,
            events,
        } => {
            let mut scenario = load(&config)?;
            if let Some(seed) = seed {
                scenario.seed = seed;
            }
            if let Some(end_time) = end_time {
                scenario.end_time = end_time;
            }
            run_file(&scenario, events)?;
        }
        Commands::Scenario { name, engine, seed } => {
            match name {
                ScenarioName::Contact => scenarios::run_contact_scenario()?,
                ScenarioName::Relay => scenarios::run_relay_scenario()?,
                ScenarioName::Courier => scenarios::run_courier_scenario()?,
                ScenarioName::Search => scenarios::run_search_scenario(seed)?,
                ScenarioName::Random => scenarios::run_random_scenario(&engine, seed)?,
            };
        }
        Commands::Snapshot { config } => {
            let scenario = load(&config)?;
            let mut world = build(&scenario)?;
            world.run()?;
            println!("{}", world.snapshot().to_json_pretty()?);
        }
    }

    Ok(())
}

fn load(path: &Path) -> anyhow::Result<ScenarioConfig> {
    ScenarioConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn build(scenario: &ScenarioConfig) -> anyhow::Result<World> {
    scenario
        .build_world(&EngineRegistry::with_builtin())
        .with_context(|| format!("building scenario '{}'", scenario.name))
}

fn run_file(scenario: &ScenarioConfig, events: Option<PathBuf>) -> anyhow::Result<()> {
    let mut world = build(scenario)?;
    let stats = Rc::new(RefCell::new(MessageStatsReport::new()));
    let contacts = Rc::new(RefCell::new(ContactReport::new()));
    world.add_listener(Box::new(Rc::clone(&stats)));
    world.add_listener(Box::new(Rc::clone(&contacts)));
    let log = events.as_ref().map(|_| Rc::new(RefCell::new(EventLog::new())));
    if let Some(log) = &log {
        world.add_listener(Box::new(Rc::clone(log)));
    }

    world.run()?;

    println!("\n=== {} (seed {}) ===", scenario.name, scenario.seed);
    println!("sim_time: {:.1}", world.time());
    println!("\n--- Messages ---\n{}", stats.borrow());
    println!("\n--- Contacts ---\n{}", contacts.borrow());
    if let Some(coverage) = SearchCoverage::from_world(&world) {
        println!("\n--- Search coverage ---\n{coverage}");
    }

    if let (Some(path), Some(log)) = (events, log) {
        let log = log.borrow();
        std::fs::write(&path, log.to_json_lines()?).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), events = log.events().len(), "Event log written");
    }
    Ok(())
}
