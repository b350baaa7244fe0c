//! Pre-defined scenarios
//!
//! Small hand-built worlds that show the engine end to end and double as
//! smoke tests for the CLI.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::info;

use courier_core::{Coord, CourierResult, HostAddress, InterfaceSpec, Message, SimEvent};
use courier_routing::{EngineConfig, EngineRegistry, Epidemic};

use crate::config::{GroupConfig, ScenarioConfig};
use crate::generator::MessageGeneratorConfig;
use crate::mobility::{MovementConfig, Scripted, Stationary};
use crate::report::{ContactReport, MessageStatsReport, SearchCoverage};
use crate::world::{World, WorldConfig};

fn radio(range: f64, speed: f64) -> Vec<InterfaceSpec> {
    vec![InterfaceSpec::new("radio", range, speed)]
}

/// Two stationary hosts come into contact, then one is carried away
///
/// ```text
/// t=0    n0 ---5--- n1      (range 10: contact up)
/// t=50   n0 -------20------- n1   (contact down)
/// ```
pub fn run_contact_scenario() -> CourierResult<World> {
    info!("=== Running contact scenario ===");

    let mut world = World::new(WorldConfig::default())?;
    let contacts = Rc::new(RefCell::new(ContactReport::new()));
    world.add_listener(Box::new(Rc::clone(&contacts)));

    let engine = Epidemic::default();
    for x in [0.0, 5.0] {
        world.spawn_host("n", &radio(10.0, 10.0), Box::new(Stationary::new(Coord::new(x, 0.0))), 1_000, &engine);
    }

    world.run_ticks(50)?;
    println!("t={:>5.1}  connections: {}", world.time(), world.connections().len());

    if let Some(host) = world.host_mut(HostAddress(1)) {
        host.set_location(Coord::new(20.0, 0.0));
    }
    world.run_ticks(50)?;
    println!("t={:>5.1}  connections: {}", world.time(), world.connections().len());
    world.finish();

    println!("\n=== Contacts ===");
    println!("{}", contacts.borrow());
    Ok(world)
}

/// A message hops down a chain of stationary relays
///
/// ```text
/// n0 -- n1 -- n2 -- n3      (8 m apart, range 10)
/// ```
pub fn run_relay_scenario() -> CourierResult<World> {
    info!("=== Running relay scenario ===");

    let mut world = World::new(WorldConfig {
        end_time: 60.0,
        ..WorldConfig::default()
    })?;
    let stats = Rc::new(RefCell::new(MessageStatsReport::new()));
    world.add_listener(Box::new(Rc::clone(&stats)));

    let engine = Epidemic::default();
    for i in 0..4 {
        let location = Coord::new(8.0 * f64::from(i), 0.0);
        world.spawn_host("n", &radio(10.0, 50.0), Box::new(Stationary::new(location)), 1_000, &engine);
    }
    world.create_message(Message::new("M1", HostAddress(0), HostAddress(3), 200, 0.0))?;
    world.run()?;

    println!("\n=== Deliveries ===");
    for event in world.events() {
        if let SimEvent::MessageTransferred {
            message,
            final_delivery: true,
            ..
        } = &event.event
        {
            let path: Vec<String> = message.path.iter().map(ToString::to_string).collect();
            println!("  t={:>5.1}  {} via {}", event.time, message.id, path.join(" -> "));
        }
    }

    println!("\n=== Message stats ===");
    println!("{}", stats.borrow());
    Ok(world)
}

/// Searching agents sweep an area for stationary targets
pub fn run_search_scenario(seed: u64) -> CourierResult<World> {
    info!(seed, "=== Running search scenario ===");

    let targets: Vec<Coord> = [(50.0, 50.0), (150.0, 40.0), (100.0, 150.0), (180.0, 180.0), (20.0, 170.0)]
        .into_iter()
        .map(|(x, y)| Coord::new(x, y))
        .collect();

    let scenario = ScenarioConfig {
        name: "search".to_string(),
        seed,
        end_time: 2_000.0,
        update_interval: 1.0,
        world_size: [200.0, 200.0],
        interfaces: BTreeMap::from([("radio".to_string(), InterfaceSpec::new("radio", 15.0, 250.0))]),
        groups: vec![
            GroupConfig {
                prefix: "A".to_string(),
                count: 3,
                buffer_size: 1_000,
                interfaces: vec!["radio".to_string()],
                engine: EngineConfig::new("searching-agent"),
                movement: MovementConfig::RandomWaypoint {
                    min_speed: 1.0,
                    max_speed: 2.0,
                    min_wait: 0.0,
                    max_wait: 10.0,
                },
            },
            GroupConfig {
                prefix: "S".to_string(),
                count: targets.len(),
                buffer_size: 1_000,
                interfaces: vec!["radio".to_string()],
                engine: EngineConfig::new("direct-delivery"),
                movement: MovementConfig::Stationary { locations: targets },
            },
        ],
        messages: None,
        connectivity_grid: true,
        record_events: false,
    };

    let mut world = scenario.build_world(&EngineRegistry::with_builtin())?;
    world.run()?;

    println!("\n=== Search coverage ===");
    match SearchCoverage::from_world(&world) {
        Some(coverage) => {
            println!("{coverage}");
            for (t, found) in coverage.over_time(250.0) {
                println!("  t={t:>6.0}  discovered: {found}");
            }
        }
        None => println!("  no searching agents or no targets"),
    }
    Ok(world)
}

/// Random-waypoint hosts exchanging generated traffic with a chosen strategy
pub fn run_random_scenario(engine: &str, seed: u64) -> CourierResult<World> {
    info!(engine, seed, "=== Running random scenario ===");

    let scenario = ScenarioConfig {
        name: format!("random-{engine}"),
        seed,
        end_time: 3_600.0,
        update_interval: 1.0,
        world_size: [500.0, 500.0],
        interfaces: BTreeMap::from([("radio".to_string(), InterfaceSpec::new("radio", 30.0, 250.0))]),
        groups: vec![GroupConfig {
            prefix: "n".to_string(),
            count: 30,
            buffer_size: 20_000,
            interfaces: vec!["radio".to_string()],
            engine: EngineConfig::new(engine),
            movement: MovementConfig::RandomWaypoint {
                min_speed: 0.5,
                max_speed: 1.5,
                min_wait: 0.0,
                max_wait: 120.0,
            },
        }],
        messages: Some(MessageGeneratorConfig {
            interval: [25.0, 35.0],
            size: [500, 1_000],
            hosts: [0, 30],
            to_hosts: None,
            prefix: "M".to_string(),
            ttl: Some(1_800.0),
            start: 0.0,
            stop: Some(3_000.0),
        }),
        connectivity_grid: true,
        record_events: false,
    };

    let mut world = scenario.build_world(&EngineRegistry::with_builtin())?;
    let stats = Rc::new(RefCell::new(MessageStatsReport::new()));
    let contacts = Rc::new(RefCell::new(ContactReport::new()));
    world.add_listener(Box::new(Rc::clone(&stats)));
    world.add_listener(Box::new(Rc::clone(&contacts)));
    world.run()?;

    println!("\n=== Message stats ({engine}) ===");
    println!("{}", stats.borrow());
    println!("\n=== Contacts ===");
    println!("{}", contacts.borrow());
    Ok(world)
}

/// A scripted courier carries a message between two distant stationary hosts
pub fn run_courier_scenario() -> CourierResult<World> {
    info!("=== Running courier scenario ===");

    let mut world = World::new(WorldConfig {
        end_time: 200.0,
        ..WorldConfig::default()
    })?;
    let engine = Epidemic::default();
    let spot = |x: f64| Box::new(Stationary::new(Coord::new(x, 0.0)));
    let origin = world.spawn_host("base", &radio(10.0, 100.0), spot(0.0), 1_000, &engine);
    let target = world.spawn_host("base", &radio(10.0, 100.0), spot(100.0), 1_000, &engine);
    world.spawn_host(
        "courier",
        &radio(10.0, 100.0),
        Box::new(Scripted::new(vec![Coord::new(0.0, 5.0), Coord::new(100.0, 5.0)], 1.0).repeating()),
        1_000,
        &engine,
    );
    world.create_message(Message::new("M1", origin, target, 300, 0.0))?;
    world.run()?;

    let delivered = world
        .host(target)
        .is_some_and(|h| h.router().is_delivered(&"M1".into()));
    println!("\nDelivered M1 to {target}: {delivered} (t={:.1})", world.time());
    Ok(world)
}
