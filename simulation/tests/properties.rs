//! End-to-end properties of the simulation
//!
//! Drives whole worlds through the public API and checks the guarantees a
//! run makes:
//! - Addresses are dense and reproducible
//! - Contacts open and close exactly once per encounter
//! - Transfers take size / speed ticks and abort with the right remainder
//! - Buffers respect their capacity
//! - Delivered paths are loop-free and start and end at the right hosts
//! - Runs are deterministic, with or without the connectivity grid

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use courier_core::{
    Coord, CourierError, HostAddress, HostError, InterfaceSpec, Message, MessageId, ReceiveError,
    ConnectionId, SimEvent, TimedEvent,
};
use courier_routing::{
    EngineConfig, EngineRegistry, Epidemic, SprayAndWait, SprayAndWaitConfig, TransferOutcome,
};
use courier_simulation::{
    EventLog, GroupConfig, MessageGeneratorConfig, MovementConfig, ScenarioConfig, Stationary, World,
    WorldConfig,
};

// ============================================================================
// Helpers
// ============================================================================

fn radio() -> Vec<InterfaceSpec> {
    vec![InterfaceSpec::new("radio", 10.0, 10.0)]
}

/// Stationary epidemic hosts at the given x positions
fn line_world(xs: &[f64], capacity: u64) -> World {
    let mut world = World::new(WorldConfig::default()).unwrap();
    for &x in xs {
        world.spawn_host(
            "n",
            &radio(),
            Box::new(Stationary::new(Coord::new(x, 0.0))),
            capacity,
            &Epidemic::default(),
        );
    }
    world
}

fn count(events: &[TimedEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.event.kind() == kind).count()
}

fn random_scenario(seed: u64, grid: bool) -> ScenarioConfig {
    ScenarioConfig {
        name: "random".to_string(),
        seed,
        end_time: 400.0,
        update_interval: 1.0,
        world_size: [300.0, 300.0],
        interfaces: BTreeMap::from([("radio".to_string(), InterfaceSpec::new("radio", 25.0, 200.0))]),
        groups: vec![GroupConfig {
            prefix: "n".to_string(),
            count: 25,
            buffer_size: 3_000,
            interfaces: vec!["radio".to_string()],
            engine: EngineConfig::new("epidemic"),
            movement: MovementConfig::RandomWaypoint {
                min_speed: 1.0,
                max_speed: 3.0,
                min_wait: 0.0,
                max_wait: 20.0,
            },
        }],
        messages: Some(MessageGeneratorConfig {
            interval: [5.0, 15.0],
            size: [200, 800],
            hosts: [0, 25],
            to_hosts: None,
            prefix: "M".to_string(),
            ttl: None,
            start: 0.0,
            stop: None,
        }),
        connectivity_grid: grid,
        record_events: true,
    }
}

fn build(config: &ScenarioConfig) -> World {
    config.build_world(&EngineRegistry::with_builtin()).unwrap()
}

// ============================================================================
// Addresses
// ============================================================================

#[test]
fn test_addresses_are_dense_and_reproducible() {
    let config = random_scenario(5, false);
    let first = build(&config);
    let second = build(&config);

    assert_eq!(first.context().host_count(), 25);
    for (index, host) in first.hosts().iter().enumerate() {
        assert_eq!(host.address(), HostAddress(index as u32));
        assert_eq!(first.host(host.address()).unwrap().name(), host.name());
    }
    let names = |w: &World| w.hosts().iter().map(|h| h.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names(&first), names(&second));
    assert_eq!(first.snapshot(), second.snapshot());
}

// ============================================================================
// Contacts
// ============================================================================

#[test]
fn test_contact_up_then_down_once() {
    let mut world = line_world(&[0.0, 5.0], 1_000);
    world.run_ticks(50).unwrap();
    assert_eq!(world.connections().len(), 1);

    world.host_mut(HostAddress(1)).unwrap().set_location(Coord::new(20.0, 0.0));
    world.run_ticks(50).unwrap();

    assert_eq!(count(world.events(), "connection_up"), 1);
    assert_eq!(count(world.events(), "connection_down"), 1);
    assert!(world.connections().is_empty());
    assert!(world.host(HostAddress(0)).unwrap().connection_ids().is_empty());
}

// ============================================================================
// Transfers
// ============================================================================

#[test]
fn test_transfer_takes_size_over_speed_ticks() {
    let mut world = line_world(&[0.0, 5.0], 1_000);
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(1), 40, 0.0))
        .unwrap();
    world.run_ticks(6).unwrap();

    let started = world
        .events()
        .iter()
        .find(|e| matches!(e.event, SimEvent::TransferStarted { .. }))
        .unwrap()
        .time;
    let finished = world
        .events()
        .iter()
        .find(|e| matches!(e.event, SimEvent::MessageTransferred { .. }))
        .unwrap()
        .time;
    assert_eq!(finished - started, 4.0);
    assert_eq!(world.host(HostAddress(1)).unwrap().router().stats().delivered, 1);
}

#[test]
fn test_lost_contact_aborts_with_remaining_bytes() {
    let mut world = line_world(&[0.0, 5.0], 1_000);
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(1), 40, 0.0))
        .unwrap();
    // Tick 1 starts the transfer, tick 2 sends the first 10 bytes
    world.run_ticks(2).unwrap();
    world.host_mut(HostAddress(1)).unwrap().set_location(Coord::new(50.0, 0.0));
    // Tick 3 sends 10 more, then the contact is lost
    world.step().unwrap();

    let aborted: Vec<(HostAddress, HostAddress, u64)> = world
        .events()
        .iter()
        .filter_map(|e| match &e.event {
            SimEvent::TransferAborted {
                from,
                to,
                bytes_remaining,
                ..
            } => Some((*from, *to, *bytes_remaining)),
            _ => None,
        })
        .collect();
    assert_eq!(aborted, vec![(HostAddress(0), HostAddress(1), 20)]);

    // The sender keeps its copy for a later contact
    let sender = world.host(HostAddress(0)).unwrap();
    assert!(sender.router().has_message(&MessageId::new("M1")));
    assert!(!sender.router().is_sending(&MessageId::new("M1")));
    assert_eq!(sender.router().stats().aborted, 1);
}

#[test]
fn test_one_transfer_per_connection() {
    let mut world = line_world(&[0.0, 5.0], 1_000);
    world
        .create_message(Message::new("A", HostAddress(0), HostAddress(1), 40, 0.0))
        .unwrap();
    world
        .create_message(Message::new("B", HostAddress(1), HostAddress(0), 40, 0.0))
        .unwrap();
    world.step().unwrap();

    // The lower address claims the idle connection first
    assert_eq!(count(world.events(), "transfer_started"), 1);
    assert!(world.host(HostAddress(0)).unwrap().router().is_sending(&MessageId::new("A")));
    assert!(!world.host(HostAddress(1)).unwrap().router().is_sending(&MessageId::new("B")));

    // Once A is through, B gets its turn
    world.run_ticks(4).unwrap();
    assert_eq!(count(world.events(), "transfer_started"), 2);
}

#[test]
fn test_recontact_opens_a_fresh_connection_and_retries() {
    let mut world = line_world(&[0.0, 5.0], 1_000);
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(1), 40, 0.0))
        .unwrap();
    world.run_ticks(2).unwrap();

    // Walk away mid-transfer, stay apart, then come back
    world.host_mut(HostAddress(1)).unwrap().set_location(Coord::new(50.0, 0.0));
    world.run_ticks(3).unwrap();
    assert!(world.connections().is_empty());
    world.host_mut(HostAddress(1)).unwrap().set_location(Coord::new(5.0, 0.0));
    world.run_ticks(6).unwrap();

    let ups: Vec<ConnectionId> = world
        .events()
        .iter()
        .filter_map(|e| match &e.event {
            SimEvent::ConnectionUp { connection } => Some(connection.id),
            _ => None,
        })
        .collect();
    assert_eq!(ups.len(), 2);
    assert_ne!(ups[0], ups[1]);

    assert_eq!(count(world.events(), "transfer_aborted"), 1);
    assert_eq!(world.host(HostAddress(1)).unwrap().router().stats().delivered, 1);
    assert_eq!(count(world.events(), "message_transferred"), 1);
}

#[test]
fn test_spray_budget_is_conserved_with_simultaneous_peers() {
    let mut world = World::new(WorldConfig::default()).unwrap();
    let spray = SprayAndWait::new(SprayAndWaitConfig {
        copies: 6,
        binary: true,
    });
    for (x, y) in [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0), (1_000.0, 0.0)] {
        world.spawn_host("n", &radio(), Box::new(Stationary::new(Coord::new(x, y))), 1_000, &spray);
    }
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(3), 40, 0.0))
        .unwrap();

    let id = MessageId::new("M1");
    let budget = |w: &World| -> i64 {
        w.hosts()
            .iter()
            .filter_map(|h| h.router().message(&id))
            .map(SprayAndWait::copies)
            .sum()
    };
    for _ in 0..20 {
        world.step().unwrap();
        assert_eq!(budget(&world), 6, "t={}", world.time());
    }

    // Everyone in range ended up with a share
    for address in 0..3 {
        assert!(world.host(HostAddress(address)).unwrap().router().has_message(&id));
    }
    // The concurrent offer towards the same receiver was turned away
    let duplicates = world
        .events()
        .iter()
        .filter(|e| {
            matches!(
                e.event,
                SimEvent::MessageRejected {
                    reason: ReceiveError::Duplicate,
                    ..
                }
            )
        })
        .count();
    assert!(duplicates > 0);
}

#[test]
fn test_delivered_paths_are_loop_free() {
    let mut world = line_world(&[0.0, 8.0, 16.0, 24.0], 1_000);
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(3), 20, 0.0))
        .unwrap();
    world.run_ticks(30).unwrap();

    let paths: Vec<Vec<HostAddress>> = world
        .events()
        .iter()
        .filter_map(|e| match &e.event {
            SimEvent::MessageTransferred {
                message,
                final_delivery: true,
                ..
            } => Some(message.path.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(paths.len(), 1);
    assert_eq!(
        paths[0],
        vec![HostAddress(0), HostAddress(1), HostAddress(2), HostAddress(3)]
    );
}

#[test]
fn test_ttl_expiry_drops_message() {
    let mut world = line_world(&[0.0, 100.0], 1_000);
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(1), 20, 0.0).with_ttl(5.0))
        .unwrap();
    world.run_ticks(4).unwrap();
    assert_eq!(world.host(HostAddress(0)).unwrap().message_count(), 1);
    world.run_ticks(2).unwrap();
    assert_eq!(world.host(HostAddress(0)).unwrap().message_count(), 0);
    assert_eq!(world.host(HostAddress(0)).unwrap().router().stats().dropped, 1);
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_occupancy_never_exceeds_capacity() {
    let mut world = build(&random_scenario(9, true));
    for _ in 0..300 {
        world.step().unwrap();
        for host in world.hosts() {
            let router = host.router();
            assert!(router.buffer().used() <= router.capacity(), "{} over capacity", host.name());
        }
    }
    assert!(count(world.events(), "message_created") > 0);
}

#[test]
fn test_full_buffer_without_eviction_refuses() {
    let registry = EngineRegistry::with_builtin();
    let mut world = World::new(WorldConfig {
        simulate_connections: false,
        ..WorldConfig::default()
    })
    .unwrap();
    let keeper = registry
        .build(&EngineConfig::new("searching-agent"), world.context_mut())
        .unwrap();
    for x in [0.0, 100.0, 200.0, 300.0] {
        world.spawn_host("n", &radio(), Box::new(Stationary::new(Coord::new(x, 0.0))), 100, keeper.as_ref());
    }

    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(3), 60, 0.0))
        .unwrap();
    world
        .create_message(Message::new("M2", HostAddress(2), HostAddress(3), 60, 0.0))
        .unwrap();

    let first = world.send_message(HostAddress(0), HostAddress(1), &MessageId::new("M1"));
    assert!(matches!(first, Ok(TransferOutcome::Stored)));

    let second = world.send_message(HostAddress(2), HostAddress(1), &MessageId::new("M2"));
    assert!(matches!(second, Err(CourierError::Receive(ReceiveError::NoSpace))));
    let relay = world.host(HostAddress(1)).unwrap();
    assert_eq!(relay.router().stats().dropped, 1);
    assert!(relay.router().has_message(&MessageId::new("M1")));
}

#[test]
fn test_create_then_delete_round_trip() {
    let mut world = line_world(&[0.0], 1_000);
    let id = MessageId::new("M1");
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(0), 20, 0.0))
        .unwrap();
    assert_eq!(world.host(HostAddress(0)).unwrap().message_count(), 1);

    let removed = world.delete_message(HostAddress(0), &id, false).unwrap();
    assert_eq!(removed.id(), &id);
    assert_eq!(world.host(HostAddress(0)).unwrap().message_count(), 0);
    assert_eq!(world.host(HostAddress(0)).unwrap().buffer_occupancy(), 0.0);
    assert_eq!(count(world.events(), "message_deleted"), 1);

    assert_eq!(
        world.delete_message(HostAddress(0), &id, false).unwrap_err(),
        HostError::NoSuchMessage {
            host: HostAddress(0),
            message: id
        }
    );
}

// ============================================================================
// Administrative connections
// ============================================================================

#[test]
fn test_force_connection_errors_are_typed() {
    let mut world = World::new(WorldConfig::default()).unwrap();
    let stay = || Box::new(Stationary::new(Coord::default()));
    world.spawn_host("n", &radio(), stay(), 100, &Epidemic::default());
    world.spawn_host("n", &[InterfaceSpec::new("bluetooth", 5.0, 5.0)], stay(), 100, &Epidemic::default());

    assert_eq!(
        world.force_connection(HostAddress(0), HostAddress(7), None, true),
        Err(HostError::NoSuchHost(HostAddress(7)))
    );
    assert_eq!(
        world.force_connection(HostAddress(0), HostAddress(0), None, true),
        Err(HostError::SelfConnection(HostAddress(0)))
    );
    assert!(matches!(
        world.force_connection(HostAddress(0), HostAddress(1), None, true),
        Err(HostError::InterfaceMismatch { .. })
    ));
    assert!(matches!(
        world.force_connection(HostAddress(0), HostAddress(1), Some("radio"), true),
        Err(HostError::NoSuchInterface { host: HostAddress(1), .. })
    ));
}

#[test]
fn test_forced_connection_carries_traffic() {
    let mut world = World::new(WorldConfig {
        simulate_connections: false,
        ..WorldConfig::default()
    })
    .unwrap();
    for x in [0.0, 500.0] {
        world.spawn_host("n", &radio(), Box::new(Stationary::new(Coord::new(x, 0.0))), 1_000, &Epidemic::default());
    }
    world
        .create_message(Message::new("M1", HostAddress(0), HostAddress(1), 30, 0.0))
        .unwrap();

    world.force_connection(HostAddress(0), HostAddress(1), None, true).unwrap();
    // Opening an open pair again is a no-op
    world.force_connection(HostAddress(1), HostAddress(0), None, true).unwrap();
    assert_eq!(world.connections().len(), 1);

    world.run_ticks(4).unwrap();
    assert_eq!(world.host(HostAddress(1)).unwrap().router().stats().delivered, 1);

    world.force_connection(HostAddress(0), HostAddress(1), None, false).unwrap();
    assert!(world.connections().is_empty());
    assert_eq!(count(world.events(), "connection_down"), 1);
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_same_seed_same_events() {
    let mut a = build(&random_scenario(42, false));
    let mut b = build(&random_scenario(42, false));
    a.run_ticks(300).unwrap();
    b.run_ticks(300).unwrap();

    assert!(!a.events().is_empty());
    assert_eq!(a.events(), b.events());
}

#[test]
fn test_grid_matches_all_pairs() {
    let mut plain = build(&random_scenario(17, false));
    let mut grid = build(&random_scenario(17, true));
    plain.run_ticks(300).unwrap();
    grid.run_ticks(300).unwrap();

    assert!(count(plain.events(), "connection_up") > 0);
    assert_eq!(plain.events(), grid.events());
}

#[test]
fn test_listener_log_matches_recorded_events() {
    let mut recorded = build(&random_scenario(23, false));

    let mut config = random_scenario(23, false);
    config.record_events = false;
    let mut listened = build(&config);
    let log = Rc::new(RefCell::new(EventLog::new()));
    listened.add_listener(Box::new(Rc::clone(&log)));

    recorded.run_ticks(200).unwrap();
    listened.run_ticks(200).unwrap();

    assert!(listened.events().is_empty());
    let log = log.borrow();
    assert_eq!(log.events(), recorded.events());
    let lines = log.to_json_lines().unwrap();
    assert_eq!(lines.lines().count(), recorded.events().len());
}

// ============================================================================
// Shipped scenario files
// ============================================================================

#[test]
fn test_shipped_scenarios_build_and_run() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    for file in ["ferry.json", "search.json", "spray_and_wait_random.json"] {
        let mut config = ScenarioConfig::load(dir.join(file)).unwrap();
        config.end_time = 50.0;
        let mut world = build(&config);
        world.run().unwrap();
        assert_eq!(world.time(), 50.0, "{file}");
        assert_eq!(world.hosts().len(), config.host_count(), "{file}");
    }
}
