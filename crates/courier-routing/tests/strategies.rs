//! Strategy behaviour through the Router
//!
//! Drives pairs of routers over hand-made connections, without a world or
//! mobility, to check how each decision engine shapes forwarding:
//! - Epidemic relaying along a chain
//! - Spray-and-wait copy budgets
//! - Direct delivery never relaying
//! - PRoPHET exchange and forwarding towards better carriers
//! - Searching agents sharing one discovery registry

use courier_core::{
    Connection, HostAddress, HostInfo, InterfaceRef, Message, MessageId, RunContext, SimEvent,
};
use courier_routing::{
    EngineConfig, EngineRegistry, Prophet, Router, SearchReporting, SearchingAgent, SprayAndWait,
    TransferOutcome,
};
use serde_json::json;

// ============================================================================
// Test harness
// ============================================================================

struct Node {
    info: HostInfo,
    router: Router,
}

fn nodes(engine: EngineConfig, count: u32, capacity: u64) -> (RunContext, Vec<Node>) {
    let registry = EngineRegistry::with_builtin();
    let mut ctx = RunContext::new();
    let prototype = registry.build(&engine, &mut ctx).unwrap();
    let nodes = (0..count)
        .map(|_| {
            let address = ctx.next_address();
            let info = HostInfo::new(address, &format!("n{address}"), "n", "stationary");
            Node {
                router: Router::new(address, capacity, prototype.replicate()),
                info,
            }
        })
        .collect();
    (ctx, nodes)
}

fn pair(nodes: &mut [Node], a: usize, b: usize) -> (&mut Node, &mut Node) {
    assert_ne!(a, b);
    if a < b {
        let (left, right) = nodes.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = nodes.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

fn connect(ctx: &mut RunContext, nodes: &mut [Node], a: usize, b: usize, now: f64) -> Connection {
    let (x, y) = pair(nodes, a, b);
    let conn = Connection::new(
        ctx.next_connection_id(),
        InterfaceRef::new(x.info.address, 0),
        InterfaceRef::new(y.info.address, 0),
        1_000.0,
        now,
    );
    x.router.connection_up(&x.info, &y.info, now);
    y.router.connection_up(&y.info, &x.info, now);
    let (low, high) = if x.info.address < y.info.address { (x, y) } else { (y, x) };
    low.router.engine_mut().do_exchange_for_new_connection(
        &conn,
        &low.info,
        &high.info,
        high.router.engine_mut(),
        now,
    );
    conn
}

/// Let `from` offer one message to `to` and run the transfer to completion
fn exchange(
    nodes: &mut [Node],
    conn: &mut Connection,
    from: usize,
    to: usize,
    now: f64,
) -> Option<(MessageId, TransferOutcome)> {
    let (sender, receiver) = pair(nodes, from, to);
    let receiver_info = receiver.info.clone();
    let id = sender.router.request_deliverable_messages(
        conn,
        &sender.info,
        &receiver_info,
        now,
        |m| {
            let mut wire = m.replicate();
            receiver
                .router
                .receive_message(&mut wire, sender.info.address, &receiver_info, now)?;
            wire.add_node_on_path(receiver_info.address);
            Ok(wire)
        },
    )?;
    let transfer = conn.advance(1.0)?;
    let outcome = receiver.router.message_transferred(
        transfer.message,
        sender.info.address,
        &receiver.info,
        now,
    );
    sender.router.transfer_done(conn.id(), &id, receiver.info.address);
    Some((id, outcome))
}

fn create(nodes: &mut [Node], at: usize, id: &str, to: u32, now: f64) {
    let node = &mut nodes[at];
    let m = Message::new(id, node.info.address, HostAddress(to), 100, now);
    node.router.create_new_message(m, &node.info, now).unwrap();
}

// ============================================================================
// Epidemic
// ============================================================================

#[test]
fn test_epidemic_relays_along_a_chain() {
    let (mut ctx, mut nodes) = nodes(EngineConfig::new("epidemic"), 3, 1_000);
    create(&mut nodes, 0, "M1", 2, 0.0);

    let mut ab = connect(&mut ctx, &mut nodes, 0, 1, 0.0);
    let (_, outcome) = exchange(&mut nodes, &mut ab, 0, 1, 1.0).unwrap();
    assert_eq!(outcome, TransferOutcome::Stored);
    // Origin keeps its copy after relaying
    assert!(nodes[0].router.has_message(&MessageId::new("M1")));

    let mut bc = connect(&mut ctx, &mut nodes, 1, 2, 2.0);
    let (_, outcome) = exchange(&mut nodes, &mut bc, 1, 2, 3.0).unwrap();
    assert_eq!(outcome, TransferOutcome::Delivered { first: true });

    let delivered = nodes[2].router.drain_events();
    let path = delivered
        .iter()
        .find_map(|e| match e {
            SimEvent::MessageTransferred {
                message,
                final_delivery: true,
                ..
            } => Some(message.path.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(path, vec![HostAddress(0), HostAddress(1), HostAddress(2)]);

    // The relay purged its copy after handing it to the destination
    assert!(!nodes[1].router.has_message(&MessageId::new("M1")));
}

#[test]
fn test_epidemic_does_not_send_back() {
    let (mut ctx, mut nodes) = nodes(EngineConfig::new("epidemic"), 2, 1_000);
    create(&mut nodes, 0, "M1", 9, 0.0);

    let mut conn = connect(&mut ctx, &mut nodes, 0, 1, 0.0);
    assert!(exchange(&mut nodes, &mut conn, 0, 1, 1.0).is_some());
    // Node 1 already sits on the path after node 0, and node 0 is on it too
    assert!(exchange(&mut nodes, &mut conn, 1, 0, 2.0).is_none());
}

// ============================================================================
// Spray-and-wait
// ============================================================================

#[test]
fn test_spray_budget_is_conserved() {
    let engine = EngineConfig::new("spray-and-wait").with_settings(json!({ "copies": 8 }));
    let (mut ctx, mut nodes) = nodes(engine, 4, 1_000);
    create(&mut nodes, 0, "M1", 99, 0.0);

    let mut c01 = connect(&mut ctx, &mut nodes, 0, 1, 0.0);
    exchange(&mut nodes, &mut c01, 0, 1, 1.0).unwrap();
    let mut c02 = connect(&mut ctx, &mut nodes, 0, 2, 2.0);
    exchange(&mut nodes, &mut c02, 0, 2, 3.0).unwrap();
    let mut c13 = connect(&mut ctx, &mut nodes, 1, 3, 4.0);
    exchange(&mut nodes, &mut c13, 1, 3, 5.0).unwrap();

    let id = MessageId::new("M1");
    let copies: Vec<i64> = nodes
        .iter()
        .map(|n| n.router.message(&id).map(SprayAndWait::copies).unwrap_or(0))
        .collect();
    assert_eq!(copies, vec![2, 2, 2, 2]);
    assert_eq!(copies.iter().sum::<i64>(), 8);
}

#[test]
fn test_wait_phase_holds_last_copy() {
    let engine = EngineConfig::new("spray-and-wait").with_settings(json!({ "copies": 1 }));
    let (mut ctx, mut nodes) = nodes(engine, 3, 1_000);
    create(&mut nodes, 0, "M1", 2, 0.0);

    let mut c01 = connect(&mut ctx, &mut nodes, 0, 1, 0.0);
    assert!(exchange(&mut nodes, &mut c01, 0, 1, 1.0).is_none());

    let mut c02 = connect(&mut ctx, &mut nodes, 0, 2, 2.0);
    let (_, outcome) = exchange(&mut nodes, &mut c02, 0, 2, 3.0).unwrap();
    assert_eq!(outcome, TransferOutcome::Delivered { first: true });
    assert_eq!(nodes[0].router.message_count(), 0);
}

// ============================================================================
// Direct delivery
// ============================================================================

#[test]
fn test_direct_delivery_never_relays() {
    let (mut ctx, mut nodes) = nodes(EngineConfig::new("direct-delivery"), 3, 1_000);
    create(&mut nodes, 0, "M1", 2, 0.0);

    let mut c01 = connect(&mut ctx, &mut nodes, 0, 1, 0.0);
    assert!(exchange(&mut nodes, &mut c01, 0, 1, 1.0).is_none());
    assert_eq!(nodes[1].router.message_count(), 0);

    let mut c02 = connect(&mut ctx, &mut nodes, 0, 2, 2.0);
    assert!(exchange(&mut nodes, &mut c02, 0, 2, 3.0).is_some());
    assert_eq!(nodes[2].router.stats().delivered, 1);
}

// ============================================================================
// PRoPHET
// ============================================================================

#[test]
fn test_prophet_forwards_to_better_carrier() {
    let (mut ctx, mut nodes) = nodes(EngineConfig::new("prophet"), 3, 1_000);

    // Node 1 meets node 2 repeatedly and becomes a good carrier for it
    for t in 0..3 {
        let conn = connect(&mut ctx, &mut nodes, 1, 2, t as f64);
        let (x, y) = pair(&mut nodes, 1, 2);
        x.router.connection_down(conn.id(), &x.info, &y.info, t as f64);
        y.router.connection_down(conn.id(), &y.info, &x.info, t as f64);
    }
    create(&mut nodes, 0, "M1", 2, 5.0);

    let mut c01 = connect(&mut ctx, &mut nodes, 0, 1, 5.0);
    let (id, outcome) = exchange(&mut nodes, &mut c01, 0, 1, 6.0).unwrap();
    assert_eq!(id, MessageId::new("M1"));
    assert_eq!(outcome, TransferOutcome::Stored);

    let node1 = nodes[1]
        .router
        .engine()
        .as_any()
        .downcast_ref::<Prophet>()
        .unwrap();
    assert!(node1.probability(HostAddress(2)) > node1.probability(HostAddress(0)));
}

#[test]
fn test_prophet_holds_without_better_carrier() {
    let (mut ctx, mut nodes) = nodes(EngineConfig::new("prophet"), 3, 1_000);
    create(&mut nodes, 0, "M1", 2, 0.0);

    let mut c01 = connect(&mut ctx, &mut nodes, 0, 1, 0.0);
    assert!(exchange(&mut nodes, &mut c01, 0, 1, 1.0).is_none());
}

// ============================================================================
// Searching agents
// ============================================================================

#[test]
fn test_searching_agents_share_registry() {
    let (mut ctx, mut agents) = nodes(EngineConfig::new("searching-agent"), 2, 1_000);
    let target = HostInfo::new(HostAddress(7), "S7", "S", "stationary");
    let other = HostInfo::new(HostAddress(8), "T8", "T", "stationary");

    let first = agents[0].info.clone();
    let second = agents[1].info.clone();
    agents[0].router.connection_up(&first, &target, 12.0);
    agents[1].router.connection_up(&second, &target, 20.0);
    agents[1].router.connection_up(&second, &other, 21.0);

    let engine = agents[1]
        .router
        .engine()
        .as_any()
        .downcast_ref::<SearchingAgent>()
        .unwrap();
    let found = engine.discovered_nodes();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].discovered_by, HostAddress(0));
    assert_eq!(engine.initial_discovery(), Some(12.0));

    ctx.reset();
    assert!(engine.discovered_nodes().is_empty());
}
