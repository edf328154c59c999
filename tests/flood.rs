//! Flood accounting: recvq overrun and penalty ceilings.

mod common;

use common::{any_line, TestNet};

/// An operator subscribed to the flood snomask.
fn with_watching_oper(t: &mut TestNet) {
    t.connect_from("oper", "9.9.9.9");
    t.register("oper", "opnick");
    t.line("oper", "OPER root letmein");
    t.drain("oper");
}

#[test]
fn recvq_overrun_exits_with_excess_flood() {
    let mut t = TestNet::new();
    with_watching_oper(&mut t);

    t.connect("bob");
    t.register("bob", "bob");
    t.drain("bob");

    // The test class caps recvq at 8192 bytes; 9000 bytes of junk in the
    // same second blows it.
    let junk = format!("JUNKCMD {}", "a".repeat(890));
    for _ in 0..10 {
        if !t.is_connected("bob") {
            break;
        }
        t.line("bob", &junk);
    }

    assert!(!t.is_connected("bob"), "flooding client must be dropped");
    let lines = t.drain("bob");
    assert!(any_line(&lines, "Excess Flood"), "{:#?}", lines);

    let oper_lines = t.drain("oper");
    assert!(any_line(&oper_lines, "Flood from bob"), "{:#?}", oper_lines);
    assert!(any_line(&oper_lines, "RecvQ"));
}

#[test]
fn penalty_ceiling_drops_normal_users_but_not_opers() {
    let mut t = TestNet::new();
    t.connect("bob");
    t.register("bob", "bob");
    t.drain("bob");

    let bob_conn = t.conn_id("bob");
    t.net.add_penalty(bob_conn, 1_000_000);
    t.net.enforce_flood(bob_conn);
    assert!(!t.is_connected("bob"));

    with_watching_oper(&mut t);
    let oper_conn = t.conn_id("oper");
    t.net.add_penalty(oper_conn, 1_000_000);
    t.net.enforce_flood(oper_conn);
    assert!(t.is_connected("oper"), "operators get the raised ceiling");
    t.net.add_penalty(oper_conn, 9_500_000);
    t.net.enforce_flood(oper_conn);
    assert!(!t.is_connected("oper"));
}

#[test]
fn throttled_commands_delay_subsequent_lines() {
    let mut t = TestNet::new();
    t.connect("bob");
    t.register("bob", "bob");
    t.drain("bob");

    t.line("bob", "LIST");
    assert!(any_line(&t.drain("bob"), " 323 "));

    // The follow-up command sits in the queue with a future execution
    // time instead of running immediately.
    t.line("bob", "MOTD");
    assert!(t.drain("bob").is_empty(), "throttled line must not execute yet");
    let bob_conn = t.conn_id("bob");
    let queued = &t.net.conns.get(&bob_conn).unwrap().recv_queue;
    assert_eq!(queued.len(), 1);
    assert!(queued[0].0 > t.net.now() - 1);
}

#[test]
fn flood_safe_entities_accumulate_no_penalty() {
    let mut t = TestNet::new();
    t.connect("bob");
    t.register("bob", "bob");
    let bob_id = t.id_of("bob");
    t.net.entity_mut(&bob_id).unwrap().flags.flood_safe = true;

    let bob_conn = t.conn_id("bob");
    t.net.add_penalty(bob_conn, 5_000_000);
    assert_eq!(t.net.conns.get(&bob_conn).unwrap().penalty, 0);
}
