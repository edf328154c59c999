//! Link bursts, ordering guarantees and post-EOS queueing.

mod common;

use common::{any_line, find_line, TestNet};
use weftd::security::tkl::Tkl;

#[test]
fn burst_orders_users_before_channels_before_tkls_before_eos() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.line("alice", "JOIN #w");
    t.line("alice", "AWAY :lunch");
    t.drain("alice");
    t.net.tkl.add(Tkl {
        flag: 'G',
        ident: "*".to_string(),
        host: "*.spam.example".to_string(),
        bantypes: String::new(),
        expire: 0,
        set_by: "config".to_string(),
        set_time: 1000,
        reason: "spam".to_string(),
    });

    let burst = t.link_server("leaf", "002");

    // Our side of the handshake leads.
    assert!(any_line(&burst, "PASS :linkpass"));
    assert!(any_line(&burst, "PROTOCTL EAUTH=hub.weft.test SID=001"));
    assert!(find_line(&burst, "PASS") < find_line(&burst, "SERVER hub.weft.test"));

    let uid = find_line(&burst, " UID alice ").expect("user burst");
    let away = find_line(&burst, ":001AAAAAA AWAY :lunch").expect("away follows its UID");
    let sjoin = find_line(&burst, "SJOIN").expect("channel burst");
    let tkl = find_line(&burst, "TKL + G").expect("tkl burst");
    let eos = find_line(&burst, ":001 EOS").expect("burst terminator");

    assert!(uid < away, "per-user followups come right after the UID");
    assert!(away < sjoin, "users before channels: {:#?}", burst);
    assert!(sjoin < tkl, "channels before TKLs");
    assert!(tkl < eos, "everything before EOS");

    // The channel burst carries the founder prefix and the modes.
    assert!(burst[sjoin].contains(":@001AAAAAA"));
    assert!(burst[sjoin].contains("+nt") || burst[sjoin].contains("+tn"));
}

#[test]
fn lines_for_an_unsynced_peer_queue_until_its_eos() {
    let mut t = TestNet::new();
    t.link_server("leaf", "002");
    t.drain("leaf");

    // The peer has not sent EOS yet: new state queues.
    t.connect("bob");
    t.register("bob", "bob");
    assert!(
        !any_line(&t.drain("leaf"), "UID bob"),
        "UID must wait for the peer's EOS"
    );

    t.line("leaf", ":002 EOS");
    let lines = t.drain("leaf");
    let eos_ack = find_line(&lines, "UID bob");
    assert!(eos_ack.is_some(), "queued lines flush after EOS: {:#?}", lines);
}

#[test]
fn queued_lines_flush_in_fifo_order() {
    let mut t = TestNet::new();
    t.link_server("leaf", "002");
    t.drain("leaf");

    t.connect("bob");
    t.register("bob", "bob");
    t.connect("carol");
    t.register("carol", "carol");

    t.line("leaf", ":002 EOS");
    let lines = t.drain("leaf");
    assert!(
        find_line(&lines, "UID bob") < find_line(&lines, "UID carol"),
        "{:#?}",
        lines
    );
}

#[test]
fn other_servers_park_while_a_neighbour_bursts() {
    let mut conf = weftd::config::Config::for_testing();
    conf.link.push(weftd::config::LinkBlock {
        name: "leaf2.weft.test".to_string(),
        host: None,
        port: None,
        tls: false,
        password: "linkpass".to_string(),
        autoconnect: false,
    });
    let mut t = TestNet::with_config(conf);

    // leaf1 links and fully syncs.
    t.link_server("leaf1", "002");
    t.line("leaf1", ":002 EOS");
    t.drain("leaf1");

    // leaf2 authenticates and is now mid-burst.
    t.connect_from("leaf2", "10.0.0.3");
    t.line("leaf2", "PASS :linkpass");
    t.line("leaf2", "PROTOCTL EAUTH=leaf2.weft.test SID=003");
    t.line("leaf2", "SERVER leaf2.weft.test 1 :Second leaf");
    t.drain("leaf2");

    // leaf1's traffic is parked until leaf2 finishes.
    t.line("leaf1", ":002 PING :checkpoint");
    assert!(!any_line(&t.drain("leaf1"), "PONG"), "parked during the burst");

    t.line("leaf2", ":003 EOS");
    assert!(
        any_line(&t.drain("leaf1"), "PONG"),
        "parked input drains after EOS"
    );
}

#[test]
fn remote_users_relay_onward_with_incremented_hopcount() {
    let mut conf = weftd::config::Config::for_testing();
    conf.link.push(weftd::config::LinkBlock {
        name: "leaf2.weft.test".to_string(),
        host: None,
        port: None,
        tls: false,
        password: "linkpass".to_string(),
        autoconnect: false,
    });
    let mut t = TestNet::with_config(conf);

    t.link_server("leaf1", "002");
    t.line("leaf1", ":002 EOS");
    t.connect_from("leaf2", "10.0.0.3");
    t.line("leaf2", "PASS :linkpass");
    t.line("leaf2", "PROTOCTL EAUTH=leaf2.weft.test SID=003");
    t.line("leaf2", "SERVER leaf2.weft.test 1 :Second leaf");
    t.line("leaf2", ":003 EOS");
    t.drain("leaf1");
    t.drain("leaf2");

    t.line(
        "leaf1",
        ":002 UID udo 1 900 u example.host 002AAAAAA * +i c.h c.h x :Udo",
    );
    let relayed = t.drain("leaf2");
    assert!(any_line(&relayed, "UID udo 2 900"), "{:#?}", relayed);
    // The origin prefix survives the hop.
    assert!(any_line(&relayed, ":002 UID udo"));
}
