//! Registration and welcome-burst behaviour.

mod common;

use common::{any_line, find_line, TestNet};
use weftd::security::cloak::cloak_host;

#[test]
fn first_client_registers_and_gets_the_welcome_numerics() {
    let mut t = TestNet::new();
    let uid = t.connect("alice");
    assert_eq!(uid, "001AAAAAA");

    let lines = t.register("alice", "alice");
    for code in ["001", "002", "003", "004", "005", "396"] {
        let needle = format!(" {} ", code);
        assert!(any_line(&lines, &needle), "missing numeric {}: {:#?}", code, lines);
    }
    assert!(any_line(&lines, "Welcome to the WeftNet IRC Network alice!alice@1.2.3.4"));

    // Numerics come in order.
    assert!(find_line(&lines, " 001 ") < find_line(&lines, " 005 "));
    assert!(find_line(&lines, " 005 ") < find_line(&lines, " 396 "));

    // LUSERS and MOTD run as part of the welcome; no MOTD file means 422.
    assert!(any_line(&lines, " 251 "));
    assert!(any_line(&lines, " 255 "));
    assert!(any_line(&lines, " 422 "));

    // modes-on-connect from the test config.
    assert!(any_line(&lines, "MODE alice :+i"));

    let entity = t.net.entity("001AAAAAA").expect("registered entity");
    assert!(entity.flags.registered);
    assert_eq!(entity.name, "alice");
}

#[test]
fn cloak_in_welcome_matches_the_cloak_function() {
    let mut t = TestNet::new();
    t.connect("alice");
    let lines = t.register("alice", "alice");
    let expected = cloak_host("1.2.3.4", "1.2.3.4", "test-cloak-key-0123456789", None);
    assert!(
        any_line(&lines, &format!("396 alice {} :", expected)),
        "cloak mismatch, wanted {} in {:#?}",
        expected,
        lines
    );
    let user_cloak = t
        .net
        .entity("001AAAAAA")
        .and_then(|e| e.user().map(|u| u.cloakhost.clone()))
        .unwrap();
    assert_eq!(user_cloak, expected);
}

#[test]
fn isupport_packets_carry_at_most_fifteen_tokens() {
    let mut t = TestNet::new();
    t.connect("alice");
    let lines = t.register("alice", "alice");
    let mut saw_isupport = false;
    for line in &lines {
        if line.contains(" 005 alice ") {
            saw_isupport = true;
            let tail = line.split(" 005 alice ").nth(1).unwrap();
            let tokens = tail.split(" :are supported").next().unwrap();
            assert!(tokens.split(' ').count() <= 15, "too many tokens: {}", line);
        }
    }
    assert!(saw_isupport);
}

#[test]
fn registration_waits_for_both_nick_and_user() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.line("alice", "NICK alice");
    assert!(t.drain("alice").iter().all(|l| !l.contains(" 001 ")));
    t.line("alice", "USER a 0 * :Alice A");
    assert!(any_line(&t.drain("alice"), " 001 "));
}

#[test]
fn nospoof_cookie_gates_registration() {
    let mut conf = weftd::config::Config::for_testing();
    conf.server.nospoof = true;
    let mut t = TestNet::with_config(conf);
    t.connect("alice");
    t.line("alice", "NICK alice");
    t.line("alice", "USER a 0 * :Alice A");
    let lines = t.drain("alice");
    let ping = lines
        .iter()
        .find(|l| l.starts_with("PING :"))
        .expect("nospoof challenge")
        .clone();
    assert!(!any_line(&lines, " 001 "));

    let cookie = ping.trim_start_matches("PING :").to_string();
    t.line("alice", &format!("PONG :{}", cookie));
    assert!(any_line(&t.drain("alice"), " 001 "));
}

#[test]
fn handshake_extensions_can_park_registration() {
    use weftd::hooks::{HookArgs, HookKind, HookVerdict};
    use weftd::state::Network;

    // An extension that needs more time parks the client under a label
    // until its lookup result lands in moddata.
    fn hold_for_lookup(net: &mut Network, args: &HookArgs) -> HookVerdict {
        let client = args.client.unwrap_or_default().to_string();
        let done = net
            .entity(&client)
            .is_some_and(|e| e.moddata_value("lookup").is_some());
        if !done && !net.has_delays(&client) {
            net.delay_client(&client, "lookup", 30);
        }
        HookVerdict::Continue
    }

    let mut t = TestNet::new();
    t.net.hooks.register(HookKind::IsHandshakeFinished, 0, hold_for_lookup);
    let uid = t.connect("alice");
    t.line("alice", "NICK alice");
    t.line("alice", "USER a 0 * :Alice A");
    assert!(
        !any_line(&t.drain("alice"), " 001 "),
        "registration must wait for the delay"
    );

    // The lookup finishes; clearing the label re-checks registration.
    t.net.entity_mut(&uid).unwrap().set_moddata("lookup", "ok", false);
    t.net.clear_delay(&uid, "lookup");
    weftd::handlers::welcome::try_register(&mut t.net, &uid);
    assert!(any_line(&t.drain("alice"), " 001 "));
}

#[test]
fn nick_collisions_and_bad_nicks_are_rejected() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");

    t.connect("bob");
    t.line("bob", "NICK alice");
    assert!(any_line(&t.drain("bob"), " 433 "));
    t.line("bob", "NICK 1digit");
    assert!(any_line(&t.drain("bob"), " 432 "));
    t.line("bob", "NICK bob");
    t.line("bob", "USER b 0 * :Bob B");
    assert!(any_line(&t.drain("bob"), " 001 "));
}

#[test]
fn unregistered_commands_bounce_until_welcome() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.line("alice", "JOIN #weft");
    assert!(any_line(&t.drain("alice"), " 451 "));
    t.register("alice", "alice");
    t.line("alice", "USER again 0 * :nope");
    assert!(any_line(&t.drain("alice"), " 462 "));
}

#[test]
fn quit_closes_the_connection_with_an_error_line() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.line("alice", "QUIT :bye");
    let lines = t.drain("alice");
    assert!(any_line(&lines, "ERROR :Closing Link"));
    assert!(!t.is_connected("alice"));
    assert!(t.net.entity("001AAAAAA").is_none());
}
