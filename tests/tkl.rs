//! Server bans end to end: enforcement, reservations, shuns, propagation.

mod common;

use common::{any_line, TestNet};

fn with_oper() -> TestNet {
    let mut t = TestNet::new();
    t.connect_from("oper", "9.9.9.9");
    t.register("oper", "opnick");
    t.line("oper", "OPER root letmein");
    t.drain("oper");
    t
}

#[test]
fn fresh_kline_disconnects_matching_users() {
    let mut t = with_oper();
    t.connect_from("bob", "5.6.7.8");
    t.register("bob", "bob");
    t.drain("bob");

    t.line("oper", "TKL + K * 5.6.* 0 :begone");
    assert!(!t.is_connected("bob"), "existing match must be dropped");
    let lines = t.drain("bob");
    assert!(any_line(&lines, "You are banned: begone"), "{:#?}", lines);

    // The operator holds the t snomask and sees the add.
    assert!(any_line(&t.drain("oper"), "K-line added"));

    // New connections with the same host bounce at registration.
    t.connect_from("bob2", "5.6.7.9");
    t.line("bob2", "NICK bob2");
    t.line("bob2", "USER b 0 * :B");
    assert!(!t.is_connected("bob2"));
}

#[test]
fn qline_reserves_nicks_for_non_operators() {
    let mut t = with_oper();
    t.line("oper", "TKL + Q * services* 0 :reserved for services");
    t.drain("oper");

    t.connect("bob");
    t.line("bob", "NICK services1");
    assert!(any_line(&t.drain("bob"), " 432 "));
    t.line("bob", "NICK bob");
    t.line("bob", "USER b 0 * :B");
    assert!(any_line(&t.drain("bob"), " 001 "));

    // Operators walk through the reservation.
    t.line("oper", "NICK services9");
    assert!(!any_line(&t.drain("oper"), " 432 "));
    assert_eq!(t.net.entity(&t.id_of("oper")).unwrap().name, "services9");
}

#[test]
fn shunned_users_lose_everything_but_liveness() {
    let mut t = with_oper();
    t.connect_from("bob", "5.6.7.8");
    t.register("bob", "bob");
    t.connect("carol");
    t.register("carol", "carol");
    t.lines("carol", &["JOIN #x"]);
    t.lines("bob", &["JOIN #x"]);
    t.drain("bob");
    t.drain("carol");

    t.line("oper", "TKL + s * 5.6.* 0 :muted");
    assert!(t.is_connected("bob"), "shun does not disconnect");
    assert!(t.net.entity(&t.id_of("bob")).unwrap().flags.shunned);

    t.line("bob", "PRIVMSG #x :can anyone hear me");
    assert!(t.drain("carol").is_empty(), "shunned traffic is dropped");

    t.line("bob", "PING :still-here");
    assert!(any_line(&t.drain("bob"), "PONG"));

    // Lifting the shun restores the user.
    t.line("oper", "TKL - s * 5.6.*");
    assert!(!t.net.entity(&t.id_of("bob")).unwrap().flags.shunned);
    t.line("bob", "PRIVMSG #x :back");
    assert!(any_line(&t.drain("carol"), "back"));
}

#[test]
fn global_bans_propagate_and_local_ones_do_not() {
    let mut t = with_oper();
    t.link_server("leaf", "002");
    t.line("leaf", ":002 EOS");
    t.drain("leaf");

    t.line("oper", "TKL + G * *.spam.example 0 :gban");
    assert!(any_line(&t.drain("leaf"), "TKL + G * *.spam.example"));

    t.line("oper", "TKL + K * *.local.example 0 :kline");
    assert!(
        !any_line(&t.drain("leaf"), "local.example"),
        "K-lines stay local"
    );
}

#[test]
fn remote_tkl_applies_and_relays() {
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
        ":002 TKL + G spam *.example.net oper@leaf 0 1000 :remote ban",
    );
    assert_eq!(t.net.tkl.len(), 1);
    assert!(any_line(&t.drain("leaf2"), "TKL + G spam *.example.net"));

    t.line("leaf1", ":002 TKL - G spam *.example.net");
    assert!(t.net.tkl.is_empty());
    assert!(any_line(&t.drain("leaf2"), "TKL - G spam"));
}

#[test]
fn expired_entries_sweep_on_the_tick() {
    let mut t = with_oper();
    t.line("oper", "TKL + K * 5.6.* 1 :short ban");
    t.drain("oper");
    assert_eq!(t.net.tkl.len(), 1);

    // The entry expires one second after being set; wait it out.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    t.net.tick();
    assert!(t.net.tkl.is_empty(), "expired entries leave on the sweep");
    assert!(any_line(&t.drain("oper"), "Expiring K-line"));
}
