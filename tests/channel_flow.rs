//! Channel joins, messaging and the founder flow.

mod common;

use common::{any_line, TestNet};

#[test]
fn first_joiner_founds_the_channel_with_ops() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");

    t.line("alice", "JOIN #x");
    let lines = t.drain("alice");
    assert!(any_line(&lines, "JOIN :#x"), "{:#?}", lines);
    assert!(any_line(&lines, "MODE #x +o alice"), "{:#?}", lines);
    assert!(any_line(&lines, " 353 "), "{:#?}", lines);
    assert!(any_line(&lines, " 366 "), "{:#?}", lines);

    let chan = t.net.channel("#x").expect("channel exists");
    assert_eq!(chan.member_count(), 1);
    assert!(chan.members["001AAAAAA"].status.contains(&'o'));
    // modes-on-join from config.
    assert!(chan.modes.contains(&'n'));
    assert!(chan.modes.contains(&'t'));
}

#[test]
fn second_joiner_is_announced_and_listed() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");

    t.line("alice", "JOIN #x");
    t.drain("alice");
    t.line("bob", "JOIN #x");

    let alice_lines = t.drain("alice");
    assert!(any_line(&alice_lines, "bob!bob@"), "{:#?}", alice_lines);
    assert!(any_line(&alice_lines, "JOIN :#x"));

    let bob_lines = t.drain("bob");
    // Names listing shows the founder with the op sigil.
    assert!(any_line(&bob_lines, "@alice"), "{:#?}", bob_lines);
    assert_eq!(t.member_count("#x"), 2);
}

#[test]
fn channel_messages_reach_members_but_not_the_sender() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");
    t.lines("alice", &["JOIN #x"]);
    t.lines("bob", &["JOIN #x"]);
    t.drain("alice");
    t.drain("bob");

    t.line("alice", "PRIVMSG #x :hello there");
    let bob_lines = t.drain("bob");
    assert!(any_line(&bob_lines, "PRIVMSG #x :hello there"));
    // The message carries generated tags.
    assert!(!any_line(&t.drain("alice"), "hello there"));
}

#[test]
fn no_external_messages_mode_blocks_outsiders() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");
    t.line("alice", "JOIN #x");
    t.drain("alice");

    // #x has +n from modes-on-join.
    t.line("bob", "PRIVMSG #x :let me in");
    assert!(any_line(&t.drain("bob"), " 404 "));
    assert!(t.drain("alice").is_empty());
}

#[test]
fn part_empties_and_destroys_the_channel() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");
    t.lines("alice", &["JOIN #x"]);
    t.lines("bob", &["JOIN #x"]);
    t.drain("alice");

    t.line("bob", "PART #x :done");
    assert!(any_line(&t.drain("alice"), "PART #x :done"));
    assert_eq!(t.member_count("#x"), 1);

    t.line("alice", "PART #x");
    assert!(t.net.channel("#x").is_none(), "empty channel must be destroyed");
}

#[test]
fn kick_requires_ops_and_respects_rank() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");
    t.lines("alice", &["JOIN #x"]);
    t.lines("bob", &["JOIN #x"]);
    t.drain("alice");
    t.drain("bob");

    // bob has no status.
    t.line("bob", "KICK #x alice :revolt");
    assert!(any_line(&t.drain("bob"), " 482 "));

    t.line("alice", "KICK #x bob :out");
    let bob_lines = t.drain("bob");
    assert!(any_line(&bob_lines, "KICK #x bob :out"));
    assert_eq!(t.member_count("#x"), 1);
}

#[test]
fn topic_set_and_query_with_topic_lock() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");
    t.lines("alice", &["JOIN #x"]);
    t.lines("bob", &["JOIN #x"]);
    t.drain("alice");
    t.drain("bob");

    // +t is on via modes-on-join; bob may not set.
    t.line("bob", "TOPIC #x :bob was here");
    assert!(any_line(&t.drain("bob"), " 482 "));

    t.line("alice", "TOPIC #x :weft talk");
    assert!(any_line(&t.drain("bob"), "TOPIC #x :weft talk"));

    t.line("bob", "TOPIC #x");
    let lines = t.drain("bob");
    assert!(any_line(&lines, " 332 "));
    assert!(any_line(&lines, " 333 "));
}

#[test]
fn invite_only_respects_invites_and_disabled_invites() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.connect("bob");
    t.register("bob", "bob");
    t.line("alice", "JOIN #priv");
    t.line("alice", "MODE #priv +i");
    t.drain("alice");

    t.line("bob", "JOIN #priv");
    assert!(any_line(&t.drain("bob"), " 473 "));

    t.line("alice", "INVITE bob #priv");
    assert!(any_line(&t.drain("alice"), " 341 "));
    assert!(any_line(&t.drain("bob"), "INVITE bob :#priv"));

    t.line("bob", "JOIN #priv");
    assert!(any_line(&t.drain("bob"), "JOIN :#priv"));
    assert_eq!(t.member_count("#priv"), 2);

    // +V turns INVITE off entirely.
    t.line("alice", "MODE #priv +V");
    t.drain("alice");
    t.connect("carol");
    t.register("carol", "carol");
    t.line("alice", "INVITE carol #priv");
    assert!(any_line(&t.drain("alice"), " 518 "));
}

#[test]
fn local_only_channels_never_reach_the_mesh() {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    let _burst = t.link_server("leaf", "002");
    t.line("leaf", ":002 EOS");
    t.drain("leaf");

    t.line("alice", "JOIN &local");
    t.drain("alice");
    assert!(t.net.channel("&local").is_some());
    assert!(
        !any_line(&t.drain("leaf"), "&local"),
        "local channel leaked to a server link"
    );

    t.line("alice", "JOIN #global");
    assert!(any_line(&t.drain("leaf"), "SJOIN"));
}
