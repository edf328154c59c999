//! The mode engine: parsing, permissions, parameters and line grouping.

mod common;

use common::{any_line, TestNet};

fn with_channel() -> TestNet {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.line("alice", "JOIN #m");
    t.drain("alice");
    t
}

#[test]
fn mode_state_round_trips_through_its_serialisation() {
    let mut t = with_channel();
    t.line("alice", "MODE #m +i-t+lk 10 sesame");
    t.drain("alice");

    // Read the state back the way 324 reports it.
    let chan = t.net.channel("#m").unwrap();
    let flags: String = chan.modes.iter().collect();
    let params: Vec<String> = chan.params.values().cloned().collect();

    // Replay the serialised form onto a fresh channel.
    t.line("alice", "JOIN #m2");
    t.drain("alice");
    let replay = format!("MODE #m2 -nt+{} {}", flags, params.join(" "));
    t.line("alice", &replay);
    t.drain("alice");

    let a = t.net.channel("#m").unwrap();
    let b = t.net.channel("#m2").unwrap();
    assert_eq!(a.modes, b.modes);
    assert_eq!(a.params, b.params);
}

#[test]
fn mode_query_reports_flags_and_creation_time() {
    let mut t = with_channel();
    t.line("alice", "MODE #m +l 42");
    t.drain("alice");
    t.line("alice", "MODE #m");
    let lines = t.drain("alice");
    assert!(any_line(&lines, " 324 "), "{:#?}", lines);
    assert!(any_line(&lines, "42"));
    assert!(any_line(&lines, " 329 "));
}

#[test]
fn unknown_flags_report_once_and_invalid_params_bounce() {
    let mut t = with_channel();
    t.line("alice", "MODE #m +YY");
    let lines = t.drain("alice");
    assert_eq!(lines.iter().filter(|l| l.contains(" 472 ")).count(), 1);

    t.line("alice", "MODE #m +l zero");
    let lines = t.drain("alice");
    assert!(any_line(&lines, " 696 "));
    assert!(t.net.channel("#m").unwrap().limit().is_none());
}

#[test]
fn member_modes_enforce_rank_both_ways() {
    let mut t = with_channel();
    t.connect("bob");
    t.register("bob", "bob");
    t.line("bob", "JOIN #m");
    t.drain("bob");
    t.drain("alice");

    // An unranked member may not grant status.
    t.line("bob", "MODE #m +v bob");
    assert!(any_line(&t.drain("bob"), " 482 "));

    // The founder may.
    t.line("alice", "MODE #m +h bob");
    assert!(any_line(&t.drain("bob"), "MODE #m +h bob"));

    // A half-op may not demote the founder.
    t.line("bob", "MODE #m -o alice");
    assert!(any_line(&t.drain("bob"), " 482 "));
    assert!(t
        .net
        .channel("#m")
        .unwrap()
        .members["001AAAAAA"]
        .status
        .contains(&'o'));

    // Owner grants take the owner numeric.
    t.line("bob", "MODE #m +q bob");
    assert!(any_line(&t.drain("bob"), " 499 "));
}

#[test]
fn long_changes_split_into_lines_of_at_most_twelve() {
    let mut t = with_channel();
    let masks: Vec<String> = (0..13).map(|i| format!("m{}!*@*", i)).collect();
    let command = format!("MODE #m +{} {}", "b".repeat(13), masks.join(" "));
    t.line("alice", &command);
    let mode_lines: Vec<String> = t
        .drain("alice")
        .into_iter()
        .filter(|l| l.contains("MODE #m"))
        .collect();
    assert_eq!(mode_lines.len(), 2, "{:#?}", mode_lines);
    assert_eq!(t.net.channel("#m").unwrap().list('b').len(), 13);
}

#[test]
fn key_mode_consumes_a_parameter_on_unset_too() {
    let mut t = with_channel();
    t.line("alice", "MODE #m +k sesame");
    t.drain("alice");
    assert_eq!(t.net.channel("#m").unwrap().key(), Some("sesame"));

    t.line("alice", "MODE #m -k+i sesame");
    t.drain("alice");
    let chan = t.net.channel("#m").unwrap();
    assert!(chan.key().is_none());
    assert!(chan.modes.contains(&'i'), "the key param must not shift +i's slot");
}

#[test]
fn user_modes_respect_setter_levels() {
    let mut t = with_channel();
    t.line("alice", "MODE alice +o");
    t.drain("alice");
    assert!(
        !t.net.entity("001AAAAAA").unwrap().is_oper(),
        "+o cannot be self-granted"
    );

    t.line("alice", "MODE alice +B-i");
    let lines = t.drain("alice");
    assert!(any_line(&lines, "MODE alice :+B-i"), "{:#?}", lines);

    t.line("alice", "MODE alice +Q");
    assert!(any_line(&t.drain("alice"), " 501 "));

    t.line("alice", "MODE bob +i");
    assert!(any_line(&t.drain("alice"), " 401 "));

    t.connect("bob");
    t.register("bob", "bob");
    t.line("bob", "MODE alice +i");
    assert!(any_line(&t.drain("bob"), " 502 "));
}

#[test]
fn deoper_sweeps_the_oper_coupled_modes() {
    let mut t = with_channel();
    t.line("alice", "OPER root letmein");
    t.drain("alice");
    {
        let user = t.net.entity("001AAAAAA").unwrap().user().unwrap();
        assert!(user.modes.contains(&'o'));
        assert!(user.modes.contains(&'s'));
        assert!(!user.snomask.is_empty());
    }

    t.line("alice", "MODE alice -o");
    let user_modes = t
        .net
        .entity("001AAAAAA")
        .unwrap()
        .user()
        .unwrap()
        .modes
        .clone();
    assert!(!user_modes.contains(&'o'));
    assert!(!user_modes.contains(&'s'), "snomask mode drops with deoper");
}

#[test]
fn listmode_query_renders_the_stored_entries() {
    let mut t = with_channel();
    t.line("alice", "MODE #m +b *!*@bad.example");
    t.drain("alice");
    t.line("alice", "MODE #m b");
    let lines = t.drain("alice");
    assert!(any_line(&lines, " 367 "), "{:#?}", lines);
    assert!(any_line(&lines, "*!*@bad.example"));
    assert!(any_line(&lines, " 368 "));
}
