//! SJOIN timestamp resolution.

mod common;

use common::{any_line, TestNet};

/// Build a linked network with a local channel at a known timestamp.
fn setup() -> TestNet {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.link_server("leaf", "002");
    t.line("leaf", ":002 EOS");
    t.drain("leaf");

    t.line("alice", "JOIN #x");
    t.drain("alice");
    t.drain("leaf");

    // Pin the local creation time so the remote side can be older/newer.
    t.net.channel_mut("#x").unwrap().remote_created = 1000;
    // Introduce a remote user to put in the SJOIN.
    t.line(
        "leaf",
        ":002 UID udo 1 900 u example.host 002AAAAAA * +i cloak.host cloak.host dXNlcg== :Udo",
    );
    t.drain("leaf");
    t
}

#[test]
fn older_remote_timestamp_wins_and_resets_local_modes() {
    let mut t = setup();
    {
        let chan = t.net.channel_mut("#x").unwrap();
        assert!(chan.modes.contains(&'n'));
        chan.params.insert('l', "5".to_string());
        chan.modes.insert('l');
    }

    t.line("leaf", ":002 SJOIN 900 #x +m :@002AAAAAA");
    let chan = t.net.channel("#x").unwrap();
    assert_eq!(chan.remote_created, 900);
    // Local +n/+t/+l cleared, remote +m applied.
    assert!(!chan.modes.contains(&'n'));
    assert!(!chan.modes.contains(&'t'));
    assert!(!chan.modes.contains(&'l'));
    assert!(chan.params.get(&'l').is_none());
    assert!(chan.modes.contains(&'m'));
    // The remote member keeps its op grant.
    assert!(chan.members["002AAAAAA"].status.contains(&'o'));
    // The local founder keeps their status.
    assert!(chan.members["001AAAAAA"].status.contains(&'o'));

    // Local viewers were told about the join and its status.
    let alice_lines = t.drain("alice");
    assert!(any_line(&alice_lines, "udo!u@"), "{:#?}", alice_lines);
    assert!(any_line(&alice_lines, "MODE #x +o udo"));
}

#[test]
fn newer_remote_timestamp_keeps_local_state() {
    let mut t = setup();
    t.line("leaf", ":002 SJOIN 2000 #x +m :@002AAAAAA");
    let chan = t.net.channel("#x").unwrap();
    assert_eq!(chan.remote_created, 1000, "older local timestamp survives");
    assert!(!chan.modes.contains(&'m'), "remote modes from a newer side are ignored");
    assert!(chan.modes.contains(&'n'));
    // The member itself still joins.
    assert!(chan.has_member("002AAAAAA"));
}

#[test]
fn equal_timestamps_merge_membership_and_modes() {
    let mut t = setup();
    t.line("leaf", ":002 SJOIN 1000 #x +m :+002AAAAAA");
    let chan = t.net.channel("#x").unwrap();
    assert_eq!(chan.remote_created, 1000);
    assert!(chan.modes.contains(&'m'), "equal timestamps union modes");
    assert!(chan.modes.contains(&'n'));
    assert!(chan.members["002AAAAAA"].status.contains(&'v'));
}

#[test]
fn older_remote_timestamp_prunes_newer_list_entries() {
    let mut t = setup();
    {
        let chan = t.net.channel_mut("#x").unwrap();
        chan.add_list_entry(
            'b',
            weftd::state::ListEntry {
                mask: "old!*@*".to_string(),
                set_by: "alice".to_string(),
                set_time: 800,
            },
        );
        chan.add_list_entry(
            'b',
            weftd::state::ListEntry {
                mask: "new!*@*".to_string(),
                set_by: "alice".to_string(),
                set_time: 1500,
            },
        );
    }
    t.line("leaf", ":002 SJOIN 900 #x :@002AAAAAA");
    let chan = t.net.channel("#x").unwrap();
    let masks: Vec<&str> = chan.list('b').iter().map(|e| e.mask.as_str()).collect();
    assert_eq!(masks, vec!["old!*@*"], "entries set after the winning timestamp reset");
}
