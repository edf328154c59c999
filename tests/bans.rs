//! Ban evaluation: literal masks, exemptions, extbans.

mod common;

use common::{any_line, TestNet};

fn net_with_op_channel() -> TestNet {
    let mut t = TestNet::new();
    t.connect("alice");
    t.register("alice", "alice");
    t.line("alice", "JOIN #x");
    t.drain("alice");
    t
}

#[test]
fn banned_ip_mask_blocks_join_without_mesh_traffic() {
    let mut t = net_with_op_channel();
    t.link_server("leaf", "002");
    t.line("leaf", ":002 EOS");
    t.drain("leaf");

    t.line("alice", "MODE #x +b *!*@1.2.*.*");
    t.drain("alice");
    t.drain("leaf");

    t.connect_from("bob", "1.2.3.4");
    t.register("bob", "bob");
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), " 474 "));
    assert_eq!(t.member_count("#x"), 1);
    assert!(
        !any_line(&t.drain("leaf"), "SJOIN"),
        "a refused join must not reach the mesh"
    );
}

#[test]
fn ban_exemption_overrides_the_ban() {
    let mut t = net_with_op_channel();
    t.line("alice", "MODE #x +b *!*@1.2.*.*");
    t.line("alice", "MODE #x +e bob!*@*");
    t.drain("alice");

    t.connect_from("bob", "1.2.3.4");
    t.register("bob", "bob");
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), "JOIN :#x"));
}

#[test]
fn ban_masks_are_normalised_and_deduplicated() {
    let mut t = net_with_op_channel();
    t.line("alice", "MODE #x +b badguy");
    t.drain("alice");
    let chan = t.net.channel("#x").unwrap();
    assert_eq!(chan.list('b')[0].mask, "badguy!*@*");

    // The duplicate is rejected silently: no second entry, no broadcast.
    t.line("alice", "MODE #x +b badguy!*@*");
    assert_eq!(t.net.channel("#x").unwrap().list('b').len(), 1);
    assert!(t.drain("alice").is_empty());
}

#[test]
fn account_extban_matches_identified_users() {
    let mut t = net_with_op_channel();
    t.line("alice", "MODE #x +b ~a:troll");
    t.drain("alice");
    // Stored in long form.
    assert_eq!(t.net.channel("#x").unwrap().list('b')[0].mask, "~account:troll");

    t.connect("bob");
    t.register("bob", "bob");
    // Not identified: the extban does not match.
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), "JOIN :#x"));
    t.line("bob", "PART #x");
    t.drain("bob");

    // Identify bob, then the ban bites.
    t.net
        .entity_mut("001AAAAAB")
        .unwrap()
        .user_mut()
        .unwrap()
        .account = "troll".to_string();
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), " 474 "));
}

#[test]
fn timed_extban_expires_on_the_sweep() {
    let mut t = net_with_op_channel();
    t.line("alice", "MODE #x +b ~time:30:bob");
    t.drain("alice");
    assert_eq!(
        t.net.channel("#x").unwrap().list('b')[0].mask,
        "~time:30:bob!*@*"
    );

    t.connect("bob");
    t.register("bob", "bob");
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), " 474 "));

    // Age the entry past its half hour and run the maintenance tick.
    t.net
        .channel_mut("#x")
        .unwrap()
        .lists
        .get_mut(&'b')
        .unwrap()[0]
        .set_time -= 31 * 60;
    t.net.tick();
    assert!(t.net.channel("#x").unwrap().list('b').is_empty());
    assert!(any_line(&t.drain("alice"), "MODE #x -b ~time:30:bob!*@*"));

    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), "JOIN :#x"));
}

#[test]
fn overriding_invite_beats_the_ban() {
    let mut t = net_with_op_channel();
    t.line("alice", "MODE #x +b bob!*@*");
    t.drain("alice");

    t.connect("bob");
    t.register("bob", "bob");
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), " 474 "));

    t.line("alice", "INVITE bob #x");
    t.drain("alice");
    t.drain("bob");
    t.line("bob", "JOIN #x");
    assert!(any_line(&t.drain("bob"), "JOIN :#x"));
}
