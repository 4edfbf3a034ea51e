//! Scenario tests for the connection graph and the notification feed:
//!
//! - the per-pair state machine (none -> pending -> accepted, cancel,
//!   reject, remove) with accept keyed by the (requester, recipient) pair;
//! - the bidirectional fallback on removal;
//! - the accepted concurrent-request race (two pending rows);
//! - synthesized connection-request notifications and their lifecycle.

use std::time::{SystemTime, UNIX_EPOCH};

use pccoe_connect::storage::{ProfileRow, Storage};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn storage() -> Storage {
    Storage::open_in_memory().unwrap()
}

fn profile(user_id: &str, name: &str) -> ProfileRow {
    let now = now_secs();
    ProfileRow {
        user_id: user_id.to_string(),
        display_name: name.to_string(),
        avatar_url: None,
        role: "student".to_string(),
        phone: None,
        bio: None,
        department: None,
        prn: None,
        branch: None,
        year: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Connection state machine
// ---------------------------------------------------------------------------

#[test]
fn pair_holds_at_most_one_state_through_sequential_operations() {
    let db = storage();
    let now = now_secs();

    // none
    assert!(db.connection_between("a", "b").unwrap().is_none());

    // none -> pending(a->b)
    db.insert_connection("a", "b", now).unwrap();
    let edge = db.connection_between("a", "b").unwrap().unwrap();
    assert_eq!((edge.sender_id.as_str(), edge.status.as_str()), ("a", "pending"));

    // pending(a->b) -> accepted; accept keyed by the wrong direction is a
    // not-found outcome and changes nothing
    assert!(!db.accept_connection("b", "a", now).unwrap());
    assert!(db.accept_connection("a", "b", now).unwrap());
    let edge = db.connection_between("a", "b").unwrap().unwrap();
    assert_eq!(edge.status, "accepted");

    // accepted -> none
    assert!(db.remove_connection("a", "b").unwrap());
    assert!(db.connection_between("a", "b").unwrap().is_none());

    // An edge never skips from none to accepted
    assert!(!db.accept_connection("a", "b", now).unwrap());
    assert!(db.connection_between("a", "b").unwrap().is_none());
}

#[test]
fn cancel_and_reject_return_the_pair_to_none() {
    let db = storage();
    let now = now_secs();

    // Sender cancels their own request
    db.insert_connection("a", "b", now).unwrap();
    assert!(db.delete_pending_connection("a", "b").unwrap());
    assert!(db.connection_between("a", "b").unwrap().is_none());

    // Receiver rejects: same deletion, initiated from the other side
    db.insert_connection("a", "b", now).unwrap();
    assert!(db.delete_pending_connection("a", "b").unwrap());
    assert!(db.connection_between("a", "b").unwrap().is_none());

    // Targeting an absent edge is an error outcome, not a silent success
    assert!(!db.delete_pending_connection("a", "b").unwrap());
}

#[test]
fn remove_succeeds_when_edge_is_stored_in_the_reverse_direction() {
    let db = storage();
    let now = now_secs();

    db.insert_connection("b", "a", now).unwrap();
    db.accept_connection("b", "a", now).unwrap();

    // Caller asks as (a, b); storage must fall back to the b->a direction
    assert!(db.remove_connection("a", "b").unwrap());
    assert!(db.connection_between("a", "b").unwrap().is_none());
}

#[test]
fn concurrent_cross_requests_both_land() {
    let db = storage();
    let now = now_secs();

    // The insert path performs no duplicate or reverse-edge pre-check, so
    // two users requesting each other concurrently produce two pending
    // rows. This is accepted current behavior, not a defect to fix here.
    db.insert_connection("a", "b", now).unwrap();
    db.insert_connection("b", "a", now).unwrap();

    assert_eq!(db.list_pending_requests_to("a").unwrap().len(), 1);
    assert_eq!(db.list_pending_requests_to("b").unwrap().len(), 1);
    assert_eq!(db.list_pending_requests_from("a").unwrap().len(), 1);
    assert_eq!(db.list_pending_requests_from("b").unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Notification feed
// ---------------------------------------------------------------------------

#[test]
fn pending_request_synthesizes_a_notification_keyed_by_sender() {
    let db = storage();
    let now = now_secs();

    db.insert_profile(&profile("asha", "Asha Patil")).unwrap();
    db.insert_connection("asha", "rohan", now).unwrap();

    let feed = db.notification_feed("rohan").unwrap();
    assert_eq!(feed.len(), 1);
    let item = &feed[0];
    assert_eq!(item.title, "Connection Request");
    assert_eq!(item.category, "connection_request");
    assert!(item.content.contains("Asha Patil"));
    // Not stored: no row id. The connection_id is the sender's user id,
    // which is what the accept/reject operations key off.
    assert!(item.id.is_none());
    assert_eq!(item.connection_id.as_deref(), Some("asha"));

    // Accepting by (requester, recipient) pair works directly from the
    // synthesized item's connection_id.
    let requester = item.connection_id.clone().unwrap();
    assert!(db.accept_connection(&requester, "rohan", now + 1).unwrap());

    // The synthesized entry has no lifecycle of its own: it is gone on the
    // next fetch because the underlying row left pending.
    assert!(db.notification_feed("rohan").unwrap().is_empty());
}

#[test]
fn feed_merges_stored_and_synthesized_newest_first() {
    let db = storage();
    let now = now_secs();

    db.insert_profile(&profile("asha", "Asha Patil")).unwrap();
    db.insert_profile(&profile("kiran", "Kiran Shinde")).unwrap();

    db.insert_notification(&pccoe_connect::storage::NotificationRow {
        id: 0,
        user_id: "rohan".to_string(),
        title: "Fest schedule".to_string(),
        content: "Techfest registrations open".to_string(),
        category: "announcement".to_string(),
        sender_id: None,
        created_at: now,
    })
    .unwrap();
    db.insert_connection("asha", "rohan", now + 10).unwrap();
    db.insert_connection("kiran", "rohan", now + 5).unwrap();

    let feed = db.notification_feed("rohan").unwrap();
    assert_eq!(feed.len(), 3);
    let created: Vec<u64> = feed.iter().map(|n| n.created_at).collect();
    assert_eq!(created, vec![now + 10, now + 5, now]);
    assert_eq!(feed[0].connection_id.as_deref(), Some("asha"));
    assert_eq!(feed[2].title, "Fest schedule");
}
