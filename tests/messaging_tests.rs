//! Scenario tests for the conversation directory, message pipeline and
//! group membership:
//!
//! - get-or-create dedup: at most one direct conversation per unordered
//!   pair, with exactly two participant rows on creation;
//! - send/fetch round-trip and read-marking idempotence;
//! - group creation roles, the lead-cannot-leave rule, and the
//!   compensating cleanup when membership inserts fail.

use std::time::{SystemTime, UNIX_EPOCH};

use pccoe_connect::storage::{LeaveOutcome, MessageRow, Storage};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn storage() -> Storage {
    Storage::open_in_memory().unwrap()
}

// ---------------------------------------------------------------------------
// Conversation directory
// ---------------------------------------------------------------------------

#[test]
fn get_or_create_is_idempotent_per_unordered_pair() {
    let db = storage();
    let now = now_secs();

    // First call with no existing conversation creates one
    assert!(db.find_direct_conversation("a", "b").unwrap().is_none());
    let id = db.create_direct_conversation("a", "b", now).unwrap();

    // Exactly two participant rows referencing a and b
    let participants = db.participants_of(&id).unwrap();
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().any(|p| p.profile_id == "a"));
    assert!(participants.iter().any(|p| p.profile_id == "b"));

    // A second lookup — either direction — finds the same conversation, so
    // the caller never creates a duplicate
    assert_eq!(db.find_direct_conversation("a", "b").unwrap(), Some(id.clone()));
    assert_eq!(db.find_direct_conversation("b", "a").unwrap(), Some(id));
}

#[test]
fn conversation_listing_orders_by_recency() {
    let db = storage();
    let now = now_secs();

    let stale = db.create_direct_conversation("a", "b", now).unwrap();
    let fresh = db.create_direct_conversation("a", "c", now + 1).unwrap();

    let listed = db.list_conversations_for_user("a").unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].conversation_id, fresh);

    // A new message bumps updated_at and reorders the listing
    db.touch_conversation(&stale, now + 100).unwrap();
    let listed = db.list_conversations_for_user("a").unwrap();
    assert_eq!(listed[0].conversation_id, stale);

    // b sees only its own conversation
    assert_eq!(db.list_conversations_for_user("b").unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Message pipeline
// ---------------------------------------------------------------------------

#[test]
fn sent_message_round_trips_through_fetch() {
    let db = storage();
    let now = now_secs();
    let conv = db.create_direct_conversation("a", "b", now).unwrap();

    db.insert_message(&MessageRow {
        message_id: "m1".to_string(),
        conversation_id: conv.clone(),
        sender_id: "a".to_string(),
        content: "see you at the canteen".to_string(),
        created_at: now,
        read_at: None,
    })
    .unwrap();

    let fetched = db.list_conversation_messages(&conv).unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].content, "see you at the canteen");
    assert_eq!(fetched[0].sender_id, "a");
    assert_eq!(fetched[0].read_at, None);
}

#[test]
fn mark_read_skips_own_messages_and_is_idempotent() {
    let db = storage();
    let now = now_secs();
    let conv = db.create_direct_conversation("a", "b", now).unwrap();

    for (i, sender) in ["a", "b", "a"].iter().enumerate() {
        db.insert_message(&MessageRow {
            message_id: format!("m{i}"),
            conversation_id: conv.clone(),
            sender_id: sender.to_string(),
            content: format!("msg {i}"),
            created_at: now + i as u64,
            read_at: None,
        })
        .unwrap();
    }

    // b has two unread (both from a); a has one unread (from b)
    assert_eq!(db.unread_count(&conv, "b").unwrap(), 2);
    assert_eq!(db.unread_count(&conv, "a").unwrap(), 1);

    // First pass stamps, second changes nothing
    assert_eq!(db.mark_messages_read(&conv, "b", now + 10).unwrap(), 2);
    assert_eq!(db.mark_messages_read(&conv, "b", now + 20).unwrap(), 0);

    // The read timestamp is the first invocation's, untouched by the second
    let msgs = db.list_conversation_messages(&conv).unwrap();
    assert_eq!(msgs[0].read_at, Some(now + 10));
    // b's own message stays unread from a's perspective until a marks it
    assert_eq!(msgs[1].read_at, None);
    assert_eq!(db.unread_count(&conv, "a").unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Group membership
// ---------------------------------------------------------------------------

#[test]
fn group_creation_assigns_roles_and_leave_respects_the_lead_rule() {
    let db = storage();
    let now = now_secs();

    let id = db
        .create_group_conversation(
            "Sem 6 Project",
            Some("Compiler group"),
            None,
            "a",
            &["b".to_string(), "c".to_string()],
            now,
        )
        .unwrap();

    // Membership is exactly {a: lead, b: member, c: member}
    let members = db.list_group_members(&id).unwrap();
    assert_eq!(members.len(), 3);
    let role = |u: &str| {
        members
            .iter()
            .find(|m| m.profile_id == u)
            .map(|m| m.role.clone())
            .unwrap()
    };
    assert_eq!(role("a"), "lead");
    assert_eq!(role("b"), "member");
    assert_eq!(role("c"), "member");

    // The lead's leave is refused and membership is unchanged
    assert_eq!(db.leave_group(&id, "a").unwrap(), LeaveOutcome::LeadRefused);
    assert_eq!(db.list_group_members(&id).unwrap().len(), 3);

    // A member's leave succeeds and removes them from both tables
    assert_eq!(db.leave_group(&id, "b").unwrap(), LeaveOutcome::Left);
    let members = db.list_group_members(&id).unwrap();
    assert_eq!(members.len(), 2);
    assert!(!members.iter().any(|m| m.profile_id == "b"));
    assert!(!db.is_participant(&id, "b").unwrap());

    // A non-member's leave reports not-member
    assert_eq!(db.leave_group(&id, "b").unwrap(), LeaveOutcome::NotMember);
}

#[test]
fn failed_membership_insert_compensates_the_conversation_row() {
    let db = storage();
    let now = now_secs();

    // A duplicate member id breaks the membership primary key partway
    // through; the creation saga must undo everything written before it.
    let result = db.create_group_conversation(
        "Broken",
        None,
        None,
        "a",
        &["b".to_string(), "b".to_string()],
        now,
    );
    assert!(result.is_err());

    assert!(db.list_conversations_for_user("a").unwrap().is_empty());
    assert!(db.list_conversations_for_user("b").unwrap().is_empty());
}

#[test]
fn role_updates_apply_to_admin_and_member_only_paths() {
    let db = storage();
    let now = now_secs();

    let id = db
        .create_group_conversation("G", None, None, "a", &["b".to_string()], now)
        .unwrap();

    // Promote, then demote
    assert!(db.update_group_member_role(&id, "b", "admin").unwrap());
    assert_eq!(db.get_group_member(&id, "b").unwrap().unwrap().role, "admin");
    assert!(db.update_group_member_role(&id, "b", "member").unwrap());
    assert_eq!(db.get_group_member(&id, "b").unwrap().unwrap().role, "member");

    // The lead row is untouched by membership churn
    assert_eq!(db.get_group_member(&id, "a").unwrap().unwrap().role, "lead");
}
