// Copyright 2025 Huddle Team.
//
// Tests for ChatSession: unread badge, optimistic changes and an end-to-end flow

use huddle_chat::{ChatConfig, ChatError, ChatSession, MessageStream, UnreadStatus, UserIdentity};
use huddle_store::{DocumentDb, StoreConfig};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::time::timeout;

async fn open_test_db(path: &NamedTempFile) -> DocumentDb {
    DocumentDb::open(StoreConfig {
        db_path: path.path().to_path_buf(),
        max_transaction_attempts: 32,
        ..Default::default()
    })
    .await
    .expect("Failed to open document store")
}

fn user(id: &str) -> UserIdentity {
    UserIdentity::new(id, id.to_uppercase())
}

async fn wait_for_status(session: &ChatSession, expected: impl Fn(&UnreadStatus) -> bool) -> UnreadStatus {
    let mut rx = session.unread().watch();
    let status = *timeout(Duration::from_secs(5), rx.wait_for(|s| expected(s)))
        .await
        .expect("Timed out waiting for unread status")
        .expect("Unread badge stopped");
    status
}

#[tokio::test]
async fn test_unread_counts_conversations_while_backgrounded() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let others = MessageStream::new(db.messages(), db.conversations(), ChatConfig::default());

    let session = ChatSession::start(&db, user("alice"), ChatConfig::default(), false);
    let with_bob = session.open_direct(&user("bob")).await.unwrap();
    let with_carol = session.open_direct(&user("carol")).await.unwrap();
    wait_for_status(&session, |s| s.initialized).await;

    others.send(&with_bob, "bob", "hey", None).await.unwrap();
    let status = wait_for_status(&session, |s| s.count == 1).await;
    assert_eq!(status.count, 1);
    assert_eq!(session.unread().title("Huddle"), "(1) Huddle");

    // More messages in the same conversation do not raise the count
    others.send(&with_bob, "bob", "you there?", None).await.unwrap();
    others.send(&with_carol, "carol", "hello", None).await.unwrap();
    wait_for_status(&session, |s| s.count == 2).await;

    session.set_foreground(true);
    wait_for_status(&session, |s| s.count == 0).await;
    assert_eq!(session.unread().title("Huddle"), "Huddle");

    session.logout();
}

#[tokio::test]
async fn test_own_messages_are_not_unread() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let others = MessageStream::new(db.messages(), db.conversations(), ChatConfig::default());

    let session = ChatSession::start(&db, user("alice"), ChatConfig::default(), false);
    let with_bob = session.open_direct(&user("bob")).await.unwrap();
    let with_carol = session.open_direct(&user("carol")).await.unwrap();
    wait_for_status(&session, |s| s.initialized).await;

    session
        .messages()
        .send(&with_bob, "alice", "mine", None)
        .await
        .unwrap();
    others.send(&with_carol, "carol", "theirs", None).await.unwrap();

    let status = wait_for_status(&session, |s| s.count > 0).await;
    assert_eq!(status.count, 1);
}

#[tokio::test]
async fn test_foreground_session_never_shows_unread() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let others = MessageStream::new(db.messages(), db.conversations(), ChatConfig::default());

    let session = ChatSession::start(&db, user("alice"), ChatConfig::default(), true);
    let with_bob = session.open_direct(&user("bob")).await.unwrap();
    wait_for_status(&session, |s| s.initialized).await;

    others.send(&with_bob, "bob", "one", None).await.unwrap();
    others.send(&with_bob, "bob", "two", None).await.unwrap();

    let mut rx = session.unread().watch();
    let _ = timeout(Duration::from_millis(300), rx.wait_for(|s| s.count > 0)).await;
    assert_eq!(session.unread().count(), 0);
}

#[tokio::test]
async fn test_optimistic_changes_are_confirmed_or_rolled_back() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;

    let session = ChatSession::start(&db, user("alice"), ChatConfig::default(), true);
    let group = session
        .create_group(&[user("bob"), user("carol")], "Squad")
        .await
        .unwrap();

    let stale = db.conversations().get(&group).await.unwrap().unwrap();

    let updated = session.add_member(&group, &user("dave")).await.unwrap();
    assert_eq!(session.pending_changes(&group), 1);

    // A snapshot from before the commit still shows dave
    let projected = session.project(&stale);
    assert!(projected.has_participant("dave"));
    assert_eq!(session.pending_changes(&group), 1);

    // The committed snapshot supersedes the local change
    let projected = session.project(&updated);
    assert_eq!(projected, updated);
    assert_eq!(session.pending_changes(&group), 0);

    let rejected = session.add_member(&group, &user("bob")).await;
    assert!(matches!(rejected, Err(ChatError::DuplicateMember(_))));
    assert_eq!(session.pending_changes(&group), 0);
    assert_eq!(session.project(&updated), updated);
}

#[tokio::test]
async fn test_optimistic_rename_matches_committed_name() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;

    let session = ChatSession::start(&db, user("alice"), ChatConfig::default(), true);
    let group = session
        .create_group(&[user("bob"), user("carol")], "Squad")
        .await
        .unwrap();
    let stale = db.conversations().get(&group).await.unwrap().unwrap();

    let long = format!("  {}  ", "n".repeat(80));
    let renamed = session.rename_group(&group, &long).await.unwrap();
    let committed = renamed.group_name.clone().unwrap();
    assert_eq!(committed.chars().count(), 50);

    let projected = session.project(&stale);
    assert_eq!(projected.group_name.as_deref(), Some(committed.as_str()));
    assert_eq!(session.project(&renamed), renamed);

    let blank = session.rename_group(&group, "   ").await;
    assert!(matches!(blank, Err(ChatError::Validation(_))));
    assert_eq!(session.pending_changes(&group), 0);
    assert_eq!(session.project(&renamed), renamed);
}

#[tokio::test]
async fn test_logout_stops_badge_but_not_caller_subscriptions() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let others = MessageStream::new(db.messages(), db.conversations(), ChatConfig::default());

    let session = ChatSession::start(&db, user("alice"), ChatConfig::default(), false);
    let with_bob = session.open_direct(&user("bob")).await.unwrap();
    wait_for_status(&session, |s| s.initialized).await;

    let mut list = session.subscribe_conversations();
    assert_eq!(list.next().await.unwrap().len(), 1);
    let mut badge = session.unread().watch();

    session.logout();

    let stopped = timeout(Duration::from_secs(5), badge.wait_for(|_| false))
        .await
        .expect("Unread badge kept running after logout");
    assert!(stopped.is_err());

    others.send(&with_bob, "bob", "still there?", None).await.unwrap();
    let snapshot = timeout(Duration::from_secs(5), list.next())
        .await
        .expect("Timed out waiting for list snapshot")
        .unwrap();
    assert_eq!(snapshot[0].last_message, "still there?");
}

#[tokio::test]
async fn test_direct_message_then_group_handover() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;

    let a = ChatSession::start(&db, user("a"), ChatConfig::default(), true);
    let b = ChatSession::start(&db, user("b"), ChatConfig::default(), true);

    let direct = a.open_direct(&user("b")).await.unwrap();
    let conversation = db.conversations().get(&direct).await.unwrap().unwrap();
    assert_eq!(conversation.participants, vec!["a", "b"]);
    assert!(!conversation.is_group);

    b.messages().send(&direct, "b", "hi", None).await.unwrap();
    let conversation = db.conversations().get(&direct).await.unwrap().unwrap();
    assert_eq!(conversation.last_message, "hi");
    assert_eq!(conversation.last_message_sender_id.as_deref(), Some("b"));

    let squad = a
        .create_group(&[user("b"), user("c"), user("d")], "Squad")
        .await
        .unwrap();
    let group = db.conversations().get(&squad).await.unwrap().unwrap();
    assert_eq!(group.admin_id.as_deref(), Some("a"));
    assert_eq!(group.participants.len(), 4);

    let after = a.leave_group(&squad).await.unwrap();
    assert_eq!(after.admin_id.as_deref(), Some("b"));
    assert_eq!(after.participants, vec!["b", "c", "d"]);

    // The new admin can manage the group
    let renamed = b.rename_group(&squad, "Squad 2").await.unwrap();
    assert_eq!(renamed.group_name.as_deref(), Some("Squad 2"));
    let removed = b.remove_member(&squad, "d").await.unwrap();
    assert_eq!(removed.participants, vec!["b", "c"]);

    a.logout();
    b.logout();
}
