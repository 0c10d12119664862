// Copyright 2025 Huddle Team.
//
// Tests for MessageStream, Timeline and Composer

use huddle_chat::{
    ChatConfig, ChatError, Composer, MembershipManager, MessageStream, SendOutcome, Timeline,
    UserIdentity,
};
use huddle_store::{DocumentDb, StoreConfig};
use std::collections::HashSet;
use tempfile::NamedTempFile;

async fn open_test_db(path: &NamedTempFile) -> DocumentDb {
    DocumentDb::open(StoreConfig {
        db_path: path.path().to_path_buf(),
        ..Default::default()
    })
    .await
    .expect("Failed to open document store")
}

async fn direct_conversation(db: &DocumentDb) -> String {
    MembershipManager::new(db.conversations(), ChatConfig::default())
        .find_or_create_direct(
            &UserIdentity::new("alice", "Alice"),
            &UserIdentity::new("bob", "Bob"),
        )
        .await
        .expect("Failed to create conversation")
}

fn stream(db: &DocumentDb, config: ChatConfig) -> MessageStream {
    MessageStream::new(db.messages(), db.conversations(), config)
}

#[tokio::test]
async fn test_send_updates_preview() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let stream = stream(&db, ChatConfig::default());

    let created_at = db.conversations().get(&id).await.unwrap().unwrap().last_message_at;

    let message = stream.send(&id, "bob", "hi", None).await.unwrap();
    assert_eq!(message.sender_id, "bob");
    assert!(!message.read);

    let conversation = db.conversations().get(&id).await.unwrap().unwrap();
    assert_eq!(conversation.last_message, "hi");
    assert_eq!(conversation.last_message_sender_id.as_deref(), Some("bob"));
    assert_eq!(conversation.last_message_at, Some(message.created_at));
    assert!(conversation.last_message_at > created_at);
}

#[tokio::test]
async fn test_send_rejections() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let stream = stream(&db, ChatConfig::default());

    let blank = stream.send(&id, "bob", "  \n ", None).await;
    assert!(matches!(blank, Err(ChatError::Validation(_))));

    let missing = stream.send("missing", "bob", "hello?", None).await;
    assert!(matches!(missing, Err(ChatError::NotFound(_))));

    assert!(db.messages().tail(&id, 30).await.unwrap().is_empty());
    assert!(db.messages().tail("missing", 30).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_snapshot_is_frozen_at_send_time() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let stream = stream(&db, ChatConfig::default());

    let long = "a".repeat(120);
    let original = stream.send(&id, "alice", &long, None).await.unwrap();
    let reply_to = stream.reply_to(&original, "Alice");

    let reply = stream.send(&id, "bob", "agreed", Some(reply_to)).await.unwrap();

    let stored = db.messages().get(&reply.id).await.unwrap().unwrap();
    let snapshot = stored.reply_to.expect("reply snapshot");
    assert_eq!(snapshot.id, original.id);
    assert_eq!(snapshot.sender_name, "Alice");
    assert_eq!(snapshot.text, format!("{}…", "a".repeat(80)));
}

#[tokio::test]
async fn test_tail_window_is_capped_and_replaced() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let stream = stream(&db, ChatConfig::default());

    for i in 0..35 {
        stream.send(&id, "alice", &format!("m{}", i), None).await.unwrap();
    }

    let mut tail = stream.subscribe_tail(&id);
    let window = tail.next().await.unwrap();
    assert_eq!(window.len(), 30);
    assert_eq!(window[0].text, "m5");
    assert_eq!(window[29].text, "m34");

    stream.send(&id, "bob", "m35", None).await.unwrap();
    let window = tail.next().await.unwrap();
    assert_eq!(window.len(), 30);
    assert_eq!(window[0].text, "m6");
    assert_eq!(window[29].text, "m35");

    tail.unsubscribe();
}

#[tokio::test]
async fn test_paging_with_timeline_reproduces_history() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let config = ChatConfig {
        tail_window: 10,
        page_size: 7,
        ..Default::default()
    };
    let stream = stream(&db, config.clone());

    let mut sent = Vec::new();
    for i in 0..40 {
        sent.push(stream.send(&id, "alice", &format!("m{}", i), None).await.unwrap());
    }

    let mut timeline = Timeline::from_config(&config);
    let mut tail = stream.subscribe_tail(&id);
    timeline.apply_tail(tail.next().await.unwrap());
    assert_eq!(timeline.len(), 10);

    // A new message while paging overlaps the previous window
    let late = stream.send(&id, "bob", "late", None).await.unwrap();
    let outcome = timeline.apply_tail(tail.next().await.unwrap());
    assert_eq!(outcome.added, 1);
    assert!(outcome.grew_at_bottom);
    sent.push(late);

    let mut pages = 0;
    while !timeline.history_exhausted() {
        let cursor = timeline.oldest_cursor().expect("timeline has messages");
        let page = stream.load_older_page(&id, &cursor).await.unwrap();
        assert!(page.len() <= config.page_size);
        timeline.apply_older_page(page);
        pages += 1;
        assert!(pages < 20, "paging did not terminate");
    }

    let merged = timeline.to_vec();
    let unique: HashSet<&str> = merged.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(unique.len(), merged.len());
    assert_eq!(merged, sent);
}

#[tokio::test]
async fn test_paging_back_when_tail_window_is_smaller_than_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let config = ChatConfig {
        tail_window: 5,
        page_size: 10,
        ..Default::default()
    };
    let stream = stream(&db, config.clone());

    let mut sent = Vec::new();
    for i in 0..20 {
        sent.push(stream.send(&id, "alice", &format!("m{}", i), None).await.unwrap());
    }

    let mut timeline = Timeline::new(config.tail_window, config.page_size);
    let mut tail = stream.subscribe_tail(&id);
    timeline.apply_tail(tail.next().await.unwrap());
    assert_eq!(timeline.len(), 5);
    assert!(!timeline.history_exhausted());

    let mut pages = 0;
    while !timeline.history_exhausted() {
        let cursor = timeline.oldest_cursor().expect("timeline has messages");
        timeline.apply_older_page(stream.load_older_page(&id, &cursor).await.unwrap());
        pages += 1;
        assert!(pages < 10, "paging did not terminate");
    }

    assert_eq!(pages, 2);
    assert_eq!(timeline.len(), 20);
    assert_eq!(timeline.to_vec(), sent);
}

#[tokio::test]
async fn test_composer_keeps_draft_on_failure() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = open_test_db(&temp_file).await;
    let id = direct_conversation(&db).await;
    let stream = stream(&db, ChatConfig::default());

    let mut broken = Composer::new("missing");
    broken.set_draft("hello");
    let outcome = broken.submit(&stream, "alice").await;
    assert!(matches!(outcome, SendOutcome::Failed(ChatError::NotFound(_))));
    assert_eq!(broken.draft(), "hello");
    assert!(!broken.is_sending());

    let mut composer = Composer::new(id.clone());
    composer.set_draft("   ");
    assert!(matches!(composer.submit(&stream, "alice").await, SendOutcome::Ignored));

    let original = stream.send(&id, "bob", "lunch?", None).await.unwrap();
    composer.set_reply_to(stream.reply_to(&original, "Bob"));
    composer.set_draft("  sure  ");
    match composer.submit(&stream, "alice").await {
        SendOutcome::Sent(message) => {
            assert_eq!(message.text, "sure");
            assert_eq!(message.reply_to.unwrap().id, original.id);
        }
        other => panic!("expected a sent message, got {:?}", other),
    }
    assert_eq!(composer.draft(), "");
    assert!(composer.reply_to().is_none());
}
