use clap::Parser;
use huddle_chat::{ChatConfig, ChatSession, Composer, SendOutcome, Timeline, UserIdentity};
use huddle_store::{DocumentDb, StoreConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite file to use (a fresh one in the temp dir by default)
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Messages bob sends before alice scrolls back
    #[arg(short, long, default_value = "45")]
    messages: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    let db_path = args
        .db
        .unwrap_or_else(|| std::env::temp_dir().join(format!("huddle-{}.db", std::process::id())));

    let db = DocumentDb::open(StoreConfig {
        db_path: db_path.clone(),
        ..Default::default()
    })
    .await?;
    println!("Store: {}", db_path.display());

    let alice = UserIdentity::new("alice", "Alice");
    let bob = UserIdentity::new("bob", "Bob");
    let carol = UserIdentity::new("carol", "Carol");

    let alice_session = ChatSession::start(&db, alice.clone(), ChatConfig::default(), false);
    let bob_session = ChatSession::start(&db, bob.clone(), ChatConfig::default(), true);

    let direct = alice_session.open_direct(&bob).await?;
    println!("Direct conversation: {}", direct);

    let mut composer = Composer::new(direct.clone());
    for i in 0..args.messages {
        composer.set_draft(format!("message #{}", i));
        if let SendOutcome::Failed(e) = composer.submit(bob_session.messages(), &bob.id).await {
            anyhow::bail!("send failed: {}", e);
        }
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Alice's tab title: {}", alice_session.unread().title("Huddle"));
    alice_session.set_foreground(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("After focusing: {}", alice_session.unread().title("Huddle"));

    let stream = alice_session.messages();
    let mut timeline = Timeline::from_config(stream.config());
    let mut tail = stream.subscribe_tail(&direct);
    if let Some(window) = tail.next().await {
        timeline.apply_tail(window);
    }
    while !timeline.history_exhausted() {
        let Some(cursor) = timeline.oldest_cursor() else { break };
        let page = stream.load_older_page(&direct, &cursor).await?;
        println!("Loaded {} older messages", page.len());
        timeline.apply_older_page(page);
    }
    println!("Timeline holds {} messages", timeline.len());
    tail.unsubscribe();

    let squad = alice_session
        .create_group(&[bob.clone(), carol.clone()], "Squad")
        .await?;
    let after = alice_session.leave_group(&squad).await?;
    println!(
        "Alice left {}; admin is now {:?}, members {:?}",
        squad, after.admin_id, after.participants
    );

    let mut list = alice_session.subscribe_conversations();
    if let Some(conversations) = list.next().await {
        for c in conversations {
            println!("  {} \"{}\"", c.id, c.last_message);
        }
    }
    list.unsubscribe();

    alice_session.logout();
    bob_session.logout();
    Ok(())
}
