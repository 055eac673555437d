//! Full-stack session flow over a real listener: join, initial payloads,
//! update relay, chat, title change and presence on disconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use loro::{ExportMode, LoroDoc};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use collabdoc::auth::AllowAll;
use collabdoc::config::Config;
use collabdoc::models::{
    ChatSendMessage, ClientEvent, JoinMessage, ServerEvent, TitleMessage, UpdateMessage,
};
use collabdoc::routes::create_app;
use collabdoc::store::{DocumentStore, MemoryStore, StoredDocument};
use collabdoc::ws::SessionCoordinator;
use collabdoc::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_document(
            "doc-1",
            StoredDocument {
                state: Vec::new(),
                title: "Untitled Document".to_string(),
            },
        )
        .await;

    let coordinator = Arc::new(SessionCoordinator::new(
        store.clone(),
        store.clone(),
        Arc::new(AllowAll),
        Duration::from_secs(10),
    ));
    let state = Arc::new(AppState {
        config: Config::default(),
        coordinator,
    });
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, store)
}

async fn connect_client(addr: SocketAddr) -> Client {
    let (stream, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    stream
}

async fn send(client: &mut Client, event: &ClientEvent) {
    let text = serde_json::to_string(event).unwrap();
    client.send(Message::text(text)).await.unwrap();
}

async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for an event")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn expect_silence(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(250), client.next()).await;
    assert!(result.is_err(), "expected no event, got {:?}", result);
}

fn join(document_id: &str, username: &str) -> ClientEvent {
    ClientEvent::Join(JoinMessage {
        document_id: document_id.to_string(),
        username: username.to_string(),
        colour: "#abcdef".to_string(),
    })
}

#[tokio::test]
async fn collaborative_session_end_to_end() {
    let (addr, store) = spawn_server().await;

    // First participant joins and receives the full initial payload in order.
    let mut alice = connect_client(addr).await;
    send(&mut alice, &join("doc-1", "alice")).await;

    match next_event(&mut alice).await {
        ServerEvent::UpdateUsers { users } => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].username, "alice");
        }
        other => panic!("expected presence first, got {:?}", other),
    }
    assert!(matches!(
        next_event(&mut alice).await,
        ServerEvent::InitialState(_)
    ));
    match next_event(&mut alice).await {
        ServerEvent::UpdateTitle { title } => assert_eq!(title, "Untitled Document"),
        other => panic!("expected the title, got {:?}", other),
    }
    match next_event(&mut alice).await {
        ServerEvent::LoadMessages { messages } => assert!(messages.is_empty()),
        other => panic!("expected chat history, got {:?}", other),
    }

    // Second participant joins; both see the two-member presence list.
    let mut bob = connect_client(addr).await;
    send(&mut bob, &join("doc-1", "bob")).await;

    match next_event(&mut alice).await {
        ServerEvent::UpdateUsers { users } => assert_eq!(users.len(), 2),
        other => panic!("expected presence update, got {:?}", other),
    }
    match next_event(&mut bob).await {
        ServerEvent::UpdateUsers { users } => assert_eq!(users.len(), 2),
        other => panic!("expected presence, got {:?}", other),
    }
    // Skip the rest of bob's initial payload.
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::InitialState(_)
    ));
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::UpdateTitle { .. }
    ));
    assert!(matches!(
        next_event(&mut bob).await,
        ServerEvent::LoadMessages { .. }
    ));

    // Bob edits; alice receives the delta, bob gets no echo.
    let delta = {
        let doc = LoroDoc::new();
        doc.get_text("content").insert(0, "hello world").unwrap();
        doc.export(ExportMode::Snapshot).unwrap()
    };
    send(
        &mut bob,
        &ClientEvent::Update(UpdateMessage {
            update: delta.clone(),
        }),
    )
    .await;

    match next_event(&mut alice).await {
        ServerEvent::Update(msg) => assert_eq!(msg.update, delta),
        other => panic!("expected the relayed update, got {:?}", other),
    }
    expect_silence(&mut bob).await;

    // Chat reaches the whole room, sender included.
    send(
        &mut alice,
        &ClientEvent::SendMessage(ChatSendMessage {
            document_id: Some("doc-1".to_string()),
            username: Some("alice".to_string()),
            message: Some("hi bob".to_string()),
        }),
    )
    .await;
    for client in [&mut alice, &mut bob] {
        match next_event(client).await {
            ServerEvent::ReceiveMessage { message } => assert_eq!(message.message, "hi bob"),
            other => panic!("expected the chat message, got {:?}", other),
        }
    }

    // Title change reaches the whole room, sender included.
    send(
        &mut alice,
        &ClientEvent::UpdateTitle(TitleMessage {
            document_id: Some("doc-1".to_string()),
            title: Some("Report".to_string()),
        }),
    )
    .await;
    for client in [&mut alice, &mut bob] {
        match next_event(client).await {
            ServerEvent::UpdateTitle { title } => assert_eq!(title, "Report"),
            other => panic!("expected the title change, got {:?}", other),
        }
    }

    // Bob drops; alice sees the presence shrink.
    bob.close(None).await.unwrap();
    match next_event(&mut alice).await {
        ServerEvent::UpdateUsers { users } => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].username, "alice");
        }
        other => panic!("expected presence update, got {:?}", other),
    }

    // Alice drops too; the final save lands in the store with the merged edit
    // and the updated title.
    alice.close(None).await.unwrap();
    let saved = wait_for_final_save(&store).await;
    assert_eq!(saved.title, "Report");
    let restored = LoroDoc::new();
    restored.import(&saved.state).unwrap();
    assert_eq!(restored.get_text("content").to_string(), "hello world");
}

async fn wait_for_final_save(store: &MemoryStore) -> StoredDocument {
    for _ in 0..100 {
        let doc = store.load_document("doc-1").await.unwrap().unwrap();
        if !doc.state.is_empty() && doc.title == "Report" {
            return doc;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("final save never happened");
}

#[tokio::test]
async fn unknown_document_join_is_rejected_over_the_wire() {
    let (addr, _store) = spawn_server().await;

    let mut client = connect_client(addr).await;
    send(&mut client, &join("nope", "alice")).await;

    match next_event(&mut client).await {
        ServerEvent::DocumentError(msg) => {
            assert_eq!(msg.error, "Document not found");
        }
        other => panic!("expected a document error, got {:?}", other),
    }
    expect_silence(&mut client).await;
}
