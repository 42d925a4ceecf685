//! End-to-end tests driving real WebSocket clients against the relay

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use dm_relay::{
    serve, BroadcastRouter, ChatEvent, Identity, MemoryDirectory, MemoryStore, MessageStore,
    RelayState, RoomKey, RoomKeyMode, RouterHandle,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const QUIET: Duration = Duration::from_millis(200);
const PATIENCE: Duration = Duration::from_secs(5);

struct Relay {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    router: RouterHandle,
    mode: RoomKeyMode,
}

impl Relay {
    async fn start(mode: RoomKeyMode) -> Self {
        let directory = MemoryDirectory::new();
        directory.add_user("alice", "alice-token").unwrap();
        directory.add_user("bob", "bob-token").unwrap();

        let store = Arc::new(MemoryStore::new());
        let router = BroadcastRouter::spawn(64);
        let state = RelayState::new(Arc::new(directory), store.clone(), router.clone(), mode);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));

        Self {
            addr,
            store,
            router,
            mode,
        }
    }

    /// Connect as the owner of `token` toward `target` and wait until registered
    async fn connect(&self, owner: &str, token: &str, target: &str, members: usize) -> Ws {
        let url = format!("ws://{}/ws/chat/{}/?token={}", self.addr, target, token);
        let (ws, _) = connect_async(url).await.unwrap();
        self.wait_for_room(owner, target, members).await;
        ws
    }

    async fn wait_for_room(&self, owner: &str, target: &str, members: usize) {
        let room = RoomKey::derive(owner, target, self.mode);
        timeout(PATIENCE, async {
            while self.router.room_size(room.clone()).await.unwrap() != members {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never registered");
    }
}

async fn send(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn next_chat(ws: &mut Ws) -> ChatEvent {
    loop {
        let frame = timeout(PATIENCE, ws.next())
            .await
            .expect("no frame arrived")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Ws) {
    assert!(timeout(QUIET, ws.next()).await.is_err(), "unexpected frame");
}

fn chat(sender: &str, receiver: &str, message: &str) -> ChatEvent {
    ChatEvent {
        sender: Identity::new(sender),
        receiver: Identity::new(receiver),
        message: message.to_string(),
    }
}

#[tokio::test]
async fn test_alice_to_bob_is_stored_and_echoed() {
    let relay = Relay::start(RoomKeyMode::Directional).await;
    let mut alice = relay.connect("alice", "alice-token", "bob", 1).await;

    send(&mut alice, r#"{"message": "hi"}"#).await;
    assert_eq!(next_chat(&mut alice).await, chat("alice", "bob", "hi"));

    let stored = relay
        .store
        .conversation(&Identity::new("alice"), &Identity::new("bob"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "hi");
}

#[tokio::test]
async fn test_every_connection_in_the_room_receives() {
    let relay = Relay::start(RoomKeyMode::Directional).await;
    let mut first = relay.connect("alice", "alice-token", "bob", 1).await;
    let mut second = relay.connect("alice", "alice-token", "bob", 2).await;

    send(&mut first, r#"{"message": "both tabs"}"#).await;
    assert_eq!(next_chat(&mut first).await, chat("alice", "bob", "both tabs"));
    assert_eq!(next_chat(&mut second).await, chat("alice", "bob", "both tabs"));
}

#[tokio::test]
async fn test_directional_keys_keep_the_pair_apart() {
    let relay = Relay::start(RoomKeyMode::Directional).await;
    let mut alice = relay.connect("alice", "alice-token", "bob", 1).await;
    let mut bob = relay.connect("bob", "bob-token", "alice", 1).await;

    send(&mut alice, r#"{"message": "hello bob"}"#).await;
    assert_eq!(next_chat(&mut alice).await, chat("alice", "bob", "hello bob"));

    // stored for bob, but bob's connection sits in chat_bob_alice
    assert_silent(&mut bob).await;
    assert_eq!(relay.store.len().await, 1);
}

#[tokio::test]
async fn test_sorted_keys_put_the_pair_together() {
    let relay = Relay::start(RoomKeyMode::Sorted).await;
    let mut alice = relay.connect("alice", "alice-token", "bob", 1).await;
    let mut bob = relay.connect("bob", "bob-token", "alice", 2).await;

    send(&mut bob, r#"{"message": "hey alice"}"#).await;
    assert_eq!(next_chat(&mut alice).await, chat("bob", "alice", "hey alice"));
    assert_eq!(next_chat(&mut bob).await, chat("bob", "alice", "hey alice"));
}

#[tokio::test]
async fn test_unauthenticated_upgrade_is_refused() {
    let relay = Relay::start(RoomKeyMode::Directional).await;

    for url in [
        format!("ws://{}/ws/chat/bob/", relay.addr),
        format!("ws://{}/ws/chat/bob/?token=forged", relay.addr),
        format!("ws://{}/ws/chat/?token=alice-token", relay.addr),
    ] {
        match connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
            other => panic!("expected HTTP rejection, got {:?}", other.map(|_| ())),
        }
    }

    let stats = relay.router.stats().await.unwrap();
    assert_eq!(stats.sessions, 0);
}

#[tokio::test]
async fn test_unknown_receiver_is_silently_dropped() {
    let relay = Relay::start(RoomKeyMode::Directional).await;
    let mut alice = relay.connect("alice", "alice-token", "eve", 1).await;

    send(&mut alice, r#"{"message": "anyone?"}"#).await;
    assert_silent(&mut alice).await;
    assert!(relay.store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let relay = Relay::start(RoomKeyMode::Directional).await;
    let mut alice = relay.connect("alice", "alice-token", "bob", 1).await;

    send(&mut alice, "definitely not json").await;
    send(&mut alice, r#"{"content": "wrong field"}"#).await;
    send(&mut alice, r#"{"message": "still here"}"#).await;

    assert_eq!(next_chat(&mut alice).await, chat("alice", "bob", "still here"));
    assert_eq!(relay.store.len().await, 1);
}

#[tokio::test]
async fn test_disconnect_deregisters_and_drops_room() {
    let relay = Relay::start(RoomKeyMode::Directional).await;
    let mut alice = relay.connect("alice", "alice-token", "bob", 1).await;

    alice.close(None).await.unwrap();
    relay.wait_for_room("alice", "bob", 0).await;

    let stats = relay.router.stats().await.unwrap();
    assert_eq!(stats.rooms, 0);
    assert_eq!(stats.sessions, 0);
}
