//! End-to-end tests against a real listener with a WebSocket client posing
//! as the game.

use std::time::Duration;

use bedrock_gateway::{
    EventKind, Gateway, GatewayConfig, ServerEvent, SessionConfig, World, WorldCommands,
};
use bedrock_protocol::{Envelope, MessagePurpose};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_gateway() -> (Gateway, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Gateway::new(GatewayConfig {
        bind: addr.to_string(),
        session: SessionConfig {
            roster_poll_interval: Duration::from_secs(3600),
            ..SessionConfig::default()
        },
        ..GatewayConfig::default()
    });

    let server = gateway.clone();
    tokio::spawn(async move { server.serve(listener).await });
    (gateway, format!("ws://{}", addr))
}

async fn connect(url: &str, session_token: &str) -> Client {
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert("x-proxvc-session", HeaderValue::from_str(session_token).unwrap());
    let (client, _) = connect_async(request).await.unwrap();
    client
}

async fn next_envelope(client: &mut Client) -> Envelope {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .unwrap();
        if let Message::Text(text) = message {
            return Envelope::decode(&text).unwrap();
        }
    }
}

async fn reply(client: &mut Client, request: &Envelope, body: Value) {
    let frame = json!({
        "header": {
            "version": 1,
            "requestId": request.request_id().unwrap(),
            "messagePurpose": "commandResponse"
        },
        "body": body
    });
    client.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn next_event(events: &mut broadcast::Receiver<ServerEvent>, kind: EventKind) -> ServerEvent {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for an event")
            .unwrap();
        if event.kind() == kind {
            return event;
        }
    }
}

/// Answer the subscribe and host lookup a fresh session sends
async fn complete_startup(client: &mut Client, host: &str) {
    let subscribe = next_envelope(client).await;
    assert_eq!(subscribe.header.message_purpose, MessagePurpose::Subscribe);
    assert_eq!(subscribe.body["eventName"], "PlayerMessage");
    reply(client, &subscribe, json!({ "statusCode": 0 })).await;

    let lookup = next_envelope(client).await;
    assert_eq!(lookup.body["commandLine"], "getlocalplayername");
    reply(
        client,
        &lookup,
        json!({ "statusCode": 0, "localplayername": host }),
    )
    .await;
}

fn world_of(event: &ServerEvent) -> World {
    event.world().cloned().expect("event without world")
}

#[tokio::test]
async fn test_world_lifecycle() {
    let (gateway, url) = start_gateway().await;
    let mut events = gateway.hub().subscribe();

    next_event(&mut events, EventKind::Open).await;

    let mut client = connect(&url, "sess-42").await;
    let world = world_of(&next_event(&mut events, EventKind::WorldAdd).await);
    assert_eq!(world.session_token(), Some("sess-42"));
    assert!(world.domain().is_some());
    assert!(world.is_attached());

    complete_startup(&mut client, "HostPlayer").await;

    // Chat from the game
    let chat = json!({
        "header": { "version": 1, "eventName": "PlayerMessage", "messagePurpose": "event" },
        "body": { "sender": "Steve", "message": "hello", "type": "chat" }
    });
    client.send(Message::Text(chat.to_string())).await.unwrap();
    match next_event(&mut events, EventKind::Chat).await {
        ServerEvent::Chat { sender, message, world: chat_world } => {
            assert_eq!(sender.name(), "Steve");
            assert_eq!(message, "hello");
            assert_eq!(chat_world, world);
        }
        other => panic!("Expected chat, got {:?}", other),
    }
    for _ in 0..100 {
        if world.local_player_name() == "HostPlayer" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(world.local_player_name(), "HostPlayer");

    // Command round trip
    let command = tokio::spawn({
        let world = world.clone();
        async move { world.run_command("time query daytime").await }
    });
    let request = next_envelope(&mut client).await;
    assert_eq!(request.header.message_purpose, MessagePurpose::CommandRequest);
    assert_eq!(request.body["commandLine"], "time query daytime");
    reply(&mut client, &request, json!({ "statusCode": 0, "data": 1000 })).await;
    let response = command.await.unwrap();
    assert!(response.is_success());
    assert_eq!(response.field("data"), Some(&json!(1000)));

    // Disconnect
    client.close(None).await.unwrap();
    let removed = world_of(&next_event(&mut events, EventKind::WorldRemove).await);
    assert_eq!(removed, world);
    assert!(!world.is_attached());
    assert_eq!(world.run_command("list").await.status_code, -1);
    assert_eq!(gateway.hub().session_count(), 0);
}

#[tokio::test]
async fn test_pending_command_fails_on_disconnect() {
    let (gateway, url) = start_gateway().await;
    let mut events = gateway.hub().subscribe();

    let mut client = connect(&url, "sess-1").await;
    let world = world_of(&next_event(&mut events, EventKind::WorldAdd).await);
    complete_startup(&mut client, "HostPlayer").await;

    let session = world.session().unwrap();
    let command = tokio::spawn(async move { session.list_players().await });
    let request = next_envelope(&mut client).await;
    assert_eq!(request.body["commandLine"], "list");

    drop(client);
    next_event(&mut events, EventKind::WorldRemove).await;
    assert!(command.await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worlds_are_independent() {
    let (gateway, url) = start_gateway().await;
    let mut events = gateway.hub().subscribe();

    let mut first = connect(&url, "one").await;
    let first_world = world_of(&next_event(&mut events, EventKind::WorldAdd).await);
    complete_startup(&mut first, "Alpha").await;

    let mut second = connect(&url, "two").await;
    let second_world = world_of(&next_event(&mut events, EventKind::WorldAdd).await);
    complete_startup(&mut second, "Beta").await;

    assert_ne!(first_world, second_world);
    assert_eq!(gateway.hub().worlds().len(), 2);

    // A handler registered now subscribes both worlds
    gateway.hub().on(EventKind::PlayerTravelled, |_| {});
    for client in [&mut first, &mut second] {
        let subscribe = next_envelope(client).await;
        assert_eq!(subscribe.header.message_purpose, MessagePurpose::Subscribe);
        assert_eq!(subscribe.body["eventName"], "PlayerTravelled");
    }

    second.close(None).await.unwrap();
    let removed = world_of(&next_event(&mut events, EventKind::WorldRemove).await);
    assert_eq!(removed, second_world);
    assert!(first_world.is_attached());
}
