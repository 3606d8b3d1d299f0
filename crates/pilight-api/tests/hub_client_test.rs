// Integration tests for `HubClient` against an in-process WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use pilight_api::{ControlCode, Error, HubClient, HubConfig, HubEvent, PowerState, Request};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn config(addr: SocketAddr, message_interval_ms: u64) -> HubConfig {
    HubConfig {
        name: Some("itest".into()),
        host: addr.ip().to_string(),
        port: addr.port(),
        message_interval_ms,
        retry_interval_secs: 1,
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_text(server: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = frame {
            return text.to_string();
        }
    }
}

async fn next_event(rx: &mut broadcast::Receiver<Arc<HubEvent>>) -> Arc<HubEvent> {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn wait_for(
    rx: &mut broadcast::Receiver<Arc<HubEvent>>,
    mut pred: impl FnMut(&HubEvent) -> bool,
) -> Arc<HubEvent> {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_requests_config_and_classifies_frames() {
    let (listener, addr) = bind().await;
    let client = HubClient::new(config(addr, 5));
    let mut events = client.subscribe();
    client.connect();

    let mut server = accept(&listener).await;

    assert!(matches!(*next_event(&mut events).await, HubEvent::Connected));
    assert!(client.is_connected());

    // The very first outbound frame is the config request.
    let first = next_text(&mut server).await;
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&first).unwrap(),
        json!({"action": "request config"})
    );

    let snapshot = json!({
        "message": "config",
        "config": {
            "devices": { "12": { "state": "off", "protocol": ["kaku_switch"] } },
            "gui": { "12": { "name": "Lamp", "group": ["Living"] } }
        }
    });
    server.send(Message::text(snapshot.to_string())).await.unwrap();

    let event = next_event(&mut events).await;
    let HubEvent::Config(ref parsed) = *event else {
        panic!("expected config event, got {event:?}");
    };
    assert_eq!(parsed.config.gui["12"].name, "Lamp");

    let update = json!({
        "origin": "update",
        "type": 1,
        "devices": ["12"],
        "values": { "state": "on", "timestamp": 1_700_000_000 }
    });
    server.send(Message::text(update.to_string())).await.unwrap();

    let event = next_event(&mut events).await;
    let HubEvent::Update(ref parsed) = *event else {
        panic!("expected update event, got {event:?}");
    };
    assert!(parsed.names("12"));

    // Garbage frames are dropped without killing the connection.
    server.send(Message::text("not json")).await.unwrap();
    server
        .send(Message::text(json!({"message": "values"}).to_string()))
        .await
        .unwrap();
    assert!(matches!(*next_event(&mut events).await, HubEvent::Values(_)));

    client.close().await;
}

#[tokio::test]
async fn sends_are_ordered_with_minimum_spacing() {
    let interval = Duration::from_millis(20);
    let (listener, addr) = bind().await;
    let client = HubClient::new(config(addr, 20));
    let mut events = client.subscribe();
    client.connect();

    let mut server = accept(&listener).await;
    assert!(matches!(*next_event(&mut events).await, HubEvent::Connected));
    let _config_request = next_text(&mut server).await;

    let tickets: Vec<_> = (0..3)
        .map(|level| {
            client.send(&Request::Control {
                code: ControlCode::dimlevel("d", level),
            })
        })
        .collect();

    let mut arrivals = Vec::new();
    let mut levels = Vec::new();
    for _ in 0..3 {
        let text = next_text(&mut server).await;
        arrivals.push(Instant::now());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        levels.push(value["code"]["values"]["dimlevel"].as_u64().unwrap());
    }

    assert_eq!(levels, vec![0, 1, 2]);
    for pair in arrivals.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= interval / 2, "inter-message gap too small: {gap:?}");
    }

    for ticket in tickets {
        ticket.wait().await.unwrap();
    }

    client.close().await;
}

#[tokio::test]
async fn reconnects_after_peer_drop() {
    let (listener, addr) = bind().await;
    let client = HubClient::new(config(addr, 5));
    let mut events = client.subscribe();
    client.connect();

    let mut server = accept(&listener).await;
    assert!(matches!(*next_event(&mut events).await, HubEvent::Connected));
    let _config_request = next_text(&mut server).await;

    drop(server);

    wait_for(&mut events, |e| matches!(e, HubEvent::Disconnected)).await;
    assert!(!client.is_connected());

    // After the retry interval the client comes back on its own and
    // asks for the config again.
    let mut server = accept(&listener).await;
    wait_for(&mut events, |e| matches!(e, HubEvent::Connected)).await;
    let again = next_text(&mut server).await;
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&again).unwrap(),
        json!({"action": "request config"})
    );

    client.close().await;
}

#[tokio::test]
async fn close_suppresses_reconnect() {
    let (listener, addr) = bind().await;
    let client = HubClient::new(config(addr, 5));
    let mut events = client.subscribe();
    client.connect();

    let mut server = accept(&listener).await;
    assert!(matches!(*next_event(&mut events).await, HubEvent::Connected));
    let _config_request = next_text(&mut server).await;

    client.close().await;

    // The server sees a proper close frame...
    let mut saw_close = false;
    while let Ok(Some(Ok(frame))) = timeout(WAIT, server.next()).await {
        if let Message::Close(payload) = frame {
            let reason = payload.map(|cf| cf.reason.to_string()).unwrap_or_default();
            assert_eq!(reason, "manual shutdown");
            saw_close = true;
            break;
        }
    }
    assert!(saw_close, "expected a close frame");

    // ...and no reconnection attempt, even past the retry interval.
    let reconnect = timeout(Duration::from_millis(2500), listener.accept()).await;
    assert!(reconnect.is_err(), "client reconnected after close()");
}

#[tokio::test]
async fn queued_sends_are_abandoned_when_the_connection_drops() {
    // Long spacing keeps the later sends queued behind the first.
    let (listener, addr) = bind().await;
    let client = HubClient::new(config(addr, 500));
    let mut events = client.subscribe();
    client.connect();

    let mut server = accept(&listener).await;
    assert!(matches!(*next_event(&mut events).await, HubEvent::Connected));

    let queued_a = client.send(&Request::Control {
        code: ControlCode::power("12", PowerState::On),
    });
    let queued_b = client.send(&Request::Control {
        code: ControlCode::power("13", PowerState::On),
    });

    drop(server);
    wait_for(&mut events, |e| matches!(e, HubEvent::Disconnected)).await;

    // The queue was reset: neither queued command was delivered, and
    // both tickets read as a lost connection.
    assert!(matches!(queued_a.wait().await, Err(Error::ConnectionLost)));
    assert!(matches!(queued_b.wait().await, Err(Error::ConnectionLost)));

    client.close().await;
}
