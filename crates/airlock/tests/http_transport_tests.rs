//! End-to-end tests of the HTTP transport against a local axum server.

use airlock::{Cage, Channel, ChannelError, ClientConfig, Connection, SubscriptionEvent};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::sse::{Event, Sse},
    routing::put,
};
use futures::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

const COOKIE: &str = "urbauth-~zod=0v3.test";

/// Minimal channel endpoint: records PUT bodies and serves pushed events.
struct TestServer {
    puts: Mutex<Vec<(String, Value)>>,
    stream_cookies: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

fn cookie_of(headers: &HeaderMap) -> String {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn put_channel(
    State(server): State<Arc<TestServer>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if cookie_of(&headers) != COOKIE {
        return StatusCode::FORBIDDEN;
    }
    server.puts.lock().await.push((uid, body));
    StatusCode::NO_CONTENT
}

async fn get_channel(
    State(server): State<Arc<TestServer>>,
    headers: HeaderMap,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    server.stream_cookies.lock().await.push(cookie_of(&headers));
    let rx = server
        .events
        .lock()
        .await
        .take()
        .ok_or(StatusCode::CONFLICT)?;
    Ok(Sse::new(UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>)))
}

async fn start_server() -> (Arc<TestServer>, mpsc::UnboundedSender<Event>, u16) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = Arc::new(TestServer {
        puts: Mutex::new(Vec::new()),
        stream_cookies: Mutex::new(Vec::new()),
        events: Mutex::new(Some(rx)),
    });

    let app = Router::new()
        .route("/~/channel/{uid}", put(put_channel).get(get_channel))
        .with_state(Arc::clone(&server));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (server, tx, port)
}

fn push(tx: &mpsc::UnboundedSender<Event>, seq: u64, body: Value) {
    tx.send(Event::default().id(seq.to_string()).data(body.to_string()))
        .unwrap();
}

async fn wait_for_puts(server: &TestServer, count: usize) -> Vec<(String, Value)> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let puts = server.puts.lock().await.clone();
            if puts.len() >= count {
                return puts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server never saw the request")
}

#[tokio::test]
async fn test_subscribe_diff_and_ack_over_http() {
    let (server, events, port) = start_server().await;
    let connection = Connection::new("zod", "http://127.0.0.1", port, COOKIE);
    let channel = Channel::over_http(connection, &ClientConfig::default()).unwrap();

    let (id, mut rx) = channel.subscribe_events("chat", "/p", "json").await.unwrap();
    assert_eq!(id, 1);

    let puts = wait_for_puts(&server, 1).await;
    assert_eq!(puts[0].0, channel.uid());
    assert_eq!(
        puts[0].1,
        json!([{"id": 1, "action": "subscribe", "ship": "zod", "app": "chat", "path": "/p"}])
    );

    push(&events, 1, json!({"id": 1, "response": "subscribe", "ok": "ok"}));
    push(&events, 2, json!({"id": 1, "response": "diff", "json": {"update": 2}}));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, SubscriptionEvent::Event(Cage::json(json!({"update": 2}))));
    assert_eq!(channel.last_event_id().await, 2);
    assert_eq!(server.stream_cookies.lock().await.clone(), vec![COOKIE.to_string()]);

    let poke = channel
        .start_poke("chat", Cage::new("chat-action", json!({"say": "hi"})))
        .await
        .unwrap();
    let puts = wait_for_puts(&server, 2).await;
    assert_eq!(
        puts[1].1,
        json!([
            {"action": "ack", "event-id": 2},
            {
                "id": 2,
                "action": "poke",
                "ship": "zod",
                "app": "chat",
                "mark": "chat-action",
                "json": {"say": "hi"}
            }
        ])
    );

    push(&events, 3, json!({"id": 2, "response": "poke", "ok": "ok"}));
    tokio::time::timeout(Duration::from_secs(5), poke.outcome())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_rejected_batch_surfaces_status() {
    let (server, _events, port) = start_server().await;
    let connection = Connection::new("zod", "http://127.0.0.1", port, "wrong");
    let channel = Channel::over_http(connection, &ClientConfig::default()).unwrap();

    let err = channel
        .start_poke("chat", Cage::json(json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Status { status: 403, .. }));
    assert_eq!(channel.pending_pokes().await, 0);
    assert!(!channel.is_connected().await);
    assert!(server.puts.lock().await.is_empty());
}
