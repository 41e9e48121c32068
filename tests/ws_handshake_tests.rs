// Note: This suite drives the /ws endpoint through a real WebSocket client
// against a server bound to an ephemeral port, covering the handshake paths
// the in-process suite cannot reach: the authentication deadline, the close
// codes on rejection, and session cleanup when the socket goes away.

use actix_web::{web, App, HttpServer};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tenant_notifier::{
    adapters::api::handlers::ws::connect_ws,
    adapters::api::server::WsState,
    adapters::auth::{jwt_verifier::JwtVerifierAdapter, memory_directory::MemoryUserDirectory},
    adapters::broker::memory_broker::MemoryBrokerAdapter,
    core::domain::auth::UserRecord,
    messaging::registry::ConnectionRegistry,
};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &[u8] = b"handshake-secret";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct Harness {
    registry: Arc<ConnectionRegistry>,
    port: u16,
}

/// Boots the upgrade endpoint on an ephemeral port with one active user
/// (`U1` in tenant `T1`) behind the verifier.
async fn start_server(handshake_timeout: Duration) -> Harness {
    let broker = Arc::new(MemoryBrokerAdapter::new());
    let registry = Arc::new(ConnectionRegistry::new(broker));

    let directory = Arc::new(MemoryUserDirectory::new());
    directory
        .upsert(UserRecord {
            user_id: "U1".into(),
            tenant_id: "T1".into(),
            is_active: true,
        })
        .await;

    let state = Arc::new(WsState {
        verifier: Arc::new(JwtVerifierAdapter::new(SECRET, directory)),
        registry: registry.clone(),
        cookie_name: "access_token".into(),
        handshake_timeout,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(connect_ws)
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();
    let port = server.addrs()[0].port();
    actix_web::rt::spawn(server.run());

    Harness { registry, port }
}

fn issue_token(sub: &str) -> String {
    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    let claims = TestClaims {
        sub: sub.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

async fn open_socket(port: u16) -> Socket {
    let (socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap();
    socket
}

async fn send_auth(socket: &mut Socket, token: &str) {
    let frame = json!({"type": "auth", "token": token}).to_string();
    socket.send(Message::Text(frame)).await.unwrap();
}

/// Reads frames until the server closes the socket, returning the parsed
/// text frames and the close frame.
async fn read_until_close(socket: &mut Socket) -> (Vec<Value>, Option<CloseFrame<'static>>) {
    let mut texts = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("server did not close the socket in time");
        match frame {
            Some(Ok(Message::Text(text))) => texts.push(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(reason))) => return (texts, reason),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return (texts, None),
        }
    }
}

async fn next_text(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("no frame within the read window")
            .expect("socket closed while waiting for a text frame")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[actix_web::test]
async fn test_silent_client_rejected_at_handshake_deadline() {
    let harness = start_server(Duration::from_millis(200)).await;

    let started = Instant::now();
    let mut socket = open_socket(harness.port).await;

    // Send nothing: the deadline must fire and close with the policy code.
    let (texts, close) = read_until_close(&mut socket).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(150), "closed too early");
    assert!(elapsed < Duration::from_secs(2), "deadline did not fire");
    assert_eq!(close.expect("missing close frame").code, CloseCode::Policy);
    assert!(texts.iter().any(|frame| frame["type"] == "error"));

    // The session was never registered.
    assert_eq!(harness.registry.connection_count("T1").await, 0);
    assert!(harness.registry.subscribed_tenants().await.is_empty());
}

#[actix_web::test]
async fn test_auth_message_opens_stream_and_close_cleans_up() {
    let harness = start_server(Duration::from_secs(5)).await;

    let mut socket = open_socket(harness.port).await;
    send_auth(&mut socket, &issue_token("U1")).await;

    let frame = next_text(&mut socket).await;
    assert_eq!(frame["type"], "connection.established");
    assert_eq!(frame["tenant_id"], "T1");
    assert_eq!(frame["user_id"], "U1");
    assert_eq!(harness.registry.connection_count("T1").await, 1);

    socket.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(harness.registry.connection_count("T1").await, 0);
    assert!(harness.registry.subscribed_tenants().await.is_empty());
}

#[actix_web::test]
async fn test_invalid_token_closed_with_policy_code() {
    let harness = start_server(Duration::from_secs(5)).await;

    let mut socket = open_socket(harness.port).await;
    send_auth(&mut socket, "not-a-jwt").await;

    let (texts, close) = read_until_close(&mut socket).await;
    assert_eq!(close.expect("missing close frame").code, CloseCode::Policy);
    assert!(texts.iter().any(|frame| frame["type"] == "error"));
    assert_eq!(harness.registry.connection_count("T1").await, 0);
}

#[actix_web::test]
async fn test_malformed_auth_frame_closed_with_unsupported_code() {
    let harness = start_server(Duration::from_secs(5)).await;

    let mut socket = open_socket(harness.port).await;
    socket
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();

    let (_, close) = read_until_close(&mut socket).await;
    assert_eq!(
        close.expect("missing close frame").code,
        CloseCode::Unsupported
    );
    assert_eq!(harness.registry.connection_count("T1").await, 0);
}

#[actix_web::test]
async fn test_duplicate_auth_frames_register_once() {
    let harness = start_server(Duration::from_secs(5)).await;

    let mut socket = open_socket(harness.port).await;
    let token = issue_token("U1");
    send_auth(&mut socket, &token).await;
    send_auth(&mut socket, &token).await;

    let frame = next_text(&mut socket).await;
    assert_eq!(frame["type"], "connection.established");

    // The second auth frame is ignored: no further confirmation arrives and
    // only one connection exists.
    let extra = tokio::time::timeout(Duration::from_millis(500), socket.next()).await;
    assert!(extra.is_err(), "unexpected frame after registration");
    assert_eq!(harness.registry.connection_count("T1").await, 1);
}
