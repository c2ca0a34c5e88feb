//! End-to-end tests: bind the full router on an ephemeral port and drive it
//! with real HTTP, WebSocket, and raw-upgrade clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use switchboard::config::Config;
use switchboard::http::{self, AppState};
use switchboard::ping::PingRegistry;
use switchboard::registry::Registry;

/// Spins up the whole app on an ephemeral loopback port and returns its
/// address. The server task is abandoned on test completion since the
/// process exits anyway.
async fn spawn_app() -> SocketAddr {
    let config = Arc::new(Config {
        session_idle_seconds: 60,
        ..Config::default()
    });
    let state = AppState {
        registry: Registry::new(config.session_idle()),
        config,
        ping_registry: PingRegistry::new(),
    };
    let app = http::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
    });
    addr
}

fn registration_body() -> serde_json::Value {
    json!({
        "name": "A",
        "game_name": "g",
        "game_version": 1,
        "secret_hash": "x",
        "public": true,
        "address": ["10.0.0.1"],
        "port": 7777,
    })
}

fn ws_request(addr: SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> ::http::Request<()> {
    let mut builder = ::http::Request::builder().uri(format!("ws://{addr}{path}"));
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).unwrap()
}

async fn register(client: &reqwest::Client, addr: SocketAddr) -> (String, String) {
    let response = client
        .post(format!("http://{addr}/game/register"))
        .json(&registration_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    (body["key"].as_str().unwrap().to_string(), body["secret"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn register_and_splice_over_websocket() {
    let addr = spawn_app().await;
    let client = reqwest::Client::new();
    let (key, secret) = register(&client, addr).await;

    let master_request = ws_request(addr, "/game/master", &[("Game-Key", &key), ("Game-Secret", &secret)]);
    let (mut master_ws, _) = tokio_tungstenite::connect_async(master_request).await.unwrap();

    let client_request = ws_request(addr, &format!("/game/connect/{key}"), &[]);
    let (mut client_ws, _) = tokio_tungstenite::connect_async(client_request).await.unwrap();

    let attach = master_ws.next().await.unwrap().unwrap();
    assert_eq!(attach, Message::Text("CLIENT_CONNECTED".to_string()));

    client_ws.send(Message::Text("hi".to_string())).await.unwrap();
    let from_client = master_ws.next().await.unwrap().unwrap();
    assert_eq!(from_client, Message::Text("hi".to_string()));

    master_ws.send(Message::Text("yo".to_string())).await.unwrap();
    let from_master = client_ws.next().await.unwrap().unwrap();
    assert_eq!(from_master, Message::Text("yo".to_string()));
}

#[tokio::test]
async fn register_and_splice_over_raw() {
    let addr = spawn_app().await;
    let client = reqwest::Client::new();
    let (key, secret) = register(&client, addr).await;

    let mut master = TcpStream::connect(addr).await.unwrap();
    raw_upgrade_request(&mut master, "/game/master", &[("Game-Key", &key), ("Game-Secret", &secret)]).await;

    let mut client_conn = TcpStream::connect(addr).await.unwrap();
    raw_upgrade_request(&mut client_conn, &format!("/game/connect/{key}"), &[]).await;

    let mut attach = [0u8; 4];
    master.read_exact(&mut attach).await.unwrap();
    assert_eq!(attach, [0, 0, 0, 0]);

    client_conn.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();
    let mut from_client = [0u8; 4];
    master.read_exact(&mut from_client).await.unwrap();
    assert_eq!(from_client, [0xDE, 0xAD, 0xBE, 0xEF]);
}

/// Performs the HTTP/1.1 request line and headers for a raw upgrade by hand
/// and consumes the 101 response, leaving the stream positioned right after
/// the header block.
async fn raw_upgrade_request(stream: &mut TcpStream, path: &str, extra_headers: &[(&str, &str)]) {
    let mut request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: raw\r\n");
    for (name, value) in extra_headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = [0u8; 1024];
    let mut total = 0;
    loop {
        let n = stream.read(&mut buf[total..]).await.unwrap();
        total += n;
        if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let status_line = std::str::from_utf8(&buf[..total]).unwrap().lines().next().unwrap();
    assert!(status_line.contains("101"), "unexpected status line: {status_line}");
}

#[tokio::test]
async fn listing_filters_by_game_name_and_visibility() {
    let addr = spawn_app().await;
    let client = reqwest::Client::new();

    let (public_g1_key, _) = register(&client, addr).await;
    let mut other = registration_body();
    other["game_name"] = json!("g2");
    client.post(format!("http://{addr}/game/register")).json(&other).send().await.unwrap();
    let mut private_g1 = registration_body();
    private_g1["public"] = json!(false);
    client.post(format!("http://{addr}/game/register")).json(&private_g1).send().await.unwrap();

    let listed: Vec<serde_json::Value> = client.get(format!("http://{addr}/game/list/g")).send().await.unwrap().json().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["key"], public_g1_key);
}

#[tokio::test]
async fn unknown_key_is_404_and_unclaimed_session_is_503() {
    let addr = spawn_app().await;
    let client = reqwest::Client::new();

    let unknown = client.get(format!("http://{addr}/game/connect/ZZZZZ")).send().await.unwrap();
    assert_eq!(unknown.status(), 404);

    let (key, _secret) = register(&client, addr).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET /game/connect/{key} HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: raw\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).await.unwrap();
    let status_line = std::str::from_utf8(&buf[..n]).unwrap().lines().next().unwrap();
    assert!(status_line.contains("503"), "unexpected status line: {status_line}");
}

#[tokio::test]
async fn idle_session_with_no_parked_transport_expires() {
    let config = Arc::new(Config {
        session_idle_seconds: 0,
        ..Config::default()
    });
    let registry = Registry::new(Duration::from_millis(1));
    let state = AppState {
        registry: registry.clone(),
        config,
        ping_registry: PingRegistry::new(),
    };
    let app = http::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
    });

    let client = reqwest::Client::new();
    let (key, _) = register(&client, addr).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = client.get(format!("http://{addr}/game/connect/{key}")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}
