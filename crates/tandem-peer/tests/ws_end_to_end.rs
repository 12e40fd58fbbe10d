#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::net::SocketAddr;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tandem_core::api::{ApiSchema, Side};
use tandem_core::role::Role;
use tandem_core::Result;
use tandem_peer::app_state::AppState;
use tandem_peer::config::{ClientSection, ServerSection};
use tandem_peer::{router, Call, Client, HandlerSet, RoleComposer, Server};

use support::eventually;

fn schema() -> ApiSchema {
    ApiSchema::new().declare("math", Side::Server, ["add"])
}

async fn add(call: Call) -> Result<Value> {
    let a: i64 = call.arg(0)?;
    let b: i64 = call.arg(1)?;
    Ok(json!(a + b))
}

async fn serve() -> (Server, SocketAddr) {
    let peer = RoleComposer::new(Role::Server, schema())
        .handlers(HandlerSet::new().method("math:add", add))
        .compose()
        .unwrap();
    let cfg = ServerSection {
        listen: "127.0.0.1:0".into(),
        ..ServerSection::default()
    };
    let server = Server::from_config(peer, &cfg).unwrap();
    let app = router::build_router(AppState::new(server.clone(), &cfg));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, addr)
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn client_calls_server_over_a_real_socket() {
    let (server, addr) = serve().await;

    let peer = RoleComposer::new(Role::Client, schema()).compose().unwrap();
    let client = Client::connect(
        peer,
        &ClientSection {
            url: format!("ws://{addr}/ws"),
            call_timeout_ms: 2000,
        },
    )
    .unwrap();

    let sum = client
        .server()
        .ns("math")
        .call("add", vec![json!(20), json!(22)])
        .await
        .unwrap();
    assert_eq!(sum, json!(42));
    assert_eq!(server.clients(), vec![0]);

    let peers = http_get(addr, "/peers").await;
    assert!(peers.starts_with("HTTP/1.1 200"), "{peers}");
    assert!(peers.ends_with("[0]"), "{peers}");

    client.disconnect();
    client.closed().await;
    let s = server.clone();
    eventually("socket close reaches the roster", || s.clients().is_empty()).await;
}

#[tokio::test]
async fn healthz_answers_ok() {
    let (_server, addr) = serve().await;
    let response = http_get(addr, "/healthz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("ok"), "{response}");
}

#[tokio::test]
async fn unreachable_server_closes_the_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let peer = RoleComposer::new(Role::Client, schema()).compose().unwrap();
    let client = Client::connect(
        peer,
        &ClientSection {
            url: format!("ws://{addr}/ws"),
            call_timeout_ms: 2000,
        },
    )
    .unwrap();
    client.closed().await;
    assert!(client.server().call("math:add", vec![]).await.is_err());
}
