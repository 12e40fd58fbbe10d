#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use tandem_core::api::{ApiSchema, Side};
use tandem_core::role::Role;
use tandem_core::{ErrorKind, Result, RpcError};
use tandem_peer::transport::memory;
use tandem_peer::{Call, Client, HandlerSet, RoleComposer, Server};

use support::CALL_TIMEOUT;

fn setup(runs: &Arc<AtomicUsize>) -> (Server, Client) {
    let schema = ApiSchema::new().declare("slow", Side::Server, ["work"]);
    let runs = Arc::clone(runs);
    let server_peer = RoleComposer::new(Role::Server, schema.clone())
        .handlers(HandlerSet::new().method("slow:work", move |_call: Call| {
            let runs = Arc::clone(&runs);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, RpcError>(json!(n))
            }
        }))
        .compose()
        .unwrap();
    let server = Server::new(server_peer, CALL_TIMEOUT).unwrap();

    let client_peer = RoleComposer::new(Role::Client, schema).compose().unwrap();
    let (server_end, client_end) = memory::pair();
    server.accept(server_end);
    let client = Client::over(client_peer, client_end, CALL_TIMEOUT).unwrap();
    (server, client)
}

#[tokio::test]
async fn slow_handler_times_out_and_its_late_response_is_discarded() {
    let runs = Arc::new(AtomicUsize::new(0));
    let (_server, client) = setup(&runs);
    let fast = client.server().with_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = fast.ns("slow").call("work", vec![]).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(190), "{elapsed:?}");
    assert_eq!(client.server().adapter().pending(), 0);

    // let the handler finish; its response finds no waiter
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(client.server().adapter().pending(), 0);

    // a fresh call gets its own response, not the stale one
    let second: Value = client.server().call("slow:work", vec![]).await.unwrap();
    assert_eq!(second, json!(2));
}

#[tokio::test]
async fn dropped_call_future_releases_its_waiter() {
    let runs = Arc::new(AtomicUsize::new(0));
    let (_server, client) = setup(&runs);

    let call = client.server().call("slow:work", vec![]);
    let raced = tokio::time::timeout(Duration::from_millis(20), call).await;
    assert!(raced.is_err());
    assert_eq!(client.server().adapter().pending(), 0);
}

#[tokio::test]
async fn inbound_calls_are_not_serialized() {
    let runs = Arc::new(AtomicUsize::new(0));
    let (_server, client) = setup(&runs);
    let server = client.server().clone();

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        server.call("slow:work", vec![]),
        server.call("slow:work", vec![]),
        server.call("slow:work", vec![]),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    // three 200ms handlers ran concurrently
    assert!(started.elapsed() < Duration::from_millis(550));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

async fn lookup(call: Call) -> Result<Value> {
    let id: u64 = call.arg(0)?;
    let delay = if id == 1 { 200 } else { 10 };
    tokio::time::sleep(Duration::from_millis(delay)).await;
    Ok(json!(format!("user{id}")))
}

#[tokio::test]
async fn same_name_calls_finishing_out_of_order_reach_their_own_callers() {
    let schema = ApiSchema::new().declare("user", Side::Server, ["get"]);
    let server_peer = RoleComposer::new(Role::Server, schema.clone())
        .handlers(HandlerSet::new().method("user:get", lookup))
        .compose()
        .unwrap();
    let server = Server::new(server_peer, CALL_TIMEOUT).unwrap();
    let client_peer = RoleComposer::new(Role::Client, schema).compose().unwrap();
    let (server_end, client_end) = memory::pair();
    server.accept(server_end);
    let client = Client::over(client_peer, client_end, CALL_TIMEOUT).unwrap();

    let users = client.server().ns("user");
    let (slow, fast) = tokio::join!(
        users.call("get", vec![json!(1)]),
        users.call("get", vec![json!(2)]),
    );
    assert_eq!(slow.unwrap(), json!("user1"));
    assert_eq!(fast.unwrap(), json!("user2"));
}
