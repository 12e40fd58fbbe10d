#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use tandem_core::api::{ApiSchema, Side};
use tandem_core::role::Role;
use tandem_core::RpcError;
use tandem_peer::transport::memory;
use tandem_peer::{
    Call, Client, ComposedPeer, ConnId, HandlerSet, Lifecycle, RemoteProxy, RoleComposer, Server,
};

use support::{eventually, CALL_TIMEOUT};

fn schema() -> ApiSchema {
    ApiSchema::new().declare("ui", Side::Client, ["notify"])
}

#[derive(Default)]
struct ServerLog {
    connected: Mutex<Vec<ConnId>>,
    disconnected: Mutex<Vec<ConnId>>,
}

struct RecordingHooks(Arc<ServerLog>);

#[async_trait]
impl Lifecycle for RecordingHooks {
    async fn on_connect(&self, id: ConnId, _remote: &RemoteProxy) {
        self.0.connected.lock().unwrap().push(id);
    }

    async fn on_disconnect(&self, id: ConnId) {
        self.0.disconnected.lock().unwrap().push(id);
    }
}

fn server(log: &Arc<ServerLog>) -> Server {
    let peer = RoleComposer::new(Role::Server, schema())
        .hooks(RecordingHooks(Arc::clone(log)))
        .compose()
        .unwrap();
    Server::new(peer, CALL_TIMEOUT).unwrap()
}

fn client_peer(hits: &Arc<AtomicUsize>) -> ComposedPeer {
    let hits = Arc::clone(hits);
    RoleComposer::new(Role::Client, schema())
        .handlers(HandlerSet::new().method("ui:notify", move |_call: Call| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RpcError>(Value::Null)
            }
        }))
        .compose()
        .unwrap()
}

fn connect(server: &Server, hits: &Arc<AtomicUsize>) -> (ConnId, Client) {
    let (server_end, client_end) = memory::pair();
    let id = server.accept(server_end);
    let client = Client::over(client_peer(hits), client_end, CALL_TIMEOUT).unwrap();
    (id, client)
}

#[tokio::test]
async fn ids_follow_connection_order_and_broadcast_skips_the_departed() {
    let log = Arc::new(ServerLog::default());
    let server = server(&log);
    assert!(server.clients().is_empty());

    let first_hits = Arc::new(AtomicUsize::new(0));
    let second_hits = Arc::new(AtomicUsize::new(0));

    let (first, _first_client) = connect(&server, &first_hits);
    assert_eq!(first, 0);
    assert_eq!(server.clients(), vec![0]);

    let (second, _second_client) = connect(&server, &second_hits);
    assert_eq!(second, 1);
    assert_eq!(server.clients(), vec![0, 1]);

    assert!(server.disconnect(first));
    assert_eq!(server.roster().len(), 1);

    let results = server.broadcast("ui:notify", vec![json!("hi")]).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 1);
    assert_eq!(results[0].1, Ok(json!(true)));

    assert_eq!(first_hits.load(Ordering::SeqCst), 0);
    assert_eq!(second_hits.load(Ordering::SeqCst), 1);

    let log2 = Arc::clone(&log);
    eventually("on_disconnect for id 0", || {
        log2.disconnected.lock().unwrap().as_slice() == [0]
    })
    .await;
    let log3 = Arc::clone(&log);
    eventually("on_connect for both", || log3.connected.lock().unwrap().len() == 2).await;
}

#[tokio::test]
async fn ids_are_not_reused() {
    let log = Arc::new(ServerLog::default());
    let server = server(&log);
    let hits = Arc::new(AtomicUsize::new(0));

    let (a, _ca) = connect(&server, &hits);
    assert!(server.disconnect(a));
    assert!(!server.disconnect(a));

    let (b, _cb) = connect(&server, &hits);
    assert_eq!(b, 1);
    assert_eq!(server.clients(), vec![1]);
}

#[tokio::test]
async fn client_side_disconnect_removes_the_roster_entry() {
    let log = Arc::new(ServerLog::default());
    let server = server(&log);
    let hits = Arc::new(AtomicUsize::new(0));

    let (_id, client) = connect(&server, &hits);
    // make sure the link is up before closing it
    let remote = server.client(0).unwrap();
    remote.call("ui:notify", vec![]).await.unwrap();

    client.disconnect();
    client.closed().await;

    let s = server.clone();
    eventually("roster cleanup", || s.clients().is_empty()).await;
}

#[tokio::test]
async fn shutdown_closes_everyone_and_runs_teardown() {
    let log = Arc::new(ServerLog::default());
    let server = server(&log);
    let hits = Arc::new(AtomicUsize::new(0));

    let (_a, ca) = connect(&server, &hits);
    let (_b, cb) = connect(&server, &hits);

    server.shutdown().await;
    assert!(server.clients().is_empty());
    ca.closed().await;
    cb.closed().await;
}
