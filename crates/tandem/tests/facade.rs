#![allow(clippy::unwrap_used)]

use std::time::Duration;

use serde_json::{json, Value};
use tandem::peer::transport::memory;
use tandem::prelude::*;

async fn echo(call: Call) -> Result<Value> {
    Ok(call.into_args().into_iter().next().unwrap_or(Value::Null))
}

tandem::remote_namespace! {
    struct EchoApi = "echo" {
        fn say = "say"(text: String) -> String;
    }
}

#[tokio::test]
async fn prelude_is_enough_to_wire_a_pair() {
    let schema = ApiSchema::new().declare("echo", Side::Server, ["say"]);
    let server_peer = RoleComposer::new(Role::Server, schema.clone())
        .handlers(HandlerSet::new().method("echo:say", echo))
        .compose()
        .unwrap();
    let server = Server::new(server_peer, Duration::from_secs(2)).unwrap();

    let client_peer = RoleComposer::new(Role::Client, schema).compose().unwrap();
    let (server_end, client_end) = memory::pair();
    server.accept(server_end);
    let client = Client::over(client_peer, client_end, Duration::from_secs(2)).unwrap();

    let api = EchoApi::new(client.server());
    assert_eq!(api.say("hello".to_string()).await.unwrap(), "hello");
    assert_eq!(
        client.server().call("echo:say", vec![json!(1)]).await.unwrap(),
        json!(1)
    );
}
