//! API surface derivation tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use tandem_core::api::{ApiSchema, Dispatch, PeerDescriptor, Side};

fn base_server() -> PeerDescriptor {
    PeerDescriptor::new("BaseServer")
        .async_method("user:setName")
        .async_method("user:legacy")
        .sync_method("helper")
}

fn server() -> PeerDescriptor {
    PeerDescriptor::new("GameServer")
        .extends(base_server())
        .async_method("game:move")
        // overrides the async parent definition with a sync one
        .sync_method("user:legacy")
        .async_method("notNamespaced")
}

fn client() -> PeerDescriptor {
    PeerDescriptor::new("GameClient")
        .async_method("game:update")
        .sync_method("game:render")
}

#[test]
fn derived_schema_keeps_namespaced_async_methods() {
    let api = ApiSchema::derive(&client(), &server());
    assert_eq!(api.paths(Side::Server), vec!["game:move", "user:setName"]);
    assert_eq!(api.paths(Side::Client), vec!["game:update"]);
}

#[test]
fn most_derived_definition_wins() {
    let resolved = server().resolved_methods();
    assert_eq!(resolved.get("user:legacy"), Some(&Dispatch::Sync));
    assert_eq!(resolved.get("user:setName"), Some(&Dispatch::Async));
    assert_eq!(resolved.get("helper"), Some(&Dispatch::Sync));
}

#[test]
fn derived_and_declared_schemas_are_identical() {
    let derived = ApiSchema::derive(&client(), &server());
    let declared = ApiSchema::new()
        .declare("game", Side::Server, ["move"])
        .declare("game", Side::Client, ["update"])
        .declare("user", Side::Server, ["setName"]);
    assert_eq!(derived, declared);
}

#[test]
fn derivation_is_deterministic() {
    let a = serde_json::to_string(&ApiSchema::derive(&client(), &server())).unwrap();
    let b = serde_json::to_string(&ApiSchema::derive(&client(), &server())).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        a,
        r#"{"game":{"client":["update"],"server":["move"]},"user":{"client":[],"server":["setName"]}}"#
    );
}

#[test]
fn schema_deserializes_from_declarative_map() {
    let api: ApiSchema = serde_json::from_str(
        r#"{"user":{"server":["setName"]},"chat":{"client":["receive"],"server":["send"]}}"#,
    )
    .unwrap();
    api.validate().unwrap();
    assert!(api.declares(Side::Server, "user:setName"));
    assert!(api.declares(Side::Client, "chat:receive"));
}
