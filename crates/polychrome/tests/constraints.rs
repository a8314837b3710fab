use polychrome::{Blueprint, Config, Error, Handlers, Ontology, Request};
use polychrome_store_memory::Memory;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn handlers(blueprint: Blueprint) -> Handlers {
    let ontology: Ontology = [blueprint].into_iter().collect();
    Handlers::new(Arc::new(ontology), Arc::new(Memory::new()), Config::default()).unwrap()
}

fn message_blueprint() -> Blueprint {
    Blueprint::from_def(
        "message",
        &json!({
            "attributes": {
                "text": {"type": "string", "required": true},
                "owner": "string"
            },
            "constraints": {
                "get": {"owner": "auth.session.id"},
                "delete": {"owner": "auth.session.id"}
            }
        }),
    )
    .unwrap()
}

#[tokio::test]
async fn get_constraints_scope_reads_to_the_caller() {
    let handlers = handlers(message_blueprint());

    for (text, owner) in [("hi", "dave"), ("yo", "jane")] {
        let mut request = Request::new().with_payload(json!({"text": text, "owner": owner}));
        handlers.post("message", &mut request).await.unwrap();
    }

    let dave = Request::new().with_auth(json!({"session": {"id": "dave"}}));
    let found = handlers.get("message", &dave).await.unwrap();
    assert_eq!(found.records.len(), 1);
    assert_eq!(found.records[0]["text"], json!("hi"));

    // No auth resolves the path to null, which matches nothing owned.
    let anonymous = handlers.get("message", &Request::new()).await.unwrap();
    assert!(anonymous.records.is_empty());
}

#[tokio::test]
async fn delete_constraints_hide_other_callers_records() {
    let handlers = handlers(message_blueprint());

    let mut request = Request::new().with_payload(json!({"text": "hi", "owner": "dave"}));
    handlers.post("message", &mut request).await.unwrap();

    // Jane cannot destroy dave's record; the scoped filter matches
    // nothing, so the handler reports 404.
    let jane = Request::new()
        .with_id(1)
        .with_auth(json!({"session": {"id": "jane"}}));
    let err = handlers.delete("message", &jane).await.unwrap_err();
    assert_eq!(err.http_code(), Some(404));

    let dave = Request::new()
        .with_id(1)
        .with_auth(json!({"session": {"id": "dave"}}));
    let destroyed = handlers.delete("message", &dave).await.unwrap();
    assert_eq!(destroyed.records.len(), 1);
}

#[tokio::test]
async fn post_precondition_rejects_with_412() {
    // A "must be authenticated" gate: auth must not be null.
    let blueprint = Blueprint::from_def(
        "secret",
        &json!({
            "attributes": {"name": "string"},
            "constraints": {
                "post": {"auth": {"compile": false, "value": "! null"}}
            }
        }),
    )
    .unwrap();
    let handlers = handlers(blueprint);

    let mut anonymous = Request::new().with_payload(json!({"name": "x"}));
    let err = handlers.post("secret", &mut anonymous).await.unwrap_err();
    assert_eq!(err.http_code(), Some(412));

    let mut authed = Request::new()
        .with_payload(json!({"name": "x"}))
        .with_auth(json!({"session": {"id": "dave"}}));
    let response = handlers.post("secret", &mut authed).await.unwrap();
    assert_eq!(response.records.len(), 1);
}

#[tokio::test]
async fn post_equality_constraints_fold_into_the_payload() {
    // Ownership stamped from the session, not trusted from the client.
    let blueprint = Blueprint::from_def(
        "note",
        &json!({
            "attributes": {
                "text": "string",
                "owner": "string"
            },
            "constraints": {
                "post": {"owner": "auth.session.id"}
            }
        }),
    )
    .unwrap();
    let handlers = handlers(blueprint);

    let mut request = Request::new()
        .with_payload(json!({"text": "mine"}))
        .with_auth(json!({"session": {"id": "dave"}}));
    let response = handlers.post("note", &mut request).await.unwrap();

    assert_eq!(response.records[0]["owner"], json!("dave"));
}

#[tokio::test]
async fn malformed_constraints_fail_at_load_time() {
    let err = Blueprint::from_def(
        "bad",
        &json!({
            "attributes": {"name": "string"},
            "constraints": {"get": {"owner": "> a.b c.d"}}
        }),
    )
    .unwrap_err();
    assert!(matches!(err, Error::MalformedConstraint(_)));

    let err = Blueprint::from_def(
        "bad",
        &json!({
            "attributes": {"name": "string"},
            "constraints": {"get": {"owner": "~ a.b"}}
        }),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownComparative(op) if op == "~"));
}

#[tokio::test]
async fn comparative_constraints_filter_reads() {
    let blueprint = Blueprint::from_def(
        "account",
        &json!({
            "attributes": {
                "name": "string",
                "balance": "integer"
            },
            "constraints": {
                "get": {"balance": {"compile": false, "value": ">= 0"}}
            }
        }),
    )
    .unwrap();
    let handlers = handlers(blueprint);

    for (name, balance) in [("solvent", 10), ("overdrawn", -5)] {
        let mut request =
            Request::new().with_payload(json!({"name": name, "balance": balance}));
        handlers.post("account", &mut request).await.unwrap();
    }

    let found = handlers.get("account", &Request::new()).await.unwrap();
    assert_eq!(found.records.len(), 1);
    assert_eq!(found.records[0]["name"], json!("solvent"));
}
