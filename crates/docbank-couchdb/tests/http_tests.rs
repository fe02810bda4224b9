//! HTTP client integration tests.
//!
//! A wiremock server stands in for CouchDB and checks the requests the
//! adapter sends.

use docbank_couchdb::{
    CouchConfig, CouchDatabase, CouchDbDatabank, Document, HttpCouchDatabase, ViewQuery,
};
use docbank_storage::{ConnectParams, Criteria, Databank, DatabankError};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> CouchConfig {
    CouchConfig::new("app").with_location(server.uri())
}

async fn mount_info(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"db_name": "app", "doc_count": 0})),
        )
        .mount(server)
        .await;
}

async fn connected(server: &MockServer) -> CouchDbDatabank {
    mount_info(server).await;
    let bank = CouchDbDatabank::new(config(server));
    bank.connect(&ConnectParams::new())
        .await
        .expect("Failed to connect");
    bank
}

fn stored(id: &str, rev: &str, data: Value) -> Value {
    json!({"_id": id, "_rev": rev, "data": data})
}

#[tokio::test]
async fn test_connect_sends_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"db_name": "app", "doc_count": 3})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bank = CouchDbDatabank::new(config(&server).with_credentials("user", "pass"));
    bank.connect(&ConnectParams::new()).await.unwrap();
    assert!(bank.is_connected().await);
}

#[tokio::test]
async fn test_connect_to_missing_database() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": "not_found", "reason": "Database does not exist."})),
        )
        .mount(&server)
        .await;

    let bank = CouchDbDatabank::new(config(&server));
    let err = bank.connect(&ConnectParams::new()).await.unwrap_err();

    match err {
        DatabankError::ConnectionFailed { message } => assert_eq!(
            message,
            format!(
                r#"CouchDB cannot connect to database app at {}: {{"status":404,"error":"not_found","reason":"Database does not exist."}}"#,
                server.uri()
            )
        ),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_to_unreachable_server() {
    let bank = CouchDbDatabank::new(CouchConfig::new("app").with_location("http://127.0.0.1:1"));
    let err = bank.connect(&ConnectParams::new()).await.unwrap_err();

    assert!(matches!(err, DatabankError::ConnectionFailed { .. }));
    assert!(err.to_string().contains(r#""error":"transport""#));
}

#[tokio::test]
async fn test_create_puts_wrapped_document() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("PUT"))
        .and(path("/app/user:1"))
        .and(body_json(json!({"_id": "user:1", "data": {"name": "ada"}})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "user:1", "rev": "1-a"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = bank.create("user", "1", json!({"name": "ada"})).await.unwrap();
    assert_eq!(created, json!({"name": "ada"}));
}

#[tokio::test]
async fn test_create_conflict_is_already_exists() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("PUT"))
        .and(path("/app/user:1"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"error": "conflict", "reason": "Document update conflict."})),
        )
        .mount(&server)
        .await;

    let err = bank.create("user", "1", json!(1)).await.unwrap_err();
    assert_eq!(err.to_string(), "Already exists: user 1");
}

#[tokio::test]
async fn test_read_missing_document() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("GET"))
        .and(path("/app/user:404"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": "not_found", "reason": "missing"})),
        )
        .mount(&server)
        .await;

    let err = bank.read("user", "404").await.unwrap_err();
    assert!(err.is_no_such_thing());
}

#[tokio::test]
async fn test_read_server_error_is_wrapped_once() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("GET"))
        .and(path("/app/user:1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let err = bank.read("user", "1").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"CouchDB error while reading document user:1: {"status":502,"error":"http_error","reason":"<html>Bad Gateway</html>"}"#
    );
}

#[tokio::test]
async fn test_update_saves_with_fetched_revision() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("GET"))
        .and(path("/app/user:1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("user:1", "1-a", json!(1))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/app/user:1"))
        .and(body_json(stored("user:1", "1-a", json!(2))))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "user:1", "rev": "2-b"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(bank.update("user", "1", json!(2)).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_delete_sends_revision() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("GET"))
        .and(path("/app/user:1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("user:1", "3-c", json!(1))))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/app/user:1"))
        .and(query_param("rev", "3-c"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": true, "id": "user:1", "rev": "4-d"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    bank.del("user", "1").await.unwrap();
}

#[tokio::test]
async fn test_search_posts_temporary_view() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;

    let criteria: Criteria = [("a.b".to_string(), json!(5))].into_iter().collect();
    let query = ViewQuery::new("user", &criteria);
    Mock::given(method("POST"))
        .and(path("/app/_temp_view"))
        .and(query_param("key", "[5]"))
        .and(body_json(json!({"language": "javascript", "map": query.map_source()})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                {"id": "user:1", "key": [5], "value": stored("user:1", "1-a", json!({"a": {"b": 5}, "n": 1}))},
                {"id": "user:7", "key": [5], "value": stored("user:7", "1-b", json!({"a": {"b": 5}, "n": 7}))}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut hits = Vec::new();
    bank.search("user", &criteria, &mut |value: Value| hits.push(value))
        .await
        .unwrap();
    assert_eq!(
        hits,
        vec![json!({"a": {"b": 5}, "n": 1}), json!({"a": {"b": 5}, "n": 7})]
    );
}

#[tokio::test]
async fn test_read_all_posts_keys() {
    let server = MockServer::start().await;
    let bank = connected(&server).await;
    Mock::given(method("POST"))
        .and(path("/app/_all_docs"))
        .and(query_param("include_docs", "true"))
        .and(body_json(json!({"keys": ["user:1", "user:2", "user:3"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 5,
            "rows": [
                {"id": "user:1", "key": "user:1", "value": {"rev": "1-a"}, "doc": stored("user:1", "1-a", json!("one"))},
                {"key": "user:2", "error": "not_found"},
                {"id": "user:3", "key": "user:3", "value": {"rev": "2-c", "deleted": true}, "doc": null}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = bank.read_all("user", &["1", "2", "3"]).await.unwrap();
    assert_eq!(result["1"], Some(json!("one")));
    assert_eq!(result["2"], None);
    assert_eq!(result["3"], None);
}

#[tokio::test]
async fn test_document_ids_are_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/user:a%2Fb%20c"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stored("user:a/b c", "1-a", json!(true))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let db = HttpCouchDatabase::new(&config(&server)).unwrap();
    let doc: Document = db.get("user:a/b c").await.unwrap();
    assert_eq!(doc.data, json!(true));
}

#[tokio::test]
async fn test_database_lifecycle_requests() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/app"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/app"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": "not_found", "reason": "Database does not exist."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let db = HttpCouchDatabase::new(&config(&server)).unwrap();
    assert!(db.drop_database().await.unwrap_err().is_not_found());
    db.create_database().await.unwrap();
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/user:1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let db = HttpCouchDatabase::new(&config(&server)).unwrap();
    let err = db.get("user:1").await.unwrap_err();
    assert_eq!(err.error, "invalid_response");
    assert_eq!(err.status, None);
}
