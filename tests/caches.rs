//! Statement caches seen from the wire
//!
//! Query cache counters, prepared statement reuse, eviction ordering and
//! deallocation on close.

mod common;

use common::{Event, FakeServer, Script};
use mysql_wire::codec::Value;
use mysql_wire::connection::Connection;

const USERS: &str = "SELECT id, name FROM users";
const ONE: &str = "SELECT 1";

async fn prepared_session(server: &FakeServer, prepare_cache_size: usize) -> Connection {
    let config = server
        .builder()
        .server_prepare(true)
        .prepare_cache_size(prepare_cache_size)
        .build()
        .unwrap();
    Connection::connect(&config).await.unwrap()
}

#[tokio::test]
async fn test_query_cache_counts_hits() {
    common::init_tracing();
    let server = FakeServer::start(Script::default()).await;
    let mut conn = server.connect().await;

    conn.query(ONE).await.unwrap();
    conn.query(ONE).await.unwrap();
    conn.query(USERS).await.unwrap();

    let stats = conn.cache_stats();
    assert_eq!(stats.query_hits, 1);
    assert_eq!(stats.query_misses, 2);
    assert_eq!(stats.query_resident, 2);
    assert_eq!(stats.prepare_misses, 0);
}

#[tokio::test]
async fn test_disabled_query_cache_still_executes() {
    let server = FakeServer::start(Script::default()).await;
    let config = server.builder().query_cache_size(0).build().unwrap();
    let mut conn = Connection::connect(&config).await.unwrap();

    for _ in 0..3 {
        assert_eq!(conn.query(ONE).await.unwrap().len(), 1);
    }
    let stats = conn.cache_stats();
    assert_eq!(stats.query_hits, 0);
    assert_eq!(stats.query_misses, 3);
    assert_eq!(stats.query_resident, 0);
}

#[tokio::test]
async fn test_prepared_handle_is_reused() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = prepared_session(&server, 16).await;

    let first = conn.query(USERS).await.unwrap();
    // same fingerprint, different layout
    let second = conn.query("SELECT   id,\n       name\n  FROM users;").await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first[0].get(0), Some(&Value::Int(1)));
    assert_eq!(first[0].get_by_name("name"), Some(&Value::Text("alice".into())));
    assert_eq!(first[2].get(1), Some(&Value::Null));
    assert_eq!(second, first);

    assert_eq!(
        server.commands(),
        vec![Event::Prepare(USERS.to_string()), Event::Execute(1), Event::Execute(1)]
    );
    let stats = conn.cache_stats();
    assert_eq!(stats.prepare_hits, 1);
    assert_eq!(stats.prepare_misses, 1);
    assert_eq!(stats.prepare_resident, 1);
}

#[tokio::test]
async fn test_disabled_prepare_cache_closes_after_each_execution() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = prepared_session(&server, 0).await;

    for _ in 0..3 {
        assert_eq!(conn.query(ONE).await.unwrap().len(), 1);
    }

    server
        .wait_for(|events| events.contains(&Event::CloseStatement(3)))
        .await;
    assert_eq!(
        server.commands(),
        vec![
            Event::Prepare(ONE.to_string()),
            Event::Execute(1),
            Event::CloseStatement(1),
            Event::Prepare(ONE.to_string()),
            Event::Execute(2),
            Event::CloseStatement(2),
            Event::Prepare(ONE.to_string()),
            Event::Execute(3),
            Event::CloseStatement(3),
        ]
    );
    let stats = conn.cache_stats();
    assert_eq!(stats.prepare_resident, 0);
    assert_eq!(stats.prepare_evictions, 0);
    assert_eq!(stats.deallocations, 3);
}

#[tokio::test]
async fn test_eviction_deallocates_before_next_execute() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = prepared_session(&server, 1).await;

    conn.query(USERS).await.unwrap();
    conn.query(ONE).await.unwrap();
    conn.query(USERS).await.unwrap();

    assert_eq!(
        server.commands(),
        vec![
            Event::Prepare(USERS.to_string()),
            Event::Execute(1),
            Event::Prepare(ONE.to_string()),
            Event::CloseStatement(1),
            Event::Execute(2),
            Event::Prepare(USERS.to_string()),
            Event::CloseStatement(2),
            Event::Execute(3),
        ]
    );
    let stats = conn.cache_stats();
    assert_eq!(stats.prepare_evictions, 2);
    assert_eq!(stats.prepare_resident, 1);
    assert_eq!(stats.deallocations, 2);
}

#[tokio::test]
async fn test_close_deallocates_resident_statements() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = prepared_session(&server, 16).await;

    conn.query(USERS).await.unwrap();
    conn.query(ONE).await.unwrap();
    conn.query(USERS).await.unwrap();
    conn.close().await.unwrap();

    server
        .wait_for(|events| events.last() == Some(&Event::Quit))
        .await;
    let commands = server.commands();
    assert_eq!(
        &commands[commands.len() - 3..],
        &[Event::CloseStatement(2), Event::CloseStatement(1), Event::Quit]
    );
}

#[tokio::test]
async fn test_non_preparable_statements_use_text_protocol() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = prepared_session(&server, 16).await;

    conn.query("SET autocommit = 1").await.unwrap();
    conn.query("START TRANSACTION").await.unwrap();

    assert_eq!(
        server.commands(),
        vec![
            Event::Query("SET autocommit = 1".to_string()),
            Event::Query("START TRANSACTION".to_string()),
        ]
    );
    assert_eq!(conn.cache_stats().prepare_misses, 0);
}

#[tokio::test]
async fn test_text_protocol_by_default() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = server.connect().await;

    conn.query(USERS).await.unwrap();
    conn.query("INSERT INTO users (name) VALUES ('carol')").await.unwrap();

    assert!(server
        .commands()
        .iter()
        .all(|e| matches!(e, Event::Query(_))));
    assert_eq!(conn.cache_stats().prepare_resident, 0);
}

#[tokio::test]
async fn test_prepare_error_keeps_statement_out_of_cache() {
    let server = FakeServer::start(Script::default()).await;
    let mut conn = prepared_session(&server, 16).await;

    let err = conn.query("SELECT * FROM missing").await.unwrap_err();
    assert_eq!(err.server_code(), Some(1146));
    assert_eq!(conn.cache_stats().prepare_resident, 0);
    assert_eq!(
        server.commands(),
        vec![Event::Prepare("SELECT * FROM missing".to_string())]
    );
}
