//! `deckchat send` against a mocked analytics server.


use assert_cmd::cargo::cargo_bin_cmd;
use fixtures::{agent_error_sse, final_sse, sse_response, tool_then_final_sse};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a temp DECKCHAT_HOME directory for test isolation.
fn temp_home() -> TempDir {
    TempDir::new().expect("create temp deckchat home")
}

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn test_send_streams_tool_activity_and_reply() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .and(body_json(json!({"message": "What were total sales?"})))
        .respond_with(
            sse_response(&tool_then_final_sse(
                "execute_sql_query",
                "c1",
                "Total sales: $1000",
                "Show by region",
            ))
            .insert_header("X-Conversation-Id", "c1"),
        )
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("deckchat")
        .env("DECKCHAT_HOME", home.path())
        .env("DECKCHAT_SERVER_URL", server.uri())
        .args(["send", "What were total sales?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total sales: $1000"))
        .stdout(predicate::str::contains("1. Show by region"))
        .stderr(predicate::str::contains("... execute_sql_query"))
        .stderr(predicate::str::contains("conversation: c1"));

    assert!(home.path().join("logs").is_dir());
}

#[tokio::test]
async fn test_send_reports_agent_error() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(sse_response(&agent_error_sse("Query timed out")))
        .mount(&server)
        .await;

    cargo_bin_cmd!("deckchat")
        .env("DECKCHAT_HOME", home.path())
        .env("DECKCHAT_SERVER_URL", server.uri())
        .args(["send", "Show everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Query timed out"));
}

#[tokio::test]
async fn test_send_reports_http_detail() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"detail": "Agent unavailable"})),
        )
        .mount(&server)
        .await;

    cargo_bin_cmd!("deckchat")
        .env("DECKCHAT_HOME", home.path())
        .env("DECKCHAT_SERVER_URL", server.uri())
        .args(["send", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 500: Agent unavailable"));
}

#[tokio::test]
async fn test_send_without_stream_continues_conversation() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/"))
        .and(body_json(json!({"message": "And by region?", "conversation_id": "c1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "conversation_id": "c1",
            "response": "North leads with $600",
            "charts": [{
                "chartType": "bar",
                "title": "Sales by region",
                "data": [{"region": "North", "sales": 600}, {"region": "South", "sales": 400}],
                "xAxisKey": "region",
                "yAxisKeys": ["sales"]
            }],
            "suggestions": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("deckchat")
        .env("DECKCHAT_HOME", home.path())
        .env("DECKCHAT_SERVER_URL", server.uri())
        .args(["send", "And by region?", "--conversation", "c1", "--no-stream"])
        .assert()
        .success()
        .stdout(predicate::str::contains("North leads with $600"))
        .stdout(predicate::str::contains("1. Sales by region (bar, 2 points)"));
}

#[tokio::test]
async fn test_send_saves_streamed_deck() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;

    let deck_event = json!({"type": "presentation", "presentation": {
        "presentationId": "p1",
        "title": "Q3 Review",
        "slides": [{"id": "slide-1", "order": 1, "title": "Summary", "contentType": "text", "content": "Up 12%"}]
    }});
    let body = format!("data: {deck_event}\n\n{}", final_sse("c1", "Deck ready"));

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(sse_response(&body))
        .mount(&server)
        .await;

    let deck_path = home.path().join("deck.json");
    cargo_bin_cmd!("deckchat")
        .env("DECKCHAT_HOME", home.path())
        .env("DECKCHAT_SERVER_URL", server.uri())
        .args(["send", "Make a deck", "--save-deck"])
        .arg(&deck_path)
        .assert()
        .success()
        .stderr(predicate::str::contains("deck received: Q3 Review (1 slides)"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&deck_path).unwrap()).unwrap();
    assert_eq!(saved["presentationId"], "p1");
    assert_eq!(saved["slides"][0]["content"], "Up 12%");
}

#[tokio::test]
async fn test_server_flag_beats_env() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = temp_home();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat/stream"))
        .respond_with(sse_response(&final_sse("c1", "Reached the flag server")))
        .expect(1)
        .mount(&server)
        .await;

    cargo_bin_cmd!("deckchat")
        .env("DECKCHAT_HOME", home.path())
        .env("DECKCHAT_SERVER_URL", "http://127.0.0.1:9")
        .env("DECKCHAT_LOG", "info")
        .args(["--server", &server.uri(), "send", "hi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reached the flag server"));

    let logged: String = std::fs::read_dir(home.path().join("logs"))
        .unwrap()
        .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect();
    assert!(logged.contains("dispatching command"));
    assert!(logged.contains("command=\"send\"") || logged.contains("command=send"));
}
