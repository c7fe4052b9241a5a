//! `OllamaChatClient` against an in-process fake Ollama server.

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use invoice_analyst::{AppConfig, ChatClient, ChatError, Message, OllamaChatClient, OllamaConfig};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// ── Fake server ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Fake {
    /// Raw body chunks to send back, in order.
    chunks: Arc<Vec<Vec<u8>>>,
    /// Status for /api/chat; 200 when unset.
    status: Option<StatusCode>,
    /// Last request body received.
    received: Arc<Mutex<Option<Value>>>,
}

async fn chat(State(fake): State<Fake>, Json(body): Json<Value>) -> Response {
    *fake.received.lock().unwrap() = Some(body);
    if let Some(status) = fake.status {
        return (status, Json(json!({"error": "model 'llama9' not found, try pulling it first"})))
            .into_response();
    }
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        fake.chunks.iter().cloned().map(Ok).collect();
    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(stream::iter(chunks)))
        .unwrap()
}

async fn tags() -> Json<Value> {
    Json(json!({"models": [{"name": "llama3:latest"}, {"name": "llava:latest"}]}))
}

async fn spawn(fake: Fake) -> String {
    let router = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/tags", get(tags))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn ndjson(content: &str, done: bool) -> String {
    format!(
        "{}\n",
        json!({
            "model": "llama3",
            "created_at": "2024-05-01T10:00:00Z",
            "message": {"role": "assistant", "content": content},
            "done": done
        })
    )
}

fn config(host: &str) -> OllamaConfig {
    AppConfig::new(host, "llama3").ollama
}

async fn collect(client: &OllamaChatClient) -> Vec<Result<String, ChatError>> {
    client
        .stream_chat(vec![Message::user("Here is the JSON representation of an invoice")])
        .await
        .unwrap()
        .collect()
        .await
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fragments_arrive_in_order() {
    let body = [
        ndjson("| Invoice # ", false),
        ndjson("| Total |", false),
        ndjson("", true),
    ]
    .concat();
    let fake = Fake {
        chunks: Arc::new(vec![body.into_bytes()]),
        ..Default::default()
    };
    let received = fake.received.clone();
    let host = spawn(fake).await;

    let mut cfg = config(&host);
    cfg.temperature = Some(0.2);
    let client = OllamaChatClient::new(&cfg).unwrap();
    let out: Vec<String> = collect(&client).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(out, vec!["| Invoice # ", "| Total |"]);

    let req = received.lock().unwrap().clone().unwrap();
    assert_eq!(req["model"], "llama3");
    assert_eq!(req["stream"], true);
    assert_eq!(req["messages"][0]["role"], "user");
    assert!(req["messages"][0]["content"]
        .as_str()
        .unwrap()
        .starts_with("Here is the JSON"));
    assert!((req["options"]["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn temperature_omitted_when_unset() {
    let fake = Fake {
        chunks: Arc::new(vec![ndjson("", true).into_bytes()]),
        ..Default::default()
    };
    let received = fake.received.clone();
    let host = spawn(fake).await;

    let client = OllamaChatClient::new(&config(&host)).unwrap();
    assert!(collect(&client).await.is_empty());

    let req = received.lock().unwrap().clone().unwrap();
    assert!(req.get("options").is_none());
}

#[tokio::test]
async fn lines_split_across_chunks_are_reassembled() {
    let body = [
        ndjson("Total due: ", false),
        ndjson("€1.250,00", false),
        ndjson("", true),
    ]
    .concat()
    .into_bytes();
    // Three-byte chunks split JSON lines and the multi-byte euro sign.
    let chunks: Vec<Vec<u8>> = body.chunks(3).map(<[u8]>::to_vec).collect();
    let host = spawn(Fake {
        chunks: Arc::new(chunks),
        ..Default::default()
    })
    .await;

    let client = OllamaChatClient::new(&config(&host)).unwrap();
    let out: Vec<String> = collect(&client).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(out.concat(), "Total due: €1.250,00");
}

#[tokio::test]
async fn error_status_is_reported_before_streaming() {
    let host = spawn(Fake {
        status: Some(StatusCode::NOT_FOUND),
        ..Default::default()
    })
    .await;

    let client = OllamaChatClient::new(&config(&host)).unwrap();
    match client.stream_chat(vec![Message::user("hi")]).await {
        Err(ChatError::Status { status, body }) => {
            assert_eq!(status, 404);
            assert!(body.contains("llama9"), "got: {body}");
        }
        Err(other) => panic!("expected Status error, got {other:?}"),
        Ok(_) => panic!("expected Status error, got a stream"),
    }
}

#[tokio::test]
async fn error_line_ends_the_stream() {
    let body = [
        ndjson("| Invoice", false),
        "{\"error\":\"llama runner process has terminated\"}\n".to_string(),
        ndjson("never", false),
    ]
    .concat();
    let host = spawn(Fake {
        chunks: Arc::new(vec![body.into_bytes()]),
        ..Default::default()
    })
    .await;

    let client = OllamaChatClient::new(&config(&host)).unwrap();
    let out = collect(&client).await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].as_deref().unwrap(), "| Invoice");
    match &out[1] {
        Err(ChatError::Api(msg)) => assert!(msg.contains("terminated")),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_host_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OllamaChatClient::new(&config(&format!("http://{addr}"))).unwrap();
    match client.stream_chat(vec![Message::user("hi")]).await {
        Err(ChatError::Transport { url, .. }) => assert!(url.ends_with("/api/chat")),
        Err(other) => panic!("expected Transport error, got {other:?}"),
        Ok(_) => panic!("expected Transport error, got a stream"),
    }
}

#[tokio::test]
async fn health_lists_models() {
    let host = spawn(Fake::default()).await;
    let client = OllamaChatClient::new(&config(&host)).unwrap();
    let models = client.health().await.unwrap();
    assert_eq!(models, vec!["llama3:latest", "llava:latest"]);
}
