use ai_backend::{AiError, ModelClient, OllamaClient};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One-shot fake runtime: answers a single request with `status` and `body`
/// and hands back the JSON payload it received.
async fn fake_runtime(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let payload = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buffer.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length = ai_backend::server::extract_content_length(head).unwrap_or(0);
                if body.len() >= length || n == 0 {
                    break body.to_string();
                }
            }
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = tx.send(serde_json::from_str(&payload).unwrap_or(Value::Null));
    });

    (base_url, rx)
}

#[tokio::test]
async fn test_generate_reads_response_field() {
    let (base_url, payload) =
        fake_runtime("200 OK", r#"{"model":"sqlcoder:7b","response":" DeviceName FROM t","done":true}"#).await;
    let client = OllamaClient::new(&base_url, Duration::from_secs(5)).unwrap();

    let text = client.generate("sqlcoder:7b", "### Query\nSELECT").await.unwrap();
    assert_eq!(text, " DeviceName FROM t");

    let payload = payload.await.unwrap();
    assert_eq!(payload["model"], "sqlcoder:7b");
    assert_eq!(payload["prompt"], "### Query\nSELECT");
    assert_eq!(payload["stream"], false);
    assert_eq!(payload["options"]["temperature"], 0.0);
    assert_eq!(payload["options"]["seed"], 42);
}

#[tokio::test]
async fn test_error_status_is_not_transient() {
    let (base_url, _) = fake_runtime("500 Internal Server Error", r#"{"error":"model not found"}"#).await;
    let client = OllamaClient::new(&base_url, Duration::from_secs(5)).unwrap();

    let err = client.generate("missing", "prompt").await.unwrap_err();
    assert!(matches!(err, AiError::Model(_)));
    assert!(!err.is_transient());
    assert!(err.to_string().contains("model not found"));
}

#[tokio::test]
async fn test_unreachable_runtime() {
    // Bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = OllamaClient::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(5)).unwrap();

    let err = client.generate("sqlcoder:7b", "prompt").await.unwrap_err();
    assert!(matches!(err, AiError::ModelUnavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_runtime_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = OllamaClient::new(&base_url, Duration::from_millis(200)).unwrap();
    let err = client.generate("sqlcoder:7b", "prompt").await.unwrap_err();
    assert!(matches!(err, AiError::ModelTimeout(_)));
}
