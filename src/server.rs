//! HTTP front end
//!
//! Plain HTTP/1.1 over tokio TCP: one request per connection, bodies framed
//! by Content-Length, JSON in and out.

use crate::error::AiError;
use crate::models::{AnalyzeRequest, ExplainSqlRequest, SqlGenRequest};
use crate::service::AiService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 1_000_000;

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, service: Arc<AiService>) -> std::io::Result<()> {
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("connection from {}", addr);
        let service = Arc::clone(&service);
        tokio::spawn(async move { handle_connection(stream, &service).await });
    }
}

enum ReadOutcome {
    Complete,
    TooLarge,
}

async fn read_request(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> std::io::Result<ReadOutcome> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(ReadOutcome::Complete);
        }
        buffer.extend_from_slice(&chunk[..n]);

        if buffer.len() > MAX_REQUEST_BYTES {
            return Ok(ReadOutcome::TooLarge);
        }

        if let Some(headers_end) = find_headers_end(buffer) {
            let head = String::from_utf8_lossy(&buffer[..headers_end]);
            let body_len = extract_content_length(&head).unwrap_or(0);
            if buffer.len() >= headers_end + body_len {
                return Ok(ReadOutcome::Complete);
            }
        }
    }
}

fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

async fn handle_connection(mut stream: TcpStream, service: &AiService) {
    let mut buffer = Vec::new();

    let response = match timeout(READ_TIMEOUT, read_request(&mut stream, &mut buffer)).await {
        Err(_) => {
            warn!("request read timed out");
            return;
        }
        Ok(Err(e)) => {
            warn!("failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(ReadOutcome::TooLarge)) => error_response(413, "Payload Too Large", "Request body too large"),
        Ok(Ok(ReadOutcome::Complete)) => {
            if buffer.is_empty() {
                return;
            }
            match String::from_utf8(buffer) {
                Ok(request) => handle_request(&request, service).await,
                Err(_) => error_response(400, "Bad Request", "Request is not valid UTF-8"),
            }
        }
    };

    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("failed to write response: {}", e);
    }
}

pub fn extract_content_length(request: &str) -> Option<usize> {
    request
        .lines()
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Route one raw HTTP request and build the full response text.
pub async fn handle_request(request: &str, service: &AiService) -> String {
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(m), Some(t)) => (m, t),
        _ => return error_response(400, "Bad Request", "Malformed request line"),
    };

    let path = target.split('?').next().unwrap_or("/");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    let body = request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("");

    let request_id = Uuid::new_v4();
    let span = info_span!("request", id = %request_id, method, path);

    async move {
        debug!("handling request");
        match (method, path) {
            ("OPTIONS", _) => create_response(204, "No Content", ""),
            ("GET", "/") => create_response(200, "OK", r#"{"status":"AIBackend running"}"#),
            ("POST", "/v1/generate_sql") => {
                let request: SqlGenRequest = match parse_body(body) {
                    Ok(r) => r,
                    Err(e) => return respond::<()>(Err(e)),
                };
                info!(
                    user_id = ?request.user_id,
                    job_id = request.job_id.as_deref().unwrap_or(""),
                    "generate_sql"
                );
                respond(service.generate_sql(&request).await)
            }
            ("POST", "/v1/explain_sql") => match parse_body::<ExplainSqlRequest>(body) {
                Ok(request) => respond(service.explain_sql(&request).await),
                Err(e) => respond::<()>(Err(e)),
            },
            ("POST", "/v1/analyze_results") => match parse_body::<AnalyzeRequest>(body) {
                Ok(request) => respond(service.analyze_results(&request).await),
                Err(e) => respond::<()>(Err(e)),
            },
            _ => error_response(404, "Not Found", "Not Found"),
        }
    }
    .instrument(span)
    .await
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, AiError> {
    serde_json::from_str(body).map_err(|e| AiError::InvalidRequest(e.to_string()))
}

fn respond<T: Serialize>(result: Result<T, AiError>) -> String {
    let json = result.and_then(|value| serde_json::to_string(&value).map_err(AiError::from));
    match json {
        Ok(json) => create_response(200, "OK", &json),
        Err(AiError::InvalidRequest(detail)) => {
            debug!("rejected request body: {}", detail);
            error_response(422, "Unprocessable Entity", &detail)
        }
        Err(e) => {
            error!("request failed: {}", e);
            error_response(500, "Internal Server Error", &e.to_string())
        }
    }
}

fn error_response(status: u16, status_text: &str, detail: &str) -> String {
    create_response(status, status_text, &json!({ "detail": detail }).to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
