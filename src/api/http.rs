//! Minimal HTTP/1.1 framing over a tokio `TcpStream`

use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

const MAX_REQUEST_BYTES: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpRequest {
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, body) = match raw.find("\r\n\r\n") {
            Some(idx) => (&raw[..idx], &raw[idx + 4..]),
            None => (raw, ""),
        };

        let mut lines = head.lines();
        let request_line = lines.next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let full_path = parts.next()?;

        let (path, query) = match full_path.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (full_path, None),
        };

        // Normalize path (remove trailing slash except for root)
        let mut path = path.trim_end_matches('/').to_string();
        if path.is_empty() {
            path = "/".to_string();
        }

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        Some(Self {
            method,
            path,
            query,
            headers,
            body: body.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    pub fn to_wire(&self) -> String {
        create_response(self.status, status_text(self.status), &self.body)
    }
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Connection: close\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

pub fn extract_content_length(request: &str) -> Option<usize> {
    for line in request.lines() {
        if line.to_lowercase().starts_with("content-length:") {
            if let Some(value) = line.split(':').nth(1) {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// Read one request, giving up after `read_timeout`
pub async fn read_request(stream: &mut TcpStream, read_timeout: Duration) -> Option<String> {
    let mut buffer = Vec::new();
    let mut temp_buf = [0u8; 8192];

    let read_result = tokio::time::timeout(read_timeout, async {
        loop {
            let n = stream.read(&mut temp_buf).await?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&temp_buf[..n]);
            if let Some(headers_end) = find_headers_end(&buffer) {
                let head = String::from_utf8_lossy(&buffer[..headers_end]);
                let content_length = extract_content_length(&head).unwrap_or(0);
                if buffer.len() >= headers_end + content_length {
                    break;
                }
            }
            if buffer.len() > MAX_REQUEST_BYTES {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })
    .await;

    match read_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to read from stream");
            return None;
        }
        Err(_) => {
            warn!("Request read timeout");
            return None;
        }
    }

    if buffer.is_empty() {
        return None;
    }
    match String::from_utf8(buffer) {
        Ok(request) => Some(request),
        Err(e) => {
            warn!(error = %e, "Request is not valid UTF-8");
            None
        }
    }
}

fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|idx| idx + 4)
}

pub async fn write_response(stream: &mut TcpStream, response: &HttpResponse) {
    if let Err(e) = stream.write_all(response.to_wire().as_bytes()).await {
        warn!(error = %e, "Failed to write response");
    }
}
