use std::{collections::HashMap, io::Write, net::TcpStream, time::Duration};

use serde_json::json;

const BACKPRESSURE_QUEUE_FULL_MESSAGE: &str = "service unavailable: skill worker queue full";
const JSON_CONTENT_TYPE: &str = "application/json";
const PLAIN_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpRequest {
    pub(crate) method: String,
    pub(crate) target: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpResponse {
    pub(crate) status: u16,
    pub(crate) content_type: &'static str,
    pub(crate) body: String,
}

impl HttpResponse {
    pub(crate) fn health() -> Self {
        Self::ok_json(json!({ "status": "ok" }).to_string())
    }

    pub(crate) fn ok_json(body: String) -> Self {
        Self {
            status: 200,
            content_type: JSON_CONTENT_TYPE,
            body,
        }
    }

    pub(crate) fn ok_metrics(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; version=0.0.4; charset=utf-8",
            body,
        }
    }

    /// Plain-text 400, the shape the indexer expects for a rejected batch.
    pub(crate) fn bad_request_text(message: &str) -> Self {
        Self {
            status: 400,
            content_type: PLAIN_CONTENT_TYPE,
            body: message.to_string(),
        }
    }

    pub(crate) fn bad_request(message: &str) -> Self {
        Self::error_json(400, message)
    }

    pub(crate) fn unauthorized(message: &str) -> Self {
        Self::error_json(401, message)
    }

    pub(crate) fn not_found(message: &str) -> Self {
        Self::error_json(404, message)
    }

    pub(crate) fn payload_too_large(message: &str) -> Self {
        Self::error_json(413, message)
    }

    pub(crate) fn method_not_allowed(message: &str) -> Self {
        Self::error_json(405, message)
    }

    pub(crate) fn internal_server_error(message: &str) -> Self {
        Self::error_json(500, message)
    }

    pub(crate) fn service_unavailable(message: &str) -> Self {
        Self::error_json(503, message)
    }

    fn error_json(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: JSON_CONTENT_TYPE,
            body: json!({ "error": message }).to_string(),
        }
    }
}

pub(super) fn backpressure_rejection_response() -> HttpResponse {
    HttpResponse::service_unavailable(BACKPRESSURE_QUEUE_FULL_MESSAGE)
}

pub(super) fn write_backpressure_response(
    mut stream: TcpStream,
    socket_timeout_secs: u64,
) -> std::io::Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(socket_timeout_secs)))?;
    write_response(&mut stream, backpressure_rejection_response())
}

pub(super) fn write_response(
    stream: &mut TcpStream,
    response: HttpResponse,
) -> std::io::Result<()> {
    stream.write_all(render_response_text(&response).as_bytes())?;
    stream.flush()
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        400 => "400 Bad Request",
        401 => "401 Unauthorized",
        404 => "404 Not Found",
        405 => "405 Method Not Allowed",
        413 => "413 Payload Too Large",
        503 => "503 Service Unavailable",
        _ => "500 Internal Server Error",
    }
}

/// Every response closes the connection; there is no keep-alive.
pub(super) fn render_response_text(response: &HttpResponse) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line(response.status),
        response.content_type,
        response.body.len(),
        response.body
    )
}
