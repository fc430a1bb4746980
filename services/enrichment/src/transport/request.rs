use std::{
    collections::HashMap,
    io::{BufRead, BufReader, Read},
    net::TcpStream,
};

use thiserror::Error;

use super::{HttpRequest, HttpResponse, MAX_HTTP_BODY_BYTES};

/// Indexer batches carry a handful of headers; anything past this is not a
/// skill call.
const MAX_HEADER_COUNT: usize = 64;
const MAX_HEAD_LINE_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub(super) enum HeadError {
    #[error("content-length exceeds max body size ({} bytes)", MAX_HTTP_BODY_BYTES)]
    BodyTooLarge,
    #[error("request head line exceeds {} bytes", MAX_HEAD_LINE_BYTES)]
    LineTooLong,
    #[error("request carries more than {} headers", MAX_HEADER_COUNT)]
    TooManyHeaders,
    #[error("transfer-encoding is not supported; send content-length")]
    UnsupportedTransferEncoding,
    #[error("{0}")]
    Malformed(&'static str),
    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
}

impl HeadError {
    pub(super) fn response(&self) -> HttpResponse {
        match self {
            Self::BodyTooLarge => HttpResponse::payload_too_large(&self.to_string()),
            _ => HttpResponse::bad_request(&self.to_string()),
        }
    }
}

/// Request line and headers, validated before any body byte is read.
#[derive(Debug)]
pub(super) struct RequestHead {
    method: String,
    target: String,
    headers: HashMap<String, String>,
    pub(super) content_length: usize,
}

impl RequestHead {
    pub(super) fn parse<'a>(
        request_line: &str,
        header_lines: impl Iterator<Item = &'a str>,
    ) -> Result<Self, HeadError> {
        let (method, target) = parse_request_line(request_line)?;
        let headers = parse_headers(header_lines)?;
        if headers.contains_key("transfer-encoding") {
            return Err(HeadError::UnsupportedTransferEncoding);
        }
        let content_length = match headers.get("content-length") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| HeadError::Malformed("invalid content-length header"))?,
            None => 0,
        };
        if content_length > MAX_HTTP_BODY_BYTES {
            return Err(HeadError::BodyTooLarge);
        }
        Ok(Self {
            method,
            target,
            headers,
            content_length,
        })
    }

    pub(super) fn with_body(self, body: Vec<u8>) -> HttpRequest {
        HttpRequest {
            method: self.method,
            target: self.target,
            headers: self.headers,
            body,
        }
    }
}

/// `Ok(None)` when the peer closed the connection before sending anything.
pub(super) fn read_http_request(stream: &mut TcpStream) -> Result<Option<HttpRequest>, HeadError> {
    let mut reader = BufReader::new(stream);
    let Some(request_line) = read_head_line(&mut reader)? else {
        return Ok(None);
    };

    let mut header_lines = Vec::new();
    while let Some(line) = read_head_line(&mut reader)? {
        if line.is_empty() {
            break;
        }
        if header_lines.len() == MAX_HEADER_COUNT {
            return Err(HeadError::TooManyHeaders);
        }
        header_lines.push(line);
    }

    let head = RequestHead::parse(&request_line, header_lines.iter().map(String::as_str))?;
    let mut body = vec![0u8; head.content_length];
    reader.read_exact(&mut body)?;
    Ok(Some(head.with_body(body)))
}

/// One head line without its terminator, read through a bounded window so an
/// unterminated line cannot grow without limit.
fn read_head_line(reader: &mut impl BufRead) -> Result<Option<String>, HeadError> {
    let mut line = String::new();
    let read = reader
        .by_ref()
        .take(MAX_HEAD_LINE_BYTES as u64 + 1)
        .read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if read > MAX_HEAD_LINE_BYTES && !line.ends_with('\n') {
        return Err(HeadError::LineTooLong);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Header names are lowercased; blank lines are skipped. A repeated header
/// keeps its last value.
pub(super) fn parse_headers<'a>(
    lines: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, String>, HeadError> {
    let mut headers = HashMap::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        if line.len() > MAX_HEAD_LINE_BYTES {
            return Err(HeadError::LineTooLong);
        }
        if headers.len() == MAX_HEADER_COUNT {
            return Err(HeadError::TooManyHeaders);
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(HeadError::Malformed("invalid HTTP header"))?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(HeadError::Malformed("invalid HTTP header name"));
        }
        headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(headers)
}

/// Splits a request target into its path and percent-decoded query pairs.
pub(super) fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (
            path.to_string(),
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        ),
        None => (target.to_string(), HashMap::new()),
    }
}

/// Only origin-form HTTP/1.x request lines are served.
pub(super) fn parse_request_line(line: &str) -> Result<(String, String), HeadError> {
    if line.len() > MAX_HEAD_LINE_BYTES {
        return Err(HeadError::LineTooLong);
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [method, target, version] = parts[..] else {
        return Err(HeadError::Malformed("request line must be METHOD TARGET VERSION"));
    };
    if !matches!(version, "HTTP/1.0" | "HTTP/1.1") {
        return Err(HeadError::Malformed("unsupported HTTP version"));
    }
    if !target.starts_with('/') {
        return Err(HeadError::Malformed("request target must be an absolute path"));
    }
    Ok((method.to_string(), target.to_string()))
}
