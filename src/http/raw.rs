//! Minimal HTTP/1.1 client for probes that must leave the wire untouched: header names are
//! written verbatim, duplicates and names no compliant client would send are allowed, and
//! `Host`/`User-Agent` are only added when the probe asks for it.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;
use url::Url;

use super::probe::{Probe, ProbeResponse};
use crate::errors::CachesnakeError;

/// Upper bound on bytes read for one response.
pub const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Where a probe URL points.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    /// `Host` header value: hostname plus the port when it is not the scheme default.
    pub authority: String,
    /// Path and query, exactly as written in the URL.
    pub request_target: String,
}

impl Endpoint {
    /// Scheme, host and port come from the parsed URL; the request target is kept byte for byte.
    pub fn parse(url: &str) -> Result<Self, CachesnakeError> {
        let parsed = Url::parse(url).map_err(|e| CachesnakeError::InvalidTarget(format!("{e}: {url}")))?;
        let tls = match parsed.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(CachesnakeError::InvalidTarget(format!(
                    "unsupported scheme {other}: {url}"
                )))
            }
        };
        let host = parsed
            .host_str()
            .ok_or_else(|| CachesnakeError::InvalidTarget(format!("missing host: {url}")))?;
        let port = parsed.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let rest = rest.split('#').next().unwrap_or(rest);
        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let request_target = match &rest[split..] {
            "" => "/".to_string(),
            t if t.starts_with('?') => format!("/{t}"),
            t => t.to_string(),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Self {
            tls,
            host: host.to_string(),
            port,
            authority,
            request_target,
        })
    }
}

/// Render the request bytes for `probe`.
pub fn serialize_request(
    probe: &Probe,
    endpoint: &Endpoint,
    user_agent: &str,
) -> Result<Vec<u8>, CachesnakeError> {
    let mut out = format!("{} {} HTTP/1.1\r\n", probe.method, endpoint.request_target);

    if probe.special_headers {
        if !probe.has_header("host") {
            out.push_str(&format!("Host: {}\r\n", endpoint.authority));
        }
        if !probe.has_header("user-agent") {
            out.push_str(&format!("User-Agent: {user_agent}\r\n"));
        }
    }

    for (name, value) in &probe.headers {
        if contains_line_break(name) || contains_line_break(value) || name.contains(':') {
            return Err(CachesnakeError::Protocol(format!(
                "header {name:?} cannot be written on one line"
            )));
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }

    if let Some(cookie) = probe.cookie_header() {
        out.push_str(&format!("Cookie: {cookie}\r\n"));
    }
    out.push_str("Connection: close\r\n\r\n");
    Ok(out.into_bytes())
}

fn contains_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

/// Send `probe` over a fresh connection and parse the reply.
pub async fn send(
    connector: &TlsConnector,
    probe: &Probe,
    user_agent: &str,
    timeout: Duration,
) -> Result<ProbeResponse, CachesnakeError> {
    let endpoint = Endpoint::parse(&probe.url)?;
    let request = serialize_request(probe, &endpoint, user_agent)?;
    let is_head = probe.method.eq_ignore_ascii_case("HEAD");

    let raw = tokio::time::timeout(timeout, round_trip(connector, &endpoint, &request, is_head))
        .await
        .map_err(|_| CachesnakeError::Timeout(format!("{} after {timeout:?}", probe.url)))??;
    parse_response(&raw, is_head)
}

async fn round_trip(
    connector: &TlsConnector,
    endpoint: &Endpoint,
    request: &[u8],
    is_head: bool,
) -> Result<Vec<u8>, CachesnakeError> {
    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| CachesnakeError::Network(format!("connect {}: {e}", endpoint.authority)))?;
    if !endpoint.tls {
        return exchange(tcp, request, is_head).await;
    }
    let stream = connector
        .connect(&endpoint.host, tcp)
        .await
        .map_err(|e| CachesnakeError::Network(format!("TLS handshake with {}: {e}", endpoint.host)))?;
    exchange(stream, request, is_head).await
}

async fn exchange<S>(mut stream: S, request: &[u8], is_head: bool) -> Result<Vec<u8>, CachesnakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(request)
        .await
        .map_err(|e| CachesnakeError::Network(format!("write: {e}")))?;

    let mut buf = Vec::with_capacity(16 * 1024);
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            // Peers that close without a TLS close_notify surface as an error after the payload.
            Err(_) if !buf.is_empty() => break,
            Err(e) => return Err(CachesnakeError::Network(format!("read: {e}"))),
        };
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_RESPONSE_BYTES || is_complete(&buf, is_head) {
            break;
        }
    }
    Ok(buf)
}

#[derive(Debug, PartialEq)]
enum Framing {
    Length(usize),
    Chunked,
    UntilClose,
}

fn header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn framing(status: u16, headers: &[(String, String)], is_head: bool) -> Framing {
    if is_head || status == 204 || status == 304 || (100..200).contains(&status) {
        return Framing::Length(0);
    }
    if find_header(headers, "transfer-encoding").is_some_and(|v| v.to_ascii_lowercase().contains("chunked")) {
        return Framing::Chunked;
    }
    match find_header(headers, "content-length").and_then(|v| v.parse::<usize>().ok()) {
        Some(len) => Framing::Length(len),
        None => Framing::UntilClose,
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
}

fn is_complete(raw: &[u8], is_head: bool) -> bool {
    let Some(end) = header_end(raw) else {
        return false;
    };
    let Ok((status, headers)) = parse_head(&raw[..end]) else {
        return false;
    };
    let body = &raw[end..];
    match framing(status, &headers, is_head) {
        Framing::Length(len) => body.len() >= len,
        Framing::Chunked => body.ends_with(b"0\r\n\r\n"),
        Framing::UntilClose => false,
    }
}

fn parse_head(head: &[u8]) -> Result<(u16, Vec<(String, String)>), CachesnakeError> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(CachesnakeError::Protocol(format!("bad status line: {status_line:?}")));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| CachesnakeError::Protocol(format!("bad status code: {status_line:?}")))?;

    let headers = lines
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    Ok((status, headers))
}

/// Parse a complete HTTP/1.x response.
pub fn parse_response(raw: &[u8], is_head: bool) -> Result<ProbeResponse, CachesnakeError> {
    let end = header_end(raw)
        .ok_or_else(|| CachesnakeError::Protocol("response ended inside the header block".into()))?;
    let (status, headers) = parse_head(&raw[..end])?;
    let rest = &raw[end..];

    let body = match framing(status, &headers, is_head) {
        Framing::Length(len) => rest[..len.min(rest.len())].to_vec(),
        Framing::Chunked => decode_chunked(rest)?,
        Framing::UntilClose => rest.to_vec(),
    };

    Ok(ProbeResponse { status, headers, body })
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, CachesnakeError> {
    let mut body = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| CachesnakeError::Protocol("truncated chunk size".into()))?;
        let size_field = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_field.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| CachesnakeError::Protocol(format!("bad chunk size {size_hex:?}")))?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        if data.len() < size {
            // Connection closed mid-chunk; keep what arrived.
            body.extend_from_slice(data);
            return Ok(body);
        }
        body.extend_from_slice(&data[..size]);
        data = data.get(size + 2..).unwrap_or_default();
    }
}
