//! HTTP CONNECT request head parsing and canned responses

use super::ProxyError;
use crate::protocol::MAX_REQUEST_HEAD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n";
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";
pub const NOT_IMPLEMENTED: &[u8] = b"HTTP/1.1 501 Not Implemented\r\nConnection: close\r\n\r\n";

/// Request line plus headers, up to the blank line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// First header named `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Read a request head from `reader`.
///
/// Stops at the blank line; anything the client sent after it stays in the
/// reader's buffer. The head is capped at [`MAX_REQUEST_HEAD`] bytes.
pub async fn read_request_head<R>(reader: &mut BufReader<R>) -> Result<RequestHead, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut consumed = 0usize;
    let mut line = Vec::new();

    let request_line = next_line(reader, &mut line, &mut consumed).await?;
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), version) => (
            method.to_string(),
            target.to_string(),
            version.unwrap_or("HTTP/1.0").to_string(),
        ),
        _ => {
            return Err(ProxyError::InvalidRequest(format!(
                "malformed request line: {:?}",
                request_line
            )))
        }
    };

    let mut headers = Vec::new();
    loop {
        let header_line = next_line(reader, &mut line, &mut consumed).await?;
        if header_line.is_empty() {
            break;
        }
        if let Some((key, value)) = header_line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(RequestHead {
        method,
        target,
        version,
        headers,
    })
}

async fn next_line<R>(
    reader: &mut BufReader<R>,
    line: &mut Vec<u8>,
    consumed: &mut usize,
) -> Result<String, ProxyError>
where
    R: AsyncRead + Unpin,
{
    line.clear();
    let remaining = MAX_REQUEST_HEAD.saturating_sub(*consumed) as u64;
    let n = (&mut *reader).take(remaining).read_until(b'\n', line).await?;
    *consumed += n;

    if !line.ends_with(b"\n") {
        return Err(if n == 0 || *consumed < MAX_REQUEST_HEAD {
            ProxyError::InvalidRequest("connection closed mid-request".to_string())
        } else {
            ProxyError::InvalidRequest("request head too large".to_string())
        });
    }

    let text = std::str::from_utf8(line)
        .map_err(|_| ProxyError::InvalidRequest("request head is not UTF-8".to_string()))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Split a CONNECT target `host:port` or `[v6]:port`
pub fn parse_connect_target(target: &str) -> Result<(String, u16), ProxyError> {
    let invalid = || ProxyError::InvalidAddress(target.to_string());

    let (host, port) = if let Some(rest) = target.strip_prefix('[') {
        let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
        (host, port)
    } else {
        target.rsplit_once(':').ok_or_else(invalid)?
    };

    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn head_of(raw: &[u8]) -> (Result<RequestHead, ProxyError>, Vec<u8>) {
        let mut reader = BufReader::new(raw);
        let head = read_request_head(&mut reader).await;
        let rest = reader.buffer().to_vec();
        (head, rest)
    }

    #[tokio::test]
    async fn test_connect_head() {
        let (head, rest) = head_of(
            b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\nProxy-Connection: keep-alive\r\n\r\n",
        )
        .await;
        let head = head.unwrap();
        assert!(head.is_connect());
        assert_eq!(head.target, "example.com:443");
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.header("host"), Some("example.com:443"));
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_early_bytes_stay_buffered() {
        let (head, rest) = head_of(b"CONNECT h:1 HTTP/1.1\r\n\r\n\x16\x03\x01hello").await;
        assert!(head.is_ok());
        assert_eq!(rest, b"\x16\x03\x01hello");
    }

    #[tokio::test]
    async fn test_bare_newlines_accepted() {
        let (head, _) = head_of(b"GET / HTTP/1.1\nHost: x\n\n").await;
        let head = head.unwrap();
        assert!(!head.is_connect());
        assert_eq!(head.method, "GET");
    }

    #[tokio::test]
    async fn test_truncated_and_oversized_heads() {
        let (head, _) = head_of(b"CONNECT h:1 HTTP/1.1\r\nHost: h").await;
        assert!(matches!(head, Err(ProxyError::InvalidRequest(_))));

        let mut huge = b"CONNECT h:1 HTTP/1.1\r\nX-Pad: ".to_vec();
        huge.extend(std::iter::repeat(b'a').take(MAX_REQUEST_HEAD));
        huge.extend_from_slice(b"\r\n\r\n");
        let (head, _) = head_of(&huge).await;
        assert!(matches!(head, Err(ProxyError::InvalidRequest(msg)) if msg.contains("too large")));

        let (head, _) = head_of(b"CONNECT\r\n\r\n").await;
        assert!(matches!(head, Err(ProxyError::InvalidRequest(_))));
    }

    #[test]
    fn test_parse_connect_target() {
        assert_eq!(
            parse_connect_target("example.com:443").unwrap(),
            ("example.com".to_string(), 443)
        );
        assert_eq!(
            parse_connect_target("[2001:db8::1]:8443").unwrap(),
            ("2001:db8::1".to_string(), 8443)
        );
        assert_eq!(
            parse_connect_target("10.0.0.1:80").unwrap(),
            ("10.0.0.1".to_string(), 80)
        );

        for bad in [":443", "example.com", "example.com:", "example.com:http", "h:70000", "h:0", "[::1]443"] {
            assert!(parse_connect_target(bad).is_err(), "{}", bad);
        }
    }
}
