//! HTTP/1.1 Upgrade handshake that hands the connection to a relay.
//!
//! Both sides read the peer's message head up to the blank line that ends it.
//! Whatever arrived in the same reads past that boundary already belongs to
//! the upgraded protocol; it is returned as head bytes so the relay session
//! can deliver it before anything read from the descriptor.
//!
//! ```text
//! GET / HTTP/1.1\r\n ... \r\n\r\n | early bytes...
//! ←──────── handshake ──────────→ ←── head ──→
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// ---

use zrelay_domain::{RelayError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Largest request or response head accepted before giving up.
pub const MAX_HEAD_LEN: usize = 16 * 1024;

const BOUNDARY: &[u8] = b"\r\n\r\n";

// ---------------------------------------------------------------------------
// Upgrade
// ---------------------------------------------------------------------------

/// A parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    // ---
    /// Value of the request's `Upgrade` header.
    pub protocol: String,

    /// Bytes the client sent past the end of its request.
    pub head: Option<Bytes>,
}

// ---------------------------------------------------------------------------
// Message builders
// ---------------------------------------------------------------------------

pub fn upgrade_request(host: &str, protocol: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: {host}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: {protocol}\r\n\
         \r\n"
    )
}

pub fn upgrade_response(protocol: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: {protocol}\r\n\
         Connection: Upgrade\r\n\
         \r\n"
    )
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Ask the peer to switch `stream` to `protocol`.
///
/// Returns the bytes the server sent after its `101` response, if any.
pub async fn request_upgrade<S>(stream: &mut S, host: &str, protocol: &str) -> Result<Option<Bytes>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ---
    stream
        .write_all(upgrade_request(host, protocol).as_bytes())
        .await
        .map_err(|e| RelayError::Handshake(format!("write upgrade request: {e}")))?;

    let (head, rest) = read_head(stream).await?;
    let mut lines = head.lines();

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default();

    if status != "101" {
        return Err(RelayError::Handshake(format!(
            "upgrade refused: expected status 101, got {status:?}"
        )));
    }

    match header(lines, "upgrade") {
        Some(accepted) if accepted.eq_ignore_ascii_case(protocol) => {}
        other => {
            return Err(RelayError::Handshake(format!(
                "upgrade response names {other:?}, requested {protocol:?}"
            )))
        }
    }

    tracing::debug!(
        protocol,
        head_len = rest.as_ref().map_or(0, Bytes::len),
        "upgrade accepted"
    );
    Ok(rest)
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Read and validate an upgrade request without answering it.
pub async fn read_upgrade_request<S>(stream: &mut S) -> Result<Upgrade>
where
    S: AsyncRead + Unpin,
{
    // ---
    let (head, rest) = read_head(stream).await?;
    let mut lines = head.lines();

    let request_line = lines.next().unwrap_or_default();
    if !request_line.ends_with("HTTP/1.1") {
        return Err(RelayError::Handshake(format!(
            "not an HTTP/1.1 request: {request_line:?}"
        )));
    }

    let headers: Vec<&str> = lines.collect();

    let connection = header(headers.iter().copied(), "connection").unwrap_or_default();
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(RelayError::Handshake(
            "request lacks `Connection: upgrade`".into(),
        ));
    }

    let protocol = header(headers.iter().copied(), "upgrade")
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RelayError::Handshake("request lacks an `Upgrade` header".into()))?;

    Ok(Upgrade {
        protocol: protocol.to_string(),
        head: rest,
    })
}

// ---

/// Read an upgrade request and answer `101 Switching Protocols`.
pub async fn accept_upgrade<S>(stream: &mut S) -> Result<Upgrade>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ---
    let upgrade = read_upgrade_request(stream).await?;

    stream
        .write_all(upgrade_response(&upgrade.protocol).as_bytes())
        .await
        .map_err(|e| RelayError::Handshake(format!("write upgrade response: {e}")))?;

    tracing::debug!(protocol = %upgrade.protocol, "upgrade granted");
    Ok(upgrade)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read up to and including the blank line; return the head as text and the
/// bytes read past it.
async fn read_head<S>(stream: &mut S) -> Result<(String, Option<Bytes>)>
where
    S: AsyncRead + Unpin,
{
    // ---
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if let Some(pos) = buf.windows(BOUNDARY.len()).position(|w| w == BOUNDARY) {
            let rest = buf.split_off(pos + BOUNDARY.len()).freeze();
            let head = String::from_utf8(buf.to_vec())
                .map_err(|_| RelayError::Handshake("message head is not UTF-8".into()))?;
            return Ok((head, Some(rest).filter(|b| !b.is_empty())));
        }

        if buf.len() > MAX_HEAD_LEN {
            return Err(RelayError::Handshake(format!(
                "message head exceeds {MAX_HEAD_LEN} bytes"
            )));
        }

        let n = stream
            .read_buf(&mut buf)
            .await
            .map_err(|e| RelayError::Handshake(format!("read message head: {e}")))?;

        if n == 0 {
            return Err(RelayError::Handshake(
                "connection closed during handshake".into(),
            ));
        }
    }
}

// ---

/// First value of header `name` (case-insensitive), trimmed.
fn header<'a>(mut lines: impl Iterator<Item = &'a str>, name: &str) -> Option<&'a str> {
    lines.find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    // ---
    use tokio::io::duplex;

    use super::*;

    // ---

    #[tokio::test]
    async fn client_captures_bytes_past_the_response() {
        // ---
        let (mut client, mut server) = duplex(4096);

        // Response and the first upgraded bytes land in one write.
        let mut reply = upgrade_response("test-zrelay").into_bytes();
        reply.extend_from_slice(b"yo");
        server.write_all(&reply).await.unwrap();

        let head = request_upgrade(&mut client, "localhost", "test-zrelay")
            .await
            .unwrap();
        assert_eq!(head.as_deref(), Some(&b"yo"[..]));

        let upgrade = read_upgrade_request(&mut server).await.unwrap();
        assert_eq!(upgrade.protocol, "test-zrelay");
        assert!(upgrade.head.is_none());
    }

    // ---

    #[tokio::test]
    async fn server_captures_early_client_bytes() {
        // ---
        let (mut client, mut server) = duplex(4096);

        let mut request = upgrade_request("localhost", "test-zrelay").into_bytes();
        request.extend_from_slice(b"early");
        client.write_all(&request).await.unwrap();

        let upgrade = accept_upgrade(&mut server).await.unwrap();
        assert_eq!(upgrade.protocol, "test-zrelay");
        assert_eq!(upgrade.head.as_deref(), Some(&b"early"[..]));

        let mut response = vec![0u8; upgrade_response("test-zrelay").len()];
        client.read_exact(&mut response).await.unwrap();
        assert!(response.starts_with(b"HTTP/1.1 101"));
    }

    // ---

    #[tokio::test]
    async fn refused_upgrade_is_a_handshake_error() {
        // ---
        let (mut client, mut server) = duplex(4096);
        server
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        let err = request_upgrade(&mut client, "localhost", "test-zrelay")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Handshake(_)));
        assert!(err.to_string().contains("404"), "got: {err}");
    }

    // ---

    #[tokio::test]
    async fn request_without_upgrade_header_rejected() {
        // ---
        let (mut client, mut server) = duplex(4096);
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let err = accept_upgrade(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("Connection: upgrade"), "got: {err}");
    }

    // ---

    #[tokio::test]
    async fn early_close_is_reported() {
        // ---
        let (mut client, server) = duplex(4096);
        drop(server);

        let err = request_upgrade(&mut client, "localhost", "test-zrelay")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Handshake(_)));
    }

    // ---

    #[tokio::test]
    async fn oversized_head_rejected() {
        // ---
        let (mut client, mut server) = duplex(64 * 1024);
        let junk = vec![b'x'; MAX_HEAD_LEN + 2];
        client.write_all(&junk).await.unwrap();

        let err = read_upgrade_request(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"), "got: {err}");
    }
}
