//! Minimal SAMv3 client for an external I2P router.
//!
//! Every SAM exchange is one `VERB SUBVERB KEY=VALUE...` line each way over
//! its own TCP connection to the bridge, starting with a `HELLO` handshake.
//! After `STREAM CONNECT` or `STREAM ACCEPT` succeeds, the same TCP
//! connection carries the raw stream payload, so reads here never buffer
//! past the reply line.

use crate::address::Address;
use crate::error::TransportError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, trace};

/// Longest SAM reply line we accept.
const MAX_LINE_BYTES: usize = 8192;

/// Read one newline-terminated line without consuming bytes past it.
async fn read_line(stream: &mut TcpStream) -> Result<String, TransportError> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let read = stream.read(&mut byte).await?;
        if read == 0 {
            return Err(TransportError::Protocol("sam connection closed".into()));
        }
        if byte[0] == b'\n' {
            break;
        }
        bytes.push(byte[0]);
        if bytes.len() > MAX_LINE_BYTES {
            return Err(TransportError::Protocol("sam reply line too long".into()));
        }
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes)
        .map_err(|_| TransportError::Protocol("sam reply is not utf-8".into()))
}

/// Split a reply line on unquoted spaces, keeping quoted values whole.
fn tokens(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '"' => quoted = !quoted,
            ' ' if !quoted => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// One parsed SAM reply.
#[derive(Debug, Clone)]
pub(crate) struct SamReply {
    /// The two leading verb tokens, e.g. `SESSION STATUS`.
    pub verb: String,
    /// The `KEY=VALUE` pairs that follow.
    pub values: HashMap<String, String>,
}

impl SamReply {
    pub(crate) fn parse(line: &str) -> Result<Self, TransportError> {
        let parts = tokens(line);
        if parts.len() < 2 {
            return Err(TransportError::Protocol(format!("malformed sam reply: {line:?}")));
        }
        let verb = format!("{} {}", parts[0], parts[1]);
        let values = parts[2..]
            .iter()
            .filter_map(|part| {
                part.split_once('=')
                    .map(|(key, value)| (key.to_string(), value.to_string()))
            })
            .collect();
        Ok(Self { verb, values })
    }

    /// Whether the reply carries `RESULT=OK`.
    pub(crate) fn result_ok(&self) -> bool {
        self.values.get("RESULT").map(String::as_str) == Some("OK")
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Router-supplied failure detail, empty when absent.
    pub(crate) fn message(&self) -> &str {
        self.get("MESSAGE").unwrap_or("")
    }
}

/// One TCP connection to the SAM bridge, already past `HELLO`.
#[derive(Debug)]
pub(crate) struct SamConnection {
    stream: TcpStream,
}

impl SamConnection {
    /// Connect and handshake, retrying briefly while the router opens its
    /// bridge listener.
    pub(crate) async fn open(host: &str, port: u16) -> Result<Self, TransportError> {
        const ATTEMPTS: u32 = 10;
        let mut last_error = None;
        for _ in 0..ATTEMPTS {
            match TcpStream::connect((host, port)).await {
                Ok(stream) => {
                    let mut connection = Self { stream };
                    let reply = connection.exchange("HELLO VERSION MIN=3.1 MAX=3.1").await?;
                    if !reply.result_ok() {
                        return Err(TransportError::Protocol(format!(
                            "sam handshake rejected: {}",
                            reply.message()
                        )));
                    }
                    debug!(host, port, "sam connection open");
                    return Ok(connection);
                }
                Err(err) => {
                    last_error = Some(err);
                    time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
        Err(last_error.map(TransportError::Io).unwrap_or_else(|| {
            TransportError::Protocol("sam connection never attempted".into())
        }))
    }

    /// Send one command line and parse the single reply line.
    pub(crate) async fn exchange(&mut self, command: &str) -> Result<SamReply, TransportError> {
        trace!(command, "sam command");
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        let line = read_line(&mut self.stream).await?;
        trace!(line, "sam reply");
        SamReply::parse(&line)
    }

    /// Read one raw line past the reply, e.g. the destination preceding an
    /// accepted stream's payload.
    pub(crate) async fn read_raw_line(&mut self) -> Result<String, TransportError> {
        read_line(&mut self.stream).await
    }

    /// Hand the underlying socket over as a data stream.
    pub(crate) fn into_stream(self) -> TcpStream {
        self.stream
    }
}

/// Accepts inbound streams for one I2P session. Each accept opens a fresh
/// bridge connection that blocks until a peer connects.
#[derive(Debug)]
pub struct SamAcceptor {
    host: String,
    port: u16,
    session_id: String,
}

impl SamAcceptor {
    pub(crate) fn new(host: String, port: u16, session_id: String) -> Self {
        Self { host, port, session_id }
    }

    /// Session this acceptor serves.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) async fn accept(&mut self) -> Result<(TcpStream, Option<Address>), TransportError> {
        let mut connection = SamConnection::open(&self.host, self.port).await?;
        let reply = connection
            .exchange(&format!("STREAM ACCEPT ID={} SILENT=false", self.session_id))
            .await?;
        if !reply.result_ok() {
            return Err(TransportError::Protocol(format!(
                "sam stream accept rejected: {}",
                reply.message()
            )));
        }
        // With SILENT=false the bridge prefixes the stream with one line
        // naming the remote destination.
        let line = connection.read_raw_line().await?;
        let destination = line
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| TransportError::Protocol("sam accept yielded no destination".into()))?;
        // Inbound I2P peers are reachable by destination alone.
        Ok((connection.into_stream(), Some(Address::new(destination, 0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_keeps_quoted_values_whole() {
        let parts = tokens("SESSION STATUS RESULT=I2P_ERROR MESSAGE=\"Duplicated ID\"");
        assert_eq!(
            parts,
            vec!["SESSION", "STATUS", "RESULT=I2P_ERROR", "MESSAGE=Duplicated ID"]
        );
    }

    #[test]
    fn test_reply_parsing() {
        let reply = SamReply::parse("HELLO REPLY RESULT=OK VERSION=3.1").expect("parses");
        assert_eq!(reply.verb, "HELLO REPLY");
        assert!(reply.result_ok());
        assert_eq!(reply.get("VERSION"), Some("3.1"));
        assert_eq!(reply.message(), "");
    }

    #[test]
    fn test_failed_reply_carries_message() {
        let reply =
            SamReply::parse("STREAM STATUS RESULT=CANT_REACH_PEER MESSAGE=\"no tunnels\"")
                .expect("parses");
        assert!(!reply.result_ok());
        assert_eq!(reply.message(), "no tunnels");
    }

    #[test]
    fn test_short_lines_are_rejected() {
        assert!(SamReply::parse("PONG").is_err());
        assert!(SamReply::parse("").is_err());
    }
}
