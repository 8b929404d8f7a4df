//! Minimal Tor control-port client.
//!
//! Commands are CRLF-terminated ASCII lines. Replies are one or more lines
//! of `status` followed by `-` (continuation), `+` (data block) or a space
//! (final line). Asynchronous `650` event lines can interleave with replies
//! and are parked separately.

use crate::error::TransportError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, trace};

/// One parsed control reply: the final status code plus every payload line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ControlReply {
    /// Status of the final reply line.
    pub status: u16,
    /// Payload lines, dropping the status/separator prefixes.
    pub lines: Vec<String>,
}

impl ControlReply {
    /// Whether the command succeeded.
    pub(crate) fn is_ok(&self) -> bool {
        self.status == 250
    }

    /// Value of the first `key=value` payload line matching `key`.
    pub(crate) fn value(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            line.strip_prefix(key).and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// Split one reply line into `(status, separator, text)`.
fn split_reply_line(line: &str) -> Result<(u16, char, &str), TransportError> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(TransportError::Protocol(format!("malformed control line: {line:?}")));
    }
    let status = line[..3]
        .parse()
        .map_err(|_| TransportError::Protocol(format!("bad status in control line: {line:?}")))?;
    let separator = bytes[3] as char;
    if !matches!(separator, ' ' | '-' | '+') {
        return Err(TransportError::Protocol(format!("bad separator in control line: {line:?}")));
    }
    Ok((status, separator, &line[4..]))
}

/// Extract `(percent, summary)` from a `status/bootstrap-phase` value such
/// as `NOTICE BOOTSTRAP PROGRESS=85 TAG=ap_conn SUMMARY="Connecting"`.
pub(crate) fn parse_bootstrap_phase(value: &str) -> Option<(u8, String)> {
    let percent = value
        .split_whitespace()
        .find_map(|token| token.strip_prefix("PROGRESS="))?
        .parse()
        .ok()?;
    let summary = value
        .split_once("SUMMARY=")
        .map(|(_, rest)| rest.trim().trim_matches('"').to_string())
        .unwrap_or_default();
    Some((percent, summary))
}

/// Whether an event line reports a finished descriptor upload for
/// `service_id`.
pub(crate) fn is_upload_event(event: &str, service_id: &str) -> bool {
    let mut parts = event.split_whitespace();
    parts.next() == Some("HS_DESC")
        && parts.next() == Some("UPLOADED")
        && parts.next() == Some(service_id)
}

/// One control-port session. Commands run one at a time; `650` event lines
/// arriving between or inside replies land in `pending_events`.
#[derive(Debug)]
pub(crate) struct ControlConnection {
    stream: BufStream<TcpStream>,
    pending_events: VecDeque<String>,
}

impl ControlConnection {
    /// Connect to the control port, retrying briefly while the daemon opens
    /// its listener.
    pub(crate) async fn open(host: &str, port: u16) -> Result<Self, TransportError> {
        const ATTEMPTS: u32 = 10;
        let mut last_error = None;
        for _ in 0..ATTEMPTS {
            match TcpStream::connect((host, port)).await {
                Ok(stream) => {
                    debug!(host, port, "control connection open");
                    return Ok(Self {
                        stream: BufStream::new(stream),
                        pending_events: VecDeque::new(),
                    });
                }
                Err(err) => {
                    last_error = Some(err);
                    time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
        Err(last_error.map(TransportError::Io).unwrap_or_else(|| {
            TransportError::Protocol("control connection never attempted".into())
        }))
    }

    /// Send one command and read its full reply.
    pub(crate) async fn command(&mut self, command: &str) -> Result<ControlReply, TransportError> {
        trace!(command, "control command");
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    /// Pop or await the next asynchronous event line, without its status
    /// prefix.
    pub(crate) async fn next_event(&mut self, wait: Duration) -> Result<String, TransportError> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }
        let deadline = time::Instant::now() + wait;
        loop {
            let now = time::Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout("waiting for control event".into()));
            }
            let line = time::timeout(deadline - now, self.read_line())
                .await
                .map_err(|_| TransportError::Timeout("waiting for control event".into()))??;
            let (status, _separator, text) = split_reply_line(&line)?;
            if status == 650 {
                return Ok(text.to_string());
            }
            debug!(line, "discarding non-event control line");
        }
    }

    async fn read_reply(&mut self) -> Result<ControlReply, TransportError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let (status, separator, text) = split_reply_line(&line)?;
            if status == 650 {
                self.pending_events.push_back(text.to_string());
                continue;
            }
            match separator {
                '-' => lines.push(text.to_string()),
                '+' => {
                    // Data reply: payload continues up to a lone dot.
                    lines.push(text.to_string());
                    loop {
                        let data = self.read_line().await?;
                        if data == "." {
                            break;
                        }
                        lines.push(data);
                    }
                }
                _ => {
                    if !text.is_empty() && text != "OK" {
                        lines.push(text.to_string());
                    }
                    return Ok(ControlReply { status, lines });
                }
            }
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(TransportError::Protocol("control connection closed".into()));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        trace!(line, "control line");
        Ok(line)
    }
}
