//! SOCKS5 CONNECT dialing through the daemon's local proxy.
//!
//! Hostnames go to the proxy unresolved so the daemon performs resolution;
//! `.onion` names never touch local DNS.

use crate::address::Address;
use crate::error::TransportError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const VERSION: u8 = 0x05;
const METHOD_NONE: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_V4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_V6: u8 = 0x04;

/// Build the CONNECT request for `address`, always as a domain target so
/// the proxy resolves it.
pub(crate) fn encode_connect(address: &Address) -> Result<Vec<u8>, TransportError> {
    let host = address.host().as_bytes();
    if host.is_empty() || host.len() > 255 {
        return Err(TransportError::Protocol(format!(
            "socks hostname length {} out of range",
            host.len()
        )));
    }
    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host.len() as u8]);
    request.extend_from_slice(host);
    request.extend_from_slice(&address.port().to_be_bytes());
    Ok(request)
}

/// Human-readable meaning of a SOCKS5 reply code.
pub(crate) fn reply_error(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "ttl expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown socks error",
    }
}

/// Open a stream to `address` through the SOCKS5 proxy at `proxy`.
pub(crate) async fn connect_via_proxy(
    proxy: &str,
    address: &Address,
) -> Result<TcpStream, TransportError> {
    let mut stream = TcpStream::connect(proxy).await?;

    stream.write_all(&[VERSION, 1, METHOD_NONE]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice != [VERSION, METHOD_NONE] {
        return Err(TransportError::Protocol(format!(
            "socks method negotiation failed: {choice:?}"
        )));
    }

    stream.write_all(&encode_connect(address)?).await?;
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(TransportError::Protocol(format!("socks reply version {}", head[0])));
    }
    if head[1] != 0x00 {
        return Err(TransportError::Protocol(format!(
            "socks connect to {address} failed: {}",
            reply_error(head[1])
        )));
    }

    // Drain the bound address trailing the reply header.
    let bound_len = match head[3] {
        ATYP_V4 => 4usize,
        ATYP_V6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => {
            return Err(TransportError::Protocol(format!("socks reply address type {other}")));
        }
    };
    let mut bound = vec![0u8; bound_len + 2];
    stream.read_exact(&mut bound).await?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_encoding() {
        let request = encode_connect(&Address::new("example.com", 80)).expect("encodes");
        let mut expected = vec![0x05, 0x01, 0x00, 0x03, 11];
        expected.extend_from_slice(b"example.com");
        expected.extend_from_slice(&[0x00, 0x50]);
        assert_eq!(request, expected);
    }

    #[test]
    fn test_onion_hosts_encode_as_domains() {
        let host = "vww6ybal4bd7szmgncyruucpgfkqahzddi37ktceo3ah7ngmcopnpyyd.onion";
        let request = encode_connect(&Address::new(host, 8000)).expect("encodes");
        assert_eq!(request[3], 0x03);
        assert_eq!(request[4] as usize, host.len());
        assert_eq!(&request[5..5 + host.len()], host.as_bytes());
        assert_eq!(&request[5 + host.len()..], &[0x1f, 0x40]);
    }

    #[test]
    fn test_oversized_hostname_is_rejected() {
        let host = "a".repeat(256);
        let result = encode_connect(&Address::new(host, 80));
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_reply_code_names() {
        assert_eq!(reply_error(0x05), "connection refused");
        assert_eq!(reply_error(0x04), "host unreachable");
        assert_eq!(reply_error(0xff), "unknown socks error");
    }
}
