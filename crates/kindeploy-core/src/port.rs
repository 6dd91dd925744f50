//! Port validation and local availability checks.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("port must be a number, got '{0}'")]
    NotNumeric(String),

    #[error("port {0} is out of range, must be between 1 and 65535")]
    OutOfRange(u64),

    #[error("port {0} is already in use on 127.0.0.1 or 0.0.0.0")]
    InUse(u16),
}

/// Parse user input as a port. Empty input selects `default`.
pub fn parse_port(input: &str, default: u16) -> Result<u16, PortError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(default);
    }
    if !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(PortError::NotNumeric(input.to_string()));
    }
    // All digits; only overflow can fail, and that is out of range too.
    let value: u64 = input.parse().unwrap_or(u64::MAX);
    if !(1..=65535).contains(&value) {
        return Err(PortError::OutOfRange(value));
    }
    Ok(value as u16)
}

/// True if `port` cannot be bound on loopback or on all interfaces. The
/// forwarder later binds `0.0.0.0`, so both must be free.
pub fn port_in_use(port: u16) -> bool {
    [Ipv4Addr::LOCALHOST, Ipv4Addr::UNSPECIFIED]
        .into_iter()
        .any(|ip| TcpListener::bind(SocketAddr::from((ip, port))).is_err())
}

/// Parse and require the port to be free.
pub fn select_port(input: &str, default: u16) -> Result<u16, PortError> {
    let port = parse_port(input, default)?;
    if port_in_use(port) {
        return Err(PortError::InUse(port));
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_selects_default() {
        assert_eq!(parse_port("", 8080), Ok(8080));
        assert_eq!(parse_port("   ", 3000), Ok(3000));
    }

    #[test]
    fn accepts_closed_range() {
        assert_eq!(parse_port("1", 8080), Ok(1));
        assert_eq!(parse_port("65535", 8080), Ok(65535));
        assert_eq!(parse_port(" 9090 ", 8080), Ok(9090));
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(parse_port("0", 8080), Err(PortError::OutOfRange(0)));
        assert_eq!(parse_port("65536", 8080), Err(PortError::OutOfRange(65536)));
        assert!(matches!(
            parse_port("99999999999999999999999", 8080),
            Err(PortError::OutOfRange(_))
        ));
    }

    #[test]
    fn rejects_non_numeric() {
        for input in ["abc", "80a", "-1", "8080.0", "+80"] {
            assert!(
                matches!(parse_port(input, 8080), Err(PortError::NotNumeric(_))),
                "expected NotNumeric for {input}"
            );
        }
    }

    #[test]
    fn bound_loopback_port_is_in_use() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_in_use(port));
        assert_eq!(select_port(&port.to_string(), 8080), Err(PortError::InUse(port)));
    }

    #[test]
    fn released_port_is_free() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!port_in_use(port));
    }
}
