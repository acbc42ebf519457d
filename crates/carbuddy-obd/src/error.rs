//! Adapter link errors

use std::io;

use thiserror::Error;

/// Errors raised by an adapter link
///
/// Every variant is recoverable: the connection supervisor reacts with
/// backoff and retry, never by terminating the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Endpoint already has an open session, or the OS reports it busy
    #[error("Adapter busy: {0}")]
    Busy(String),

    /// Operation exceeded its timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Adapter answered with something we cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Endpoint missing, refused or not permitted
    #[error("Adapter unavailable: {0}")]
    Unavailable(String),

    /// Session closed underneath us (EOF, reset, or never opened)
    #[error("Connection closed")]
    Closed,

    /// Transport not compiled into this build
    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

impl LinkError {
    /// Map an I/O failure to the link error taxonomy
    pub fn from_io(err: io::Error, context: &str) -> Self {
        match err.kind() {
            io::ErrorKind::ResourceBusy => LinkError::Busy(format!("{}: {}", context, err)),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                LinkError::Timeout(format!("{}: {}", context, err))
            }
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => LinkError::Closed,
            _ => LinkError::Unavailable(format!("{}: {}", context, err)),
        }
    }

    /// Whether the session is gone and must be re-established
    pub fn is_session_lost(&self) -> bool {
        matches!(self, LinkError::Closed | LinkError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let busy = io::Error::new(io::ErrorKind::ResourceBusy, "device busy");
        assert!(matches!(LinkError::from_io(busy, "open"), LinkError::Busy(_)));

        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(LinkError::from_io(eof, "read"), LinkError::Closed);

        let missing = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert!(matches!(
            LinkError::from_io(missing, "open"),
            LinkError::Unavailable(_)
        ));

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(
            LinkError::from_io(timed_out, "read"),
            LinkError::Timeout(_)
        ));
    }

    #[test]
    fn test_session_lost() {
        assert!(LinkError::Closed.is_session_lost());
        assert!(!LinkError::Timeout("x".into()).is_session_lost());
        assert!(!LinkError::Busy("x".into()).is_session_lost());
    }
}
