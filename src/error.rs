//! Error types for the honeypot.

use thiserror::Error;

/// Result type alias for honeypot operations.
pub type Result<T> = std::result::Result<T, HoneypotError>;

/// Honeypot error types.
///
/// Only the bind variant is fatal; everything else stays inside the
/// connection or frame it happened in.
#[derive(Error, Debug)]
pub enum HoneypotError {
    /// Listener could not be bound at startup
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Front-end could not reach the internal Modbus server
    #[error("Internal Modbus server unreachable at {addr}: {reason}")]
    UpstreamConnect { addr: String, reason: String },

    /// Modbus frame too small to carry a function code
    #[error("Short frame ({len} bytes)")]
    ShortFrame { len: usize },

    /// TPKT length field outside the accepted telegram bounds
    #[error("Invalid TPKT telegram length {declared}")]
    BadTelegramLength { declared: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = HoneypotError::ShortFrame { len: 7 };
        assert_eq!(err.to_string(), "Short frame (7 bytes)");

        let err = HoneypotError::UpstreamConnect {
            addr: "127.0.0.1:1502".into(),
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("127.0.0.1:1502"));
    }
}
