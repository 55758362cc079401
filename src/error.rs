//! Brinewire error types.
//!
//! Decoding problems never surface as `Err` from the engine: they are reported
//! through the dispatcher's `Dispatch::Dropped` outcome and logged. The remaining
//! types cover transport writes, user commands and configuration. The `thiserror`
//! crate is used for the definitions.

use thiserror::Error;

/// Integrity and framing failures detected while decoding buffered bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A packet's end-marker byte did not match the value fixed for its layout.
    #[error(
        "End marker mismatch for {packet}: expected 0x{expected:02X}, got 0x{found:02X}"
    )]
    EndMarkerMismatch {
        packet: &'static str,
        expected: u8,
        found: u8,
    },

    /// The buffer did not start with a recognised header and no continuation was pending.
    #[error("Unrecognized header 0x{first:02X} 0x{second:02X}, discarded {discarded} bytes")]
    UnrecognizedHeader {
        first: u8,
        second: u8,
        discarded: usize,
    },
}

/// Failures reported by the transport collaborator for an outbound write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No writable characteristic is available (not connected or not discovered yet).
    #[error("Transport not ready for writes")]
    NotReady,

    /// The write was attempted and rejected by the link layer.
    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },
}

/// Reasons a user-initiated command cannot be issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Commands are only accepted once the session is authenticated.
    #[error("Session is not authenticated")]
    NotAuthenticated,

    /// Salt-level commands need the tank geometry reported by the controller.
    #[error("Brine tank is not configured on the controller")]
    BrineTankNotConfigured,

    /// An argument cannot be encoded.
    #[error("Invalid value for '{field}': {description}")]
    InvalidValue {
        field: &'static str,
        description: String,
    },

    /// The command was built but the transport rejected it.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Invalid engine configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Password outside 0-9999.
    #[error("Invalid password {0}: must be between 0 and 9999")]
    InvalidPassword(u16),

    /// A timing interval that must be positive was zero.
    #[error("Interval '{0}' must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Main error type for Brinewire operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrinewireError {
    /// Error while decoding inbound data.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error from the transport.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error while issuing a command.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Error in the configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err = DecodeError::EndMarkerMismatch {
            packet: "status-0",
            expected: 0x39,
            found: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "End marker mismatch for status-0: expected 0x39, got 0x00"
        );
    }

    #[test]
    fn umbrella_conversions() {
        let err: BrinewireError = ConfigError::ZeroInterval("poll_interval").into();
        assert!(matches!(err, BrinewireError::Config(_)));

        let err: CommandError = TransportError::NotReady.into();
        assert_eq!(err.to_string(), "Transport error: Transport not ready for writes");
    }
}
