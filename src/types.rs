//! Core value types shared across the engine.
//!
//! Small `#[repr(transparent)]` newtypes keep device-supplied bytes from being mixed
//! up with each other at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{AUTH_FREE_FIRMWARE_MAJOR, AUTH_REQUIRED_FLAG, DEFAULT_PASSWORD, MAX_PASSWORD};
use crate::error::ConfigError;

/// Generates a transparent byte-sized newtype with the usual conversions.
macro_rules! wire_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty) => $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Creates a new instance
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Raw value
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }
    };
}

wire_newtype!(
    /// Per-connection counter reported in the handshake and mixed into the
    /// authentication reply.
    ConnectionCounter(u8) => "#"
);

/// Device password, always within 0-9999.
///
/// Deserialisation goes through [`TryFrom<u16>`] so out-of-range values in a
/// configuration file are rejected rather than silently truncated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Password(u16);

impl Password {
    /// Creates a password, rejecting values above 9999.
    ///
    /// # Errors
    /// - [`ConfigError::InvalidPassword`] - Value outside 0-9999
    pub fn new(value: u16) -> Result<Self, ConfigError> {
        if value > MAX_PASSWORD {
            return Err(ConfigError::InvalidPassword(value));
        }
        Ok(Self(value))
    }

    /// Raw numeric value.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Decimal digits, most significant first: `[thousands, hundreds, tens, units]`.
    pub const fn digits(self) -> [u8; 4] {
        let v = self.0;
        [
            (v / 1000) as u8,
            ((v / 100) % 10) as u8,
            ((v / 10) % 10) as u8,
            (v % 10) as u8,
        ]
    }
}

impl Default for Password {
    fn default() -> Self {
        Self(DEFAULT_PASSWORD)
    }
}

impl TryFrom<u16> for Password {
    type Error = ConfigError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Password> for u16 {
    fn from(value: Password) -> Self {
        value.0
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(****)")
    }
}

/// Controller firmware version from the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// Creates a firmware version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether a handshake with this firmware and `auth_flag` byte needs the
    /// authentication reply. Older firmware needs it regardless of the flag.
    pub const fn requires_auth(self, auth_flag: u8) -> bool {
        self.major < AUTH_FREE_FIRMWARE_MAJOR || (auth_flag & AUTH_REQUIRED_FLAG) != 0
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_digits() {
        assert_eq!(Password::new(1234).unwrap().digits(), [1, 2, 3, 4]);
        assert_eq!(Password::new(9876).unwrap().digits(), [9, 8, 7, 6]);
        assert_eq!(Password::new(7).unwrap().digits(), [0, 0, 0, 7]);
        assert_eq!(Password::new(0).unwrap().digits(), [0, 0, 0, 0]);
    }

    #[test]
    fn password_rejects_five_digits() {
        assert_eq!(
            Password::new(10_000),
            Err(ConfigError::InvalidPassword(10_000))
        );
        assert!(Password::try_from(9999).is_ok());
    }

    #[test]
    fn password_debug_is_masked() {
        let pw = Password::new(4321).unwrap();
        assert_eq!(format!("{:?}", pw), "Password(****)");
    }

    #[test]
    fn password_serde_validates() {
        let pw: Password = serde_json::from_str("4321").unwrap();
        assert_eq!(pw.value(), 4321);
        assert!(serde_json::from_str::<Password>("12345").is_err());
        assert_eq!(serde_json::to_string(&pw).unwrap(), "4321");
    }

    #[test]
    fn firmware_auth_rule() {
        assert!(FirmwareVersion::new(5, 9).requires_auth(0x00));
        assert!(!FirmwareVersion::new(6, 0).requires_auth(0x00));
        assert!(FirmwareVersion::new(6, 0).requires_auth(0x80));
        assert!(FirmwareVersion::new(7, 1).requires_auth(0xC1));
        assert!(!FirmwareVersion::new(7, 1).requires_auth(0x7F));
    }

    #[test]
    fn newtype_display() {
        assert_eq!(ConnectionCounter::new(42).to_string(), "#42");
        assert_eq!(FirmwareVersion::new(5, 12).to_string(), "C5.12");
        assert_eq!(ConnectionCounter::from(0x2A), 0x2A);
    }
}
