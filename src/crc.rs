//! Stateful CRC8 engine used by the authentication challenge.
//!
//! The controller does not use a catalogued CRC. Its "legacy" step shifts the
//! input byte into the register one bit at a time, MSB first, and XORs the
//! polynomial in whenever a set bit falls off the top. The register carries over
//! between calls, which is what chains the authentication bytes together.
//!
//! A conventional MSB-first step ([`CsCrc8::compute`]) is kept alongside for
//! completeness; the authentication flow only uses [`CsCrc8::compute_legacy`].

use crate::constants::{DEFAULT_CRC8_POLYNOMIAL, DEFAULT_CRC8_SEED};

/// CRC8 register with a configurable polynomial and running seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsCrc8 {
    polynomial: u8,
    seed: u8,
}

impl CsCrc8 {
    /// Creates an engine with the default polynomial (213) and seed (0).
    pub const fn new() -> Self {
        Self {
            polynomial: DEFAULT_CRC8_POLYNOMIAL,
            seed: DEFAULT_CRC8_SEED,
        }
    }

    /// Creates an engine with an explicit polynomial and seed.
    pub const fn with_options(polynomial: u8, seed: u8) -> Self {
        Self { polynomial, seed }
    }

    /// Reconfigures the engine for a new authentication attempt.
    pub fn set_options(&mut self, polynomial: u8, seed: u8) {
        self.polynomial = polynomial;
        self.seed = seed;
    }

    /// Current polynomial.
    pub const fn polynomial(&self) -> u8 {
        self.polynomial
    }

    /// Current register value.
    pub const fn seed(&self) -> u8 {
        self.seed
    }

    /// Runs one legacy step over `value` and returns the new register.
    ///
    /// # Parameters
    /// - `value`: Input byte, consumed MSB first.
    ///
    /// # Returns
    /// The updated register, which is also kept as the seed for the next call.
    pub fn compute_legacy(&mut self, value: u8) -> u8 {
        let mut register = self.seed;
        let mut input = value;
        for _ in 0..8 {
            let carry = register & 0x80 != 0;
            register <<= 1;
            if input & 0x80 != 0 {
                register |= 0x01;
            }
            input <<= 1;
            if carry {
                register ^= self.polynomial;
            }
        }
        self.seed = register;
        register
    }

    /// Runs one conventional MSB-first CRC8 step over `value`.
    ///
    /// # Returns
    /// The updated register, also kept as the seed for the next call.
    pub fn compute(&mut self, value: u8) -> u8 {
        let mut register = value ^ self.seed;
        for _ in 0..8 {
            register = if register & 0x80 != 0 {
                (register << 1) ^ self.polynomial
            } else {
                register << 1
            };
        }
        self.seed = register;
        register
    }
}

impl Default for CsCrc8 {
    fn default() -> Self {
        Self::new()
    }
}
