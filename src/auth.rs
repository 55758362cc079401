//! Authentication reply construction.
//!
//! Controllers with older firmware, or those that set the authentication flag in
//! their handshake, expect a 20-byte reply binding the device password to the
//! connection counter through a chain of legacy CRC8 steps:
//!
//! ```text
//! 0-1   "tt"
//! 2-3   "PA"
//! 4     polynomial (from ALLOWED_POLYNOMIALS)
//! 5     seed draw
//! 6     seed draw ^ second draw
//! 7     crc(counter ^ crc(byte 6)) ^ thousands
//! 8     crc(byte 7) ^ hundreds
//! 9     crc(byte 8) ^ tens
//! 10    crc(byte 9) ^ units
//! 11-19 filler draws
//! ```
//!
//! Every random byte is in 1-255; the controller treats a zero challenge byte as
//! invalid. There is no acknowledgment: the session is assumed authenticated once
//! the reply is written.

use rand::Rng;

use crate::commands::CommandFrame;
use crate::constants::{ALLOWED_POLYNOMIALS, AUTH_COMMAND_TAG, COMMAND_LEN, TAG_HANDSHAKE};
use crate::crc::CsCrc8;
use crate::types::{ConnectionCounter, Password};

/// Number of filler bytes after the password digits.
pub const FILLER_LEN: usize = COMMAND_LEN - 11;

/// Random values consumed by one authentication reply.
///
/// Separated from [`build_auth_packet`] so the byte derivation can be checked
/// against fixed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeDraws {
    pub polynomial: u8,
    pub seed: u8,
    pub second: u8,
    pub filler: [u8; FILLER_LEN],
}

impl ChallengeDraws {
    /// Draws a polynomial uniformly from the allow-list and every other byte
    /// uniformly from 1-255.
    pub fn draw<R: Rng>(rng: &mut R) -> Self {
        let polynomial = ALLOWED_POLYNOMIALS[rng.random_range(0..ALLOWED_POLYNOMIALS.len())];
        let seed = rng.random_range(1..=255);
        let second = rng.random_range(1..=255);
        let mut filler = [0u8; FILLER_LEN];
        for slot in filler.iter_mut() {
            *slot = rng.random_range(1..=255);
        }
        Self {
            polynomial,
            seed,
            second,
            filler,
        }
    }
}

/// Builds the authentication reply for `password` and the handshake's `counter`.
///
/// # Parameters
/// - `password`: Device password (0-9999).
/// - `counter`: Connection counter from the handshake being answered.
/// - `draws`: Random challenge values.
///
/// # Returns
/// The 20-byte reply frame.
pub fn build_auth_packet(
    password: Password,
    counter: ConnectionCounter,
    draws: &ChallengeDraws,
) -> CommandFrame {
    let [thousands, hundreds, tens, units] = password.digits();
    let mut crc = CsCrc8::with_options(draws.polynomial, draws.seed);

    let mut packet = [TAG_HANDSHAKE; COMMAND_LEN];
    packet[2..4].copy_from_slice(&AUTH_COMMAND_TAG);
    packet[4] = draws.polynomial;
    packet[5] = draws.seed;
    packet[6] = draws.seed ^ draws.second;

    let mixed_counter = counter.value() ^ crc.compute_legacy(packet[6]);
    packet[7] = crc.compute_legacy(mixed_counter) ^ thousands;
    packet[8] = hundreds ^ crc.compute_legacy(packet[7]);
    packet[9] = tens ^ crc.compute_legacy(packet[8]);
    packet[10] = units ^ crc.compute_legacy(packet[9]);
    packet[11..].copy_from_slice(&draws.filler);

    CommandFrame::from_bytes(packet)
}

/// Returns `true` if `frame` has the fixed authentication reply prefix.
pub fn is_auth_packet(frame: &[u8]) -> bool {
    frame.len() == COMMAND_LEN
        && frame[0] == TAG_HANDSHAKE
        && frame[1] == TAG_HANDSHAKE
        && frame[2..4] == AUTH_COMMAND_TAG
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn draws(polynomial: u8, seed: u8, second: u8, filler: [u8; FILLER_LEN]) -> ChallengeDraws {
        ChallengeDraws {
            polynomial,
            seed,
            second,
            filler,
        }
    }

    #[test]
    fn golden_reply_default_password() {
        let frame = build_auth_packet(
            Password::new(1234).unwrap(),
            ConnectionCounter::new(0x2A),
            &draws(0x8B, 0x3C, 0xA5, [1, 2, 3, 4, 5, 6, 7, 8, 9]),
        );
        assert_eq!(
            frame.as_bytes(),
            &[
                0x74, 0x74, 0x50, 0x41, 0x8B, 0x3C, 0x99, 0xC7, 0x53, 0x6D, 0xF1, 0x01, 0x02,
                0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09
            ]
        );
    }

    #[test]
    fn golden_reply_zero_counter() {
        let frame = build_auth_packet(
            Password::new(9876).unwrap(),
            ConnectionCounter::new(0x00),
            &draws(0xF0, 0x01, 0xFF, [9; FILLER_LEN]),
        );
        assert_eq!(&frame.as_bytes()[..11], &[
            0x74, 0x74, 0x50, 0x41, 0xF0, 0x01, 0xFE, 0x77, 0x6F, 0x48, 0xDE
        ]);
        assert_eq!(&frame.as_bytes()[11..], &[9; FILLER_LEN]);
    }

    #[test]
    fn golden_reply_equal_draws() {
        // Equal draws make byte 6 zero; only the draws themselves must be non-zero.
        let frame = build_auth_packet(
            Password::new(0).unwrap(),
            ConnectionCounter::new(200),
            &draws(0x1E, 0x80, 0x80, [0xFF; FILLER_LEN]),
        );
        assert_eq!(&frame.as_bytes()[..11], &[
            0x74, 0x74, 0x50, 0x41, 0x1E, 0x80, 0x00, 0xE6, 0x30, 0x2C, 0x46
        ]);
    }

    #[test]
    fn digits_chain_through_crc() {
        let password = Password::new(1234).unwrap();
        let d = draws(0x8B, 0x3C, 0xA5, [1; FILLER_LEN]);
        let frame = build_auth_packet(password, ConnectionCounter::new(0x2A), &d);
        let bytes = frame.as_bytes();

        let mut crc = CsCrc8::with_options(0x8B, 0x3C);
        let c = crc.compute_legacy(bytes[6]);
        assert_eq!(bytes[7], crc.compute_legacy(0x2A ^ c) ^ 1);
        assert_eq!(bytes[8], 2 ^ crc.compute_legacy(bytes[7]));
        assert_eq!(bytes[9], 3 ^ crc.compute_legacy(bytes[8]));
        assert_eq!(bytes[10], 4 ^ crc.compute_legacy(bytes[9]));
    }

    #[test]
    fn counter_changes_reply() {
        let password = Password::default();
        let d = draws(0x8B, 0x3C, 0xA5, [1; FILLER_LEN]);
        let a = build_auth_packet(password, ConnectionCounter::new(1), &d);
        let b = build_auth_packet(password, ConnectionCounter::new(2), &d);
        assert_ne!(a.as_bytes()[7..11], b.as_bytes()[7..11]);
        assert_eq!(a.as_bytes()[..7], b.as_bytes()[..7]);
    }

    #[test]
    fn draws_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let d = ChallengeDraws::draw(&mut rng);
            assert!(ALLOWED_POLYNOMIALS.contains(&d.polynomial));
            assert_ne!(d.seed, 0);
            assert_ne!(d.second, 0);
            assert!(d.filler.iter().all(|&b| b != 0));
        }
    }

    #[test]
    fn reply_is_recognisable() {
        let mut rng = StdRng::seed_from_u64(1);
        let frame = build_auth_packet(
            Password::default(),
            ConnectionCounter::new(5),
            &ChallengeDraws::draw(&mut rng),
        );
        assert!(is_auth_packet(frame.as_bytes()));
        assert!(!is_auth_packet(&[b't'; 20]));
    }

    #[test]
    fn allow_list_has_four_or_five_bits() {
        assert_eq!(ALLOWED_POLYNOMIALS.len(), 64);
        assert!(
            ALLOWED_POLYNOMIALS
                .iter()
                .all(|p| matches!(p.count_ones(), 4 | 5))
        );
    }
}
