//! Simulated BLE notification link.

use rand::Rng;
use rand::rngs::StdRng;

/// Largest notification payload the link delivers at once.
pub const MAX_NOTIFICATION_LEN: usize = 20;

/// Re-chunks a byte stream at random boundaries and optionally corrupts bits.
#[derive(Debug)]
pub struct LossyLink {
    rng: StdRng,
    max_chunk: usize,
    bit_flip_probability: f64,
    bits_flipped: u64,
}

impl LossyLink {
    /// Creates a link.
    ///
    /// # Parameters
    /// - `rng`: Source for chunk boundaries and corruption.
    /// - `max_chunk`: Largest chunk delivered, clamped to 1..=20.
    /// - `bit_flip_probability`: Per-byte chance of flipping one bit (0.0 to 1.0).
    pub fn new(rng: StdRng, max_chunk: usize, bit_flip_probability: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&bit_flip_probability));
        Self {
            rng,
            max_chunk: max_chunk.clamp(1, MAX_NOTIFICATION_LEN),
            bit_flip_probability,
            bits_flipped: 0,
        }
    }

    /// Whether the link can alter bytes in transit.
    pub fn is_lossy(&self) -> bool {
        self.bit_flip_probability > 0.0
    }

    pub fn bits_flipped(&self) -> u64 {
        self.bits_flipped
    }

    /// Splits `stream` into notifications, in order.
    ///
    /// # Returns
    /// Chunks whose concatenation equals `stream` apart from flipped bits.
    pub fn transmit(&mut self, stream: &[u8]) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        let mut rest = stream;
        while !rest.is_empty() {
            let n = self.rng.random_range(1..=self.max_chunk).min(rest.len());
            let (head, tail) = rest.split_at(n);
            chunks.push(self.corrupt(head));
            rest = tail;
        }
        chunks
    }

    /// Delivers `notification` as a single chunk, subject only to bit flips.
    pub fn corrupt(&mut self, notification: &[u8]) -> Vec<u8> {
        let mut chunk = notification.to_vec();
        if self.is_lossy() {
            for byte in chunk.iter_mut() {
                if self.rng.random_bool(self.bit_flip_probability) {
                    *byte ^= 1u8 << self.rng.random_range(0..8u32);
                    self.bits_flipped += 1;
                }
            }
        }
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn clean_link_preserves_stream() {
        let mut link = LossyLink::new(StdRng::seed_from_u64(3), 7, 0.0);
        let stream: Vec<u8> = (0..=255).collect();
        let chunks = link.transmit(&stream);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 7));
        assert_eq!(chunks.concat(), stream);
        assert_eq!(link.bits_flipped(), 0);
    }

    #[test]
    fn chunk_size_clamped_to_notification_length() {
        let mut link = LossyLink::new(StdRng::seed_from_u64(3), 500, 0.0);
        let chunks = link.transmit(&[0u8; 400]);
        assert!(chunks.iter().all(|c| c.len() <= MAX_NOTIFICATION_LEN));
    }

    #[test]
    fn flips_change_bytes_not_length() {
        let mut link = LossyLink::new(StdRng::seed_from_u64(9), 20, 1.0);
        let stream = [0u8; 64];
        let received = link.transmit(&stream).concat();
        assert_eq!(received.len(), stream.len());
        assert!(received.iter().all(|b| b.count_ones() == 1));
        assert_eq!(link.bits_flipped(), 64);
    }
}
