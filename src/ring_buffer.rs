//! Fixed-capacity byte ring used to reassemble notification chunks into packets.
//!
//! Decoders never parse sequentially: they peek at literal protocol offsets relative
//! to the read cursor and only [`RingBuffer::consume`] once a packet length is
//! committed. When an append would exceed capacity the oldest unread bytes are
//! overwritten, so every decoder re-checks end markers instead of trusting length.

/// A power-of-two ring of bytes with independent read and write cursors.
#[derive(Clone)]
pub struct RingBuffer<const N: usize> {
    data: [u8; N],
    /// Write cursor.
    head: usize,
    /// Read cursor.
    tail: usize,
    len: usize,
    dropped: u64,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N > 0 && N.is_power_of_two(), "capacity must be a power of two");
        N - 1
    };

    /// Creates an empty ring.
    pub const fn new() -> Self {
        let _ = Self::MASK;
        Self {
            data: [0; N],
            head: 0,
            tail: 0,
            len: 0,
            dropped: 0,
        }
    }

    /// Total capacity in bytes.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of unread bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no unread bytes remain.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes silently overwritten by overflow since creation.
    #[inline]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Appends `bytes`, overwriting the oldest unread bytes when full.
    ///
    /// # Parameters
    /// - `bytes`: Chunk of arbitrary length, typically one BLE notification.
    pub fn append(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.data[self.head] = byte;
            self.head = (self.head + 1) & Self::MASK;
            if self.len == N {
                self.tail = (self.tail + 1) & Self::MASK;
                self.dropped += 1;
            } else {
                self.len += 1;
            }
        }
    }

    /// Byte at `offset` past the read cursor, without consuming.
    ///
    /// Callers must size-check first: `offset` must be below [`len`](Self::len).
    #[inline]
    pub fn peek(&self, offset: usize) -> u8 {
        debug_assert!(
            offset < self.len,
            "peek offset {} beyond {} buffered bytes",
            offset,
            self.len
        );
        self.data[(self.tail + offset) & Self::MASK]
    }

    /// Checked variant of [`peek`](Self::peek).
    #[inline]
    pub fn get(&self, offset: usize) -> Option<u8> {
        (offset < self.len).then(|| self.data[(self.tail + offset) & Self::MASK])
    }

    /// Big-endian 16-bit value at `offset..offset + 2`.
    #[inline]
    pub fn peek_u16_be(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.peek(offset), self.peek(offset + 1)])
    }

    /// Big-endian 24-bit value at `offset..offset + 3`.
    #[inline]
    pub fn peek_u24_be(&self, offset: usize) -> u32 {
        u32::from_be_bytes([
            0,
            self.peek(offset),
            self.peek(offset + 1),
            self.peek(offset + 2),
        ])
    }

    /// Copies `out.len()` bytes starting at `offset` into `out`.
    pub fn peek_into(&self, offset: usize, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.peek(offset + i);
        }
    }

    /// Discards `n` bytes from the read side. Clamped to the unread length.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len, "consume {} of {} bytes", n, self.len);
        let n = n.min(self.len);
        self.tail = (self.tail + n) & Self::MASK;
        self.len -= n;
    }

    /// Empties the ring.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Unread bytes in order, oldest first.
    pub fn to_vec(&self) -> Vec<u8> {
        (0..self.len).map(|i| self.peek(i)).collect()
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("len", &self.len)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("dropped", &self.dropped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_peek_consume() {
        let mut ring = RingBuffer::<8>::new();
        ring.append(&[1, 2, 3]);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.peek(0), 1);
        assert_eq!(ring.peek(2), 3);
        assert_eq!(ring.get(3), None);

        ring.consume(2);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.peek(0), 3);
    }

    #[test]
    fn wraps_around_capacity() {
        let mut ring = RingBuffer::<4>::new();
        ring.append(&[1, 2, 3]);
        ring.consume(3);
        ring.append(&[4, 5, 6]);
        assert_eq!(ring.to_vec(), vec![4, 5, 6]);
        assert_eq!(ring.peek_u16_be(1), 0x0506);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut ring = RingBuffer::<4>::new();
        ring.append(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.to_vec(), vec![3, 4, 5, 6]);
        assert_eq!(ring.dropped(), 2);
    }

    #[test]
    fn big_endian_reads() {
        let mut ring = RingBuffer::<16>::new();
        ring.append(&[0x00, 0x12, 0x34, 0x56]);
        assert_eq!(ring.peek_u16_be(1), 0x1234);
        assert_eq!(ring.peek_u24_be(1), 0x12_3456);
    }

    #[test]
    fn clear_resets_but_keeps_drop_count() {
        let mut ring = RingBuffer::<2>::new();
        ring.append(&[1, 2, 3]);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.get(0), None);
        assert_eq!(ring.dropped(), 1);
        ring.append(&[9]);
        assert_eq!(ring.peek(0), 9);
    }

    #[test]
    fn peek_into_copies_window() {
        let mut ring = RingBuffer::<8>::new();
        ring.append(&[7, 6, 5, 4, 3]);
        let mut out = [0u8; 3];
        ring.peek_into(1, &mut out);
        assert_eq!(out, [6, 5, 4]);
    }
}
