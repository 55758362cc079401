//! Frame dispatch over the receive ring buffer.
//!
//! [`dispatch_next`] looks at the head of the buffer and extracts at most one packet.
//! Callers loop until it returns [`Dispatch::NeedMoreData`]. Every other outcome
//! consumes at least one byte, so the loop always terminates.

use tracing::{debug, trace};

use crate::constants::{HEADER_LEN, MIN_DISPATCH_LEN};
use crate::error::DecodeError;
use crate::history::HistoryContinuation;
use crate::packets::decoders::{
    DecodeStep, decode_handshake, decode_history_fragment, decode_keepalive, decode_settings,
    decode_statistics, decode_status,
};
use crate::packets::discriminator::PacketTag;
use crate::packets::types::Packet;
use crate::ring_buffer::RingBuffer;

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing complete at the head of the buffer; wait for the next notification.
    NeedMoreData,
    /// A packet was decoded and its bytes consumed.
    Packet(Packet),
    /// Bytes were discarded: a failed end marker or an unrecognised header.
    Dropped(DecodeError),
}

/// Attempts to extract one packet from the head of `buf`.
///
/// Headed packets other than keepalives are only decoded once at least
/// [`MIN_DISPATCH_LEN`] bytes are buffered. An unrecognised header is treated as the
/// next history fragment when `continuation` expects one, and as garbage otherwise.
///
/// # Parameters
/// - `buf`: The receive buffer. Consumed bytes are removed.
/// - `continuation`: History fragment expectation, advanced as fragments are taken.
///
/// # Returns
/// The dispatch outcome.
pub fn dispatch_next<const N: usize>(
    buf: &mut RingBuffer<N>,
    continuation: &mut HistoryContinuation,
) -> Dispatch {
    if buf.len() < HEADER_LEN {
        return Dispatch::NeedMoreData;
    }

    let step = match PacketTag::from_header(buf.peek(0), buf.peek(1)) {
        Some(tag) => {
            if !tag.is_keepalive() && buf.len() < MIN_DISPATCH_LEN {
                return Dispatch::NeedMoreData;
            }
            let step = match tag {
                PacketTag::Handshake => decode_handshake(buf),
                PacketTag::Status => decode_status(buf),
                PacketTag::Settings => decode_settings(buf),
                PacketTag::Statistics => decode_statistics(buf),
                PacketTag::Keepalive => decode_keepalive(buf),
            };
            if !tag.is_keepalive() && continuation.is_pending() && step != DecodeStep::Incomplete {
                debug!(
                    expected = ?continuation,
                    "headed packet arrived mid-history, abandoning fragments"
                );
                *continuation = HistoryContinuation::Idle;
            }
            step
        }
        None if continuation.is_pending() => decode_history_fragment(buf, *continuation),
        None => return resync(buf),
    };

    match step {
        DecodeStep::Incomplete => Dispatch::NeedMoreData,
        DecodeStep::Decoded { packet, consumed } => {
            buf.consume(consumed);
            if let Packet::UsageFragment(fragment) = &packet {
                *continuation = if fragment.start_index == 0 {
                    HistoryContinuation::Fragment1
                } else {
                    continuation.advance()
                };
            }
            trace!(packet = packet.name(), consumed, "decoded");
            Dispatch::Packet(packet)
        }
        DecodeStep::DecodedFlush(packet) => {
            trace!(packet = packet.name(), flushed = buf.len(), "decoded and flushed");
            buf.clear();
            Dispatch::Packet(packet)
        }
        DecodeStep::Corrupt(err) => {
            debug!(error = %err, discarded = buf.len(), "clearing receive buffer");
            buf.clear();
            Dispatch::Dropped(err)
        }
    }
}

/// Discards bytes up to the next plausible header.
///
/// A plausible header is a repeated tag byte at offset 1 or later. With none in
/// sight, the whole buffer is dropped.
fn resync<const N: usize>(buf: &mut RingBuffer<N>) -> Dispatch {
    let first = buf.peek(0);
    let second = buf.peek(1);
    let len = buf.len();

    let next_header = (1..len - 1).find(|&i| {
        let byte = buf.peek(i);
        byte == buf.peek(i + 1) && PacketTag::is_tag_byte(byte)
    });

    let discarded = next_header.unwrap_or(len);
    buf.consume(discarded);
    debug!(first, second, discarded, "unrecognised header, resynchronising");

    Dispatch::Dropped(DecodeError::UnrecognizedHeader {
        first,
        second,
        discarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> RingBuffer<256> {
        let mut buf = RingBuffer::new();
        buf.append(bytes);
        buf
    }

    fn keepalive() -> [u8; 4] {
        [b'x', b'x', 1, 0]
    }

    #[test]
    fn waits_for_two_bytes() {
        let mut buf = buffer(&[b'u']);
        let mut cont = HistoryContinuation::Idle;
        assert_eq!(dispatch_next(&mut buf, &mut cont), Dispatch::NeedMoreData);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn headed_packet_waits_for_minimum() {
        let mut bytes = [0u8; 17];
        bytes[0] = b'u';
        bytes[1] = b'u';
        let mut buf = buffer(&bytes);
        let mut cont = HistoryContinuation::Idle;
        assert_eq!(dispatch_next(&mut buf, &mut cont), Dispatch::NeedMoreData);
        assert_eq!(buf.len(), 17);
    }

    #[test]
    fn keepalive_bypasses_minimum() {
        let mut buf = buffer(&keepalive());
        let mut cont = HistoryContinuation::Idle;
        assert_eq!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Packet(Packet::Keepalive { sequence: 1 })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn resync_skips_to_next_header() {
        let mut bytes = vec![0x01, 0x02, 0x03];
        bytes.extend_from_slice(&keepalive());
        let mut buf = buffer(&bytes);
        let mut cont = HistoryContinuation::Idle;
        assert_eq!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Dropped(DecodeError::UnrecognizedHeader {
                first: 0x01,
                second: 0x02,
                discarded: 3
            })
        );
        assert_eq!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Packet(Packet::Keepalive { sequence: 1 })
        );
    }

    #[test]
    fn resync_drops_trailing_tag_byte() {
        let mut buf = buffer(&[0x00, 0x11, 0x22, b'u']);
        let mut cont = HistoryContinuation::Idle;
        assert!(matches!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Dropped(DecodeError::UnrecognizedHeader { discarded: 4, .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn resync_clears_pure_garbage() {
        let mut buf = buffer(&[0x00, 0x11, 0x22, 0x33]);
        let mut cont = HistoryContinuation::Idle;
        assert!(matches!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Dropped(DecodeError::UnrecognizedHeader { discarded: 4, .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn bad_end_marker_clears_buffer() {
        let mut bytes = vec![0u8; 20];
        bytes[..3].copy_from_slice(&[b'u', b'u', 0]);
        bytes[19] = 0x00;
        bytes.extend_from_slice(&keepalive());
        let mut buf = buffer(&bytes);
        let mut cont = HistoryContinuation::Idle;
        assert!(matches!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Dropped(DecodeError::EndMarkerMismatch { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn history_fragments_follow_headed_packet() {
        let mut bytes = vec![b'w', b'w', 1];
        bytes.extend(std::iter::repeat_n(1u8, 17));
        bytes.extend(std::iter::repeat_n(2u8, 20));
        bytes.extend(std::iter::repeat_n(3u8, 20));
        bytes.extend_from_slice(&[4, 4, 4, 4, 4, 0xAB]);
        let mut buf = buffer(&bytes);
        let mut cont = HistoryContinuation::Idle;

        let mut starts = Vec::new();
        while let Dispatch::Packet(Packet::UsageFragment(f)) = dispatch_next(&mut buf, &mut cont) {
            starts.push((f.start_index, f.gallons.len(), f.last));
        }
        assert_eq!(
            starts,
            vec![(0, 17, false), (17, 20, false), (37, 20, false), (57, 5, true)]
        );
        assert_eq!(cont, HistoryContinuation::Idle);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_fragment_waits() {
        let mut buf = buffer(&[9u8; 10]);
        let mut cont = HistoryContinuation::Fragment2;
        assert_eq!(dispatch_next(&mut buf, &mut cont), Dispatch::NeedMoreData);
        assert_eq!(cont, HistoryContinuation::Fragment2);
    }

    #[test]
    fn headed_packet_abandons_pending_history() {
        let mut bytes = vec![0u8; 20];
        bytes[..3].copy_from_slice(&[b'v', b'v', 5]);
        let mut buf = buffer(&bytes);
        let mut cont = HistoryContinuation::Fragment1;
        assert!(matches!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Packet(Packet::Skipped { .. })
        ));
        assert_eq!(cont, HistoryContinuation::Idle);
    }

    #[test]
    fn keepalive_does_not_abandon_history() {
        let mut buf = buffer(&keepalive());
        let mut cont = HistoryContinuation::Fragment1;
        assert!(matches!(
            dispatch_next(&mut buf, &mut cont),
            Dispatch::Packet(Packet::Keepalive { .. })
        ));
        assert_eq!(cont, HistoryContinuation::Fragment1);
    }
}
