//! Fuzz harnesses for the inbound path.
//!
//! Each harness accepts arbitrary bytes and drives a component with them, panicking
//! only when an invariant breaks. They are shared by the simulator's fuzz mode and
//! the property tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::commands::CommandFrame;
use crate::config::EngineConfig;
use crate::constants::RX_BUFFER_CAPACITY;
use crate::engine::{EngineStats, SoftenerEngine};
use crate::error::TransportError;
use crate::history::HistoryContinuation;
use crate::packets::{Dispatch, Handshake, dispatch_next};
use crate::peripheral;
use crate::ring_buffer::RingBuffer;
use crate::time::mock_clock::MockClock;
use crate::traits::Transport;
use crate::types::{ConnectionCounter, FirmwareVersion};

/// Transport that accepts and discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn write(&mut self, _frame: &CommandFrame) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Runs the dispatcher over `data` until it asks for more bytes.
///
/// # Parameters
/// - `data`: Fuzzer-generated notification payload
///
/// # Panics
/// If dispatch stalls without consuming bytes or the buffer exceeds its capacity.
pub fn dispatcher_harness(data: &[u8]) {
    let mut buf: RingBuffer<RX_BUFFER_CAPACITY> = RingBuffer::new();
    let mut continuation = HistoryContinuation::Idle;
    buf.append(data);
    assert!(buf.len() <= RX_BUFFER_CAPACITY);

    loop {
        let before = buf.len();
        match dispatch_next(&mut buf, &mut continuation) {
            Dispatch::NeedMoreData => break,
            Dispatch::Packet(_) | Dispatch::Dropped(_) => {
                assert!(buf.len() < before, "dispatch made no progress at {before} bytes");
            }
        }
    }
}

/// Feeds `data` to an authenticated engine in notification-sized chunks, ticking
/// between them.
///
/// The engine first receives a handshake from firmware that needs no
/// authentication, so the poll sequencer and keepalive timer run while the fuzz
/// data arrives.
///
/// # Parameters
/// - `data`: Fuzzer-generated byte stream
///
/// # Returns
/// Engine counters after the last chunk.
pub fn engine_notification_harness(data: &[u8]) -> EngineStats {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let Ok(mut engine) = SoftenerEngine::with_rng(
        EngineConfig::default(),
        clock.clone(),
        Box::new(StdRng::seed_from_u64(0)),
    ) else {
        return EngineStats::default();
    };
    let mut link = NullTransport;
    engine.connected(&mut link);
    let handshake = peripheral::handshake(&Handshake {
        firmware: FirmwareVersion::new(6, 0),
        auth_flag: 0,
        counter: ConnectionCounter::new(0),
    });
    engine.handle_notification(&handshake, &mut link);
    assert!(engine.session().authenticated);

    for chunk in data.chunks(20) {
        for reading in engine.handle_notification(chunk, &mut link) {
            if let Some(value) = reading.as_number() {
                assert!(value.is_finite(), "non-finite reading {reading:?}");
            }
        }
        assert!(engine.buffered_len() <= RX_BUFFER_CAPACITY);
        clock.advance(Duration::from_millis(25));
        engine.tick(&mut link);
    }
    *engine.stats()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harnesses_survive_garbage() {
        let garbage: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
        dispatcher_harness(&garbage);
        engine_notification_harness(&garbage);
    }

    #[test]
    fn harnesses_survive_tag_floods() {
        let flood = vec![b'w'; 600];
        dispatcher_harness(&flood);
        engine_notification_harness(&flood);
        dispatcher_harness(&[]);
    }

    #[test]
    fn engine_harness_runs_poll_sequencer() {
        let stats = engine_notification_harness(&[0u8; 400]);
        assert_eq!(stats.auth_attempts, 0);
        assert!(stats.writes >= 2, "only {} frames written", stats.writes);
    }
}
