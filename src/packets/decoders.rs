//! Per-family packet decoders.
//!
//! Each decoder peeks at literal offsets in the ring buffer and reports how much to
//! consume; none of them mutate the buffer. Length checks come first so no peek
//! ever lands beyond the buffered bytes.

use crate::constants::{
    END_MARKER_OFFSET, HANDSHAKE_AUTH_FLAG_OFFSET, HANDSHAKE_COUNTER_OFFSET,
    HANDSHAKE_FIRMWARE_MAJOR_OFFSET, HANDSHAKE_FIRMWARE_MINOR_OFFSET, HANDSHAKE_LEN,
    HISTORY_GALLONS_SCALE, HISTORY_HEADED_ENTRIES, KEEPALIVE_FIRST_LEN, KEEPALIVE_LEN,
    RENTAL_UNIT_SENTINEL, SEQUENCE_OFFSET, SETTINGS_CONFIG_END_MARKER, SETTINGS_CYCLE_END_MARKER,
    SETTINGS_LEN, STATISTICS_HISTORY_LEN, STATISTICS_SKIP_LEN, STATISTICS_TOTALS_END_MARKER,
    STATISTICS_TOTALS_END_MARKER_OFFSET, STATISTICS_TOTALS_LEN, STATUS_BRINE_END_MARKER,
    STATUS_LEN, STATUS_REALTIME_END_MARKER, TAG_SETTINGS, TAG_STATISTICS,
};
use crate::error::DecodeError;
use crate::history::HistoryContinuation;
use crate::packets::types::{
    BrineStatus, ClockTime, CyclePosition, CycleTimes, Handshake, Meridiem, Packet,
    SettingsConfig, StatisticsTotals, StatusFlags, StatusRealtime, UsageFragment,
};
use crate::ring_buffer::RingBuffer;
use crate::session::BrineTankConfig;
use crate::types::{ConnectionCounter, FirmwareVersion};

/// Result of running one decoder against the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep {
    /// The packet is not fully buffered yet.
    Incomplete,
    /// A packet was decoded; `consumed` bytes belong to it.
    Decoded { packet: Packet, consumed: usize },
    /// A packet was decoded and everything buffered, including it, must be discarded.
    DecodedFlush(Packet),
    /// Integrity check failed; the buffer must be cleared.
    Corrupt(DecodeError),
}

fn check_end_marker<const N: usize>(
    buf: &RingBuffer<N>,
    packet: &'static str,
    offset: usize,
    expected: u8,
) -> Result<(), DecodeError> {
    let found = buf.peek(offset);
    if found == expected {
        Ok(())
    } else {
        Err(DecodeError::EndMarkerMismatch {
            packet,
            expected,
            found,
        })
    }
}

/// Decodes a handshake (`tt`, 18 bytes).
pub fn decode_handshake<const N: usize>(buf: &RingBuffer<N>) -> DecodeStep {
    if buf.len() < HANDSHAKE_LEN {
        return DecodeStep::Incomplete;
    }
    let handshake = Handshake {
        firmware: FirmwareVersion::new(
            buf.peek(HANDSHAKE_FIRMWARE_MAJOR_OFFSET),
            buf.peek(HANDSHAKE_FIRMWARE_MINOR_OFFSET),
        ),
        auth_flag: buf.peek(HANDSHAKE_AUTH_FLAG_OFFSET),
        counter: ConnectionCounter::new(buf.peek(HANDSHAKE_COUNTER_OFFSET)),
    };
    DecodeStep::Decoded {
        packet: Packet::Handshake(handshake),
        consumed: HANDSHAKE_LEN,
    }
}

/// Decodes a status packet (`uu`, 20 bytes).
///
/// Sub-sequences 2 and above are followed by headerless history packets the engine
/// does not use, so they flush the whole buffer.
pub fn decode_status<const N: usize>(buf: &RingBuffer<N>) -> DecodeStep {
    if buf.len() < STATUS_LEN {
        return DecodeStep::Incomplete;
    }
    match buf.peek(SEQUENCE_OFFSET) {
        0 => {
            if let Err(e) =
                check_end_marker(buf, "status-0", END_MARKER_OFFSET, STATUS_REALTIME_END_MARKER)
            {
                return DecodeStep::Corrupt(e);
            }
            let status = StatusRealtime {
                time: ClockTime {
                    hour: buf.peek(3),
                    minute: buf.peek(4),
                    meridiem: Meridiem::from_byte(buf.peek(5)),
                },
                battery_code: buf.peek(6),
                current_flow_raw: buf.peek_u16_be(7),
                soft_water_remaining: buf.peek_u16_be(9),
                usage_today: buf.peek_u16_be(11),
                peak_flow_raw: buf.peek_u16_be(13),
                hardness_gpg: buf.peek(15),
                regen_hour: buf.peek(16),
                regen_meridiem: Meridiem::from_byte(buf.peek(17)),
                flags: StatusFlags(buf.peek(18)),
            };
            DecodeStep::Decoded {
                packet: Packet::StatusRealtime(status),
                consumed: STATUS_LEN,
            }
        }
        1 => {
            if let Err(e) =
                check_end_marker(buf, "status-1", END_MARKER_OFFSET, STATUS_BRINE_END_MARKER)
            {
                return DecodeStep::Corrupt(e);
            }
            let status = BrineStatus {
                filter_backwash_days: buf.peek(3),
                air_recharge_days: buf.peek(4),
                regen_active: buf.peek(8) != 0,
                low_salt_alert: buf.peek(14),
                tank: BrineTankConfig {
                    regens_remaining: buf.peek(13),
                    tank_type: buf.peek(15),
                    fill_height: buf.peek(16),
                    refill_minutes: buf.peek(17),
                },
            };
            DecodeStep::Decoded {
                packet: Packet::BrineStatus(status),
                consumed: STATUS_LEN,
            }
        }
        sequence => DecodeStep::DecodedFlush(Packet::StatusHistory { sequence }),
    }
}

/// Decodes a settings packet (`vv`, 20 bytes).
pub fn decode_settings<const N: usize>(buf: &RingBuffer<N>) -> DecodeStep {
    if buf.len() < SETTINGS_LEN {
        return DecodeStep::Incomplete;
    }
    match buf.peek(SEQUENCE_OFFSET) {
        0 => {
            if let Err(e) =
                check_end_marker(buf, "settings-0", END_MARKER_OFFSET, SETTINGS_CONFIG_END_MARKER)
            {
                return DecodeStep::Corrupt(e);
            }
            let settings = SettingsConfig {
                days_until_regen: buf.peek(3),
                regen_day_override: buf.peek(4),
                reserve_capacity_percent: buf.peek(5),
                resin_capacity_raw: buf.peek_u16_be(6),
                prefill_enabled: buf.peek(8) != 0,
                prefill_duration_hours: buf.peek(9),
                soak_duration_hours: buf.peek(10).max(1),
                prefill_soak_mode: buf.peek(11) != 0,
                rental_unit: buf.peek(12) != RENTAL_UNIT_SENTINEL,
                rental_regen_disabled: buf.peek(13) == 0x01,
                air_recharge_frequency_days: buf.peek(14),
                flags: StatusFlags(buf.peek(16)),
            };
            DecodeStep::Decoded {
                packet: Packet::SettingsConfig(settings),
                consumed: SETTINGS_LEN,
            }
        }
        1 => {
            if let Err(e) =
                check_end_marker(buf, "settings-1", END_MARKER_OFFSET, SETTINGS_CYCLE_END_MARKER)
            {
                return DecodeStep::Corrupt(e);
            }
            let mut cycle = CycleTimes::default();
            for (i, position) in cycle.positions.iter_mut().enumerate() {
                *position = CyclePosition::from_byte(buf.peek(3 + i));
            }
            DecodeStep::Decoded {
                packet: Packet::CycleTimes(cycle),
                consumed: SETTINGS_LEN,
            }
        }
        sequence => DecodeStep::Decoded {
            packet: Packet::Skipped {
                tag: TAG_SETTINGS,
                sequence,
            },
            consumed: SETTINGS_LEN,
        },
    }
}

/// Decodes a statistics packet (`ww`). Sub-sequence 0 is 19 bytes, the rest 20.
pub fn decode_statistics<const N: usize>(buf: &RingBuffer<N>) -> DecodeStep {
    let Some(sequence) = buf.get(SEQUENCE_OFFSET) else {
        return DecodeStep::Incomplete;
    };
    match sequence {
        0 => {
            if buf.len() < STATISTICS_TOTALS_LEN {
                return DecodeStep::Incomplete;
            }
            if let Err(e) = check_end_marker(
                buf,
                "statistics-0",
                STATISTICS_TOTALS_END_MARKER_OFFSET,
                STATISTICS_TOTALS_END_MARKER,
            ) {
                return DecodeStep::Corrupt(e);
            }
            let totals = StatisticsTotals {
                current_flow_raw: buf.peek_u16_be(3),
                total_gallons: buf.peek_u24_be(5),
                total_gallons_resettable: buf.peek_u24_be(8),
                total_regens: buf.peek_u16_be(11),
                total_regens_resettable: buf.peek_u16_be(13),
            };
            DecodeStep::Decoded {
                packet: Packet::StatisticsTotals(totals),
                consumed: STATISTICS_TOTALS_LEN,
            }
        }
        1 => {
            if buf.len() < STATISTICS_HISTORY_LEN {
                return DecodeStep::Incomplete;
            }
            let gallons = (0..HISTORY_HEADED_ENTRIES)
                .map(|i| u16::from(buf.peek(3 + i)) * HISTORY_GALLONS_SCALE)
                .collect();
            DecodeStep::Decoded {
                packet: Packet::UsageFragment(UsageFragment {
                    start_index: 0,
                    gallons,
                    last: false,
                }),
                consumed: STATISTICS_HISTORY_LEN,
            }
        }
        sequence => {
            if buf.len() < STATISTICS_SKIP_LEN {
                return DecodeStep::Incomplete;
            }
            DecodeStep::Decoded {
                packet: Packet::Skipped {
                    tag: TAG_STATISTICS,
                    sequence,
                },
                consumed: STATISTICS_SKIP_LEN,
            }
        }
    }
}

/// Decodes a keepalive (`xx`). Sub-sequence 0 is 6 bytes, the rest 4.
pub fn decode_keepalive<const N: usize>(buf: &RingBuffer<N>) -> DecodeStep {
    let Some(sequence) = buf.get(SEQUENCE_OFFSET) else {
        return DecodeStep::Incomplete;
    };
    let len = if sequence == 0 {
        KEEPALIVE_FIRST_LEN
    } else {
        KEEPALIVE_LEN
    };
    if buf.len() < len {
        return DecodeStep::Incomplete;
    }
    DecodeStep::Decoded {
        packet: Packet::Keepalive { sequence },
        consumed: len,
    }
}

/// Decodes the headerless history fragment `continuation` expects.
pub fn decode_history_fragment<const N: usize>(
    buf: &RingBuffer<N>,
    continuation: HistoryContinuation,
) -> DecodeStep {
    let (Some(len), Some(start_index)) = (continuation.expected_len(), continuation.start_index())
    else {
        return DecodeStep::Incomplete;
    };
    if buf.len() < len {
        return DecodeStep::Incomplete;
    }
    let gallons = (0..continuation.entry_count())
        .map(|i| u16::from(buf.peek(i)) * HISTORY_GALLONS_SCALE)
        .collect();
    DecodeStep::Decoded {
        packet: Packet::UsageFragment(UsageFragment {
            start_index,
            gallons,
            last: continuation.is_last(),
        }),
        consumed: len,
    }
}
