//! Encoders for controller-side packets.
//!
//! These produce the exact byte layouts a controller notifies, so tests, benchmarks
//! and the simulator can feed the engine realistic traffic. They are the inverse of
//! the decoders in [`crate::packets::decoders`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{
    DAILY_HISTORY_LEN, HANDSHAKE_LEN, HISTORY_FRAGMENT_LEN, HISTORY_GALLONS_SCALE,
    HISTORY_HEADED_ENTRIES, KEEPALIVE_FIRST_LEN, KEEPALIVE_LEN, RENTAL_UNIT_SENTINEL,
    SETTINGS_CONFIG_END_MARKER, SETTINGS_CYCLE_END_MARKER, SETTINGS_LEN,
    STATISTICS_HISTORY_LEN, STATISTICS_TOTALS_END_MARKER, STATISTICS_TOTALS_LEN,
    STATUS_BRINE_END_MARKER, STATUS_LEN, STATUS_REALTIME_END_MARKER, TAG_HANDSHAKE,
    TAG_KEEPALIVE, TAG_SETTINGS, TAG_STATISTICS, TAG_STATUS,
};
use crate::packets::types::{
    BrineStatus, CycleTimes, Handshake, SettingsConfig, StatisticsTotals, StatusRealtime,
};

fn header(buf: &mut BytesMut, tag: u8, sequence: u8) {
    buf.put_u8(tag);
    buf.put_u8(tag);
    buf.put_u8(sequence);
}

fn finish(buf: BytesMut, len: usize) -> Bytes {
    debug_assert_eq!(buf.len(), len, "encoded packet has wrong length");
    buf.freeze()
}

/// Handshake (`tt`).
pub fn handshake(handshake: &Handshake) -> Bytes {
    let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
    header(&mut buf, TAG_HANDSHAKE, 0);
    buf.put_bytes(0, 2);
    buf.put_u8(handshake.firmware.major);
    buf.put_u8(handshake.firmware.minor);
    buf.put_u8(handshake.auth_flag);
    buf.put_bytes(0, 3);
    buf.put_u8(handshake.counter.value());
    buf.put_bytes(0, HANDSHAKE_LEN - 12);
    finish(buf, HANDSHAKE_LEN)
}

/// Status sub-sequence 0.
pub fn status_realtime(status: &StatusRealtime) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATUS_LEN);
    header(&mut buf, TAG_STATUS, 0);
    buf.put_u8(status.time.hour);
    buf.put_u8(status.time.minute);
    buf.put_u8(status.time.meridiem.to_byte());
    buf.put_u8(status.battery_code);
    buf.put_u16(status.current_flow_raw);
    buf.put_u16(status.soft_water_remaining);
    buf.put_u16(status.usage_today);
    buf.put_u16(status.peak_flow_raw);
    buf.put_u8(status.hardness_gpg);
    buf.put_u8(status.regen_hour);
    buf.put_u8(status.regen_meridiem.to_byte());
    buf.put_u8(status.flags.bits());
    buf.put_u8(STATUS_REALTIME_END_MARKER);
    finish(buf, STATUS_LEN)
}

/// Status sub-sequence 1.
pub fn brine_status(brine: &BrineStatus) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATUS_LEN);
    header(&mut buf, TAG_STATUS, 1);
    buf.put_u8(brine.filter_backwash_days);
    buf.put_u8(brine.air_recharge_days);
    buf.put_bytes(0, 3);
    buf.put_u8(u8::from(brine.regen_active));
    buf.put_bytes(0, 4);
    buf.put_u8(brine.tank.regens_remaining);
    buf.put_u8(brine.low_salt_alert);
    buf.put_u8(brine.tank.tank_type);
    buf.put_u8(brine.tank.fill_height);
    buf.put_u8(brine.tank.refill_minutes);
    buf.put_u8(0);
    buf.put_u8(STATUS_BRINE_END_MARKER);
    finish(buf, STATUS_LEN)
}

/// Status sub-sequence 2 and above. The payload is not interpreted.
pub fn status_history(sequence: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATUS_LEN);
    header(&mut buf, TAG_STATUS, sequence);
    buf.put_bytes(0, STATUS_LEN - 3);
    finish(buf, STATUS_LEN)
}

/// Settings sub-sequence 0.
pub fn settings_config(settings: &SettingsConfig) -> Bytes {
    let mut buf = BytesMut::with_capacity(SETTINGS_LEN);
    header(&mut buf, TAG_SETTINGS, 0);
    buf.put_u8(settings.days_until_regen);
    buf.put_u8(settings.regen_day_override);
    buf.put_u8(settings.reserve_capacity_percent);
    buf.put_u16(settings.resin_capacity_raw);
    buf.put_u8(u8::from(settings.prefill_enabled));
    buf.put_u8(settings.prefill_duration_hours);
    buf.put_u8(settings.soak_duration_hours);
    buf.put_u8(u8::from(settings.prefill_soak_mode));
    buf.put_u8(if settings.rental_unit {
        0
    } else {
        RENTAL_UNIT_SENTINEL
    });
    buf.put_u8(u8::from(settings.rental_regen_disabled));
    buf.put_u8(settings.air_recharge_frequency_days);
    buf.put_u8(0);
    buf.put_u8(settings.flags.bits());
    buf.put_bytes(0, 2);
    buf.put_u8(SETTINGS_CONFIG_END_MARKER);
    finish(buf, SETTINGS_LEN)
}

/// Settings sub-sequence 1.
pub fn cycle_times(cycle: &CycleTimes) -> Bytes {
    let mut buf = BytesMut::with_capacity(SETTINGS_LEN);
    header(&mut buf, TAG_SETTINGS, 1);
    for position in cycle.positions {
        buf.put_u8(position.to_byte());
    }
    buf.put_bytes(0, SETTINGS_LEN - 3 - cycle.positions.len() - 1);
    buf.put_u8(SETTINGS_CYCLE_END_MARKER);
    finish(buf, SETTINGS_LEN)
}

/// Statistics sub-sequence 0.
pub fn statistics_totals(totals: &StatisticsTotals) -> Bytes {
    let mut buf = BytesMut::with_capacity(STATISTICS_TOTALS_LEN);
    header(&mut buf, TAG_STATISTICS, 0);
    buf.put_u16(totals.current_flow_raw);
    buf.put_uint(u64::from(totals.total_gallons), 3);
    buf.put_uint(u64::from(totals.total_gallons_resettable), 3);
    buf.put_u16(totals.total_regens);
    buf.put_u16(totals.total_regens_resettable);
    buf.put_bytes(0, 3);
    buf.put_u8(STATISTICS_TOTALS_END_MARKER);
    finish(buf, STATISTICS_TOTALS_LEN)
}

fn history_byte(gallons: u16) -> u8 {
    (gallons / HISTORY_GALLONS_SCALE).min(u16::from(u8::MAX)) as u8
}

/// Statistics sub-sequence 1 followed by its three headerless fragments.
///
/// Values are stored in tens of gallons and saturate at 2550.
pub fn usage_history(entries: &[u16; DAILY_HISTORY_LEN]) -> [Bytes; 4] {
    let mut head = BytesMut::with_capacity(STATISTICS_HISTORY_LEN);
    header(&mut head, TAG_STATISTICS, 1);
    head.extend(entries[..HISTORY_HEADED_ENTRIES].iter().map(|&g| history_byte(g)));

    let fragment = |range: std::ops::Range<usize>, len: usize| {
        let mut buf = BytesMut::with_capacity(len);
        buf.extend(entries[range].iter().map(|&g| history_byte(g)));
        buf.put_bytes(0, len - buf.len());
        buf.freeze()
    };
    let second = HISTORY_HEADED_ENTRIES + HISTORY_FRAGMENT_LEN;
    let third = second + HISTORY_FRAGMENT_LEN;

    [
        finish(head, STATISTICS_HISTORY_LEN),
        fragment(HISTORY_HEADED_ENTRIES..second, HISTORY_FRAGMENT_LEN),
        fragment(second..third, HISTORY_FRAGMENT_LEN),
        // Five values plus the trailer byte.
        fragment(third..DAILY_HISTORY_LEN, DAILY_HISTORY_LEN - third + 1),
    ]
}

/// Keepalive (`xx`).
pub fn keepalive(sequence: u8) -> Bytes {
    let len = if sequence == 0 {
        KEEPALIVE_FIRST_LEN
    } else {
        KEEPALIVE_LEN
    };
    let mut buf = BytesMut::with_capacity(len);
    header(&mut buf, TAG_KEEPALIVE, sequence);
    buf.put_bytes(0, len - 3);
    finish(buf, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryContinuation;
    use crate::packets::types::{ClockTime, Meridiem, Packet, StatusFlags};
    use crate::packets::{Dispatch, dispatch_next};
    use crate::ring_buffer::RingBuffer;

    fn decode_all(chunks: &[Bytes]) -> Vec<Packet> {
        let mut buf: RingBuffer<256> = RingBuffer::new();
        let mut cont = HistoryContinuation::Idle;
        let mut out = Vec::new();
        for chunk in chunks {
            buf.append(chunk);
            loop {
                match dispatch_next(&mut buf, &mut cont) {
                    Dispatch::NeedMoreData => break,
                    Dispatch::Packet(p) => out.push(p),
                    Dispatch::Dropped(e) => panic!("unexpected drop: {e}"),
                }
            }
        }
        out
    }

    #[test]
    fn status_realtime_decodes_back() {
        let status = StatusRealtime {
            time: ClockTime {
                hour: 7,
                minute: 45,
                meridiem: Meridiem::Am,
            },
            battery_code: 2,
            current_flow_raw: 150,
            soft_water_remaining: 420,
            usage_today: 35,
            peak_flow_raw: 500,
            hardness_gpg: 22,
            regen_hour: 2,
            regen_meridiem: Meridiem::Am,
            flags: StatusFlags(StatusFlags::BYPASS_ENABLED),
        };
        assert_eq!(
            decode_all(&[status_realtime(&status)]),
            vec![Packet::StatusRealtime(status)]
        );
    }

    #[test]
    fn lengths_match_wire() {
        assert_eq!(status_history(4).len(), 20);
        assert_eq!(keepalive(0).len(), 6);
        assert_eq!(keepalive(9).len(), 4);
        let [head, f1, f2, f3] = usage_history(&[0; DAILY_HISTORY_LEN]);
        assert_eq!(
            (head.len(), f1.len(), f2.len(), f3.len()),
            (20, 20, 20, 6)
        );
    }

    #[test]
    fn usage_history_decodes_back() {
        let mut entries = [0u16; DAILY_HISTORY_LEN];
        for (i, e) in entries.iter_mut().enumerate() {
            *e = (i as u16 % 50) * 10;
        }
        let packets = decode_all(&usage_history(&entries));
        let mut rebuilt = Vec::new();
        for packet in packets {
            let Packet::UsageFragment(f) = packet else {
                panic!("expected fragment, got {packet:?}");
            };
            rebuilt.extend(f.gallons);
        }
        assert_eq!(rebuilt, entries.to_vec());
    }
}
