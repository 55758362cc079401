//! Shared helpers for brinewire integration tests.
//!
//! Provides a recording transport, engines on a mock clock and sample controller
//! packets encoded with the peripheral encoders.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;

use brinewire::packets::{
    BrineStatus, ClockTime, CyclePosition, CycleTimes, Handshake, Meridiem, SettingsConfig,
    StatisticsTotals, StatusFlags, StatusRealtime,
};
use brinewire::{
    BrineTankConfig, Command, CommandFrame, ConnectionCounter, EngineConfig, FirmwareVersion,
    MockClock, Reading, ReadingKind, SoftenerEngine, Transport, TransportError, peripheral,
};

/// Transport that records every frame and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub frames: Vec<CommandFrame>,
    pub fail_writes: bool,
}

impl Transport for RecordingTransport {
    fn write(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::WriteFailed {
                reason: "test link down".to_string(),
            });
        }
        self.frames.push(*frame);
        Ok(())
    }
}

impl RecordingTransport {
    /// Removes and returns everything written so far.
    pub fn take(&mut self) -> Vec<CommandFrame> {
        std::mem::take(&mut self.frames)
    }

    /// Number of recorded frames equal to `command`'s encoding.
    pub fn count(&self, command: Command) -> usize {
        let frame = command.encode();
        self.frames.iter().filter(|f| **f == frame).count()
    }
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Engine with default configuration on a mock clock and a seeded RNG.
pub fn test_engine() -> (SoftenerEngine, Arc<MockClock>) {
    test_engine_with(EngineConfig::default())
}

pub fn test_engine_with(config: EngineConfig) -> (SoftenerEngine, Arc<MockClock>) {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let engine = SoftenerEngine::with_rng(config, clock.clone(), Box::new(StdRng::seed_from_u64(42)))
        .expect("default test config is valid");
    (engine, clock)
}

/// Handshake from firmware that needs no authentication.
pub fn open_handshake() -> Bytes {
    peripheral::handshake(&Handshake {
        firmware: FirmwareVersion::new(6, 3),
        auth_flag: 0,
        counter: ConnectionCounter::new(0x21),
    })
}

/// Handshake that requires the authentication reply.
pub fn locked_handshake() -> Bytes {
    peripheral::handshake(&Handshake {
        firmware: FirmwareVersion::new(5, 12),
        auth_flag: 0x80,
        counter: ConnectionCounter::new(0x42),
    })
}

/// Engine that has accepted an open handshake and written its first status request.
/// The transport is emptied before returning.
pub fn authenticated_engine() -> (SoftenerEngine, Arc<MockClock>, RecordingTransport) {
    let (mut engine, clock) = test_engine();
    let mut link = RecordingTransport::default();
    engine.connected(&mut link);
    engine.handle_notification(&open_handshake(), &mut link);
    engine.tick(&mut link);
    link.take();
    (engine, clock, link)
}

pub fn sample_status() -> StatusRealtime {
    StatusRealtime {
        time: ClockTime {
            hour: 10,
            minute: 30,
            meridiem: Meridiem::Pm,
        },
        battery_code: 1,
        current_flow_raw: 300,
        soft_water_remaining: 1000,
        usage_today: 150,
        peak_flow_raw: 600,
        hardness_gpg: 18,
        regen_hour: 2,
        regen_meridiem: Meridiem::Am,
        flags: StatusFlags(StatusFlags::SHUTOFF_ENABLED | StatusFlags::DISPLAY_OFF),
    }
}

pub fn sample_tank() -> BrineTankConfig {
    BrineTankConfig {
        tank_type: 18,
        fill_height: 30,
        refill_minutes: 10,
        regens_remaining: 12,
    }
}

pub fn sample_brine() -> BrineStatus {
    BrineStatus {
        filter_backwash_days: 12,
        air_recharge_days: 3,
        regen_active: false,
        low_salt_alert: 2,
        tank: sample_tank(),
    }
}

pub fn sample_settings() -> SettingsConfig {
    SettingsConfig {
        days_until_regen: 4,
        regen_day_override: 14,
        reserve_capacity_percent: 30,
        resin_capacity_raw: 32,
        prefill_enabled: true,
        prefill_duration_hours: 3,
        soak_duration_hours: 2,
        prefill_soak_mode: false,
        rental_unit: false,
        rental_regen_disabled: false,
        air_recharge_frequency_days: 7,
        flags: StatusFlags(StatusFlags::SHUTOFF_ENABLED),
    }
}

pub fn sample_cycle() -> CycleTimes {
    let mut cycle = CycleTimes::default();
    for (i, byte) in [0x8A, 60, 6, 12, 0, 0, 0, 0].into_iter().enumerate() {
        cycle.positions[i] = CyclePosition::from_byte(byte);
    }
    cycle
}

pub fn sample_totals() -> StatisticsTotals {
    StatisticsTotals {
        current_flow_raw: 300,
        total_gallons: 123_456,
        total_gallons_resettable: 10_000,
        total_regens: 300,
        total_regens_resettable: 5,
    }
}

/// Daily history with every entry set to `gallons`.
pub fn flat_history(gallons: u16) -> [u16; 62] {
    [gallons; 62]
}

/// The full controller response to one poll cycle, in wire order.
pub fn poll_cycle_response(history: &[u16; 62]) -> Vec<Bytes> {
    let mut packets = vec![
        peripheral::status_realtime(&sample_status()),
        peripheral::brine_status(&sample_brine()),
        peripheral::settings_config(&sample_settings()),
        peripheral::cycle_times(&sample_cycle()),
        peripheral::statistics_totals(&sample_totals()),
    ];
    packets.extend(peripheral::usage_history(history));
    packets
}

/// First reading of `kind`, if any.
pub fn find(readings: &[Reading], kind: ReadingKind) -> Option<&Reading> {
    readings.iter().find(|r| r.kind == kind)
}

/// Numeric value of the first reading of `kind`.
pub fn number(readings: &[Reading], kind: ReadingKind) -> Option<f64> {
    find(readings, kind).and_then(Reading::as_number)
}

/// Feeds every packet to the engine and collects all readings.
pub fn feed(
    engine: &mut SoftenerEngine,
    link: &mut RecordingTransport,
    packets: &[Bytes],
) -> Vec<Reading> {
    packets
        .iter()
        .flat_map(|p| engine.handle_notification(p, link))
        .collect()
}
