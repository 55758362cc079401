//! Simulated softener controller.
//!
//! Answers the engine's handshake, authentication, poll and keepalive frames with
//! packets built by `brinewire::peripheral`, and applies the user commands the
//! simulator exercises.

use bytes::Bytes;
use rand::Rng;
use rand::rngs::StdRng;

use brinewire::auth::{ChallengeDraws, FILLER_LEN, build_auth_packet, is_auth_packet};
use brinewire::constants::{
    COMMAND_LEN, COMMAND_PAYLOAD_OFFSET, DAILY_HISTORY_LEN, TAG_SETTINGS, TAG_STATUS,
};
use brinewire::metrics;
use brinewire::packets::{
    BrineStatus, ClockTime, CyclePosition, CycleTimes, Handshake, Meridiem, SettingsConfig,
    StatisticsTotals, StatusFlags, StatusRealtime,
};
use brinewire::{
    BrineTankConfig, Command, CommandFrame, ConnectionCounter, FirmwareVersion, Password,
    peripheral,
};

/// Largest daily usage the device reports. Higher values would put a tag byte into
/// the headerless history fragments.
pub const MAX_SIM_DAILY_GALLONS: u16 = 1150;

/// Shortest headerless status tail. A single stray byte would wait in the receive
/// buffer for a second header byte instead of being discarded.
pub const MIN_TAIL_LEN: usize = 2;
/// Longest headerless status tail; it always fits one notification.
pub const MAX_TAIL_LEN: usize = 12;

const TANK_DIAMETERS: [u8; 4] = [16, 18, 24, 30];

/// What the device did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Packets to notify, in wire order.
    Packets(Vec<Bytes>),
    /// Packets followed by a headerless tail the controller sends as one notification.
    PacketsWithTail(Vec<Bytes>, Bytes),
    AuthAccepted,
    AuthRejected,
    /// Frame was not answered.
    Ignored,
}

/// Values the engine should publish after a complete poll cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedReadings {
    pub hardness: f64,
    pub total_gallons: f64,
    pub average_daily_usage: f64,
    pub resin_capacity: f64,
    pub salt_remaining: Option<f64>,
}

/// Controller state and protocol behaviour.
#[derive(Debug)]
pub struct SimDevice {
    rng: StdRng,
    password: Password,
    firmware: FirmwareVersion,
    auth_flag: u8,
    counter: ConnectionCounter,
    unlocked: bool,
    keepalive_sequence: u8,
    history_tail_probability: f64,
    status: StatusRealtime,
    brine: BrineStatus,
    settings: SettingsConfig,
    cycle: CycleTimes,
    totals: StatisticsTotals,
    history: [u16; DAILY_HISTORY_LEN],
}

impl SimDevice {
    /// Creates a device with randomised but plausible state.
    ///
    /// # Parameters
    /// - `rng`: Source for the initial state and per-cycle drift.
    /// - `password`: Password the device checks authentication replies against.
    /// - `locked`: Whether the handshake asks for authentication.
    /// - `history_tail_probability`: Chance of appending a status-history packet and
    ///   headerless tail to a status response.
    pub fn new(
        mut rng: StdRng,
        password: Password,
        locked: bool,
        history_tail_probability: f64,
    ) -> Self {
        let firmware = if locked {
            FirmwareVersion::new(rng.random_range(1..=5), rng.random_range(0..=20))
        } else {
            FirmwareVersion::new(rng.random_range(6..=9), rng.random_range(0..=20))
        };
        let tank = random_tank(&mut rng);
        let status = StatusRealtime {
            time: random_time(&mut rng),
            battery_code: rng.random_range(1..=4),
            current_flow_raw: rng.random_range(0..=1500),
            soft_water_remaining: rng.random_range(0..=5000),
            usage_today: rng.random_range(0..=900),
            peak_flow_raw: rng.random_range(0..=2000),
            hardness_gpg: rng.random_range(1..=40),
            regen_hour: rng.random_range(1..=12),
            regen_meridiem: random_meridiem(&mut rng),
            flags: StatusFlags(rng.random()),
        };
        let brine = BrineStatus {
            filter_backwash_days: rng.random_range(0..=60),
            air_recharge_days: rng.random_range(0..=14),
            regen_active: false,
            low_salt_alert: rng.random_range(1..=10),
            tank,
        };
        let settings = SettingsConfig {
            days_until_regen: rng.random_range(0..=14),
            regen_day_override: rng.random_range(0..=30),
            reserve_capacity_percent: rng.random_range(0..=49),
            resin_capacity_raw: rng.random_range(16..=64),
            prefill_enabled: rng.random_bool(0.5),
            prefill_duration_hours: rng.random_range(1..=4),
            soak_duration_hours: rng.random_range(1..=4),
            prefill_soak_mode: rng.random_bool(0.5),
            rental_unit: rng.random_bool(0.1),
            rental_regen_disabled: false,
            air_recharge_frequency_days: rng.random_range(0..=7),
            flags: StatusFlags(rng.random()),
        };
        let mut cycle = CycleTimes::default();
        for position in cycle.positions.iter_mut().take(4) {
            let fixed = if rng.random_bool(0.2) { 0x80 } else { 0 };
            *position = CyclePosition::from_byte(rng.random_range(1..=90u8) | fixed);
        }
        let totals = StatisticsTotals {
            current_flow_raw: status.current_flow_raw,
            total_gallons: rng.random_range(0..=1_000_000),
            total_gallons_resettable: rng.random_range(0..=50_000),
            total_regens: rng.random_range(0..=2000),
            total_regens_resettable: rng.random_range(0..=100),
        };
        let history =
            std::array::from_fn(|_| rng.random_range(0..=MAX_SIM_DAILY_GALLONS / 10) * 10);

        Self {
            counter: ConnectionCounter::new(rng.random()),
            rng,
            password,
            firmware,
            auth_flag: if locked { 0x80 } else { 0 },
            unlocked: false,
            keepalive_sequence: 0,
            history_tail_probability,
            status,
            brine,
            settings,
            cycle,
            totals,
            history,
        }
    }

    /// Whether the device expects an authentication reply.
    pub fn requires_auth(&self) -> bool {
        self.firmware.requires_auth(self.auth_flag)
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn tank(&self) -> BrineTankConfig {
        self.brine.tank
    }

    /// Drops the link: relocks and picks a new connection counter.
    pub fn disconnect(&mut self) {
        self.unlocked = false;
        self.keepalive_sequence = 0;
        self.counter = ConnectionCounter::new(self.rng.random());
    }

    /// Handles one frame written by the engine.
    pub fn respond(&mut self, frame: &CommandFrame) -> Response {
        let bytes = frame.as_bytes();
        if is_auth_packet(bytes) {
            return self.check_auth(bytes);
        }
        if *frame == Command::HandshakeRequest.encode() {
            if !self.requires_auth() {
                self.unlocked = true;
            }
            return Response::Packets(vec![peripheral::handshake(&Handshake {
                firmware: self.firmware,
                auth_flag: self.auth_flag,
                counter: self.counter,
            })]);
        }
        if !self.unlocked {
            return Response::Ignored;
        }

        if *frame == Command::StatusRequest.encode() {
            self.drift();
            let mut packets = vec![
                peripheral::status_realtime(&self.status),
                peripheral::brine_status(&self.brine),
            ];
            if self.rng.random_bool(self.history_tail_probability) {
                packets.push(peripheral::status_history(self.rng.random_range(2..=4)));
                let tail_len = self.rng.random_range(MIN_TAIL_LEN..=MAX_TAIL_LEN);
                return Response::PacketsWithTail(packets, Bytes::from(vec![0u8; tail_len]));
            }
            Response::Packets(packets)
        } else if *frame == Command::SettingsRequest.encode() {
            Response::Packets(vec![
                peripheral::settings_config(&self.settings),
                peripheral::cycle_times(&self.cycle),
            ])
        } else if *frame == Command::StatisticsRequest.encode() {
            let mut packets = vec![peripheral::statistics_totals(&self.totals)];
            packets.extend(peripheral::usage_history(&self.history));
            Response::Packets(packets)
        } else if *frame == Command::Keepalive.encode() {
            let packet = peripheral::keepalive(self.keepalive_sequence);
            self.keepalive_sequence = self.keepalive_sequence.wrapping_add(1);
            Response::Packets(vec![packet])
        } else {
            self.apply_control(bytes);
            Response::Ignored
        }
    }

    /// Readings a correct engine publishes for the device's current state.
    pub fn expected_readings(&self) -> ExpectedReadings {
        let tank = &self.brine.tank;
        ExpectedReadings {
            hardness: f64::from(self.status.hardness_gpg),
            total_gallons: f64::from(self.totals.total_gallons),
            average_daily_usage: metrics::average_daily_usage(&self.history),
            resin_capacity: f64::from(self.settings.resin_capacity_grains()),
            salt_remaining: tank.is_configured().then(|| metrics::salt_remaining_lbs(tank)),
        }
    }

    fn check_auth(&mut self, bytes: &[u8; COMMAND_LEN]) -> Response {
        let mut filler = [0u8; FILLER_LEN];
        filler.copy_from_slice(&bytes[COMMAND_LEN - FILLER_LEN..]);
        let draws = ChallengeDraws {
            polynomial: bytes[4],
            seed: bytes[5],
            second: bytes[6] ^ bytes[5],
            filler,
        };
        let expected = build_auth_packet(self.password, self.counter, &draws);
        if expected.as_bytes() == bytes {
            self.unlocked = true;
            Response::AuthAccepted
        } else {
            Response::AuthRejected
        }
    }

    /// Usage accumulates between polls; nothing else moves.
    fn drift(&mut self) {
        let used = self.rng.random_range(0..=50u16);
        self.status.usage_today = self.status.usage_today.saturating_add(used).min(4000);
        self.totals.total_gallons += u32::from(used);
        self.totals.total_gallons_resettable += u32::from(used);
    }

    fn apply_control(&mut self, bytes: &[u8; COMMAND_LEN]) {
        let payload = &bytes[COMMAND_PAYLOAD_OFFSET..];
        match (bytes[0], payload[0]) {
            (TAG_STATUS, b'H') => self.status.hardness_gpg = payload[1],
            (TAG_STATUS, b'S') => {
                self.brine.tank.regens_remaining = payload[1];
                self.brine.tank.tank_type = payload[3];
                self.brine.tank.fill_height = payload[4];
            }
            (TAG_STATUS, b'R') if payload[1] == b'N' => self.brine.regen_active = true,
            (TAG_SETTINGS, b'B') => self.settings.reserve_capacity_percent = payload[1],
            _ => {}
        }
    }
}

fn random_meridiem(rng: &mut StdRng) -> Meridiem {
    if rng.random_bool(0.5) { Meridiem::Pm } else { Meridiem::Am }
}

fn random_time(rng: &mut StdRng) -> ClockTime {
    ClockTime {
        hour: rng.random_range(1..=12),
        minute: rng.random_range(0..=59),
        meridiem: random_meridiem(rng),
    }
}

/// A configured tank holding no more salt than it can fit.
fn random_tank(rng: &mut StdRng) -> BrineTankConfig {
    let mut tank = BrineTankConfig {
        tank_type: TANK_DIAMETERS[rng.random_range(0..TANK_DIAMETERS.len())],
        fill_height: rng.random_range(10..=40),
        refill_minutes: rng.random_range(5..=15),
        regens_remaining: 0,
    };
    let max_regens = (metrics::tank_capacity_lbs(&tank) / metrics::salt_per_regen_lbs(&tank)) as u8;
    tank.regens_remaining = rng.random_range(0..=max_regens.min(99));
    tank
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn device(locked: bool) -> SimDevice {
        SimDevice::new(StdRng::seed_from_u64(7), Password::default(), locked, 0.0)
    }

    #[test]
    fn locked_device_ignores_polls_until_authenticated() {
        let mut dev = device(true);
        assert!(matches!(
            dev.respond(&Command::HandshakeRequest.encode()),
            Response::Packets(p) if p.len() == 1
        ));
        assert_eq!(dev.respond(&Command::StatusRequest.encode()), Response::Ignored);

        let draws = ChallengeDraws {
            polynomial: 0x1D,
            seed: 0x11,
            second: 0x22,
            filler: [3; FILLER_LEN],
        };
        let reply = build_auth_packet(Password::default(), dev.counter, &draws);
        assert_eq!(dev.respond(&reply), Response::AuthAccepted);
        assert!(matches!(
            dev.respond(&Command::StatusRequest.encode()),
            Response::Packets(p) if p.len() == 2
        ));
    }

    #[test]
    fn wrong_password_rejected() {
        let mut dev = device(true);
        let draws = ChallengeDraws {
            polynomial: 0x1D,
            seed: 0x11,
            second: 0x22,
            filler: [3; FILLER_LEN],
        };
        let reply = build_auth_packet(Password::new(9).unwrap(), dev.counter, &draws);
        assert_eq!(dev.respond(&reply), Response::AuthRejected);
        assert!(!dev.is_unlocked());
    }

    #[test]
    fn history_tail_is_one_whole_notification() {
        let mut dev = SimDevice::new(StdRng::seed_from_u64(7), Password::default(), false, 1.0);
        dev.respond(&Command::HandshakeRequest.encode());
        match dev.respond(&Command::StatusRequest.encode()) {
            Response::PacketsWithTail(packets, tail) => {
                assert_eq!(packets.len(), 3);
                assert!((MIN_TAIL_LEN..=MAX_TAIL_LEN).contains(&tail.len()));
                assert!(tail.iter().all(|&b| b == 0));
            }
            other => panic!("expected a status response with tail, got {other:?}"),
        }
    }

    #[test]
    fn history_stays_below_tag_values() {
        let dev = device(false);
        assert!(dev.history.iter().all(|&g| g <= MAX_SIM_DAILY_GALLONS));
        let tank = dev.tank();
        assert!(metrics::salt_remaining_lbs(&tank) <= metrics::tank_capacity_lbs(&tank));
    }

    #[test]
    fn hardness_command_applied() {
        let mut dev = device(false);
        dev.respond(&Command::HandshakeRequest.encode());
        dev.respond(&Command::SetHardness { grains_per_gallon: 33 }.encode());
        assert_eq!(dev.expected_readings().hardness, 33.0);
    }
}
