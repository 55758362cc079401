//! Core library for the Brinewire deterministic simulator.
//!
//! Couples a [`SoftenerEngine`] on a [`MockClock`] to a simulated controller
//! ([`SimDevice`]) through a link that re-chunks and optionally corrupts
//! notifications ([`LossyLink`]). Every random choice flows from
//! [`SimConfig::seed`], so a failing run is reproduced by its seed alone.

pub mod device;
pub mod link;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use brinewire::time::Clock;
use brinewire::{
    Command, CommandError, CommandFrame, ConfigError, EngineConfig, EngineStats, MockClock,
    Password, Reading, ReadingKind, SoftenerEngine, Transport, TransportError, metrics,
};

pub use device::{ExpectedReadings, Response, SimDevice};
pub use link::LossyLink;

/// Tolerance when comparing published values with the device's state.
const VALUE_EPSILON: f64 = 1e-6;

/// Configuration for a simulation scenario.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: u64,
    /// Complete poll cycles to run.
    pub num_cycles: usize,
    /// Whether the device asks for authentication.
    pub locked: bool,
    /// Password the engine answers with.
    pub password: u16,
    /// Password the device checks against; `None` means the same as `password`.
    pub device_password: Option<u16>,
    /// Largest notification chunk.
    pub max_chunk: usize,
    pub bit_flip_probability: f64,
    /// Chance that a status response carries a status-history packet and tail.
    pub history_tail_probability: f64,
    /// Chance of issuing a user command after each completed cycle.
    pub command_probability: f64,
    /// Drop and re-establish the link after every this many cycles.
    pub reconnect_every: Option<usize>,
    pub poll_interval_ms: u64,
    pub keepalive_interval_ms: u64,
    pub tick_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_cycles: 3,
            locked: true,
            password: 1234,
            device_password: None,
            max_chunk: 20,
            bit_flip_probability: 0.0,
            history_tail_probability: 0.25,
            command_probability: 0.0,
            reconnect_every: None,
            poll_interval_ms: 2_000,
            keepalive_interval_ms: 700,
            tick_ms: 5,
        }
    }
}

/// Errors that can occur during a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("command failed: {0}")]
    Command(#[from] CommandError),
    #[error("device rejected authentication reply (attempt {attempts})")]
    AuthRejected { attempts: u64 },
    #[error("no progress after {cycles_completed} cycles ({elapsed:?} simulated)")]
    Stalled {
        cycles_completed: usize,
        elapsed: Duration,
    },
    #[error("cycle {cycle}: no {kind:?} reading published")]
    MissingReading { cycle: usize, kind: ReadingKind },
    #[error("cycle {cycle}: {kind:?} expected {expected}, got {actual}")]
    Mismatch {
        cycle: usize,
        kind: ReadingKind,
        expected: f64,
        actual: f64,
    },
    #[error("{kind:?} published non-finite value {value}")]
    NonFinite { kind: ReadingKind, value: f64 },
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimReport {
    pub cycles: usize,
    pub reconnects: u64,
    pub auth_rejections: u64,
    pub commands_sent: u64,
    pub readings: u64,
    pub bits_flipped: u64,
    pub engine: EngineStats,
}

/// Transport that queues frames for the simulated device.
#[derive(Debug, Default)]
struct Outbox {
    frames: Vec<CommandFrame>,
}

impl Transport for Outbox {
    fn write(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        self.frames.push(*frame);
        Ok(())
    }
}

/// Orchestrates a single deterministic simulation run.
pub struct Simulator {
    config: SimConfig,
    mock_clock: Arc<MockClock>,
    started_at: Instant,
    engine: SoftenerEngine,
    device: SimDevice,
    link: LossyLink,
    command_rng: StdRng,
    outbox: Outbox,
    cycle_readings: Vec<Reading>,
    cycles_completed: usize,
    last_progress: Instant,
    last_reconnect_cycle: usize,
    reconnects: u64,
    auth_rejections: u64,
    commands_sent: u64,
    readings: u64,
}

impl Simulator {
    /// Creates a simulation instance.
    ///
    /// # Parameters
    /// - `config`: Complete simulation configuration
    ///
    /// # Errors
    /// - [`SimError::Config`] - A password is out of range or an interval is zero
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let initial_time = Instant::now();
        let started_at = initial_time
            .checked_add(Duration::from_nanos(config.seed % 1_000_000))
            .unwrap_or(initial_time);
        let mock_clock = Arc::new(MockClock::new(started_at));

        let engine_config = EngineConfig {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            keepalive_interval: Duration::from_millis(config.keepalive_interval_ms),
            ..EngineConfig::default()
        }
        .with_password(Password::new(config.password)?);
        let engine = SoftenerEngine::with_rng(
            engine_config,
            mock_clock.clone(),
            Box::new(StdRng::seed_from_u64(config.seed.wrapping_add(2))),
        )?;

        let device_password = Password::new(config.device_password.unwrap_or(config.password))?;
        let device = SimDevice::new(
            StdRng::seed_from_u64(config.seed),
            device_password,
            config.locked,
            config.history_tail_probability.clamp(0.0, 1.0),
        );
        let link = LossyLink::new(
            StdRng::seed_from_u64(config.seed.wrapping_add(1)),
            config.max_chunk,
            config.bit_flip_probability.clamp(0.0, 1.0),
        );

        Ok(Self {
            command_rng: StdRng::seed_from_u64(config.seed.wrapping_add(3)),
            config,
            mock_clock,
            started_at,
            engine,
            device,
            link,
            outbox: Outbox::default(),
            cycle_readings: Vec::new(),
            cycles_completed: 0,
            last_progress: started_at,
            last_reconnect_cycle: 0,
            reconnects: 0,
            auth_rejections: 0,
            commands_sent: 0,
            readings: 0,
        })
    }

    /// The engine under test.
    pub fn engine(&self) -> &SoftenerEngine {
        &self.engine
    }

    pub fn device(&self) -> &SimDevice {
        &self.device
    }

    /// Runs the simulation until the configured number of poll cycles completes.
    ///
    /// On a clean link every completed cycle is checked against the device's state.
    /// A corrupting link only requires that the engine keeps making progress and
    /// publishes finite values; stalls there are answered with a reconnect.
    ///
    /// # Returns
    /// A [`SimReport`] for the run.
    ///
    /// # Errors
    /// - [`SimError::AuthRejected`] - Device refused the reply on a clean link
    /// - [`SimError::Stalled`] - No cycle completed within the time budget
    /// - [`SimError::MissingReading`] / [`SimError::Mismatch`] - Published values
    ///   disagree with the device
    /// - [`SimError::NonFinite`] - A numeric reading was NaN or infinite
    pub fn run(&mut self) -> Result<SimReport, SimError> {
        let tick = Duration::from_millis(self.config.tick_ms.max(1));
        let cycle_budget =
            Duration::from_millis(self.config.poll_interval_ms) + Duration::from_secs(1);
        let watchdog = cycle_budget * 2;
        let total_budget = cycle_budget * 4 * (self.config.num_cycles as u32 + 1);

        self.connect();
        loop {
            self.pump()?;
            if self.cycles_completed >= self.config.num_cycles {
                break;
            }

            let now = self.mock_clock.now();
            if now.duration_since(self.started_at) > total_budget {
                return Err(self.stalled(now));
            }
            if now.duration_since(self.last_progress) > watchdog {
                if !self.link.is_lossy() {
                    return Err(self.stalled(now));
                }
                self.reconnect();
                continue;
            }
            if let Some(every) = self.config.reconnect_every.filter(|&n| n > 0) {
                if self.cycles_completed > 0
                    && self.cycles_completed % every == 0
                    && self.last_reconnect_cycle != self.cycles_completed
                {
                    self.last_reconnect_cycle = self.cycles_completed;
                    self.reconnect();
                    continue;
                }
            }

            self.mock_clock.advance(tick);
            self.engine.tick(&mut self.outbox);
        }

        info!(
            seed = self.config.seed,
            cycles = self.cycles_completed,
            reconnects = self.reconnects,
            "simulation finished"
        );
        Ok(SimReport {
            cycles: self.cycles_completed,
            reconnects: self.reconnects,
            auth_rejections: self.auth_rejections,
            commands_sent: self.commands_sent,
            readings: self.readings,
            bits_flipped: self.link.bits_flipped(),
            engine: *self.engine.stats(),
        })
    }

    fn connect(&mut self) {
        self.engine.connected(&mut self.outbox);
        self.last_progress = self.mock_clock.now();
    }

    fn reconnect(&mut self) {
        debug!(cycles = self.cycles_completed, "dropping simulated link");
        self.engine.disconnected();
        self.device.disconnect();
        self.outbox.frames.clear();
        self.cycle_readings.clear();
        self.reconnects += 1;
        self.connect();
    }

    fn stalled(&self, now: Instant) -> SimError {
        SimError::Stalled {
            cycles_completed: self.cycles_completed,
            elapsed: now.duration_since(self.started_at),
        }
    }

    /// Delivers queued frames to the device and its answers back to the engine
    /// until neither side has anything left to send.
    fn pump(&mut self) -> Result<(), SimError> {
        while !self.outbox.frames.is_empty() {
            let frames = std::mem::take(&mut self.outbox.frames);
            for frame in frames {
                match self.device.respond(&frame) {
                    Response::Packets(packets) => self.deliver(&frame, &packets, None)?,
                    Response::PacketsWithTail(packets, tail) => {
                        self.deliver(&frame, &packets, Some(&tail))?
                    }
                    Response::AuthRejected => {
                        self.auth_rejections += 1;
                        if !self.link.is_lossy() {
                            return Err(SimError::AuthRejected {
                                attempts: self.auth_rejections,
                            });
                        }
                    }
                    Response::AuthAccepted | Response::Ignored => {}
                }
            }
        }
        Ok(())
    }

    /// Streams `packets` through the link, then hands over `tail` unsplit.
    fn deliver(
        &mut self,
        frame: &CommandFrame,
        packets: &[Bytes],
        tail: Option<&Bytes>,
    ) -> Result<(), SimError> {
        let stream: Vec<u8> = packets.iter().flat_map(|p| p.iter().copied()).collect();
        let mut chunks = self.link.transmit(&stream);
        if let Some(tail) = tail {
            chunks.push(self.link.corrupt(tail));
        }
        for chunk in chunks {
            let readings = self.engine.handle_notification(&chunk, &mut self.outbox);
            self.observe(readings)?;
        }
        if *frame == Command::StatisticsRequest.encode() {
            self.finish_cycle()?;
        }
        Ok(())
    }

    fn observe(&mut self, readings: Vec<Reading>) -> Result<(), SimError> {
        for reading in readings {
            if let Some(value) = reading.as_number().filter(|v| !v.is_finite()) {
                return Err(SimError::NonFinite {
                    kind: reading.kind,
                    value,
                });
            }
            self.readings += 1;
            self.cycle_readings.push(reading);
        }
        Ok(())
    }

    fn finish_cycle(&mut self) -> Result<(), SimError> {
        if !self.link.is_lossy() {
            self.verify_cycle()?;
        }
        debug!(cycle = self.cycles_completed, "poll cycle complete");
        self.cycle_readings.clear();
        self.cycles_completed += 1;
        self.last_progress = self.mock_clock.now();

        if self.command_rng.random_bool(self.config.command_probability.clamp(0.0, 1.0)) {
            match self.issue_command() {
                Ok(()) => self.commands_sent += 1,
                Err(e) if self.link.is_lossy() => debug!(error = %e, "command skipped"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn verify_cycle(&self) -> Result<(), SimError> {
        let expected = self.device.expected_readings();
        self.check_reading(ReadingKind::Hardness, expected.hardness)?;
        self.check_reading(ReadingKind::TotalGallons, expected.total_gallons)?;
        self.check_reading(ReadingKind::AverageDailyUsage, expected.average_daily_usage)?;
        self.check_reading(ReadingKind::ResinCapacity, expected.resin_capacity)?;
        if let Some(salt) = expected.salt_remaining {
            self.check_reading(ReadingKind::SaltRemaining, salt)?;
        }
        Ok(())
    }

    fn check_reading(&self, kind: ReadingKind, expected: f64) -> Result<(), SimError> {
        let cycle = self.cycles_completed;
        let actual = self
            .cycle_readings
            .iter()
            .rev()
            .find(|r| r.kind == kind)
            .and_then(Reading::as_number)
            .ok_or(SimError::MissingReading { cycle, kind })?;
        if (actual - expected).abs() > VALUE_EPSILON {
            return Err(SimError::Mismatch {
                cycle,
                kind,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Sends one user command the device applies to its state.
    fn issue_command(&mut self) -> Result<(), SimError> {
        match self.command_rng.random_range(0..4u8) {
            0 => {
                let grains_per_gallon = self.command_rng.random_range(1..=60);
                self.engine
                    .send_command(Command::SetHardness { grains_per_gallon }, &mut self.outbox)?;
            }
            1 => {
                let capacity = metrics::tank_capacity_lbs(&self.engine.session().brine);
                let pounds = self.command_rng.random_range(0.0..=capacity.max(0.0));
                self.engine.set_salt_level(pounds, &mut self.outbox)?;
            }
            2 => {
                let percent = self.command_rng.random_range(0..=49);
                self.engine
                    .send_command(Command::SetReserveCapacity { percent }, &mut self.outbox)?;
            }
            _ => {
                let on = self.command_rng.random_bool(0.5);
                self.engine
                    .send_command(Command::SetDisplay { on }, &mut self.outbox)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_password_rejected_at_construction() {
        let config = SimConfig {
            password: 10_000,
            ..Default::default()
        };
        assert!(matches!(
            Simulator::new(config),
            Err(SimError::Config(ConfigError::InvalidPassword(10_000)))
        ));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let config = SimConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(Simulator::new(config), Err(SimError::Config(_))));
    }
}
