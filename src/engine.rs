//! The softener protocol engine.
//!
//! [`SoftenerEngine`] owns everything one controller connection needs: the receive
//! buffer, the session, the poll sequencer, the plausibility guards and the
//! registered reading sinks. It is driven by four inputs (connect, disconnect,
//! inbound notification and a periodic tick) and never blocks; every protocol delay
//! is a deferred transition compared against the injected [`Clock`] on later ticks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::auth::{ChallengeDraws, build_auth_packet};
use crate::commands::{Command, CommandFrame};
use crate::config::EngineConfig;
use crate::constants::RX_BUFFER_CAPACITY;
use crate::error::{CommandError, ConfigError, DecodeError};
use crate::metrics;
use crate::packets::{
    BrineStatus, CycleTimes, Dispatch, Handshake, Packet, SettingsConfig, StatisticsTotals,
    StatusFlags, StatusRealtime, UsageFragment, dispatch_next,
};
use crate::readings::{Reading, ReadingKind};
use crate::ring_buffer::RingBuffer;
use crate::sequencer::{PollRequest, RequestSequencer, RequestState};
use crate::session::Session;
use crate::time::Clock;
use crate::traits::{ReadingSink, Transport};
use crate::validator::Validators;

/// Counters describing engine activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub bytes_received: u64,
    /// Oldest bytes dropped because the receive buffer was full.
    pub bytes_overflowed: u64,
    pub packets_decoded: u64,
    pub packets_dropped: u64,
    pub writes: u64,
    pub write_failures: u64,
    pub auth_attempts: u64,
    pub values_rejected: u64,
}

/// BLE protocol engine for one water-softener controller.
pub struct SoftenerEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    buffer: RingBuffer<RX_BUFFER_CAPACITY>,
    session: Session,
    sequencer: RequestSequencer,
    validators: Validators,
    sinks: HashMap<ReadingKind, Vec<Box<dyn ReadingSink>>>,
    last_poll: Option<Instant>,
    last_keepalive: Option<Instant>,
    stats: EngineStats,
}

impl SoftenerEngine {
    /// Creates an engine drawing authentication challenges from the OS entropy source.
    ///
    /// # Parameters
    /// - `config`: Password and protocol timing.
    /// - `clock`: Source of "now" for every deferred transition.
    ///
    /// # Errors
    /// - [`ConfigError`] - `config` failed validation
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::with_rng(config, clock, Box::new(StdRng::from_os_rng()))
    }

    /// Creates an engine with an explicit random source, for reproducible runs.
    ///
    /// # Errors
    /// - [`ConfigError`] - `config` failed validation
    pub fn with_rng(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sequencer: RequestSequencer::from_config(&config),
            config,
            clock,
            rng,
            buffer: RingBuffer::new(),
            session: Session::new(),
            validators: Validators::new(),
            sinks: HashMap::new(),
            last_poll: None,
            last_keepalive: None,
            stats: EngineStats::default(),
        })
    }

    /// Registers a consumer for readings of `kind`.
    ///
    /// Several sinks may listen to the same kind; kinds without a sink are simply
    /// not delivered anywhere.
    pub fn register_sink(&mut self, kind: ReadingKind, sink: impl ReadingSink + 'static) {
        self.sinks.entry(kind).or_default().push(Box::new(sink));
    }

    /// Starts a new connection and asks the controller for its handshake.
    pub fn connected(&mut self, transport: &mut dyn Transport) {
        self.reset_connection();
        info!("connected, requesting handshake");
        self.write_frame(transport, &Command::HandshakeRequest.encode(), "handshake request");
    }

    /// Tears down all per-connection state.
    ///
    /// The last accepted salt level survives so a corrupt first reading after
    /// reconnecting still has a fallback.
    pub fn disconnected(&mut self) {
        info!(
            authenticated = self.session.authenticated,
            discarded = self.buffer.len(),
            "disconnected"
        );
        self.reset_connection();
    }

    fn reset_connection(&mut self) {
        self.session = Session::new();
        self.buffer.clear();
        self.sequencer.reset();
        self.validators.reset_session();
        self.last_poll = None;
        self.last_keepalive = None;
    }

    /// Feeds one inbound notification into the engine.
    ///
    /// The bytes are appended to the receive buffer and every complete packet is
    /// decoded. Readings are delivered to registered sinks and also returned.
    ///
    /// # Parameters
    /// - `data`: Notification payload, of any length and split at any boundary.
    /// - `transport`: Used to answer a handshake with the authentication reply.
    ///
    /// # Returns
    /// The readings produced, in decode order.
    pub fn handle_notification(
        &mut self,
        data: &[u8],
        transport: &mut dyn Transport,
    ) -> Vec<Reading> {
        self.stats.bytes_received += data.len() as u64;
        self.buffer.append(data);
        self.stats.bytes_overflowed = self.buffer.dropped();

        let mut readings = Vec::new();
        loop {
            match dispatch_next(&mut self.buffer, &mut self.session.continuation) {
                Dispatch::NeedMoreData => break,
                Dispatch::Packet(packet) => {
                    self.stats.packets_decoded += 1;
                    self.apply_packet(packet, transport, &mut readings);
                }
                Dispatch::Dropped(err) => {
                    self.stats.packets_dropped += 1;
                    match err {
                        DecodeError::EndMarkerMismatch { .. } => {
                            warn!(error = %err, "discarding corrupt packet")
                        }
                        DecodeError::UnrecognizedHeader { .. } => {
                            debug!(error = %err, "discarding unframed bytes")
                        }
                    }
                }
            }
        }

        self.stats.values_rejected = self.validators.rejected_total();
        self.publish(&readings);
        readings
    }

    /// Advances timers: starts poll cycles, writes due poll requests and keepalives.
    ///
    /// Call periodically; the engine's timing resolution is the tick period.
    pub fn tick(&mut self, transport: &mut dyn Transport) {
        if !self.session.authenticated {
            return;
        }
        let now = self.clock.now();

        let poll_due = self
            .last_poll
            .is_none_or(|at| now.duration_since(at) >= self.config.poll_interval);
        if self.sequencer.is_idle() && poll_due {
            debug!("poll interval elapsed, starting cycle");
            self.sequencer.start_cycle(now);
            self.last_poll = Some(now);
        }

        let mut polled = false;
        if let Some(request) = self.sequencer.tick(now) {
            if request == PollRequest::Status {
                self.session.begin_history_cycle();
            }
            trace!(?request, "poll request due");
            self.write_frame(transport, &request.command().encode(), "poll request");
            polled = true;
        }

        let keepalive_due = self
            .last_keepalive
            .is_none_or(|at| now.duration_since(at) >= self.config.keepalive_interval);
        if keepalive_due && !polled {
            self.write_frame(transport, &Command::Keepalive.encode(), "keepalive");
            self.last_keepalive = Some(now);
        }
    }

    /// Writes a user command to the controller.
    ///
    /// # Errors
    /// - [`CommandError::NotAuthenticated`] - No authenticated session yet
    /// - [`CommandError::Transport`] - The write failed
    pub fn send_command(
        &mut self,
        command: Command,
        transport: &mut dyn Transport,
    ) -> Result<(), CommandError> {
        self.ensure_authenticated()?;
        self.stats.writes += 1;
        if let Err(e) = transport.write(&command.encode()) {
            self.stats.write_failures += 1;
            warn!(?command, error = %e, "command write failed");
            return Err(e.into());
        }
        info!(?command, "command sent");
        Ok(())
    }

    /// Reprograms the salt level from a weight in pounds.
    ///
    /// # Errors
    /// - [`CommandError::NotAuthenticated`] - No authenticated session yet
    /// - [`CommandError::BrineTankNotConfigured`] - Tank geometry not reported yet
    /// - [`CommandError::InvalidValue`] - `pounds` is negative or not finite
    /// - [`CommandError::Transport`] - The write failed
    pub fn set_salt_level(
        &mut self,
        pounds: f64,
        transport: &mut dyn Transport,
    ) -> Result<(), CommandError> {
        self.ensure_authenticated()?;
        let command = Command::set_salt_level(pounds, &self.session.brine)?;
        self.send_command(command, transport)
    }

    fn ensure_authenticated(&self) -> Result<(), CommandError> {
        if self.session.authenticated {
            Ok(())
        } else {
            Err(CommandError::NotAuthenticated)
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sequencer_state(&self) -> RequestState {
        self.sequencer.state()
    }

    /// Bytes waiting in the receive buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    /// Writes `frame`, logging and counting a failure. Never retried.
    fn write_frame(
        &mut self,
        transport: &mut dyn Transport,
        frame: &CommandFrame,
        what: &'static str,
    ) -> bool {
        self.stats.writes += 1;
        match transport.write(frame) {
            Ok(()) => true,
            Err(e) => {
                self.stats.write_failures += 1;
                warn!(what, error = %e, "write failed");
                false
            }
        }
    }

    fn publish(&mut self, readings: &[Reading]) {
        for reading in readings {
            if let Some(sinks) = self.sinks.get_mut(&reading.kind) {
                for sink in sinks.iter_mut() {
                    sink.publish(reading);
                }
            }
        }
    }

    fn apply_packet(
        &mut self,
        packet: Packet,
        transport: &mut dyn Transport,
        out: &mut Vec<Reading>,
    ) {
        match packet {
            Packet::Handshake(handshake) => self.on_handshake(handshake, transport, out),
            Packet::StatusRealtime(status) => self.on_status_realtime(&status, out),
            Packet::BrineStatus(brine) => self.on_brine_status(&brine, out),
            Packet::StatusHistory { sequence } => {
                debug!(sequence, "status history packet, flushed trailing data")
            }
            Packet::SettingsConfig(settings) => self.on_settings_config(&settings, out),
            Packet::CycleTimes(cycle) => on_cycle_times(&cycle, out),
            Packet::StatisticsTotals(totals) => self.on_statistics_totals(&totals, out),
            Packet::UsageFragment(fragment) => self.on_usage_fragment(&fragment, out),
            Packet::Keepalive { sequence } => trace!(sequence, "keepalive"),
            Packet::Skipped { tag, sequence } => debug!(tag, sequence, "skipped packet"),
        }
    }

    fn on_handshake(
        &mut self,
        handshake: Handshake,
        transport: &mut dyn Transport,
        out: &mut Vec<Reading>,
    ) {
        if self.session.authenticated {
            debug!("handshake on an authenticated session, ignoring");
            return;
        }
        let now = self.clock.now();
        let auth_required = handshake.auth_required();
        self.session.handshake_received = true;
        self.session.firmware = Some(handshake.firmware);
        self.session.counter = handshake.counter;
        self.session.auth_required = auth_required;
        out.push(Reading::text(
            ReadingKind::FirmwareVersion,
            handshake.firmware.to_string(),
        ));

        if auth_required {
            let draws = ChallengeDraws::draw(&mut self.rng);
            let reply = build_auth_packet(self.config.password, handshake.counter, &draws);
            self.stats.auth_attempts += 1;
            info!(
                firmware = %handshake.firmware,
                counter = %handshake.counter,
                "authenticating"
            );
            self.write_frame(transport, &reply, "authentication reply");
            // The controller never acknowledges; assume success and let the settle
            // delay pass before polling.
            self.session.authenticated = true;
            self.sequencer
                .schedule_cycle(now + self.config.auth_settle_delay);
        } else {
            info!(firmware = %handshake.firmware, "controller does not require authentication");
            self.session.authenticated = true;
            self.sequencer.start_cycle(now);
        }
        self.last_poll = Some(now);
        self.last_keepalive = Some(now);
    }

    fn on_status_realtime(&mut self, status: &StatusRealtime, out: &mut Vec<Reading>) {
        self.session.flags = Some(status.flags);
        out.push(Reading::text(ReadingKind::DeviceTime, status.time.to_string()));
        out.push(Reading::number(
            ReadingKind::BatteryLevel,
            status.battery_percent(),
        ));
        push_guarded(
            out,
            ReadingKind::CurrentFlow,
            self.validators.current_flow.check(status.current_flow_gpm()),
        );
        push_guarded(
            out,
            ReadingKind::SoftWaterRemaining,
            self.validators
                .soft_water_remaining
                .check(f64::from(status.soft_water_remaining)),
        );
        push_guarded(
            out,
            ReadingKind::UsageToday,
            self.validators
                .usage_today
                .check(f64::from(status.usage_today)),
        );
        push_guarded(
            out,
            ReadingKind::PeakFlow,
            self.validators.peak_flow.check(status.peak_flow_gpm()),
        );
        out.push(Reading::number(
            ReadingKind::Hardness,
            f64::from(status.hardness_gpg),
        ));
        out.push(Reading::text(
            ReadingKind::RegenTime,
            status.regen_time().to_string(),
        ));
        push_flags(status.flags, out);
    }

    fn on_brine_status(&mut self, brine: &BrineStatus, out: &mut Vec<Reading>) {
        self.session.brine = brine.tank;
        self.session.regen_active = brine.regen_active;
        out.push(Reading::number(
            ReadingKind::FilterBackwashDays,
            f64::from(brine.filter_backwash_days),
        ));
        out.push(Reading::number(
            ReadingKind::AirRechargeDays,
            f64::from(brine.air_recharge_days),
        ));
        out.push(Reading::flag(ReadingKind::RegenActive, brine.regen_active));
        out.push(Reading::number(
            ReadingKind::LowSaltAlert,
            f64::from(brine.low_salt_alert),
        ));

        if !brine.tank.is_configured() {
            debug!("brine tank not configured, skipping salt readings");
            return;
        }
        let capacity = metrics::tank_capacity_lbs(&brine.tank);
        out.push(Reading::number(ReadingKind::BrineTankCapacity, capacity));
        let estimate = metrics::salt_remaining_lbs(&brine.tank);
        if let Some(salt) = self.validators.check_salt(estimate, capacity) {
            out.push(Reading::number(ReadingKind::SaltRemaining, salt));
            out.push(Reading::number(
                ReadingKind::BrineSaltPercent,
                metrics::salt_percent(salt, capacity),
            ));
        }
    }

    fn on_settings_config(&mut self, settings: &SettingsConfig, out: &mut Vec<Reading>) {
        self.session.flags = Some(settings.flags);
        let numbers = [
            (ReadingKind::DaysUntilRegen, settings.days_until_regen),
            (ReadingKind::RegenDayOverride, settings.regen_day_override),
            (ReadingKind::ReserveCapacity, settings.reserve_capacity_percent),
            (ReadingKind::SoakDuration, settings.soak_duration_hours),
            (
                ReadingKind::AirRechargeFrequency,
                settings.air_recharge_frequency_days,
            ),
        ];
        out.extend(
            numbers
                .into_iter()
                .map(|(kind, value)| Reading::number(kind, f64::from(value))),
        );
        out.push(Reading::number(
            ReadingKind::ResinCapacity,
            f64::from(settings.resin_capacity_grains()),
        ));
        out.push(Reading::flag(
            ReadingKind::PrefillEnabled,
            settings.prefill_enabled,
        ));
        if settings.prefill_enabled {
            out.push(Reading::number(
                ReadingKind::PrefillDuration,
                f64::from(settings.prefill_duration_hours),
            ));
        }
        out.push(Reading::flag(
            ReadingKind::PrefillSoakMode,
            settings.prefill_soak_mode,
        ));
        out.push(Reading::flag(ReadingKind::RentalUnit, settings.rental_unit));
        out.push(Reading::flag(
            ReadingKind::RentalRegenDisabled,
            settings.rental_regen_disabled,
        ));
        push_flags(settings.flags, out);
    }

    fn on_statistics_totals(&mut self, totals: &StatisticsTotals, out: &mut Vec<Reading>) {
        push_guarded(
            out,
            ReadingKind::CurrentFlow,
            self.validators.current_flow.check(totals.current_flow_gpm()),
        );
        push_guarded(
            out,
            ReadingKind::TotalGallons,
            self.validators
                .total_gallons
                .check(f64::from(totals.total_gallons)),
        );
        out.push(Reading::number(
            ReadingKind::TotalGallonsResettable,
            f64::from(totals.total_gallons_resettable),
        ));
        out.push(Reading::number(
            ReadingKind::TotalRegens,
            f64::from(totals.total_regens),
        ));
        out.push(Reading::number(
            ReadingKind::TotalRegensResettable,
            f64::from(totals.total_regens_resettable),
        ));
    }

    fn on_usage_fragment(&mut self, fragment: &UsageFragment, out: &mut Vec<Reading>) {
        let history = &mut self.session.history;
        if fragment.start_index == 0 {
            history.reset();
        }
        history.write(fragment.start_index, &fragment.gallons);
        trace!(
            start = fragment.start_index,
            entries = fragment.gallons.len(),
            "usage history fragment"
        );
        if !fragment.last {
            return;
        }
        history.mark_complete();
        let average = metrics::average_daily_usage(history.entries());
        debug!(average, filled = history.filled(), "usage history complete");
        push_guarded(
            out,
            ReadingKind::AverageDailyUsage,
            self.validators.average_daily_usage.check(average),
        );
    }
}

fn on_cycle_times(cycle: &CycleTimes, out: &mut Vec<Reading>) {
    out.extend(
        ReadingKind::CYCLE_POSITIONS
            .into_iter()
            .zip(cycle.positions)
            .map(|(kind, position)| {
                Reading::number(kind, f64::from(position.duration_minutes))
            }),
    );
}

fn push_guarded(out: &mut Vec<Reading>, kind: ReadingKind, value: Option<f64>) {
    if let Some(value) = value {
        out.push(Reading::number(kind, value));
    }
}

fn push_flags(flags: StatusFlags, out: &mut Vec<Reading>) {
    out.extend([
        Reading::flag(ReadingKind::DisplayOff, flags.display_off()),
        Reading::flag(ReadingKind::BypassActive, flags.bypass_active()),
        Reading::flag(ReadingKind::ShutoffActive, flags.shutoff_active()),
        Reading::flag(ReadingKind::BypassEnabled, flags.bypass_enabled()),
        Reading::flag(ReadingKind::ShutoffEnabled, flags.shutoff_enabled()),
    ]);
}

impl fmt::Debug for SoftenerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftenerEngine")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("buffer", &self.buffer)
            .field("session", &self.session)
            .field("sequencer", &self.sequencer)
            .field("sink_kinds", &self.sinks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
