//! Poll request sequencing.
//!
//! A poll cycle writes the status, settings and statistics requests in that order,
//! spaced so the controller can answer each before the next arrives. The sequencer
//! never sleeps: it records when the next step becomes due and the engine offers it
//! the current instant on every tick.

use std::time::{Duration, Instant};

use crate::commands::Command;
use crate::config::EngineConfig;

/// Where a poll cycle stands. Each `Awaiting*` state names the request due next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    /// No cycle in progress.
    #[default]
    Idle,
    AwaitingStatus,
    AwaitingSettings,
    AwaitingStats,
    /// All requests written; waiting out the cooldown.
    Done,
}

/// A request emitted by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollRequest {
    Status,
    Settings,
    Statistics,
}

impl PollRequest {
    /// Command to write for this request.
    pub fn command(self) -> Command {
        match self {
            PollRequest::Status => Command::StatusRequest,
            PollRequest::Settings => Command::SettingsRequest,
            PollRequest::Statistics => Command::StatisticsRequest,
        }
    }
}

/// Forward-only poll cycle state machine.
#[derive(Debug, Clone)]
pub struct RequestSequencer {
    state: RequestState,
    due_at: Option<Instant>,
    spacing: Duration,
    cooldown: Duration,
}

impl RequestSequencer {
    /// Creates an idle sequencer.
    ///
    /// # Parameters
    /// - `spacing`: Minimum time between successive requests.
    /// - `cooldown`: Time after the last request before returning to idle.
    pub fn new(spacing: Duration, cooldown: Duration) -> Self {
        Self {
            state: RequestState::Idle,
            due_at: None,
            spacing,
            cooldown,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.command_spacing, config.cycle_cooldown)
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RequestState::Idle
    }

    /// Starts a cycle whose status request is due on the next tick.
    pub fn start_cycle(&mut self, now: Instant) {
        self.schedule_cycle(now);
    }

    /// Starts a cycle whose status request becomes due at `at`.
    ///
    /// The sequencer leaves idle immediately, so the poll timer cannot start a
    /// second cycle in the meantime.
    pub fn schedule_cycle(&mut self, at: Instant) {
        self.state = RequestState::AwaitingStatus;
        self.due_at = Some(at);
    }

    /// Advances the cycle if its next step is due.
    ///
    /// # Returns
    /// The request to write now, if any.
    pub fn tick(&mut self, now: Instant) -> Option<PollRequest> {
        let due = self.due_at.is_some_and(|at| now >= at);
        if !due {
            return None;
        }
        let (next_state, request, wait) = match self.state {
            RequestState::Idle => return None,
            RequestState::AwaitingStatus => (
                RequestState::AwaitingSettings,
                Some(PollRequest::Status),
                Some(self.spacing),
            ),
            RequestState::AwaitingSettings => (
                RequestState::AwaitingStats,
                Some(PollRequest::Settings),
                Some(self.spacing),
            ),
            RequestState::AwaitingStats => (
                RequestState::Done,
                Some(PollRequest::Statistics),
                Some(self.cooldown),
            ),
            RequestState::Done => (RequestState::Idle, None, None),
        };
        self.state = next_state;
        self.due_at = wait.map(|w| now + w);
        request
    }

    /// Abandons any cycle in progress.
    pub fn reset(&mut self) {
        self.state = RequestState::Idle;
        self.due_at = None;
    }
}

impl Default for RequestSequencer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn cycle_timing() {
        let t0 = Instant::now();
        let mut seq = RequestSequencer::new(ms(20), ms(100));
        seq.start_cycle(t0);
        assert_eq!(seq.tick(t0), Some(PollRequest::Status));
        assert_eq!(seq.tick(t0 + ms(19)), None);
        assert_eq!(seq.tick(t0 + ms(20)), Some(PollRequest::Settings));
        assert_eq!(seq.tick(t0 + ms(39)), None);
        assert_eq!(seq.tick(t0 + ms(40)), Some(PollRequest::Statistics));
        assert_eq!(seq.state(), RequestState::Done);
        assert_eq!(seq.tick(t0 + ms(139)), None);
        assert_eq!(seq.state(), RequestState::Done);
        assert_eq!(seq.tick(t0 + ms(140)), None);
        assert!(seq.is_idle());
    }

    #[test]
    fn scheduled_cycle_waits() {
        let t0 = Instant::now();
        let mut seq = RequestSequencer::default();
        seq.schedule_cycle(t0 + ms(200));
        assert!(!seq.is_idle());
        assert_eq!(seq.tick(t0 + ms(199)), None);
        assert_eq!(seq.tick(t0 + ms(200)), Some(PollRequest::Status));
    }

    #[test]
    fn idle_never_emits() {
        let t0 = Instant::now();
        let mut seq = RequestSequencer::default();
        assert_eq!(seq.tick(t0 + ms(10_000)), None);
    }

    #[test]
    fn reset_abandons_cycle() {
        let t0 = Instant::now();
        let mut seq = RequestSequencer::default();
        seq.start_cycle(t0);
        seq.tick(t0);
        seq.reset();
        assert!(seq.is_idle());
        assert_eq!(seq.tick(t0 + ms(20)), None);
    }

    #[test]
    fn requests_map_to_commands() {
        assert_eq!(PollRequest::Status.command(), Command::StatusRequest);
        assert_eq!(PollRequest::Settings.command(), Command::SettingsRequest);
        assert_eq!(PollRequest::Statistics.command(), Command::StatisticsRequest);
    }
}
