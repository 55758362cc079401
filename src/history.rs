//! Daily water-usage history and the headerless fragment continuation.
//!
//! Statistics sub-sequence 1 carries the first 17 daily values. The controller then
//! streams three more fragments of 20, 20 and 6 bytes with no header, so the only
//! way to recognise them is to remember that one is due. [`HistoryContinuation`]
//! is that memory; it lives in the session so it can be reset and inspected.

use crate::constants::{
    DAILY_HISTORY_LEN, HISTORY_FINAL_FRAGMENT_LEN, HISTORY_FRAGMENT_LEN, HISTORY_HEADED_ENTRIES,
};

/// Which headerless history fragment, if any, the dispatcher expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryContinuation {
    /// No fragment expected.
    #[default]
    Idle,
    /// Entries 17..37 (20 bytes).
    Fragment1,
    /// Entries 37..57 (20 bytes).
    Fragment2,
    /// Entries 57..62 plus one trailer byte (6 bytes).
    Fragment3,
}

impl HistoryContinuation {
    /// Returns `true` while a fragment is expected.
    pub fn is_pending(&self) -> bool {
        !matches!(self, HistoryContinuation::Idle)
    }

    /// Bytes occupied by the expected fragment on the wire.
    pub fn expected_len(&self) -> Option<usize> {
        match self {
            HistoryContinuation::Idle => None,
            HistoryContinuation::Fragment1 | HistoryContinuation::Fragment2 => {
                Some(HISTORY_FRAGMENT_LEN)
            }
            HistoryContinuation::Fragment3 => Some(HISTORY_FINAL_FRAGMENT_LEN),
        }
    }

    /// History index written by the first byte of the expected fragment.
    pub fn start_index(&self) -> Option<usize> {
        match self {
            HistoryContinuation::Idle => None,
            HistoryContinuation::Fragment1 => Some(HISTORY_HEADED_ENTRIES),
            HistoryContinuation::Fragment2 => Some(HISTORY_HEADED_ENTRIES + HISTORY_FRAGMENT_LEN),
            HistoryContinuation::Fragment3 => {
                Some(HISTORY_HEADED_ENTRIES + 2 * HISTORY_FRAGMENT_LEN)
            }
        }
    }

    /// History entries carried by the expected fragment. The final fragment's last
    /// byte is a trailer, not a value.
    pub fn entry_count(&self) -> usize {
        match (self.start_index(), self.expected_len()) {
            (Some(start), Some(len)) => len.min(DAILY_HISTORY_LEN - start),
            _ => 0,
        }
    }

    /// Returns `true` when the expected fragment completes the history.
    pub fn is_last(&self) -> bool {
        matches!(self, HistoryContinuation::Fragment3)
    }

    /// State after the expected fragment has been consumed.
    pub fn advance(self) -> Self {
        match self {
            HistoryContinuation::Idle => HistoryContinuation::Idle,
            HistoryContinuation::Fragment1 => HistoryContinuation::Fragment2,
            HistoryContinuation::Fragment2 => HistoryContinuation::Fragment3,
            HistoryContinuation::Fragment3 => HistoryContinuation::Idle,
        }
    }
}

/// Sixty-two daily usage values in gallons, filled fragment by fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyUsageHistory {
    entries: [u16; DAILY_HISTORY_LEN],
    written: [bool; DAILY_HISTORY_LEN],
    complete: bool,
}

impl DailyUsageHistory {
    /// Creates an empty history.
    pub const fn new() -> Self {
        Self {
            entries: [0; DAILY_HISTORY_LEN],
            written: [false; DAILY_HISTORY_LEN],
            complete: false,
        }
    }

    /// Clears every entry. Called at the start of each poll cycle.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Stores `gallons` starting at `start_index`. Values past the end are ignored.
    pub fn write(&mut self, start_index: usize, gallons: &[u16]) {
        for (offset, &value) in gallons.iter().enumerate() {
            let index = start_index + offset;
            if index >= DAILY_HISTORY_LEN {
                break;
            }
            self.entries[index] = value;
            self.written[index] = true;
        }
    }

    /// Marks the history complete once the final fragment has been stored.
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Returns `true` once the final fragment of the cycle has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of entries written this cycle.
    pub fn filled(&self) -> usize {
        self.written.iter().filter(|&&w| w).count()
    }

    /// All entries, oldest index first.
    pub fn entries(&self) -> &[u16; DAILY_HISTORY_LEN] {
        &self.entries
    }
}

impl Default for DailyUsageHistory {
    fn default() -> Self {
        Self::new()
    }
}
