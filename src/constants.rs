//! Water-softener BLE protocol constants.
//!
//! Packet tags, fixed packet lengths, end markers and field offsets shared by the
//! decoders, the command builders and the reference peripheral encoders. Offsets
//! are literal byte positions counted from the first header byte.

// --- Packet Tags (each header is the tag byte repeated twice) ---

/// Handshake packet tag (`t`).
pub const TAG_HANDSHAKE: u8 = 0x74;
/// Status packet tag (`u`).
pub const TAG_STATUS: u8 = 0x75;
/// Settings packet tag (`v`).
pub const TAG_SETTINGS: u8 = 0x76;
/// Statistics packet tag (`w`).
pub const TAG_STATISTICS: u8 = 0x77;
/// Keepalive packet tag (`x`).
pub const TAG_KEEPALIVE: u8 = 0x78;

// --- Framing ---

/// Capacity of the inbound notification ring buffer. Must be a power of two.
pub const RX_BUFFER_CAPACITY: usize = 256;
/// Header length: two identical tag bytes.
pub const HEADER_LEN: usize = 2;
/// Offset of the sub-sequence number within headed packets.
pub const SEQUENCE_OFFSET: usize = 2;
/// Minimum buffered bytes before a recognised header is handed to its decoder.
pub const MIN_DISPATCH_LEN: usize = 18;

/// Handshake packet length.
pub const HANDSHAKE_LEN: usize = 18;
/// Status packet length (all sub-sequences).
pub const STATUS_LEN: usize = 20;
/// Settings packet length (all sub-sequences).
pub const SETTINGS_LEN: usize = 20;
/// Statistics sub-sequence 0 (totals) length. One byte shorter than other packets.
pub const STATISTICS_TOTALS_LEN: usize = 19;
/// Statistics sub-sequence 1 (first daily-usage fragment) length.
pub const STATISTICS_HISTORY_LEN: usize = 20;
/// Length used to skip statistics packets with an unhandled sub-sequence.
pub const STATISTICS_SKIP_LEN: usize = 20;
/// Keepalive sub-sequence 0 length.
pub const KEEPALIVE_FIRST_LEN: usize = 6;
/// Keepalive length for every other sub-sequence.
pub const KEEPALIVE_LEN: usize = 4;
/// Length of the two middle headerless daily-usage fragments.
pub const HISTORY_FRAGMENT_LEN: usize = 20;
/// Length of the final headerless daily-usage fragment.
pub const HISTORY_FINAL_FRAGMENT_LEN: usize = 6;

// --- End Markers ---

/// Status sub-sequence 0 end marker (`9`), at offset 19.
pub const STATUS_REALTIME_END_MARKER: u8 = 0x39;
/// Status sub-sequence 1 end marker (`:`), at offset 19.
pub const STATUS_BRINE_END_MARKER: u8 = 0x3A;
/// Settings sub-sequence 0 end marker (`B`), at offset 19.
pub const SETTINGS_CONFIG_END_MARKER: u8 = 0x42;
/// Settings sub-sequence 1 end marker (`C`), at offset 19.
pub const SETTINGS_CYCLE_END_MARKER: u8 = 0x43;
/// Statistics sub-sequence 0 end marker (`F`), at offset 18.
pub const STATISTICS_TOTALS_END_MARKER: u8 = 0x46;

/// End-marker offset for 20-byte packets.
pub const END_MARKER_OFFSET: usize = 19;
/// End-marker offset for the 19-byte statistics totals packet.
pub const STATISTICS_TOTALS_END_MARKER_OFFSET: usize = 18;

// --- Handshake ---

/// Firmware major version offset.
pub const HANDSHAKE_FIRMWARE_MAJOR_OFFSET: usize = 5;
/// Firmware minor version offset.
pub const HANDSHAKE_FIRMWARE_MINOR_OFFSET: usize = 6;
/// Authentication flag byte offset.
pub const HANDSHAKE_AUTH_FLAG_OFFSET: usize = 7;
/// Connection counter offset.
pub const HANDSHAKE_COUNTER_OFFSET: usize = 11;
/// Bit in the authentication flag byte that requests authentication.
pub const AUTH_REQUIRED_FLAG: u8 = 0x80;
/// Firmware majors below this value always require authentication.
pub const AUTH_FREE_FIRMWARE_MAJOR: u8 = 6;

// --- Authentication ---

/// Command tag written at bytes 2-3 of the authentication reply.
pub const AUTH_COMMAND_TAG: [u8; 2] = *b"PA";
/// Highest accepted device password.
pub const MAX_PASSWORD: u16 = 9999;
/// Password used when none is configured.
pub const DEFAULT_PASSWORD: u16 = 1234;
/// Default CRC8 polynomial before an authentication attempt reconfigures it.
pub const DEFAULT_CRC8_POLYNOMIAL: u8 = 213;
/// Default CRC8 seed.
pub const DEFAULT_CRC8_SEED: u8 = 0;

/// Polynomials accepted by the controller for the authentication challenge.
///
/// Every entry has exactly four bits set.
pub const ALLOWED_POLYNOMIALS: [u8; 64] = [
    0x1E, 0x1D, 0x2D, 0x2E, 0x35, 0x36, 0x39, 0x3A, 0x3C, 0x47, 0x4B, 0x4D, 0x4E, 0x53, 0x55, 0x56,
    0x59, 0x5A, 0x5C, 0x63, 0x65, 0x66, 0x69, 0x6A, 0x6C, 0x71, 0x72, 0x74, 0x78, 0x87, 0x8B, 0x8D,
    0x8E, 0x93, 0x95, 0x96, 0x99, 0x9A, 0x9C, 0xA3, 0xA5, 0xA6, 0xA9, 0xAA, 0xAC, 0xB1, 0xB2, 0xB4,
    0xB8, 0xC3, 0xC5, 0xC6, 0xC9, 0xCA, 0xCC, 0xD1, 0xD2, 0xD4, 0xD8, 0xE1, 0xE2, 0xE4, 0xE8, 0xF0,
];

// --- Outbound Commands ---

/// Length of every outbound command.
pub const COMMAND_LEN: usize = 20;
/// Offset where command sub-codes and arguments begin.
pub const COMMAND_PAYLOAD_OFFSET: usize = 13;
/// Highest hardness accepted by the set-hardness command (grains per gallon).
pub const MAX_HARDNESS_GPG: u8 = 99;
/// Highest reserve capacity accepted by the set-reserve command (percent).
pub const MAX_RESERVE_CAPACITY_PERCENT: u8 = 49;
/// Highest regeneration count encoded by the set-salt-level command.
pub const MAX_SALT_REGENS: u8 = 100;
/// Low-salt alert threshold written by the set-salt-level command.
pub const DEFAULT_LOW_SALT_ALERT: u8 = 5;

// --- Field Semantics ---

/// Regenerations-remaining value meaning the brine tank is not configured.
pub const REGENS_NOT_CONFIGURED: u8 = 0xFF;
/// Rental-unit byte value meaning the unit is not a rental.
pub const RENTAL_UNIT_SENTINEL: u8 = 0xFF;
/// Divisor for flow readings (hundredths of a gallon per minute).
pub const FLOW_SCALE: f64 = 100.0;
/// Multiplier for the resin capacity field (grains).
pub const RESIN_GRAIN_SCALE: u32 = 1000;
/// Multiplier for each daily-usage history byte (gallons).
pub const HISTORY_GALLONS_SCALE: u16 = 10;
/// Mask for the duration bits of a cycle-position byte.
pub const CYCLE_DURATION_MASK: u8 = 0x7F;
/// Bit marking a cycle position as fixed (not adjustable).
pub const CYCLE_FIXED_BIT: u8 = 0x80;
/// Number of cycle positions in settings sub-sequence 1.
pub const CYCLE_POSITION_COUNT: usize = 8;

// --- Daily Usage History ---

/// Number of daily entries in the usage history.
pub const DAILY_HISTORY_LEN: usize = 62;
/// History entries carried by statistics sub-sequence 1.
pub const HISTORY_HEADED_ENTRIES: usize = 17;
/// First history index included in the average daily usage.
pub const AVERAGE_WINDOW_START: usize = 31;
/// Largest history entry considered plausible for averaging (gallons).
pub const MAX_PLAUSIBLE_DAILY_GALLONS: u16 = 2550;

// --- Brine Tank ---

/// Pounds of salt dissolved per minute of brine refill.
pub const SALT_POUNDS_PER_REFILL_MINUTE: f64 = 1.5;
/// Salt estimates above this multiple of tank capacity are treated as corrupt.
pub const SALT_CAPACITY_TOLERANCE: f64 = 1.1;
