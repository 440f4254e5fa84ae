//! Constants used across the valve protocol implementation.
//!
//! This module defines the protocol-wide constants used for frame sizing,
//! wire opcodes, synchronization timing, and boiler-side aggregation defaults.
//!
//! ## Key Concepts
//!
//! - **Opcodes**: One command byte per frame selects valve-set, sync-countdown,
//!   or sync-final behavior at the remote valve.
//! - **Half-bits**: Every logical bit is shipped as fixed 200 microsecond
//!   on/off slots, so frame sizes are byte counts of packed half-bit slots.
//! - **Half-seconds**: All scheduling runs on a half-second grid inside a
//!   fixed two-second minor cycle.
//! - **Ticks**: The boiler aggregator ages its table on a two-second tick.
//!
//! These values should be used wherever framing or scheduling logic is
//! implemented so that message boundaries and listening windows stay aligned.

/// Wire opcode commanding the valve to move to the position carried in the
/// extension byte (scaled 0..=255).
pub const CMD_VALVE_SET: u8 = 0x26;

/// Wire opcode for one step of the synchronization countdown.
///
/// The extension byte carries the remaining countdown value; only odd values
/// are ever transmitted.
pub const CMD_SYNC_COUNTDOWN: u8 = 0x2c;

/// Wire opcode ending the synchronization handshake.
///
/// The extension byte is always zero. On receipt the valve closes and starts
/// its periodic listening schedule.
pub const CMD_SYNC_FINAL: u8 = 0x20;

/// Base value of the additive frame checksum.
///
/// The checksum byte is this constant plus the five preceding protected bytes,
/// modulo 256.
pub const CHECKSUM_BASE: u8 = 0x0c;

/// Pre-encoded preamble byte: two logical zero bits per byte.
pub const PREAMBLE_BYTE: u8 = 0xcc;

/// Length (in bytes) of the fixed all-zero-bit preamble (twelve logical zeros).
pub const PREAMBLE_LEN: usize = 6;

/// Terminator byte marking the end of meaningful data in a frame buffer.
///
/// No valid encoded byte can equal this value (runs of set half-bits never
/// exceed three), so it doubles as the empty-buffer marker and is never
/// transmitted.
pub const FRAME_TERMINATOR: u8 = 0xff;

/// Shortest possible meaningful encoding (all-zero field values).
pub const MIN_FRAME_LEN: usize = 35;

/// Longest possible meaningful encoding over all field values.
pub const MAX_FRAME_LEN: usize = 45;

/// Size (in bytes) of a frame buffer: the longest encoding plus its terminator.
pub const FRAME_BUF_LEN: usize = MAX_FRAME_LEN + 1;

/// Largest valid house-code byte; `100..=255` is out of range and `0xff`
/// conventionally means unset.
pub const HOUSE_CODE_MAX: u8 = 99;

/// House-code byte value meaning "not configured".
pub const HOUSE_CODE_UNSET: u8 = 0xff;

/// Initial value of the synchronization countdown.
///
/// The countdown loses 2 per second, so the handshake spends about two
/// minutes counting down before the final delay.
pub const SYNC_COUNTDOWN_START: u8 = 241;

/// Base gap between steady-state transmissions, in half-seconds.
///
/// The full gap is this plus the low three bits of the second house code,
/// giving a period in 115.0..=118.5 seconds that both ends derive
/// independently.
pub const TX_GAP_BASE_HALF_SECONDS: u8 = 230;

/// Base delay from the penultimate countdown step to the sync-final frame,
/// in half-seconds. The full delay adds the low three bits of the second
/// house code.
pub const SYNC_FINAL_BASE_HALF_SECONDS: u8 = 8;

/// Number of half-second scheduling slots in one minor cycle.
pub const HALF_SECONDS_PER_CYCLE: u8 = 4;

/// Milliseconds per half-second scheduling slot.
pub const HALF_SECOND_MS: u16 = 500;

/// Gap between the two sends of a double transmission, in milliseconds.
pub const DOUBLE_TX_GAP_MS: u16 = 8;

/// Minimum number of single steady-state transmissions between doubled ones
/// when steady double transmission is enabled.
pub const STEADY_DOUBLE_TX_SPACING: u8 = 4;

/// Commanded percentage at or above which the valve is considered actually
/// open (letting water flow) rather than merely cracked.
pub const MIN_VALVE_PC_REALLY_OPEN: u8 = 35;

/// Number of remote-valve slots in the boiler aggregation table.
pub const BOILER_VALVE_SLOTS: usize = 8;

/// Aggregator ticks a report stays live without being refreshed.
///
/// Sixty two-second ticks give each report a 120 second lease.
pub const VALVE_LIVE_TICKS: i8 = 60;

/// Reserved slot id marking an empty aggregation slot.
///
/// An unset house-code pair maps onto the same value, so unconfigured nodes
/// can never occupy a slot.
pub const VALVE_ID_NONE: u16 = 0xffff;

/// Default minimum individual percent-open for a report to count as a live
/// call for heat.
pub const DEFAULT_BOILER_MIN_INDIVIDUAL_PC: u8 = MIN_VALVE_PC_REALLY_OPEN;

/// Default minimum summed percent-open across live reports for the boiler to
/// run.
pub const DEFAULT_BOILER_MIN_AGGREGATE_PC: u8 = 50;

/// Default minimum aggregator ticks the boiler decision must hold before it
/// may change again (anti-short-cycle), five minutes of two-second ticks.
pub const DEFAULT_BOILER_MIN_STATE_TICKS: u16 = 150;
