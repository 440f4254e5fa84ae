//! Command records for one remote valve and their field arithmetic.
//!
//! ## Purpose
//!
//! Every frame on the air carries the same five-field record: two house-code
//! bytes naming the valve, an unused address byte (always zero), an opcode,
//! and an opcode-specific extension byte. A sixth additive checksum byte is
//! derived from the first five and protects the record end to end. This
//! module owns the record type and the small arithmetic around it; the
//! bit-level wire form lives in [`crate::encoding`].
//!
//! ## Functions
//!
//! - Constructors for the three frame kinds a controller sends.
//! - [`ValveCommand::checksum`]: the additive frame checksum.
//! - [`percent_to_extension`] / [`extension_to_percent`]: position scaling
//!   between the human 0..=100 range and the wire 0..=255 range.
//! - [`ValveCommand::pairing_id`]: the 16-bit identity a boiler hub tracks.

use crate::consts::{
    CHECKSUM_BASE, CMD_SYNC_COUNTDOWN, CMD_SYNC_FINAL, CMD_VALVE_SET, HOUSE_CODE_MAX,
};

/// One command record addressed to a single remote valve.
///
/// The record is plain data: any field value encodes, and semantic validity
/// (house codes in range, meaningful opcodes) is the concern of the layers
/// that build records, not of the codec.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValveCommand {
    /// First house-code byte of the addressed valve (valid range 0..=99).
    pub house_code1: u8,
    /// Second house-code byte of the addressed valve (valid range 0..=99).
    ///
    /// The low three bits also parameterize the valve's listening schedule.
    pub house_code2: u8,
    /// Command byte selecting the valve behavior.
    pub opcode: u8,
    /// Opcode-specific argument byte.
    pub extension: u8,
}

impl ValveCommand {
    /// Builds a valve-set command moving the valve to `percent` open.
    ///
    /// # Arguments
    ///
    /// * `hc1` - First house-code byte of the target valve.
    /// * `hc2` - Second house-code byte of the target valve.
    /// * `percent` - Requested position, clamped to 0..=100.
    pub fn valve_set(hc1: u8, hc2: u8, percent: u8) -> Self {
        ValveCommand {
            house_code1: hc1,
            house_code2: hc2,
            opcode: CMD_VALVE_SET,
            extension: percent_to_extension(percent),
        }
    }

    /// Builds one step of the synchronization countdown.
    ///
    /// # Arguments
    ///
    /// * `hc1` - First house-code byte of the target valve.
    /// * `hc2` - Second house-code byte of the target valve.
    /// * `remaining` - Countdown value still to run; carried verbatim.
    pub fn sync_countdown(hc1: u8, hc2: u8, remaining: u8) -> Self {
        ValveCommand {
            house_code1: hc1,
            house_code2: hc2,
            opcode: CMD_SYNC_COUNTDOWN,
            extension: remaining,
        }
    }

    /// Builds the frame that ends the synchronization handshake.
    pub fn sync_final(hc1: u8, hc2: u8) -> Self {
        ValveCommand {
            house_code1: hc1,
            house_code2: hc2,
            opcode: CMD_SYNC_FINAL,
            extension: 0,
        }
    }

    /// Computes the additive checksum over the five protected bytes.
    ///
    /// The unused address byte contributes zero but is still part of the sum,
    /// keeping the result identical to what the valve computes on receipt.
    pub fn checksum(&self) -> u8 {
        CHECKSUM_BASE
            .wrapping_add(self.house_code1)
            .wrapping_add(self.house_code2)
            .wrapping_add(self.opcode)
            .wrapping_add(self.extension)
    }

    /// Returns the 16-bit identity of the addressed valve, the key a boiler
    /// hub aggregates reports under.
    ///
    /// An unset house-code pair (`0xff`/`0xff`) maps onto the reserved
    /// empty-slot id, so unconfigured nodes can never claim a slot.
    pub fn pairing_id(&self) -> u16 {
        (u16::from(self.house_code1) << 8) | u16::from(self.house_code2)
    }

    /// True if this record is a valve-set command.
    pub fn is_valve_set(&self) -> bool {
        self.opcode == CMD_VALVE_SET
    }
}

/// Scales a 0..=100 position to the 0..=255 wire extension byte.
///
/// Inputs above 100 are clamped before scaling.
pub fn percent_to_extension(percent: u8) -> u8 {
    (u16::from(percent.min(100)) * 255 / 100) as u8
}

/// Scales a 0..=255 wire extension byte back to a 0..=100 position.
///
/// Rounds to the nearest percent so a value produced by
/// [`percent_to_extension`] maps back onto the percent it came from.
pub fn extension_to_percent(extension: u8) -> u8 {
    ((u16::from(extension) * 100 + 127) / 255) as u8
}

/// True if both bytes of a house-code pair are in the valid 0..=99 range.
pub fn house_codes_valid(hc1: u8, hc2: u8) -> bool {
    hc1 <= HOUSE_CODE_MAX && hc2 <= HOUSE_CODE_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::VALVE_ID_NONE;

    #[test]
    fn test_checksum_matches_hand_computed_value() {
        let cmd = ValveCommand {
            house_code1: 13,
            house_code2: 74,
            opcode: CMD_VALVE_SET,
            extension: 0x7f,
        };
        // 0x0c + 13 + 74 + 0 + 0x26 + 0x7f = 0x102 -> 0x02 mod 256.
        assert_eq!(cmd.checksum(), 0x02);
    }

    #[test]
    fn test_checksum_wraps_modulo_256() {
        let cmd = ValveCommand {
            house_code1: 0xff,
            house_code2: 0xff,
            opcode: 0xff,
            extension: 0xff,
        };
        assert_eq!(cmd.checksum(), CHECKSUM_BASE.wrapping_add(0xfc));
    }

    #[test]
    fn test_valve_set_scales_endpoints_exactly() {
        assert_eq!(ValveCommand::valve_set(1, 2, 0).extension, 0);
        assert_eq!(ValveCommand::valve_set(1, 2, 100).extension, 255);
        assert_eq!(ValveCommand::valve_set(1, 2, 50).extension, 127);
    }

    #[test]
    fn test_valve_set_clamps_out_of_range_percent() {
        assert_eq!(ValveCommand::valve_set(1, 2, 250).extension, 255);
    }

    #[test]
    fn test_percent_scaling_round_trips_every_value() {
        for percent in 0..=100u8 {
            let ext = percent_to_extension(percent);
            assert_eq!(extension_to_percent(ext), percent, "percent {}", percent);
        }
    }

    #[test]
    fn test_sync_constructors_set_expected_opcodes() {
        let countdown = ValveCommand::sync_countdown(10, 20, 241);
        assert_eq!(countdown.opcode, CMD_SYNC_COUNTDOWN);
        assert_eq!(countdown.extension, 241);

        let fin = ValveCommand::sync_final(10, 20);
        assert_eq!(fin.opcode, CMD_SYNC_FINAL);
        assert_eq!(fin.extension, 0);
        assert!(!fin.is_valve_set());
    }

    #[test]
    fn test_pairing_id_packs_house_codes_big_endian() {
        let cmd = ValveCommand::valve_set(0x12, 0x34, 10);
        assert_eq!(cmd.pairing_id(), 0x1234);
    }

    #[test]
    fn test_unset_house_codes_map_to_reserved_id() {
        let cmd = ValveCommand::valve_set(0xff, 0xff, 10);
        assert_eq!(cmd.pairing_id(), VALVE_ID_NONE);
        assert!(!house_codes_valid(0xff, 0xff));
    }

    #[test]
    fn test_house_code_validity_boundaries() {
        assert!(house_codes_valid(0, 0));
        assert!(house_codes_valid(99, 99));
        assert!(!house_codes_valid(100, 0));
        assert!(!house_codes_valid(0, 100));
    }
}
