//! Bit-level wire form of valve command frames.
//!
//! ## Purpose
//!
//! The remote valve samples the radio channel in fixed 200 microsecond
//! half-bit slots. A logical `0` is the four-slot pattern `1100`, a logical
//! `1` the six-slot pattern `111000`; slots are packed MSB-first into bytes.
//! A frame is twelve zero bits of preamble (six `0xcc` bytes on the wire),
//! one leading `1`, the six protected record bytes each followed by an
//! even-parity bit, and one trailing `0`; the final partial byte is padded
//! with zero slots.
//!
//! ## Terminator
//!
//! No run of set half-bits can exceed three, so the byte `0xff` can never
//! occur inside a valid encoding. Buffers therefore end with a literal
//! `0xff` terminator that is never transmitted, and a buffer whose first
//! byte is the terminator holds no frame. Worst case over all field values
//! the meaningful encoding spans 35..=45 bytes, so a 46-byte buffer always
//! fits.
//!
//! ## Functions
//!
//! - [`encode`]: total over all field values, cannot fail
//! - [`decode`]: returns a typed [`DecodeError`] for malformed input and
//!   never panics; corrupt captures on a shared band are routine, not
//!   exceptional
//!
//! ## Usage
//!
//! [`encode`](crate::encoding::encode) runs once per command composition and
//! the resulting [`FrameBuffer`] is replayed on every transmission until the
//! command changes. [`decode`](crate::encoding::decode) runs on the hub side
//! over whatever byte window the receiver captured, tolerating leftover
//! preamble at the front.

use crate::command::ValveCommand;
use crate::consts::{CHECKSUM_BASE, FRAME_BUF_LEN, FRAME_TERMINATOR, PREAMBLE_LEN};
use heapless::Vec;
use thiserror::Error;

/// Reasons a captured bit stream failed to decode into a command record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The stream ended before the frame was complete.
    #[error("bit stream ended before the frame completed")]
    TruncatedStream,
    /// A bit did not open with the required `11` half-bit pair.
    #[error("bit did not open with the 11 half-bit pair")]
    BadLeadingEdge,
    /// The half-bit pair after a bit's leading edge fit neither the zero
    /// nor the one pattern.
    #[error("half-bit pair fits neither bit pattern")]
    BadSymbolPair,
    /// A record byte failed its even-parity check.
    #[error("per-byte parity check failed")]
    ParityMismatch,
    /// The checksum byte did not match the five bytes it protects.
    #[error("frame checksum does not match its fields")]
    ChecksumMismatch,
    /// The frame did not end with the single trailing zero bit.
    #[error("frame does not end with the trailing zero bit")]
    MissingTrailer,
}

/// Fixed-capacity byte buffer holding one encoded frame.
///
/// The buffer always ends with the [`FRAME_TERMINATOR`] byte, which is not
/// part of the transmitted data. A freshly reset buffer holds only the
/// terminator, so its first byte marks it empty; a populated buffer starts
/// with the first preamble byte and can never start with the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    bytes: Vec<u8, FRAME_BUF_LEN>,
}

impl FrameBuffer {
    /// Creates an empty buffer holding only the terminator.
    pub fn new() -> Self {
        let mut buf = FrameBuffer { bytes: Vec::new() };
        buf.reset();
        buf
    }

    /// Discards any held frame, leaving only the terminator.
    pub fn reset(&mut self) {
        self.bytes.clear();
        let _ = self.bytes.push(FRAME_TERMINATOR);
    }

    /// True if no frame is held; equivalently, the first byte is the
    /// terminator.
    pub fn is_empty(&self) -> bool {
        self.bytes[0] == FRAME_TERMINATOR
    }

    /// Number of meaningful bytes held, excluding the terminator.
    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    /// The whole buffer including the trailing terminator byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The transmittable prefix: every meaningful byte, terminator excluded.
    pub fn tx_bytes(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        FrameBuffer::new()
    }
}

/// Accumulates half-bit slots MSB-first into a frame buffer.
struct BitWriter {
    bytes: Vec<u8, FRAME_BUF_LEN>,
    current: u8,
    filled: u8,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            bytes: Vec::new(),
            current: 0,
            filled: 0,
        }
    }

    fn push_half_bit(&mut self, set: bool) {
        if set {
            self.current |= 0x80 >> self.filled;
        }
        self.filled += 1;
        if self.filled == 8 {
            let _ = self.bytes.push(self.current);
            self.current = 0;
            self.filled = 0;
        }
    }

    fn push_bit(&mut self, bit: bool) {
        self.push_half_bit(true);
        self.push_half_bit(true);
        if bit {
            self.push_half_bit(true);
            self.push_half_bit(false);
        }
        self.push_half_bit(false);
        self.push_half_bit(false);
    }

    fn push_byte_with_parity(&mut self, byte: u8) {
        for shift in (0..8).rev() {
            self.push_bit((byte >> shift) & 1 != 0);
        }
        self.push_bit(byte.count_ones() % 2 == 1);
    }

    fn finish(mut self) -> FrameBuffer {
        if self.filled > 0 {
            let _ = self.bytes.push(self.current);
        }
        let _ = self.bytes.push(FRAME_TERMINATOR);
        FrameBuffer { bytes: self.bytes }
    }
}

/// Walks a captured byte slice half-bit by half-bit.
struct BitReader<'a> {
    stream: &'a [u8],
    pos: usize,
}

impl BitReader<'_> {
    fn next_half_bit(&mut self) -> Result<bool, DecodeError> {
        let byte = self
            .stream
            .get(self.pos / 8)
            .ok_or(DecodeError::TruncatedStream)?;
        let set = (byte >> (7 - (self.pos % 8))) & 1 != 0;
        self.pos += 1;
        Ok(set)
    }

    fn next_pair(&mut self) -> Result<(bool, bool), DecodeError> {
        Ok((self.next_half_bit()?, self.next_half_bit()?))
    }

    fn next_bit(&mut self) -> Result<bool, DecodeError> {
        if self.next_pair()? != (true, true) {
            return Err(DecodeError::BadLeadingEdge);
        }
        match self.next_pair()? {
            (false, false) => Ok(false),
            (true, false) => match self.next_pair()? {
                (false, false) => Ok(true),
                _ => Err(DecodeError::BadSymbolPair),
            },
            _ => Err(DecodeError::BadSymbolPair),
        }
    }

    fn next_byte(&mut self) -> Result<u8, DecodeError> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | u8::from(self.next_bit()?);
        }
        let parity = self.next_bit()?;
        if (byte.count_ones() + u32::from(parity)) % 2 != 0 {
            return Err(DecodeError::ParityMismatch);
        }
        Ok(byte)
    }
}

/// Encodes a command record into its transmittable half-bit stream.
///
/// Total over every possible field value: the checksum is derived here and
/// the buffer capacity is a static worst-case bound, so no input can fail.
///
/// # Arguments
///
/// * `command` - The record to encode; its checksum is computed and written
///   as the sixth protected byte.
pub fn encode(command: &ValveCommand) -> FrameBuffer {
    let mut writer = BitWriter::new();
    // Twelve encoded zeros come out as exactly six 0xcc preamble bytes.
    for _ in 0..PREAMBLE_LEN * 2 {
        writer.push_bit(false);
    }
    writer.push_bit(true);
    for byte in [
        command.house_code1,
        command.house_code2,
        0,
        command.opcode,
        command.extension,
        command.checksum(),
    ] {
        writer.push_byte_with_parity(byte);
    }
    writer.push_bit(false);
    writer.finish()
}

/// Decodes a captured half-bit stream back into a command record.
///
/// Skips any leading encoded zeros (preamble the receiver did not strip),
/// discards the single leading one, reads the six parity-checked record
/// bytes, verifies the running checksum, and requires the trailing zero
/// bit. The reserved address byte participates in the checksum but is not
/// surfaced.
///
/// # Arguments
///
/// * `stream` - Captured bytes, MSB-first half-bit slots. A trailing
///   terminator byte is tolerated but not required.
///
/// # Returns
///
/// The decoded record, or the first [`DecodeError`] encountered.
pub fn decode(stream: &[u8]) -> Result<ValveCommand, DecodeError> {
    let mut reader = BitReader { stream, pos: 0 };
    while !reader.next_bit()? {}
    let house_code1 = reader.next_byte()?;
    let house_code2 = reader.next_byte()?;
    let address = reader.next_byte()?;
    let opcode = reader.next_byte()?;
    let extension = reader.next_byte()?;
    let checksum = reader.next_byte()?;
    let expected = CHECKSUM_BASE
        .wrapping_add(house_code1)
        .wrapping_add(house_code2)
        .wrapping_add(address)
        .wrapping_add(opcode)
        .wrapping_add(extension);
    if checksum != expected {
        return Err(DecodeError::ChecksumMismatch);
    }
    if reader.next_bit()? {
        return Err(DecodeError::MissingTrailer);
    }
    Ok(ValveCommand {
        house_code1,
        house_code2,
        opcode,
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{MAX_FRAME_LEN, MIN_FRAME_LEN, PREAMBLE_BYTE};

    /// Half-bit slots one record byte occupies on the wire, parity included.
    fn half_bits_for_byte(byte: u8) -> usize {
        let ones = byte.count_ones() as usize;
        let data = ones * 6 + (8 - ones) * 4;
        let parity = if ones % 2 == 1 { 6 } else { 4 };
        data + parity
    }

    /// Meaningful half-bit slots of a whole encoded frame.
    fn encoded_half_bits(command: &ValveCommand) -> usize {
        let bytes = [
            command.house_code1,
            command.house_code2,
            0,
            command.opcode,
            command.extension,
            command.checksum(),
        ];
        let data: usize = bytes.iter().map(|b| half_bits_for_byte(*b)).sum();
        // Preamble zeros, leading one, record bytes, trailing zero.
        12 * 4 + 6 + data + 4
    }

    fn sample_commands() -> [ValveCommand; 6] {
        [
            ValveCommand::valve_set(0, 0, 0),
            ValveCommand::valve_set(99, 99, 100),
            ValveCommand::valve_set(12, 34, 50),
            ValveCommand::sync_countdown(7, 61, 241),
            ValveCommand::sync_countdown(7, 61, 3),
            ValveCommand::sync_final(45, 6),
        ]
    }

    #[test]
    fn test_round_trip_every_frame_kind() {
        for cmd in sample_commands() {
            assert_eq!(decode(encode(&cmd).as_bytes()), Ok(cmd));
        }
    }

    #[test]
    fn test_encode_is_total_over_invalid_fields() {
        let cmd = ValveCommand {
            house_code1: 200,
            house_code2: 255,
            opcode: 0x13,
            extension: 0xee,
        };
        assert_eq!(decode(encode(&cmd).as_bytes()), Ok(cmd));
    }

    #[test]
    fn test_fresh_buffer_is_terminator_only() {
        let buf = FrameBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.as_bytes(), &[FRAME_TERMINATOR]);
        assert!(buf.tx_bytes().is_empty());
    }

    #[test]
    fn test_reset_discards_a_held_frame() {
        let mut buf = encode(&ValveCommand::valve_set(1, 2, 50));
        assert!(!buf.is_empty());
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), &[FRAME_TERMINATOR]);
    }

    #[test]
    fn test_populated_buffer_starts_with_preamble_not_terminator() {
        let buf = encode(&ValveCommand::valve_set(10, 20, 75));
        assert!(!buf.is_empty());
        for byte in &buf.as_bytes()[..PREAMBLE_LEN] {
            assert_eq!(*byte, PREAMBLE_BYTE);
        }
    }

    #[test]
    fn test_terminator_never_occurs_inside_meaningful_bytes() {
        for cmd in sample_commands() {
            let buf = encode(&cmd);
            for byte in buf.tx_bytes() {
                assert_ne!(*byte, FRAME_TERMINATOR);
            }
            assert_eq!(buf.as_bytes()[buf.len()], FRAME_TERMINATOR);
        }
    }

    #[test]
    fn test_all_zero_fields_hit_the_minimum_length() {
        let cmd = ValveCommand {
            house_code1: 0,
            house_code2: 0,
            opcode: 0,
            extension: 0,
        };
        assert_eq!(encode(&cmd).len(), MIN_FRAME_LEN);
    }

    #[test]
    fn test_dense_fields_hit_the_maximum_length() {
        // Four heavy bytes whose derived checksum is 0xff as well.
        let cmd = ValveCommand {
            house_code1: 0xff,
            house_code2: 0xff,
            opcode: 0xfe,
            extension: 0xf7,
        };
        assert_eq!(cmd.checksum(), 0xff);
        assert_eq!(encode(&cmd).len(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_encoded_length_matches_the_half_bit_count() {
        for cmd in sample_commands() {
            let expected = encoded_half_bits(&cmd).div_ceil(8);
            assert_eq!(encode(&cmd).len(), expected);
        }
    }

    #[test]
    fn test_every_meaningful_half_bit_flip_is_detected() {
        let cmd = ValveCommand::valve_set(12, 34, 50);
        let clean = encode(&cmd);
        for bit in 0..encoded_half_bits(&cmd) {
            let mut corrupt: std::vec::Vec<u8> = clean.as_bytes().to_vec();
            corrupt[bit / 8] ^= 0x80 >> (bit % 8);
            assert!(decode(&corrupt).is_err(), "flip at half-bit {}", bit);
        }
    }

    #[test]
    fn test_wrong_parity_bit_reports_parity_mismatch() {
        let mut writer = BitWriter::new();
        writer.push_bit(true);
        // 0x55 has four set bits; the correct even-parity bit is zero.
        for shift in (0..8).rev() {
            writer.push_bit((0x55 >> shift) & 1 != 0);
        }
        writer.push_bit(true);
        assert_eq!(
            decode(writer.finish().as_bytes()),
            Err(DecodeError::ParityMismatch)
        );
    }

    #[test]
    fn test_flipped_data_bit_reports_parity_mismatch() {
        // Extension byte written with one data bit inverted relative to the
        // parity bit that accompanies it.
        let cmd = ValveCommand::valve_set(3, 4, 50);
        let mut writer = BitWriter::new();
        writer.push_bit(true);
        writer.push_byte_with_parity(cmd.house_code1);
        writer.push_byte_with_parity(cmd.house_code2);
        writer.push_byte_with_parity(0);
        writer.push_byte_with_parity(cmd.opcode);
        let tampered = cmd.extension ^ 0x10;
        for shift in (0..8).rev() {
            writer.push_bit((tampered >> shift) & 1 != 0);
        }
        writer.push_bit(cmd.extension.count_ones() % 2 == 1);
        writer.push_byte_with_parity(cmd.checksum());
        writer.push_bit(false);
        assert_eq!(
            decode(writer.finish().as_bytes()),
            Err(DecodeError::ParityMismatch)
        );
    }

    #[test]
    fn test_wrong_checksum_byte_reports_checksum_mismatch() {
        let cmd = ValveCommand::valve_set(3, 4, 50);
        let mut writer = BitWriter::new();
        writer.push_bit(true);
        writer.push_byte_with_parity(cmd.house_code1);
        writer.push_byte_with_parity(cmd.house_code2);
        writer.push_byte_with_parity(0);
        writer.push_byte_with_parity(cmd.opcode);
        writer.push_byte_with_parity(cmd.extension);
        writer.push_byte_with_parity(cmd.checksum().wrapping_add(3));
        writer.push_bit(false);
        assert_eq!(
            decode(writer.finish().as_bytes()),
            Err(DecodeError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_truncated_stream_is_reported() {
        let buf = encode(&ValveCommand::valve_set(1, 2, 50));
        assert_eq!(
            decode(&buf.as_bytes()[..8]),
            Err(DecodeError::TruncatedStream)
        );
        assert_eq!(decode(&[]), Err(DecodeError::TruncatedStream));
    }

    #[test]
    fn test_noise_reports_bad_leading_edge() {
        assert_eq!(decode(&[0x00, 0x00]), Err(DecodeError::BadLeadingEdge));
    }

    #[test]
    fn test_broken_symbol_reports_bad_symbol_pair() {
        // Half-bits 1101...: a valid leading edge then neither bit pattern.
        assert_eq!(decode(&[0xd0]), Err(DecodeError::BadSymbolPair));
    }

    #[test]
    fn test_one_as_trailer_reports_missing_trailer() {
        let cmd = ValveCommand::sync_final(5, 6);
        let mut writer = BitWriter::new();
        writer.push_bit(true);
        writer.push_byte_with_parity(cmd.house_code1);
        writer.push_byte_with_parity(cmd.house_code2);
        writer.push_byte_with_parity(0);
        writer.push_byte_with_parity(cmd.opcode);
        writer.push_byte_with_parity(cmd.extension);
        writer.push_byte_with_parity(cmd.checksum());
        writer.push_bit(true);
        assert_eq!(
            decode(writer.finish().as_bytes()),
            Err(DecodeError::MissingTrailer)
        );
    }

    #[test]
    fn test_decode_tolerates_partial_preamble_capture() {
        let cmd = ValveCommand::valve_set(55, 44, 30);
        let buf = encode(&cmd);
        // The receiver often eats part of the preamble before capture opens.
        for skip in 1..=PREAMBLE_LEN {
            assert_eq!(decode(&buf.as_bytes()[skip..]), Ok(cmd), "skip {}", skip);
        }
    }
}
