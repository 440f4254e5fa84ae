//! Hardware seams between the protocol state machines and the board.
//!
//! ## Purpose
//!
//! The sync engine and boiler aggregator are pure state machines; everything
//! that touches a peripheral goes through one of the traits in this module.
//! Firmware supplies implementations backed by its radio driver, EEPROM and
//! timer hardware, while tests substitute scripted doubles.
//!
//! ## Traits
//!
//! - [`RadioLink`]: transmit one encoded frame, service the receiver, and
//!   report channel occupancy
//! - [`MinorCycleClock`]: blocking time source aligned to the 2 second
//!   control cycle
//! - [`HouseCodeStore`]: persistent pairing state (house code bytes and the
//!   node key)
//! - [`BoilerOutput`]: the boiler relay or equivalent demand line
//!
//! ## Adapters
//!
//! [`PinBoilerOutput`] and [`DelayClock`] bridge the output and clock traits
//! onto any `embedded-hal` [`OutputPin`] and [`DelayNs`] provider, covering
//! the common case where no dedicated timer peripheral is spare.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Transmit and receive access to the sub-GHz radio.
pub trait RadioLink {
    /// Transmits `bytes` once, blocking until the frame has left the air.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Encoded half-bit stream, terminator already stripped.
    /// * `quiet` - Hint that this is a repeat of a frame already sent this
    ///   cycle; drivers may lower power or skip channel-clear waits.
    ///
    /// # Returns
    ///
    /// `true` once the frame has been radiated, `false` if the driver could
    /// not transmit (hardware fault, buffer refused).
    fn send(&mut self, bytes: &[u8], quiet: bool) -> bool;

    /// Gives the driver CPU time to drain receive FIFOs and advance its own
    /// state. Called at least once per half-second slot.
    fn poll(&mut self);

    /// True while the channel is occupied by a foreign transmission.
    ///
    /// The default says the channel is always clear, which suits
    /// transmit-only leaf nodes without carrier sensing.
    fn is_channel_busy(&mut self) -> bool {
        false
    }
}

/// Blocking time source for the 2 second minor cycle.
///
/// Offsets are measured in milliseconds from the start of the current
/// cycle; the four half-second transmission slots sit at offsets 0, 500,
/// 1000 and 1500. Sleep implementations should stay interruptible by I/O
/// so inbound frame draining is not starved behind a long offset wait.
pub trait MinorCycleClock {
    /// Marks the start of a new minor cycle; offset 0 is now.
    fn begin_cycle(&mut self);

    /// Sleeps until `offset_ms` past the start of the current cycle.
    ///
    /// # Returns
    ///
    /// `true` if the clock slept (the offset was still ahead), `false` if
    /// the offset had already passed and no time was spent.
    fn sleep_until_offset_ms(&mut self, offset_ms: u16) -> bool;

    /// Sleeps for `ms` milliseconds regardless of cycle position.
    fn sleep_ms(&mut self, ms: u16);
}

/// Persistent pairing state, typically a few EEPROM bytes.
pub trait HouseCodeStore {
    /// Reads the stored house code pair. Unprovisioned stores return
    /// `(0xff, 0xff)`.
    fn read_house_code(&mut self) -> (u8, u8);

    /// Persists a new house code pair.
    fn write_house_code(&mut self, house_code1: u8, house_code2: u8);

    /// Reads the 128-bit node key used by the secure frame layer above
    /// this crate. All zeroes means no key has been provisioned.
    fn read_key(&mut self) -> [u8; 16] {
        [0; 16]
    }
}

/// The boiler relay or any equivalent call-for-heat demand line.
pub trait BoilerOutput {
    /// Drives the demand line: `true` asks the boiler to fire.
    fn set_call_for_heat(&mut self, on: bool);
}

/// [`BoilerOutput`] adapter over any `embedded-hal` output pin, active
/// high.
///
/// Pin errors are ignored; a GPIO that can fail to set is a board fault no
/// retry here could mend.
#[derive(Debug)]
pub struct PinBoilerOutput<P: OutputPin> {
    pin: P,
}

impl<P: OutputPin> PinBoilerOutput<P> {
    /// Wraps `pin` as the boiler demand line.
    pub fn new(pin: P) -> Self {
        PinBoilerOutput { pin }
    }

    /// Returns the wrapped pin.
    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> BoilerOutput for PinBoilerOutput<P> {
    fn set_call_for_heat(&mut self, on: bool) {
        if on {
            let _ = self.pin.set_high();
        } else {
            let _ = self.pin.set_low();
        }
    }
}

/// [`MinorCycleClock`] adapter over any `embedded-hal` [`DelayNs`]
/// provider.
///
/// Keeps its own millisecond position within the cycle, so offset sleeps
/// collapse to the remaining delta and already-passed offsets cost
/// nothing. Accuracy is that of the underlying delay; drift within a
/// cycle is reset by the next [`begin_cycle`](MinorCycleClock::begin_cycle).
#[derive(Debug)]
pub struct DelayClock<D: DelayNs> {
    delay: D,
    position_ms: u16,
}

impl<D: DelayNs> DelayClock<D> {
    /// Wraps `delay` as a minor-cycle clock positioned at offset 0.
    pub fn new(delay: D) -> Self {
        DelayClock {
            delay,
            position_ms: 0,
        }
    }

    /// Returns the wrapped delay provider.
    pub fn release(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> MinorCycleClock for DelayClock<D> {
    fn begin_cycle(&mut self) {
        self.position_ms = 0;
    }

    fn sleep_until_offset_ms(&mut self, offset_ms: u16) -> bool {
        if offset_ms <= self.position_ms {
            return false;
        }
        self.delay.delay_ms(u32::from(offset_ms - self.position_ms));
        self.position_ms = offset_ms;
        true
    }

    fn sleep_ms(&mut self, ms: u16) {
        self.delay.delay_ms(u32::from(ms));
        self.position_ms = self.position_ms.saturating_add(ms);
    }
}
