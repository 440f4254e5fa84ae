//! Synchronization engine pacing transmissions into the valve's listening
//! windows.
//!
//! ## Purpose
//!
//! The remote valve keeps its receiver powered for only a few milliseconds
//! at a time, on a schedule derived from its house code. A controller that
//! wants to be heard must first run the pairing handshake (roughly two
//! minutes of descending countdown frames, one per second, closed by a
//! final frame), after which both sides agree on the window schedule and a
//! single replayed frame every `230 + (hc2 & 7)` half-seconds keeps the
//! valve commanded.
//!
//! ## Timing model
//!
//! The main loop runs 2 second minor cycles split into four half-second
//! slots. [`ValveSync::poll_first`] is called at slot 0 of every cycle and
//! [`ValveSync::poll_next`] at each later slot while the previous call
//! returned `true`. Time is therefore carried by the call stream itself:
//! when the next transmission cannot fall inside the current cycle the
//! engine charges its counter for the slots it will not see and returns
//! `false`, so the node can sleep out the rest of the cycle without
//! distorting the schedule.
//!
//! ## Entry points
//!
//! Commanded state changes ([`ValveSync::set_open_percent`],
//! [`ValveSync::set_house_codes`], [`ValveSync::resync`]) take effect on
//! the next window; nothing is transmitted outside a poll call. With an
//! unset or out-of-range house code every poll returns `false` and the
//! engine stays in [`SyncPhase::Unsynced`].

use crate::command::{ValveCommand, house_codes_valid};
use crate::consts::{
    DOUBLE_TX_GAP_MS, HALF_SECOND_MS, HALF_SECONDS_PER_CYCLE, MIN_VALVE_PC_REALLY_OPEN,
    STEADY_DOUBLE_TX_SPACING, SYNC_COUNTDOWN_START, SYNC_FINAL_BASE_HALF_SECONDS,
    TX_GAP_BASE_HALF_SECONDS,
};
use crate::encoding::{FrameBuffer, encode};
use crate::io::{MinorCycleClock, RadioLink};
use log::{debug, info, trace};

/// Pairing state of one controlled valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// No handshake attempted yet, or state was discarded by a resync.
    #[default]
    Unsynced,
    /// Transmitting the descending countdown, one frame per second.
    CountingDown,
    /// Countdown finished; waiting out the house-code delay before the
    /// final frame.
    AwaitingFinal,
    /// Window schedule agreed; steady-state replay of the valve command.
    Locked,
}

/// Synchronization and transmission state machine for one valve.
///
/// Owned by the main loop; all mutation happens through `&mut self` poll
/// calls, so no locking is involved. The radio and clock are borrowed per
/// call rather than owned, letting a combined node share them with its hub
/// duties.
#[derive(Debug)]
pub struct ValveSync {
    house_code1: u8,
    house_code2: u8,
    phase: SyncPhase,
    /// Countdown value transmitted while `CountingDown`; odd from 241 down
    /// to 1.
    countdown: u8,
    /// Half-second calls until the sync-final frame, pre-charged for slots
    /// the engine sleeps through.
    ticks_to_final: u8,
    /// Half-second calls until the next steady-state replay, same
    /// pre-charge discipline.
    ticks_to_next_tx: u8,
    /// Slot index within the current minor cycle, 0..=3.
    half_second: u8,
    open_percent: u8,
    min_open_percent: u8,
    valve_open: bool,
    steady_double_tx: bool,
    /// Steady transmissions since the last doubled one.
    tx_since_double: u8,
    /// Pre-encoded valve command replayed at each window.
    tx_frame: FrameBuffer,
}

impl ValveSync {
    /// Creates an engine for the given house code pair, unsynchronized,
    /// commanding 0% open.
    ///
    /// # Arguments
    ///
    /// * `house_code1` / `house_code2` - The valve's pairing bytes, each in
    ///   0..=99. An invalid pair (including the unset `0xff/0xff`) leaves
    ///   the engine permanently idle until [`set_house_codes`]
    ///   (ValveSync::set_house_codes) provides a real one.
    pub fn new(house_code1: u8, house_code2: u8) -> Self {
        ValveSync {
            house_code1,
            house_code2,
            phase: SyncPhase::Unsynced,
            countdown: 0,
            ticks_to_final: 0,
            ticks_to_next_tx: 0,
            half_second: 0,
            open_percent: 0,
            min_open_percent: MIN_VALVE_PC_REALLY_OPEN,
            valve_open: false,
            steady_double_tx: false,
            tx_since_double: 0,
            tx_frame: FrameBuffer::new(),
        }
    }

    /// Enables or disables doubling of steady-state transmissions.
    ///
    /// Doubled frames cost battery and channel time, so even when enabled
    /// at most one steady transmission in four is doubled, and none while
    /// the channel reports foreign traffic.
    pub fn set_steady_double_tx(&mut self, enabled: bool) {
        self.steady_double_tx = enabled;
    }

    /// Sets the percentage at or above which the valve counts as open for
    /// call-for-heat purposes. Clamped to 0..=100.
    pub fn set_min_open_percent(&mut self, percent: u8) {
        self.min_open_percent = percent.min(100);
    }

    /// Commands a new valve position, clamped to 0..=100.
    ///
    /// While locked the replay frame is re-encoded at once, so the next
    /// listening window carries the new value; earlier phases pick the
    /// value up when the frame is first composed.
    pub fn set_open_percent(&mut self, percent: u8) {
        self.open_percent = percent.min(100);
        if self.phase == SyncPhase::Locked {
            self.compose_tx_frame();
        }
    }

    /// Discards all pairing progress and returns to `Unsynced`.
    ///
    /// The commanded percent survives; the next poll restarts the
    /// handshake from the top of the countdown.
    pub fn resync(&mut self) {
        self.phase = SyncPhase::Unsynced;
        self.countdown = 0;
        self.ticks_to_final = 0;
        self.ticks_to_next_tx = 0;
        self.half_second = 0;
        self.valve_open = false;
        self.tx_since_double = 0;
        self.tx_frame.reset();
        debug!("sync state discarded, handshake will restart");
    }

    /// Re-pairs against a different valve: stores the new house code pair
    /// and resyncs.
    pub fn set_house_codes(&mut self, house_code1: u8, house_code2: u8) {
        self.house_code1 = house_code1;
        self.house_code2 = house_code2;
        self.resync();
    }

    /// The house code pair this engine transmits to.
    pub fn house_code(&self) -> (u8, u8) {
        (self.house_code1, self.house_code2)
    }

    /// Current pairing phase, for status reporting.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// True once the handshake has completed and steady-state replay is
    /// running.
    pub fn is_locked(&self) -> bool {
        self.phase == SyncPhase::Locked
    }

    /// The currently commanded open percentage.
    pub fn commanded_open_percent(&self) -> u8 {
        self.open_percent
    }

    /// True if the last successfully transmitted command opens the valve
    /// far enough to count as a call for heat. Always false before lock
    /// and immediately after sync-final, which closes the valve.
    pub fn is_valve_open(&self) -> bool {
        self.valve_open
    }

    /// First poll of a minor cycle: marks cycle start on the clock and
    /// runs slot 0.
    ///
    /// # Returns
    ///
    /// `true` if the engine needs further half-second calls this cycle.
    pub fn poll_first<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
    ) -> bool {
        clock.begin_cycle();
        self.half_second = 0;
        self.poll(radio, clock)
    }

    /// Poll at the next half-second slot of the current cycle.
    ///
    /// # Returns
    ///
    /// `true` if the engine needs further half-second calls this cycle.
    pub fn poll_next<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
    ) -> bool {
        self.half_second = (self.half_second + 1).min(HALF_SECONDS_PER_CYCLE - 1);
        self.poll(radio, clock)
    }

    fn poll<R: RadioLink, C: MinorCycleClock>(&mut self, radio: &mut R, clock: &mut C) -> bool {
        if !house_codes_valid(self.house_code1, self.house_code2) {
            return false;
        }
        match self.phase {
            SyncPhase::Unsynced => {
                self.countdown = SYNC_COUNTDOWN_START;
                self.phase = SyncPhase::CountingDown;
                debug!(
                    "sync countdown started for hc {}/{}",
                    self.house_code1, self.house_code2
                );
                self.step_countdown(radio, clock)
            }
            SyncPhase::CountingDown => self.step_countdown(radio, clock),
            SyncPhase::AwaitingFinal => self.step_awaiting_final(radio, clock),
            SyncPhase::Locked => self.step_locked(radio, clock),
        }
    }

    /// Half-second calls remaining in this cycle after the current one.
    fn calls_left_this_cycle(&self) -> u8 {
        (HALF_SECONDS_PER_CYCLE - 1) - self.half_second
    }

    /// Steady-state replay interval in half-seconds, a function of the
    /// second house code byte alone.
    fn next_tx_gap(&self) -> u8 {
        TX_GAP_BASE_HALF_SECONDS + (self.house_code2 & 7)
    }

    fn compose_tx_frame(&mut self) {
        let command =
            ValveCommand::valve_set(self.house_code1, self.house_code2, self.open_percent);
        self.tx_frame = encode(&command);
    }

    /// Sleeps to this slot's offset and double-transmits a handshake
    /// frame.
    fn transmit_handshake<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
        command: &ValveCommand,
    ) {
        let frame = encode(command);
        let _ = clock.sleep_until_offset_ms(u16::from(self.half_second) * HALF_SECOND_MS);
        let sent = radio.send(frame.tx_bytes(), false);
        trace!(
            "handshake tx opcode {:#04x} ext {} sent={}",
            command.opcode, command.extension, sent
        );
        clock.sleep_ms(DOUBLE_TX_GAP_MS);
        let _ = radio.send(frame.tx_bytes(), true);
    }

    fn step_countdown<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
    ) -> bool {
        if self.half_second % 2 != 0 {
            // Countdown steps run on whole seconds only; slot 1 keeps the
            // calls coming, slot 3 is never reached.
            return self.half_second == 1;
        }
        if self.countdown % 2 == 1 {
            let command = ValveCommand::sync_countdown(
                self.house_code1,
                self.house_code2,
                self.countdown,
            );
            self.transmit_handshake(radio, clock, &command);
        }
        // Stays odd: 241, 239, .. 1.
        self.countdown -= 2;
        if self.countdown == 1 {
            self.ticks_to_final = SYNC_FINAL_BASE_HALF_SECONDS + (self.house_code2 & 7)
                - self.calls_left_this_cycle();
            self.phase = SyncPhase::AwaitingFinal;
            debug!(
                "sync countdown complete, final frame in {} half-second calls",
                self.ticks_to_final
            );
            return false;
        }
        self.half_second == 0
    }

    fn step_awaiting_final<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
    ) -> bool {
        self.ticks_to_final -= 1;
        if self.ticks_to_final == 0 {
            let command = ValveCommand::sync_final(self.house_code1, self.house_code2);
            self.transmit_handshake(radio, clock, &command);
            // Sync-final closes the valve; the first replay re-commands it.
            self.valve_open = false;
            self.phase = SyncPhase::Locked;
            self.compose_tx_frame();
            self.ticks_to_next_tx = self.next_tx_gap() - self.calls_left_this_cycle();
            info!(
                "hc {}/{} synchronised, replay every {} half-seconds",
                self.house_code1,
                self.house_code2,
                self.next_tx_gap()
            );
            return false;
        }
        let left = self.calls_left_this_cycle();
        if self.ticks_to_final > left {
            self.ticks_to_final -= left;
            return false;
        }
        true
    }

    fn step_locked<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
    ) -> bool {
        self.ticks_to_next_tx -= 1;
        if self.ticks_to_next_tx == 0 {
            self.transmit_steady(radio, clock);
            self.ticks_to_next_tx = self.next_tx_gap() - self.calls_left_this_cycle();
            return false;
        }
        let left = self.calls_left_this_cycle();
        if self.ticks_to_next_tx > left {
            self.ticks_to_next_tx -= left;
            return false;
        }
        true
    }

    /// One steady-state window: replay the held frame, maybe doubled.
    fn transmit_steady<R: RadioLink, C: MinorCycleClock>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
    ) {
        if self.tx_frame.is_empty() {
            return;
        }
        let double = self.steady_double_tx
            && self.tx_since_double >= STEADY_DOUBLE_TX_SPACING
            && !radio.is_channel_busy();
        let _ = clock.sleep_until_offset_ms(u16::from(self.half_second) * HALF_SECOND_MS);
        let sent = radio.send(self.tx_frame.tx_bytes(), false);
        trace!(
            "steady tx pct {} doubled={} sent={}",
            self.open_percent, double, sent
        );
        if sent {
            self.valve_open = self.open_percent >= self.min_open_percent;
        }
        if double {
            clock.sleep_ms(DOUBLE_TX_GAP_MS);
            let _ = radio.send(self.tx_frame.tx_bytes(), true);
            self.tx_since_double = 0;
        } else {
            self.tx_since_double = self.tx_since_double.saturating_add(1);
        }
    }
}
