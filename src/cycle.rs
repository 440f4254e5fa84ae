//! Minor-cycle drivers tying the protocol engines to the hardware traits.
//!
//! ## Purpose
//!
//! The main loop of a node runs one of these per 2 s minor cycle. They own
//! the ordering inside the cycle so the engines do not have to know about
//! the radio's service cadence:
//!
//! * [`run_valve_cycle`] walks the sync engine through the half-second
//!   slots of one cycle, servicing the radio before each delivery and
//!   stopping as soon as the engine reports no further interest.
//! * [`run_hub_cycle`] services the radio, advances the boiler aggregator
//!   by one tick and pushes the resulting decision into the boiler output.
//!
//! A combined node calls both, hub work first, then the valve slots. The
//! aggregator must see exactly one tick per minor cycle for its
//! live-window and hysteresis arithmetic to stay calibrated.

use crate::boiler::BoilerAggregator;
use crate::consts::{HALF_SECONDS_PER_CYCLE, HALF_SECOND_MS};
use crate::io::{BoilerOutput, MinorCycleClock, RadioLink};
use crate::sync::ValveSync;

/// Runs one valve minor cycle: radio service, first delivery, then any
/// further half-second slots the engine asks for.
///
/// The engine starts the cycle on `clock` itself during the first
/// delivery, so offsets passed to [`MinorCycleClock::sleep_until_offset_ms`]
/// here count from that moment.
pub fn run_valve_cycle<R, C>(sync: &mut ValveSync, radio: &mut R, clock: &mut C)
where
    R: RadioLink,
    C: MinorCycleClock,
{
    radio.poll();
    let mut more = sync.poll_first(radio, clock);
    let mut slot: u8 = 1;
    while more && slot < HALF_SECONDS_PER_CYCLE {
        let _ = clock.sleep_until_offset_ms(u16::from(slot) * HALF_SECOND_MS);
        radio.poll();
        more = sync.poll_next(radio, clock);
        slot += 1;
    }
}

/// Runs one hub minor cycle: radio service, one aggregator tick, then the
/// refreshed call-for-heat decision pushed into `output`.
///
/// The decision is pushed unconditionally so a boiler interface that lost
/// state (or was just connected) converges within one cycle.
pub fn run_hub_cycle<R, O>(agg: &BoilerAggregator, radio: &mut R, output: &mut O)
where
    R: RadioLink,
    O: BoilerOutput,
{
    radio.poll();
    agg.tick();
    output.set_call_for_heat(agg.is_calling_for_heat());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boiler::BoilerConfig;
    use crate::consts::DOUBLE_TX_GAP_MS;

    struct CountingRadio {
        polls: usize,
        sent: usize,
    }

    impl CountingRadio {
        fn new() -> Self {
            CountingRadio { polls: 0, sent: 0 }
        }
    }

    impl RadioLink for CountingRadio {
        fn send(&mut self, _bytes: &[u8], _quiet: bool) -> bool {
            self.sent += 1;
            true
        }

        fn poll(&mut self) {
            self.polls += 1;
        }
    }

    struct RecordingClock {
        position: u16,
        offsets: Vec<u16>,
        gaps: usize,
    }

    impl RecordingClock {
        fn new() -> Self {
            RecordingClock {
                position: 0,
                offsets: Vec::new(),
                gaps: 0,
            }
        }
    }

    impl MinorCycleClock for RecordingClock {
        fn begin_cycle(&mut self) {
            self.position = 0;
        }

        fn sleep_until_offset_ms(&mut self, offset_ms: u16) -> bool {
            self.offsets.push(offset_ms);
            if offset_ms <= self.position {
                return false;
            }
            self.position = offset_ms;
            true
        }

        fn sleep_ms(&mut self, ms: u16) {
            if ms == DOUBLE_TX_GAP_MS {
                self.gaps += 1;
            }
            self.position = self.position.saturating_add(ms);
        }
    }

    struct MockOutput {
        level: Option<bool>,
        sets: usize,
    }

    impl BoilerOutput for MockOutput {
        fn set_call_for_heat(&mut self, on: bool) {
            self.level = Some(on);
            self.sets += 1;
        }
    }

    #[test]
    fn test_valve_cycle_drives_the_handshake_to_lock() {
        let mut sync = ValveSync::new(12, 34);
        let mut radio = CountingRadio::new();
        let mut clock = RecordingClock::new();

        // hc2 & 7 == 2: sync-final lands on the first slot of cycle 62.
        for _ in 0..62 {
            run_valve_cycle(&mut sync, &mut radio, &mut clock);
        }
        assert!(!sync.is_locked());
        run_valve_cycle(&mut sync, &mut radio, &mut clock);
        assert!(sync.is_locked());

        // First countdown cycle: engine TX at slot 0 and slot 2, driver
        // sleeps to the slot 1 and slot 2 boundaries in between.
        assert_eq!(&clock.offsets[..4], &[0, 500, 1000, 1000]);

        // 120 countdown transmissions plus one sync-final, all doubled.
        assert_eq!(radio.sent, 242);
        assert_eq!(clock.gaps, 121);
        assert!(radio.polls >= 63);
    }

    #[test]
    fn test_idle_locked_cycle_polls_once_and_never_sleeps() {
        let mut sync = ValveSync::new(12, 34);
        let mut radio = CountingRadio::new();
        let mut clock = RecordingClock::new();
        for _ in 0..63 {
            run_valve_cycle(&mut sync, &mut radio, &mut clock);
        }
        assert!(sync.is_locked());

        radio.polls = 0;
        clock.offsets.clear();
        run_valve_cycle(&mut sync, &mut radio, &mut clock);
        assert_eq!(radio.polls, 1);
        assert!(clock.offsets.is_empty());
    }

    #[test]
    fn test_driver_delivers_the_first_steady_replay_on_schedule() {
        let mut sync = ValveSync::new(12, 34);
        let mut radio = CountingRadio::new();
        let mut clock = RecordingClock::new();
        for _ in 0..63 {
            run_valve_cycle(&mut sync, &mut radio, &mut clock);
        }
        assert!(sync.is_locked());

        // Locked at t = 248 half-seconds; next TX due at 248 + 232 = 480,
        // which is the first slot of cycle 120.
        radio.sent = 0;
        clock.gaps = 0;
        for _ in 0..57 {
            run_valve_cycle(&mut sync, &mut radio, &mut clock);
        }
        assert_eq!(radio.sent, 0);
        run_valve_cycle(&mut sync, &mut radio, &mut clock);
        assert_eq!(radio.sent, 1);
        // Steady replays are single sends unless doubling is enabled.
        assert_eq!(clock.gaps, 0);
    }

    #[test]
    fn test_hub_cycle_mirrors_the_heat_decision() {
        let config = BoilerConfig {
            min_state_ticks: 0,
            ..BoilerConfig::new()
        };
        let agg = BoilerAggregator::new(config);
        let mut radio = CountingRadio::new();
        let mut output = MockOutput {
            level: None,
            sets: 0,
        };

        assert!(agg.submit_report(0x0107, 80));
        run_hub_cycle(&agg, &mut radio, &mut output);
        assert_eq!(output.level, Some(true));

        // The report expires after its live window with no refresh.
        for _ in 0..60 {
            run_hub_cycle(&agg, &mut radio, &mut output);
        }
        assert_eq!(output.level, Some(false));
        assert_eq!(output.sets, 61);
        assert_eq!(radio.polls, 61);
    }
}
