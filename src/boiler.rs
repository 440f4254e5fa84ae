//! Boiler-side aggregation of call-for-heat reports from many valves.
//!
//! ## Purpose
//!
//! A hub node hears the steady-state frames of every valve in range and
//! must answer one question: should the boiler fire? This module keeps a
//! small table of the most recent report per valve and expires entries
//! whose valve has gone quiet. The decision applies a two-part threshold
//! (at least one valve really open, and enough cumulative demand) with
//! hysteresis so the relay does not chatter.
//!
//! ## Concurrency
//!
//! Reports typically arrive from the radio receive interrupt while the
//! periodic tick runs in the main loop. The slot table therefore lives in
//! a [`critical_section::Mutex`] and every entry point takes `&self`
//! inside one short bounded critical section (the table has eight slots;
//! no loop exceeds that). The adopted decision is mirrored into an
//! [`AtomicBool`] so [`BoilerAggregator::is_calling_for_heat`] is a plain
//! relaxed load, safe from any context without taking the lock.
//! `new` is `const fn`, so the aggregator can live in a `static` shared
//! with the interrupt handler.
//!
//! ## Decision rule
//!
//! Each 2 second tick ages every slot, then computes
//! `desired = (some live slot >= min_individual) && (sum of live percents
//! >= min_aggregate)`. The decision actually published only changes once
//! `desired` has differed from it for `min_state_ticks` consecutive
//! ticks.

use crate::command::{ValveCommand, extension_to_percent};
use crate::consts::{
    BOILER_VALVE_SLOTS, DEFAULT_BOILER_MIN_AGGREGATE_PC, DEFAULT_BOILER_MIN_INDIVIDUAL_PC,
    DEFAULT_BOILER_MIN_STATE_TICKS, VALVE_ID_NONE, VALVE_LIVE_TICKS,
};
use crate::encoding::decode;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;
use log::{info, trace};

/// Tuning knobs for the aggregation decision.
///
/// Thresholds are percent values; `min_state_ticks` counts 2 second ticks
/// the desired decision must persist before it is adopted (150 ticks is
/// five minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoilerConfig {
    /// A single valve counts as calling for heat at or above this percent.
    pub min_individual_percent: u8,
    /// Cumulative live demand required before the boiler fires.
    pub min_aggregate_percent: u8,
    /// Hysteresis dwell, in ticks.
    pub min_state_ticks: u16,
}

impl BoilerConfig {
    /// The stock tuning: 35% individually, 50% cumulative, five minutes of
    /// dwell.
    pub const fn new() -> Self {
        BoilerConfig {
            min_individual_percent: DEFAULT_BOILER_MIN_INDIVIDUAL_PC,
            min_aggregate_percent: DEFAULT_BOILER_MIN_AGGREGATE_PC,
            min_state_ticks: DEFAULT_BOILER_MIN_STATE_TICKS,
        }
    }
}

impl Default for BoilerConfig {
    fn default() -> Self {
        BoilerConfig::new()
    }
}

/// Clamps thresholds into their working ranges: the individual threshold
/// into 1..=100 and the aggregate into `min_individual..=100`.
const fn coerce_thresholds(min_individual: u8, min_aggregate: u8) -> (u8, u8) {
    let individual = if min_individual < 1 {
        1
    } else if min_individual > 100 {
        100
    } else {
        min_individual
    };
    let aggregate = if min_aggregate < individual {
        individual
    } else if min_aggregate > 100 {
        100
    } else {
        min_aggregate
    };
    (individual, aggregate)
}

#[derive(Debug, Clone, Copy)]
struct ValveSlot {
    /// Pairing id of the reporting valve; [`VALVE_ID_NONE`] marks the slot
    /// empty.
    id: u16,
    /// Ticks of liveness remaining; negative means expired, `i8::MIN`
    /// means reclaim on the next tick.
    ticks_until_off: i8,
    percent_open: u8,
}

const EMPTY_SLOT: ValveSlot = ValveSlot {
    id: VALVE_ID_NONE,
    ticks_until_off: 0,
    percent_open: 0,
};

fn fill(slot: &mut ValveSlot, id: u16, percent_open: u8) {
    slot.id = id;
    slot.percent_open = percent_open;
    slot.ticks_until_off = VALVE_LIVE_TICKS;
}

/// Everything guarded by the critical section, as one ordinary struct.
struct Table {
    slots: [ValveSlot; BOILER_VALVE_SLOTS],
    min_individual: u8,
    min_aggregate: u8,
    min_state_ticks: u16,
    /// The adopted decision.
    call: bool,
    /// Ticks spent with `call` unchanged, for hysteresis.
    ticks_in_state: u16,
}

impl Table {
    fn submit(&mut self, id: u16, percent_open: u8) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) {
            slot.percent_open = percent_open;
            slot.ticks_until_off = VALVE_LIVE_TICKS;
            return true;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.id == VALVE_ID_NONE) {
            fill(slot, id, percent_open);
            return true;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.ticks_until_off < 0) {
            fill(slot, id, percent_open);
            return true;
        }
        // Table full of live entries: only a report that is itself a call
        // for heat may push out the stalest (tie: least open) slot.
        if percent_open >= self.min_individual {
            if let Some(slot) = self
                .slots
                .iter_mut()
                .min_by_key(|s| (s.ticks_until_off, s.percent_open))
            {
                fill(slot, id, percent_open);
                return true;
            }
        }
        false
    }

    fn tick(&mut self) -> bool {
        let mut any_individual = false;
        let mut cumulative: u16 = 0;
        let mut aggregate_met = false;
        for slot in self.slots.iter_mut() {
            if slot.id == VALVE_ID_NONE {
                continue;
            }
            if slot.ticks_until_off == i8::MIN {
                *slot = EMPTY_SLOT;
                continue;
            }
            slot.ticks_until_off -= 1;
            if slot.ticks_until_off >= 0 {
                if slot.percent_open >= self.min_individual {
                    any_individual = true;
                }
                if !aggregate_met {
                    cumulative += u16::from(slot.percent_open);
                    if cumulative >= u16::from(self.min_aggregate) {
                        aggregate_met = true;
                    }
                }
            }
        }
        let desired = any_individual && aggregate_met;
        if desired != self.call && self.ticks_in_state >= self.min_state_ticks {
            self.call = desired;
            self.ticks_in_state = 0;
        } else {
            self.ticks_in_state = self.ticks_in_state.saturating_add(1);
        }
        self.call
    }

    fn percent_open_for(&self, id: u16) -> Option<u8> {
        self.slots
            .iter()
            .find(|s| s.id == id && s.ticks_until_off >= 0)
            .map(|s| s.percent_open)
    }
}

/// Aggregates per-valve open reports into one boiler call-for-heat
/// decision.
///
/// All methods take `&self`; the aggregator is `Sync` and constructible in
/// a `static`:
///
/// ```
/// use trv868::boiler::{BoilerAggregator, BoilerConfig};
///
/// static BOILER: BoilerAggregator = BoilerAggregator::new(BoilerConfig::new());
/// ```
pub struct BoilerAggregator {
    table: Mutex<RefCell<Table>>,
    calling: AtomicBool,
}

impl BoilerAggregator {
    /// Creates an idle aggregator with every slot empty and the decision
    /// off.
    pub const fn new(config: BoilerConfig) -> Self {
        let (min_individual, min_aggregate) =
            coerce_thresholds(config.min_individual_percent, config.min_aggregate_percent);
        BoilerAggregator {
            table: Mutex::new(RefCell::new(Table {
                slots: [EMPTY_SLOT; BOILER_VALVE_SLOTS],
                min_individual,
                min_aggregate,
                min_state_ticks: config.min_state_ticks,
                call: false,
                ticks_in_state: 0,
            })),
            calling: AtomicBool::new(false),
        }
    }

    /// Records one valve's reported open percentage. Safe to call from the
    /// radio receive interrupt.
    ///
    /// An existing entry for `id` is refreshed in place. Otherwise the
    /// report claims an empty slot, then an expired one; if the table is
    /// full of live entries the stalest slot is evicted, but only for a
    /// report that itself qualifies as a call for heat.
    ///
    /// # Arguments
    ///
    /// * `id` - Reporting valve's pairing id; `0xffff` is reserved and
    ///   rejected.
    /// * `percent_open` - Reported position, 0..=100; larger values are
    ///   rejected.
    ///
    /// # Returns
    ///
    /// `true` if the report was stored.
    pub fn submit_report(&self, id: u16, percent_open: u8) -> bool {
        if id == VALVE_ID_NONE || percent_open > 100 {
            return false;
        }
        let stored =
            critical_section::with(|cs| self.table.borrow(cs).borrow_mut().submit(id, percent_open));
        trace!(
            "valve report id {:#06x} pct {} stored={}",
            id, percent_open, stored
        );
        stored
    }

    /// Ages the table by one 2 second tick and re-evaluates the decision.
    /// Main loop only, once per minor cycle.
    pub fn tick(&self) {
        let call = critical_section::with(|cs| self.table.borrow(cs).borrow_mut().tick());
        let previous = self.calling.swap(call, Ordering::Relaxed);
        if previous != call {
            info!("boiler call-for-heat now {}", if call { "on" } else { "off" });
        }
    }

    /// The published decision; a relaxed atomic load, callable from any
    /// context.
    pub fn is_calling_for_heat(&self) -> bool {
        self.calling.load(Ordering::Relaxed)
    }

    /// Replaces both thresholds, coercing them into range (individual into
    /// 1..=100, aggregate into individual..=100) rather than rejecting.
    pub fn set_thresholds(&self, min_individual: u8, min_aggregate: u8) {
        let (individual, aggregate) = coerce_thresholds(min_individual, min_aggregate);
        critical_section::with(|cs| {
            let mut table = self.table.borrow(cs).borrow_mut();
            table.min_individual = individual;
            table.min_aggregate = aggregate;
        });
    }

    /// The thresholds currently in force, `(min_individual,
    /// min_aggregate)`.
    pub fn thresholds(&self) -> (u8, u8) {
        critical_section::with(|cs| {
            let table = self.table.borrow(cs).borrow();
            (table.min_individual, table.min_aggregate)
        })
    }

    /// The live reported percent for `id`, or `None` once its report has
    /// expired or the valve was never heard.
    pub fn percent_open_for(&self, id: u16) -> Option<u8> {
        critical_section::with(|cs| self.table.borrow(cs).borrow().percent_open_for(id))
    }

    /// Decodes a captured frame and, if it is a valve-set report, submits
    /// it. Convenience for the receive drain path.
    ///
    /// # Returns
    ///
    /// `true` if a report was decoded and stored.
    pub fn submit_frame(&self, stream: &[u8]) -> bool {
        match decode(stream) {
            Ok(command) => match report_from_command(&command) {
                Some((id, percent_open)) => self.submit_report(id, percent_open),
                None => false,
            },
            Err(err) => {
                trace!("rx frame discarded: {}", err);
                false
            }
        }
    }
}

impl fmt::Debug for BoilerAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoilerAggregator")
            .field("calling", &self.is_calling_for_heat())
            .finish_non_exhaustive()
    }
}

/// Maps a decoded command to an aggregator report.
///
/// Only valve-set frames carry positions; sync traffic returns `None`.
/// The id is the frame's pairing id, so the unset house code pair maps
/// onto the reserved id and is rejected downstream.
pub fn report_from_command(command: &ValveCommand) -> Option<(u16, u8)> {
    if !command.is_valve_set() {
        return None;
    }
    Some((command.pairing_id(), extension_to_percent(command.extension)))
}
