//! # trv868
//!
//! A portable, no_std control core for FHT8V-style 868 MHz radiator valves,
//! covering the leaf (valve controller) and hub (boiler aggregation) roles of
//! a heating network.
//!
//! This crate implements the protocol and scheduling logic in pure software:
//! - the bit-level frame codec (double-width line code, per-byte even parity
//!   and an additive checksum)
//! - the multi-second synchronization handshake that aligns a controller with
//!   its valve's listening windows
//! - steady-state command replay paced in half-second slots of a 2 second
//!   minor cycle
//! - an interrupt-safe boiler aggregator turning per-valve reports into one
//!   call-for-heat decision, guarded with `critical-section`
//! - `embedded-hal` adapters for the boiler relay pin and the cycle clock
//!
//! ## Crate features
//! | Feature | Description |
//! |---------|-------------|
//! | `std`   | Disables `#![no_std]` and lights the `std` features of `thiserror`, `critical-section` and `log`; used by the test suite |
//!
//! ## Software Features
//!
//! - **Leaf and hub roles** from one code base, selected by [`config::NodeConfig`]
//! - Frame-level corruption detection: parity per byte, a whole-frame checksum
//!   and strict line-code symbol checking
//! - Pairing persistence behind the [`io::HouseCodeStore`] trait
//! - Call-for-heat hysteresis so the boiler relay does not chatter
//! - No allocation: fixed-capacity buffers via `heapless`
//!
//! ## Usage
//!
//! A leaf node builds a sync engine and drives it once per 2 second minor
//! cycle with [`cycle::run_valve_cycle`]; the engine paces the handshake and
//! the steady replays itself:
//!
//! ```rust
//! use trv868::sync::ValveSync;
//!
//! let mut sync = ValveSync::new(13, 74);
//! sync.set_open_percent(50);
//! assert!(!sync.is_locked()); // locks after the ~2 minute handshake
//! ```
//!
//! A hub aggregates whatever reports its receiver hears and mirrors the
//! decision onto the boiler line with [`cycle::run_hub_cycle`]:
//!
//! ```rust
//! use trv868::config::{HouseCodeSource, NodeConfig, NodeRole};
//!
//! let config = NodeConfig::new(NodeRole::Hub, HouseCodeSource::Stored);
//! let boiler = config.build_aggregator();
//! assert!(boiler.submit_report(0x0d4a, 80));
//! ```
//!
//! ## Integration Notes
//!
//! - The main loop owns the cadence: one [`cycle::run_valve_cycle`] and/or
//!   [`cycle::run_hub_cycle`] per 2 second minor cycle, hub work first
//! - [`boiler::BoilerAggregator::submit_report`] is safe from the radio
//!   receive interrupt; everything else belongs to the main loop
//! - Transmission timing within a cycle rides on [`io::MinorCycleClock`];
//!   implementations should keep sleeps interruptible so receive draining
//!   is not starved
//!
//! ## Status
//!
//! The protocol core is complete and tested; radio and EEPROM drivers are
//! expected from the embedding firmware.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;
pub use heapless;

pub mod boiler;
pub mod command;
pub mod config;
pub mod consts;
pub mod cycle;
pub mod encoding;
pub mod io;
pub mod sync;
