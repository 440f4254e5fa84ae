//! Construction-time configuration for a whole node.
//!
//! ## Purpose
//!
//! One binary serves every deployment shape: a leaf that only commands its
//! own valve, a hub that only aggregates for the boiler, or a combined
//! node doing both. [`NodeConfig`] captures the choice plus the tuning
//! that goes with it, and the `build_*` methods construct the matching
//! protocol objects, resolving the house code against persistent storage
//! when asked to.
//!
//! ## Pairing
//!
//! House codes either ship fixed in the configuration or come from the
//! [`HouseCodeStore`]. [`provision_pairing`] covers the commissioning
//! path: persist a new pair and restart the handshake against it in one
//! step.

use crate::boiler::BoilerAggregator;
use crate::consts::MIN_VALVE_PC_REALLY_OPEN;
use crate::io::HouseCodeStore;
use crate::sync::ValveSync;

pub use crate::boiler::BoilerConfig;

/// What this node does on the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Commands one valve; transmit-only.
    #[default]
    Leaf,
    /// Aggregates valve reports and drives the boiler; receive-only.
    Hub,
    /// Both at once, sharing one radio.
    HubAndLeaf,
}

impl NodeRole {
    /// True if this node keeps the receiver listening between its own
    /// transmissions.
    pub fn rx_listening_enabled(&self) -> bool {
        matches!(self, NodeRole::Hub | NodeRole::HubAndLeaf)
    }

    /// True if this node runs a sync engine for a valve of its own.
    pub fn controls_valve(&self) -> bool {
        matches!(self, NodeRole::Leaf | NodeRole::HubAndLeaf)
    }
}

/// Where the valve pairing comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HouseCodeSource {
    /// Compiled-in pair, for fixed installations and tests.
    Fixed {
        /// First pairing byte, 0..=99.
        house_code1: u8,
        /// Second pairing byte, 0..=99.
        house_code2: u8,
    },
    /// Read from the [`HouseCodeStore`] at build time.
    #[default]
    Stored,
}

/// Everything decided at node bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Deployment shape.
    pub role: NodeRole,
    /// Valve pairing source; ignored by a pure hub.
    pub house_code: HouseCodeSource,
    /// Whether steady-state transmissions may be doubled.
    pub steady_double_tx: bool,
    /// Percent at which the local valve counts as open.
    pub min_open_percent: u8,
    /// Aggregation tuning; ignored by a pure leaf.
    pub boiler: BoilerConfig,
}

impl NodeConfig {
    /// A configuration with stock tuning for the given role and pairing
    /// source.
    pub const fn new(role: NodeRole, house_code: HouseCodeSource) -> Self {
        NodeConfig {
            role,
            house_code,
            steady_double_tx: false,
            min_open_percent: MIN_VALVE_PC_REALLY_OPEN,
            boiler: BoilerConfig::new(),
        }
    }

    /// Builds the sync engine for this node's valve, resolving the house
    /// code against `store` when the configuration says so.
    ///
    /// An unprovisioned store yields the unset pair, leaving the engine
    /// idle until [`provision_pairing`] supplies a real one.
    pub fn build_sync<S: HouseCodeStore>(&self, store: &mut S) -> ValveSync {
        let (house_code1, house_code2) = match self.house_code {
            HouseCodeSource::Fixed {
                house_code1,
                house_code2,
            } => (house_code1, house_code2),
            HouseCodeSource::Stored => store.read_house_code(),
        };
        let mut sync = ValveSync::new(house_code1, house_code2);
        sync.set_steady_double_tx(self.steady_double_tx);
        sync.set_min_open_percent(self.min_open_percent);
        sync
    }

    /// Builds the boiler aggregator with this node's tuning.
    pub fn build_aggregator(&self) -> BoilerAggregator {
        BoilerAggregator::new(self.boiler)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig::new(NodeRole::Leaf, HouseCodeSource::Stored)
    }
}

/// Commissions a new valve pairing: persists the pair and restarts the
/// engine's handshake against it.
pub fn provision_pairing<S: HouseCodeStore>(
    store: &mut S,
    sync: &mut ValveSync,
    house_code1: u8,
    house_code2: u8,
) {
    store.write_house_code(house_code1, house_code2);
    sync.set_house_codes(house_code1, house_code2);
}
