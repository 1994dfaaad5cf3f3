//! Soft-fork activation state machine ("versionbits").
//!
//! Computes, for every block, the activation state of each registered
//! consensus-rule deployment from miner-signalled version-bit votes,
//! memoized per period boundary. [`VersionBitsCache`] is the entry point;
//! [`BlockIndexNode`] is the read-only view of the external block index
//! the engine walks to compute and verify that state.

mod cache;
mod node;
mod params;
mod stats;

#[cfg(test)]
mod tests;

pub use cache::VersionBitsCache;
pub use node::BlockIndexNode;
pub use params::{DeploymentParams, ParamsError, ALWAYS_ACTIVE, NEVER_ACTIVE};
pub use stats::SignallingStats;

/// Mask over the top three bits of a block version.
pub const VERSIONBITS_TOP_MASK: i32 = 0xE000_0000u32 as i32;
/// The pattern the top three bits must match for a block to be
/// considered a versionbits-signalling block.
pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;
/// Number of usable version bits (bit indices `0..VERSIONBITS_NUM_BITS`).
pub const VERSIONBITS_NUM_BITS: u8 = 29;
/// Default number of blocks per signalling period.
pub const DEFAULT_PERIOD: u32 = 2016;
/// Default number of signalling blocks required to lock in.
pub const DEFAULT_THRESHOLD: u32 = 1916;

/// Activation state of one deployment as of a given block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThresholdState {
    /// Not yet started; waiting for `median_time_past >= start_time`.
    Defined,
    /// Signalling window open; miners vote with the deployment's bit.
    Started,
    /// Threshold met; becomes `Active` at the next period boundary.
    LockedIn,
    /// Deployment rules are in force. Terminal.
    Active,
    /// Deployment did not lock in before `timeout`. Terminal.
    Failed,
}

pub(crate) fn signals(version: i32, bit: u8) -> bool {
    (version & VERSIONBITS_TOP_MASK) == VERSIONBITS_TOP_BITS && (version >> bit) & 1 == 1
}
