use crate::{BlockIndexNode, DeploymentParams, ThresholdState, VersionBitsCache};
use std::hash::Hash;

/// A read-only snapshot of a deployment's progress through its current
/// signalling period, for operator-facing status reporting. Carries no
/// state beyond what [`VersionBitsCache`] already holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignallingStats {
    /// Length of one signalling period, in blocks.
    pub period: u32,
    /// Blocks of the current period seen so far.
    pub elapsed: u32,
    /// Signalling blocks seen so far in the current period.
    pub count: u32,
    /// Signalling blocks required to lock in.
    pub threshold: u32,
    /// Whether the threshold can still be met with the blocks remaining
    /// in the period.
    pub possible: bool,
}

impl<N: BlockIndexNode + Eq + Hash> VersionBitsCache<N> {
    /// Reports `dep`'s progress toward lock-in as of `parent`, or `None`
    /// when the deployment isn't currently in its signalling window
    /// (`Defined`, `LockedIn`, `Active`, `Failed`, or a sentinel).
    pub fn signalling_stats(&self, parent: Option<N>, dep: &DeploymentParams) -> Option<SignallingStats> {
        if self.state_for(parent, dep) != ThresholdState::Started {
            return None;
        }
        let node = parent?;
        let period = dep.period();
        let elapsed = (node.height() + 1) % period;
        let elapsed = if elapsed == 0 { period } else { elapsed };
        let count = count_signalling_prefix(node, dep, elapsed);
        let remaining = period - elapsed;
        let possible = dep.threshold().saturating_sub(count) <= remaining;
        Some(SignallingStats {
            period,
            elapsed,
            count,
            threshold: dep.threshold(),
            possible,
        })
    }
}

/// Like [`count_signalling`] but stops after `limit` blocks instead of a
/// full period, for reporting a partially-elapsed period.
fn count_signalling_prefix<N: BlockIndexNode>(node: N, dep: &DeploymentParams, limit: u32) -> u32 {
    let mut count = 0;
    let mut cursor = Some(node);
    for _ in 0..limit {
        match cursor {
            Some(n) => {
                if crate::signals(n.version(), dep.bit()) {
                    count += 1;
                }
                cursor = n.prev();
            }
            None => break,
        }
    }
    count
}
