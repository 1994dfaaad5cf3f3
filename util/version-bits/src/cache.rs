use crate::{signals, BlockIndexNode, DeploymentParams, ThresholdState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

/// Per-deployment, per-period-boundary memoization of [`ThresholdState`].
///
/// All public operations take the lock once and hold it for the
/// duration of the (bounded) backward walk and forward recompute
/// described in the module-level algorithm below.
pub struct VersionBitsCache<N: Eq + Hash> {
    by_bit: Mutex<HashMap<u8, HashMap<Option<N>, ThresholdState>>>,
}

impl<N: Eq + Hash> Default for VersionBitsCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Eq + Hash> VersionBitsCache<N> {
    /// An empty cache.
    pub fn new() -> Self {
        VersionBitsCache {
            by_bit: Mutex::new(HashMap::new()),
        }
    }

    /// Drops all memoized state. Must be called whenever chain
    /// parameters (deployment definitions) change.
    pub fn clear(&self) {
        ckb_logger::warn!("version-bits: cache cleared, forced by a deployment parameter change");
        self.by_bit.lock().clear();
    }
}

impl<N: BlockIndexNode + Eq + Hash> VersionBitsCache<N> {
    /// Activation state of `dep` for a block built on top of `parent`.
    pub fn state_for(&self, parent: Option<N>, dep: &DeploymentParams) -> ThresholdState {
        if dep.is_always_active() {
            return ThresholdState::Active;
        }
        if dep.is_never_active() {
            return ThresholdState::Failed;
        }
        let mut by_bit = self.by_bit.lock();
        let cache = by_bit.entry(dep.bit()).or_default();
        compute_state_for(parent, dep, cache)
    }

    /// Height at which the deployment entered its current state, and has
    /// remained in it ever since, on the chain ending at `parent`.
    pub fn state_since_height(&self, parent: Option<N>, dep: &DeploymentParams) -> u32 {
        if dep.is_always_active() || dep.is_never_active() {
            return 0;
        }
        let initial_state = self.state_for(parent, dep);
        if initial_state == ThresholdState::Defined {
            return 0;
        }

        let period = i64::from(dep.period());
        let mut boundary = match parent {
            None => return 0,
            Some(node) => {
                let height = i64::from(node.height());
                let target = height - ((height + 1) % period);
                if target < 0 {
                    return 0;
                }
                node.ancestor_at_height(target as u32)
            }
        };
        loop {
            let prior = step_back_one_period(boundary, period);
            match prior {
                Some(node) if self.state_for(Some(node), dep) == initial_state => {
                    boundary = Some(node);
                }
                _ => break,
            }
        }
        boundary.map_or(0, |n| n.height() + 1)
    }

    /// Shorthand for `state_for(parent, dep) == Active`.
    pub fn is_active_after(&self, parent: Option<N>, dep: &DeploymentParams) -> bool {
        self.state_for(parent, dep) == ThresholdState::Active
    }

    /// The version a block built on top of `parent` should advertise:
    /// `VERSIONBITS_TOP_BITS` with one bit set per deployment currently
    /// `Started` or `LockedIn`.
    pub fn compute_block_version(&self, parent: Option<N>, deployments: &[DeploymentParams]) -> i32 {
        let mut version = crate::VERSIONBITS_TOP_BITS;
        for dep in deployments {
            if matches!(
                self.state_for(parent, dep),
                ThresholdState::Started | ThresholdState::LockedIn
            ) {
                version |= 1i32 << dep.bit();
            }
        }
        version
    }
}

/// Walks back from `node` to the ancestor exactly `period` blocks lower,
/// or `None` if that ancestor would be before genesis.
fn step_back_one_period<N: BlockIndexNode>(node: Option<N>, period: i64) -> Option<N> {
    let node = node?;
    let target = i64::from(node.height()) - period;
    if target < 0 {
        return None;
    }
    node.ancestor_at_height(target as u32)
}

/// Resolves `state_for` by walking backward to the nearest cached (or
/// sentinel) period-boundary ancestor, then replaying the transition
/// function forward over every uncached boundary found along the way.
fn compute_state_for<N: BlockIndexNode + Eq + Hash>(
    parent: Option<N>,
    dep: &DeploymentParams,
    cache: &mut HashMap<Option<N>, ThresholdState>,
) -> ThresholdState {
    let period = i64::from(dep.period());
    let mut to_compute: Vec<Option<N>> = Vec::new();
    let mut current = parent;

    let base_state = loop {
        if let Some(&state) = cache.get(&current) {
            break state;
        }
        ckb_logger::trace!(
            "version-bits: cache miss for bit {} at period boundary {:?}",
            dep.bit(),
            current.as_ref().map(BlockIndexNode::height)
        );
        match current {
            None => {
                cache.insert(None, ThresholdState::Defined);
                break ThresholdState::Defined;
            }
            Some(node) => {
                let height = i64::from(node.height());
                if (height + 1) % period != 0 {
                    // Not a period boundary yet: align down without
                    // counting this step as a state transition.
                    let aligned = height - ((height + 1) % period);
                    current = if aligned < 0 {
                        None
                    } else {
                        node.ancestor_at_height(aligned as u32)
                    };
                    continue;
                }
                to_compute.push(current);
                current = step_back_one_period(current, period);
            }
        }
    };

    let mut state = base_state;
    for period_end in to_compute.into_iter().rev() {
        state = advance_state(state, period_end, dep);
        cache.insert(period_end, state);
    }
    state
}

/// Applies one period's transition, given the state at the start of the
/// period and `period_end`, the last block of that period.
fn advance_state<N: BlockIndexNode>(
    state: ThresholdState,
    period_end: Option<N>,
    dep: &DeploymentParams,
) -> ThresholdState {
    let Some(node) = period_end else {
        return state;
    };
    match state {
        ThresholdState::Active | ThresholdState::Failed => state,
        ThresholdState::Defined => {
            let mtp = node.median_time_past();
            if mtp >= dep.timeout() {
                ThresholdState::Failed
            } else if mtp >= dep.start_time() {
                ThresholdState::Started
            } else {
                ThresholdState::Defined
            }
        }
        ThresholdState::Started => {
            let count = count_signalling(node, dep);
            let height_after_period = node.height() + 1;
            if count >= dep.threshold() && height_after_period >= dep.min_activation_height() {
                ThresholdState::LockedIn
            } else if count < dep.threshold() && node.median_time_past() >= dep.timeout() {
                ThresholdState::Failed
            } else {
                ThresholdState::Started
            }
        }
        ThresholdState::LockedIn => ThresholdState::Active,
    }
}

/// Counts signalling blocks in the period ending at (and including)
/// `period_end`.
pub(crate) fn count_signalling<N: BlockIndexNode>(period_end: N, dep: &DeploymentParams) -> u32 {
    let mut count = 0;
    let mut cursor = Some(period_end);
    for _ in 0..dep.period() {
        match cursor {
            Some(node) => {
                if signals(node.version(), dep.bit()) {
                    count += 1;
                }
                cursor = node.prev();
            }
            None => break,
        }
    }
    count
}
