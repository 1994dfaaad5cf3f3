use crate::{
    BlockIndexNode, DeploymentParams, ThresholdState, VersionBitsCache, ALWAYS_ACTIVE,
    NEVER_ACTIVE, VERSIONBITS_TOP_BITS,
};
use std::rc::Rc;

/// A minimal, singly-linked in-memory chain used only by these tests.
#[derive(Clone)]
struct TestChain {
    node: Option<Rc<TestBlock>>,
}

struct TestBlock {
    height: u32,
    median_time_past: i64,
    version: i32,
    prev: Option<Rc<TestBlock>>,
}

impl PartialEq for TestChain {
    fn eq(&self, other: &Self) -> bool {
        match (&self.node, &other.node) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
impl Eq for TestChain {}
impl std::hash::Hash for TestChain {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match &self.node {
            Some(rc) => (Rc::as_ptr(rc) as usize).hash(state),
            None => 0usize.hash(state),
        }
    }
}
impl Copy for TestChain {}

impl BlockIndexNode for TestChain {
    fn height(&self) -> u32 {
        self.node.as_ref().expect("genesis has no height").height
    }
    fn median_time_past(&self) -> i64 {
        self.node.as_ref().expect("genesis has no mtp").median_time_past
    }
    fn version(&self) -> i32 {
        self.node.as_ref().expect("genesis has no version").version
    }
    fn prev(&self) -> Option<Self> {
        self.node.as_ref().and_then(|n| n.prev.clone()).map(|node| TestChain { node: Some(node) })
    }
}

/// Builds a chain of `count` blocks, each signalling iff `signal(height)`.
/// `mtp` assigns the median-time-past at a given height.
fn build_chain(
    count: u32,
    signal: impl Fn(u32) -> bool,
    mtp: impl Fn(u32) -> i64,
) -> Option<TestChain> {
    let mut prev: Option<Rc<TestBlock>> = None;
    for height in 0..count {
        let version = if signal(height) {
            VERSIONBITS_TOP_BITS | 1
        } else {
            VERSIONBITS_TOP_BITS
        };
        prev = Some(Rc::new(TestBlock {
            height,
            median_time_past: mtp(height),
            version,
            prev,
        }));
    }
    prev.map(|node| TestChain { node: Some(node) })
}

#[test]
fn always_active_is_active_from_genesis() {
    let dep = DeploymentParams::always_active(0).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    let chain = build_chain(10, |_| false, |_| 0);
    assert_eq!(cache.state_for(chain, &dep), ThresholdState::Active);
    assert_eq!(cache.state_since_height(chain, &dep), 0);
    assert!(cache.is_active_after(chain, &dep));
    assert_eq!(dep.start_time(), ALWAYS_ACTIVE);
}

#[test]
fn never_active_is_failed_from_genesis() {
    let dep = DeploymentParams::never_active(1).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    let chain = build_chain(10, |_| true, |_| 0);
    assert_eq!(cache.state_for(chain, &dep), ThresholdState::Failed);
    assert_eq!(dep.start_time(), NEVER_ACTIVE);
}

#[test]
fn locks_in_and_activates_on_threshold() {
    // period=100, threshold=90, bit=5. Every block from height 100 signals.
    let dep = DeploymentParams::new(5, 0, i64::MAX, 0, 100, 90).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();

    // First period (heights 0..99): mtp >= start_time immediately, so it
    // moves DEFINED -> STARTED at the height-99 boundary; signalling in
    // that same period doesn't count toward lock-in (the period's state
    // was DEFINED throughout).
    // Second period (heights 100..199): all blocks signal -> threshold
    // met, and STARTED -> LOCKED_IN is evaluated at this same boundary.
    // Third period: LOCKED_IN -> ACTIVE unconditionally.
    let chain = build_chain(300, |h| h >= 100, |_| 1);

    let at_height_99 = chain.unwrap().ancestor_at_height(99).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_99), &dep),
        ThresholdState::Started
    );

    let at_height_199 = chain.unwrap().ancestor_at_height(199).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_199), &dep),
        ThresholdState::LockedIn
    );

    let at_height_299 = chain.unwrap().ancestor_at_height(299).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_299), &dep),
        ThresholdState::Active
    );
}

#[test]
fn does_not_lock_in_below_threshold() {
    let dep = DeploymentParams::new(5, 0, i64::MAX, 0, 100, 90).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    // Only 89 of the 100 blocks in the second period (100..=199) signal.
    let chain = build_chain(300, |h| (100..189).contains(&h), |_| 1);
    let at_height_199 = chain.unwrap().ancestor_at_height(199).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_199), &dep),
        ThresholdState::Started
    );
}

#[test]
fn min_activation_height_delays_lock_in() {
    let dep = DeploymentParams::new(5, 0, i64::MAX, 250, 100, 90).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    let chain = build_chain(400, |h| h >= 100, |_| 1);

    // threshold met at height 199, but min_activation_height is 250, so
    // it must stay STARTED through this boundary...
    let at_height_199 = chain.unwrap().ancestor_at_height(199).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_199), &dep),
        ThresholdState::Started
    );
    // ...and lock in at the next boundary where height+1 >= 250.
    let at_height_299 = chain.unwrap().ancestor_at_height(299).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_299), &dep),
        ThresholdState::LockedIn
    );
}

#[test]
fn failed_after_timeout_without_threshold() {
    let dep = DeploymentParams::new(5, 0, 1, 0, 100, 90).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    let chain = build_chain(300, |_| false, |_| 2);
    let at_height_199 = chain.unwrap().ancestor_at_height(199).unwrap();
    assert_eq!(
        cache.state_for(Some(at_height_199), &dep),
        ThresholdState::Failed
    );
}

#[test]
fn compute_block_version_ors_in_started_and_locked_in_bits() {
    let period = 100;
    let never_started_dep = DeploymentParams::new(1, i64::MAX, i64::MAX, 0, period, 90).unwrap();
    let always_dep = DeploymentParams::always_active(2).unwrap();
    let started_dep = DeploymentParams::new(5, 0, i64::MAX, 0, period, 90).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    // Every block from height 100 signals bit 5, enough to lock in at the
    // height-199 boundary; at height 99 the deployment is still STARTED.
    let chain = build_chain(300, |h| h >= 100, |_| 1);

    let at_height_99 = chain.unwrap().ancestor_at_height(99).unwrap();
    let deps = [never_started_dep, always_dep, started_dep];
    let version = cache.compute_block_version(Some(at_height_99), &deps);
    assert_eq!(version & crate::VERSIONBITS_TOP_MASK, VERSIONBITS_TOP_BITS);
    // STARTED deployment's bit is OR'd in.
    assert_eq!(version & (1 << 5), 1 << 5);
    // DEFINED and ACTIVE deployments never get a bit OR'd in.
    assert_eq!(version & (1 << 1), 0);
    assert_eq!(version & (1 << 2), 0);

    let at_height_199 = chain.unwrap().ancestor_at_height(199).unwrap();
    let version = cache.compute_block_version(Some(at_height_199), &deps);
    // LOCKED_IN deployment's bit is also OR'd in.
    assert_eq!(version & (1 << 5), 1 << 5);
}

#[test]
fn signalling_stats_reports_partial_period() {
    let dep = DeploymentParams::new(5, 0, i64::MAX, 0, 100, 90).unwrap();
    let cache: VersionBitsCache<TestChain> = VersionBitsCache::new();
    let chain = build_chain(150, |h| h >= 100, |_| 1);

    let at_height_120 = chain.unwrap().ancestor_at_height(120).unwrap();
    cache.state_for(Some(at_height_120), &dep);
    let stats = cache
        .signalling_stats(Some(at_height_120), &dep)
        .expect("deployment should be in its signalling window");
    assert_eq!(stats.period, 100);
    assert_eq!(stats.elapsed, 21);
    assert_eq!(stats.count, 21);
    assert_eq!(stats.threshold, 90);
    assert!(stats.possible);
}
