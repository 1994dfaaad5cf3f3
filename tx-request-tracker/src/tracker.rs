use crate::priority::{Priority, PriorityComputer};
use crate::types::{Announcement, GenTxid, PeerInfo, PeerId, State, TxHash};
use ckb_systemtime::Instant;
use slab::Slab;
use std::collections::{BTreeSet, HashMap};

type Key = usize;

/// Per-peer ordering key: `(peer, is_best, txhash, key)`. The uniqueness
/// invariant guarantees at most one announcement per (peer, txhash), so
/// `is_best` is fully determined once `peer` and `txhash` are fixed; it
/// is carried in the key so the "is this peer's CANDIDATE_BEST set"
/// lookup is a plain range scan.
type ByPeerKey = (PeerId, bool, TxHash, Key);

/// Per-txhash ordering key: `(txhash, state, priority, key)`. `priority`
/// is only meaningful for `CANDIDATE_READY` entries; it is `0` otherwise,
/// which is always the right tiebreaker since `CANDIDATE_READY` is the
/// only state for which more than one entry can be outstanding per
/// txhash at once.
type ByTxHashKey = (TxHash, State, Priority, Key);

/// Per-time ordering key: `(class, time micros, key)`.
type ByTimeKey = (u8, u64, Key);

fn time_class(state: State) -> u8 {
    if state.is_waiting() {
        0
    } else if state.is_selectable() {
        2
    } else {
        1
    }
}

fn by_peer_key(ann: &Announcement, key: Key) -> ByPeerKey {
    (ann.peer, ann.state == State::CandidateBest, ann.txhash, key)
}

fn by_txhash_key(ann: &Announcement, key: Key, computer: &PriorityComputer) -> ByTxHashKey {
    let priority = if ann.state == State::CandidateReady {
        computer.compute(ann.txhash, ann.peer, ann.preferred)
    } else {
        0
    };
    (ann.txhash, ann.state, priority, key)
}

fn by_time_key(ann: &Announcement, key: Key) -> ByTimeKey {
    (time_class(ann.state), ann.time.as_micros(), key)
}

/// Tracks which peers have announced which transaction hashes, and
/// decides, for each peer, which hashes it should now be asked for.
///
/// Single-owner, in-memory, no I/O. See the crate-level documentation
/// for the full state machine.
pub struct TxRequestTracker {
    sequence: u64,
    computer: PriorityComputer,
    arena: Slab<Announcement>,
    by_peer: BTreeSet<ByPeerKey>,
    by_txhash: BTreeSet<ByTxHashKey>,
    by_time: BTreeSet<ByTimeKey>,
    peer_info: HashMap<PeerId, PeerInfo>,
}

impl Default for TxRequestTracker {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TxRequestTracker {
    /// Builds an empty tracker. `deterministic` zeroes the priority
    /// hash's salt, for reproducible tests.
    pub fn new(deterministic: bool) -> Self {
        TxRequestTracker {
            sequence: 0,
            computer: PriorityComputer::new(deterministic),
            arena: Slab::new(),
            by_peer: BTreeSet::new(),
            by_txhash: BTreeSet::new(),
            by_time: BTreeSet::new(),
            peer_info: HashMap::new(),
        }
    }

    /// Total number of announcements tracked, across all peers.
    pub fn size(&self) -> usize {
        self.arena.len()
    }

    /// Number of announcements for `peer`.
    pub fn count(&self, peer: PeerId) -> usize {
        self.peer_info.get(&peer).map_or(0, |info| info.total)
    }

    /// Number of `REQUESTED` announcements for `peer`.
    pub fn count_in_flight(&self, peer: PeerId) -> usize {
        self.peer_info.get(&peer).map_or(0, |info| info.requested)
    }

    /// Number of candidate (not requested, not completed) announcements
    /// for `peer`.
    pub fn count_candidates(&self, peer: PeerId) -> usize {
        self.peer_info.get(&peer).map_or(0, |info| {
            info.total.saturating_sub(info.requested).saturating_sub(info.completed)
        })
    }

    /// Records that `peer` announced `gtxid`. A no-op if `peer` already
    /// has an announcement for this txhash.
    pub fn received_inv(&mut self, peer: PeerId, gtxid: GenTxid, preferred: bool, reqtime: Instant) {
        if self.find_by_peer(peer, gtxid.hash).is_some() {
            return;
        }
        let sequence = self.sequence;
        self.sequence += 1;
        let ann = Announcement {
            txhash: gtxid.hash,
            is_wtxid: gtxid.is_wtxid,
            peer,
            preferred,
            sequence,
            time: reqtime,
            state: State::CandidateDelayed,
        };
        ckb_logger::trace!(
            "tx-request-tracker: received_inv peer={} txhash={:?}",
            peer,
            ann.txhash
        );
        self.insert_new(ann);
    }

    /// Marks the (peer, txhash) announcement as requested, expiring at
    /// `expiry`. If this peer's announcement wasn't `CANDIDATE_BEST`,
    /// whatever else is currently selected for this txhash (a different
    /// peer's `CANDIDATE_BEST` or `REQUESTED`) is demoted first. A no-op
    /// if no announcement exists for (peer, txhash).
    pub fn requested_tx(&mut self, peer: PeerId, txhash: TxHash, expiry: Instant) {
        let Some(key) = self.find_by_peer(peer, txhash) else {
            return;
        };
        match self.arena[key].state {
            State::CandidateBest => {}
            State::CandidateDelayed | State::CandidateReady => {
                if let Some(old) = self.selected_for_txhash(txhash) {
                    match self.arena[old].state {
                        State::CandidateBest => self.set_state(old, State::CandidateReady),
                        State::Requested => self.set_state(old, State::Completed),
                        _ => {}
                    }
                }
            }
            State::Requested | State::Completed => return,
        }
        ckb_logger::debug!(
            "tx-request-tracker: requested_tx peer={} txhash={:?}",
            peer,
            txhash
        );
        self.modify(key, |ann| {
            ann.state = State::Requested;
            ann.time = expiry;
        });
    }

    /// Marks the (peer, txhash) announcement completed, reselecting a
    /// new best candidate if needed, and garbage collecting its whole
    /// txhash group if this was the last non-`COMPLETED` entry in it. A
    /// no-op if no such announcement exists.
    pub fn received_response(&mut self, peer: PeerId, txhash: TxHash) {
        if let Some(key) = self.find_by_peer(peer, txhash) {
            self.make_completed(key);
        }
    }

    /// Completes, then removes, every announcement belonging to `peer`.
    pub fn disconnected_peer(&mut self, peer: PeerId) {
        let keys: Vec<Key> = self
            .by_peer
            .range((peer, false, TxHash::MIN, 0)..=(peer, true, TxHash::MAX, usize::MAX))
            .map(|&(_, _, _, key)| key)
            .collect();
        for key in keys {
            if !self.arena.contains(key) {
                continue;
            }
            if self.make_completed(key) {
                self.erase(key);
            }
        }
    }

    /// Removes every announcement for `txhash`, across all peers.
    pub fn forget_txhash(&mut self, txhash: TxHash) {
        self.erase_txhash_group(txhash);
    }

    /// Brings the tracker up to date with `now`, then returns the
    /// txhashes `peer` should be asked for, oldest announcement first.
    pub fn get_requestable(&mut self, peer: PeerId, now: Instant) -> Vec<GenTxid> {
        self.set_time_point(now);
        let mut out: Vec<(u64, GenTxid)> = self
            .by_peer
            .range((peer, true, TxHash::MIN, 0)..=(peer, true, TxHash::MAX, usize::MAX))
            .map(|&(_, _, _, key)| {
                let ann = &self.arena[key];
                (
                    ann.sequence,
                    GenTxid {
                        hash: ann.txhash,
                        is_wtxid: ann.is_wtxid,
                    },
                )
            })
            .collect();
        out.sort_by_key(|(sequence, _)| *sequence);
        out.into_iter().map(|(_, gtxid)| gtxid).collect()
    }

    fn find_by_peer(&self, peer: PeerId, txhash: TxHash) -> Option<Key> {
        self.by_peer
            .range((peer, false, txhash, 0)..=(peer, false, txhash, usize::MAX))
            .next()
            .or_else(|| {
                self.by_peer
                    .range((peer, true, txhash, 0)..=(peer, true, txhash, usize::MAX))
                    .next()
            })
            .map(|&(_, _, _, key)| key)
    }

    /// The `CANDIDATE_BEST` or `REQUESTED` entry for `txhash`, if any.
    fn selected_for_txhash(&self, txhash: TxHash) -> Option<Key> {
        self.by_txhash
            .range((txhash, State::CandidateBest, 0, 0)..=(txhash, State::Requested, Priority::MAX, usize::MAX))
            .next()
            .map(|&(_, _, _, key)| key)
    }

    /// The lowest-priority `CANDIDATE_READY` entry for `txhash`, if any.
    fn best_candidate_ready_for_txhash(&self, txhash: TxHash) -> Option<Key> {
        self.by_txhash
            .range(
                (txhash, State::CandidateReady, 0, 0)
                    ..=(txhash, State::CandidateReady, Priority::MAX, usize::MAX),
            )
            .next()
            .map(|&(_, _, _, key)| key)
    }

    /// Number of non-`COMPLETED` announcements left for `txhash`.
    fn count_non_completed(&self, txhash: TxHash) -> usize {
        self.by_txhash
            .range((txhash, State::CandidateDelayed, 0, 0)..(txhash, State::Completed, 0, 0))
            .count()
    }

    fn insert_new(&mut self, ann: Announcement) -> Key {
        let peer = ann.peer;
        let key = self.arena.insert(ann);
        self.by_peer.insert(by_peer_key(&ann, key));
        self.by_txhash.insert(by_txhash_key(&ann, key, &self.computer));
        self.by_time.insert(by_time_key(&ann, key));
        self.peer_info.entry(peer).or_default().total += 1;
        key
    }

    fn erase(&mut self, key: Key) {
        let ann = self.arena.remove(key);
        self.by_peer.remove(&by_peer_key(&ann, key));
        self.by_txhash.remove(&by_txhash_key(&ann, key, &self.computer));
        self.by_time.remove(&by_time_key(&ann, key));
        if let Some(info) = self.peer_info.get_mut(&ann.peer) {
            info.total -= 1;
            if ann.state == State::Requested {
                info.requested -= 1;
            }
            if ann.state == State::Completed {
                info.completed -= 1;
            }
            if info.is_empty() {
                self.peer_info.remove(&ann.peer);
            }
        }
    }

    fn erase_txhash_group(&mut self, txhash: TxHash) {
        let keys: Vec<Key> = self
            .by_txhash
            .range((txhash, State::CandidateDelayed, 0, 0)..=(txhash, State::Completed, Priority::MAX, usize::MAX))
            .map(|&(_, _, _, key)| key)
            .collect();
        for key in keys {
            self.erase(key);
        }
    }

    /// Applies `f` to the announcement at `key`, keeping all three
    /// orderings and the per-peer summary consistent.
    fn modify(&mut self, key: Key, f: impl FnOnce(&mut Announcement)) {
        let before = self.arena[key];
        self.by_peer.remove(&by_peer_key(&before, key));
        self.by_txhash.remove(&by_txhash_key(&before, key, &self.computer));
        self.by_time.remove(&by_time_key(&before, key));
        if let Some(info) = self.peer_info.get_mut(&before.peer) {
            if before.state == State::Requested {
                info.requested -= 1;
            }
            if before.state == State::Completed {
                info.completed -= 1;
            }
        }

        f(&mut self.arena[key]);

        let after = self.arena[key];
        if let Some(info) = self.peer_info.get_mut(&after.peer) {
            if after.state == State::Requested {
                info.requested += 1;
            }
            if after.state == State::Completed {
                info.completed += 1;
            }
        }
        self.by_peer.insert(by_peer_key(&after, key));
        self.by_txhash.insert(by_txhash_key(&after, key, &self.computer));
        self.by_time.insert(by_time_key(&after, key));
    }

    fn set_state(&mut self, key: Key, state: State) {
        self.modify(key, |ann| ann.state = state);
    }

    /// `CANDIDATE_DELAYED -> CANDIDATE_READY`, then selects a new
    /// `CANDIDATE_BEST` if none exists or this one outranks it.
    fn promote_candidate_ready(&mut self, key: Key) {
        debug_assert_eq!(self.arena[key].state, State::CandidateDelayed);
        let txhash = self.arena[key].txhash;
        self.set_state(key, State::CandidateReady);
        match self.selected_for_txhash(txhash) {
            None => self.set_state(key, State::CandidateBest),
            Some(best_key) if self.arena[best_key].state == State::CandidateBest => {
                let ann = self.arena[key];
                let best_ann = self.arena[best_key];
                let new_priority = self.computer.compute(ann.txhash, ann.peer, ann.preferred);
                let best_priority =
                    self.computer
                        .compute(best_ann.txhash, best_ann.peer, best_ann.preferred);
                if new_priority < best_priority {
                    self.set_state(best_key, State::CandidateReady);
                    self.set_state(key, State::CandidateBest);
                }
            }
            // An existing REQUESTED stays REQUESTED; `key` stays READY.
            Some(_) => {}
        }
    }

    /// Moves `key` out of a selected state (`CANDIDATE_BEST` /
    /// `REQUESTED`) into `new_state`, promoting a replacement
    /// `CANDIDATE_BEST` from the remaining `CANDIDATE_READY` pool first.
    fn change_and_reselect(&mut self, key: Key, new_state: State) {
        let txhash = self.arena[key].txhash;
        if self.arena[key].state.is_selected() {
            if let Some(ready_key) = self.best_candidate_ready_for_txhash(txhash) {
                self.set_state(ready_key, State::CandidateBest);
            }
        }
        self.set_state(key, new_state);
    }

    /// `REQUESTED/CANDIDATE_BEST/CANDIDATE_READY/CANDIDATE_DELAYED ->
    /// COMPLETED`, garbage-collecting the whole txhash group if this was
    /// its last non-`COMPLETED` entry. Returns whether `key` still
    /// exists afterward.
    fn make_completed(&mut self, key: Key) -> bool {
        if self.arena[key].state == State::Completed {
            return true;
        }
        let txhash = self.arena[key].txhash;
        if self.count_non_completed(txhash) == 1 {
            self.erase_txhash_group(txhash);
            false
        } else {
            self.change_and_reselect(key, State::Completed);
            true
        }
    }

    /// Applies the time-driven transition rules of §4.1.2 until the
    /// tracker is consistent with `now`.
    fn set_time_point(&mut self, now: Instant) {
        let now_micros = now.as_micros();
        loop {
            let Some(&(class, time, key)) = self.by_time.iter().next() else {
                break;
            };
            if class != 0 || time > now_micros {
                break;
            }
            match self.arena[key].state {
                State::CandidateDelayed => self.promote_candidate_ready(key),
                State::Requested => {
                    self.make_completed(key);
                }
                _ => unreachable!("class 0 only holds waiting announcements"),
            }
        }
        loop {
            let Some(&(class, time, key)) = self.by_time.iter().next_back() else {
                break;
            };
            if class != 2 || time <= now_micros {
                break;
            }
            self.change_and_reselect(key, State::CandidateDelayed);
        }
    }
}

#[cfg(any(test, debug_assertions))]
impl TxRequestTracker {
    /// Catches up to `now`, then re-derives invariants P1-P7 from the
    /// raw indices. For tests and debug-build assertions; never runs in
    /// a release hot path.
    pub fn sanity_check(&mut self, now: Instant) {
        use std::collections::HashSet;

        self.set_time_point(now);

        let mut seen = HashSet::new();
        for (_, ann) in self.arena.iter() {
            assert!(
                seen.insert((ann.peer, ann.txhash)),
                "P1: duplicate (peer, txhash)"
            );
        }

        let mut per_txhash: HashMap<TxHash, Vec<State>> = HashMap::new();
        for (_, ann) in self.arena.iter() {
            per_txhash.entry(ann.txhash).or_default().push(ann.state);
        }
        for (txhash, states) in &per_txhash {
            let selected = states.iter().filter(|s| s.is_selected()).count();
            assert!(selected <= 1, "P2: multiple selected for {txhash:?}");
            let ready = states.iter().filter(|s| **s == State::CandidateReady).count();
            if ready > 0 {
                assert_eq!(selected, 1, "P3: ready without exactly one selected");
            }
            assert!(
                !states.iter().all(|s| *s == State::Completed),
                "P6: all-completed txhash {txhash:?} was not garbage collected"
            );
        }

        for (txhash, _) in &per_txhash {
            if let Some(best_key) = self
                .by_txhash
                .range((*txhash, State::CandidateBest, 0, 0)..=(*txhash, State::CandidateBest, Priority::MAX, usize::MAX))
                .next()
                .map(|&(_, _, _, key)| key)
            {
                let best_ann = self.arena[best_key];
                let best_priority = self.computer.compute(best_ann.txhash, best_ann.peer, best_ann.preferred);
                for &(other_txhash, state, priority, _) in self
                    .by_txhash
                    .range((*txhash, State::CandidateReady, 0, 0)..=(*txhash, State::CandidateReady, Priority::MAX, usize::MAX))
                {
                    if other_txhash == *txhash && state == State::CandidateReady {
                        assert!(
                            best_priority <= priority,
                            "P4: CANDIDATE_BEST does not have minimum priority"
                        );
                    }
                }
            }
        }

        for (_, ann) in self.arena.iter() {
            match ann.state {
                State::CandidateDelayed | State::Requested => {
                    assert!(ann.time.as_micros() > now.as_micros(), "P5: waiting time <= now");
                }
                State::CandidateReady | State::CandidateBest => {
                    assert!(ann.time.as_micros() <= now.as_micros(), "P5: selectable time > now");
                }
                State::Completed => {}
            }
        }

        for (peer, info) in &self.peer_info {
            let actual = self.arena.iter().filter(|(_, ann)| ann.peer == *peer).count();
            assert_eq!(info.total, actual, "P7: per-peer count mismatch");
        }
    }
}
