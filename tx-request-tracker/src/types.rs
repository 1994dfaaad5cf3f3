use ckb_systemtime::Instant;

/// Integer peer identifier, assigned by the network layer.
pub type PeerId = i64;

/// 32-byte opaque transaction identifier. The tracker never inspects the
/// bytes beyond equality and ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// The all-zero hash, used as an inclusive range lower bound.
    pub const MIN: TxHash = TxHash([0x00; 32]);
    /// The all-one hash, used as an inclusive range upper bound.
    pub const MAX: TxHash = TxHash([0xff; 32]);

    /// Wraps a raw 32-byte identifier.
    pub const fn new(bytes: [u8; 32]) -> Self {
        TxHash(bytes)
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A transaction hash together with the namespace (txid or wtxid) it was
/// announced under.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GenTxid {
    /// The transaction hash.
    pub hash: TxHash,
    /// Whether `hash` is a wtxid rather than a txid.
    pub is_wtxid: bool,
}

impl GenTxid {
    /// Builds a txid-namespace identifier.
    pub fn txid(hash: TxHash) -> Self {
        GenTxid {
            hash,
            is_wtxid: false,
        }
    }

    /// Builds a wtxid-namespace identifier.
    pub fn wtxid(hash: TxHash) -> Self {
        GenTxid {
            hash,
            is_wtxid: true,
        }
    }
}

/// State of one (peer, txhash) announcement.
///
/// Ordering matters: it is relied on to sort the by-txhash index so that
/// `CANDIDATE_READY` entries sort after any selected (`CANDIDATE_BEST` /
/// `REQUESTED`) entry, and `COMPLETED` sorts last of all.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum State {
    CandidateDelayed,
    CandidateBest,
    Requested,
    CandidateReady,
    Completed,
}

impl State {
    /// Whether this state is "waiting" for time to pass
    /// (`CANDIDATE_DELAYED` or `REQUESTED`).
    pub fn is_waiting(self) -> bool {
        matches!(self, State::CandidateDelayed | State::Requested)
    }

    /// Whether this state is eligible to be requested right now
    /// (`CANDIDATE_READY` or `CANDIDATE_BEST`).
    pub fn is_selectable(self) -> bool {
        matches!(self, State::CandidateReady | State::CandidateBest)
    }

    /// Whether this state is "selected", i.e. occupies the one
    /// best-or-in-flight slot for its txhash.
    pub fn is_selected(self) -> bool {
        matches!(self, State::CandidateBest | State::Requested)
    }
}

/// One record of a peer having announced a transaction hash.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Announcement {
    pub(crate) txhash: TxHash,
    pub(crate) is_wtxid: bool,
    pub(crate) peer: PeerId,
    pub(crate) preferred: bool,
    pub(crate) sequence: u64,
    pub(crate) time: Instant,
    pub(crate) state: State,
}

/// Per-peer summary counts, maintained incrementally as announcements
/// change state.
#[derive(Clone, Copy, Default, Debug)]
pub(crate) struct PeerInfo {
    pub(crate) total: usize,
    pub(crate) requested: usize,
    pub(crate) completed: usize,
}

impl PeerInfo {
    pub(crate) fn is_empty(&self) -> bool {
        self.total == 0
    }
}
