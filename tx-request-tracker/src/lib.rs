//! Per-peer transaction-request scheduling.
//!
//! Given a stream of "peer X announced txhash Y" events, decides which
//! peer to ask for each transaction and when, so that every transaction
//! is eventually requested from someone without hammering any one peer
//! or fetching the same transaction from two peers at once. Ported from
//! the reference peer-to-peer transaction relay logic, generalized into
//! a standalone, storage-agnostic component.

mod priority;
mod tracker;
mod types;

pub use tracker::TxRequestTracker;
pub use types::{GenTxid, PeerId, State, TxHash};
