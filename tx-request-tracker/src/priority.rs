use crate::types::{PeerId, TxHash};

/// 64-bit value used to rank competing announcements of the same
/// txhash. Lower wins. The top bit encodes `!preferred`; the low 63 bits
/// come from a keyed hash of (txhash, peer), so ties among equally
/// preferred peers are broken deterministically but unpredictably to an
/// outside observer who doesn't know the key.
pub(crate) type Priority = u64;

/// A 128-bit-keyed hash used to compute [`Priority`] values. Constructed
/// once per tracker; the key is either random (production) or all-zero
/// (`deterministic`, for tests).
pub(crate) struct PriorityComputer {
    k0: u64,
    k1: u64,
}

impl PriorityComputer {
    pub(crate) fn new(deterministic: bool) -> Self {
        if deterministic {
            PriorityComputer { k0: 0, k1: 0 }
        } else {
            PriorityComputer {
                k0: rand::random(),
                k1: rand::random(),
            }
        }
    }

    pub(crate) fn compute(&self, txhash: TxHash, peer: PeerId, preferred: bool) -> Priority {
        let low = keyed_hash(self.k0, self.k1, txhash.as_bytes(), peer) >> 1;
        low | ((!preferred as u64) << 63)
    }
}

/// One ARX compression round: add, rotate, xor, rotate.
fn compress_round(v0: &mut u64, v1: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v1 = v1.rotate_left(13);
    *v1 ^= *v0;
    *v0 = v0.rotate_left(32);
}

/// Two compression rounds per absorbed message word (the txhash, as four
/// little-endian 64-bit words), then the peer id folded in and 12
/// finalization rounds — the "12-round ARX permutation" of the priority
/// hash.
fn keyed_hash(k0: u64, k1: u64, txhash: &[u8; 32], peer: PeerId) -> u64 {
    let mut v0 = k0;
    let mut v1 = k1;
    for word in txhash.chunks_exact(8) {
        let word = u64::from_le_bytes(word.try_into().expect("8-byte chunk"));
        v0 ^= word;
        compress_round(&mut v0, &mut v1);
        compress_round(&mut v0, &mut v1);
    }
    v1 ^= peer as u64;
    for _ in 0..12 {
        compress_round(&mut v0, &mut v1);
    }
    v0 ^ v1
}
