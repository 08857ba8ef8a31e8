//! Execution sequencer: encrypted, jittered execution-time offsets.
//!
//! A perfectly linear schedule (slot i fires at `i * window / count`) lets an
//! observer infer the batch structure from execution timestamps alone, so each
//! offset gets a bounded pseudo-random delay mixed in. The jitter comes from a
//! plain LCG seeded with a coarse, non-secret time value; it only breaks the
//! obvious pattern and is NOT confidentiality-grade randomness.

use alloc::vec::Vec;
use fhe_core::{Ct64, FheBackend, Result};

/// Upper bound on per-order jitter, in seconds.
pub const JITTER_BOUND_SECS: u64 = 300;

const LCG_MUL: u64 = 6364136223846793005;
const LCG_INC: u64 = 1442695040888963407;

/// Bounded jitter for slot `i` of a batch, derived from `seed`.
pub fn jitter_secs(seed: u64, i: usize) -> u64 {
    let mut state = seed;
    for _ in 0..=i {
        state = state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
    }
    (state >> 33) % JITTER_BOUND_SECS
}

/// Encrypted execution offset per trade:
/// `(i * window) / trade_count + jitter(i)`.
///
/// Offset i corresponds to trade i; the orchestrator relies on that pairing,
/// so offsets are computed strictly in index order.
pub fn execution_offsets<B: FheBackend>(
    b: &mut B,
    trade_count: usize,
    window: Ct64,
    seed: u64,
) -> Result<Vec<Ct64>> {
    let count = b.enc_u64(trade_count as u64)?;
    let mut out = Vec::with_capacity(trade_count);
    for i in 0..trade_count {
        let index = b.enc_u64(i as u64)?;
        let spread = b.mul64(index, window)?;
        let base = b.div64(spread, count)?;
        let jitter = b.enc_u64(jitter_secs(seed, i))?;
        out.push(b.add64(base, jitter)?);
    }
    Ok(out)
}
