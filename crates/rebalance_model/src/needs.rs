//! Rebalance-need evaluator: drift beyond the tolerance band, per asset.

use alloc::vec::Vec;
use fhe_core::{Ct128, CtBool, FheBackend, Result};

/// One encrypted flag per asset: true when the allocation has drifted out of
/// the tolerance band in either direction.
///
/// `needs_increase = target > current + tolerance`
/// `needs_decrease = current > target + tolerance`
///
/// The two-sided comparison plus OR costs less than an encrypted
/// absolute-value primitive would, and avoids signed intermediates entirely.
///
/// Panics if `targets` and `currents` differ in length (the orchestrator's
/// asset table makes that unrepresentable; a mismatch here is a logic bug,
/// not caller input).
pub fn rebalance_flags<B: FheBackend>(
    b: &mut B,
    targets: &[Ct128],
    currents: &[Ct128],
    tolerance: Ct128,
) -> Result<Vec<CtBool>> {
    assert_eq!(targets.len(), currents.len());
    let mut out = Vec::with_capacity(targets.len());
    for (&target, &current) in targets.iter().zip(currents) {
        let upper = b.add128(current, tolerance)?;
        let needs_increase = b.gt128(target, upper)?;
        let lower = b.add128(target, tolerance)?;
        let needs_decrease = b.gt128(current, lower)?;
        out.push(b.or(needs_increase, needs_decrease)?);
    }
    Ok(out)
}
