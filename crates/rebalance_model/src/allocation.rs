//! Allocation calculator: encrypted holdings -> encrypted basis-point weights.

use alloc::vec::Vec;
use fhe_core::{Ct128, FheBackend, Result};

use crate::BPS_SCALE;

/// Per-asset allocation percentage: `(holding * 10000) / total`.
///
/// Callers must guarantee a non-zero `total`: homomorphic division by an
/// encrypted zero is backend-defined, and a zero-value portfolio is not
/// eligible for percentage-based rebalance decisions in the first place.
pub fn percentages<B: FheBackend>(
    b: &mut B,
    holdings: &[Ct128],
    total: Ct128,
) -> Result<Vec<Ct128>> {
    let scale = b.enc_u128(BPS_SCALE)?;
    let mut out = Vec::with_capacity(holdings.len());
    for &holding in holdings {
        let scaled = b.mul128(holding, scale)?;
        out.push(b.div128(scaled, total)?);
    }
    Ok(out)
}
