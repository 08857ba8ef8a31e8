//! Risk evaluator: overweight flags and branchless order capping.

use alloc::vec::Vec;
use fhe_core::{Ct128, CtBool, FheBackend, Result};

use crate::BPS_SCALE;

/// Per-asset overweight flag: `(holding * 10000) / total > max_weight`.
///
/// Same non-zero-total caller guarantee as the allocation calculator.
pub fn weight_flags<B: FheBackend>(
    b: &mut B,
    holdings: &[Ct128],
    total: Ct128,
    max_weight: Ct128,
) -> Result<Vec<CtBool>> {
    let scale = b.enc_u128(BPS_SCALE)?;
    let mut out = Vec::with_capacity(holdings.len());
    for &holding in holdings {
        let scaled = b.mul128(holding, scale)?;
        let weight = b.div128(scaled, total)?;
        out.push(b.gt128(weight, max_weight)?);
    }
    Ok(out)
}

/// Cap each proposed order at its risk limit without a plaintext branch:
/// `select(order > limit, limit, order)`.
pub fn cap_orders<B: FheBackend>(
    b: &mut B,
    orders: &[Ct128],
    limits: &[Ct128],
) -> Result<Vec<Ct128>> {
    assert_eq!(orders.len(), limits.len());
    let mut out = Vec::with_capacity(orders.len());
    for (&order, &limit) in orders.iter().zip(limits) {
        let over = b.gt128(order, limit)?;
        out.push(b.select128(over, limit, order)?);
    }
    Ok(out)
}
