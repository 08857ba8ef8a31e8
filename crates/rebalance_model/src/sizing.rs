//! Trade sizer: encrypted notional per asset, capped by the trading limit.

use alloc::vec::Vec;
use fhe_core::{Ct128, FheBackend, Result};

use crate::BPS_SCALE;

/// Required trade notional per asset: `(target * total_value) / 10000`,
/// capped with `min(required, limit)`.
///
/// Sizing is toward the target weight, not the target/current delta: a delta
/// would need signed encrypted arithmetic for the sell direction. Which side
/// of the pair is bought (token-in selection) is an open design gap recorded
/// on the order type, not something this function decides.
pub fn trade_sizes<B: FheBackend>(
    b: &mut B,
    targets: &[Ct128],
    total_value: Ct128,
    limits: &[Ct128],
) -> Result<Vec<Ct128>> {
    assert_eq!(targets.len(), limits.len());
    let scale = b.enc_u128(BPS_SCALE)?;
    let mut out = Vec::with_capacity(targets.len());
    for (&target, &limit) in targets.iter().zip(limits) {
        let notional = b.mul128(target, total_value)?;
        let required = b.div128(notional, scale)?;
        out.push(b.min128(required, limit)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhe_core::ClearBackend;

    fn sizes_for(targets: &[u128], total: u128, limits: &[u128]) -> Vec<u128> {
        let mut b = ClearBackend::new();
        let t: Vec<Ct128> = targets.iter().map(|&v| b.enc_u128(v).unwrap()).collect();
        let l: Vec<Ct128> = limits.iter().map(|&v| b.enc_u128(v).unwrap()).collect();
        let total = b.enc_u128(total).unwrap();
        let sizes = trade_sizes(&mut b, &t, total, &l).unwrap();
        sizes.iter().map(|&s| b.decrypt_u128(s)).collect()
    }

    #[test]
    fn sizes_toward_target_weight() {
        // 40%/35%/25% of 1_000_000, uncapped
        assert_eq!(
            sizes_for(&[4000, 3500, 2500], 1_000_000, &[u128::MAX >> 1; 3]),
            [400_000, 350_000, 250_000]
        );
    }

    #[test]
    fn limit_caps_the_notional() {
        assert_eq!(
            sizes_for(&[4000, 3500, 2500], 1_000_000, &[100_000, 100_000, 300_000]),
            [100_000, 100_000, 250_000]
        );
    }

    #[test]
    fn zero_target_sizes_to_zero() {
        assert_eq!(sizes_for(&[0], 1_000_000, &[100_000]), [0]);
    }
}
