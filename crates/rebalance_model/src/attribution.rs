//! Performance attributor: allocation-weighted return accumulation.

use fhe_core::{Ct128, FheBackend, Result};

/// Encrypted `sum(returns[i] * allocations[i])`, accumulated in index order.
///
/// This is the simplified weighted accumulator; a full Brinson-style
/// selection/timing/interaction decomposition is out of scope for the engine.
pub fn weighted_return<B: FheBackend>(
    b: &mut B,
    returns: &[Ct128],
    allocations: &[Ct128],
) -> Result<Ct128> {
    assert_eq!(returns.len(), allocations.len());
    let mut acc = b.enc_u128(0)?;
    for (&ret, &alloc) in returns.iter().zip(allocations) {
        let contribution = b.mul128(ret, alloc)?;
        acc = b.add128(acc, contribution)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use fhe_core::ClearBackend;

    #[test]
    fn weights_each_return_by_its_allocation() {
        let mut b = ClearBackend::new();
        let returns: Vec<Ct128> = [120u128, 80, 200]
            .iter()
            .map(|&v| b.enc_u128(v).unwrap())
            .collect();
        let allocs: Vec<Ct128> = [4000u128, 3500, 2500]
            .iter()
            .map(|&v| b.enc_u128(v).unwrap())
            .collect();

        let total = weighted_return(&mut b, &returns, &allocs).unwrap();
        assert_eq!(
            b.decrypt_u128(total),
            120 * 4000 + 80 * 3500 + 200 * 2500
        );
    }

    #[test]
    fn empty_inputs_accumulate_zero() {
        let mut b = ClearBackend::new();
        let total = weighted_return(&mut b, &[], &[]).unwrap();
        assert_eq!(b.decrypt_u128(total), 0);
    }
}
