//! Plaintext-arithmetic test backend.
//!
//! `ClearBackend` stores every "ciphertext" as a plaintext slot in an arena
//! and evaluates the homomorphic ops directly, so engine tests can assert
//! decrypted outcomes and grant tables. It also supports injecting a failure
//! after N ops to exercise mid-batch abort paths.
//!
//! Semantics chosen to match common FHE integer libraries: wrapping unsigned
//! arithmetic, and division by zero yields the all-ones value of the width.

use alloc::vec::Vec;

use crate::{
    AdapterError, Ct128, Ct32, Ct64, CtBool, CtId, FheBackend, Principal, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    U128(u128),
    U64(u64),
    U32(u32),
    Bool(bool),
}

/// Plaintext stand-in for the external homomorphic capability.
#[derive(Debug, Default)]
pub struct ClearBackend {
    slots: Vec<Slot>,
    grants: Vec<(u64, Principal)>,
    ops_until_failure: Option<u64>,
    op_count: u64,
}

impl ClearBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every op after the next `n` fail with `AdapterError::Backend(0)`.
    /// Used to test that a rebalance cycle aborts atomically.
    pub fn fail_after(&mut self, n: u64) {
        self.ops_until_failure = Some(n);
    }

    /// Clear a pending injected failure.
    pub fn heal(&mut self) {
        self.ops_until_failure = None;
    }

    /// Total homomorphic ops issued so far (constructors included).
    pub fn op_count(&self) -> u64 {
        self.op_count
    }

    pub fn decrypt_u128(&self, ct: Ct128) -> u128 {
        match self.slots[ct.0 as usize] {
            Slot::U128(v) => v,
            _ => unreachable!("typed handle points at wrong slot width"),
        }
    }

    pub fn decrypt_u64(&self, ct: Ct64) -> u64 {
        match self.slots[ct.0 as usize] {
            Slot::U64(v) => v,
            _ => unreachable!("typed handle points at wrong slot width"),
        }
    }

    pub fn decrypt_u32(&self, ct: Ct32) -> u32 {
        match self.slots[ct.0 as usize] {
            Slot::U32(v) => v,
            _ => unreachable!("typed handle points at wrong slot width"),
        }
    }

    pub fn decrypt_bool(&self, ct: CtBool) -> bool {
        match self.slots[ct.0 as usize] {
            Slot::Bool(v) => v,
            _ => unreachable!("typed handle points at wrong slot width"),
        }
    }

    /// Whether `who` has been granted decryption of `ct`.
    pub fn is_allowed(&self, ct: impl Into<CtId>, who: Principal) -> bool {
        let id = ct.into();
        self.grants.iter().any(|&(slot, p)| slot == id.0 && p == who)
    }

    fn tick(&mut self) -> Result<()> {
        if let Some(left) = self.ops_until_failure {
            if left == 0 {
                return Err(AdapterError::Backend(0));
            }
            self.ops_until_failure = Some(left - 1);
        }
        self.op_count += 1;
        Ok(())
    }

    fn push(&mut self, slot: Slot) -> u64 {
        self.slots.push(slot);
        (self.slots.len() - 1) as u64
    }

    fn get_u128(&self, ct: Ct128) -> Result<u128> {
        match self.slots.get(ct.0 as usize) {
            Some(Slot::U128(v)) => Ok(*v),
            _ => Err(AdapterError::InvalidHandle),
        }
    }

    fn get_u64(&self, ct: Ct64) -> Result<u64> {
        match self.slots.get(ct.0 as usize) {
            Some(Slot::U64(v)) => Ok(*v),
            _ => Err(AdapterError::InvalidHandle),
        }
    }

    fn get_bool(&self, ct: CtBool) -> Result<bool> {
        match self.slots.get(ct.0 as usize) {
            Some(Slot::Bool(v)) => Ok(*v),
            _ => Err(AdapterError::InvalidHandle),
        }
    }

    fn bin128(&mut self, a: Ct128, b: Ct128, f: impl Fn(u128, u128) -> u128) -> Result<Ct128> {
        self.tick()?;
        let (x, y) = (self.get_u128(a)?, self.get_u128(b)?);
        Ok(Ct128(self.push(Slot::U128(f(x, y)))))
    }

    fn bin64(&mut self, a: Ct64, b: Ct64, f: impl Fn(u64, u64) -> u64) -> Result<Ct64> {
        self.tick()?;
        let (x, y) = (self.get_u64(a)?, self.get_u64(b)?);
        Ok(Ct64(self.push(Slot::U64(f(x, y)))))
    }

    fn cmp128(&mut self, a: Ct128, b: Ct128, f: impl Fn(u128, u128) -> bool) -> Result<CtBool> {
        self.tick()?;
        let (x, y) = (self.get_u128(a)?, self.get_u128(b)?);
        Ok(CtBool(self.push(Slot::Bool(f(x, y)))))
    }

    fn cmp64(&mut self, a: Ct64, b: Ct64, f: impl Fn(u64, u64) -> bool) -> Result<CtBool> {
        self.tick()?;
        let (x, y) = (self.get_u64(a)?, self.get_u64(b)?);
        Ok(CtBool(self.push(Slot::Bool(f(x, y)))))
    }
}

impl FheBackend for ClearBackend {
    fn enc_u128(&mut self, v: u128) -> Result<Ct128> {
        self.tick()?;
        Ok(Ct128(self.push(Slot::U128(v))))
    }

    fn enc_u64(&mut self, v: u64) -> Result<Ct64> {
        self.tick()?;
        Ok(Ct64(self.push(Slot::U64(v))))
    }

    fn enc_u32(&mut self, v: u32) -> Result<Ct32> {
        self.tick()?;
        Ok(Ct32(self.push(Slot::U32(v))))
    }

    fn enc_bool(&mut self, v: bool) -> Result<CtBool> {
        self.tick()?;
        Ok(CtBool(self.push(Slot::Bool(v))))
    }

    fn add128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128> {
        self.bin128(a, b, u128::wrapping_add)
    }

    fn sub128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128> {
        self.bin128(a, b, u128::wrapping_sub)
    }

    fn mul128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128> {
        self.bin128(a, b, u128::wrapping_mul)
    }

    fn div128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128> {
        // Quotient for a zero divisor is all ones, as in TFHE-style integers
        self.bin128(a, b, |x, y| if y == 0 { u128::MAX } else { x / y })
    }

    fn min128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128> {
        self.bin128(a, b, u128::min)
    }

    fn add64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64> {
        self.bin64(a, b, u64::wrapping_add)
    }

    fn sub64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64> {
        self.bin64(a, b, u64::wrapping_sub)
    }

    fn mul64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64> {
        self.bin64(a, b, u64::wrapping_mul)
    }

    fn div64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64> {
        self.bin64(a, b, |x, y| if y == 0 { u64::MAX } else { x / y })
    }

    fn min64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64> {
        self.bin64(a, b, u64::min)
    }

    fn gt128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool> {
        self.cmp128(a, b, |x, y| x > y)
    }

    fn gte128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool> {
        self.cmp128(a, b, |x, y| x >= y)
    }

    fn lt128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool> {
        self.cmp128(a, b, |x, y| x < y)
    }

    fn lte128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool> {
        self.cmp128(a, b, |x, y| x <= y)
    }

    fn eq128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool> {
        self.cmp128(a, b, |x, y| x == y)
    }

    fn gt64(&mut self, a: Ct64, b: Ct64) -> Result<CtBool> {
        self.cmp64(a, b, |x, y| x > y)
    }

    fn gte64(&mut self, a: Ct64, b: Ct64) -> Result<CtBool> {
        self.cmp64(a, b, |x, y| x >= y)
    }

    fn and(&mut self, a: CtBool, b: CtBool) -> Result<CtBool> {
        self.tick()?;
        let (x, y) = (self.get_bool(a)?, self.get_bool(b)?);
        Ok(CtBool(self.push(Slot::Bool(x && y))))
    }

    fn or(&mut self, a: CtBool, b: CtBool) -> Result<CtBool> {
        self.tick()?;
        let (x, y) = (self.get_bool(a)?, self.get_bool(b)?);
        Ok(CtBool(self.push(Slot::Bool(x || y))))
    }

    fn not(&mut self, a: CtBool) -> Result<CtBool> {
        self.tick()?;
        let x = self.get_bool(a)?;
        Ok(CtBool(self.push(Slot::Bool(!x))))
    }

    fn select128(&mut self, cond: CtBool, a: Ct128, b: Ct128) -> Result<Ct128> {
        self.tick()?;
        let c = self.get_bool(cond)?;
        let (x, y) = (self.get_u128(a)?, self.get_u128(b)?);
        Ok(Ct128(self.push(Slot::U128(if c { x } else { y }))))
    }

    fn select64(&mut self, cond: CtBool, a: Ct64, b: Ct64) -> Result<Ct64> {
        self.tick()?;
        let c = self.get_bool(cond)?;
        let (x, y) = (self.get_u64(a)?, self.get_u64(b)?);
        Ok(Ct64(self.push(Slot::U64(if c { x } else { y }))))
    }

    fn selectb(&mut self, cond: CtBool, a: CtBool, b: CtBool) -> Result<CtBool> {
        self.tick()?;
        let c = self.get_bool(cond)?;
        let (x, y) = (self.get_bool(a)?, self.get_bool(b)?);
        Ok(CtBool(self.push(Slot::Bool(if c { x } else { y }))))
    }

    fn allow(&mut self, ct: CtId, who: Principal) -> Result<()> {
        self.tick()?;
        if ct.0 as usize >= self.slots.len() {
            return Err(AdapterError::InvalidHandle);
        }
        if !self.grants.contains(&(ct.0, who)) {
            self.grants.push((ct.0, who));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Principal = Principal::from_byte(0xA1);

    #[test]
    fn arithmetic_is_wrapping() {
        let mut b = ClearBackend::new();
        let max = b.enc_u128(u128::MAX).unwrap();
        let one = b.enc_u128(1).unwrap();
        let sum = b.add128(max, one).unwrap();
        assert_eq!(b.decrypt_u128(sum), 0);

        let zero = b.enc_u128(0).unwrap();
        let neg = b.sub128(zero, one).unwrap();
        assert_eq!(b.decrypt_u128(neg), u128::MAX);
    }

    #[test]
    fn division_by_zero_is_all_ones() {
        let mut b = ClearBackend::new();
        let x = b.enc_u128(1234).unwrap();
        let zero = b.enc_u128(0).unwrap();
        let q = b.div128(x, zero).unwrap();
        assert_eq!(b.decrypt_u128(q), u128::MAX);

        let x64 = b.enc_u64(5).unwrap();
        let zero64 = b.enc_u64(0).unwrap();
        let q64 = b.div64(x64, zero64).unwrap();
        assert_eq!(b.decrypt_u64(q64), u64::MAX);
    }

    #[test]
    fn select_is_branchless_on_the_caller_side() {
        let mut b = ClearBackend::new();
        let c = b.enc_bool(true).unwrap();
        let x = b.enc_u128(7).unwrap();
        let y = b.enc_u128(9).unwrap();
        let picked = b.select128(c, x, y).unwrap();
        assert_eq!(b.decrypt_u128(picked), 7);

        let nc = b.not(c).unwrap();
        let picked = b.select128(nc, x, y).unwrap();
        assert_eq!(b.decrypt_u128(picked), 9);
    }

    #[test]
    fn grants_are_tracked_per_principal() {
        let mut b = ClearBackend::new();
        let x = b.enc_u64(42).unwrap();
        assert!(!b.is_allowed(x, ALICE));
        b.allow(x.into(), ALICE).unwrap();
        assert!(b.is_allowed(x, ALICE));
        assert!(!b.is_allowed(x, Principal::from_byte(0xB2)));
    }

    #[test]
    fn allow_rejects_dangling_handles() {
        let mut b = ClearBackend::new();
        assert_eq!(b.allow(CtId(99), ALICE), Err(AdapterError::InvalidHandle));
    }

    #[test]
    fn injected_failure_fires_after_n_ops() {
        let mut b = ClearBackend::new();
        let x = b.enc_u128(1).unwrap();
        b.fail_after(1);
        let y = b.enc_u128(2).unwrap(); // op 1: still fine
        assert_eq!(b.add128(x, y), Err(AdapterError::Backend(0)));
        b.heal();
        assert!(b.add128(x, y).is_ok());
    }

    #[test]
    fn results_get_fresh_handles() {
        let mut b = ClearBackend::new();
        let x = b.enc_u128(3).unwrap();
        let y = b.enc_u128(3).unwrap();
        let s1 = b.add128(x, y).unwrap();
        let s2 = b.add128(x, y).unwrap();
        assert_ne!(s1, s2);
        assert_eq!(b.decrypt_u128(s1), b.decrypt_u128(s2));
    }
}
