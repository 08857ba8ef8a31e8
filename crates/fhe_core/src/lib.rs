//! FHE Core - Ciphertext Arithmetic Adapter interface
//!
//! This crate defines the stable interface between the rebalancing engine and
//! an external homomorphic-encryption capability. The capability itself is not
//! implemented here: production deployments plug in a real coprocessor client,
//! tests plug in the `ClearBackend` plaintext double (feature `testutils`).
//!
//! # Design Principles
//! - no_std + alloc, zero dependencies
//! - Ciphertexts are opaque `Copy` handles; no trait method exposes plaintext,
//!   so the engine cannot branch on an encrypted value even by accident.
//!   Conditional data flow goes through `select*` only.
//! - Every operation is fallible: homomorphic ops are remote, latency-heavy
//!   calls that can die mid-batch, and callers must treat them that way.
//! - Decrypt permission is an explicit grant (`allow`) per ciphertext and
//!   principal, mirroring coprocessor ACL models.

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(feature = "testutils")]
mod clear;

#[cfg(feature = "testutils")]
pub use clear::ClearBackend;

// ============================================================================
// Identifiers & Handles
// ============================================================================

/// Principal identity that can be granted decryption rights
/// (an owner wallet, or the engine itself).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal(pub [u8; 32]);

impl Principal {
    /// Deterministic principal from a single byte, for tests and demos.
    pub const fn from_byte(b: u8) -> Self {
        Self([b; 32])
    }
}

/// Untyped view of a ciphertext handle, used for access grants.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CtId(pub(crate) u64);

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) u64);

        impl From<$name> for CtId {
            fn from(h: $name) -> CtId {
                CtId(h.0)
            }
        }
    };
}

handle_type!(
    /// Encrypted unsigned 128-bit integer (amounts, notionals, basis points).
    Ct128
);
handle_type!(
    /// Encrypted unsigned 64-bit integer (timestamps, durations).
    Ct64
);
handle_type!(
    /// Encrypted unsigned 32-bit integer (ordinals, tie-breaks).
    Ct32
);
handle_type!(
    /// Encrypted boolean.
    CtBool
);

// ============================================================================
// Errors
// ============================================================================

/// Opaque failure from the backing capability.
///
/// Always fatal for the batch in flight: the engine never retries internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterError {
    /// Handle does not name a live ciphertext of the expected width
    InvalidHandle,
    /// Backend-specific failure code (transport, quota, coprocessor abort)
    Backend(u32),
}

pub type Result<T> = core::result::Result<T, AdapterError>;

// ============================================================================
// Backend Trait
// ============================================================================

/// The homomorphic operations the engine is allowed to use.
///
/// Arithmetic only combines matching widths; quotients for an encrypted zero
/// divisor are backend-defined (callers must guarantee non-zero divisors).
/// Fresh handles are returned for every result: ciphertext bytes are free to
/// re-randomize, only the decrypted value is contractual.
pub trait FheBackend {
    // ---- constructors from plaintext ----
    fn enc_u128(&mut self, v: u128) -> Result<Ct128>;
    fn enc_u64(&mut self, v: u64) -> Result<Ct64>;
    fn enc_u32(&mut self, v: u32) -> Result<Ct32>;
    fn enc_bool(&mut self, v: bool) -> Result<CtBool>;

    // ---- 128-bit arithmetic (wrapping) ----
    fn add128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128>;
    fn sub128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128>;
    fn mul128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128>;
    fn div128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128>;
    fn min128(&mut self, a: Ct128, b: Ct128) -> Result<Ct128>;

    // ---- 64-bit arithmetic (wrapping) ----
    fn add64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64>;
    fn sub64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64>;
    fn mul64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64>;
    fn div64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64>;
    fn min64(&mut self, a: Ct64, b: Ct64) -> Result<Ct64>;

    // ---- comparisons ----
    fn gt128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool>;
    fn gte128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool>;
    fn lt128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool>;
    fn lte128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool>;
    fn eq128(&mut self, a: Ct128, b: Ct128) -> Result<CtBool>;
    fn gt64(&mut self, a: Ct64, b: Ct64) -> Result<CtBool>;
    fn gte64(&mut self, a: Ct64, b: Ct64) -> Result<CtBool>;

    // ---- boolean logic ----
    fn and(&mut self, a: CtBool, b: CtBool) -> Result<CtBool>;
    fn or(&mut self, a: CtBool, b: CtBool) -> Result<CtBool>;
    fn not(&mut self, a: CtBool) -> Result<CtBool>;

    // ---- branchless conditional selection ----
    fn select128(&mut self, cond: CtBool, a: Ct128, b: Ct128) -> Result<Ct128>;
    fn select64(&mut self, cond: CtBool, a: Ct64, b: Ct64) -> Result<Ct64>;
    fn selectb(&mut self, cond: CtBool, a: CtBool, b: CtBool) -> Result<CtBool>;

    // ---- access control ----
    /// Grant `who` the right to later request decryption of `ct`.
    ///
    /// The engine calls this for every ciphertext it stores or emits; a
    /// missing grant is a silent defect (the value simply becomes
    /// unreadable), so tests assert grants explicitly.
    fn allow(&mut self, ct: CtId, who: Principal) -> Result<()>;
}
