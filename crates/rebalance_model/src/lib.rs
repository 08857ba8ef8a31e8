//! Pure encrypted-portfolio calculators
//! No state, no plaintext branches on encrypted values, all functions total
//! over the adapter's fallibility.
//!
//! Each function consumes parallel per-asset slices and produces outputs in
//! the same order: output index i always corresponds to input index i. The
//! orchestrator depends on that pairing when it assembles order batches and
//! execution offsets.

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;

pub mod allocation;
pub mod attribution;
pub mod needs;
pub mod risk;
pub mod sequencing;
pub mod sizing;

/// Allocations, tolerances and weights are expressed in basis points.
pub const BPS_SCALE: u128 = 10_000;
