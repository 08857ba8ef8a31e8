//! Confidential Portfolio Rebalancing Engine
//!
//! Managers keep target allocations, trading limits, cadence and tolerance
//! encrypted; the engine detects drift, sizes trades, caps them against risk
//! limits and schedules execution, all as compositions of homomorphic ops on
//! opaque ciphertext handles. Guarantees:
//! 1. No component ever branches on the plaintext of an encrypted value;
//!    conditional data flow goes through `select` only
//! 2. A rebalance cycle is atomic: adapter or venue failure mid-batch leaves
//!    no state mutation and no partial batch at the venue
//! 3. One cycle per owner at a time; different owners are fully independent
//! 4. Every retained or emitted ciphertext is decrypt-granted to the owner
//!    and the engine principal
//!
//! The only plaintext the scheduler sees is the cadence gate
//! (`now >= last_rebalance_secs + rebalance_frequency_secs`): encrypted
//! timestamps cannot gate control flow without decryption, so cadence is a
//! deliberate, documented leak. Allocations, holdings, limits and amounts
//! never are.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

pub use fhe_core::{
    AdapterError, Ct128, Ct32, Ct64, CtBool, CtId, FheBackend, Principal,
};
pub use rebalance_model::sequencing::JITTER_BOUND_SECS;
pub use rebalance_model::BPS_SCALE;

use rebalance_model::{allocation, attribution, needs, risk, sequencing, sizing};

// ============================================================================
// Constants
// ============================================================================

/// Spread window for execution offsets within one rebalance cycle.
pub const EXECUTION_WINDOW_SECS: u64 = 3600;

/// Slippage floor: min_amount_out is 99% of amount_in.
pub const SLIPPAGE_FLOOR_BPS: u128 = 9_900;

/// Default per-asset weight ceiling (no ceiling until the owner sets one).
pub const DEFAULT_MAX_ASSET_WEIGHT_BPS: u128 = BPS_SCALE;

// ============================================================================
// Identifiers
// ============================================================================

/// Plaintext asset identifier, used only for routing to the execution venue.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId(pub [u8; 8]);

impl AssetId {
    /// Build from an ASCII ticker, zero-padded/truncated to 8 bytes.
    pub fn new(ticker: &str) -> Self {
        let mut bytes = [0u8; 8];
        for (dst, src) in bytes.iter_mut().zip(ticker.bytes()) {
            *dst = src;
        }
        Self(bytes)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(8);
        write!(f, "{}", String::from_utf8_lossy(&self.0[..end]))
    }
}

/// Derived identifier for the audit copy of an emitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId {
    pub owner: Principal,
    pub asset_index: u32,
    pub timestamp_secs: u64,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed input (length mismatch, empty token list, unknown
    /// portfolio on an owner-scoped mutation). Rejected before any
    /// ciphertext operation.
    Validation,

    /// Caller is not the portfolio owner. Never retried.
    NotOwner,

    /// Eligibility gate failed: too soon since the last rebalance, or the
    /// portfolio is inactive or does not exist. Caller-recoverable.
    RebalanceNotDue,

    /// The ciphertext adapter failed; the cycle in flight was aborted with
    /// no state mutation.
    Adapter(AdapterError),

    /// The execution venue refused the batch; treated like an adapter
    /// failure for atomicity.
    VenueRejected,
}

impl From<AdapterError> for EngineError {
    fn from(e: AdapterError) -> Self {
        EngineError::Adapter(e)
    }
}

pub type Result<T> = core::result::Result<T, EngineError>;

// ============================================================================
// Execution Venue (external collaborator)
// ============================================================================

/// Venue-side failure. The engine does not interpret the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueError(pub u32);

/// The settlement collaborator: receives an ordered batch, settles it
/// however it likes, and returns nothing encrypted synchronously.
pub trait ExecutionVenue {
    fn execute_batch(
        &mut self,
        owner: Principal,
        orders: &[RebalanceOrder],
    ) -> core::result::Result<(), VenueError>;
}

/// Venue that accepts everything (for tests and demos).
pub struct NoOpVenue;

impl ExecutionVenue for NoOpVenue {
    fn execute_batch(
        &mut self,
        _owner: Principal,
        _orders: &[RebalanceOrder],
    ) -> core::result::Result<(), VenueError> {
        Ok(())
    }
}

// ============================================================================
// Orders & Metrics
// ============================================================================

/// One encrypted rebalance order, produced fresh per asset per cycle and
/// never mutated afterwards.
///
/// Token-in selection (which side of the pair is bought) is an open design
/// gap inherited from the reference behavior: both routing fields carry the
/// asset id until a real direction step exists. The batch always has one
/// slot per asset, active or not; the only thing that width leaks is the
/// asset count, which is already public in the token list.
#[derive(Debug, Clone, Copy)]
pub struct RebalanceOrder {
    pub token_in: AssetId,
    pub token_out: AssetId,
    /// Risk-capped encrypted notional.
    pub amount_in: Ct128,
    /// Encrypted slippage floor (99% of amount_in).
    pub min_amount_out: Ct128,
    /// Encrypted, jittered execution-time offset.
    pub execution_window: Ct64,
    /// Encrypted asset ordinal; tie-break field only, never sorted on.
    pub priority: Ct32,
    /// Whether this order should actually execute (from the needs evaluator).
    pub is_active: CtBool,
}

/// Audit copy of the last emitted batch, decryptable by the owner.
#[derive(Debug, Clone)]
pub struct AuditBatch {
    pub order_ids: Vec<OrderId>,
    pub orders: Vec<RebalanceOrder>,
    /// Overweight flags from the risk evaluator for the same cycle. They do
    /// not gate orders; they exist for confidential after-the-fact review.
    pub weight_flags: Vec<CtBool>,
}

/// Per-owner encrypted performance metrics. Append-only from
/// `record_performance`; never read by the rebalancing path.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub total_return: Ct128,
    pub benchmark_return: Ct128,
    /// total - benchmark, in wrapping unsigned arithmetic (a benchmark
    /// outperformance shows up as a wrapped value; signed encrypted
    /// arithmetic is out of scope).
    pub active_return: Ct128,
    pub asset_returns: Vec<Ct128>,
}

// ============================================================================
// Asset Table (single enforcement point for the pairing invariant)
// ============================================================================

/// Index-paired per-asset state: `tokens[i]`, `targets[i]`, `limits[i]` and
/// `holdings[i]` always describe the same asset. Constructed and mutated only
/// through length-checked operations, so the pairing invariant cannot break
/// anywhere else in the engine.
#[derive(Debug)]
struct AssetTable {
    tokens: Vec<AssetId>,
    targets: Vec<Ct128>,
    limits: Vec<Ct128>,
    holdings: Vec<Ct128>,
}

impl AssetTable {
    fn new(
        tokens: Vec<AssetId>,
        targets: Vec<Ct128>,
        limits: Vec<Ct128>,
        holdings: Vec<Ct128>,
    ) -> Result<Self> {
        if tokens.is_empty()
            || targets.len() != tokens.len()
            || limits.len() != tokens.len()
            || holdings.len() != tokens.len()
        {
            return Err(EngineError::Validation);
        }
        Ok(Self {
            tokens,
            targets,
            limits,
            holdings,
        })
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn set_holdings(&mut self, holdings: Vec<Ct128>) -> Result<()> {
        if holdings.len() != self.tokens.len() {
            return Err(EngineError::Validation);
        }
        self.holdings = holdings;
        Ok(())
    }
}

// ============================================================================
// Portfolio State
// ============================================================================

/// Lifecycle: created Active, cycles through eligible/not-eligible on the
/// plaintext cadence gate, and can be deactivated by the owner.
#[derive(Debug)]
struct Portfolio {
    id: u64,
    assets: AssetTable,
    total_value: Ct128,
    max_asset_weight: Ct128,
    /// Confidential audit copy of the cadence; not authoritative.
    rebalance_frequency: Ct64,
    /// Authoritative plaintext cadence gate (deliberate leak).
    rebalance_frequency_secs: u64,
    tolerance_band: Ct128,
    /// Informational encrypted flag; plaintext gating uses the mirror.
    auto_rebalance: CtBool,
    auto_rebalance_enabled: bool,
    /// Confidential audit copy of the last-rebalance time.
    last_rebalance: Ct64,
    /// Authoritative plaintext gate input.
    last_rebalance_secs: u64,
    is_active: bool,
    metrics: PerformanceMetrics,
    audit: Option<AuditBatch>,
}

/// Encrypted audit mirrors of the plaintext scheduling fields. Not
/// authoritative for anything; they exist so the owner can produce
/// confidential reports without touching the plaintext gate.
#[derive(Debug, Clone, Copy)]
pub struct AuditMirrors {
    pub rebalance_frequency: Ct64,
    pub auto_rebalance: CtBool,
    pub last_rebalance: Ct64,
}

/// Read-only plaintext view of a portfolio (no ciphertext handles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioSnapshot {
    pub id: u64,
    pub tokens: Vec<AssetId>,
    pub rebalance_frequency_secs: u64,
    pub last_rebalance_secs: u64,
    pub auto_rebalance_enabled: bool,
    pub is_active: bool,
}

// ============================================================================
// Rebalance Engine (orchestrator)
// ============================================================================

/// Owns all portfolio records, keyed by owner principal. No other component
/// retains state across calls.
pub struct RebalanceEngine<B: FheBackend> {
    backend: Mutex<B>,
    engine_principal: Principal,
    portfolios: RwLock<HashMap<Principal, Arc<Mutex<Portfolio>>>>,
    /// Initialized to zero at engine start, incremented only inside the
    /// validated creation path, read-only elsewhere.
    portfolio_count: AtomicU64,
}

impl<B: FheBackend> RebalanceEngine<B> {
    pub fn new(backend: B, engine_principal: Principal) -> Self {
        Self {
            backend: Mutex::new(backend),
            engine_principal,
            portfolios: RwLock::new(HashMap::new()),
            portfolio_count: AtomicU64::new(0),
        }
    }

    /// The principal ciphertexts are granted to alongside the owner.
    pub fn engine_principal(&self) -> Principal {
        self.engine_principal
    }

    /// Run a closure against the backing adapter. This is how callers
    /// encrypt inputs (and, with a test backend, decrypt outputs); the
    /// engine itself never reads plaintext through it.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock_backend())
    }

    pub fn portfolio_count(&self) -> u64 {
        self.portfolio_count.load(Ordering::SeqCst)
    }

    pub fn has_portfolio(&self, owner: Principal) -> bool {
        self.read_map().contains_key(&owner)
    }

    pub fn snapshot(&self, owner: Principal) -> Option<PortfolioSnapshot> {
        let arc = self.read_map().get(&owner).cloned()?;
        let p = lock_ignore_poison(&arc);
        Some(PortfolioSnapshot {
            id: p.id,
            tokens: p.assets.tokens.clone(),
            rebalance_frequency_secs: p.rebalance_frequency_secs,
            last_rebalance_secs: p.last_rebalance_secs,
            auto_rebalance_enabled: p.auto_rebalance_enabled,
            is_active: p.is_active,
        })
    }

    pub fn last_rebalance_secs(&self, owner: Principal) -> Option<u64> {
        self.snapshot(owner).map(|s| s.last_rebalance_secs)
    }

    pub fn metrics(&self, owner: Principal) -> Option<PerformanceMetrics> {
        let arc = self.read_map().get(&owner).cloned()?;
        let p = lock_ignore_poison(&arc);
        Some(p.metrics.clone())
    }

    pub fn last_audit(&self, owner: Principal) -> Option<AuditBatch> {
        let arc = self.read_map().get(&owner).cloned()?;
        let p = lock_ignore_poison(&arc);
        p.audit.clone()
    }

    pub fn audit_mirrors(&self, owner: Principal) -> Option<AuditMirrors> {
        let arc = self.read_map().get(&owner).cloned()?;
        let p = lock_ignore_poison(&arc);
        Some(AuditMirrors {
            rebalance_frequency: p.rebalance_frequency,
            auto_rebalance: p.auto_rebalance,
            last_rebalance: p.last_rebalance,
        })
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a new Active portfolio for `owner` and return its ordinal id
    /// (ids start at 1).
    ///
    /// `target_allocations`, `trading_limits` and `tolerance_band` arrive as
    /// ciphertexts produced by the owner's encryption client. Input shape is
    /// validated before any ciphertext operation; on `Validation` nothing is
    /// mutated and the portfolio count is unchanged. One portfolio per
    /// owner: a second create for the same owner is rejected rather than
    /// silently overwriting live encrypted state.
    ///
    /// The portfolio starts with an encrypted zero total value; percentage
    /// paths are only meaningful after `update_holdings`.
    pub fn create_portfolio(
        &self,
        owner: Principal,
        tokens: Vec<AssetId>,
        target_allocations: Vec<Ct128>,
        trading_limits: Vec<Ct128>,
        rebalance_frequency_secs: u64,
        tolerance_band: Ct128,
        now_secs: u64,
    ) -> Result<u64> {
        // All shape validation happens before the first ciphertext op
        if tokens.is_empty()
            || target_allocations.len() != tokens.len()
            || trading_limits.len() != tokens.len()
        {
            return Err(EngineError::Validation);
        }
        if self.read_map().contains_key(&owner) {
            return Err(EngineError::Validation);
        }

        let asset_count = tokens.len();
        let mut b = self.lock_backend();

        let mut holdings = Vec::with_capacity(asset_count);
        for _ in 0..asset_count {
            holdings.push(b.enc_u128(0)?);
        }
        let total_value = b.enc_u128(0)?;
        let max_asset_weight = b.enc_u128(DEFAULT_MAX_ASSET_WEIGHT_BPS)?;
        let rebalance_frequency = b.enc_u64(rebalance_frequency_secs)?;
        let auto_rebalance = b.enc_bool(true)?;
        let last_rebalance = b.enc_u64(now_secs)?;
        let metrics = PerformanceMetrics {
            total_return: b.enc_u128(0)?,
            benchmark_return: b.enc_u128(0)?,
            active_return: b.enc_u128(0)?,
            asset_returns: Vec::new(),
        };

        for &ct in target_allocations
            .iter()
            .chain(&trading_limits)
            .chain(&holdings)
        {
            self.grant(&mut b, ct, owner)?;
        }
        for ct in [
            CtId::from(total_value),
            max_asset_weight.into(),
            tolerance_band.into(),
            rebalance_frequency.into(),
            auto_rebalance.into(),
            last_rebalance.into(),
            metrics.total_return.into(),
            metrics.benchmark_return.into(),
            metrics.active_return.into(),
        ] {
            self.grant(&mut b, ct, owner)?;
        }
        drop(b);

        let assets = AssetTable::new(tokens, target_allocations, trading_limits, holdings)?;
        let mut map = self.write_map();
        if map.contains_key(&owner) {
            return Err(EngineError::Validation);
        }
        let id = self.portfolio_count.fetch_add(1, Ordering::SeqCst) + 1;
        map.insert(
            owner,
            Arc::new(Mutex::new(Portfolio {
                id,
                assets,
                total_value,
                max_asset_weight,
                rebalance_frequency,
                rebalance_frequency_secs,
                tolerance_band,
                auto_rebalance,
                auto_rebalance_enabled: true,
                last_rebalance,
                last_rebalance_secs: now_secs,
                is_active: true,
                metrics,
                audit: None,
            })),
        );
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Owner-gated mutations
    // ------------------------------------------------------------------

    /// Replace the encrypted holdings and total value (the deposit-side
    /// feed). Length-checked against the token list; rejecting any shape
    /// that would break the pairing invariant.
    pub fn update_holdings(
        &self,
        caller: Principal,
        owner: Principal,
        holdings: Vec<Ct128>,
        total_value: Ct128,
    ) -> Result<()> {
        self.with_owned_portfolio(caller, owner, |engine, p| {
            if holdings.len() != p.assets.len() {
                return Err(EngineError::Validation);
            }
            let mut b = engine.lock_backend();
            for &ct in holdings.iter() {
                engine.grant(&mut b, ct, owner)?;
            }
            engine.grant(&mut b, total_value, owner)?;
            drop(b);
            p.assets.set_holdings(holdings)?;
            p.total_value = total_value;
            Ok(())
        })
    }

    /// Set the encrypted per-asset weight ceiling used by the risk
    /// evaluator.
    pub fn set_max_asset_weight(
        &self,
        caller: Principal,
        owner: Principal,
        max_weight: Ct128,
    ) -> Result<()> {
        self.with_owned_portfolio(caller, owner, |engine, p| {
            let mut b = engine.lock_backend();
            engine.grant(&mut b, max_weight, owner)?;
            drop(b);
            p.max_asset_weight = max_weight;
            Ok(())
        })
    }

    /// Flip the informational auto-rebalance flag (both the plaintext
    /// mirror and its encrypted audit copy).
    pub fn set_auto_rebalance(
        &self,
        caller: Principal,
        owner: Principal,
        enabled: bool,
    ) -> Result<()> {
        self.with_owned_portfolio(caller, owner, |engine, p| {
            let mut b = engine.lock_backend();
            let ct = b.enc_bool(enabled)?;
            engine.grant(&mut b, ct, owner)?;
            drop(b);
            p.auto_rebalance = ct;
            p.auto_rebalance_enabled = enabled;
            Ok(())
        })
    }

    /// Activate or deactivate the portfolio. An inactive portfolio fails
    /// `trigger_rebalance` with `RebalanceNotDue`.
    pub fn set_active(
        &self,
        caller: Principal,
        owner: Principal,
        active: bool,
    ) -> Result<()> {
        self.with_owned_portfolio(caller, owner, |_, p| {
            p.is_active = active;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Rebalancing
    // ------------------------------------------------------------------

    /// Run one rebalance cycle and hand the resulting batch to `venue`.
    ///
    /// Fails with `NotOwner` for any caller other than the owner (portfolio
    /// existence is not revealed first), and with `RebalanceNotDue` when the
    /// portfolio is missing, inactive, or inside its cadence window. The
    /// cycle is atomic: any adapter or venue failure aborts with
    /// `last_rebalance_secs`, the audit copy and all other state untouched.
    ///
    /// The owner's portfolio lock is held end-to-end, so no overlapping
    /// cycle can run for the same owner; other owners are unaffected.
    pub fn trigger_rebalance(
        &self,
        caller: Principal,
        owner: Principal,
        now_secs: u64,
        venue: &mut dyn ExecutionVenue,
    ) -> Result<Vec<OrderId>> {
        if caller != owner {
            return Err(EngineError::NotOwner);
        }
        let arc = self
            .read_map()
            .get(&owner)
            .cloned()
            .ok_or(EngineError::RebalanceNotDue)?;
        let mut p = lock_ignore_poison(&arc);

        if !p.is_active {
            return Err(EngineError::RebalanceNotDue);
        }
        let due_at = p
            .last_rebalance_secs
            .saturating_add(p.rebalance_frequency_secs);
        if now_secs < due_at {
            return Err(EngineError::RebalanceNotDue);
        }

        let n = p.assets.len();
        let (orders, weight_flags, last_rebalance_ct) = {
            let mut b = self.lock_backend();

            // 4.1 current allocation percentages
            let percentages =
                allocation::percentages(&mut *b, &p.assets.holdings, p.total_value)?;
            // 4.2 rebalance necessity against the tolerance band
            let flags = needs::rebalance_flags(
                &mut *b,
                &p.assets.targets,
                &percentages,
                p.tolerance_band,
            )?;
            // 4.3 trade sizing against trading limits
            let sizes = sizing::trade_sizes(
                &mut *b,
                &p.assets.targets,
                p.total_value,
                &p.assets.limits,
            )?;
            // 4.5 risk evaluation: weight flags, then the branchless cap
            let weight_flags = risk::weight_flags(
                &mut *b,
                &p.assets.holdings,
                p.total_value,
                p.max_asset_weight,
            )?;
            let capped = risk::cap_orders(&mut *b, &sizes, &p.assets.limits)?;
            // 4.4 jittered execution offsets, seeded from coarse time
            let window = b.enc_u64(EXECUTION_WINDOW_SECS)?;
            let seed = now_secs / EXECUTION_WINDOW_SECS;
            let offsets = sequencing::execution_offsets(&mut *b, n, window, seed)?;

            let floor = b.enc_u128(SLIPPAGE_FLOOR_BPS)?;
            let scale = b.enc_u128(BPS_SCALE)?;
            let mut orders = Vec::with_capacity(n);
            for i in 0..n {
                let scaled = b.mul128(capped[i], floor)?;
                let min_amount_out = b.div128(scaled, scale)?;
                let priority = b.enc_u32(i as u32)?;
                orders.push(RebalanceOrder {
                    token_in: p.assets.tokens[i],
                    token_out: p.assets.tokens[i],
                    amount_in: capped[i],
                    min_amount_out,
                    execution_window: offsets[i],
                    priority,
                    is_active: flags[i],
                });
            }

            for order in &orders {
                for ct in [
                    CtId::from(order.amount_in),
                    order.min_amount_out.into(),
                    order.execution_window.into(),
                    order.priority.into(),
                    order.is_active.into(),
                ] {
                    self.grant(&mut b, ct, owner)?;
                }
            }
            for &flag in &weight_flags {
                self.grant(&mut b, flag, owner)?;
            }
            let last_rebalance_ct = b.enc_u64(now_secs)?;
            self.grant(&mut b, last_rebalance_ct, owner)?;

            (orders, weight_flags, last_rebalance_ct)
        };

        venue
            .execute_batch(owner, &orders)
            .map_err(|_| EngineError::VenueRejected)?;

        // Venue accepted the whole batch: commit
        let order_ids: Vec<OrderId> = (0..n)
            .map(|i| OrderId {
                owner,
                asset_index: i as u32,
                timestamp_secs: now_secs,
            })
            .collect();
        p.last_rebalance = last_rebalance_ct;
        p.last_rebalance_secs = now_secs;
        p.audit = Some(AuditBatch {
            order_ids: order_ids.clone(),
            orders,
            weight_flags,
        });
        Ok(order_ids)
    }

    // ------------------------------------------------------------------
    // Performance attribution
    // ------------------------------------------------------------------

    /// Fold one round of realized returns into the owner's encrypted
    /// metrics. Runs entirely outside the rebalancing path.
    pub fn record_performance(
        &self,
        caller: Principal,
        owner: Principal,
        asset_returns: Vec<Ct128>,
        benchmark_returns: Vec<Ct128>,
    ) -> Result<()> {
        self.with_owned_portfolio(caller, owner, |engine, p| {
            if asset_returns.len() != p.assets.len()
                || benchmark_returns.len() != p.assets.len()
            {
                return Err(EngineError::Validation);
            }
            let mut b = engine.lock_backend();

            let realized =
                attribution::weighted_return(&mut *b, &asset_returns, &p.assets.targets)?;
            let benchmark = attribution::weighted_return(
                &mut *b,
                &benchmark_returns,
                &p.assets.targets,
            )?;
            let total_return = b.add128(p.metrics.total_return, realized)?;
            let benchmark_return = b.add128(p.metrics.benchmark_return, benchmark)?;
            let active_return = b.sub128(total_return, benchmark_return)?;

            for ct in [total_return, benchmark_return, active_return] {
                engine.grant(&mut b, ct, owner)?;
            }
            for &ct in &asset_returns {
                engine.grant(&mut b, ct, owner)?;
            }
            drop(b);

            p.metrics.total_return = total_return;
            p.metrics.benchmark_return = benchmark_return;
            p.metrics.active_return = active_return;
            p.metrics.asset_returns.extend(asset_returns);
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn grant(
        &self,
        b: &mut MutexGuard<'_, B>,
        ct: impl Into<CtId>,
        owner: Principal,
    ) -> Result<()> {
        let id = ct.into();
        b.allow(id, owner)?;
        b.allow(id, self.engine_principal)?;
        Ok(())
    }

    /// Owner-gated access to one portfolio under its mutex. The owner check
    /// runs before existence is consulted, so non-owners learn nothing.
    fn with_owned_portfolio<R>(
        &self,
        caller: Principal,
        owner: Principal,
        f: impl FnOnce(&Self, &mut Portfolio) -> Result<R>,
    ) -> Result<R> {
        if caller != owner {
            return Err(EngineError::NotOwner);
        }
        let arc = self
            .read_map()
            .get(&owner)
            .cloned()
            .ok_or(EngineError::Validation)?;
        let mut p = lock_ignore_poison(&arc);
        f(self, &mut p)
    }

    fn lock_backend(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_map(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<Principal, Arc<Mutex<Portfolio>>>> {
        self.portfolios
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Principal, Arc<Mutex<Portfolio>>>> {
        self.portfolios
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
