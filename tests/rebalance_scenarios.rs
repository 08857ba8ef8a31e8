//! End-to-end rebalance cycles against the clear-text backend: decrypted
//! order contents, batch handoff, atomic abort paths, owner independence.

use cipherfolio::*;
use fhe_core::{AdapterError, ClearBackend};

const ENGINE: Principal = Principal::from_byte(0x01);
const ALICE: Principal = Principal::from_byte(0xA1);
const BOB: Principal = Principal::from_byte(0xB2);

const T0: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

/// Venue that records batch shapes and can be told to reject.
#[derive(Default)]
struct RecordingVenue {
    batches: Vec<(Principal, usize)>,
    reject: bool,
}

impl ExecutionVenue for RecordingVenue {
    fn execute_batch(
        &mut self,
        owner: Principal,
        orders: &[RebalanceOrder],
    ) -> std::result::Result<(), VenueError> {
        if self.reject {
            return Err(VenueError(1));
        }
        self.batches.push((owner, orders.len()));
        Ok(())
    }
}

fn engine() -> RebalanceEngine<ClearBackend> {
    RebalanceEngine::new(ClearBackend::new(), ENGINE)
}

fn enc_all(e: &RebalanceEngine<ClearBackend>, vals: &[u128]) -> Vec<Ct128> {
    e.with_backend(|b| vals.iter().map(|&v| b.enc_u128(v).unwrap()).collect())
}

fn enc(e: &RebalanceEngine<ClearBackend>, v: u128) -> Ct128 {
    e.with_backend(|b| b.enc_u128(v).unwrap())
}

fn create_default(e: &RebalanceEngine<ClearBackend>, owner: Principal) -> u64 {
    let targets = enc_all(e, &[4000, 3500, 2500]);
    let limits = enc_all(e, &[100_000, 100_000, 100_000]);
    let tol = enc(e, 500);
    e.create_portfolio(
        owner,
        vec![AssetId::new("BTC"), AssetId::new("ETH"), AssetId::new("SOL")],
        targets,
        limits,
        DAY,
        tol,
        T0,
    )
    .unwrap()
}

fn fund(e: &RebalanceEngine<ClearBackend>, owner: Principal, holdings: &[u128], total: u128) {
    let h = enc_all(e, holdings);
    let t = enc(e, total);
    e.update_holdings(owner, owner, h, t).unwrap();
}

#[test]
fn reference_scenario_full_cycle() {
    let e = engine();
    assert_eq!(e.portfolio_count(), 0);
    create_default(&e, ALICE);
    assert_eq!(e.portfolio_count(), 1);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    // Immediately: not due
    assert_eq!(
        e.trigger_rebalance(ALICE, ALICE, T0, &mut NoOpVenue),
        Err(EngineError::RebalanceNotDue)
    );

    // 86401 seconds later: exactly 3 orders, one slot per asset
    let mut venue = RecordingVenue::default();
    let ids = e
        .trigger_rebalance(ALICE, ALICE, T0 + DAY + 1, &mut venue)
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(venue.batches, vec![(ALICE, 3)]);
    assert_eq!(e.last_rebalance_secs(ALICE), Some(T0 + DAY + 1));

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id.owner, ALICE);
        assert_eq!(id.asset_index, i as u32);
        assert_eq!(id.timestamp_secs, T0 + DAY + 1);
    }
}

#[test]
fn order_amounts_are_target_sized_and_limit_capped() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let audit = e.last_audit(ALICE).unwrap();

    // target * total / 10000 = 400k/350k/250k, all capped at the 100k limit
    e.with_backend(|b| {
        for order in &audit.orders {
            assert_eq!(b.decrypt_u128(order.amount_in), 100_000);
            assert_eq!(b.decrypt_u128(order.min_amount_out), 99_000);
        }
    });
}

#[test]
fn holdings_at_target_produce_an_all_quiet_batch() {
    let e = engine();
    create_default(&e, ALICE);
    // Allocation exactly matches the 4000/3500/2500 targets
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let audit = e.last_audit(ALICE).unwrap();
    assert_eq!(audit.orders.len(), 3);
    e.with_backend(|b| {
        for order in &audit.orders {
            assert!(!b.decrypt_bool(order.is_active));
        }
    });
}

#[test]
fn drifted_assets_get_active_flags() {
    let e = engine();
    create_default(&e, ALICE);
    // 5000/3000/2000 bp vs targets 4000/3500/2500, tolerance 500:
    // only the first asset drifts strictly past the band
    fund(&e, ALICE, &[500_000, 300_000, 200_000], 1_000_000);

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let audit = e.last_audit(ALICE).unwrap();
    e.with_backend(|b| {
        let flags: Vec<bool> = audit
            .orders
            .iter()
            .map(|o| b.decrypt_bool(o.is_active))
            .collect();
        assert_eq!(flags, [true, false, false]);
    });
}

#[test]
fn overweight_flags_land_in_the_audit_copy() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[600_000, 250_000, 150_000], 1_000_000);
    let max_weight = enc(&e, 5000);
    e.set_max_asset_weight(ALICE, ALICE, max_weight).unwrap();

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let audit = e.last_audit(ALICE).unwrap();
    e.with_backend(|b| {
        let flags: Vec<bool> = audit
            .weight_flags
            .iter()
            .map(|&f| b.decrypt_bool(f))
            .collect();
        assert_eq!(flags, [true, false, false]);
    });
}

#[test]
fn execution_offsets_spread_with_bounded_jitter() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let audit = e.last_audit(ALICE).unwrap();
    e.with_backend(|b| {
        for (i, order) in audit.orders.iter().enumerate() {
            let base = (i as u64) * EXECUTION_WINDOW_SECS / 3;
            let offset = b.decrypt_u64(order.execution_window);
            assert!(offset >= base, "offset {offset} under base {base}");
            assert!(
                offset < base + JITTER_BOUND_SECS,
                "offset {offset} past jitter bound"
            );
            assert_eq!(b.decrypt_u32(order.priority), i as u32);
        }
    });
}

#[test]
fn emitted_orders_are_decrypt_granted() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let audit = e.last_audit(ALICE).unwrap();
    e.with_backend(|b| {
        for order in &audit.orders {
            for who in [ALICE, ENGINE] {
                assert!(b.is_allowed(order.amount_in, who));
                assert!(b.is_allowed(order.min_amount_out, who));
                assert!(b.is_allowed(order.execution_window, who));
                assert!(b.is_allowed(order.priority, who));
                assert!(b.is_allowed(order.is_active, who));
            }
            assert!(!b.is_allowed(order.amount_in, BOB));
        }
        for &flag in &audit.weight_flags {
            assert!(b.is_allowed(flag, ALICE));
        }
    });
}

#[test]
fn venue_rejection_aborts_the_cycle_atomically() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    let mut venue = RecordingVenue {
        reject: true,
        ..Default::default()
    };
    assert_eq!(
        e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut venue),
        Err(EngineError::VenueRejected)
    );
    assert!(venue.batches.is_empty());
    assert_eq!(e.last_rebalance_secs(ALICE), Some(T0));
    assert!(e.last_audit(ALICE).is_none());

    // The same trigger succeeds once the venue recovers
    venue.reject = false;
    let ids = e
        .trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut venue)
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(e.last_rebalance_secs(ALICE), Some(T0 + DAY));
}

#[test]
fn adapter_failure_mid_batch_aborts_the_cycle_atomically() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    // Let a handful of ops through, then kill the adapter mid-cycle
    e.with_backend(|b| b.fail_after(10));
    let mut venue = RecordingVenue::default();
    let result = e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut venue);
    assert_eq!(
        result,
        Err(EngineError::Adapter(AdapterError::Backend(0)))
    );
    assert!(venue.batches.is_empty());
    assert_eq!(e.last_rebalance_secs(ALICE), Some(T0));
    assert!(e.last_audit(ALICE).is_none());

    e.with_backend(|b| b.heal());
    let ids = e
        .trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut venue)
        .unwrap();
    assert_eq!(ids.len(), 3);
}

#[test]
fn owners_are_fully_independent() {
    let e = engine();
    create_default(&e, ALICE);
    create_default(&e, BOB);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);
    fund(&e, BOB, &[100_000, 100_000, 100_000], 300_000);

    let mut venue = RecordingVenue::default();
    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut venue)
        .unwrap();

    // Bob's gate state is untouched by Alice's cycle
    assert_eq!(e.last_rebalance_secs(BOB), Some(T0));
    assert!(e.last_audit(BOB).is_none());
    assert_eq!(
        e.trigger_rebalance(BOB, BOB, T0 + DAY - 1, &mut venue),
        Err(EngineError::RebalanceNotDue)
    );

    e.trigger_rebalance(BOB, BOB, T0 + DAY, &mut venue).unwrap();
    assert_eq!(venue.batches, vec![(ALICE, 3), (BOB, 3)]);
}

#[test]
fn repeated_cycles_respect_the_cadence_and_replace_the_audit() {
    let e = engine();
    create_default(&e, ALICE);
    fund(&e, ALICE, &[400_000, 350_000, 250_000], 1_000_000);

    e.trigger_rebalance(ALICE, ALICE, T0 + DAY, &mut NoOpVenue)
        .unwrap();
    let first = e.last_audit(ALICE).unwrap();

    // Inside the new window: not due again
    assert_eq!(
        e.trigger_rebalance(ALICE, ALICE, T0 + DAY + 100, &mut NoOpVenue),
        Err(EngineError::RebalanceNotDue)
    );

    e.trigger_rebalance(ALICE, ALICE, T0 + 2 * DAY, &mut NoOpVenue)
        .unwrap();
    let second = e.last_audit(ALICE).unwrap();
    assert_eq!(first.order_ids[0].timestamp_secs, T0 + DAY);
    assert_eq!(second.order_ids[0].timestamp_secs, T0 + 2 * DAY);
}
