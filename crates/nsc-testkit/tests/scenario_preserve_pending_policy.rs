//! Scenario: a listing is seen again before its first sighting was propagated.
//!
//! # Invariants under test
//!
//! 1. With `overwrite` the pending `is_new` is dropped and the listing is
//!    never propagated.
//! 2. With `preserve_pending` the pending flag survives the repeat sighting
//!    and the next propagation still applies it.

use nsc_reconcile::{BatchReconciler, ChangePropagator, FlagPolicy, ReconcileConfig};
use nsc_testkit::{ucom, MemoryStore};

async fn sighted_twice(policy: FlagPolicy) -> anyhow::Result<MemoryStore> {
    let store = MemoryStore::new();
    store.seed_dependent("91123456", None, true);
    let cfg = ReconcileConfig {
        batch_size: 1,
        flag_policy: policy,
    };

    for _ in 0..2 {
        let mut reconciler = BatchReconciler::new(store.clone(), cfg)?;
        reconciler
            .push(nsc_ingest::validate(&ucom("91123456", "ordered"))?)
            .await;
        reconciler.finish().await;
    }
    Ok(store)
}

#[tokio::test]
async fn overwrite_drops_unpropagated_new_flag() -> anyhow::Result<()> {
    let store = sighted_twice(FlagPolicy::Overwrite).await?;
    let report = ChangePropagator::new(store.clone()).propagate().await?;
    assert_eq!(report.rows_selected, 0);
    assert_eq!(store.dependent("91123456").expect("dep").shop_status, None);
    Ok(())
}

#[tokio::test]
async fn preserve_pending_keeps_new_flag_until_propagated() -> anyhow::Result<()> {
    let store = sighted_twice(FlagPolicy::PreservePending).await?;
    let report = ChangePropagator::new(store.clone()).propagate().await?;
    assert_eq!(report.rows_selected, 1);
    assert_eq!(report.new_listings, 1);
    assert_eq!(store.dependent("91123456").expect("dep").shop_status, Some(2));
    Ok(())
}
