//! Scenario: a pending first sighting is followed by a status change.
//!
//! # Invariants under test
//!
//! 1. Under `preserve_pending` the row carries both `is_new` and
//!    `status_change`.
//! 2. One propagation pass clears both flags and counts the row once per flag.
//! 3. The dependent record receives the sentinel and is deactivated.
//!
//! DB-backed test. Skips if `NSC_DATABASE_URL` is not set.

use chrono::{Duration, Utc};
use nsc_db::PgCatalogStore;
use nsc_reconcile::{BatchReconciler, ChangePropagator, FlagPolicy, ReconcileConfig};
use nsc_schemas::{NaturalKey, ShopStatus, Source, ValidListing, UNAVAILABLE_SHOP_STATUS};

fn valid(key: &str, status: ShopStatus) -> ValidListing {
    ValidListing {
        key: NaturalKey::new(key, Source::Ucom),
        mnc: key[..2].to_string(),
        msn: key[2..].to_string(),
        status,
    }
}

#[tokio::test]
async fn both_pending_flags_are_cleared_together() -> anyhow::Result<()> {
    let url = match std::env::var(nsc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: NSC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = nsc_db::connect(&url, 2).await?;
    nsc_db::migrate(&pool).await?;
    sqlx::query("delete from shop_results where mobile_number like '9905%'")
        .execute(&pool)
        .await?;
    sqlx::query("delete from mobile_numbers where number like '9905%'")
        .execute(&pool)
        .await?;
    sqlx::query("insert into mobile_numbers (number, shop_status, is_active) values ($1, null, true)")
        .bind("99050001")
        .execute(&pool)
        .await?;

    // Other tests may leave flagged rows behind; settle them first so the
    // pass below only sees this test's row.
    let store = PgCatalogStore::new(pool.clone());
    let propagator = ChangePropagator::new(store.clone());
    propagator.propagate().await?;

    let cfg = ReconcileConfig {
        batch_size: 1,
        flag_policy: FlagPolicy::PreservePending,
    };
    let t0 = Utc::now() - Duration::minutes(5);
    let mut r = BatchReconciler::new(store.clone(), cfg)?;
    r.push_at(valid("99050001", ShopStatus::Available), t0)
        .await
        .expect("batch of one")?;
    r.push_at(valid("99050001", ShopStatus::SoldOut), Utc::now())
        .await
        .expect("batch of one")?;

    let key = NaturalKey::new("99050001", Source::Ucom);
    let row = nsc_db::fetch_listing(&pool, &key).await?.expect("row");
    assert!(row.is_new);
    assert!(row.status_changed);

    let report = propagator.propagate().await?;
    assert_eq!(report.rows_selected, 1);
    assert_eq!(report.new_listings, 1);
    assert_eq!(report.status_changes, 1);
    assert_eq!(report.deactivated, 1);
    assert_eq!(report.claims_lost, 0);

    let row = nsc_db::fetch_listing(&pool, &key).await?.expect("row");
    assert!(!row.is_new);
    assert!(!row.status_changed);

    let dep = nsc_db::fetch_dependent(&pool, "99050001").await?.expect("dependent");
    assert_eq!(dep.shop_status, Some(UNAVAILABLE_SHOP_STATUS));
    assert!(!dep.is_active);

    Ok(())
}
