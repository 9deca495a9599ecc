//! Scenario: full collector cycle against Postgres.
//!
//! # Invariants under test
//!
//! 1. First sighting inserts with `is_new = true`; propagation writes the
//!    status code to `mobile_numbers` and clears the flag.
//! 2. A later `soldout` sighting sets `status_change`; propagation writes the
//!    sentinel 0 and forces `is_active = false`.
//! 3. Re-running the same batch changes no flags.
//! 4. A failing batch (duplicate key inside one batch) is rolled back in full
//!    and the next batch still commits.
//!
//! DB-backed test. Skips if `NSC_DATABASE_URL` is not set.

use chrono::{Duration, Utc};
use nsc_db::PgCatalogStore;
use nsc_reconcile::{BatchReconciler, ChangePropagator, ReconcileConfig};
use nsc_schemas::{NaturalKey, RawListing, ShopStatus, Source, ValidListing};

fn valid(key: &str, status: &str) -> ValidListing {
    let raw = RawListing::from_catalog_key(key, "ucom", status);
    ValidListing {
        key: NaturalKey::new(&raw.catalog_key, Source::Ucom),
        mnc: raw.mnc,
        msn: raw.msn,
        status: ShopStatus::parse(&raw.status).expect("test status"),
    }
}

#[tokio::test]
async fn reconcile_then_propagate_round_trip() -> anyhow::Result<()> {
    let url = match std::env::var(nsc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: NSC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = nsc_db::connect(&url, 4).await?;
    nsc_db::migrate(&pool).await?;

    // Isolate test rows so reruns start clean.
    sqlx::query("delete from shop_results where mobile_number like '9902%'")
        .execute(&pool)
        .await?;
    sqlx::query("delete from mobile_numbers where number like '9902%'")
        .execute(&pool)
        .await?;
    sqlx::query("insert into mobile_numbers (number, shop_status, is_active) values ($1, null, true)")
        .bind("99020001")
        .execute(&pool)
        .await?;

    let store = PgCatalogStore::new(pool.clone());
    let key = NaturalKey::new("99020001", Source::Ucom);
    let t0 = Utc::now() - Duration::hours(1);

    // --- 1: first sighting ---------------------------------------------------

    let mut r = BatchReconciler::new(store.clone(), ReconcileConfig::default())?;
    r.push_at(valid("99020001", "available"), t0).await;
    let summary = r.finish().await;
    assert_eq!(summary.inserted, 1);

    let row = nsc_db::fetch_listing(&pool, &key).await?.expect("row inserted");
    assert!(row.is_new);
    assert!(!row.status_changed);
    assert_eq!(row.mnc, "99");
    assert_eq!(row.msn, "020001");

    let propagator = ChangePropagator::new(store.clone());
    let report = propagator.propagate().await?;
    assert!(report.propagated >= 1);

    let dep = nsc_db::fetch_dependent(&pool, "99020001").await?.expect("dependent");
    assert_eq!(dep.shop_status, Some(1));
    assert!(dep.is_active);
    assert!(!nsc_db::fetch_listing(&pool, &key).await?.expect("row").is_new);

    // --- 2: sold out ---------------------------------------------------------

    let t1 = Utc::now();
    let mut r = BatchReconciler::new(store.clone(), ReconcileConfig::default())?;
    r.push_at(valid("99020001", "soldout"), t1).await;
    let summary = r.finish().await;
    assert_eq!(summary.status_changes, 1);

    let row = nsc_db::fetch_listing(&pool, &key).await?.expect("row");
    assert!(row.status_changed);
    assert!(!row.is_new);
    assert!(row.last_seen > t0);

    propagator.propagate().await?;
    let dep = nsc_db::fetch_dependent(&pool, "99020001").await?.expect("dependent");
    assert_eq!(dep.shop_status, Some(0));
    assert!(!dep.is_active);

    // --- 3: idempotent repeat ------------------------------------------------

    let mut r = BatchReconciler::new(store.clone(), ReconcileConfig::default())?;
    r.push(valid("99020001", "soldout")).await;
    r.finish().await;
    let row = nsc_db::fetch_listing(&pool, &key).await?.expect("row");
    assert!(!row.is_new);
    assert!(!row.status_changed);

    // --- 4: failed batch, then a clean one -----------------------------------

    let cfg = ReconcileConfig {
        batch_size: 3,
        ..ReconcileConfig::default()
    };
    let mut r = BatchReconciler::new(store.clone(), cfg)?;
    r.push(valid("99020002", "available")).await;
    r.push(valid("99020003", "available")).await;
    let failed = r
        .push(valid("99020003", "ordered"))
        .await
        .expect("third push fills the batch");
    assert_eq!(failed.expect_err("unique violation").batch_size, 3);

    let fresh = NaturalKey::new("99020002", Source::Ucom);
    assert!(nsc_db::fetch_listing(&pool, &fresh).await?.is_none());

    r.push(valid("99020002", "available")).await;
    let summary = r.finish().await;
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.batches_committed, 1);
    assert!(nsc_db::fetch_listing(&pool, &fresh).await?.is_some());

    Ok(())
}
