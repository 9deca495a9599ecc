//! Scenario: one batch updates the same stored key twice.
//!
//! # Invariants under test
//!
//! 1. The bulk update applies the last occurrence of a repeated key, not an
//!    arbitrary one.
//! 2. The key counts as one updated row.
//!
//! DB-backed test. Skips if `NSC_DATABASE_URL` is not set.

use chrono::{TimeZone, Utc};
use nsc_db::PgCatalogStore;
use nsc_reconcile::{BatchReconciler, ReconcileConfig};
use nsc_schemas::{NaturalKey, ShopStatus, Source, ValidListing};

fn valid(key: &str, status: ShopStatus) -> ValidListing {
    ValidListing {
        key: NaturalKey::new(key, Source::Ucom),
        mnc: key[..2].to_string(),
        msn: key[2..].to_string(),
        status,
    }
}

#[tokio::test]
async fn repeated_key_in_one_batch_keeps_last_sighting() -> anyhow::Result<()> {
    let url = match std::env::var(nsc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: NSC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = nsc_db::connect(&url, 2).await?;
    nsc_db::migrate(&pool).await?;
    sqlx::query("delete from shop_results where mobile_number like '9904%'")
        .execute(&pool)
        .await?;

    let store = PgCatalogStore::new(pool.clone());
    let key = NaturalKey::new("99040001", Source::Ucom);
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single().expect("t0");
    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).single().expect("t1");
    let t2 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("t2");

    let mut r = BatchReconciler::new(store.clone(), ReconcileConfig::default())?;
    r.push_at(valid("99040001", ShopStatus::Available), t0).await;
    assert_eq!(r.finish().await.inserted, 1);

    // Several orderings, so a lucky join order cannot pass the test.
    let sequences = [
        [ShopStatus::SoldOut, ShopStatus::Available],
        [ShopStatus::Available, ShopStatus::Ordered],
        [ShopStatus::Ordered, ShopStatus::SoldOut],
    ];
    let mut stored = ShopStatus::Available;
    for [first, last] in sequences {
        let cfg = ReconcileConfig {
            batch_size: 2,
            ..ReconcileConfig::default()
        };
        let mut r = BatchReconciler::new(store.clone(), cfg)?;
        r.push_at(valid("99040001", first), t1).await;
        let outcome = r
            .push_at(valid("99040001", last), t2)
            .await
            .expect("second push fills the batch")?;
        assert_eq!(outcome.updated, 1);

        let row = nsc_db::fetch_listing(&pool, &key).await?.expect("row");
        assert_eq!(row.status, last);
        assert_eq!(row.status_changed, last != stored);
        assert!(!row.is_new);
        assert_eq!(row.last_seen, t2);
        stored = last;
    }

    Ok(())
}
