// Postgres implementation of the catalog store traits.
//
// Bulk shapes:
// - lookup joins against unnest() of the key arrays (one round-trip per batch)
// - insert uses a multi-row VALUES list, chunked to stay under the bind limit
// - update joins against unnest() of the new values; a key repeated in one
//   batch keeps its last occurrence
//
// Flagged selection takes row locks (FOR UPDATE SKIP LOCKED) so two
// propagation passes never work on the same row; the conditional claim is a
// second guard for stores without locking.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};

use nsc_schemas::{NaturalKey, ShopStatus, Source, UNAVAILABLE_SHOP_STATUS};
use nsc_store::{
    CatalogStore, CatalogTx, ExistingListing, FlagClear, FlaggedListing, ListingInsert,
    ListingUpdate,
};

/// Rows per INSERT statement. 8 binds per row keeps us well below 65535.
const INSERT_CHUNK: usize = 1_000;

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await.context("begin transaction failed")?;
        Ok(Box::new(PgCatalogTx { tx }))
    }
}

pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl CatalogTx for PgCatalogTx {
    async fn fetch_existing(
        &mut self,
        keys: &[NaturalKey],
    ) -> Result<HashMap<NaturalKey, ExistingListing>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let numbers: Vec<String> = keys.iter().map(|k| k.catalog_key.clone()).collect();
        let sources: Vec<String> = keys.iter().map(|k| k.source.as_str().to_string()).collect();

        let rows = sqlx::query(
            r#"
            select s.id, s.mobile_number, s.spider_name, s.status, s.is_new, s.status_change
            from shop_results s
            join unnest($1::text[], $2::text[]) as k(mobile_number, spider_name)
              on s.mobile_number = k.mobile_number
             and s.spider_name = k.spider_name
            "#,
        )
        .bind(&numbers)
        .bind(&sources)
        .fetch_all(&mut *self.tx)
        .await
        .context("fetch_existing query failed")?;

        let mut out = HashMap::with_capacity(rows.len());
        for r in rows {
            let key = NaturalKey::new(
                r.try_get::<String, _>("mobile_number")
                    .context("shop_results.mobile_number")?,
                Source::parse(&r.try_get::<String, _>("spider_name")?)
                    .context("shop_results.spider_name")?,
            );
            let existing = ExistingListing {
                id: r.try_get("id").context("shop_results.id")?,
                status: ShopStatus::parse(&r.try_get::<String, _>("status")?)
                    .context("shop_results.status")?,
                is_new: r.try_get("is_new").context("shop_results.is_new")?,
                status_changed: r
                    .try_get("status_change")
                    .context("shop_results.status_change")?,
            };
            out.insert(key, existing);
        }
        Ok(out)
    }

    async fn insert_listings(&mut self, rows: &[ListingInsert]) -> Result<u64> {
        let mut written = 0_u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "insert into shop_results \
                 (mobile_number, mnc, msn, status, spider_name, is_new, status_change, last_seen) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.key.catalog_key.clone())
                    .push_bind(r.mnc.clone())
                    .push_bind(r.msn.clone())
                    .push_bind(r.status.as_str())
                    .push_bind(r.key.source.as_str())
                    .push_bind(r.is_new)
                    .push_bind(r.status_changed)
                    .push_bind(r.last_seen);
            });

            let res = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .context("insert shop_results failed")?;
            written += res.rows_affected();
        }
        tracing::debug!(rows = written, "inserted shop_results");
        Ok(written)
    }

    async fn update_listings(&mut self, rows: &[ListingUpdate]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let numbers: Vec<String> = rows.iter().map(|r| r.key.catalog_key.clone()).collect();
        let sources: Vec<String> = rows.iter().map(|r| r.key.source.as_str().to_string()).collect();
        let statuses: Vec<String> = rows.iter().map(|r| r.status.as_str().to_string()).collect();
        let is_new: Vec<bool> = rows.iter().map(|r| r.is_new).collect();
        let changed: Vec<bool> = rows.iter().map(|r| r.status_changed).collect();
        let last_seen: Vec<DateTime<Utc>> = rows.iter().map(|r| r.last_seen).collect();

        let res = sqlx::query(
            r#"
            update shop_results s
            set status = u.status,
                is_new = u.is_new,
                status_change = u.status_change,
                last_seen = u.last_seen
            from (
                select distinct on (mobile_number, spider_name)
                       mobile_number, spider_name, status, is_new, status_change, last_seen
                from unnest($1::text[], $2::text[], $3::text[], $4::bool[], $5::bool[], $6::timestamptz[])
                  with ordinality
                  as v(mobile_number, spider_name, status, is_new, status_change, last_seen, ord)
                order by mobile_number, spider_name, ord desc
            ) u
            where s.mobile_number = u.mobile_number
              and s.spider_name = u.spider_name
            "#,
        )
        .bind(&numbers)
        .bind(&sources)
        .bind(&statuses)
        .bind(&is_new)
        .bind(&changed)
        .bind(&last_seen)
        .execute(&mut *self.tx)
        .await
        .context("update shop_results failed")?;

        tracing::debug!(rows = res.rows_affected(), "updated shop_results");
        Ok(res.rows_affected())
    }

    async fn select_flagged(&mut self) -> Result<Vec<FlaggedListing>> {
        let rows = sqlx::query(
            r#"
            select id, mobile_number, spider_name, status, is_new, status_change
            from shop_results
            where is_new or status_change
            order by id asc
            for update skip locked
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .context("select flagged shop_results failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(FlaggedListing {
                id: r.try_get("id").context("shop_results.id")?,
                key: NaturalKey::new(
                    r.try_get::<String, _>("mobile_number")
                        .context("shop_results.mobile_number")?,
                    Source::parse(&r.try_get::<String, _>("spider_name")?)
                        .context("shop_results.spider_name")?,
                ),
                status: ShopStatus::parse(&r.try_get::<String, _>("status")?)
                    .context("shop_results.status")?,
                is_new: r.try_get("is_new").context("shop_results.is_new")?,
                status_changed: r
                    .try_get("status_change")
                    .context("shop_results.status_change")?,
            });
        }
        Ok(out)
    }

    async fn claim_flags(&mut self, id: i64, clear: FlagClear) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update shop_results
            set is_new = case when $2 then false else is_new end,
                status_change = case when $3 then false else status_change end
            where id = $1
              and (($2 and is_new) or ($3 and status_change))
            "#,
        )
        .bind(id)
        .bind(clear.is_new)
        .bind(clear.status_changed)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("claim_flags failed for shop_results.id={id}"))?;

        Ok(res.rows_affected() == 1)
    }

    async fn apply_shop_status(&mut self, number: &str, shop_status: i16) -> Result<u64> {
        let res = sqlx::query(
            r#"
            update mobile_numbers
            set shop_status = $1,
                is_active = case when $1 = $3 then false else is_active end
            where number = $2
            "#,
        )
        .bind(shop_status)
        .bind(number)
        .bind(UNAVAILABLE_SHOP_STATUS)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("update mobile_numbers failed for number={number}"))?;

        Ok(res.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("commit failed")?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.context("rollback failed")?;
        Ok(())
    }
}
