use anyhow::{Context, Result};
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;

use nsc_schemas::{NaturalKey, ShopStatus, Source};
use nsc_store::{CatalogRow, DependentRecord};

pub mod catalog;

pub use catalog::PgCatalogStore;
pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "NSC_DATABASE_URL";

/// Connect to Postgres. Called once at startup; a failure here is fatal and
/// must surface before any batch work begins.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Connect to Postgres using NSC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 5).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_catalog_table: bool,
    pub has_dependent_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_catalog_table: table_exists(pool, "shop_results").await?,
        has_dependent_table: table_exists(pool, "mobile_numbers").await?,
    })
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed: {table}"))?;
    Ok(exists)
}

/// Number of rows still waiting for propagation.
pub async fn count_flagged(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        "select count(*)::bigint from shop_results where is_new or status_change",
    )
    .fetch_one(pool)
    .await
    .context("count_flagged failed")?;
    Ok(n)
}

pub async fn fetch_listing(pool: &PgPool, key: &NaturalKey) -> Result<Option<CatalogRow>> {
    let row = sqlx::query(
        r#"
        select id, mobile_number, spider_name, mnc, msn, status, is_new, status_change, last_seen
        from shop_results
        where mobile_number = $1 and spider_name = $2
        "#,
    )
    .bind(&key.catalog_key)
    .bind(key.source.as_str())
    .fetch_optional(pool)
    .await
    .context("fetch_listing failed")?;

    let Some(r) = row else {
        return Ok(None);
    };

    Ok(Some(CatalogRow {
        id: r.try_get("id")?,
        key: NaturalKey::new(
            r.try_get::<String, _>("mobile_number")?,
            Source::parse(&r.try_get::<String, _>("spider_name")?)?,
        ),
        mnc: r.try_get("mnc")?,
        msn: r.try_get("msn")?,
        status: ShopStatus::parse(&r.try_get::<String, _>("status")?)?,
        is_new: r.try_get("is_new")?,
        status_changed: r.try_get("status_change")?,
        last_seen: r.try_get("last_seen")?,
    }))
}

pub async fn fetch_dependent(pool: &PgPool, number: &str) -> Result<Option<DependentRecord>> {
    let row = sqlx::query(
        r#"
        select number, shop_status, is_active
        from mobile_numbers
        where number = $1
        "#,
    )
    .bind(number)
    .fetch_optional(pool)
    .await
    .context("fetch_dependent failed")?;

    let Some(r) = row else {
        return Ok(None);
    };

    Ok(Some(DependentRecord {
        number: r.try_get("number")?,
        shop_status: r.try_get("shop_status")?,
        is_active: r.try_get("is_active")?,
    }))
}
