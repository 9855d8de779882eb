//! SQLite-backed pricing catalog.

use std::sync::Arc;

use async_trait::async_trait;
use metasync_core::PricingCatalog;
use metasync_domain::{PricingEntry, PricingModel, Provider, Result as DomainResult};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::{info, warn};

use super::manager::{map_join_error, map_sql_error, DbManager};

/// Provider billing parameters stored in the `pricing` table.
pub struct SqlitePricingCatalog {
    db: Arc<DbManager>,
}

impl SqlitePricingCatalog {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace the pricing of `entry.provider`.
    pub async fn upsert(&self, entry: &PricingEntry) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let entry = entry.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            conn.execute(
                PRICING_UPSERT_SQL,
                params![
                    entry.provider.to_string(),
                    entry.invocation_cost,
                    entry.duration_cost_per_gb_second,
                    entry.duration_cost_per_ghz_second,
                    entry.billing_unit_ms,
                    entry.model.to_string(),
                ],
            )
            .map_err(map_sql_error)?;
            info!(provider = %entry.provider, model = %entry.model, "pricing.upserted");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    /// Every pricing entry, ordered by provider.
    pub async fn list(&self) -> DomainResult<Vec<PricingEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<PricingEntry>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(PRICING_LIST_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_pricing_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl PricingCatalog for SqlitePricingCatalog {
    async fn pricing_for(&self, provider: Provider) -> DomainResult<Option<PricingEntry>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<PricingEntry>> {
            let conn = db.get_connection()?;
            conn.query_row(PRICING_BY_PROVIDER_SQL, params![provider.to_string()], map_pricing_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const PRICING_UPSERT_SQL: &str = "INSERT INTO pricing (
        provider, invocation_cost, duration_cost_per_gb_second, duration_cost_per_ghz_second,
        billing_unit_ms, model
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT (provider) DO UPDATE SET
        invocation_cost = excluded.invocation_cost,
        duration_cost_per_gb_second = excluded.duration_cost_per_gb_second,
        duration_cost_per_ghz_second = excluded.duration_cost_per_ghz_second,
        billing_unit_ms = excluded.billing_unit_ms,
        model = excluded.model";

const PRICING_BY_PROVIDER_SQL: &str = "SELECT
        provider, invocation_cost, duration_cost_per_gb_second, duration_cost_per_ghz_second,
        billing_unit_ms, model
    FROM pricing
    WHERE provider = ?1";

const PRICING_LIST_SQL: &str = "SELECT
        provider, invocation_cost, duration_cost_per_gb_second, duration_cost_per_ghz_second,
        billing_unit_ms, model
    FROM pricing
    ORDER BY provider ASC";

fn map_pricing_row(row: &Row<'_>) -> rusqlite::Result<PricingEntry> {
    let provider: String = row.get(0)?;
    let model: String = row.get(5)?;

    Ok(PricingEntry {
        provider: provider.parse().unwrap_or(Provider::Unknown),
        invocation_cost: row.get(1)?,
        duration_cost_per_gb_second: row.get(2)?,
        duration_cost_per_ghz_second: row.get(3)?,
        billing_unit_ms: row.get(4)?,
        model: parse_model(&provider, &model),
    })
}

fn parse_model(provider: &str, raw: &str) -> PricingModel {
    match raw.parse::<PricingModel>() {
        Ok(model) => model,
        Err(err) => {
            warn!(provider, raw_model = %raw, error = %err, "invalid pricing model, using linear");
            PricingModel::Linear
        }
    }
}
