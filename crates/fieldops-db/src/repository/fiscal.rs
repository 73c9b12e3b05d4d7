//! # Fiscal Configuration Repository
//!
//! One row per provider. Rates are stored as integer basis points with a
//! withholding flag per tax.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use fieldops_core::tax::{FiscalEnvironment, SimplesBracket, TaxLine};
use fieldops_core::{FiscalConfiguration, Rate, TaxRegime};

/// Row shape of `fiscal_configurations`.
#[derive(Debug, sqlx::FromRow)]
struct FiscalConfigRow {
    provider_id: String,
    regime: String,
    simples_bracket: i64,
    iss_rate_bps: i64,
    iss_withheld: bool,
    pis_rate_bps: i64,
    pis_withheld: bool,
    cofins_rate_bps: i64,
    cofins_withheld: bool,
    csll_rate_bps: i64,
    csll_withheld: bool,
    irpj_rate_bps: i64,
    irpj_withheld: bool,
    inss_rate_bps: i64,
    inss_withheld: bool,
    service_code: Option<String>,
    service_list_item: Option<String>,
    cnae: Option<String>,
    municipal_registration: Option<String>,
    municipality_code: Option<String>,
    environment: FiscalEnvironment,
}

fn tax_line(field: &str, bps: i64, withheld: bool) -> DbResult<TaxLine> {
    let bps = u32::try_from(bps)
        .map_err(|_| DbError::Internal(format!("stored {field} out of range: {bps}")))?;
    Ok(TaxLine::new(Rate::from_bps(bps), withheld))
}

impl TryFrom<FiscalConfigRow> for FiscalConfiguration {
    type Error = DbError;

    fn try_from(row: FiscalConfigRow) -> DbResult<Self> {
        let bracket = u8::try_from(row.simples_bracket)
            .ok()
            .and_then(|b| SimplesBracket::new(b).ok())
            .ok_or_else(|| {
                DbError::Internal(format!("stored simples_bracket invalid: {}", row.simples_bracket))
            })?;

        Ok(FiscalConfiguration {
            // a regime nobody recognizes is taxed as lucro presumido
            regime: TaxRegime::parse_or_default(&row.regime),
            simples_bracket: bracket,
            iss: tax_line("iss_rate_bps", row.iss_rate_bps, row.iss_withheld)?,
            pis: tax_line("pis_rate_bps", row.pis_rate_bps, row.pis_withheld)?,
            cofins: tax_line("cofins_rate_bps", row.cofins_rate_bps, row.cofins_withheld)?,
            csll: tax_line("csll_rate_bps", row.csll_rate_bps, row.csll_withheld)?,
            irpj: tax_line("irpj_rate_bps", row.irpj_rate_bps, row.irpj_withheld)?,
            inss: tax_line("inss_rate_bps", row.inss_rate_bps, row.inss_withheld)?,
            provider_id: row.provider_id,
            service_code: row.service_code,
            service_list_item: row.service_list_item,
            cnae: row.cnae,
            municipal_registration: row.municipal_registration,
            municipality_code: row.municipality_code,
            environment: row.environment,
        })
    }
}

/// Repository for provider fiscal configurations.
#[derive(Debug, Clone)]
pub struct FiscalRepository {
    pool: SqlitePool,
}

impl FiscalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FiscalRepository { pool }
    }

    pub async fn get(&self, provider_id: &str) -> DbResult<Option<FiscalConfiguration>> {
        let row = sqlx::query_as::<_, FiscalConfigRow>(
            r#"
            SELECT provider_id, regime, simples_bracket,
                   iss_rate_bps, iss_withheld, pis_rate_bps, pis_withheld,
                   cofins_rate_bps, cofins_withheld, csll_rate_bps, csll_withheld,
                   irpj_rate_bps, irpj_withheld, inss_rate_bps, inss_withheld,
                   service_code, service_list_item, cnae,
                   municipal_registration, municipality_code, environment
            FROM fiscal_configurations
            WHERE provider_id = ?1
            "#,
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FiscalConfiguration::try_from).transpose()
    }

    /// Inserts or replaces the provider's configuration.
    pub async fn upsert(&self, config: &FiscalConfiguration, now: DateTime<Utc>) -> DbResult<()> {
        debug!(provider_id = %config.provider_id, regime = %config.regime, "Saving fiscal configuration");

        sqlx::query(
            r#"
            INSERT INTO fiscal_configurations (
                provider_id, regime, simples_bracket,
                iss_rate_bps, iss_withheld, pis_rate_bps, pis_withheld,
                cofins_rate_bps, cofins_withheld, csll_rate_bps, csll_withheld,
                irpj_rate_bps, irpj_withheld, inss_rate_bps, inss_withheld,
                service_code, service_list_item, cnae,
                municipal_registration, municipality_code, environment,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18,
                ?19, ?20, ?21,
                ?22, ?22
            )
            ON CONFLICT (provider_id) DO UPDATE SET
                regime = excluded.regime,
                simples_bracket = excluded.simples_bracket,
                iss_rate_bps = excluded.iss_rate_bps,
                iss_withheld = excluded.iss_withheld,
                pis_rate_bps = excluded.pis_rate_bps,
                pis_withheld = excluded.pis_withheld,
                cofins_rate_bps = excluded.cofins_rate_bps,
                cofins_withheld = excluded.cofins_withheld,
                csll_rate_bps = excluded.csll_rate_bps,
                csll_withheld = excluded.csll_withheld,
                irpj_rate_bps = excluded.irpj_rate_bps,
                irpj_withheld = excluded.irpj_withheld,
                inss_rate_bps = excluded.inss_rate_bps,
                inss_withheld = excluded.inss_withheld,
                service_code = excluded.service_code,
                service_list_item = excluded.service_list_item,
                cnae = excluded.cnae,
                municipal_registration = excluded.municipal_registration,
                municipality_code = excluded.municipality_code,
                environment = excluded.environment,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.provider_id)
        .bind(config.regime.as_str())
        .bind(i64::from(config.simples_bracket.number()))
        .bind(i64::from(config.iss.rate.bps()))
        .bind(config.iss.withheld)
        .bind(i64::from(config.pis.rate.bps()))
        .bind(config.pis.withheld)
        .bind(i64::from(config.cofins.rate.bps()))
        .bind(config.cofins.withheld)
        .bind(i64::from(config.csll.rate.bps()))
        .bind(config.csll.withheld)
        .bind(i64::from(config.irpj.rate.bps()))
        .bind(config.irpj.withheld)
        .bind(i64::from(config.inss.rate.bps()))
        .bind(config.inss.withheld)
        .bind(&config.service_code)
        .bind(&config.service_list_item)
        .bind(&config.cnae)
        .bind(&config.municipal_registration)
        .bind(&config.municipality_code)
        .bind(config.environment)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(provider_id = %config.provider_id, "Fiscal configuration saved");
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM fiscal_configurations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::t0;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_upsert_keeps_one_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.fiscal();
        assert!(repo.get("p1").await.unwrap().is_none());

        let presumido = FiscalConfiguration::suggested("p1", TaxRegime::LucroPresumido);
        repo.upsert(&presumido, t0()).await.unwrap();
        assert_eq!(repo.get("p1").await.unwrap().unwrap(), presumido);

        let mut simples = FiscalConfiguration::suggested("p1", TaxRegime::SimplesNacional);
        simples.simples_bracket = SimplesBracket::new(3).unwrap();
        simples.environment = FiscalEnvironment::Production;
        repo.upsert(&simples, t0()).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let stored = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.regime, TaxRegime::SimplesNacional);
        assert_eq!(stored.simples_bracket.number(), 3);
        assert_eq!(stored.environment, FiscalEnvironment::Production);
    }

    #[tokio::test]
    async fn test_unknown_stored_regime_reads_as_presumido() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            "INSERT INTO fiscal_configurations (provider_id, regime, created_at, updated_at) \
             VALUES ('p1', 'LUCRO_FICTICIO', ?1, ?1)",
        )
        .bind(t0())
        .execute(db.pool())
        .await
        .unwrap();

        let config = db.fiscal().get("p1").await.unwrap().unwrap();
        assert_eq!(config.regime, TaxRegime::LucroPresumido);
        assert!(config.rates().is_all_zero());
    }
}
