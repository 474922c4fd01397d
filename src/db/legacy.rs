use sqlx::PgPool;
use tracing::instrument;

use super::gateway::{
    ComplianceSummary, CompressedReportRow, LegacyDataGateway, MrlDefaults, SampleDbInfo,
    SelectOption,
};

/// Legacy LIMS access over a Postgres-compatible endpoint, where the LIMS
/// procedures are exposed as set-returning functions.
///
/// The LIMS keeps these as SQL Server stored procedures. Before deployment
/// they must be ported to Postgres as `clink_laudos_comprimidos(text[])`,
/// `clink_mrl_muestra(text)` and `clink_mrl_parametros(text)`, and the
/// `clink_mrl`, `clink_sesion_informe`, `clink_mrl_mercados` and
/// `clink_mrl_retail` tables must exist with the columns queried below.
#[derive(Clone)]
pub struct PgLegacyGateway {
    pool: PgPool,
}

impl PgLegacyGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LegacyDataGateway for PgLegacyGateway {
    #[instrument(
        name = "db.laudos.fetch_compressed",
        skip(self, sample_ids),
        fields(sample_count = sample_ids.len(), row_count)
    )]
    async fn fetch_compressed_reports(
        &self,
        sample_ids: &[String],
    ) -> Result<Vec<CompressedReportRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CompressedReportRow>(
            "SELECT nombre, laudo FROM clink_laudos_comprimidos($1)",
        )
        .bind(sample_ids)
        .fetch_all(&self.pool)
        .await?;

        tracing::Span::current().record("row_count", rows.len());

        Ok(rows)
    }

    #[instrument(name = "db.mrl.sample_info", skip(self))]
    async fn sample_db_info(&self, sample_id: &str) -> Result<Option<SampleDbInfo>, sqlx::Error> {
        sqlx::query_as::<_, SampleDbInfo>(
            "SELECT CAST(labcode AS TEXT) AS labcode, nombrenew \
             FROM clink_mrl_muestra($1) LIMIT 1",
        )
        .bind(sample_id)
        .fetch_optional(&self.pool)
        .await
    }

    #[instrument(name = "db.mrl.defaults", skip(self))]
    async fn mrl_defaults(&self, sample_id: &str) -> Result<Option<MrlDefaults>, sqlx::Error> {
        sqlx::query_as::<_, MrlDefaults>(
            "SELECT mercados, retail, CAST(idioma AS TEXT) AS idioma \
             FROM clink_mrl_parametros($1) LIMIT 1",
        )
        .bind(sample_id)
        .fetch_optional(&self.pool)
        .await
    }

    #[instrument(
        name = "db.mrl.save_compliance",
        skip(self, summary),
        fields(sample_id = %summary.sample_id, test_flag = summary.test_flag)
    )]
    async fn save_compliance(&self, summary: &ComplianceSummary) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE clink_mrl
            SET resultado = $3,
                retail = $4,
                fecha = $5,
                mercados = $6,
                retailers = $7,
                idioma = $8
            WHERE cdamostra = $1 AND test = $2
            "#,
        )
        .bind(&summary.sample_id)
        .bind(summary.test_flag)
        .bind(&summary.market_results)
        .bind(&summary.retail_results)
        .bind(summary.generated_at)
        .bind(&summary.markets)
        .bind(&summary.retailers)
        .bind(&summary.language)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(name = "db.english.register_session", skip(self))]
    async fn register_session_marker(
        &self,
        session_id: &str,
        sample_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM clink_sesion_informe WHERE sesion = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO clink_sesion_informe (sesion, cdamostra) VALUES ($1, $2)")
            .bind(session_id)
            .bind(sample_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[instrument(name = "db.english.clear_session", skip(self))]
    async fn clear_session_marker(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM clink_sesion_informe WHERE sesion = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(name = "db.mrl.markets", skip(self))]
    async fn mrl_markets(&self) -> Result<Vec<SelectOption>, sqlx::Error> {
        sqlx::query_as::<_, SelectOption>(
            "SELECT CAST(cdmercado AS TEXT) AS value, mercado AS label \
             FROM clink_mrl_mercados ORDER BY mercado",
        )
        .fetch_all(&self.pool)
        .await
    }

    #[instrument(name = "db.mrl.retailers", skip(self))]
    async fn mrl_retailers(&self) -> Result<Vec<SelectOption>, sqlx::Error> {
        sqlx::query_as::<_, SelectOption>(
            "SELECT CAST(cdretail AS TEXT) AS value, UPPER(retail) AS label \
             FROM clink_mrl_retail ORDER BY retail",
        )
        .fetch_all(&self.pool)
        .await
    }
}
