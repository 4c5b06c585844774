use std::collections::HashSet;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

/// Creates a PostgreSQL connection pool and applies pending migrations.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Optional columns the store may rely on, resolved once at startup.
///
/// Deployments that predate a column keep working: the store skips the
/// feature instead of reading the catalog on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaContract {
    pub version: i64,
    pub has_external_id: bool,
    pub has_interview_fields: bool,
}

impl SchemaContract {
    #[cfg(test)]
    pub fn full() -> Self {
        Self {
            version: 1,
            has_external_id: true,
            has_interview_fields: true,
        }
    }

    pub fn from_columns(version: i64, columns: &HashSet<(String, String)>) -> Self {
        let has = |table: &str, column: &str| {
            columns.contains(&(table.to_string(), column.to_string()))
        };
        Self {
            version,
            has_external_id: has("applications", "external_id"),
            has_interview_fields: has("applications", "interview_status")
                && has("applications", "interview_link")
                && has("applications", "interview_time"),
        }
    }

    pub async fn resolve(pool: &PgPool) -> Result<Self> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT table_name::text, column_name::text
            FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name IN ('applications', 'job_postings')
            "#,
        )
        .fetch_all(pool)
        .await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success")
                .fetch_one(pool)
                .await?;

        let contract = Self::from_columns(version.unwrap_or(0), &rows.into_iter().collect());
        if !contract.has_external_id {
            warn!("applications.external_id missing: webhook dedup falls back to (job, email)");
        }
        if !contract.has_interview_fields {
            warn!("applications interview columns missing: interviews will not be scheduled");
        }
        info!(?contract, "Schema contract resolved");
        Ok(contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(pairs: &[(&str, &str)]) -> HashSet<(String, String)> {
        pairs
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_contract_detects_all_optional_columns() {
        let cols = columns(&[
            ("applications", "external_id"),
            ("applications", "interview_status"),
            ("applications", "interview_link"),
            ("applications", "interview_time"),
        ]);
        let contract = SchemaContract::from_columns(1, &cols);
        assert_eq!(contract, SchemaContract::full());
    }

    #[test]
    fn test_contract_requires_every_interview_column() {
        let cols = columns(&[
            ("applications", "interview_status"),
            ("applications", "interview_link"),
        ]);
        let contract = SchemaContract::from_columns(3, &cols);
        assert!(!contract.has_interview_fields);
        assert!(!contract.has_external_id);
        assert_eq!(contract.version, 3);
    }

    #[test]
    fn test_contract_is_table_scoped() {
        let cols = columns(&[("job_postings", "external_id")]);
        assert!(!SchemaContract::from_columns(1, &cols).has_external_id);
    }
}
