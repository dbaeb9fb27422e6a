use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::errors::ConnectorError;
use crate::store::{Store, UpsertOutcome};

/// PostgreSQL-backed document store. Canonical records live as JSONB
/// documents keyed by (doctype, natural key).
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, ConnectorError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        tracing::info!("Database connection pool established");
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), ConnectorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connector_documents (
                id BIGSERIAL PRIMARY KEY,
                doctype TEXT NOT NULL,
                natural_key JSONB NOT NULL,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (doctype, natural_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Projects the natural-key fields out of a record. Absent fields key as
/// JSON null so malformed records still land deterministically.
fn natural_key(record: &Value, key_fields: &[&str]) -> Value {
    let mut key = Map::new();
    for field in key_fields {
        key.insert(
            (*field).to_string(),
            record.get(*field).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(key)
}

#[async_trait]
impl Store for PgStore {
    async fn upsert(
        &self,
        doctype: &str,
        record: &Value,
        key_fields: &[&str],
    ) -> Result<UpsertOutcome, ConnectorError> {
        let key = natural_key(record, key_fields);

        // Sequential find-then-write keeps the queries simple; the run is
        // the only writer for its account.
        let existing =
            sqlx::query("SELECT id FROM connector_documents WHERE doctype = $1 AND natural_key = $2")
                .bind(doctype)
                .bind(&key)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                sqlx::query(
                    "UPDATE connector_documents SET doc = $1, updated_at = now() WHERE id = $2",
                )
                .bind(record)
                .bind(id)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                sqlx::query(
                    "INSERT INTO connector_documents (doctype, natural_key, doc) VALUES ($1, $2, $3)",
                )
                .bind(doctype)
                .bind(&key)
                .bind(record)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn find_existing(
        &self,
        doctype: &str,
        vendor: &str,
    ) -> Result<Vec<Value>, ConnectorError> {
        let rows = sqlx::query(
            "SELECT doc FROM connector_documents WHERE doctype = $1 AND doc->>'vendor' = $2",
        )
        .bind(doctype)
        .bind(vendor)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("doc")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn natural_key_projects_fields_in_order() {
        let record = json!({"number": "K1", "vendor": "EDF", "extra": 1});
        let key = natural_key(&record, &["number", "vendor"]);
        assert_eq!(key, json!({"number": "K1", "vendor": "EDF"}));
    }

    #[test]
    fn natural_key_absent_field_is_null() {
        let record = json!({"vendor": "EDF"});
        let key = natural_key(&record, &["pdl"]);
        assert_eq!(key, json!({"pdl": null}));
    }
}
