use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_template_row;

const SELECT_TEMPLATE: &str = r#"
    SELECT id, name, type, description, template, created_at, updated_at
    FROM templates
"#;

/// Template database operations
pub struct TemplateRepo;

impl TemplateRepo {
    pub async fn list_by_kind(pool: &Pool<Sqlite>, kind: TemplateKind) -> Result<Vec<Template>> {
        let rows = sqlx::query(&format!("{} WHERE type = ? ORDER BY name", SELECT_TEMPLATE))
            .bind(kind.as_str())
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_template_row).collect())
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Template>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_TEMPLATE))
            .bind(name)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_template_row))
    }

    /// Insert unless the name exists; returns whether a row was written
    pub async fn insert_if_missing(pool: &Pool<Sqlite>, req: &TemplateUpsert) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO templates (name, type, description, template, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM templates WHERE name = ?)
            "#,
        )
        .bind(&req.name)
        .bind(req.kind.as_str())
        .bind(&req.description)
        .bind(&req.content)
        .bind(now)
        .bind(now)
        .bind(&req.name)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert, or replace type, description and body of the named template
    pub async fn upsert(pool: &Pool<Sqlite>, req: &TemplateUpsert) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO templates (name, type, description, template, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                type = excluded.type,
                description = excluded.description,
                template = excluded.template,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&req.name)
        .bind(req.kind.as_str())
        .bind(&req.description)
        .bind(&req.content)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Returns whether a row was removed
    pub async fn delete_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM templates WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
