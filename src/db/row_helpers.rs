use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Map a SQLite row to a Template struct
pub fn map_template_row(row: &SqliteRow) -> Template {
    let kind: String = row.get("type");
    Template {
        id: row.get("id"),
        name: row.get("name"),
        kind: kind.parse().unwrap_or_else(|e| {
            tracing::warn!("{}, treating as bootstrap", e);
            TemplateKind::Bootstrap
        }),
        description: row.try_get::<Option<String>, _>("description").ok().flatten().unwrap_or_default(),
        content: row.get("template"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
