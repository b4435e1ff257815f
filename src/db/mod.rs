pub(crate) mod row_helpers;
pub mod seeds;
mod templates;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::assembler::TemplateSource;
use crate::models::*;
use crate::utils::unescape;

use templates::TemplateRepo;

/// Store is the template catalog, delegating SQL to the repo module.
///
/// Persistence failures stop here: they are logged and surface to callers as
/// `false`, `None` or an empty list.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (creating if needed) the catalog at `db_path`
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Open the catalog with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run migrations and insert the bundled templates
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        self.seed_default_templates().await?;
        Ok(())
    }

    /// Bundled templates are inserted only when missing so operator edits survive restarts
    async fn seed_default_templates(&self) -> Result<()> {
        for seed in seeds::default_templates() {
            let inserted = TemplateRepo::insert_if_missing(&self.pool, &seed)
                .await
                .with_context(|| format!("Failed to seed template {}", seed.name))?;
            if inserted {
                tracing::info!("Seeded template {}", seed.name);
            }
        }
        Ok(())
    }

    /// Import operator templates listed in `<import_dir>/meta.yaml`
    pub async fn import_directory(&self, import_dir: &Path) -> Result<usize> {
        let entries = seeds::load_import_manifest(import_dir).await?;
        let mut imported = 0;
        for entry in entries {
            if self.import_template(&entry).await {
                imported += 1;
            }
        }
        Ok(imported)
    }

    /// Summaries of every template of `kind`, ordered by name
    pub async fn list_templates(&self, kind: TemplateKind) -> Vec<TemplateSummary> {
        match TemplateRepo::list_by_kind(&self.pool, kind).await {
            Ok(templates) => templates.iter().map(TemplateSummary::from).collect(),
            Err(e) => {
                tracing::error!("Could not list {} templates: {:#}", kind, e);
                Vec::new()
            }
        }
    }

    pub async fn get_template(&self, name: &str) -> Option<Template> {
        match TemplateRepo::get_by_name(&self.pool, name).await {
            Ok(template) => template,
            Err(e) => {
                tracing::error!("Could not get template {}: {:#}", name, e);
                None
            }
        }
    }

    /// Insert a new template. An existing name is left untouched and still
    /// counts as success.
    pub async fn import_template(&self, upsert: &TemplateUpsert) -> bool {
        let upsert = unescaped(upsert);
        match TemplateRepo::insert_if_missing(&self.pool, &upsert).await {
            Ok(true) => {
                tracing::info!("Imported template {}", upsert.name);
                true
            }
            Ok(false) => {
                tracing::debug!("Template {} already exists", upsert.name);
                true
            }
            Err(e) => {
                tracing::error!("Could not import template {}: {:#}", upsert.name, e);
                false
            }
        }
    }

    /// Insert or replace a template by name
    pub async fn update_template(&self, upsert: &TemplateUpsert) -> bool {
        let upsert = unescaped(upsert);
        match TemplateRepo::upsert(&self.pool, &upsert).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Could not update template {}: {:#}", upsert.name, e);
                false
            }
        }
    }

    /// Remove a template by name; removing an absent name succeeds
    pub async fn delete_template(&self, name: &str) -> bool {
        match TemplateRepo::delete_by_name(&self.pool, name).await {
            Ok(deleted) => {
                if !deleted {
                    tracing::debug!("Template {} did not exist", name);
                }
                true
            }
            Err(e) => {
                tracing::error!("Could not delete template {}: {:#}", name, e);
                false
            }
        }
    }
}

#[async_trait]
impl TemplateSource for Store {
    async fn template_content(&self, name: &str) -> Option<String> {
        self.get_template(name).await.map(|t| t.content)
    }
}

fn unescaped(upsert: &TemplateUpsert) -> TemplateUpsert {
    TemplateUpsert {
        content: unescape(&upsert.content),
        ..upsert.clone()
    }
}
