use anyhow::Context;
use axum::Router;
use shelf_db::Database;
use shelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules;

/// A bootstrapped application: settings, an open database and registered modules
pub struct App {
    settings: Settings,
    db: Database,
    registry: ModuleRegistry,
}

impl App {
    /// Connect to the database and register every module
    pub async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let db = Database::connect(&settings.database)
            .await
            .context("failed to open database")?;

        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, &db);

        tracing::info!(
            env = ?settings.environment,
            modules = registry.modules().len(),
            "application bootstrapped"
        );

        Ok(Self {
            settings,
            db,
            registry,
        })
    }

    /// Apply pending module migrations, returning how many ran
    pub async fn migrate(&self) -> anyhow::Result<usize> {
        self.registry.apply_migrations(&self.db).await
    }

    /// The fully layered HTTP router, without binding a listener
    pub fn router(&self) -> Router {
        shelf_http::build_router(&self.registry, &self.settings)
    }

    /// Migrate, run the module lifecycle around the HTTP server, then close the pool
    pub async fn serve(self) -> anyhow::Result<()> {
        self.migrate().await?;

        let ctx = InitCtx {
            settings: &self.settings,
            db: &self.db,
        };
        self.registry.init_modules(&ctx).await?;
        self.registry.start_modules(&ctx).await?;

        let served =
            shelf_http::start_server(&self.registry, &self.settings, shelf_http::shutdown_signal())
                .await;

        let stopped = self.registry.stop_modules().await;
        self.db.close().await;

        served?;
        stopped
    }

    /// Close the database pool without serving
    pub async fn shutdown(self) {
        self.db.close().await;
    }
}
