//! Livros application library
//!
//! Book catalog administration: a searchable, sortable, paginated listing
//! plus create/edit/delete, served over HTTP by the Livros kernel.

pub mod modules;

use std::time::Duration;

use anyhow::Context;
use livros_db::{Database, PoolOptions};
use livros_kernel::{settings::DatabaseSettings, settings::Settings, InitCtx, ModuleRegistry};

/// Open the configured database
pub async fn connect_database(settings: &DatabaseSettings) -> anyhow::Result<Database> {
    let options = PoolOptions {
        max_connections: settings.max_connections,
        acquire_timeout: Duration::from_millis(settings.acquire_timeout_ms),
    };
    Database::connect(&settings.url, options)
        .await
        .with_context(|| format!("failed to open database '{}'", settings.url))
}

/// Build the registry with every application module registered
pub fn build_registry(db: &Database) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, db);
    registry
}

/// Apply every pending module migration
pub async fn migrate(registry: &ModuleRegistry, db: &Database) -> anyhow::Result<()> {
    for (module, migration) in registry.collect_migrations() {
        let id = format!("{module}/{}", migration.id);
        db.apply_migration(&id, migration.up)
            .await
            .with_context(|| format!("failed to apply migration '{id}'"))?;
    }
    Ok(())
}

/// Open the database, register modules, migrate and initialize them
pub async fn bootstrap(settings: &Settings) -> anyhow::Result<(Database, ModuleRegistry)> {
    let db = connect_database(&settings.database).await?;
    let registry = build_registry(&db);

    migrate(&registry, &db).await?;
    registry
        .init_modules(&InitCtx { settings })
        .await?;

    Ok((db, registry))
}

/// Run the module lifecycle around the HTTP server until shutdown
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let (db, registry) = bootstrap(&settings).await?;
    let ctx = InitCtx {
        settings: &settings,
    };

    registry.start_modules(&ctx).await?;

    let served = livros_http::start_server(&registry, &settings).await;

    registry.stop_modules().await?;
    db.close().await;
    served
}
