use anyhow::Context;
use livros_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load Livros settings")?;
    livros_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        port = settings.server.port,
        "livros-app bootstrap starting"
    );

    livros_app::run(settings).await?;

    tracing::info!("livros-app shut down");
    Ok(())
}
