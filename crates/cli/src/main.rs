use anyhow::Context;
use clap::{Parser, Subcommand};
use livros_kernel::settings::Settings;

/// Livros book catalog service
#[derive(Debug, Parser)]
#[command(name = "livros-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
        /// Start with an empty catalog
        #[arg(long)]
        no_seed: bool,
    },
    /// Print the effective settings as JSON
    Settings,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load().with_context(|| "failed to load Livros settings")?;

    match cli.command {
        Command::Settings => {
            let rendered = serde_json::to_string_pretty(&settings)
                .context("failed to render settings")?;
            println!("{rendered}");
            Ok(())
        }
        Command::Serve { port, no_seed } => {
            if let Some(port) = port {
                settings.server.port = port;
            }
            if no_seed {
                settings.database.seed_sample_data = false;
            }

            livros_telemetry::init(&settings.telemetry)?;
            tracing::info!(env = ?settings.environment, "livros-cli serve");

            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(livros_app::run(settings))
        }
    }
}
