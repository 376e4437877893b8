use anyhow::Context;
use clap::{Parser, Subcommand};
use shelf_app::App;
use shelf_kernel::settings::Settings;

/// Shelf book catalogue service
#[derive(Debug, Parser)]
#[command(name = "shelf", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending migrations and serve the HTTP API
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load Shelf settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    let app = App::bootstrap(settings).await?;

    match cli.command {
        Command::Serve => app.serve().await,
        Command::Migrate => {
            let applied = app.migrate().await?;
            tracing::info!(applied, "migrate finished");
            println!("applied {} migration(s)", applied);
            app.shutdown().await;
            Ok(())
        }
    }
}
