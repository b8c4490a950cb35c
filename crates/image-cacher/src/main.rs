use anyhow::Result;
use clap::Parser;
use image_cacher::app::ApplicationBuilder;
use image_cacher::config::CacherConfig;
use image_cacher::config::Cli;
use image_cacher::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = logging::init();

    tracing::info!("Starting image cacher {}", &**version::VERSION);

    let config = CacherConfig::from_args(&cli.daemon)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e:?}"))?;
    tracing::debug!("Configuration: {config:?}");

    let app = ApplicationBuilder::new(config).build().await?;
    app.run().await?;

    Ok(())
}
