//! onesec binary.
//!
//! Records reaction times into a sharded on-disk store and reports streaming
//! statistics (mean-of-N and trimmed average-of-N windows).

use clap::Parser;
use onesec_core::cli::{
    handle_analyse, handle_append, handle_delete, handle_export, handle_init, handle_stats, Commands,
    GlobalArgs,
};
use onesec_core::config::Settings;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logging = &cli.global.logging;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(logging.effective_level().parse().unwrap_or(LevelFilter::WARN).into())
                .parse_lossy(logging.log_filter.as_deref().unwrap_or("onesec_core=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let settings = Settings::load(&cli.global.config)?;
    debug!(?settings, "Loaded settings");

    match cli.command {
        Commands::Init => handle_init(&settings).await?,
        Commands::Append(cmd) => handle_append(&settings, &cmd.value).await?,
        Commands::Stats => handle_stats(&settings).await?,
        Commands::Export(cmd) => handle_export(&settings, cmd.output.as_deref()).await?,
        Commands::Analyse => handle_analyse(&settings).await?,
        Commands::Delete => handle_delete(&settings).await?,
    }

    Ok(())
}
