use agora_node::logging::init_logging;
use agora_node::{Metrics, ProtocolConfig, Scenario, ScenarioRunner};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Agora - decentralized labor-market settlement protocol", long_about = None)]
struct Cli {
    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a protocol configuration, then print it resolved
    CheckConfig {
        #[arg(short, long, value_name = "FILE", env = "AGORA_CONFIG")]
        config: PathBuf,
    },

    /// Replay a JSON scenario against an in-memory protocol instance
    Replay {
        /// Protocol configuration; defaults apply when omitted
        #[arg(short, long, value_name = "FILE", env = "AGORA_CONFIG")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "FILE")]
        scenario: PathBuf,

        /// Continue past failing steps
        #[arg(long)]
        keep_going: bool,

        /// Write prometheus metrics here after the replay
        #[arg(long, value_name = "FILE")]
        metrics_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { config } => {
            let config = ProtocolConfig::load(&config)?;
            init_logging(&config.logging, cli.verbose)?;
            info!("✅ Configuration is valid");
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Replay {
            config,
            scenario,
            keep_going,
            metrics_out,
        } => {
            let config = match config {
                Some(path) => ProtocolConfig::load(&path)?,
                None => {
                    let mut config = ProtocolConfig::default();
                    config.apply_env_overrides()?;
                    config.validate()?;
                    config
                }
            };
            init_logging(&config.logging, cli.verbose)?;

            let scenario = Scenario::load(&scenario)?;
            let metrics = Metrics::new().context("Failed to register metrics")?;
            let mut runner = ScenarioRunner::new(
                config.protocol_settings(),
                &config.beacon,
                scenario.start,
                Some(metrics.clone()),
            )?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let summary = runner.replay(&scenario, keep_going, &mut out).await?;

            if let Some(path) = metrics_out {
                std::fs::write(&path, metrics.render()?)
                    .with_context(|| format!("Failed to write metrics: {}", path.display()))?;
                info!(path = %path.display(), "📊 Metrics written");
            }

            eprintln!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.conserved() {
                warn!(
                    issued = %summary.issued,
                    accounted = %summary.accounted,
                    "⚠️ Supply not conserved"
                );
                anyhow::bail!("supply not conserved after replay");
            }
            if summary.failures > 0 {
                anyhow::bail!("{} step(s) failed", summary.failures);
            }
        }
    }

    Ok(())
}
