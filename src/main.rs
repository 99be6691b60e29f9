use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use anyhow::Context;
use clap::{Parser, Subcommand};

use mindbridge_dqn::{
    AgentConfig, DqnError, DuelingDqnAgent, Recommender, ServerConfig, TrainingConfig,
    device::DEVICE, server::run_server, trainer::train_from_csv,
};

/// Difficulty recommendation DQN
#[derive(Parser)]
#[command(name = "mindbridge-dqn")]
#[command(about = "Train and serve the difficulty recommendation policy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Train on the processed gameplay CSV and save the model
    Train {
        #[arg(long, default_value = "data/processed_data.csv")]
        data: PathBuf,

        #[arg(long, default_value = "model/dqn_model.safetensors")]
        model: PathBuf,

        /// Written only if saving to --model fails
        #[arg(long, default_value = "dqn_model.fallback.safetensors")]
        fallback_model: PathBuf,

        #[arg(long, default_value_t = 30)]
        epochs: usize,

        /// Random seed for exploration and replay sampling
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Serve recommendations over HTTP
    Serve {
        #[arg(long, default_value = "model/dqn_model.safetensors")]
        model: PathBuf,

        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    match cli.command {
        Command::Train {
            data,
            model,
            fallback_model,
            epochs,
            seed,
        } => train(
            TrainingConfig {
                data_path: data,
                model_path: model,
                fallback_model_path: fallback_model,
                epochs,
            },
            seed,
        ),
        Command::Serve { model, host, port } => serve(ServerConfig {
            model_path: model,
            bind: SocketAddr::new(host, port),
        }),
    }
}

fn train(config: TrainingConfig, seed: Option<u64>) -> anyhow::Result<()> {
    let agent_config = AgentConfig {
        seed,
        ..Default::default()
    };
    let agent = DuelingDqnAgent::new(agent_config, &DEVICE).context("building agent")?;

    let start = Instant::now();
    match train_from_csv(agent, &config) {
        Ok((report, written)) => {
            log::info!(
                "trained {} epochs over {} sessions ({} updates, epsilon {:.3}) in {:.1}s",
                report.epochs,
                report.episodes,
                report.gradient_updates,
                report.final_epsilon,
                start.elapsed().as_secs_f32()
            );
            log::info!("model written to {}", written.display());
            Ok(())
        }
        Err(err @ DqnError::MissingData(_)) => Err(err.into()),
        Err(err) => Err(err).context("training failed"),
    }
}

fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let recommender = Recommender::load(&config.model_path, &DEVICE)
        .with_context(|| format!("loading model from {}", config.model_path.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run_server(config.bind, Arc::new(recommender)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_training_data_is_returned_as_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            data_path: dir.path().join("missing.csv"),
            model_path: dir.path().join("model.safetensors"),
            fallback_model_path: dir.path().join("fallback.safetensors"),
            epochs: 1,
        };

        let err = train(config, Some(1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DqnError>(),
            Some(DqnError::MissingData(_))
        ));
    }
}
