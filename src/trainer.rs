use std::path::{Path, PathBuf};

use crate::{
    agent::DuelingDqnAgent,
    config::TrainingConfig,
    dataset::load_learner_rows,
    episode::{Episode, build_episodes},
    error::Result,
    network::DuelingQNetwork,
};

/// Summary of a finished training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs: usize,
    pub episodes: usize,
    pub transitions_seen: usize,
    pub gradient_updates: usize,
    pub final_epsilon: f32,
}

pub struct Trainer {
    agent: DuelingDqnAgent,
    epochs: usize,
}

impl Trainer {
    pub fn new(agent: DuelingDqnAgent, epochs: usize) -> Self {
        Self { agent, epochs }
    }

    pub fn agent(&self) -> &DuelingDqnAgent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut DuelingDqnAgent {
        &mut self.agent
    }

    pub fn into_agent(self) -> DuelingDqnAgent {
        self.agent
    }

    /// Replays every transition of every episode, `epochs` times. Each
    /// transition is remembered and immediately followed by one `replay`.
    pub fn run(&mut self, episodes: &[Episode]) -> Result<TrainingReport> {
        log::info!("training on {} learner sessions", episodes.len());

        let mut transitions_seen = 0;
        let mut gradient_updates = 0;
        for epoch in 0..self.epochs {
            for episode in episodes {
                for transition in &episode.transitions {
                    self.agent.remember(transition.clone());
                    if self.agent.replay()? {
                        gradient_updates += 1;
                    }
                    transitions_seen += 1;
                }
            }
            log::info!(
                "Epoch {}/{} - epsilon = {:.3}",
                epoch + 1,
                self.epochs,
                self.agent.epsilon()
            );
        }

        Ok(TrainingReport {
            epochs: self.epochs,
            episodes: episodes.len(),
            transitions_seen,
            gradient_updates,
            final_epsilon: self.agent.epsilon(),
        })
    }
}

/// Saves to `primary`; if that fails, logs the error and tries `fallback`
/// once. Returns the path actually written.
pub fn save_with_fallback(
    network: &DuelingQNetwork,
    primary: &Path,
    fallback: &Path,
) -> Result<PathBuf> {
    log::info!("saving model to {}", primary.display());
    match network.save(primary) {
        Ok(()) => {
            log::info!("model saved to {}", primary.display());
            Ok(primary.to_path_buf())
        }
        Err(err) => {
            log::error!("failed to save model to {}: {err}", primary.display());
            log::info!("trying fallback {}", fallback.display());
            network.save(fallback)?;
            log::info!("model saved to fallback {}", fallback.display());
            Ok(fallback.to_path_buf())
        }
    }
}

/// Full pipeline: load the CSV, build episodes with the agent's own
/// policy, train, and persist the online network.
pub fn train_from_csv(
    agent: DuelingDqnAgent,
    config: &TrainingConfig,
) -> Result<(TrainingReport, PathBuf)> {
    let rows = load_learner_rows(&config.data_path)?;
    log::info!("loaded {} rows from {}", rows.len(), config.data_path.display());

    let mut trainer = Trainer::new(agent, config.epochs);
    let episodes = build_episodes(&rows, trainer.agent_mut())?;
    let report = trainer.run(&episodes)?;

    let written = save_with_fallback(
        trainer.agent().online(),
        &config.model_path,
        &config.fallback_model_path,
    )?;
    Ok((report, written))
}
