use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{DqnError, Result},
    state::{ACTION_SIZE, STATE_SIZE},
};

/// Hyperparameters owned by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub state_size: usize,
    pub action_size: usize,
    pub learning_rate: f64,
    /// Discount factor applied to the bootstrapped next-state value
    pub gamma: f32,
    /// Starting exploration rate
    pub epsilon: f32,
    pub epsilon_min: f32,
    /// Multiplicative decay applied after every gradient update
    pub epsilon_decay: f32,
    pub batch_size: usize,
    /// Replay buffer capacity
    pub memory_size: usize,
    /// Hard-sync the target network every this many updates
    pub target_update_freq: usize,
    /// Seed for exploration and batch sampling; `None` seeds from the OS
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_size: STATE_SIZE,
            action_size: ACTION_SIZE,
            learning_rate: 1e-3,
            gamma: 0.99,
            epsilon: 1.0,
            epsilon_min: 0.1,
            epsilon_decay: 0.995,
            batch_size: 32,
            memory_size: 2000,
            target_update_freq: 50,
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.state_size == 0 || self.action_size == 0 {
            return Err(DqnError::config("state and action sizes must be non-zero"));
        }
        if self.batch_size == 0 {
            return Err(DqnError::config("batch_size must be non-zero"));
        }
        if self.memory_size < self.batch_size {
            return Err(DqnError::config(format!(
                "memory_size ({}) must hold at least one batch ({})",
                self.memory_size, self.batch_size
            )));
        }
        if self.target_update_freq == 0 {
            return Err(DqnError::config("target_update_freq must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::config(format!("gamma {} outside [0, 1]", self.gamma)));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(DqnError::config(format!(
                "epsilon_decay {} outside (0, 1]",
                self.epsilon_decay
            )));
        }
        if self.epsilon_min > self.epsilon {
            return Err(DqnError::config("epsilon_min exceeds the starting epsilon"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub data_path: PathBuf,
    pub model_path: PathBuf,
    /// Written only when saving to `model_path` fails
    pub fallback_model_path: PathBuf,
    pub epochs: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/processed_data.csv"),
            model_path: PathBuf::from("model/dqn_model.safetensors"),
            fallback_model_path: PathBuf::from("dqn_model.fallback.safetensors"),
            epochs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub model_path: PathBuf,
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/dqn_model.safetensors"),
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_batch_larger_than_memory() {
        let config = AgentConfig {
            batch_size: 64,
            memory_size: 32,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DqnError::Config(_))));
    }

    #[test]
    fn rejects_zero_sync_interval() {
        let config = AgentConfig {
            target_update_freq: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_gamma_and_decay() {
        let gamma = AgentConfig {
            gamma: 1.5,
            ..Default::default()
        };
        assert!(gamma.validate().is_err());

        let decay = AgentConfig {
            epsilon_decay: 0.0,
            ..Default::default()
        };
        assert!(decay.validate().is_err());
    }

    #[test]
    fn agent_config_round_trips_through_json() {
        let config = AgentConfig {
            seed: Some(7),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
