//! Dueling DQN that recommends the next difficulty level for a learner,
//! plus the training pipeline and the HTTP service that serves it.

pub mod agent;
pub mod config;
pub mod dataset;
pub mod device;
pub mod episode;
pub mod error;
pub mod experience;
pub mod network;
pub mod replay;
pub mod server;
pub mod state;
pub mod trainer;

pub use agent::{ActionPolicy, DuelingDqnAgent};
pub use config::{AgentConfig, ServerConfig, TrainingConfig};
pub use error::{DqnError, Result};
pub use network::DuelingQNetwork;
pub use server::{Recommendation, Recommender};
pub use state::{Difficulty, State};
