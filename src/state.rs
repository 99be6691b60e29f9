use std::fmt;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

pub const STATE_SIZE: usize = 3;
pub const ACTION_SIZE: usize = 3;

/// Recent performance features of one learner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    pub module_score: f32,
    pub improvement_rate: f32,
    pub moving_avg: f32,
}

impl State {
    pub fn new(module_score: f32, improvement_rate: f32, moving_avg: f32) -> Self {
        Self {
            module_score,
            improvement_rate,
            moving_avg,
        }
    }

    pub fn features(&self) -> [f32; STATE_SIZE] {
        [self.module_score, self.improvement_rate, self.moving_avg]
    }

    /// Single-row `(1, STATE_SIZE)` input tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor, candle_core::Error> {
        Tensor::from_slice(&self.features(), (1, STATE_SIZE), device)
    }

    /// Stacks states into a `(states.len(), STATE_SIZE)` batch.
    pub fn batch_tensor<'a, I>(states: I, device: &Device) -> Result<Tensor, candle_core::Error>
    where
        I: IntoIterator<Item = &'a State>,
    {
        let input_vec: Vec<f32> = states.into_iter().flat_map(|s| s.features()).collect();
        let rows = input_vec.len() / STATE_SIZE;
        Tensor::from_vec(input_vec, (rows, STATE_SIZE), device)
    }
}

/// Recommended difficulty; action index `i` maps to the `i`-th variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; ACTION_SIZE] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn from_action(action: usize) -> Option<Self> {
        Self::ALL.get(action).copied()
    }

    pub fn action(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
