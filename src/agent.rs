use candle_core::{Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, loss};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    config::AgentConfig,
    error::{DqnError, Result},
    experience::Experience,
    network::{DuelingQNetwork, NetworkArch},
    replay::ReplayBuffer,
    state::State,
};

/// Anything that can pick an action for a state.
pub trait ActionPolicy {
    fn act(&mut self, state: &State) -> Result<usize>;
}

/// Dueling DQN agent with experience replay, an ε-greedy policy and a
/// hard-synced target network.
pub struct DuelingDqnAgent {
    online: DuelingQNetwork,
    target: DuelingQNetwork,
    optimiser: AdamW,
    memory: ReplayBuffer,
    config: AgentConfig,
    epsilon: f32,
    train_steps: usize,
    rng: StdRng,
}

impl DuelingDqnAgent {
    pub fn new(config: AgentConfig, device: &Device) -> Result<Self> {
        config.validate()?;

        let arch = NetworkArch::new(config.state_size, config.action_size);
        let online = DuelingQNetwork::new(arch, device)?;
        let target = online.try_clone()?;

        let optimiser = AdamW::new(
            online.var_map.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            online,
            target,
            optimiser,
            memory: ReplayBuffer::new(config.memory_size),
            epsilon: config.epsilon,
            train_steps: 0,
            config,
            rng,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Number of gradient updates performed so far.
    pub fn train_steps(&self) -> usize {
        self.train_steps
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn online(&self) -> &DuelingQNetwork {
        &self.online
    }

    pub fn target(&self) -> &DuelingQNetwork {
        &self.target
    }

    pub fn into_online(self) -> DuelingQNetwork {
        self.online
    }

    pub fn remember(&mut self, experience: Experience) {
        self.memory.push(experience);
    }

    /// Greedy action of the online network.
    pub fn best_action(&self, state: &State) -> Result<usize> {
        let q_values = self.online.predict(state)?;
        argmax(&q_values).ok_or_else(|| DqnError::inference("network produced no Q-values"))
    }

    /// Samples a batch and takes one gradient step towards the bootstrapped
    /// targets. Returns `false` without touching anything while the buffer
    /// holds fewer than `batch_size` transitions.
    pub fn replay(&mut self) -> Result<bool> {
        let batch_size = self.config.batch_size;
        if self.memory.len() < batch_size {
            return Ok(false);
        }

        let batch = self.memory.sample(&mut self.rng, batch_size);
        let states: Vec<&State> = batch.iter().map(|e| &e.state).collect();
        let next_states: Vec<&State> = batch.iter().map(|e| &e.next_state).collect();

        let online_q_values = self.online.predict_batch(&states)?;
        let next_q_values = self.target.predict_batch(&next_states)?;
        let targets = bellman_targets(online_q_values, &next_q_values, &batch, self.config.gamma)?;

        let device = self.online.device().clone();
        let state_tensor = State::batch_tensor(states.iter().copied(), &device)?;
        let flat_targets: Vec<f32> = targets.into_iter().flatten().collect();
        let target_tensor =
            Tensor::from_vec(flat_targets, (batch_size, self.config.action_size), &device)?;

        let predicted = self.online.forward(&state_tensor)?;
        let loss = loss::mse(&predicted, &target_tensor)?;
        let grads = loss.backward()?;
        self.optimiser.step(&grads)?;

        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);

        self.train_steps += 1;
        if self.train_steps % self.config.target_update_freq == 0 {
            self.update_target_network()?;
            log::debug!("target network synced at step {}", self.train_steps);
        }

        Ok(true)
    }

    pub fn update_target_network(&mut self) -> Result<()> {
        self.target.copy_weights_from(&self.online)
    }
}

impl ActionPolicy for DuelingDqnAgent {
    /// ε-greedy: a uniformly random action with probability ε, otherwise the
    /// greedy one.
    fn act(&mut self, state: &State) -> Result<usize> {
        if self.rng.random::<f32>() < self.epsilon {
            return Ok(self.rng.random_range(0..self.config.action_size));
        }
        self.best_action(state)
    }
}

/// Training targets for a sampled batch. Each row starts as the online
/// network's prediction for `state`; only the taken action is replaced, by
/// `reward` for terminal transitions and by `reward + gamma * max(next_q)`
/// otherwise, where `next_q` comes from the target network.
pub fn bellman_targets(
    mut online_q: Vec<Vec<f32>>,
    next_q: &[Vec<f32>],
    batch: &[&Experience],
    gamma: f32,
) -> Result<Vec<Vec<f32>>> {
    for ((target, experience), next) in online_q.iter_mut().zip(batch).zip(next_q) {
        let action_size = target.len();
        let slot = target
            .get_mut(experience.action)
            .ok_or(DqnError::InvalidAction {
                action: experience.action,
                action_size,
            })?;
        *slot = if experience.done {
            experience.reward
        } else {
            let max_next = next.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            experience.reward + gamma * max_next
        };
    }
    Ok(online_q)
}

/// Index of the largest value. The first maximum wins ties, and a NaN counts
/// as the maximum, so the first NaN is returned if there is one.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return Some(i);
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
