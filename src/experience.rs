use crate::state::State;

/// One `(state, action, reward, next_state, done)` transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    pub state: State,
    pub action: usize,
    /// Change in module score between the two states
    pub reward: f32,
    pub next_state: State,
    pub done: bool,
}

impl Experience {
    pub fn new(state: State, action: usize, reward: f32, next_state: State, done: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}
