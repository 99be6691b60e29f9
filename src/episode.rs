use std::collections::HashMap;

use crate::{agent::ActionPolicy, dataset::LearnerRow, error::Result, experience::Experience};

/// Ordered transitions of a single learner.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub learner: String,
    pub transitions: Vec<Experience>,
}

impl Episode {
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Reward for moving from one recorded score to the next.
pub fn reward(prev_score: f32, curr_score: f32) -> f32 {
    curr_score - prev_score
}

/// Groups rows per learner, in order of first appearance, keeping each
/// learner's rows in file order.
pub fn group_by_learner(rows: &[LearnerRow]) -> Vec<(&str, Vec<&LearnerRow>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&LearnerRow>)> = Vec::new();
    for row in rows {
        let slot = *index.entry(row.name.as_str()).or_insert_with(|| {
            groups.push((row.name.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row);
    }
    groups
}

/// Turns one learner's rows into transitions. The first row only seeds the
/// previous state; every later row yields `prev -> curr` with the action the
/// policy picks for `prev`. Only the last transition is terminal.
pub fn build_episode<P: ActionPolicy + ?Sized>(
    learner: &str,
    rows: &[&LearnerRow],
    policy: &mut P,
) -> Result<Episode> {
    let mut transitions = Vec::with_capacity(rows.len().saturating_sub(1));

    for pair in rows.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let action = policy.act(&prev.state)?;
        transitions.push(Experience::new(
            prev.state,
            action,
            reward(prev.score(), curr.score()),
            curr.state,
            false,
        ));
    }
    if let Some(last) = transitions.last_mut() {
        last.done = true;
    }

    Ok(Episode {
        learner: learner.to_string(),
        transitions,
    })
}

/// One episode per learner with at least two rows.
pub fn build_episodes<P: ActionPolicy + ?Sized>(
    rows: &[LearnerRow],
    policy: &mut P,
) -> Result<Vec<Episode>> {
    let mut episodes = Vec::new();
    for (learner, learner_rows) in group_by_learner(rows) {
        let episode = build_episode(learner, &learner_rows, policy)?;
        if episode.is_empty() {
            log::debug!("skipping learner '{learner}' with a single row");
            continue;
        }
        episodes.push(episode);
    }
    Ok(episodes)
}
