//! Deterministic counting environment for tests and examples.
use super::{Env, EnvError, EnvStep, Info};
use crate::spaces::{BoxSpace, DiscreteSpace, Sample, Space};
use serde::{Deserialize, Serialize};

/// Configuration for the [`Counter`] environment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Value of the first observation of every episode.
    pub start: i64,
    /// Episode length in steps.
    pub episode_len: u64,
    /// Observations lie in `[0, max)`.
    pub max: i64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            start: 0,
            episode_len: 5,
            max: 1000,
        }
    }
}

/// An environment whose observation is a counter.
///
/// Each episode begins at `start` and the counter increments by one per step,
/// independent of the action; the reward echoes the action index. Entirely
/// deterministic, which makes per-lane ordering and auto-reset behaviour easy
/// to assert on.
#[derive(Debug, Clone)]
pub struct Counter {
    config: CounterConfig,
    value: i64,
    steps: u64,
}

impl Counter {
    pub fn new(config: CounterConfig) -> Self {
        assert!(config.episode_len > 0, "episodes must have at least 1 step");
        assert!(
            config.start + config.episode_len as i64 <= config.max,
            "counter must stay below max for a whole episode"
        );
        Self {
            config,
            value: config.start,
            steps: 0,
        }
    }
}

impl Env for Counter {
    fn observation_space(&self) -> Space {
        DiscreteSpace::new(self.config.max).into()
    }

    fn action_space(&self) -> Space {
        DiscreteSpace::new(2).into()
    }

    fn reward_space(&self) -> Space {
        BoxSpace::scalar(0.0, 1.0).into()
    }

    fn seed(&mut self, _seed: u64) {}

    fn reset(&mut self) -> Sample {
        self.value = self.config.start;
        self.steps = 0;
        Sample::Discrete(self.value)
    }

    fn step(&mut self, action: &Sample) -> Result<EnvStep, EnvError> {
        let reward = match action {
            Sample::Discrete(a @ (0 | 1)) => *a as f64,
            _ => return Err(EnvError::InvalidAction),
        };
        self.value += 1;
        self.steps += 1;
        Ok(EnvStep {
            observation: Sample::Discrete(self.value),
            reward,
            done: self.steps >= self.config.episode_len,
            info: Info::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_start() {
        let mut env = Counter::new(CounterConfig {
            start: 40,
            episode_len: 3,
            max: 100,
        });
        assert_eq!(env.reset(), Sample::Discrete(40));
        let step = env.step(&Sample::Discrete(1)).unwrap();
        assert_eq!(step.observation, Sample::Discrete(41));
        assert_eq!(step.reward, 1.0);
        assert!(!step.done);
        env.step(&Sample::Discrete(0)).unwrap();
        assert!(env.step(&Sample::Discrete(0)).unwrap().done);
    }

    #[test]
    fn reset_restarts_episode() {
        let mut env = Counter::new(CounterConfig::default());
        env.reset();
        env.step(&Sample::Discrete(1)).unwrap();
        assert_eq!(env.reset(), Sample::Discrete(0));
    }
}
