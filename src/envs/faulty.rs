//! Failure-injection wrapper for exercising error propagation.
use super::{Env, EnvError, EnvStep, Frame, InfoValue};
use crate::spaces::{Sample, Space};

/// Wraps an environment so that one chosen `step` call fails.
///
/// The call counter is cumulative across episodes: the `fail_on_step`-th
/// `step` (1-indexed) returns an error, or panics in panic mode, instead of
/// delegating. Later calls succeed again, so recovery after a failure can be
/// exercised.
pub struct Faulty {
    base: Box<dyn Env + Send>,
    fail_on_step: u64,
    panic: bool,
    steps: u64,
}

impl Faulty {
    pub fn new(base: Box<dyn Env + Send>, fail_on_step: u64, panic: bool) -> Self {
        Self {
            base,
            fail_on_step,
            panic,
            steps: 0,
        }
    }
}

impl Env for Faulty {
    fn observation_space(&self) -> Space {
        self.base.observation_space()
    }

    fn action_space(&self) -> Space {
        self.base.action_space()
    }

    fn reward_space(&self) -> Space {
        self.base.reward_space()
    }

    fn seed(&mut self, seed: u64) {
        self.base.seed(seed);
    }

    fn reset(&mut self) -> Sample {
        self.base.reset()
    }

    fn step(&mut self, action: &Sample) -> Result<EnvStep, EnvError> {
        self.steps += 1;
        if self.steps == self.fail_on_step {
            if self.panic {
                panic!("injected panic on step {}", self.steps);
            }
            return Err(EnvError::Fault(format!(
                "injected failure on step {}",
                self.steps
            )));
        }
        self.base.step(action)
    }

    fn render(&self) -> Result<Frame, EnvError> {
        self.base.render()
    }

    fn get_attr(&self, name: &str) -> Result<InfoValue, EnvError> {
        self.base.get_attr(name)
    }

    fn set_attr(&mut self, name: &str, value: InfoValue) -> Result<(), EnvError> {
        self.base.set_attr(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::{Counter, CounterConfig};

    #[test]
    fn fails_exactly_once() {
        let mut env = Faulty::new(Box::new(Counter::new(CounterConfig::default())), 2, false);
        env.reset();
        assert!(env.step(&Sample::Discrete(0)).is_ok());
        assert!(matches!(
            env.step(&Sample::Discrete(0)),
            Err(EnvError::Fault(_))
        ));
        assert!(env.step(&Sample::Discrete(0)).is_ok());
    }
}
