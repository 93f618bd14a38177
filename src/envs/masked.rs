//! Observation-masking wrapper.
use super::{Env, EnvError, EnvStep, Frame, InfoValue};
use crate::spaces::{Sample, SparseSpace, Space};

/// Wraps an environment so that every `period`-th observation is withheld.
///
/// The wrapped observation space becomes [`SparseSpace`] over the base space
/// with `none_prob = 1 / period`; withheld observations are [`Sample::None`].
/// Reset observations count as the start of the cycle and are never masked.
pub struct Masked {
    base: Box<dyn Env + Send>,
    period: u64,
    emitted: u64,
}

impl Masked {
    pub fn new(base: Box<dyn Env + Send>, period: u64) -> Self {
        assert!(period > 0, "mask period must be positive");
        Self {
            base,
            period,
            emitted: 0,
        }
    }

    fn mask(&mut self, observation: Sample) -> Sample {
        self.emitted += 1;
        if self.emitted % self.period == 0 {
            Sample::None
        } else {
            observation
        }
    }
}

impl Env for Masked {
    fn observation_space(&self) -> Space {
        SparseSpace::new(self.base.observation_space(), 1.0 / self.period as f64).into()
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
        self.emitted = 0;
        let observation = self.base.reset();
        self.mask(observation)
    }

    fn step(&mut self, action: &Sample) -> Result<EnvStep, EnvError> {
        let step = self.base.step(action)?;
        Ok(EnvStep {
            observation: self.mask(step.observation),
            ..step
        })
    }

    fn render(&self) -> Result<Frame, EnvError> {
        self.base.render()
    }

    fn get_attr(&self, name: &str) -> Result<InfoValue, EnvError> {
        match name {
            "period" => Ok(InfoValue::Int(self.period as i64)),
            name => self.base.get_attr(name),
        }
    }

    fn set_attr(&mut self, name: &str, value: InfoValue) -> Result<(), EnvError> {
        self.base.set_attr(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::{Counter, CounterConfig};

    fn masked_counter(period: u64) -> Masked {
        Masked::new(
            Box::new(Counter::new(CounterConfig {
                start: 0,
                episode_len: 100,
                max: 200,
            })),
            period,
        )
    }

    #[test]
    fn every_third_observation_is_none() {
        let mut env = masked_counter(3);
        assert_eq!(env.reset(), Sample::Discrete(0));
        assert_eq!(
            env.step(&Sample::Discrete(0)).unwrap().observation,
            Sample::Discrete(1)
        );
        assert_eq!(
            env.step(&Sample::Discrete(0)).unwrap().observation,
            Sample::None
        );
        assert_eq!(
            env.step(&Sample::Discrete(0)).unwrap().observation,
            Sample::Discrete(3)
        );
    }

    #[test]
    fn space_is_sparse_over_base() {
        let env = masked_counter(4);
        match env.observation_space() {
            Space::Sparse(space) => {
                assert_eq!(space.none_prob, 0.25);
                assert!(matches!(*space.base, Space::Discrete(_)));
            }
            other => panic!("unexpected space {}", other),
        }
    }

    #[test]
    fn observations_stay_in_space() {
        let mut env = masked_counter(2);
        let space = env.observation_space();
        assert!(space.contains(&env.reset()));
        for _ in 0..10 {
            let step = env.step(&Sample::Discrete(1)).unwrap();
            assert!(space.contains(&step.observation));
        }
    }
}
