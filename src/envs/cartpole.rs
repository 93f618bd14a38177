//! Cart-pole balancing task.
use super::{Env, EnvError, EnvStep, Frame, Info, InfoValue};
use crate::spaces::{BoxSpace, DiscreteSpace, Sample, Space};
use crate::Prng;
use ndarray::{arr1, Array3};
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Configuration for the [`CartPole`] environment.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartPoleConfig {
    /// Physics constants
    pub physics: PhysicalConstants,
    /// Episode parameters
    pub params: EpisodeParams,
}

/// Dynamics constants for [`CartPole`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    pub gravity: f64,
    pub mass_cart: f64,
    pub mass_pole: f64,
    /// Half the pole length.
    pub pole_half_length: f64,
    pub force_mag: f64,
    /// Seconds per simulation step.
    pub tau: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        // The CartPole-v1 constants.
        Self {
            gravity: 9.8,
            mass_cart: 1.0,
            mass_pole: 0.1,
            pole_half_length: 0.5,
            force_mag: 10.0,
            tau: 0.02,
        }
    }
}

/// Episode parameters for [`CartPole`].
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeParams {
    /// Episode ends when the cart leaves `[-max_pos, max_pos]`.
    pub max_pos: f64,
    /// Episode ends when the pole leaves `[-max_angle, max_angle]` (radians).
    pub max_angle: f64,
    /// Episode is truncated after this many steps.
    pub max_steps: u64,
}

impl Default for EpisodeParams {
    fn default() -> Self {
        Self {
            max_pos: 2.4,
            max_angle: 12.0 * std::f64::consts::PI / 180.0,
            max_steps: 500,
        }
    }
}

/// Cart-pole environment.
///
/// A simulated cart on a track with a pole attached by a hinge. The goal is
/// to keep the pole upright by pushing the cart left or right. Dynamics,
/// constants and episode limits follow the OpenAI Gym `CartPole-v1`
/// environment, including its Euler integration.
#[derive(Debug, Clone)]
pub struct CartPole {
    config: CartPoleConfig,
    rng: Prng,
    state: [f64; 4],
    steps: u64,
    done: bool,
}

impl CartPole {
    pub fn new(config: CartPoleConfig) -> Self {
        Self {
            config,
            rng: Prng::seed_from_u64(0),
            state: [0.0; 4],
            steps: 0,
            done: true,
        }
    }

    fn observation(&self) -> Sample {
        Sample::Box(arr1(&[
            self.state[0] as f32,
            self.state[1] as f32,
            self.state[2] as f32,
            self.state[3] as f32,
        ])
        .into_dyn())
    }

    fn failed(&self) -> bool {
        let params = &self.config.params;
        self.state[0].abs() > params.max_pos || self.state[2].abs() > params.max_angle
    }
}

impl Env for CartPole {
    fn observation_space(&self) -> Space {
        let params = &self.config.params;
        // Position and angle bounds are twice the termination thresholds,
        // as in Gym; velocities are unbounded.
        let max_pos = (2.0 * params.max_pos) as f32;
        let max_angle = (2.0 * params.max_angle) as f32;
        BoxSpace::new(
            arr1(&[-max_pos, f32::NEG_INFINITY, -max_angle, f32::NEG_INFINITY]).into_dyn(),
            arr1(&[max_pos, f32::INFINITY, max_angle, f32::INFINITY]).into_dyn(),
        )
        .into()
    }

    fn action_space(&self) -> Space {
        DiscreteSpace::new(2).into()
    }

    fn reward_space(&self) -> Space {
        BoxSpace::scalar(0.0, 1.0).into()
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Prng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Sample {
        let dist = Uniform::new_inclusive(-0.05, 0.05);
        for value in &mut self.state {
            *value = dist.sample(&mut self.rng);
        }
        self.steps = 0;
        self.done = false;
        self.observation()
    }

    fn step(&mut self, action: &Sample) -> Result<EnvStep, EnvError> {
        let push = match action {
            Sample::Discrete(0) => -1.0,
            Sample::Discrete(1) => 1.0,
            _ => return Err(EnvError::InvalidAction),
        };
        if self.done {
            return Err(EnvError::Fault("step called on a finished episode".into()));
        }

        let phys = &self.config.physics;
        let [x, x_dot, theta, theta_dot] = self.state;
        let force = push * phys.force_mag;
        let total_mass = phys.mass_cart + phys.mass_pole;
        let pole_mass_length = phys.mass_pole * phys.pole_half_length;

        let cos_theta = theta.cos();
        let sin_theta = theta.sin();
        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (phys.gravity * sin_theta - cos_theta * temp)
            / (phys.pole_half_length
                * (4.0 / 3.0 - phys.mass_pole * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        self.state = [
            x + phys.tau * x_dot,
            x_dot + phys.tau * x_acc,
            theta + phys.tau * theta_dot,
            theta_dot + phys.tau * theta_acc,
        ];
        self.steps += 1;

        let truncated = self.steps >= self.config.params.max_steps;
        self.done = self.failed() || truncated;
        let mut info = Info::new();
        if truncated && !self.failed() {
            info.insert("TimeLimit.truncated".into(), InfoValue::Bool(true));
        }
        Ok(EnvStep {
            observation: self.observation(),
            reward: 1.0,
            done: self.done,
            info,
        })
    }

    /// A minimal schematic rendering: a dark background with the cart drawn
    /// as a light block at its track position and the pole as a single row of
    /// pixels offset by the pole angle.
    fn render(&self) -> Result<Frame, EnvError> {
        const HEIGHT: usize = 40;
        const WIDTH: usize = 60;
        let mut frame = Array3::zeros((HEIGHT, WIDTH, 3));
        let params = &self.config.params;
        let frac = (self.state[0] / (2.0 * params.max_pos) + 0.5).clamp(0.0, 1.0);
        let cart_col = (frac * (WIDTH - 5) as f64) as usize;
        let cart_row = HEIGHT - 4;
        for col in cart_col..cart_col + 5 {
            for channel in 0..3 {
                frame[[cart_row, col, channel]] = 220;
            }
        }
        let tilt = (self.state[2] / params.max_angle).clamp(-1.0, 1.0);
        for i in 0..cart_row {
            let col_offset = (tilt * (i as f64 / cart_row as f64) * 10.0) as isize;
            let col = (cart_col as isize + 2 + col_offset)
                .clamp(0, WIDTH as isize - 1) as usize;
            frame[[cart_row - 1 - i, col, 0]] = 200;
            frame[[cart_row - 1 - i, col, 1]] = 120;
        }
        Ok(frame)
    }

    fn get_attr(&self, name: &str) -> Result<InfoValue, EnvError> {
        match name {
            "gravity" => Ok(InfoValue::Float(self.config.physics.gravity)),
            "force_mag" => Ok(InfoValue::Float(self.config.physics.force_mag)),
            "max_steps" => Ok(InfoValue::Int(self.config.params.max_steps as i64)),
            _ => Err(EnvError::UnknownAttr(name.into())),
        }
    }

    fn set_attr(&mut self, name: &str, value: InfoValue) -> Result<(), EnvError> {
        match (name, value) {
            ("gravity", InfoValue::Float(v)) => {
                self.config.physics.gravity = v;
                Ok(())
            }
            ("force_mag", InfoValue::Float(v)) => {
                self.config.physics.force_mag = v;
                Ok(())
            }
            (name, _) => Err(EnvError::UnknownAttr(name.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_is_in_space() {
        let mut env = CartPole::new(CartPoleConfig::default());
        env.seed(81);
        let space = env.observation_space();
        let mut observation = env.reset();
        assert!(space.contains(&observation));
        for _ in 0..200 {
            let step = env.step(&Sample::Discrete(1)).unwrap();
            observation = step.observation;
            assert!(space.contains(&observation));
            if step.done {
                break;
            }
        }
    }

    #[test]
    fn constant_push_fails_quickly() {
        let mut env = CartPole::new(CartPoleConfig::default());
        env.seed(3);
        env.reset();
        let mut steps = 0;
        loop {
            let step = env.step(&Sample::Discrete(1)).unwrap();
            steps += 1;
            if step.done {
                break;
            }
            assert!(steps < 500, "constant push should topple the pole");
        }
        assert!(steps < 100);
    }

    #[test]
    fn seeding_is_deterministic() {
        let mut a = CartPole::new(CartPoleConfig::default());
        let mut b = CartPole::new(CartPoleConfig::default());
        a.seed(7);
        b.seed(7);
        assert_eq!(a.reset(), b.reset());
        assert_eq!(
            a.step(&Sample::Discrete(0)).unwrap(),
            b.step(&Sample::Discrete(0)).unwrap()
        );
    }

    #[test]
    fn bad_action_is_rejected() {
        let mut env = CartPole::new(CartPoleConfig::default());
        env.reset();
        assert_eq!(
            env.step(&Sample::Discrete(2)),
            Err(EnvError::InvalidAction)
        );
    }

    #[test]
    fn attrs_round_trip() {
        let mut env = CartPole::new(CartPoleConfig::default());
        env.set_attr("gravity", InfoValue::Float(1.62)).unwrap();
        assert_eq!(env.get_attr("gravity").unwrap(), InfoValue::Float(1.62));
        assert!(env.get_attr("nope").is_err());
    }
}
