//! The tensor adapter over a running batch.
use batchenv::envs::{CartPoleConfig, EnvSpec};
use batchenv::tensors::TensorSample;
use batchenv::{BatchEnvConfig, BatchEnvError, Prng, TensorEnv};
use rand::SeedableRng;
use std::path::PathBuf;
use tch::{Kind, Tensor};

fn build(n: usize) -> TensorEnv {
    let specs = vec![EnvSpec::CartPole(CartPoleConfig::default()); n];
    let mut config = BatchEnvConfig::new(specs).with_workers(2).with_seed(13);
    config.worker_exe = Some(PathBuf::from(env!("CARGO_BIN_EXE_batchenv-worker")));
    TensorEnv::new(config.build().unwrap())
}

#[test]
fn observations_are_float_tensors_with_batch_dim() {
    let n = 4;
    let mut env = build(n);
    match env.reset().unwrap() {
        TensorSample::Tensor(observations) => {
            assert_eq!(observations.size(), vec![n as i64, 4]);
            assert_eq!(observations.kind(), Kind::Float);
        }
        other => panic!("unexpected observations {:?}", other),
    }
    env.close().unwrap();
}

#[test]
fn step_round_trips_actions_and_results() {
    let n = 4;
    let mut env = build(n);
    env.reset().unwrap();
    let actions = TensorSample::Tensor(Tensor::of_slice(&[1_i64, 0, 1, 0]));
    let step = env.step(&actions).unwrap();
    assert_eq!(step.rewards.size(), vec![n as i64]);
    assert_eq!(step.rewards.kind(), Kind::Float);
    assert_eq!(Vec::<f32>::from(&step.rewards), vec![1.0; n]);
    assert_eq!(step.dones.size(), vec![n as i64]);
    assert_eq!(step.dones.kind(), Kind::Bool);
    match step.observations {
        TensorSample::Tensor(observations) => {
            assert_eq!(observations.size(), vec![n as i64, 4])
        }
        other => panic!("unexpected observations {:?}", other),
    }
    env.close().unwrap();
}

#[test]
fn adapter_spaces_sample_and_check_tensors() {
    let n = 3;
    let mut env = build(n);
    let mut rng = Prng::seed_from_u64(5);
    let observations = env.reset().unwrap();
    assert!(env.observation_space().contains(&observations));
    for _ in 0..5 {
        let actions = env.action_space().sample(&mut rng);
        let step = env.step(&actions).unwrap();
        assert!(env.observation_space().contains(&step.observations));
        assert!(env
            .reward_space()
            .contains(&TensorSample::Tensor(step.rewards.shallow_clone())));
    }
    env.close().unwrap();
}

#[test]
fn out_of_space_action_tensors_are_rejected() {
    let n = 2;
    let mut env = build(n);
    env.reset().unwrap();
    let actions = TensorSample::Tensor(Tensor::of_slice(&[9_i64, 0]));
    assert!(matches!(
        env.step(&actions),
        Err(BatchEnvError::InvalidAction { lane: 0 })
    ));
    // Wrong batch width fails tensor validation before dispatch.
    let actions = TensorSample::Tensor(Tensor::of_slice(&[0_i64, 0, 0]));
    assert!(matches!(env.step(&actions), Err(BatchEnvError::Tensor(_))));
    env.close().unwrap();
}
