//! Masked observations crossing the shared-memory transport.
use batchenv::envs::{CounterConfig, EnvSpec};
use batchenv::spaces::{Sample, Space};
use batchenv::{unbatch_samples, BatchEnv, BatchEnvConfig, BatchEnvError};
use std::path::PathBuf;

fn build(n: usize, n_workers: usize, period: u64) -> Result<BatchEnv, BatchEnvError> {
    let specs = (0..n)
        .map(|i| EnvSpec::Masked {
            base: Box::new(EnvSpec::Counter(CounterConfig {
                start: (i * 10) as i64,
                episode_len: 50,
                max: 1000,
            })),
            period,
        })
        .collect();
    let mut config = BatchEnvConfig::new(specs).with_workers(n_workers);
    config.worker_exe = Some(PathBuf::from(env!("CARGO_BIN_EXE_batchenv-worker")));
    config.build()
}

#[test]
fn batch_space_is_a_tuple_of_sparse_lanes() {
    let env = build(6, 2, 3).unwrap();
    match env.observation_space() {
        Space::Sparse(space) => assert!((space.none_prob - 1.0 / 3.0).abs() < 1e-12),
        other => panic!("unexpected observation space {}", other),
    }
    match env.batch_observation_space() {
        Space::Tuple(space) => {
            assert_eq!(space.len(), 6);
            assert!(matches!(space.spaces[0], Space::Sparse(_)));
        }
        other => panic!("unexpected batch space {}", other),
    }
}

#[test]
fn withheld_observations_arrive_as_none() {
    let n = 6;
    let mut env = build(n, 2, 3).unwrap();
    let observations = env.reset().unwrap();
    // Reset starts the mask cycle: first and second observations are
    // visible, every third is withheld, in lock-step across lanes.
    let expected_visible: Vec<Sample> =
        (0..n as i64).map(|i| Sample::Discrete(i * 10)).collect();
    assert_eq!(observations, Sample::Tuple(expected_visible));

    let actions = vec![Sample::Discrete(0); n];
    let step = env.step(&actions).unwrap();
    assert_eq!(
        step.observations,
        Sample::Tuple((0..n as i64).map(|i| Sample::Discrete(i * 10 + 1)).collect())
    );

    let step = env.step(&actions).unwrap();
    assert_eq!(step.observations, Sample::Tuple(vec![Sample::None; n]));
    assert!(env.batch_observation_space().contains(&step.observations));

    // The cycle continues: the payload reappears with the counter advanced.
    let step = env.step(&actions).unwrap();
    assert_eq!(
        step.observations,
        Sample::Tuple((0..n as i64).map(|i| Sample::Discrete(i * 10 + 3)).collect())
    );
    env.close().unwrap();
}

#[test]
fn unbatch_recovers_per_lane_optionals() {
    let n = 4;
    let mut env = build(n, 2, 2).unwrap();
    env.reset().unwrap();
    let step = env.step(&vec![Sample::Discrete(0); n]).unwrap();
    let lanes = unbatch_samples(env.observation_space(), &step.observations, n).unwrap();
    assert_eq!(lanes, vec![Sample::None; n]);
    env.close().unwrap();
}
