use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use prefrl_env::{
    ActionSpace, BoxSpace, DummyEnv, Env,
    wrappers::{ActionMeanings, ActionMeaningsMode, FrameStack},
};
use prefrl_prefs::interface::{PrefInterface, PrefInterfaceConfig};
use prefrl_wrapper::{
    CounterSnapshot, ENV_REWARD_KEY, PREDICTED_REWARD_KEY, PreferenceEnvWrapper, WrapperConfig,
};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    /// Observation shape of a single frame, channels last
    #[arg(long, value_delimiter = ',', default_values_t = [84, 84, 3])]
    obs_shape: Vec<usize>,
    /// Action counts; one value gives a discrete space, several a multi-discrete one
    #[arg(long, value_delimiter = ',', default_values_t = [4])]
    n_actions: Vec<usize>,
    /// Number of stacked frames per observation
    #[arg(long, default_value_t = 4)]
    n_frames: usize,
    /// Keep the multi-discrete action space instead of flattening it
    #[arg(long)]
    native_actions: bool,
    /// Number of environment steps to run
    #[arg(long, default_value_t = 1000)]
    steps: usize,
    /// Wrapper configuration JSON file (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Preference interface configuration JSON file
    #[arg(long)]
    pref_config: Option<PathBuf>,
    /// Seed for the dummy environment and the action sampler
    #[arg(long)]
    seed: Option<u64>,
    /// Seconds to wait for the workers to catch up after the last step
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,
    /// Output file path for the run report
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    steps: usize,
    episodes: usize,
    env_return: f32,
    predicted_reward_steps: usize,
    workers_caught_up: bool,
    counters: CounterSnapshot,
    finished_at: DateTime<Utc>,
}

pub(crate) fn run(arg: &RunArg) -> anyhow::Result<()> {
    let RunArg {
        obs_shape,
        n_actions,
        n_frames,
        native_actions,
        steps,
        config,
        pref_config,
        seed,
        wait_secs,
        output,
    } = arg;

    anyhow::ensure!(!obs_shape.is_empty(), "--obs-shape must not be empty");
    anyhow::ensure!(
        obs_shape.iter().all(|d| *d > 0),
        "--obs-shape dimensions must be positive"
    );
    anyhow::ensure!(*n_frames > 0, "--n-frames must be positive");
    anyhow::ensure!(
        n_actions.iter().all(|n| *n > 0),
        "--n-actions values must be positive"
    );
    let action_space = match n_actions.as_slice() {
        [] => anyhow::bail!("--n-actions must not be empty"),
        [n] => ActionSpace::Discrete(*n),
        ns => ActionSpace::MultiDiscrete(ns.to_vec()),
    };

    let config: WrapperConfig = match config {
        Some(path) => util::read_json_file("wrapper config", path)?,
        None => WrapperConfig::default(),
    };
    let pref_config: PrefInterfaceConfig = match pref_config {
        Some(path) => util::read_json_file("preference interface config", path)?,
        None => PrefInterfaceConfig::default(),
    };
    util::init_tracing(config.log_directives(pref_config.log_level))?;

    let observation_space = BoxSpace::new(obs_shape.clone(), 0.0, 255.0);
    let seed = seed.unwrap_or_else(rand::random);

    let env = DummyEnv::with_seed(observation_space, action_space, seed);
    let env = FrameStack::new(env, *n_frames);
    let mode = if *native_actions {
        ActionMeaningsMode::Native
    } else {
        ActionMeaningsMode::Flattened
    };
    let env = ActionMeanings::new(env, mode);
    eprintln!(
        "Actions: {} ({})",
        env.action_meanings().len(),
        env.action_meanings().join(", ")
    );

    let collect_prefs = config.collect_prefs;
    let train_reward = config.train_reward;
    let n_initial_training_steps = config.n_initial_training_steps;
    let interface = PrefInterface::new(pref_config)
        .context("Failed to create preference interface (set synthetic_prefs)")?;
    let mut env = PreferenceEnvWrapper::new(env, config, interface)
        .context("Failed to create preference environment wrapper")?;

    eprintln!("Running {steps} steps...");
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut episodes = 0;
    let mut env_return = 0.0;
    let mut predicted_reward_steps = 0;
    env.reset().context("Failed to reset environment")?;
    for _ in 0..*steps {
        let action = env.action_space().sample(&mut rng);
        let step = env.step(&action).context("Failed to step environment")?;
        env_return += step
            .info
            .get(ENV_REWARD_KEY)
            .copied()
            .unwrap_or(step.reward);
        if step.info.contains_key(PREDICTED_REWARD_KEY) {
            predicted_reward_steps += 1;
        }
        if step.is_done() {
            episodes += 1;
            env.reset().context("Failed to reset environment")?;
        }
    }

    eprintln!("Waiting up to {wait_secs}s for workers...");
    let workers_caught_up = env.counters().wait_until(
        |c| {
            (!collect_prefs || c.pref_db_size > 0)
                && (!train_reward || c.reward_training_steps >= n_initial_training_steps)
        },
        Duration::from_secs(*wait_secs),
    );
    env.close();
    if !workers_caught_up {
        tracing::warn!(
            wait_secs,
            "workers did not reach their initial targets before the deadline"
        );
    }

    let report = RunReport {
        steps: *steps,
        episodes,
        env_return,
        predicted_reward_steps,
        workers_caught_up,
        counters: env.counters().snapshot(),
        finished_at: Utc::now(),
    };
    Output::save_json(&report, output.clone())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct RunCommand {
        #[clap(flatten)]
        arg: RunArg,
    }

    fn parse(args: &[&str]) -> RunArg {
        RunCommand::try_parse_from(std::iter::once("run").chain(args.iter().copied()))
            .unwrap()
            .arg
    }

    #[test]
    fn test_zero_actions_rejected() {
        let arg = parse(&["--n-actions", "0", "--steps", "1"]);
        let err = run(&arg).unwrap_err();
        assert!(err.to_string().contains("--n-actions"), "{err}");

        let arg = parse(&["--n-actions", "3,0", "--steps", "1"]);
        assert!(run(&arg).is_err());
    }

    #[test]
    fn test_zero_obs_dimension_rejected() {
        let arg = parse(&["--obs-shape", "8,0,3", "--steps", "1"]);
        let err = run(&arg).unwrap_err();
        assert!(err.to_string().contains("--obs-shape"), "{err}");
    }
}
