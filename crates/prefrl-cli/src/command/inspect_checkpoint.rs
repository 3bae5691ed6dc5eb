use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use prefrl_reward::{
    checkpoint::{self, RewardCheckpoint},
    network::NetworkSpec,
};
use serde::Serialize;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InspectCheckpointArg {
    /// Checkpoint file, or a directory whose latest checkpoint is shown
    path: PathBuf,
    /// Output file path for the summary
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct CheckpointSummary {
    path: PathBuf,
    network_id: &'static str,
    network: NetworkSpec,
    param_count: usize,
    param_l2_norm: f32,
    training_steps: u64,
    val_accuracy: Option<f32>,
    saved_at: DateTime<Utc>,
}

fn summarize(path: PathBuf, ckpt: &RewardCheckpoint) -> CheckpointSummary {
    CheckpointSummary {
        path,
        network_id: ckpt.network.id(),
        network: ckpt.network,
        param_count: ckpt.params.len(),
        param_l2_norm: ckpt.params.iter().map(|p| p * p).sum::<f32>().sqrt(),
        training_steps: ckpt.training_steps,
        val_accuracy: ckpt.val_accuracy,
        saved_at: ckpt.saved_at,
    }
}

pub(crate) fn run(arg: &InspectCheckpointArg) -> anyhow::Result<()> {
    let InspectCheckpointArg { path, output } = arg;

    let path = if path.is_dir() {
        checkpoint::latest_in(path)
            .with_context(|| format!("Failed to find a checkpoint in {}", path.display()))?
    } else {
        path.clone()
    };
    let ckpt = RewardCheckpoint::load(&path)
        .with_context(|| format!("Failed to load checkpoint {}", path.display()))?;
    if ckpt.params.len() != ckpt.network.param_count() {
        eprintln!(
            "Warning: {} expects {} parameters but the checkpoint has {}",
            ckpt.network.id(),
            ckpt.network.param_count(),
            ckpt.params.len()
        );
    }

    Output::save_json(&summarize(path, &ckpt), output.clone())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_fields() {
        let ckpt = RewardCheckpoint::new(
            NetworkSpec::PooledLinear { bins: 2 },
            vec![3.0, 4.0, 0.0],
            12,
            Some(0.5),
        );
        let summary = summarize(PathBuf::from("ckpt.json"), &ckpt);
        assert_eq!(summary.network_id, "pooled_linear");
        assert_eq!(summary.param_count, 3);
        assert!((summary.param_l2_norm - 5.0).abs() < 1e-6);
        assert_eq!(summary.training_steps, 12);
    }

    #[test]
    fn test_run_on_directory_picks_latest() {
        let dir = tempfile::tempdir().unwrap();
        for steps in [1, 5] {
            RewardCheckpoint::new(NetworkSpec::PooledLinear { bins: 1 }, vec![0.0, 0.0], steps, None)
                .save(dir.path())
                .unwrap();
        }
        let output = dir.path().join("summary.json");
        run(&InspectCheckpointArg {
            path: dir.path().to_owned(),
            output: Some(output.clone()),
        })
        .unwrap();
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(summary["training_steps"], 5);
    }
}
