//! JSON checkpoints of trained reward predictors.
//!
//! Checkpoints live under `<log_dir>/reward_predictor/checkpoints` and are
//! named after the training step they were taken at. A rerun that restarts the
//! step count writes low-step files next to stale high-step ones, so the most
//! recent checkpoint is chosen by `saved_at`, then by step.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RewardError, network::NetworkSpec};

/// Checkpoint directory relative to a log directory.
pub const CHECKPOINT_DIR: &str = "reward_predictor/checkpoints";

const FILE_PREFIX: &str = "reward_predictor_";
const FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardCheckpoint {
    pub network: NetworkSpec,
    pub params: Vec<f32>,
    pub training_steps: u64,
    pub val_accuracy: Option<f32>,
    pub saved_at: DateTime<Utc>,
}

impl RewardCheckpoint {
    #[must_use]
    pub fn new(
        network: NetworkSpec,
        params: Vec<f32>,
        training_steps: u64,
        val_accuracy: Option<f32>,
    ) -> Self {
        Self {
            network,
            params,
            training_steps,
            val_accuracy,
            saved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{FILE_PREFIX}{:08}.{FILE_EXTENSION}",
            self.training_steps
        )
    }

    /// Writes the checkpoint into `dir`, creating it if needed, and returns the file path.
    pub fn save<P>(&self, dir: P) -> Result<PathBuf, RewardError>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| RewardError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = dir.join(self.file_name());
        let file = File::create(&path).map_err(|source| RewardError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|source| RewardError::Json {
            path: path.clone(),
            source,
        })?;
        writer.flush().map_err(|source| RewardError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    pub fn load<P>(path: P) -> Result<Self, RewardError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RewardError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| RewardError::Json {
            path: path.to_owned(),
            source,
        })
    }
}

/// Path of the most recent checkpoint in `dir`.
///
/// `dir` may be a log directory or its checkpoint directory itself. Every
/// candidate file is read; the one with the latest `saved_at` wins and equal
/// times fall back to the higher training step.
pub fn latest_in<P>(dir: P) -> Result<PathBuf, RewardError>
where
    P: AsRef<Path>,
{
    latest_checkpoint(dir.as_ref()).map(|(path, _)| path)
}

/// Loads the most recent checkpoint in `dir` (see [`latest_in`]).
pub fn load_latest<P>(dir: P) -> Result<RewardCheckpoint, RewardError>
where
    P: AsRef<Path>,
{
    latest_checkpoint(dir.as_ref()).map(|(_, checkpoint)| checkpoint)
}

fn latest_checkpoint(dir: &Path) -> Result<(PathBuf, RewardCheckpoint), RewardError> {
    let nested = dir.join(CHECKPOINT_DIR);
    let search = if nested.is_dir() { nested } else { dir.to_owned() };

    let entries = fs::read_dir(&search).map_err(|source| RewardError::Io {
        path: search.clone(),
        source,
    })?;
    let mut latest: Option<(PathBuf, RewardCheckpoint)> = None;
    for entry in entries {
        let path = entry
            .map_err(|source| RewardError::Io {
                path: search.clone(),
                source,
            })?
            .path();
        let is_checkpoint = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                name.starts_with(FILE_PREFIX) && name.ends_with(&format!(".{FILE_EXTENSION}"))
            });
        if !is_checkpoint {
            continue;
        }
        let checkpoint = RewardCheckpoint::load(&path)?;
        let newer = latest.as_ref().is_none_or(|(_, l)| {
            (checkpoint.saved_at, checkpoint.training_steps) > (l.saved_at, l.training_steps)
        });
        if newer {
            latest = Some((path, checkpoint));
        }
    }
    latest.ok_or_else(|| RewardError::NoCheckpoint {
        dir: dir.to_owned(),
    })
}
