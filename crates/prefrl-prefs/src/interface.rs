//! Selection of segment pairs to judge.
//!
//! [`PrefInterface`] keeps a pool of the most recent segments, picks random
//! pairs that have not been judged yet, and asks its [`PreferenceOracle`] for
//! a judgment. It is synchronous; the environment wrapper drives it from a
//! worker thread.

use std::{
    collections::{HashSet, VecDeque},
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    sync::Arc,
};

use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{
    LogLevel, PREF_INTERFACE_TARGET, PrefsError,
    oracle::{BoxedPreferenceOracle, PreferenceOracle, SyntheticOracle},
    preference::{self, PrefRecord},
    segment::{Segment, SegmentId},
};

/// Random pair draws attempted before giving up on finding an untested pair.
const PAIR_SAMPLE_ATTEMPTS: usize = 100;

pub const INTERFACE_LOG_FILE: &str = "pref_interface.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefInterfaceConfig {
    /// Judge pairs from environment rewards instead of asking a human.
    pub synthetic_prefs: bool,
    /// Maximum number of segments kept for pairing (oldest evicted first).
    pub max_segs: usize,
    /// Directory for the judgment log; no log file when unset.
    pub log_dir: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl Default for PrefInterfaceConfig {
    fn default() -> Self {
        Self {
            synthetic_prefs: true,
            max_segs: 1000,
            log_dir: None,
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Debug)]
pub struct PrefInterface {
    config: PrefInterfaceConfig,
    oracle: BoxedPreferenceOracle,
    segments: VecDeque<Arc<Segment>>,
    tested_pairs: HashSet<(SegmentId, SegmentId)>,
    rng: Pcg32,
    judgment_log: Option<BufWriter<File>>,
}

impl PrefInterface {
    /// Creates an interface judging with [`SyntheticOracle`].
    ///
    /// Fails with [`PrefsError::OracleRequired`] when `synthetic_prefs` is off;
    /// use [`PrefInterface::with_oracle`] to supply the judgments instead.
    pub fn new(config: PrefInterfaceConfig) -> Result<Self, PrefsError> {
        if !config.synthetic_prefs {
            return Err(PrefsError::OracleRequired);
        }
        Self::with_oracle(config, SyntheticOracle)
    }

    pub fn with_oracle<O>(config: PrefInterfaceConfig, oracle: O) -> Result<Self, PrefsError>
    where
        O: PreferenceOracle + 'static,
    {
        let judgment_log = config
            .log_dir
            .as_ref()
            .map(|dir| open_judgment_log(dir))
            .transpose()?;
        Ok(Self {
            config,
            oracle: Box::new(oracle),
            segments: VecDeque::new(),
            tested_pairs: HashSet::new(),
            rng: Pcg32::seed_from_u64(rand::rng().random()),
            judgment_log,
        })
    }

    /// Reseeds the pair sampler.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Pcg32::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn config(&self) -> &PrefInterfaceConfig {
        &self.config
    }

    /// Number of segments currently available for pairing.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn add_segment(&mut self, segment: Arc<Segment>) {
        if self.segments.len() >= self.config.max_segs
            && let Some(evicted) = self.segments.pop_front()
        {
            // pairs are only tracked while both segments are in the pool
            let id = evicted.id();
            self.tested_pairs.retain(|&(a, b)| a != id && b != id);
        }
        tracing::trace!(
            target: PREF_INTERFACE_TARGET,
            segment = %segment.id(),
            pool = self.segments.len() + 1,
            "segment received"
        );
        self.segments.push_back(segment);
    }

    /// Records a pair as already judged so it is never offered again.
    pub fn mark_tested(&mut self, a: SegmentId, b: SegmentId) {
        self.tested_pairs.insert(preference::pair_key(a, b));
    }

    /// Picks a random pair of distinct, not yet judged segments.
    pub fn sample_pair(&mut self) -> Option<(Arc<Segment>, Arc<Segment>)> {
        let n = self.segments.len();
        if n < 2 {
            return None;
        }
        for _ in 0..PAIR_SAMPLE_ATTEMPTS {
            let i = self.rng.random_range(0..n);
            let j = self.rng.random_range(0..n);
            if i == j {
                continue;
            }
            if let Some(pair) = self.untested_pair(i, j) {
                return Some(pair);
            }
        }

        // the pool is nearly exhausted; scan every pair from a random start
        let start = self.rng.random_range(0..n);
        for offset in 0..n {
            let i = (start + offset) % n;
            for j in i + 1..n {
                if let Some(pair) = self.untested_pair(i, j) {
                    return Some(pair);
                }
            }
        }
        None
    }

    /// Number of judged pairs whose segments are both still in the pool.
    #[must_use]
    pub fn tested_pair_count(&self) -> usize {
        self.tested_pairs.len()
    }

    fn untested_pair(&self, i: usize, j: usize) -> Option<(Arc<Segment>, Arc<Segment>)> {
        let (left, right) = (&self.segments[i], &self.segments[j]);
        let key = preference::pair_key(left.id(), right.id());
        (!self.tested_pairs.contains(&key)).then(|| (Arc::clone(left), Arc::clone(right)))
    }

    /// Samples an untested pair and asks the oracle to judge it.
    ///
    /// Returns `None` when no untested pair is available or the oracle judged
    /// the pair incomparable. Either way, a sampled pair is never offered again.
    pub fn next_preference(&mut self) -> Option<PrefRecord> {
        let (left, right) = self.sample_pair()?;
        self.mark_tested(left.id(), right.id());

        let Some(preference) = self.oracle.judge(&left, &right) else {
            tracing::debug!(
                target: PREF_INTERFACE_TARGET,
                left = %left.id(),
                right = %right.id(),
                "pair judged incomparable"
            );
            return None;
        };
        tracing::debug!(
            target: PREF_INTERFACE_TARGET,
            left = %left.id(),
            right = %right.id(),
            ?preference,
            "preference collected"
        );
        let record = PrefRecord::new(left, right, preference);
        self.log_judgment(&record);
        Some(record)
    }

    fn log_judgment(&mut self, record: &PrefRecord) {
        let Some(log) = &mut self.judgment_log else {
            return;
        };
        let line = serde_json::json!({
            "left": record.left.id(),
            "right": record.right.id(),
            "left_return": record.left.total_reward(),
            "right_return": record.right.total_reward(),
            "preference": record.preference,
        });
        let result = writeln!(log, "{line}").and_then(|()| log.flush());
        if let Err(e) = result {
            tracing::warn!(
                target: PREF_INTERFACE_TARGET,
                error = %e,
                "failed to write judgment log, disabling it"
            );
            self.judgment_log = None;
        }
    }
}

fn open_judgment_log(dir: &Path) -> Result<BufWriter<File>, PrefsError> {
    fs::create_dir_all(dir).map_err(|source| PrefsError::Io {
        path: dir.to_owned(),
        source,
    })?;
    let path = dir.join(INTERFACE_LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| PrefsError::Io { path, source })?;
    Ok(BufWriter::new(file))
}
