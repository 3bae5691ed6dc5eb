use std::path::PathBuf;

use anyhow::Context;
use prefrl_prefs::db::{PrefDb, PrefStore, PreferenceCounts};
use serde::Serialize;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InspectPrefsArg {
    /// Directory containing train.json (and optionally val.json)
    dir: PathBuf,
    /// Capacity of the training database when loading
    #[arg(long, default_value_t = 10_000)]
    max_prefs: usize,
    /// Output file path for the summary
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DbSummary {
    prefs: usize,
    preferences: PreferenceCounts,
}

impl DbSummary {
    fn new(db: &PrefDb) -> Self {
        Self {
            prefs: db.len(),
            preferences: db.preference_counts(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PrefsSummary {
    dir: PathBuf,
    total_prefs: usize,
    segments: usize,
    segment_lengths: Vec<usize>,
    max_segment_id: Option<u64>,
    train: DbSummary,
    val: DbSummary,
}

fn summarize(dir: PathBuf, store: &PrefStore) -> PrefsSummary {
    let segments = store.segments();
    let mut segment_lengths: Vec<usize> = segments.iter().map(|s| s.len()).collect();
    segment_lengths.sort_unstable();
    segment_lengths.dedup();
    PrefsSummary {
        dir,
        total_prefs: store.len(),
        segments: segments.len(),
        segment_lengths,
        max_segment_id: store.max_segment_id().map(|id| id.get()),
        train: DbSummary::new(store.train()),
        val: DbSummary::new(store.val()),
    }
}

pub(crate) fn run(arg: &InspectPrefsArg) -> anyhow::Result<()> {
    let InspectPrefsArg {
        dir,
        max_prefs,
        output,
    } = arg;
    anyhow::ensure!(*max_prefs > 0, "--max-prefs must be positive");

    eprintln!("Loading preferences from {}...", dir.display());
    let store = PrefStore::load_dir(dir, *max_prefs)
        .with_context(|| format!("Failed to load preferences from {}", dir.display()))?;
    eprintln!("Loaded {} preferences", store.len());

    Output::save_json(&summarize(dir.clone(), &store), output.clone())?;
    Ok(())
}
