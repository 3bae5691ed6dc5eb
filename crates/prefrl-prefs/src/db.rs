//! Bounded preference databases.
//!
//! A [`PrefDb`] holds judged segment pairs in arrival order. When full, the
//! oldest record is evicted; segments are reference counted, so a segment is
//! freed once no remaining record (or interface pool) refers to it.
//!
//! A [`PrefStore`] splits incoming records between a training database and a
//! validation database: every fifth accepted record goes to validation.
//!
//! # File Format
//!
//! Each database is saved as one JSON document in which segments are stored
//! once and records refer to them by id:
//!
//! ```text
//! {
//!   "segments": [{ "id": 0, "frames": [...], "actions": [...], "rewards": [...] }, ...],
//!   "prefs": [{ "left": 0, "right": 1, "preference": "left" }, ...]
//! }
//! ```

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    fs::{self, File},
    io::{BufReader, BufWriter, Write as _},
    path::Path,
    sync::Arc,
};

use rand::{Rng, seq::index};
use serde::{Deserialize, Serialize};

use crate::{
    PrefsError,
    preference::{self, PrefRecord, Preference},
    segment::{Segment, SegmentId},
};

/// Every `VAL_EVERY`-th accepted record is routed to validation.
pub const VAL_EVERY: u64 = 5;

pub const TRAIN_FILE: &str = "train.json";
pub const VAL_FILE: &str = "val.json";

/// Number of records per preference outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceCounts {
    pub left: usize,
    pub right: usize,
    pub tie: usize,
}

#[derive(Debug, Clone)]
pub struct PrefDb {
    max_prefs: usize,
    records: VecDeque<PrefRecord>,
    pairs: HashSet<(SegmentId, SegmentId)>,
}

impl PrefDb {
    /// Creates an empty database holding at most `max_prefs` records.
    ///
    /// # Panics
    ///
    /// Panics if `max_prefs` is zero.
    #[must_use]
    pub fn new(max_prefs: usize) -> Self {
        assert!(max_prefs > 0, "max_prefs must be positive");
        Self {
            max_prefs,
            records: VecDeque::new(),
            pairs: HashSet::new(),
        }
    }

    #[must_use]
    pub fn max_prefs(&self) -> usize {
        self.max_prefs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn contains_pair(&self, a: SegmentId, b: SegmentId) -> bool {
        self.pairs.contains(&preference::pair_key(a, b))
    }

    /// Adds a record, evicting the oldest one when full.
    ///
    /// Returns `false` (and leaves the database unchanged) if the pair has
    /// already been judged.
    pub fn push(&mut self, record: PrefRecord) -> bool {
        if !self.pairs.insert(record.pair_key()) {
            return false;
        }
        if self.records.len() == self.max_prefs
            && let Some(oldest) = self.records.pop_front()
        {
            self.pairs.remove(&oldest.pair_key());
        }
        self.records.push_back(record);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrefRecord> + '_ {
        self.records.iter()
    }

    /// Samples up to `batch_size` distinct records uniformly at random.
    pub fn sample_batch<R>(&self, rng: &mut R, batch_size: usize) -> Vec<&PrefRecord>
    where
        R: Rng + ?Sized,
    {
        let amount = batch_size.min(self.records.len());
        index::sample(rng, self.records.len(), amount)
            .into_iter()
            .map(|i| &self.records[i])
            .collect()
    }

    #[must_use]
    pub fn max_segment_id(&self) -> Option<SegmentId> {
        self.records
            .iter()
            .map(|r| r.left.id().max(r.right.id()))
            .max()
    }

    #[must_use]
    pub fn preference_counts(&self) -> PreferenceCounts {
        let mut counts = PreferenceCounts::default();
        for record in &self.records {
            match record.preference {
                Preference::Left => counts.left += 1,
                Preference::Right => counts.right += 1,
                Preference::Tie => counts.tie += 1,
            }
        }
        counts
    }

    pub fn save<P>(&self, path: P) -> Result<(), PrefsError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mut segments = BTreeMap::new();
        for record in &self.records {
            segments.insert(record.left.id(), record.left.as_ref());
            segments.insert(record.right.id(), record.right.as_ref());
        }
        let file = PrefDbFileRef {
            segments: segments.into_values().collect(),
            prefs: self.records.iter().map(PrefEntry::from).collect(),
        };

        let io_err = |source| PrefsError::Io {
            path: path.to_owned(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        serde_json::to_writer(&mut writer, &file).map_err(|source| PrefsError::Json {
            path: path.to_owned(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }

    /// Loads a database, keeping the newest `max_prefs` records.
    pub fn load<P>(path: P, max_prefs: usize) -> Result<Self, PrefsError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PrefsError::Io {
            path: path.to_owned(),
            source,
        })?;
        let PrefDbFile { segments, prefs } = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| PrefsError::Json {
                path: path.to_owned(),
                source,
            })?;

        let segments = segments
            .into_iter()
            .map(|s| (s.id(), Arc::new(s)))
            .collect::<BTreeMap<_, _>>();
        let lookup = |id: SegmentId| {
            segments
                .get(&id)
                .cloned()
                .ok_or(PrefsError::UnknownSegment { id })
        };

        let mut db = Self::new(max_prefs);
        for entry in prefs {
            let left = lookup(entry.left)?;
            let right = lookup(entry.right)?;
            db.push(PrefRecord::new(left, right, entry.preference));
        }
        Ok(db)
    }
}

#[derive(Debug, Serialize)]
struct PrefDbFileRef<'a> {
    segments: Vec<&'a Segment>,
    prefs: Vec<PrefEntry>,
}

#[derive(Debug, Deserialize)]
struct PrefDbFile {
    segments: Vec<Segment>,
    prefs: Vec<PrefEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PrefEntry {
    left: SegmentId,
    right: SegmentId,
    preference: Preference,
}

impl From<&PrefRecord> for PrefEntry {
    fn from(record: &PrefRecord) -> Self {
        Self {
            left: record.left.id(),
            right: record.right.id(),
            preference: record.preference,
        }
    }
}

/// Training and validation databases fed from one stream of records.
#[derive(Debug, Clone)]
pub struct PrefStore {
    train: PrefDb,
    val: PrefDb,
    accepted: u64,
}

impl PrefStore {
    /// Creates an empty store; validation holds `max_prefs / VAL_EVERY` records (at least one).
    #[must_use]
    pub fn new(max_prefs: usize) -> Self {
        Self::from_parts(
            PrefDb::new(max_prefs),
            PrefDb::new(val_capacity(max_prefs)),
        )
    }

    fn from_parts(train: PrefDb, val: PrefDb) -> Self {
        let accepted = (train.len() + val.len()) as u64;
        Self {
            train,
            val,
            accepted,
        }
    }

    /// Adds a record to training or validation; returns `false` for an already-judged pair.
    pub fn push(&mut self, record: PrefRecord) -> bool {
        let (a, b) = record.pair_key();
        if self.contains_pair(a, b) {
            return false;
        }
        let db = if self.accepted % VAL_EVERY == VAL_EVERY - 1 {
            &mut self.val
        } else {
            &mut self.train
        };
        let pushed = db.push(record);
        if pushed {
            self.accepted += 1;
        }
        pushed
    }

    /// Total number of records (training + validation).
    #[must_use]
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.train.is_empty() && self.val.is_empty()
    }

    #[must_use]
    pub fn train(&self) -> &PrefDb {
        &self.train
    }

    #[must_use]
    pub fn val(&self) -> &PrefDb {
        &self.val
    }

    #[must_use]
    pub fn contains_pair(&self, a: SegmentId, b: SegmentId) -> bool {
        self.train.contains_pair(a, b) || self.val.contains_pair(a, b)
    }

    #[must_use]
    pub fn max_segment_id(&self) -> Option<SegmentId> {
        self.train.max_segment_id().max(self.val.max_segment_id())
    }

    /// All segments referenced by the store, deduplicated, in id order.
    #[must_use]
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        let mut segments = BTreeMap::new();
        for record in self.train.iter().chain(self.val.iter()) {
            segments.insert(record.left.id(), Arc::clone(&record.left));
            segments.insert(record.right.id(), Arc::clone(&record.right));
        }
        segments.into_values().collect()
    }

    /// Saves `train.json` and `val.json` into `dir`, creating it if needed.
    pub fn save_dir<P>(&self, dir: P) -> Result<(), PrefsError>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| PrefsError::Io {
            path: dir.to_owned(),
            source,
        })?;
        self.train.save(dir.join(TRAIN_FILE))?;
        self.val.save(dir.join(VAL_FILE))?;
        Ok(())
    }

    /// Loads a store saved by [`PrefStore::save_dir`]. A missing `val.json` yields an
    /// empty validation database.
    pub fn load_dir<P>(dir: P, max_prefs: usize) -> Result<Self, PrefsError>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        let train = PrefDb::load(dir.join(TRAIN_FILE), max_prefs)?;
        let val_path = dir.join(VAL_FILE);
        let val = if val_path.exists() {
            PrefDb::load(val_path, val_capacity(max_prefs))?
        } else {
            PrefDb::new(val_capacity(max_prefs))
        };
        Ok(Self::from_parts(train, val))
    }
}

#[expect(clippy::cast_possible_truncation)]
fn val_capacity(max_prefs: usize) -> usize {
    (max_prefs / VAL_EVERY as usize).max(1)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::segment::tests::segment_with_rewards;

    fn record(a: u64, b: u64, preference: Preference) -> PrefRecord {
        PrefRecord::new(
            segment_with_rewards(a, &[a as f32]),
            segment_with_rewards(b, &[b as f32]),
            preference,
        )
    }

    mod pref_db {
        use super::*;

        #[test]
        fn test_rejects_duplicate_pair_in_either_order() {
            let mut db = PrefDb::new(10);
            assert!(db.push(record(1, 2, Preference::Left)));
            assert!(!db.push(record(2, 1, Preference::Right)));
            assert_eq!(db.len(), 1);
            assert!(db.contains_pair(SegmentId::new(2), SegmentId::new(1)));
        }

        #[test]
        fn test_evicts_oldest_when_full() {
            let mut db = PrefDb::new(2);
            db.push(record(0, 1, Preference::Left));
            db.push(record(1, 2, Preference::Left));
            db.push(record(2, 3, Preference::Tie));
            assert_eq!(db.len(), 2);
            assert!(!db.contains_pair(SegmentId::new(0), SegmentId::new(1)));
            assert!(db.contains_pair(SegmentId::new(2), SegmentId::new(3)));
        }

        #[test]
        fn test_sample_batch_is_bounded_and_distinct() {
            let mut db = PrefDb::new(100);
            for i in 0..5 {
                db.push(record(i, i + 100, Preference::Left));
            }
            let mut rng = Pcg32::seed_from_u64(0);
            let batch = db.sample_batch(&mut rng, 16);
            assert_eq!(batch.len(), 5);
            let keys = batch.iter().map(|r| r.pair_key()).collect::<HashSet<_>>();
            assert_eq!(keys.len(), 5);
            assert_eq!(db.sample_batch(&mut rng, 3).len(), 3);
        }

        #[test]
        fn test_counts_and_max_segment_id() {
            let mut db = PrefDb::new(10);
            db.push(record(0, 1, Preference::Left));
            db.push(record(1, 7, Preference::Tie));
            db.push(record(2, 3, Preference::Right));
            let counts = db.preference_counts();
            assert_eq!((counts.left, counts.right, counts.tie), (1, 1, 1));
            assert_eq!(db.max_segment_id(), Some(SegmentId::new(7)));
        }

        #[test]
        fn test_save_and_load_shares_segments() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("db.json");
            let shared = segment_with_rewards(5, &[1.0, 2.0]);
            let mut db = PrefDb::new(10);
            db.push(PrefRecord::new(
                Arc::clone(&shared),
                segment_with_rewards(6, &[0.0]),
                Preference::Left,
            ));
            db.push(PrefRecord::new(
                segment_with_rewards(7, &[3.0]),
                Arc::clone(&shared),
                Preference::Right,
            ));
            db.save(&path).unwrap();

            let loaded = PrefDb::load(&path, 10).unwrap();
            assert_eq!(loaded.len(), 2);
            let records = loaded.iter().collect::<Vec<_>>();
            assert!(Arc::ptr_eq(&records[0].left, &records[1].right));
            assert_eq!(records[0].left.rewards(), &[1.0, 2.0]);
            assert_eq!(records[1].preference, Preference::Right);
        }

        #[test]
        fn test_load_unknown_segment_fails() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("db.json");
            fs::write(
                &path,
                r#"{"segments": [], "prefs": [{"left": 0, "right": 1, "preference": "tie"}]}"#,
            )
            .unwrap();
            let err = PrefDb::load(&path, 10).unwrap_err();
            assert!(matches!(err, PrefsError::UnknownSegment { .. }));
        }

        #[test]
        fn test_load_missing_file_is_io_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = PrefDb::load(dir.path().join("missing.json"), 10).unwrap_err();
            assert!(matches!(err, PrefsError::Io { .. }));
        }
    }

    mod pref_store {
        use super::*;

        #[test]
        fn test_every_fifth_record_goes_to_validation() {
            let mut store = PrefStore::new(100);
            for i in 0..10 {
                assert!(store.push(record(i, i + 100, Preference::Left)));
            }
            assert_eq!(store.len(), 10);
            assert_eq!(store.train().len(), 8);
            assert_eq!(store.val().len(), 2);
        }

        #[test]
        fn test_duplicate_across_train_and_val() {
            let mut store = PrefStore::new(100);
            for i in 0..5 {
                store.push(record(i, i + 100, Preference::Left));
            }
            // (4, 104) landed in validation
            assert!(store.val().contains_pair(SegmentId::new(4), SegmentId::new(104)));
            assert!(!store.push(record(104, 4, Preference::Right)));
            assert_eq!(store.len(), 5);
        }

        #[test]
        fn test_validation_capacity() {
            let store = PrefStore::new(3);
            assert_eq!(store.val().max_prefs(), 1);
            let store = PrefStore::new(10_000);
            assert_eq!(store.val().max_prefs(), 2000);
        }

        #[test]
        fn test_save_and_load_dir() {
            let dir = tempfile::tempdir().unwrap();
            let mut store = PrefStore::new(100);
            for i in 0..6 {
                store.push(record(i, i + 10, Preference::Tie));
            }
            store.save_dir(dir.path().join("prefs")).unwrap();

            let loaded = PrefStore::load_dir(dir.path().join("prefs"), 100).unwrap();
            assert_eq!(loaded.train().len(), store.train().len());
            assert_eq!(loaded.val().len(), store.val().len());
            assert_eq!(loaded.max_segment_id(), Some(SegmentId::new(15)));
            assert_eq!(loaded.segments().len(), 12);
        }

        #[test]
        fn test_load_dir_without_validation_file() {
            let dir = tempfile::tempdir().unwrap();
            let mut db = PrefDb::new(10);
            db.push(record(0, 1, Preference::Left));
            db.save(dir.path().join(TRAIN_FILE)).unwrap();

            let store = PrefStore::load_dir(dir.path(), 10).unwrap();
            assert_eq!(store.len(), 1);
            assert!(store.val().is_empty());
        }
    }
}
