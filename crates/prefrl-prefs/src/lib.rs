//! Preference collection for reward learning.
//!
//! This crate turns environment trajectories into training signal for a reward
//! predictor:
//!
//! 1. **Segments** ([`segment`]) - Fixed-length slices of trajectory built step by step
//! 2. **Preferences** ([`preference`]) - Judgments between two segments (left, right, tie)
//! 3. **Oracles** ([`oracle`]) - Sources of judgments (synthetic from true reward, or scripted)
//! 4. **Interface** ([`interface`]) - Keeps recent segments and picks untested pairs to judge
//! 5. **Database** ([`db`]) - Bounded train/validation stores of judged pairs, saved as JSON
//!
//! # Example
//!
//! ```
//! use prefrl_env::{Action, Observation};
//! use prefrl_prefs::{
//!     db::PrefStore,
//!     interface::{PrefInterface, PrefInterfaceConfig},
//!     segment::SegmentBuilder,
//! };
//!
//! let mut builder = SegmentBuilder::new(2);
//! let mut interface = PrefInterface::new(PrefInterfaceConfig::default()).unwrap();
//! let mut store = PrefStore::new(100);
//!
//! for reward in [1.0, 2.0, 3.0, 4.0] {
//!     let obs = Observation::zeros(vec![1]);
//!     if let Some(segment) = builder.push(obs, Action::Discrete(0), reward) {
//!         interface.add_segment(segment);
//!     }
//! }
//! let record = interface.next_preference().unwrap();
//! store.push(record);
//! assert_eq!(store.len(), 1);
//! ```

use std::{io, path::PathBuf};

pub use self::logging::LogLevel;
use self::segment::SegmentId;

pub mod db;
pub mod interface;
mod logging;
pub mod oracle;
pub mod preference;
pub mod segment;

/// Tracing target used by the preference interface.
pub const PREF_INTERFACE_TARGET: &str = "prefrl::pref_interface";

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PrefsError {
    #[display("failed to access {}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("failed to read or write preference JSON {}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("preference references unknown segment {id}")]
    UnknownSegment { id: SegmentId },
    #[display("non-synthetic preferences require a preference oracle")]
    OracleRequired,
}
