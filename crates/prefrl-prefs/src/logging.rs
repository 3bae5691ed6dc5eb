use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Verbosity of one component, configurable per component.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[display("off")]
    Off,
    #[display("error")]
    Error,
    #[display("warn")]
    Warn,
    #[default]
    #[display("info")]
    Info,
    #[display("debug")]
    Debug,
    #[display("trace")]
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    /// Filter directive enabling this level for `target` (`target=level`).
    #[must_use]
    pub fn directive(self, target: &str) -> String {
        format!("{target}={self}")
    }
}
