use std::{
    fs::File,
    io::{self, BufWriter, StdoutLock, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Destination of a command's JSON result: stdout, or a file when a path is given.
#[derive(Debug)]
pub enum Output {
    Stdout(StdoutLock<'static>),
    File(BufWriter<File>, PathBuf),
}

impl Output {
    pub fn save_json<T>(value: &T, path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        let mut output = match path {
            Some(path) => {
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?;
                Output::File(BufWriter::new(file), path)
            }
            None => Output::Stdout(io::stdout().lock()),
        };
        output
            .write_json(value)
            .with_context(|| format!("Failed to write JSON to {}", output.describe()))
    }

    fn describe(&self) -> String {
        match self {
            Output::Stdout(_) => "stdout".to_owned(),
            Output::File(_, path) => path.display().to_string(),
        }
    }

    fn write_json<T>(&mut self, value: &T) -> io::Result<()>
    where
        T: serde::Serialize,
    {
        let writer: &mut dyn Write = match self {
            Output::Stdout(writer) => writer,
            Output::File(writer, _) => writer,
        };
        serde_json::to_writer_pretty(&mut *writer, value)?;
        writeln!(writer)?;
        writer.flush()
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Installs a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `directives` when set.
pub fn init_tracing<I, S>(directives: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = directives
                .into_iter()
                .map(|d| d.as_ref().to_owned())
                .collect::<Vec<_>>()
                .join(",");
            EnvFilter::try_new(&directives)
                .with_context(|| format!("Invalid log directives: {directives}"))?
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: u32,
    }

    #[test]
    fn test_save_and_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let sample = Sample {
            name: "a".to_owned(),
            value: 3,
        };
        Output::save_json(&sample, Some(path.clone())).unwrap();
        let loaded: Sample = read_json_file("sample", &path).unwrap();
        assert_eq!(loaded, sample);
    }

    #[test]
    fn test_read_json_error_names_file_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[").unwrap();
        let err = read_json_file::<Sample, _>("wrapper config", &path).unwrap_err();
        assert!(err.to_string().contains("wrapper config"));
    }
}
