//! Network client boundary: one call produces one forecast batch.

use crate::model::weather::ForecastBatch;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Error produced by a single fetch attempt.
#[derive(Debug)]
pub enum FetchError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    /// Provider-side failure reported by a custom fetcher.
    Provider(String),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read forecast file `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid forecast payload: {err}"),
            Self::Provider(message) => write!(f, "forecast provider error: {message}"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Provider(_) => None,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Blocking forecast client. Called from the runtime's blocking pool.
pub trait ForecastFetcher: Send + Sync + 'static {
    fn fetch(&self) -> Result<ForecastBatch, FetchError>;
}

/// Reads a JSON array of weather entries from disk on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileFetcher {
    path: PathBuf,
}

impl JsonFileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ForecastFetcher for JsonFileFetcher {
    fn fetch(&self) -> Result<ForecastBatch, FetchError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchError, ForecastFetcher, JsonFileFetcher};
    use std::io::Write;

    #[test]
    fn json_file_fetcher_reads_batch() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        write!(
            file,
            r#"[{{"weather_icon_id":500,"date":"2024-02-01","min":1.0,"max":5.0}},
               {{"weather_icon_id":800,"date":"2024-02-02","min":2.0,"max":6.0,"humidity":71.0}}]"#
        )
        .expect("fixture should be written");

        let batch = JsonFileFetcher::new(file.path())
            .fetch()
            .expect("fetch should succeed");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].humidity, 71.0);
    }

    #[test]
    fn json_file_fetcher_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let err = JsonFileFetcher::new(dir.path().join("missing.json"))
            .fetch()
            .expect_err("missing file should fail");
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
