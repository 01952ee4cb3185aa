use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::form::FormState;

/// Storage key of the run history, also its file stem.
pub const HISTORY_KEY: &str = "perfTestHistory";
pub const HISTORY_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access history file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode run history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Local record of a submitted run. Never sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub test_type: String,
    pub params: Map<String, Value>,
}

impl RunRecord {
    pub fn new(form: &FormState) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            test_type: form.test_type().label().to_string(),
            params: form.snapshot(),
        }
    }

    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).and_then(Value::as_str).unwrap_or_default()
    }
}

/// The most recent runs, newest first, mirrored to a JSON file.
#[derive(Debug)]
pub struct RunHistory {
    path: PathBuf,
    records: Vec<RunRecord>,
}

impl RunHistory {
    pub fn file_in(dir: &Path) -> PathBuf {
        dir.join(format!("{HISTORY_KEY}.json"))
    }

    /// `$HOME/.perf_designer`, or the working directory when there is no home.
    pub fn default_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".perf_designer"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Reads the history once. A missing file is an empty history; so is an
    /// unreadable one, which is overwritten on the next record.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let path = path.into();

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|error| {
                tracing::warn!(path = %path.display(), %error, "ignoring corrupt run history");
                Vec::new()
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(HistoryError::Io { path, source }),
        };

        Ok(Self { path, records })
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Prepends `record`, keeps the newest [`HISTORY_CAP`] and rewrites the
    /// file.
    pub async fn record(&mut self, record: RunRecord) -> Result<(), HistoryError> {
        self.records.insert(0, record);
        self.records.truncate(HISTORY_CAP);
        self.persist().await
    }

    async fn persist(&self) -> Result<(), HistoryError> {
        let contents = serde_json::to_string_pretty(&self.records)?;

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| HistoryError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|source| HistoryError::Io {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(path = %self.path.display(), records = self.records.len(), "run history saved");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::form::HttpMethod;
    use crate::test_type::TestType;

    fn form_for(url: &str) -> FormState {
        let mut form = FormState::new(TestType::Soak);
        form.request.method = Some(HttpMethod::Get);
        form.request.url = url.into();
        form.request.host = "h".into();
        form
    }

    #[tokio::test]
    async fn keeps_the_ten_newest_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = RunHistory::file_in(dir.path());
        let mut history = RunHistory::load(&path).await.unwrap();
        assert!(history.records().is_empty());

        for i in 0..11 {
            history
                .record(RunRecord::new(&form_for(&format!("/run/{i}"))))
                .await
                .unwrap();
        }

        let reloaded = RunHistory::load(&path).await.unwrap();
        let urls: Vec<&str> = reloaded.records().iter().map(|r| r.param("url")).collect();
        let expected: Vec<String> = (1..11).rev().map(|i| format!("/run/{i}")).collect();

        assert_eq!(reloaded.records().len(), HISTORY_CAP);
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn records_carry_type_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = RunHistory::file_in(dir.path());
        let mut history = RunHistory::load(&path).await.unwrap();

        let mut form = form_for("/soak");
        form.set_load("duration", "3600").unwrap();
        history.record(RunRecord::new(&form)).await.unwrap();

        let record = &history.records()[0];
        assert_eq!(record.test_type, "Soak Test");
        assert_eq!(record.param("duration"), "3600");
        assert_eq!(record.param("payloadType"), "json");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"type\": \"Soak Test\""));
    }

    #[tokio::test]
    async fn corrupt_history_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = RunHistory::file_in(dir.path());
        std::fs::write(&path, "not json").unwrap();

        let history = RunHistory::load(&path).await.unwrap();
        assert!(history.records().is_empty());
    }

    #[tokio::test]
    async fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = RunHistory::file_in(&dir.path().join("nested").join("deeper"));

        let mut history = RunHistory::load(&path).await.unwrap();
        history.record(RunRecord::new(&form_for("/x"))).await.unwrap();

        assert!(path.exists());
    }
}
