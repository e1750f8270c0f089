//! Append-only artifact store for run directories
//!
//! Layout per run:
//!
//! ```text
//! runs/<run_id>/
//!   run_metadata.json
//!   results.jsonl                    # one TrialResult per line
//!   transcripts/<trial_id>.json
//!   intermediate/<trial_id>/<stage>.json
//! ```
//!
//! Every one-shot file is written with a write-then-rename so readers
//! never observe a partial file; `results.jsonl` is opened in append
//! mode, one line per trial, in completion order. No writer ever reads
//! back and rewrites an artifact.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::trial::{ConversationTurn, TrialResult};

/// Errors from the artifact store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Io { path, source }
    }
}

type Result<T> = std::result::Result<T, StorageError>;

/// Metadata written once at the head of every run directory.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct RunMetadata {
    pub timestamp: chrono::DateTime<Utc>,
    pub scenario_id: String,
    pub scenario_title: String,
    pub target_model: String,
    pub agent_model: String,
    pub judge_count: usize,
    pub seed: u64,

    /// Agent prompt name -> SHA-256 digest, for reproducibility
    #[serde(default)]
    pub prompt_digests: std::collections::BTreeMap<String, String>,
}

/// Handle on the `runs/` root.
pub struct RunStore {
    base_dir: PathBuf,
}

impl RunStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a run directory. The id defaults to the UTC clock
    /// (`YYYYMMDD_HHMMSS`); callers can override it.
    pub async fn create_run_dir(&self, run_id: Option<&str>) -> Result<PathBuf> {
        let run_id = match run_id {
            Some(id) => id.to_string(),
            None => Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        };
        let run_dir = self.base_dir.join(run_id);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(StorageError::io(&run_dir))?;
        Ok(run_dir)
    }

    /// Write `run_metadata.json`. Written exactly once per run.
    pub async fn save_run_metadata(&self, run_dir: &Path, metadata: &RunMetadata) -> Result<PathBuf> {
        let path = run_dir.join("run_metadata.json");
        write_json_atomic(&path, metadata).await?;
        Ok(path)
    }

    /// Append one trial to `results.jsonl`. Append order is completion
    /// order; consumers must not assume more than that.
    pub async fn append_trial_result(&self, run_dir: &Path, trial: &TrialResult) -> Result<PathBuf> {
        let path = run_dir.join("results.jsonl");
        let mut line = serde_json::to_string(trial)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(StorageError::io(&path))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(StorageError::io(&path))?;
        file.flush().await.map_err(StorageError::io(&path))?;
        Ok(path)
    }

    /// Persist the raw conversation transcript for a trial.
    pub async fn save_transcript(
        &self,
        run_dir: &Path,
        trial_id: &str,
        conversation: &[ConversationTurn],
    ) -> Result<PathBuf> {
        let dir = run_dir.join("transcripts");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(StorageError::io(&dir))?;

        let path = dir.join(format!("{trial_id}.json"));
        write_json_atomic(
            &path,
            &serde_json::json!({
                "trial_id": trial_id,
                "conversation": conversation,
            }),
        )
        .await?;
        Ok(path)
    }

    /// Persist one pipeline stage's output under `intermediate/<trial>/`.
    pub async fn save_intermediate<T: Serialize>(
        &self,
        run_dir: &Path,
        trial_id: &str,
        stage: &str,
        data: &T,
    ) -> Result<PathBuf> {
        let dir = run_dir.join("intermediate").join(trial_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(StorageError::io(&dir))?;

        let path = dir.join(format!("{stage}.json"));
        write_json_atomic(&path, data).await?;
        Ok(path)
    }

    /// Read every trial from a run's `results.jsonl`. Malformed lines
    /// are skipped with a warning, never rewritten.
    pub async fn load_trial_results(&self, run_dir: &Path) -> Result<Vec<TrialResult>> {
        let path = run_dir.join("results.jsonl");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&path)(e)),
        };

        let mut results = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TrialResult>(line) {
                Ok(trial) => results.push(trial),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping malformed results line"
                ),
            }
        }
        Ok(results)
    }

    /// Enumerate run directories, newest id first.
    pub async fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let mut runs = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(StorageError::io(&self.base_dir)(e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(StorageError::io(&self.base_dir))?
        {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if path.is_dir() && !hidden {
                runs.push(path);
            }
        }

        runs.sort();
        runs.reverse();
        Ok(runs)
    }
}

/// Write a JSON file atomically: serialize, write a temp sibling, rename.
async fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, content.as_bytes())
        .await
        .map_err(StorageError::io(&tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(StorageError::io(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::TargetParameters;
    use crate::trial::{
        AgentInfo, TargetInfo, TrialFlags, TrialMetadata, TurnRole,
    };
    use tempfile::TempDir;

    fn trial(trial_id: &str) -> TrialResult {
        TrialResult {
            trial_id: trial_id.into(),
            scenario_id: "scenario_001".into(),
            target: TargetInfo {
                provider: "fake".into(),
                model_name: "perfect".into(),
                model_version: Some("fake-v1.0-perfect".into()),
                parameters: TargetParameters::default(),
            },
            agent: AgentInfo {
                provider: "mock".into(),
                model_name: "agent".into(),
            },
            conversation: vec![ConversationTurn {
                turn_id: "Q1".into(),
                role: TurnRole::User,
                content: "What is Part A?".into(),
                timestamp: Utc::now(),
            }],
            claims: vec![],
            verifications: vec![],
            adjudicated_verdicts: vec![],
            final_scores: None,
            flags: TrialFlags::default(),
            error: None,
            timestamp: Utc::now(),
            metadata: TrialMetadata {
                judge_count: 2,
                seed: 42,
                disagreement_percentage: 0.0,
                aborted: false,
                prompt_digests: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let run_dir = store.create_run_dir(Some("test_run")).await.unwrap();

        store.append_trial_result(&run_dir, &trial("t1")).await.unwrap();
        store.append_trial_result(&run_dir, &trial("t2")).await.unwrap();

        let results = store.load_trial_results(&run_dir).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].trial_id, "t1");
        assert_eq!(results[1].trial_id, "t2");
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let run_dir = store.create_run_dir(Some("test_run")).await.unwrap();

        store.append_trial_result(&run_dir, &trial("t1")).await.unwrap();
        let path = run_dir.join("results.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{ this is not json\n");
        std::fs::write(&path, content).unwrap();
        store.append_trial_result(&run_dir, &trial("t2")).await.unwrap();

        let results = store.load_trial_results(&run_dir).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].trial_id, "t2");
    }

    #[tokio::test]
    async fn test_intermediate_and_transcript_layout() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let run_dir = store.create_run_dir(Some("test_run")).await.unwrap();

        let t = trial("abc123");
        store
            .save_transcript(&run_dir, &t.trial_id, &t.conversation)
            .await
            .unwrap();
        store
            .save_intermediate(&run_dir, &t.trial_id, "extraction", &serde_json::json!({"claims": []}))
            .await
            .unwrap();
        store
            .save_intermediate(&run_dir, &t.trial_id, "verification_v1", &serde_json::json!({"verdicts": []}))
            .await
            .unwrap();

        assert!(run_dir.join("transcripts/abc123.json").exists());
        assert!(run_dir.join("intermediate/abc123/extraction.json").exists());
        assert!(run_dir.join("intermediate/abc123/verification_v1.json").exists());
        // No temp files left behind by the atomic writes.
        assert!(!run_dir.join("transcripts/abc123.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        store.create_run_dir(Some("20250101_000000")).await.unwrap();
        store.create_run_dir(Some("20250601_120000")).await.unwrap();

        let runs = store.list_runs().await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].ends_with("20250601_120000"));
    }

    #[tokio::test]
    async fn test_missing_results_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let run_dir = store.create_run_dir(Some("empty")).await.unwrap();
        assert!(store.load_trial_results(&run_dir).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_metadata_written() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let run_dir = store.create_run_dir(None).await.unwrap();

        let metadata = RunMetadata {
            timestamp: Utc::now(),
            scenario_id: "scenario_001".into(),
            scenario_title: "title".into(),
            target_model: "fake-v1.0-perfect".into(),
            agent_model: "mock-agent-v1.0".into(),
            judge_count: 2,
            seed: 42,
            prompt_digests: crate::agents::prompts::prompt_digests(),
        };
        let path = store.save_run_metadata(&run_dir, &metadata).await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        let parsed: RunMetadata = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.scenario_id, "scenario_001");
        assert_eq!(parsed.prompt_digests.len(), 3);
    }
}
