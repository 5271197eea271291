use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{identifier::JobId, store::KeyValueStore};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    #[serde(rename = "waiting_to_start")]
    Waiting,
    #[serde(rename = "job_running")]
    Running,
    #[serde(rename = "job_errored")]
    Errored,
    #[serde(rename = "job_done")]
    Done,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting_to_start",
            JobState::Running => "job_running",
            JobState::Errored => "job_errored",
            JobState::Done => "job_done",
        }
    }
}

/// Lines of text grouped by the index of the entry they're about.
/// Index 0 is used for things concerning the whole job.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Lines(BTreeMap<usize, Vec<String>>);

impl Lines {
    pub fn add(&mut self, index: usize, line: impl Into<String>) {
        self.0.entry(index).or_default().push(line.into());
    }

    pub fn at(&self, index: usize) -> &[String] {
        self.0.get(&index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0
            .iter()
            .flat_map(|(index, lines)| lines.iter().map(move |line| (*index, line.as_str())))
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub errors: Lines,
    #[serde(default)]
    pub warnings: Lines,
    #[serde(default)]
    pub messages: Lines,
    /// Errors from downloading, repeated whenever the stored download is reused
    #[serde(default, skip_serializing_if = "Lines::is_empty")]
    pub download_errors: Lines,
}

impl JobStatus {
    pub fn new() -> Self {
        Self {
            status: JobState::Waiting,
            errors: Lines::default(),
            warnings: Lines::default(),
            messages: Lines::default(),
            download_errors: Lines::default(),
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JobStatusStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> JobStatusStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get(&self, identifier: &JobId) -> Result<Option<JobStatus>> {
        let Some(content) = self.store.get(identifier.as_str()).await? else {
            return Ok(None);
        };
        let status = serde_json::from_slice(&content)
            .with_context(|| format!("Job status of \"{identifier}\" is corrupted"))?;
        Ok(Some(status))
    }

    pub async fn put(&self, identifier: &JobId, status: &JobStatus) -> Result<()> {
        let content = serde_json::to_vec(status)?;
        self.store.put(identifier.as_str(), &content).await?;
        log::debug!("Job \"{identifier}\" is now {}", status.status.as_str());
        Ok(())
    }

    /// Returns the status of an existing job, or registers a new waiting job under that identifier
    pub async fn start_or_find(&self, identifier: &JobId) -> Result<JobStatus> {
        if let Some(status) = self.get(identifier).await? {
            log::debug!("Found existing job \"{identifier}\"");
            return Ok(status);
        }
        let status = JobStatus::new();
        self.put(identifier, &status).await?;
        log::debug!("Registered new job \"{identifier}\"");
        Ok(status)
    }

    pub async fn identifiers(&self) -> Result<HashSet<String>> {
        Ok(self.store.keys().await?.into_iter().collect())
    }
}
