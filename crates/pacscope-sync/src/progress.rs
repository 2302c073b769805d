//! Resumable run checkpoint.
//!
//! A unit is one jurisdiction (or the presidential pseudo-jurisdiction) for
//! candidate runs and one organization slug for organization runs. The
//! checkpoint is rewritten after every unit transition.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use pacscope_storage::JsonFileStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CANDIDATE_CHECKPOINT: &str = "candidate_progress.json";
pub const ORGANIZATION_CHECKPOINT: &str = "organization_progress.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    #[default]
    Pending,
    InProgress,
    Completed,
    RateLimited,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounts {
    pub processed: u32,
    pub succeeded: u32,
    pub degraded: u32,
    pub errored: u32,
    pub published: u32,
    pub deleted: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub state: UnitState,
    #[serde(default)]
    pub counts: UnitCounts,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Only `completed` is needed to resume; everything else is bookkeeping and
/// defaults when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    #[serde(default)]
    pub run_id: Uuid,
    #[serde(default)]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub units: BTreeMap<String, UnitRecord>,
}

impl RunProgress {
    pub fn new(run_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at: now,
            updated_at: now,
            finished_at: None,
            completed: BTreeSet::new(),
            units: BTreeMap::new(),
        }
    }

    /// Continue from a loaded checkpoint under a new run id.
    pub fn resume(mut self, run_id: Uuid, now: DateTime<Utc>) -> Self {
        self.run_id = run_id;
        self.updated_at = now;
        self.finished_at = None;
        self
    }

    pub fn is_completed(&self, unit: &str) -> bool {
        self.completed.contains(unit)
    }

    pub fn state_of(&self, unit: &str) -> UnitState {
        if self.is_completed(unit) {
            return UnitState::Completed;
        }
        self.units.get(unit).map(|u| u.state).unwrap_or_default()
    }

    fn set(&mut self, unit: &str, state: UnitState, counts: UnitCounts, error: Option<String>, now: DateTime<Utc>) {
        self.units.insert(
            unit.to_string(),
            UnitRecord {
                state,
                counts,
                updated_at: now,
                error,
            },
        );
        self.updated_at = now;
    }

    pub fn mark_in_progress(&mut self, unit: &str, now: DateTime<Utc>) {
        self.set(unit, UnitState::InProgress, UnitCounts::default(), None, now);
    }

    pub fn mark_completed(&mut self, unit: &str, counts: UnitCounts, now: DateTime<Utc>) {
        self.completed.insert(unit.to_string());
        self.set(unit, UnitState::Completed, counts, None, now);
    }

    pub fn mark_rate_limited(&mut self, unit: &str, counts: UnitCounts, now: DateTime<Utc>) {
        self.set(unit, UnitState::RateLimited, counts, None, now);
    }

    pub fn mark_failed(&mut self, unit: &str, counts: UnitCounts, error: String, now: DateTime<Utc>) {
        self.set(unit, UnitState::Failed, counts, Some(error), now);
    }

    /// True when every listed unit is completed.
    pub fn covers<'a>(&self, units: impl IntoIterator<Item = &'a str>) -> bool {
        units.into_iter().all(|u| self.is_completed(u))
    }
}

/// Named checkpoint file under the state directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    files: JsonFileStore,
    name: &'static str,
}

impl ProgressStore {
    pub fn new(files: JsonFileStore, name: &'static str) -> Self {
        Self { files, name }
    }

    pub async fn load(&self) -> Result<Option<RunProgress>> {
        self.files.load(self.name).await
    }

    pub async fn save(&self, progress: &RunProgress) -> Result<()> {
        self.files.save(self.name, progress).await?;
        Ok(())
    }
}
