use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::dedup::DedupReviewItem;
use crate::progress::{UnitCounts, UnitRecord};

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Organizations,
    Candidates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityError {
    pub unit: String,
    pub entity: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: PipelineKind,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: u32,
    pub succeeded: u32,
    pub degraded: u32,
    pub errored: u32,
    pub published: u32,
    pub deleted: u32,
    /// Units skipped because the checkpoint already had them.
    pub resumed_skips: u32,
    pub rate_limit_hit: bool,
    /// All requested units completed.
    pub complete: bool,
    pub units: BTreeMap<String, UnitRecord>,
    pub errors: Vec<EntityError>,
    pub dedup_review: Vec<DedupReviewItem>,
}

impl RunSummary {
    pub fn new(run_id: Uuid, pipeline: PipelineKind, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            pipeline,
            dry_run,
            started_at,
            finished_at: started_at,
            processed: 0,
            succeeded: 0,
            degraded: 0,
            errored: 0,
            published: 0,
            deleted: 0,
            resumed_skips: 0,
            rate_limit_hit: false,
            complete: false,
            units: BTreeMap::new(),
            errors: Vec::new(),
            dedup_review: Vec::new(),
        }
    }

    pub fn absorb(&mut self, counts: &UnitCounts) {
        self.processed += counts.processed;
        self.succeeded += counts.succeeded;
        self.degraded += counts.degraded;
        self.errored += counts.errored;
        self.published += counts.published;
        self.deleted += counts.deleted;
    }

    /// Non-zero after a rate-limit stop or any errored entity. Dry runs
    /// always exit zero.
    pub fn exit_code(&self) -> u8 {
        if self.dry_run {
            return 0;
        }
        if self.rate_limit_hit || self.errored > 0 {
            1
        } else {
            0
        }
    }
}

/// `<reports_dir>/<run_id>/run_summary.json`
pub async fn write_reports(reports_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let run_dir = reports_dir.join(summary.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let path = run_dir.join(RUN_SUMMARY_FILE);
    let bytes = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
