//! Run orchestration for the organization and candidate pipelines.
//!
//! Both pipelines walk their units strictly in order, checkpoint after every
//! unit, and stop the run (checkpoint saved) when the API rate budget is
//! exhausted. Other failures are recorded per entity and the sweep goes on.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use pacscope_adapters::{FinanceApi, OpenFecApi};
use pacscope_core::categorize::{aggregate_stats, sort_for_listing};
use pacscope_core::jurisdiction::{self, UnknownJurisdiction, PRESIDENTIAL};
use pacscope_core::{normalize, Category, ORGANIZATION_PARTITION};
use pacscope_publish::{
    notify_best_effort, PublishError, Publisher, RestDocumentStore, TopicNotifier, UpdateNotice,
    ORGANIZATIONS_COLLECTION,
};
use pacscope_storage::{
    HttpClientConfig, JsonFileStore, RateLimitConfig, RateLimitedClient, ReqwestTransport,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod candidates;
pub mod config;
pub mod dedup;
pub mod organizations;
pub mod progress;
pub mod registry;
pub mod report;

pub use config::{ConfigError, SyncConfig};
pub use dedup::{DedupConfig, DedupEngine, DedupOutcome, DedupReviewItem};
pub use progress::{ProgressStore, RunProgress, UnitCounts, UnitRecord, UnitState};
pub use registry::{OrganizationRegistry, TrackedOrganization};
pub use report::{write_reports, EntityError, PipelineKind, RunSummary};

use progress::{CANDIDATE_CHECKPOINT, ORGANIZATION_CHECKPOINT};

pub const CRATE_NAME: &str = "pacscope-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    UnknownJurisdiction(#[from] UnknownJurisdiction),
    #[error("organization {0:?} is not in the tracked registry")]
    UnknownOrganization(String),
    #[error("a document store is required unless running dry")]
    PublisherMissing,
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip every publish call and every checkpoint or report write.
    pub dry_run: bool,
    pub resume: bool,
    /// Single tracked organization, by name or slug.
    pub organization: Option<String>,
    /// Comma-separated jurisdiction codes.
    pub jurisdictions: Option<String>,
    pub presidential_only: bool,
}

/// Checkpoint units for a candidate run, in sweep order. A full sweep ends
/// with the presidential pseudo-jurisdiction; filtered sweeps leave it out.
pub fn candidate_units(options: &RunOptions) -> Result<Vec<String>, UnknownJurisdiction> {
    if options.presidential_only {
        if options.jurisdictions.is_some() {
            warn!("jurisdiction filter ignored in presidential-only mode");
        }
        return Ok(vec![PRESIDENTIAL.to_string()]);
    }
    match options.jurisdictions.as_deref() {
        Some(csv) => Ok(jurisdiction::parse_filter(csv)?
            .into_iter()
            .map(|j| j.code.to_string())
            .collect()),
        None => Ok(jurisdiction::all()
            .iter()
            .map(|j| j.code.to_string())
            .chain(std::iter::once(PRESIDENTIAL.to_string()))
            .collect()),
    }
}

pub struct SyncPipeline {
    api: Arc<dyn FinanceApi>,
    publisher: Option<Publisher>,
    state: JsonFileStore,
    reports_dir: PathBuf,
    dedup: DedupEngine,
    run_id: Uuid,
}

impl SyncPipeline {
    pub fn new(
        api: Arc<dyn FinanceApi>,
        publisher: Option<Publisher>,
        state_dir: impl Into<PathBuf>,
        reports_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            publisher,
            state: JsonFileStore::new(state_dir),
            reports_dir: reports_dir.into(),
            dedup: DedupEngine::default(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Wire the HTTP API client and, unless dry, the REST document store.
    /// Configuration is validated before anything is built.
    pub fn from_config(config: &SyncConfig, dry_run: bool) -> Result<Self, SyncError> {
        config.validate(dry_run)?;
        let api_key = config
            .fec_api_key
            .clone()
            .ok_or_else(|| ConfigError::Missing(vec!["FEC_API_KEY"]))?;

        let run_id = Uuid::new_v4();
        let transport = ReqwestTransport::new(&HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let client = Arc::new(RateLimitedClient::new(
            Arc::new(transport),
            RateLimitConfig {
                min_interval: config.min_request_interval,
                ..RateLimitConfig::default()
            },
            run_id,
        ));
        let api = Arc::new(OpenFecApi::new(client, &config.fec_api_base, api_key));

        let publisher = match (dry_run, &config.docstore_base_url, &config.docstore_token) {
            (false, Some(base_url), Some(token)) => Some(Publisher::new(Arc::new(
                RestDocumentStore::new(base_url, token, config.http_timeout())?,
            ))),
            _ => None,
        };

        Ok(Self::new(api, publisher, &config.state_dir, &config.reports_dir).with_run_id(run_id))
    }

    fn active_publisher(&self, dry_run: bool) -> Option<&Publisher> {
        if dry_run {
            None
        } else {
            self.publisher.as_ref()
        }
    }

    async fn load_progress(
        &self,
        store: &ProgressStore,
        resume: bool,
    ) -> Result<RunProgress, SyncError> {
        let now = Utc::now();
        if resume {
            match store.load().await? {
                Some(saved) if saved.finished_at.is_some() => {
                    info!(
                        previous_run = %saved.run_id,
                        "saved run already finished; starting a fresh sweep"
                    );
                }
                Some(saved) => {
                    info!(completed = saved.completed.len(), "resuming from checkpoint");
                    return Ok(saved.resume(self.run_id, now));
                }
                None => info!("no checkpoint found; starting fresh"),
            }
        }
        Ok(RunProgress::new(self.run_id, now))
    }

    async fn checkpoint(
        &self,
        store: &ProgressStore,
        progress: &RunProgress,
        dry_run: bool,
    ) -> Result<(), SyncError> {
        if !dry_run {
            store.save(progress).await?;
        }
        Ok(())
    }

    async fn finish(
        &self,
        mut summary: RunSummary,
        progress: &RunProgress,
    ) -> Result<RunSummary, SyncError> {
        summary.finished_at = Utc::now();
        summary.units = progress.units.clone();
        if !summary.dry_run {
            let path = write_reports(&self.reports_dir, &summary).await?;
            info!(path = %path.display(), "run summary written");
        }
        info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            succeeded = summary.succeeded,
            degraded = summary.degraded,
            errored = summary.errored,
            rate_limit_hit = summary.rate_limit_hit,
            "run finished"
        );
        Ok(summary)
    }

    pub async fn run_organizations(
        &self,
        registry: &OrganizationRegistry,
        options: &RunOptions,
    ) -> Result<RunSummary, SyncError> {
        if !options.dry_run && self.publisher.is_none() {
            return Err(SyncError::PublisherMissing);
        }
        let selected: Vec<&TrackedOrganization> = match options.organization.as_deref() {
            Some(name) => vec![registry
                .find(name)
                .ok_or_else(|| SyncError::UnknownOrganization(name.to_string()))?],
            None => registry.organizations.iter().collect(),
        };
        let units: Vec<String> = selected.iter().map(|o| o.slug()).collect();

        let started_at = Utc::now();
        let store = ProgressStore::new(self.state.clone(), ORGANIZATION_CHECKPOINT);
        let mut progress = self.load_progress(&store, options.resume).await?;
        let mut summary = RunSummary::new(
            self.run_id,
            PipelineKind::Organizations,
            options.dry_run,
            started_at,
        );
        info!(run_id = %self.run_id, organizations = selected.len(), dry_run = options.dry_run, "organization run starting");

        let mut records = Vec::new();
        for (organization, unit) in selected.iter().zip(&units) {
            if progress.is_completed(unit) {
                debug!(organization = %organization.name, "already completed; skipping");
                summary.resumed_skips += 1;
                continue;
            }
            progress.mark_in_progress(unit, Utc::now());
            self.checkpoint(&store, &progress, options.dry_run).await?;

            let mut counts = UnitCounts::default();
            match organizations::process_organization(self.api.as_ref(), organization, Utc::now()).await {
                Ok(record) => {
                    counts.processed = 1;
                    let published = match self.active_publisher(options.dry_run) {
                        Some(publisher) => publisher.publish(&record).await.map(|_| true),
                        None => Ok(false),
                    };
                    match published {
                        Ok(published) => {
                            if organizations::is_degraded(&record) {
                                counts.degraded = 1;
                            } else {
                                counts.succeeded = 1;
                            }
                            counts.published = published as u32;
                            progress.mark_completed(unit, counts, Utc::now());
                        }
                        Err(err) => {
                            error!(organization = %organization.name, error = %err, "publish failed");
                            counts.errored = 1;
                            summary.errors.push(EntityError {
                                unit: unit.clone(),
                                entity: organization.name.clone(),
                                message: err.to_string(),
                            });
                            progress.mark_failed(unit, counts, err.to_string(), Utc::now());
                        }
                    }
                    records.push(record);
                }
                Err(err) if err.is_rate_limit_exhausted() => {
                    error!(organization = %organization.name, error = %err, "rate limit exhausted; stopping run");
                    summary.rate_limit_hit = true;
                    progress.mark_rate_limited(unit, counts, Utc::now());
                    self.checkpoint(&store, &progress, options.dry_run).await?;
                    break;
                }
                Err(err) => {
                    error!(organization = %organization.name, error = %err, "organization failed");
                    counts.processed = 1;
                    counts.errored = 1;
                    summary.errors.push(EntityError {
                        unit: unit.clone(),
                        entity: organization.name.clone(),
                        message: err.to_string(),
                    });
                    progress.mark_failed(unit, counts, err.to_string(), Utc::now());
                }
            }
            summary.absorb(&counts);
            self.checkpoint(&store, &progress, options.dry_run).await?;
        }

        log_listing(&records);
        summary.complete = progress.covers(units.iter().map(String::as_str));

        // Registry-wide bookkeeping only makes sense for unfiltered runs.
        if let (Some(publisher), None) = (
            self.active_publisher(options.dry_run),
            options.organization.as_deref(),
        ) {
            if summary.complete {
                let keep: BTreeSet<String> = units.iter().cloned().collect();
                match remove_untracked_organizations(publisher, &keep).await {
                    Ok(deleted) => summary.deleted += deleted.len() as u32,
                    Err(err) => {
                        error!(error = %err, "stale organization cleanup failed");
                        summary.errored += 1;
                        summary.errors.push(EntityError {
                            unit: ORGANIZATION_PARTITION.to_string(),
                            entity: "stale cleanup".to_string(),
                            message: err.to_string(),
                        });
                    }
                }
            }

            let company_count = units.iter().filter(|u| progress.is_completed(u)).count();
            if company_count > 0 {
                if let Err(err) = publisher.record_organization_run(company_count).await {
                    error!(error = %err, "metadata update failed");
                    summary.errored += 1;
                    summary.errors.push(EntityError {
                        unit: ORGANIZATION_PARTITION.to_string(),
                        entity: "metadata".to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if summary.complete {
            progress.finished_at = Some(Utc::now());
        }
        self.checkpoint(&store, &progress, options.dry_run).await?;
        self.finish(summary, &progress).await
    }

    pub async fn run_candidates(&self, options: &RunOptions) -> Result<RunSummary, SyncError> {
        if !options.dry_run && self.publisher.is_none() {
            return Err(SyncError::PublisherMissing);
        }
        let units = candidate_units(options)?;

        let started_at = Utc::now();
        let store = ProgressStore::new(self.state.clone(), CANDIDATE_CHECKPOINT);
        let mut progress = self.load_progress(&store, options.resume).await?;
        let mut summary = RunSummary::new(
            self.run_id,
            PipelineKind::Candidates,
            options.dry_run,
            started_at,
        );
        info!(run_id = %self.run_id, units = units.len(), dry_run = options.dry_run, "candidate run starting");

        for unit in &units {
            if progress.is_completed(unit) {
                debug!(unit = %unit, "already completed; skipping");
                summary.resumed_skips += 1;
                continue;
            }
            progress.mark_in_progress(unit, Utc::now());
            self.checkpoint(&store, &progress, options.dry_run).await?;

            let (counts, stop) = self.process_candidate_unit(unit, &mut summary, &mut progress, options).await;
            summary.absorb(&counts);
            self.checkpoint(&store, &progress, options.dry_run).await?;
            if stop {
                summary.rate_limit_hit = true;
                break;
            }
        }

        summary.complete = progress.covers(units.iter().map(String::as_str));
        if summary.complete {
            progress.finished_at = Some(Utc::now());
            self.checkpoint(&store, &progress, options.dry_run).await?;
        }
        self.finish(summary, &progress).await
    }

    /// One jurisdiction: sweep, process, dedup, publish with stale cleanup.
    /// Returns the unit's counts and whether the run must stop.
    async fn process_candidate_unit(
        &self,
        unit: &str,
        summary: &mut RunSummary,
        progress: &mut RunProgress,
        options: &RunOptions,
    ) -> (UnitCounts, bool) {
        let mut counts = UnitCounts::default();
        let api = self.api.as_ref();
        let label = jurisdiction::display_name(unit);

        let found = match candidates::sweep_unit(api, unit).await {
            Ok(found) => found,
            Err(err) if err.is_rate_limit_exhausted() => {
                error!(unit, error = %err, "rate limit exhausted during sweep; stopping run");
                progress.mark_rate_limited(unit, counts, Utc::now());
                return (counts, true);
            }
            Err(err) => {
                error!(unit, error = %err, "sweep failed");
                counts.errored = 1;
                summary.errors.push(EntityError {
                    unit: unit.to_string(),
                    entity: label.to_string(),
                    message: err.to_string(),
                });
                progress.mark_failed(unit, counts, err.to_string(), Utc::now());
                return (counts, false);
            }
        };
        info!(unit, jurisdiction = label, candidates = found.len(), "processing jurisdiction");

        let mut records = Vec::new();
        let mut errored = BTreeSet::new();
        for candidate in &found {
            match candidates::process_candidate(api, candidate, unit).await {
                Ok(processed) => {
                    counts.processed += 1;
                    if processed.degraded {
                        counts.degraded += 1;
                    } else {
                        counts.succeeded += 1;
                    }
                    records.push(processed.record);
                }
                Err(err) if err.is_rate_limit_exhausted() => {
                    error!(unit, candidate_id = %candidate.candidate_id, error = %err, "rate limit exhausted; stopping run");
                    progress.mark_rate_limited(unit, counts, Utc::now());
                    return (counts, true);
                }
                Err(err) => {
                    warn!(unit, candidate_id = %candidate.candidate_id, error = %err, "candidate failed; keeping any published record");
                    counts.processed += 1;
                    counts.errored += 1;
                    errored.insert(normalize::slug(&candidate.candidate_id));
                    summary.errors.push(EntityError {
                        unit: unit.to_string(),
                        entity: candidate.candidate_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let outcome = self.dedup.apply(records);
        summary.dedup_review.extend(outcome.review);

        if let Some(publisher) = self.active_publisher(options.dry_run) {
            match publisher.publish_partition(unit, &outcome.kept, &errored).await {
                Ok(published) => {
                    counts.published = published.published.len() as u32;
                    counts.deleted = published.deleted.len() as u32;
                    if let Err(err) = publisher
                        .record_partition_count(unit, published.published.len())
                        .await
                    {
                        warn!(unit, error = %err, "candidate metadata update failed");
                    }
                }
                Err(err) => {
                    error!(unit, error = %err, "publishing jurisdiction failed");
                    counts.errored += 1;
                    summary.errors.push(EntityError {
                        unit: unit.to_string(),
                        entity: label.to_string(),
                        message: err.to_string(),
                    });
                    progress.mark_failed(unit, counts, err.to_string(), Utc::now());
                    return (counts, false);
                }
            }
        }

        progress.mark_completed(unit, counts, Utc::now());
        (counts, false)
    }
}

/// Drop published organizations that are no longer in the registry.
async fn remove_untracked_organizations(
    publisher: &Publisher,
    keep: &BTreeSet<String>,
) -> Result<Vec<String>, PublishError> {
    let prior = publisher
        .published_ids(ORGANIZATIONS_COLLECTION, ORGANIZATION_PARTITION)
        .await?;
    publisher
        .delete_stale(ORGANIZATIONS_COLLECTION, &prior, keep)
        .await
}

fn log_listing(records: &[pacscope_core::OrganizationRecord]) {
    let categorized: Vec<_> = records
        .iter()
        .filter(|r| r.category != Category::NoCommittee)
        .cloned()
        .collect();
    let stats = aggregate_stats(&categorized);
    info!(
        total = stats.overall.total,
        support = stats.overall.support,
        avoid = stats.overall.avoid,
        mixed = stats.overall.mixed,
        "category totals"
    );
    for (industry, counts) in &stats.by_industry {
        info!(
            industry = %industry,
            total = counts.total,
            support = counts.support,
            avoid = counts.avoid,
            mixed = counts.mixed,
            "industry breakdown"
        );
    }

    let mut sorted = categorized;
    sort_for_listing(&mut sorted);
    for record in sorted.iter().filter(|r| r.category == Category::Support).take(10) {
        info!(name = %record.name, percent_democrat = record.percent_democrat, total = record.total_democrat, "top support");
    }
    for record in sorted.iter().filter(|r| r.category == Category::Avoid).take(10) {
        info!(name = %record.name, percent_republican = record.percent_republican, total = record.total_republican, "top avoid");
    }
}

pub async fn run_organizations_from_env(options: &RunOptions) -> Result<RunSummary, SyncError> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::from_config(&config, options.dry_run)?;
    let registry = OrganizationRegistry::load(&config.organizations_path).await?;
    pipeline.run_organizations(&registry, options).await
}

pub async fn run_candidates_from_env(options: &RunOptions) -> Result<RunSummary, SyncError> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::from_config(&config, options.dry_run)?;
    pipeline.run_candidates(options).await
}

/// Best-effort refresh announcement. Returns whether it was delivered.
pub async fn send_refresh_notice(
    config: &SyncConfig,
    organizations: u32,
    candidates: u32,
) -> Result<bool, SyncError> {
    let Some(url) = config.notify_url.as_deref() else {
        warn!("PACSCOPE_NOTIFY_URL not set; notification skipped");
        return Ok(false);
    };
    let notifier = TopicNotifier::new(url, config.docstore_token.clone(), config.http_timeout())?;
    let notice = UpdateNotice::refreshed(organizations, candidates);
    Ok(notify_best_effort(&notifier, &notice).await)
}
