//! Finance-records API contract and its HTTP implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use pacscope_core::{Disbursement, RawTransaction};
use pacscope_storage::FetchError;
use thiserror::Error;

pub mod openfec;
pub mod paginate;
pub mod rows;

pub use openfec::{OpenFecApi, QueryPlan};
pub use paginate::{Cursor, PageCaps, PageMode, PageRequest, PageWalker, UniqueCollector};
pub use rows::{CandidateSummary, CandidateTotals, CommitteeSummary};

pub const CRATE_NAME: &str = "pacscope-adapters";

/// Election cycles considered "recent" when choosing between committees.
pub const RECENT_CYCLES: &[u16] = &[2024, 2026];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid request url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("malformed {kind} row: {message}")]
    Malformed { kind: &'static str, message: String },
}

impl AdapterError {
    pub fn is_rate_limit_exhausted(&self) -> bool {
        matches!(self, AdapterError::Fetch(err) if err.is_rate_limit_exhausted())
    }
}

/// Office searched for in a candidate sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Office {
    House,
    Senate,
    President,
}

impl Office {
    pub fn code(&self) -> &'static str {
        match self {
            Office::House => "H",
            Office::Senate => "S",
            Office::President => "P",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub office: Office,
    pub state: Option<String>,
    pub district: Option<String>,
}

impl CandidateQuery {
    pub fn senate(state: &str) -> Self {
        Self {
            office: Office::Senate,
            state: Some(state.to_string()),
            district: None,
        }
    }

    pub fn house(state: &str, district: &str) -> Self {
        Self {
            office: Office::House,
            state: Some(state.to_string()),
            district: Some(district.to_string()),
        }
    }

    pub fn president() -> Self {
        Self {
            office: Office::President,
            state: None,
            district: None,
        }
    }
}

/// Calls the pipelines make against the finance-records registry. All
/// implementations share one rate budget; errors that exhaust it must come
/// back as [`AdapterError::Fetch`] so [`AdapterError::is_rate_limit_exhausted`]
/// sees them.
#[async_trait]
pub trait FinanceApi: Send + Sync {
    /// Active candidates over the configured cycles, unique by candidate id.
    async fn search_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateSummary>, AdapterError>;

    async fn principal_committee(&self, candidate_id: &str) -> Result<Option<CommitteeSummary>, AdapterError>;

    /// Totals for the most recent cycle on file.
    async fn candidate_totals(&self, candidate_id: &str) -> Result<Option<CandidateTotals>, AdapterError>;

    async fn search_committees(&self, term: &str) -> Result<Vec<CommitteeSummary>, AdapterError>;

    /// Contributions received by a committee, capped per the query plan.
    async fn contributions(&self, committee_id: &str) -> Result<Vec<RawTransaction>, AdapterError>;

    /// Disbursements from a committee to candidate committees.
    async fn disbursements(&self, committee_id: &str) -> Result<Vec<Disbursement>, AdapterError>;

    /// Party code per candidate id. Ids the registry does not return are absent.
    async fn candidate_parties(
        &self,
        candidate_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>, AdapterError>;
}

/// Pick the committee for a search term: a name match active in a recent
/// cycle, else any name match.
pub fn select_committee<'a>(term: &str, candidates: &'a [CommitteeSummary]) -> Option<&'a CommitteeSummary> {
    let needle = term.trim().to_uppercase();
    if needle.is_empty() {
        return None;
    }
    let matches = |c: &&CommitteeSummary| c.name.to_uppercase().contains(&needle);
    candidates
        .iter()
        .filter(matches)
        .find(|c| c.cycles.iter().any(|cycle| RECENT_CYCLES.contains(cycle)))
        .or_else(|| candidates.iter().find(matches))
}
