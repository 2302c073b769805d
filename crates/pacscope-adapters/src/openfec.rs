//! [`FinanceApi`] over the OpenFEC REST API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pacscope_core::{Disbursement, RawTransaction};
use pacscope_storage::RateLimitedClient;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::paginate::{PageCaps, PageMode, PageWalker, UniqueCollector};
use crate::rows::{self, Keyed, Page};
use crate::{AdapterError, CandidateQuery, CandidateSummary, CandidateTotals, CommitteeSummary, FinanceApi};

const PER_PAGE: &str = "100";

/// Cycles and caps for every walk the adapter performs.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub candidate_cycles: Vec<u16>,
    pub contribution_cycles: Vec<u16>,
    /// Applied per cycle.
    pub contribution_pages_per_cycle: usize,
    /// Applied across all cycles of one committee.
    pub contribution_record_limit: usize,
    pub disbursement_cycles: Vec<u16>,
    /// Applied per cycle, counting kept rows.
    pub disbursement_record_limit: usize,
    /// Applied per cycle, counting every page fetched. Bounds walks whose
    /// rows are all filtered out.
    pub disbursement_pages_per_cycle: usize,
    pub committee_types: Vec<String>,
    pub committee_search_page_size: u32,
    pub party_batch_size: usize,
}

impl Default for QueryPlan {
    fn default() -> Self {
        Self {
            candidate_cycles: vec![2024, 2026],
            contribution_cycles: vec![2024, 2026],
            contribution_pages_per_cycle: 5,
            contribution_record_limit: 500,
            disbursement_cycles: vec![2024, 2026, 2022],
            disbursement_record_limit: 10_000,
            disbursement_pages_per_cycle: 500,
            committee_types: vec!["N".into(), "Q".into(), "O".into()],
            committee_search_page_size: 20,
            party_batch_size: 100,
        }
    }
}

pub struct OpenFecApi {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    plan: QueryPlan,
}

impl OpenFecApi {
    pub fn new(client: Arc<RateLimitedClient>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            plan: QueryPlan::default(),
        }
    }

    pub fn with_plan(mut self, plan: QueryPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url, AdapterError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|err| AdapterError::InvalidUrl {
            url: raw.clone(),
            message: err.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api_key", &self.api_key);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn fetch_page(&self, url: &Url) -> Result<Page, AdapterError> {
        Ok(self.client.fetch_json::<Page>(url).await?)
    }

    /// First row of a single-page lookup.
    async fn first_row(&self, url: &Url) -> Result<Option<serde_json::Value>, AdapterError> {
        let page = self.fetch_page(url).await?;
        Ok(page.results.into_iter().next())
    }

    async fn search_cycle(
        &self,
        query: &CandidateQuery,
        cycle: u16,
        found: &mut UniqueCollector<String, CandidateSummary>,
    ) -> Result<(), AdapterError> {
        let mut params = vec![
            ("office", query.office.code().to_string()),
            ("cycle", cycle.to_string()),
            ("is_active_candidate", "true".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("sort", "name".to_string()),
        ];
        if let Some(state) = &query.state {
            params.push(("state", state.clone()));
        }
        if let Some(district) = &query.district {
            params.push(("district", district.clone()));
        }
        let base = self.endpoint("candidates/search/", &params)?;

        let mut walker = PageWalker::new(PageMode::Numbered, PageCaps::unlimited());
        while let Some(request) = walker.next_request().cloned() {
            let mut url = base.clone();
            request.apply(&mut url);
            let page = self.fetch_page(&url).await?;
            let received = page.results.len();
            let (candidates, _) =
                rows::validate_rows("candidate", page.results, |v| rows::candidate_from_value(v).map(Some));
            let mut kept = 0;
            for candidate in candidates {
                if found.push(candidate.candidate_id.clone(), candidate) {
                    kept += 1;
                }
            }
            walker.record_page(received, kept, &page.pagination);
        }
        Ok(())
    }

    async fn contributions_for_cycle(
        &self,
        committee_id: &str,
        cycle: u16,
        record_limit: usize,
        out: &mut UniqueCollector<String, RawTransaction>,
    ) -> Result<usize, AdapterError> {
        let base = self.endpoint(
            "schedules/schedule_a/",
            &[
                ("committee_id", committee_id.to_string()),
                ("two_year_transaction_period", cycle.to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("sort", "-contribution_receipt_amount".to_string()),
            ],
        )?;
        let caps = PageCaps::pages(self.plan.contribution_pages_per_cycle).with_records(record_limit);
        let mut walker = PageWalker::new(PageMode::Cursor, caps);
        while let Some(request) = walker.next_request().cloned() {
            let mut url = base.clone();
            request.apply(&mut url);
            let page = self.fetch_page(&url).await?;
            let received = page.results.len();
            let (records, rejected) = rows::validate_rows("contribution", page.results, |v| {
                rows::contribution_from_value(v).map(Some)
            });
            if rejected > 0 {
                debug!(committee_id, cycle, rejected, "dropped malformed contribution rows");
            }
            let room = walker.remaining_records().unwrap_or(usize::MAX);
            let mut kept = 0;
            for Keyed { sub_id, record } in records {
                if kept >= room {
                    break;
                }
                if out.push_optional(sub_id, record) {
                    kept += 1;
                }
            }
            walker.record_page(received, kept, &page.pagination);
        }
        Ok(walker.records())
    }

    async fn disbursements_for_cycle(
        &self,
        committee_id: &str,
        cycle: u16,
        out: &mut UniqueCollector<String, Disbursement>,
    ) -> Result<usize, AdapterError> {
        let base = self.endpoint(
            "schedules/schedule_b/",
            &[
                ("committee_id", committee_id.to_string()),
                ("two_year_transaction_period", cycle.to_string()),
                ("per_page", PER_PAGE.to_string()),
            ],
        )?;
        let caps = PageCaps::pages(self.plan.disbursement_pages_per_cycle)
            .with_records(self.plan.disbursement_record_limit);
        let mut walker = PageWalker::new(PageMode::Cursor, caps);
        while let Some(request) = walker.next_request().cloned() {
            let mut url = base.clone();
            request.apply(&mut url);
            let page = self.fetch_page(&url).await?;
            let received = page.results.len();
            let (records, _) =
                rows::validate_rows("disbursement", page.results, rows::disbursement_from_value);
            let mut kept = 0;
            for Keyed { sub_id, record } in records {
                if out.push_optional(sub_id, record) {
                    kept += 1;
                }
            }
            walker.record_page(received, kept, &page.pagination);
        }
        Ok(walker.records())
    }
}

#[async_trait]
impl FinanceApi for OpenFecApi {
    async fn search_candidates(&self, query: &CandidateQuery) -> Result<Vec<CandidateSummary>, AdapterError> {
        let mut found = UniqueCollector::new();
        for &cycle in &self.plan.candidate_cycles {
            self.search_cycle(query, cycle, &mut found).await?;
        }
        debug!(
            office = query.office.code(),
            state = query.state.as_deref().unwrap_or("-"),
            district = query.district.as_deref().unwrap_or("-"),
            found = found.len(),
            "candidate search complete"
        );
        Ok(found.into_vec())
    }

    async fn principal_committee(&self, candidate_id: &str) -> Result<Option<CommitteeSummary>, AdapterError> {
        let url = self.endpoint(
            &format!("candidate/{candidate_id}/committees/"),
            &[("designation", "P".to_string()), ("per_page", "5".to_string())],
        )?;
        self.first_row(&url)
            .await?
            .map(rows::committee_from_value)
            .transpose()
    }

    async fn candidate_totals(&self, candidate_id: &str) -> Result<Option<CandidateTotals>, AdapterError> {
        let url = self.endpoint(
            &format!("candidate/{candidate_id}/totals/"),
            &[("per_page", "5".to_string()), ("sort", "-cycle".to_string())],
        )?;
        self.first_row(&url)
            .await?
            .map(rows::totals_from_value)
            .transpose()
    }

    async fn search_committees(&self, term: &str) -> Result<Vec<CommitteeSummary>, AdapterError> {
        let mut params = vec![("q", term.to_string())];
        params.extend(
            self.plan
                .committee_types
                .iter()
                .map(|t| ("committee_type", t.clone())),
        );
        params.push(("per_page", self.plan.committee_search_page_size.to_string()));
        let url = self.endpoint("committees/", &params)?;
        let page = self.fetch_page(&url).await?;
        let (committees, _) =
            rows::validate_rows("committee", page.results, |v| rows::committee_from_value(v).map(Some));
        Ok(committees)
    }

    async fn contributions(&self, committee_id: &str) -> Result<Vec<RawTransaction>, AdapterError> {
        let mut out = UniqueCollector::new();
        for &cycle in &self.plan.contribution_cycles {
            let remaining = self.plan.contribution_record_limit.saturating_sub(out.len());
            if remaining == 0 {
                break;
            }
            self.contributions_for_cycle(committee_id, cycle, remaining, &mut out)
                .await?;
        }
        info!(committee_id, records = out.len(), "retrieved contribution records");
        Ok(out.into_vec())
    }

    async fn disbursements(&self, committee_id: &str) -> Result<Vec<Disbursement>, AdapterError> {
        let mut out = UniqueCollector::new();
        for &cycle in &self.plan.disbursement_cycles {
            // A failed cycle keeps the rows already collected.
            match self.disbursements_for_cycle(committee_id, cycle, &mut out).await {
                Ok(0) => {}
                Ok(kept) => info!(committee_id, cycle, kept, "candidate contributions in cycle"),
                Err(err) if err.is_rate_limit_exhausted() => return Err(err),
                Err(err) => {
                    warn!(committee_id, cycle, error = %err, "disbursement cycle failed; keeping partial rows");
                }
            }
        }
        info!(committee_id, total = out.len(), "disbursements retrieved");
        Ok(out.into_vec())
    }

    async fn candidate_parties(
        &self,
        candidate_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>, AdapterError> {
        let mut parties = HashMap::new();
        for batch in candidate_ids.chunks(self.plan.party_batch_size.max(1)) {
            let mut params: Vec<(&str, String)> =
                batch.iter().map(|id| ("candidate_id", id.clone())).collect();
            params.push(("per_page", PER_PAGE.to_string()));
            let base = self.endpoint("candidates/", &params)?;

            let mut walker = PageWalker::new(PageMode::Numbered, PageCaps::unlimited());
            while let Some(request) = walker.next_request().cloned() {
                let mut url = base.clone();
                request.apply(&mut url);
                let page = self.fetch_page(&url).await?;
                let received = page.results.len();
                let (candidates, _) = rows::validate_rows("candidate", page.results, |v| {
                    rows::candidate_from_value(v).map(Some)
                });
                for candidate in &candidates {
                    parties.insert(candidate.candidate_id.clone(), candidate.party.clone());
                }
                walker.record_page(received, candidates.len(), &page.pagination);
            }
        }
        Ok(parties)
    }
}
