//! Candidate sweeps and per-candidate processing.

use pacscope_adapters::{
    AdapterError, CandidateQuery, CandidateSummary, CandidateTotals, CommitteeSummary, FinanceApi,
    UniqueCollector,
};
use pacscope_core::categorize::round_cents;
use pacscope_core::jurisdiction::{self, Jurisdiction, PRESIDENTIAL};
use pacscope_core::{
    aggregate_donors, normalize, CandidateRecord, DonorTotals, RawTransaction, TOP_DONOR_LIMIT,
};
use tracing::{debug, info, warn};

/// Senate search, then every House district, unique by candidate id.
pub async fn sweep_jurisdiction(
    api: &dyn FinanceApi,
    jurisdiction: &Jurisdiction,
) -> Result<Vec<CandidateSummary>, AdapterError> {
    let mut found = UniqueCollector::new();
    for candidate in api.search_candidates(&CandidateQuery::senate(jurisdiction.code)).await? {
        found.push(candidate.candidate_id.clone(), candidate);
    }
    for district in jurisdiction.districts() {
        let query = CandidateQuery::house(jurisdiction.code, &district);
        for candidate in api.search_candidates(&query).await? {
            found.push(candidate.candidate_id.clone(), candidate);
        }
    }
    info!(jurisdiction = jurisdiction.code, candidates = found.len(), "sweep complete");
    Ok(found.into_vec())
}

pub async fn sweep_presidential(api: &dyn FinanceApi) -> Result<Vec<CandidateSummary>, AdapterError> {
    let found = api.search_candidates(&CandidateQuery::president()).await?;
    info!(candidates = found.len(), "presidential sweep complete");
    Ok(found)
}

/// Sweep for a checkpoint unit: a jurisdiction code or the presidential key.
pub async fn sweep_unit(api: &dyn FinanceApi, unit: &str) -> Result<Vec<CandidateSummary>, AdapterError> {
    if unit == PRESIDENTIAL {
        return sweep_presidential(api).await;
    }
    match jurisdiction::find(unit) {
        Some(jurisdiction) => sweep_jurisdiction(api, jurisdiction).await,
        None => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCandidate {
    pub record: CandidateRecord,
    /// No committee or no contribution records, including lookups that failed.
    pub degraded: bool,
}

pub async fn process_candidate(
    api: &dyn FinanceApi,
    summary: &CandidateSummary,
    partition: &str,
) -> Result<ProcessedCandidate, AdapterError> {
    let id = summary.candidate_id.as_str();
    let committee = match api.principal_committee(id).await {
        Ok(committee) => committee,
        Err(err) if err.is_rate_limit_exhausted() => return Err(err),
        Err(err) => {
            warn!(candidate_id = id, error = %err, "committee lookup failed");
            None
        }
    };
    let Some(committee) = committee else {
        info!(candidate_id = id, name = summary.name.as_deref().unwrap_or("-"), "no principal committee");
        return Ok(ProcessedCandidate {
            record: build_record(summary, partition, None, None, &[]),
            degraded: true,
        });
    };

    let totals = match api.candidate_totals(id).await {
        Ok(totals) => totals,
        Err(err) if err.is_rate_limit_exhausted() => return Err(err),
        Err(err) => {
            warn!(candidate_id = id, error = %err, "totals unavailable; using contribution sum");
            None
        }
    };

    let contributions = match api.contributions(&committee.committee_id).await {
        Ok(contributions) => contributions,
        Err(err) if err.is_rate_limit_exhausted() => return Err(err),
        Err(err) => {
            warn!(candidate_id = id, error = %err, "contributions unavailable");
            Vec::new()
        }
    };
    debug!(candidate_id = id, records = contributions.len(), "contributions retrieved");
    let record = build_record(summary, partition, Some(&committee), totals.as_ref(), &contributions);
    Ok(ProcessedCandidate {
        degraded: contributions.is_empty(),
        record,
    })
}

/// Assemble the published record. Total raised is the registry's receipts
/// when positive, else the sum of aggregated contributions.
pub fn build_record(
    summary: &CandidateSummary,
    partition: &str,
    committee: Option<&CommitteeSummary>,
    totals: Option<&CandidateTotals>,
    contributions: &[RawTransaction],
) -> CandidateRecord {
    let office_code = summary.office.clone();
    let state = summary.state.clone().unwrap_or_default();
    let raw_name = summary
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Unknown");
    let key = if summary.candidate_id.trim().is_empty() {
        raw_name
    } else {
        summary.candidate_id.as_str()
    };

    let donors = aggregate_donors(contributions);
    let by_type = DonorTotals::from_aggregates(&donors);
    let reported = totals.and_then(|t| t.receipts).filter(|r| *r > 0.0);
    let total_raised = reported.unwrap_or_else(|| by_type.sum());

    let donor_count = donors.len() as u32;
    let top_donors = donors
        .into_iter()
        .take(TOP_DONOR_LIMIT)
        .map(|mut donor| {
            donor.total_amount = round_cents(donor.total_amount);
            donor
        })
        .collect();

    CandidateRecord {
        candidate_id: summary.candidate_id.clone(),
        slug: normalize::slug(key),
        name: normalize::format_candidate_name(raw_name),
        party: summary.party.clone().unwrap_or_else(|| "UNK".to_string()),
        office: jurisdiction::office_label(&office_code, &state, summary.district.as_deref()),
        district: jurisdiction::published_district(&office_code, summary.district.as_deref()),
        office_code,
        incumbent: summary.incumbent_challenge.as_deref() == Some("I"),
        incumbent_challenger: summary.incumbent_challenge.clone(),
        state,
        total_raised: round_cents(total_raised),
        total_from_pacs: round_cents(by_type.organizations),
        total_from_individuals: round_cents(by_type.individuals),
        donor_count,
        top_donors,
        committee_id: committee.map(|c| c.committee_id.clone()),
        partition: partition.to_string(),
    }
}
