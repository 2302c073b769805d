//! Per-organization processing: committee lookup, disbursements, categorization.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pacscope_adapters::{select_committee, AdapterError, CommitteeSummary, FinanceApi};
use pacscope_core::{tally_disbursements, Category, OrganizationRecord};
use tracing::{info, warn};

use crate::registry::TrackedOrganization;

/// Search each term in turn. Rate-limit exhaustion propagates; other search
/// failures move on to the next term. Falls back to the registry's known
/// committee id.
pub async fn find_committee(
    api: &dyn FinanceApi,
    organization: &TrackedOrganization,
) -> Result<Option<CommitteeSummary>, AdapterError> {
    for term in organization.terms() {
        match api.search_committees(term).await {
            Ok(results) => {
                if let Some(found) = select_committee(term, &results) {
                    return Ok(Some(found.clone()));
                }
            }
            Err(err) if err.is_rate_limit_exhausted() => return Err(err),
            Err(err) => {
                warn!(organization = %organization.name, term, error = %err, "committee search failed");
            }
        }
    }

    Ok(organization
        .committee_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            info!(organization = %organization.name, committee_id = id, "using registry committee id");
            CommitteeSummary {
                committee_id: id.to_string(),
                name: organization.name.clone(),
                cycles: Vec::new(),
                committee_type: None,
                designation: None,
            }
        }))
}

pub async fn process_organization(
    api: &dyn FinanceApi,
    organization: &TrackedOrganization,
    now: DateTime<Utc>,
) -> Result<OrganizationRecord, AdapterError> {
    let name = organization.name.as_str();
    let industry = organization.industry.as_str();

    let Some(committee) = find_committee(api, organization).await? else {
        info!(organization = name, "no committee found");
        return Ok(OrganizationRecord::without_data(
            name,
            industry,
            organization.rank,
            Vec::new(),
            now,
        ));
    };
    info!(
        organization = name,
        committee = %committee.name,
        committee_id = %committee.committee_id,
        "found committee"
    );
    let committee_ids = vec![committee.committee_id.clone()];

    let disbursements = match api.disbursements(&committee.committee_id).await {
        Ok(disbursements) => disbursements,
        Err(err) if err.is_rate_limit_exhausted() => return Err(err),
        Err(err) => {
            warn!(organization = name, error = %err, "disbursements unavailable");
            Vec::new()
        }
    };
    if disbursements.is_empty() {
        info!(organization = name, "no candidate disbursements");
        return Ok(OrganizationRecord::without_data(
            name,
            industry,
            organization.rank,
            committee_ids,
            now,
        ));
    }

    let mut candidate_ids: Vec<String> = disbursements
        .iter()
        .filter_map(|d| d.candidate_id.clone())
        .collect();
    candidate_ids.sort();
    candidate_ids.dedup();

    let parties = if candidate_ids.is_empty() {
        HashMap::new()
    } else {
        match api.candidate_parties(&candidate_ids).await {
            Ok(parties) => parties,
            Err(err) if err.is_rate_limit_exhausted() => return Err(err),
            Err(err) => {
                warn!(organization = name, error = %err, "party lookup failed; using recipient names");
                HashMap::new()
            }
        }
    };

    let totals = tally_disbursements(&disbursements, &parties);
    let record = OrganizationRecord::from_totals(
        name,
        industry,
        organization.rank,
        committee_ids,
        &totals,
        disbursements.len() as u32,
        now,
    );
    info!(
        organization = name,
        category = record.category.as_str(),
        percent_democrat = record.percent_democrat,
        percent_republican = record.percent_republican,
        total = record.total_contributions,
        "categorized"
    );
    Ok(record)
}

/// A no-committee record counts as degraded rather than succeeded.
pub fn is_degraded(record: &OrganizationRecord) -> bool {
    record.category == Category::NoCommittee
}
