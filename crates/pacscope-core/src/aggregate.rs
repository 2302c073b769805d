//! Reducers from raw transactions to per-entity totals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{non_empty, DonorAggregate, DonorType, Disbursement, RawTransaction};

const ORGANIZATION_ENTITY_CODES: &[&str] = &["COM", "PAC", "ORG"];
const INDIVIDUAL_ENTITY_CODE: &str = "IND";

/// Counterparty precedence: an explicit committee-type marker wins, then an
/// organization/committee entity code, then individual (or no entity code at
/// all), then everything else.
pub fn classify_counterparty(committee_type: Option<&str>, entity_type: Option<&str>) -> DonorType {
    if non_empty(committee_type).is_some() {
        return DonorType::Organization;
    }
    match non_empty(entity_type) {
        Some(code) if ORGANIZATION_ENTITY_CODES.iter().any(|c| code.eq_ignore_ascii_case(c)) => {
            DonorType::Organization
        }
        Some(code) if code.eq_ignore_ascii_case(INDIVIDUAL_ENTITY_CODE) => DonorType::Individual,
        None => DonorType::Individual,
        Some(_) => DonorType::Other,
    }
}

/// Folds transactions into aggregates keyed by `(type, normalized name)`.
///
/// Totals and counts are order-independent. Employer and state are
/// last-write-wins, so they can differ with input order.
#[derive(Debug, Default)]
pub struct DonorAggregator {
    index: HashMap<(DonorType, String), usize>,
    entries: Vec<DonorAggregate>,
    skipped: usize,
}

impl DonorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the record was excluded (non-positive or non-finite amount).
    pub fn fold(&mut self, record: &RawTransaction) -> bool {
        let amount = record.amount;
        if !(amount > 0.0) || !amount.is_finite() {
            self.skipped += 1;
            return false;
        }

        let donor_type = record.counterparty.donor_type();
        let display = record.counterparty.name().trim().to_string();
        let key_name = display.to_uppercase();
        let employer = record.counterparty.employer().map(ToString::to_string);
        let state = non_empty(record.state.as_deref()).map(ToString::to_string);

        match self.index.get(&(donor_type, key_name.clone())) {
            Some(&position) => {
                let entry = &mut self.entries[position];
                entry.total_amount += amount;
                entry.contribution_count += 1;
                entry.name = display;
                if employer.is_some() {
                    entry.employer = employer;
                }
                if state.is_some() {
                    entry.state = state;
                }
            }
            None => {
                self.index
                    .insert((donor_type, key_name.clone()), self.entries.len());
                self.entries.push(DonorAggregate {
                    name: display,
                    donor_type,
                    total_amount: amount,
                    contribution_count: 1,
                    employer,
                    state,
                    key_name,
                });
            }
        }
        true
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Aggregates by descending total; ties keep encounter order.
    pub fn finish(self) -> Vec<DonorAggregate> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));
        entries
    }
}

pub fn aggregate_donors<'a>(records: impl IntoIterator<Item = &'a RawTransaction>) -> Vec<DonorAggregate> {
    let mut aggregator = DonorAggregator::new();
    for record in records {
        aggregator.fold(record);
    }
    aggregator.finish()
}

/// Sums of aggregates by counterparty type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DonorTotals {
    pub organizations: f64,
    pub individuals: f64,
    pub other: f64,
}

impl DonorTotals {
    pub fn from_aggregates(aggregates: &[DonorAggregate]) -> Self {
        aggregates.iter().fold(Self::default(), |mut acc, donor| {
            match donor.donor_type {
                DonorType::Organization => acc.organizations += donor.total_amount,
                DonorType::Individual => acc.individuals += donor.total_amount,
                DonorType::Other => acc.other += donor.total_amount,
            }
            acc
        })
    }

    pub fn sum(&self) -> f64 {
        self.organizations + self.individuals + self.other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Democratic,
    Republican,
    Other,
}

impl Party {
    pub fn from_code(code: Option<&str>) -> Self {
        match non_empty(code) {
            Some(code) if code.eq_ignore_ascii_case("DEM") => Party::Democratic,
            Some(code) if code.eq_ignore_ascii_case("REP") => Party::Republican,
            _ => Party::Other,
        }
    }

    /// Party markers embedded in a recipient committee name.
    pub fn from_recipient_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        if upper.contains("(D)") || upper.contains("DEM") {
            Some(Party::Democratic)
        } else if upper.contains("(R)") || upper.contains("REP") {
            Some(Party::Republican)
        } else {
            None
        }
    }
}

/// Disbursement totals split by recipient party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyTotals {
    pub democrat: f64,
    pub republican: f64,
    pub other: f64,
}

impl PartyTotals {
    pub fn add(&mut self, party: Party, amount: f64) {
        match party {
            Party::Democratic => self.democrat += amount,
            Party::Republican => self.republican += amount,
            Party::Other => self.other += amount,
        }
    }

    /// Denominator of the partisan split. The other bucket is excluded.
    pub fn attributed(&self) -> f64 {
        self.democrat + self.republican
    }
}

/// Attribute each disbursement to a party: the resolved recipient candidate's
/// party first, then markers in the recipient name, else the other bucket.
/// Non-positive amounts count as zero.
pub fn tally_disbursements(
    disbursements: &[Disbursement],
    candidate_parties: &HashMap<String, Option<String>>,
) -> PartyTotals {
    let mut totals = PartyTotals::default();
    for disbursement in disbursements {
        let amount = if disbursement.amount.is_finite() {
            disbursement.amount.max(0.0)
        } else {
            0.0
        };

        let resolved = disbursement
            .candidate_id
            .as_deref()
            .and_then(|id| candidate_parties.get(id))
            .and_then(|party| party.as_deref())
            .map(|code| Party::from_code(Some(code)))
            .filter(|party| *party != Party::Other);

        let party = resolved
            .or_else(|| {
                disbursement
                    .recipient_name
                    .as_deref()
                    .and_then(Party::from_recipient_name)
            })
            .unwrap_or(Party::Other);
        totals.add(party, amount);
    }
    totals
}
