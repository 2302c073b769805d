//! Core domain model for the campaign-finance updater.
//!
//! Everything in this crate is pure: record types, the raw-transaction
//! tagged union produced at the API boundary, and the reducers that turn raw
//! transactions into published aggregates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod categorize;
pub mod jurisdiction;
pub mod normalize;

pub use aggregate::{
    aggregate_donors, classify_counterparty, tally_disbursements, DonorAggregator, DonorTotals,
    Party, PartyTotals,
};
pub use categorize::{categorize, category_for, Category, PartisanSplit};

pub const CRATE_NAME: &str = "pacscope-core";

/// Maximum number of donors kept on a published candidate record.
pub const TOP_DONOR_LIMIT: usize = 50;

/// Counterparty classification of a transaction.
///
/// Organizations go on the wire as `"pac"`, which is the label the consuming
/// client decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DonorType {
    #[serde(rename = "pac")]
    Organization,
    #[serde(rename = "individual")]
    Individual,
    #[serde(rename = "other")]
    Other,
}

impl DonorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonorType::Organization => "pac",
            DonorType::Individual => "individual",
            DonorType::Other => "other",
        }
    }

    fn unknown_name(&self) -> &'static str {
        match self {
            DonorType::Organization => "Unknown PAC",
            DonorType::Individual => "Unknown Individual",
            DonorType::Other => "Unknown",
        }
    }
}

/// Counterparty side of a raw transaction. Which fields exist depends on the
/// kind of counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Counterparty {
    Organization {
        name: String,
        committee_type: Option<String>,
    },
    Individual {
        name: String,
        employer: Option<String>,
        occupation: Option<String>,
    },
    Other {
        name: String,
        entity_type: String,
    },
}

impl Counterparty {
    /// Build a counterparty from the loosely-typed row fields, applying the
    /// classification precedence of [`classify_counterparty`].
    pub fn from_row(
        name: Option<&str>,
        committee_type: Option<&str>,
        entity_type: Option<&str>,
        employer: Option<&str>,
        occupation: Option<&str>,
    ) -> Self {
        let kind = classify_counterparty(committee_type, entity_type);
        let name = non_empty(name)
            .map(ToString::to_string)
            .unwrap_or_else(|| kind.unknown_name().to_string());
        match kind {
            DonorType::Organization => Counterparty::Organization {
                name,
                committee_type: non_empty(committee_type).map(ToString::to_string),
            },
            DonorType::Individual => Counterparty::Individual {
                name,
                employer: non_empty(employer).map(ToString::to_string),
                occupation: non_empty(occupation).map(ToString::to_string),
            },
            DonorType::Other => Counterparty::Other {
                name,
                entity_type: entity_type.unwrap_or_default().trim().to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Counterparty::Organization { name, .. }
            | Counterparty::Individual { name, .. }
            | Counterparty::Other { name, .. } => name,
        }
    }

    pub fn donor_type(&self) -> DonorType {
        match self {
            Counterparty::Organization { .. } => DonorType::Organization,
            Counterparty::Individual { .. } => DonorType::Individual,
            Counterparty::Other { .. } => DonorType::Other,
        }
    }

    pub fn employer(&self) -> Option<&str> {
        match self {
            Counterparty::Individual { employer, .. } => employer.as_deref(),
            _ => None,
        }
    }
}

/// A contribution received, as validated at the API boundary. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub counterparty: Counterparty,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub state: Option<String>,
    pub committee_id: Option<String>,
    pub candidate_id: Option<String>,
}

/// A disbursement made by an organization's committee to a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disbursement {
    pub recipient_name: Option<String>,
    pub candidate_id: Option<String>,
    pub amount: f64,
    pub date: Option<NaiveDate>,
}

/// Per-counterparty totals folded from raw transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorAggregate {
    /// Last-seen raw casing of the counterparty name.
    pub name: String,
    #[serde(rename = "type")]
    pub donor_type: DonorType,
    pub total_amount: f64,
    pub contribution_count: u32,
    pub employer: Option<String>,
    pub state: Option<String>,
    /// Trimmed upper-case name used as the aggregation key.
    #[serde(skip)]
    pub key_name: String,
}

/// Published candidate document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub candidate_id: String,
    pub slug: String,
    pub name: String,
    pub party: String,
    pub office: String,
    pub office_code: String,
    pub district: Option<String>,
    pub state: String,
    pub incumbent_challenger: Option<String>,
    pub incumbent: bool,
    pub total_raised: f64,
    pub total_from_pacs: f64,
    pub total_from_individuals: f64,
    pub donor_count: u32,
    pub top_donors: Vec<DonorAggregate>,
    pub committee_id: Option<String>,
    /// Stale-cleanup scope: a jurisdiction code or the presidential pseudo-jurisdiction.
    pub partition: String,
}

/// Published organization document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRecord {
    pub name: String,
    pub slug: String,
    pub industry: String,
    pub total_democrat: f64,
    pub total_republican: f64,
    pub total_other: f64,
    pub total_contributions: f64,
    pub percent_democrat: f64,
    pub percent_republican: f64,
    pub category: Category,
    pub fec_committee_ids: Vec<String>,
    pub has_pac: bool,
    pub rank: Option<u32>,
    pub disbursement_count: u32,
    pub last_updated: DateTime<Utc>,
    pub partition: String,
}

impl OrganizationRecord {
    /// Degraded record for an organization with no usable committee data.
    /// Percentages are reported as 0/0, never left undefined.
    pub fn without_data(
        name: &str,
        industry: &str,
        rank: Option<u32>,
        committee_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let split = PartisanSplit::no_committee();
        Self {
            name: name.to_string(),
            slug: normalize::slug(name),
            industry: industry.to_string(),
            total_democrat: 0.0,
            total_republican: 0.0,
            total_other: 0.0,
            total_contributions: 0.0,
            percent_democrat: split.percent_democrat,
            percent_republican: split.percent_republican,
            category: split.category,
            has_pac: !committee_ids.is_empty(),
            fec_committee_ids: committee_ids,
            rank,
            disbursement_count: 0,
            last_updated: now,
            partition: ORGANIZATION_PARTITION.to_string(),
        }
    }

    /// Categorized record from attributed party totals.
    pub fn from_totals(
        name: &str,
        industry: &str,
        rank: Option<u32>,
        committee_ids: Vec<String>,
        totals: &PartyTotals,
        disbursement_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let split = categorize(totals.democrat, totals.republican);
        Self {
            name: name.to_string(),
            slug: normalize::slug(name),
            industry: industry.to_string(),
            total_democrat: categorize::round_cents(totals.democrat),
            total_republican: categorize::round_cents(totals.republican),
            total_other: categorize::round_cents(totals.other),
            total_contributions: categorize::round_cents(totals.attributed()),
            percent_democrat: split.percent_democrat,
            percent_republican: split.percent_republican,
            category: split.category,
            has_pac: true,
            fec_committee_ids: committee_ids,
            rank,
            disbursement_count,
            last_updated: now,
            partition: ORGANIZATION_PARTITION.to_string(),
        }
    }
}

/// Single partition value shared by every tracked organization document.
pub const ORGANIZATION_PARTITION: &str = "tracked";

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
