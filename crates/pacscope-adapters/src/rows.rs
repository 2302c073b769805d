//! Response rows as the finance API sends them, and their validation into
//! typed records. Nothing loosely-typed leaves this module.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use pacscope_core::{Counterparty, Disbursement, RawTransaction};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::AdapterError;

/// One page of any list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub results: Vec<JsonValue>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub last_indexes: Option<BTreeMap<String, JsonValue>>,
}

/// Numbers arrive as JSON numbers or numeric strings.
fn de_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateRow {
    candidate_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    party: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    office: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    state: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    district: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    incumbent_challenge: Option<String>,
}

/// A candidate as discovered by a registry search.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSummary {
    pub candidate_id: String,
    pub name: Option<String>,
    pub party: Option<String>,
    pub office: String,
    pub state: Option<String>,
    pub district: Option<String>,
    pub incumbent_challenge: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommitteeRow {
    committee_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    name: Option<String>,
    #[serde(default)]
    cycles: Vec<u16>,
    #[serde(default, deserialize_with = "de_opt_string")]
    committee_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    designation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitteeSummary {
    pub committee_id: String,
    pub name: String,
    pub cycles: Vec<u16>,
    pub committee_type: Option<String>,
    pub designation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TotalsRow {
    #[serde(default, deserialize_with = "de_amount")]
    receipts: Option<f64>,
    #[serde(default)]
    cycle: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateTotals {
    pub receipts: Option<f64>,
    pub cycle: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScheduleARow {
    #[serde(default, deserialize_with = "de_opt_string")]
    sub_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    contributor_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    contributor_committee_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    entity_type: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    contribution_receipt_amount: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    contribution_receipt_date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    contributor_employer: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    contributor_occupation: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    contributor_state: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    committee_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    candidate_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScheduleBRow {
    #[serde(default, deserialize_with = "de_opt_string")]
    sub_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    recipient_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    recipient_committee_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    disbursement_description: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    disbursement_amount: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    disbursement_date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    candidate_id: Option<String>,
}

/// A validated row plus the registry's unique transaction id, when it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyed<T> {
    pub sub_id: Option<String>,
    pub record: T,
}

fn malformed(kind: &'static str, message: impl Into<String>) -> AdapterError {
    AdapterError::Malformed {
        kind,
        message: message.into(),
    }
}

fn decode<R: DeserializeOwned>(kind: &'static str, value: JsonValue) -> Result<R, AdapterError> {
    serde_json::from_value(value).map_err(|err| malformed(kind, err.to_string()))
}

pub fn candidate_from_value(value: JsonValue) -> Result<CandidateSummary, AdapterError> {
    let row: CandidateRow = decode("candidate", value)?;
    Ok(CandidateSummary {
        candidate_id: row.candidate_id,
        name: row.name,
        party: row.party,
        office: row.office.unwrap_or_default(),
        state: row.state,
        district: row.district,
        incumbent_challenge: row.incumbent_challenge,
    })
}

pub fn committee_from_value(value: JsonValue) -> Result<CommitteeSummary, AdapterError> {
    let row: CommitteeRow = decode("committee", value)?;
    Ok(CommitteeSummary {
        committee_id: row.committee_id,
        name: row.name.unwrap_or_default(),
        cycles: row.cycles,
        committee_type: row.committee_type,
        designation: row.designation,
    })
}

pub fn totals_from_value(value: JsonValue) -> Result<CandidateTotals, AdapterError> {
    let row: TotalsRow = decode("totals", value)?;
    Ok(CandidateTotals {
        receipts: row.receipts,
        cycle: row.cycle,
    })
}

/// Schedule A row into a raw transaction. A row without a usable amount is malformed.
pub fn contribution_from_value(value: JsonValue) -> Result<Keyed<RawTransaction>, AdapterError> {
    let row: ScheduleARow = decode("contribution", value)?;
    let amount = row
        .contribution_receipt_amount
        .filter(|a| a.is_finite())
        .ok_or_else(|| malformed("contribution", "missing contribution_receipt_amount"))?;
    let counterparty = Counterparty::from_row(
        row.contributor_name.as_deref(),
        row.contributor_committee_type.as_deref(),
        row.entity_type.as_deref(),
        row.contributor_employer.as_deref(),
        row.contributor_occupation.as_deref(),
    );
    Ok(Keyed {
        sub_id: row.sub_id,
        record: RawTransaction {
            counterparty,
            amount,
            date: parse_date(row.contribution_receipt_date.as_deref()),
            state: row.contributor_state,
            committee_id: row.committee_id,
            candidate_id: row.candidate_id,
        },
    })
}

/// Schedule B row into a disbursement, or `None` when it is not a
/// contribution to a candidate committee.
pub fn disbursement_from_value(value: JsonValue) -> Result<Option<Keyed<Disbursement>>, AdapterError> {
    let row: ScheduleBRow = decode("disbursement", value)?;
    if !is_candidate_contribution(
        row.recipient_committee_type.as_deref(),
        row.disbursement_description.as_deref(),
    ) {
        return Ok(None);
    }
    let amount = row
        .disbursement_amount
        .filter(|a| a.is_finite())
        .ok_or_else(|| malformed("disbursement", "missing disbursement_amount"))?;
    Ok(Some(Keyed {
        sub_id: row.sub_id,
        record: Disbursement {
            recipient_name: row.recipient_name,
            candidate_id: row.candidate_id,
            amount,
            date: parse_date(row.disbursement_date.as_deref()),
        },
    }))
}

pub fn is_candidate_contribution(recipient_committee_type: Option<&str>, description: Option<&str>) -> bool {
    if matches!(recipient_committee_type.map(str::trim), Some("H" | "S" | "P")) {
        return true;
    }
    let description = description.unwrap_or_default().to_uppercase();
    description.contains("CONTRIBUTION") || description.contains("CANDIDATE")
}

/// Validate each row, logging and dropping the malformed ones.
pub fn validate_rows<T>(
    kind: &'static str,
    values: Vec<JsonValue>,
    mut convert: impl FnMut(JsonValue) -> Result<Option<T>, AdapterError>,
) -> (Vec<T>, usize) {
    let mut out = Vec::with_capacity(values.len());
    let mut rejected = 0usize;
    for value in values {
        match convert(value) {
            Ok(Some(item)) => out.push(item),
            Ok(None) => {}
            Err(err) => {
                rejected += 1;
                warn!(kind, error = %err, "skipping malformed row");
            }
        }
    }
    (out, rejected)
}
