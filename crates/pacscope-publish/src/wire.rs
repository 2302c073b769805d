//! Document-store value encoding.
//!
//! Records are serialized with serde first and then tagged field by field.
//! The consuming client decodes numbers strictly by kind, so which fields are
//! floating point is decided here, by name, and nowhere else.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::PublishError;

/// Monetary totals and percentages. Always written as doubles, even when the
/// value is whole.
pub const DOUBLE_FIELDS: &[&str] = &[
    "totalDemocrat",
    "totalRepublican",
    "totalOther",
    "totalContributions",
    "percentDemocrat",
    "percentRepublican",
    "totalRaised",
    "totalFromPacs",
    "totalFromIndividuals",
    "totalAmount",
];

pub const TIMESTAMP_FIELDS: &[&str] = &["lastUpdated"];

pub type Fields = BTreeMap<String, WireValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    /// RFC 3339 text.
    Timestamp(String),
    Array(Vec<WireValue>),
    Map(Fields),
}

impl WireValue {
    /// REST representation, e.g. `{"doubleValue": 1000.0}`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            WireValue::Null => json!({ "nullValue": null }),
            WireValue::Boolean(b) => json!({ "booleanValue": b }),
            // 64-bit integers travel as strings.
            WireValue::Integer(i) => json!({ "integerValue": i.to_string() }),
            WireValue::Double(d) => json!({ "doubleValue": d }),
            WireValue::String(s) => json!({ "stringValue": s }),
            WireValue::Timestamp(t) => json!({ "timestampValue": t }),
            WireValue::Array(values) => {
                let values: Vec<JsonValue> = values.iter().map(WireValue::to_json).collect();
                json!({ "arrayValue": { "values": values } })
            }
            WireValue::Map(fields) => json!({ "mapValue": { "fields": fields_to_json(fields) } }),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) | WireValue::Timestamp(s) => Some(s),
            _ => None,
        }
    }
}

pub fn fields_to_json(fields: &Fields) -> JsonValue {
    let map: Map<String, JsonValue> = fields
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    JsonValue::Object(map)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Double,
    Timestamp,
}

/// Field name to numeric/temporal kind. Fields not listed get the default
/// rule: whole numbers become integers, everything else doubles.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    kinds: BTreeMap<String, FieldKind>,
}

impl Default for FieldSchema {
    fn default() -> Self {
        let mut schema = Self::empty();
        for field in DOUBLE_FIELDS {
            schema = schema.with(field, FieldKind::Double);
        }
        for field in TIMESTAMP_FIELDS {
            schema = schema.with(field, FieldKind::Timestamp);
        }
        schema
    }
}

impl FieldSchema {
    pub fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, kind: FieldKind) -> Self {
        self.kinds.insert(field.to_string(), kind);
        self
    }

    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.kinds.get(field).copied()
    }

    /// Encode a record into top-level document fields. The record must
    /// serialize to a JSON object.
    pub fn encode<T: Serialize + ?Sized>(&self, record: &T) -> Result<Fields, PublishError> {
        let value = serde_json::to_value(record).map_err(|err| PublishError::Encode(err.to_string()))?;
        match value {
            JsonValue::Object(map) => Ok(self.encode_map(&map)),
            other => Err(PublishError::Encode(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn encode_map(&self, map: &Map<String, JsonValue>) -> Fields {
        map.iter()
            .filter_map(|(key, value)| {
                self.encode_value(Some(key), value)
                    .map(|encoded| (key.clone(), encoded))
            })
            .collect()
    }

    /// Returns `None` for values that are omitted from the document (empty
    /// lists).
    pub fn encode_value(&self, field: Option<&str>, value: &JsonValue) -> Option<WireValue> {
        let kind = field.and_then(|f| self.kind_of(f));
        let encoded = match value {
            JsonValue::Null => WireValue::Null,
            JsonValue::Bool(b) => WireValue::Boolean(*b),
            JsonValue::Number(n) => match kind {
                Some(FieldKind::Double) => WireValue::Double(n.as_f64().unwrap_or_default()),
                _ => whole_number(n)
                    .map(WireValue::Integer)
                    .unwrap_or_else(|| WireValue::Double(n.as_f64().unwrap_or_default())),
            },
            JsonValue::String(s) => match kind {
                Some(FieldKind::Timestamp) => WireValue::Timestamp(s.clone()),
                _ => WireValue::String(s.clone()),
            },
            JsonValue::Array(items) if items.is_empty() => return None,
            // Elements are tagged by value alone.
            JsonValue::Array(items) => WireValue::Array(
                items
                    .iter()
                    .filter_map(|item| self.encode_value(None, item))
                    .collect(),
            ),
            JsonValue::Object(map) => WireValue::Map(self.encode_map(map)),
        };
        Some(encoded)
    }
}

fn whole_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if n.is_u64() {
        return None;
    }
    let f = n.as_f64()?;
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pacscope_core::{
        CandidateRecord, DonorAggregate, DonorType, OrganizationRecord, PartyTotals,
    };

    fn organization() -> OrganizationRecord {
        let totals = PartyTotals {
            democrat: 1000.0,
            republican: 0.0,
            other: 25.0,
        };
        OrganizationRecord::from_totals(
            "Acme Inc",
            "Tech",
            Some(3),
            vec!["C00000001".to_string()],
            &totals,
            4,
            Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).single().expect("time"),
        )
    }

    #[test]
    fn monetary_fields_are_doubles_even_when_whole() {
        let fields = FieldSchema::default().encode(&organization()).expect("encode");
        assert_eq!(fields["totalDemocrat"], WireValue::Double(1000.0));
        assert_eq!(fields["totalRepublican"], WireValue::Double(0.0));
        assert_eq!(fields["percentDemocrat"], WireValue::Double(100.0));
        assert_eq!(
            fields["totalDemocrat"].to_json(),
            json!({ "doubleValue": 1000.0 })
        );
    }

    #[test]
    fn ranks_and_counts_are_integers() {
        let fields = FieldSchema::default().encode(&organization()).expect("encode");
        assert_eq!(fields["rank"], WireValue::Integer(3));
        assert_eq!(fields["disbursementCount"], WireValue::Integer(4));
        assert_eq!(fields["rank"].to_json(), json!({ "integerValue": "3" }));
        assert!(matches!(fields["lastUpdated"], WireValue::Timestamp(ref t) if t.starts_with("2026-10-01T12:00:00")));
        assert_eq!(fields["hasPac"], WireValue::Boolean(true));
    }

    #[test]
    fn whole_floats_outside_the_schema_become_integers() {
        let schema = FieldSchema::default();
        assert_eq!(
            schema.encode_value(Some("count"), &json!(12.0)),
            Some(WireValue::Integer(12))
        );
        assert_eq!(
            schema.encode_value(Some("count"), &json!(12.5)),
            Some(WireValue::Double(12.5))
        );
    }

    #[test]
    fn empty_lists_are_omitted_and_nested_donors_are_tagged() {
        let mut candidate = CandidateRecord {
            candidate_id: "H0NC02001".into(),
            slug: "h0nc02001".into(),
            name: "Jane Doe".into(),
            party: "DEM".into(),
            office: "US House NC-02".into(),
            office_code: "H".into(),
            district: Some("02".into()),
            state: "NC".into(),
            incumbent_challenger: None,
            incumbent: false,
            total_raised: 2500.0,
            total_from_pacs: 1000.0,
            total_from_individuals: 1500.0,
            donor_count: 2,
            top_donors: Vec::new(),
            committee_id: None,
            partition: "NC".into(),
        };
        let schema = FieldSchema::default();
        let fields = schema.encode(&candidate).expect("encode");
        assert!(!fields.contains_key("topDonors"));
        assert_eq!(fields["committeeId"], WireValue::Null);
        assert_eq!(fields["donorCount"], WireValue::Integer(2));

        candidate.top_donors.push(DonorAggregate {
            name: "ACME PAC".into(),
            donor_type: DonorType::Organization,
            total_amount: 1000.0,
            contribution_count: 1,
            employer: None,
            state: Some("NC".into()),
            key_name: "ACME PAC".into(),
        });
        let fields = schema.encode(&candidate).expect("encode");
        let WireValue::Array(donors) = &fields["topDonors"] else {
            panic!("expected donor array");
        };
        let WireValue::Map(donor) = &donors[0] else {
            panic!("expected donor map");
        };
        assert_eq!(donor["totalAmount"], WireValue::Double(1000.0));
        assert_eq!(donor["contributionCount"], WireValue::Integer(1));
        assert_eq!(donor["type"], WireValue::String("pac".into()));
        assert!(!donor.contains_key("keyName"));
    }

    #[test]
    fn non_object_records_are_rejected() {
        let err = FieldSchema::default().encode(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, PublishError::Encode(_)));
    }
}
