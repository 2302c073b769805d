//! Static jurisdiction table (states, DC, territories) and sub-district ids.

use std::fmt;

/// Pseudo-jurisdiction key for the presidential sweep. Shares the resume and
/// stale-cleanup bookkeeping of real jurisdictions.
pub const PRESIDENTIAL: &str = "_presidential";

/// Sub-district id used for single-seat jurisdictions.
pub const AT_LARGE_DISTRICT: &str = "00";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jurisdiction {
    pub code: &'static str,
    pub name: &'static str,
    pub house_seats: u8,
}

impl Jurisdiction {
    /// Zero-padded sub-district ids; one at-large sentinel for single-seat jurisdictions.
    pub fn districts(&self) -> Vec<String> {
        if self.house_seats <= 1 {
            return vec![AT_LARGE_DISTRICT.to_string()];
        }
        (1..=self.house_seats).map(|n| format!("{n:02}")).collect()
    }

    pub fn is_at_large(&self) -> bool {
        self.house_seats <= 1
    }
}

// House seat counts follow the 2020 apportionment.
const JURISDICTIONS: &[Jurisdiction] = &[
    Jurisdiction { code: "AL", name: "Alabama", house_seats: 7 },
    Jurisdiction { code: "AK", name: "Alaska", house_seats: 1 },
    Jurisdiction { code: "AZ", name: "Arizona", house_seats: 9 },
    Jurisdiction { code: "AR", name: "Arkansas", house_seats: 4 },
    Jurisdiction { code: "CA", name: "California", house_seats: 52 },
    Jurisdiction { code: "CO", name: "Colorado", house_seats: 8 },
    Jurisdiction { code: "CT", name: "Connecticut", house_seats: 5 },
    Jurisdiction { code: "DE", name: "Delaware", house_seats: 1 },
    Jurisdiction { code: "FL", name: "Florida", house_seats: 28 },
    Jurisdiction { code: "GA", name: "Georgia", house_seats: 14 },
    Jurisdiction { code: "HI", name: "Hawaii", house_seats: 2 },
    Jurisdiction { code: "ID", name: "Idaho", house_seats: 2 },
    Jurisdiction { code: "IL", name: "Illinois", house_seats: 17 },
    Jurisdiction { code: "IN", name: "Indiana", house_seats: 9 },
    Jurisdiction { code: "IA", name: "Iowa", house_seats: 4 },
    Jurisdiction { code: "KS", name: "Kansas", house_seats: 4 },
    Jurisdiction { code: "KY", name: "Kentucky", house_seats: 6 },
    Jurisdiction { code: "LA", name: "Louisiana", house_seats: 6 },
    Jurisdiction { code: "ME", name: "Maine", house_seats: 2 },
    Jurisdiction { code: "MD", name: "Maryland", house_seats: 8 },
    Jurisdiction { code: "MA", name: "Massachusetts", house_seats: 9 },
    Jurisdiction { code: "MI", name: "Michigan", house_seats: 13 },
    Jurisdiction { code: "MN", name: "Minnesota", house_seats: 8 },
    Jurisdiction { code: "MS", name: "Mississippi", house_seats: 4 },
    Jurisdiction { code: "MO", name: "Missouri", house_seats: 8 },
    Jurisdiction { code: "MT", name: "Montana", house_seats: 2 },
    Jurisdiction { code: "NE", name: "Nebraska", house_seats: 3 },
    Jurisdiction { code: "NV", name: "Nevada", house_seats: 4 },
    Jurisdiction { code: "NH", name: "New Hampshire", house_seats: 2 },
    Jurisdiction { code: "NJ", name: "New Jersey", house_seats: 12 },
    Jurisdiction { code: "NM", name: "New Mexico", house_seats: 3 },
    Jurisdiction { code: "NY", name: "New York", house_seats: 26 },
    Jurisdiction { code: "NC", name: "North Carolina", house_seats: 14 },
    Jurisdiction { code: "ND", name: "North Dakota", house_seats: 1 },
    Jurisdiction { code: "OH", name: "Ohio", house_seats: 15 },
    Jurisdiction { code: "OK", name: "Oklahoma", house_seats: 5 },
    Jurisdiction { code: "OR", name: "Oregon", house_seats: 6 },
    Jurisdiction { code: "PA", name: "Pennsylvania", house_seats: 17 },
    Jurisdiction { code: "RI", name: "Rhode Island", house_seats: 2 },
    Jurisdiction { code: "SC", name: "South Carolina", house_seats: 7 },
    Jurisdiction { code: "SD", name: "South Dakota", house_seats: 1 },
    Jurisdiction { code: "TN", name: "Tennessee", house_seats: 9 },
    Jurisdiction { code: "TX", name: "Texas", house_seats: 38 },
    Jurisdiction { code: "UT", name: "Utah", house_seats: 4 },
    Jurisdiction { code: "VT", name: "Vermont", house_seats: 1 },
    Jurisdiction { code: "VA", name: "Virginia", house_seats: 11 },
    Jurisdiction { code: "WA", name: "Washington", house_seats: 10 },
    Jurisdiction { code: "WV", name: "West Virginia", house_seats: 2 },
    Jurisdiction { code: "WI", name: "Wisconsin", house_seats: 8 },
    Jurisdiction { code: "WY", name: "Wyoming", house_seats: 1 },
    Jurisdiction { code: "DC", name: "District of Columbia", house_seats: 1 },
    Jurisdiction { code: "AS", name: "American Samoa", house_seats: 1 },
    Jurisdiction { code: "GU", name: "Guam", house_seats: 1 },
    Jurisdiction { code: "MP", name: "Northern Mariana Islands", house_seats: 1 },
    Jurisdiction { code: "PR", name: "Puerto Rico", house_seats: 1 },
    Jurisdiction { code: "VI", name: "US Virgin Islands", house_seats: 1 },
];

pub fn all() -> &'static [Jurisdiction] {
    JURISDICTIONS
}

pub fn find(code: &str) -> Option<&'static Jurisdiction> {
    let code = code.trim();
    JURISDICTIONS
        .iter()
        .find(|j| j.code.eq_ignore_ascii_case(code))
}

/// Display name for a code; unknown codes (including the presidential
/// pseudo-jurisdiction) fall back to the code itself.
pub fn display_name(code: &str) -> &str {
    match find(code) {
        Some(jurisdiction) => jurisdiction.name,
        None => code,
    }
}

pub fn districts_for(code: &str) -> Vec<String> {
    find(code).map(Jurisdiction::districts).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownJurisdiction(pub String);

impl fmt::Display for UnknownJurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown jurisdiction code {:?}", self.0)
    }
}

impl std::error::Error for UnknownJurisdiction {}

/// Parse a comma-separated code filter, keeping table order and dropping repeats.
pub fn parse_filter(csv: &str) -> Result<Vec<&'static Jurisdiction>, UnknownJurisdiction> {
    let mut wanted = Vec::new();
    for code in csv.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let jurisdiction = find(code).ok_or_else(|| UnknownJurisdiction(code.to_string()))?;
        if !wanted.contains(&jurisdiction.code) {
            wanted.push(jurisdiction.code);
        }
    }
    Ok(JURISDICTIONS
        .iter()
        .filter(|j| wanted.contains(&j.code))
        .collect())
}

/// Human office label from the registry office code.
pub fn office_label(office_code: &str, jurisdiction_code: &str, district: Option<&str>) -> String {
    match office_code {
        "P" => "President".to_string(),
        "S" => format!("US Senate {jurisdiction_code}"),
        "H" => match district {
            Some(district) if district != AT_LARGE_DISTRICT => {
                format!("US House {jurisdiction_code}-{district}")
            }
            _ => format!("US House {jurisdiction_code} At-Large"),
        },
        other => other.to_string(),
    }
}

/// District to publish: `None` for statewide, presidential and at-large seats.
pub fn published_district(office_code: &str, district: Option<&str>) -> Option<String> {
    if office_code != "H" {
        return None;
    }
    district
        .map(str::trim)
        .filter(|d| !d.is_empty() && *d != AT_LARGE_DISTRICT)
        .map(|d| format!("{:0>2}", d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_states_dc_and_territories() {
        assert_eq!(all().len(), 56);
        let seats: u32 = all()
            .iter()
            .filter(|j| j.code.len() == 2 && !["DC", "AS", "GU", "MP", "PR", "VI"].contains(&j.code))
            .map(|j| j.house_seats as u32)
            .sum();
        assert_eq!(seats, 435);
    }

    #[test]
    fn districts_are_zero_padded() {
        let nc = districts_for("NC");
        assert_eq!(nc.len(), 14);
        assert_eq!(nc.first().map(String::as_str), Some("01"));
        assert_eq!(nc.last().map(String::as_str), Some("14"));
        assert_eq!(districts_for("AK"), vec![AT_LARGE_DISTRICT.to_string()]);
        assert!(districts_for("ZZ").is_empty());
    }

    #[test]
    fn names_resolve_with_fallback() {
        assert_eq!(display_name("nc"), "North Carolina");
        assert_eq!(display_name(PRESIDENTIAL), PRESIDENTIAL);
    }

    #[test]
    fn filter_keeps_table_order() {
        let picked = parse_filter(" ny,CA ,ny").expect("valid filter");
        let codes: Vec<_> = picked.iter().map(|j| j.code).collect();
        assert_eq!(codes, vec!["CA", "NY"]);
        assert_eq!(
            parse_filter("CA,XX"),
            Err(UnknownJurisdiction("XX".to_string()))
        );
    }

    #[test]
    fn office_labels() {
        assert_eq!(office_label("S", "NC", None), "US Senate NC");
        assert_eq!(office_label("H", "NC", Some("02")), "US House NC-02");
        assert_eq!(office_label("H", "AK", Some("00")), "US House AK At-Large");
        assert_eq!(office_label("P", "FL", None), "President");
        assert_eq!(published_district("H", Some("2")), Some("02".to_string()));
        assert_eq!(published_district("H", Some("00")), None);
        assert_eq!(published_district("S", Some("00")), None);
    }
}
