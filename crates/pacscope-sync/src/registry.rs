use std::path::Path;

use anyhow::{Context, Result};
use pacscope_core::normalize;
use serde::Deserialize;
use tokio::fs;

pub const UNKNOWN_INDUSTRY: &str = "Unknown";

/// Tracked organizations, in sweep order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationRegistry {
    pub organizations: Vec<TrackedOrganization>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackedOrganization {
    pub name: String,
    #[serde(default)]
    pub search_terms: Vec<String>,
    /// Used when no search term finds a committee.
    #[serde(default)]
    pub committee_id: Option<String>,
    #[serde(default = "default_industry")]
    pub industry: String,
    #[serde(default)]
    pub rank: Option<u32>,
}

fn default_industry() -> String {
    UNKNOWN_INDUSTRY.to_string()
}

impl TrackedOrganization {
    pub fn slug(&self) -> String {
        normalize::slug(&self.name)
    }

    /// Search terms, or the display name when none are listed.
    pub fn terms(&self) -> Vec<&str> {
        let terms: Vec<&str> = self
            .search_terms
            .iter()
            .map(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect();
        if terms.is_empty() {
            vec![self.name.as_str()]
        } else {
            terms
        }
    }
}

impl OrganizationRegistry {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn len(&self) -> usize {
        self.organizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty()
    }

    /// Match by exact name (case-insensitive) or by slug.
    pub fn find(&self, name: &str) -> Option<&TrackedOrganization> {
        let wanted = normalize::slug(name);
        self.organizations
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name.trim()) || o.slug() == wanted)
    }

    pub fn industry_for(&self, name: &str) -> &str {
        self.find(name)
            .map(|o| o.industry.as_str())
            .unwrap_or(UNKNOWN_INDUSTRY)
    }

    pub fn slugs(&self) -> Vec<String> {
        self.organizations.iter().map(TrackedOrganization::slug).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
organizations:
  - name: Walmart
    search_terms: [WALMART, WAL-MART]
    committee_id: C00093054
    industry: Retail
    rank: 1
  - name: Acme Widgets Inc.
"#;

    #[test]
    fn parses_and_defaults() {
        let registry = OrganizationRegistry::from_yaml_str(SAMPLE).expect("parse");
        assert_eq!(registry.len(), 2);
        let acme = &registry.organizations[1];
        assert_eq!(acme.industry, UNKNOWN_INDUSTRY);
        assert_eq!(acme.terms(), vec!["Acme Widgets Inc."]);
        assert_eq!(acme.slug(), "acme-widgets");
        assert_eq!(registry.organizations[0].terms(), vec!["WALMART", "WAL-MART"]);
    }

    #[test]
    fn lookup_by_name_or_slug() {
        let registry = OrganizationRegistry::from_yaml_str(SAMPLE).expect("parse");
        assert_eq!(registry.industry_for("walmart"), "Retail");
        assert!(registry.find("acme-widgets").is_some());
        assert_eq!(registry.industry_for("Nobody"), UNKNOWN_INDUSTRY);
    }

    #[tokio::test]
    async fn shipped_registry_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../organizations.yaml");
        let registry = OrganizationRegistry::load(&path).await.expect("load");
        assert!(registry.len() >= 20);
        let mut slugs = registry.slugs();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), registry.len());
    }
}
