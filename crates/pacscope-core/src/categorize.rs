//! Partisan split and category thresholds.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::OrganizationRecord;

/// A party share must be strictly above this to lean.
pub const LEAN_THRESHOLD_PERCENT: f64 = 55.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Support,
    Avoid,
    Mixed,
    /// No discoverable committee or no disbursements. Never listed as support/avoid.
    #[serde(rename = "none")]
    NoCommittee,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Support => "support",
            Category::Avoid => "avoid",
            Category::Mixed => "mixed",
            Category::NoCommittee => "none",
        }
    }

    fn listing_order(&self) -> u8 {
        match self {
            Category::Support => 1,
            Category::Mixed => 2,
            Category::Avoid => 3,
            Category::NoCommittee => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartisanSplit {
    pub percent_democrat: f64,
    pub percent_republican: f64,
    pub category: Category,
}

impl PartisanSplit {
    pub fn no_committee() -> Self {
        Self {
            percent_democrat: 0.0,
            percent_republican: 0.0,
            category: Category::NoCommittee,
        }
    }
}

pub fn category_for(percent_democrat: f64, percent_republican: f64) -> Category {
    if percent_democrat > LEAN_THRESHOLD_PERCENT {
        Category::Support
    } else if percent_republican > LEAN_THRESHOLD_PERCENT {
        Category::Avoid
    } else {
        Category::Mixed
    }
}

/// Split two attributed totals into percentages (one decimal) and a category.
///
/// The category is computed from the rounded percentages, so a persisted
/// record always satisfies `category == category_for(pct_d, pct_r)`.
pub fn categorize(total_democrat: f64, total_republican: f64) -> PartisanSplit {
    let attributed = total_democrat + total_republican;
    if !(attributed > 0.0) {
        return PartisanSplit {
            percent_democrat: 0.0,
            percent_republican: 0.0,
            category: category_for(0.0, 0.0),
        };
    }

    let percent_democrat = round_tenths(total_democrat / attributed * 100.0);
    let percent_republican = round_tenths(100.0 - percent_democrat);
    PartisanSplit {
        percent_democrat,
        percent_republican,
        category: category_for(percent_democrat, percent_republican),
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub support: usize,
    pub avoid: usize,
    pub mixed: usize,
}

impl CategoryCounts {
    fn record(&mut self, category: Category) {
        self.total += 1;
        match category {
            Category::Support => self.support += 1,
            Category::Avoid => self.avoid += 1,
            Category::Mixed => self.mixed += 1,
            Category::NoCommittee => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub overall: CategoryCounts,
    pub by_industry: BTreeMap<String, CategoryCounts>,
}

/// Counts over categorized organizations. No-committee records are ignored.
pub fn aggregate_stats(records: &[OrganizationRecord]) -> CategoryStats {
    let mut stats = CategoryStats::default();
    for record in records
        .iter()
        .filter(|r| r.category != Category::NoCommittee)
    {
        stats.overall.record(record.category);
        stats
            .by_industry
            .entry(record.industry.clone())
            .or_default()
            .record(record.category);
    }
    stats
}

/// Support first (highest democratic share first), then mixed alphabetically,
/// then avoid (highest republican share first), then no-committee.
pub fn sort_for_listing(records: &mut [OrganizationRecord]) {
    records.sort_by(|a, b| {
        let by_category = a.category.listing_order().cmp(&b.category.listing_order());
        if by_category != Ordering::Equal {
            return by_category;
        }
        match a.category {
            Category::Support => b.percent_democrat.total_cmp(&a.percent_democrat),
            Category::Avoid => b.percent_republican.total_cmp(&a.percent_republican),
            Category::Mixed | Category::NoCommittee => a.name.cmp(&b.name),
        }
    });
}
