//! Candidate dedup within a partition.
//!
//! Exact duplicates (same partition, same person comparison key) collapse to
//! the record with the highest total raised. Near matches are only reported.

use std::collections::HashMap;

use pacscope_core::normalize::person_comparison_key;
use pacscope_core::CandidateRecord;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub review_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.93,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupReviewItem {
    pub partition: String,
    pub slug_a: String,
    pub slug_b: String,
    pub name_a: String,
    pub name_b: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Survivors in discovery order.
    pub kept: Vec<CandidateRecord>,
    /// Slugs of collapsed duplicates.
    pub dropped: Vec<String>,
    pub review: Vec<DedupReviewItem>,
}

pub struct DedupEngine {
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn similarity(a: &CandidateRecord, b: &CandidateRecord) -> f64 {
        jaro_winkler(&person_comparison_key(&a.name), &person_comparison_key(&b.name))
    }

    pub fn apply(&self, records: Vec<CandidateRecord>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        let mut positions: HashMap<(String, String), usize> = HashMap::new();

        for record in records {
            let key = (record.partition.clone(), person_comparison_key(&record.name));
            match positions.get(&key) {
                Some(&position) => {
                    let existing = &mut outcome.kept[position];
                    // Ties keep the first seen.
                    let loser = if record.total_raised > existing.total_raised {
                        std::mem::replace(existing, record)
                    } else {
                        record
                    };
                    info!(
                        partition = %key.0,
                        name = %loser.name,
                        slug = %loser.slug,
                        kept = %outcome.kept[position].slug,
                        "dropping duplicate candidate"
                    );
                    outcome.dropped.push(loser.slug);
                }
                None => {
                    positions.insert(key, outcome.kept.len());
                    outcome.kept.push(record);
                }
            }
        }

        for i in 0..outcome.kept.len() {
            for j in (i + 1)..outcome.kept.len() {
                let (a, b) = (&outcome.kept[i], &outcome.kept[j]);
                if a.partition != b.partition {
                    continue;
                }
                let score = Self::similarity(a, b);
                if score >= self.config.review_threshold {
                    warn!(
                        partition = %a.partition,
                        a = %a.name,
                        b = %b.name,
                        score,
                        "possible duplicate candidates; not merged"
                    );
                    outcome.review.push(DedupReviewItem {
                        partition: a.partition.clone(),
                        slug_a: a.slug.clone(),
                        slug_b: b.slug.clone(),
                        name_a: a.name.clone(),
                        name_b: b.name.clone(),
                        confidence_score: score,
                    });
                }
            }
        }

        outcome
    }
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(slug: &str, name: &str, partition: &str, total_raised: f64) -> CandidateRecord {
        CandidateRecord {
            candidate_id: slug.to_uppercase(),
            slug: slug.to_string(),
            name: name.to_string(),
            party: "REP".into(),
            office: format!("US Senate {partition}"),
            office_code: "S".into(),
            district: None,
            state: partition.to_string(),
            incumbent_challenger: None,
            incumbent: false,
            total_raised,
            total_from_pacs: 0.0,
            total_from_individuals: 0.0,
            donor_count: 0,
            top_donors: Vec::new(),
            committee_id: None,
            partition: partition.to_string(),
        }
    }

    #[test]
    fn exact_duplicates_keep_the_best_funded_record() {
        let outcome = DedupEngine::default().apply(vec![
            candidate("s1", "John Smith", "NC", 10.0),
            candidate("s2", "Jane Roe", "NC", 5.0),
            candidate("s3", "John Smith Jr.", "NC", 900.0),
            candidate("s4", "John Smith", "VA", 1.0),
        ]);
        let slugs: Vec<_> = outcome.kept.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["s3", "s2", "s4"]);
        assert_eq!(outcome.dropped, vec!["s1".to_string()]);
    }

    #[test]
    fn ties_keep_first_seen() {
        let outcome = DedupEngine::default().apply(vec![
            candidate("s1", "Dr. Ann Lee", "GA", 50.0),
            candidate("s2", "Ann Lee", "GA", 50.0),
        ]);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].slug, "s1");
    }

    #[test]
    fn near_matches_are_reported_not_merged() {
        let outcome = DedupEngine::default().apply(vec![
            candidate("s1", "Katherine Johnson", "OH", 10.0),
            candidate("s2", "Katharine Johnson", "OH", 20.0),
            candidate("s3", "Robert Brown", "OH", 30.0),
        ]);
        assert_eq!(outcome.kept.len(), 3);
        assert_eq!(outcome.review.len(), 1);
        assert!(outcome.review[0].confidence_score >= 0.93);
        assert!(outcome.review[0].confidence_score < 1.0);
    }
}
