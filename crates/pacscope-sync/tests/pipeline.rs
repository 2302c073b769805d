use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pacscope_adapters::{
    AdapterError, CandidateQuery, CandidateSummary, CandidateTotals, CommitteeSummary, FinanceApi,
    Office,
};
use pacscope_core::jurisdiction::{self, PRESIDENTIAL};
use pacscope_core::{Counterparty, Disbursement, RawTransaction};
use pacscope_publish::{
    Fields, MemoryDocumentStore, Publisher, WireValue, CANDIDATES_COLLECTION, METADATA_COLLECTION,
    ORGANIZATIONS_COLLECTION,
};
use pacscope_storage::FetchError;
use pacscope_sync::progress::CANDIDATE_CHECKPOINT;
use pacscope_sync::{OrganizationRegistry, RunOptions, RunProgress, SyncPipeline, UnitState};

#[derive(Default)]
struct FakeApi {
    senate: HashMap<String, Vec<CandidateSummary>>,
    house: HashMap<(String, String), Vec<CandidateSummary>>,
    presidential: Vec<CandidateSummary>,
    failing: HashSet<String>,
    contributions: HashMap<String, Vec<RawTransaction>>,
    committees: HashMap<String, Vec<CommitteeSummary>>,
    disbursements: HashMap<String, Vec<Disbursement>>,
    parties: HashMap<String, Option<String>>,
    throttled_state: Option<String>,
    failing_disbursements: HashSet<String>,
    searches: Mutex<Vec<CandidateQuery>>,
}

impl FakeApi {
    fn searches(&self) -> Vec<CandidateQuery> {
        self.searches.lock().expect("lock").clone()
    }

    fn senate_states(&self) -> Vec<String> {
        self.searches()
            .into_iter()
            .filter(|q| q.office == Office::Senate)
            .filter_map(|q| q.state)
            .collect()
    }

    fn presidential_searches(&self) -> usize {
        self.searches()
            .iter()
            .filter(|q| q.office == Office::President)
            .count()
    }
}

#[async_trait]
impl FinanceApi for FakeApi {
    async fn search_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<CandidateSummary>, AdapterError> {
        self.searches.lock().expect("lock").push(query.clone());
        if query.state.is_some() && query.state == self.throttled_state {
            return Err(FetchError::RateLimitExhausted { consecutive: 8 }.into());
        }
        let state = query.state.clone().unwrap_or_default();
        Ok(match query.office {
            Office::Senate => self.senate.get(&state).cloned().unwrap_or_default(),
            Office::House => self
                .house
                .get(&(state, query.district.clone().unwrap_or_default()))
                .cloned()
                .unwrap_or_default(),
            Office::President => self.presidential.clone(),
        })
    }

    async fn principal_committee(
        &self,
        candidate_id: &str,
    ) -> Result<Option<CommitteeSummary>, AdapterError> {
        if self.failing.contains(candidate_id) {
            return Err(AdapterError::Malformed {
                kind: "committee",
                message: "missing committee_id".into(),
            });
        }
        Ok(Some(committee(&format!("C-{candidate_id}"), candidate_id)))
    }

    async fn candidate_totals(&self, _: &str) -> Result<Option<CandidateTotals>, AdapterError> {
        Ok(None)
    }

    async fn search_committees(&self, term: &str) -> Result<Vec<CommitteeSummary>, AdapterError> {
        Ok(self.committees.get(term).cloned().unwrap_or_default())
    }

    async fn contributions(&self, committee_id: &str) -> Result<Vec<RawTransaction>, AdapterError> {
        Ok(self.contributions.get(committee_id).cloned().unwrap_or_default())
    }

    async fn disbursements(&self, committee_id: &str) -> Result<Vec<Disbursement>, AdapterError> {
        if self.failing_disbursements.contains(committee_id) {
            return Err(FetchError::HttpStatus {
                status: 500,
                url: format!("https://api.example.test/v1/schedules/schedule_b/?committee_id={committee_id}"),
            }
            .into());
        }
        Ok(self.disbursements.get(committee_id).cloned().unwrap_or_default())
    }

    async fn candidate_parties(
        &self,
        candidate_ids: &[String],
    ) -> Result<HashMap<String, Option<String>>, AdapterError> {
        Ok(candidate_ids
            .iter()
            .filter_map(|id| self.parties.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

fn committee(id: &str, name: &str) -> CommitteeSummary {
    CommitteeSummary {
        committee_id: id.to_string(),
        name: name.to_string(),
        cycles: vec![2024],
        committee_type: Some("Q".into()),
        designation: None,
    }
}

fn candidate(id: &str, name: &str, office: &str, state: &str, district: Option<&str>) -> CandidateSummary {
    CandidateSummary {
        candidate_id: id.to_string(),
        name: Some(name.to_string()),
        party: Some("DEM".into()),
        office: office.to_string(),
        state: Some(state.to_string()),
        district: district.map(ToString::to_string),
        incumbent_challenge: Some("C".into()),
    }
}

fn contribution(name: &str, entity: &str, amount: f64) -> RawTransaction {
    RawTransaction {
        counterparty: Counterparty::from_row(Some(name), None, Some(entity), None, None),
        amount,
        date: None,
        state: Some("NC".into()),
        committee_id: None,
        candidate_id: None,
    }
}

fn partition_doc(partition: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("partition".into(), WireValue::String(partition.into()));
    fields
}

fn write_checkpoint(state_dir: &Path, completed: &[&str]) {
    std::fs::create_dir_all(state_dir).expect("state dir");
    let body = serde_json::json!({ "completed": completed });
    std::fs::write(state_dir.join(CANDIDATE_CHECKPOINT), body.to_string()).expect("checkpoint");
}

fn read_checkpoint(state_dir: &Path) -> RunProgress {
    let text = std::fs::read_to_string(state_dir.join(CANDIDATE_CHECKPOINT)).expect("read");
    serde_json::from_str(&text).expect("parse")
}

fn pipeline(api: Arc<FakeApi>, store: Arc<MemoryDocumentStore>, root: &Path) -> SyncPipeline {
    SyncPipeline::new(
        api,
        Some(Publisher::new(store)),
        root.join("state"),
        root.join("reports"),
    )
}

#[tokio::test]
async fn resume_skips_checkpointed_jurisdictions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_dir = dir.path().join("state");
    write_checkpoint(&state_dir, &["CA", "NY"]);

    let codes: Vec<&str> = jurisdiction::all()
        .iter()
        .map(|j| j.code)
        .filter(|c| !["AS", "GU", "MP", "VI"].contains(c))
        .collect();
    assert_eq!(codes.len(), 52);

    let api = Arc::new(FakeApi::default());
    let store = Arc::new(MemoryDocumentStore::new());
    let summary = pipeline(api.clone(), store, dir.path())
        .run_candidates(&RunOptions {
            resume: true,
            jurisdictions: Some(codes.join(",")),
            ..RunOptions::default()
        })
        .await
        .expect("run");

    let swept = api.senate_states();
    assert_eq!(swept.len(), 50);
    assert!(!swept.iter().any(|s| s == "CA" || s == "NY"));
    assert_eq!(summary.resumed_skips, 2);
    assert!(summary.complete);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(api.presidential_searches(), 0);

    let progress = read_checkpoint(&state_dir);
    assert_eq!(progress.completed.len(), 52);
    assert!(progress.finished_at.is_some());
}

#[tokio::test]
async fn presidential_sweep_resumes_like_a_jurisdiction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_dir = dir.path().join("state");
    let all: Vec<&str> = jurisdiction::all().iter().map(|j| j.code).collect();
    write_checkpoint(&state_dir, &all);

    let api = Arc::new(FakeApi {
        presidential: vec![candidate("P80000001", "DOE, JANE", "P", "US", None)],
        ..FakeApi::default()
    });
    let store = Arc::new(MemoryDocumentStore::new());
    let options = RunOptions {
        resume: true,
        ..RunOptions::default()
    };

    let summary = pipeline(api.clone(), store.clone(), dir.path())
        .run_candidates(&options)
        .await
        .expect("first run");
    assert!(api.senate_states().is_empty());
    assert_eq!(api.presidential_searches(), 1);
    assert_eq!(summary.processed, 1);
    assert!(store.ids(CANDIDATES_COLLECTION).await.contains("p80000001"));
    assert!(read_checkpoint(&state_dir).is_completed(PRESIDENTIAL));
    assert_eq!(summary.resumed_skips as usize, all.len());
}

#[tokio::test]
async fn resuming_a_finished_checkpoint_starts_a_fresh_sweep() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_dir = dir.path().join("state");
    let api = Arc::new(FakeApi::default());
    let store = Arc::new(MemoryDocumentStore::new());
    let options = RunOptions {
        resume: true,
        jurisdictions: Some("NC,VA".into()),
        ..RunOptions::default()
    };

    let first = pipeline(api.clone(), store.clone(), dir.path())
        .run_candidates(&options)
        .await
        .expect("first run");
    assert!(first.complete);
    assert!(read_checkpoint(&state_dir).finished_at.is_some());

    let second = pipeline(api.clone(), store, dir.path())
        .run_candidates(&options)
        .await
        .expect("second run");
    assert_eq!(second.resumed_skips, 0);
    assert!(second.complete);
    assert_eq!(
        api.senate_states(),
        vec!["NC".to_string(), "VA".to_string(), "NC".to_string(), "VA".to_string()]
    );
}

#[tokio::test]
async fn rate_limit_stops_the_run_and_keeps_the_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state_dir = dir.path().join("state");
    let mut senate = HashMap::new();
    senate.insert(
        "NC".to_string(),
        vec![candidate("S0NC00001", "SMITH, JOHN", "S", "NC", None)],
    );
    let api = Arc::new(FakeApi {
        senate: senate.clone(),
        throttled_state: Some("VA".into()),
        ..FakeApi::default()
    });
    let store = Arc::new(MemoryDocumentStore::new());
    let options = RunOptions {
        resume: true,
        jurisdictions: Some("NC,VA,WA".into()),
        ..RunOptions::default()
    };

    let summary = pipeline(api.clone(), store.clone(), dir.path())
        .run_candidates(&options)
        .await
        .expect("run");
    assert!(summary.rate_limit_hit);
    assert!(!summary.complete);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(api.senate_states(), vec!["NC".to_string(), "VA".to_string()]);

    let progress = read_checkpoint(&state_dir);
    assert_eq!(progress.completed, BTreeSet::from(["NC".to_string()]));
    assert_eq!(progress.state_of("VA"), UnitState::RateLimited);
    assert!(progress.finished_at.is_none());

    let report = dir
        .path()
        .join("reports")
        .join(summary.run_id.to_string())
        .join("run_summary.json");
    assert!(report.exists());

    // Budget restored: the resumed run picks up at VA.
    let api = Arc::new(FakeApi {
        senate,
        ..FakeApi::default()
    });
    let resumed = pipeline(api.clone(), store, dir.path())
        .run_candidates(&options)
        .await
        .expect("resumed run");
    assert_eq!(api.senate_states(), vec!["VA".to_string(), "WA".to_string()]);
    assert_eq!(resumed.resumed_skips, 1);
    assert!(resumed.complete);
}

#[tokio::test]
async fn candidate_partition_is_replaced_and_failed_lookups_degrade() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut senate = HashMap::new();
    senate.insert(
        "NC".to_string(),
        vec![candidate("S0NC00001", "SMITH, JOHN", "S", "NC", None)],
    );
    let mut house = HashMap::new();
    house.insert(
        ("NC".to_string(), "02".to_string()),
        vec![candidate("H0NC00002", "ROE, ANN", "H", "NC", Some("02"))],
    );
    let mut contributions = HashMap::new();
    contributions.insert(
        "C-S0NC00001".to_string(),
        vec![
            contribution("ACME PAC", "COM", 500.0),
            contribution("ACME PAC", "COM", -10.0),
            contribution("JANE DOE", "IND", 300.0),
        ],
    );
    let api = Arc::new(FakeApi {
        senate,
        house,
        contributions,
        failing: HashSet::from(["H0NC00002".to_string()]),
        ..FakeApi::default()
    });

    let store = Arc::new(MemoryDocumentStore::new());
    store.insert(CANDIDATES_COLLECTION, "h0nc00002", partition_doc("NC")).await;
    store.insert(CANDIDATES_COLLECTION, "retired-member", partition_doc("NC")).await;
    store.insert(CANDIDATES_COLLECTION, "va-member", partition_doc("VA")).await;

    let summary = pipeline(api, store.clone(), dir.path())
        .run_candidates(&RunOptions {
            jurisdictions: Some("NC".into()),
            ..RunOptions::default()
        })
        .await
        .expect("run");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.errored, 0);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.exit_code(), 0);

    let ids = store.ids(CANDIDATES_COLLECTION).await;
    assert_eq!(
        ids,
        BTreeSet::from([
            "h0nc00002".to_string(),
            "s0nc00001".to_string(),
            "va-member".to_string(),
        ])
    );

    let doc = store
        .document(CANDIDATES_COLLECTION, "s0nc00001")
        .await
        .expect("published");
    assert_eq!(doc.get("totalFromPacs"), Some(&WireValue::Double(500.0)));
    assert_eq!(doc.get("totalFromIndividuals"), Some(&WireValue::Double(300.0)));
    assert_eq!(doc.get("donorCount"), Some(&WireValue::Integer(2)));
    assert_eq!(doc.get("name").and_then(WireValue::as_str), Some("John Smith"));

    // The failed committee lookup overwrote the old document with zero totals.
    let degraded = store
        .document(CANDIDATES_COLLECTION, "h0nc00002")
        .await
        .expect("degraded record");
    assert_eq!(degraded.get("totalRaised"), Some(&WireValue::Double(0.0)));
    assert_eq!(degraded.get("name").and_then(WireValue::as_str), Some("Ann Roe"));

    let meta = store
        .document(METADATA_COLLECTION, "candidateLastUpdate")
        .await
        .expect("metadata");
    let Some(WireValue::Map(counts)) = meta.get("stateCounts") else {
        panic!("stateCounts missing: {meta:?}");
    };
    assert_eq!(counts.get("NC"), Some(&WireValue::Integer(2)));
}

#[tokio::test]
async fn new_candidate_with_malformed_committee_is_published_degraded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut senate = HashMap::new();
    senate.insert(
        "VT".to_string(),
        vec![candidate("S0VT00009", "GREEN, SAM", "S", "VT", None)],
    );
    let api = Arc::new(FakeApi {
        senate,
        failing: HashSet::from(["S0VT00009".to_string()]),
        ..FakeApi::default()
    });
    let store = Arc::new(MemoryDocumentStore::new());

    let summary = pipeline(api, store.clone(), dir.path())
        .run_candidates(&RunOptions {
            jurisdictions: Some("VT".into()),
            ..RunOptions::default()
        })
        .await
        .expect("run");

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.errored, 0);
    assert_eq!(summary.exit_code(), 0);
    assert!(summary.complete);

    let doc = store
        .document(CANDIDATES_COLLECTION, "s0vt00009")
        .await
        .expect("degraded candidate published");
    assert_eq!(doc.get("partition").and_then(WireValue::as_str), Some("VT"));
    assert_eq!(doc.get("donorCount"), Some(&WireValue::Integer(0)));
    assert_eq!(doc.get("totalFromPacs"), Some(&WireValue::Double(0.0)));
}

const REGISTRY: &str = r#"
organizations:
  - name: Acme Corp
    search_terms: [ACME]
    industry: Manufacturing
    rank: 1
  - name: Ghost Corp
    industry: Retail
"#;

#[tokio::test]
async fn organization_run_categorizes_and_reconciles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = OrganizationRegistry::from_yaml_str(REGISTRY).expect("registry");

    let mut committees = HashMap::new();
    committees.insert("ACME".to_string(), vec![committee("C001", "ACME CORP PAC")]);
    let mut disbursements = HashMap::new();
    disbursements.insert(
        "C001".to_string(),
        vec![
            Disbursement {
                recipient_name: Some("FRIENDS OF LEE".into()),
                candidate_id: Some("H1".into()),
                amount: 900.0,
                date: None,
            },
            Disbursement {
                recipient_name: Some("VOTE PARK".into()),
                candidate_id: Some("H2".into()),
                amount: 100.0,
                date: None,
            },
        ],
    );
    let parties = HashMap::from([
        ("H1".to_string(), Some("DEM".to_string())),
        ("H2".to_string(), Some("REP".to_string())),
    ]);
    let api = Arc::new(FakeApi {
        committees,
        disbursements,
        parties,
        ..FakeApi::default()
    });

    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert(ORGANIZATIONS_COLLECTION, "dropped-co", partition_doc("tracked"))
        .await;

    let summary = pipeline(api, store.clone(), dir.path())
        .run_organizations(&registry, &RunOptions::default())
        .await
        .expect("run");

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.deleted, 1);
    assert!(summary.complete);
    assert_eq!(summary.exit_code(), 0);

    let acme = store
        .document(ORGANIZATIONS_COLLECTION, "acme")
        .await
        .expect("acme");
    assert_eq!(acme.get("category").and_then(WireValue::as_str), Some("support"));
    assert_eq!(acme.get("percentDemocrat"), Some(&WireValue::Double(90.0)));
    assert_eq!(acme.get("totalDemocrat"), Some(&WireValue::Double(900.0)));

    let ghost = store
        .document(ORGANIZATIONS_COLLECTION, "ghost")
        .await
        .expect("ghost");
    assert_eq!(ghost.get("category").and_then(WireValue::as_str), Some("none"));
    assert_eq!(ghost.get("hasPac"), Some(&WireValue::Boolean(false)));

    assert!(!store.ids(ORGANIZATIONS_COLLECTION).await.contains("dropped-co"));

    let meta = store
        .document(METADATA_COLLECTION, "lastUpdate")
        .await
        .expect("metadata");
    assert_eq!(meta.get("companyCount"), Some(&WireValue::Integer(2)));
}

#[tokio::test]
async fn failed_disbursement_fetch_publishes_a_degraded_organization() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = OrganizationRegistry::from_yaml_str(REGISTRY).expect("registry");
    let mut committees = HashMap::new();
    committees.insert("ACME".to_string(), vec![committee("C001", "ACME CORP PAC")]);
    let api = Arc::new(FakeApi {
        committees,
        failing_disbursements: HashSet::from(["C001".to_string()]),
        ..FakeApi::default()
    });
    let store = Arc::new(MemoryDocumentStore::new());

    let summary = pipeline(api, store.clone(), dir.path())
        .run_organizations(&registry, &RunOptions::default())
        .await
        .expect("run");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.degraded, 2);
    assert_eq!(summary.errored, 0);
    assert_eq!(summary.exit_code(), 0);

    let acme = store
        .document(ORGANIZATIONS_COLLECTION, "acme")
        .await
        .expect("acme published");
    assert_eq!(acme.get("category").and_then(WireValue::as_str), Some("none"));
    assert_eq!(acme.get("hasPac"), Some(&WireValue::Boolean(true)));
    assert_eq!(
        acme.get("fecCommitteeIds"),
        Some(&WireValue::Array(vec![WireValue::String("C001".into())]))
    );
}

#[tokio::test]
async fn single_organization_run_leaves_registry_bookkeeping_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = OrganizationRegistry::from_yaml_str(REGISTRY).expect("registry");
    let store = Arc::new(MemoryDocumentStore::new());
    store
        .insert(ORGANIZATIONS_COLLECTION, "dropped-co", partition_doc("tracked"))
        .await;

    let summary = pipeline(Arc::new(FakeApi::default()), store.clone(), dir.path())
        .run_organizations(
            &registry,
            &RunOptions {
                organization: Some("ghost corp".into()),
                ..RunOptions::default()
            },
        )
        .await
        .expect("run");

    assert_eq!(summary.processed, 1);
    assert!(store.ids(ORGANIZATIONS_COLLECTION).await.contains("dropped-co"));
    assert!(store.document(METADATA_COLLECTION, "lastUpdate").await.is_none());

    let unknown = pipeline(Arc::new(FakeApi::default()), store, dir.path())
        .run_organizations(
            &registry,
            &RunOptions {
                organization: Some("Initech".into()),
                ..RunOptions::default()
            },
        )
        .await;
    assert!(matches!(unknown, Err(pacscope_sync::SyncError::UnknownOrganization(_))));
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut senate = HashMap::new();
    senate.insert(
        "NC".to_string(),
        vec![candidate("S0NC00001", "SMITH, JOHN", "S", "NC", None)],
    );
    let api = Arc::new(FakeApi {
        senate,
        ..FakeApi::default()
    });
    let store = Arc::new(MemoryDocumentStore::new());

    let summary = pipeline(api, store.clone(), dir.path())
        .run_candidates(&RunOptions {
            dry_run: true,
            jurisdictions: Some("NC".into()),
            ..RunOptions::default()
        })
        .await
        .expect("run");

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.exit_code(), 0);
    assert!(store.writes().await.is_empty());
    assert!(!dir.path().join("state").exists());
    assert!(!dir.path().join("reports").exists());
}
