use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use pacscope_core::{CandidateRecord, OrganizationRecord};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::{DocumentStore, DocumentWrite};
use crate::wire::{FieldSchema, Fields, WireValue};
use crate::{
    PublishError, CANDIDATES_COLLECTION, CANDIDATE_METADATA_ID, METADATA_COLLECTION,
    ORGANIZATIONS_COLLECTION, ORGANIZATION_METADATA_ID, PARTITION_FIELD,
};

const LAST_UPDATED: &str = "lastUpdated";

/// A record type with a home collection and a stale-cleanup scope.
pub trait PublishedRecord: Serialize + Send + Sync {
    const COLLECTION: &'static str;

    fn document_id(&self) -> &str;

    fn partition(&self) -> &str;
}

impl PublishedRecord for OrganizationRecord {
    const COLLECTION: &'static str = ORGANIZATIONS_COLLECTION;

    fn document_id(&self) -> &str {
        &self.slug
    }

    fn partition(&self) -> &str {
        &self.partition
    }
}

impl PublishedRecord for CandidateRecord {
    const COLLECTION: &'static str = CANDIDATES_COLLECTION;

    fn document_id(&self) -> &str {
        &self.slug
    }

    fn partition(&self) -> &str {
        &self.partition
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub published: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn DocumentStore>,
    schema: FieldSchema,
}

impl Publisher {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            schema: FieldSchema::default(),
        }
    }

    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Overwrite the record's document. Records without their own
    /// `lastUpdated` get the publish time.
    pub async fn publish<R: PublishedRecord>(&self, record: &R) -> Result<String, PublishError> {
        let id = record.document_id().to_string();
        let mut fields = self.schema.encode(record)?;
        fields
            .entry(LAST_UPDATED.to_string())
            .or_insert_with(|| WireValue::Timestamp(now_iso()));
        self.store
            .write(DocumentWrite::replace(R::COLLECTION, &id, fields))
            .await?;
        Ok(id)
    }

    pub async fn published_ids(
        &self,
        collection: &str,
        partition: &str,
    ) -> Result<BTreeSet<String>, PublishError> {
        self.store
            .ids_where(collection, PARTITION_FIELD, partition)
            .await
    }

    /// Delete ids from `prior` that are not in `keep`. `prior` must come from
    /// [`Publisher::published_ids`] for a single partition.
    pub async fn delete_stale(
        &self,
        collection: &str,
        prior: &BTreeSet<String>,
        keep: &BTreeSet<String>,
    ) -> Result<Vec<String>, PublishError> {
        let mut deleted = Vec::new();
        for id in prior.difference(keep) {
            self.store.delete(collection, id).await?;
            deleted.push(id.clone());
        }
        if !deleted.is_empty() {
            info!(collection, count = deleted.len(), "removed stale documents");
        }
        Ok(deleted)
    }

    /// Publish a batch that makes up one partition, then remove documents of
    /// that partition that neither the batch nor `retain` mentions.
    ///
    /// A failed write stops the batch before any deletion.
    pub async fn publish_partition<R: PublishedRecord>(
        &self,
        partition: &str,
        records: &[R],
        retain: &BTreeSet<String>,
    ) -> Result<PartitionOutcome, PublishError> {
        let prior = self.published_ids(R::COLLECTION, partition).await?;

        let mut outcome = PartitionOutcome::default();
        for record in records {
            if record.partition() != partition {
                warn!(
                    id = record.document_id(),
                    expected = partition,
                    actual = record.partition(),
                    "record outside partition skipped"
                );
                continue;
            }
            outcome.published.push(self.publish(record).await?);
        }

        let mut keep: BTreeSet<String> = outcome.published.iter().cloned().collect();
        keep.extend(retain.iter().cloned());
        outcome.deleted = self.delete_stale(R::COLLECTION, &prior, &keep).await?;
        Ok(outcome)
    }

    /// `metadata/lastUpdate` after an organization sweep.
    pub async fn record_organization_run(&self, company_count: usize) -> Result<(), PublishError> {
        let mut fields = Fields::new();
        fields.insert("companyCount".into(), WireValue::Integer(company_count as i64));
        fields.insert("updatedAt".into(), WireValue::String(now_iso()));
        let paths = vec!["companyCount".to_string(), "updatedAt".to_string()];
        self.store
            .write(
                DocumentWrite::merge(METADATA_COLLECTION, ORGANIZATION_METADATA_ID, fields, paths)
                    .with_server_timestamp("timestamp"),
            )
            .await
    }

    /// Merge one partition's candidate count into
    /// `metadata/candidateLastUpdate`, leaving other partitions alone.
    pub async fn record_partition_count(
        &self,
        partition: &str,
        count: usize,
    ) -> Result<(), PublishError> {
        let mut counts = Fields::new();
        counts.insert(partition.to_string(), WireValue::Integer(count as i64));
        let mut fields = Fields::new();
        fields.insert("stateCounts".into(), WireValue::Map(counts));
        fields.insert("updatedAt".into(), WireValue::String(now_iso()));
        let paths = vec![format!("stateCounts.{partition}"), "updatedAt".to_string()];
        self.store
            .write(
                DocumentWrite::merge(METADATA_COLLECTION, CANDIDATE_METADATA_ID, fields, paths)
                    .with_server_timestamp("timestamp"),
            )
            .await
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
