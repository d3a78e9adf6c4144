//! Batch Orchestrator: runs every document of a council and date range
//! through detection, extraction (or fallback), normalization and
//! resolution on a bounded worker pool, and aggregates the outcomes.
//!
//! A document is one unit of work. Its records are written in a single
//! store transaction after the whole unit succeeds, so a failed or
//! cancelled document never leaves partial records behind.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::{FieldSpec, PipelineConfig};
use crate::db::{DocumentReceipt, VotingStore};
use crate::error::PipelineError;
use crate::extract::{self, ExtractionContext};
use crate::fallback::FallbackAdapter;
use crate::normalize::{normalize, NormalizedRecord};
use crate::resolver::{RepresentativeResolver, ResolutionEvent};
use crate::schema::{
    iso_date, DocumentFailure, ExtractionMethod, ProcessingResult, RawDocument, RecordDraft,
    TimeRange, VotingRecord,
};
use crate::source::{DocumentSource, SourceListing};

pub const ANOMALY_MOVANT_EQUALS_SECOND: &str = "movant_equals_second";

/// Pool-wide stop signal. Units that have not started when it trips are
/// reported as cancelled; units in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DocumentStats {
    records: usize,
    rejected: usize,
    created: usize,
    aliases: usize,
    merged: usize,
    conflicts: usize,
    anomalies: usize,
}

impl DocumentStats {
    fn observe(&mut self, event: &ResolutionEvent) {
        match event {
            ResolutionEvent::Matched(_) => {}
            ResolutionEvent::AliasAdded(_) => self.aliases += 1,
            ResolutionEvent::Created => self.created += 1,
            ResolutionEvent::CreatedAfterConflict { .. } => {
                self.created += 1;
                self.conflicts += 1;
            }
            ResolutionEvent::Merged { .. } => self.merged += 1,
        }
    }
}

enum DocumentOutcome {
    Skipped,
    Cancelled,
    Succeeded(DocumentStats),
    Failed(DocumentFailure),
}

pub struct BatchOrchestrator {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn VotingStore>,
    resolver: Arc<RepresentativeResolver>,
    fallback: FallbackAdapter,
    field_schema: Vec<FieldSpec>,
    reprocess: bool,
    pool: rayon::ThreadPool,
}

impl BatchOrchestrator {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn VotingStore>,
        resolver: Arc<RepresentativeResolver>,
        fallback: FallbackAdapter,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pipeline.workers.max(1))
            .thread_name(|i| format!("civic-worker-{i}"))
            .build()
            .map_err(|e| PipelineError::Config(format!("worker pool: {e}")))?;

        Ok(Self {
            source,
            store,
            resolver,
            fallback,
            field_schema: config.field_schema.fields.clone(),
            reprocess: config.pipeline.reprocess,
            pool,
        })
    }

    pub fn resolver(&self) -> &RepresentativeResolver {
        &self.resolver
    }

    /// Process every document the source returns for `council` and `range`.
    /// Never fails: every error ends up in the result's failure list.
    pub fn run(&self, council: &str, range: &TimeRange, cancel: &CancellationToken) -> ProcessingResult {
        let mut result = ProcessingResult {
            council: council.to_string(),
            range_start: iso_date(range.start()),
            range_end: iso_date(range.end()),
            ..ProcessingResult::default()
        };

        let SourceListing {
            documents,
            unreadable,
        } = match self.source.documents(council, range) {
            Ok(listing) => listing,
            Err(err) => {
                tracing::error!(council, error = %err, "Document source failed");
                result.failures.push(DocumentFailure {
                    document_id: format!("source:{council}"),
                    kind: err.failure_kind(),
                    message: err.to_string(),
                });
                result.completed_at = now_rfc3339();
                return result;
            }
        };
        result.documents_found = documents.len() + unreadable.len();
        result.documents_attempted = unreadable.len();
        result.documents_failed = unreadable.len();
        result.failures = unreadable;
        tracing::info!(
            council,
            start = %result.range_start,
            end = %result.range_end,
            documents = documents.len(),
            unreadable = result.documents_failed,
            "Starting batch"
        );

        let outcomes: Vec<DocumentOutcome> = self.pool.install(|| {
            documents
                .par_iter()
                .map(|doc| self.process_document(council, doc, cancel))
                .collect()
        });

        for outcome in outcomes {
            match outcome {
                DocumentOutcome::Skipped => result.documents_skipped += 1,
                DocumentOutcome::Cancelled => result.documents_cancelled += 1,
                DocumentOutcome::Succeeded(stats) => {
                    result.documents_attempted += 1;
                    result.documents_succeeded += 1;
                    result.records_extracted += stats.records;
                    result.records_rejected += stats.rejected;
                    result.new_representatives += stats.created;
                    result.alias_additions += stats.aliases;
                    result.merged_representatives += stats.merged;
                    result.merge_conflicts += stats.conflicts;
                    result.anomalies += stats.anomalies;
                }
                DocumentOutcome::Failed(failure) => {
                    result.documents_attempted += 1;
                    result.documents_failed += 1;
                    result.failures.push(failure);
                }
            }
        }
        result
            .failures
            .sort_by(|a, b| a.document_id.cmp(&b.document_id));
        result.completed_at = now_rfc3339();

        tracing::info!(
            council,
            succeeded = result.documents_succeeded,
            failed = result.documents_failed,
            skipped = result.documents_skipped,
            cancelled = result.documents_cancelled,
            records = result.records_extracted,
            "Batch complete"
        );
        result
    }

    fn process_document(
        &self,
        council: &str,
        doc: &RawDocument,
        cancel: &CancellationToken,
    ) -> DocumentOutcome {
        if cancel.is_cancelled() {
            return DocumentOutcome::Cancelled;
        }
        let fail = |err: PipelineError| {
            tracing::warn!(document_id = doc.id(), kind = ?err.failure_kind(), error = %err, "Document failed");
            DocumentOutcome::Failed(DocumentFailure {
                document_id: doc.id().to_string(),
                kind: err.failure_kind(),
                message: err.to_string(),
            })
        };

        match self.store.is_processed(doc.id()) {
            Ok(true) if !self.reprocess => {
                tracing::debug!(document_id = doc.id(), "Already processed, skipping");
                return DocumentOutcome::Skipped;
            }
            Ok(_) => {}
            Err(err) => return fail(err),
        }

        match self.process_unit(council, doc) {
            Ok(stats) => DocumentOutcome::Succeeded(stats),
            Err(err) => fail(err),
        }
    }

    fn drafts_for(&self, doc: &RawDocument) -> Result<(Vec<RecordDraft>, ExtractionMethod, usize), PipelineError> {
        if doc.text().trim().is_empty() {
            return Err(PipelineError::NoRecordsExtracted(doc.id().to_string()));
        }
        let ctx = ExtractionContext {
            extra_fields: &self.field_schema,
        };
        match extract::extract(doc.format(), doc.text(), &ctx) {
            Ok(drafts) if !drafts.is_empty() => return Ok((drafts, ExtractionMethod::Rules, 0)),
            Ok(_) => {
                tracing::info!(document_id = doc.id(), format = %doc.format(), "Rule set found no records, using fallback");
            }
            Err(
                err @ (PipelineError::UnsupportedFormat(_) | PipelineError::MissingCaseBoundary(_)),
            ) => {
                tracing::info!(document_id = doc.id(), reason = %err, "Routing to fallback inference");
            }
            Err(err) => return Err(err),
        }
        let output = self.fallback.infer(doc.id(), doc.text())?;
        Ok((output.drafts, ExtractionMethod::Fallback, output.rejected))
    }

    fn canonical(&self, id: Option<String>) -> Result<Option<String>, PipelineError> {
        match id {
            Some(id) => Ok(Some(self.resolver.canonical_id(&id)?.unwrap_or(id))),
            None => Ok(None),
        }
    }

    fn process_unit(&self, council: &str, doc: &RawDocument) -> Result<DocumentStats, PipelineError> {
        let (drafts, extraction, rejected) = self.drafts_for(doc)?;
        if drafts.is_empty() {
            return Err(PipelineError::NoRecordsExtracted(doc.id().to_string()));
        }

        let mut stats = DocumentStats {
            rejected,
            ..DocumentStats::default()
        };
        let mut records: Vec<VotingRecord> = Vec::with_capacity(drafts.len());
        for (ordinal, draft) in drafts.into_iter().enumerate() {
            let NormalizedRecord {
                mut record,
                movant_hint,
            } = normalize(draft, doc.id(), ordinal as u32, doc.meeting_date(), extraction);

            if let Some(name) = record.movant.as_deref() {
                if let Some(resolution) = self.resolver.resolve(name, movant_hint.as_ref())? {
                    stats.observe(&resolution.event);
                    record.movant_id = Some(resolution.representative_id);
                }
            }
            if let Some(name) = record.second.as_deref() {
                if let Some(resolution) = self.resolver.resolve(name, None)? {
                    stats.observe(&resolution.event);
                    record.second_id = Some(resolution.representative_id);
                }
            }
            records.push(record);
        }

        // Later names in the document may have merged earlier identities.
        for record in &mut records {
            record.movant_id = self.canonical(record.movant_id.take())?;
            record.second_id = self.canonical(record.second_id.take())?;
            if record.movant_id.is_some() && record.movant_id == record.second_id {
                tracing::warn!(
                    document_id = doc.id(),
                    case_ordinal = record.case_ordinal,
                    representative = ?record.movant_id,
                    "Movant and second resolve to the same representative"
                );
                record.anomalies.push(ANOMALY_MOVANT_EQUALS_SECOND.to_string());
            }
            stats.anomalies += record.anomalies.len();
        }
        stats.records = records.len();

        let receipt = DocumentReceipt {
            document_id: doc.id().to_string(),
            council: council.to_string(),
            meeting_date: doc.meeting_date().map(iso_date),
            format: doc.format(),
            extraction,
        };
        self.store.replace_document_records(&receipt, &records)?;
        tracing::debug!(document_id = doc.id(), records = stats.records, "Document persisted");
        Ok(stats)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::source::{DirectorySource, MemorySource};
    use time::macros::date;

    const MINUTES: &str = "Case Number: 23-ZONE-0087\n\
        Council District: 5\n\
        MOVANT: Jane Smith\n\
        SECOND: Robert Doe\n\
        Rezoning Action: APPROVED [UNANIMOUS]\n";

    fn orchestrator(docs: Vec<RawDocument>, store: Arc<SqliteStore>) -> BatchOrchestrator {
        orchestrator_over(Arc::new(MemorySource::new(docs)), store)
    }

    fn orchestrator_over(source: Arc<dyn DocumentSource>, store: Arc<SqliteStore>) -> BatchOrchestrator {
        let store: Arc<dyn VotingStore> = store;
        let resolver =
            RepresentativeResolver::from_config(store.clone(), &Default::default()).unwrap();
        BatchOrchestrator::new(
            source,
            store,
            Arc::new(resolver),
            FallbackAdapter::disabled(),
            &PipelineConfig::default(),
        )
        .unwrap()
    }

    fn range() -> TimeRange {
        TimeRange::parse("2024-01-01", "2024-12-31").unwrap()
    }

    #[test]
    fn cancelled_batch_writes_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let docs = vec![RawDocument::new("d1", MINUTES, Some(date!(2024 - 03 - 14)))];
        let orch = orchestrator(docs, store.clone());
        let token = CancellationToken::new();
        token.cancel();
        let result = orch.run("metro", &range(), &token);
        assert_eq!(result.documents_cancelled, 1);
        assert_eq!(result.documents_attempted, 0);
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn same_person_moving_and_seconding_is_flagged() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let text = MINUTES.replace("SECOND: Robert Doe", "SECOND: JANE SMITH");
        let docs = vec![RawDocument::new("d1", text, Some(date!(2024 - 03 - 14)))];
        let orch = orchestrator(docs, store.clone());
        let result = orch.run("metro", &range(), &CancellationToken::new());
        assert_eq!(result.documents_succeeded, 1);
        assert_eq!(result.anomalies, 1);
        let records = store.records_for_document("d1").unwrap();
        assert_eq!(records[0].movant_id, records[0].second_id);
        assert_eq!(records[0].anomalies, vec![ANOMALY_MOVANT_EQUALS_SECOND.to_string()]);
    }

    #[test]
    fn empty_document_fails_without_fallback() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let docs = vec![RawDocument::new("blank", "   \n", Some(date!(2024 - 03 - 14)))];
        let orch = orchestrator(docs, store);
        let result = orch.run("metro", &range(), &CancellationToken::new());
        assert_eq!(result.documents_failed, 1);
        assert_eq!(
            result.failures[0].kind,
            crate::schema::FailureKind::NoRecordsExtracted
        );
    }

    #[test]
    fn unreadable_file_does_not_abort_the_batch() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("metro");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2024-03-14-good.txt"), MINUTES).unwrap();
        std::fs::write(dir.join("2024-03-15-bad.txt"), b"\xff\xfe").unwrap();

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = orchestrator_over(Arc::new(DirectorySource::new(root.path())), store.clone());
        let result = orch.run("metro", &range(), &CancellationToken::new());

        assert_eq!(result.documents_found, 2);
        assert_eq!(result.documents_attempted, 2);
        assert_eq!(result.documents_succeeded, 1);
        assert_eq!(result.documents_failed, 1);
        assert_eq!(result.failures[0].document_id, "2024-03-15-bad");
        assert_eq!(store.records_for_document("2024-03-14-good").unwrap().len(), 1);
    }
}
