use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::config::StorageSection;
use crate::error::PipelineError;
use crate::schema::{
    CaseCategory, DocumentFormat, ExtractionMethod, Representative, VoteResult, VotingRecord,
};

/// Ledger entry written alongside a document's records.
#[derive(Debug, Clone)]
pub struct DocumentReceipt {
    pub document_id: String,
    pub council: String,
    pub meeting_date: Option<String>,
    pub format: DocumentFormat,
    pub extraction: ExtractionMethod,
}

/// Persistence contract for voting records and representatives. Every write
/// is an upsert so re-running a batch never duplicates rows.
pub trait VotingStore: Send + Sync {
    fn load_representatives(&self) -> Result<Vec<Representative>, PipelineError>;

    fn upsert_representative(&self, rep: &Representative) -> Result<(), PipelineError>;

    /// Persist a merge: `absorbed` carries `merged_into`, `survivor` the
    /// combined alias set. Record references move in the same transaction.
    fn merge_representatives(
        &self,
        absorbed: &Representative,
        survivor: &Representative,
    ) -> Result<(), PipelineError>;

    /// Upsert all records of one document, keyed by (document id, case
    /// ordinal), and mark the document processed.
    fn replace_document_records(
        &self,
        receipt: &DocumentReceipt,
        records: &[VotingRecord],
    ) -> Result<(), PipelineError>;

    fn is_processed(&self, document_id: &str) -> Result<bool, PipelineError>;

    fn record_count(&self) -> Result<usize, PipelineError>;

    fn records_for_document(&self, document_id: &str) -> Result<Vec<VotingRecord>, PipelineError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_millis(25),
        }
    }
}

impl From<&StorageSection> for RetryPolicy {
    fn from(section: &StorageSection) -> Self {
        Self {
            max_attempts: section.max_write_attempts.max(1),
            backoff_base: Duration::from_millis(section.backoff_base_ms),
        }
    }
}

pub fn open(db_path: &str) -> Result<Connection, PipelineError> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_millis(250))?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<(), PipelineError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
          id TEXT PRIMARY KEY,
          council TEXT NOT NULL,
          meeting_date TEXT,
          format TEXT NOT NULL,
          extraction TEXT NOT NULL,
          record_count INTEGER NOT NULL,
          processed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS representatives (
          id TEXT PRIMARY KEY,
          canonical_name TEXT NOT NULL,
          district TEXT,
          record_count INTEGER NOT NULL DEFAULT 0,
          created_seq INTEGER NOT NULL,
          provisional INTEGER NOT NULL DEFAULT 0,
          merged_into TEXT,
          updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE TABLE IF NOT EXISTS representative_aliases (
          alias TEXT PRIMARY KEY,
          representative_id TEXT NOT NULL,
          weak INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS voting_records (
          document_id TEXT NOT NULL,
          case_ordinal INTEGER NOT NULL,
          meeting_date TEXT,
          case_number TEXT,
          category TEXT NOT NULL,
          district TEXT,
          location TEXT,
          movant TEXT,
          second TEXT,
          vote_result TEXT NOT NULL,
          vote_result_text TEXT,
          fields_json TEXT NOT NULL,
          movant_id TEXT,
          second_id TEXT,
          extraction TEXT NOT NULL,
          anomalies_json TEXT NOT NULL,
          raw_text TEXT NOT NULL,
          inserted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
          PRIMARY KEY (document_id, case_ordinal)
        );

        CREATE INDEX IF NOT EXISTS idx_aliases_rep ON representative_aliases(representative_id);
        CREATE INDEX IF NOT EXISTS idx_records_movant ON voting_records(movant_id);
        CREATE INDEX IF NOT EXISTS idx_records_second ON voting_records(second_id);
        CREATE INDEX IF NOT EXISTS idx_records_meeting_date ON voting_records(meeting_date);
        "#,
    )?;
    Ok(())
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

/// SQLite-backed store. One connection guarded by a mutex; busy or locked
/// errors from other processes are retried with exponential backoff.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
}

impl SqliteStore {
    pub fn open(db_path: &str, retry: RetryPolicy) -> Result<Self, PipelineError> {
        Ok(Self {
            conn: Mutex::new(open(db_path)?),
            retry,
        })
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory()?;
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            retry: RetryPolicy::default(),
        })
    }

    fn with_retry<T>(
        &self,
        mut op: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, PipelineError> {
        let mut attempt = 1;
        loop {
            let result = {
                let mut conn = self
                    .conn
                    .lock()
                    .map_err(|_| PipelineError::LockPoisoned("sqlite connection"))?;
                op(&mut conn)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) if is_contention(&err) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(PipelineError::PersistenceConflict {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }
                    let delay = self.retry.backoff_base * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(attempt, ?delay, "Database busy, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn write_representative(conn: &Connection, rep: &Representative) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO representatives (
          id, canonical_name, district, record_count, created_seq, provisional, merged_into
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
          canonical_name=excluded.canonical_name,
          district=excluded.district,
          record_count=excluded.record_count,
          created_seq=excluded.created_seq,
          provisional=excluded.provisional,
          merged_into=excluded.merged_into,
          updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')
        "#,
        params![
            rep.id,
            rep.canonical_name,
            rep.district,
            rep.record_count as i64,
            rep.created_seq as i64,
            rep.provisional,
            rep.merged_into
        ],
    )?;

    conn.execute(
        "DELETE FROM representative_aliases WHERE representative_id = ?1",
        params![rep.id],
    )?;
    for alias in &rep.aliases {
        conn.execute(
            r#"
            INSERT INTO representative_aliases (alias, representative_id, weak)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(alias) DO UPDATE SET
              representative_id=excluded.representative_id,
              weak=excluded.weak
            "#,
            params![alias, rep.id, rep.weak_aliases.contains(alias)],
        )?;
    }
    Ok(())
}

fn write_record(conn: &Connection, record: &VotingRecord) -> rusqlite::Result<()> {
    let fields_json = serde_json::to_string(&record.fields)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let anomalies_json = serde_json::to_string(&record.anomalies)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        r#"
        INSERT INTO voting_records (
          document_id, case_ordinal, meeting_date, case_number, category,
          district, location, movant, second, vote_result, vote_result_text,
          fields_json, movant_id, second_id, extraction, anomalies_json, raw_text
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(document_id, case_ordinal) DO UPDATE SET
          meeting_date=excluded.meeting_date,
          case_number=excluded.case_number,
          category=excluded.category,
          district=excluded.district,
          location=excluded.location,
          movant=excluded.movant,
          second=excluded.second,
          vote_result=excluded.vote_result,
          vote_result_text=excluded.vote_result_text,
          fields_json=excluded.fields_json,
          movant_id=excluded.movant_id,
          second_id=excluded.second_id,
          extraction=excluded.extraction,
          anomalies_json=excluded.anomalies_json,
          raw_text=excluded.raw_text
        "#,
        params![
            record.document_id,
            record.case_ordinal as i64,
            record.meeting_date,
            record.case_number,
            record.category.as_str(),
            record.district,
            record.location,
            record.movant,
            record.second,
            record.vote_result.as_str(),
            record.vote_result_text,
            fields_json,
            record.movant_id,
            record.second_id,
            record.extraction.as_str(),
            anomalies_json,
            record.raw_text
        ],
    )?;
    Ok(())
}

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl VotingStore for SqliteStore {
    fn load_representatives(&self) -> Result<Vec<Representative>, PipelineError> {
        self.with_retry(|conn| {
            let mut aliases: HashMap<String, Vec<(String, bool)>> = HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT alias, representative_id, weak FROM representative_aliases ORDER BY alias",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })?;
            for r in rows {
                let (alias, rep_id, weak) = r?;
                aliases.entry(rep_id).or_default().push((alias, weak));
            }

            let mut stmt = conn.prepare(
                r#"
                SELECT id, canonical_name, district, record_count, created_seq, provisional, merged_into
                FROM representatives
                ORDER BY created_seq
                "#,
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Representative {
                    id: row.get(0)?,
                    canonical_name: row.get(1)?,
                    district: row.get(2)?,
                    aliases: BTreeSet::new(),
                    weak_aliases: BTreeSet::new(),
                    record_count: row.get::<_, i64>(3)?.max(0) as u64,
                    created_seq: row.get::<_, i64>(4)?.max(0) as u64,
                    provisional: row.get(5)?,
                    merged_into: row.get(6)?,
                })
            })?;

            let mut reps = Vec::new();
            for r in rows {
                let mut rep = r?;
                for (alias, weak) in aliases.remove(&rep.id).unwrap_or_default() {
                    if weak {
                        rep.weak_aliases.insert(alias.clone());
                    }
                    rep.aliases.insert(alias);
                }
                reps.push(rep);
            }
            Ok(reps)
        })
    }

    fn upsert_representative(&self, rep: &Representative) -> Result<(), PipelineError> {
        self.with_retry(|conn| {
            let tx = conn.transaction()?;
            write_representative(&tx, rep)?;
            tx.commit()
        })
    }

    fn merge_representatives(
        &self,
        absorbed: &Representative,
        survivor: &Representative,
    ) -> Result<(), PipelineError> {
        self.with_retry(|conn| {
            let tx = conn.transaction()?;
            write_representative(&tx, absorbed)?;
            write_representative(&tx, survivor)?;
            tx.execute(
                "UPDATE representatives SET merged_into = ?1 WHERE merged_into = ?2",
                params![survivor.id, absorbed.id],
            )?;
            tx.execute(
                "UPDATE voting_records SET movant_id = ?1 WHERE movant_id = ?2",
                params![survivor.id, absorbed.id],
            )?;
            tx.execute(
                "UPDATE voting_records SET second_id = ?1 WHERE second_id = ?2",
                params![survivor.id, absorbed.id],
            )?;
            tx.commit()
        })
    }

    fn replace_document_records(
        &self,
        receipt: &DocumentReceipt,
        records: &[VotingRecord],
    ) -> Result<(), PipelineError> {
        self.with_retry(|conn| {
            let tx = conn.transaction()?;
            for record in records {
                write_record(&tx, record)?;
            }
            tx.execute(
                "DELETE FROM voting_records WHERE document_id = ?1 AND case_ordinal >= ?2",
                params![receipt.document_id, records.len() as i64],
            )?;
            // A merge may have committed between resolution and this write.
            tx.execute(
                r#"
                UPDATE voting_records
                SET movant_id = (SELECT merged_into FROM representatives r WHERE r.id = voting_records.movant_id)
                WHERE document_id = ?1
                  AND movant_id IN (SELECT id FROM representatives WHERE merged_into IS NOT NULL)
                "#,
                params![receipt.document_id],
            )?;
            tx.execute(
                r#"
                UPDATE voting_records
                SET second_id = (SELECT merged_into FROM representatives r WHERE r.id = voting_records.second_id)
                WHERE document_id = ?1
                  AND second_id IN (SELECT id FROM representatives WHERE merged_into IS NOT NULL)
                "#,
                params![receipt.document_id],
            )?;
            tx.execute(
                r#"
                INSERT INTO documents (id, council, meeting_date, format, extraction, record_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                  council=excluded.council,
                  meeting_date=excluded.meeting_date,
                  format=excluded.format,
                  extraction=excluded.extraction,
                  record_count=excluded.record_count,
                  processed_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')
                "#,
                params![
                    receipt.document_id,
                    receipt.council,
                    receipt.meeting_date,
                    receipt.format.as_str(),
                    receipt.extraction.as_str(),
                    records.len() as i64
                ],
            )?;
            tx.commit()
        })
    }

    fn is_processed(&self, document_id: &str) -> Result<bool, PipelineError> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT 1 FROM documents WHERE id = ?1",
                params![document_id],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
        })
    }

    fn record_count(&self) -> Result<usize, PipelineError> {
        self.with_retry(|conn| {
            conn.query_row("SELECT COUNT(*) FROM voting_records", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|count| count.max(0) as usize)
    }

    fn records_for_document(&self, document_id: &str) -> Result<Vec<VotingRecord>, PipelineError> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT document_id, case_ordinal, meeting_date, case_number, category,
                       district, location, movant, second, vote_result, vote_result_text,
                       fields_json, movant_id, second_id, extraction, anomalies_json, raw_text
                FROM voting_records
                WHERE document_id = ?1
                ORDER BY case_ordinal
                "#,
            )?;
            let rows = stmt.query_map(params![document_id], |row| {
                let category: String = row.get(4)?;
                let vote_result: String = row.get(9)?;
                let fields_json: String = row.get(11)?;
                let extraction: String = row.get(14)?;
                let anomalies_json: String = row.get(15)?;
                let fields: BTreeMap<String, String> = json_column(11, &fields_json)?;
                Ok(VotingRecord {
                    document_id: row.get(0)?,
                    case_ordinal: row.get::<_, i64>(1)?.max(0) as u32,
                    meeting_date: row.get(2)?,
                    case_number: row.get(3)?,
                    category: CaseCategory::parse(&category).unwrap_or(CaseCategory::Other),
                    district: row.get(5)?,
                    location: row.get(6)?,
                    movant: row.get(7)?,
                    second: row.get(8)?,
                    vote_result: VoteResult::parse(&vote_result).unwrap_or(VoteResult::Unknown),
                    vote_result_text: row.get(10)?,
                    fields,
                    movant_id: row.get(12)?,
                    second_id: row.get(13)?,
                    extraction: ExtractionMethod::parse(&extraction)
                        .unwrap_or(ExtractionMethod::Rules),
                    anomalies: json_column(15, &anomalies_json)?,
                    raw_text: row.get(16)?,
                })
            })?;
            rows.collect()
        })
    }
}

/// Ids referenced by stored records that no longer name an active
/// representative.
pub fn dangling_references(conn: &Connection) -> Result<Vec<String>, PipelineError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT DISTINCT ref FROM (
          SELECT movant_id AS ref FROM voting_records WHERE movant_id IS NOT NULL
          UNION
          SELECT second_id AS ref FROM voting_records WHERE second_id IS NOT NULL
        )
        WHERE ref NOT IN (SELECT id FROM representatives WHERE merged_into IS NULL)
        ORDER BY ref
        "#,
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for r in rows {
        ids.push(r?);
    }
    Ok(ids)
}

impl SqliteStore {
    pub fn dangling_references(&self) -> Result<Vec<String>, PipelineError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| PipelineError::LockPoisoned("sqlite connection"))?;
        dangling_references(&conn)
    }

    pub fn find_document(&self, document_id: &str) -> Result<Option<i64>, PipelineError> {
        self.with_retry(|conn| {
            conn.query_row(
                "SELECT record_count FROM documents WHERE id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(id: &str, seq: u64, aliases: &[&str]) -> Representative {
        Representative {
            id: id.to_string(),
            canonical_name: aliases.first().copied().unwrap_or_default().to_string(),
            district: None,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            weak_aliases: BTreeSet::new(),
            record_count: 1,
            created_seq: seq,
            provisional: false,
            merged_into: None,
        }
    }

    fn record(doc: &str, ordinal: u32, movant_id: Option<&str>) -> VotingRecord {
        VotingRecord {
            document_id: doc.to_string(),
            case_ordinal: ordinal,
            meeting_date: Some("2024-03-14".to_string()),
            case_number: Some(format!("24-ZONE-{ordinal:04}")),
            category: CaseCategory::Rezoning,
            district: Some("5".to_string()),
            location: None,
            movant: Some("Jane Smith".to_string()),
            second: None,
            vote_result: VoteResult::ApprovedUnanimous,
            vote_result_text: Some("APPROVED [UNANIMOUS]".to_string()),
            fields: BTreeMap::new(),
            movant_id: movant_id.map(str::to_string),
            second_id: None,
            extraction: ExtractionMethod::Rules,
            anomalies: Vec::new(),
            raw_text: "MOVANT: Jane Smith".to_string(),
        }
    }

    fn receipt(doc: &str) -> DocumentReceipt {
        DocumentReceipt {
            document_id: doc.to_string(),
            council: "metro".to_string(),
            meeting_date: Some("2024-03-14".to_string()),
            format: DocumentFormat::FormatStandard,
            extraction: ExtractionMethod::Rules,
        }
    }

    #[test]
    fn document_upsert_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let records = vec![record("d1", 0, None), record("d1", 1, None)];
        store.replace_document_records(&receipt("d1"), &records).unwrap();
        store.replace_document_records(&receipt("d1"), &records).unwrap();
        assert_eq!(store.record_count().unwrap(), 2);
        assert!(store.is_processed("d1").unwrap());
        assert!(!store.is_processed("d2").unwrap());

        store
            .replace_document_records(&receipt("d1"), &records[..1])
            .unwrap();
        assert_eq!(store.record_count().unwrap(), 1);
        assert_eq!(store.find_document("d1").unwrap(), Some(1));
    }

    #[test]
    fn records_round_trip_through_sql() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut original = record("d1", 0, Some("rep-00000"));
        original.fields.insert("ayes".into(), "Smith, Doe".into());
        original.anomalies.push("movant_equals_second".into());
        store
            .replace_document_records(&receipt("d1"), std::slice::from_ref(&original))
            .unwrap();
        let loaded = store.records_for_document("d1").unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn representatives_round_trip_with_weak_aliases() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut jane = rep("rep-00000", 0, &["Jane Smith", "Jane Smyth"]);
        jane.weak_aliases.insert("Jane Smyth".into());
        jane.district = Some("5".into());
        store.upsert_representative(&jane).unwrap();
        let loaded = store.load_representatives().unwrap();
        assert_eq!(loaded, vec![jane]);
    }

    #[test]
    fn merge_repoints_records_and_chains() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = rep("rep-00000", 0, &["Jane Smith"]);
        let b = rep("rep-00001", 1, &["J. Smith"]);
        let mut c = rep("rep-00002", 2, &[]);
        c.merged_into = Some(b.id.clone());
        for r in [&a, &b, &c] {
            store.upsert_representative(r).unwrap();
        }
        store
            .replace_document_records(&receipt("d1"), &[record("d1", 0, Some("rep-00001"))])
            .unwrap();

        let mut survivor = a.clone();
        survivor.aliases.insert("J. Smith".into());
        let mut absorbed = b.clone();
        absorbed.aliases.clear();
        absorbed.merged_into = Some(a.id.clone());
        store.merge_representatives(&absorbed, &survivor).unwrap();
        store.merge_representatives(&absorbed, &survivor).unwrap();

        let records = store.records_for_document("d1").unwrap();
        assert_eq!(records[0].movant_id.as_deref(), Some("rep-00000"));
        assert!(store.dangling_references().unwrap().is_empty());

        let reps = store.load_representatives().unwrap();
        let chained = reps.iter().find(|r| r.id == "rep-00002").unwrap();
        assert_eq!(chained.merged_into.as_deref(), Some("rep-00000"));
        let survivor = reps.iter().find(|r| r.id == "rep-00000").unwrap();
        assert!(survivor.aliases.contains("J. Smith"));
    }

    #[test]
    fn late_records_follow_an_earlier_merge() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = rep("rep-00000", 0, &["Jane Smith"]);
        let mut b = rep("rep-00001", 1, &[]);
        b.merged_into = Some(a.id.clone());
        store.upsert_representative(&a).unwrap();
        store.upsert_representative(&b).unwrap();

        store
            .replace_document_records(&receipt("d2"), &[record("d2", 0, Some("rep-00001"))])
            .unwrap();
        let records = store.records_for_document("d2").unwrap();
        assert_eq!(records[0].movant_id.as_deref(), Some("rep-00000"));
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("civic.sqlite");
        let conn = open(path.to_str().unwrap()).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
