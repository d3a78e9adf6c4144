use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use time::Date;

use crate::detect::detect_format;
use crate::error::PipelineError;

/// Vendor layout of a minutes document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentFormat {
    FormatA,
    FormatB,
    FormatStandard,
    Unknown,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormatA => "FORMAT_A",
            Self::FormatB => "FORMAT_B",
            Self::FormatStandard => "FORMAT_STANDARD",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted text of one minutes document. The format tag is computed when
/// the text is captured and the value is immutable afterwards.
#[derive(Debug, Clone)]
pub struct RawDocument {
    id: String,
    text: String,
    meeting_date: Option<Date>,
    format: DocumentFormat,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, meeting_date: Option<Date>) -> Self {
        let text = text.into();
        let format = detect_format(&text);
        Self {
            id: id.into(),
            text,
            meeting_date,
            format,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn meeting_date(&self) -> Option<Date> {
        self.meeting_date
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseCategory {
    Rezoning,
    Ordinance,
    Budget,
    Other,
}

impl CaseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rezoning => "rezoning",
            Self::Ordinance => "ordinance",
            Self::Budget => "budget",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "rezoning" => Some(Self::Rezoning),
            "ordinance" => Some(Self::Ordinance),
            "budget" => Some(Self::Budget),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteResult {
    ApprovedUnanimous,
    ApprovedSplit,
    Denied,
    Tabled,
    Unknown,
}

impl VoteResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovedUnanimous => "approved_unanimous",
            Self::ApprovedSplit => "approved_split",
            Self::Denied => "denied",
            Self::Tabled => "tabled",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved_unanimous" => Some(Self::ApprovedUnanimous),
            "approved_split" => Some(Self::ApprovedSplit),
            "denied" => Some(Self::Denied),
            "tabled" => Some(Self::Tabled),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Which path produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Rules,
    Fallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rules" => Some(Self::Rules),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// Where a district hint attached to a name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HintStrength {
    /// Stated with the name itself ("Jane Smith, District 5").
    Strict,
    /// Inferred from the case's council district.
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistrictHint {
    pub district: String,
    pub strength: HintStrength,
}

impl DistrictHint {
    pub fn strict(district: impl Into<String>) -> Self {
        Self {
            district: district.into(),
            strength: HintStrength::Strict,
        }
    }

    pub fn soft(district: impl Into<String>) -> Self {
        Self {
            district: district.into(),
            strength: HintStrength::Soft,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strength == HintStrength::Strict
    }
}

/// Fields pulled out of one case block before normalization. Every value is
/// the raw text as it appeared in the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub case_number: Option<String>,
    pub district: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub movant: Option<String>,
    pub second: Option<String>,
    pub vote_text: Option<String>,
    pub action_label: Option<String>,
    /// Category stated by the fallback service, if any.
    pub category_hint: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub raw_text: String,
}

/// One discrete voting action found in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VotingRecord {
    pub document_id: String,
    /// Zero-based position of the case within its document.
    pub case_ordinal: u32,
    /// ISO-8601 date (YYYY-MM-DD).
    pub meeting_date: Option<String>,
    pub case_number: Option<String>,
    pub category: CaseCategory,
    pub district: Option<String>,
    pub location: Option<String>,
    pub movant: Option<String>,
    pub second: Option<String>,
    pub vote_result: VoteResult,
    /// Vote text exactly as written in the source.
    pub vote_result_text: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub movant_id: Option<String>,
    pub second_id: Option<String>,
    pub extraction: ExtractionMethod,
    pub anomalies: Vec<String>,
    /// Source text the record was derived from, kept for audit.
    pub raw_text: String,
}

/// Canonical identity of an elected representative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Representative {
    pub id: String,
    pub canonical_name: String,
    pub district: Option<String>,
    pub aliases: BTreeSet<String>,
    /// Aliases attached by fuzzy matching only.
    pub weak_aliases: BTreeSet<String>,
    pub record_count: u64,
    pub created_seq: u64,
    /// Created while deferring an ambiguous match.
    pub provisional: bool,
    pub merged_into: Option<String>,
}

impl Representative {
    pub fn is_active(&self) -> bool {
        self.merged_into.is_none()
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: Date,
    end: Date,
}

impl TimeRange {
    pub fn new(start: Date, end: Date) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidTimeRange(format!(
                "{} is after {}",
                iso_date(start),
                iso_date(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, PipelineError> {
        Self::new(parse_iso_date(start)?, parse_iso_date(end)?)
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

pub fn parse_iso_date(value: &str) -> Result<Date, PipelineError> {
    Date::parse(
        value.trim(),
        time::macros::format_description!("[year]-[month]-[day]"),
    )
    .map_err(|e| PipelineError::InvalidTimeRange(format!("{value}: {e}")))
}

pub fn iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoRecordsExtracted,
    FallbackTransportFailed,
    PersistenceConflict,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentFailure {
    pub document_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Summary of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingResult {
    pub council: String,
    pub range_start: String,
    pub range_end: String,
    pub documents_found: usize,
    pub documents_skipped: usize,
    pub documents_attempted: usize,
    pub documents_succeeded: usize,
    pub documents_failed: usize,
    pub documents_cancelled: usize,
    pub records_extracted: usize,
    pub records_rejected: usize,
    pub new_representatives: usize,
    pub alias_additions: usize,
    pub merged_representatives: usize,
    pub merge_conflicts: usize,
    pub anomalies: usize,
    pub failures: Vec<DocumentFailure>,
    pub completed_at: String,
}
