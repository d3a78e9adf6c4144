use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use time::{Date, Month};

use crate::error::PipelineError;
use crate::schema::{DocumentFailure, RawDocument, TimeRange};

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap());

static LONG_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .unwrap()
});

/// What a source found for one council and date range.
#[derive(Debug, Default)]
pub struct SourceListing {
    /// Readable documents dated within the range, ordered by (date, id).
    pub documents: Vec<RawDocument>,
    /// Documents that exist but could not be read. They fail on their own
    /// without holding back the rest of the batch.
    pub unreadable: Vec<DocumentFailure>,
}

/// Supplies already-extracted minutes text for a council and date range.
pub trait DocumentSource: Send + Sync {
    /// An `Err` means the source itself is unusable (e.g. no such council).
    fn documents(&self, council: &str, range: &TimeRange) -> Result<SourceListing, PipelineError>;
}

fn month_from_name(name: &str) -> Option<Month> {
    let month = match name.get(..3)?.to_ascii_lowercase().as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(month)
}

pub fn date_from_name(name: &str) -> Option<Date> {
    ISO_DATE.captures_iter(name).find_map(|caps| {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let month: u8 = caps.get(2)?.as_str().parse().ok()?;
        let day = caps.get(3)?.as_str().parse().ok()?;
        Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
    })
}

/// First "March 14, 2024" style date in the text.
pub fn date_from_text(text: &str) -> Option<Date> {
    LONG_DATE.captures_iter(text).find_map(|caps| {
        let month = month_from_name(caps.get(1)?.as_str())?;
        let day = caps.get(2)?.as_str().parse().ok()?;
        let year = caps.get(3)?.as_str().parse().ok()?;
        Date::from_calendar_date(year, month, day).ok()
    })
}

fn in_range(mut docs: Vec<RawDocument>, range: &TimeRange) -> Vec<RawDocument> {
    docs.retain(|doc| doc.meeting_date().is_some_and(|date| range.contains(date)));
    docs.sort_by(|a, b| {
        a.meeting_date()
            .cmp(&b.meeting_date())
            .then_with(|| a.id().cmp(b.id()))
    });
    docs
}

/// Text files laid out as `<root>/<council>/<name>.txt`.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn unreadable(stem: &str, path: &Path, err: std::io::Error) -> DocumentFailure {
        let err = PipelineError::from(err);
        tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable document");
        DocumentFailure {
            document_id: stem.to_string(),
            kind: err.failure_kind(),
            message: format!("{}: {err}", path.display()),
        }
    }
}

impl DocumentSource for DirectorySource {
    fn documents(&self, council: &str, range: &TimeRange) -> Result<SourceListing, PipelineError> {
        let dir = self.root.join(council);
        let mut docs = Vec::new();
        let mut unreadable = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "Skipping directory entry");
                    continue;
                }
            };
            let is_text = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
            if !path.is_file() || !is_text {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(text) => {
                    let date = date_from_name(stem).or_else(|| date_from_text(&text));
                    if date.is_none() {
                        tracing::debug!(path = %path.display(), "Skipping undated document");
                    }
                    docs.push(RawDocument::new(stem, text, date));
                }
                // Without its text only the file name can place it in time.
                Err(err) if date_from_name(stem).is_none_or(|date| range.contains(date)) => {
                    unreadable.push(Self::unreadable(stem, &path, err));
                }
                Err(_) => {}
            }
        }
        unreadable.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(SourceListing {
            documents: in_range(docs, range),
            unreadable,
        })
    }
}

/// Fixed set of documents, used by tests and embedding callers.
pub struct MemorySource {
    documents: Vec<RawDocument>,
}

impl MemorySource {
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self { documents }
    }
}

impl DocumentSource for MemorySource {
    fn documents(&self, _council: &str, range: &TimeRange) -> Result<SourceListing, PipelineError> {
        Ok(SourceListing {
            documents: in_range(self.documents.clone(), range),
            unreadable: Vec::new(),
        })
    }
}
