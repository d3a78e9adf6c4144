//! Field Extractor: per-format rule sets selected through a strategy table.
//!
//! Each rule set is a pure function from document text to record drafts.
//! Supporting a new layout means adding one entry to [`STRATEGIES`].

pub mod fields;
pub mod format_a;
pub mod format_b;
pub mod standard;

use regex::Regex;

use crate::config::FieldSpec;
use crate::error::PipelineError;
use crate::schema::{DocumentFormat, RecordDraft};

/// Inputs shared by every rule set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionContext<'a> {
    /// Council-declared labels captured into `RecordDraft::fields`.
    pub extra_fields: &'a [FieldSpec],
}

pub type ExtractFn =
    fn(&str, &ExtractionContext<'_>) -> Result<Vec<RecordDraft>, PipelineError>;

static STRATEGIES: [(DocumentFormat, ExtractFn); 3] = [
    (DocumentFormat::FormatA, format_a::extract),
    (DocumentFormat::FormatB, format_b::extract),
    (DocumentFormat::FormatStandard, standard::extract),
];

pub fn strategy_for(format: DocumentFormat) -> Option<ExtractFn> {
    STRATEGIES
        .iter()
        .find(|(tag, _)| *tag == format)
        .map(|(_, extract)| *extract)
}

/// Run the rule set for `format`. `UNKNOWN` has none and reports
/// `UnsupportedFormat`; a missing case marker reports `MissingCaseBoundary`.
pub fn extract(
    format: DocumentFormat,
    text: &str,
    ctx: &ExtractionContext<'_>,
) -> Result<Vec<RecordDraft>, PipelineError> {
    let rule_set = strategy_for(format).ok_or(PipelineError::UnsupportedFormat(format))?;
    let drafts = rule_set(text, ctx)?;
    tracing::debug!(format = %format, drafts = drafts.len(), "Rule set finished");
    Ok(drafts)
}

/// Slice of the document belonging to one case.
#[derive(Debug)]
pub(crate) struct Block<'t> {
    pub case_number: Option<String>,
    pub text: &'t str,
    /// Offset within `text` just past the boundary marker.
    pub header_end: usize,
}

/// Split at every boundary match; text before the first match is dropped.
/// The boundary regex must name its case-number group `case`.
pub(crate) fn split_blocks<'t>(text: &'t str, boundary: &Regex) -> Vec<Block<'t>> {
    let starts: Vec<(usize, usize, Option<String>)> = boundary
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let case = caps.name("case").map(|m| m.as_str().trim().to_string());
            Some((whole.start(), whole.end(), case))
        })
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, (start, end, case))| {
            let stop = starts.get(i + 1).map_or(text.len(), |next| next.0);
            Block {
                case_number: case.clone(),
                text: &text[*start..stop],
                header_end: end - start,
            }
        })
        .collect()
}
