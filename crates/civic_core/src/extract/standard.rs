//! Labeled minutes: each case opens with a `Case Number:` line followed by
//! `Council District:`, `MOVANT:`, `SECOND:` and `<Kind> Action:` fields.

use regex::Regex;
use std::sync::LazyLock;

use super::fields::{self, FieldTarget, LabelSet};
use super::{split_blocks, ExtractionContext};
use crate::error::PipelineError;
use crate::schema::{DocumentFormat, RecordDraft};

static CASE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*case[ \t]+(?:number|no\.?|#)[ \t]*:?[ \t]*(?P<case>[A-Z0-9][A-Z0-9-]*)")
        .unwrap()
});

/// Words accepted before `Action:`. The kind must sit on the label's own
/// line, otherwise the last word of the previous value would be taken.
const ACTION_KINDS: &str =
    r"(?:rezoning|zoning|zone[ \t]+change|ordinance|budget|resolution|council|committee|commission|board|final)";

fn labels(ctx: &ExtractionContext<'_>) -> Result<LabelSet, PipelineError> {
    LabelSet::new(
        vec![
            (FieldTarget::CaseNumber, r"(?i:case[ \t]+(?:number|no\.?|#))".into()),
            (FieldTarget::District, r"(?i:(?:council[ \t]+)?district)".into()),
            (
                FieldTarget::Location,
                r"(?i:location|property[ \t]+address|address|site)".into(),
            ),
            (
                FieldTarget::Description,
                r"(?i:request|description|subject|proposal|summary)".into(),
            ),
            (FieldTarget::Movant, r"(?i:movant|moved[ \t]+by|motion[ \t]+by)".into()),
            (FieldTarget::Second, r"(?i:second|seconded[ \t]+by)".into()),
            (FieldTarget::Vote, format!(r"(?i:(?:{ACTION_KINDS}[ \t]+)?action|vote|result|disposition)")),
        ],
        ctx.extra_fields,
    )
}

pub fn extract(text: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<RecordDraft>, PipelineError> {
    let blocks = split_blocks(text, &CASE_BOUNDARY);
    if blocks.is_empty() {
        return Err(PipelineError::MissingCaseBoundary(DocumentFormat::FormatStandard));
    }
    let labels = labels(ctx)?;

    Ok(blocks
        .into_iter()
        .map(|block| {
            let mut draft = RecordDraft {
                case_number: block.case_number,
                raw_text: block.text.trim().to_string(),
                ..RecordDraft::default()
            };
            fields::apply(&mut draft, labels.scan(block.text));
            draft
        })
        .collect())
}
