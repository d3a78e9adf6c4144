//! Agenda-management export: numbered agenda items (`4. O-112-24 AN
//! ORDINANCE ...`) followed by upper-case `RESULT:`, `MOVER:` and
//! `SECONDER:` lines and a roll call.

use regex::Regex;
use std::sync::LazyLock;

use super::fields::{self, FieldTarget, LabelSet};
use super::{split_blocks, ExtractionContext};
use crate::error::PipelineError;
use crate::resolver::names::collapse_whitespace;
use crate::schema::{DocumentFormat, RecordDraft};

static AGENDA_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\d{1,3}\.[ \t]+(?P<case>[A-Z0-9]+(?:-[A-Z0-9]+)*-\d+)\b[ \t]*")
        .unwrap()
});

fn labels(ctx: &ExtractionContext<'_>) -> Result<LabelSet, PipelineError> {
    let mut labels = vec![
        (FieldTarget::Vote, "RESULT".to_string()),
        (FieldTarget::Movant, "MOVER".to_string()),
        (FieldTarget::Second, "SECONDER".to_string()),
        (FieldTarget::District, r"(?i:council[ \t]+district)".to_string()),
        (FieldTarget::Location, r"(?i:location)".to_string()),
    ];
    for key in ["AYES", "NAYS", "ABSENT", "ABSTAIN", "RECUSED", "EXCUSED"] {
        labels.push((FieldTarget::Extra(key.to_lowercase()), key.to_string()));
    }
    labels.push((FieldTarget::Extra("sponsors".into()), r"(?i:sponsors?)".to_string()));
    LabelSet::new(labels, ctx.extra_fields)
}

pub fn extract(text: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<RecordDraft>, PipelineError> {
    let blocks = split_blocks(text, &AGENDA_ITEM);
    if blocks.is_empty() {
        return Err(PipelineError::MissingCaseBoundary(DocumentFormat::FormatA));
    }
    let labels = labels(ctx)?;

    Ok(blocks
        .into_iter()
        .map(|block| {
            let hits = labels.scan(block.text);
            // The item title runs from the file id to the first label.
            let body = &block.text[block.header_end..];
            let title_end = hits
                .first()
                .map_or(body.len(), |hit| hit.start.saturating_sub(block.header_end));
            let title = collapse_whitespace(&body[..title_end.min(body.len())]);

            let mut draft = RecordDraft {
                case_number: block.case_number,
                description: (!title.is_empty()).then_some(title),
                raw_text: block.text.trim().to_string(),
                ..RecordDraft::default()
            };
            fields::apply(&mut draft, hits);
            draft
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "City Council Meeting Minutes - Final\n\
        Tuesday, May 7, 2024\n\
        4. O-112-24 AN ORDINANCE amending Chapter 32 of the\n\
        Metro Code relating to short-term rentals\n\
        Sponsors: Jane Smith\n\
        RESULT: ADOPTED [UNANIMOUS]\n\
        MOVER: Jane Smith, District 5\n\
        SECONDER: Robert Doe, District 7\n\
        AYES: Smith, Doe, Lee, Park\n\
        5. BL2024-301 A resolution approving the operating budget\n\
        RESULT: APPROVED [8 TO 3]\n\
        MOVER: Ann Lee\n\
        SECONDER: Robert Doe\n\
        AYES: Lee, Doe\n\
        NAYS: Park\n";

    #[test]
    fn numbered_items_become_drafts() {
        let drafts = extract(EXPORT, &ExtractionContext::default()).unwrap();
        assert_eq!(drafts.len(), 2);

        let first = &drafts[0];
        assert_eq!(first.case_number.as_deref(), Some("O-112-24"));
        assert_eq!(
            first.description.as_deref(),
            Some("AN ORDINANCE amending Chapter 32 of the Metro Code relating to short-term rentals")
        );
        assert_eq!(first.vote_text.as_deref(), Some("ADOPTED [UNANIMOUS]"));
        assert_eq!(first.movant.as_deref(), Some("Jane Smith, District 5"));
        assert_eq!(first.second.as_deref(), Some("Robert Doe, District 7"));
        assert_eq!(first.fields.get("ayes").map(String::as_str), Some("Smith, Doe, Lee, Park"));
        assert_eq!(first.fields.get("sponsors").map(String::as_str), Some("Jane Smith"));

        let second = &drafts[1];
        assert_eq!(second.case_number.as_deref(), Some("BL2024-301"));
        assert_eq!(second.vote_text.as_deref(), Some("APPROVED [8 TO 3]"));
        assert_eq!(second.fields.get("nays").map(String::as_str), Some("Park"));
    }

    #[test]
    fn lower_case_result_is_not_a_label() {
        let drafts = extract(
            "1. R-1-24 Resolution\nresult: maybe\nRESULT: TABLED\nMOVER: Ann Lee\n",
            &ExtractionContext::default(),
        )
        .unwrap();
        assert_eq!(drafts[0].vote_text.as_deref(), Some("TABLED"));
    }

    #[test]
    fn export_without_agenda_items_has_no_boundary() {
        let err = extract("RESULT: ADOPTED\nMOVER: Jane Smith\n", &ExtractionContext::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingCaseBoundary(DocumentFormat::FormatA)));
    }
}
