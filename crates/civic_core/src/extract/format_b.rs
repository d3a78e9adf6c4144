//! Pipe-delimited table export. Columns are mapped by header name, so their
//! order may vary between exports. A row whose case cell is empty continues
//! the wrapped cells of the row above.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::fields::FieldTarget;
use super::ExtractionContext;
use crate::error::PipelineError;
use crate::resolver::names::collapse_whitespace;
use crate::schema::{DocumentFormat, RecordDraft};

static SEPARATOR_ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\s|:+=-]+$").unwrap());

/// Split a row into cells. With `edged` rows the leading pipe is a border;
/// otherwise it marks an empty first cell.
fn split_cells(line: &str, edged: bool) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = match trimmed.strip_prefix('|') {
        Some(rest) if edged => rest,
        _ => trimmed,
    };
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(collapse_whitespace).collect()
}

fn header_key(cell: &str) -> String {
    let folded: String = cell
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&folded)
}

fn column_target(cell: &str, ctx: &ExtractionContext<'_>) -> Option<FieldTarget> {
    let key = header_key(cell);
    if key.is_empty() {
        return None;
    }
    if let Some(spec) = ctx
        .extra_fields
        .iter()
        .find(|spec| header_key(&spec.label) == key)
    {
        return Some(FieldTarget::Extra(spec.key.clone()));
    }
    let target = match key.as_str() {
        "case" | "case no" | "case number" => FieldTarget::CaseNumber,
        "district" | "council district" | "dist" | "cd" => FieldTarget::District,
        "location" | "address" | "property" | "property address" | "site" => FieldTarget::Location,
        "description" | "request" | "subject" | "item" | "proposal" => FieldTarget::Description,
        "motion" | "motion by" | "movant" | "mover" | "moved by" => FieldTarget::Movant,
        "second" | "seconded" | "seconded by" | "seconder" => FieldTarget::Second,
        "vote" | "result" | "action" | "disposition" | "vote result" => FieldTarget::Vote,
        other => FieldTarget::Extra(other.replace(' ', "_")),
    };
    Some(target)
}

/// Column targets when `line` is a header row naming both the case and the
/// second columns.
fn header_columns(line: &str, ctx: &ExtractionContext<'_>) -> Option<Table> {
    if !line.contains('|') {
        return None;
    }
    let edged = line.trim_start().starts_with('|');
    let columns: Vec<Option<FieldTarget>> = split_cells(line, edged)
        .iter()
        .map(|cell| column_target(cell, ctx))
        .collect();
    let case_col = columns
        .iter()
        .position(|c| *c == Some(FieldTarget::CaseNumber))?;
    columns
        .contains(&Some(FieldTarget::Second))
        .then_some(Table {
            columns,
            case_col,
            edged,
        })
}

struct Table {
    columns: Vec<Option<FieldTarget>>,
    case_col: usize,
    edged: bool,
}

struct PendingRow {
    cells: BTreeMap<usize, String>,
    lines: Vec<String>,
}

impl PendingRow {
    fn into_draft(self, columns: &[Option<FieldTarget>]) -> RecordDraft {
        let mut draft = RecordDraft {
            raw_text: self.lines.join("\n"),
            ..RecordDraft::default()
        };
        for (idx, value) in self.cells {
            let value = collapse_whitespace(&value);
            if value.is_empty() {
                continue;
            }
            let Some(Some(target)) = columns.get(idx) else { continue };
            match target {
                FieldTarget::CaseNumber => draft.case_number = Some(value),
                FieldTarget::District => draft.district = Some(value),
                FieldTarget::Location => draft.location = Some(value),
                FieldTarget::Description => draft.description = Some(value),
                FieldTarget::Movant => draft.movant = Some(value),
                FieldTarget::Second => draft.second = Some(value),
                FieldTarget::Vote => draft.vote_text = Some(value),
                FieldTarget::Extra(key) => {
                    draft.fields.insert(key.clone(), value);
                }
            }
        }
        draft
    }
}

pub fn extract(text: &str, ctx: &ExtractionContext<'_>) -> Result<Vec<RecordDraft>, PipelineError> {
    let mut table: Option<Table> = None;
    let mut drafts = Vec::new();
    let mut pending: Option<PendingRow> = None;

    for line in text.lines() {
        if let Some(header) = header_columns(line, ctx) {
            // Repeated headers (page breaks) may reorder columns.
            if let (Some(row), Some(current)) = (pending.take(), table.as_ref()) {
                drafts.push(row.into_draft(&current.columns));
            }
            table = Some(header);
            continue;
        }
        let Some(current) = table.as_ref() else { continue };
        if !line.contains('|') || SEPARATOR_ROW.is_match(line) {
            continue;
        }

        let cells = split_cells(line, current.edged);
        let starts_case = cells
            .get(current.case_col)
            .is_some_and(|cell| !cell.is_empty());
        if starts_case {
            if let Some(row) = pending.take() {
                drafts.push(row.into_draft(&current.columns));
            }
            pending = Some(PendingRow {
                cells: cells.into_iter().enumerate().collect(),
                lines: vec![line.trim().to_string()],
            });
        } else if let Some(row) = pending.as_mut() {
            for (idx, cell) in cells.into_iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let slot = row.cells.entry(idx).or_default();
                if !slot.is_empty() {
                    slot.push(' ');
                }
                slot.push_str(&cell);
            }
            row.lines.push(line.trim().to_string());
        }
    }

    let Some(current) = table else {
        return Err(PipelineError::MissingCaseBoundary(DocumentFormat::FormatB));
    };
    if let Some(row) = pending.take() {
        drafts.push(row.into_draft(&current.columns));
    }
    Ok(drafts)
}
