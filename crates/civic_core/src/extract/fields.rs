//! Labeled-field scanner shared by the line-oriented rule sets.
//!
//! All labels of a rule set are compiled into one alternation so a block is
//! scanned once. A value runs from its label's colon to the next label or a
//! blank line, whichever comes first, so values may wrap across lines and
//! several labels may share one physical line.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::FieldSpec;
use crate::error::PipelineError;
use crate::resolver::names::collapse_whitespace;
use crate::schema::RecordDraft;

static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\r?\n").unwrap());

/// Draft slot a label feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    CaseNumber,
    District,
    Location,
    Description,
    Movant,
    Second,
    Vote,
    Extra(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldHit {
    pub target: FieldTarget,
    /// Label text as written, e.g. "Rezoning Action".
    pub label: String,
    pub value: Option<String>,
    pub start: usize,
}

pub struct LabelSet {
    regex: Regex,
    targets: Vec<FieldTarget>,
    groups: Vec<String>,
}

/// Case-insensitive literal pattern for a council-declared label.
pub fn literal_label(label: &str) -> String {
    let words: Vec<String> = label.split_whitespace().map(regex::escape).collect();
    format!("(?i:{})", words.join(r"[ \t]+"))
}

impl LabelSet {
    /// `labels` pairs a target with a regex fragment for the label text
    /// (without the trailing colon). Fragments must not define capture groups.
    pub fn new(mut labels: Vec<(FieldTarget, String)>, extras: &[FieldSpec]) -> Result<Self, PipelineError> {
        labels.extend(
            extras
                .iter()
                .map(|spec| (FieldTarget::Extra(spec.key.clone()), literal_label(&spec.label))),
        );
        let groups: Vec<String> = (0..labels.len()).map(|i| format!("l{i}")).collect();
        let alternatives: Vec<String> = labels
            .iter()
            .zip(&groups)
            .map(|((_, pattern), group)| format!("(?P<{group}>{pattern})"))
            .collect();
        let pattern = format!(
            r"(?m)(?:^|[\s|;,])[ \t]*(?:{})[ \t]*:",
            alternatives.join("|")
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| PipelineError::Config(format!("field label pattern: {e}")))?;
        Ok(Self {
            regex,
            targets: labels.into_iter().map(|(target, _)| target).collect(),
            groups,
        })
    }

    pub fn scan(&self, text: &str) -> Vec<FieldHit> {
        let mut marks: Vec<(usize, &str, usize, usize)> = Vec::new();
        for caps in self.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let found = self
                .groups
                .iter()
                .enumerate()
                .find_map(|(i, group)| caps.name(group).map(|m| (i, m)));
            if let Some((idx, label)) = found {
                marks.push((idx, label.as_str(), label.start(), whole.end()));
            }
        }

        marks
            .iter()
            .enumerate()
            .map(|(n, &(idx, label, start, value_start))| {
                let limit = marks.get(n + 1).map_or(text.len(), |next| next.2);
                let end = BLANK_LINE
                    .find(&text[value_start..limit])
                    .map_or(limit, |blank| value_start + blank.start());
                let value = collapse_whitespace(&text[value_start..end]);
                FieldHit {
                    target: self.targets[idx].clone(),
                    label: collapse_whitespace(label),
                    value: (!value.is_empty()).then_some(value),
                    start,
                }
            })
            .collect()
    }

}

/// Leading word of a `<Kind> Action` label.
fn action_kind(label: &str) -> Option<String> {
    let lower = label.to_lowercase();
    let kind = lower.strip_suffix("action")?.trim();
    (!kind.is_empty()).then(|| kind.to_string())
}

/// Copy hits into the draft. The first value seen for a slot wins.
pub fn apply(draft: &mut RecordDraft, hits: Vec<FieldHit>) {
    for hit in hits {
        let Some(value) = hit.value else { continue };
        let slot = match hit.target {
            FieldTarget::CaseNumber => &mut draft.case_number,
            FieldTarget::District => &mut draft.district,
            FieldTarget::Location => &mut draft.location,
            FieldTarget::Description => &mut draft.description,
            FieldTarget::Movant => &mut draft.movant,
            FieldTarget::Second => &mut draft.second,
            FieldTarget::Vote => {
                if draft.vote_text.is_none() {
                    draft.action_label = action_kind(&hit.label);
                    draft.vote_text = Some(value);
                }
                continue;
            }
            FieldTarget::Extra(key) => {
                draft.fields.entry(key).or_insert(value);
                continue;
            }
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelSet {
        LabelSet::new(
            vec![
                (FieldTarget::Movant, "(?i:movant)".into()),
                (FieldTarget::Second, "(?i:second)".into()),
                (FieldTarget::Vote, r"(?i:(?:rezoning[ \t]+)?action)".into()),
            ],
            &[FieldSpec {
                key: "docket".into(),
                label: "Docket No.".into(),
            }],
        )
        .unwrap()
    }

    #[test]
    fn values_wrap_and_share_lines() {
        let text = "MOVANT: Jane\n   Smith SECOND: Robert Doe\nRezoning Action: APPROVED\n[UNANIMOUS]\n\nunrelated";
        let hits = labels().scan(text);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].value.as_deref(), Some("Jane Smith"));
        assert_eq!(hits[1].value.as_deref(), Some("Robert Doe"));
        assert_eq!(hits[2].label, "Rezoning Action");
        assert_eq!(hits[2].value.as_deref(), Some("APPROVED [UNANIMOUS]"));
    }

    #[test]
    fn empty_value_is_none_and_order_is_free() {
        let text = "SECOND: Robert Doe\nMOVANT:\nDocket No.: 44-B";
        let mut draft = RecordDraft::default();
        apply(&mut draft, labels().scan(text));
        assert_eq!(draft.movant, None);
        assert_eq!(draft.second.as_deref(), Some("Robert Doe"));
        assert_eq!(draft.fields.get("docket").map(String::as_str), Some("44-B"));
    }

    #[test]
    fn action_label_keeps_its_kind() {
        let mut draft = RecordDraft::default();
        apply(&mut draft, labels().scan("Rezoning Action: DENIED"));
        assert_eq!(draft.action_label.as_deref(), Some("rezoning"));
        assert_eq!(draft.vote_text.as_deref(), Some("DENIED"));
    }

    #[test]
    fn declared_labels_are_literal() {
        assert_eq!(literal_label("Docket No."), r"(?i:Docket[ \t]+No\.)");
    }
}
