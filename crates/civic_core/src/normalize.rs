//! Record Normalizer: turns a format-specific draft into a format-agnostic
//! [`VotingRecord`]. Normalization never fails; unrecognised values degrade
//! to `unknown`/`other` and the source text is kept.

use regex::Regex;
use std::sync::LazyLock;
use time::Date;

use crate::resolver::names::{collapse_whitespace, split_district_suffix};
use crate::schema::{
    iso_date, CaseCategory, DistrictHint, ExtractionMethod, RecordDraft, VoteResult, VotingRecord,
};

pub const ANOMALY_UNRECOGNIZED_VOTE: &str = "unrecognized_vote";
pub const ANOMALY_MISSING_CASE_NUMBER: &str = "missing_case_number";

static TABLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:tabled?|deferred|defer|postponed|continued|held\s+over|laid\s+over)\b")
        .unwrap()
});

static DENIED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:denied|deny|failed|fails|rejected|defeated|disapproved|not\s+(?:adopted|approved|carried|passed))\b",
    )
    .unwrap()
});

static APPROVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:approved?|adopted|adopt|passed|carried|granted|accepted|confirmed)\b")
        .unwrap()
});

static UNANIMOUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:unanimous(?:ly)?|all\s+ayes|without\s+objection)\b").unwrap()
});

static TALLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:-|–|to|/)\s*(\d{1,2})\b").unwrap()
});

static DISTRICT_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{1,3}").unwrap());

static BUDGET_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:budget|appropriations?|fiscal\s+year|capital\s+improvements?\s+(?:plan|program)|tax\s+levy)\b")
        .unwrap()
});

static REZONING_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:re-?zon(?:e|ed|ing)|zoning|zone\s+change|planned\s+unit\s+development|variance|conditional\s+use|subdivision|plat)\b")
        .unwrap()
});

static ORDINANCE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ordinance|amending\s+(?:chapter|title|section)|code\s+amendment)\b")
        .unwrap()
});

/// A normalized record plus the soft district hint for its movant.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub record: VotingRecord,
    pub movant_hint: Option<DistrictHint>,
}

/// Map a vote phrase onto the closed vocabulary. Tabling wins unless the
/// text also reports a denial; denial is checked before approval so
/// "disapproved" and "not approved" never count as approvals.
pub fn classify_vote(text: &str) -> VoteResult {
    let tally = tally(text);
    if TABLED.is_match(text) && !DENIED.is_match(text) {
        return VoteResult::Tabled;
    }
    if DENIED.is_match(text) {
        return VoteResult::Denied;
    }
    if APPROVED.is_match(text) {
        let unanimous = UNANIMOUS.is_match(text) || tally.is_some_and(|(_, nays)| nays == 0);
        return if unanimous {
            VoteResult::ApprovedUnanimous
        } else {
            VoteResult::ApprovedSplit
        };
    }
    match tally {
        Some((yeas, 0)) if yeas > 0 => VoteResult::ApprovedUnanimous,
        Some((yeas, nays)) if yeas > nays => VoteResult::ApprovedSplit,
        Some(_) => VoteResult::Denied,
        None if UNANIMOUS.is_match(text) => VoteResult::ApprovedUnanimous,
        None => VoteResult::Unknown,
    }
}

fn tally(text: &str) -> Option<(u32, u32)> {
    let caps = TALLY.captures(text)?;
    let yeas = caps.get(1)?.as_str().parse().ok()?;
    let nays = caps.get(2)?.as_str().parse().ok()?;
    Some((yeas, nays))
}

fn category_from_case_number(case_number: &str) -> Option<CaseCategory> {
    case_number
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .map(|token| token.trim_matches(|c: char| c.is_ascii_digit()))
        .filter(|prefix| !prefix.is_empty())
        .find_map(|prefix| match prefix.to_ascii_uppercase().as_str() {
            "ZONE" | "ZON" | "ZONING" | "RZ" | "Z" | "PUD" | "CUP" | "SP" | "VAR" | "PLAT" => {
                Some(CaseCategory::Rezoning)
            }
            "O" | "ORD" | "ORDINANCE" => Some(CaseCategory::Ordinance),
            "BUD" | "BUDGET" | "APPROP" | "FY" => Some(CaseCategory::Budget),
            _ => None,
        })
}

fn category_from_action(label: &str) -> Option<CaseCategory> {
    match label.trim().to_lowercase().as_str() {
        "rezoning" | "zoning" | "zone change" => Some(CaseCategory::Rezoning),
        "ordinance" => Some(CaseCategory::Ordinance),
        "budget" => Some(CaseCategory::Budget),
        _ => None,
    }
}

fn category_from_text(text: &str) -> Option<CaseCategory> {
    if BUDGET_WORDS.is_match(text) {
        Some(CaseCategory::Budget)
    } else if REZONING_WORDS.is_match(text) {
        Some(CaseCategory::Rezoning)
    } else if ORDINANCE_WORDS.is_match(text) {
        Some(CaseCategory::Ordinance)
    } else {
        None
    }
}

/// Prioritized category rules: stated category, case-number prefix, action
/// label, then free-text keywords.
pub fn classify_category(draft: &RecordDraft) -> CaseCategory {
    if let Some(category) = draft.category_hint.as_deref().and_then(CaseCategory::parse) {
        return category;
    }
    let free_text = [draft.description.as_deref(), draft.location.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    draft
        .case_number
        .as_deref()
        .and_then(category_from_case_number)
        .or_else(|| draft.action_label.as_deref().and_then(category_from_action))
        .or_else(|| category_from_text(&free_text))
        .unwrap_or(CaseCategory::Other)
}

fn normalize_district(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return None;
    }
    match DISTRICT_NUMBER.find(&collapsed) {
        Some(m) => {
            let digits = m.as_str().trim_start_matches('0');
            let digits = if digits.is_empty() { "0" } else { digits };
            Some(digits.to_string())
        }
        None => Some(collapsed),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| collapse_whitespace(&v))
        .filter(|v| !v.is_empty())
}

/// Name as written, or `None` when it is empty or a placeholder.
fn name_field(value: Option<String>) -> Option<String> {
    non_empty(value).filter(|raw| !split_district_suffix(raw).0.is_empty())
}

pub fn normalize(
    draft: RecordDraft,
    document_id: &str,
    case_ordinal: u32,
    meeting_date: Option<Date>,
    extraction: ExtractionMethod,
) -> NormalizedRecord {
    let category = classify_category(&draft);
    let vote_text = non_empty(draft.vote_text);
    let vote_result = vote_text
        .as_deref()
        .map(classify_vote)
        .unwrap_or(VoteResult::Unknown);

    let district = draft.district.as_deref().and_then(normalize_district);
    let case_number = non_empty(draft.case_number).map(|c| c.to_uppercase());
    let description = non_empty(draft.description);
    let mut fields = draft.fields;
    let location = match non_empty(draft.location) {
        Some(location) => {
            if let Some(description) = description {
                fields.entry("description".to_string()).or_insert(description);
            }
            Some(location)
        }
        None => description,
    };

    let mut anomalies = Vec::new();
    if vote_text.is_some() && vote_result == VoteResult::Unknown {
        anomalies.push(ANOMALY_UNRECOGNIZED_VOTE.to_string());
    }
    if case_number.is_none() {
        anomalies.push(ANOMALY_MISSING_CASE_NUMBER.to_string());
    }

    let movant_hint = district.clone().map(DistrictHint::soft);
    let record = VotingRecord {
        document_id: document_id.to_string(),
        case_ordinal,
        meeting_date: meeting_date.map(iso_date),
        case_number,
        category,
        district,
        location,
        movant: name_field(draft.movant),
        second: name_field(draft.second),
        vote_result,
        vote_result_text: vote_text,
        fields,
        movant_id: None,
        second_id: None,
        extraction,
        anomalies,
        raw_text: draft.raw_text,
    };
    NormalizedRecord {
        record,
        movant_hint,
    }
}
