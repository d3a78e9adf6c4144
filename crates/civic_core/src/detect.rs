//! Format Detector: classifies the layout of a minutes document.
//!
//! Signatures are checked in a fixed priority order, most constrained first.
//! A signature matches only when every one of its markers is present.

use regex::Regex;
use std::sync::LazyLock;

use crate::schema::DocumentFormat;

struct Signature {
    format: DocumentFormat,
    markers: Vec<Regex>,
}

impl Signature {
    fn new(format: DocumentFormat, patterns: &[&str]) -> Self {
        let markers = patterns
            .iter()
            .map(|p| Regex::new(p).expect("format marker pattern is valid"))
            .collect();
        Self { format, markers }
    }

    fn matches(&self, text: &str) -> bool {
        self.markers.iter().all(|marker| marker.is_match(text))
    }
}

static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    vec![
        // Pipe-delimited table export: the header row names the case and
        // second columns, and a motion column sits between delimiters.
        Signature::new(
            DocumentFormat::FormatB,
            &[
                r"(?mi)^\s*\|?\s*case\s*(?:no\.?|number|#)?\s*\|.*\|\s*second(?:ed)?(?:\s+by)?\s*(?:\||$)",
                r"(?mi)\|\s*(?:motion|movant|mover|moved)(?:\s+by)?\s*\|",
            ],
        ),
        // Agenda-management export with RESULT / MOVER / SECONDER blocks
        // under numbered agenda items.
        Signature::new(
            DocumentFormat::FormatA,
            &[
                r"\bRESULT:",
                r"\bMOVER:",
                r"\bSECONDER:",
                r"(?m)^\s*\d{1,3}\.\s+[A-Z0-9]+(?:-[A-Z0-9]+)*-\d+\b",
            ],
        ),
        Signature::new(
            DocumentFormat::FormatStandard,
            &[
                r"(?i)\bmovant\s*:",
                r"(?i)\bsecond\s*:",
                r"(?i)\bcase\s+(?:number|no\.?)\s*:?",
            ],
        ),
    ]
});

/// Return the first format whose signature matches, or `Unknown`.
pub fn detect_format(text: &str) -> DocumentFormat {
    SIGNATURES
        .iter()
        .find(|signature| signature.matches(text))
        .map(|signature| signature.format)
        .unwrap_or(DocumentFormat::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD: &str = "PLANNING COMMITTEE MINUTES\n\
        Case Number: 23-ZONE-0087\n\
        Council District: 5\n\
        MOVANT: Jane Smith\n\
        SECOND: Robert Doe\n\
        Rezoning Action: APPROVED [UNANIMOUS]\n";

    const FORMAT_A: &str = "City Council Meeting Minutes - Final\n\
        4. O-112-24 AN ORDINANCE amending Chapter 32\n\
        RESULT: ADOPTED [UNANIMOUS]\n\
        MOVER: Jane Smith, District 5\n\
        SECONDER: Robert Doe, District 7\n";

    const FORMAT_B: &str = "COUNCIL ACTION SUMMARY\n\
        CASE NO. | DISTRICT | LOCATION | MOTION | SECOND | VOTE\n\
        22-ZONE-0101 | 3 | 500 Oak St | Smith | Doe | Approved 7-2\n";

    #[test]
    fn detects_each_known_layout() {
        assert_eq!(detect_format(STANDARD), DocumentFormat::FormatStandard);
        assert_eq!(detect_format(FORMAT_A), DocumentFormat::FormatA);
        assert_eq!(detect_format(FORMAT_B), DocumentFormat::FormatB);
    }

    #[test]
    fn unrecognised_text_is_unknown() {
        assert_eq!(
            detect_format("The council met and discussed the park."),
            DocumentFormat::Unknown
        );
        assert_eq!(detect_format(""), DocumentFormat::Unknown);
    }

    #[test]
    fn table_signature_wins_over_labels() {
        let mixed = format!("{FORMAT_B}\nMOVANT: Jane Smith\nSECOND: Robert Doe\nCase No. 1\n");
        assert_eq!(detect_format(&mixed), DocumentFormat::FormatB);
    }

    #[test]
    fn seconder_label_does_not_satisfy_standard_second() {
        let text = "Case Number: 1\nMOVANT: Jane Smith\nSECONDER: Robert Doe\n";
        assert_eq!(detect_format(text), DocumentFormat::Unknown);
    }

    #[test]
    fn partial_signature_is_not_enough() {
        let text = "4. O-112-24 AN ORDINANCE\nRESULT: ADOPTED\nMOVER: Jane Smith\n";
        assert_eq!(detect_format(text), DocumentFormat::Unknown);
    }
}
