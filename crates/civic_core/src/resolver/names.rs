//! Name cleaning and comparison helpers shared by the extractors and the
//! resolver tiers.

use regex::Regex;
use std::sync::LazyLock;

static HONORIFICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:council\s*(?:member|woman|man|person)|councilmember|cm|vice[\s-]+chair(?:man|woman|person)?|chair(?:man|woman|person)?|president(?:\s+pro\s+tem)?|alder(?:man|woman|person)|commissioner|mayor|hon|mr|mrs|ms|dr)\.?\s+)+",
    )
    .unwrap()
});

static DISTRICT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:,|\s)\s*\(?\s*(?:council\s+)?(?:district|dist\.?|d-?)\s*#?\s*(\d{1,3})\s*\)?\s*$")
        .unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const PLACEHOLDERS: &[&str] = &["none", "n/a", "na", "-", "--", "null", "tbd", "not recorded"];

pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE.replace_all(value.trim(), " ").into_owned()
}

/// Split `"Jane Smith, District 5"` into the cleaned name and its district.
/// Honorifics are stripped; placeholders such as "N/A" come back empty.
pub fn split_district_suffix(raw: &str) -> (String, Option<String>) {
    let collapsed = collapse_whitespace(raw);
    let (name, district) = match DISTRICT_SUFFIX.captures(&collapsed) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(collapsed.len());
            let district = caps.get(1).map(|m| m.as_str().trim_start_matches('0').to_string());
            let district = district.map(|d| if d.is_empty() { "0".to_string() } else { d });
            (collapsed[..whole].to_string(), district)
        }
        None => (collapsed, None),
    };
    (clean_name(&name), district)
}

/// Strip honorifics, stray punctuation and placeholders.
pub fn clean_name(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    let stripped = HONORIFICS.replace(&collapsed, "");
    let trimmed = stripped
        .trim()
        .trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '*' | '"'))
        .trim();
    if PLACEHOLDERS.contains(&trimmed.to_lowercase().as_str()) {
        return String::new();
    }
    trimmed.to_string()
}

/// Comparison key: lower-cased, punctuation folded to spaces.
pub fn name_key(name: &str) -> String {
    let folded: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    collapse_whitespace(&folded)
}

fn tokens(key: &str) -> Vec<&str> {
    key.split(' ').filter(|t| !t.is_empty()).collect()
}

fn is_initial_form(key: &str) -> bool {
    let parts = tokens(key);
    parts.len() >= 2 && parts[0].chars().count() == 1
}

/// `"jane q smith"` -> `"j smith"`. Only full first names abbreviate.
fn abbreviated(key: &str) -> Option<String> {
    let parts = tokens(key);
    if parts.len() < 2 || parts[0].chars().count() < 2 {
        return None;
    }
    let initial = parts[0].chars().next()?;
    Some(format!("{initial} {}", parts[parts.len() - 1]))
}

fn contains_run(hay: &[&str], needle: &[&str]) -> bool {
    if needle.is_empty() || needle.len() > hay.len() {
        return false;
    }
    hay.windows(needle.len()).any(|window| window == needle)
}

fn token_containment(longer: &[&str], shorter: &[&str]) -> bool {
    match shorter {
        [] => false,
        // A lone token only counts when it is the surname.
        [single] => {
            single.chars().count() >= 3 && longer.len() > 1 && longer.last() == Some(single)
        }
        _ => contains_run(longer, shorter),
    }
}

/// Containment between two name keys: whole-token runs either way, or an
/// initial form against the full name it abbreviates.
pub fn containment_match(a: &str, b: &str) -> bool {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return false;
    }
    if ta == tb {
        return true;
    }
    let by_tokens = if ta.len() >= tb.len() {
        token_containment(&ta, &tb)
    } else {
        token_containment(&tb, &ta)
    };
    if by_tokens {
        return true;
    }
    if is_initial_form(a) && !is_initial_form(b) {
        return abbreviated(b).is_some_and(|abbr| abbr == a);
    }
    if is_initial_form(b) && !is_initial_form(a) {
        return abbreviated(a).is_some_and(|abbr| abbr == b);
    }
    false
}

/// Alias made unique by its district, used when the bare alias already
/// belongs to a representative from another district.
pub fn qualified_alias(name: &str, district: &str) -> String {
    format!("{name} (District {district})")
}

/// Ranking key used to choose the display name from an alias set: more
/// full-word tokens first, then longer, then mixed case over all-caps, then
/// alphabetical.
pub fn display_rank(alias: &str) -> (usize, usize, bool, String) {
    let (bare, _) = split_district_suffix(alias);
    let key = name_key(&bare);
    let full_tokens = tokens(&key).iter().filter(|t| t.chars().count() > 1).count();
    let mixed_case = bare.chars().any(char::is_lowercase);
    (full_tokens, bare.chars().count(), mixed_case, bare)
}

/// Pick the display name for an alias set.
pub fn choose_display_name<'a>(aliases: impl IntoIterator<Item = &'a String>) -> Option<String> {
    aliases
        .into_iter()
        .map(|alias| display_rank(alias))
        .filter(|(_, len, _, _)| *len > 0)
        .max_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
                .then(b.3.cmp(&a.3))
        })
        .map(|(_, _, _, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_district_suffix_and_honorifics() {
        assert_eq!(
            split_district_suffix("Council Member Jane Smith, District 5"),
            ("Jane Smith".to_string(), Some("5".to_string()))
        );
        assert_eq!(
            split_district_suffix("Robert  Doe (D-07)"),
            ("Robert Doe".to_string(), Some("7".to_string()))
        );
        assert_eq!(split_district_suffix("Robert Doe"), ("Robert Doe".to_string(), None));
        assert_eq!(split_district_suffix("N/A").0, "");
    }

    #[test]
    fn key_folds_case_and_punctuation() {
        assert_eq!(name_key("J. Smith"), "j smith");
        assert_eq!(name_key("  JANE   SMITH "), "jane smith");
    }

    #[test]
    fn initial_form_is_contained_in_full_name() {
        assert!(containment_match("j smith", "jane smith"));
        assert!(containment_match("jane smith", "j smith"));
        assert!(!containment_match("jane smith", "john smith"));
    }

    #[test]
    fn surname_alone_matches_only_the_last_token() {
        assert!(containment_match("smith", "jane smith"));
        assert!(!containment_match("jane", "jane smith"));
        assert!(!containment_match("al", "al smith"));
        assert!(containment_match("barbara sexton smith", "sexton smith"));
    }

    #[test]
    fn display_name_prefers_fullest_alias() {
        let aliases = vec![
            "J. Smith".to_string(),
            "Jane Smith".to_string(),
            "Smith".to_string(),
            "Jane Smith (District 5)".to_string(),
            "JANE SMITH".to_string(),
        ];
        assert_eq!(choose_display_name(&aliases).as_deref(), Some("Jane Smith"));
    }
}
