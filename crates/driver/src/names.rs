//! Scheme and destination name resolution

use xcauto_common::NameMiss;

/// Trim, strip surrounding quotes and a trailing `.xcscheme`
pub fn normalize_scheme(name: &str) -> String {
    let name = strip_quotes(name.trim());
    name.strip_suffix(".xcscheme").unwrap_or(name).trim().to_string()
}

/// Trim, strip quotes, underscores to spaces, collapse whitespace
pub fn normalize_destination(name: &str) -> String {
    strip_quotes(name.trim())
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return s[1..s.len() - 1].trim();
        }
    }
    s
}

/// Match `requested` against the live candidates.
///
/// The normalized form is tried first, then the literal input. A miss
/// carries the candidate list and an advisory suggestion; nothing is
/// substituted.
pub fn resolve(
    kind: &str,
    requested: &str,
    candidates: &[String],
    normalize: impl Fn(&str) -> String,
) -> Result<String, NameMiss> {
    let normalized = normalize(requested);
    for attempt in [normalized.as_str(), requested] {
        if let Some(found) = candidates.iter().find(|c| c.as_str() == attempt) {
            return Ok(found.clone());
        }
    }

    Err(NameMiss {
        kind: kind.to_string(),
        requested: requested.to_string(),
        candidates: candidates.to_vec(),
        suggestion: best_match(&normalized, candidates).map(str::to_string),
    })
}

/// `1 - lev(a, b) / max(len)`, case-insensitive
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(&a, &b) as f64 / longest as f64
}

/// Highest similarity wins; ties go to the earlier candidate
pub fn best_match<'a>(requested: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = similarity(requested, candidate);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate.as_str(), score));
        }
    }
    best.map(|(c, _)| c)
}

/// Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn schemes() -> Vec<String> {
        vec!["MyApp".to_string(), "MyApp Widgets".to_string(), "MyAppTests".to_string()]
    }

    #[test_case("MyApp" ; "plain")]
    #[test_case("MyApp Widgets" ; "with space")]
    #[test_case("iPhone 15 Pro" ; "destination")]
    fn test_canonical_names_are_unchanged(name: &str) {
        assert_eq!(normalize_scheme(name), name);
        assert_eq!(normalize_destination(name), name);
        let candidates = vec![name.to_string()];
        assert_eq!(resolve("Scheme", name, &candidates, normalize_scheme).unwrap(), name);
    }

    #[test_case(" \"MyApp.xcscheme\" ", "MyApp" ; "quoted file name")]
    #[test_case("'MyApp Widgets'", "MyApp Widgets" ; "single quotes")]
    fn test_scheme_normalization(input: &str, expected: &str) {
        assert_eq!(normalize_scheme(input), expected);
        assert_eq!(resolve("Scheme", input, &schemes(), normalize_scheme).unwrap(), expected);
    }

    #[test]
    fn test_destination_normalization() {
        assert_eq!(normalize_destination("iPhone_15__Pro"), "iPhone 15 Pro");
        assert_eq!(normalize_destination("  \"My   Mac\" "), "My Mac");
    }

    #[test]
    fn test_literal_form_is_tried_after_normalized() {
        let candidates = vec!["Legacy_Device".to_string()];
        assert_eq!(
            resolve("Destination", "Legacy_Device", &candidates, normalize_destination).unwrap(),
            "Legacy_Device"
        );
    }

    #[test]
    fn test_miss_suggests_without_substituting() {
        let miss = resolve("Scheme", "MyAp", &schemes(), normalize_scheme).unwrap_err();
        assert_eq!(miss.suggestion.as_deref(), Some("MyApp"));
        assert_eq!(miss.candidates.len(), 3);
        assert_eq!(miss.requested, "MyAp");
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let candidates = vec!["abd".to_string(), "abe".to_string()];
        assert_eq!(best_match("abc", &candidates), Some("abd"));
        assert_eq!(best_match("abc", &[]), None);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert!((similarity("MyApp", "myapp") - 1.0).abs() < f64::EPSILON);
    }
}
