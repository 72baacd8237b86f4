// src/matching/name.rs - Company name normalization and fuzzy similarity
use std::collections::HashSet;
use strsim::jaro_winkler;

/// Legal-form suffixes stripped from the end of a name. Matched as whole
/// trailing words after punctuation has been removed.
pub const LEGAL_SUFFIXES: [&str; 22] = [
    "inc", "incorporated", "corp", "corporation", "llc", "ltd", "limited", "co", "company", "plc",
    "lp", "llp", "pbc", "gmbh", "ag", "sa", "nv", "bv", "pty", "srl", "holdings", "pc",
];

/// Floor applied when every token of one name appears in the other.
const TOKEN_SUPERSET_FLOOR: f64 = 0.85;
const TOKEN_SUPERSET_SPAN: f64 = 0.15;

/// Lower-cases, strips trailing legal suffixes, removes punctuation and
/// collapses whitespace. Idempotent. A name made only of suffix words keeps
/// its last word rather than normalizing to an empty string.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let char_substitutions = [("&", " and "), ("+", " plus "), ("'", ""), ("’", "")];
    let mut normalized = lowered;
    for (pattern, replacement) in &char_substitutions {
        normalized = normalized.replace(pattern, replacement);
    }

    let cleaned: String = normalized
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 {
        match words.last() {
            Some(last) if LEGAL_SUFFIXES.contains(last) => {
                words.pop();
            }
            _ => break,
        }
    }
    words.join(" ")
}

/// Meaningful tokens of an already-normalized name.
pub fn tokenize_name(normalized_name: &str) -> HashSet<&str> {
    normalized_name
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .collect()
}

/// Symmetric similarity in [0, 1] over the normalized forms of `a` and `b`.
///
/// Jaro-Winkler on the normalized strings, raised to a floor when one name's
/// tokens are a subset of the other's ("Acme" vs "Acme Biosciences").
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);

    if na.is_empty() || nb.is_empty() {
        let (ta, tb) = (a.trim(), b.trim());
        return if !ta.is_empty() && ta == tb { 1.0 } else { 0.0 };
    }
    if na == nb {
        return 1.0;
    }

    // strsim's Jaro match window is direction-sensitive on edge cases
    let (first, second) = if na <= nb { (&na, &nb) } else { (&nb, &na) };
    let mut score = jaro_winkler(first, second);

    let tokens_a = tokenize_name(&na);
    let tokens_b = tokenize_name(&nb);
    let (smaller, larger) = if tokens_a.len() <= tokens_b.len() {
        (&tokens_a, &tokens_b)
    } else {
        (&tokens_b, &tokens_a)
    };
    if !smaller.is_empty() && smaller.is_subset(larger) {
        let coverage = smaller.len() as f64 / larger.len() as f64;
        score = score.max(TOKEN_SUPERSET_FLOOR + TOKEN_SUPERSET_SPAN * coverage);
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_suffix_case_and_punctuation() {
        assert_eq!(normalize_name("Genentech, Inc."), "genentech");
        assert_eq!(normalize_name("GENENTECH INC"), "genentech");
        assert_eq!(normalize_name("Gilead Sciences Corporation"), "gilead sciences");
        assert_eq!(normalize_name("  Bio-Rad   Laboratories "), "bio rad laboratories");
        assert_eq!(normalize_name("Johnson & Johnson"), "johnson and johnson");
    }

    #[test]
    fn test_normalize_strips_stacked_suffixes() {
        assert_eq!(normalize_name("Acme Holdings Co., Ltd."), "acme");
    }

    #[test]
    fn test_normalize_keeps_suffix_only_names() {
        assert_eq!(normalize_name("Company"), "company");
        assert_eq!(normalize_name("Co Inc"), "co");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "Genentech, Inc.",
            "Amgen Co. Inc",
            "Moderna's Lab LLC",
            "A&B Pharma Corp.",
            "Co Inc",
            "",
            "!!!",
        ] {
            let once = normalize_name(raw);
            assert_eq!(normalize_name(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        let names = ["Genentech", "Acme Bio", "Zenith Pharma", "Twist Bioscience"];
        for a in names {
            assert_eq!(name_similarity(a, a), 1.0);
            for b in names {
                assert_eq!(name_similarity(a, b), name_similarity(b, a));
            }
        }
    }

    #[test]
    fn test_similarity_robust_to_legal_suffix() {
        assert_eq!(name_similarity("Genentech", "Genentech, Inc."), 1.0);
    }

    #[test]
    fn test_similarity_token_superset() {
        let s = name_similarity("Acme", "Acme Biosciences");
        assert!(s >= 0.9, "got {}", s);
        let unrelated = name_similarity("Acme Bio", "Zenith Pharma");
        assert!(unrelated < 0.7, "got {}", unrelated);
    }

    #[test]
    fn test_similarity_empty() {
        assert_eq!(name_similarity("", "Acme"), 0.0);
        assert_eq!(name_similarity("", ""), 0.0);
    }
}
