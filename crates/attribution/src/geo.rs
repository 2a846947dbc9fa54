//! Place-name comparison used by the scorer.
//!
//! All comparisons run on a folded form: trimmed, lower-cased, with Latin
//! diacritics removed, so "São Paulo" and "SAO PAULO" compare equal.

/// Country spellings that collapse onto one canonical token.
const COUNTRY_SYNONYMS: &[(&str, &str)] = &[
    ("brazil", "brazil"),
    ("brasil", "brazil"),
    ("br", "brazil"),
    ("bra", "brazil"),
    ("republica federativa do brasil", "brazil"),
    ("portugal", "portugal"),
    ("pt", "portugal"),
    ("prt", "portugal"),
    ("united states", "united states"),
    ("united states of america", "united states"),
    ("estados unidos", "united states"),
    ("eua", "united states"),
    ("usa", "united states"),
    ("us", "united states"),
];

/// Lower-case, trim and strip diacritics.
pub fn fold(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'ç' => 'c',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ñ' => 'n',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ý' | 'ÿ' => 'y',
            other => other,
        })
        .collect()
}

/// Canonical country token; unknown names fall back to their folded form.
pub fn canonical_country(value: &str) -> String {
    let folded = fold(value);
    COUNTRY_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == folded)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(folded)
}

pub fn countries_match(a: &str, b: &str) -> bool {
    let (a, b) = (canonical_country(a), canonical_country(b));
    !a.is_empty() && a == b
}

/// Region names match when either contains the other.
pub fn regions_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (fold(a), fold(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Exact equality only; no fuzzy matching.
pub fn cities_match(a: &str, b: &str) -> bool {
    let (a, b) = (fold(a), fold(b));
    !a.is_empty() && a == b
}
