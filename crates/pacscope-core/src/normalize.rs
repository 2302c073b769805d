//! Name canonicalization.
//!
//! Two strengths exist on purpose. [`slug`] is a persisted document key and
//! must stay stable run over run. [`comparison_key`] is only a transient dedup
//! signal and may be more aggressive; it is never used as a key on disk or in
//! the store.

/// Corporate legal suffixes, compared after dropping punctuation.
const LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "co",
    "company",
    "cos",
    "companies",
    "llc",
    "ltd",
    "limited",
    "lp",
    "llp",
    "plc",
    "holding",
    "holdings",
    "group",
    "international",
    "intl",
];

const HONORIFICS: &[&str] = &[
    "MR", "MRS", "MS", "MISS", "DR", "HON", "REV", "SGT", "CPT", "MAJ", "COL", "GEN", "SEN", "REP",
];

const GENERATIONAL_SUFFIXES: &[&str] = &["JR", "SR", "II", "III", "IV"];

fn bare(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn is_legal_suffix(token: &str) -> bool {
    let bare = bare(token);
    LEGAL_SUFFIXES.contains(&bare.as_str())
}

/// Drop trailing legal suffixes, always keeping at least one token.
fn strip_legal_suffixes(mut tokens: Vec<&str>) -> Vec<&str> {
    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1];
        if is_legal_suffix(last) || last == "&" {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens
}

/// Stable identifier form of an organization or person name.
///
/// `slug("Acme Inc.") == slug("Acme") == "acme"`, `slug("AT&T") == "at-and-t"`,
/// and `slug(slug(x)) == slug(x)`.
pub fn slug(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let tokens = strip_legal_suffixes(lowered.split_whitespace().collect());

    let mut raw = String::with_capacity(lowered.len());
    for ch in tokens.join("-").chars() {
        if ch == '&' {
            raw.push_str("-and-");
        } else if ch.is_alphanumeric() || ch == '-' {
            raw.push(ch);
        }
    }

    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(ch);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Loose dedup form: lowercase, no punctuation, no leading "the", no legal
/// suffixes, single spaces.
pub fn comparison_key(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    if tokens.len() > 1 && tokens[0] == "the" {
        tokens.remove(0);
    }
    strip_legal_suffixes(tokens).join(" ")
}

/// Dedup form for person names: like [`comparison_key`] but drops titles and
/// generational suffixes instead of legal suffixes.
pub fn person_comparison_key(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == ',' { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|token| !is_honorific(token) && generational_suffix(token).is_none())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_honorific(token: &str) -> bool {
    let upper = token.trim_end_matches('.').to_uppercase();
    HONORIFICS.contains(&upper.as_str())
}

fn generational_suffix(token: &str) -> Option<&'static str> {
    let upper = token.trim_end_matches(&['.', ','][..]).to_uppercase();
    GENERATIONAL_SUFFIXES
        .iter()
        .copied()
        .find(|s| *s == upper.as_str())
}

/// Remove courtesy, professional and legislative titles from a name part.
pub fn strip_titles(part: &str) -> String {
    part.split_whitespace()
        .filter(|token| !is_honorific(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a trailing generational marker off a name part.
fn split_generational(part: &str) -> (String, Option<&'static str>) {
    let mut tokens: Vec<&str> = part.split_whitespace().collect();
    match tokens.last().and_then(|last| generational_suffix(last)) {
        Some(suffix) => {
            tokens.pop();
            (tokens.join(" "), Some(suffix))
        }
        None => (tokens.join(" "), None),
    }
}

fn format_suffix(suffix: &str) -> String {
    match suffix {
        "JR" | "SR" => title_case(suffix),
        roman => roman.to_string(),
    }
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut out = String::with_capacity(word.len());
            let mut capitalize = true;
            for ch in word.chars() {
                if capitalize {
                    out.extend(ch.to_uppercase());
                } else {
                    out.extend(ch.to_lowercase());
                }
                capitalize = ch == '-' || ch == '\'';
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Registry candidate names arrive as `"LAST, FIRST MIDDLE SUFFIX"`.
/// Produces `"First Middle Last Suffix"` with titles removed.
pub fn format_candidate_name(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "Unknown".to_string();
    }

    let Some((last, given)) = raw.split_once(',') else {
        let (base, suffix) = split_generational(&strip_titles(raw));
        return join_name(&title_case(&base), suffix);
    };

    let last = strip_titles(last);
    let given = strip_titles(&given.replace(',', " "));
    let (given, mut suffix) = split_generational(&given);
    let last = if suffix.is_none() {
        let (base, last_suffix) = split_generational(&last);
        suffix = last_suffix;
        base
    } else {
        last
    };

    let full = format!("{} {}", title_case(&given), title_case(&last));
    join_name(full.trim(), suffix)
}

fn join_name(base: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) if !base.is_empty() => format!("{base} {}", format_suffix(suffix)),
        Some(suffix) => format_suffix(suffix),
        None if base.is_empty() => "Unknown".to_string(),
        None => base.to_string(),
    }
}
