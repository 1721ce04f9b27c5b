//! Parser for the analyzer annotation field.
//!
//! The fifth column of an input record may start with a bracketed list of
//! `('label', 'lemma')` pairs proposed by an external analyzer, followed
//! by arbitrary trailing text:
//!
//! ```text
//! [('[POS=PARTICLE]|[CONJ=ADVERBIAL]', 'kun'), ('[POS=PARTICLE]', 'kun')] and trailing junk
//! ```
//!
//! The strings are single-quoted and must not contain spaces. A field
//! that does not carry a well-formed list yields `None` and is otherwise
//! ignored.

use std::sync::OnceLock;

use regex::Regex;

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\('([^' ]*)', '([^' ]*)'\)$").unwrap())
}

/// Extracts the `(label, lemma)` pairs embedded in an annotation field.
pub(crate) fn parse_analyzer_pairs(field: &str) -> Option<Vec<(String, String)>> {
    let end = field.find("')]")?;
    let list = &field[..end + 3];

    let inner = list.strip_prefix('[')?.strip_suffix(']')?;

    let mut pairs = vec![];
    for item in inner.split("), (") {
        // Restore the parentheses eaten by the split.
        let item = if item.starts_with('(') {
            item.to_string()
        } else {
            format!("({item}")
        };
        let item = if item.ends_with(')') {
            item
        } else {
            format!("{item})")
        };

        let captures = pair_pattern().captures(&item)?;
        pairs.push((captures[1].to_string(), captures[2].to_string()));
    }

    Some(pairs)
}
