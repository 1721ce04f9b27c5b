//! Explicit case tables.
//!
//! Case folding must not depend on a process-wide locale, so the lemma
//! guesser carries its own table. The default table covers ASCII and the
//! Finnish and Swedish letters å, ä and ö; further pairs can be added
//! when a model targets another alphabet.

/// A case-folding table over (uppercase, lowercase) character pairs.
#[derive(Clone, Debug)]
pub(crate) struct CaseTable {
    extra: Vec<(char, char)>,
}

impl Default for CaseTable {
    fn default() -> Self {
        Self {
            extra: vec![('Å', 'å'), ('Ä', 'ä'), ('Ö', 'ö')],
        }
    }
}

impl CaseTable {
    pub fn lowercase(&self, word: &str) -> String {
        word.chars()
            .map(|c| {
                if c.is_ascii_uppercase() {
                    c.to_ascii_lowercase()
                } else {
                    self.extra
                        .iter()
                        .find(|&&(upper, _)| upper == c)
                        .map_or(c, |&(_, lower)| lower)
                }
            })
            .collect()
    }

    pub fn uppercase(&self, word: &str) -> String {
        word.chars()
            .map(|c| {
                if c.is_ascii_lowercase() {
                    c.to_ascii_uppercase()
                } else {
                    self.extra
                        .iter()
                        .find(|&&(_, lower)| lower == c)
                        .map_or(c, |&(upper, _)| upper)
                }
            })
            .collect()
    }

    pub fn has_upper(&self, word: &str) -> bool {
        word.chars()
            .any(|c| c.is_ascii_uppercase() || self.extra.iter().any(|&(upper, _)| upper == c))
    }

    pub fn has_digit(&self, word: &str) -> bool {
        word.chars().any(|c| c.is_ascii_digit())
    }
}
