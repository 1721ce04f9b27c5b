//! Per-suffix-length label probability tables.

use bincode::{Decode, Encode};

use crate::common::BOUNDARY_WORD_FORM;
use crate::serial::OrderedMap;

/// Longest word-form suffix that is ever counted.
pub(crate) const MAX_SUFFIX_LEN: usize = 10;

/// Suffix statistics over the training words of length at most
/// `max_word_length`.
///
/// Training accumulates `count(suffix, label)` for every suffix up to
/// [`MAX_SUFFIX_LEN`] characters (the empty suffix included, so the empty
/// suffix row carries the label priors) and `count(label)`. Normalization
/// turns the counts into within-suffix distributions and computes the
/// standard deviation of the label prior distribution, which controls how
/// strongly longer suffixes override shorter ones during guessing.
#[derive(Clone, Debug, Decode, Default, Encode, PartialEq)]
pub(crate) struct SuffixLabelModel {
    max_word_length: u32,
    std_dev: f32,
    suffix_label_probs: OrderedMap<String, OrderedMap<u32, f32>>,
    label_probs: OrderedMap<u32, f32>,
}

impl SuffixLabelModel {
    pub fn new(max_word_length: u32) -> Self {
        Self {
            max_word_length,
            std_dev: -1.0,
            ..Self::default()
        }
    }

    /// Counts one training word.
    ///
    /// Words longer than `max_word_length` only register their label in
    /// the prior table, with zero mass.
    pub fn observe(&mut self, word_form: &str, label: u32) {
        let chars: Vec<char> = word_form.chars().collect();

        if chars.len() <= self.max_word_length as usize {
            if word_form == BOUNDARY_WORD_FORM {
                return;
            }

            for start in 0..=chars.len() {
                if chars.len() - start > MAX_SUFFIX_LEN {
                    continue;
                }
                let suffix: String = chars[start..].iter().collect();
                *self
                    .suffix_label_probs
                    .entry(suffix)
                    .or_default()
                    .entry(label)
                    .or_insert(0.0) += 1.0;
            }

            *self.label_probs.entry(label).or_insert(0.0) += 1.0;
        } else {
            self.label_probs.entry(label).or_insert(0.0);
        }
    }

    /// Normalizes counts into probabilities and computes the standard
    /// deviation of the label priors.
    pub fn normalize(&mut self) {
        for probs in self.suffix_label_probs.values_mut() {
            let total: f32 = probs.values().sum();
            debug_assert!(total > 0.0);
            for p in probs.values_mut() {
                *p /= total;
            }
        }

        let total: f32 = self.label_probs.values().sum();
        if total == 0.0 {
            self.std_dev = 0.0;
            return;
        }

        let n = self.label_probs.len();
        let mut variance = 0.0;
        for p in self.label_probs.values_mut() {
            *p /= total;
            variance += (*p - 1.0 / n as f32).powi(2);
        }
        self.std_dev = if n < 2 {
            0.0
        } else {
            (variance / (n - 1) as f32).sqrt()
        };
    }

    pub fn is_empty(&self) -> bool {
        self.suffix_label_probs.is_empty()
    }

    /// Appends ranked candidate labels for `word_form` to `target`.
    ///
    /// Starting from the label priors, each present suffix of the query is
    /// blended in from shortest to longest, so the longest attested suffix
    /// dominates: `p ← (p·σ + p_suffix) / (1 + σ)`. Candidates are then
    /// emitted in descending probability order until the accumulated mass
    /// exceeds `mass` (but at least 20 candidates), or until the optional
    /// hard cap (`-1` = no cap) is reached.
    pub fn set_guesses(&self, word_form: &str, target: &mut Vec<u32>, mass: f32, candidate_cap: i32) {
        // Every observed word contributes its empty suffix, so the row
        // is only missing when the model saw no words at all.
        let Some(empty_suffix) = self.suffix_label_probs.get("") else {
            return;
        };
        let mut probs: Vec<(u32, f32)> = empty_suffix.iter().map(|(&l, &p)| (l, p)).collect();

        let chars: Vec<char> = word_form.chars().collect();
        for start in (0..=chars.len()).rev() {
            if chars.len() - start > MAX_SUFFIX_LEN {
                continue;
            }
            let suffix: String = chars[start..].iter().collect();
            if let Some(suffix_probs) = self.suffix_label_probs.get(&suffix) {
                for (label, p) in probs.iter_mut() {
                    let suffix_p = suffix_probs.get(label).copied().unwrap_or(0.0);
                    *p = (*p * self.std_dev + suffix_p) / (1.0 + self.std_dev);
                }
            } else {
                break;
            }
        }

        probs.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));

        let mut emitted: i32 = 0;
        let mut accumulated = 0.0;
        for (label, p) in probs {
            target.push(label);
            emitted += 1;
            accumulated += p;

            if candidate_cap != -1 && emitted >= candidate_cap {
                break;
            }
            if accumulated > mass && emitted >= 20 {
                break;
            }
        }
    }
}
