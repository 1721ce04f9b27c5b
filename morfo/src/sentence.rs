//! Words and boundary-padded sentences.

use std::io::Write;

use crate::annotations;
use crate::common::{BOUNDARY_PADDING, BOUNDARY_WORD_FORM};
use crate::errors::{MorfoError, Result};
use crate::labels::LabelRegistry;
use crate::lemmas::LemmaGuesser;
use crate::params::ParamStore;

/// Sentinel for a word with no assigned label.
pub(crate) const NO_LABEL: u32 = u32::MAX;

/// One field-split input record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Entry {
    pub token: String,
    pub feat_templates: Vec<String>,
    pub lemma: String,
    pub labels: Vec<String>,
    pub annotations: String,
}

/// Parses one 5-field tab-separated input line.
///
/// `TOKEN <TAB> FEATS <TAB> LEMMA|_ <TAB> LABELS|_ <TAB> ANNOTATIONS|_`
pub(crate) fn parse_entry(line: &str, line_no: usize) -> Result<Entry> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() != 5 {
        return Err(MorfoError::syntax(
            line_no,
            format!("expected 5 tab-separated fields, got {}", fields.len()),
        ));
    }
    if fields.iter().any(|f| f.is_empty()) {
        return Err(MorfoError::syntax(line_no, "empty field"));
    }

    Ok(Entry {
        token: fields[0].to_string(),
        feat_templates: fields[1].split(' ').map(String::from).collect(),
        lemma: if fields[2] == "_" {
            String::new()
        } else {
            fields[2].to_string()
        },
        labels: if fields[3] == "_" {
            vec![]
        } else {
            fields[3].split(' ').map(String::from).collect()
        },
        annotations: fields[4].to_string(),
    })
}

/// One token with its features, candidate labels and assignments.
#[derive(Clone, Debug)]
pub(crate) struct Word {
    word_form: String,
    lemma: String,
    annotations: String,
    label: u32,
    label_candidates: Vec<u32>,
    feature_templates: Vec<u32>,
    analyzer_lemmas: Vec<(u32, String)>,
}

impl Word {
    /// A sentence-boundary word.
    pub fn boundary(boundary_label: u32) -> Self {
        Self {
            word_form: BOUNDARY_WORD_FORM.to_string(),
            lemma: BOUNDARY_WORD_FORM.to_string(),
            annotations: String::new(),
            label: boundary_label,
            label_candidates: vec![boundary_label],
            feature_templates: vec![],
            analyzer_lemmas: vec![],
        }
    }

    pub fn new(
        word_form: String,
        feature_templates: Vec<u32>,
        label_candidates: Vec<u32>,
        annotations: String,
    ) -> Self {
        Self {
            word_form,
            lemma: String::new(),
            annotations,
            label: NO_LABEL,
            label_candidates,
            feature_templates,
            analyzer_lemmas: vec![],
        }
    }

    pub fn word_form(&self) -> &str {
        &self.word_form
    }

    pub fn is_boundary(&self) -> bool {
        self.word_form == BOUNDARY_WORD_FORM
    }

    pub fn lemma(&self) -> &str {
        &self.lemma
    }

    /// The assigned label, or [`NO_LABEL`].
    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn candidates(&self) -> &[u32] {
        &self.label_candidates
    }

    pub fn feature_templates(&self) -> &[u32] {
        &self.feature_templates
    }

    pub fn analyzer_lemmas(&self) -> &[(u32, String)] {
        &self.analyzer_lemmas
    }

    pub fn set_label(&mut self, label: u32) {
        self.label = label;
    }

    pub fn set_lemma(&mut self, lemma: &str) {
        self.lemma = lemma.to_string();
    }

    pub fn unset_label(&mut self) {
        self.label = NO_LABEL;
    }

    pub fn clear_label_guesses(&mut self) {
        self.label_candidates.clear();
    }

    pub fn set_label_guesses(
        &mut self,
        registry: &LabelRegistry,
        use_lexicon: bool,
        mass: f32,
        candidate_cap: i32,
    ) {
        registry.set_label_candidates(
            &self.word_form,
            use_lexicon,
            mass,
            candidate_cap,
            &mut self.label_candidates,
        );
    }

    /// Parses analyzer-proposed (label, lemma) pairs from the annotation
    /// field. Malformed annotation lists are ignored.
    pub fn set_analyzer_lemmas(&mut self, registry: &mut LabelRegistry) {
        if let Some(pairs) = annotations::parse_analyzer_pairs(&self.annotations) {
            self.analyzer_lemmas = pairs
                .into_iter()
                .map(|(label, lemma)| (registry.get_or_intern(&label), lemma))
                .collect();
        }
    }

    /// Predicts and assigns a lemma for the currently assigned label.
    ///
    /// # Errors
    ///
    /// [`MorfoError::NoLabel`] if no label has been assigned.
    pub fn predict_lemma(&mut self, lemmas: &LemmaGuesser, registry: &LabelRegistry) -> Result<()> {
        if self.label == NO_LABEL {
            return Err(MorfoError::NoLabel);
        }
        self.lemma = lemmas.lemma_candidate(&self.word_form, registry.label_string(self.label)?)?;
        Ok(())
    }

    fn to_record(&self, registry: &LabelRegistry) -> Result<String> {
        Ok(format!(
            "{}\t_\t{}\t{}\t{}",
            self.word_form,
            self.lemma,
            registry.label_string(self.label)?,
            self.annotations,
        ))
    }
}

/// A sequence of words padded with two boundary words at each end, so
/// that trigram context is always defined.
#[derive(Clone, Debug)]
pub(crate) struct Sentence {
    words: Vec<Word>,
}

impl Sentence {
    /// Builds a sentence from parsed input records.
    ///
    /// In gold mode every record must carry a lemma and at least one
    /// label; the first label becomes the assigned label.
    pub fn from_entries(
        entries: &[(usize, Entry)],
        is_gold: bool,
        registry: &mut LabelRegistry,
        params: &mut ParamStore,
    ) -> Result<Self> {
        let boundary = Word::boundary(registry.boundary_label());
        let mut words = vec![boundary.clone(); BOUNDARY_PADDING];

        for (line_no, entry) in entries {
            let mut word = Word::new(
                entry.token.clone(),
                params.intern_templates(&entry.feat_templates),
                registry.get_labels(&entry.labels),
                entry.annotations.clone(),
            );
            word.set_analyzer_lemmas(registry);

            if is_gold {
                if entry.lemma.is_empty() || entry.labels.is_empty() {
                    return Err(MorfoError::syntax(
                        *line_no,
                        "a gold record requires a lemma and at least one label",
                    ));
                }
                word.set_lemma(&entry.lemma);
                let label = registry.get_or_intern(&entry.labels[0]);
                word.set_label(label);
            }

            words.push(word);
        }

        words.extend(std::iter::repeat(boundary).take(BOUNDARY_PADDING));
        Ok(Self { words })
    }

    /// Builds a sentence directly from words, adding boundary padding.
    #[cfg(test)]
    pub fn from_words(words: Vec<Word>, boundary_label: u32) -> Self {
        let boundary = Word::boundary(boundary_label);
        let mut padded = vec![boundary.clone(); BOUNDARY_PADDING];
        padded.extend(words);
        padded.extend(std::iter::repeat(boundary).take(BOUNDARY_PADDING));
        Self { words: padded }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn at(&self, i: usize) -> &Word {
        &self.words[i]
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn set_label_guesses(
        &mut self,
        registry: &LabelRegistry,
        use_lexicon: bool,
        mass: f32,
        candidate_cap: i32,
    ) {
        for word in &mut self.words {
            word.set_label_guesses(registry, use_lexicon, mass, candidate_cap);
        }
    }

    pub fn clear_label_guesses(&mut self) {
        for word in &mut self.words {
            word.clear_label_guesses();
        }
    }

    /// Assigns one label per position.
    pub fn set_labels(&mut self, labels: &[u32]) {
        assert_eq!(labels.len(), self.words.len());
        for (word, &label) in self.words.iter_mut().zip(labels) {
            word.set_label(label);
        }
    }

    pub fn unset_labels(&mut self) {
        for word in &mut self.words {
            word.unset_label();
        }
    }

    pub fn predict_lemmas(&mut self, lemmas: &LemmaGuesser, registry: &LabelRegistry) -> Result<()> {
        for word in &mut self.words {
            word.predict_lemma(lemmas, registry)?;
        }
        Ok(())
    }

    /// Writes the non-boundary words as output records, one per line.
    pub fn print<W: Write>(&self, out: &mut W, registry: &LabelRegistry) -> Result<()> {
        for word in &self.words {
            if word.is_boundary() {
                continue;
            }
            writeln!(out, "{}", word.to_record(registry)?)?;
        }
        Ok(())
    }
}
