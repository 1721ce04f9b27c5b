//! Suffix-edit lemmatization.
//!
//! A (word form, lemma) pair is reduced to the minimal suffix rewrite
//! that maps the lowercased form to the lowercased lemma; the rewrites
//! are interned as classes, and a discriminative model over emission
//! features picks the class to apply to an unseen word.

use std::io::Write;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use bincode::{
    de::{BorrowDecoder, Decoder},
    enc::Encoder,
    error::{DecodeError, EncodeError},
    BorrowDecode, Decode, Encode,
};

use crate::case::CaseTable;
use crate::config::Degree;
use crate::corpus::Corpus;
use crate::errors::{MorfoError, Result};
use crate::labels::LabelRegistry;
use crate::params::ParamStore;
use crate::sentence::Word;
use crate::serial::{OrderedMap, OrderedSet};
use crate::trainer::PerceptronTrainer;

const PADDING: &str = "^^^^^^^^^^";

/// Separator of the (word form, label) key in the lemma lexicon.
const WORD_LABEL_SEP: &str = "<W+LA>";
const WORD_ONLY_SUFFIX: &str = "<W>";

/// The minimal suffix rewrite turning `word1` into `word2`: both words
/// minus their longest common prefix.
pub(crate) fn minimal_suffix_edit(word1: &str, word2: &str) -> (String, String) {
    let chars1: Vec<char> = word1.chars().collect();
    let chars2: Vec<char> = word2.chars().collect();

    let mut start = 0;
    while start < chars1.len() && start < chars2.len() && chars1[start] == chars2[start] {
        start += 1;
    }

    (
        chars1[start..].iter().collect(),
        chars2[start..].iter().collect(),
    )
}

/// Learns suffix-edit classes from (word form, lemma) pairs and predicts
/// lemmas for (word form, label) queries.
#[derive(Clone, Debug)]
pub(crate) struct LemmaGuesser {
    params: ParamStore,
    class_count: u32,
    lemma_lexicon: OrderedMap<String, String>,
    suffix_map: OrderedMap<String, OrderedMap<String, u32>>,
    id_map: OrderedMap<u32, (String, String)>,
    feat_dict: OrderedMap<String, u32>,
    word_form_dict: OrderedSet<String>,
    max_passes: u32,
    case: CaseTable,
}

impl Default for LemmaGuesser {
    fn default() -> Self {
        Self::new()
    }
}

impl LemmaGuesser {
    pub fn new() -> Self {
        Self {
            params: ParamStore::new(),
            // Class id 0 is reserved.
            class_count: 1,
            lemma_lexicon: OrderedMap::new(),
            suffix_map: OrderedMap::new(),
            id_map: OrderedMap::new(),
            feat_dict: OrderedMap::new(),
            word_form_dict: OrderedSet::new(),
            max_passes: 50,
            case: CaseTable::default(),
        }
    }

    pub fn set_max_passes(&mut self, max_passes: u32) {
        self.max_passes = max_passes;
    }

    /// Whether the word form occurred in the training data.
    pub fn is_known_word_form(&self, word_form: &str) -> bool {
        self.word_form_dict.contains(word_form)
    }

    /// Number of interned suffix-edit classes, the reserved id included.
    #[allow(dead_code)]
    pub fn class_count(&self) -> u32 {
        self.class_count
    }

    /// Number of interned feature strings.
    #[allow(dead_code)]
    pub fn feature_count(&self) -> u32 {
        self.feat_dict.len() as u32
    }

    /// Interns the suffix-edit class of a (word form, lemma) pair.
    pub fn class_number_interned(&mut self, word: &str, lemma: &str) -> u32 {
        let lc_word = self.case.lowercase(word);
        let lc_lemma = self.case.lowercase(lemma);
        let (wf_suffix, lemma_suffix) = minimal_suffix_edit(&lc_word, &lc_lemma);

        let classes = self.suffix_map.entry(wf_suffix.clone()).or_default();
        if let Some(&class) = classes.get(&lemma_suffix) {
            return class;
        }

        let class = self.class_count;
        classes.insert(lemma_suffix.clone(), class);
        self.id_map.insert(class, (wf_suffix, lemma_suffix));
        self.class_count += 1;
        class
    }

    /// The already interned suffix-edit class of a (word form, lemma)
    /// pair.
    ///
    /// # Errors
    ///
    /// [`MorfoError::UnknownSuffixPair`] when the pair was never interned.
    pub fn class_number(&self, word: &str, lemma: &str) -> Result<u32> {
        let lc_word = self.case.lowercase(word);
        let lc_lemma = self.case.lowercase(lemma);
        let (wf_suffix, lemma_suffix) = minimal_suffix_edit(&lc_word, &lc_lemma);

        self.suffix_map
            .get(&wf_suffix)
            .and_then(|classes| classes.get(&lemma_suffix))
            .copied()
            .ok_or(MorfoError::UnknownSuffixPair)
    }

    /// Classes whose word-form suffix matches a strict suffix of the
    /// lowercased word (the empty suffix included).
    pub fn class_candidates(&self, word: &str) -> Vec<u32> {
        let chars: Vec<char> = self.case.lowercase(word).chars().collect();

        let mut candidates = vec![];
        for start in 1..=chars.len() {
            let suffix: String = chars[start..].iter().collect();
            if let Some(classes) = self.suffix_map.get(&suffix) {
                candidates.extend(classes.values().copied());
            }
        }

        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    fn feature_strings(&self, word_form: &str, label: &str) -> Vec<String> {
        let word = self.case.lowercase(word_form);
        let word_chars: Vec<char> = word.chars().collect();
        let padded: Vec<char> = PADDING.chars().chain(word.chars()).collect();
        let n = padded.len();

        let mut feats = vec![format!("WORD={word}")];

        for start in (n - 7)..=n {
            let suffix: String = padded[start..].iter().collect();
            feats.push(format!("SUFFIX={suffix}"));
            feats.push(format!("SUFFIX={suffix} LABEL={label}"));
        }

        for len in 1..=5 {
            if len > word_chars.len() {
                break;
            }
            let prefix: String = word_chars[..len].iter().collect();
            feats.push(format!("PREFIX={prefix}"));
            feats.push(format!("PREFIX={prefix} LABEL={label}"));
        }

        // Two-character windows ending 2, 3 and 4 characters from the end.
        for (name, offset) in [("INFIX4", 4), ("INFIX5", 5), ("INFIX6", 6)] {
            let infix: String = padded[n - offset..n - offset + 2].iter().collect();
            feats.push(format!("{name}={infix}"));
            feats.push(format!("{name}={infix} LABEL={label}"));
        }

        feats.push(format!("LABEL={label}"));
        let morph_feats = label.find('|').map_or(label, |pos| &label[pos..]);
        feats.push(format!("MFEATS={morph_feats}"));

        if self.case.has_upper(word_form) {
            feats.push("UC".to_string());
        }
        if self.case.has_digit(word_form) {
            feats.push("DIGIT".to_string());
        }

        feats
    }

    /// Builds the feature word of a (word form, label) pair, interning
    /// unseen feature strings. Training side.
    pub fn extract_features_interned(&mut self, word_form: &str, label: &str) -> Word {
        let mut templates = vec![];
        for feat in self.feature_strings(word_form, label) {
            let next_id = self.feat_dict.len() as u32;
            let id = *self.feat_dict.entry(feat).or_insert(next_id);
            templates.push(id);
        }
        Word::new(word_form.to_string(), templates, vec![], String::new())
    }

    /// Builds the feature word of a (word form, label) pair from known
    /// features only. Prediction side; never grows the dictionaries.
    pub fn extract_features(&self, word_form: &str, label: &str) -> Word {
        let templates = self
            .feature_strings(word_form, label)
            .iter()
            .filter_map(|feat| self.feat_dict.get(feat).copied())
            .collect();
        Word::new(word_form.to_string(), templates, vec![], String::new())
    }

    /// Highest scoring candidate class of a feature word, or `None` when
    /// no class candidate exists.
    pub fn best_class(&self, word: &Word, params: &ParamStore) -> Option<u32> {
        let mut best: Option<(f32, u32)> = None;
        for class in self.class_candidates(word.word_form()) {
            let score = params.emission_score(word, class, Degree::Nodeg);
            if best.map_or(true, |(max, _)| score > max) {
                best = Some((score, class));
            }
        }
        best.map(|(_, class)| class)
    }

    /// Applies the edit script of `class` to the lowercased word form.
    pub fn lemma_for_class(&self, word_form: &str, class: u32) -> Result<String> {
        let (wf_suffix, lemma_suffix) = self
            .id_map
            .get(&class)
            .ok_or(MorfoError::UnknownClass)?;

        let lc_word = self.case.lowercase(word_form);
        let stem = lc_word
            .strip_suffix(wf_suffix.as_str())
            .ok_or(MorfoError::UnknownSuffixPair)?;

        Ok(format!("{stem}{lemma_suffix}"))
    }

    /// Predicts the lemma of a (word form, label) pair.
    ///
    /// Exact (word form, label) hits in the training lexicon win, then
    /// word-form-only hits; everything else goes through the
    /// discriminative class model.
    pub fn lemma_candidate(&self, word_form: &str, label: &str) -> Result<String> {
        if let Some(lemma) = self
            .lemma_lexicon
            .get(&format!("{word_form}{WORD_LABEL_SEP}{label}"))
        {
            return Ok(lemma.clone());
        }

        if let Some(lemma) = self.lemma_lexicon.get(&format!("{word_form}{WORD_ONLY_SUFFIX}")) {
            return Ok(lemma.clone());
        }

        let features = self.extract_features(word_form, label);
        let class = self
            .best_class(&features, &self.params)
            .ok_or(MorfoError::UnknownClass)?;
        self.lemma_for_class(word_form, class)
    }

    fn extract_classes(&mut self, corpus: &Corpus, registry: &LabelRegistry) -> Result<()> {
        for sentence in corpus.sentences() {
            for word in sentence.words() {
                self.class_number_interned(word.word_form(), word.lemma());

                let label_string = registry.label_string(word.label())?;
                self.lemma_lexicon.insert(
                    format!("{}{}{}", word.word_form(), WORD_LABEL_SEP, label_string),
                    word.lemma().to_string(),
                );
                self.lemma_lexicon.insert(
                    format!("{}{}", word.word_form(), WORD_ONLY_SUFFIX),
                    word.lemma().to_string(),
                );

                self.word_form_dict.insert(word.word_form().to_string());
            }
        }
        Ok(())
    }

    /// Builds one training instance per (word form, label, lemma) triple;
    /// the gold class id is stored as the instance's label.
    fn build_instances(
        &mut self,
        corpus: &Corpus,
        registry: &LabelRegistry,
        with_alternatives: bool,
    ) -> Result<Vec<Word>> {
        let mut instances = vec![];

        for sentence in corpus.sentences() {
            for word in sentence.words() {
                let label_string = registry.label_string(word.label())?.to_string();
                let mut instance = self.extract_features_interned(word.word_form(), &label_string);
                instance.set_label(self.class_number_interned(word.word_form(), word.lemma()));
                instances.push(instance);

                if !with_alternatives {
                    continue;
                }

                for (alt_label, alt_lemma) in word.analyzer_lemmas() {
                    if *alt_label == word.label() && alt_lemma == word.lemma() {
                        continue;
                    }

                    let alt_label_string = registry.label_string(*alt_label)?.to_string();
                    let mut instance =
                        self.extract_features_interned(word.word_form(), &alt_label_string);
                    instance.set_label(self.class_number_interned(word.word_form(), alt_lemma));
                    instances.push(instance);
                }
            }
        }

        Ok(instances)
    }

    /// Trains the class model with the averaged perceptron.
    pub fn train<W: Write>(
        &mut self,
        train: &Corpus,
        dev: &Corpus,
        registry: &LabelRegistry,
        msg_out: &mut W,
    ) -> Result<()> {
        self.extract_classes(train, registry)?;

        let mut train_instances = self.build_instances(train, registry, true)?;
        let dev_instances = self.build_instances(dev, registry, false)?;

        let mut rng = StdRng::seed_from_u64(0);
        train_instances.shuffle(&mut rng);

        let mut params = std::mem::take(&mut self.params);
        let mut trainer = PerceptronTrainer::lemmatizer(self.max_passes, 3);
        trainer.train_lemmatizer(&train_instances, &dev_instances, self, &mut params, msg_out)?;
        self.params = params;

        Ok(())
    }

    /// Structural equality over the persistent fields.
    pub fn same_model(&self, other: &LemmaGuesser) -> bool {
        self.params.same_params(&other.params)
            && self.class_count == other.class_count
            && self.lemma_lexicon == other.lemma_lexicon
            && self.suffix_map == other.suffix_map
            && self.id_map == other.id_map
            && self.feat_dict == other.feat_dict
            && self.word_form_dict == other.word_form_dict
            && self.max_passes == other.max_passes
    }
}

impl Encode for LemmaGuesser {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> std::result::Result<(), EncodeError> {
        Encode::encode(&self.params, encoder)?;
        Encode::encode(&self.class_count, encoder)?;
        Encode::encode(&self.lemma_lexicon, encoder)?;
        Encode::encode(&self.suffix_map, encoder)?;
        Encode::encode(&self.id_map, encoder)?;
        Encode::encode(&self.feat_dict, encoder)?;
        Encode::encode(&self.word_form_dict, encoder)?;
        Encode::encode(&self.max_passes, encoder)?;
        Ok(())
    }
}

impl<Context> Decode<Context> for LemmaGuesser {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        Ok(Self {
            params: Decode::decode(decoder)?,
            class_count: Decode::decode(decoder)?,
            lemma_lexicon: Decode::decode(decoder)?,
            suffix_map: Decode::decode(decoder)?,
            id_map: Decode::decode(decoder)?,
            feat_dict: Decode::decode(decoder)?,
            word_form_dict: Decode::decode(decoder)?,
            max_passes: Decode::decode(decoder)?,
            case: CaseTable::default(),
        })
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for LemmaGuesser {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        Decode::decode(decoder)
    }
}
