//! Label interning and suffix-based label guessing.

pub(crate) mod suffix;

use bincode::{Decode, Encode};
use hashbrown::{HashMap, HashSet};

use crate::common::BOUNDARY_WORD_FORM;
use crate::corpus::Corpus;
use crate::errors::{MorfoError, Result};
use crate::labels::suffix::SuffixLabelModel;
use crate::serial::{OrderedMap, OrderedSet};

/// Interns label strings, records compound-label decompositions, and
/// proposes candidate label sets for word forms.
///
/// A label string containing `|` is a compound; each piece is interned as
/// `SL:<piece>` and the parent keeps the list of sub-label ids for
/// parameter sharing. Label id 0 is reserved for the sentence boundary.
#[derive(Clone, Debug, Decode, Encode, PartialEq)]
pub(crate) struct LabelRegistry {
    max_suffix_len: u32,
    label_map: OrderedMap<String, u32>,
    string_map: Vec<String>,
    suffix_models: Vec<SuffixLabelModel>,
    lexicon: OrderedMap<String, Vec<u32>>,
    sub_label_map: OrderedMap<u32, Vec<u32>>,
    oov_words: OrderedSet<String>,
    open_classes: OrderedSet<u32>,
}

impl LabelRegistry {
    pub fn new(max_suffix_len: u32) -> Self {
        let mut registry = Self {
            max_suffix_len,
            label_map: OrderedMap::new(),
            string_map: vec![],
            suffix_models: (0..=max_suffix_len).map(SuffixLabelModel::new).collect(),
            lexicon: OrderedMap::new(),
            sub_label_map: OrderedMap::new(),
            oov_words: OrderedSet::new(),
            open_classes: OrderedSet::new(),
        };
        registry.get_or_intern(BOUNDARY_WORD_FORM);
        registry
    }

    /// The reserved sentence-boundary label.
    pub fn boundary_label(&self) -> u32 {
        0
    }

    pub fn label_count(&self) -> usize {
        self.string_map.len()
    }

    /// Interns a label string, decomposing compounds into sub-labels.
    ///
    /// Idempotent: an already known string returns its existing id.
    pub fn get_or_intern(&mut self, label_string: &str) -> u32 {
        if let Some(&id) = self.label_map.get(label_string) {
            return id;
        }

        let id = self.string_map.len() as u32;
        self.label_map.insert(label_string.to_string(), id);
        self.string_map.push(label_string.to_string());

        if label_string.contains('|') {
            let pieces: Vec<String> = label_string
                .split('|')
                .map(|piece| format!("SL:{piece}"))
                .collect();
            let sub_labels: Vec<u32> = pieces.iter().map(|piece| self.get_or_intern(piece)).collect();
            self.sub_label_map.insert(id, sub_labels);
        }

        id
    }

    pub fn get_labels(&mut self, label_strings: &[String]) -> Vec<u32> {
        label_strings.iter().map(|s| self.get_or_intern(s)).collect()
    }

    /// The sub-label ids of a compound label; empty for plain labels.
    pub fn sub_labels(&self, label: u32) -> &[u32] {
        self.sub_label_map.get(&label).map_or(&[], Vec::as_slice)
    }

    /// Dense copy of the sub-label decomposition, for wiring into a
    /// parameter store.
    pub fn sub_label_table(&self) -> Vec<Vec<u32>> {
        (0..self.label_count() as u32)
            .map(|id| self.sub_labels(id).to_vec())
            .collect()
    }

    pub fn label_string(&self, label: u32) -> Result<&str> {
        self.string_map
            .get(label as usize)
            .map(String::as_str)
            .ok_or(MorfoError::IllegalLabel(label))
    }

    /// Trains the suffix models, the lexicon, and the OOV/open-class sets
    /// from gold-labeled data.
    ///
    /// OOV marking partitions the sentences into 10 buckets by index; a
    /// word form is OOV iff it occurs in exactly one bucket. Labels
    /// carried by OOV words become open classes.
    pub fn train(&mut self, corpus: &Corpus) {
        for model in &mut self.suffix_models {
            for sentence in corpus.sentences() {
                for word in sentence.words() {
                    model.observe(word.word_form(), word.label());
                }
            }
            model.normalize();
        }

        let mut buckets: Vec<HashSet<&str>> = vec![HashSet::new(); 10];
        let mut lexicon_counts: HashMap<&str, HashMap<u32, u32>> = HashMap::new();

        for (i, sentence) in corpus.sentences().iter().enumerate() {
            for word in sentence.words() {
                let wf = word.word_form();
                buckets[i % 10].insert(wf);

                if wf == BOUNDARY_WORD_FORM {
                    continue;
                }

                *lexicon_counts
                    .entry(wf)
                    .or_default()
                    .entry(word.label())
                    .or_insert(0) += 1;
            }
        }

        for (i, bucket) in buckets.iter().enumerate() {
            for wf in bucket {
                let found = buckets
                    .iter()
                    .enumerate()
                    .any(|(j, other)| i != j && other.contains(wf));
                if !found {
                    self.oov_words.insert(wf.to_string());
                }
            }
        }

        for (wf, label_counts) in &lexicon_counts {
            let mut labels: Vec<u32> = label_counts.keys().copied().collect();
            labels.sort_unstable();

            if self.oov_words.contains(*wf) {
                self.open_classes.extend(labels.iter().copied());
            }

            self.lexicon.insert(wf.to_string(), labels);
        }
    }

    /// Whether a word form is out-of-vocabulary: never seen in training,
    /// or seen in only one of the held-out partitions.
    #[allow(dead_code)]
    pub fn is_oov(&self, word_form: &str) -> bool {
        !self.lexicon.contains_key(word_form) || self.oov_words.contains(word_form)
    }

    /// Whether at least one OOV training word carried this label.
    #[allow(dead_code)]
    pub fn open_class(&self, label: u32) -> bool {
        self.open_classes.contains(&label)
    }

    /// Fills `target` with candidate labels for `word_form`.
    ///
    /// Seen word forms take their lexicon labels when `use_lexicon` is
    /// set; unseen ones are guessed from the longest non-empty suffix
    /// model, unioned with any lexicon labels.
    pub fn set_label_candidates(
        &self,
        word_form: &str,
        use_lexicon: bool,
        mass: f32,
        candidate_cap: i32,
        target: &mut Vec<u32>,
    ) {
        if word_form == BOUNDARY_WORD_FORM {
            target.clear();
            target.push(self.boundary_label());
            return;
        }

        if use_lexicon {
            if let Some(labels) = self.lexicon.get(word_form) {
                target.clear();
                target.extend_from_slice(labels);
                return;
            }
            if !target.is_empty() {
                // Candidates provided in the input file win.
                return;
            }
        }

        let mut len = word_form.chars().count().min(self.max_suffix_len as usize);
        while len > 0 && self.suffix_models[len].is_empty() {
            len -= 1;
        }
        self.suffix_models[len].set_guesses(word_form, target, mass, candidate_cap);

        if let Some(labels) = self.lexicon.get(word_form) {
            for &label in labels {
                if !target.contains(&label) {
                    target.push(label);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::params::ParamStore;

    fn tiny_corpus(registry: &mut LabelRegistry) -> Corpus {
        let contents = "\
The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog\tdog\tNN\t_
.\tWORD=.\t.\t.\t_

The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog\tdog\tNN\t_
.\tWORD=.\t.\t.\t_

.\tWORD=.\t.\t.\t_
";
        let mut params = ParamStore::new();
        Corpus::from_reader(contents.as_bytes(), true, registry, &mut params).unwrap()
    }

    #[test]
    fn test_boundary_label_is_zero() {
        let registry = LabelRegistry::new(10);
        assert_eq!(registry.boundary_label(), 0);
        assert_eq!(registry.label_string(0).unwrap(), BOUNDARY_WORD_FORM);
    }

    #[test]
    fn test_interning_is_idempotent() {
        let mut registry = LabelRegistry::new(10);
        let nn = registry.get_or_intern("NN");
        assert_eq!(registry.get_or_intern("NN"), nn);
        assert_eq!(registry.label_string(nn).unwrap(), "NN");
        assert!(registry.label_string(1000).is_err());
    }

    #[test]
    fn test_compound_labels_intern_sub_labels() {
        let mut registry = LabelRegistry::new(10);
        let compound = registry.get_or_intern("A|B|C");

        let subs = registry.sub_labels(compound).to_vec();
        assert_eq!(subs.len(), 3);
        assert_eq!(registry.label_string(subs[0]).unwrap(), "SL:A");
        assert_eq!(registry.label_string(subs[1]).unwrap(), "SL:B");
        assert_eq!(registry.label_string(subs[2]).unwrap(), "SL:C");

        // Sub-labels are ordinary labels with no decomposition of their own.
        assert!(registry.sub_labels(subs[0]).is_empty());
        // Plain labels have none either.
        let nn = registry.get_or_intern("NN");
        assert!(registry.sub_labels(nn).is_empty());

        // Shared pieces resolve to the same sub-label ids.
        let other = registry.get_or_intern("A|D");
        assert_eq!(registry.sub_labels(other)[0], subs[0]);
    }

    #[test]
    fn test_label_candidates_from_suffix_models() {
        let mut registry = LabelRegistry::new(3);
        let corpus = tiny_corpus(&mut registry);
        registry.train(&corpus);

        let mut guesses = vec![];
        registry.set_label_candidates("hog", false, 1.01, -1, &mut guesses);
        let dt = registry.label_map["DT"];
        let nn = registry.label_map["NN"];
        let stop = registry.label_map["."];
        assert_eq!(guesses.len(), 3);
        assert!(!guesses.contains(&0));
        for label in [dt, nn, stop] {
            assert!(guesses.contains(&label));
        }
    }

    #[test]
    fn test_label_candidates_from_lexicon() {
        let mut registry = LabelRegistry::new(3);
        let corpus = tiny_corpus(&mut registry);
        registry.train(&corpus);

        let mut guesses = vec![];
        registry.set_label_candidates("dog", true, 5.0, -1, &mut guesses);
        assert_eq!(guesses, [registry.label_map["NN"]]);
    }

    #[test]
    fn test_boundary_candidates() {
        let mut registry = LabelRegistry::new(3);
        let corpus = tiny_corpus(&mut registry);
        registry.train(&corpus);

        let mut guesses = vec![99];
        registry.set_label_candidates(BOUNDARY_WORD_FORM, true, 1.0, -1, &mut guesses);
        assert_eq!(guesses, [0]);
    }

    #[test]
    fn test_oov_and_open_classes() {
        let contents = "\
The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog\tdog\tNN\t_

The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog\tdog\tNN\t_

hamster\tWORD=hamster\thamster\tNN\t_
barks\tWORD=barks\tbark\tVB\t_
";
        let mut registry = LabelRegistry::new(3);
        let mut params = ParamStore::new();
        let corpus =
            Corpus::from_reader(contents.as_bytes(), true, &mut registry, &mut params).unwrap();
        registry.train(&corpus);

        // "dog" occurs in two of the ten sentence buckets; "hamster" and
        // "barks" in one, so they proxy for unseen words.
        assert!(!registry.is_oov("dog"));
        assert!(registry.is_oov("hamster"));
        assert!(registry.is_oov("never-seen"));

        // NN and VB ride on OOV words; DT does not.
        assert!(registry.open_class(registry.label_map["NN"]));
        assert!(registry.open_class(registry.label_map["VB"]));
        assert!(!registry.open_class(registry.label_map["DT"]));
        assert!(!registry.open_class(registry.boundary_label()));
    }

    #[test]
    fn test_roundtrip() {
        let mut registry = LabelRegistry::new(3);
        let corpus = tiny_corpus(&mut registry);
        registry.train(&corpus);

        let bytes = bincode::encode_to_vec(&registry, crate::common::bincode_config()).unwrap();
        let (decoded, _): (LabelRegistry, usize) =
            bincode::decode_from_slice(&bytes, crate::common::bincode_config()).unwrap();
        assert_eq!(registry, decoded);

        let bytes2 = bincode::encode_to_vec(&decoded, crate::common::bincode_config()).unwrap();
        assert_eq!(bytes, bytes2);
    }
}
