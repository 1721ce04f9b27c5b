//! Containers for training and evaluation data.

use std::io::{BufRead, BufReader, Read, Write};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::errors::{MorfoError, Result};
use crate::labels::LabelRegistry;
use crate::lemmas::LemmaGuesser;
use crate::params::ParamStore;
use crate::sentence::{parse_entry, Entry, Sentence};

/// Accuracy of one labeling against another, split by whether the word
/// form was known to the lemma guesser at training time.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Accuracy {
    pub label_acc: f32,
    pub iv_label_acc: f32,
    pub oov_label_acc: f32,
    pub lemma_acc: f32,
    pub iv_lemma_acc: f32,
    pub oov_lemma_acc: f32,
}

/// An ordered collection of sentences read from tab-separated input.
#[derive(Clone, Debug, Default)]
pub(crate) struct Corpus {
    sentences: Vec<Sentence>,
}

impl Corpus {
    /// Reads blank-line-separated sentences from `rdr`.
    ///
    /// Several blank lines in a row still close a single sentence. In
    /// gold mode every record must carry a lemma and at least one label.
    ///
    /// # Errors
    ///
    /// [`MorfoError::Syntax`] on a malformed record, with its line number.
    pub fn from_reader<R>(
        rdr: R,
        is_gold: bool,
        registry: &mut LabelRegistry,
        params: &mut ParamStore,
    ) -> Result<Self>
    where
        R: Read,
    {
        let mut sentences = vec![];
        let mut entries: Vec<(usize, Entry)> = vec![];

        for (i, line) in BufReader::new(rdr).lines().enumerate() {
            let line = line?;
            let line_no = i + 1;

            if line.is_empty() {
                if !entries.is_empty() {
                    sentences.push(Sentence::from_entries(&entries, is_gold, registry, params)?);
                    entries.clear();
                }
                continue;
            }

            entries.push((line_no, parse_entry(&line, line_no)?));
        }

        if !entries.is_empty() {
            sentences.push(Sentence::from_entries(&entries, is_gold, registry, params)?);
        }

        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn at(&self, i: usize) -> &Sentence {
        &self.sentences[i]
    }

    pub fn at_mut(&mut self, i: usize) -> &mut Sentence {
        &mut self.sentences[i]
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn set_label_guesses(
        &mut self,
        registry: &LabelRegistry,
        use_lexicon: bool,
        mass: f32,
        candidate_cap: i32,
    ) {
        for sentence in &mut self.sentences {
            sentence.set_label_guesses(registry, use_lexicon, mass, candidate_cap);
        }
    }

    pub fn clear_label_guesses(&mut self) {
        for sentence in &mut self.sentences {
            sentence.clear_label_guesses();
        }
    }

    pub fn predict_lemmas(&mut self, lemmas: &LemmaGuesser, registry: &LabelRegistry) -> Result<()> {
        for sentence in &mut self.sentences {
            sentence.predict_lemmas(lemmas, registry)?;
        }
        Ok(())
    }

    pub fn unset_labels(&mut self) {
        for sentence in &mut self.sentences {
            sentence.unset_labels();
        }
    }

    /// Shuffles the sentences with a fixed seed, for replicable training.
    pub fn shuffle(&mut self) {
        let mut rng = StdRng::seed_from_u64(0);
        self.sentences.shuffle(&mut rng);
    }

    /// Label and lemma accuracy of `other` against this gold corpus.
    ///
    /// # Errors
    ///
    /// [`MorfoError::IncompatibleData`] when the corpora disagree in
    /// sentence count, sentence length, or word forms.
    pub fn accuracy(&self, other: &Corpus, lemmas: &LemmaGuesser) -> Result<Accuracy> {
        if self.sentences.len() != other.sentences.len() {
            return Err(MorfoError::IncompatibleData(format!(
                "sentence counts differ: {} vs {}",
                self.sentences.len(),
                other.sentences.len()
            )));
        }

        let mut label_match = [0.0f32; 3];
        let mut lemma_match = [0.0f32; 3];
        let mut words = [0.0f32; 3];

        const ALL: usize = 0;
        const IV: usize = 1;
        const OOV: usize = 2;

        for (i, (gold_s, sys_s)) in self.sentences.iter().zip(&other.sentences).enumerate() {
            if gold_s.len() != sys_s.len() {
                return Err(MorfoError::IncompatibleData(format!(
                    "sentence {i} lengths differ: {} vs {}",
                    gold_s.len(),
                    sys_s.len()
                )));
            }

            for (gold, sys) in gold_s.words().iter().zip(sys_s.words()) {
                if gold.word_form() != sys.word_form() {
                    return Err(MorfoError::IncompatibleData(format!(
                        "word forms differ: `{}` vs `{}`",
                        gold.word_form(),
                        sys.word_form()
                    )));
                }

                if gold.is_boundary() {
                    continue;
                }

                let split = if lemmas.is_known_word_form(gold.word_form()) {
                    IV
                } else {
                    OOV
                };

                for class in [ALL, split] {
                    label_match[class] += (gold.label() == sys.label()) as u32 as f32;
                    lemma_match[class] += (gold.lemma() == sys.lemma()) as u32 as f32;
                    words[class] += 1.0;
                }
            }
        }

        let ratio = |num: f32, den: f32| if den == 0.0 { 0.0 } else { num / den };

        Ok(Accuracy {
            label_acc: ratio(label_match[ALL], words[ALL]),
            iv_label_acc: ratio(label_match[IV], words[IV]),
            oov_label_acc: ratio(label_match[OOV], words[OOV]),
            lemma_acc: ratio(lemma_match[ALL], words[ALL]),
            iv_lemma_acc: ratio(lemma_match[IV], words[IV]),
            oov_lemma_acc: ratio(lemma_match[OOV], words[OOV]),
        })
    }

    /// Writes all sentences as output records with a blank line between
    /// sentences.
    pub fn print<W: Write>(&self, out: &mut W, registry: &LabelRegistry) -> Result<()> {
        for (i, sentence) in self.sentences.iter().enumerate() {
            sentence.print(out, registry)?;
            if i + 1 < self.sentences.len() {
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENTS: &str = "\

The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog\tdog\tNN VB\t_
.\tWORD=.\t.\t.\t_


The\tWORD=The\tthe\tDT\t_
dog\tWORD=dog\tdog\tNN VB\t_
.\tWORD=.\t.\t.\t_
";

    #[test]
    fn test_read_corpus() {
        let mut registry = LabelRegistry::new(10);
        let mut params = ParamStore::new();
        let corpus =
            Corpus::from_reader(CONTENTS.as_bytes(), false, &mut registry, &mut params).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.at(0).len(), 3 + 4);
        assert_eq!(corpus.at(1).len(), 3 + 4);
        assert_eq!(corpus.at(0).at(2).word_form(), "The");
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let contents = "The\tWORD=The\tthe\tDT\t_\nbroken line\n";
        let mut registry = LabelRegistry::new(10);
        let mut params = ParamStore::new();
        match Corpus::from_reader(contents.as_bytes(), false, &mut registry, &mut params) {
            Err(MorfoError::Syntax(e)) => assert_eq!(e.line, 2),
            r => panic!("expected a syntax error, got {r:?}"),
        }
    }

    #[test]
    fn test_incompatible_data() {
        let mut registry = LabelRegistry::new(10);
        let mut params = ParamStore::new();
        let corpus =
            Corpus::from_reader(CONTENTS.as_bytes(), true, &mut registry, &mut params).unwrap();

        let mut shorter = corpus.clone();
        shorter.sentences.pop();

        let lemmas = LemmaGuesser::new();
        assert!(matches!(
            corpus.accuracy(&shorter, &lemmas),
            Err(MorfoError::IncompatibleData(_))
        ));

        let acc = corpus.accuracy(&corpus, &lemmas).unwrap();
        assert_eq!(acc.label_acc, 1.0);
        assert_eq!(acc.lemma_acc, 1.0);
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let mut registry = LabelRegistry::new(10);
        let mut params = ParamStore::new();
        let corpus =
            Corpus::from_reader(CONTENTS.as_bytes(), false, &mut registry, &mut params).unwrap();

        let mut a = corpus.clone();
        let mut b = corpus;
        a.shuffle();
        b.shuffle();

        for (x, y) in a.sentences().iter().zip(b.sentences()) {
            assert_eq!(x.len(), y.len());
            for (wx, wy) in x.words().iter().zip(y.words()) {
                assert_eq!(wx.word_form(), wy.word_form());
            }
        }
    }

    #[test]
    fn test_print_roundtrips_records() {
        let mut registry = LabelRegistry::new(10);
        let mut params = ParamStore::new();
        // Gold mode assigns labels and lemmas, so records print back out.
        let corpus =
            Corpus::from_reader(CONTENTS.as_bytes(), true, &mut registry, &mut params).unwrap();

        let mut out = vec![];
        corpus.print(&mut out, &registry).unwrap();
        let text = String::from_utf8(out).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first, "The\t_\tthe\tDT\t_");
        assert_eq!(text.lines().filter(|l| l.is_empty()).count(), 1);
    }
}
