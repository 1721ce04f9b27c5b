//! End-to-end tagging: training, labeling, evaluation and persistence.

use std::io::{self, BufRead, BufReader, Read, Write};

use crate::common;
use crate::config::{Estimator, Inference, Regularization, TaggerConfig};
use crate::corpus::{Accuracy, Corpus};
use crate::errors::{MorfoError, Result};
use crate::labels::LabelRegistry;
use crate::lemmas::LemmaGuesser;
use crate::params::ParamStore;
use crate::sentence::{parse_entry, Entry, Sentence};
use crate::serial;
use crate::trainer::{PerceptronTrainer, SgdTrainer};
use crate::trellis::Trellis;

const MODEL_MAGIC: &str = "FinnPosModel";
const ENDIANNESS_MARKER: i32 = 1;

/// A morphological tagger and lemmatizer.
///
/// Estimated from labeled corpora, serialized into a self-describing
/// binary model, and applied to label and lemmatize unlabeled input.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::fs::File;
/// use morfo::{Tagger, TaggerConfig};
///
/// let config = TaggerConfig::from_reader(File::open("morfo.conf")?)?;
/// let mut tagger = Tagger::new(config);
///
/// let train = File::open("train.tsv")?;
/// let dev = File::open("dev.tsv")?;
/// tagger.train(train, dev)?;
///
/// let mut model = File::create("model.bin")?;
/// tagger.store(&mut model)?;
/// # Ok(())
/// # }
/// ```
pub struct Tagger {
    pub(crate) config: TaggerConfig,
    registry: LabelRegistry,
    lemmas: LemmaGuesser,
    params: ParamStore,
    msg_out: Box<dyn Write>,
    silent: bool,
}

impl Tagger {
    /// Creates an untrained tagger; progress messages go to stderr.
    pub fn new(config: TaggerConfig) -> Self {
        Self::with_message_output(config, Box::new(io::stderr()))
    }

    /// Creates an untrained tagger with a custom message sink.
    pub fn with_message_output(config: TaggerConfig, msg_out: Box<dyn Write>) -> Self {
        let mut tagger = Self {
            registry: LabelRegistry::new(config.suffix_length),
            lemmas: LemmaGuesser::new(),
            params: ParamStore::new(),
            config,
            msg_out,
            silent: false,
        };
        tagger.params.set_filter(&tagger.config);
        tagger
    }

    /// Suppresses warnings on the message sink. Fatal errors still
    /// surface as [`MorfoError`].
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    fn warn(&mut self, msg: &str) -> Result<()> {
        if !self.silent {
            writeln!(self.msg_out, "Warning! {msg}")?;
        }
        Ok(())
    }

    /// Trains the label guesser, the lemma guesser and the tagging model
    /// from gold training data, selecting parameters on gold development
    /// data.
    ///
    /// # Errors
    ///
    /// Syntax errors from the corpus readers and I/O errors from the
    /// message sink are propagated.
    pub fn train<R1, R2>(&mut self, train_rdr: R1, dev_rdr: R2) -> Result<()>
    where
        R1: Read,
        R2: Read,
    {
        if self.config.estimator == Estimator::AvgPerc
            && (self.config.regularization != Regularization::None
                || self.config.delta != -1.0
                || self.config.sigma != -1.0)
        {
            self.warn(
                "The averaged perceptron doesn't utilize delta, sigma or \
                 regularization. Options will be discarded.",
            )?;
        }

        writeln!(self.msg_out, "Reading training data.")?;
        let mut train_data =
            Corpus::from_reader(train_rdr, true, &mut self.registry, &mut self.params)?;
        train_data.clear_label_guesses();
        train_data.shuffle();

        writeln!(self.msg_out, "Training label guesser.")?;
        self.registry.train(&train_data);
        self.params.set_sub_labels(self.registry.sub_label_table());

        writeln!(self.msg_out, "Reading development data.")?;
        let mut dev_data = Corpus::from_reader(dev_rdr, true, &mut self.registry, &mut self.params)?;
        dev_data.clear_label_guesses();

        writeln!(self.msg_out, "Setting label guesses.")?;
        train_data.set_label_guesses(
            &self.registry,
            false,
            self.config.guess_mass,
            self.config.guess_cap(false),
        );
        // The development side sees the lexicon and nearly all the mass.
        dev_data.set_label_guesses(&self.registry, true, 0.9999, self.config.guess_cap(true));

        writeln!(self.msg_out, "Estimating lemmatizer parameters.")?;
        self.lemmas.set_max_passes(self.config.max_lemmatizer_passes);
        self.lemmas
            .train(&train_data, &dev_data, &self.registry, &mut self.msg_out)?;

        writeln!(self.msg_out, "Estimating tagger parameters.")?;
        match self.config.estimator {
            Estimator::AvgPerc => {
                let mut trainer =
                    PerceptronTrainer::new(&self.config, self.registry.boundary_label());
                trainer.train(
                    &train_data,
                    &dev_data,
                    &self.lemmas,
                    &mut self.params,
                    &mut self.msg_out,
                )?;
            }
            Estimator::Ml => {
                let mut trainer = SgdTrainer::new(&self.config, self.registry.boundary_label());
                trainer.train(
                    &train_data,
                    &dev_data,
                    &self.lemmas,
                    &mut self.params,
                    &mut self.msg_out,
                )?;
            }
        }

        Ok(())
    }

    fn decode_sentence(&self, sentence: &Sentence) -> Vec<u32> {
        let mut trellis = Trellis::new(
            sentence,
            self.registry.boundary_label(),
            self.config.sublabel_order,
            self.config.model_order,
        );
        if let Some(width) = self.config.beam_width() {
            trellis.set_beam(width);
        }
        if let Some(mass) = self.config.adaptive_beam_mass() {
            trellis.set_beam_mass(mass);
        }
        match self.config.inference {
            Inference::Map => trellis.map_assignment(&self.params),
            Inference::Marginal => trellis.marginal_assignment(&self.params),
        }
    }

    fn decode_corpus(&self, data: &mut Corpus) {
        for j in 0..data.len() {
            let labels = self.decode_sentence(data.at(j));
            data.at_mut(j).set_labels(&labels);
        }
    }

    /// Labels and lemmatizes unlabeled input, writing output records to
    /// `output`.
    ///
    /// # Errors
    ///
    /// Syntax errors from the input reader and I/O errors from the
    /// output sink are propagated.
    pub fn label<R, W>(&mut self, input: R, output: &mut W) -> Result<()>
    where
        R: Read,
        W: Write,
    {
        let mut data = Corpus::from_reader(input, false, &mut self.registry, &mut self.params)?;
        self.params.set_sub_labels(self.registry.sub_label_table());

        data.set_label_guesses(
            &self.registry,
            self.config.use_label_dictionary,
            self.config.guess_mass,
            self.config.guess_cap(true),
        );

        self.decode_corpus(&mut data);
        data.predict_lemmas(&self.lemmas, &self.registry)?;
        data.print(output, &self.registry)
    }

    /// Labels and lemmatizes input one sentence at a time, emitting each
    /// sentence's records as soon as its closing blank line is read.
    ///
    /// Suited to piped input; the output is identical to
    /// [`label`](Self::label).
    pub fn label_stream<R, W>(&mut self, input: R, output: &mut W) -> Result<()>
    where
        R: Read,
        W: Write,
    {
        let mut entries: Vec<(usize, Entry)> = vec![];
        let mut first = true;

        for (i, line) in BufReader::new(input).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                if !entries.is_empty() {
                    self.label_one(&entries, output, &mut first)?;
                    entries.clear();
                }
                continue;
            }
            entries.push((i + 1, parse_entry(&line, i + 1)?));
        }

        if !entries.is_empty() {
            self.label_one(&entries, output, &mut first)?;
        }

        Ok(())
    }

    fn label_one<W>(
        &mut self,
        entries: &[(usize, Entry)],
        output: &mut W,
        first: &mut bool,
    ) -> Result<()>
    where
        W: Write,
    {
        let mut sentence =
            Sentence::from_entries(entries, false, &mut self.registry, &mut self.params)?;
        self.params.set_sub_labels(self.registry.sub_label_table());

        sentence.set_label_guesses(
            &self.registry,
            self.config.use_label_dictionary,
            self.config.guess_mass,
            self.config.guess_cap(true),
        );

        let labels = self.decode_sentence(&sentence);
        sentence.set_labels(&labels);
        sentence.predict_lemmas(&self.lemmas, &self.registry)?;

        if !*first {
            writeln!(output)?;
        }
        *first = false;
        sentence.print(output, &self.registry)
    }

    /// Reads gold input, tags a label-stripped copy, and measures it
    /// against the gold annotation.
    fn measure<R>(&mut self, input: R) -> Result<Accuracy>
    where
        R: Read,
    {
        let mut data = Corpus::from_reader(input, true, &mut self.registry, &mut self.params)?;
        self.params.set_sub_labels(self.registry.sub_label_table());
        data.clear_label_guesses();

        let mut data_copy = data.clone();
        data_copy.unset_labels();
        data_copy.set_label_guesses(
            &self.registry,
            self.config.use_label_dictionary,
            self.config.guess_mass,
            self.config.guess_cap(true),
        );

        self.decode_corpus(&mut data_copy);
        data_copy.predict_lemmas(&self.lemmas, &self.registry)?;

        data.accuracy(&data_copy, &self.lemmas)
    }

    /// Tags gold input and reports label and lemma accuracies, split by
    /// in-vocabulary and out-of-vocabulary words, on the message sink.
    pub fn evaluate<R>(&mut self, input: R) -> Result<()>
    where
        R: Read,
    {
        writeln!(self.msg_out, "Evaluating.")?;
        let accs = self.measure(input)?;

        writeln!(
            self.msg_out,
            "  Final test label acc: {}%",
            accs.label_acc * 100.0
        )?;
        writeln!(
            self.msg_out,
            "  Final test OOV label acc: {}%",
            accs.oov_label_acc * 100.0
        )?;
        writeln!(
            self.msg_out,
            "  Final test lemma acc: {}%",
            accs.lemma_acc * 100.0
        )?;
        writeln!(
            self.msg_out,
            "  Final test OOV lemma acc: {}%",
            accs.oov_lemma_acc * 100.0
        )?;

        Ok(())
    }

    /// Label accuracy of this model on gold input, for tests and tools.
    pub fn label_accuracy<R>(&mut self, input: R) -> Result<f32>
    where
        R: Read,
    {
        Ok(self.measure(input)?.label_acc)
    }

    /// Re-arms the post-training parameter filter, so that the next
    /// [`store`](Self::store) drops filtered weights.
    pub fn set_param_filter(&mut self, config: &TaggerConfig) {
        self.params.set_filter(config);
    }

    /// Serializes the model.
    ///
    /// # Errors
    ///
    /// When bincode or the sink generate an error, it will be returned
    /// as is.
    pub fn store<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        serial::write_cstr(&mut *wtr, MODEL_MAGIC)?;
        wtr.write_all(&ENDIANNESS_MARKER.to_le_bytes())?;

        let bc = common::bincode_config();
        let (names, values) = self.config.to_fields();
        bincode::encode_into_std_write(&names, wtr, bc)?;
        bincode::encode_into_std_write(&values, wtr, bc)?;
        bincode::encode_into_std_write(&self.registry, wtr, bc)?;
        bincode::encode_into_std_write(&self.lemmas, wtr, bc)?;
        bincode::encode_into_std_write(&self.params, wtr, bc)?;

        Ok(())
    }

    /// Loads a model serialized by [`store`](Self::store).
    ///
    /// Unknown configuration fields produce a warning on stderr only, so
    /// models from newer versions stay loadable.
    ///
    /// # Errors
    ///
    /// [`MorfoError::BadBinary`] when the header does not match; bincode
    /// errors are returned as is.
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let magic = serial::read_cstr(&mut rdr)?;
        if magic != MODEL_MAGIC.as_bytes() {
            return Err(MorfoError::BadBinary("unrecognized magic string"));
        }

        let mut marker_bytes = [0u8; 4];
        rdr.read_exact(&mut marker_bytes)?;
        let marker = i32::from_le_bytes(marker_bytes);
        if marker != ENDIANNESS_MARKER {
            return Err(if marker.swap_bytes() == ENDIANNESS_MARKER {
                MorfoError::BadBinary("byte-swapped model file")
            } else {
                MorfoError::BadBinary("bad endianness marker")
            });
        }

        let bc = common::bincode_config();
        let names: Vec<String> = bincode::decode_from_std_read(&mut rdr, bc)?;
        let values: Vec<f32> = bincode::decode_from_std_read(&mut rdr, bc)?;

        let mut unknown_fields = vec![];
        let config =
            TaggerConfig::from_fields(&names, &values, |name| unknown_fields.push(name.to_string()))?;

        let registry: LabelRegistry = bincode::decode_from_std_read(&mut rdr, bc)?;
        let lemmas: LemmaGuesser = bincode::decode_from_std_read(&mut rdr, bc)?;
        let mut params: ParamStore = bincode::decode_from_std_read(&mut rdr, bc)?;
        params.set_sub_labels(registry.sub_label_table());

        let mut tagger = Self {
            config,
            registry,
            lemmas,
            params,
            msg_out: Box::new(io::stderr()),
            silent: false,
        };
        for name in unknown_fields {
            tagger.warn(&format!(
                "Found unknown parameter name {name}. Please update your morfo version."
            ))?;
        }

        Ok(tagger)
    }

    /// Structural equality over the persistent state, for round-trip
    /// checks.
    pub fn same_model(&self, other: &Tagger) -> bool {
        self.config == other.config
            && self.registry == other.registry
            && self.lemmas.same_model(&other.lemmas)
            && self.params.same_params(&other.params)
    }
}
