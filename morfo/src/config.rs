//! Training and inference configuration.
//!
//! A configuration is read from `key = value` lines (`#` starts a comment,
//! blank lines are skipped, whitespace is insignificant) and is stored
//! inside model files as two parallel vectors of field names and numeric
//! values, so that old binaries remain loadable when fields are added.

use std::io::{BufRead, BufReader, Read};

use crate::errors::{MorfoError, Result};

/// Parameter estimator run by training.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Estimator {
    /// Averaged structured perceptron.
    AvgPerc,
    /// Maximum likelihood via stochastic gradient descent on marginals.
    Ml,
}

/// Decoding rule used at inference time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Inference {
    /// Maximum a posteriori assignment (Viterbi).
    Map,
    /// Position-wise argmax of unigram marginals.
    Marginal,
}

/// Regularization applied by the SGD estimator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Regularization {
    /// No regularization.
    None,
    /// Sign-preserving subtraction capped at zero.
    L1,
    /// Multiplicative shrinking toward zero.
    L2,
}

/// N-gram arity bound used both as the model order and as the sub-label
/// expansion order.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Degree {
    /// No n-gram terms (no sub-label expansion).
    Nodeg,
    /// Unigrams only.
    Zeroth,
    /// Up to bigrams.
    First,
    /// Up to trigrams.
    Second,
}

/// Post-training parameter filter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Filtering {
    /// Keep every parameter.
    NoFilter,
    /// Keep parameters updated at least `param_threshold` times.
    UpdateCount,
    /// Keep parameters whose average magnitude per training iteration
    /// exceeds `param_threshold`.
    AvgValue,
}

impl Estimator {
    fn code(self) -> f32 {
        self as u32 as f32
    }

    fn from_code(code: f32) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::AvgPerc),
            1 => Some(Self::Ml),
            _ => None,
        }
    }
}

impl Inference {
    fn code(self) -> f32 {
        self as u32 as f32
    }

    fn from_code(code: f32) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::Map),
            1 => Some(Self::Marginal),
            _ => None,
        }
    }
}

impl Regularization {
    fn code(self) -> f32 {
        self as u32 as f32
    }

    fn from_code(code: f32) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::None),
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            _ => None,
        }
    }
}

impl Degree {
    fn code(self) -> f32 {
        self as u32 as f32
    }

    fn from_code(code: f32) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::Nodeg),
            1 => Some(Self::Zeroth),
            2 => Some(Self::First),
            3 => Some(Self::Second),
            _ => None,
        }
    }
}

impl Filtering {
    fn code(self) -> f32 {
        self as u32 as f32
    }

    fn from_code(code: f32) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::NoFilter),
            1 => Some(Self::UpdateCount),
            2 => Some(Self::AvgValue),
            _ => None,
        }
    }
}

/// Configuration of a [`Tagger`](crate::Tagger).
#[derive(Clone, Debug, PartialEq)]
pub struct TaggerConfig {
    pub(crate) estimator: Estimator,
    pub(crate) inference: Inference,
    pub(crate) suffix_length: u32,
    pub(crate) degree: u32,
    pub(crate) max_train_passes: u32,
    pub(crate) max_lemmatizer_passes: u32,
    pub(crate) max_useless_passes: u32,
    pub(crate) guess_mass: f32,
    pub(crate) beam: i32,
    pub(crate) beam_mass: f32,
    pub(crate) regularization: Regularization,
    pub(crate) delta: f32,
    pub(crate) sigma: f32,
    pub(crate) use_label_dictionary: bool,
    pub(crate) guess_count_limit: i32,
    pub(crate) use_unstructured_sublabels: bool,
    pub(crate) use_structured_sublabels: bool,
    pub(crate) sublabel_order: Degree,
    pub(crate) model_order: Degree,
    pub(crate) guesses: i32,
    pub(crate) param_threshold: f32,
    pub(crate) filter_type: Filtering,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            estimator: Estimator::AvgPerc,
            inference: Inference::Map,
            suffix_length: 10,
            degree: 2,
            max_train_passes: 50,
            max_lemmatizer_passes: 50,
            max_useless_passes: 3,
            guess_mass: 0.99,
            beam: -1,
            beam_mass: -1.0,
            regularization: Regularization::None,
            delta: -1.0,
            sigma: -1.0,
            use_label_dictionary: true,
            guess_count_limit: 50,
            use_unstructured_sublabels: true,
            use_structured_sublabels: true,
            sublabel_order: Degree::First,
            model_order: Degree::Second,
            guesses: -1,
            param_threshold: -1.0,
            filter_type: Filtering::NoFilter,
        }
    }
}

fn despace(line: &str) -> String {
    line.chars()
        .filter(|&c| c != ' ' && c != '\t' && c != '\r')
        .collect()
}

fn parse_uint(value: &str, line: usize) -> Result<u32> {
    let i: i64 = value
        .parse()
        .map_err(|_| MorfoError::syntax(line, format!("expected an integer, got `{value}`")))?;
    if i < 0 {
        return Err(MorfoError::numerical_range(
            "value",
            format!("expected a non-negative integer, got {i}"),
        ));
    }
    u32::try_from(i).map_err(|_| MorfoError::syntax(line, format!("integer out of range: {i}")))
}

fn parse_int(value: &str, line: usize) -> Result<i32> {
    value
        .parse()
        .map_err(|_| MorfoError::syntax(line, format!("expected an integer, got `{value}`")))
}

fn parse_float(value: &str, line: usize) -> Result<f32> {
    let f: f32 = value
        .parse()
        .map_err(|_| MorfoError::syntax(line, format!("expected a number, got `{value}`")))?;
    if f < 0.0 {
        return Err(MorfoError::numerical_range(
            "value",
            format!("expected a non-negative number, got {f}"),
        ));
    }
    Ok(f)
}

fn parse_bool(value: &str, line: usize) -> Result<bool> {
    Ok(parse_uint(value, line)? != 0)
}

impl TaggerConfig {
    /// Reads a configuration from `key = value` lines.
    ///
    /// # Errors
    ///
    /// [`MorfoError::Syntax`] is returned for an unknown key or an
    /// unparsable value, reporting the offending line number.
    pub fn from_reader<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut config = Self::default();

        for (i, line) in BufReader::new(rdr).lines().enumerate() {
            let line_no = i + 1;
            let line = despace(&line?);

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| MorfoError::syntax(line_no, format!("expected `key = value`, got `{line}`")))?;

            match key {
                "estimator" => {
                    config.estimator = match value {
                        "AVG_PERC" => Estimator::AvgPerc,
                        "ML" => Estimator::Ml,
                        _ => return Err(MorfoError::syntax(line_no, format!("unknown estimator `{value}`"))),
                    }
                }
                "inference" => {
                    config.inference = match value {
                        "MAP" => Inference::Map,
                        "MARGINAL" => Inference::Marginal,
                        _ => return Err(MorfoError::syntax(line_no, format!("unknown inference `{value}`"))),
                    }
                }
                "filter_type" => {
                    config.filter_type = match value {
                        "NO_FILTER" => Filtering::NoFilter,
                        "UPDATE_COUNT" => Filtering::UpdateCount,
                        "AVG_VALUE" => Filtering::AvgValue,
                        _ => return Err(MorfoError::syntax(line_no, format!("unknown filter type `{value}`"))),
                    }
                }
                "regularization" => {
                    config.regularization = match value {
                        "NONE" => Regularization::None,
                        "L1" => Regularization::L1,
                        "L2" => Regularization::L2,
                        _ => {
                            return Err(MorfoError::syntax(
                                line_no,
                                format!("unknown regularization `{value}`"),
                            ))
                        }
                    }
                }
                "sublabel_order" => config.sublabel_order = parse_degree(value, line_no)?,
                "model_order" => config.model_order = parse_degree(value, line_no)?,
                "suffix_length" => config.suffix_length = parse_uint(value, line_no)?,
                "degree" => config.degree = parse_uint(value, line_no)?,
                "max_train_passes" => config.max_train_passes = parse_uint(value, line_no)?,
                "max_lemmatizer_passes" => config.max_lemmatizer_passes = parse_uint(value, line_no)?,
                "max_useless_passes" => config.max_useless_passes = parse_uint(value, line_no)?,
                "guess_mass" => config.guess_mass = parse_float(value, line_no)?,
                "beam" => config.beam = parse_int(value, line_no)?,
                "beam_mass" => config.beam_mass = parse_float(value, line_no)?,
                "delta" => config.delta = parse_float(value, line_no)?,
                "sigma" => config.sigma = parse_float(value, line_no)?,
                "use_label_dictionary" => config.use_label_dictionary = parse_bool(value, line_no)?,
                "guess_count_limit" => config.guess_count_limit = parse_int(value, line_no)?,
                "use_unstructured_sublabels" => {
                    config.use_unstructured_sublabels = parse_bool(value, line_no)?
                }
                "use_structured_sublabels" => {
                    config.use_structured_sublabels = parse_bool(value, line_no)?
                }
                "guesses" => config.guesses = parse_int(value, line_no)?,
                "param_threshold" => config.param_threshold = parse_float(value, line_no)?,
                _ => return Err(MorfoError::syntax(line_no, format!("unknown key `{key}`"))),
            }
        }

        if !config.use_unstructured_sublabels {
            config.sublabel_order = Degree::Nodeg;
        } else if !config.use_structured_sublabels {
            config.sublabel_order = Degree::Zeroth;
        }

        Ok(config)
    }

    /// Kind of post-training parameter filtering.
    pub fn filtering(&self) -> Filtering {
        self.filter_type
    }

    pub(crate) fn beam_width(&self) -> Option<u32> {
        (self.beam >= 0).then(|| self.beam as u32)
    }

    pub(crate) fn adaptive_beam_mass(&self) -> Option<f32> {
        (self.beam_mass >= 0.0).then_some(self.beam_mass)
    }

    pub(crate) fn guess_cap(&self, use_lexicon: bool) -> i32 {
        // Training-time guessing is mass-driven; inference is count-capped.
        if use_lexicon {
            self.guess_count_limit
        } else {
            self.guesses
        }
    }

    pub(crate) fn to_fields(&self) -> (Vec<String>, Vec<f32>) {
        let names = [
            "estimator",
            "inference",
            "suffix_length",
            "degree",
            "max_train_passes",
            "max_lemmatizer_passes",
            "max_useless_passes",
            "guess_mass",
            "beam",
            "beam_mass",
            "regularization",
            "delta",
            "sigma",
            "use_label_dictionary",
            "guess_count_limit",
            "use_unstructured_sublabels",
            "use_structured_sublabels",
            "sublabel_order",
            "model_order",
            "guesses",
            "param_threshold",
            "filter_type",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let values = vec![
            self.estimator.code(),
            self.inference.code(),
            self.suffix_length as f32,
            self.degree as f32,
            self.max_train_passes as f32,
            self.max_lemmatizer_passes as f32,
            self.max_useless_passes as f32,
            self.guess_mass,
            self.beam as f32,
            self.beam_mass,
            self.regularization.code(),
            self.delta,
            self.sigma,
            self.use_label_dictionary as u32 as f32,
            self.guess_count_limit as f32,
            self.use_unstructured_sublabels as u32 as f32,
            self.use_structured_sublabels as u32 as f32,
            self.sublabel_order.code(),
            self.model_order.code(),
            self.guesses as f32,
            self.param_threshold,
            self.filter_type.code(),
        ];

        (names, values)
    }

    pub(crate) fn from_fields<F>(
        names: &[String],
        values: &[f32],
        mut warn_unknown: F,
    ) -> Result<Self>
    where
        F: FnMut(&str),
    {
        if names.len() != values.len() {
            return Err(MorfoError::BadBinary(
                "configuration field names and values disagree in count",
            ));
        }

        let bad = |name: &'static str| MorfoError::invalid_argument(name, "unknown code in model file");

        let mut config = Self::default();
        for (name, &value) in names.iter().zip(values) {
            match name.as_str() {
                "estimator" => {
                    config.estimator = Estimator::from_code(value).ok_or_else(|| bad("estimator"))?
                }
                "inference" => {
                    config.inference = Inference::from_code(value).ok_or_else(|| bad("inference"))?
                }
                "filter_type" => {
                    config.filter_type = Filtering::from_code(value).ok_or_else(|| bad("filter_type"))?
                }
                "regularization" => {
                    config.regularization =
                        Regularization::from_code(value).ok_or_else(|| bad("regularization"))?
                }
                "sublabel_order" => {
                    config.sublabel_order = Degree::from_code(value).ok_or_else(|| bad("sublabel_order"))?
                }
                "model_order" => {
                    config.model_order = Degree::from_code(value).ok_or_else(|| bad("model_order"))?
                }
                "suffix_length" => config.suffix_length = value as u32,
                "degree" => config.degree = value as u32,
                "max_train_passes" => config.max_train_passes = value as u32,
                "max_lemmatizer_passes" => config.max_lemmatizer_passes = value as u32,
                "max_useless_passes" => config.max_useless_passes = value as u32,
                "guess_mass" => config.guess_mass = value,
                "beam" => config.beam = value as i32,
                "beam_mass" => config.beam_mass = value,
                "delta" => config.delta = value,
                "sigma" => config.sigma = value,
                "use_label_dictionary" => config.use_label_dictionary = value != 0.0,
                "guess_count_limit" => config.guess_count_limit = value as i32,
                "use_unstructured_sublabels" => config.use_unstructured_sublabels = value != 0.0,
                "use_structured_sublabels" => config.use_structured_sublabels = value != 0.0,
                "guesses" => config.guesses = value as i32,
                "param_threshold" => config.param_threshold = value,
                _ => warn_unknown(name),
            }
        }

        Ok(config)
    }
}

fn parse_degree(value: &str, line: usize) -> Result<Degree> {
    match value {
        "NODEG" => Ok(Degree::Nodeg),
        "ZEROTH" => Ok(Degree::Zeroth),
        "FIRST" => Ok(Degree::First),
        "SECOND" => Ok(Degree::Second),
        _ => Err(MorfoError::syntax(line, format!("unknown degree `{value}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaggerConfig::from_reader("".as_bytes()).unwrap();
        assert_eq!(config, TaggerConfig::default());
        assert_eq!(config.estimator, Estimator::AvgPerc);
        assert_eq!(config.inference, Inference::Map);
        assert_eq!(config.suffix_length, 10);
        assert_eq!(config.max_train_passes, 50);
        assert_eq!(config.max_useless_passes, 3);
        assert_eq!(config.sublabel_order, Degree::First);
        assert_eq!(config.model_order, Degree::Second);
        assert_eq!(config.beam, -1);
        assert_eq!(config.filter_type, Filtering::NoFilter);
    }

    #[test]
    fn test_full_parse() {
        let contents = "\
# comment
sigma = 1
delta = 2
regularization=L1
beam=3
guess_mass=0.9999

max_useless_passes =5
max_train_passes =6
max_lemmatizer_passes =6
degree =7
suffix_length =8
inference =MARGINAL
estimator=ML
beam_mass=6
use_label_dictionary=0
guess_count_limit=200
sublabel_order=ZEROTH
model_order=FIRST
guesses=10
param_threshold=11
filter_type=UPDATE_COUNT
";
        let config = TaggerConfig::from_reader(contents.as_bytes()).unwrap();
        assert_eq!(config.estimator, Estimator::Ml);
        assert_eq!(config.inference, Inference::Marginal);
        assert_eq!(config.suffix_length, 8);
        assert_eq!(config.degree, 7);
        assert_eq!(config.max_train_passes, 6);
        assert_eq!(config.max_useless_passes, 5);
        assert_eq!(config.beam, 3);
        assert_eq!(config.regularization, Regularization::L1);
        assert!((config.delta - 2.0).abs() < 1e-6);
        assert!((config.sigma - 1.0).abs() < 1e-6);
        assert!((config.beam_mass - 6.0).abs() < 1e-6);
        assert!(!config.use_label_dictionary);
        assert_eq!(config.guess_count_limit, 200);
        assert_eq!(config.sublabel_order, Degree::Zeroth);
        assert_eq!(config.model_order, Degree::First);
        assert_eq!(config.guesses, 10);
        assert!((config.param_threshold - 11.0).abs() < 1e-6);
        assert_eq!(config.filter_type, Filtering::UpdateCount);
    }

    #[test]
    fn test_no_filter_maps_to_no_filter() {
        let config = TaggerConfig::from_reader("filter_type = NO_FILTER".as_bytes()).unwrap();
        assert_eq!(config.filter_type, Filtering::NoFilter);
    }

    #[test]
    fn test_unknown_key_reports_line() {
        let contents = "\
sigma = 1
delta = 2
max_useless_passeSSS = 5
";
        match TaggerConfig::from_reader(contents.as_bytes()) {
            Err(MorfoError::Syntax(e)) => assert_eq!(e.line, 3),
            r => panic!("expected a syntax error, got {r:?}"),
        }
    }

    #[test]
    fn test_negative_float_rejected() {
        let result = TaggerConfig::from_reader("guess_mass = -0.5".as_bytes());
        assert!(matches!(result, Err(MorfoError::NumericalRange(_))));
    }

    #[test]
    fn test_sublabel_overrides() {
        let config =
            TaggerConfig::from_reader("use_unstructured_sublabels = 0".as_bytes()).unwrap();
        assert_eq!(config.sublabel_order, Degree::Nodeg);

        let config = TaggerConfig::from_reader("use_structured_sublabels = 0".as_bytes()).unwrap();
        assert_eq!(config.sublabel_order, Degree::Zeroth);
    }

    #[test]
    fn test_field_roundtrip() {
        let contents = "\
estimator=ML
beam=3
guesses=10
param_threshold=0.25
filter_type=AVG_VALUE
";
        let config = TaggerConfig::from_reader(contents.as_bytes()).unwrap();
        let (names, values) = config.to_fields();
        let restored = TaggerConfig::from_fields(&names, &values, |_| panic!("unknown field")).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_unknown_field_warns_on_load() {
        let (mut names, mut values) = TaggerConfig::default().to_fields();
        names.push("brand_new_knob".to_string());
        values.push(1.0);
        let mut warned = vec![];
        let config = TaggerConfig::from_fields(&names, &values, |n| warned.push(n.to_string())).unwrap();
        assert_eq!(config, TaggerConfig::default());
        assert_eq!(warned, ["brand_new_knob"]);
    }
}
