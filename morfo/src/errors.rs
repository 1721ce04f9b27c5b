//! Definition of errors.

use std::error::Error;
use std::fmt;

/// A specialized Result type for Morfo.
pub type Result<T, E = MorfoError> = std::result::Result<T, E>;

/// The error type for Morfo.
#[derive(Debug)]
pub enum MorfoError {
    /// The error variant for [`InvalidArgumentError`].
    InvalidArgument(InvalidArgumentError),

    /// The error variant for [`SyntaxError`].
    Syntax(SyntaxError),

    /// A model file whose header or field layout does not match this crate.
    BadBinary(&'static str),

    /// Two corpora that should run in parallel disagree in sentence count,
    /// sentence length, or word forms.
    IncompatibleData(String),

    /// A label id outside the registered range.
    IllegalLabel(u32),

    /// A (word-form suffix, lemma suffix) pair never seen in training.
    UnknownSuffixPair,

    /// A suffix-edit class id with no registered edit script.
    UnknownClass,

    /// Lemma prediction was requested for a word with no assigned label.
    NoLabel,

    /// A numeric option was negative where a non-negative value is required.
    NumericalRange(InvalidArgumentError),

    /// The error variant for [`DecodeError`](bincode::error::DecodeError).
    BincodeDecode(bincode::error::DecodeError),

    /// The error variant for [`EncodeError`](bincode::error::EncodeError).
    BincodeEncode(bincode::error::EncodeError),

    /// The error variant for [`std::io::Error`].
    StdIo(std::io::Error),
}

impl MorfoError {
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    pub(crate) fn syntax<S>(line: usize, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Syntax(SyntaxError {
            line,
            msg: msg.into(),
        })
    }

    pub(crate) fn numerical_range<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::NumericalRange(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }
}

impl fmt::Display for MorfoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidArgument(e) => e.fmt(f),
            Self::Syntax(e) => e.fmt(f),
            Self::BadBinary(msg) => write!(f, "BadBinary: {msg}"),
            Self::IncompatibleData(msg) => write!(f, "IncompatibleData: {msg}"),
            Self::IllegalLabel(label) => write!(f, "IllegalLabel: {label}"),
            Self::UnknownSuffixPair => write!(f, "UnknownSuffixPair"),
            Self::UnknownClass => write!(f, "UnknownClass"),
            Self::NoLabel => write!(f, "NoLabel"),
            Self::NumericalRange(e) => write!(f, "NumericalRangeError: {}: {}", e.arg, e.msg),
            Self::BincodeDecode(e) => e.fmt(f),
            Self::BincodeEncode(e) => e.fmt(f),
            Self::StdIo(e) => e.fmt(f),
        }
    }
}

impl Error for MorfoError {}

/// Error used when the argument is invalid.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// Error used when an input or configuration line is malformed.
#[derive(Debug)]
pub struct SyntaxError {
    /// 1-origin line number of the offending line.
    pub(crate) line: usize,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SyntaxError on line {}: {}", self.line, self.msg)
    }
}

impl Error for SyntaxError {}

impl From<bincode::error::DecodeError> for MorfoError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::BincodeDecode(error)
    }
}

impl From<bincode::error::EncodeError> for MorfoError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::BincodeEncode(error)
    }
}

impl From<std::io::Error> for MorfoError {
    fn from(error: std::io::Error) -> Self {
        Self::StdIo(error)
    }
}
