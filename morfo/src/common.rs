//! Common settings in Morfo.
use bincode::config::{self, Fixint, LittleEndian};

/// Word form of the sentence boundary sentinel.
///
/// Sentences are padded with two boundary words at each end so that
/// trigram context is always defined.
pub const BOUNDARY_WORD_FORM: &str = "_#_";

/// Number of boundary words padded at each end of a sentence.
pub const BOUNDARY_PADDING: usize = 2;

/// Gets the common bincode configuration of serialization.
///
/// All numeric fields are fixed-width and little-endian on disk.
pub const fn bincode_config() -> config::Configuration<LittleEndian, Fixint> {
    config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}
