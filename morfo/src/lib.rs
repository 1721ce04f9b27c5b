//! Morfo is a data-driven morphological tagger and lemmatizer.
//!
//! A model is estimated from a labeled corpus with an averaged structured
//! perceptron (or stochastic gradient descent against trellis marginals),
//! serialized into a self-describing binary file, and later used to assign
//! a morphological label and a lemma to every token of unlabeled input.
#![deny(missing_docs)]

pub mod common;
pub mod config;
pub mod errors;
pub mod tagger;

mod annotations;
mod case;
mod corpus;
mod labels;
mod lemmas;
mod params;
mod sentence;
mod serial;
mod trainer;
mod trellis;


pub use config::TaggerConfig;
pub use tagger::Tagger;
