//! Parameter estimation.

mod perceptron;
mod sgd;

pub(crate) use perceptron::PerceptronTrainer;
pub(crate) use sgd::SgdTrainer;
