//! Stochastic gradient descent against trellis marginals.

use std::io::Write;

use hashbrown::HashSet;

use crate::config::{Degree, Regularization, TaggerConfig};
use crate::corpus::Corpus;
use crate::errors::Result;
use crate::lemmas::LemmaGuesser;
use crate::params::ParamStore;
use crate::sentence::Sentence;
use crate::trellis::Trellis;

const DEFAULT_DELTA: f32 = 0.01;

/// Maximum-likelihood estimation: each position gains its gold features
/// and loses the posterior expectation of every candidate feature, with
/// optional L1/L2 shrinking of the touched weights.
pub(crate) struct SgdTrainer {
    max_passes: u32,
    max_useless_passes: u32,
    sublabel_order: Degree,
    model_order: Degree,
    beam_width: Option<u32>,
    beam_mass: Option<f32>,
    boundary_label: u32,
    delta: f32,
    sigma: f32,
    regularization: Regularization,
    iter: u32,
}

impl SgdTrainer {
    pub fn new(config: &TaggerConfig, boundary_label: u32) -> Self {
        Self {
            max_passes: config.max_train_passes,
            max_useless_passes: config.max_useless_passes,
            sublabel_order: config.sublabel_order,
            model_order: config.model_order,
            beam_width: config.beam_width(),
            beam_mass: config.adaptive_beam_mass(),
            boundary_label,
            delta: if config.delta >= 0.0 {
                config.delta
            } else {
                DEFAULT_DELTA
            },
            sigma: config.sigma.max(0.0),
            regularization: config.regularization,
            iter: 0,
        }
    }

    fn decode(&self, sentence: &Sentence, params: &ParamStore) -> Vec<u32> {
        let mut trellis = Trellis::new(
            sentence,
            self.boundary_label,
            self.sublabel_order,
            self.model_order,
        );
        if let Some(width) = self.beam_width {
            trellis.set_beam(width);
        }
        if let Some(mass) = self.beam_mass {
            trellis.set_beam_mass(mass);
        }
        trellis.map_assignment(params)
    }

    /// One gradient step on a sentence against its current marginals.
    fn update(&mut self, sentence: &Sentence, trellis: &Trellis, pos: &mut ParamStore) {
        self.iter += 1;
        let delta = self.delta;
        let regularize = self.regularization != Regularization::None && self.sigma > 0.0;

        let mut touched_emissions = HashSet::new();
        let mut touched_transitions = HashSet::new();

        for i in 0..sentence.len() {
            let word = sentence.at(i);
            let gold = word.label();
            let pgold = if i < 1 {
                self.boundary_label
            } else {
                sentence.at(i - 1).label()
            };
            let ppgold = if i < 2 {
                self.boundary_label
            } else {
                sentence.at(i - 2).label()
            };

            touched_emissions.clear();
            touched_transitions.clear();

            pos.update_emission_all(word, gold, delta, self.sublabel_order);
            pos.update_transition(
                ppgold,
                pgold,
                gold,
                delta,
                self.sublabel_order,
                self.model_order,
            );
            if regularize {
                pos.emission_ids(word, gold, self.sublabel_order, &mut touched_emissions);
                pos.transition_ids(
                    ppgold,
                    pgold,
                    gold,
                    self.sublabel_order,
                    self.model_order,
                    &mut touched_transitions,
                );
            }

            for l in 0..trellis.label_count(i) {
                let label = trellis.label_at(i, l);
                let p_uni = trellis.unigram_marginal(i, l);

                pos.update_emission_all(word, label, -delta * p_uni, self.sublabel_order);
                pos.update_uni(label, -delta * p_uni, self.sublabel_order);
                if regularize {
                    pos.emission_ids(word, label, self.sublabel_order, &mut touched_emissions);
                    pos.uni_ids(label, self.sublabel_order, &mut touched_transitions);
                }

                if self.model_order <= Degree::Zeroth {
                    continue;
                }

                for pl in 0..trellis.plabel_count(i) {
                    let plabel = trellis.plabel_at(i, pl);
                    let p_bi = trellis.bigram_marginal(i, pl, l);

                    pos.update_bi(plabel, label, -delta * p_bi, self.sublabel_order);
                    if regularize {
                        pos.bi_ids(plabel, label, self.sublabel_order, &mut touched_transitions);
                    }

                    if self.model_order <= Degree::First {
                        continue;
                    }

                    for ppl in 0..trellis.pplabel_count(i) {
                        let pplabel = trellis.pplabel_at(i, ppl);
                        let p_tri = trellis.trigram_marginal(i, ppl, pl, l);

                        pos.update_tri(pplabel, plabel, label, -delta * p_tri, self.sublabel_order);
                        if regularize {
                            pos.tri_ids(
                                pplabel,
                                plabel,
                                label,
                                self.sublabel_order,
                                &mut touched_transitions,
                            );
                        }
                    }
                }
            }

            if regularize {
                pos.regularize_emissions(&touched_emissions, self.sigma, self.regularization);
                pos.regularize_transitions(&touched_transitions, self.sigma, self.regularization);
            }
        }
    }

    /// Fits `params` on `train`, selecting the snapshot with the best
    /// labeling accuracy on `dev`.
    pub fn train<W: Write>(
        &mut self,
        train: &Corpus,
        dev: &Corpus,
        lemmas: &LemmaGuesser,
        params: &mut ParamStore,
        msg_out: &mut W,
    ) -> Result<()> {
        let mut dev_sys = dev.clone();
        dev_sys.unset_labels();

        let mut pos = params.clone();

        let mut best_acc = -1.0f32;
        let mut best: Option<ParamStore> = None;
        let mut useless_passes = 0;

        for pass in 0..self.max_passes {
            if useless_passes >= self.max_useless_passes {
                break;
            }

            writeln!(msg_out, "  Train pass {}", pass + 1)?;

            for j in 0..train.len() {
                let sentence = train.at(j);
                let mut trellis = Trellis::new(
                    sentence,
                    self.boundary_label,
                    self.sublabel_order,
                    self.model_order,
                );
                if let Some(width) = self.beam_width {
                    trellis.set_beam(width);
                }
                if let Some(mass) = self.beam_mass {
                    trellis.set_beam_mass(mass);
                }
                trellis.set_marginals(&pos);
                self.update(sentence, &trellis, &mut pos);
            }

            for j in 0..dev_sys.len() {
                let labels = self.decode(dev_sys.at(j), &pos);
                dev_sys.at_mut(j).set_labels(&labels);
            }

            let acc = dev.accuracy(&dev_sys, lemmas)?.label_acc;
            writeln!(msg_out, "    Dev acc: {}%", acc * 100.0)?;

            if acc > best_acc {
                useless_passes = 0;
                best_acc = acc;
                best = Some(pos.clone());
            } else {
                useless_passes += 1;
            }
        }

        writeln!(msg_out, "  Final dev acc: {}%", best_acc * 100.0)?;

        if let Some(best) = best {
            *params = best;
        }
        params.set_train_iters(self.iter);
        params.set_trained();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::sentence::Word;

    fn sgd_config(delta: f32, regularization: Regularization, sigma: f32) -> TaggerConfig {
        let mut config = TaggerConfig::default();
        config.delta = delta;
        config.regularization = regularization;
        config.sigma = sigma;
        config
    }

    fn one_word_sentence() -> Sentence {
        let mut word = Word::new("dog".to_string(), vec![0], vec![1, 2], String::new());
        word.set_label(1);
        Sentence::from_words(vec![word], 0)
    }

    #[test]
    fn test_gradient_moves_toward_gold() {
        let sentence = one_word_sentence();
        let mut pos = ParamStore::new();
        let mut trainer = SgdTrainer::new(&sgd_config(1.0, Regularization::None, -1.0), 0);

        let mut trellis = Trellis::new(&sentence, 0, Degree::Nodeg, Degree::Second);
        trellis.set_marginals(&pos);
        trainer.update(&sentence, &trellis, &mut pos);

        // With uniform marginals over two candidates, the gold label
        // gains delta/2 and the competitor loses delta/2 per feature.
        assert!((pos.get_emission(0, 1) - 0.5).abs() < 1e-4);
        assert!((pos.get_emission(0, 2) + 0.5).abs() < 1e-4);

        // Boundary positions have a single candidate with posterior one,
        // so their gold and expectation terms cancel exactly.
        assert!(pos.get_uni(0, Degree::Nodeg).abs() < 1e-4);
    }

    #[test]
    fn test_l2_shrinks_touched_weights_once() {
        let sentence = one_word_sentence();

        let mut plain = ParamStore::new();
        let mut trainer = SgdTrainer::new(&sgd_config(1.0, Regularization::None, -1.0), 0);
        let mut trellis = Trellis::new(&sentence, 0, Degree::Nodeg, Degree::Second);
        trellis.set_marginals(&plain);
        trainer.update(&sentence, &trellis, &mut plain);

        let mut shrunk = ParamStore::new();
        let mut trainer = SgdTrainer::new(&sgd_config(1.0, Regularization::L2, 0.5), 0);
        let mut trellis = Trellis::new(&sentence, 0, Degree::Nodeg, Degree::Second);
        trellis.set_marginals(&shrunk);
        trainer.update(&sentence, &trellis, &mut shrunk);

        // The regularized run ends at exactly (1 - sigma) of the plain
        // run; a weight shrunk more than once would fall below that.
        assert!((shrunk.get_emission(0, 1) - 0.5 * plain.get_emission(0, 1)).abs() < 1e-4);
        assert!((shrunk.get_emission(0, 2) - 0.5 * plain.get_emission(0, 2)).abs() < 1e-4);
    }

    #[test]
    fn test_delta_defaults_when_unset() {
        let trainer = SgdTrainer::new(&sgd_config(-1.0, Regularization::None, -1.0), 0);
        assert!((trainer.delta - DEFAULT_DELTA).abs() < 1e-6);

        let trainer = SgdTrainer::new(&sgd_config(0.25, Regularization::None, -1.0), 0);
        assert!((trainer.delta - 0.25).abs() < 1e-6);
    }
}
