//! Averaged structured perceptron.

use std::io::Write;

use crate::config::{Degree, TaggerConfig};
use crate::corpus::Corpus;
use crate::errors::Result;
use crate::lemmas::LemmaGuesser;
use crate::params::ParamStore;
use crate::sentence::{Sentence, Word};
use crate::trellis::Trellis;

/// Averaged structured perceptron with maximum a posteriori inference.
///
/// Two parameter stores run in lockstep: `pos` carries the running
/// weights, `neg` accumulates the laziness counters, and the averaged
/// view `(t + 1) · pos + neg` is materialized after every epoch. The
/// best snapshot by development accuracy wins.
pub(crate) struct PerceptronTrainer {
    max_passes: u32,
    max_useless_passes: u32,
    sublabel_order: Degree,
    model_order: Degree,
    beam_width: Option<u32>,
    beam_mass: Option<f32>,
    boundary_label: u32,
    iter: u32,
}

impl PerceptronTrainer {
    pub fn new(config: &TaggerConfig, boundary_label: u32) -> Self {
        Self {
            max_passes: config.max_train_passes,
            max_useless_passes: config.max_useless_passes,
            sublabel_order: config.sublabel_order,
            model_order: config.model_order,
            beam_width: config.beam_width(),
            beam_mass: config.adaptive_beam_mass(),
            boundary_label,
            iter: 0,
        }
    }

    /// A trainer for the lemmatizer subroutine: emission features only,
    /// no trellis.
    pub fn lemmatizer(max_passes: u32, max_useless_passes: u32) -> Self {
        Self {
            max_passes,
            max_useless_passes,
            sublabel_order: Degree::Nodeg,
            model_order: Degree::Nodeg,
            beam_width: None,
            beam_mass: None,
            boundary_label: 0,
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

    /// One structured perceptron update against a decoded sentence.
    ///
    /// Gold features gain `+1` (`-t` on the laziness side), predicted
    /// features lose `1` (`+t`), over the emission templates of every
    /// position and the label trigram ending there.
    fn update(
        &mut self,
        gold_s: &Sentence,
        sys_s: &Sentence,
        pos: &mut ParamStore,
        neg: &mut ParamStore,
    ) {
        self.iter += 1;
        let t = self.iter as f32;

        for i in 0..sys_s.len() {
            let gold = gold_s.at(i).label();
            let sys = sys_s.at(i).label();

            let pgold = if i < 1 {
                self.boundary_label
            } else {
                gold_s.at(i - 1).label()
            };
            let psys = if i < 1 {
                self.boundary_label
            } else {
                sys_s.at(i - 1).label()
            };

            let ppgold = if i < 2 {
                self.boundary_label
            } else {
                gold_s.at(i - 2).label()
            };
            let ppsys = if i < 2 {
                self.boundary_label
            } else {
                sys_s.at(i - 2).label()
            };

            pos.update_emission_all(gold_s.at(i), gold, 1.0, self.sublabel_order);
            neg.update_emission_all(gold_s.at(i), gold, -t, self.sublabel_order);

            pos.update_emission_all(sys_s.at(i), sys, -1.0, self.sublabel_order);
            neg.update_emission_all(sys_s.at(i), sys, t, self.sublabel_order);

            pos.update_transition(ppgold, pgold, gold, 1.0, self.sublabel_order, self.model_order);
            neg.update_transition(ppgold, pgold, gold, -t, self.sublabel_order, self.model_order);

            pos.update_transition(ppsys, psys, sys, -1.0, self.sublabel_order, self.model_order);
            neg.update_transition(ppsys, psys, sys, t, self.sublabel_order, self.model_order);
        }
    }

    /// Fits `params` on `train`, selecting the averaged snapshot with the
    /// best labeling accuracy on `dev`.
    pub fn train<W: Write>(
        &mut self,
        train: &Corpus,
        dev: &Corpus,
        lemmas: &LemmaGuesser,
        params: &mut ParamStore,
        msg_out: &mut W,
    ) -> Result<()> {
        let mut train_sys = train.clone();
        let mut dev_sys = dev.clone();
        dev_sys.unset_labels();

        let mut pos = params.clone();
        let mut neg = params.clone();

        let mut best_acc = -1.0f32;
        let mut best: Option<ParamStore> = None;
        let mut useless_passes = 0;

        for pass in 0..self.max_passes {
            if useless_passes >= self.max_useless_passes {
                break;
            }

            writeln!(msg_out, "  Train pass {}", pass + 1)?;

            for j in 0..train_sys.len() {
                let labels = self.decode(train_sys.at(j), &pos);
                train_sys.at_mut(j).set_labels(&labels);
                self.update(train.at(j), train_sys.at(j), &mut pos, &mut neg);
            }

            params.set_averaged(&pos, &neg, self.iter);

            for j in 0..dev_sys.len() {
                let labels = self.decode(dev_sys.at(j), params);
                dev_sys.at_mut(j).set_labels(&labels);
            }

            let acc = dev.accuracy(&dev_sys, lemmas)?.label_acc;
            writeln!(msg_out, "    Dev acc: {}%", acc * 100.0)?;

            if acc > best_acc {
                useless_passes = 0;
                best_acc = acc;
                best = Some(params.clone());
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

    /// The same averaging machinery over a bag of lemmatizer instances:
    /// emission features only, choosing among suffix-edit classes.
    ///
    /// Each instance's label is its gold class id.
    pub fn train_lemmatizer<W: Write>(
        &mut self,
        train_instances: &[Word],
        dev_instances: &[Word],
        lemmas: &LemmaGuesser,
        params: &mut ParamStore,
        msg_out: &mut W,
    ) -> Result<()> {
        let mut pos = params.clone();
        let mut neg = params.clone();

        let mut best_acc = -1.0f32;
        let mut best: Option<ParamStore> = None;
        let mut useless_passes = 0;

        for pass in 0..self.max_passes {
            if useless_passes >= self.max_useless_passes {
                break;
            }

            writeln!(msg_out, "  Train pass {}:", pass + 1)?;

            for word in train_instances {
                let gold_class = word.label();
                let sys_class = lemmas.best_class(word, &pos).unwrap_or(0);

                self.iter += 1;
                let t = self.iter as f32;

                pos.update_emission_all(word, gold_class, 1.0, Degree::Nodeg);
                neg.update_emission_all(word, gold_class, -t, Degree::Nodeg);

                pos.update_emission_all(word, sys_class, -1.0, Degree::Nodeg);
                neg.update_emission_all(word, sys_class, t, Degree::Nodeg);
            }

            params.set_averaged(&pos, &neg, self.iter);

            let mut correct = 0.0f32;
            let mut total = 0.0f32;
            for word in dev_instances {
                let sys_class = lemmas.best_class(word, params).unwrap_or(0);
                correct += (sys_class == word.label()) as u32 as f32;
                total += 1.0;
            }
            let acc = if total == 0.0 { 0.0 } else { correct / total };

            writeln!(msg_out, "    Dev acc: {}%", acc * 100.0)?;

            if acc > best_acc {
                useless_passes = 0;
                best_acc = acc;
                best = Some(params.clone());
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
