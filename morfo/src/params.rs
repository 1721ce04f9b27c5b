//! Sparse parameter store shared by the tagger and the lemma guesser.
//!
//! A single 64-bit id space is overloaded across the emission family and
//! the three transition families. The encoding is fixed for binary
//! compatibility; [`FeatureId`] is the typed view and is converted to the
//! integer form only at the storage boundary.

use bincode::{
    de::{BorrowDecoder, Decoder},
    enc::Encoder,
    error::{DecodeError, EncodeError},
    BorrowDecode, Decode, Encode,
};
use hashbrown::{HashMap, HashSet};

use crate::config::{Degree, Filtering, Regularization, TaggerConfig};
use crate::sentence::Word;
use crate::serial::OrderedMap;

/// Maximum number of distinct labels a model may intern.
pub(crate) const MAX_LABEL: u64 = 50_000;

const LABEL_BASE: u64 = MAX_LABEL + 1;
const BIGRAM_OFFSET: u64 = LABEL_BASE * LABEL_BASE * LABEL_BASE;
const UNIGRAM_OFFSET: u64 = BIGRAM_OFFSET + LABEL_BASE * LABEL_BASE;

/// Typed view of a parameter id.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FeatureId {
    /// Emission weight of (feature template, label).
    Emission { template: u32, label: u32 },
    /// Transition unigram weight of a label.
    Unigram { label: u32 },
    /// Transition bigram weight of (previous label, label).
    Bigram { plabel: u32, label: u32 },
    /// Transition trigram weight of (previous-previous, previous, label).
    Trigram { pplabel: u32, plabel: u32, label: u32 },
}

impl FeatureId {
    pub fn encode(self) -> u64 {
        match self {
            Self::Emission { template, label } => LABEL_BASE * u64::from(template) + u64::from(label),
            Self::Unigram { label } => UNIGRAM_OFFSET + u64::from(label),
            Self::Bigram { plabel, label } => {
                BIGRAM_OFFSET + LABEL_BASE * u64::from(plabel) + u64::from(label)
            }
            Self::Trigram {
                pplabel,
                plabel,
                label,
            } => {
                LABEL_BASE * LABEL_BASE * u64::from(pplabel)
                    + LABEL_BASE * u64::from(plabel)
                    + u64::from(label)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ParamFilter {
    kind: Filtering,
    threshold: f32,
}

impl Default for ParamFilter {
    fn default() -> Self {
        Self {
            kind: Filtering::NoFilter,
            threshold: 0.0,
        }
    }
}

/// Sparse weights for emission and 1/2/3-gram transition features.
///
/// Reads and writes fan out over the sub-labels of compound labels
/// according to the requested sub-label order; the sub-label table is
/// wired in from the label registry and is not serialized.
#[derive(Clone, Debug, Default)]
pub(crate) struct ParamStore {
    trained: bool,
    train_iters: u32,
    filter: ParamFilter,
    feature_templates: OrderedMap<String, u32>,
    emission: OrderedMap<u64, f32>,
    transition: OrderedMap<u64, f32>,
    update_counts: HashMap<u64, u32>,
    sub_labels: Vec<Vec<u32>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables post-training filtering as configured.
    pub fn set_filter(&mut self, config: &TaggerConfig) {
        if matches!(config.filter_type, Filtering::UpdateCount | Filtering::AvgValue) {
            self.filter = ParamFilter {
                kind: config.filter_type,
                threshold: config.param_threshold,
            };
        }
    }

    /// Marks the store as frozen: filters stop masking reads and updates
    /// are no longer expected.
    pub fn set_trained(&mut self) {
        self.trained = true;
    }

    pub fn set_train_iters(&mut self, iters: u32) {
        self.train_iters = iters;
    }

    /// Installs the compound-label decomposition table.
    ///
    /// Must be re-wired whenever the registry grows or the store is
    /// loaded from a model file.
    pub fn set_sub_labels(&mut self, table: Vec<Vec<u32>>) {
        self.sub_labels = table;
    }

    fn sub_labels_of(&self, label: u32) -> &[u32] {
        self.sub_labels
            .get(label as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// Interns a feature template string.
    pub fn intern_template(&mut self, template: &str) -> u32 {
        if let Some(&id) = self.feature_templates.get(template) {
            return id;
        }
        let id = self.feature_templates.len() as u32;
        self.feature_templates.insert(template.to_string(), id);
        id
    }

    /// Interns a list of feature template strings.
    ///
    /// Once the store is trained, templates unseen in training are
    /// silently dropped instead of interned.
    pub fn intern_templates(&mut self, templates: &[String]) -> Vec<u32> {
        let mut ids = vec![];
        for template in templates {
            if self.trained && !self.feature_templates.contains_key(template) {
                continue;
            }
            ids.push(self.intern_template(template));
        }
        ids
    }

    fn filtered(&self, id: u64, weight: f32) -> f32 {
        if self.trained {
            return weight;
        }
        match self.filter.kind {
            Filtering::NoFilter => weight,
            Filtering::UpdateCount => {
                let count = self.update_counts.get(&id).copied().unwrap_or(0);
                if (count as f32) < self.filter.threshold {
                    0.0
                } else {
                    weight
                }
            }
            Filtering::AvgValue => {
                if self.train_iters == 0 {
                    return weight;
                }
                if (weight / self.train_iters as f32).abs() > self.filter.threshold {
                    weight
                } else {
                    0.0
                }
            }
        }
    }

    fn keeps(&self, id: u64, weight: f32) -> bool {
        match self.filter.kind {
            Filtering::NoFilter => true,
            Filtering::UpdateCount => {
                self.update_counts.get(&id).copied().unwrap_or(0) as f32 >= self.filter.threshold
            }
            Filtering::AvgValue => {
                self.train_iters != 0
                    && (weight / self.train_iters as f32).abs() > self.filter.threshold
            }
        }
    }

    fn read(table: &OrderedMap<u64, f32>, id: u64) -> Option<f32> {
        table.get(&id).copied()
    }

    fn bump(
        table: &mut OrderedMap<u64, f32>,
        counts: &mut HashMap<u64, u32>,
        count_updates: bool,
        id: u64,
        delta: f32,
    ) {
        *table.entry(id).or_insert(0.0) += delta;
        if count_updates {
            *counts.entry(id).or_insert(0) += 1;
        }
    }

    fn shrink(table: &mut OrderedMap<u64, f32>, id: u64, sigma: f32, reg: Regularization) {
        if let Some(w) = table.get_mut(&id) {
            match reg {
                Regularization::None => {}
                Regularization::L1 => {
                    *w = w.signum() * (w.abs() - sigma).max(0.0);
                }
                Regularization::L2 => {
                    *w *= 1.0 - sigma;
                }
            }
        }
    }

    pub fn get_emission(&self, template: u32, label: u32) -> f32 {
        let id = FeatureId::Emission { template, label }.encode();
        Self::read(&self.emission, id).map_or(0.0, |w| self.filtered(id, w))
    }

    pub fn get_uni(&self, label: u32, sublabel_order: Degree) -> f32 {
        let id = FeatureId::Unigram { label }.encode();
        let mut res = Self::read(&self.transition, id).map_or(0.0, |w| self.filtered(id, w));

        if sublabel_order > Degree::Nodeg {
            for &sub in self.sub_labels_of(label) {
                let id = FeatureId::Unigram { label: sub }.encode();
                if let Some(w) = Self::read(&self.transition, id) {
                    res += self.filtered(id, w);
                }
            }
        }

        res
    }

    pub fn get_bi(&self, plabel: u32, label: u32, sublabel_order: Degree) -> f32 {
        let id = FeatureId::Bigram { plabel, label }.encode();
        let mut res = Self::read(&self.transition, id).map_or(0.0, |w| self.filtered(id, w));

        if sublabel_order > Degree::Zeroth {
            for &psub in self.sub_labels_of(plabel) {
                for &sub in self.sub_labels_of(label) {
                    let id = FeatureId::Bigram {
                        plabel: psub,
                        label: sub,
                    }
                    .encode();
                    if let Some(w) = Self::read(&self.transition, id) {
                        res += self.filtered(id, w);
                    }
                }
            }
        }

        res
    }

    pub fn get_tri(&self, pplabel: u32, plabel: u32, label: u32, sublabel_order: Degree) -> f32 {
        let id = FeatureId::Trigram {
            pplabel,
            plabel,
            label,
        }
        .encode();
        let mut res = Self::read(&self.transition, id).map_or(0.0, |w| self.filtered(id, w));

        if sublabel_order > Degree::First {
            for &ppsub in self.sub_labels_of(pplabel) {
                for &psub in self.sub_labels_of(plabel) {
                    for &sub in self.sub_labels_of(label) {
                        let id = FeatureId::Trigram {
                            pplabel: ppsub,
                            plabel: psub,
                            label: sub,
                        }
                        .encode();
                        if let Some(w) = Self::read(&self.transition, id) {
                            res += self.filtered(id, w);
                        }
                    }
                }
            }
        }

        res
    }

    /// Sum of the emission weights of all feature templates of `word`.
    pub fn emission_score(&self, word: &Word, label: u32, sublabel_order: Degree) -> f32 {
        let mut res = 0.0;

        for &template in word.feature_templates() {
            res += self.get_emission(template, label);
        }

        if sublabel_order > Degree::Nodeg {
            for &template in word.feature_templates() {
                for &sub in self.sub_labels_of(label) {
                    res += self.get_emission(template, sub);
                }
            }
        }

        res
    }

    /// Transition score of the trigram `(pplabel, plabel, label)`, summing
    /// unigram, bigram and trigram terms up to `model_order`.
    ///
    /// The model is symmetric, so the same score serves forward and
    /// backward passes.
    pub fn transition_score(
        &self,
        pplabel: u32,
        plabel: u32,
        label: u32,
        sublabel_order: Degree,
        model_order: Degree,
    ) -> f32 {
        let mut res = self.get_uni(label, sublabel_order);
        if model_order > Degree::Zeroth {
            res += self.get_bi(plabel, label, sublabel_order);
        }
        if model_order > Degree::First {
            res += self.get_tri(pplabel, plabel, label, sublabel_order);
        }
        res
    }

    pub fn update_emission(&mut self, template: u32, label: u32, delta: f32) {
        let id = FeatureId::Emission { template, label }.encode();
        Self::bump(
            &mut self.emission,
            &mut self.update_counts,
            self.filter.kind == Filtering::UpdateCount,
            id,
            delta,
        );
    }

    pub fn update_uni(&mut self, label: u32, delta: f32, sublabel_order: Degree) {
        let count_updates = self.filter.kind == Filtering::UpdateCount;
        let id = FeatureId::Unigram { label }.encode();
        Self::bump(&mut self.transition, &mut self.update_counts, count_updates, id, delta);

        if sublabel_order > Degree::Nodeg {
            for i in 0..self.sub_labels_of(label).len() {
                let sub = self.sub_labels_of(label)[i];
                let id = FeatureId::Unigram { label: sub }.encode();
                Self::bump(&mut self.transition, &mut self.update_counts, count_updates, id, delta);
            }
        }
    }

    pub fn update_bi(&mut self, plabel: u32, label: u32, delta: f32, sublabel_order: Degree) {
        let count_updates = self.filter.kind == Filtering::UpdateCount;
        let id = FeatureId::Bigram { plabel, label }.encode();
        Self::bump(&mut self.transition, &mut self.update_counts, count_updates, id, delta);

        if sublabel_order > Degree::Zeroth {
            for i in 0..self.sub_labels_of(plabel).len() {
                for j in 0..self.sub_labels_of(label).len() {
                    let psub = self.sub_labels_of(plabel)[i];
                    let sub = self.sub_labels_of(label)[j];
                    let id = FeatureId::Bigram {
                        plabel: psub,
                        label: sub,
                    }
                    .encode();
                    Self::bump(&mut self.transition, &mut self.update_counts, count_updates, id, delta);
                }
            }
        }
    }

    pub fn update_tri(
        &mut self,
        pplabel: u32,
        plabel: u32,
        label: u32,
        delta: f32,
        sublabel_order: Degree,
    ) {
        let count_updates = self.filter.kind == Filtering::UpdateCount;
        let id = FeatureId::Trigram {
            pplabel,
            plabel,
            label,
        }
        .encode();
        Self::bump(&mut self.transition, &mut self.update_counts, count_updates, id, delta);

        if sublabel_order > Degree::First {
            for i in 0..self.sub_labels_of(pplabel).len() {
                for j in 0..self.sub_labels_of(plabel).len() {
                    for k in 0..self.sub_labels_of(label).len() {
                        let ppsub = self.sub_labels_of(pplabel)[i];
                        let psub = self.sub_labels_of(plabel)[j];
                        let sub = self.sub_labels_of(label)[k];
                        let id = FeatureId::Trigram {
                            pplabel: ppsub,
                            plabel: psub,
                            label: sub,
                        }
                        .encode();
                        Self::bump(&mut self.transition, &mut self.update_counts, count_updates, id, delta);
                    }
                }
            }
        }
    }

    /// Applies `delta` to the emission weight of every feature template of
    /// `word`, fanning out over sub-labels as requested.
    pub fn update_emission_all(
        &mut self,
        word: &Word,
        label: u32,
        delta: f32,
        sublabel_order: Degree,
    ) {
        for i in 0..word.feature_templates().len() {
            let template = word.feature_templates()[i];
            self.update_emission(template, label, delta);
        }

        if sublabel_order > Degree::Nodeg {
            for i in 0..word.feature_templates().len() {
                for j in 0..self.sub_labels_of(label).len() {
                    let template = word.feature_templates()[i];
                    let sub = self.sub_labels_of(label)[j];
                    self.update_emission(template, sub, delta);
                }
            }
        }
    }

    /// Applies `delta` to the unigram, bigram and trigram weights of the
    /// triple `(pplabel, plabel, label)` up to `model_order`.
    pub fn update_transition(
        &mut self,
        pplabel: u32,
        plabel: u32,
        label: u32,
        delta: f32,
        sublabel_order: Degree,
        model_order: Degree,
    ) {
        self.update_uni(label, delta, sublabel_order);
        if model_order > Degree::Zeroth {
            self.update_bi(plabel, label, delta, sublabel_order);
        }
        if model_order > Degree::First {
            self.update_tri(pplabel, plabel, label, delta, sublabel_order);
        }
    }

    /// Collects the emission parameter ids an `update_emission_all` call
    /// with the same arguments touches.
    pub fn emission_ids(
        &self,
        word: &Word,
        label: u32,
        sublabel_order: Degree,
        out: &mut HashSet<u64>,
    ) {
        for &template in word.feature_templates() {
            out.insert(FeatureId::Emission { template, label }.encode());
        }

        if sublabel_order > Degree::Nodeg {
            for &template in word.feature_templates() {
                for &sub in self.sub_labels_of(label) {
                    out.insert(FeatureId::Emission { template, label: sub }.encode());
                }
            }
        }
    }

    /// Collects the unigram parameter ids an `update_uni` call touches.
    pub fn uni_ids(&self, label: u32, sublabel_order: Degree, out: &mut HashSet<u64>) {
        out.insert(FeatureId::Unigram { label }.encode());
        if sublabel_order > Degree::Nodeg {
            for &sub in self.sub_labels_of(label) {
                out.insert(FeatureId::Unigram { label: sub }.encode());
            }
        }
    }

    /// Collects the bigram parameter ids an `update_bi` call touches.
    pub fn bi_ids(&self, plabel: u32, label: u32, sublabel_order: Degree, out: &mut HashSet<u64>) {
        out.insert(FeatureId::Bigram { plabel, label }.encode());
        if sublabel_order > Degree::Zeroth {
            for &psub in self.sub_labels_of(plabel) {
                for &sub in self.sub_labels_of(label) {
                    out.insert(
                        FeatureId::Bigram {
                            plabel: psub,
                            label: sub,
                        }
                        .encode(),
                    );
                }
            }
        }
    }

    /// Collects the trigram parameter ids an `update_tri` call touches.
    pub fn tri_ids(
        &self,
        pplabel: u32,
        plabel: u32,
        label: u32,
        sublabel_order: Degree,
        out: &mut HashSet<u64>,
    ) {
        out.insert(
            FeatureId::Trigram {
                pplabel,
                plabel,
                label,
            }
            .encode(),
        );
        if sublabel_order > Degree::First {
            for &ppsub in self.sub_labels_of(pplabel) {
                for &psub in self.sub_labels_of(plabel) {
                    for &sub in self.sub_labels_of(label) {
                        out.insert(
                            FeatureId::Trigram {
                                pplabel: ppsub,
                                plabel: psub,
                                label: sub,
                            }
                            .encode(),
                        );
                    }
                }
            }
        }
    }

    /// Collects the ids an `update_transition` call touches.
    pub fn transition_ids(
        &self,
        pplabel: u32,
        plabel: u32,
        label: u32,
        sublabel_order: Degree,
        model_order: Degree,
        out: &mut HashSet<u64>,
    ) {
        self.uni_ids(label, sublabel_order, out);
        if model_order > Degree::Zeroth {
            self.bi_ids(plabel, label, sublabel_order, out);
        }
        if model_order > Degree::First {
            self.tri_ids(pplabel, plabel, label, sublabel_order, out);
        }
    }

    /// Shrinks each listed emission weight toward zero once.
    pub fn regularize_emissions(&mut self, ids: &HashSet<u64>, sigma: f32, reg: Regularization) {
        for &id in ids {
            Self::shrink(&mut self.emission, id, sigma, reg);
        }
    }

    /// Shrinks each listed transition weight toward zero once.
    pub fn regularize_transitions(&mut self, ids: &HashSet<u64>, sigma: f32, reg: Regularization) {
        for &id in ids {
            Self::shrink(&mut self.transition, id, sigma, reg);
        }
    }

    /// Overwrites this store with the averaged-perceptron view
    /// `(t + 1) · pos + neg` of two parallel stores.
    ///
    /// `pos` and `neg` hold identical key sets by construction; keys
    /// missing from `neg` contribute zero.
    pub fn set_averaged(&mut self, pos: &ParamStore, neg: &ParamStore, t: u32) {
        let sub_labels = std::mem::take(&mut self.sub_labels);
        *self = pos.clone();
        self.sub_labels = sub_labels;

        let scale = (t + 1) as f32;
        for (id, w) in self.emission.iter_mut() {
            *w = scale * *w + neg.emission.get(id).copied().unwrap_or(0.0);
        }
        for (id, w) in self.transition.iter_mut() {
            *w = scale * *w + neg.transition.get(id).copied().unwrap_or(0.0);
        }
    }

    /// Structural equality over the persistent fields.
    pub fn same_params(&self, other: &ParamStore) -> bool {
        self.trained == other.trained
            && self.feature_templates == other.feature_templates
            && self.emission == other.emission
            && self.transition == other.transition
    }
}

impl Encode for ParamStore {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> std::result::Result<(), EncodeError> {
        Encode::encode(&self.trained, encoder)?;
        Encode::encode(&self.train_iters, encoder)?;
        Encode::encode(&self.feature_templates, encoder)?;

        // Weights dropped by the configured filter are not persisted.
        for table in [&self.emission, &self.transition] {
            let mut entries: Vec<(&u64, &f32)> = table
                .iter()
                .filter(|&(&id, &w)| self.keeps(id, w))
                .collect();
            entries.sort_unstable_by_key(|&(id, _)| *id);
            Encode::encode(&(entries.len() as u64), encoder)?;
            for (id, w) in entries {
                Encode::encode(id, encoder)?;
                Encode::encode(w, encoder)?;
            }
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for ParamStore {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        let trained = Decode::decode(decoder)?;
        let train_iters = Decode::decode(decoder)?;
        let feature_templates = Decode::decode(decoder)?;
        let emission = Decode::decode(decoder)?;
        let transition = Decode::decode(decoder)?;
        Ok(Self {
            trained,
            train_iters,
            filter: ParamFilter::default(),
            feature_templates,
            emission,
            transition,
            update_counts: HashMap::new(),
            sub_labels: vec![],
        })
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for ParamStore {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(decoder: &mut D) -> std::result::Result<Self, DecodeError> {
        Decode::decode(decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_families_are_disjoint() {
        let emission = FeatureId::Emission {
            template: u32::try_from(MAX_LABEL).unwrap(),
            label: 50_000,
        }
        .encode();
        let trigram = FeatureId::Trigram {
            pplabel: 50_000,
            plabel: 50_000,
            label: 50_000,
        }
        .encode();
        let bigram_low = FeatureId::Bigram { plabel: 0, label: 0 }.encode();
        let unigram_low = FeatureId::Unigram { label: 0 }.encode();

        // Emissions and trigrams share the low range but are looked up in
        // separate tables; bigrams and unigrams live above both.
        assert!(emission < bigram_low);
        assert!(trigram < bigram_low);
        assert!(bigram_low < unigram_low);

        let bigram_high = FeatureId::Bigram {
            plabel: 50_000,
            label: 50_000,
        }
        .encode();
        assert!(bigram_high < unigram_low);
    }

    #[test]
    fn test_emission_updates() {
        let mut pt = ParamStore::new();
        let foo = pt.intern_template("FOO");
        let bar = pt.intern_template("BAR");
        assert_ne!(foo, bar);
        assert_eq!(foo, pt.intern_template("FOO"));

        assert_eq!(pt.get_emission(foo, 0), 0.0);
        pt.update_emission(foo, 0, 1.0);
        assert_eq!(pt.get_emission(foo, 0), 1.0);

        pt.update_emission(bar, 0, 2.0);
        assert_eq!(pt.get_emission(bar, 0), 2.0);

        pt.update_emission(foo, 1, 3.0);
        assert_eq!(pt.get_emission(foo, 1), 3.0);

        pt.update_emission(foo, 0, 1.0);
        assert_eq!(pt.get_emission(foo, 0), 2.0);
    }

    #[test]
    fn test_transition_updates() {
        let mut pt = ParamStore::new();

        assert_eq!(pt.get_uni(0, Degree::Nodeg), 0.0);
        pt.update_uni(0, 1.0, Degree::Nodeg);
        assert_eq!(pt.get_uni(0, Degree::Nodeg), 1.0);

        pt.update_bi(0, 1, 2.0, Degree::Nodeg);
        assert_eq!(pt.get_bi(0, 1, Degree::Nodeg), 2.0);
        assert_eq!(pt.get_bi(1, 0, Degree::Nodeg), 0.0);

        pt.update_tri(0, 1, 0, 2.0, Degree::Nodeg);
        assert_eq!(pt.get_tri(0, 1, 0, Degree::Nodeg), 2.0);
        assert_eq!(pt.get_tri(1, 0, 0, Degree::Nodeg), 0.0);

        assert_eq!(
            pt.transition_score(0, 1, 0, Degree::Nodeg, Degree::Second),
            pt.get_uni(0, Degree::Nodeg)
                + pt.get_bi(1, 0, Degree::Nodeg)
                + pt.get_tri(0, 1, 0, Degree::Nodeg)
        );
        // A first-order model ignores the trigram term.
        assert_eq!(
            pt.transition_score(0, 1, 0, Degree::Nodeg, Degree::First),
            pt.get_uni(0, Degree::Nodeg) + pt.get_bi(1, 0, Degree::Nodeg)
        );
    }

    #[test]
    fn test_sub_label_fan_out() {
        // Label 1 decomposes into sub-labels 2 and 3.
        let mut pt = ParamStore::new();
        pt.set_sub_labels(vec![vec![], vec![2, 3]]);

        pt.update_uni(1, 1.0, Degree::First);
        assert_eq!(pt.get_uni(2, Degree::Nodeg), 1.0);
        assert_eq!(pt.get_uni(3, Degree::Nodeg), 1.0);
        // Parent accumulates its own weight plus both sub-label weights.
        assert_eq!(pt.get_uni(1, Degree::First), 3.0);
        assert_eq!(pt.get_uni(1, Degree::Nodeg), 1.0);

        // The bigram itself fires at ZEROTH but sub-label bigrams do not.
        pt.update_bi(1, 1, 1.0, Degree::First);
        assert_eq!(pt.get_bi(1, 1, Degree::Zeroth), 1.0);
        assert_eq!(pt.get_bi(2, 2, Degree::Nodeg), 1.0);
        assert_eq!(pt.get_bi(1, 1, Degree::First), 5.0);

        pt.update_tri(1, 1, 1, 1.0, Degree::Second);
        assert_eq!(pt.get_tri(1, 1, 1, Degree::First), 1.0);
        assert_eq!(pt.get_tri(2, 3, 2, Degree::Nodeg), 1.0);
        assert_eq!(pt.get_tri(1, 1, 1, Degree::Second), 9.0);
    }

    #[test]
    fn test_update_count_filter_masks_reads() {
        let mut pt = ParamStore::new();
        let mut config = TaggerConfig::default();
        config.filter_type = Filtering::UpdateCount;
        config.param_threshold = 2.0;
        pt.set_filter(&config);

        let foo = pt.intern_template("FOO");
        pt.update_emission(foo, 1, 0.5);
        assert_eq!(pt.get_emission(foo, 1), 0.0);
        pt.update_emission(foo, 1, 0.5);
        assert_eq!(pt.get_emission(foo, 1), 1.0);

        let bar = pt.intern_template("BAR");
        pt.update_emission(bar, 1, 4.0);
        pt.set_trained();
        // Freezing disables read-side masking.
        assert_eq!(pt.get_emission(bar, 1), 4.0);
    }

    #[test]
    fn test_averaging() {
        let mut pos = ParamStore::new();
        let mut neg = ParamStore::new();
        let foo = pos.intern_template("FOO");
        neg.intern_template("FOO");

        pos.update_emission(foo, 1, 2.0);
        neg.update_emission(foo, 1, -3.0);
        pos.update_uni(4, 1.0, Degree::Nodeg);
        neg.update_uni(4, -2.0, Degree::Nodeg);

        let mut avg = ParamStore::new();
        avg.set_averaged(&pos, &neg, 2);
        assert_eq!(avg.get_emission(foo, 1), 3.0 * 2.0 - 3.0);
        assert_eq!(avg.get_uni(4, Degree::Nodeg), 3.0 * 1.0 - 2.0);
    }

    #[test]
    fn test_regularization() {
        let mut pt = ParamStore::new();
        pt.update_uni(1, 1.0, Degree::Nodeg);

        let mut ids = HashSet::new();
        pt.transition_ids(0, 0, 1, Degree::Nodeg, Degree::Zeroth, &mut ids);
        assert_eq!(ids.len(), 1);
        pt.regularize_transitions(&ids, 0.25, Regularization::L2);
        assert!((pt.get_uni(1, Degree::Nodeg) - 0.75).abs() < 1e-6);

        pt.update_uni(2, -0.1, Degree::Nodeg);
        let mut ids = HashSet::new();
        pt.uni_ids(2, Degree::Nodeg, &mut ids);
        pt.regularize_transitions(&ids, 0.25, Regularization::L1);
        // L1 shrinking never crosses zero.
        assert_eq!(pt.get_uni(2, Degree::Nodeg), 0.0);
    }

    #[test]
    fn test_touched_id_sets_deduplicate() {
        let mut pt = ParamStore::new();
        pt.set_sub_labels(vec![vec![], vec![2, 3]]);

        let mut ids = HashSet::new();
        pt.transition_ids(1, 1, 1, Degree::Second, Degree::Second, &mut ids);
        // 3 unigrams, 1 + 4 bigrams, 1 + 8 trigrams.
        assert_eq!(ids.len(), 3 + 5 + 9);

        // Collecting the same triple twice adds nothing.
        pt.transition_ids(1, 1, 1, Degree::Second, Degree::Second, &mut ids);
        assert_eq!(ids.len(), 17);
    }

    #[test]
    fn test_store_roundtrip() {
        let mut pt = ParamStore::new();
        let foo = pt.intern_template("FOO");
        pt.update_emission(foo, 1, 1.5);
        pt.update_uni(1, 2.0, Degree::Nodeg);
        pt.update_bi(0, 1, -1.0, Degree::Nodeg);
        pt.set_trained();

        let bytes = bincode::encode_to_vec(&pt, crate::common::bincode_config()).unwrap();
        let (decoded, _): (ParamStore, usize) =
            bincode::decode_from_slice(&bytes, crate::common::bincode_config()).unwrap();
        assert!(pt.same_params(&decoded));

        let bytes2 = bincode::encode_to_vec(&decoded, crate::common::bincode_config()).unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn test_filtered_store_drops_weights() {
        let mut pt = ParamStore::new();
        let mut config = TaggerConfig::default();
        config.filter_type = Filtering::UpdateCount;
        config.param_threshold = 2.0;
        pt.set_filter(&config);

        let foo = pt.intern_template("FOO");
        pt.update_emission(foo, 1, 1.0);
        pt.update_uni(1, 1.0, Degree::Nodeg);
        pt.update_uni(1, 1.0, Degree::Nodeg);
        pt.set_trained();

        let bytes = bincode::encode_to_vec(&pt, crate::common::bincode_config()).unwrap();
        let (decoded, _): (ParamStore, usize) =
            bincode::decode_from_slice(&bytes, crate::common::bincode_config()).unwrap();
        // The singly-updated emission weight is gone, the unigram stays.
        assert_eq!(decoded.get_emission(foo, 1), 0.0);
        assert_eq!(decoded.get_uni(1, Degree::Nodeg), 2.0);
    }
}
