//! Per-sentence second-order lattice.
//!
//! Column `i` holds one cell per (candidate label of word `i-1`,
//! candidate label of word `i`) pair, so trigram context is available
//! through one back-pointer hop. Cells chain by arena indices into the
//! previous column. All scores live in log space.

use crate::config::Degree;
use crate::params::ParamStore;
use crate::sentence::Sentence;

/// Stand-in for log(0); finite so that score differences stay finite.
const LOG_ZERO: f32 = f32::MIN;

/// `log(exp(x) + exp(y))` without leaving log space.
pub(crate) fn log_sum_exp(x: f32, y: f32) -> f32 {
    let (x, y) = if y > x { (y, x) } else { (x, y) };
    if x - y > 50.0 {
        x
    } else {
        x + (1.0 + (y - x).exp()).ln()
    }
}

#[derive(Clone, Copy, Debug)]
struct Cell {
    fw: f32,
    bw: f32,
    viterbi: f32,
    label: u32,
    label_index: u32,
    /// Flat index of the best predecessor cell in the previous column.
    pred: Option<u32>,
}

struct Column {
    labels: Vec<u32>,
    plabel_count: usize,
    /// `plabel_count * labels.len()` cells; `(label, plabel)` at
    /// `label_index * plabel_count + plabel_index`.
    cells: Vec<Cell>,
    /// Flat cell indices ordered by descending Viterbi score.
    beam: Vec<u32>,
}

impl Column {
    fn new(labels: Vec<u32>, plabel_count: usize) -> Self {
        let cells = (0..labels.len())
            .flat_map(|i| {
                std::iter::repeat(Cell {
                    fw: LOG_ZERO,
                    bw: LOG_ZERO,
                    viterbi: LOG_ZERO,
                    label: labels[i],
                    label_index: i as u32,
                    pred: None,
                })
                .take(plabel_count)
            })
            .collect();
        Self {
            labels,
            plabel_count,
            cells,
            beam: vec![],
        }
    }

    fn label_count(&self) -> usize {
        self.labels.len()
    }

    fn flat(&self, label_index: usize, plabel_index: usize) -> usize {
        label_index * self.plabel_count + plabel_index
    }
}

/// Position-normalized posterior tensors.
struct Marginals {
    unigram: Vec<Vec<f32>>,
    bigram: Vec<Vec<f32>>,
    trigram: Vec<Vec<f32>>,
}

/// The per-sentence lattice implementing Viterbi, forward/backward and
/// posterior marginal computation, with optional beam pruning.
pub(crate) struct Trellis<'a> {
    sentence: &'a Sentence,
    boundary_label: u32,
    sublabel_order: Degree,
    model_order: Degree,
    beam_width: Option<usize>,
    beam_mass: Option<f32>,
    columns: Vec<Column>,
    marginals: Option<Marginals>,
}

impl<'a> Trellis<'a> {
    pub fn new(
        sentence: &'a Sentence,
        boundary_label: u32,
        sublabel_order: Degree,
        model_order: Degree,
    ) -> Self {
        let mut columns: Vec<Column> = Vec::with_capacity(sentence.len());
        for i in 0..sentence.len() {
            let labels = sentence.at(i).candidates().to_vec();
            let plabel_count = if i == 0 {
                1
            } else {
                columns[i - 1].label_count()
            };
            columns.push(Column::new(labels, plabel_count));
        }

        Self {
            sentence,
            boundary_label,
            sublabel_order,
            model_order,
            beam_width: None,
            beam_mass: None,
            columns,
            marginals: None,
        }
    }

    /// Restricts Viterbi to the top `width` cells of each column.
    pub fn set_beam(&mut self, width: u32) {
        self.beam_width = Some(width as usize);
    }

    /// Enables the adaptive beam: each column keeps cells in descending
    /// forward score until their cumulative mass exceeds `mass`.
    pub fn set_beam_mass(&mut self, mass: f32) {
        self.beam_mass = Some(mass);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn label_count(&self, position: usize) -> usize {
        self.columns[position].label_count()
    }

    pub fn plabel_count(&self, position: usize) -> usize {
        self.columns[position].plabel_count
    }

    pub fn pplabel_count(&self, position: usize) -> usize {
        if position < 2 {
            1
        } else {
            self.columns[position - 2].label_count()
        }
    }

    pub fn label_at(&self, position: usize, label_index: usize) -> u32 {
        self.columns[position].labels[label_index]
    }

    pub fn plabel_at(&self, position: usize, plabel_index: usize) -> u32 {
        if position == 0 {
            self.boundary_label
        } else {
            self.columns[position - 1].labels[plabel_index]
        }
    }

    pub fn pplabel_at(&self, position: usize, pplabel_index: usize) -> u32 {
        if position < 2 {
            self.boundary_label
        } else {
            self.columns[position - 2].labels[pplabel_index]
        }
    }

    fn emissions(&self, position: usize, params: &ParamStore) -> Vec<f32> {
        let word = self.sentence.at(position);
        self.columns[position]
            .labels
            .iter()
            .map(|&label| params.emission_score(word, label, self.sublabel_order))
            .collect()
    }

    fn transition(&self, pplabel: u32, plabel: u32, label: u32, params: &ParamStore) -> f32 {
        params.transition_score(pplabel, plabel, label, self.sublabel_order, self.model_order)
    }

    /// Exact forward pass over all cells (no beam).
    fn compute_fw(&mut self, params: &ParamStore) {
        for c in 0..self.columns.len() {
            let em = self.emissions(c, params);
            let col = &self.columns[c];

            let mut new_fw = vec![LOG_ZERO; col.cells.len()];
            for i in 0..col.label_count() {
                for j in 0..col.plabel_count {
                    let mut total = LOG_ZERO;
                    for k in 0..self.pplabel_count(c) {
                        let tr = self.transition(
                            self.pplabel_at(c, k),
                            self.plabel_at(c, j),
                            col.labels[i],
                            params,
                        );
                        let prev_fw = if c == 0 {
                            0.0
                        } else {
                            let prev = &self.columns[c - 1];
                            prev.cells[prev.flat(j, k)].fw
                        };
                        total = log_sum_exp(total, tr + prev_fw);
                    }
                    new_fw[col.flat(i, j)] = em[i] + total;
                }
            }

            let col = &mut self.columns[c];
            for (cell, fw) in col.cells.iter_mut().zip(new_fw) {
                cell.fw = fw;
            }
        }
    }

    /// Exact backward pass, symmetric to the forward pass.
    fn compute_bw(&mut self, params: &ParamStore) {
        for c in (0..self.columns.len()).rev() {
            let next_em = if c + 1 < self.columns.len() {
                self.emissions(c + 1, params)
            } else {
                vec![]
            };
            let col = &self.columns[c];

            let mut new_bw = vec![LOG_ZERO; col.cells.len()];
            for i in 0..col.label_count() {
                for j in 0..col.plabel_count {
                    let mut total = LOG_ZERO;
                    let next_count = if c + 1 < self.columns.len() {
                        self.columns[c + 1].label_count()
                    } else {
                        1
                    };
                    for next_i in 0..next_count {
                        let (next_label, next_bw, em) = if c + 1 < self.columns.len() {
                            let next = &self.columns[c + 1];
                            (
                                next.labels[next_i],
                                next.cells[next.flat(next_i, i)].bw,
                                next_em[next_i],
                            )
                        } else {
                            (self.boundary_label, 0.0, 0.0)
                        };
                        let tr =
                            self.transition(self.plabel_at(c, j), col.labels[i], next_label, params);
                        total = log_sum_exp(total, tr + em + next_bw);
                    }
                    new_bw[col.flat(i, j)] = total;
                }
            }

            let col = &mut self.columns[c];
            for (cell, bw) in col.cells.iter_mut().zip(new_bw) {
                cell.bw = bw;
            }
        }
    }

    /// Cells of `position` surviving its beam, in descending Viterbi
    /// order.
    fn beam_cell_count(&self, position: usize) -> usize {
        let col = &self.columns[position];

        let Some(mass) = self.beam_mass else {
            return match self.beam_width {
                Some(width) => col.beam.len().min(width),
                None => col.beam.len(),
            };
        };

        let mut total = LOG_ZERO;
        for &flat in &col.beam {
            total = log_sum_exp(total, col.cells[flat as usize].fw);
        }

        let mut prefix = LOG_ZERO;
        for (i, &flat) in col.beam.iter().enumerate() {
            prefix = log_sum_exp(prefix, col.cells[flat as usize].fw);
            if i > 200 || ((prefix - total).exp() > mass && i > 4) {
                return i + 1;
            }
        }

        col.beam.len()
    }

    /// Viterbi pass with beam pruning; also accumulates the (beam
    /// restricted) forward scores the adaptive beam needs.
    fn compute_viterbi(&mut self, params: &ParamStore) {
        for col in &mut self.columns {
            for cell in &mut col.cells {
                cell.fw = LOG_ZERO;
                cell.viterbi = LOG_ZERO;
                cell.pred = None;
            }
            col.beam.clear();
        }

        for c in 0..self.columns.len() {
            let em = self.emissions(c, params);
            let col = &self.columns[c];

            let mut new_cells = col.cells.clone();
            let mut beam = vec![];

            if c == 0 {
                for i in 0..col.label_count() {
                    let tr = self.transition(
                        self.boundary_label,
                        self.boundary_label,
                        col.labels[i],
                        params,
                    );
                    let flat = col.flat(i, 0);
                    new_cells[flat].viterbi = tr + em[i];
                    new_cells[flat].fw = tr + em[i];
                    beam.push(flat as u32);
                }
            } else {
                let pcount = self.beam_cell_count(c - 1);
                let limit = match self.beam_width {
                    Some(width) => pcount.min(width),
                    None => pcount,
                };
                let prev = &self.columns[c - 1];

                for i in 0..col.label_count() {
                    for &pflat in prev.beam.iter().take(limit) {
                        let pcell = prev.cells[pflat as usize];
                        let pplabel = match pcell.pred {
                            Some(ppflat) => self.columns[c - 2].cells[ppflat as usize].label,
                            None => self.boundary_label,
                        };
                        let tr = self.transition(pplabel, pcell.label, col.labels[i], params);

                        let flat = col.flat(i, pcell.label_index as usize);
                        let cell = &mut new_cells[flat];

                        cell.fw = log_sum_exp(cell.fw, pcell.fw + tr + em[i]);

                        if cell.viterbi == LOG_ZERO {
                            beam.push(flat as u32);
                        }

                        let score = tr + pcell.viterbi + em[i];
                        if score > cell.viterbi || cell.pred.is_none() {
                            cell.viterbi = score;
                            cell.pred = Some(pflat);
                        }
                    }
                }
            }

            beam.sort_by(|&a, &b| {
                new_cells[b as usize]
                    .viterbi
                    .total_cmp(&new_cells[a as usize].viterbi)
            });

            let col = &mut self.columns[c];
            col.cells = new_cells;
            col.beam = beam;
        }
    }

    /// Viterbi score of a cell, for inspection.
    #[allow(dead_code)]
    pub fn viterbi(&self, position: usize, plabel_index: usize, label_index: usize) -> f32 {
        let col = &self.columns[position];
        col.cells[col.flat(label_index, plabel_index)].viterbi
    }

    /// The maximum a posteriori label assignment, one label per position
    /// including the boundary positions.
    pub fn map_assignment(&mut self, params: &ParamStore) -> Vec<u32> {
        self.compute_viterbi(params);

        let mut labels = vec![];
        let mut position = self.columns.len() - 1;
        let mut flat = 0usize;
        loop {
            let cell = self.columns[position].cells[flat];
            labels.push(cell.label);
            match cell.pred {
                Some(pred) if position > 0 => {
                    flat = pred as usize;
                    position -= 1;
                }
                _ => break,
            }
        }

        labels.reverse();
        debug_assert_eq!(labels.len(), self.columns.len());
        labels
    }

    /// The position-wise argmax of the unigram marginals.
    pub fn marginal_assignment(&mut self, params: &ParamStore) -> Vec<u32> {
        self.set_marginals(params);
        let marginals = self.marginals.as_ref().unwrap();

        (0..self.columns.len())
            .map(|c| {
                let mut best = (f32::MIN, 0);
                for (i, &p) in marginals.unigram[c].iter().enumerate() {
                    if p > best.0 {
                        best = (p, i);
                    }
                }
                self.columns[c].labels[best.1]
            })
            .collect()
    }

    fn tensor_sizes(&self, position: usize) -> (usize, usize, usize) {
        let labels = self.label_count(position);
        let bigrams = labels * self.plabel_count(position);
        let trigrams = if position < 2 {
            0
        } else {
            bigrams * self.columns[position - 2].label_count()
        };
        (labels, bigrams, trigrams)
    }

    /// Runs forward/backward and fills the normalized posterior tensors.
    /// Idempotent.
    pub fn set_marginals(&mut self, params: &ParamStore) {
        if self.marginals.is_some() {
            return;
        }

        self.compute_bw(params);
        self.compute_fw(params);

        let n = self.columns.len();
        let mut unigram = Vec::with_capacity(n);
        let mut bigram = Vec::with_capacity(n);
        let mut trigram = Vec::with_capacity(n);

        for c in 0..n {
            let col = &self.columns[c];
            let (unigrams, bigrams, trigrams) = self.tensor_sizes(c);

            let mut bi = vec![0.0; bigrams];
            for l in 0..unigrams {
                for pl in 0..col.plabel_count {
                    let cell = col.cells[col.flat(l, pl)];
                    bi[l + pl * unigrams] = cell.fw + cell.bw;
                }
            }

            let mut uni = vec![0.0; unigrams];
            for (l, u) in uni.iter_mut().enumerate() {
                let mut total = LOG_ZERO;
                for pl in 0..col.plabel_count {
                    total = log_sum_exp(total, bi[l + pl * unigrams]);
                }
                *u = total;
            }

            let mut tri = vec![0.0; trigrams];
            if c >= 2 {
                let em = self.emissions(c, params);
                let prev = &self.columns[c - 1];
                for l in 0..unigrams {
                    for pl in 0..prev.label_count() {
                        for ppl in 0..self.columns[c - 2].label_count() {
                            let tr = self.transition(
                                self.columns[c - 2].labels[ppl],
                                prev.labels[pl],
                                col.labels[l],
                                params,
                            );
                            tri[l + pl * unigrams + ppl * unigrams * prev.label_count()] = prev
                                .cells[prev.flat(pl, ppl)]
                                .fw
                                + col.cells[col.flat(l, pl)].bw
                                + tr
                                + em[l];
                        }
                    }
                }
            }

            unigram.push(uni);
            bigram.push(bi);
            trigram.push(tri);
        }

        for c in 0..n {
            normalize(&mut unigram[c]);
            normalize(&mut bigram[c]);
            normalize(&mut trigram[c]);
        }

        self.marginals = Some(Marginals {
            unigram,
            bigram,
            trigram,
        });
    }

    /// Posterior probability of label index `l` at `position`.
    pub fn unigram_marginal(&self, position: usize, l: usize) -> f32 {
        self.marginals.as_ref().unwrap().unigram[position][l]
    }

    /// Posterior probability of the (previous label, label) index pair.
    pub fn bigram_marginal(&self, position: usize, pl: usize, l: usize) -> f32 {
        let labels = self.label_count(position);
        self.marginals.as_ref().unwrap().bigram[position][l + pl * labels]
    }

    /// Posterior probability of the (pplabel, plabel, label) index
    /// triple. Positions 0 and 1 have no trigram context and fall back
    /// to the bigram marginal.
    pub fn trigram_marginal(&self, position: usize, ppl: usize, pl: usize, l: usize) -> f32 {
        if position < 2 {
            return self.bigram_marginal(position, pl, l);
        }
        let labels = self.label_count(position);
        let plabels = self.columns[position - 1].label_count();
        self.marginals.as_ref().unwrap().trigram[position][l + pl * labels + ppl * labels * plabels]
    }
}

/// Exponentiates `v` in place, normalized by its log-sum-exp total.
fn normalize(v: &mut [f32]) {
    if v.is_empty() {
        return;
    }
    let mut total = LOG_ZERO;
    for &x in v.iter() {
        total = log_sum_exp(total, x);
    }
    for x in v.iter_mut() {
        *x = (*x - total).exp();
    }
}
