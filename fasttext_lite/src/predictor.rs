use core::cmp::{Ordering, Reverse};
use core::fmt;
use std::collections::BinaryHeap;
use std::io::BufRead;

use crate::args::ModelName;
use crate::dictionary::is_delimiter;
use crate::errors::{FastTextError, Result};
use crate::loss::ScoringModel;
use crate::model::Model;

/// A label and its log-probability.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbLabel {
    pub label: String,
    pub log_prob: f32,
}

impl fmt::Display for ProbLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "logProb = {:.6}, label = {}", self.log_prob, self.label)
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    log_prob: f32,
    label: usize,
}

// Greater is better: a higher log-probability, then a lower label id.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.log_prob
            .total_cmp(&other.log_prob)
            .then_with(|| other.label.cmp(&self.label))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Bounded heap keeping the `k` best labels.
pub(crate) struct KBest {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl KBest {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    /// Returns `false` if a candidate with `log_prob` can never enter the heap.
    #[inline]
    pub(crate) fn can_enter(&self, log_prob: f32) -> bool {
        if self.heap.len() < self.k {
            return true;
        }
        self.heap
            .peek()
            .map_or(false, |Reverse(worst)| log_prob >= worst.log_prob)
    }

    pub(crate) fn push(&mut self, log_prob: f32, label: usize) {
        if self.k == 0 {
            return;
        }
        let candidate = Candidate { log_prob, label };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if candidate > worst.0 {
                *worst = Reverse(candidate);
            }
        }
    }

    /// Returns `(log_prob, label)` pairs, best first.
    pub(crate) fn into_sorted_vec(self) -> Vec<(f32, usize)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| (c.log_prob, c.label))
            .collect()
    }
}

/// Result of evaluating a model on labelled text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TestReport {
    /// Lines with at least one known label and one usable token.
    pub examples: usize,

    /// Number of predictions requested per line.
    pub k: usize,

    /// Predictions that matched a gold label.
    pub correct: usize,

    /// Number of known gold labels.
    pub gold_labels: usize,
}

impl TestReport {
    /// Precision at k.
    pub fn precision(&self) -> f64 {
        if self.examples == 0 {
            return f64::NAN;
        }
        self.correct as f64 / (self.k * self.examples) as f64
    }

    /// Recall at k.
    pub fn recall(&self) -> f64 {
        if self.gold_labels == 0 {
            return f64::NAN;
        }
        self.correct as f64 / self.gold_labels as f64
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "N\t{}", self.examples)?;
        writeln!(f, "P@{}\t{:.3}", self.k, self.precision())?;
        write!(f, "R@{}\t{:.3}", self.k, self.recall())
    }
}

/// Predictor.
pub struct Predictor {
    model: Model,
    scorer: ScoringModel,
}

impl Predictor {
    /// Creates a new predictor.
    ///
    /// # Arguments
    ///
    /// * `model` - A model data.
    ///
    /// # Returns
    ///
    /// A new predictor.
    ///
    /// # Errors
    ///
    /// If the output matrix cannot serve the model's loss, an error variant
    /// will be returned.
    pub fn new(model: Model) -> Result<Self> {
        let scorer = ScoringModel::new(
            model.args.loss(),
            &model.dict.label_counts(),
            &model.table.output,
        )?;
        Ok(Self { model, scorer })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn scorer(&self) -> &ScoringModel {
        &self.scorer
    }

    fn validate_k(k: i32) -> Result<usize> {
        if k <= 0 {
            return Err(FastTextError::invalid_argument("k", "must be positive"));
        }
        Ok(k as usize)
    }

    fn hidden(&self, text: &str) -> Option<Vec<f32>> {
        let line = self.model.dict.get_line(text);
        if line.words.is_empty() {
            return None;
        }
        let mut hidden = vec![0.0; self.model.table.dim()];
        self.model.table.average_into(&line.words, &mut hidden);
        Some(hidden)
    }

    fn predict_k(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<ProbLabel>> {
        let Some(hidden) = self.hidden(text) else {
            tracing::trace!("no usable token in input");
            return Ok(vec![]);
        };
        let mut heap = KBest::new(k);
        self.scorer
            .k_best(&self.model.table.output, &hidden, threshold, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|(log_prob, id)| {
                let label = self
                    .model
                    .dict
                    .label(id)
                    .ok_or(FastTextError::InvalidLabelId(id))?;
                Ok(ProbLabel {
                    label: label.to_string(),
                    log_prob,
                })
            })
            .collect()
    }

    /// Predicts the `k` most probable labels.
    ///
    /// # Arguments
    ///
    /// * `text` - Input text.
    /// * `k` - Number of labels to return.
    ///
    /// # Returns
    ///
    /// Labels ordered by decreasing log-probability. Equal log-probabilities
    /// are ordered by label id. The result is empty when no token of `text`
    /// has a vector.
    ///
    /// # Errors
    ///
    /// If `k` is not positive, an error variant will be returned.
    pub fn predict_proba(&self, text: &str, k: i32) -> Result<Vec<ProbLabel>> {
        self.predict_proba_with_threshold(text, k, 0.0)
    }

    /// Same as [`Predictor::predict_proba`], dropping labels whose probability is
    /// below `threshold`.
    ///
    /// # Errors
    ///
    /// If `k` is not positive, an error variant will be returned.
    pub fn predict_proba_with_threshold(
        &self,
        text: &str,
        k: i32,
        threshold: f32,
    ) -> Result<Vec<ProbLabel>> {
        let k = Self::validate_k(k)?;
        self.predict_k(text, k, threshold)
    }

    /// Predicts the `k` most probable labels without their probabilities.
    ///
    /// # Errors
    ///
    /// If `k` is not positive, an error variant will be returned.
    pub fn predict(&self, text: &str, k: i32) -> Result<Vec<String>> {
        Ok(self
            .predict_proba(text, k)?
            .into_iter()
            .map(|p| p.label)
            .collect())
    }

    /// Predicts the most probable label and its log-probability.
    pub fn predict_proba_best(&self, text: &str) -> Result<Option<ProbLabel>> {
        Ok(self.predict_k(text, 1, 0.0)?.into_iter().next())
    }

    /// Predicts the most probable label.
    pub fn predict_best(&self, text: &str) -> Result<Option<String>> {
        Ok(self.predict_proba_best(text)?.map(|p| p.label))
    }

    /// Log-probability of `label` for `text`.
    ///
    /// Returns `None` when `label` is unknown or no token of `text` has a vector.
    pub fn label_log_prob(&self, text: &str, label: &str) -> Result<Option<f32>> {
        let Some(id) = self.model.dict.label_id_of(label) else {
            return Ok(None);
        };
        let Some(hidden) = self.hidden(text) else {
            return Ok(None);
        };
        self.scorer
            .score(&self.model.table.output, &hidden, id)
            .map(Some)
    }

    /// Returns the vector of `word`.
    ///
    /// An unknown word is represented by its character n-grams. When it has
    /// none, a zero vector is returned.
    pub fn word_vector(&self, word: &str) -> Vec<f32> {
        let mut vec = vec![0.0; self.model.table.dim()];
        let rows = self.model.dict.subwords_of(word);
        self.model.table.average_into(&rows, &mut vec);
        vec
    }

    /// Returns the vector of `text`.
    ///
    /// Supervised models average the input rows of the first line. Other
    /// models average the normalized vectors of every word in `text`.
    pub fn sentence_vector(&self, text: &str) -> Vec<f32> {
        let dim = self.model.table.dim();
        if self.model.args.model() == ModelName::Supervised {
            return self.hidden(text).unwrap_or_else(|| vec![0.0; dim]);
        }
        let mut svec = vec![0.0; dim];
        let mut count = 0;
        for word in text.split(is_delimiter).filter(|w| !w.is_empty()) {
            let vec = self.word_vector(word);
            let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for (s, v) in svec.iter_mut().zip(&vec) {
                    *s += v / norm;
                }
                count += 1;
            }
        }
        if count > 0 {
            let scale = 1.0 / count as f32;
            for s in &mut svec {
                *s *= scale;
            }
        }
        svec
    }

    /// Evaluates the model on labelled lines.
    ///
    /// # Arguments
    ///
    /// * `rdr` - Lines of text containing gold labels.
    /// * `k` - Number of labels predicted per line.
    ///
    /// # Errors
    ///
    /// If `k` is not positive or `rdr` fails, an error variant will be returned.
    pub fn test<R>(&self, rdr: R, k: i32) -> Result<TestReport>
    where
        R: BufRead,
    {
        let k = Self::validate_k(k)?;
        let mut report = TestReport {
            examples: 0,
            k,
            correct: 0,
            gold_labels: 0,
        };
        for line in rdr.lines() {
            let line = self.model.dict.get_line(&line?);
            if line.labels.is_empty() || line.words.is_empty() {
                continue;
            }
            let mut hidden = vec![0.0; self.model.table.dim()];
            self.model.table.average_into(&line.words, &mut hidden);
            let mut heap = KBest::new(k);
            self.scorer
                .k_best(&self.model.table.output, &hidden, 0.0, &mut heap);
            report.correct += heap
                .into_sorted_vec()
                .iter()
                .filter(|(_, id)| line.labels.contains(id))
                .count();
            report.examples += 1;
            report.gold_labels += line.labels.len();
        }
        tracing::debug!(
            examples = report.examples,
            precision = report.precision(),
            recall = report.recall(),
            "evaluation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::args::{Args, LossName};
    use crate::dictionary::Dictionary;
    use crate::matrix::DenseMatrix;
    use crate::test_utils::{sports_model, subword_model};

    #[test]
    fn test_kbest_keeps_best() {
        let mut heap = KBest::new(2);
        heap.push(-3.0, 0);
        heap.push(-1.0, 1);
        heap.push(-2.0, 2);
        heap.push(-5.0, 3);

        assert_eq!(vec![(-1.0, 1), (-2.0, 2)], heap.into_sorted_vec());
    }

    #[test]
    fn test_kbest_ties_prefer_lower_id() {
        let mut heap = KBest::new(2);
        heap.push(-1.0, 3);
        heap.push(-1.0, 2);
        heap.push(-1.0, 0);
        heap.push(-1.0, 1);

        assert_eq!(vec![(-1.0, 0), (-1.0, 1)], heap.into_sorted_vec());
    }

    #[test]
    fn test_predict_sports() {
        let predictor = Predictor::new(sports_model()).unwrap();

        assert_eq!(
            Some("__label__sports".to_string()),
            predictor.predict_best("the team won").unwrap()
        );
    }

    #[test]
    fn test_predict_sums_to_one() {
        let predictor = Predictor::new(sports_model()).unwrap();

        let preds = predictor.predict_proba("the team won", 2).unwrap();

        assert_eq!(2, preds.len());
        assert!(preds[0].log_prob >= preds[1].log_prob);
        let total: f32 = preds.iter().map(|p| p.log_prob.exp()).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_predict_k_larger_than_labels() {
        let predictor = Predictor::new(sports_model()).unwrap();

        assert_eq!(2, predictor.predict_proba("vote", 10).unwrap().len());
        assert_eq!(
            vec!["__label__politics".to_string()],
            predictor.predict("vote", 1).unwrap()
        );
    }

    #[test]
    fn test_predict_invalid_k() {
        let predictor = Predictor::new(sports_model()).unwrap();

        for text in ["the team won", "", "unknown"] {
            for k in [0, -1, i32::MIN] {
                assert_eq!(
                    "InvalidArgumentError: k: must be positive",
                    &predictor.predict_proba(text, k).err().unwrap().to_string()
                );
            }
        }
    }

    #[test]
    fn test_predict_nothing_usable() {
        let predictor = Predictor::new(sports_model()).unwrap();

        assert_eq!(Vec::<ProbLabel>::new(), predictor.predict_proba("zzz qqq", 3).unwrap());
        assert_eq!(None, predictor.predict_best("").unwrap());
        assert_eq!(None, predictor.predict_proba_best("  ").unwrap());
    }

    #[test]
    fn test_predict_best_matches_predict() {
        let predictor = Predictor::new(sports_model()).unwrap();

        for text in ["the team won", "vote", "the", "", "team vote"] {
            let top = predictor.predict_proba(text, 1).unwrap();
            assert_eq!(
                top.first().map(|p| p.label.clone()),
                predictor.predict_best(text).unwrap()
            );
        }
    }

    #[test]
    fn test_predict_ties_ordered_by_label_id() {
        let args = Args::supervised().with_dim(2).unwrap();
        let dict = Dictionary::new(
            &args,
            [("w", 1)],
            [("__label__a", 1), ("__label__b", 1), ("__label__c", 1)],
        )
        .unwrap();
        let model = crate::model::Model::new(
            args,
            dict,
            DenseMatrix::from_vec(1, 2, vec![1.0, 1.0]).unwrap(),
            DenseMatrix::zeros(3, 2),
        )
        .unwrap();
        let predictor = Predictor::new(model).unwrap();

        let labels = predictor.predict("w", 2).unwrap();

        assert_eq!(vec!["__label__a", "__label__b"], labels);
    }

    #[test]
    fn test_predict_with_threshold() {
        let predictor = Predictor::new(sports_model()).unwrap();

        let preds = predictor
            .predict_proba_with_threshold("the team won", 2, 0.6)
            .unwrap();

        assert_eq!(1, preds.len());
        assert_eq!("__label__sports", preds[0].label);
    }

    #[test]
    fn test_label_log_prob() {
        let predictor = Predictor::new(sports_model()).unwrap();
        let preds = predictor.predict_proba("the team won", 2).unwrap();

        for p in &preds {
            assert_eq!(
                Some(p.log_prob),
                predictor.label_log_prob("the team won", &p.label).unwrap()
            );
        }
        assert_eq!(
            None,
            predictor
                .label_log_prob("the team won", "__label__weather")
                .unwrap()
        );
    }

    #[test]
    fn test_word_vector() {
        let predictor = Predictor::new(sports_model()).unwrap();

        assert_eq!(vec![1.0, 0.0], predictor.word_vector("team"));
        assert_eq!(vec![0.0, 0.0], predictor.word_vector("unknownword"));
    }

    #[test]
    fn test_word_vector_from_subwords() {
        let predictor = Predictor::new(subword_model()).unwrap();

        let vec = predictor.word_vector("unknownword");

        assert_eq!(predictor.model().args().dim(), vec.len());
        assert!(vec.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_sentence_vector_supervised() {
        let predictor = Predictor::new(sports_model()).unwrap();

        let vec = predictor.sentence_vector("team won");

        assert_eq!(vec![1.0, 0.0], vec);
    }

    #[test]
    fn test_sentence_vector_unsupervised_reads_all_lines() {
        let args = Args::default()
            .with_dim(2)
            .unwrap()
            .with_subwords(0, 0, 0)
            .unwrap();
        let dict = Dictionary::new(
            &args,
            [("team", 3), ("vote", 2)],
            Vec::<(String, i64)>::new(),
        )
        .unwrap();
        let model = crate::model::Model::new(
            args,
            dict,
            DenseMatrix::from_vec(2, 2, vec![2.0, 0.0, 0.0, 3.0]).unwrap(),
            DenseMatrix::zeros(2, 2),
        )
        .unwrap();
        let predictor = Predictor::new(model).unwrap();

        assert_eq!(vec![0.5, 0.5], predictor.sentence_vector("team vote"));
        assert_eq!(vec![0.5, 0.5], predictor.sentence_vector("team\nvote\n"));
        assert_eq!(vec![0.5, 0.5], predictor.sentence_vector("team\0vote\x0b"));
        assert_eq!(vec![1.0, 0.0], predictor.sentence_vector("team unknown"));
        assert_eq!(vec![0.0, 0.0], predictor.sentence_vector(""));
    }

    #[test]
    fn test_hierarchical_softmax_prediction() {
        let args = Args::supervised()
            .with_dim(2)
            .unwrap()
            .with_loss(LossName::HierarchicalSoftmax);
        let dict = Dictionary::new(
            &args,
            [("a", 1), ("b", 1)],
            [("__label__x", 5), ("__label__y", 3), ("__label__z", 1)],
        )
        .unwrap();
        let model = crate::model::Model::new(
            args,
            dict,
            DenseMatrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
            DenseMatrix::from_vec(3, 2, vec![2.0, -1.0, -0.5, 3.0, 0.0, 0.0]).unwrap(),
        )
        .unwrap();
        let predictor = Predictor::new(model).unwrap();

        let preds = predictor.predict_proba("a b", 3).unwrap();

        assert_eq!(3, preds.len());
        for w in preds.windows(2) {
            assert!(w[0].log_prob >= w[1].log_prob);
        }
        for p in &preds {
            assert_eq!(
                Some(p.log_prob),
                predictor.label_log_prob("a b", &p.label).unwrap()
            );
        }
    }

    #[test]
    fn test_test_report() {
        let predictor = Predictor::new(sports_model()).unwrap();
        let data = "__label__sports the team won\n\
                    __label__politics vote\n\
                    __label__sports vote\n\
                    __label__politics\n\
                    the team\n";

        let report = predictor.test(data.as_bytes(), 1).unwrap();

        assert_eq!(3, report.examples);
        assert_eq!(2, report.correct);
        assert_eq!(3, report.gold_labels);
        assert!((report.precision() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!("N\t3\nP@1\t0.667\nR@1\t0.667", report.to_string());
    }
}
