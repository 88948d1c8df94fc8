use crate::args::LossName;
use crate::errors::{FastTextError, Result};
use crate::matrix::DenseMatrix;
use crate::predictor::KBest;
use crate::utils::std_log;

const SIGMOID_TABLE_SIZE: usize = 512;
const MAX_SIGMOID: f32 = 8.0;

// Count given to internal nodes before they are merged.
const UNMERGED_COUNT: i64 = 1_000_000_000_000_000;

struct SigmoidTable(Vec<f32>);

impl SigmoidTable {
    fn new() -> Self {
        Self(
            (0..=SIGMOID_TABLE_SIZE)
                .map(|i| {
                    let x = (i as f32 * 2.0 * MAX_SIGMOID) / SIGMOID_TABLE_SIZE as f32 - MAX_SIGMOID;
                    (1.0 / (1.0 + f64::from((-x).exp()))) as f32
                })
                .collect(),
        )
    }

    #[inline(always)]
    fn sigmoid(&self, x: f32) -> f32 {
        if x < -MAX_SIGMOID {
            0.0
        } else if x > MAX_SIGMOID {
            1.0
        } else {
            let i = ((x + MAX_SIGMOID) * SIGMOID_TABLE_SIZE as f32 / MAX_SIGMOID / 2.0) as usize;
            self.0[i]
        }
    }
}

// Tree nodes are scored without the lookup table.
#[inline(always)]
fn exact_sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Clone, Copy, Debug)]
struct Node {
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
    count: i64,
    binary: bool,
}

/// Huffman tree over the labels.
///
/// Leaves `0..nlabels` are the labels. Internal node `n` scores with output row
/// `n - nlabels`. The right child of every node is its binary branch.
pub struct HuffmanTree {
    nodes: Vec<Node>,
    nlabels: usize,
}

impl HuffmanTree {
    /// Builds the tree from label frequencies.
    ///
    /// Frequencies are expected in descending order, as stored in a model.
    pub fn new(counts: &[i64]) -> Self {
        let nlabels = counts.len();
        if nlabels == 0 {
            return Self {
                nodes: vec![],
                nlabels,
            };
        }
        let mut nodes = vec![
            Node {
                parent: None,
                left: None,
                right: None,
                count: UNMERGED_COUNT,
                binary: false,
            };
            2 * nlabels - 1
        ];
        for (node, &count) in nodes.iter_mut().zip(counts) {
            node.count = count;
        }
        let mut leaf = nlabels as isize - 1;
        let mut node = nlabels;
        for i in nlabels..2 * nlabels - 1 {
            let mut mini = [0; 2];
            for m in &mut mini {
                if leaf >= 0 && nodes[leaf as usize].count < nodes[node].count {
                    *m = leaf as usize;
                    leaf -= 1;
                } else {
                    *m = node;
                    node += 1;
                }
            }
            nodes[i].left = Some(mini[0]);
            nodes[i].right = Some(mini[1]);
            nodes[i].count = nodes[mini[0]].count + nodes[mini[1]].count;
            nodes[mini[0]].parent = Some(i);
            nodes[mini[1]].parent = Some(i);
            nodes[mini[1]].binary = true;
        }
        Self { nodes, nlabels }
    }

    fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    // Internal nodes and branch directions from the root down to `label`.
    fn path(&self, label: usize) -> Vec<(usize, bool)> {
        let mut path = vec![];
        let mut n = label;
        while let Some(p) = self.nodes[n].parent {
            path.push((p, self.nodes[n].binary));
            n = p;
        }
        path.reverse();
        path
    }
}

enum Loss {
    Softmax,
    HierarchicalSoftmax(HuffmanTree),
    // Negative sampling and one-vs-all share the same binary logistic scoring.
    BinaryLogistic(LossName),
}

/// Turns a hidden vector into label log-probabilities.
///
/// The loss is resolved once when the model is loaded.
pub struct ScoringModel {
    loss: Loss,
    nlabels: usize,
    sigmoid: SigmoidTable,
}

impl ScoringModel {
    /// Creates a scoring model.
    ///
    /// # Arguments
    ///
    /// * `loss` - Loss the model was trained with.
    /// * `label_counts` - Label frequencies in label id order.
    /// * `output` - Output matrix of the model.
    ///
    /// # Errors
    ///
    /// If `output` has too few rows for the labels, an error variant will be returned.
    pub fn new(loss: LossName, label_counts: &[i64], output: &DenseMatrix) -> Result<Self> {
        let nlabels = label_counts.len();
        let required_rows = match loss {
            LossName::HierarchicalSoftmax => nlabels.saturating_sub(1),
            _ => nlabels,
        };
        if output.rows() < required_rows {
            return Err(FastTextError::invalid_model(format!(
                "output matrix has {} rows, {loss} scoring needs {required_rows}",
                output.rows()
            )));
        }
        let loss = match loss {
            LossName::Softmax => Loss::Softmax,
            LossName::HierarchicalSoftmax => Loss::HierarchicalSoftmax(HuffmanTree::new(label_counts)),
            LossName::NegativeSampling | LossName::OneVsAll => Loss::BinaryLogistic(loss),
        };
        Ok(Self {
            loss,
            nlabels,
            sigmoid: SigmoidTable::new(),
        })
    }

    pub fn loss_name(&self) -> LossName {
        match &self.loss {
            Loss::Softmax => LossName::Softmax,
            Loss::HierarchicalSoftmax(_) => LossName::HierarchicalSoftmax,
            Loss::BinaryLogistic(name) => *name,
        }
    }

    pub fn nlabels(&self) -> usize {
        self.nlabels
    }

    /// Returns the Huffman tree when the loss is hierarchical softmax.
    pub fn tree(&self) -> Option<&HuffmanTree> {
        match &self.loss {
            Loss::HierarchicalSoftmax(tree) => Some(tree),
            _ => None,
        }
    }

    fn softmax(&self, output: &DenseMatrix, hidden: &[f32]) -> Vec<f32> {
        let mut probs: Vec<f32> = (0..self.nlabels)
            .map(|i| output.dot_row(hidden, i))
            .collect();
        let Some(&first) = probs.first() else {
            return probs;
        };
        let max = probs.iter().fold(first, |max, &x| x.max(max));
        let mut z = 0.0;
        for p in &mut probs {
            *p = (*p - max).exp();
            z += *p;
        }
        for p in &mut probs {
            *p /= z;
        }
        probs
    }

    /// Log-probability of a single label.
    ///
    /// # Errors
    ///
    /// If `label` is not a valid label id, [`FastTextError::InvalidLabelId`] is returned.
    pub fn score(&self, output: &DenseMatrix, hidden: &[f32], label: usize) -> Result<f32> {
        if label >= self.nlabels {
            return Err(FastTextError::InvalidLabelId(label));
        }
        match &self.loss {
            Loss::Softmax => Ok(std_log(self.softmax(output, hidden)[label])),
            Loss::HierarchicalSoftmax(tree) => {
                let mut score = 0.0;
                for (node, binary) in tree.path(label) {
                    let f = exact_sigmoid(output.dot_row(hidden, node - tree.nlabels));
                    score += if binary { std_log(f) } else { std_log(1.0 - f) };
                }
                Ok(score)
            }
            Loss::BinaryLogistic(_) => Ok(std_log(
                self.sigmoid.sigmoid(output.dot_row(hidden, label)),
            )),
        }
    }

    /// Pushes the best labels into `heap`.
    ///
    /// Labels whose probability is below `threshold` are skipped.
    pub(crate) fn k_best(
        &self,
        output: &DenseMatrix,
        hidden: &[f32],
        threshold: f32,
        heap: &mut KBest,
    ) {
        match &self.loss {
            Loss::Softmax => {
                let probs = self.softmax(output, hidden);
                Self::push_probs(&probs, threshold, heap);
            }
            Loss::HierarchicalSoftmax(tree) => {
                if self.nlabels > 0 {
                    self.dfs(tree, output, hidden, tree.root(), 0.0, std_log(threshold), heap);
                }
            }
            Loss::BinaryLogistic(_) => {
                let probs: Vec<f32> = (0..self.nlabels)
                    .map(|i| self.sigmoid.sigmoid(output.dot_row(hidden, i)))
                    .collect();
                Self::push_probs(&probs, threshold, heap);
            }
        }
    }

    fn push_probs(probs: &[f32], threshold: f32, heap: &mut KBest) {
        for (label, &p) in probs.iter().enumerate() {
            if p < threshold {
                continue;
            }
            heap.push(std_log(p), label);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        tree: &HuffmanTree,
        output: &DenseMatrix,
        hidden: &[f32],
        node: usize,
        score: f32,
        log_threshold: f32,
        heap: &mut KBest,
    ) {
        if score < log_threshold || !heap.can_enter(score) {
            return;
        }
        let Node { left, right, .. } = tree.nodes[node];
        let (Some(left), Some(right)) = (left, right) else {
            heap.push(score, node);
            return;
        };
        let f = exact_sigmoid(output.dot_row(hidden, node - tree.nlabels));
        self.dfs(tree, output, hidden, left, score + std_log(1.0 - f), log_threshold, heap);
        self.dfs(tree, output, hidden, right, score + std_log(f), log_threshold, heap);
    }
}
