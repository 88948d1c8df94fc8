use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::args::Args;
use crate::dictionary::Dictionary;
use crate::matrix::DenseMatrix;
use crate::model::Model;

/// Two-label softmax model where "team" and "won" point to sports and "vote"
/// points to politics.
pub fn sports_model() -> Model {
    let args = Args::supervised().with_dim(2).unwrap();
    let dict = Dictionary::new(
        &args,
        [("the", 10), ("team", 4), ("won", 3), ("vote", 2)],
        [("__label__sports", 7), ("__label__politics", 3)],
    )
    .unwrap();
    let input = DenseMatrix::from_vec(4, 2, vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0]).unwrap();
    let output = DenseMatrix::from_vec(2, 2, vec![2.0, 0.0, 0.0, 2.0]).unwrap();
    Model::new(args, dict, input, output).unwrap()
}

/// Softmax model with character n-grams in 3..=4 and 64 buckets.
pub fn subword_model() -> Model {
    let args = Args::supervised()
        .with_dim(3)
        .unwrap()
        .with_subwords(3, 4, 64)
        .unwrap();
    let dict = Dictionary::new(
        &args,
        [("the", 10), ("team", 4)],
        [("__label__sports", 7), ("__label__politics", 3)],
    )
    .unwrap();
    let n_rows = dict.nwords() + dict.bucket();
    let input = DenseMatrix::from_vec(
        n_rows,
        3,
        (0..n_rows * 3).map(|i| (i % 7) as f32 * 0.1 + 0.05).collect(),
    )
    .unwrap();
    let output = DenseMatrix::from_vec(2, 3, vec![1.0, 0.5, -0.5, -1.0, 0.2, 0.3]).unwrap();
    Model::new(args, dict, input, output).unwrap()
}

/// Writes `model` to `dir/name` and returns the path.
pub fn write_model(model: &Model, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut f = BufWriter::new(File::create(&path).unwrap());
    model.write(&mut f).unwrap();
    f.flush().unwrap();
    path
}
