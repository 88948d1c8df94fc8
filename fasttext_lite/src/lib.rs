//! # fasttext_lite
//!
//! Inference and model management for fastText text classification and
//! embedding models.
//!
//! ## Examples
//!
//! ```no_run
//! use std::io::{prelude::*, stdin};
//!
//! use fasttext_lite::ModelStore;
//!
//! let store = ModelStore::new();
//! store.load_model("model.bin").unwrap();
//!
//! for line in stdin().lock().lines() {
//!     let labels = store.predict(&line.unwrap(), 1).unwrap();
//!     println!("{}", labels.join(" "));
//! }
//! ```
//!
//! Models are read with [`Model::read`] and can be served directly by a
//! [`Predictor`] when no reloading is needed.

mod args;
mod command;
mod dictionary;
mod errors;
mod loss;
mod matrix;
mod model;
mod predictor;
mod store;
mod utils;

#[cfg(test)]
mod test_utils;

pub use args::{Args, LossName, ModelName};
pub use command::{run, TrainingDriver, PROGRAM_NAME};
pub use dictionary::{Dictionary, EntryType, Line, EOS};
pub use errors::{FastTextError, InvalidArgumentError, Result};
pub use loss::{HuffmanTree, ScoringModel};
pub use matrix::{DenseMatrix, EmbeddingTable};
pub use model::{check_model, Model, FILEFORMAT_MAGIC, FILEFORMAT_VERSION};
pub use predictor::{Predictor, ProbLabel, TestReport};
pub use store::{check_model_file, ModelState, ModelStore};
