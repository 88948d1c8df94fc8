//! Hyperparameter record of a model.

use core::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{FastTextError, Result};

/// Loss function a model was trained with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossName {
    HierarchicalSoftmax = 1,
    NegativeSampling = 2,
    Softmax = 3,
    OneVsAll = 4,
}

impl LossName {
    fn from_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(Self::HierarchicalSoftmax),
            2 => Ok(Self::NegativeSampling),
            3 => Ok(Self::Softmax),
            4 => Ok(Self::OneVsAll),
            _ => Err(FastTextError::invalid_model(format!(
                "unknown loss id: {id}"
            ))),
        }
    }

    /// Name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HierarchicalSoftmax => "hs",
            Self::NegativeSampling => "ns",
            Self::Softmax => "softmax",
            Self::OneVsAll => "one-vs-all",
        }
    }
}

impl fmt::Display for LossName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Architecture of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelName {
    Cbow = 1,
    SkipGram = 2,
    Supervised = 3,
}

impl ModelName {
    fn from_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(Self::Cbow),
            2 => Ok(Self::SkipGram),
            3 => Ok(Self::Supervised),
            _ => Err(FastTextError::invalid_model(format!(
                "unknown model id: {id}"
            ))),
        }
    }

    /// Name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cbow => "cbow",
            Self::SkipGram => "sg",
            Self::Supervised => "sup",
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyperparameters.
///
/// Only a subset is persisted in a model file. `lr`, `min_count_label`,
/// `label` and `pretrained_vectors` always carry their default values after a
/// model has been read.
#[derive(Clone, Debug, PartialEq)]
pub struct Args {
    pub(crate) dim: i32,
    pub(crate) ws: i32,
    pub(crate) epoch: i32,
    pub(crate) lr: f64,
    pub(crate) lr_update_rate: i32,
    pub(crate) min_count: i32,
    pub(crate) min_count_label: i32,
    pub(crate) neg: i32,
    pub(crate) word_ngrams: i32,
    pub(crate) loss: LossName,
    pub(crate) model: ModelName,
    pub(crate) bucket: i32,
    pub(crate) minn: i32,
    pub(crate) maxn: i32,
    pub(crate) t: f64,
    pub(crate) label: String,
    pub(crate) pretrained_vectors: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            dim: 100,
            ws: 5,
            epoch: 5,
            lr: 0.05,
            lr_update_rate: 100,
            min_count: 5,
            min_count_label: 0,
            neg: 5,
            word_ngrams: 1,
            loss: LossName::NegativeSampling,
            model: ModelName::SkipGram,
            bucket: 2000000,
            minn: 3,
            maxn: 6,
            t: 1e-4,
            label: "__label__".to_string(),
            pretrained_vectors: String::new(),
        }
    }
}

impl Args {
    /// Defaults of a supervised classifier.
    pub fn supervised() -> Self {
        Self {
            lr: 0.1,
            min_count: 1,
            loss: LossName::Softmax,
            model: ModelName::Supervised,
            bucket: 0,
            minn: 0,
            maxn: 0,
            ..Self::default()
        }
    }

    pub fn dim(&self) -> usize {
        self.dim as usize
    }

    pub fn context_window_size(&self) -> i32 {
        self.ws
    }

    pub fn epoch(&self) -> i32 {
        self.epoch
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn lr_update_rate(&self) -> i32 {
        self.lr_update_rate
    }

    pub fn min_count(&self) -> i32 {
        self.min_count
    }

    pub fn min_count_label(&self) -> i32 {
        self.min_count_label
    }

    pub fn n_sampled_negatives(&self) -> i32 {
        self.neg
    }

    pub fn word_ngrams(&self) -> i32 {
        self.word_ngrams
    }

    pub fn loss(&self) -> LossName {
        self.loss
    }

    pub fn model(&self) -> ModelName {
        self.model
    }

    pub fn bucket(&self) -> i32 {
        self.bucket
    }

    pub fn minn(&self) -> i32 {
        self.minn
    }

    pub fn maxn(&self) -> i32 {
        self.maxn
    }

    pub fn sampling_threshold(&self) -> f64 {
        self.t
    }

    pub fn label_prefix(&self) -> &str {
        &self.label
    }

    pub fn pretrained_vectors(&self) -> &str {
        &self.pretrained_vectors
    }

    /// Sets the vector dimension.
    ///
    /// # Errors
    ///
    /// If `dim` is zero, an error variant will be returned.
    pub fn with_dim(mut self, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(FastTextError::invalid_argument("dim", "must be positive"));
        }
        self.dim = i32::try_from(dim)
            .map_err(|_| FastTextError::invalid_argument("dim", "is too large"))?;
        Ok(self)
    }

    pub fn with_loss(mut self, loss: LossName) -> Self {
        self.loss = loss;
        self
    }

    /// Sets the character n-gram range and the number of hash buckets.
    ///
    /// # Errors
    ///
    /// If `minn > maxn` while n-grams are enabled, an error variant will be returned.
    pub fn with_subwords(mut self, minn: i32, maxn: i32, bucket: i32) -> Result<Self> {
        if maxn > 0 && minn > maxn {
            return Err(FastTextError::invalid_argument(
                "minn",
                "must not exceed maxn",
            ));
        }
        if minn < 0 || maxn < 0 || bucket < 0 {
            return Err(FastTextError::invalid_argument(
                "bucket",
                "n-gram settings must be non-negative",
            ));
        }
        self.minn = minn;
        self.maxn = maxn;
        self.bucket = bucket;
        Ok(self)
    }

    /// Sets the length of word n-grams.
    ///
    /// # Errors
    ///
    /// If `word_ngrams` is not positive, an error variant will be returned.
    pub fn with_word_ngrams(mut self, word_ngrams: i32) -> Result<Self> {
        if word_ngrams <= 0 {
            return Err(FastTextError::invalid_argument(
                "word_ngrams",
                "must be positive",
            ));
        }
        self.word_ngrams = word_ngrams;
        Ok(self)
    }

    pub(crate) fn serialize<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_i32::<LittleEndian>(self.dim)?;
        wtr.write_i32::<LittleEndian>(self.ws)?;
        wtr.write_i32::<LittleEndian>(self.epoch)?;
        wtr.write_i32::<LittleEndian>(self.min_count)?;
        wtr.write_i32::<LittleEndian>(self.neg)?;
        wtr.write_i32::<LittleEndian>(self.word_ngrams)?;
        wtr.write_i32::<LittleEndian>(self.loss as i32)?;
        wtr.write_i32::<LittleEndian>(self.model as i32)?;
        wtr.write_i32::<LittleEndian>(self.bucket)?;
        wtr.write_i32::<LittleEndian>(self.minn)?;
        wtr.write_i32::<LittleEndian>(self.maxn)?;
        wtr.write_i32::<LittleEndian>(self.lr_update_rate)?;
        wtr.write_f64::<LittleEndian>(self.t)?;
        Ok(())
    }

    pub(crate) fn deserialize<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let dim = rdr.read_i32::<LittleEndian>()?;
        let ws = rdr.read_i32::<LittleEndian>()?;
        let epoch = rdr.read_i32::<LittleEndian>()?;
        let min_count = rdr.read_i32::<LittleEndian>()?;
        let neg = rdr.read_i32::<LittleEndian>()?;
        let word_ngrams = rdr.read_i32::<LittleEndian>()?;
        let loss = LossName::from_id(rdr.read_i32::<LittleEndian>()?)?;
        let model = ModelName::from_id(rdr.read_i32::<LittleEndian>()?)?;
        let bucket = rdr.read_i32::<LittleEndian>()?;
        let minn = rdr.read_i32::<LittleEndian>()?;
        let maxn = rdr.read_i32::<LittleEndian>()?;
        let lr_update_rate = rdr.read_i32::<LittleEndian>()?;
        let t = rdr.read_f64::<LittleEndian>()?;
        if dim <= 0 {
            return Err(FastTextError::invalid_model("dim must be positive"));
        }
        if bucket < 0 || minn < 0 || maxn < 0 {
            return Err(FastTextError::invalid_model(
                "n-gram settings must be non-negative",
            ));
        }
        Ok(Self {
            dim,
            ws,
            epoch,
            min_count,
            neg,
            word_ngrams,
            loss,
            model,
            bucket,
            minn,
            maxn,
            lr_update_rate,
            t,
            ..Self::default()
        })
    }
}
