use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{FastTextError, Result};

// Number of values read at a time.
const READ_CHUNK_LEN: usize = 1 << 16;

/// Row-major matrix of `f32`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    /// Creates a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// If `data.len() != rows * cols`, an error variant will be returned.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(FastTextError::invalid_argument(
                "data",
                format!("expected {rows}x{cols} values, got {}", data.len()),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns a view of the `i`-th row, or `None` if out of range.
    #[inline]
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        (i < self.rows).then(|| &self.data[i * self.cols..(i + 1) * self.cols])
    }

    /// Dot product of row `i` and `vec`, accumulated left to right.
    #[inline]
    pub(crate) fn dot_row(&self, vec: &[f32], i: usize) -> f32 {
        let row = &self.data[i * self.cols..(i + 1) * self.cols];
        let mut d = 0.0;
        for (a, b) in row.iter().zip(vec) {
            d += a * b;
        }
        d
    }

    #[inline]
    pub(crate) fn add_row_to(&self, vec: &mut [f32], i: usize) {
        let row = &self.data[i * self.cols..(i + 1) * self.cols];
        for (v, w) in vec.iter_mut().zip(row) {
            *v += w;
        }
    }

    pub(crate) fn serialize<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_i64::<LittleEndian>(self.rows.try_into()?)?;
        wtr.write_i64::<LittleEndian>(self.cols.try_into()?)?;
        for &x in &self.data {
            wtr.write_f32::<LittleEndian>(x)?;
        }
        Ok(())
    }

    pub(crate) fn deserialize<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let rows = usize::try_from(rdr.read_i64::<LittleEndian>()?)?;
        let cols = usize::try_from(rdr.read_i64::<LittleEndian>()?)?;
        let len = rows
            .checked_mul(cols)
            .filter(|&len| {
                len.checked_mul(core::mem::size_of::<f32>())
                    .map_or(false, |bytes| bytes <= isize::MAX as usize)
            })
            .ok_or_else(|| FastTextError::invalid_model("matrix is too large"))?;

        // The buffer grows as data arrives, so a truncated file never
        // allocates the declared size.
        let mut data = Vec::with_capacity(len.min(READ_CHUNK_LEN));
        let mut chunk = vec![0.0; len.min(READ_CHUNK_LEN)];
        while data.len() < len {
            let n = (len - data.len()).min(READ_CHUNK_LEN);
            rdr.read_f32_into::<LittleEndian>(&mut chunk[..n])?;
            data.extend_from_slice(&chunk[..n]);
        }
        Ok(Self { rows, cols, data })
    }
}

/// Input and output matrices of a model.
///
/// Input rows are indexed by word id, followed by `bucket` rows for hashed
/// n-grams. Output rows are indexed by label id, or by internal tree node for
/// hierarchical softmax.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingTable {
    pub(crate) input: DenseMatrix,
    pub(crate) output: DenseMatrix,
    vocab_size: usize,
}

impl EmbeddingTable {
    /// Creates a new table.
    ///
    /// # Arguments
    ///
    /// * `input` - Input matrix of `(vocab_size + bucket) × dim`.
    /// * `output` - Output matrix with `dim` columns.
    /// * `vocab_size` - Number of words.
    ///
    /// # Errors
    ///
    /// If the matrices disagree on `dim`, or the input matrix is smaller than
    /// the vocabulary, an error variant will be returned.
    pub fn new(input: DenseMatrix, output: DenseMatrix, vocab_size: usize) -> Result<Self> {
        if input.cols() != output.cols() {
            return Err(FastTextError::invalid_model(format!(
                "input dim {} differs from output dim {}",
                input.cols(),
                output.cols()
            )));
        }
        if input.rows() < vocab_size {
            return Err(FastTextError::invalid_model(format!(
                "input matrix has {} rows for {vocab_size} words",
                input.rows()
            )));
        }
        Ok(Self {
            input,
            output,
            vocab_size,
        })
    }

    pub fn dim(&self) -> usize {
        self.input.cols()
    }

    /// Number of words with a dedicated input row.
    pub fn size(&self) -> usize {
        self.vocab_size
    }

    /// Returns the input vector at `id`.
    pub fn vector_of(&self, id: usize) -> Option<&[f32]> {
        self.input.row(id)
    }

    pub fn input(&self) -> &DenseMatrix {
        &self.input
    }

    pub fn output(&self) -> &DenseMatrix {
        &self.output
    }

    /// Averages input rows into `hidden`.
    ///
    /// `hidden` is zeroed first and stays zero when `ids` is empty.
    pub(crate) fn average_into(&self, ids: &[usize], hidden: &mut [f32]) {
        hidden.fill(0.0);
        if ids.is_empty() {
            return;
        }
        for &id in ids {
            self.input.add_row_to(hidden, id);
        }
        let scale = 1.0 / ids.len() as f32;
        for h in hidden.iter_mut() {
            *h *= scale;
        }
    }
}
