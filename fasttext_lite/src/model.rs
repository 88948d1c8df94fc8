use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::args::{Args, ModelName};
use crate::dictionary::Dictionary;
use crate::errors::{FastTextError, Result};
use crate::matrix::{DenseMatrix, EmbeddingTable};

/// Magic number at the head of every model file.
pub const FILEFORMAT_MAGIC: i32 = 793712314;

/// Version written by [`Model::write`].
pub const FILEFORMAT_VERSION: i32 = 12;

// Oldest version that can still be read.
const MIN_FILEFORMAT_VERSION: i32 = 11;

fn read_header<R>(mut rdr: R) -> io::Result<(i32, i32)>
where
    R: Read,
{
    let magic = rdr.read_i32::<LittleEndian>()?;
    let version = rdr.read_i32::<LittleEndian>()?;
    Ok((magic, version))
}

/// Reads the file header and checks that the format can be read.
///
/// Only the magic number and the version are consumed from `rdr`.
///
/// # Errors
///
/// [`FastTextError::IncompatibleFormat`] is returned when the header does not
/// match, including when the input is shorter than the header.
pub fn check_model<R>(mut rdr: R) -> Result<i32>
where
    R: Read,
{
    let (magic, version) = match read_header(&mut rdr) {
        Ok(header) => header,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FastTextError::incompatible_format("file is too short"));
        }
        Err(e) => return Err(e.into()),
    };
    if magic != FILEFORMAT_MAGIC {
        return Err(FastTextError::incompatible_format(format!(
            "unexpected magic number: {magic}"
        )));
    }
    if !(MIN_FILEFORMAT_VERSION..=FILEFORMAT_VERSION).contains(&version) {
        return Err(FastTextError::incompatible_format(format!(
            "unsupported version: {version}"
        )));
    }
    Ok(version)
}

/// Model data.
pub struct Model {
    pub(crate) args: Args,
    pub(crate) dict: Dictionary,
    pub(crate) table: EmbeddingTable,
}

impl Model {
    /// Assembles a model from its parts.
    ///
    /// # Errors
    ///
    /// If the matrix shapes do not agree with `args` and `dict`, an error
    /// variant will be returned.
    pub fn new(
        args: Args,
        dict: Dictionary,
        input: DenseMatrix,
        output: DenseMatrix,
    ) -> Result<Self> {
        if input.cols() != args.dim() {
            return Err(FastTextError::invalid_model(format!(
                "matrix dim {} differs from args dim {}",
                input.cols(),
                args.dim()
            )));
        }
        let required_rows = dict.input_rows();
        if input.rows() < required_rows {
            return Err(FastTextError::invalid_model(format!(
                "input matrix has {} rows, expected {required_rows}",
                input.rows()
            )));
        }
        let table = EmbeddingTable::new(input, output, dict.nwords())?;
        Ok(Self { args, dict, table })
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    pub fn table(&self) -> &EmbeddingTable {
        &self.table
    }

    /// Exports the model data.
    ///
    /// # Arguments
    ///
    /// * `wtr` - Byte-oriented sink object.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_i32::<LittleEndian>(FILEFORMAT_MAGIC)?;
        wtr.write_i32::<LittleEndian>(FILEFORMAT_VERSION)?;
        self.args.serialize(&mut wtr)?;
        self.dict.serialize(&mut wtr)?;
        wtr.write_u8(0)?;
        self.table.input.serialize(&mut wtr)?;
        wtr.write_u8(0)?;
        self.table.output.serialize(&mut wtr)?;
        Ok(())
    }

    /// Creates a model from a reader.
    ///
    /// The header is checked with [`check_model`] before anything else is read.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Returns
    ///
    /// A model data read from `rdr`.
    ///
    /// # Errors
    ///
    /// When the header is not compatible, [`FastTextError::IncompatibleFormat`]
    /// is returned. When `rdr` generates an error, it will be returned as is.
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let version = check_model(&mut rdr)?;
        let mut args = Args::deserialize(&mut rdr)?;
        if version == 11 && args.model == ModelName::Supervised {
            tracing::warn!("version 11 supervised model, ignoring character n-grams");
            args.maxn = 0;
        }
        let dict = Dictionary::deserialize(&args, &mut rdr)?;
        if rdr.read_u8()? != 0 {
            return Err(FastTextError::incompatible_format(
                "quantized input matrices are not supported",
            ));
        }
        let input = DenseMatrix::deserialize(&mut rdr)?;
        if rdr.read_u8()? != 0 {
            return Err(FastTextError::incompatible_format(
                "quantized output matrices are not supported",
            ));
        }
        let output = DenseMatrix::deserialize(&mut rdr)?;
        Self::new(args, dict, input, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::sports_model;

    #[test]
    fn test_check_model_bad_magic() {
        let mut buf = vec![];
        buf.extend_from_slice(&1234i32.to_le_bytes());
        buf.extend_from_slice(&12i32.to_le_bytes());

        assert_eq!(
            "IncompatibleFormatError: unexpected magic number: 1234",
            &check_model(&buf[..]).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_check_model_future_version() {
        let mut buf = vec![];
        buf.extend_from_slice(&FILEFORMAT_MAGIC.to_le_bytes());
        buf.extend_from_slice(&13i32.to_le_bytes());

        assert_eq!(
            "IncompatibleFormatError: unsupported version: 13",
            &check_model(&buf[..]).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_check_model_short() {
        assert_eq!(
            "IncompatibleFormatError: file is too short",
            &check_model(&[0x3a, 0x00][..]).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_write_read() {
        let model = sports_model();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();

        assert_eq!(FILEFORMAT_VERSION, check_model(&buf[..]).unwrap());
        let restored = Model::read(&buf[..]).unwrap();
        assert_eq!(model.args().dim(), restored.args().dim());
        assert_eq!(model.args().loss(), restored.args().loss());
        assert_eq!(model.args().bucket(), restored.args().bucket());
        assert_eq!(model.table(), restored.table());
        assert_eq!(
            model.dictionary().labels().collect::<Vec<_>>(),
            restored.dictionary().labels().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_read_quantized() {
        let model = sports_model();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        let mut header = vec![];
        model.args.serialize(&mut header).unwrap();
        let mut dict = vec![];
        model.dict.serialize(&mut dict).unwrap();
        buf[8 + header.len() + dict.len()] = 1;

        assert_eq!(
            "IncompatibleFormatError: quantized input matrices are not supported",
            &Model::read(&buf[..]).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_read_huge_matrix_header() {
        let model = sports_model();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        let mut header = vec![];
        model.args.serialize(&mut header).unwrap();
        let mut dict = vec![];
        model.dict.serialize(&mut dict).unwrap();
        buf.truncate(8 + header.len() + dict.len() + 1);
        buf.extend_from_slice(&(1i64 << 62).to_le_bytes());
        buf.extend_from_slice(&1i64.to_le_bytes());

        assert_eq!(
            "InvalidModelError: matrix is too large",
            &Model::read(&buf[..]).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_read_version_11_supervised_drops_ngrams() {
        let args = Args::supervised()
            .with_dim(2)
            .unwrap()
            .with_subwords(3, 6, 10)
            .unwrap();
        let dict = Dictionary::new(&args, [("a", 1)], [("__label__x", 1)]).unwrap();
        let model = Model::new(
            args,
            dict,
            DenseMatrix::zeros(11, 2),
            DenseMatrix::zeros(1, 2),
        )
        .unwrap();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        buf[4..8].copy_from_slice(&11i32.to_le_bytes());

        let restored = Model::read(&buf[..]).unwrap();

        assert_eq!(0, restored.args().maxn());
        assert!(restored.dictionary().subword_buckets_of("abc").is_empty());
    }

    #[test]
    fn test_new_dim_mismatch() {
        let args = Args::supervised().with_dim(3).unwrap();
        let dict = Dictionary::new(&args, [("a", 1)], [("__label__x", 1)]).unwrap();

        let model = Model::new(args, dict, DenseMatrix::zeros(1, 2), DenseMatrix::zeros(1, 2));

        assert_eq!(
            "InvalidModelError: matrix dim 2 differs from args dim 3",
            &model.err().unwrap().to_string()
        );
    }
}
