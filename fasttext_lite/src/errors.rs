//! Definition of errors.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = FastTextError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FastTextError {
    /// The model path does not exist.
    #[error("FileNotFoundError: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The model header does not describe a format this crate can read.
    #[error("IncompatibleFormatError: {0}")]
    IncompatibleFormat(String),

    /// A query was issued before a model was loaded.
    #[error("ModelNotLoadedError: no model is loaded")]
    ModelNotLoaded,

    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),

    /// A label id outside the label space reached the scorer.
    #[error("InvalidLabelIdError: {0}")]
    InvalidLabelId(usize),

    /// The header was accepted but the body is inconsistent.
    #[error("InvalidModelError: {0}")]
    InvalidModel(String),

    #[error(transparent)]
    CastError(#[from] std::num::TryFromIntError),

    #[error(transparent)]
    UTF8Error(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl FastTextError {
    pub(crate) fn invalid_model<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidModel(msg.into())
    }

    pub(crate) fn incompatible_format<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::IncompatibleFormat(msg.into())
    }

    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }
}

/// Error used when the argument is invalid.
#[derive(Debug, Error)]
#[error("InvalidArgumentError: {arg}: {msg}")]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl InvalidArgumentError {
    /// Name of the rejected argument.
    pub fn arg(&self) -> &'static str {
        self.arg
    }
}
