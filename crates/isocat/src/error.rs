use std::path::PathBuf;

/// Coarse classification of a build failure. Every [Error] maps onto exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A name, record or table would not fit the field the standard allots to it.
  EncodingOverflow,
  /// The source could not be read or the destination could not be written.
  IoFailure,
  /// The build was stopped through an abort signal.
  Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("walkdir error: {0}")]
  WalkDir(#[from] walkdir::Error),
  #[error("Not a file: {0}")]
  NotAFile(PathBuf),
  #[error("Not a directory: {0}")]
  NotADirectory(PathBuf),
  #[error("Encoding overflow: {what} needs {length} bytes")]
  EncodingOverflow { what: String, length: usize },
  #[error("Too many directories for a path table: {0}")]
  TooManyDirectories(usize),
  #[error("File too large for a single extent: {name} ({length} bytes)")]
  FileTooLarge { name: String, length: u64 },
  #[error("Content of {name} is {actual} bytes, expected {expected}")]
  ContentLength {
    name: String,
    expected: u64,
    actual: u64,
  },
  #[error("Aborted by user")]
  Cancelled,
}

impl Error {
  pub(crate) fn overflow(what: impl Into<String>, length: usize) -> Self {
    Error::EncodingOverflow {
      what: what.into(),
      length,
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::EncodingOverflow { .. } | Error::TooManyDirectories(_) | Error::FileTooLarge { .. } => {
        ErrorKind::EncodingOverflow
      }
      Error::Io(_)
      | Error::WalkDir(_)
      | Error::NotAFile(_)
      | Error::NotADirectory(_)
      | Error::ContentLength { .. } => ErrorKind::IoFailure,
      Error::Cancelled => ErrorKind::Cancelled,
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;
