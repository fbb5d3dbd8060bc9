//! Error type for `leadline-store-sqlite`.

use leadline_core::{ErrorKind, store::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] leadline_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum column held a value this build does not know.
  #[error("unrecognised {column} value: {value:?}")]
  UnknownValue {
    column: &'static str,
    value:  String,
  },
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      _ => ErrorKind::Store,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
