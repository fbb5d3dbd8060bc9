//! Error types for `leadline-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  lead::{OwnerId, PropertyId},
  upstream::UpstreamError,
};

/// A mandatory-field failure. Always detected before any write is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("owner email is required")]
  MissingEmail,

  #[error("property data requires a listing_url")]
  MissingSourceUrl,

  #[error("at least one alert channel is required")]
  EmptyAlertChannels,

  #[error("bulk operation must mark contacted or set a stage")]
  EmptyBulkOp,

  #[error("match score must be between 0 and 100")]
  ScoreOutOfRange,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  ValidationFailed(#[from] ValidationError),

  #[error("owner not found: {0}")]
  OwnerNotFound(OwnerId),

  #[error("property not found: {0}")]
  PropertyNotFound(PropertyId),

  #[error("saved apartment not found: {user_id}/{listing_id}")]
  SavedNotFound { user_id: String, listing_id: String },

  #[error("invalid {pipeline} stage: {value:?}")]
  InvalidStage {
    pipeline: &'static str,
    value:    String,
  },

  #[error("invalid alert match threshold: {0}")]
  InvalidThreshold(u8),

  #[error("upstream unavailable: {0}")]
  UpstreamUnavailable(#[from] UpstreamError),

  #[error("malformed payload: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::ValidationFailed(_) | Self::InvalidThreshold(_) => {
        ErrorKind::ValidationFailed
      }
      Self::OwnerNotFound(_)
      | Self::PropertyNotFound(_)
      | Self::SavedNotFound { .. } => ErrorKind::NotFound,
      Self::InvalidStage { .. } => ErrorKind::InvalidStage,
      Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
      Self::Serialization(_) => ErrorKind::Malformed,
    }
  }
}

/// The discriminant of an error, as reported in bulk reports and API bodies.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  ValidationFailed,
  NotFound,
  InvalidStage,
  UpstreamUnavailable,
  Malformed,
  /// A backend failure unrelated to the request contents.
  Store,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
