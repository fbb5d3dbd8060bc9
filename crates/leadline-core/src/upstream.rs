//! External collaborators: the valuation and message-drafting services.
//!
//! Both are consumed as opaque request/response calls. Neither is ever
//! awaited inside a store transaction; only the result is applied locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  Error,
  lead::{Property, PropertyId, Recommendation},
  store::LeadStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
  #[error("service not configured")]
  NotConfigured,

  #[error("request failed: {0}")]
  Transport(String),

  #[error("service returned status {0}")]
  Status(u16),

  #[error("invalid response: {0}")]
  InvalidResponse(String),
}

// ─── Valuation ───────────────────────────────────────────────────────────────

/// What the valuation service says about a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
  /// 0–10.
  pub viability_score:        f64,
  pub recommendation:         Recommendation,
  pub degree_of_certainty:    String,
  #[serde(default)]
  pub estimated_annual_gross: Option<f64>,
}

#[async_trait]
pub trait Valuator: Send + Sync {
  async fn valuate(
    &self,
    property: &Property,
  ) -> Result<ValuationResult, UpstreamError>;
}

/// Outcome of [`revalue`]. On upstream failure `property` is the last-known
/// record and `stale` is set.
#[derive(Debug, Clone, Serialize)]
pub struct Valuated {
  pub property: Property,
  pub stale:    bool,
  pub error:    Option<String>,
}

/// Fetch a fresh valuation and cache it on the property.
///
/// The upstream call runs with no store transaction open. A failed or
/// out-of-range valuation leaves the cached fields untouched.
pub async fn revalue<S: LeadStore>(
  store: &S,
  valuator: &dyn Valuator,
  id: PropertyId,
) -> Result<Valuated, S::Error> {
  let property = store
    .get_property(id)
    .await?
    .ok_or_else(|| S::Error::from(Error::PropertyNotFound(id)))?;

  let outcome = valuator.valuate(&property).await.and_then(|v| {
    if (0.0..=10.0).contains(&v.viability_score) {
      Ok(v)
    } else {
      Err(UpstreamError::InvalidResponse(format!(
        "viability score {} outside 0-10",
        v.viability_score
      )))
    }
  });

  match outcome {
    Ok(result) => {
      let property = store.apply_valuation(id, result).await?;
      Ok(Valuated { property, stale: false, error: None })
    }
    Err(e) => {
      tracing::warn!(property_id = id, error = %e, "valuation unavailable, keeping cached score");
      Ok(Valuated { property, stale: true, error: Some(e.to_string()) })
    }
  }
}

// ─── Drafting ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactGoal {
  BookCall,
  #[default]
  BookViewing,
  RequestInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftProfile {
  pub name: Option<String>,
  pub tone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
  /// CRM property id or consumer listing id, opaque to the drafter.
  pub property_id:  String,
  #[serde(default)]
  pub address:      Option<String>,
  #[serde(default)]
  pub contact_goal: ContactGoal,
  #[serde(default)]
  pub user_profile: DraftProfile,
}

/// Best effort: callers fall back to their own template on error.
#[async_trait]
pub trait Drafter: Send + Sync {
  async fn draft(&self, request: &DraftRequest) -> Result<String, UpstreamError>;
}

/// Stand-in for an unconfigured service; every call fails with
/// [`UpstreamError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl Valuator for Unconfigured {
  async fn valuate(&self, _: &Property) -> Result<ValuationResult, UpstreamError> {
    Err(UpstreamError::NotConfigured)
  }
}

#[async_trait]
impl Drafter for Unconfigured {
  async fn draft(&self, _: &DraftRequest) -> Result<String, UpstreamError> {
    Err(UpstreamError::NotConfigured)
  }
}
