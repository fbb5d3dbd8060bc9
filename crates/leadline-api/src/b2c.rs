//! Consumer-side endpoints: preferences, alerts and saved apartments.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/b2c/users/:user_id/preferences` | Defaults when never written |
//! | `PUT`    | `/b2c/users/:user_id/preferences` | Body: [`PreferencesPatch`]; upsert |
//! | `GET`    | `/b2c/users/:user_id/alerts` | Every recorded pair |
//! | `POST`   | `/b2c/users/:user_id/alerts/evaluate` | Body: `{"listing": {..}, "external_rank": 0.8}` |
//! | `POST`   | `/b2c/users/:user_id/alerts/:listing_id/ignore` | Sticky suppression |
//! | `POST`   | `/b2c/alerts/pending` | `?flush_digest=true` also sends digest items |
//! | `GET`    | `/b2c/users/:user_id/saved` | Newest first |
//! | `POST`   | `/b2c/users/:user_id/saved` | Body: `{"listing": {..}}` plus [`SaveOptions`] fields |
//! | `GET`    | `/b2c/users/:user_id/saved/:listing_id` | 404 if not saved |
//! | `PATCH`  | `/b2c/users/:user_id/saved/:listing_id` | Body: [`SavedPatch`] |
//! | `DELETE` | `/b2c/users/:user_id/saved/:listing_id` | 204, or 404 if not saved |
//! | `POST`   | `/b2c/users/:user_id/saved/:listing_id/messages` | Body: [`NewSavedMessage`] |
//! | `POST`   | `/b2c/users/:user_id/saved/:listing_id/timeline` | Body: [`NewTimelineEntry`] |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use leadline_core::{
  Error,
  alert::{AlertRecord, Delivery, Evaluation},
  b2c::{
    Listing, NewSavedMessage, PreferencesPatch, SaveOptions, SavedApartment, SavedPatch,
    UserPreferences,
  },
  log::NewTimelineEntry,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{ApiState, Backend, error::ApiError};

fn saved_not_found(user_id: String, listing_id: String) -> Error {
  Error::SavedNotFound { user_id, listing_id }
}

// ─── Preferences ──────────────────────────────────────────────────────────────

/// `GET /b2c/users/:user_id/preferences`
pub async fn get_preferences<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<UserPreferences>, ApiError> {
  let prefs = state
    .store
    .get_preferences(user_id.clone())
    .await
    .map_err(ApiError::from_store)?
    .unwrap_or_else(|| UserPreferences::new(user_id, Utc::now()));
  Ok(Json(prefs))
}

/// `PUT /b2c/users/:user_id/preferences`
///
/// Parsed from a raw value so that an unsupported threshold or channel comes
/// back as a typed 400 rather than an extractor rejection.
pub async fn upsert_preferences<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<String>,
  Json(body): Json<Value>,
) -> Result<Json<UserPreferences>, ApiError> {
  let patch: PreferencesPatch = serde_json::from_value(body).map_err(Error::from)?;
  let prefs = state
    .store
    .upsert_preferences(user_id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(prefs))
}

// ─── Alerts ───────────────────────────────────────────────────────────────────

/// `GET /b2c/users/:user_id/alerts`
pub async fn list_alerts<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Vec<AlertRecord>>, ApiError> {
  let alerts = state
    .store
    .list_alerts(user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(alerts))
}

#[derive(Debug, Deserialize)]
pub struct EvaluateBody {
  pub listing:       Listing,
  /// Soft rank from an external search service, 0..=1. Overrides the
  /// built-in voice-context rank.
  pub external_rank: Option<f64>,
}

/// `POST /b2c/users/:user_id/alerts/evaluate`
pub async fn evaluate<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<String>,
  Json(body): Json<EvaluateBody>,
) -> Result<Json<Evaluation>, ApiError> {
  let evaluation = state
    .gate
    .evaluate(&user_id, &body.listing, body.external_rank)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(evaluation))
}

/// `POST /b2c/users/:user_id/alerts/:listing_id/ignore`
pub async fn ignore<S: Backend>(
  State(state): State<ApiState<S>>,
  Path((user_id, listing_id)): Path<(String, String)>,
) -> Result<Json<AlertRecord>, ApiError> {
  let record = state
    .gate
    .ignore(&user_id, &listing_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingParams {
  #[serde(default)]
  pub flush_digest: bool,
}

/// `POST /b2c/alerts/pending[?flush_digest=true]`, called by the scheduler.
pub async fn pending<S: Backend>(
  State(state): State<ApiState<S>>,
  Query(params): Query<PendingParams>,
) -> Result<Json<Vec<Delivery>>, ApiError> {
  let deliveries = state
    .gate
    .evaluate_pending(params.flush_digest)
    .await
    .map_err(ApiError::from_store)?;
  tracing::info!(
    deliveries = deliveries.len(),
    flush_digest = params.flush_digest,
    "pending alerts evaluated"
  );
  Ok(Json(deliveries))
}

// ─── Saved apartments ─────────────────────────────────────────────────────────

/// `GET /b2c/users/:user_id/saved`
pub async fn list_saved<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Vec<SavedApartment>>, ApiError> {
  let saved = state
    .store
    .list_saved(user_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
pub struct SaveBody {
  pub listing: Listing,
  #[serde(flatten)]
  pub options: SaveOptions,
}

/// `POST /b2c/users/:user_id/saved`
pub async fn save<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(user_id): Path<String>,
  Json(body): Json<SaveBody>,
) -> Result<impl IntoResponse, ApiError> {
  let saved = state
    .store
    .save_listing(user_id, body.listing, body.options)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(saved)))
}

/// `GET /b2c/users/:user_id/saved/:listing_id`
pub async fn get_saved<S: Backend>(
  State(state): State<ApiState<S>>,
  Path((user_id, listing_id)): Path<(String, String)>,
) -> Result<Json<SavedApartment>, ApiError> {
  let saved = state
    .store
    .get_saved(user_id.clone(), listing_id.clone())
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| saved_not_found(user_id, listing_id))?;
  Ok(Json(saved))
}

/// `PATCH /b2c/users/:user_id/saved/:listing_id`
pub async fn update_saved<S: Backend>(
  State(state): State<ApiState<S>>,
  Path((user_id, listing_id)): Path<(String, String)>,
  Json(patch): Json<SavedPatch>,
) -> Result<Json<SavedApartment>, ApiError> {
  let saved = state
    .store
    .update_saved(user_id, listing_id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(saved))
}

/// `DELETE /b2c/users/:user_id/saved/:listing_id`
pub async fn remove_saved<S: Backend>(
  State(state): State<ApiState<S>>,
  Path((user_id, listing_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
  let removed = state
    .store
    .remove_saved(user_id.clone(), listing_id.clone())
    .await
    .map_err(ApiError::from_store)?;
  if !removed {
    return Err(saved_not_found(user_id, listing_id).into());
  }
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /b2c/users/:user_id/saved/:listing_id/messages`
pub async fn append_saved_message<S: Backend>(
  State(state): State<ApiState<S>>,
  Path((user_id, listing_id)): Path<(String, String)>,
  Json(message): Json<NewSavedMessage>,
) -> Result<Json<SavedApartment>, ApiError> {
  let saved = state
    .store
    .append_saved_message(user_id, listing_id, message)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(saved))
}

/// `POST /b2c/users/:user_id/saved/:listing_id/timeline`
pub async fn add_saved_timeline<S: Backend>(
  State(state): State<ApiState<S>>,
  Path((user_id, listing_id)): Path<(String, String)>,
  Json(entry): Json<NewTimelineEntry>,
) -> Result<Json<SavedApartment>, ApiError> {
  let saved = state
    .store
    .add_saved_timeline(user_id, listing_id, entry)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(saved))
}
