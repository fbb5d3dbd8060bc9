//! Handlers for `/properties` endpoints and message drafting.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/properties/:id` | 404 if not found |
//! | `PATCH` | `/properties/:id` | Body: [`PropertyPatch`]; unknown stage labels are 400 |
//! | `POST`  | `/properties/:id/transfer` | Body: `{"owner_id": 2}` |
//! | `POST`  | `/properties/:id/valuation` | Re-runs the valuation service; falls back to the cached score |
//! | `GET`   | `/properties/:id/conversations` | Optional `?channel`, `?search_text` |
//! | `POST`  | `/properties/:id/conversations` | Body: [`NewConversationEntry`]; returns 201 + `{"id"}` |
//! | `GET`   | `/properties/:id/timeline` | |
//! | `POST`  | `/properties/:id/timeline` | Body: [`NewTimelineEntry`] |
//! | `POST`  | `/draft` | Body: [`DraftRequest`]; 503 when the drafting service fails |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use leadline_core::{
  Error,
  lead::{OwnerId, Property, PropertyId, PropertyPatch},
  log::{
    ConversationEntry, ConversationFilter, NewConversationEntry, NewTimelineEntry,
    TimelineEntry, TimelineTarget,
  },
  upstream::{DraftRequest, Valuated, revalue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{ApiState, Backend, error::ApiError};

/// `GET /properties/:id`
pub async fn get_one<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
) -> Result<Json<Property>, ApiError> {
  let property = state
    .store
    .get_property(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or(Error::PropertyNotFound(id))?;
  Ok(Json(property))
}

/// `PATCH /properties/:id`
pub async fn update<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
  Json(body): Json<Value>,
) -> Result<Json<Property>, ApiError> {
  let patch = PropertyPatch::from_value(body)?;
  let property = state
    .store
    .update_property(id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(property))
}

#[derive(Debug, Deserialize)]
pub struct TransferBody {
  pub owner_id: OwnerId,
}

/// `POST /properties/:id/transfer`
pub async fn transfer<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
  Json(body): Json<TransferBody>,
) -> Result<Json<Property>, ApiError> {
  let property = state
    .store
    .transfer_property(id, body.owner_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(property))
}

/// `POST /properties/:id/valuation`
///
/// Always 200 for a known property; `stale: true` means the service failed
/// and the cached valuation is returned.
pub async fn valuate<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
) -> Result<Json<Valuated>, ApiError> {
  let outcome = revalue(state.store.as_ref(), state.valuator.as_ref(), id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(outcome))
}

/// `GET /properties/:id/conversations[?channel=..][&search_text=..]`
pub async fn conversations<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
  Query(filter): Query<ConversationFilter>,
) -> Result<Json<Vec<ConversationEntry>>, ApiError> {
  let entries = state
    .store
    .conversations(id, &filter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entries))
}

/// `POST /properties/:id/conversations`
pub async fn append_conversation<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
  Json(entry): Json<NewConversationEntry>,
) -> Result<impl IntoResponse, ApiError> {
  let entry_id = state
    .store
    .append_conversation(id, entry)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(json!({ "id": entry_id }))))
}

/// `GET /properties/:id/timeline`
pub async fn timeline<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError> {
  let entries = state
    .store
    .timeline(TimelineTarget::Property(id))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entries))
}

/// `POST /properties/:id/timeline`
pub async fn append_timeline<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<PropertyId>,
  Json(entry): Json<NewTimelineEntry>,
) -> Result<impl IntoResponse, ApiError> {
  let entry = state
    .store
    .append_timeline(TimelineTarget::Property(id), entry)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Serialize)]
pub struct Draft {
  pub text: String,
}

/// `POST /draft`
pub async fn draft<S: Backend>(
  State(state): State<ApiState<S>>,
  Json(request): Json<DraftRequest>,
) -> Result<Json<Draft>, ApiError> {
  let text = state.drafter.draft(&request).await.map_err(|e| {
    tracing::warn!(property_id = %request.property_id, error = %e, "drafting failed");
    Error::UpstreamUnavailable(e)
  })?;
  Ok(Json(Draft { text }))
}
