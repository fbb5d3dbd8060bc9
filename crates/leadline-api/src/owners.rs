//! Handlers for `/owners` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/owners` | Query: [`OwnerQuery`] |
//! | `POST`  | `/owners` | Body: flat owner + optional property fields; 201 |
//! | `GET`   | `/owners/:id` | 404 if not found |
//! | `PATCH` | `/owners/:id` | Body: [`OwnerPatch`] |
//! | `POST`  | `/owners/:id/properties` | Body: property fields; merges on `listing_url` |
//! | `GET`   | `/owners/:id/timeline` | |
//! | `POST`  | `/owners/:id/timeline` | Body: [`NewTimelineEntry`] |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use leadline_core::{
  Error,
  lead::{NewOwner, NewProperty, Owner, OwnerId, OwnerPatch, Property},
  log::{NewTimelineEntry, TimelineEntry, TimelineTarget},
  store::OwnerQuery,
};
use serde_json::Value;

use crate::{ApiState, Backend, error::ApiError};

/// `GET /owners[?text=..][&sales_stage=..][&min_viability=..][&city=..][&limit=..][&offset=..]`
pub async fn list<S: Backend>(
  State(state): State<ApiState<S>>,
  Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<Owner>>, ApiError> {
  let owners = state
    .store
    .list_owners(&query)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(owners))
}

/// `POST /owners`
pub async fn create<S: Backend>(
  State(state): State<ApiState<S>>,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
  let input = NewOwner::from_value(body)?;
  let owner = state
    .store
    .create_owner(input)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(owner)))
}

/// `GET /owners/:id`
pub async fn get_one<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<OwnerId>,
) -> Result<Json<Owner>, ApiError> {
  let owner = state
    .store
    .get_owner(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or(Error::OwnerNotFound(id))?;
  Ok(Json(owner))
}

/// `PATCH /owners/:id`
pub async fn update<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<OwnerId>,
  Json(patch): Json<OwnerPatch>,
) -> Result<Json<Owner>, ApiError> {
  let owner = state
    .store
    .update_owner(id, patch)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(owner))
}

/// `POST /owners/:id/properties`
pub async fn add_property<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<OwnerId>,
  Json(body): Json<Value>,
) -> Result<Json<Property>, ApiError> {
  let input = NewProperty::from_value(body)?;
  let property = state
    .store
    .add_property(id, input)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(property))
}

/// `GET /owners/:id/timeline`
pub async fn timeline<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<OwnerId>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError> {
  let entries = state
    .store
    .timeline(TimelineTarget::Owner(id))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entries))
}

/// `POST /owners/:id/timeline`
pub async fn append_timeline<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(id): Path<OwnerId>,
  Json(entry): Json<NewTimelineEntry>,
) -> Result<impl IntoResponse, ApiError> {
  let entry = state
    .store
    .append_timeline(TimelineTarget::Owner(id), entry)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(entry)))
}
