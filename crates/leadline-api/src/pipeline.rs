//! Read-only pipeline projections.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/pipeline/:kind/board` | `kind` is `sales` or `chatbot` |
//! | `GET`  | `/pipeline/:kind/table` | Accepts the [`OwnerQuery`] filters |
//! | `GET`  | `/pipeline/summary` | Header counters |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use leadline_core::{
  pipeline::{self, CrmSummary, OwnerRow, PipelineBoard},
  stage::PipelineKind,
  store::OwnerQuery,
};

use crate::{ApiState, Backend, error::ApiError};

/// `GET /pipeline/:kind/board`
pub async fn board<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(kind): Path<PipelineKind>,
) -> Result<Json<PipelineBoard>, ApiError> {
  let owners = state
    .store
    .list_owners(&OwnerQuery::default())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(pipeline::board(&owners, kind)))
}

/// `GET /pipeline/:kind/table[?<owner filters>]`
pub async fn table<S: Backend>(
  State(state): State<ApiState<S>>,
  Path(kind): Path<PipelineKind>,
  Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<OwnerRow>>, ApiError> {
  let owners = state
    .store
    .list_owners(&query)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(pipeline::table(&owners, kind)))
}

/// `GET /pipeline/summary`
pub async fn summary<S: Backend>(
  State(state): State<ApiState<S>>,
) -> Result<Json<CrmSummary>, ApiError> {
  let owners = state
    .store
    .list_owners(&OwnerQuery::default())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(pipeline::summary(&owners)))
}
