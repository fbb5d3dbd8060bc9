//! `POST /bulk`: apply one operation to many owners.
//!
//! Body: `{"owner_ids": [1, 2], "mark_contacted": true}` and/or
//! `"set_stage": {"pipeline": "sales", "stage": "Contacted"}`.
//!
//! Per-owner failures are part of the 200 response, not an error status.
//! A client that disconnects mid-run drops the future between owners; owners
//! already committed stay committed.

use std::sync::atomic::AtomicBool;

use axum::{Json, extract::State};
use leadline_core::bulk::{BulkReport, BulkRequest, bulk_update};
use serde_json::Value;

use crate::{ApiState, Backend, error::ApiError};

pub async fn handler<S: Backend>(
  State(state): State<ApiState<S>>,
  Json(body): Json<Value>,
) -> Result<Json<BulkReport>, ApiError> {
  let request = BulkRequest::from_value(body)?;
  let report = bulk_update(
    state.store.as_ref(),
    &request.owner_ids,
    &request.op,
    &AtomicBool::new(false),
  )
  .await?;
  Ok(Json(report))
}
