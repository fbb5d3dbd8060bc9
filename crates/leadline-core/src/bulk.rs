//! Bulk operations over many owners.
//!
//! The unit of atomicity is one owner: either every property of that owner
//! takes the operation or none does. Owners are independent of each other,
//! so a failure on one never rolls back another.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  error::{ErrorKind, ValidationError},
  lead::{OwnerId, Property, PropertyChange, set_stage},
  stage::{ChatbotStage, StageValue, check_stage_fields},
  store::{LeadStore, StoreError},
};

/// The change applied to each property of each targeted owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkOp {
  /// Advance the chatbot track out of `No Contact`.
  pub mark_contacted: bool,
  pub set_stage:      Option<StageValue>,
}

impl BulkOp {
  pub fn validate(&self) -> Result<()> {
    if !self.mark_contacted && self.set_stage.is_none() {
      return Err(ValidationError::EmptyBulkOp.into());
    }
    Ok(())
  }

  /// Apply to one property in place. `set_stage` goes first, so a bulk
  /// request that sets the chatbot track and marks contacted in one go sees
  /// the new stage.
  pub fn apply(&self, p: &mut Property) -> Result<PropertyChange> {
    let mut change = PropertyChange::default();
    match self.set_stage {
      Some(StageValue::Sales(stage)) => {
        change.record(set_stage(&mut p.sales_pipeline_stage, stage));
      }
      Some(StageValue::Chatbot(stage)) => {
        change.record(set_stage(&mut p.chatbot_pipeline_stage, stage));
      }
      None => {}
    }
    if self.mark_contacted
      && p.chatbot_pipeline_stage.require()? == ChatbotStage::NoContact
    {
      change.record(set_stage(
        &mut p.chatbot_pipeline_stage,
        ChatbotStage::FirstMessageSent,
      ));
    }
    Ok(change)
  }
}

/// `POST /bulk` body: the target owners plus the operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkRequest {
  pub owner_ids: BTreeSet<OwnerId>,
  #[serde(flatten)]
  pub op:        BulkOp,
}

impl BulkRequest {
  pub fn from_value(payload: serde_json::Value) -> Result<Self> {
    check_stage_fields(&payload)?;
    let request: Self = serde_json::from_value(payload)?;
    request.op.validate()?;
    Ok(request)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
  pub kind:    ErrorKind,
  pub message: String,
}

/// Per-owner outcome of a bulk run. Every requested id lands in exactly one
/// of the three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
  pub succeeded: BTreeSet<OwnerId>,
  pub failed:    BTreeMap<OwnerId, BulkFailure>,
  /// Not attempted because the run was cancelled first.
  pub skipped:   BTreeSet<OwnerId>,
}

/// Run `op` against each owner in ascending id order.
///
/// Setting `cancel` stops the run between owners; owners already committed
/// stay committed and the rest are reported as skipped.
pub async fn bulk_update<S: LeadStore>(
  store: &S,
  owner_ids: &BTreeSet<OwnerId>,
  op: &BulkOp,
  cancel: &AtomicBool,
) -> Result<BulkReport> {
  op.validate()?;

  let mut report = BulkReport::default();
  for &owner_id in owner_ids {
    if cancel.load(Ordering::Relaxed) {
      report.skipped.insert(owner_id);
      continue;
    }
    match store.apply_bulk_op(owner_id, op).await {
      Ok(_) => {
        report.succeeded.insert(owner_id);
      }
      Err(e) => {
        tracing::warn!(owner_id, error = %e, "bulk operation failed for owner");
        report.failed.insert(owner_id, BulkFailure {
          kind:    e.kind(),
          message: e.to_string(),
        });
      }
    }
  }

  tracing::info!(
    succeeded = report.succeeded.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    "bulk operation finished"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{
    Error,
    lead::fixtures::property,
    stage::{RecordedStage, SalesStage},
  };

  #[test]
  fn empty_op_is_rejected() {
    assert!(matches!(
      BulkOp::default().validate(),
      Err(Error::ValidationFailed(ValidationError::EmptyBulkOp))
    ));
    let err = BulkRequest::from_value(json!({ "owner_ids": [1] })).unwrap_err();
    assert!(matches!(err, Error::ValidationFailed(_)));
  }

  #[test]
  fn request_with_unknown_stage_is_invalid_stage() {
    let err = BulkRequest::from_value(json!({
      "owner_ids": [1, 2],
      "set_stage": { "pipeline": "sales", "stage": "Won" },
    }))
    .unwrap_err();
    assert!(matches!(err, Error::InvalidStage { .. }));
  }

  #[test]
  fn mark_contacted_only_moves_no_contact() {
    let op = BulkOp { mark_contacted: true, set_stage: None };

    let mut fresh = property(1, 1);
    let change = op.apply(&mut fresh).unwrap();
    assert!(change.is_contact());
    assert_eq!(
      fresh.chatbot_pipeline_stage.known(),
      Some(ChatbotStage::FirstMessageSent)
    );

    let mut replied = property(2, 1);
    replied.chatbot_pipeline_stage = ChatbotStage::Replied.into();
    assert!(op.apply(&mut replied).unwrap().is_empty());
    assert_eq!(replied.chatbot_pipeline_stage.known(), Some(ChatbotStage::Replied));
  }

  #[test]
  fn mark_contacted_on_unknown_stage_fails() {
    let op = BulkOp { mark_contacted: true, set_stage: None };
    let mut p = property(1, 1);
    p.chatbot_pipeline_stage = RecordedStage::Unknown("Ghosted".into());
    assert!(matches!(op.apply(&mut p), Err(Error::InvalidStage { .. })));
  }

  #[test]
  fn set_stage_applies_to_the_named_track() {
    let op = BulkOp {
      mark_contacted: false,
      set_stage:      Some(StageValue::Sales(SalesStage::ProposalSent)),
    };
    let mut p = property(1, 1);
    let change = op.apply(&mut p).unwrap();
    assert_eq!(change.transitions.len(), 1);
    assert_eq!(p.sales_pipeline_stage.known(), Some(SalesStage::ProposalSent));
    assert_eq!(p.chatbot_pipeline_stage.known(), Some(ChatbotStage::NoContact));
  }
}
