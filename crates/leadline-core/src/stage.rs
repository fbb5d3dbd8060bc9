//! Stage registry: the closed, totally ordered pipelines a property moves
//! through.
//!
//! Declaration order is pipeline order: the derived `Ord` and [`Stage::rank`]
//! both follow it. Stage strings are the human labels ("New Lead", "First
//! Message Sent") and anything else is rejected, never mapped to a default.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{Error, Result, lead::Property};

// ─── Pipelines ───────────────────────────────────────────────────────────────

/// Which of the two independent stage tracks a value belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineKind {
  /// Human sales progress.
  Sales,
  /// Automated outreach progress.
  Chatbot,
}

impl PipelineKind {
  pub fn label(self) -> &'static str {
    match self {
      Self::Sales => "sales",
      Self::Chatbot => "chatbot",
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
pub enum SalesStage {
  #[serde(rename = "New Lead")]
  #[strum(serialize = "New Lead")]
  NewLead,
  Contacted,
  Interested,
  #[serde(rename = "Call Booked")]
  #[strum(serialize = "Call Booked")]
  CallBooked,
  #[serde(rename = "Proposal Sent")]
  #[strum(serialize = "Proposal Sent")]
  ProposalSent,
  #[serde(rename = "Contract Signed")]
  #[strum(serialize = "Contract Signed")]
  ContractSigned,
  Onboarded,
  #[serde(rename = "Active Client")]
  #[strum(serialize = "Active Client")]
  ActiveClient,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
pub enum ChatbotStage {
  #[serde(rename = "No Contact")]
  #[strum(serialize = "No Contact")]
  NoContact,
  #[serde(rename = "First Message Sent")]
  #[strum(serialize = "First Message Sent")]
  FirstMessageSent,
  Replied,
  Interested,
  #[serde(rename = "Call Booked")]
  #[strum(serialize = "Call Booked")]
  CallBooked,
  Closed,
}

impl Default for SalesStage {
  fn default() -> Self { Self::NewLead }
}

impl Default for ChatbotStage {
  fn default() -> Self { Self::NoContact }
}

impl SalesStage {
  /// Stages that count a property as a signed-up client.
  pub fn is_client(self) -> bool {
    matches!(self, Self::Onboarded | Self::ActiveClient)
  }
}

// ─── Stage trait ─────────────────────────────────────────────────────────────

/// Common surface of both stage enumerations.
pub trait Stage:
  Copy + Ord + fmt::Display + FromStr + IntoEnumIterator + Send + Sync + 'static
{
  const PIPELINE: PipelineKind;

  /// Position in the pipeline; 0 is the entry stage.
  fn rank(self) -> usize;

  /// The recorded value of this pipeline on `property`.
  fn of(property: &Property) -> &RecordedStage<Self>;

  fn into_value(self) -> StageValue;

  /// Parse a stage label, rejecting anything outside the enumeration.
  fn parse(value: &str) -> Result<Self> {
    value.parse().map_err(|_| Error::InvalidStage {
      pipeline: Self::PIPELINE.label(),
      value:    value.to_owned(),
    })
  }

  /// All stages in pipeline order.
  fn all() -> Vec<Self> { Self::iter().collect() }
}

impl Stage for SalesStage {
  const PIPELINE: PipelineKind = PipelineKind::Sales;

  fn rank(self) -> usize { self as usize }

  fn of(property: &Property) -> &RecordedStage<Self> {
    &property.sales_pipeline_stage
  }

  fn into_value(self) -> StageValue { StageValue::Sales(self) }
}

impl Stage for ChatbotStage {
  const PIPELINE: PipelineKind = PipelineKind::Chatbot;

  fn rank(self) -> usize { self as usize }

  fn of(property: &Property) -> &RecordedStage<Self> {
    &property.chatbot_pipeline_stage
  }

  fn into_value(self) -> StageValue { StageValue::Chatbot(self) }
}

// ─── StageValue ──────────────────────────────────────────────────────────────

/// A stage from either pipeline, e.g.
/// `{"pipeline": "sales", "stage": "Call Booked"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "pipeline", content = "stage", rename_all = "lowercase")]
pub enum StageValue {
  Sales(SalesStage),
  Chatbot(ChatbotStage),
}

impl StageValue {
  pub fn parse(pipeline: PipelineKind, value: &str) -> Result<Self> {
    match pipeline {
      PipelineKind::Sales => SalesStage::parse(value).map(Self::Sales),
      PipelineKind::Chatbot => ChatbotStage::parse(value).map(Self::Chatbot),
    }
  }

  pub fn pipeline(self) -> PipelineKind {
    match self {
      Self::Sales(_) => PipelineKind::Sales,
      Self::Chatbot(_) => PipelineKind::Chatbot,
    }
  }
}

impl fmt::Display for StageValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Sales(s) => write!(f, "{s}"),
      Self::Chatbot(s) => write!(f, "{s}"),
    }
  }
}

// ─── RecordedStage ───────────────────────────────────────────────────────────

/// A stage column as found in storage.
///
/// Writes only ever produce `Known`. `Unknown` surfaces rows written by older
/// ingestion code; it is kept verbatim so the aggregator can flag it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordedStage<S> {
  Known(S),
  Unknown(String),
}

impl<S: Stage> RecordedStage<S> {
  pub fn decode(raw: &str) -> Self {
    match S::parse(raw) {
      Ok(stage) => Self::Known(stage),
      Err(_) => Self::Unknown(raw.to_owned()),
    }
  }

  pub fn known(&self) -> Option<S> {
    match self {
      Self::Known(s) => Some(*s),
      Self::Unknown(_) => None,
    }
  }

  /// The known stage, or `InvalidStage` for an unrecognised value.
  pub fn require(&self) -> Result<S> {
    match self {
      Self::Known(s) => Ok(*s),
      Self::Unknown(raw) => Err(Error::InvalidStage {
        pipeline: S::PIPELINE.label(),
        value:    raw.clone(),
      }),
    }
  }
}

impl<S: Stage> Default for RecordedStage<S>
where
  S: Default,
{
  fn default() -> Self { Self::Known(S::default()) }
}

impl<S: Stage> From<S> for RecordedStage<S> {
  fn from(stage: S) -> Self { Self::Known(stage) }
}

impl<S: Stage> fmt::Display for RecordedStage<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Known(s) => write!(f, "{s}"),
      Self::Unknown(raw) => f.write_str(raw),
    }
  }
}

// ─── Boundary validation ─────────────────────────────────────────────────────

/// Reject unknown stage labels in a raw JSON payload before it is
/// deserialised into a typed patch.
///
/// Checks the top-level `sales_pipeline_stage` / `chatbot_pipeline_stage`
/// keys and a nested `set_stage: {pipeline, stage}` object.
pub fn check_stage_fields(payload: &serde_json::Value) -> Result<()> {
  let Some(obj) = payload.as_object() else {
    return Ok(());
  };

  if let Some(v) = obj.get("sales_pipeline_stage") {
    check_one(PipelineKind::Sales, v)?;
  }
  if let Some(v) = obj.get("chatbot_pipeline_stage") {
    check_one(PipelineKind::Chatbot, v)?;
  }
  if let Some(set) = obj.get("set_stage").and_then(|v| v.as_object()) {
    let pipeline = match set.get("pipeline").and_then(|p| p.as_str()) {
      Some("sales") => PipelineKind::Sales,
      Some("chatbot") => PipelineKind::Chatbot,
      other => {
        return Err(Error::InvalidStage {
          pipeline: "unknown",
          value:    other.unwrap_or_default().to_owned(),
        });
      }
    };
    if let Some(v) = set.get("stage") {
      check_one(pipeline, v)?;
    }
  }
  Ok(())
}

fn check_one(pipeline: PipelineKind, value: &serde_json::Value) -> Result<()> {
  match value {
    serde_json::Value::Null => Ok(()),
    serde_json::Value::String(s) => StageValue::parse(pipeline, s).map(|_| ()),
    other => Err(Error::InvalidStage {
      pipeline: pipeline.label(),
      value:    other.to_string(),
    }),
  }
}

// ─── SavedStatus ─────────────────────────────────────────────────────────────

/// Lifecycle of an apartment a consumer has saved.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
pub enum SavedStatus {
  #[default]
  Interested,
  Contacted,
  #[serde(rename = "Viewing Scheduled")]
  #[strum(serialize = "Viewing Scheduled")]
  ViewingScheduled,
  #[serde(rename = "Offer Submitted")]
  #[strum(serialize = "Offer Submitted")]
  OfferSubmitted,
  Rejected,
  Closed,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rank_follows_declaration_order() {
    let ranks: Vec<usize> = SalesStage::all().into_iter().map(SalesStage::rank).collect();
    assert_eq!(ranks, (0..8).collect::<Vec<_>>());
    assert!(SalesStage::ActiveClient > SalesStage::NewLead);
    assert_eq!(ChatbotStage::Closed.rank(), 5);
  }

  #[test]
  fn labels_round_trip_through_strum_and_serde() {
    for stage in SalesStage::all() {
      let label = stage.to_string();
      assert_eq!(SalesStage::parse(&label).unwrap(), stage);
      let json = serde_json::to_value(stage).unwrap();
      assert_eq!(json, serde_json::Value::String(label));
    }
    assert_eq!(
      ChatbotStage::parse("First Message Sent").unwrap(),
      ChatbotStage::FirstMessageSent
    );
  }

  #[test]
  fn unknown_label_is_rejected() {
    let err = SalesStage::parse("Bogus").unwrap_err();
    assert!(matches!(
      err,
      Error::InvalidStage { pipeline: "sales", ref value } if value == "Bogus"
    ));
    // Labels are case-sensitive; no fuzzy coercion.
    assert!(ChatbotStage::parse("no contact").is_err());
  }

  #[test]
  fn recorded_stage_keeps_unknown_values() {
    let rec = RecordedStage::<ChatbotStage>::decode("Ghosted");
    assert_eq!(rec, RecordedStage::Unknown("Ghosted".into()));
    assert!(rec.known().is_none());
    assert!(rec.require().is_err());
    assert_eq!(rec.to_string(), "Ghosted");

    let rec = RecordedStage::<ChatbotStage>::decode("Replied");
    assert_eq!(rec.known(), Some(ChatbotStage::Replied));
  }

  #[test]
  fn stage_value_wire_shape() {
    let v: StageValue = serde_json::from_value(serde_json::json!({
      "pipeline": "sales",
      "stage": "Proposal Sent",
    }))
    .unwrap();
    assert_eq!(v, StageValue::Sales(SalesStage::ProposalSent));
    assert_eq!(v.pipeline(), PipelineKind::Sales);
  }

  #[test]
  fn check_stage_fields_catches_patch_and_bulk_shapes() {
    use serde_json::json;

    assert!(check_stage_fields(&json!({ "sales_pipeline_stage": "Contacted" })).is_ok());
    assert!(check_stage_fields(&json!({ "sales_pipeline_stage": "Bogus" })).is_err());
    assert!(check_stage_fields(&json!({ "chatbot_pipeline_stage": 3 })).is_err());
    assert!(
      check_stage_fields(&json!({
        "set_stage": { "pipeline": "chatbot", "stage": "Replied" }
      }))
      .is_ok()
    );
    assert!(
      check_stage_fields(&json!({
        "set_stage": { "pipeline": "chatbot", "stage": "Contract Signed" }
      }))
      .is_err()
    );
  }
}
