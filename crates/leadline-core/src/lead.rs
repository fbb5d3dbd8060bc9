//! Owners and their properties, the records the CRM pipeline is built from.
//!
//! An owner is a contact; a property is a listing that belongs to exactly one
//! owner at a time. Both stage tracks live on the property; an owner's stage
//! is always derived (see [`crate::pipeline`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  error::ValidationError,
  log::{NewTimelineEntry, TimelineKind},
  stage::{
    ChatbotStage, PipelineKind, RecordedStage, SalesStage, Stage,
    check_stage_fields,
  },
};

pub type OwnerId = i64;
pub type PropertyId = i64;

// ─── Valuation fields ────────────────────────────────────────────────────────

/// The valuation service's verdict on a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
  #[serde(rename = "Strong Buy")]
  StrongBuy,
  Good,
  Marginal,
  Avoid,
}

// ─── Owner ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
  pub id:              OwnerId,
  pub name:            String,
  pub email:           String,
  pub phone:           String,
  pub notes:           String,
  pub created_at:      DateTime<Utc>,
  pub last_contact_at: Option<DateTime<Utc>>,
  /// Keyed by property id; never contains the same id twice.
  pub properties:      Vec<Property>,
}

impl Owner {
  pub fn property(&self, id: PropertyId) -> Option<&Property> {
    self.properties.iter().find(|p| p.id == id)
  }
}

// ─── Property ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
  pub id:                     PropertyId,
  pub owner_id:               OwnerId,
  pub title:                  String,
  pub location:               Option<String>,
  pub address:                Option<String>,
  pub price:                  Option<f64>,
  pub rent_price:             Option<f64>,
  pub sale_price:             Option<f64>,
  pub bedrooms:               Option<u32>,
  pub bathrooms:              Option<u32>,
  pub rooms:                  Option<u32>,
  pub surface_m2:             Option<f64>,
  pub description:            Option<String>,
  /// Where the lead was found. Mandatory for every property.
  pub listing_url:            String,
  /// `"sale"` or `"rent"` as reported by the source platform.
  pub transaction_type:       Option<String>,
  pub contact_email:          Option<String>,
  pub phone_number:           Option<String>,
  pub source_platform:        Option<String>,
  pub listing_ref:            Option<String>,
  /// 0–10, cached from the last successful valuation.
  pub viability_score:        Option<f64>,
  pub recommendation:         Option<Recommendation>,
  pub estimated_annual_gross: Option<f64>,
  pub degree_of_certainty:    Option<String>,
  pub valued_at:              Option<DateTime<Utc>>,
  pub sales_pipeline_stage:   RecordedStage<SalesStage>,
  pub chatbot_pipeline_stage: RecordedStage<ChatbotStage>,
  pub last_contact_at:        Option<DateTime<Utc>>,
  pub created_at:             DateTime<Utc>,
}

// ─── NewProperty ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::LeadStore::add_property`], and the optional
/// property half of [`NewOwner`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewProperty {
  pub title:                  Option<String>,
  pub location:               Option<String>,
  pub address:                Option<String>,
  pub price:                  Option<f64>,
  pub rent_price:             Option<f64>,
  pub sale_price:             Option<f64>,
  pub bedrooms:               Option<u32>,
  pub bathrooms:              Option<u32>,
  pub rooms:                  Option<u32>,
  pub surface_m2:             Option<f64>,
  pub description:            Option<String>,
  pub listing_url:            Option<String>,
  pub transaction_type:       Option<String>,
  pub contact_email:          Option<String>,
  pub phone_number:           Option<String>,
  pub source_platform:        Option<String>,
  pub listing_ref:            Option<String>,
  pub sales_pipeline_stage:   Option<SalesStage>,
  pub chatbot_pipeline_stage: Option<ChatbotStage>,
}

impl NewProperty {
  /// Parse a raw request body, rejecting unknown stage labels first.
  pub fn from_value(payload: serde_json::Value) -> Result<Self> {
    check_stage_fields(&payload)?;
    Ok(serde_json::from_value(payload)?)
  }

  /// `true` when no property field was supplied at all.
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  pub fn validate(&self) -> Result<()> {
    match self.listing_url.as_deref().map(str::trim) {
      Some(url) if !url.is_empty() => Ok(()),
      _ => Err(ValidationError::MissingSourceUrl.into()),
    }
  }

  /// Display title: explicit title, else address, else location.
  pub fn resolved_title(&self) -> String {
    self
      .title
      .clone()
      .or_else(|| self.address.clone())
      .or_else(|| self.location.clone())
      .unwrap_or_else(|| "Untitled property".to_owned())
  }

  /// Merge the supplied fields into an existing property. Stages are left
  /// alone: re-ingesting a listing never moves it through the pipeline.
  pub fn merge_into(&self, p: &mut Property) {
    merge(&mut p.location, &self.location);
    merge(&mut p.address, &self.address);
    merge(&mut p.price, &self.price);
    merge(&mut p.rent_price, &self.rent_price);
    merge(&mut p.sale_price, &self.sale_price);
    merge(&mut p.bedrooms, &self.bedrooms);
    merge(&mut p.bathrooms, &self.bathrooms);
    merge(&mut p.rooms, &self.rooms);
    merge(&mut p.surface_m2, &self.surface_m2);
    merge(&mut p.description, &self.description);
    merge(&mut p.transaction_type, &self.transaction_type);
    merge(&mut p.contact_email, &self.contact_email);
    merge(&mut p.phone_number, &self.phone_number);
    merge(&mut p.source_platform, &self.source_platform);
    merge(&mut p.listing_ref, &self.listing_ref);
    if let Some(title) = &self.title {
      p.title.clone_from(title);
    }
  }
}

fn merge<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
  if value.is_some() {
    slot.clone_from(value);
  }
}

// ─── NewOwner ────────────────────────────────────────────────────────────────

/// Input to [`crate::store::LeadStore::create_owner`].
///
/// Property fields sit alongside the owner fields (flattened); supplying any
/// of them creates the owner's first property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOwner {
  #[serde(default)]
  pub name:     String,
  #[serde(default)]
  pub email:    String,
  #[serde(default)]
  pub phone:    String,
  #[serde(default)]
  pub notes:    String,
  #[serde(flatten)]
  pub property: NewProperty,
}

impl NewOwner {
  pub fn with_email(email: impl Into<String>) -> Self {
    Self { email: email.into(), ..Self::default() }
  }

  /// Parse a raw request body, rejecting unknown stage labels first.
  pub fn from_value(payload: serde_json::Value) -> Result<Self> {
    check_stage_fields(&payload)?;
    Ok(serde_json::from_value(payload)?)
  }

  pub fn validate(&self) -> Result<()> {
    if self.email.trim().is_empty() {
      return Err(ValidationError::MissingEmail.into());
    }
    if !self.property.is_empty() {
      self.property.validate()?;
    }
    Ok(())
  }
}

// ─── Patches ─────────────────────────────────────────────────────────────────

/// Partial update for an owner; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerPatch {
  pub name:  Option<String>,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub notes: Option<String>,
}

impl OwnerPatch {
  pub fn apply(&self, owner: &mut Owner) -> Result<()> {
    if let Some(email) = &self.email
      && email.trim().is_empty()
    {
      return Err(ValidationError::MissingEmail.into());
    }
    merge_str(&mut owner.name, &self.name);
    merge_str(&mut owner.email, &self.email);
    merge_str(&mut owner.phone, &self.phone);
    merge_str(&mut owner.notes, &self.notes);
    Ok(())
  }
}

fn merge_str(slot: &mut String, value: &Option<String>) {
  if let Some(v) = value {
    slot.clone_from(v);
  }
}

/// Partial update for a property; `None` fields are left unchanged.
///
/// Valuation fields are deliberately absent: they are only written through
/// [`crate::store::LeadStore::apply_valuation`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyPatch {
  pub title:                  Option<String>,
  pub location:               Option<String>,
  pub address:                Option<String>,
  pub price:                  Option<f64>,
  pub rent_price:             Option<f64>,
  pub sale_price:             Option<f64>,
  pub bedrooms:               Option<u32>,
  pub bathrooms:              Option<u32>,
  pub rooms:                  Option<u32>,
  pub surface_m2:             Option<f64>,
  pub description:            Option<String>,
  pub listing_url:            Option<String>,
  pub transaction_type:       Option<String>,
  pub contact_email:          Option<String>,
  pub phone_number:           Option<String>,
  pub sales_pipeline_stage:   Option<SalesStage>,
  pub chatbot_pipeline_stage: Option<ChatbotStage>,
}

impl PropertyPatch {
  /// Parse a raw request body. An unknown stage label yields
  /// `InvalidStage`, never a coerced default.
  pub fn from_value(payload: serde_json::Value) -> Result<Self> {
    check_stage_fields(&payload)?;
    Ok(serde_json::from_value(payload)?)
  }

  /// Apply the patch in place and report what changed pipeline-wise.
  pub fn apply(&self, p: &mut Property) -> Result<PropertyChange> {
    if let Some(url) = &self.listing_url
      && url.trim().is_empty()
    {
      return Err(ValidationError::MissingSourceUrl.into());
    }

    if let Some(title) = &self.title {
      p.title.clone_from(title);
    }
    if let Some(url) = &self.listing_url {
      p.listing_url.clone_from(url);
    }
    merge(&mut p.location, &self.location);
    merge(&mut p.address, &self.address);
    merge(&mut p.price, &self.price);
    merge(&mut p.rent_price, &self.rent_price);
    merge(&mut p.sale_price, &self.sale_price);
    merge(&mut p.bedrooms, &self.bedrooms);
    merge(&mut p.bathrooms, &self.bathrooms);
    merge(&mut p.rooms, &self.rooms);
    merge(&mut p.surface_m2, &self.surface_m2);
    merge(&mut p.description, &self.description);
    merge(&mut p.transaction_type, &self.transaction_type);
    merge(&mut p.contact_email, &self.contact_email);
    merge(&mut p.phone_number, &self.phone_number);

    let mut change = PropertyChange::default();
    if let Some(stage) = self.sales_pipeline_stage {
      change.record(set_stage(&mut p.sales_pipeline_stage, stage));
    }
    if let Some(stage) = self.chatbot_pipeline_stage {
      change.record(set_stage(&mut p.chatbot_pipeline_stage, stage));
    }
    Ok(change)
  }
}

// ─── Stage transitions ───────────────────────────────────────────────────────

/// A single programmatic stage change on one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
  pub pipeline:   PipelineKind,
  pub from:       String,
  pub to:         String,
  /// Whether this transition counts as contacting the owner.
  pub is_contact: bool,
}

impl StageTransition {
  /// The status entry mirrored onto the property's timeline.
  pub fn timeline_entry(&self) -> NewTimelineEntry {
    let track = match self.pipeline {
      PipelineKind::Sales => "Sales stage",
      PipelineKind::Chatbot => "Chatbot stage",
    };
    NewTimelineEntry {
      kind:   TimelineKind::Status,
      label:  format!("{track}: {}", self.to),
      detail: Some(format!("{} → {}", self.from, self.to)),
    }
  }
}

/// What applying a patch or bulk op did to one property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyChange {
  pub transitions: Vec<StageTransition>,
}

impl PropertyChange {
  pub fn record(&mut self, transition: Option<StageTransition>) {
    self.transitions.extend(transition);
  }

  pub fn is_contact(&self) -> bool {
    self.transitions.iter().any(|t| t.is_contact)
  }

  pub fn is_empty(&self) -> bool { self.transitions.is_empty() }
}

/// Overwrite a stage slot. Returns `None` when the value is unchanged.
///
/// Backward moves are allowed. A move counts as contact when it advances the
/// sales track to `Contacted` or later, or takes the chatbot track out of
/// `No Contact`.
pub fn set_stage<S: Stage>(
  slot: &mut RecordedStage<S>,
  stage: S,
) -> Option<StageTransition> {
  let previous = slot.known();
  if previous == Some(stage) {
    return None;
  }
  let advanced = previous.is_none_or(|prev| stage > prev);
  let threshold = match S::PIPELINE {
    PipelineKind::Sales => SalesStage::Contacted.rank(),
    PipelineKind::Chatbot => ChatbotStage::FirstMessageSent.rank(),
  };
  let transition = StageTransition {
    pipeline:   S::PIPELINE,
    from:       slot.to_string(),
    to:         stage.to_string(),
    is_contact: advanced && stage.rank() >= threshold,
  };
  *slot = RecordedStage::Known(stage);
  Some(transition)
}

#[cfg(test)]
pub(crate) mod fixtures {
  use chrono::TimeZone as _;

  use super::*;

  pub fn property(id: PropertyId, owner_id: OwnerId) -> Property {
    Property {
      id,
      owner_id,
      title: format!("Property {id}"),
      location: Some("Lisbon, Portugal".into()),
      address: None,
      price: Some(100_000.0),
      rent_price: None,
      sale_price: None,
      bedrooms: Some(2),
      bathrooms: Some(1),
      rooms: None,
      surface_m2: Some(70.0),
      description: None,
      listing_url: format!("https://example.com/listing/{id}"),
      transaction_type: Some("sale".into()),
      contact_email: None,
      phone_number: None,
      source_platform: None,
      listing_ref: None,
      viability_score: None,
      recommendation: None,
      estimated_annual_gross: None,
      degree_of_certainty: None,
      valued_at: None,
      sales_pipeline_stage: RecordedStage::default(),
      chatbot_pipeline_stage: RecordedStage::default(),
      last_contact_at: None,
      created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  pub fn owner(id: OwnerId, properties: Vec<Property>) -> Owner {
    Owner {
      id,
      name: format!("Owner {id}"),
      email: format!("owner{id}@example.com"),
      phone: String::new(),
      notes: String::new(),
      created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
      last_contact_at: None,
      properties,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::{fixtures::property, *};
  use crate::Error;

  #[test]
  fn owner_without_property_fields_is_valid() {
    let owner = NewOwner::from_value(json!({ "email": "a@x.com" })).unwrap();
    assert!(owner.property.is_empty());
    owner.validate().unwrap();
  }

  #[test]
  fn owner_requires_email() {
    let err = NewOwner::from_value(json!({ "name": "Maria" }))
      .unwrap()
      .validate()
      .unwrap_err();
    assert!(matches!(
      err,
      Error::ValidationFailed(ValidationError::MissingEmail)
    ));
  }

  #[test]
  fn property_fields_without_listing_url_are_rejected() {
    let owner =
      NewOwner::from_value(json!({ "email": "a@x.com", "price": 900 })).unwrap();
    assert_eq!(owner.property.price, Some(900.0));
    let err = owner.validate().unwrap_err();
    assert!(matches!(
      err,
      Error::ValidationFailed(ValidationError::MissingSourceUrl)
    ));
  }

  #[test]
  fn patch_merges_only_supplied_fields() {
    let mut p = property(1, 1);
    let patch = PropertyPatch::from_value(json!({ "price": 250000 })).unwrap();
    let change = patch.apply(&mut p).unwrap();
    assert!(change.is_empty());
    assert_eq!(p.price, Some(250_000.0));
    assert_eq!(p.bedrooms, Some(2));
    assert_eq!(p.listing_url, "https://example.com/listing/1");
  }

  #[test]
  fn patch_with_bogus_stage_is_invalid_stage() {
    let err = PropertyPatch::from_value(json!({ "sales_pipeline_stage": "Bogus" }))
      .unwrap_err();
    assert!(matches!(err, Error::InvalidStage { .. }));
  }

  #[test]
  fn stage_patch_reports_transition_and_contact() {
    let mut p = property(1, 1);
    let patch = PropertyPatch {
      sales_pipeline_stage: Some(SalesStage::Contacted),
      ..PropertyPatch::default()
    };
    let change = patch.apply(&mut p).unwrap();
    assert_eq!(change.transitions.len(), 1);
    assert!(change.is_contact());
    assert_eq!(change.transitions[0].from, "New Lead");
    assert_eq!(change.transitions[0].to, "Contacted");

    // Same value again: not a transition.
    let change = patch.apply(&mut p).unwrap();
    assert!(change.is_empty());
  }

  #[test]
  fn backward_move_is_allowed_but_not_contact() {
    let mut p = property(1, 1);
    p.sales_pipeline_stage = SalesStage::ProposalSent.into();
    let t = set_stage(&mut p.sales_pipeline_stage, SalesStage::Interested).unwrap();
    assert!(!t.is_contact);
    assert_eq!(p.sales_pipeline_stage.known(), Some(SalesStage::Interested));
  }

  #[test]
  fn overwriting_unknown_stage_is_a_transition() {
    let mut p = property(1, 1);
    p.chatbot_pipeline_stage = RecordedStage::Unknown("Ghosted".into());
    let t = set_stage(&mut p.chatbot_pipeline_stage, ChatbotStage::Replied).unwrap();
    assert_eq!(t.from, "Ghosted");
    assert!(t.is_contact);
  }

  #[test]
  fn new_property_merge_keeps_stages() {
    let mut p = property(1, 1);
    p.sales_pipeline_stage = SalesStage::CallBooked.into();
    let incoming = NewProperty {
      price: Some(5.0),
      sales_pipeline_stage: Some(SalesStage::NewLead),
      ..NewProperty::default()
    };
    incoming.merge_into(&mut p);
    assert_eq!(p.price, Some(5.0));
    assert_eq!(p.sales_pipeline_stage.known(), Some(SalesStage::CallBooked));
  }
}
