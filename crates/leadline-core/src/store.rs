//! The store traits and supporting query types.
//!
//! Backends (e.g. `leadline-store-sqlite`) implement these; the API layer,
//! the bulk executor and the alert gate depend only on the abstraction.
//!
//! Every mutating method is a single logical operation: it either applies
//! completely or not at all, and concurrent readers never see it half-done.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  alert::AlertRecord,
  b2c::{
    AlertChannel, Listing, NewSavedMessage, PreferencesPatch, SaveOptions, SavedApartment,
    SavedPatch, UserPreferences,
  },
  bulk::BulkOp,
  error::ErrorKind,
  lead::{
    NewOwner, NewProperty, Owner, OwnerId, OwnerPatch, Property, PropertyId,
    PropertyPatch,
  },
  log::{
    ConversationEntry, ConversationFilter, NewConversationEntry,
    NewTimelineEntry, TimelineEntry, TimelineTarget,
  },
  stage::{SalesStage, Stage},
  upstream::ValuationResult,
};

// ─── Error bound ─────────────────────────────────────────────────────────────

/// Backend error types must wrap core errors and classify themselves.
pub trait StoreError:
  std::error::Error + From<crate::Error> + Send + Sync + 'static
{
  fn kind(&self) -> ErrorKind;
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`LeadStore::list_owners`]; mirrors the CRM table filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerQuery {
  /// Case-insensitive match over owner name, email and phone.
  pub text:          Option<String>,
  /// Owner holds at least one property in this sales stage.
  pub sales_stage:   Option<SalesStage>,
  /// Owner holds at least one property scored at or above this.
  pub min_viability: Option<f64>,
  /// Case-insensitive substring of any property's location.
  pub city:          Option<String>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

impl OwnerQuery {
  pub fn matches(&self, owner: &Owner) -> bool {
    if let Some(q) = non_blank(&self.text) {
      let hit = [&owner.name, &owner.email, &owner.phone]
        .iter()
        .any(|f| f.to_lowercase().contains(&q));
      if !hit {
        return false;
      }
    }
    if let Some(stage) = self.sales_stage
      && !owner
        .properties
        .iter()
        .any(|p| SalesStage::of(p).known() == Some(stage))
    {
      return false;
    }
    if let Some(min) = self.min_viability
      && !owner
        .properties
        .iter()
        .any(|p| p.viability_score.is_some_and(|s| s >= min))
    {
      return false;
    }
    if let Some(city) = non_blank(&self.city)
      && !owner.properties.iter().any(|p| {
        p.location
          .as_deref()
          .is_some_and(|l| l.to_lowercase().contains(&city))
      })
    {
      return false;
    }
    true
  }

  /// Filter, then page.
  pub fn apply(&self, owners: Vec<Owner>) -> Vec<Owner> {
    owners
      .into_iter()
      .filter(|o| self.matches(o))
      .skip(self.offset.unwrap_or(0))
      .take(self.limit.unwrap_or(usize::MAX))
      .collect()
  }
}

fn non_blank(s: &Option<String>) -> Option<String> {
  s.as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_lowercase)
}

// ─── LeadStore ───────────────────────────────────────────────────────────────

/// Agency-side store: owners, properties and their logs.
///
/// Writes to the same owner or property are serialised by the backend.
pub trait LeadStore: Send + Sync {
  type Error: StoreError;

  // ── Owners ────────────────────────────────────────────────────────────

  /// Validate and persist a new owner, plus its first property when any
  /// property field is present. Nothing is written if validation fails.
  fn create_owner(
    &self,
    input: NewOwner,
  ) -> impl Future<Output = Result<Owner, Self::Error>> + Send + '_;

  fn get_owner(
    &self,
    id: OwnerId,
  ) -> impl Future<Output = Result<Option<Owner>, Self::Error>> + Send + '_;

  /// Owners with their properties, newest first, filtered by `query`.
  fn list_owners<'a>(
    &'a self,
    query: &'a OwnerQuery,
  ) -> impl Future<Output = Result<Vec<Owner>, Self::Error>> + Send + 'a;

  fn update_owner(
    &self,
    id: OwnerId,
    patch: OwnerPatch,
  ) -> impl Future<Output = Result<Owner, Self::Error>> + Send + '_;

  // ── Properties ────────────────────────────────────────────────────────

  /// Attach a property to an owner. If the owner already holds a property
  /// with the same `listing_url`, the input merges into it instead.
  fn add_property(
    &self,
    owner_id: OwnerId,
    input: NewProperty,
  ) -> impl Future<Output = Result<Property, Self::Error>> + Send + '_;

  /// Move a property to another owner. Ownership is exclusive.
  fn transfer_property(
    &self,
    id: PropertyId,
    new_owner: OwnerId,
  ) -> impl Future<Output = Result<Property, Self::Error>> + Send + '_;

  fn get_property(
    &self,
    id: PropertyId,
  ) -> impl Future<Output = Result<Option<Property>, Self::Error>> + Send + '_;

  /// Merge `patch` into the property. Stage changes append one status
  /// timeline entry each; contact-type changes bump `last_contact_at`.
  fn update_property(
    &self,
    id: PropertyId,
    patch: PropertyPatch,
  ) -> impl Future<Output = Result<Property, Self::Error>> + Send + '_;

  /// Overwrite the cached valuation fields and nothing else.
  fn apply_valuation(
    &self,
    id: PropertyId,
    result: ValuationResult,
  ) -> impl Future<Output = Result<Property, Self::Error>> + Send + '_;

  /// Apply `op` to every property of one owner, all or nothing.
  fn apply_bulk_op<'a>(
    &'a self,
    owner_id: OwnerId,
    op: &'a BulkOp,
  ) -> impl Future<Output = Result<Vec<Property>, Self::Error>> + Send + 'a;

  // ── Logs ──────────────────────────────────────────────────────────────

  fn append_conversation(
    &self,
    property_id: PropertyId,
    entry: NewConversationEntry,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  /// Entries ascending by `sent_at`; ties keep append order.
  fn conversations<'a>(
    &'a self,
    property_id: PropertyId,
    filter: &'a ConversationFilter,
  ) -> impl Future<Output = Result<Vec<ConversationEntry>, Self::Error>> + Send + 'a;

  fn append_timeline(
    &self,
    target: TimelineTarget,
    entry: NewTimelineEntry,
  ) -> impl Future<Output = Result<TimelineEntry, Self::Error>> + Send + '_;

  fn timeline(
    &self,
    target: TimelineTarget,
  ) -> impl Future<Output = Result<Vec<TimelineEntry>, Self::Error>> + Send + '_;
}

// ─── ConsumerStore ───────────────────────────────────────────────────────────

/// Consumer-side store: preferences, alert state and saved apartments.
pub trait ConsumerStore: Send + Sync {
  type Error: StoreError;

  // ── Preferences ───────────────────────────────────────────────────────

  fn get_preferences(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Option<UserPreferences>, Self::Error>> + Send + '_;

  /// Create with defaults on first write, then merge `patch`.
  fn upsert_preferences(
    &self,
    user_id: String,
    patch: PreferencesPatch,
  ) -> impl Future<Output = Result<UserPreferences, Self::Error>> + Send + '_;

  // ── Alerts ────────────────────────────────────────────────────────────

  /// Read the pair's prior state and the user's controls, run
  /// [`crate::alert::decide`], and store the result in one step.
  fn record_alert_score(
    &self,
    user_id: String,
    listing_id: String,
    match_pct: u8,
  ) -> impl Future<Output = Result<AlertRecord, Self::Error>> + Send + '_;

  /// Suppress the pair for good.
  fn ignore_alert(
    &self,
    user_id: String,
    listing_id: String,
  ) -> impl Future<Output = Result<AlertRecord, Self::Error>> + Send + '_;

  fn list_alerts(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Vec<AlertRecord>, Self::Error>> + Send + '_;

  /// Every record currently in the queued state, across users.
  fn queued_alerts(
    &self,
  ) -> impl Future<Output = Result<Vec<AlertRecord>, Self::Error>> + Send + '_;

  /// Move a queued pair to delivered. Returns `false` if it was no longer
  /// queued, so a pair is delivered at most once.
  fn mark_delivered(
    &self,
    user_id: String,
    listing_id: String,
    channels: Vec<AlertChannel>,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Saved apartments ──────────────────────────────────────────────────

  /// Upsert keyed by `(user_id, listing.id)`.
  fn save_listing(
    &self,
    user_id: String,
    listing: Listing,
    opts: SaveOptions,
  ) -> impl Future<Output = Result<SavedApartment, Self::Error>> + Send + '_;

  fn get_saved(
    &self,
    user_id: String,
    listing_id: String,
  ) -> impl Future<Output = Result<Option<SavedApartment>, Self::Error>> + Send + '_;

  /// Most recently saved first.
  fn list_saved(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Vec<SavedApartment>, Self::Error>> + Send + '_;

  fn update_saved(
    &self,
    user_id: String,
    listing_id: String,
    patch: SavedPatch,
  ) -> impl Future<Output = Result<SavedApartment, Self::Error>> + Send + '_;

  fn append_saved_message(
    &self,
    user_id: String,
    listing_id: String,
    message: NewSavedMessage,
  ) -> impl Future<Output = Result<SavedApartment, Self::Error>> + Send + '_;

  fn add_saved_timeline(
    &self,
    user_id: String,
    listing_id: String,
    entry: NewTimelineEntry,
  ) -> impl Future<Output = Result<SavedApartment, Self::Error>> + Send + '_;

  /// Returns `false` if nothing was saved under that key.
  fn remove_saved(
    &self,
    user_id: String,
    listing_id: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lead::fixtures::{owner, property};

  #[test]
  fn owner_query_filters_like_the_crm_table() {
    let mut scored = property(10, 1);
    scored.viability_score = Some(8.7);
    scored.sales_pipeline_stage = SalesStage::CallBooked.into();
    scored.location = Some("Barcelona, Spain".into());
    let mut maria = owner(1, vec![scored]);
    maria.name = "Maria Garcia".into();

    let joao = owner(2, vec![property(20, 2)]);
    let empty = owner(3, vec![]);
    let all = vec![maria, joao, empty];

    let q = OwnerQuery { text: Some("garcia".into()), ..Default::default() };
    assert_eq!(ids(q.apply(all.clone())), vec![1]);

    let q = OwnerQuery { sales_stage: Some(SalesStage::NewLead), ..Default::default() };
    assert_eq!(ids(q.apply(all.clone())), vec![2]);

    let q = OwnerQuery { min_viability: Some(8.0), ..Default::default() };
    assert_eq!(ids(q.apply(all.clone())), vec![1]);

    let q = OwnerQuery { city: Some("lisbon".into()), ..Default::default() };
    assert_eq!(ids(q.apply(all.clone())), vec![2]);

    let q = OwnerQuery { offset: Some(1), limit: Some(1), ..Default::default() };
    assert_eq!(ids(q.apply(all)), vec![2]);
  }

  fn ids(owners: Vec<Owner>) -> Vec<OwnerId> {
    owners.into_iter().map(|o| o.id).collect()
  }
}
