//! Consumer-side records: per-user preferences and saved apartments.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::ValidationError,
  log::{NewTimelineEntry, TimelineEntry, TimelineKind},
  stage::SavedStatus,
  upstream::ContactGoal,
};

// ─── Listing ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RentOrBuy {
  #[default]
  Rent,
  Buy,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Amenity {
  Parking,
  Balcony,
  Elevator,
  Pets,
  Furnished,
}

/// A listing as shown in the consumer feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
  /// Opaque identifier from the listings feed.
  pub id:              String,
  pub title:           String,
  #[serde(default)]
  pub description:     String,
  #[serde(default)]
  pub address:         Option<String>,
  #[serde(default)]
  pub commune:         Option<String>,
  #[serde(default)]
  pub property_type:   Option<String>,
  #[serde(default)]
  pub rent_or_buy:     RentOrBuy,
  pub price:           f64,
  #[serde(default)]
  pub monthly_charges: Option<f64>,
  #[serde(default)]
  pub bedrooms:        Option<u32>,
  #[serde(default)]
  pub surface_m2:      Option<f64>,
  #[serde(default)]
  pub amenities:       BTreeSet<Amenity>,
  #[serde(default)]
  pub url:             Option<String>,
}

// ─── Preferences ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
  pub name:                String,
  pub email:               String,
  pub phone:               String,
  pub whatsapp:            String,
  pub preferred_move_date: Option<String>,
  pub employer:            Option<String>,
  pub nationality:         Option<String>,
  pub notes:               Option<String>,
}

/// Hard constraints: a listing failing any of these never reaches the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredFilters {
  pub rent_or_buy:         RentOrBuy,
  pub budget_min:          f64,
  pub budget_max:          f64,
  /// Minimum number of bedrooms.
  pub bedrooms:            Option<u32>,
  pub sqm_min:             Option<f64>,
  pub sqm_max:             Option<f64>,
  pub parking:             bool,
  pub balcony:             bool,
  pub elevator:            bool,
  pub pets:                bool,
  pub furnished:           Option<bool>,
  pub max_monthly_charges: Option<f64>,
  pub property_types:      Vec<String>,
  pub communes:            Vec<String>,
  pub move_in_date:        Option<String>,
  pub energy_class:        Option<String>,
}

impl Default for StructuredFilters {
  fn default() -> Self {
    Self {
      rent_or_buy:         RentOrBuy::Rent,
      budget_min:          500.0,
      budget_max:          2000.0,
      bedrooms:            None,
      sqm_min:             None,
      sqm_max:             None,
      parking:             false,
      balcony:             false,
      elevator:            false,
      pets:                false,
      furnished:           None,
      max_monthly_charges: None,
      property_types:      Vec::new(),
      communes:            Vec::new(),
      move_in_date:        None,
      energy_class:        None,
    }
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
  #[default]
  Manual,
  BotAssisted,
  FullAuto,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
  InApp,
  Email,
  Push,
}

/// Minimum match score for an alert. Only these four values exist.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum MatchThreshold {
  Loose,
  #[default]
  Good,
  Strong,
  NearPerfect,
}

impl MatchThreshold {
  pub fn percent(self) -> u8 {
    match self {
      Self::Loose => 70,
      Self::Good => 80,
      Self::Strong => 90,
      Self::NearPerfect => 95,
    }
  }
}

impl TryFrom<u8> for MatchThreshold {
  type Error = Error;

  fn try_from(value: u8) -> Result<Self> {
    match value {
      70 => Ok(Self::Loose),
      80 => Ok(Self::Good),
      90 => Ok(Self::Strong),
      95 => Ok(Self::NearPerfect),
      other => Err(Error::InvalidThreshold(other)),
    }
  }
}

impl From<MatchThreshold> for u8 {
  fn from(t: MatchThreshold) -> u8 { t.percent() }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertFrequency {
  #[default]
  Immediate,
  DailyDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
  pub communication_mode:      CommunicationMode,
  pub early_warnings:          bool,
  pub bot_confirm_before_send: bool,
  pub alert_channels:          BTreeSet<AlertChannel>,
  pub alert_match_threshold:   MatchThreshold,
  pub alert_frequency:         AlertFrequency,
}

impl Default for Controls {
  fn default() -> Self {
    Self {
      communication_mode:      CommunicationMode::Manual,
      early_warnings:          true,
      bot_confirm_before_send: true,
      alert_channels:          BTreeSet::from([AlertChannel::InApp]),
      alert_match_threshold:   MatchThreshold::Good,
      alert_frequency:         AlertFrequency::Immediate,
    }
  }
}

/// Field-wise update for [`Controls`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsPatch {
  pub communication_mode:      Option<CommunicationMode>,
  pub early_warnings:          Option<bool>,
  pub bot_confirm_before_send: Option<bool>,
  pub alert_channels:          Option<BTreeSet<AlertChannel>>,
  pub alert_match_threshold:   Option<MatchThreshold>,
  pub alert_frequency:         Option<AlertFrequency>,
}

impl ControlsPatch {
  pub fn apply(&self, c: &mut Controls) -> Result<()> {
    if let Some(channels) = &self.alert_channels {
      if channels.is_empty() {
        return Err(ValidationError::EmptyAlertChannels.into());
      }
      c.alert_channels.clone_from(channels);
    }
    if let Some(v) = self.communication_mode {
      c.communication_mode = v;
    }
    if let Some(v) = self.early_warnings {
      c.early_warnings = v;
    }
    if let Some(v) = self.bot_confirm_before_send {
      c.bot_confirm_before_send = v;
    }
    if let Some(v) = self.alert_match_threshold {
      c.alert_match_threshold = v;
    }
    if let Some(v) = self.alert_frequency {
      c.alert_frequency = v;
    }
    Ok(())
  }
}

/// Everything the consumer app keeps per user; one record per user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
  pub user_id:       String,
  pub profile:       Profile,
  pub filters:       StructuredFilters,
  /// Free-text description of what the user wants; a soft ranking signal.
  pub voice_context: String,
  pub controls:      Controls,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl UserPreferences {
  pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
    Self {
      user_id:       user_id.into(),
      profile:       Profile::default(),
      filters:       StructuredFilters::default(),
      voice_context: String::new(),
      controls:      Controls::default(),
      created_at:    now,
      updated_at:    now,
    }
  }
}

/// Upsert payload. `profile` and `filters` replace their section wholesale;
/// `controls` merges field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesPatch {
  pub profile:       Option<Profile>,
  pub filters:       Option<StructuredFilters>,
  pub voice_context: Option<String>,
  pub controls:      Option<ControlsPatch>,
}

impl PreferencesPatch {
  pub fn apply(&self, prefs: &mut UserPreferences, now: DateTime<Utc>) -> Result<()> {
    if let Some(controls) = &self.controls {
      controls.apply(&mut prefs.controls)?;
    }
    if let Some(profile) = &self.profile {
      prefs.profile.clone_from(profile);
    }
    if let Some(filters) = &self.filters {
      prefs.filters.clone_from(filters);
    }
    if let Some(voice) = &self.voice_context {
      prefs.voice_context.clone_from(voice);
    }
    prefs.updated_at = now;
    Ok(())
  }
}

// ─── Saved apartments ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavedRole {
  User,
  Agent,
  Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMessage {
  pub id:   Uuid,
  pub role: SavedRole,
  pub text: String,
  pub at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSavedMessage {
  pub role: SavedRole,
  pub text: String,
}

/// A listing a consumer has kept, with its own small pipeline and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedApartment {
  pub user_id:      String,
  pub listing:      Listing,
  pub match_pct:    Option<u8>,
  pub saved_status: SavedStatus,
  pub contact_goal: Option<ContactGoal>,
  pub bot_outreach: bool,
  pub notes:        String,
  pub conversation: Vec<SavedMessage>,
  pub timeline:     Vec<TimelineEntry>,
  pub saved_at:     DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
  pub saved_status: Option<SavedStatus>,
  pub contact_goal: Option<ContactGoal>,
  pub bot_outreach: Option<bool>,
  pub match_pct:    Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedPatch {
  pub saved_status: Option<SavedStatus>,
  pub notes:        Option<String>,
  pub contact_goal: Option<ContactGoal>,
  pub bot_outreach: Option<bool>,
}

impl SavedApartment {
  /// First save of a listing; seeds the timeline with a "Saved" entry.
  pub fn new(
    user_id: impl Into<String>,
    listing: Listing,
    opts: &SaveOptions,
    now: DateTime<Utc>,
  ) -> Self {
    let mut saved = Self {
      user_id: user_id.into(),
      listing,
      match_pct: opts.match_pct,
      saved_status: opts.saved_status.unwrap_or_default(),
      contact_goal: opts.contact_goal,
      bot_outreach: opts.bot_outreach.unwrap_or(false),
      notes: String::new(),
      conversation: Vec::new(),
      timeline: Vec::new(),
      saved_at: now,
      updated_at: now,
    };
    saved.push_timeline(
      NewTimelineEntry {
        kind:   TimelineKind::Status,
        label:  "Saved".into(),
        detail: Some("Added from Discover".into()),
      },
      now,
    );
    saved
  }

  /// Saving an already-saved listing refreshes it in place.
  pub fn resave(&mut self, listing: Listing, opts: &SaveOptions, now: DateTime<Utc>) {
    self.listing = listing;
    if opts.match_pct.is_some() {
      self.match_pct = opts.match_pct;
    }
    if opts.contact_goal.is_some() {
      self.contact_goal = opts.contact_goal;
    }
    if let Some(bot) = opts.bot_outreach {
      self.bot_outreach = bot;
    }
    if let Some(status) = opts.saved_status {
      self.set_status(status, now);
    }
    self.updated_at = now;
  }

  pub fn apply_patch(&mut self, patch: &SavedPatch, now: DateTime<Utc>) {
    if let Some(status) = patch.saved_status {
      self.set_status(status, now);
    }
    if let Some(notes) = &patch.notes {
      self.notes.clone_from(notes);
    }
    if patch.contact_goal.is_some() {
      self.contact_goal = patch.contact_goal;
    }
    if let Some(bot) = patch.bot_outreach {
      self.bot_outreach = bot;
    }
    self.updated_at = now;
  }

  pub fn push_message(&mut self, msg: NewSavedMessage, now: DateTime<Utc>) -> Uuid {
    let id = Uuid::new_v4();
    self.conversation.push(SavedMessage { id, role: msg.role, text: msg.text, at: now });
    self.updated_at = now;
    id
  }

  pub fn push_timeline(&mut self, entry: NewTimelineEntry, now: DateTime<Utc>) {
    self.timeline.push(entry.stamp(now));
    self.updated_at = now;
  }

  /// A status change appends exactly one status entry; same status is a no-op.
  fn set_status(&mut self, status: SavedStatus, now: DateTime<Utc>) {
    if status == self.saved_status {
      return;
    }
    let previous = self.saved_status;
    self.saved_status = status;
    self.push_timeline(
      NewTimelineEntry {
        kind:   TimelineKind::Status,
        label:  status.to_string(),
        detail: Some(format!("{previous} → {status}")),
      },
      now,
    );
  }
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;

  pub fn listing(id: &str) -> Listing {
    Listing {
      id:              id.into(),
      title:           "Bright two-bedroom near the park".into(),
      description:     "Quiet street, renovated kitchen, close to the tram.".into(),
      address:         Some("Rue de la Gare 12".into()),
      commune:         Some("Bonnevoie".into()),
      property_type:   Some("Apartment".into()),
      rent_or_buy:     RentOrBuy::Rent,
      price:           1500.0,
      monthly_charges: Some(150.0),
      bedrooms:        Some(2),
      surface_m2:      Some(72.0),
      amenities:       BTreeSet::from([Amenity::Balcony, Amenity::Elevator]),
      url:             None,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::{fixtures::listing, *};

  #[test]
  fn controls_defaults() {
    let c = Controls::default();
    assert_eq!(c.alert_channels, BTreeSet::from([AlertChannel::InApp]));
    assert_eq!(c.alert_match_threshold.percent(), 80);
    assert_eq!(c.alert_frequency, AlertFrequency::Immediate);
    assert!(c.early_warnings);
  }

  #[test]
  fn threshold_accepts_only_the_four_levels() {
    let c: Controls =
      serde_json::from_value(json!({ "alert_match_threshold": 90 })).unwrap();
    assert_eq!(c.alert_match_threshold, MatchThreshold::Strong);
    assert!(
      serde_json::from_value::<Controls>(json!({ "alert_match_threshold": 85 }))
        .is_err()
    );
    assert_eq!(serde_json::to_value(MatchThreshold::NearPerfect).unwrap(), json!(95));
  }

  #[test]
  fn empty_channel_set_is_rejected() {
    let mut prefs = UserPreferences::new("u1", Utc::now());
    let patch = PreferencesPatch {
      controls: Some(ControlsPatch {
        alert_channels: Some(BTreeSet::new()),
        early_warnings: Some(false),
        ..ControlsPatch::default()
      }),
      ..PreferencesPatch::default()
    };
    let err = patch.apply(&mut prefs, Utc::now()).unwrap_err();
    assert!(matches!(
      err,
      Error::ValidationFailed(ValidationError::EmptyAlertChannels)
    ));
    // Rejected before anything changed.
    assert!(prefs.controls.early_warnings);
  }

  #[test]
  fn controls_patch_merges_fields() {
    let mut prefs = UserPreferences::new("u1", Utc::now());
    let patch: PreferencesPatch = serde_json::from_value(json!({
      "controls": { "alert_frequency": "daily_digest" },
      "voice_context": "close to a park",
    }))
    .unwrap();
    patch.apply(&mut prefs, Utc::now()).unwrap();
    assert_eq!(prefs.controls.alert_frequency, AlertFrequency::DailyDigest);
    assert_eq!(prefs.controls.alert_match_threshold, MatchThreshold::Good);
    assert_eq!(prefs.voice_context, "close to a park");
  }

  #[test]
  fn saving_seeds_one_timeline_entry_and_status_changes_add_one_each() {
    let now = Utc::now();
    let mut saved = SavedApartment::new("u1", listing("L1"), &SaveOptions::default(), now);
    assert_eq!(saved.saved_status, SavedStatus::Interested);
    assert_eq!(saved.timeline.len(), 1);
    assert_eq!(saved.timeline[0].label, "Saved");

    let patch = SavedPatch {
      saved_status: Some(SavedStatus::Contacted),
      ..SavedPatch::default()
    };
    saved.apply_patch(&patch, now);
    saved.apply_patch(&patch, now);
    assert_eq!(saved.timeline.len(), 2);
    assert_eq!(saved.timeline[1].label, "Contacted");

    saved.resave(listing("L1"), &SaveOptions::default(), now);
    assert_eq!(saved.timeline.len(), 2);
    assert_eq!(saved.saved_status, SavedStatus::Contacted);
  }
}
