//! Conversation and timeline entries.
//!
//! Both logs are append-only: an entry is never edited or removed once
//! written. Reads are plain projections that can be re-run at will.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::lead::{OwnerId, PropertyId};

// ─── Conversation ────────────────────────────────────────────────────────────

/// The medium a message travelled through.
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
pub enum Channel {
  Email,
  WhatsApp,
  #[serde(rename = "Facebook Messenger")]
  #[strum(serialize = "Facebook Messenger")]
  FacebookMessenger,
  #[serde(rename = "Facebook Group")]
  #[strum(serialize = "Facebook Group")]
  FacebookGroup,
  #[serde(rename = "Website Form")]
  #[strum(serialize = "Website Form")]
  WebsiteForm,
  Phone,
  #[serde(rename = "SMS")]
  #[strum(serialize = "SMS")]
  Sms,
}

/// Who wrote a message.
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
pub enum Sender {
  User,
  Agent,
  Bot,
  Ai,
  /// An inbound reply from the property owner.
  Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
  pub id:          Uuid,
  pub property_id: PropertyId,
  pub channel:     Channel,
  pub sender:      Sender,
  pub message:     String,
  pub sent_at:     DateTime<Utc>,
}

/// Input to [`crate::store::LeadStore::append_conversation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversationEntry {
  pub channel: Channel,
  pub sender:  Sender,
  pub message: String,
  /// When the message was actually sent; defaults to the append time.
  /// Webhooks deliver late, so this may lie in the past.
  #[serde(default)]
  pub sent_at: Option<DateTime<Utc>>,
}

/// Read-side filter for a property's conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationFilter {
  pub channel:     Option<Channel>,
  /// Case-insensitive substring match over the message text.
  pub search_text: Option<String>,
}

impl ConversationFilter {
  pub fn matches(&self, entry: &ConversationEntry) -> bool {
    if let Some(channel) = self.channel
      && entry.channel != channel
    {
      return false;
    }
    match self.search_text.as_deref().map(str::trim) {
      Some(q) if !q.is_empty() => {
        entry.message.to_lowercase().contains(&q.to_lowercase())
      }
      _ => true,
    }
  }
}

// ─── Timeline ────────────────────────────────────────────────────────────────

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
pub enum TimelineKind {
  Status,
  Note,
  Contact,
  Viewing,
  Offer,
}

/// The record a timeline entry hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TimelineTarget {
  Property(PropertyId),
  Owner(OwnerId),
}

impl TimelineTarget {
  /// `(target_kind, target_id)` as stored.
  pub fn parts(self) -> (&'static str, i64) {
    match self {
      Self::Property(id) => ("property", id),
      Self::Owner(id) => ("owner", id),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
  pub id:     Uuid,
  pub kind:   TimelineKind,
  /// Short human-readable headline, e.g. "Sales stage: Contacted".
  pub label:  String,
  pub detail: Option<String>,
  pub at:     DateTime<Utc>,
}

/// Input for a timeline append; `id` and `at` are assigned on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTimelineEntry {
  pub kind:   TimelineKind,
  pub label:  String,
  #[serde(default)]
  pub detail: Option<String>,
}

impl NewTimelineEntry {
  pub fn stamp(self, at: DateTime<Utc>) -> TimelineEntry {
    TimelineEntry {
      id: Uuid::new_v4(),
      kind: self.kind,
      label: self.label,
      detail: self.detail,
      at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(channel: Channel, message: &str) -> ConversationEntry {
    ConversationEntry {
      id: Uuid::new_v4(),
      property_id: 1,
      channel,
      sender: Sender::Ai,
      message: message.into(),
      sent_at: Utc::now(),
    }
  }

  #[test]
  fn filter_by_channel_and_text() {
    let e = entry(Channel::WhatsApp, "Confirming Thursday 3pm viewing");

    assert!(ConversationFilter::default().matches(&e));
    assert!(
      ConversationFilter { channel: Some(Channel::WhatsApp), search_text: None }
        .matches(&e)
    );
    assert!(
      !ConversationFilter { channel: Some(Channel::Email), search_text: None }
        .matches(&e)
    );
    assert!(
      ConversationFilter { channel: None, search_text: Some("THURSDAY".into()) }
        .matches(&e)
    );
    assert!(
      !ConversationFilter { channel: None, search_text: Some("friday".into()) }
        .matches(&e)
    );
  }

  #[test]
  fn channel_labels() {
    assert_eq!(Channel::FacebookMessenger.to_string(), "Facebook Messenger");
    assert_eq!("SMS".parse::<Channel>().unwrap(), Channel::Sms);
    assert_eq!(
      serde_json::to_value(Channel::WebsiteForm).unwrap(),
      serde_json::json!("Website Form")
    );
  }
}
