//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (nanoseconds, `Z`
//! suffix) so that lexical order is chronological order. UUIDs are stored
//! as hyphenated lowercase strings. Closed enums are stored as their serde
//! labels; stage columns as the stage's display label.

use chrono::{DateTime, SecondsFormat, Utc};
use leadline_core::{
  lead::{Owner, Property},
  log::{ConversationEntry, TimelineEntry},
  stage::RecordedStage,
};
use rusqlite::Row;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_opt_dt(dt: Option<DateTime<Utc>>) -> Option<String> {
  dt.map(encode_dt)
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enum labels ─────────────────────────────────────────────────────────────

/// The serde label of a unit enum variant, e.g. `"Strong Buy"`.
pub fn encode_label<T: Serialize>(value: &T) -> Result<String> {
  match serde_json::to_value(value)? {
    serde_json::Value::String(s) => Ok(s),
    other => Ok(other.to_string()),
  }
}

pub fn decode_label<T: DeserializeOwned>(column: &'static str, s: &str) -> Result<T> {
  serde_json::from_value(serde_json::Value::String(s.to_owned())).map_err(|_| {
    Error::UnknownValue { column, value: s.to_owned() }
  })
}

// ─── Row readers ─────────────────────────────────────────────────────────────

pub const OWNER_COLUMNS: &str =
  "owner_id, name, email, phone, notes, created_at, last_contact_at";

/// Reads an owner row; properties are attached by the caller.
pub fn read_owner(row: &Row<'_>) -> Result<Owner> {
  Ok(Owner {
    id:              row.get(0)?,
    name:            row.get(1)?,
    email:           row.get(2)?,
    phone:           row.get(3)?,
    notes:           row.get(4)?,
    created_at:      decode_dt(&row.get::<_, String>(5)?)?,
    last_contact_at: decode_opt_dt(row.get(6)?)?,
    properties:      Vec::new(),
  })
}

pub const PROPERTY_COLUMNS: &str = "
  property_id, owner_id, title, location, address,
  price, rent_price, sale_price, bedrooms, bathrooms,
  rooms, surface_m2, description, listing_url, transaction_type,
  contact_email, phone_number, source_platform, listing_ref, viability_score,
  recommendation, estimated_annual_gross, degree_of_certainty, valued_at,
  sales_pipeline_stage, chatbot_pipeline_stage, last_contact_at, created_at";

pub fn read_property(row: &Row<'_>) -> Result<Property> {
  let recommendation = row
    .get::<_, Option<String>>(20)?
    .map(|s| decode_label("recommendation", &s))
    .transpose()?;

  Ok(Property {
    id: row.get(0)?,
    owner_id: row.get(1)?,
    title: row.get(2)?,
    location: row.get(3)?,
    address: row.get(4)?,
    price: row.get(5)?,
    rent_price: row.get(6)?,
    sale_price: row.get(7)?,
    bedrooms: row.get(8)?,
    bathrooms: row.get(9)?,
    rooms: row.get(10)?,
    surface_m2: row.get(11)?,
    description: row.get(12)?,
    listing_url: row.get(13)?,
    transaction_type: row.get(14)?,
    contact_email: row.get(15)?,
    phone_number: row.get(16)?,
    source_platform: row.get(17)?,
    listing_ref: row.get(18)?,
    viability_score: row.get(19)?,
    recommendation,
    estimated_annual_gross: row.get(21)?,
    degree_of_certainty: row.get(22)?,
    valued_at: decode_opt_dt(row.get(23)?)?,
    sales_pipeline_stage: RecordedStage::decode(&row.get::<_, String>(24)?),
    chatbot_pipeline_stage: RecordedStage::decode(&row.get::<_, String>(25)?),
    last_contact_at: decode_opt_dt(row.get(26)?)?,
    created_at: decode_dt(&row.get::<_, String>(27)?)?,
  })
}

pub const CONVERSATION_COLUMNS: &str =
  "entry_id, property_id, channel, sender, message, sent_at";

pub fn read_conversation(row: &Row<'_>) -> Result<ConversationEntry> {
  Ok(ConversationEntry {
    id:          decode_uuid(&row.get::<_, String>(0)?)?,
    property_id: row.get(1)?,
    channel:     decode_label("channel", &row.get::<_, String>(2)?)?,
    sender:      decode_label("sender", &row.get::<_, String>(3)?)?,
    message:     row.get(4)?,
    sent_at:     decode_dt(&row.get::<_, String>(5)?)?,
  })
}

pub const TIMELINE_COLUMNS: &str = "entry_id, kind, label, detail, at";

pub fn read_timeline(row: &Row<'_>) -> Result<TimelineEntry> {
  Ok(TimelineEntry {
    id:     decode_uuid(&row.get::<_, String>(0)?)?,
    kind:   decode_label("timeline kind", &row.get::<_, String>(1)?)?,
    label:  row.get(2)?,
    detail: row.get(3)?,
    at:     decode_dt(&row.get::<_, String>(4)?)?,
  })
}

/// Reads a single `doc` column holding a JSON document.
pub fn read_doc<T: DeserializeOwned>(row: &Row<'_>) -> Result<T> {
  Ok(serde_json::from_str(&row.get::<_, String>(0)?)?)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use leadline_core::lead::Recommendation;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let early = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let late = early + chrono::Duration::nanoseconds(1_500);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }

  #[test]
  fn labels_use_serde_names() {
    assert_eq!(encode_label(&Recommendation::StrongBuy).unwrap(), "Strong Buy");
    let r: Recommendation = decode_label("recommendation", "Avoid").unwrap();
    assert_eq!(r, Recommendation::Avoid);
    assert!(matches!(
      decode_label::<Recommendation>("recommendation", "Maybe"),
      Err(Error::UnknownValue { column: "recommendation", .. })
    ));
  }
}
