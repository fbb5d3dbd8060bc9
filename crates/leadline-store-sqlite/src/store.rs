//! [`SqliteStore`], the SQLite implementation of [`LeadStore`] and
//! [`ConsumerStore`].

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, Params, Row, Transaction};
use serde::Serialize;
use uuid::Uuid;

use leadline_core::{
  Error as CoreError,
  alert::{self, AlertRecord, AlertStatus},
  b2c::{
    AlertChannel, Listing, NewSavedMessage, PreferencesPatch, SaveOptions,
    SavedApartment, SavedPatch, UserPreferences,
  },
  bulk::BulkOp,
  lead::{
    NewOwner, NewProperty, Owner, OwnerId, OwnerPatch, Property, PropertyChange,
    PropertyId, PropertyPatch,
  },
  log::{
    ConversationEntry, ConversationFilter, NewConversationEntry,
    NewTimelineEntry, TimelineEntry, TimelineKind, TimelineTarget,
  },
  store::{ConsumerStore, LeadStore, OwnerQuery},
  upstream::ValuationResult,
};

use crate::{
  Result,
  encode::{
    CONVERSATION_COLUMNS, OWNER_COLUMNS, PROPERTY_COLUMNS, TIMELINE_COLUMNS,
    encode_dt, encode_label, encode_opt_dt, encode_uuid,
    read_conversation, read_doc, read_owner, read_property, read_timeline,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Leadline's stores backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside one transaction. It commits only if `f` succeeds; any
  /// error drops the transaction, which rolls it back.
  async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let out = f(&tx);
        if out.is_ok() {
          tx.commit()?;
        }
        Ok(out)
      })
      .await?
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Load a saved apartment, mutate it and write it back in one step.
  async fn with_saved<F>(
    &self,
    user_id: String,
    listing_id: String,
    f: F,
  ) -> Result<SavedApartment>
  where
    F: FnOnce(&mut SavedApartment, DateTime<Utc>) + Send + 'static,
  {
    self
      .transact(move |tx| {
        let mut saved = load_saved(tx, &user_id, &listing_id)?.ok_or(
          CoreError::SavedNotFound { user_id, listing_id },
        )?;
        f(&mut saved, Utc::now());
        put_saved(tx, &saved)?;
        Ok(saved)
      })
      .await
  }

  /// Overwrite a stage column with a raw label, bypassing validation.
  #[cfg(test)]
  pub(crate) async fn force_stage_label(
    &self,
    property_id: PropertyId,
    column: &'static str,
    label: &str,
  ) -> Result<()> {
    let label = label.to_owned();
    self
      .transact(move |tx| {
        tx.execute(
          &format!("UPDATE properties SET {column} = ?1 WHERE property_id = ?2"),
          rusqlite::params![label, property_id],
        )?;
        Ok(())
      })
      .await
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn collect<T, P: Params>(
  conn: &Connection,
  sql: &str,
  params: P,
  read: impl Fn(&Row<'_>) -> Result<T>,
) -> Result<Vec<T>> {
  let mut stmt = conn.prepare(sql)?;
  let mut rows = stmt.query(params)?;
  let mut out = Vec::new();
  while let Some(row) = rows.next()? {
    out.push(read(row)?);
  }
  Ok(out)
}

fn select_properties<P: Params>(
  conn: &Connection,
  filter: &str,
  params: P,
) -> Result<Vec<Property>> {
  collect(
    conn,
    &format!("SELECT {PROPERTY_COLUMNS} FROM properties {filter} ORDER BY property_id"),
    params,
    read_property,
  )
}

fn load_property(conn: &Connection, id: PropertyId) -> Result<Option<Property>> {
  Ok(select_properties(conn, "WHERE property_id = ?1", [id])?.pop())
}

fn require_property(conn: &Connection, id: PropertyId) -> Result<Property> {
  load_property(conn, id)?.ok_or_else(|| CoreError::PropertyNotFound(id).into())
}

fn load_owner(conn: &Connection, id: OwnerId) -> Result<Option<Owner>> {
  let Some(mut owner) = collect(
    conn,
    &format!("SELECT {OWNER_COLUMNS} FROM owners WHERE owner_id = ?1"),
    [id],
    read_owner,
  )?
  .pop() else {
    return Ok(None);
  };
  owner.properties = select_properties(conn, "WHERE owner_id = ?1", [id])?;
  Ok(Some(owner))
}

fn require_owner(conn: &Connection, id: OwnerId) -> Result<Owner> {
  load_owner(conn, id)?.ok_or_else(|| CoreError::OwnerNotFound(id).into())
}

fn owner_exists(conn: &Connection, id: OwnerId) -> Result<()> {
  conn
    .query_row("SELECT 1 FROM owners WHERE owner_id = ?1", [id], |_| Ok(()))
    .optional()?
    .ok_or_else(|| CoreError::OwnerNotFound(id).into())
}

/// Every owner with its properties, newest owner first.
fn load_owners(conn: &Connection) -> Result<Vec<Owner>> {
  let mut owners = collect(
    conn,
    &format!(
      "SELECT {OWNER_COLUMNS} FROM owners ORDER BY created_at DESC, owner_id DESC"
    ),
    [],
    read_owner,
  )?;

  let mut by_owner: HashMap<OwnerId, Vec<Property>> = HashMap::new();
  for p in select_properties(conn, "", [])? {
    by_owner.entry(p.owner_id).or_default().push(p);
  }
  for owner in &mut owners {
    owner.properties = by_owner.remove(&owner.id).unwrap_or_default();
  }
  Ok(owners)
}

fn target_exists(conn: &Connection, target: TimelineTarget) -> Result<()> {
  match target {
    TimelineTarget::Owner(id) => owner_exists(conn, id),
    TimelineTarget::Property(id) => require_property(conn, id).map(|_| ()),
  }
}

// ─── Write helpers ───────────────────────────────────────────────────────────

fn insert_owner(tx: &Transaction<'_>, input: &NewOwner, now: DateTime<Utc>) -> Result<OwnerId> {
  tx.execute(
    "INSERT INTO owners (name, email, phone, notes, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      input.name,
      input.email.trim(),
      input.phone,
      input.notes,
      encode_dt(now),
    ],
  )?;
  Ok(tx.last_insert_rowid())
}

fn insert_property(
  tx: &Transaction<'_>,
  owner_id: OwnerId,
  input: &NewProperty,
  now: DateTime<Utc>,
) -> Result<PropertyId> {
  let listing_url = input.listing_url.as_deref().map(str::trim).unwrap_or_default();
  tx.execute(
    "INSERT INTO properties (
       owner_id, title, location, address, price, rent_price, sale_price,
       bedrooms, bathrooms, rooms, surface_m2, description, listing_url,
       transaction_type, contact_email, phone_number, source_platform,
       listing_ref, sales_pipeline_stage, chatbot_pipeline_stage, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
               ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
    rusqlite::params![
      owner_id,
      input.resolved_title(),
      input.location,
      input.address,
      input.price,
      input.rent_price,
      input.sale_price,
      input.bedrooms,
      input.bathrooms,
      input.rooms,
      input.surface_m2,
      input.description,
      listing_url,
      input.transaction_type,
      input.contact_email,
      input.phone_number,
      input.source_platform,
      input.listing_ref,
      input.sales_pipeline_stage.unwrap_or_default().to_string(),
      input.chatbot_pipeline_stage.unwrap_or_default().to_string(),
      encode_dt(now),
    ],
  )?;
  Ok(tx.last_insert_rowid())
}

/// Write every non-valuation column of `p`.
fn write_property(tx: &Transaction<'_>, p: &Property) -> Result<()> {
  tx.execute(
    "UPDATE properties SET
       owner_id = ?2, title = ?3, location = ?4, address = ?5, price = ?6,
       rent_price = ?7, sale_price = ?8, bedrooms = ?9, bathrooms = ?10,
       rooms = ?11, surface_m2 = ?12, description = ?13, listing_url = ?14,
       transaction_type = ?15, contact_email = ?16, phone_number = ?17,
       source_platform = ?18, listing_ref = ?19,
       sales_pipeline_stage = ?20, chatbot_pipeline_stage = ?21
     WHERE property_id = ?1",
    rusqlite::params![
      p.id,
      p.owner_id,
      p.title,
      p.location,
      p.address,
      p.price,
      p.rent_price,
      p.sale_price,
      p.bedrooms,
      p.bathrooms,
      p.rooms,
      p.surface_m2,
      p.description,
      p.listing_url,
      p.transaction_type,
      p.contact_email,
      p.phone_number,
      p.source_platform,
      p.listing_ref,
      p.sales_pipeline_stage.to_string(),
      p.chatbot_pipeline_stage.to_string(),
    ],
  )?;
  Ok(())
}

fn insert_timeline(
  tx: &Transaction<'_>,
  target: TimelineTarget,
  entry: &TimelineEntry,
) -> Result<()> {
  let (target_kind, target_id) = target.parts();
  tx.execute(
    "INSERT INTO timeline (entry_id, target_kind, target_id, kind, label, detail, at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      encode_uuid(entry.id),
      target_kind,
      target_id,
      encode_label(&entry.kind)?,
      entry.label,
      entry.detail,
      encode_dt(entry.at),
    ],
  )?;
  Ok(())
}

/// Advance `last_contact_at` on a property and its owner; never moves it
/// backwards.
fn touch_contact(tx: &Transaction<'_>, p: &mut Property, at: DateTime<Utc>) -> Result<()> {
  let at_str = encode_dt(at);
  tx.execute(
    "UPDATE properties SET last_contact_at = ?1
     WHERE property_id = ?2 AND (last_contact_at IS NULL OR last_contact_at < ?1)",
    rusqlite::params![at_str, p.id],
  )?;
  tx.execute(
    "UPDATE owners SET last_contact_at = ?1
     WHERE owner_id = ?2 AND (last_contact_at IS NULL OR last_contact_at < ?1)",
    rusqlite::params![at_str, p.owner_id],
  )?;
  if p.last_contact_at.is_none_or(|prev| prev < at) {
    p.last_contact_at = Some(at);
  }
  Ok(())
}

/// Mirror each stage transition onto the timeline and record contact.
fn log_change(
  tx: &Transaction<'_>,
  p: &mut Property,
  change: &PropertyChange,
  now: DateTime<Utc>,
) -> Result<()> {
  for transition in &change.transitions {
    let entry = transition.timeline_entry().stamp(now);
    insert_timeline(tx, TimelineTarget::Property(p.id), &entry)?;
  }
  if change.is_contact() {
    touch_contact(tx, p, now)?;
  }
  Ok(())
}

fn load_json<T: serde::de::DeserializeOwned, P: Params>(
  conn: &Connection,
  sql: &str,
  params: P,
) -> Result<Option<T>> {
  Ok(collect(conn, sql, params, read_doc)?.pop())
}

fn load_preferences(conn: &Connection, user_id: &str) -> Result<Option<UserPreferences>> {
  load_json(conn, "SELECT doc FROM preferences WHERE user_id = ?1", [user_id])
}

fn load_alert(conn: &Connection, user_id: &str, listing_id: &str) -> Result<Option<AlertRecord>> {
  load_json(
    conn,
    "SELECT doc FROM alerts WHERE user_id = ?1 AND listing_id = ?2",
    [user_id, listing_id],
  )
}

fn alert_state(status: &AlertStatus) -> &'static str {
  match status {
    AlertStatus::Suppressed { .. } => "suppressed",
    AlertStatus::Queued { .. } => "queued",
    AlertStatus::Delivered { .. } => "delivered",
  }
}

fn put_alert(tx: &Transaction<'_>, record: &AlertRecord) -> Result<()> {
  tx.execute(
    "INSERT INTO alerts (user_id, listing_id, state, doc) VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (user_id, listing_id)
     DO UPDATE SET state = excluded.state, doc = excluded.doc",
    rusqlite::params![
      record.user_id,
      record.listing_id,
      alert_state(&record.status),
      to_doc(record)?,
    ],
  )?;
  Ok(())
}

fn load_saved(conn: &Connection, user_id: &str, listing_id: &str) -> Result<Option<SavedApartment>> {
  load_json(
    conn,
    "SELECT doc FROM saved WHERE user_id = ?1 AND listing_id = ?2",
    [user_id, listing_id],
  )
}

fn put_saved(tx: &Transaction<'_>, saved: &SavedApartment) -> Result<()> {
  tx.execute(
    "INSERT INTO saved (user_id, listing_id, saved_at, doc) VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (user_id, listing_id) DO UPDATE SET doc = excluded.doc",
    rusqlite::params![
      saved.user_id,
      saved.listing.id,
      encode_dt(saved.saved_at),
      to_doc(saved)?,
    ],
  )?;
  Ok(())
}

fn to_doc<T: Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

// ─── LeadStore impl ──────────────────────────────────────────────────────────

impl LeadStore for SqliteStore {
  type Error = crate::Error;

  // ── Owners ────────────────────────────────────────────────────────────────

  async fn create_owner(&self, input: NewOwner) -> Result<Owner> {
    input.validate()?;
    let owner = self
      .transact(move |tx| {
        let now = Utc::now();
        let id = insert_owner(tx, &input, now)?;
        if !input.property.is_empty() {
          insert_property(tx, id, &input.property, now)?;
        }
        require_owner(tx, id)
      })
      .await?;
    tracing::debug!(owner_id = owner.id, properties = owner.properties.len(), "owner created");
    Ok(owner)
  }

  async fn get_owner(&self, id: OwnerId) -> Result<Option<Owner>> {
    self.read(move |conn| load_owner(conn, id)).await
  }

  async fn list_owners(&self, query: &OwnerQuery) -> Result<Vec<Owner>> {
    let owners = self.read(load_owners).await?;
    Ok(query.apply(owners))
  }

  async fn update_owner(&self, id: OwnerId, patch: OwnerPatch) -> Result<Owner> {
    self
      .transact(move |tx| {
        let mut owner = require_owner(tx, id)?;
        patch.apply(&mut owner)?;
        tx.execute(
          "UPDATE owners SET name = ?2, email = ?3, phone = ?4, notes = ?5
           WHERE owner_id = ?1",
          rusqlite::params![id, owner.name, owner.email, owner.phone, owner.notes],
        )?;
        Ok(owner)
      })
      .await
  }

  // ── Properties ────────────────────────────────────────────────────────────

  async fn add_property(&self, owner_id: OwnerId, input: NewProperty) -> Result<Property> {
    input.validate()?;
    self
      .transact(move |tx| {
        owner_exists(tx, owner_id)?;
        let url = input.listing_url.as_deref().map(str::trim).unwrap_or_default();
        let existing = select_properties(
          tx,
          "WHERE owner_id = ?1 AND listing_url = ?2",
          rusqlite::params![owner_id, url],
        )?
        .pop();

        if let Some(mut property) = existing {
          input.merge_into(&mut property);
          write_property(tx, &property)?;
          tracing::debug!(property_id = property.id, "listing already held, merged");
          return Ok(property);
        }
        let id = insert_property(tx, owner_id, &input, Utc::now())?;
        tracing::debug!(owner_id, property_id = id, "property added");
        require_property(tx, id)
      })
      .await
  }

  async fn transfer_property(&self, id: PropertyId, new_owner: OwnerId) -> Result<Property> {
    self
      .transact(move |tx| {
        let mut property = require_property(tx, id)?;
        if property.owner_id == new_owner {
          return Ok(property);
        }
        owner_exists(tx, new_owner)?;

        let previous = property.owner_id;
        property.owner_id = new_owner;
        write_property(tx, &property)?;
        let entry = NewTimelineEntry {
          kind:   TimelineKind::Note,
          label:  "Transferred".into(),
          detail: Some(format!("Owner {previous} → {new_owner}")),
        }
        .stamp(Utc::now());
        insert_timeline(tx, TimelineTarget::Property(id), &entry)?;
        tracing::debug!(property_id = id, from = previous, to = new_owner, "property transferred");
        Ok(property)
      })
      .await
  }

  async fn get_property(&self, id: PropertyId) -> Result<Option<Property>> {
    self.read(move |conn| load_property(conn, id)).await
  }

  async fn update_property(&self, id: PropertyId, patch: PropertyPatch) -> Result<Property> {
    self
      .transact(move |tx| {
        let mut property = require_property(tx, id)?;
        let change = patch.apply(&mut property)?;
        write_property(tx, &property)?;
        log_change(tx, &mut property, &change, Utc::now())?;
        Ok(property)
      })
      .await
  }

  async fn apply_valuation(&self, id: PropertyId, result: ValuationResult) -> Result<Property> {
    self
      .transact(move |tx| {
        let mut property = require_property(tx, id)?;
        property.viability_score = Some(result.viability_score);
        property.recommendation = Some(result.recommendation);
        property.degree_of_certainty = Some(result.degree_of_certainty);
        property.estimated_annual_gross = result.estimated_annual_gross;
        property.valued_at = Some(Utc::now());

        tx.execute(
          "UPDATE properties SET
             viability_score = ?2, recommendation = ?3, degree_of_certainty = ?4,
             estimated_annual_gross = ?5, valued_at = ?6
           WHERE property_id = ?1",
          rusqlite::params![
            id,
            property.viability_score,
            property.recommendation.as_ref().map(encode_label).transpose()?,
            property.degree_of_certainty,
            property.estimated_annual_gross,
            encode_opt_dt(property.valued_at),
          ],
        )?;
        Ok(property)
      })
      .await
  }

  async fn apply_bulk_op(&self, owner_id: OwnerId, op: &BulkOp) -> Result<Vec<Property>> {
    let op = *op;
    self
      .transact(move |tx| {
        owner_exists(tx, owner_id)?;
        let now = Utc::now();
        let mut properties = select_properties(tx, "WHERE owner_id = ?1", [owner_id])?;
        for property in &mut properties {
          let change = op.apply(property)?;
          if change.is_empty() {
            continue;
          }
          write_property(tx, property)?;
          log_change(tx, property, &change, now)?;
        }
        tracing::debug!(owner_id, properties = properties.len(), "bulk op applied");
        Ok(properties)
      })
      .await
  }

  // ── Logs ──────────────────────────────────────────────────────────────────

  async fn append_conversation(
    &self,
    property_id: PropertyId,
    entry: NewConversationEntry,
  ) -> Result<Uuid> {
    self
      .transact(move |tx| {
        let mut property = require_property(tx, property_id)?;
        let id = Uuid::new_v4();
        let sent_at = entry.sent_at.unwrap_or_else(Utc::now);
        tx.execute(
          "INSERT INTO conversations (entry_id, property_id, channel, sender, message, sent_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            encode_uuid(id),
            property_id,
            encode_label(&entry.channel)?,
            encode_label(&entry.sender)?,
            entry.message,
            encode_dt(sent_at),
          ],
        )?;
        touch_contact(tx, &mut property, sent_at)?;
        tracing::debug!(property_id, channel = %entry.channel, "conversation entry appended");
        Ok(id)
      })
      .await
  }

  async fn conversations(
    &self,
    property_id: PropertyId,
    filter: &ConversationFilter,
  ) -> Result<Vec<ConversationEntry>> {
    let mut entries = self
      .read(move |conn| {
        require_property(conn, property_id)?;
        collect(
          conn,
          &format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE property_id = ?1 ORDER BY sent_at, seq"
          ),
          [property_id],
          read_conversation,
        )
      })
      .await?;
    entries.retain(|e| filter.matches(e));
    Ok(entries)
  }

  async fn append_timeline(
    &self,
    target: TimelineTarget,
    entry: NewTimelineEntry,
  ) -> Result<TimelineEntry> {
    self
      .transact(move |tx| {
        target_exists(tx, target)?;
        let entry = entry.stamp(Utc::now());
        insert_timeline(tx, target, &entry)?;
        Ok(entry)
      })
      .await
  }

  async fn timeline(&self, target: TimelineTarget) -> Result<Vec<TimelineEntry>> {
    self
      .read(move |conn| {
        target_exists(conn, target)?;
        let (target_kind, target_id) = target.parts();
        collect(
          conn,
          &format!(
            "SELECT {TIMELINE_COLUMNS} FROM timeline
             WHERE target_kind = ?1 AND target_id = ?2 ORDER BY at, seq"
          ),
          rusqlite::params![target_kind, target_id],
          read_timeline,
        )
      })
      .await
  }
}

// ─── ConsumerStore impl ──────────────────────────────────────────────────────

impl ConsumerStore for SqliteStore {
  type Error = crate::Error;

  // ── Preferences ───────────────────────────────────────────────────────────

  async fn get_preferences(&self, user_id: String) -> Result<Option<UserPreferences>> {
    self.read(move |conn| load_preferences(conn, &user_id)).await
  }

  async fn upsert_preferences(
    &self,
    user_id: String,
    patch: PreferencesPatch,
  ) -> Result<UserPreferences> {
    self
      .transact(move |tx| {
        let now = Utc::now();
        let mut prefs = load_preferences(tx, &user_id)?
          .unwrap_or_else(|| UserPreferences::new(user_id.as_str(), now));
        patch.apply(&mut prefs, now)?;
        tx.execute(
          "INSERT INTO preferences (user_id, doc) VALUES (?1, ?2)
           ON CONFLICT (user_id) DO UPDATE SET doc = excluded.doc",
          rusqlite::params![user_id, to_doc(&prefs)?],
        )?;
        Ok(prefs)
      })
      .await
  }

  // ── Alerts ────────────────────────────────────────────────────────────────

  async fn record_alert_score(
    &self,
    user_id: String,
    listing_id: String,
    match_pct: u8,
  ) -> Result<AlertRecord> {
    self
      .transact(move |tx| {
        let prior = load_alert(tx, &user_id, &listing_id)?;
        let controls = load_preferences(tx, &user_id)?
          .map(|p| p.controls)
          .unwrap_or_default();
        let record =
          alert::decide(prior, &controls, &user_id, &listing_id, match_pct, Utc::now())?;
        put_alert(tx, &record)?;
        tracing::debug!(
          user_id = %user_id,
          listing_id = %listing_id,
          match_pct,
          state = alert_state(&record.status),
          "alert decision"
        );
        Ok(record)
      })
      .await
  }

  async fn ignore_alert(&self, user_id: String, listing_id: String) -> Result<AlertRecord> {
    self
      .transact(move |tx| {
        let prior = load_alert(tx, &user_id, &listing_id)?;
        let record = alert::ignore(prior, &user_id, &listing_id, Utc::now());
        put_alert(tx, &record)?;
        Ok(record)
      })
      .await
  }

  async fn list_alerts(&self, user_id: String) -> Result<Vec<AlertRecord>> {
    self
      .read(move |conn| {
        collect(
          conn,
          "SELECT doc FROM alerts WHERE user_id = ?1 ORDER BY listing_id",
          [user_id],
          read_doc,
        )
      })
      .await
  }

  async fn queued_alerts(&self) -> Result<Vec<AlertRecord>> {
    self
      .read(|conn| {
        collect(
          conn,
          "SELECT doc FROM alerts WHERE state = 'queued' ORDER BY user_id, listing_id",
          [],
          read_doc,
        )
      })
      .await
  }

  async fn mark_delivered(
    &self,
    user_id: String,
    listing_id: String,
    channels: Vec<AlertChannel>,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    self
      .transact(move |tx| match load_alert(tx, &user_id, &listing_id)? {
        Some(record) if matches!(record.status, AlertStatus::Queued { .. }) => {
          put_alert(tx, &record.delivered(channels, at))?;
          Ok(true)
        }
        _ => Ok(false),
      })
      .await
  }

  // ── Saved apartments ──────────────────────────────────────────────────────

  async fn save_listing(
    &self,
    user_id: String,
    listing: Listing,
    opts: SaveOptions,
  ) -> Result<SavedApartment> {
    self
      .transact(move |tx| {
        let now = Utc::now();
        let saved = match load_saved(tx, &user_id, &listing.id)? {
          Some(mut saved) => {
            saved.resave(listing, &opts, now);
            saved
          }
          None => SavedApartment::new(user_id, listing, &opts, now),
        };
        put_saved(tx, &saved)?;
        Ok(saved)
      })
      .await
  }

  async fn get_saved(
    &self,
    user_id: String,
    listing_id: String,
  ) -> Result<Option<SavedApartment>> {
    self
      .read(move |conn| load_saved(conn, &user_id, &listing_id))
      .await
  }

  async fn list_saved(&self, user_id: String) -> Result<Vec<SavedApartment>> {
    self
      .read(move |conn| {
        collect(
          conn,
          "SELECT doc FROM saved WHERE user_id = ?1 ORDER BY saved_at DESC, listing_id",
          [user_id],
          read_doc,
        )
      })
      .await
  }

  async fn update_saved(
    &self,
    user_id: String,
    listing_id: String,
    patch: SavedPatch,
  ) -> Result<SavedApartment> {
    self
      .with_saved(user_id, listing_id, move |saved, now| saved.apply_patch(&patch, now))
      .await
  }

  async fn append_saved_message(
    &self,
    user_id: String,
    listing_id: String,
    message: NewSavedMessage,
  ) -> Result<SavedApartment> {
    self
      .with_saved(user_id, listing_id, move |saved, now| {
        saved.push_message(message, now);
      })
      .await
  }

  async fn add_saved_timeline(
    &self,
    user_id: String,
    listing_id: String,
    entry: NewTimelineEntry,
  ) -> Result<SavedApartment> {
    self
      .with_saved(user_id, listing_id, move |saved, now| saved.push_timeline(entry, now))
      .await
  }

  async fn remove_saved(&self, user_id: String, listing_id: String) -> Result<bool> {
    self
      .transact(move |tx| {
        let removed = tx.execute(
          "DELETE FROM saved WHERE user_id = ?1 AND listing_id = ?2",
          [user_id, listing_id],
        )?;
        Ok(removed > 0)
      })
      .await
  }
}
