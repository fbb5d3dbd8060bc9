//! SQL schema for the Leadline SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS owners (
    owner_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL DEFAULT '',
    email           TEXT NOT NULL,
    phone           TEXT NOT NULL DEFAULT '',
    notes           TEXT NOT NULL DEFAULT '',
    created_at      TEXT NOT NULL,   -- RFC 3339 UTC
    last_contact_at TEXT
);

-- Stage columns hold the human label verbatim. Rows written by older
-- ingestion code may carry labels outside the enumeration; they are read
-- back as-is and flagged, never rewritten silently.
CREATE TABLE IF NOT EXISTS properties (
    property_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id               INTEGER NOT NULL REFERENCES owners(owner_id),
    title                  TEXT NOT NULL,
    location               TEXT,
    address                TEXT,
    price                  REAL,
    rent_price             REAL,
    sale_price             REAL,
    bedrooms               INTEGER,
    bathrooms              INTEGER,
    rooms                  INTEGER,
    surface_m2             REAL,
    description            TEXT,
    listing_url            TEXT NOT NULL,
    transaction_type       TEXT,
    contact_email          TEXT,
    phone_number           TEXT,
    source_platform        TEXT,
    listing_ref            TEXT,
    viability_score        REAL,
    recommendation         TEXT,
    estimated_annual_gross REAL,
    degree_of_certainty    TEXT,
    valued_at              TEXT,
    sales_pipeline_stage   TEXT NOT NULL,
    chatbot_pipeline_stage TEXT NOT NULL,
    last_contact_at        TEXT,
    created_at             TEXT NOT NULL
);

-- Both logs are strictly append-only.
-- No UPDATE or DELETE is ever issued against these tables.
CREATE TABLE IF NOT EXISTS conversations (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,   -- tie-break on sent_at
    entry_id    TEXT NOT NULL UNIQUE,
    property_id INTEGER NOT NULL REFERENCES properties(property_id),
    channel     TEXT NOT NULL,
    sender      TEXT NOT NULL,
    message     TEXT NOT NULL,
    sent_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS timeline (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id    TEXT NOT NULL UNIQUE,
    target_kind TEXT NOT NULL,   -- 'property' | 'owner'
    target_id   INTEGER NOT NULL,
    kind        TEXT NOT NULL,
    label       TEXT NOT NULL,
    detail      TEXT,
    at          TEXT NOT NULL
);

-- Consumer-side records are stored as JSON documents keyed by user.
CREATE TABLE IF NOT EXISTS preferences (
    user_id TEXT PRIMARY KEY,
    doc     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
    user_id    TEXT NOT NULL,
    listing_id TEXT NOT NULL,
    state      TEXT NOT NULL,   -- 'suppressed' | 'queued' | 'delivered'
    doc        TEXT NOT NULL,
    PRIMARY KEY (user_id, listing_id)
);

CREATE TABLE IF NOT EXISTS saved (
    user_id    TEXT NOT NULL,
    listing_id TEXT NOT NULL,
    saved_at   TEXT NOT NULL,
    doc        TEXT NOT NULL,
    PRIMARY KEY (user_id, listing_id)
);

CREATE INDEX IF NOT EXISTS properties_owner_idx    ON properties(owner_id);
CREATE INDEX IF NOT EXISTS conversations_prop_idx  ON conversations(property_id, sent_at);
CREATE INDEX IF NOT EXISTS timeline_target_idx     ON timeline(target_kind, target_id);
CREATE INDEX IF NOT EXISTS alerts_state_idx        ON alerts(state);

PRAGMA user_version = 1;
";
