//! SQL schema for the vocabulary store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per named vocabulary table.
CREATE TABLE IF NOT EXISTS vocab_tables (
    name        TEXT PRIMARY KEY,
    checksum    TEXT NOT NULL,     -- hex SHA-256 over all term rows, key order
    row_count   INTEGER NOT NULL,
    saved_at    TEXT NOT NULL      -- RFC 3339 UTC
);

-- Term rows are upserted on save and never deleted.
CREATE TABLE IF NOT EXISTS terms (
    table_name     TEXT NOT NULL REFERENCES vocab_tables(name),
    term_id        TEXT NOT NULL,
    language       TEXT NOT NULL,
    ontology       TEXT NOT NULL,
    parent_id      TEXT,
    other_parents  TEXT NOT NULL DEFAULT '[]',   -- JSON array
    label          TEXT NOT NULL DEFAULT '',
    definition     TEXT NOT NULL DEFAULT '',
    ui_label       TEXT NOT NULL DEFAULT '',
    ui_definition  TEXT NOT NULL DEFAULT '',
    ui_help        TEXT NOT NULL DEFAULT '',
    synonym        TEXT NOT NULL DEFAULT '[]',   -- JSON array, insertion order
    broad_synonym  TEXT NOT NULL DEFAULT '[]',
    narrow_synonym TEXT NOT NULL DEFAULT '[]',
    exact_synonym  TEXT NOT NULL DEFAULT '[]',
    updated        TEXT NOT NULL,
    preferred      INTEGER NOT NULL DEFAULT 0,
    deprecated     INTEGER NOT NULL DEFAULT 0,
    replaced_by    TEXT,
    version        TEXT,
    expected_type  TEXT NOT NULL DEFAULT 'categorical',
    PRIMARY KEY (table_name, term_id, language)
);

-- History is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS history (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id        TEXT NOT NULL UNIQUE,
    table_name      TEXT NOT NULL REFERENCES vocab_tables(name),
    term_id         TEXT NOT NULL,
    language        TEXT NOT NULL,
    recorded_at     TEXT NOT NULL,
    kind            TEXT NOT NULL,   -- 'added' | 'modified' | 'deprecated' | 'override'
    changed_fields  TEXT NOT NULL,   -- JSON array of field names
    previous_values TEXT NOT NULL,   -- JSON object
    current_values  TEXT NOT NULL    -- JSON object
);

CREATE INDEX IF NOT EXISTS history_term_idx ON history(table_name, term_id);

-- Write leases, at most one per table. The table need not exist yet.
CREATE TABLE IF NOT EXISTS leases (
    table_name  TEXT PRIMARY KEY,
    holder      TEXT NOT NULL,
    expires_at  INTEGER NOT NULL   -- unix milliseconds; later claims take over
);

PRAGMA user_version = 2;
";
