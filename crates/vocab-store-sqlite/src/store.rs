//! [`SqliteStore`]: the SQLite implementation of [`TableStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::{debug, warn};
use vocab_core::{history::HistoryEntry, store::TableStore, table::Table};

use crate::{
  Error, Result,
  encode::{HISTORY_COLUMNS, RawHistory, RawTerm, TERM_COLUMNS, checksum, encode_dt},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// How long a write lease lasts before another writer may take it over.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30 * 60);

/// Vocabulary tables backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Write
/// leases live in the database, so separate handles and processes on the
/// same file exclude each other.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  lease_ttl_ms:    i64,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Leases older than `ttl` are treated as abandoned.
  pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
    self.lease_ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn, lease_ttl_ms: 0 }.with_lease_ttl(DEFAULT_LEASE_TTL);
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
}

// ─── TableStore impl ─────────────────────────────────────────────────────────

impl TableStore for SqliteStore {
  type Error = Error;

  async fn load_table(&self, name: &str) -> Result<Table> {
    let table_name = name.to_owned();
    let (recorded, rows): (Option<String>, Vec<RawTerm>) = self
      .conn
      .call(move |conn| {
        let recorded: Option<String> = conn
          .query_row(
            "SELECT checksum FROM vocab_tables WHERE name = ?1",
            rusqlite::params![table_name],
            |r| r.get(0),
          )
          .optional()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {TERM_COLUMNS} FROM terms WHERE table_name = ?1 ORDER BY term_id, language"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![table_name], RawTerm::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((recorded, rows))
      })
      .await?;

    let Some(expected) = recorded else {
      debug!(table = name, "no stored table; starting empty");
      return Ok(Table::new(name));
    };
    let actual = checksum(&rows);
    if actual != expected {
      return Err(Error::Corrupt { table: name.to_owned(), expected, actual });
    }

    let records = rows
      .into_iter()
      .map(RawTerm::into_record)
      .collect::<Result<Vec<_>>>()?;
    debug!(table = name, rows = records.len(), "table loaded");
    Ok(Table::from_records(name, records)?)
  }

  async fn save_table(&self, table: &Table, history: &[HistoryEntry]) -> Result<()> {
    let rows = table
      .records()
      .map(RawTerm::from_record)
      .collect::<Result<Vec<_>>>()?;
    let entries = history
      .iter()
      .map(RawHistory::from_entry)
      .collect::<Result<Vec<_>>>()?;
    let digest = checksum(&rows);
    let name = table.name().to_owned();
    let saved_at = encode_dt(Utc::now());
    let row_count = rows.len() as i64;
    let entry_count = entries.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO vocab_tables (name, checksum, row_count, saved_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(name) DO UPDATE SET
             checksum = excluded.checksum,
             row_count = excluded.row_count,
             saved_at = excluded.saved_at",
          rusqlite::params![name, digest, row_count, saved_at],
        )?;

        {
          let mut upsert = tx.prepare(&format!(
            "INSERT INTO terms (table_name, {TERM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                     ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
             ON CONFLICT(table_name, term_id, language) DO UPDATE SET
               ontology = excluded.ontology,
               parent_id = excluded.parent_id,
               other_parents = excluded.other_parents,
               label = excluded.label,
               definition = excluded.definition,
               ui_label = excluded.ui_label,
               ui_definition = excluded.ui_definition,
               ui_help = excluded.ui_help,
               synonym = excluded.synonym,
               broad_synonym = excluded.broad_synonym,
               narrow_synonym = excluded.narrow_synonym,
               exact_synonym = excluded.exact_synonym,
               updated = excluded.updated,
               preferred = excluded.preferred,
               deprecated = excluded.deprecated,
               replaced_by = excluded.replaced_by,
               version = excluded.version,
               expected_type = excluded.expected_type"
          ))?;
          for row in &rows {
            upsert.execute(rusqlite::params![
              name,
              row.term_id,
              row.language,
              row.ontology,
              row.parent_id,
              row.other_parents,
              row.label,
              row.definition,
              row.ui_label,
              row.ui_definition,
              row.ui_help,
              row.synonym,
              row.broad_synonym,
              row.narrow_synonym,
              row.exact_synonym,
              row.updated,
              row.preferred,
              row.deprecated,
              row.replaced_by,
              row.version,
              row.expected_type,
            ])?;
          }

          let mut append = tx.prepare(&format!(
            "INSERT INTO history (table_name, {HISTORY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
          ))?;
          for entry in &entries {
            append.execute(rusqlite::params![
              name,
              entry.entry_id,
              entry.term_id,
              entry.language,
              entry.recorded_at,
              entry.kind,
              entry.changed_fields,
              entry.previous_values,
              entry.current_values,
            ])?;
          }
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(table = table.name(), rows = row_count, entries = entry_count, "table saved");
    Ok(())
  }

  async fn history(&self, table: &str, id: &str) -> Result<Vec<HistoryEntry>> {
    let table = table.to_owned();
    let id = id.to_owned();

    let rows: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {HISTORY_COLUMNS} FROM history
           WHERE table_name = ?1 AND term_id = ?2
           ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![table, id], RawHistory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(RawHistory::into_entry).collect()
  }

  async fn try_lease(&self, table: &str, holder: &str) -> Result<bool> {
    let table_name = table.to_owned();
    let holder = holder.to_owned();
    let now = Utc::now().timestamp_millis();
    let expires_at = now.saturating_add(self.lease_ttl_ms);

    let (expired, claimed) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let expired = tx.execute(
          "DELETE FROM leases WHERE table_name = ?1 AND expires_at <= ?2",
          rusqlite::params![table_name, now],
        )?;
        let claimed = tx.execute(
          "INSERT INTO leases (table_name, holder, expires_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(table_name) DO NOTHING",
          rusqlite::params![table_name, holder, expires_at],
        )?;
        tx.commit()?;
        Ok((expired, claimed))
      })
      .await?;

    if expired > 0 {
      warn!(table, "expired write lease taken over");
    }
    Ok(claimed == 1)
  }

  async fn release_lease(&self, table: &str, holder: &str) -> Result<()> {
    let table_name = table.to_owned();
    let holder = holder.to_owned();

    let released = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM leases WHERE table_name = ?1 AND holder = ?2",
          rusqlite::params![table_name, holder],
        )?)
      })
      .await?;
    debug!(table, released = released == 1, "write lease returned");
    Ok(())
  }

  async fn list_tables(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM vocab_tables ORDER BY name")?;
        let names = stmt
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
      })
      .await?;
    Ok(names)
  }
}
