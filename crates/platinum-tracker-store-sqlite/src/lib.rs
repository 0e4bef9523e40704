use std::path::Path;

use anyhow::{anyhow, Context, Result};
use platinum_tracker_core::{
    CompletionRecord, ProfileRecord, ProfileSlot, RecordId, SettingsConfig, TransferBundle,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;

/// Storage key for the completion record list.
pub const GAMES_KEY: &str = "platinumGames";
/// Storage key for the theme and credential configuration.
pub const CONFIG_KEY: &str = "platinumConfig";

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS kv_entries (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a SQLite-backed tracker store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            record_schema_version(&self.conn, 1)?;
            version = 1;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Load the record list newest-first. A missing or undecodable stored
    /// value degrades to an empty list with a warning rather than an error.
    ///
    /// # Errors
    /// Returns an error only when the underlying `SQLite` read fails.
    pub fn list_records(&self) -> Result<Vec<CompletionRecord>> {
        Ok(self.read_json(GAMES_KEY)?.unwrap_or_default())
    }

    /// Prepend one finalized record to the stored list.
    ///
    /// # Errors
    /// Returns an error when a record with the same id already exists or the
    /// write fails.
    pub fn insert_newest(&mut self, record: &CompletionRecord) -> Result<()> {
        let mut records = self.list_records()?;
        if records.iter().any(|existing| existing.id == record.id) {
            return Err(anyhow!("a record with id {} already exists", record.id));
        }

        records.insert(0, record.clone());
        self.put_json(GAMES_KEY, &records)
    }

    /// Remove the record with the given id. Returns whether one was removed;
    /// an unknown id is not an error.
    ///
    /// # Errors
    /// Returns an error when the read or write fails.
    pub fn delete_record(&mut self, id: RecordId) -> Result<bool> {
        let mut records = self.list_records()?;
        let before = records.len();
        records.retain(|record| record.id != id);

        if records.len() == before {
            return Ok(false);
        }

        self.put_json(GAMES_KEY, &records)?;
        Ok(true)
    }

    /// Load the settings, falling back to defaults when nothing usable is
    /// stored.
    ///
    /// # Errors
    /// Returns an error only when the underlying `SQLite` read fails.
    pub fn load_config(&self) -> Result<SettingsConfig> {
        Ok(self.read_json(CONFIG_KEY)?.unwrap_or_default())
    }

    /// Persist the full settings object, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error when the write fails.
    pub fn save_config(&mut self, config: &SettingsConfig) -> Result<()> {
        self.put_json(CONFIG_KEY, config)
    }

    /// Load one profile slot. An unset or undecodable slot yields the
    /// unlinked default profile.
    ///
    /// # Errors
    /// Returns an error only when the underlying `SQLite` read fails.
    pub fn load_profile(&self, slot: ProfileSlot) -> Result<ProfileRecord> {
        Ok(self.read_json(slot.storage_key())?.unwrap_or_default())
    }

    /// Persist one profile slot, applying save-time normalization first.
    ///
    /// # Errors
    /// Returns an error when the write fails.
    pub fn save_profile(&mut self, slot: ProfileSlot, profile: ProfileRecord) -> Result<()> {
        self.put_json(slot.storage_key(), &profile.normalized_for_save())
    }

    /// Snapshot the full stored state for export. The record list is always
    /// present; profiles and config are carried only when stored.
    ///
    /// # Errors
    /// Returns an error when any underlying `SQLite` read fails.
    pub fn export_bundle(&self) -> Result<TransferBundle> {
        Ok(TransferBundle {
            games: self.list_records()?,
            profile1: self.read_json(ProfileSlot::One.storage_key())?,
            profile2: self.read_json(ProfileSlot::Two.storage_key())?,
            config: self.read_json(CONFIG_KEY)?,
        })
    }

    /// Apply an imported bundle: each carried field wholesale replaces the
    /// stored value, absent fields leave local state untouched. Applied in a
    /// single transaction; a failed import changes nothing.
    ///
    /// # Errors
    /// Returns an error when serialization or any write fails.
    pub fn import_bundle(&mut self, bundle: &TransferBundle) -> Result<()> {
        let now = now_rfc3339()?;
        let tx = self.conn.transaction().context("failed to start import transaction")?;

        put_json_tx(&tx, GAMES_KEY, &bundle.games, &now)?;
        if let Some(profile) = &bundle.profile1 {
            put_json_tx(&tx, ProfileSlot::One.storage_key(), profile, &now)?;
        }
        if let Some(profile) = &bundle.profile2 {
            put_json_tx(&tx, ProfileSlot::Two.storage_key(), profile, &now)?;
        }
        if let Some(config) = &bundle.config {
            put_json_tx(&tx, CONFIG_KEY, config, &now)?;
        }

        tx.commit().context("failed to commit import transaction")?;
        Ok(())
    }

    // Corrupt persisted values degrade to "nothing stored" with a warning;
    // only a failing database read is a hard error.
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get_value(key)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                log::warn!("stored value for {key} is corrupt, using defaults: {err}");
                Ok(None)
            }
        }
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv_entries WHERE key = ?1")?;
        let value = stmt
            .query_row(params![key], |row| row.get::<_, String>(0))
            .optional()
            .with_context(|| format!("failed to read kv entry {key}"))?;
        Ok(value)
    }

    fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let now = now_rfc3339()?;
        let tx = self.conn.transaction().context("failed to start transaction")?;
        put_json_tx(&tx, key, value, &now)?;
        tx.commit().context("failed to commit write transaction")?;
        Ok(())
    }
}

fn put_json_tx<T: Serialize>(
    tx: &rusqlite::Transaction<'_>,
    key: &str,
    value: &T,
    now: &str,
) -> Result<()> {
    let json =
        serde_json::to_string(value).with_context(|| format!("failed to serialize {key}"))?;
    tx.execute(
        "INSERT INTO kv_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, json, now],
    )
    .with_context(|| format!("failed to upsert kv entry {key}"))?;
    Ok(())
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

#[cfg(test)]
mod tests {
    use platinum_tracker_core::{Difficulty, Metacritic, PROFILE_NAME_SENTINEL};

    use super::*;

    fn open_memory_store() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    fn fixture_record(id: i64, name: &str) -> CompletionRecord {
        CompletionRecord {
            id: RecordId(id),
            name: name.to_string(),
            platform: "PS5".to_string(),
            date: "14/11/2023".to_string(),
            image: String::new(),
            genres: "Action, RPG".to_string(),
            playtime: "34H".to_string(),
            difficulty: Difficulty::Moderate,
            metacritic: Metacritic::Score(92),
        }
    }

    fn put_raw(store: &mut SqliteStore, key: &str, value: &str) -> Result<()> {
        store.conn.execute(
            "INSERT INTO kv_entries(key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, "2026-01-01T00:00:00Z"],
        )?;
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> Result<()> {
        let mut store = open_memory_store()?;
        store.migrate()?;
        assert_eq!(current_schema_version(&store.conn)?, LATEST_SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn records_list_newest_first() -> Result<()> {
        let mut store = open_memory_store()?;

        store.insert_newest(&fixture_record(1, "Elden Ring"))?;
        store.insert_newest(&fixture_record(2, "Bloodborne"))?;
        store.insert_newest(&fixture_record(3, "Sekiro"))?;

        let names: Vec<String> =
            store.list_records()?.into_iter().map(|record| record.name).collect();
        assert_eq!(names, vec!["Sekiro", "Bloodborne", "Elden Ring"]);
        Ok(())
    }

    #[test]
    fn insert_rejects_duplicate_id() -> Result<()> {
        let mut store = open_memory_store()?;
        store.insert_newest(&fixture_record(7, "Elden Ring"))?;

        let duplicate = store.insert_newest(&fixture_record(7, "Bloodborne"));
        assert!(duplicate.is_err());
        assert_eq!(store.list_records()?.len(), 1);
        Ok(())
    }

    #[test]
    fn delete_reports_whether_a_record_was_removed() -> Result<()> {
        let mut store = open_memory_store()?;
        store.insert_newest(&fixture_record(1, "Elden Ring"))?;
        store.insert_newest(&fixture_record(2, "Bloodborne"))?;

        assert!(store.delete_record(RecordId(1))?);
        assert!(!store.delete_record(RecordId(99))?);

        let remaining = store.list_records()?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Bloodborne");
        Ok(())
    }

    #[test]
    fn corrupt_record_list_degrades_to_empty() -> Result<()> {
        let mut store = open_memory_store()?;
        put_raw(&mut store, GAMES_KEY, "not json at all")?;

        assert!(store.list_records()?.is_empty());

        // A fresh insert recovers the key.
        store.insert_newest(&fixture_record(1, "Elden Ring"))?;
        assert_eq!(store.list_records()?.len(), 1);
        Ok(())
    }

    #[test]
    fn config_defaults_when_missing_or_corrupt() -> Result<()> {
        let mut store = open_memory_store()?;
        assert_eq!(store.load_config()?, SettingsConfig::default());

        put_raw(&mut store, CONFIG_KEY, "{\"primary\": 42}")?;
        assert_eq!(store.load_config()?, SettingsConfig::default());

        let config = SettingsConfig {
            primary_color: "#112233".to_string(),
            api_key: "rawg-key".to_string(),
            ..SettingsConfig::default()
        };
        store.save_config(&config)?;
        assert_eq!(store.load_config()?, config);
        Ok(())
    }

    #[test]
    fn profile_save_normalizes_and_slots_are_independent() -> Result<()> {
        let mut store = open_memory_store()?;

        store.save_profile(
            ProfileSlot::One,
            ProfileRecord {
                platform: "psn".to_string(),
                name: String::new(),
                level: "447".to_string(),
                avatar: String::new(),
                url: String::new(),
            },
        )?;

        let saved = store.load_profile(ProfileSlot::One)?;
        assert_eq!(saved.platform, "PSN");
        assert_eq!(saved.name, PROFILE_NAME_SENTINEL);

        assert_eq!(store.load_profile(ProfileSlot::Two)?, ProfileRecord::default());
        Ok(())
    }

    #[test]
    fn export_carries_only_stored_optionals() -> Result<()> {
        let mut store = open_memory_store()?;
        store.insert_newest(&fixture_record(1, "Elden Ring"))?;

        let bundle = store.export_bundle()?;
        assert_eq!(bundle.games.len(), 1);
        assert!(bundle.profile1.is_none());
        assert!(bundle.profile2.is_none());
        assert!(bundle.config.is_none());

        store.save_config(&SettingsConfig::default())?;
        let bundle = store.export_bundle()?;
        assert_eq!(bundle.config, Some(SettingsConfig::default()));
        Ok(())
    }

    #[test]
    fn import_replaces_carried_fields_and_keeps_absent_ones() -> Result<()> {
        let mut store = open_memory_store()?;
        store.insert_newest(&fixture_record(1, "Local Game"))?;
        let local_config =
            SettingsConfig { api_key: "local-key".to_string(), ..SettingsConfig::default() };
        store.save_config(&local_config)?;

        let incoming = TransferBundle {
            games: vec![fixture_record(2, "Imported Game")],
            profile1: Some(ProfileRecord {
                platform: "XBOX".to_string(),
                name: "Importer".to_string(),
                level: "12".to_string(),
                avatar: String::new(),
                url: String::new(),
            }),
            profile2: None,
            config: None,
        };
        store.import_bundle(&incoming)?;

        let records = store.list_records()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Imported Game");
        assert_eq!(store.load_profile(ProfileSlot::One)?.name, "Importer");
        assert_eq!(store.load_profile(ProfileSlot::Two)?, ProfileRecord::default());
        assert_eq!(store.load_config()?, local_config);
        Ok(())
    }

    #[test]
    fn import_with_empty_games_clears_the_list() -> Result<()> {
        let mut store = open_memory_store()?;
        store.insert_newest(&fixture_record(1, "Local Game"))?;

        store.import_bundle(&TransferBundle::default())?;
        assert!(store.list_records()?.is_empty());
        Ok(())
    }
}
