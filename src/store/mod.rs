//! Episode storage with SQLite
//!
//! Every mutation runs in a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock up front. Two handles racing to archive the same
//! session id are therefore serialized: the first inserts, the second finds
//! the row and returns it. Lock waits are bounded by the busy timeout and
//! surface as `StorageUnavailable`.

mod episode;
mod schema;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result, StorageContext};
use crate::resolution::Status;
use crate::transcript::{Fingerprint, Transcript};

pub use episode::Episode;
pub use schema::{SCHEMA, SCHEMA_VERSION};

use episode::{format_timestamp, RawEpisode, EPISODE_COLUMNS};

/// SQLite `synchronous` level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    /// fsync on every commit
    Full,
    /// fsync at WAL checkpoints only
    Normal,
}

impl Synchronous {
    fn as_pragma(&self) -> &'static str {
        match self {
            Synchronous::Full => "FULL",
            Synchronous::Normal => "NORMAL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub synchronous: Synchronous,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            synchronous: Synchronous::Full,
        }
    }
}

/// Result of `create`
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    #[serde(flatten)]
    pub episode: Episode,
    /// False when the session id was already archived
    pub created: bool,
    /// Earliest other session holding identical content
    pub duplicate_of: Option<String>,
    /// Session id was already archived with different content
    pub content_mismatch: bool,
}

/// Result of `transition`
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    #[serde(flatten)]
    pub episode: Episode,
    /// False for an idempotent re-resolve
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub unresolved: u64,
    pub resolved: u64,
    /// Fingerprints shared by more than one episode
    pub duplicate_fingerprints: u64,
}

pub struct EpisodeStore {
    conn: Connection,
}

impl EpisodeStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StoreOptions::default())
    }

    pub fn open_with(path: &Path, options: &StoreOptions) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ArchiveError::storage(format!("creating {}", parent.display()), e)
                })?;
            }
        }

        let conn = Connection::open(path).storage("opening database")?;
        conn.busy_timeout(options.busy_timeout)
            .storage("setting busy timeout")?;

        let store = Self { conn };
        store.configure(options)?;
        store.init_schema()?;
        debug!(path = %path.display(), "episode store opened");
        Ok(store)
    }

    fn configure(&self, options: &StoreOptions) -> Result<()> {
        // journal_mode answers with the resulting mode, so it is read as a query
        let mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .storage("enabling WAL journal")?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(mode = %mode, "database did not switch to WAL journal mode");
        }
        self.conn
            .pragma_update(None, "synchronous", options.synchronous.as_pragma())
            .storage("setting synchronous mode")?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .storage("reading schema version")?;
        if version > SCHEMA_VERSION {
            return Err(ArchiveError::storage(
                "checking schema version",
                format!(
                    "database schema v{} is newer than supported v{}",
                    version, SCHEMA_VERSION
                ),
            ));
        }

        self.conn
            .execute_batch(SCHEMA)
            .storage("initializing schema")?;
        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)
                .storage("recording schema version")?;
            info!(version = SCHEMA_VERSION, "episode schema initialized");
        }
        Ok(())
    }

    /// Release the handle, surfacing any error from the final flush
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| ArchiveError::storage("closing database", e))
    }

    fn begin_write(&self) -> Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .storage("acquiring write lock")
    }

    // ============================================
    // ARCHIVE
    // ============================================

    /// Archive a transcript under `session_id`.
    ///
    /// Idempotent on the session id: a second call returns the stored
    /// episode unchanged. Identical content under a new session id is still
    /// archived; `duplicate_of` names the earlier session.
    pub fn create(&self, session_id: &str, transcript: &Transcript) -> Result<ArchiveOutcome> {
        let session_id = validate_session_id(session_id)?;
        let fingerprint = transcript.fingerprint();
        let archived_at = format_timestamp(Utc::now());

        let tx = self.begin_write()?;

        let inserted = tx
            .execute(
                r#"INSERT INTO episodes
                   (session_id, fingerprint, transcript, title, turn_count, archived_at, status)
                   VALUES (?, ?, ?, ?, ?, ?, 'unresolved')
                   ON CONFLICT(session_id) DO NOTHING"#,
                params![
                    session_id,
                    fingerprint.as_str(),
                    transcript.canonical_json(),
                    transcript.title(),
                    transcript.len() as i64,
                    archived_at,
                ],
            )
            .storage("inserting episode")?;

        let episode = select_episode(&tx, session_id)?.ok_or_else(|| {
            ArchiveError::storage(
                "reading back archived episode",
                format!("episode {} missing after insert", session_id),
            )
        })?;
        let duplicate_of = find_duplicate(&tx, &episode)?;

        tx.commit().storage("committing archive")?;

        let created = inserted == 1;
        let content_mismatch = !created && episode.fingerprint != fingerprint;

        if created {
            info!(
                session_id = %session_id,
                fingerprint = %fingerprint.short(),
                turns = transcript.len(),
                "episode archived"
            );
        } else {
            debug!(session_id = %session_id, "episode already archived");
        }
        if content_mismatch {
            warn!(
                session_id = %session_id,
                stored = %episode.fingerprint.short(),
                submitted = %fingerprint.short(),
                "session re-archived with different content; keeping original"
            );
        }
        if let Some(ref other) = duplicate_of {
            warn!(session_id = %session_id, duplicate_of = %other, "duplicate transcript content");
        }

        Ok(ArchiveOutcome {
            episode,
            created,
            duplicate_of,
            content_mismatch,
        })
    }

    // ============================================
    // RESOLUTION
    // ============================================

    /// Move an episode to `to`, persisting the result.
    ///
    /// Resolving an already resolved episode succeeds without touching
    /// `resolved_at`. Moves not in the lifecycle fail with `InvalidTransition`.
    pub fn transition(&self, session_id: &str, to: Status) -> Result<TransitionOutcome> {
        let session_id = validate_session_id(session_id)?;

        let tx = self.begin_write()?;

        let current = select_episode(&tx, session_id)?
            .ok_or_else(|| ArchiveError::not_found(session_id))?;
        let transition = current
            .resolution
            .transition(to, Utc::now())
            .ok_or_else(|| ArchiveError::InvalidTransition {
                session_id: session_id.to_string(),
                from: current.status(),
                to,
            })?;

        if !transition.changed() {
            // Nothing to write; dropping the transaction rolls it back
            debug!(session_id = %session_id, status = %to, "transition is a no-op");
            return Ok(TransitionOutcome {
                episode: current,
                changed: false,
            });
        }

        let updated = tx
            .execute(
                "UPDATE episodes SET status = ?, resolved_at = ?
                 WHERE session_id = ? AND status = ?",
                params![
                    transition.to.status().as_str(),
                    transition.to.resolved_at().map(format_timestamp),
                    session_id,
                    transition.from.status().as_str(),
                ],
            )
            .storage("updating resolution")?;
        if updated != 1 {
            return Err(ArchiveError::storage(
                "updating resolution",
                format!("expected 1 row for {}, updated {}", session_id, updated),
            ));
        }

        let episode = select_episode(&tx, session_id)?.ok_or_else(|| {
            ArchiveError::storage(
                "reading back resolved episode",
                format!("episode {} missing after update", session_id),
            )
        })?;
        tx.commit().storage("committing resolution")?;

        info!(session_id = %session_id, status = %episode.status(), "episode transitioned");

        Ok(TransitionOutcome {
            episode,
            changed: true,
        })
    }

    // ============================================
    // QUERIES
    // ============================================

    pub fn get(&self, session_id: &str) -> Result<Episode> {
        let session_id = validate_session_id(session_id)?;
        select_episode(&self.conn, session_id)?.ok_or_else(|| ArchiveError::not_found(session_id))
    }

    /// Snapshot listing ordered by `archived_at`, then `session_id`
    pub fn list(&self, filter: Option<Status>) -> Result<Vec<Episode>> {
        let base_query = format!("SELECT {} FROM episodes", EPISODE_COLUMNS);
        let order = "ORDER BY archived_at ASC, session_id ASC";

        let rows = match filter {
            Some(status) => {
                let query = format!("{} WHERE status = ?1 {}", base_query, order);
                let mut stmt = self.conn.prepare(&query).storage("preparing listing")?;
                let rows = stmt
                    .query_map(params![status.as_str()], RawEpisode::from_row)
                    .storage("listing episodes")?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .storage("listing episodes")?;
                rows
            }
            None => {
                let query = format!("{} {}", base_query, order);
                let mut stmt = self.conn.prepare(&query).storage("preparing listing")?;
                let rows = stmt
                    .query_map([], RawEpisode::from_row)
                    .storage("listing episodes")?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .storage("listing episodes")?;
                rows
            }
        };

        rows.into_iter().map(RawEpisode::into_episode).collect()
    }

    /// All episodes with the given content, oldest first
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<Episode>> {
        let query = format!(
            "SELECT {} FROM episodes WHERE fingerprint = ? ORDER BY archived_at ASC, session_id ASC",
            EPISODE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&query).storage("preparing fingerprint lookup")?;
        let rows = stmt
            .query_map(params![fingerprint.as_str()], RawEpisode::from_row)
            .storage("looking up fingerprint")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .storage("looking up fingerprint")?;

        rows.into_iter().map(RawEpisode::into_episode).collect()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.conn
            .query_row(
                r#"SELECT COUNT(*),
                          COALESCE(SUM(status = 'unresolved'), 0),
                          COALESCE(SUM(status = 'resolved'), 0),
                          (SELECT COUNT(*) FROM
                              (SELECT fingerprint FROM episodes
                               GROUP BY fingerprint HAVING COUNT(*) > 1))
                   FROM episodes"#,
                [],
                |row| {
                    Ok(StoreStats {
                        total: row.get::<_, i64>(0)? as u64,
                        unresolved: row.get::<_, i64>(1)? as u64,
                        resolved: row.get::<_, i64>(2)? as u64,
                        duplicate_fingerprints: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .storage("computing statistics")
    }
}

/// Session ids are stored exactly as given; blank ids and ids with
/// surrounding whitespace are rejected rather than rewritten.
pub fn validate_session_id(session_id: &str) -> Result<&str> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(ArchiveError::InvalidInput(
            "session id must not be empty".to_string(),
        ));
    }
    if trimmed.len() != session_id.len() {
        return Err(ArchiveError::InvalidInput(format!(
            "session id {:?} has leading or trailing whitespace",
            session_id
        )));
    }
    Ok(session_id)
}

fn select_episode(conn: &Connection, session_id: &str) -> Result<Option<Episode>> {
    let query = format!("SELECT {} FROM episodes WHERE session_id = ?", EPISODE_COLUMNS);
    let raw = conn
        .query_row(&query, params![session_id], RawEpisode::from_row)
        .optional()
        .storage("reading episode")?;

    raw.map(RawEpisode::into_episode).transpose()
}

fn find_duplicate(conn: &Connection, episode: &Episode) -> Result<Option<String>> {
    conn.query_row(
        "SELECT session_id FROM episodes
         WHERE fingerprint = ? AND session_id != ?
         ORDER BY archived_at ASC, session_id ASC
         LIMIT 1",
        params![episode.fingerprint.as_str(), episode.session_id],
        |row| row.get(0),
    )
    .optional()
    .storage("checking for duplicate content")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{Role, Turn};
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, EpisodeStore) {
        let dir = TempDir::new().unwrap();
        let store = EpisodeStore::open(&dir.path().join("episodes.db")).unwrap();
        (dir, store)
    }

    fn transcript(text: &str) -> Transcript {
        Transcript::from_turns(vec![
            Turn::new(Role::User, text),
            Turn::new(Role::Assistant, "ok"),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_then_get() {
        let (_dir, store) = open_temp();
        let outcome = store.create("s1", &transcript("turn1")).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.duplicate_of, None);
        assert_eq!(outcome.episode.status(), Status::Unresolved);
        assert_eq!(outcome.episode.turn_count, 2);
        assert_eq!(outcome.episode.title.as_deref(), Some("turn1"));

        let fetched = store.get("s1").unwrap();
        assert_eq!(fetched, outcome.episode);
    }

    #[test]
    fn test_session_id_is_stored_verbatim_or_rejected() {
        let (_dir, store) = open_temp();
        store.create("s1", &transcript("a")).unwrap();

        for bad in ["   ", "  s1 ", "s1\n", "\ts2"] {
            let err = store.create(bad, &transcript("b")).unwrap_err();
            assert_eq!(err.kind(), "invalid_input", "{:?}", bad);
        }
        assert_eq!(store.stats().unwrap().total, 1);

        // Lookups never alias a padded id onto a stored one
        assert_eq!(store.get(" s1").unwrap_err().kind(), "invalid_input");
        assert_eq!(
            store.transition("s1 ", Status::Resolved).unwrap_err().kind(),
            "invalid_input"
        );
        assert_eq!(store.get("s1").unwrap().status(), Status::Unresolved);
    }

    #[test]
    fn test_rearchive_with_different_content_keeps_original() {
        let (_dir, store) = open_temp();
        let first = store.create("s1", &transcript("original")).unwrap();
        let second = store.create("s1", &transcript("changed")).unwrap();
        assert!(!second.created);
        assert!(second.content_mismatch);
        assert_eq!(second.episode, first.episode);
    }

    #[test]
    fn test_duplicate_content_flag() {
        let (_dir, store) = open_temp();
        store.create("s1", &transcript("same")).unwrap();
        let outcome = store.create("s2", &transcript("same")).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.duplicate_of.as_deref(), Some("s1"));

        let matches = store.find_by_fingerprint(&outcome.episode.fingerprint).unwrap();
        let ids: Vec<_> = matches.iter().map(|e| e.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(store.stats().unwrap().duplicate_fingerprints, 1);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let (_dir, store) = open_temp();
        store.create("s1", &transcript("a")).unwrap();
        let err = store.transition("s1", Status::Unresolved).unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        store.transition("s1", Status::Resolved).unwrap();
        let err = store.transition("s1", Status::Unresolved).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::InvalidTransition { from: Status::Resolved, to: Status::Unresolved, .. }
        ));
        assert!(store.get("s1").unwrap().is_resolved());
    }

    #[test]
    fn test_triggers_guard_lifecycle() {
        let (_dir, store) = open_temp();
        store.create("s1", &transcript("a")).unwrap();
        store.transition("s1", Status::Resolved).unwrap();

        assert!(store
            .conn
            .execute("UPDATE episodes SET transcript = '[]' WHERE session_id = 's1'", [])
            .is_err());
        assert!(store
            .conn
            .execute(
                "UPDATE episodes SET status = 'unresolved', resolved_at = NULL WHERE session_id = 's1'",
                [],
            )
            .is_err());
        assert!(store
            .conn
            .execute("DELETE FROM episodes WHERE session_id = 's1'", [])
            .is_err());
    }

    #[test]
    fn test_stats_on_empty_store() {
        let (_dir, store) = open_temp();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_newer_schema_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("episodes.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
                .unwrap();
        }
        let err = EpisodeStore::open(&path).err().unwrap();
        assert_eq!(err.kind(), "storage_unavailable");
    }
}
