//! SQLite schema definition
//!
//! One row per episode keyed by session id. Immutability of the archived
//! content and the one-way resolution lifecycle are enforced by triggers,
//! so no writer can bypass them.

pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- ============================================
-- EPISODES
-- ============================================

CREATE TABLE IF NOT EXISTS episodes (
    session_id TEXT PRIMARY KEY,           -- Externally supplied, opaque
    fingerprint TEXT NOT NULL,             -- SHA-256 hex of canonical transcript
    transcript TEXT NOT NULL,              -- Canonical JSON turn array
    title TEXT,                            -- First line of first user turn
    turn_count INTEGER NOT NULL,
    archived_at TEXT NOT NULL,             -- RFC 3339 UTC, microseconds, fixed width
    status TEXT NOT NULL DEFAULT 'unresolved'
        CHECK (status IN ('unresolved', 'resolved')),
    resolved_at TEXT,                      -- Set iff status = 'resolved'
    CHECK ((status = 'resolved') = (resolved_at IS NOT NULL))
);

-- ============================================
-- LIFECYCLE GUARDS
-- ============================================

CREATE TRIGGER IF NOT EXISTS episodes_content_immutable
BEFORE UPDATE OF session_id, fingerprint, transcript, title, turn_count, archived_at ON episodes
BEGIN
    SELECT RAISE(ABORT, 'archived episode content is immutable');
END;

CREATE TRIGGER IF NOT EXISTS episodes_resolution_terminal
BEFORE UPDATE OF status, resolved_at ON episodes
WHEN OLD.status = 'resolved'
BEGIN
    SELECT RAISE(ABORT, 'resolved episodes are terminal');
END;

CREATE TRIGGER IF NOT EXISTS episodes_never_deleted
BEFORE DELETE ON episodes
BEGIN
    SELECT RAISE(ABORT, 'episodes are never deleted');
END;

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_episodes_fingerprint ON episodes(fingerprint);
CREATE INDEX IF NOT EXISTS idx_episodes_status_archived
    ON episodes(status, archived_at, session_id);
CREATE INDEX IF NOT EXISTS idx_episodes_archived ON episodes(archived_at, session_id);
"#;
