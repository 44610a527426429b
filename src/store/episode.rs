//! Episode record and its row mapping

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{ArchiveError, Result};
use crate::resolution::{Resolution, Status};
use crate::transcript::{Fingerprint, Transcript};

/// One archived transcript plus its resolution state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub session_id: String,
    pub fingerprint: Fingerprint,
    pub title: Option<String>,
    pub turn_count: usize,
    pub archived_at: DateTime<Utc>,
    #[serde(flatten)]
    pub resolution: Resolution,
    /// Canonical JSON of the turns
    #[serde(skip)]
    pub transcript: String,
}

impl Episode {
    pub fn status(&self) -> Status {
        self.resolution.status()
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolution.resolved_at()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_resolved()
    }

    pub fn transcript(&self) -> Result<Transcript> {
        Transcript::from_canonical(&self.transcript).map_err(|e| {
            ArchiveError::storage(format!("decoding transcript of {}", self.session_id), e)
        })
    }
}

/// Columns selected for every episode read, in `RawEpisode` order
pub(crate) const EPISODE_COLUMNS: &str =
    "session_id, fingerprint, transcript, title, turn_count, archived_at, status, resolved_at";

/// Untyped row as stored
#[derive(Debug)]
pub(crate) struct RawEpisode {
    pub session_id: String,
    pub fingerprint: String,
    pub transcript: String,
    pub title: Option<String>,
    pub turn_count: i64,
    pub archived_at: String,
    pub status: String,
    pub resolved_at: Option<String>,
}

impl RawEpisode {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            fingerprint: row.get(1)?,
            transcript: row.get(2)?,
            title: row.get(3)?,
            turn_count: row.get(4)?,
            archived_at: row.get(5)?,
            status: row.get(6)?,
            resolved_at: row.get(7)?,
        })
    }

    /// Validate the row against the episode model. Any mismatch means the
    /// database holds corrupt data and is reported as a storage failure.
    pub fn into_episode(self) -> Result<Episode> {
        let context = format!("decoding episode {}", self.session_id);
        let corrupt = |detail: String| ArchiveError::storage(context.as_str(), detail);

        let fingerprint = Fingerprint::from_hex(&self.fingerprint)
            .ok_or_else(|| corrupt(format!("invalid fingerprint '{}'", self.fingerprint)))?;
        let turn_count = usize::try_from(self.turn_count)
            .map_err(|_| corrupt(format!("invalid turn count {}", self.turn_count)))?;
        let archived_at = parse_timestamp(&self.archived_at)
            .ok_or_else(|| corrupt(format!("invalid archived_at '{}'", self.archived_at)))?;
        let status: Status = self.status.parse().map_err(corrupt)?;
        let resolved_at = match self.resolved_at.as_deref() {
            None => None,
            Some(raw) => Some(
                parse_timestamp(raw)
                    .ok_or_else(|| corrupt(format!("invalid resolved_at '{}'", raw)))?,
            ),
        };
        let resolution = Resolution::from_parts(status, resolved_at)
            .ok_or_else(|| corrupt("resolved_at does not match status".to_string()))?;

        Ok(Episode {
            session_id: self.session_id,
            fingerprint,
            title: self.title,
            turn_count,
            archived_at,
            resolution,
            transcript: self.transcript,
        })
    }
}

/// Fixed-width RFC 3339 so that text order equals time order
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
