//! Archive command implementation

use anyhow::Result;
use std::io::Write;
use std::path::Path;

use super::{format_time, write_json, OutputFormat};
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::store::{validate_session_id, EpisodeStore};
use crate::transcript::{read_payload, session_id_from_path, Transcript};

/// A validated payload and the session id it will be archived under
#[derive(Debug, Clone)]
pub struct PreparedArchive {
    pub session_id: String,
    pub transcript: Transcript,
}

/// Read, normalize and validate a payload without touching any store
pub fn prepare(
    config: &ArchiveConfig,
    path: &Path,
    session_id: Option<String>,
) -> Result<PreparedArchive, ArchiveError> {
    let payload = read_payload(path)?;
    let session_id = pick_session_id(session_id, payload.session_id, path, config)?;
    Ok(PreparedArchive {
        session_id,
        transcript: payload.transcript,
    })
}

pub fn run<W: Write>(
    store: &EpisodeStore,
    config: &ArchiveConfig,
    path: &Path,
    session_id: Option<String>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let prepared = prepare(config, path, session_id)?;
    record(store, &prepared, format, out)
}

/// Write a prepared payload and report the outcome
pub fn record<W: Write>(
    store: &EpisodeStore,
    prepared: &PreparedArchive,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let outcome = store.create(&prepared.session_id, &prepared.transcript)?;

    if format == OutputFormat::Json {
        return write_json(out, &outcome);
    }

    let episode = &outcome.episode;
    if outcome.created {
        writeln!(out, "Archived session {}", episode.session_id)?;
    } else {
        writeln!(out, "Session {} already archived (unchanged)", episode.session_id)?;
    }
    writeln!(out, "  fingerprint: {}", episode.fingerprint)?;
    writeln!(out, "  status:      {}", episode.status())?;
    writeln!(out, "  archived_at: {}", format_time(episode.archived_at))?;
    if outcome.content_mismatch {
        writeln!(
            out,
            "  note: submitted content differs from the archived transcript"
        )?;
    }
    if let Some(ref other) = outcome.duplicate_of {
        writeln!(out, "  note: identical content already archived as {}", other)?;
    }

    Ok(())
}

/// Explicit id first, then the payload's own id, then the file stem
fn pick_session_id(
    explicit: Option<String>,
    embedded: Option<String>,
    path: &Path,
    config: &ArchiveConfig,
) -> Result<String, ArchiveError> {
    let candidate = match explicit {
        Some(id) => Some(id),
        None if config.derive_session_id => embedded.or_else(|| session_id_from_path(path)),
        None => None,
    };

    match candidate {
        Some(id) => {
            validate_session_id(&id)?;
            Ok(id)
        }
        None => Err(ArchiveError::InvalidInput(
            "no session id given; pass --session-id".to_string(),
        )),
    }
}
