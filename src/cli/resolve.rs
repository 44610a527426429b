//! Resolve command implementation

use anyhow::Result;
use std::io::Write;

use super::{format_time, write_json, OutputFormat};
use crate::resolution::Status;
use crate::store::{validate_session_id, EpisodeStore};

pub fn run<W: Write>(
    store: &EpisodeStore,
    session_id: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    validate_session_id(session_id)?;
    let outcome = store.transition(session_id, Status::Resolved)?;

    if format == OutputFormat::Json {
        return write_json(out, &outcome);
    }

    let episode = &outcome.episode;
    let resolved_at = episode
        .resolved_at()
        .map(format_time)
        .unwrap_or_else(|| "-".to_string());
    if outcome.changed {
        writeln!(out, "Resolved session {} at {}", episode.session_id, resolved_at)?;
    } else {
        writeln!(
            out,
            "Session {} already resolved at {} (unchanged)",
            episode.session_id, resolved_at
        )?;
    }
    writeln!(out, "  status: {}", episode.status())?;

    Ok(())
}
