//! Show command implementation

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use super::{format_time, write_json, OutputFormat};
use crate::query;
use crate::store::{Episode, EpisodeStore};
use crate::transcript::Turn;

#[derive(Serialize)]
struct EpisodeDetail<'a> {
    #[serde(flatten)]
    episode: &'a Episode,
    turns: &'a [Turn],
    duplicates: Vec<String>,
}

pub fn run<W: Write>(
    store: &EpisodeStore,
    session_id: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let episode = query::get(store, session_id)?;
    let transcript = episode.transcript()?;
    let duplicates: Vec<String> = query::duplicates_of(store, &episode)?
        .into_iter()
        .map(|e| e.session_id)
        .collect();

    if format == OutputFormat::Json {
        let detail = EpisodeDetail {
            episode: &episode,
            turns: transcript.turns(),
            duplicates,
        };
        return write_json(out, &detail);
    }

    writeln!(out, "\n{}", "=".repeat(80))?;
    writeln!(out, "Session: {}", episode.session_id)?;
    writeln!(out, "Fingerprint: {}", episode.fingerprint)?;
    writeln!(
        out,
        "Archived: {} | Status: {}",
        format_time(episode.archived_at),
        episode.status()
    )?;
    if let Some(resolved_at) = episode.resolved_at() {
        writeln!(out, "Resolved: {}", format_time(resolved_at))?;
    }
    if !duplicates.is_empty() {
        writeln!(out, "Same content as: {}", duplicates.join(", "))?;
    }
    writeln!(out, "{}", "=".repeat(80))?;

    for turn in transcript.turns() {
        writeln!(out, "\n[{}]", turn.role.as_str().to_uppercase())?;
        writeln!(out, "{}", turn.content)?;
        writeln!(out, "{}", "-".repeat(40))?;
    }

    Ok(())
}
