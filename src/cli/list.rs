//! List command implementation

use anyhow::Result;
use std::io::Write;

use super::{format_time, write_json, OutputFormat};
use crate::query;
use crate::resolution::Status;
use crate::store::{Episode, EpisodeStore};

/// `list-unresolved`
pub fn unresolved<W: Write>(store: &EpisodeStore, format: OutputFormat, out: &mut W) -> Result<()> {
    let episodes = query::list_unresolved(store)?;
    render(&episodes, "No unresolved episodes.", format, out)
}

/// `list [--status ...]`
pub fn run<W: Write>(
    store: &EpisodeStore,
    status: Option<Status>,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    let episodes = query::list(store, status)?;
    render(&episodes, "No episodes archived.", format, out)
}

fn render<W: Write>(
    episodes: &[Episode],
    empty_message: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, &episodes);
    }

    if episodes.is_empty() {
        writeln!(out, "{}", empty_message)?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<20} {:<24} {:<11} {:<13} {}",
        "Archived", "Session", "Status", "Fingerprint", "Title"
    )?;
    writeln!(out, "{}", "-".repeat(100))?;

    for episode in episodes {
        // Truncate title
        let title = episode
            .title
            .as_ref()
            .map(|t| {
                if t.chars().count() > 35 {
                    format!("{}...", t.chars().take(32).collect::<String>())
                } else {
                    t.clone()
                }
            })
            .unwrap_or_else(|| "-".to_string());

        writeln!(
            out,
            "{:<20} {:<24} {:<11} {:<13} {}",
            format_time(episode.archived_at),
            episode.session_id,
            episode.status(),
            episode.fingerprint.short(),
            title,
        )?;
    }

    Ok(())
}
