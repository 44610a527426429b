//! Stats command implementation

use anyhow::Result;
use std::io::Write;

use super::{write_json, OutputFormat};
use crate::query;
use crate::store::EpisodeStore;

pub fn run<W: Write>(store: &EpisodeStore, format: OutputFormat, out: &mut W) -> Result<()> {
    let stats = query::stats(store)?;

    if format == OutputFormat::Json {
        return write_json(out, &stats);
    }

    writeln!(out, "Episodes:         {}", stats.total)?;
    writeln!(out, "  unresolved:     {}", stats.unresolved)?;
    writeln!(out, "  resolved:       {}", stats.resolved)?;
    writeln!(out, "Shared content:   {}", stats.duplicate_fingerprints)?;
    Ok(())
}
