//! Reading transcript payloads from files or stdin
//!
//! Supported shapes:
//! - JSON document: `{"session_id": "...", "turns": [...]}` (`messages` also accepted)
//! - JSON array of turns
//! - JSONL, one turn per line, including agent-CLI session logs

use serde_json::Value;
use std::io::Read;
use std::path::Path;

use super::{parse_log_record, parse_turn, Transcript};
use crate::error::{ArchiveError, Result};

/// Bookkeeping records found in agent-CLI session logs that are not turns
const NON_TURN_RECORDS: &[&str] = &["queue-operation", "summary", "file-history-snapshot"];

/// A parsed payload ready for archiving
#[derive(Debug, Clone)]
pub struct TranscriptPayload {
    /// Session id embedded in the document, if any
    pub session_id: Option<String>,
    pub transcript: Transcript,
}

/// Read and validate a payload. `-` reads from stdin.
pub fn read_payload(path: &Path) -> Result<TranscriptPayload> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| ArchiveError::InvalidInput(format!("cannot read stdin: {}", e)))?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            ArchiveError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
        })?
    };

    parse_payload(&text)
}

/// Session id derived from a payload file name (`sessions/abc123.jsonl` -> `abc123`)
pub fn session_id_from_path(path: &Path) -> Option<String> {
    if path.as_os_str() == "-" {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn parse_payload(text: &str) -> Result<TranscriptPayload> {
    if text.trim().is_empty() {
        return Err(ArchiveError::malformed("transcript", "payload is empty"));
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Ok(TranscriptPayload {
            session_id: None,
            transcript: parse_turn_array(&items, "turns")?,
        }),
        Ok(Value::Object(ref doc)) if doc.contains_key("turns") || doc.contains_key("messages") => {
            parse_document(doc)
        }
        // A lone object without a turn list is a single-line JSONL log
        Ok(Value::Object(_)) => parse_jsonl(text),
        Ok(_) => Err(ArchiveError::malformed(
            "transcript",
            "expected a JSON object, a JSON array or JSONL",
        )),
        Err(_) => parse_jsonl(text),
    }
}

fn parse_document(doc: &serde_json::Map<String, Value>) -> Result<TranscriptPayload> {
    let session_id = match doc.get("session_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(ArchiveError::malformed(
                "session_id",
                "expected a string",
            ))
        }
    };

    let (key, turns) = doc
        .get_key_value("turns")
        .or_else(|| doc.get_key_value("messages"))
        .ok_or_else(|| ArchiveError::malformed("turns", "missing turn list"))?;
    let items = turns
        .as_array()
        .ok_or_else(|| ArchiveError::malformed(key.as_str(), "expected an array"))?;

    Ok(TranscriptPayload {
        session_id,
        transcript: parse_turn_array(items, key)?,
    })
}

fn parse_turn_array(items: &[Value], key: &str) -> Result<Transcript> {
    let turns = items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_turn(item, &format!("{}[{}]", key, i)))
        .collect::<Result<Vec<_>>>()?;
    Transcript::from_turns(turns)
}

fn parse_jsonl(text: &str) -> Result<TranscriptPayload> {
    let mut turns = vec![];
    let mut session_id: Option<String> = None;

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let field = format!("line {}", line_number);
        let json: Value = serde_json::from_str(line)
            .map_err(|e| ArchiveError::malformed(field.as_str(), e.to_string()))?;

        if let Some(kind) = json.get("type").and_then(Value::as_str) {
            if NON_TURN_RECORDS.contains(&kind) {
                continue;
            }
        }

        // Agent-CLI logs repeat the session id on every line
        if session_id.is_none() {
            session_id = json
                .get("sessionId")
                .or_else(|| json.get("session_id"))
                .and_then(Value::as_str)
                .map(String::from);
        }

        if let Some(turn) = parse_log_record(&json, &field)? {
            turns.push(turn);
        }
    }

    if turns.is_empty() {
        return Err(ArchiveError::malformed(
            "turns",
            "log holds no conversational turns",
        ));
    }

    Ok(TranscriptPayload {
        session_id,
        transcript: Transcript::from_turns(turns)?,
    })
}
