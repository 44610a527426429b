//! Typed transcript model and normalization
//!
//! Raw payloads are validated into a [`Transcript`] at the boundary. A
//! `Transcript` is always normalized, so its canonical bytes (and therefore
//! its fingerprint) do not depend on key order, line endings or incidental
//! whitespace in the input.

mod fingerprint;
mod source;

pub use fingerprint::Fingerprint;
pub use source::{read_payload, parse_payload, session_id_from_path, TranscriptPayload};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::error::{ArchiveError, Result};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    /// Case-insensitive role lookup
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A validated, normalized turn sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Validate and normalize a raw turn sequence.
    ///
    /// Fails with `MalformedTranscript` when there are no turns or a turn has
    /// no text left after normalization.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self> {
        if turns.is_empty() {
            return Err(ArchiveError::malformed(
                "turns",
                "at least one turn is required",
            ));
        }

        let mut normalized = Vec::with_capacity(turns.len());
        for (index, turn) in turns.into_iter().enumerate() {
            let content = normalize_text(&turn.content);
            if content.is_empty() {
                return Err(ArchiveError::malformed(
                    format!("turns[{}].content", index),
                    "content is empty",
                ));
            }
            normalized.push(Turn { content, ..turn });
        }

        // Only reorder when every turn is timestamped; partial timestamps
        // give no total order, so the given order wins.
        if normalized.iter().all(|t| t.timestamp.is_some()) {
            normalized.sort_by_key(|t| t.timestamp);
        }

        Ok(Self { turns: normalized })
    }

    /// Rebuild a transcript from its canonical JSON (as held by the store)
    pub fn from_canonical(canonical: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(canonical)
            .map_err(|e| ArchiveError::malformed("transcript", e.to_string()))?;
        let items = value
            .as_array()
            .ok_or_else(|| ArchiveError::malformed("transcript", "expected an array of turns"))?;

        let turns = items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_turn(item, &format!("turns[{}]", i)))
            .collect::<Result<Vec<_>>>()?;

        Self::from_turns(turns)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Canonical serialization: compact JSON array of `{content, role}`
    /// objects. Timestamps are ordering hints only and are not included.
    pub fn canonical_json(&self) -> String {
        let items: Vec<Value> = self
            .turns
            .iter()
            .map(|t| json!({ "role": t.role.as_str(), "content": t.content }))
            .collect();
        Value::Array(items).to_string()
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.canonical_json().into_bytes()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.canonical_bytes())
    }

    /// First line of the first user turn, truncated for display
    pub fn title(&self) -> Option<String> {
        self.turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| truncate_title(&t.content))
    }
}

/// Parse one turn from JSON.
///
/// Accepts `{role, content, timestamp?}` as well as agent-CLI records that
/// nest the turn under `message` and carry the role in `type`.
pub(crate) fn parse_turn(value: &Value, field: &str) -> Result<Turn> {
    parse_turn_blocks(value, field).map(|(turn, _)| turn)
}

/// Parse one record of an agent-CLI log.
///
/// Records whose content holds only non-text blocks (tool calls, tool
/// results, thinking) are routine in such logs and yield `None`. A record
/// with no text and no such blocks is still malformed.
pub(crate) fn parse_log_record(value: &Value, field: &str) -> Result<Option<Turn>> {
    let (turn, dropped_blocks) = parse_turn_blocks(value, field)?;
    if normalize_text(&turn.content).is_empty() {
        if dropped_blocks {
            return Ok(None);
        }
        return Err(ArchiveError::malformed(
            format!("{}.content", field),
            "content is empty",
        ));
    }
    Ok(Some(turn))
}

/// Parse a turn, also reporting whether non-text blocks were dropped
fn parse_turn_blocks(value: &Value, field: &str) -> Result<(Turn, bool)> {
    if !value.is_object() {
        return Err(ArchiveError::malformed(field, "expected an object"));
    }

    let message = value
        .get("message")
        .filter(|m| m.is_object())
        .unwrap_or(value);

    let role_name = message
        .get("role")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| ArchiveError::malformed(format!("{}.role", field), "missing role"))?;
    let role = Role::parse(role_name).ok_or_else(|| {
        ArchiveError::malformed(
            format!("{}.role", field),
            format!("unknown role '{}'", role_name),
        )
    })?;

    let content = message
        .get("content")
        .ok_or_else(|| ArchiveError::malformed(format!("{}.content", field), "missing content"))?;
    let (content, dropped_blocks) = extract_text(content).ok_or_else(|| {
        ArchiveError::malformed(
            format!("{}.content", field),
            "expected a string or an array of text blocks",
        )
    })?;

    let timestamp = match value.get("timestamp").or_else(|| message.get("timestamp")) {
        None | Some(Value::Null) => None,
        Some(ts) => {
            let parsed = ts
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Some(parsed.ok_or_else(|| {
                ArchiveError::malformed(
                    format!("{}.timestamp", field),
                    "expected an RFC 3339 timestamp",
                )
            })?)
        }
    };

    let turn = Turn {
        role,
        content,
        timestamp,
    };
    Ok((turn, dropped_blocks))
}

/// Flatten turn content into text. Non-text blocks (tool calls, thinking)
/// carry no conversational text and are dropped; the flag reports whether
/// any were.
fn extract_text(content: &Value) -> Option<(String, bool)> {
    match content {
        Value::String(s) => Some((s.clone(), false)),
        Value::Array(blocks) => {
            let mut parts = Vec::new();
            let mut dropped = false;
            for block in blocks {
                match block {
                    Value::String(s) => parts.push(s.as_str()),
                    Value::Object(_) => {
                        if block.get("type").and_then(Value::as_str) == Some("text") {
                            parts.push(block.get("text").and_then(Value::as_str)?);
                        } else {
                            dropped = true;
                        }
                    }
                    _ => return None,
                }
            }
            Some((parts.join("\n"), dropped))
        }
        _ => None,
    }
}

/// Unify line endings, strip trailing whitespace per line and trim the
/// surrounding blank space.
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.chars().count() > 100 {
        let head: String = first_line.chars().take(97).collect();
        format!("{}...", head)
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_turns_rejected() {
        let err = Transcript::from_turns(vec![]).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "turns"
        ));
    }

    #[test]
    fn test_blank_content_rejected() {
        let err = Transcript::from_turns(vec![
            Turn::new(Role::User, "hello"),
            Turn::new(Role::Assistant, "  \r\n  "),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "turns[1].content"
        ));
    }

    #[test]
    fn test_whitespace_does_not_change_canonical_form() {
        let a = Transcript::from_turns(vec![
            Turn::new(Role::User, "fix the build"),
            Turn::new(Role::Assistant, "done.\nran tests"),
        ])
        .unwrap();
        let b = Transcript::from_turns(vec![
            Turn::new(Role::User, "\n  fix the build   \r\n"),
            Turn::new(Role::Assistant, "done.  \r\nran tests\t\n\n"),
        ])
        .unwrap();
        assert_eq!(a.canonical_json(), b.canonical_json());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_canonical_json_shape() {
        let t = Transcript::from_turns(vec![Turn::new(Role::User, "hi")]).unwrap();
        assert_eq!(t.canonical_json(), r#"[{"content":"hi","role":"user"}]"#);
    }

    #[test]
    fn test_timestamped_turns_are_ordered() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 5, 0).unwrap();
        let shuffled = Transcript::from_turns(vec![
            Turn::new(Role::Assistant, "answer").at(t1),
            Turn::new(Role::User, "question").at(t0),
        ])
        .unwrap();
        assert_eq!(shuffled.turns()[0].role, Role::User);

        let ordered = Transcript::from_turns(vec![
            Turn::new(Role::User, "question").at(t0),
            Turn::new(Role::Assistant, "answer").at(t1),
        ])
        .unwrap();
        assert_eq!(shuffled.fingerprint(), ordered.fingerprint());
    }

    #[test]
    fn test_partial_timestamps_keep_given_order() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let t = Transcript::from_turns(vec![
            Turn::new(Role::Assistant, "first"),
            Turn::new(Role::User, "second").at(t0),
        ])
        .unwrap();
        assert_eq!(t.turns()[0].content, "first");
    }

    #[test]
    fn test_parse_turn_variants() {
        let plain = json!({"content": "hello", "role": "USER", "extra": 1});
        let turn = parse_turn(&plain, "turns[0]").unwrap();
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "hello");

        let nested = json!({
            "type": "assistant",
            "timestamp": "2025-01-01T10:00:00Z",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "part one"},
                    {"type": "tool_use", "name": "Bash"},
                    {"type": "text", "text": "part two"}
                ]
            }
        });
        let turn = parse_turn(&nested, "line 2").unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, "part one\npart two");
        assert!(turn.timestamp.is_some());
    }

    #[test]
    fn test_parse_turn_names_bad_field() {
        let bad_role = json!({"role": "bot", "content": "x"});
        let err = parse_turn(&bad_role, "turns[3]").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "turns[3].role"
        ));

        let bad_content = json!({"role": "user", "content": 42});
        let err = parse_turn(&bad_content, "turns[0]").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "turns[0].content"
        ));

        let bad_ts = json!({"role": "user", "content": "x", "timestamp": "yesterday"});
        let err = parse_turn(&bad_ts, "turns[0]").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "turns[0].timestamp"
        ));
    }

    #[test]
    fn test_tool_only_log_records_are_skipped() {
        let tool_call = json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {}}]
            }
        });
        assert_eq!(parse_log_record(&tool_call, "line 2").unwrap(), None);

        let tool_result = json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"}]
            }
        });
        assert_eq!(parse_log_record(&tool_result, "line 3").unwrap(), None);

        let text = json!({"type": "user", "message": {"role": "user", "content": "hi"}});
        assert!(parse_log_record(&text, "line 1").unwrap().is_some());
    }

    #[test]
    fn test_empty_log_record_names_line() {
        let blank = json!({"type": "user", "message": {"role": "user", "content": "   "}});
        let err = parse_log_record(&blank, "line 4").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "line 4.content"
        ));

        let no_blocks = json!({"role": "assistant", "content": []});
        let err = parse_log_record(&no_blocks, "line 5").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::MalformedTranscript { ref field, .. } if field == "line 5.content"
        ));
    }

    #[test]
    fn test_canonical_round_trip() {
        let t = Transcript::from_turns(vec![
            Turn::new(Role::System, "be brief"),
            Turn::new(Role::User, "hi"),
        ])
        .unwrap();
        let back = Transcript::from_canonical(&t.canonical_json()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_title_from_first_user_turn() {
        let long = "x".repeat(150);
        let t = Transcript::from_turns(vec![
            Turn::new(Role::System, "system prompt"),
            Turn::new(Role::User, format!("{}\nsecond line", long)),
        ])
        .unwrap();
        let title = t.title().unwrap();
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));

        let no_user = Transcript::from_turns(vec![Turn::new(Role::Assistant, "hi")]).unwrap();
        assert_eq!(no_user.title(), None);
    }
}
