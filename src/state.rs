//! The mutable record threaded through a traversal.

use crate::error::FlowError;
use ahash::AHashMap;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::ops::Index;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "system" => Some(Role::System),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the conversation history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Snapshot of node outputs keyed by label, the conversation history and the current result.
///
/// Reading a label that has not been produced yet yields `""`, so scripts and templates never
/// fail just because a node hasn't run on this pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct State {
    #[serde(default)]
    pub snapshot: AHashMap<String, String>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub result: String,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Self::default()
        }
    }

    /// An independent copy: mutating the copy's snapshot or history leaves `self` untouched.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Key-wise overwrite of the snapshot. History and result are not touched.
    pub fn merge<K, V, I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.snapshot
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Same as [`State::merge`], taking the snapshot of another state.
    pub fn merge_state(&mut self, other: &State) -> &mut Self {
        self.merge(other.snapshot.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Missing keys read as the empty string.
    pub fn get(&self, key: &str) -> &str {
        self.snapshot.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.snapshot.insert(key.into(), value.into());
        self
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Message::new(role, content));
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses `{snapshot, history, result}`, optionally wrapped as `{"state": {...}}`.
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(inner) = value.get_mut("state").map(serde_json::Value::take) {
            value = inner;
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Writes a binary checkpoint of the state.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FlowError> {
        let bytes = encode_to_vec(self, standard())
            .map_err(|e| FlowError::Checkpoint(format!("Serialization failed: {}", e)))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a checkpoint written by [`State::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let bytes = fs::read(path)?;
        decode_from_slice(&bytes, standard())
            .map(|(state, _)| state)
            .map_err(|e| FlowError::Checkpoint(format!("Deserialization failed: {}", e)))
    }
}

impl Index<&str> for State {
    type Output = str;

    fn index(&self, key: &str) -> &str {
        self.get(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = State::new();
        state.merge(iter);
        state
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "result: {}", self.result)?;
        for (label, output) in self.snapshot.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            writeln!(f, "{}: {}", label, output)?;
        }
        for message in &self.history {
            writeln!(f, "[{}] {}", message.role, message.content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_read_as_empty() {
        let state = State::new();
        assert_eq!(state.get("nope"), "");
        assert_eq!(&state["nope"], "");
    }

    #[test]
    fn copy_is_isolated() {
        let mut s1 = State::with_result("r");
        s1.set("a", "1");
        s1.push_message(Role::User, "hi");

        let mut s2 = s1.copy();
        s2.snapshot.insert("x".into(), "y".into());
        s2.history.clear();

        assert!(!s1.snapshot.contains_key("x"));
        assert_eq!(s1.history.len(), 1);
        assert_eq!(s2.result, "r");
    }

    #[test]
    fn merge_overwrites_snapshot_only() {
        let mut base = State::with_result("keep");
        base.set("a", "old").set("b", "kept");
        let other: State = [("a", "new"), ("c", "added")].into_iter().collect();

        base.merge_state(&other).merge([("d", "chained")]);

        assert_eq!(base.get("a"), "new");
        assert_eq!(base.get("b"), "kept");
        assert_eq!(base.get("c"), "added");
        assert_eq!(base.get("d"), "chained");
        assert_eq!(base.result, "keep");
    }

    #[test]
    fn json_accepts_partial_and_wrapped_documents() {
        let state = State::from_json(r#"{"result": "x"}"#).unwrap();
        assert_eq!(state.result, "x");
        assert!(state.snapshot.is_empty());

        let wrapped = State::from_json(
            r#"{"state": {"snapshot": {"A": "1"}, "history": [{"role": "assistant", "content": "ok"}]}}"#,
        )
        .unwrap();
        assert_eq!(wrapped.get("A"), "1");
        assert_eq!(wrapped.history[0].role, Role::Assistant);
    }

    #[test]
    fn display_sorts_labels() {
        let mut state = State::new();
        state.set("b", "2").set("a", "1");
        assert_eq!(state.to_string(), "result: \na: 1\nb: 2\n");
    }
}
