//! UI-agnostic conversation state types
//!
//! This module contains data structures that are shared between the TUI, the
//! CLI subcommands and the streaming consumer. None of them depend on a UI
//! framework.

use serde::{Deserialize, Deserializer, Serialize};

/// A chat message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub files: Vec<AttachedFile>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            files: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<AttachedFile>) -> Self {
        self.files = files;
        self
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Extracted text of an uploaded file, paired with its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub name: String,
    pub contents: String,
}

/// One row of the conversation list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationSummary {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub goal: String,
}

/// A single conversation as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationDetail {
    #[serde(default)]
    pub goal: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<AttachedFile>,
}

/// A persisted message; the last one in a conversation carries the artifact
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredMessage {
    #[serde(flatten)]
    pub message: ConversationMessage,
    #[serde(default)]
    pub artifact: Option<String>,
}

/// One decoded unit of a streamed message response
///
/// A fragment may carry a message, an artifact, both or neither. Unknown
/// fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamFragment {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub artifact: Option<String>,
}

/// Everything a conversation view shows: messages plus the current artifact.
///
/// Every mutation goes through a method here and bumps `revision`, so readers
/// can tell whether anything changed since their last look.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub messages: Vec<ConversationMessage>,
    pub artifact: String,
    pub revision: u64,
}

impl ConversationState {
    /// Replace the whole state with what the server has persisted
    pub fn load(&mut self, stored: Vec<StoredMessage>) -> u64 {
        self.artifact = stored
            .last()
            .and_then(|m| m.artifact.clone())
            .unwrap_or_default();
        self.messages = stored.into_iter().map(|m| m.message).collect();
        self.bump()
    }

    /// Reset to a single user message (a fresh conversation's goal)
    pub fn start(&mut self, first: ConversationMessage) -> u64 {
        self.messages = vec![first];
        self.artifact.clear();
        self.bump()
    }

    pub fn push(&mut self, message: ConversationMessage) -> (usize, u64) {
        self.messages.push(message);
        (self.messages.len() - 1, self.bump())
    }

    /// Write the assistant reply for a send.
    ///
    /// `slot` is `None` until the first message fragment arrives; after that
    /// the reply at that index is overwritten. Returns the slot index.
    pub fn put_reply(&mut self, slot: Option<usize>, content: String) -> usize {
        let index = match slot {
            Some(i) if i < self.messages.len() => {
                self.messages[i].content = content;
                i
            }
            _ => {
                self.messages.push(ConversationMessage::assistant(content));
                self.messages.len() - 1
            }
        };
        self.bump();
        index
    }

    pub fn set_artifact(&mut self, artifact: String) -> u64 {
        self.artifact = artifact;
        self.bump()
    }

    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

pub(crate) fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_omits_empty_files() {
        let json = serde_json::to_string(&ConversationMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_stored_message_with_artifact() {
        let stored: Vec<StoredMessage> = serde_json::from_str(
            r##"[{"role":"user","content":"goal"},
                {"role":"assistant","content":"done","artifact":"# Plan"}]"##,
        )
        .unwrap();

        let mut state = ConversationState::default();
        state.load(stored);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].role, ChatRole::Assistant);
        assert_eq!(state.artifact, "# Plan");
    }

    #[test]
    fn test_load_without_artifact_clears_slot() {
        let mut state = ConversationState {
            artifact: "old".to_string(),
            ..Default::default()
        };
        state.load(vec![StoredMessage {
            message: ConversationMessage::user("x"),
            artifact: None,
        }]);
        assert_eq!(state.artifact, "");
    }

    #[test]
    fn test_numeric_id_is_stringified() {
        let list: Vec<ConversationSummary> =
            serde_json::from_str(r#"[{"id":7,"goal":"a"},{"id":"abc","goal":"b"}]"#).unwrap();
        assert_eq!(list[0].id, "7");
        assert_eq!(list[1].id, "abc");
    }

    #[test]
    fn test_detail_null_files() {
        let detail: ConversationDetail =
            serde_json::from_str(r#"{"goal":"g","files":null}"#).unwrap();
        assert!(detail.files.is_empty());
    }

    #[test]
    fn test_put_reply_overwrites_slot() {
        let mut state = ConversationState::default();
        state.push(ConversationMessage::user("q"));
        let slot = state.put_reply(None, "a".to_string());
        let again = state.put_reply(Some(slot), "ab".to_string());
        assert_eq!(slot, again);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "ab");
    }

    #[test]
    fn test_revision_increases_on_every_mutation() {
        let mut state = ConversationState::default();
        let a = state.start(ConversationMessage::user("g"));
        let b = state.set_artifact("x".to_string());
        let (_, c) = state.push(ConversationMessage::user("y"));
        assert!(a < b && b < c);
    }
}
