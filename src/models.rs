use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Speaker of a conversation message.
///
/// `analyst` is accepted as an alias of `assistant`; any role outside the
/// known set is kept verbatim and left for the backend to judge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Other(role) => role.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Role::User,
            "assistant" | "analyst" => Role::Assistant,
            "system" => Role::System,
            _ => Role::Other(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed part of a multi-part message or reply.
///
/// Part types this crate does not model are kept as raw JSON so they survive
/// a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Sql {
        statement: String,
        /// Fields besides the statement, such as `confidence`.
        extra: Map<String, Value>,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Other(Value),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn sql(statement: impl Into<String>) -> Self {
        ContentPart::Sql {
            statement: statement.into(),
            extra: Map::new(),
        }
    }
}

/// Wire form of the part types with a known shape.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedPart {
    Text {
        #[serde(default)]
        text: String,
    },
    Sql {
        #[serde(default)]
        statement: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Suggestions {
        #[serde(default)]
        suggestions: Vec<String>,
    },
}

impl TryFrom<Value> for ContentPart {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let known = matches!(
            value.get("type").and_then(Value::as_str),
            Some("text" | "sql" | "suggestions")
        );
        if !known {
            return Ok(ContentPart::Other(value));
        }
        Ok(match serde_json::from_value::<TypedPart>(value)? {
            TypedPart::Text { text } => ContentPart::Text { text },
            TypedPart::Sql { statement, extra } => ContentPart::Sql { statement, extra },
            TypedPart::Suggestions { suggestions } => ContentPart::Suggestions { suggestions },
        })
    }
}

impl From<ContentPart> for Value {
    fn from(part: ContentPart) -> Self {
        let typed = match part {
            ContentPart::Other(value) => return value,
            ContentPart::Text { text } => TypedPart::Text { text },
            ContentPart::Sql { statement, extra } => TypedPart::Sql { statement, extra },
            ContentPart::Suggestions { suggestions } => TypedPart::Suggestions { suggestions },
        };
        // strings, lists and JSON maps always serialize
        serde_json::to_value(typed).unwrap_or_default()
    }
}

/// Message content: either a plain string or an ordered list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(value: Vec<ContentPart>) -> Self {
        MessageContent::Parts(value)
    }
}

/// A caller-supplied message of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ConversationMessage {
    pub fn new(role: impl Into<Role>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Flat role/text pair accepted by chat-style backends.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Fully prepared request handed to a backend. Built once per dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// Normalized conversation, context instruction first.
    pub messages: Vec<ChatMessage>,
    /// The caller's history as received, parts intact. Backends that accept
    /// typed parts send this instead of the normalized form.
    pub history: Vec<ConversationMessage>,
    pub semantic_model: String,
    pub model: String,
}

/// Canonical reply returned to callers whichever backend served the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReply {
    pub content: Vec<ContentPart>,
    #[serde(rename = "requestId", alias = "request_id")]
    pub request_id: String,
}

impl BackendReply {
    pub fn from_text(text: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(text)],
            request_id: request_id.into(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// The caller's active platform session: the per-session host used by the
/// analyst backend in direct mode and the token that authenticates it.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionConnection {
    pub host: String,
    pub token: String,
}

impl SessionConnection {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConnection")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .finish()
    }
}
