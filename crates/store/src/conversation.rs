//! Conversation Store (C4): ordered transcript plus a reserved-key side
//! store for domain artifacts.
//!
//! Grounded on `sa_sessions::store::SessionStore`'s `RwLock<HashMap<_>>`
//! locking discipline, but in-memory only — spec.md's Non-goals exclude
//! durable persistence, so unlike `SessionStore` there is no `flush()`.

use std::collections::HashMap;

use ac_domain::error::{CoreError, Result};
use ac_domain::tool::Message;
use parking_lot::RwLock;
use serde_json::Value;

/// Key names the framework itself writes to the side store. User code may
/// not claim one of these via [`Key::custom`].
pub const RESERVED_KEY_NAMES: &[&str] = &[
    "history",
    "files",
    "current-article",
    "todo",
    "dictionaries",
    "storage",
    "tool-registry",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    Files,
    CurrentArticle,
    Todo,
    Dictionaries,
    Storage,
    ToolRegistry,
}

impl ReservedKey {
    fn as_str(self) -> &'static str {
        match self {
            ReservedKey::Files => "files",
            ReservedKey::CurrentArticle => "current-article",
            ReservedKey::Todo => "todo",
            ReservedKey::Dictionaries => "dictionaries",
            ReservedKey::Storage => "storage",
            ReservedKey::ToolRegistry => "tool-registry",
        }
    }
}

/// A side-store key: either one of the framework's reserved keys, or a
/// user-chosen name disjoint from them (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Reserved(ReservedKey),
    Custom(String),
}

impl Key {
    pub fn reserved(r: ReservedKey) -> Self {
        Key::Reserved(r)
    }

    pub fn custom(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if RESERVED_KEY_NAMES.contains(&name.as_str()) {
            return Err(CoreError::ConfigInvalid(format!(
                "key '{name}' is reserved for the Conversation Store"
            )));
        }
        Ok(Key::Custom(name))
    }

    fn as_str(&self) -> &str {
        match self {
            Key::Reserved(r) => r.as_str(),
            Key::Custom(s) => s.as_str(),
        }
    }
}

/// Thread-safe ordered transcript plus a generic keyed side store.
pub struct ConversationStore {
    transcript: RwLock<Vec<Message>>,
    side_store: RwLock<HashMap<String, Value>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            transcript: RwLock::new(Vec::new()),
            side_store: RwLock::new(HashMap::new()),
        }
    }

    /// Append one message. Writers serialize through a single lock, so
    /// messages from one caller appear in append order.
    pub fn append(&self, msg: Message) {
        self.transcript.write().push(msg);
    }

    /// A defensive copy of the transcript so far.
    pub fn history(&self) -> Vec<Message> {
        self.transcript.read().clone()
    }

    pub fn set(&self, key: &Key, value: Value) {
        self.side_store.write().insert(key.as_str().to_string(), value);
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.side_store.read().get(key.as_str()).cloned()
    }

    /// Read-modify-write a side-store entry under one lock acquisition.
    pub fn update<F>(&self, key: &Key, f: F)
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let mut store = self.side_store.write();
        let current = store.get(key.as_str()).cloned();
        store.insert(key.as_str().to_string(), f(current));
    }
}
