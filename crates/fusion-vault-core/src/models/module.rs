use std::borrow::Cow;
use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::utils::{generate_id, Identified};

/// Content stored for a module saved without a body
pub const EMPTY_MODULE_CONTENT: &str = "<h1>Empty Module</h1>";

/// Module id exactly as it appeared on the wire.
///
/// The browser widget mints numeric `Date.now()` ids and compares them with
/// `===`, so a numeric id must be written back as a number. Ids minted here
/// are base-36 text. Either kind compares by its string form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    Number(Number),
    Text(String),
}

impl ModuleId {
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            ModuleId::Number(number) => Cow::Owned(number.to_string()),
            ModuleId::Text(text) => Cow::Borrowed(text),
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        self.as_key() == id
    }
}

impl PartialEq for ModuleId {
    fn eq(&self, other: &Self) -> bool {
        self.as_key() == other.as_key()
    }
}

impl Eq for ModuleId {}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.as_key())
    }
}

/// A titled HTML snippet ("stack") kept in the module store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Module {
    #[cfg_attr(feature = "ts", ts(type = "number | string"))]
    pub id: ModuleId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Last-saved date in the browser's short form, e.g. "1/2/2024"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Fields written by other producers (remote stacks carry `user`,
    /// `infodose`, `at`), kept as-is so backups round-trip.
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Module {
    pub fn new(title: &str, content: &str) -> Self {
        let mut module = Self {
            id: ModuleId::Text(generate_id()),
            title: String::new(),
            content: String::new(),
            date: None,
            extra: Map::new(),
        };
        module.edit(title, content);
        module
    }

    /// Replace title and content and stamp today's date.
    pub fn edit(&mut self, title: &str, content: &str) {
        let content = if content.is_empty() {
            EMPTY_MODULE_CONTENT
        } else {
            content
        };
        self.title = title.to_string();
        self.content = content.to_string();
        self.date = Some(today());
    }

    /// Date shown in listings, "--" when the entry never had one
    pub fn date_display(&self) -> &str {
        self.date.as_deref().unwrap_or("--")
    }
}

impl Identified for Module {
    fn id(&self) -> Cow<'_, str> {
        self.id.as_key()
    }
}

fn today() -> String {
    Local::now().format("%-m/%-d/%Y").to_string()
}
