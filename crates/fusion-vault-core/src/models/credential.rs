use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_id, Identified};

/// A named secret kept in the vault: an API token plus an optional webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Credential {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl Credential {
    pub fn has_webhook(&self) -> bool {
        self.webhook.as_deref().is_some_and(|w| !w.is_empty())
    }

    /// Short label for listings ("WEBHOOK" or "API KEY")
    pub fn kind_label(&self) -> &'static str {
        if self.has_webhook() {
            "WEBHOOK"
        } else {
            "API KEY"
        }
    }
}

impl Identified for Credential {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.id)
    }
}

/// Clear every `active` flag after the first one, restoring the
/// at-most-one-active invariant on lists that came from outside.
pub fn keep_first_active(credentials: &mut [Credential]) {
    let mut seen_active = false;
    for credential in credentials.iter_mut() {
        if credential.active {
            if seen_active {
                credential.active = false;
            }
            seen_active = true;
        }
    }
}
