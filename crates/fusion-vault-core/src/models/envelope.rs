use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::Credential;

/// Decrypted vault contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultPayload {
    #[serde(rename = "keys", alias = "credentials", default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub user: String,
}

/// What the vault persists under its storage key.
///
/// On the wire this is `{"isEncrypted": false, "data": {payload}}` or
/// `{"isEncrypted": true, "data": "<bundle json>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub enum VaultEnvelope {
    Plaintext(VaultPayload),
    Encrypted(String),
}

impl VaultEnvelope {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, VaultEnvelope::Encrypted(_))
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "isEncrypted", default)]
    is_encrypted: bool,
    #[serde(alias = "payload")]
    data: Value,
}

impl TryFrom<RawEnvelope> for VaultEnvelope {
    type Error = String;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        if raw.is_encrypted {
            match raw.data {
                Value::String(bundle) => Ok(VaultEnvelope::Encrypted(bundle)),
                other => Err(format!(
                    "encrypted envelope must carry a string bundle, found {}",
                    json_kind(&other)
                )),
            }
        } else {
            serde_json::from_value(raw.data)
                .map(VaultEnvelope::Plaintext)
                .map_err(|e| format!("invalid plaintext payload: {}", e))
        }
    }
}

impl Serialize for VaultEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("VaultEnvelope", 2)?;
        match self {
            VaultEnvelope::Plaintext(payload) => {
                state.serialize_field("isEncrypted", &false)?;
                state.serialize_field("data", payload)?;
            }
            VaultEnvelope::Encrypted(bundle) => {
                state.serialize_field("isEncrypted", &true)?;
                state.serialize_field("data", bundle)?;
            }
        }
        state.end()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
