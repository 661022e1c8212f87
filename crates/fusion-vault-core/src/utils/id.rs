use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Deserializer};

/// Random suffix width in base-36 digits
const SUFFIX_DIGITS: u32 = 6;

/// Render `value` in lowercase base 36, like JavaScript's `toString(36)`.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// New entry id: base-36 creation time in milliseconds plus a short random
/// suffix so ids minted within the same millisecond still differ.
pub fn generate_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix = rand::thread_rng().gen_range(0..36u64.pow(SUFFIX_DIGITS));
    format!(
        "{}{:0>width$}",
        to_base36(millis),
        to_base36(suffix),
        width = SUFFIX_DIGITS as usize
    )
}

/// Accept ids written either as strings or as JSON numbers (older module
/// backups used `Date.now()` directly).
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
