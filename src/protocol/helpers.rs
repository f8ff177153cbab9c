//! Serde deserialization functions which help to receive differently shaped data

use serde::{Deserialize, Deserializer};

/// Attempts to deserialize item, in case of error falls back to the type's default value.
///
/// Useful for optional fields which some servers send with a different type, eg a number
/// instead of a string. Should always be used together with `#[serde(default)]`, so that a
/// missing value doesn't cause an error.
///
/// ```
/// # use activitypub_signed_client::protocol::helpers::deserialize_skip_error;
/// #[derive(serde::Deserialize)]
/// struct Link {
///     rel: String,
///     #[serde(deserialize_with = "deserialize_skip_error", default)]
///     href: Option<String>
/// }
///
/// let link = serde_json::from_str::<Link>(
/// r#"{
///     "rel": "self",
///     "href": { "url": "https://example.com/u/alice" }
/// }"#)?;
/// assert_eq!(link.href, None);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn deserialize_skip_error<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: Deserialize<'de> + Default,
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let inner = T::deserialize(value).unwrap_or_default();
    Ok(inner)
}
