//! Verify that received data is valid

use serde_json::Value;
use url::Url;

/// Host part of `url`, empty if it is not an absolute url with a host.
///
/// The port is not part of the result.
///
/// ```
/// # use activitypub_signed_client::protocol::verification::host_of;
/// assert_eq!(host_of("https://example.com:8443/u/alice"), "example.com");
/// assert_eq!(host_of("not a url"), "");
/// ```
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

/// Check that both urls have the same, non-empty host.
///
/// ```
/// # use activitypub_signed_client::protocol::verification::domains_match;
/// assert!(domains_match("https://example.com/abc", "https://example.com/123"));
/// assert!(!domains_match("https://example.com/abc", "https://sample.net/abc"));
/// assert!(!domains_match("", ""));
/// ```
pub fn domains_match(a: &str, b: &str) -> bool {
    let a = host_of(a);
    !a.is_empty() && a == host_of(b)
}

/// Author of the object carried by an activity, read from `object.attributedTo`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributedTo {
    /// The activity has no embedded object, or the object has no `attributedTo`
    Missing,
    /// Plain url
    Url(String),
    /// Embedded actor. `id` is empty if the object has no string `id`.
    Reference {
        /// Id of the embedded actor
        id: String,
    },
}

impl AttributedTo {
    /// Read `object.attributedTo` from an activity
    ///
    /// ```
    /// # use activitypub_signed_client::protocol::verification::AttributedTo;
    /// let activity = serde_json::json!({
    ///     "id": "https://example.com/activities/1",
    ///     "object": { "attributedTo": { "id": "https://example.com/u/alice" } }
    /// });
    /// let author = AttributedTo::from_activity(&activity);
    /// assert_eq!(author.effective_host().as_deref(), Some("example.com"));
    /// ```
    pub fn from_activity(activity: &Value) -> Self {
        let Some(attributed_to) = activity
            .get("object")
            .and_then(|object| object.get("attributedTo"))
        else {
            return AttributedTo::Missing;
        };
        match attributed_to {
            Value::Null => AttributedTo::Missing,
            Value::String(url) => AttributedTo::Url(url.clone()),
            Value::Object(object) => AttributedTo::Reference {
                id: object
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => AttributedTo::Url(String::new()),
        }
    }

    /// Host which must match the signing key. None if there is nothing to check, an empty string
    /// if the author is present but unusable, which never matches.
    pub fn effective_host(&self) -> Option<String> {
        match self {
            AttributedTo::Missing => None,
            AttributedTo::Url(url) | AttributedTo::Reference { id: url } => Some(host_of(url)),
        }
    }
}
