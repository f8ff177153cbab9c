//! Opaque JSON documents exchanged with remote servers

use crate::protocol::public_key::PublicKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// A JSON object fetched from a remote server, such as an actor, collection or collection page.
///
/// The content is not validated, only the handful of keys needed for discovery and paging are
/// read through the accessors below. Everything else stays available through [Deref] to the
/// underlying map.
///
/// ```
/// # use activitypub_signed_client::protocol::document::Document;
/// let actor: Document = serde_json::from_str(r#"{
///     "id": "https://example.com/u/alice",
///     "followers": "https://example.com/u/alice/followers",
///     "endpoints": { "sharedInbox": "https://example.com/inbox" }
/// }"#)?;
/// assert_eq!(actor.followers(), Some("https://example.com/u/alice/followers"));
/// assert_eq!(actor.shared_inbox(), Some("https://example.com/inbox"));
/// assert_eq!(actor.outbox(), None);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Wrap a JSON object
    pub fn new(map: Map<String, Value>) -> Self {
        Document(map)
    }

    /// Returns the wrapped JSON object
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Read `key` as a link to another document.
    ///
    /// A plain string is the link itself. An embedded object is followed by its `id`. Any other
    /// value counts as missing.
    pub fn link(&self, key: &str) -> Option<&str> {
        link_target(self.0.get(key)?)
    }

    /// Canonical url of this document
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Followers collection of an actor
    pub fn followers(&self) -> Option<&str> {
        self.link("followers")
    }

    /// Following collection of an actor
    pub fn following(&self) -> Option<&str> {
        self.link("following")
    }

    /// Outbox collection of an actor
    pub fn outbox(&self) -> Option<&str> {
        self.link("outbox")
    }

    /// Shared inbox of an actor, from `endpoints.sharedInbox`
    pub fn shared_inbox(&self) -> Option<&str> {
        link_target(self.0.get("endpoints")?.get("sharedInbox")?)
    }

    /// First page of a collection
    pub fn first(&self) -> Option<&str> {
        self.link("first")
    }

    /// Next page of a collection page
    pub fn next(&self) -> Option<&str> {
        self.link("next")
    }

    /// Previous page of a collection page
    pub fn prev(&self) -> Option<&str> {
        self.link("prev")
    }

    /// Public key published by an actor. None if missing or malformed.
    pub fn public_key(&self) -> Option<PublicKey> {
        serde_json::from_value(self.0.get("publicKey")?.clone()).ok()
    }

    /// HTTP status of the response, only present if it was not `200 OK`
    pub fn response_status(&self) -> Option<u16> {
        self.0
            .get("response")?
            .get("status")?
            .as_u64()
            .and_then(|status| u16::try_from(status).ok())
    }

    /// Record the HTTP status under `response.status`, so that error bodies can be told apart
    /// from regular documents.
    pub(crate) fn set_response_status(&mut self, status: u16) {
        let response = self
            .0
            .entry("response")
            .or_insert_with(|| Value::Object(Map::new()));
        if !response.is_object() {
            *response = Value::Object(Map::new());
        }
        if let Value::Object(response) = response {
            response.insert("status".to_string(), Value::from(status));
        }
    }
}

fn link_target(value: &Value) -> Option<&str> {
    match value {
        Value::String(link) => Some(link),
        Value::Object(object) => object.get("id").and_then(Value::as_str),
        _ => None,
    }
}

impl Deref for Document {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Document {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Document(map)
    }
}
