use crate::{
    error::Error,
    fetch::FederationClient,
    http_signatures::KeyMaterial,
    protocol::{document::Document, helpers::deserialize_skip_error},
    FEDERATION_CONTENT_TYPE,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Errors relative to webfinger handling
#[derive(thiserror::Error, Debug)]
pub enum WebFingerError {
    /// The handle is not of the form `user@host`
    #[error("WebFinger handle is malformed '{0}'")]
    MalformedHandle(String),
    /// The webfinger document has fields of the wrong type, or a link without `rel`
    #[error("Invalid webfinger document: {0}")]
    Shape(serde_json::Error),
}

/// A webfinger response, as described in [RFC 7033](https://www.rfc-editor.org/rfc/rfc7033).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Webfinger {
    /// The actor which is described here, for example `acct:LemmyDev@mastodon.social`
    #[serde(default)]
    pub subject: Option<String>,
    /// Other urls which identify the same actor as the `subject`
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Links where further data about `subject` can be retrieved
    #[serde(default)]
    pub links: Vec<WebfingerLink>,
}

/// A single link included as part of a [Webfinger] response.
///
/// Optional fields of another type than string are dropped.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WebfingerLink {
    /// Relationship of the link, such as `self` or `http://webfinger.net/rel/profile-page`
    pub rel: String,
    /// Media type of the target resource
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_skip_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    /// Url pointing to the target resource
    #[serde(
        default,
        deserialize_with = "deserialize_skip_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub href: Option<String>,
    /// Used for remote follow external interaction url
    #[serde(
        default,
        deserialize_with = "deserialize_skip_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub template: Option<String>,
}

impl Webfinger {
    /// Check the shape of a fetched webfinger document
    pub fn from_document(document: Document) -> Result<Self, WebFingerError> {
        serde_json::from_value(Value::Object(document.into_inner())).map_err(WebFingerError::Shape)
    }

    /// Url of the ActivityPub actor, taken from the first `self` link of type
    /// `application/activity+json`.
    pub fn profile_id(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| {
                link.rel == "self" && link.kind.as_deref() == Some(FEDERATION_CONTENT_TYPE)
            })
            .and_then(|link| link.href.as_deref())
    }

    /// The `subject` without `acct:` prefix, for example `LemmyDev@mastodon.social`
    pub fn handle(&self) -> Option<&str> {
        let subject = self.subject.as_deref()?;
        Some(subject.strip_prefix("acct:").unwrap_or(subject))
    }
}

static WEBFINGER_HANDLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@?(?P<user>[\w\-\.]+)@(?P<host>[\w\.\-]+)(?P<port>:\d+)?$")
        .expect("compile regex")
});

/// Url of the webfinger document for a handle like `alice@example.com` or `@alice@example.com`.
///
/// ```
/// # use activitypub_signed_client::fetch::webfinger::build_webfinger_url;
/// let url = build_webfinger_url("@alice@example.com:8443")?;
/// assert_eq!(
///     url.as_str(),
///     "https://example.com:8443/.well-known/webfinger?resource=acct:alice@example.com"
/// );
/// # Ok::<(), activitypub_signed_client::error::Error>(())
/// ```
pub fn build_webfinger_url(handle: &str) -> Result<Url, Error> {
    let captures = WEBFINGER_HANDLE_REGEX
        .captures(handle)
        .ok_or_else(|| WebFingerError::MalformedHandle(handle.to_string()))?;
    let capture = |name: &str| captures.name(name).map(|m| m.as_str()).unwrap_or_default();
    let (user, host, port) = (capture("user"), capture("host"), capture("port"));
    Ok(Url::parse(&format!(
        "https://{host}{port}/.well-known/webfinger?resource=acct:{user}@{host}"
    ))?)
}

impl FederationClient {
    /// Fetch the webfinger document for `handle`.
    ///
    /// In debug mode the document is fetched over plain http. Returns `None` if the server
    /// answers with something other than a JSON object.
    pub async fn get_webfinger(
        &self,
        handle: &str,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Webfinger>, Error> {
        let mut url = build_webfinger_url(handle)?;
        if self.config.debug {
            url.set_scheme("http")
                .map_err(|_| Error::UrlVerificationError("Cannot use http for webfinger"))?;
        }
        debug!("Fetching webfinger url: {}", &url);

        match self.fetch_document(url.as_str(), key).await? {
            Some(document) => Ok(Some(Webfinger::from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Resolve `handle` over webfinger and fetch the actor it points to. Both requests are
    /// signed with `key`.
    pub async fn get_actor_by_handle(
        &self,
        handle: &str,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        match self.get_webfinger(handle, key).await? {
            Some(webfinger) => self.get_actor_by_webfinger(&webfinger, key).await,
            None => Ok(None),
        }
    }

    /// Fetch the actor a webfinger document points to.
    ///
    /// Without a matching link the empty url is fetched, which fails with [Error::UrlParse].
    pub async fn get_actor_by_webfinger(
        &self,
        webfinger: &Webfinger,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        let profile_id = webfinger.profile_id().unwrap_or_default();
        self.get_actor(Some(profile_id), key).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        config::FederationConfig,
        transport::tests::{actor_json, test_client, MockTransport, TEST_KEYPAIR},
    };
    use http::StatusCode;
    use serde_json::json;

    const WEBFINGER_URL: &str =
        "https://example.com/.well-known/webfinger?resource=acct:alice@example.com";

    fn webfinger_json() -> Value {
        json!({
            "subject": "acct:alice@example.com",
            "aliases": ["https://example.com/@alice"],
            "links": [
                {
                    "rel": "http://webfinger.net/rel/profile-page",
                    "type": "text/html",
                    "href": "https://example.com/@alice"
                },
                {
                    "rel": "self",
                    "type": "application/activity+json",
                    "href": "https://example.com/u/alice"
                },
                {
                    "rel": "http://ostatus.org/schema/1.0/subscribe",
                    "template": "https://example.com/authorize_interaction?uri={uri}"
                }
            ]
        })
    }

    fn webfinger(value: Value) -> Result<Webfinger, WebFingerError> {
        Webfinger::from_document(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_build_webfinger_url() -> Result<(), Error> {
        assert_eq!(build_webfinger_url("alice@example.com")?.as_str(), WEBFINGER_URL);
        assert_eq!(build_webfinger_url("@alice@example.com")?.as_str(), WEBFINGER_URL);
        assert_eq!(
            build_webfinger_url("al_ice.b-c@social.example.org")?.as_str(),
            "https://social.example.org/.well-known/webfinger?resource=acct:al_ice.b-c@social.example.org"
        );
        Ok(())
    }

    #[test]
    fn test_build_webfinger_url_malformed() {
        for handle in ["not-a-handle", "alice@", "@example.com", "alice@exa mple.com"] {
            let res = build_webfinger_url(handle);
            assert!(
                matches!(res, Err(Error::WebFinger(WebFingerError::MalformedHandle(_)))),
                "{handle}"
            );
        }
    }

    #[test]
    fn test_webfinger_shape() {
        let wf = webfinger(webfinger_json()).unwrap();
        assert_eq!(wf.profile_id(), Some("https://example.com/u/alice"));
        assert_eq!(wf.handle(), Some("alice@example.com"));
        assert_eq!(wf.aliases, vec!["https://example.com/@alice".to_string()]);
        assert_eq!(
            wf.links[2].template.as_deref(),
            Some("https://example.com/authorize_interaction?uri={uri}")
        );

        let dropped = webfinger(json!({ "links": [{ "rel": "self", "href": 5 }] })).unwrap();
        assert_eq!(dropped.links[0].href, None);
        assert_eq!(dropped.profile_id(), None);
        assert_eq!(dropped.handle(), None);

        assert!(webfinger(json!({ "links": [{ "href": "https://example.com" }] })).is_err());
        assert!(webfinger(json!({ "links": [{ "rel": 1 }] })).is_err());
        assert!(webfinger(json!({ "links": ["self"] })).is_err());
        assert!(webfinger(json!({ "aliases": [1] })).is_err());
        assert!(webfinger(json!({ "subject": ["acct:alice@example.com"] })).is_err());
    }

    #[test]
    fn test_profile_id_needs_activity_json_type() {
        let wf = webfinger(json!({
            "links": [
                { "rel": "self", "type": "text/html", "href": "https://example.com/@alice" },
                { "rel": "self", "type": "application/activity+json", "href": "https://example.com/u/1" },
                { "rel": "self", "type": "application/activity+json", "href": "https://example.com/u/2" }
            ]
        }))
        .unwrap();
        assert_eq!(wf.profile_id(), Some("https://example.com/u/1"));
    }

    #[tokio::test]
    async fn test_get_actor_by_handle() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(WEBFINGER_URL, StatusCode::OK, webfinger_json());
        transport.respond(
            "https://example.com/u/alice",
            StatusCode::OK,
            actor_json("https://example.com/u/alice"),
        );
        let client = test_client(&transport);
        let key = TEST_KEYPAIR.key_material(Url::parse("https://local.example/u/bob#main-key")?);

        let actor = client
            .get_actor_by_handle("@alice@example.com", Some(&key))
            .await?
            .unwrap();
        assert_eq!(actor.id(), Some("https://example.com/u/alice"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.as_str(), WEBFINGER_URL);
        assert!(requests
            .iter()
            .all(|request| request.headers.contains_key("signature")));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_actor_by_webfinger_without_self_link() {
        let transport = MockTransport::default();
        let client = test_client(&transport);
        let wf = webfinger(json!({ "subject": "acct:alice@example.com" })).unwrap();

        let res = client.get_actor_by_webfinger(&wf, None).await;
        assert!(matches!(res, Err(Error::UrlParse(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_get_webfinger_shape_error() {
        let transport = MockTransport::default();
        transport.respond(WEBFINGER_URL, StatusCode::OK, json!({ "links": [{}] }));
        let client = test_client(&transport);

        let res = client.get_webfinger("alice@example.com", None).await;
        assert!(matches!(res, Err(Error::WebFinger(WebFingerError::Shape(_)))));
    }

    #[tokio::test]
    async fn test_get_webfinger_debug_uses_http() -> Result<(), Error> {
        let transport = MockTransport::default();
        let config = FederationConfig::builder()
            .transport(transport.clone())
            .debug(true)
            .build()
            .unwrap();
        let client = FederationClient::new(config);

        let wf = client
            .get_webfinger("alice@localhost:8080", None)
            .await?
            .unwrap();
        assert_eq!(wf.profile_id(), None);
        assert_eq!(
            transport.last_request().url.as_str(),
            "http://localhost:8080/.well-known/webfinger?resource=acct:alice@localhost"
        );
        Ok(())
    }
}
