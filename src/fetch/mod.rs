//! Utilities for fetching data from other servers
//!
//! All requests go through [FederationClient::signed_request]. It signs the request if key
//! material is given, sends it over the configured [Transport](crate::transport::Transport) and
//! decodes the response into a [Document].

use crate::{
    config::FederationConfig,
    error::Error,
    http_signatures::{sign, HeaderList, KeyMaterial},
    protocol::document::Document,
    transport::TransportRequest,
    FEDERATION_ACCEPT,
    FEDERATION_CONTENT_TYPE,
};
use bytes::Bytes;
use http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderMap,
    HeaderValue,
    Method,
    StatusCode,
};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

/// Paging through collections
pub mod collection;
/// Resolves identifiers of the form `name@example.com`
pub mod webfinger;

/// Client for talking to other ActivityPub servers.
///
/// Cheap to clone. It keeps no state between calls apart from the configuration, key material is
/// passed to each call that should be signed.
#[derive(Clone)]
pub struct FederationClient {
    config: FederationConfig,
}

impl FederationClient {
    /// Create a client from the given configuration
    pub fn new(config: FederationConfig) -> Self {
        FederationClient { config }
    }

    /// Configuration used by this client
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Send a request to `url` and decode the response.
    ///
    /// The request is signed with `key` unless it is `None` or has a blank private key, then it is
    /// sent with just `additional_headers`. `body` is serialized to JSON and digested. `GET`
    /// requests carry it in the query string instead, `POST` and `PUT` requests as the body.
    /// Other methods ignore `body`, so it is neither sent nor digested.
    ///
    /// Every request is sent with `Accept: `[FEDERATION_ACCEPT]. An `Accept` header in
    /// `additional_headers` is dropped, before signing, because servers only answer with
    /// ActivityPub documents to that value.
    ///
    /// A `200 OK` response holding a JSON object is returned as is, any other `200 OK` body
    /// yields `None`. For other status codes the status is stored in `response.status` of the
    /// returned document, see [Document::response_status].
    pub async fn signed_request(
        &self,
        method: Method,
        key: Option<&KeyMaterial>,
        url: &str,
        body: Option<&Value>,
        additional_headers: &HeaderList,
    ) -> Result<Option<Document>, Error> {
        let mut url = Url::parse(url)?;
        self.config.verify_url_valid(&url).await?;

        let sends_body = method == Method::POST || method == Method::PUT;
        let body = body.filter(|_| method == Method::GET || sends_body);
        let payload = body.map(serde_json::to_vec).transpose()?.map(Bytes::from);

        let mut additional_headers = additional_headers.clone();
        if let Some(accept) = additional_headers.remove(ACCEPT.as_str()) {
            debug!("Replacing Accept header {accept} with {FEDERATION_ACCEPT}");
        }
        let signed_headers = match key.filter(|key| key.is_usable()) {
            Some(key) => sign_blocking(key, &url, payload.clone(), &additional_headers).await?,
            None => additional_headers,
        };

        let mut headers = HeaderMap::new();
        signed_headers.append_to(&mut headers)?;
        headers.insert(ACCEPT, HeaderValue::from_static(FEDERATION_ACCEPT));

        let body = if sends_body {
            if payload.is_some() && !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(FEDERATION_CONTENT_TYPE),
                );
            }
            payload
        } else {
            if let Some(body) = body {
                append_query(&mut url, body);
            }
            None
        };

        info!("Sending {} {}", method, url);
        let response = self
            .config
            .transport
            .send(TransportRequest {
                method,
                url,
                headers,
                body,
                timeout: self.config.request_timeout,
                body_limit: self.config.response_body_limit,
            })
            .await?;

        Ok(decode_response(response.status, &response.body))
    }

    /// Signed `GET` request, see [FederationClient::signed_request]
    pub async fn signed_get(
        &self,
        key: Option<&KeyMaterial>,
        url: &str,
        body: Option<&Value>,
        additional_headers: &HeaderList,
    ) -> Result<Option<Document>, Error> {
        self.signed_request(Method::GET, key, url, body, additional_headers)
            .await
    }

    /// Signed `POST` request, see [FederationClient::signed_request]
    pub async fn signed_post(
        &self,
        key: Option<&KeyMaterial>,
        url: &str,
        body: Option<&Value>,
        additional_headers: &HeaderList,
    ) -> Result<Option<Document>, Error> {
        self.signed_request(Method::POST, key, url, body, additional_headers)
            .await
    }

    pub(crate) async fn fetch_document(
        &self,
        url: &str,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        self.signed_get(key, url, None, &HeaderList::new()).await
    }

    /// Fetch the actor with the given id.
    ///
    /// Fails with [Error::InvalidArgument] if `profile_id` is `None`, without any request.
    pub async fn get_actor(
        &self,
        profile_id: Option<&str>,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        let profile_id = profile_id.ok_or(Error::InvalidArgument("Invalid profile ID"))?;
        self.fetch_document(profile_id, key).await
    }

    /// Fetch the followers collection of `actor`. `None` if the actor doesn't publish one.
    pub async fn get_actor_followers_collection(
        &self,
        actor: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        self.fetch_link(actor.followers(), key).await
    }

    /// Fetch the following collection of `actor`. `None` if the actor doesn't publish one.
    pub async fn get_actor_following_collection(
        &self,
        actor: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        self.fetch_link(actor.following(), key).await
    }

    /// Fetch the outbox of `actor`. `None` if the actor doesn't publish one.
    pub async fn get_actor_outbox_collection(
        &self,
        actor: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        self.fetch_link(actor.outbox(), key).await
    }

    /// Fetch the shared inbox of `actor` as a collection. `None` if the actor has no
    /// `endpoints.sharedInbox`.
    ///
    /// ActivityPub says shared inboxes should also be readable collections of public objects,
    /// few servers implement this.
    pub async fn get_actor_shared_inbox_collection(
        &self,
        actor: &Document,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        self.fetch_link(actor.shared_inbox(), key).await
    }

    async fn fetch_link(
        &self,
        link: Option<&str>,
        key: Option<&KeyMaterial>,
    ) -> Result<Option<Document>, Error> {
        match link {
            Some(url) => self.fetch_document(url, key).await,
            None => Ok(None),
        }
    }
}

/// RSA signing is CPU heavy, so keep it off the async executor
async fn sign_blocking(
    key: &KeyMaterial,
    url: &Url,
    payload: Option<Bytes>,
    additional_headers: &HeaderList,
) -> Result<HeaderList, Error> {
    let key = key.clone();
    let url = url.clone();
    let additional_headers = additional_headers.clone();
    tokio::task::spawn_blocking(move || {
        sign(
            &key.key_id,
            &key.private_key,
            &url,
            payload.as_deref(),
            &additional_headers,
        )
    })
    .await
    .map_err(Error::other)?
}

fn decode_response(status: StatusCode, body: &[u8]) -> Option<Document> {
    let decoded = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(Document::new(map)),
        Ok(_) => None,
        Err(e) => {
            if !body.is_empty() {
                debug!("Response body is not valid JSON: {e}");
            }
            None
        }
    };
    if status == StatusCode::OK {
        return decoded;
    }

    debug!("Remote server responded with status {status}");
    let mut document = decoded.unwrap_or_default();
    document.set_response_status(status.as_u16());
    Some(document)
}

/// Encode `body` as query parameters in the nested `key[sub]=value` form. Booleans become `1`
/// or `0`, nulls are skipped.
fn append_query(url: &mut Url, body: &Value) {
    let mut pairs = Vec::new();
    flatten_query(None, body, &mut pairs);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
}

fn flatten_query(prefix: Option<&str>, value: &Value, pairs: &mut Vec<(String, String)>) {
    let nested = |key: &str| match prefix {
        Some(prefix) => format!("{prefix}[{key}]"),
        None => key.to_string(),
    };
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_query(Some(&nested(key)), value, pairs);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_query(Some(&nested(&index.to_string())), value, pairs);
            }
        }
        Value::Null => {}
        scalar => {
            let Some(prefix) = prefix else { return };
            let value = match scalar {
                Value::Bool(true) => "1".to_string(),
                Value::Bool(false) => "0".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push((prefix.to_string(), value));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        http_signatures::{digest_header_value, load_public_key, parse_signature_header, verify},
        transport::tests::{actor_json, test_client, MockTransport, TEST_KEYPAIR},
    };
    use serde_json::json;

    const ACTOR_ID: &str = "https://example.com/u/alice";

    fn test_key() -> KeyMaterial {
        TEST_KEYPAIR.key_material(Url::parse("https://local.example/u/bob#main-key").unwrap())
    }

    fn assert_signature_valid(request: &TransportRequest) {
        let header = request.headers.get("signature").unwrap().to_str().unwrap();
        let signature = parse_signature_header(header).unwrap();
        assert_eq!(
            signature.key_id.as_str(),
            "https://local.example/u/bob#main-key"
        );
        let public_key = load_public_key(&TEST_KEYPAIR.public_key).unwrap();
        assert!(verify(
            &request.headers,
            request.body.as_deref().unwrap_or_default(),
            &signature,
            &public_key,
            Some(request.url.path()),
            Default::default(),
        ));
    }

    #[tokio::test]
    async fn test_get_actor_signed() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(ACTOR_ID, StatusCode::OK, actor_json(ACTOR_ID));
        let client = test_client(&transport);

        let actor = client
            .get_actor(Some(ACTOR_ID), Some(&test_key()))
            .await?
            .unwrap();
        assert_eq!(actor.id(), Some(ACTOR_ID));
        assert_eq!(actor.response_status(), None);

        let request = transport.last_request();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.headers[ACCEPT], FEDERATION_ACCEPT);
        assert!(!request.headers.contains_key("digest"));
        assert!(request.body.is_none());
        assert_signature_valid(&request);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_actor_unsigned() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(ACTOR_ID, StatusCode::OK, actor_json(ACTOR_ID));
        let client = test_client(&transport);

        client.get_actor(Some(ACTOR_ID), None).await?;
        let blank = KeyMaterial::new(test_key().key_id, "  ");
        client.get_actor(Some(ACTOR_ID), Some(&blank)).await?;

        for request in transport.requests() {
            assert!(!request.headers.contains_key("signature"));
            assert!(!request.headers.contains_key("date"));
        }
        assert_eq!(transport.request_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_actor_without_id() {
        let transport = MockTransport::default();
        let client = test_client(&transport);
        let res = client.get_actor(None, Some(&test_key())).await;
        assert_eq!(res, Err(Error::InvalidArgument("")));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_actor_collections() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(
            "https://example.com/u/alice/followers",
            StatusCode::OK,
            json!({ "type": "OrderedCollection", "totalItems": 3 }),
        );
        transport.respond(
            "https://example.com/inbox",
            StatusCode::OK,
            json!({ "type": "OrderedCollection", "totalItems": 0 }),
        );
        let client = test_client(&transport);
        let actor: Document = serde_json::from_value(actor_json(ACTOR_ID))?;

        let followers = client
            .get_actor_followers_collection(&actor, None)
            .await?
            .unwrap();
        assert_eq!(followers["totalItems"], json!(3));
        let shared = client
            .get_actor_shared_inbox_collection(&actor, None)
            .await?
            .unwrap();
        assert_eq!(shared["totalItems"], json!(0));

        let following = client
            .get_actor_following_collection(&actor, None)
            .await?
            .unwrap();
        assert_eq!(following.response_status(), Some(404));
        assert_eq!(transport.request_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_collections_are_not_fetched() -> Result<(), Error> {
        let transport = MockTransport::default();
        let client = test_client(&transport);
        let actor: Document = serde_json::from_value(json!({
            "id": ACTOR_ID,
            "endpoints": {}
        }))?;

        assert!(client
            .get_actor_followers_collection(&actor, None)
            .await?
            .is_none());
        assert!(client
            .get_actor_following_collection(&actor, None)
            .await?
            .is_none());
        assert!(client
            .get_actor_outbox_collection(&actor, None)
            .await?
            .is_none());
        assert!(client
            .get_actor_shared_inbox_collection(&actor, None)
            .await?
            .is_none());
        assert_eq!(transport.request_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_error_status_is_injected() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(
            "https://example.com/gone",
            StatusCode::GONE,
            json!({ "error": "Gone" }),
        );
        transport.respond_raw("https://example.com/html", StatusCode::FORBIDDEN, "<html>");
        let client = test_client(&transport);

        let gone = client
            .fetch_document("https://example.com/gone", None)
            .await?
            .unwrap();
        assert_eq!(gone.response_status(), Some(410));
        assert_eq!(gone["error"], json!("Gone"));

        let html = client
            .fetch_document("https://example.com/html", None)
            .await?
            .unwrap();
        assert_eq!(html.response_status(), Some(403));
        assert_eq!(html.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_object_body_is_none() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond("https://example.com/list", StatusCode::OK, json!([1, 2]));
        transport.respond_raw("https://example.com/text", StatusCode::OK, "hello");
        let client = test_client(&transport);

        assert!(client
            .fetch_document("https://example.com/list", None)
            .await?
            .is_none());
        assert!(client
            .fetch_document("https://example.com/text", None)
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_signed_post() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(
            "https://example.com/u/alice/inbox",
            StatusCode::ACCEPTED,
            json!({}),
        );
        let client = test_client(&transport);
        let activity = json!({
            "id": "https://local.example/activities/1",
            "type": "Follow",
            "actor": "https://local.example/u/bob",
            "object": ACTOR_ID,
        });
        let headers: HeaderList = [("X-Request-Id", "abc")].into_iter().collect();

        let res = client
            .signed_post(
                Some(&test_key()),
                "https://example.com/u/alice/inbox",
                Some(&activity),
                &headers,
            )
            .await?
            .unwrap();
        assert_eq!(res.response_status(), Some(202));

        let request = transport.last_request();
        let body = request.body.clone().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&body)?, activity);
        assert_eq!(request.headers[CONTENT_TYPE], FEDERATION_CONTENT_TYPE);
        assert_eq!(request.headers["digest"], digest_header_value(&body).as_str());
        assert_eq!(request.headers["x-request-id"], "abc");
        let signature = request.headers["signature"].to_str().unwrap();
        assert!(signature.contains(r#"headers="(request-target) date host digest x-request-id""#));
        assert_signature_valid(&request);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_body_goes_to_query() -> Result<(), Error> {
        let transport = MockTransport::default();
        let client = test_client(&transport);
        let body = json!({ "page": 2, "only": { "public": true }, "skip": null });

        client
            .signed_get(
                Some(&test_key()),
                "https://example.com/outbox",
                Some(&body),
                &HeaderList::new(),
            )
            .await?;

        let request = transport.last_request();
        assert!(request.body.is_none());
        assert_eq!(request.url.path(), "/outbox");
        let query: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("only[public]".to_string(), "1".to_string()),
            ]
        );
        let digest = digest_header_value(&serde_json::to_vec(&body)?);
        assert_eq!(request.headers["digest"], digest.as_str());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_ignores_body() -> Result<(), Error> {
        let transport = MockTransport::default();
        let client = test_client(&transport);
        let body = json!({ "id": "https://local.example/notes/1" });

        client
            .signed_request(
                Method::DELETE,
                Some(&test_key()),
                "https://example.com/notes/1",
                Some(&body),
                &HeaderList::new(),
            )
            .await?;

        let request = transport.last_request();
        assert_eq!(request.method, Method::DELETE);
        assert!(request.body.is_none());
        assert_eq!(request.url.query(), None);
        assert!(!request.headers.contains_key("digest"));
        assert!(!request.headers.contains_key(CONTENT_TYPE));
        let signature = request.headers["signature"].to_str().unwrap();
        assert!(signature.contains(r#"headers="(request-target) date host""#));
        assert_signature_valid(&request);
        Ok(())
    }

    #[tokio::test]
    async fn test_caller_accept_is_replaced() -> Result<(), Error> {
        let transport = MockTransport::default();
        transport.respond(ACTOR_ID, StatusCode::OK, actor_json(ACTOR_ID));
        let client = test_client(&transport);
        let headers: HeaderList = [("Accept", "text/html")].into_iter().collect();

        let actor = client
            .signed_get(Some(&test_key()), ACTOR_ID, None, &headers)
            .await?
            .unwrap();
        assert_eq!(actor.id(), Some(ACTOR_ID));

        let request = transport.last_request();
        let accept: Vec<_> = request.headers.get_all(ACCEPT).iter().collect();
        assert_eq!(accept, vec![FEDERATION_ACCEPT]);
        let signature = request.headers["signature"].to_str().unwrap();
        assert!(signature.contains(r#"headers="(request-target) date host""#));
        assert_signature_valid(&request);

        client.signed_get(None, ACTOR_ID, None, &headers).await?;
        let request = transport.last_request();
        assert_eq!(request.headers.get_all(ACCEPT).iter().count(), 1);
        assert_eq!(request.headers[ACCEPT], FEDERATION_ACCEPT);
        Ok(())
    }

    #[tokio::test]
    async fn test_body_limit_is_passed_to_transport() -> Result<(), Error> {
        let transport = MockTransport::default();
        let config = FederationConfig::builder()
            .transport(transport.clone())
            .response_body_limit(10)
            .build()
            .unwrap();
        let client = FederationClient::new(config);

        client.fetch_document(ACTOR_ID, None).await?;
        assert_eq!(transport.last_request().body_limit, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_url_policy() {
        let transport = MockTransport::default();
        let client = test_client(&transport);

        let http = client.fetch_document("http://example.com/u/alice", None).await;
        assert_eq!(http, Err(Error::UrlVerificationError("")));
        let empty = client.fetch_document("", None).await;
        assert!(matches!(empty, Err(Error::UrlParse(_))));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_private_key() {
        let transport = MockTransport::default();
        let client = test_client(&transport);
        let key = KeyMaterial::new(test_key().key_id, "not a key");

        let res = client.get_actor(Some(ACTOR_ID), Some(&key)).await;
        assert_eq!(res, Err(Error::Crypto(String::new())));
        assert_eq!(transport.request_count(), 0);
    }
}
