//! Checks signatures of incoming activities before an inbox accepts them

use crate::{
    error::Error,
    fetch::FederationClient,
    http_signatures::{first_header, parse_signature_header, verify, SignatureParseError},
    protocol::verification::{domains_match, host_of, AttributedTo},
};
use http::HeaderMap;
use serde_json::Value;
use tracing::debug;

/// Reasons for rejecting an incoming request. Only logged, never returned.
#[derive(thiserror::Error, Debug)]
enum Rejected {
    #[error("Header {0} is missing or empty")]
    MissingHeader(&'static str),
    #[error("Body is not valid JSON: {0}")]
    Body(serde_json::Error),
    #[error("Body has no id")]
    MissingId,
    #[error(transparent)]
    Signature(#[from] SignatureParseError),
    #[error("Object is attributed to {author:?}, but signed by key on {key_host:?}")]
    AttributedToMismatch { author: String, key_host: String },
    #[error("Activity id on {id_host:?} does not match key on {key_host:?}")]
    DomainMismatch { id_host: String, key_host: String },
    #[error("Failed to fetch actor: {0}")]
    Fetch(Error),
    #[error("Actor was not found")]
    ActorNotFound,
    #[error("Actor has no public key")]
    MissingPublicKey,
    #[error("Public key is unusable: {0}")]
    Key(Error),
    #[error("Signature does not match")]
    InvalidSignature,
}

impl FederationClient {
    /// Check the HTTP signature of an incoming request.
    ///
    /// `headers` and `body` are the request as received, `target_path` the request path used for
    /// the `(request-target)` line. The request is accepted only if
    ///
    /// - it has non-empty `Signature` and `Date` headers,
    /// - the body is a JSON object with an `id`,
    /// - the signing key is on the same domain as the `id`, and as `object.attributedTo` if the
    ///   activity carries an object with an author,
    /// - the key owner can be fetched and publishes `publicKey.publicKeyPem`,
    /// - and the signature verifies with that key under the configured
    ///   [VerifyPolicy](crate::http_signatures::VerifyPolicy).
    ///
    /// The key owner is fetched unsigned, or with
    /// [signed_fetch_key](crate::config::FederationConfigBuilder::signed_fetch_key) if
    /// configured. Any failure, including network errors, results in `false`.
    pub async fn verify_request_signature(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        target_path: Option<&str>,
    ) -> bool {
        match self.check_request_signature(headers, body, target_path).await {
            Ok(()) => true,
            Err(rejected) => {
                debug!("Rejected incoming request: {rejected}");
                false
            }
        }
    }

    async fn check_request_signature(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        target_path: Option<&str>,
    ) -> Result<(), Rejected> {
        let signature = non_empty_header(headers, "signature")?;
        non_empty_header(headers, "date")?;

        let activity: Value = serde_json::from_slice(body).map_err(Rejected::Body)?;
        let id = activity
            .get("id")
            .and_then(Value::as_str)
            .ok_or(Rejected::MissingId)?;
        let signature = parse_signature_header(signature)?;

        let key_host = host_of(signature.key_id.as_str());
        if let Some(author) = AttributedTo::from_activity(&activity).effective_host() {
            if author != key_host {
                return Err(Rejected::AttributedToMismatch { author, key_host });
            }
        }
        if !domains_match(signature.key_id.as_str(), id) {
            return Err(Rejected::DomainMismatch {
                id_host: host_of(id),
                key_host,
            });
        }

        let actor = self
            .get_actor(
                Some(signature.key_id.as_str()),
                self.config().signed_fetch_key.as_ref(),
            )
            .await
            .map_err(Rejected::Fetch)?
            .filter(|actor| actor.response_status().is_none())
            .ok_or(Rejected::ActorNotFound)?;
        let public_key = actor
            .public_key()
            .ok_or(Rejected::MissingPublicKey)?
            .to_rsa()
            .map_err(Rejected::Key)?;

        if verify(
            headers,
            body,
            &signature,
            &public_key,
            target_path,
            self.config().verify_policy(),
        ) {
            Ok(())
        } else {
            Err(Rejected::InvalidSignature)
        }
    }
}

fn non_empty_header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, Rejected> {
    first_header(headers, name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(Rejected::MissingHeader(name))
}
