use crate::{error::Error, http_signatures::load_public_key};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use url::Url;

/// Public key of actors which is used for HTTP signatures. Remote actors publish it in their
/// `publicKey` field.
///
/// Only `publicKeyPem` is required, `id` and `owner` are informational and left unchecked.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// Key id, usually `<actor id>#main-key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Actor which owns the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// SPKI or PKCS#1 PEM
    pub public_key_pem: String,
}

impl PublicKey {
    /// Public key for a local actor, to be embedded in its actor document
    pub fn new(owner: &Url, public_key_pem: String) -> Self {
        PublicKey {
            id: Some(main_key_id(owner)),
            owner: Some(owner.to_string()),
            public_key_pem,
        }
    }

    /// Parse the PEM into a usable RSA key
    pub fn to_rsa(&self) -> Result<RsaPublicKey, Error> {
        load_public_key(&self.public_key_pem)
    }
}

/// Conventional key id for an actor
///
/// ```
/// # use activitypub_signed_client::protocol::public_key::main_key_id;
/// let owner = url::Url::parse("https://example.com/u/alice")?;
/// assert_eq!(main_key_id(&owner), "https://example.com/u/alice#main-key");
/// # Ok::<(), url::ParseError>(())
/// ```
pub fn main_key_id(owner: &Url) -> String {
    format!("{}#main-key", &owner)
}
