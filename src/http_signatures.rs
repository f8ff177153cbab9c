//! Generating keypairs, creating and verifying signatures
//!
//! Outgoing requests are signed in [FederationClient::signed_request] and incoming ones are checked
//! with [FederationClient::verify_request_signature]. The functions in this module are the pure
//! building blocks behind both: they never touch the network and hold no state.
//!
//! [FederationClient::signed_request]: crate::fetch::FederationClient::signed_request
//! [FederationClient::verify_request_signature]: crate::fetch::FederationClient::verify_request_signature

use crate::error::Error;
use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use http::{header::HeaderName, HeaderMap, HeaderValue};
use httpdate::fmt_http_date;
use regex::Regex;
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    signature::{SignatureEncoding, Signer, Verifier},
    RsaPrivateKey,
    RsaPublicKey,
};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fmt::{Debug, Display, Formatter},
    str::FromStr,
    sync::LazyLock,
    time::SystemTime,
};
use tracing::debug;
use url::Url;

/// Algorithm announced in outgoing `Signature` headers. Incoming signatures are always checked
/// with RSA-SHA256, whatever they declare, unless [VerifyPolicy::enforce_algorithm] is set.
pub const SIGNATURE_ALGORITHM: &str = "rsa-sha256";

/// Pseudo header which covers method and path. Only used for signing, never sent.
pub const REQUEST_TARGET: &str = "(request-target)";

/// Method written into the `(request-target)` line, for every request.
const REQUEST_TARGET_METHOD: &str = "post";

const KEY_BITS: usize = 2048;

/// A private/public key pair used for HTTP signatures
#[derive(Debug, Clone)]
pub struct Keypair {
    /// Private key in PEM format
    pub private_key: String,
    /// Public key in PEM format
    pub public_key: String,
}

impl Keypair {
    /// Key material for signing requests as the actor which publishes this keypair under `key_id`
    pub fn key_material(&self, key_id: Url) -> KeyMaterial {
        KeyMaterial::new(key_id, self.private_key.clone())
    }
}

/// Generate a random asymmetric keypair for ActivityPub HTTP signatures.
pub fn generate_actor_keypair() -> Result<Keypair, Error> {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS).map_err(Error::crypto)?;
    let public_key = RsaPublicKey::from(&private_key);
    let private_key = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(Error::crypto)?;
    let public_key = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(Error::crypto)?;
    Ok(Keypair {
        private_key: private_key.as_str().to_owned(),
        public_key,
    })
}

/// Identity used to sign an outgoing request. Supplied per call, never stored by this library.
#[derive(Clone)]
pub struct KeyMaterial {
    /// Url of the public key, usually `<actor id>#main-key`
    pub key_id: Url,
    /// Private key in PEM format
    pub private_key: String,
}

impl KeyMaterial {
    /// Bundle a key id with its private key
    pub fn new(key_id: Url, private_key: impl Into<String>) -> Self {
        KeyMaterial {
            key_id,
            private_key: private_key.into(),
        }
    }

    /// Blank private keys count as missing, requests are then sent unsigned.
    pub(crate) fn is_usable(&self) -> bool {
        !self.private_key.trim().is_empty()
    }
}

impl Debug for KeyMaterial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id.as_str())
            .finish_non_exhaustive()
    }
}

/// Load a private key in PKCS#8 or PKCS#1 PEM format
pub fn load_private_key(pem: &str) -> Result<RsaPrivateKey, Error> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(Error::crypto)
}

/// Load a public key in SPKI or PKCS#1 PEM format
pub fn load_public_key(pem: &str) -> Result<RsaPublicKey, Error> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(Error::crypto)
}

/// Ordered list of request headers.
///
/// Order matters: it is the order in which headers are signed. Names compare case-insensitively,
/// inserting an existing name replaces its value but keeps its position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    /// Creates an empty list
    pub fn new() -> Self {
        HeaderList(Vec::new())
    }

    /// Set a header, replacing the value of an existing header with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Insert all headers of `other`, its values win on collision
    pub fn merge(&mut self, other: &HeaderList) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Value of the header with the given name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes a header and returns its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let position = self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.0.remove(position).1)
    }

    /// Iterate over `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no headers
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a [HeaderMap] for sending. Fails on names or values which are not valid in HTTP.
    pub fn to_header_map(&self) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::with_capacity(self.0.len());
        self.append_to(&mut map)?;
        Ok(map)
    }

    pub(crate) fn append_to(&self, map: &mut HeaderMap) -> Result<(), Error> {
        for (name, value) in &self.0 {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.clone()))?;
            map.append(header_name, header_value);
        }
        Ok(())
    }
}

impl<N, V> FromIterator<(N, V)> for HeaderList
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut list = HeaderList::new();
        for (name, value) in iter {
            list.insert(name, value);
        }
        list
    }
}

/// First value of a received header, if it is present and valid UTF-8
pub fn first_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Join headers into the string which gets signed: one `name: value` line per header, names
/// lowercased, in exactly the given order.
pub fn build_signing_string<'a, I>(headers: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .map(|(name, value)| format!("{}: {}", name.to_lowercase(), value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Value for the `Digest` header of the given body
pub fn digest_header_value(body: &[u8]) -> String {
    format!("SHA-256={}", Base64.encode(Sha256::digest(body)))
}

fn host_header_value(url: &Url) -> Result<String, Error> {
    let host = url
        .host_str()
        .ok_or(Error::UrlVerificationError("Url has no host"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Sign a request to `url` and return the headers to send with it.
///
/// The signed headers are `(request-target)`, `Date`, `Host`, `Digest` (only if `body` is not
/// empty) followed by `additional_headers`. A caller supplied header with the same name as one
/// of the generated ones replaces its value, for example to pin `Date`. The returned list
/// contains everything except `(request-target)`, plus the `Signature` header.
pub fn sign(
    key_id: &Url,
    private_key_pem: &str,
    url: &Url,
    body: Option<&[u8]>,
    additional_headers: &HeaderList,
) -> Result<HeaderList, Error> {
    let private_key = load_private_key(private_key_pem)?;

    let mut headers = HeaderList::new();
    headers.insert(
        REQUEST_TARGET,
        format!("{REQUEST_TARGET_METHOD} {}", url.path()),
    );
    headers.insert("Date", fmt_http_date(SystemTime::now()));
    headers.insert("Host", host_header_value(url)?);
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        headers.insert("Digest", digest_header_value(body));
    }
    headers.merge(additional_headers);

    let signing_string = build_signing_string(headers.iter());
    let signature = SigningKey::<Sha256>::new(private_key)
        .try_sign(signing_string.as_bytes())
        .map_err(Error::crypto)?;
    let parameters = SignatureParameters {
        key_id: key_id.clone(),
        algorithm: Some(SIGNATURE_ALGORITHM.to_string()),
        headers: headers.iter().map(|(name, _)| name.to_lowercase()).collect(),
        signature: Base64.encode(signature.to_bytes()),
    };
    debug!(
        "Signed request to {} with key {}, headers: {}",
        url,
        key_id,
        parameters.headers.join(" ")
    );

    headers.remove(REQUEST_TARGET);
    headers.insert("Signature", parameters.to_string());
    Ok(headers)
}

/// Content of a `Signature` header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureParameters {
    /// Url of the public key which verifies this signature
    pub key_id: Url,
    /// Declared algorithm. Only informative, see [SIGNATURE_ALGORITHM].
    pub algorithm: Option<String>,
    /// Lowercase names of the signed headers, in signing order
    pub headers: Vec<String>,
    /// Base64 encoded signature
    pub signature: String,
}

impl Display for SignatureParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "keyId=\"{}\",headers=\"{}\",",
            self.key_id,
            self.headers.join(" ")
        )?;
        if let Some(algorithm) = &self.algorithm {
            write!(f, "algorithm=\"{algorithm}\",")?;
        }
        write!(f, "signature=\"{}\"", self.signature)
    }
}

impl FromStr for SignatureParameters {
    type Err = SignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_signature_header(s)
    }
}

/// Reasons why a `Signature` header is rejected
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SignatureParseError {
    /// There is no `keyId` parameter
    #[error("No keyId was found in the signature header. Found: {}", .found.join(", "))]
    MissingKeyId {
        /// Parameter names which were found instead
        found: Vec<String>,
    },
    /// `keyId` is not an absolute url with a host
    #[error("keyId is not a URL: {0}")]
    KeyIdNotUrl(String),
    /// `headers` or `signature` parameter is missing
    #[error("Signature is missing headers or signature parts")]
    MissingHeadersOrSignature,
}

static PARAMETER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*([^=\s]+)="(.+)"\s*$"#).expect("compile regex"));

/// Parse a raw `Signature` header value of the form `keyId="…",headers="…",signature="…"`.
///
/// Segments which are not `name="value"` are skipped, a repeated name keeps its last value.
/// The `algorithm` parameter is optional and not validated.
pub fn parse_signature_header(raw: &str) -> Result<SignatureParameters, SignatureParseError> {
    let mut fields = BTreeMap::new();
    for part in raw.split(',') {
        if let Some(captures) = PARAMETER_REGEX.captures(part) {
            if let (Some(name), Some(value)) = (captures.get(1), captures.get(2)) {
                fields.insert(name.as_str(), value.as_str());
            }
        }
    }

    let key_id = fields
        .get("keyId")
        .ok_or_else(|| SignatureParseError::MissingKeyId {
            found: fields.keys().map(ToString::to_string).collect(),
        })?;
    let key_id = Url::parse(key_id)
        .ok()
        .filter(Url::has_host)
        .ok_or_else(|| SignatureParseError::KeyIdNotUrl(key_id.to_string()))?;

    let (Some(headers), Some(signature)) = (fields.get("headers"), fields.get("signature")) else {
        return Err(SignatureParseError::MissingHeadersOrSignature);
    };

    Ok(SignatureParameters {
        key_id,
        algorithm: fields.get("algorithm").map(ToString::to_string),
        headers: headers.split_whitespace().map(str::to_string).collect(),
        signature: signature.to_string(),
    })
}

/// Tuning for [verify]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Fail when a header listed in the signature is missing from the request. When false the
    /// header is left out of the signing string, which then fails cryptographically.
    pub strict_headers: bool,
    /// Reject signatures which declare an algorithm other than [SIGNATURE_ALGORITHM]
    pub enforce_algorithm: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        VerifyPolicy {
            strict_headers: true,
            enforce_algorithm: false,
        }
    }
}

impl VerifyPolicy {
    /// Lenient policy which tolerates missing signed headers
    pub fn compat() -> Self {
        VerifyPolicy {
            strict_headers: false,
            ..Default::default()
        }
    }
}

/// Check `signature` against the received `headers` and `body`.
///
/// The signing string is rebuilt in the order of `signature.headers`. `(request-target)` is
/// taken from `target_path`, and `digest` is always recomputed from `body` instead of trusting
/// the transmitted header. Returns true only if the RSA-SHA256 check passes; malformed input
/// is never an error, just false.
pub fn verify(
    headers: &HeaderMap,
    body: &[u8],
    signature: &SignatureParameters,
    public_key: &RsaPublicKey,
    target_path: Option<&str>,
    policy: VerifyPolicy,
) -> bool {
    if policy.enforce_algorithm && signature.algorithm.as_deref() != Some(SIGNATURE_ALGORITHM) {
        debug!("Unsupported signature algorithm {:?}", signature.algorithm);
        return false;
    }

    let mut signed = Vec::with_capacity(signature.headers.len());
    for name in &signature.headers {
        let value = match name.to_ascii_lowercase().as_str() {
            REQUEST_TARGET => match target_path {
                Some(path) => format!("{REQUEST_TARGET_METHOD} {path}"),
                None => {
                    debug!("Signature covers {REQUEST_TARGET} but no target path is known");
                    return false;
                }
            },
            "digest" => digest_header_value(body),
            other => match first_header(headers, other) {
                Some(value) => value.to_string(),
                None if policy.strict_headers => {
                    debug!("Signed header {other} is missing from request");
                    return false;
                }
                None => continue,
            },
        };
        signed.push((name.as_str(), value));
    }
    let signing_string = build_signing_string(signed.iter().map(|(n, v)| (*n, v.as_str())));

    let Ok(bytes) = Base64.decode(&signature.signature) else {
        debug!("Signature is not valid base64");
        return false;
    };
    let Ok(decoded) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    let verified = VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(signing_string.as_bytes(), &decoded)
        .is_ok();
    debug!(
        "Signature with key {} verified: {}",
        signature.key_id, verified
    );
    verified
}
