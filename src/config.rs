//! Configuration for this library, with various federation settings
//!
//! Use [FederationConfig::builder](crate::config::FederationConfig::builder) to initialize it.
//!
//! ```
//! # use activitypub_signed_client::config::FederationConfig;
//! # use activitypub_signed_client::fetch::FederationClient;
//! # use std::time::Duration;
//! let config = FederationConfig::builder()
//!     .request_timeout(Duration::from_secs(5))
//!     .build()?;
//! let client = FederationClient::new(config);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::{
    error::Error,
    http_signatures::{KeyMaterial, VerifyPolicy},
    transport::{ReqwestTransport, Transport, MAX_BODY_SIZE},
};
use async_trait::async_trait;
use derive_builder::Builder;
use dyn_clone::{clone_trait_object, DynClone};
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use url::Url;

/// Configuration for this library, with various federation related settings
#[derive(Builder, Clone)]
pub struct FederationConfig {
    /// Transport used for all outgoing requests. Defaults to [ReqwestTransport].
    #[builder(
        default = "Box::new(ReqwestTransport::default())",
        setter(custom)
    )]
    pub(crate) transport: Box<dyn Transport>,
    /// Maximum size of response bodies, passed to the transport with every request
    #[builder(default = "MAX_BODY_SIZE")]
    pub(crate) response_body_limit: usize,
    /// Timeout for all HTTP requests. HTTP signatures carry the current date, so there is no
    /// point in waiting much longer than the receiving side accepts clock skew.
    #[builder(default = "Duration::from_secs(10)")]
    pub(crate) request_timeout: Duration,
    /// Run library in debug mode. This resolves webfinger over plain http and allows localhost
    /// urls. Do not use for production.
    #[builder(default = "false")]
    pub(crate) debug: bool,
    /// Allow HTTP urls even in production mode
    #[builder(default = "self.debug.unwrap_or(false)")]
    pub(crate) allow_http_urls: bool,
    /// Function used to verify that urls are valid, See [UrlVerifier] for details.
    #[builder(default = "Box::new(DefaultUrlVerifier())")]
    pub(crate) url_verifier: Box<dyn UrlVerifier>,
    /// Rules for checking incoming signatures
    #[builder(default)]
    pub(crate) verify_policy: VerifyPolicy,
    /// Key used to sign the actor fetch while verifying incoming requests. Needed for servers
    /// which only serve actors to signed requests.
    /// <https://docs.joinmastodon.org/spec/activitypub/#secure-mode>
    #[builder(default = "None", setter(strip_option))]
    pub(crate) signed_fetch_key: Option<KeyMaterial>,
}

impl FederationConfig {
    /// Returns a new config builder with default values.
    pub fn builder() -> FederationConfigBuilder {
        FederationConfigBuilder::default()
    }

    /// Perform some security checks on URLs before sending anything to them, and call the
    /// user-supplied [UrlVerifier].
    ///
    /// <https://www.w3.org/TR/activitypub/#security-considerations>
    pub(crate) async fn verify_url_valid(&self, url: &Url) -> Result<(), Error> {
        match url.scheme() {
            "https" => {}
            "http" => {
                if !self.allow_http_urls {
                    return Err(Error::UrlVerificationError(
                        "Http urls are only allowed in debug mode",
                    ));
                }
            }
            _ => return Err(Error::UrlVerificationError("Invalid url scheme")),
        };

        if url.domain() == Some("localhost") && !self.debug {
            return Err(Error::UrlVerificationError(
                "Localhost is only allowed in debug mode",
            ));
        }

        self.url_verifier.verify(url).await?;

        Ok(())
    }

    /// Rules applied by [FederationClient::verify_request_signature](crate::fetch::FederationClient::verify_request_signature)
    pub fn verify_policy(&self) -> VerifyPolicy {
        self.verify_policy
    }

    /// Maximum size of response bodies
    pub fn response_body_limit(&self) -> usize {
        self.response_body_limit
    }
}

impl FederationConfigBuilder {
    /// Send all requests through the given transport
    pub fn transport<T: Transport + 'static>(&mut self, transport: T) -> &mut Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Send all requests with this reqwest client, for example one with tracing middleware
    pub fn client(&mut self, client: ClientWithMiddleware) -> &mut Self {
        self.transport(ReqwestTransport::new(client))
    }
}

/// Handler for validating URLs.
///
/// This is used for implementing domain blocklists and similar functionality. It is called
/// with every url before a request is sent to it, including actor fetches triggered by
/// incoming signatures. If processing for this domain/URL should be aborted, return an error.
/// In case of `Ok(())`, processing continues.
///
/// ```
/// # use async_trait::async_trait;
/// # use url::Url;
/// # use activitypub_signed_client::config::UrlVerifier;
/// # use activitypub_signed_client::error::Error;
/// # #[derive(Clone)]
/// # struct DatabaseConnection();
/// # async fn get_blocklist(_: &DatabaseConnection) -> Vec<String> {
/// #     vec![]
/// # }
/// #[derive(Clone)]
/// struct Verifier {
///     db_connection: DatabaseConnection,
/// }
///
/// #[async_trait]
/// impl UrlVerifier for Verifier {
///     async fn verify(&self, url: &Url) -> Result<(), Error> {
///         let blocklist = get_blocklist(&self.db_connection).await;
///         let domain = url.domain().unwrap_or_default().to_string();
///         if blocklist.contains(&domain) {
///             Err(Error::UrlVerificationError("Domain is blocked"))
///         } else {
///             Ok(())
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait UrlVerifier: DynClone + Send + Sync {
    /// Should return Ok iff the given url is valid for processing.
    async fn verify(&self, url: &Url) -> Result<(), Error>;
}

/// Default URL verifier which does nothing.
#[derive(Clone)]
struct DefaultUrlVerifier();

#[async_trait]
impl UrlVerifier for DefaultUrlVerifier {
    async fn verify(&self, _url: &Url) -> Result<(), Error> {
        Ok(())
    }
}

clone_trait_object!(UrlVerifier);
