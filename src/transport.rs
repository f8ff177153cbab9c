//! HTTP transport used for all outgoing requests
//!
//! The client never talks to the network directly, every request goes through a [Transport].
//! [ReqwestTransport] is the default, other implementations can be plugged in with
//! [FederationConfigBuilder::transport](crate::config::FederationConfigBuilder::transport).

use crate::{error::Error, reqwest_shim::ResponseExt};
use async_trait::async_trait;
use bytes::Bytes;
use dyn_clone::{clone_trait_object, DynClone};
use http::{HeaderMap, Method, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use url::Url;


/// 100KB
pub(crate) const MAX_BODY_SIZE: usize = 102400;

/// A fully prepared outgoing request
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Target url, including query string
    pub url: Url,
    /// Headers to send, already signed if necessary
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<Bytes>,
    /// Upper bound for the whole request
    pub timeout: Duration,
    /// Maximum size of the response body in bytes
    pub body_limit: usize,
}

/// Status and raw body of a response
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body
    pub body: Bytes,
}

/// Sends prepared requests over the network.
///
/// Errors are returned to the caller of the client unchanged.
///
/// ```
/// # use async_trait::async_trait;
/// # use activitypub_signed_client::error::Error;
/// # use activitypub_signed_client::transport::{Transport, TransportRequest, TransportResponse};
/// # use http::StatusCode;
/// #[derive(Clone)]
/// struct Offline;
///
/// #[async_trait]
/// impl Transport for Offline {
///     async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, Error> {
///         Ok(TransportResponse {
///             status: StatusCode::SERVICE_UNAVAILABLE,
///             body: Default::default(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: DynClone + Send + Sync {
    /// Send the request and read the complete response
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}

clone_trait_object!(Transport);

/// [Transport] backed by reqwest. Middleware can be used to add functionality like log tracing.
///
/// Reading the response body fails with [Error::ResponseBodyLimit] once it grows past
/// [TransportRequest::body_limit].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ClientWithMiddleware,
}

impl ReqwestTransport {
    /// Wrap an existing client
    pub fn new(client: ClientWithMiddleware) -> Self {
        ReqwestTransport { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        ReqwestTransport::new(reqwest::Client::default().into())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes_limited(request.body_limit).await?;
        Ok(TransportResponse { status, body })
    }
}
