//! Error messages returned by this library

use crate::{fetch::webfinger::WebFingerError, http_signatures::SignatureParseError};
use std::fmt::Display;

/// Error messages returned by this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A caller passed a value which can never correspond to a fetch target
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// url verification error
    #[error("URL failed verification: {0}")]
    UrlVerificationError(&'static str),
    /// Webfinger handle or document is invalid
    #[error(transparent)]
    WebFinger(#[from] WebFingerError),
    /// The `Signature` header could not be parsed
    #[error(transparent)]
    SignatureParse(#[from] SignatureParseError),
    /// Key material could not be loaded, or signing failed
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
    /// Response body limit was reached during fetch
    #[error("Response body limit was reached during fetch")]
    ResponseBodyLimit,
    /// Header name or value which can not be sent over HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// JSON Error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Reqwest Middleware Error
    #[error(transparent)]
    ReqwestMiddleware(#[from] reqwest_middleware::Error),
    /// Reqwest Error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Url Parse
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    /// Other generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn other<T: Display>(error: T) -> Self {
        Error::Other(error.to_string())
    }

    pub(crate) fn crypto<T: Display>(error: T) -> Self {
        Error::Crypto(error.to_string())
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
