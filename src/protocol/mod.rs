//! Data structures which help to define federated messages

/// Opaque JSON documents with accessors for discovery and paging
pub mod document;
/// Serde deserialization functions which help to receive differently shaped data
pub mod helpers;
/// Struct which is used to federate actor key for HTTP signatures
pub mod public_key;
/// Verify that received data is valid
pub mod verification;
