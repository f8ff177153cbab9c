//! Client side of ActivityPub federation with HTTP signatures.
//!
//! [FederationClient](crate::fetch::FederationClient) signs and sends requests to remote
//! servers, resolves handles over WebFinger, reads actors and walks paged collections. The same
//! client checks signatures on incoming requests before an inbox accepts them.
//!
//! ```no_run
//! # use activitypub_signed_client::config::FederationConfig;
//! # use activitypub_signed_client::fetch::FederationClient;
//! # use activitypub_signed_client::http_signatures::generate_actor_keypair;
//! # async fn run() -> anyhow::Result<()> {
//! let keypair = generate_actor_keypair()?;
//! let key = keypair.key_material("https://example.com/u/alice#main-key".parse()?);
//!
//! let client = FederationClient::new(FederationConfig::builder().build()?);
//! let actor = client.get_actor_by_handle("bob@mastodon.example", Some(&key)).await?;
//! if let Some(outbox) = actor.as_ref().and_then(|a| a.outbox()) {
//!     println!("outbox of bob: {outbox}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod http_signatures;
pub mod inbox;
pub mod protocol;
mod reqwest_shim;
pub mod transport;

pub use fetch::FederationClient;
pub use http_signatures::{KeyMaterial, Keypair};
pub use protocol::document::Document;

/// Mime type for Activitypub data, used for the `Content-Type` HTTP header of request bodies
pub static FEDERATION_CONTENT_TYPE: &str = "application/activity+json";

/// Sent as `Accept` header with every request
pub static FEDERATION_ACCEPT: &str =
    "application/activity+json,application/ld+json,application/json";
