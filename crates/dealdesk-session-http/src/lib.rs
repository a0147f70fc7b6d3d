//! Production environment bindings for `dealdesk-session`: the reqwest
//! identity client and the file-backed envelope store.

pub mod client;
pub mod store;

pub use client::{PortalClientError, PortalIdentityClient};
pub use store::FileSessionStore;
