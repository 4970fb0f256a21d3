#![warn(missing_docs)]

//! Catalogue onboarding clients: local/central catalogue REST stores, admin token service, resource server adapter API

pub mod entity;
pub mod error;
mod http;
pub mod resource_server;
pub mod store;
pub mod token;

pub use entity::{Document, EntityKind, InvalidTarget, Operation, StoreTarget};
pub use error::{Result, StoreError, TokenError};
pub use resource_server::{normalize_base_url, HttpResourceServerClient, ResourceServerClient};
pub use store::{HttpStoreClient, StoreClient};
pub use token::{AdminToken, HttpTokenProvider, TokenProvider};
