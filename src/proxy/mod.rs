//! Request orchestration.
//!
//! [`ImageService`] ties the parser, negotiator, caches, origin and pipeline
//! together; the HTTP layer only maps its results onto responses.

mod service;

pub use service::{ImageService, ProxyResponse};
