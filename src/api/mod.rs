//! Library REST API: HTTP client, response types and read endpoints.

mod client;
pub mod endpoints;
pub mod types;

pub use client::{ApiClient, ApiRequest, Credentials, Transport, Verb};
