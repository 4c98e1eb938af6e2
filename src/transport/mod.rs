//! Network transport for the dispatcher.

pub mod api_types;
mod client;

pub use api_types::ApiError;
pub use client::HttpTransport;
