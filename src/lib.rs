//! Cache-through access layer for REST APIs.
//!
//! Requests go through a [`client::CachedClient`]:
//! - reads are answered from the local cache immediately, then refreshed from
//!   the network and reconciled into the cache
//! - writes and deletes invalidate the cached resource once they succeed
//! - authorization requests bypass the cache entirely
//!
//! All network operations run one at a time, in submission order, on the
//! [`dispatch::Dispatcher`] worker.

pub mod cache;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod request;
pub mod result;
pub mod transport;

pub use client::CachedClient;
pub use request::{Endpoint, OperationKind, RequestDescriptor, ResourceFilter};
pub use result::{Deliveries, Delivery, OperationResult, ResultSource, Ticket};
