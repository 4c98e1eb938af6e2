//! Operation results and their delivery to callers.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Outcome of one operation. Never an error type: failures are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult<T> {
  pub success: bool,
  pub item: Option<T>,
  pub message: Option<String>,
}

impl<T> OperationResult<T> {
  /// A successful result carrying `item`.
  pub fn success(item: T) -> Self {
    Self {
      success: true,
      item: Some(item),
      message: None,
    }
  }

  /// A successful result without content (e.g. an empty response body).
  pub fn empty() -> Self {
    Self {
      success: true,
      item: None,
      message: None,
    }
  }

  /// A failed result with the cause in `message`.
  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      success: false,
      item: None,
      message: Some(message.into()),
    }
  }

  /// Nothing cached. Not an error: the network answer is still to come.
  pub fn miss() -> Self {
    Self {
      success: false,
      item: None,
      message: None,
    }
  }

  pub fn is_success(&self) -> bool {
    self.success
  }

  pub fn item(&self) -> Option<&T> {
    self.item.as_ref()
  }

  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
    OperationResult {
      success: self.success,
      item: self.item.map(f),
      message: self.message,
    }
  }
}

/// Identity of one submitted request, shared by all of its deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
  pub(crate) fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }

  pub fn id(&self) -> u64 {
    self.0
  }
}

/// Where a delivered result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
  /// Immediate answer from the local cache, possibly stale
  Cache,
  /// Authoritative answer from the network
  Network,
}

/// One result handed to the caller.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
  pub ticket: Ticket,
  pub source: ResultSource,
  pub result: OperationResult<T>,
  pub delivered_at: DateTime<Utc>,
}

impl<T> Delivery<T> {
  pub(crate) fn new(ticket: Ticket, source: ResultSource, result: OperationResult<T>) -> Self {
    Self {
      ticket,
      source,
      result,
      delivered_at: Utc::now(),
    }
  }
}

pub(crate) type DeliverySender<T> = mpsc::UnboundedSender<Delivery<T>>;

/// Stream of deliveries for one request.
///
/// A read yields up to two deliveries: the cached answer first, then the
/// network answer. Other operations yield the network answer only. The
/// stream ends once nothing more will be delivered.
#[derive(Debug)]
pub struct Deliveries<T> {
  ticket: Ticket,
  rx: mpsc::UnboundedReceiver<Delivery<T>>,
}

impl<T> Deliveries<T> {
  pub(crate) fn channel(ticket: Ticket) -> (DeliverySender<T>, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { ticket, rx })
  }

  pub fn ticket(&self) -> Ticket {
    self.ticket
  }

  /// Receive the next delivery, or `None` when the request is finished.
  pub async fn next(&mut self) -> Option<Delivery<T>> {
    self.rx.recv().await
  }

  /// Receive a delivery without waiting.
  pub fn try_next(&mut self) -> Option<Delivery<T>> {
    self.rx.try_recv().ok()
  }
}
