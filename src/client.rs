//! Cache-through client over the request dispatcher.

use color_eyre::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::cache::{open_store, CacheStore, ManagedStore, StoreLifecycle};
use crate::codec::Codec;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::request::{OperationKind, RequestDescriptor};
use crate::result::{Deliveries, Delivery, DeliverySender, OperationResult, ResultSource, Ticket};
use crate::transport::HttpTransport;

/// Keys of reads waiting on the network.
#[derive(Default)]
struct PendingReads {
  keys: Mutex<HashSet<String>>,
}

impl PendingReads {
  fn keys(&self) -> MutexGuard<'_, HashSet<String>> {
    self.keys.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Returns false when `key` was already pending.
  fn insert(&self, key: &str) -> bool {
    self.keys().insert(key.to_string())
  }

  fn remove(&self, key: &str) {
    self.keys().remove(key);
  }

  fn contains(&self, key: &str) -> bool {
    self.keys().contains(key)
  }
}

/// Clears a pending key when dropped, whether or not its completion ever ran.
struct PendingGuard {
  pending: Arc<PendingReads>,
  key: String,
}

impl Drop for PendingGuard {
  fn drop(&mut self) {
    self.pending.remove(&self.key);
  }
}

/// Client that answers reads from the cache first and keeps the cache in
/// line with the last known server state.
///
/// - Read: deliver the cached value (or a miss) right away, fetch from the
///   network unless the same key is already in flight, then store and deliver
///   the fresh value.
/// - Write / Delete: dispatch, and drop the cached entry once it succeeded.
/// - Authorize: dispatch only; the cache is never touched.
#[derive(Clone)]
pub struct CachedClient {
  dispatcher: Dispatcher,
  store: Arc<dyn ManagedStore>,
  pending: Arc<PendingReads>,
}

impl CachedClient {
  pub fn new(dispatcher: Dispatcher, store: Arc<dyn ManagedStore>) -> Self {
    Self {
      dispatcher,
      store,
      pending: Arc::new(PendingReads::default()),
    }
  }

  /// Create a client talking HTTP with the store described by `config`.
  /// Must be called within a tokio runtime.
  pub fn open(config: &Config) -> Result<Self> {
    let transport = HttpTransport::new(Config::get_api_token())?;
    let dispatcher = Dispatcher::spawn(transport, config.queue.capacity)?;
    let store = open_store(config)?;

    Ok(Self::new(dispatcher, store))
  }

  /// Submit one operation. The returned stream yields its deliveries.
  pub fn perform<T, C>(&self, descriptor: RequestDescriptor, codec: C) -> Deliveries<T>
  where
    T: Send + 'static,
    C: Codec<T> + 'static,
  {
    let codec = Arc::new(codec);
    match descriptor.kind() {
      OperationKind::Read => self.read(descriptor, codec),
      OperationKind::Authorize => self.relay(descriptor, codec),
      OperationKind::Write | OperationKind::Delete => self.write(descriptor, codec),
    }
  }

  /// Erase the whole cache store. Network operations are unaffected.
  pub fn erase(&self) {
    self.store.erase();
  }

  /// Whether a network read for `key` is still in flight.
  pub fn is_pending(&self, key: &str) -> bool {
    self.pending.contains(key)
  }

  fn read<T, C>(&self, descriptor: RequestDescriptor, codec: Arc<C>) -> Deliveries<T>
  where
    T: Send + 'static,
    C: Codec<T> + 'static,
  {
    let ticket = Ticket::next();
    let (tx, deliveries) = Deliveries::channel(ticket);
    let key = descriptor.key().to_string();

    let dispatch = self.pending.insert(&key);

    // The cached answer goes out before the request is queued, so it always
    // precedes the network answer on the stream
    let cached = self.load_cached(&key, codec.as_ref());
    let _ = tx.send(Delivery::new(ticket, ResultSource::Cache, cached));

    if !dispatch {
      debug!(key = %key, "read already in flight, serving cache only");
      return deliveries;
    }

    let store = Arc::clone(&self.store);
    let guard = PendingGuard {
      pending: Arc::clone(&self.pending),
      key: key.clone(),
    };
    self.dispatcher.submit(
      ticket,
      descriptor,
      Box::new(move |raw| {
        drop(guard);
        let result = decode(raw, codec.as_ref());

        if result.is_success() {
          let bytes = result.item().and_then(|item| codec.serialize(item));
          store.save(&key, bytes.as_deref());
        }

        deliver(&tx, ticket, result);
      }),
    );

    deliveries
  }

  fn write<T, C>(&self, descriptor: RequestDescriptor, codec: Arc<C>) -> Deliveries<T>
  where
    T: Send + 'static,
    C: Codec<T> + 'static,
  {
    let ticket = Ticket::next();
    let (tx, deliveries) = Deliveries::channel(ticket);
    let key = descriptor.key().to_string();
    let store = Arc::clone(&self.store);

    self.dispatcher.submit(
      ticket,
      descriptor,
      Box::new(move |raw| {
        let result = decode(raw, codec.as_ref());

        // The response may not carry the full resource, so invalidate
        if result.is_success() {
          store.delete(&key);
        }

        deliver(&tx, ticket, result);
      }),
    );

    deliveries
  }

  fn relay<T, C>(&self, descriptor: RequestDescriptor, codec: Arc<C>) -> Deliveries<T>
  where
    T: Send + 'static,
    C: Codec<T> + 'static,
  {
    let ticket = Ticket::next();
    let (tx, deliveries) = Deliveries::channel(ticket);

    self.dispatcher.submit(
      ticket,
      descriptor,
      Box::new(move |raw| deliver(&tx, ticket, decode(raw, codec.as_ref()))),
    );

    deliveries
  }

  fn load_cached<T, C: Codec<T> + ?Sized>(&self, key: &str, codec: &C) -> OperationResult<T> {
    let Some(bytes) = self.store.load(key) else {
      debug!(key, "cache miss");
      return OperationResult::miss();
    };

    match codec.deserialize(&bytes) {
      Ok(item) => {
        debug!(key, "cache hit");
        OperationResult::success(item)
      }
      Err(e) => {
        warn!("Discarding unreadable cache entry {}: {}", key, e);
        OperationResult::miss()
      }
    }
  }
}

/// Turn a raw network result into a typed one.
fn decode<T, C: Codec<T> + ?Sized>(raw: OperationResult<Vec<u8>>, codec: &C) -> OperationResult<T> {
  if !raw.is_success() {
    return OperationResult {
      success: false,
      item: None,
      message: raw.message,
    };
  }

  match raw.item {
    Some(body) if !body.is_empty() => match codec.deserialize(&body) {
      Ok(item) => OperationResult::success(item),
      Err(e) => OperationResult::failure(format!("Failed to decode response: {}", e)),
    },
    _ => OperationResult::empty(),
  }
}

fn deliver<T>(tx: &DeliverySender<T>, ticket: Ticket, result: OperationResult<T>) {
  // Receiver may have been dropped
  let _ = tx.send(Delivery::new(ticket, ResultSource::Network, result));
}
