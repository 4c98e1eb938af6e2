//! Serialized request queue.
//!
//! All network operations run on one background worker, one at a time, in
//! the order they were enqueued. A later write can therefore never race an
//! earlier read's cache update.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::request::RequestDescriptor;
use crate::result::{OperationResult, Ticket};

/// Default number of requests waiting in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Performs the actual network operation for a descriptor.
///
/// Transport failures are reported as `OperationResult::failure` with the
/// cause in the message; the dispatcher never retries.
pub trait Transport: Send + Sync + 'static {
  fn execute<'a>(
    &'a self,
    descriptor: &'a RequestDescriptor,
  ) -> BoxFuture<'a, OperationResult<Vec<u8>>>;
}

/// Callback receiving the raw network result of one descriptor.
pub type Completion = Box<dyn FnOnce(OperationResult<Vec<u8>>) + Send>;

struct Job {
  ticket: Ticket,
  descriptor: RequestDescriptor,
  on_complete: Completion,
}

/// Handle to the request queue. Cloning shares the same worker; the worker
/// stops once every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct Dispatcher {
  tx: mpsc::Sender<Job>,
}

impl Dispatcher {
  /// Start a worker on the current tokio runtime.
  pub fn spawn<T: Transport>(transport: T, capacity: usize) -> Result<Self> {
    let handle =
      Handle::try_current().map_err(|e| eyre!("Dispatcher needs a tokio runtime: {}", e))?;

    let (tx, rx) = mpsc::channel(capacity.max(1));
    handle.spawn(run_worker(transport, rx));

    Ok(Self { tx })
  }

  /// Queue `descriptor`. Never blocks; `on_complete` is called exactly once.
  pub fn enqueue(
    &self,
    descriptor: RequestDescriptor,
    on_complete: impl FnOnce(OperationResult<Vec<u8>>) + Send + 'static,
  ) -> Ticket {
    let ticket = Ticket::next();
    self.submit(ticket, descriptor, Box::new(on_complete));
    ticket
  }

  pub(crate) fn submit(&self, ticket: Ticket, descriptor: RequestDescriptor, on_complete: Completion) {
    let job = Job {
      ticket,
      descriptor,
      on_complete,
    };

    match self.tx.try_send(job) {
      Ok(()) => debug!(ticket = ticket.id(), "request queued"),
      Err(TrySendError::Full(job)) => {
        warn!(ticket = ticket.id(), key = job.descriptor.key(), "request queue is full");
        (job.on_complete)(OperationResult::failure("request queue is full"));
      }
      Err(TrySendError::Closed(job)) => {
        (job.on_complete)(OperationResult::failure("request dispatcher has stopped"));
      }
    }
  }
}

async fn run_worker<T: Transport>(transport: T, mut rx: mpsc::Receiver<Job>) {
  info!("dispatcher worker started");

  while let Some(job) = rx.recv().await {
    let Job {
      ticket,
      descriptor,
      on_complete,
    } = job;

    debug!(ticket = ticket.id(), kind = ?descriptor.kind(), key = descriptor.key(), "executing");
    let result = transport.execute(&descriptor).await;
    if let Some(message) = result.message() {
      debug!(ticket = ticket.id(), "request failed: {}", message);
    }

    // Completions may touch the durable cache tier; finish before the next job
    if let Err(e) = tokio::task::spawn_blocking(move || on_complete(result)).await {
      warn!(ticket = ticket.id(), "completion handler panicked: {}", e);
    }
  }

  info!("dispatcher worker stopped");
}
