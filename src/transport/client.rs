use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

use color_eyre::{eyre::eyre, Result};

use crate::dispatch::Transport;
use crate::request::{OperationKind, RequestDescriptor};
use crate::result::OperationResult;

use super::api_types::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport wrapper
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(token: Option<String>) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("restcache/", env!("CARGO_PKG_VERSION")))
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, token })
  }

  /// Perform one request and fold every outcome into an `OperationResult`
  async fn send(&self, descriptor: &RequestDescriptor) -> OperationResult<Vec<u8>> {
    let kind = descriptor.kind();
    let (method, content_type) = match kind {
      OperationKind::Read => (Method::GET, "application/json"),
      OperationKind::Write => (Method::POST, "application/json"),
      OperationKind::Delete => (Method::DELETE, "application/json"),
      OperationKind::Authorize => (Method::POST, "application/x-www-form-urlencoded"),
    };

    let mut request = self.client.request(method, descriptor.url().clone());

    // Authorization requests carry their own credentials in the payload
    if let (Some(token), false) = (&self.token, kind == OperationKind::Authorize) {
      request = request.bearer_auth(token);
    }

    if let Some(payload) = descriptor.payload() {
      request = request
        .header(CONTENT_TYPE, content_type)
        .body(payload.to_vec());
    }

    let response = match request.send().await {
      Ok(response) => response,
      Err(e) => return OperationResult::failure(e.to_string()),
    };

    let status = response.status();
    let body = match response.bytes().await {
      Ok(body) => body,
      Err(e) => return OperationResult::failure(format!("Failed to read response body: {}", e)),
    };

    debug!(url = %descriptor.url(), status = status.as_u16(), bytes = body.len(), "response");

    if status.is_success() {
      OperationResult::success(body.to_vec())
    } else {
      OperationResult::failure(ApiError::from_response(status.as_u16(), &body).to_string())
    }
  }
}

impl Transport for HttpTransport {
  fn execute<'a>(
    &'a self,
    descriptor: &'a RequestDescriptor,
  ) -> BoxFuture<'a, OperationResult<Vec<u8>>> {
    Box::pin(self.send(descriptor))
  }
}
