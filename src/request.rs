//! Request descriptors and canonical resource keys.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use url::Url;

/// Scheme used for canonical cache keys.
const CACHE_SCHEME: &str = "content";

/// The kind of logical operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
  /// Fetch a resource (cacheable)
  Read,
  /// Create or modify a resource
  Write,
  /// Remove a resource
  Delete,
  /// Obtain credentials; never cached
  Authorize,
}

/// Address of a logical resource: path segments plus query parameters.
///
/// Query parameters are kept sorted, so two filters built from the same
/// parameters in any order produce the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
  segments: Vec<String>,
  query: BTreeMap<String, String>,
}

impl ResourceFilter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a filter from a slash-separated path like `item/42/value`.
  pub fn path(path: &str) -> Self {
    let segments = path
      .split('/')
      .filter(|s| !s.is_empty())
      .map(String::from)
      .collect();

    Self {
      segments,
      query: BTreeMap::new(),
    }
  }

  /// Append a path segment.
  pub fn segment(mut self, segment: impl ToString) -> Self {
    self.segments.push(segment.to_string());
    self
  }

  /// Set a query parameter, replacing any earlier value for `name`.
  pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.query.insert(name.into(), value.to_string());
    self
  }

  /// Build the URL of this resource under `scheme://authority/`.
  pub fn build_url(&self, scheme: &str, authority: &str) -> Result<Url> {
    let base = format!("{}://{}/", scheme, authority.to_lowercase());
    let mut url =
      Url::parse(&base).map_err(|e| eyre!("Invalid resource base {}: {}", base, e))?;

    url
      .path_segments_mut()
      .map_err(|_| eyre!("Resource base {} cannot carry a path", base))?
      .pop_if_empty()
      .extend(&self.segments);

    if !self.query.is_empty() {
      url.query_pairs_mut().extend_pairs(&self.query);
    }

    Ok(url)
  }

  /// Canonical cache key of this resource on `authority`.
  pub fn cache_key(&self, authority: &str) -> Result<String> {
    Ok(self.build_url(CACHE_SCHEME, authority)?.to_string())
  }
}

/// Where requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  pub scheme: String,
  pub authority: String,
}

impl Endpoint {
  pub fn new(scheme: impl Into<String>, authority: impl Into<String>) -> Self {
    Self {
      scheme: scheme.into(),
      authority: authority.into(),
    }
  }

  /// HTTPS endpoint for `authority`.
  pub fn https(authority: impl Into<String>) -> Self {
    Self::new("https", authority)
  }

  /// Describe one operation against `filter` on this endpoint.
  pub fn descriptor(
    &self,
    kind: OperationKind,
    filter: &ResourceFilter,
    payload: Option<Vec<u8>>,
  ) -> Result<RequestDescriptor> {
    let url = filter.build_url(&self.scheme, &self.authority)?;
    let key = filter.cache_key(&self.authority)?;

    Ok(RequestDescriptor {
      kind,
      key,
      url,
      payload,
    })
  }

  pub fn read(&self, filter: &ResourceFilter) -> Result<RequestDescriptor> {
    self.descriptor(OperationKind::Read, filter, None)
  }

  pub fn write(&self, filter: &ResourceFilter, payload: Vec<u8>) -> Result<RequestDescriptor> {
    self.descriptor(OperationKind::Write, filter, Some(payload))
  }

  pub fn delete(&self, filter: &ResourceFilter) -> Result<RequestDescriptor> {
    self.descriptor(OperationKind::Delete, filter, None)
  }

  pub fn authorize(&self, filter: &ResourceFilter, payload: Vec<u8>) -> Result<RequestDescriptor> {
    self.descriptor(OperationKind::Authorize, filter, Some(payload))
  }
}

/// Immutable description of one logical operation.
///
/// `key` is both the cache key and the fingerprint used to detect duplicate
/// in-flight reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
  kind: OperationKind,
  key: String,
  url: Url,
  payload: Option<Vec<u8>>,
}

impl RequestDescriptor {
  /// Assemble a descriptor from an externally derived key.
  pub fn new(kind: OperationKind, key: impl Into<String>, url: Url, payload: Option<Vec<u8>>) -> Self {
    Self {
      kind,
      key: key.into(),
      url,
      payload,
    }
  }

  pub fn kind(&self) -> OperationKind {
    self.kind
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn payload(&self) -> Option<&[u8]> {
    self.payload.as_deref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_ignores_param_order() {
    let a = ResourceFilter::path("item/app/7")
      .param("limit", 20)
      .param("offset", 0);
    let b = ResourceFilter::path("item/app/7")
      .param("offset", 0)
      .param("limit", 20);

    assert_eq!(
      a.cache_key("api.example.com").unwrap(),
      b.cache_key("api.example.com").unwrap()
    );
  }

  #[test]
  fn test_key_is_content_uri() {
    let filter = ResourceFilter::new().segment("task").segment(12).param("fields", "all");
    assert_eq!(
      filter.cache_key("API.example.com").unwrap(),
      "content://api.example.com/task/12?fields=all"
    );
  }

  #[test]
  fn test_distinct_resources_have_distinct_keys() {
    let authority = "api.example.com";
    let keys = [
      ResourceFilter::path("item/1").cache_key(authority).unwrap(),
      ResourceFilter::path("item/2").cache_key(authority).unwrap(),
      ResourceFilter::path("item/1").param("view", "full").cache_key(authority).unwrap(),
      ResourceFilter::path("item/1").cache_key("other.example.com").unwrap(),
    ];

    for (i, a) in keys.iter().enumerate() {
      for b in keys.iter().skip(i + 1) {
        assert_ne!(a, b);
      }
    }
  }

  #[test]
  fn test_segments_are_escaped() {
    let filter = ResourceFilter::new().segment("search").segment("a b/c");
    assert_eq!(
      filter.cache_key("api.example.com").unwrap(),
      "content://api.example.com/search/a%20b%2Fc"
    );
  }

  #[test]
  fn test_descriptor_url_and_key_share_resource() {
    let endpoint = Endpoint::https("api.example.com");
    let descriptor = endpoint
      .read(&ResourceFilter::path("org/3").param("light", true))
      .unwrap();

    assert_eq!(descriptor.kind(), OperationKind::Read);
    assert_eq!(
      descriptor.url().as_str(),
      "https://api.example.com/org/3?light=true"
    );
    assert_eq!(descriptor.key(), "content://api.example.com/org/3?light=true");
    assert_eq!(descriptor.payload(), None);
  }

  #[test]
  fn test_write_carries_payload() {
    let endpoint = Endpoint::https("api.example.com");
    let descriptor = endpoint
      .write(&ResourceFilter::path("item/9"), b"{}".to_vec())
      .unwrap();
    assert_eq!(descriptor.kind(), OperationKind::Write);
    assert_eq!(descriptor.payload(), Some(&b"{}"[..]));
  }
}
