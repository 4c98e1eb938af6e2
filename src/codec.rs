//! Payload codecs between typed items and cached bytes.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use tracing::warn;

/// Converts items to and from their byte representation.
///
/// `serialize` returning `None` means "nothing to cache"; a serialization
/// failure is reported the same way so it can never fail a request.
pub trait Codec<T>: Send + Sync {
  fn serialize(&self, item: &T) -> Option<Vec<u8>>;

  fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec backed by serde.
pub struct JsonCodec<T> {
  _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
  pub fn new() -> Self {
    Self {
      _marker: PhantomData,
    }
  }
}

impl<T> Default for JsonCodec<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec<T> {
  fn serialize(&self, item: &T) -> Option<Vec<u8>> {
    match serde_json::to_vec(item) {
      Ok(bytes) if bytes == b"null" => None,
      Ok(bytes) => Some(bytes),
      Err(e) => {
        warn!("Failed to serialize item for caching: {}", e);
        None
      }
    }
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| eyre!("Failed to parse JSON payload: {}", e))
  }
}

/// Passes bytes through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec<Vec<u8>> for RawCodec {
  fn serialize(&self, item: &Vec<u8>) -> Option<Vec<u8>> {
    if item.is_empty() {
      None
    } else {
      Some(item.clone())
    }
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(bytes.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Task {
    id: u64,
    text: String,
  }

  #[test]
  fn test_json_round_trip() {
    let codec = JsonCodec::<Task>::new();
    let task = Task {
      id: 3,
      text: "ship it".to_string(),
    };

    let bytes = codec.serialize(&task).unwrap();
    assert_eq!(codec.deserialize(&bytes).unwrap(), task);
  }

  #[test]
  fn test_json_null_serializes_to_nothing() {
    let codec = JsonCodec::<Option<Task>>::new();
    assert_eq!(codec.serialize(&None), None);
  }

  #[test]
  fn test_json_rejects_garbage() {
    let codec = JsonCodec::<Task>::new();
    assert!(codec.deserialize(b"not json").is_err());
  }

  #[test]
  fn test_raw_empty_is_nothing() {
    assert_eq!(RawCodec.serialize(&Vec::new()), None);
    assert_eq!(RawCodec.serialize(&b"x".to_vec()), Some(b"x".to_vec()));
  }
}
