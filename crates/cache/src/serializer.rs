use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Value encoding used by the [`Cache`](crate::Cache) facade.
pub trait Serializer: Send + Sync {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;
}

/// JSON encoding via `serde_json`.
///
/// Integers encode as their decimal text, so counters maintained with
/// `increment` read back through `Cache::get::<i64>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
