//! Tagged MessagePack codec for cached values.
//!
//! Every cached value is wrapped in an envelope naming its kind and schema
//! version. A value written by an older build with a different shape is
//! rejected as a decode error instead of producing a malformed entity.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{CacheError, CacheResult};

/// A value that can be stored in the distributed tier.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable name of the cached shape.
    const KIND: &'static str;
    /// Bump when the serialized shape changes incompatibly.
    const SCHEMA: u16 = 1;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    kind: &'a str,
    schema: u16,
    payload: &'a V,
}

#[derive(Deserialize)]
struct Header {
    kind: String,
    schema: u16,
}

#[derive(Deserialize)]
struct Envelope<V> {
    payload: V,
}

pub fn encode<V: Cacheable>(key: &str, value: &V) -> CacheResult<Vec<u8>> {
    rmp_serde::to_vec_named(&EnvelopeRef {
        kind: V::KIND,
        schema: V::SCHEMA,
        payload: value,
    })
    .map_err(|e| CacheError::write(key, e))
}

pub fn decode<V: Cacheable>(key: &str, bytes: &[u8]) -> CacheResult<V> {
    let header: Header = rmp_serde::from_slice(bytes).map_err(|e| CacheError::decode(key, e))?;
    if header.kind != V::KIND || header.schema != V::SCHEMA {
        return Err(CacheError::decode(
            key,
            format!(
                "expected {}@{}, found {}@{}",
                V::KIND,
                V::SCHEMA,
                header.kind,
                header.schema
            ),
        ));
    }
    let envelope: Envelope<V> =
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::decode(key, e))?;
    Ok(envelope.payload)
}
