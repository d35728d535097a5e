//! Typed projections over the raw cache.
//!
//! A [`CacheView`] binds one value family to the cache: entries are stored
//! as JSON and decoded into fresh owned records on every read, so callers
//! can never alias the stored value. Views also adapt the typed
//! [`RecordTransform`]s used by the data-structures layer onto the raw
//! [`EntryTransform`] contract.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::ResultExt;

use crate::cache::error::{CacheError, DecodeSnafu, EncodeSnafu};
use crate::cache::events::EntryTransform;
use crate::cache::tx::CacheTx;
use crate::cache::{ClusterCache, SharedCache};

/// A transform over one decoded record.
///
/// Implementations are data-only values with a pure `apply`; the cache layer
/// is responsible for shipping them to the entry and replaying them there.
pub trait RecordTransform<V>: Send + Sync {
    /// Compute the next record from the current one. `None` removes the
    /// entry.
    fn apply(&self, old: Option<V>) -> Option<V>;
}

/// Typed view over one value family of the cache.
pub struct CacheView<V> {
    cache: SharedCache,
    _family: PhantomData<fn() -> V>,
}

impl<V> Clone for CacheView<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            _family: PhantomData,
        }
    }
}

impl<V> CacheView<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Project the cache onto the value family `V`.
    pub fn new(cache: SharedCache) -> Self {
        Self {
            cache,
            _family: PhantomData,
        }
    }

    fn decode(key: &str, raw: Option<String>) -> Result<Option<V>, CacheError> {
        raw.map(|s| serde_json::from_str(&s).context(DecodeSnafu { key }))
            .transpose()
    }

    fn encode(value: &V) -> Result<String, CacheError> {
        serde_json::to_string(value).context(EncodeSnafu)
    }

    /// Read and decode a key.
    pub async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        Self::decode(key, self.cache.get(key).await?)
    }

    /// Encode and write a key.
    pub async fn put(&self, key: &str, value: &V) -> Result<(), CacheError> {
        self.cache.put(key, &Self::encode(value)?).await
    }

    /// Insert if absent; decodes the existing record when the insert lost.
    pub async fn put_if_absent(&self, key: &str, value: &V) -> Result<Option<V>, CacheError> {
        let existing = self.cache.put_if_absent(key, &Self::encode(value)?).await?;

        Self::decode(key, existing)
    }

    /// Remove a key, returning the previous record.
    pub async fn remove(&self, key: &str) -> Result<Option<V>, CacheError> {
        Self::decode(key, self.cache.remove(key).await?)
    }

    /// Atomically transform the entry, returning the decoded `(old, new)`
    /// records the transform observed and produced.
    pub async fn transform<F>(
        &self,
        key: &str,
        xform: &F,
    ) -> Result<(Option<V>, Option<V>), CacheError>
    where
        F: RecordTransform<V>,
    {
        let adapter = JsonTransform {
            key,
            inner: xform,
            _family: PhantomData::<fn() -> V>,
        };

        let (old, new) = self.cache.transform(key, &adapter).await?;

        Ok((Self::decode(key, old)?, Self::decode(key, new)?))
    }

    /// Read and decode a key inside a transaction.
    pub async fn get_in(
        &self,
        tx: &mut dyn CacheTx,
        key: &str,
    ) -> Result<Option<V>, CacheError> {
        Self::decode(key, tx.get(key).await?)
    }

    /// Encode and write a key inside a transaction.
    pub async fn put_in(
        &self,
        tx: &mut dyn CacheTx,
        key: &str,
        value: &V,
    ) -> Result<(), CacheError> {
        tx.put(key, &Self::encode(value)?).await
    }

    /// Remove a key inside a transaction. Returns whether it existed.
    pub async fn remove_in(
        &self,
        tx: &mut dyn CacheTx,
        key: &str,
    ) -> Result<bool, CacheError> {
        tx.remove(key).await
    }
}

/// Adapter replaying a typed transform against the raw entry encoding.
struct JsonTransform<'a, V, F> {
    key: &'a str,
    inner: &'a F,
    _family: PhantomData<fn() -> V>,
}

impl<V, F> EntryTransform for JsonTransform<'_, V, F>
where
    V: Serialize + DeserializeOwned,
    F: RecordTransform<V>,
{
    fn apply(&self, old: Option<&str>) -> Result<Option<String>, CacheError> {
        let decoded = old
            .map(|s| serde_json::from_str(s).context(DecodeSnafu { key: self.key }))
            .transpose()?;

        self.inner
            .apply(decoded)
            .map(|v| serde_json::to_string(&v).context(EncodeSnafu))
            .transpose()
    }
}
