//! Atomic reference and atomic stamped reference.
//!
//! The cache records erase payloads to JSON; [`AtomicReference`] and
//! [`AtomicStamped`] are thin typed handles that encode and decode at the
//! API boundary. Comparisons run on the canonical JSON encoding, so two
//! payloads are equal exactly when their serialized forms are.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use snafu::ResultExt;

use crate::cache::error::EncodeSnafu;
use crate::cache::{CacheError, CacheTx, ClusterCache, SharedCache, TxConcurrency, TxIsolation};
use crate::structures::error::{RemovedSnafu, StructuresError};
use crate::structures::keys::StructureKey;
use crate::structures::values::{AtomicReferenceValue, AtomicStampedValue, KindView};

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, StructuresError> {
    Ok(serde_json::to_value(value).context(EncodeSnafu)?)
}

fn from_json<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, StructuresError> {
    serde_json::from_value(value)
        .map_err(|source| CacheError::Decode {
            key: StructureKey::new(name).cache_key(),
            source,
        })
        .map_err(StructuresError::from)
}

/// Erased proxy of a named atomic reference.
pub struct ReferenceProxy {
    name: String,
    key: StructureKey,
    cache: SharedCache,
    view: KindView<AtomicReferenceValue>,
    removed: AtomicBool,
}

impl ReferenceProxy {
    pub(crate) fn new(name: impl Into<String>, cache: SharedCache) -> Self {
        let name = name.into();

        Self {
            key: StructureKey::new(name.clone()),
            view: KindView::new(cache.clone()),
            cache,
            removed: AtomicBool::new(false),
            name,
        }
    }

    /// The user-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn get_json(&self) -> Result<Value, StructuresError> {
        self.ensure_active()?;

        match self.view.get(&self.key).await? {
            Some(v) => Ok(v.v),
            None => RemovedSnafu { name: &self.name }.fail(),
        }
    }

    pub(crate) async fn set_json(&self, value: Value) -> Result<(), StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;

        if self.view.get_in(tx.as_mut(), &self.key).await?.is_none() {
            return RemovedSnafu { name: &self.name }.fail();
        }

        self.view
            .put_in(tx.as_mut(), &self.key, AtomicReferenceValue { v: value })
            .await?;
        tx.commit().await?;

        Ok(())
    }

    pub(crate) async fn compare_and_set_json(
        &self,
        expect: Value,
        new: Value,
    ) -> Result<bool, StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;

        let Some(cur) = self.view.get_in(tx.as_mut(), &self.key).await? else {
            return RemovedSnafu { name: &self.name }.fail();
        };

        if cur.v != expect {
            return Ok(false);
        }

        self.view
            .put_in(tx.as_mut(), &self.key, AtomicReferenceValue { v: new })
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn tx_internal(&self) -> Result<Box<dyn CacheTx>, StructuresError> {
        Ok(self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?)
    }

    pub(crate) fn on_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    fn ensure_active(&self) -> Result<(), StructuresError> {
        if self.removed.load(Ordering::Acquire) {
            return RemovedSnafu { name: &self.name }.fail();
        }

        Ok(())
    }
}

/// Typed handle to a named atomic reference.
pub struct AtomicReference<T> {
    raw: Arc<ReferenceProxy>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for AtomicReference<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> AtomicReference<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(raw: Arc<ReferenceProxy>) -> Self {
        Self {
            raw,
            _payload: PhantomData,
        }
    }

    /// The user-visible name.
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Read the current payload.
    pub async fn get(&self) -> Result<T, StructuresError> {
        from_json(self.raw.name(), self.raw.get_json().await?)
    }

    /// Replace the payload unconditionally.
    pub async fn set(&self, value: &T) -> Result<(), StructuresError> {
        self.raw.set_json(to_json(value)?).await
    }

    /// Replace the payload only if it currently equals `expect`.
    pub async fn compare_and_set(&self, expect: &T, new: &T) -> Result<bool, StructuresError> {
        self.raw
            .compare_and_set_json(to_json(expect)?, to_json(new)?)
            .await
    }
}

/// Erased proxy of a named atomic stamped reference.
pub struct StampedProxy {
    name: String,
    key: StructureKey,
    cache: SharedCache,
    view: KindView<AtomicStampedValue>,
    removed: AtomicBool,
}

impl StampedProxy {
    pub(crate) fn new(name: impl Into<String>, cache: SharedCache) -> Self {
        let name = name.into();

        Self {
            key: StructureKey::new(name.clone()),
            view: KindView::new(cache.clone()),
            cache,
            removed: AtomicBool::new(false),
            name,
        }
    }

    /// The user-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn get_json(&self) -> Result<(Value, Value), StructuresError> {
        self.ensure_active()?;

        match self.view.get(&self.key).await? {
            Some(v) => Ok((v.v, v.stamp)),
            None => RemovedSnafu { name: &self.name }.fail(),
        }
    }

    pub(crate) async fn set_json(&self, value: Value, stamp: Value) -> Result<(), StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;

        if self.view.get_in(tx.as_mut(), &self.key).await?.is_none() {
            return RemovedSnafu { name: &self.name }.fail();
        }

        self.view
            .put_in(
                tx.as_mut(),
                &self.key,
                AtomicStampedValue { v: value, stamp },
            )
            .await?;
        tx.commit().await?;

        Ok(())
    }

    pub(crate) async fn compare_and_set_json(
        &self,
        expect_value: Value,
        new_value: Value,
        expect_stamp: Value,
        new_stamp: Value,
    ) -> Result<bool, StructuresError> {
        self.ensure_active()?;

        let mut tx = self.tx_internal().await?;

        let Some(cur) = self.view.get_in(tx.as_mut(), &self.key).await? else {
            return RemovedSnafu { name: &self.name }.fail();
        };

        if cur.v != expect_value || cur.stamp != expect_stamp {
            return Ok(false);
        }

        self.view
            .put_in(
                tx.as_mut(),
                &self.key,
                AtomicStampedValue {
                    v: new_value,
                    stamp: new_stamp,
                },
            )
            .await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn tx_internal(&self) -> Result<Box<dyn CacheTx>, StructuresError> {
        Ok(self
            .cache
            .tx_start(TxConcurrency::Pessimistic, TxIsolation::RepeatableRead)
            .await?)
    }

    pub(crate) fn on_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    fn ensure_active(&self) -> Result<(), StructuresError> {
        if self.removed.load(Ordering::Acquire) {
            return RemovedSnafu { name: &self.name }.fail();
        }

        Ok(())
    }
}

/// Typed handle to a named atomic stamped reference.
pub struct AtomicStamped<T, S> {
    raw: Arc<StampedProxy>,
    _payload: PhantomData<fn() -> (T, S)>,
}

impl<T, S> Clone for AtomicStamped<T, S> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T, S> AtomicStamped<T, S>
where
    T: Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned,
{
    pub(crate) fn new(raw: Arc<StampedProxy>) -> Self {
        Self {
            raw,
            _payload: PhantomData,
        }
    }

    /// The user-visible name.
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Read the current `(value, stamp)` pair.
    pub async fn get(&self) -> Result<(T, S), StructuresError> {
        let (v, s) = self.raw.get_json().await?;

        Ok((
            from_json(self.raw.name(), v)?,
            from_json(self.raw.name(), s)?,
        ))
    }

    /// Replace value and stamp unconditionally.
    pub async fn set(&self, value: &T, stamp: &S) -> Result<(), StructuresError> {
        self.raw.set_json(to_json(value)?, to_json(stamp)?).await
    }

    /// Replace value and stamp only if both currently match the
    /// expectations.
    pub async fn compare_and_set(
        &self,
        expect_value: &T,
        new_value: &T,
        expect_stamp: &S,
        new_stamp: &S,
    ) -> Result<bool, StructuresError> {
        self.raw
            .compare_and_set_json(
                to_json(expect_value)?,
                to_json(new_value)?,
                to_json(expect_stamp)?,
                to_json(new_stamp)?,
            )
            .await
    }
}
