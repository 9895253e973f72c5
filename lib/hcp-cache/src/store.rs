/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use bytes::BytesMut;
use log::debug;
use thiserror::Error;

use crate::{CacheEntry, CacheEntryMeta, CacheKey};

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("object too large, the max allowed size is {0}")]
    ObjectTooLarge(usize),
    #[error("body truncated: expected {expected} bytes but received {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("writer failed before commit")]
    WriterFailed,
}

/// A pending cache write, committed by [`CacheStore::commit`] or dropped to discard.
pub struct CacheWriter {
    key: CacheKey,
    buf: BytesMut,
    max_size: usize,
    expected_size: Option<u64>,
    failed: bool,
}

impl CacheWriter {
    pub fn new(key: CacheKey, max_size: usize, expected_size: Option<u64>) -> Self {
        let reserve = expected_size
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
            .min(max_size);
        CacheWriter {
            key,
            buf: BytesMut::with_capacity(reserve),
            max_size,
            expected_size,
            failed: false,
        }
    }

    #[inline]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), CacheStoreError> {
        if self.failed {
            return Err(CacheStoreError::WriterFailed);
        }
        if self.buf.len() + data.len() > self.max_size {
            self.failed = true;
            self.buf = BytesMut::new();
            return Err(CacheStoreError::ObjectTooLarge(self.max_size));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn finish(self) -> Result<(CacheKey, bytes::Bytes), CacheStoreError> {
        if self.failed {
            return Err(CacheStoreError::WriterFailed);
        }
        let received = self.buf.len() as u64;
        if let Some(expected) = self.expected_size
            && expected != received
        {
            return Err(CacheStoreError::Truncated { expected, received });
        }
        Ok((self.key, self.buf.freeze()))
    }
}

/// The cache store seen by the proxy core.
///
/// Implementations must be safe for concurrent use, the last writer for a key wins.
pub trait CacheStore: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry>>;

    fn create(&self, key: CacheKey, expected_size: Option<u64>) -> CacheWriter;

    fn commit(
        &self,
        writer: CacheWriter,
        meta: CacheEntryMeta,
    ) -> Result<Arc<CacheEntry>, CacheStoreError>;

    fn remove(&self, key: &CacheKey) -> bool;

    /// Replace `old` with a new entry sharing its body.
    fn supersede(&self, old: &CacheEntry, key: CacheKey, meta: CacheEntryMeta)
    -> Arc<CacheEntry>;
}

pub struct MemoryCacheStore {
    max_object_size: usize,
    max_entries: usize,
    entries: RwLock<AHashMap<CacheKey, Arc<CacheEntry>>>,
}

impl MemoryCacheStore {
    pub fn new(max_object_size: usize, max_entries: usize) -> Self {
        MemoryCacheStore {
            max_object_size,
            max_entries: max_entries.max(1),
            entries: RwLock::new(AHashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, entry: Arc<CacheEntry>) {
        let mut map = self.entries.write().unwrap_or_else(|e| e.into_inner());
        map.insert(entry.key().clone(), entry);
        while map.len() > self.max_entries {
            let Some(oldest) = map
                .values()
                .min_by_key(|e| e.cache_time)
                .map(|e| e.key().clone())
            else {
                break;
            };
            debug!("cache evicted {oldest}");
            map.remove(&oldest);
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }

    fn create(&self, key: CacheKey, expected_size: Option<u64>) -> CacheWriter {
        CacheWriter::new(key, self.max_object_size, expected_size)
    }

    fn commit(
        &self,
        writer: CacheWriter,
        meta: CacheEntryMeta,
    ) -> Result<Arc<CacheEntry>, CacheStoreError> {
        let (key, body) = writer.finish()?;
        let entry = Arc::new(CacheEntry::new(key, meta, body));
        self.insert(entry.clone());
        Ok(entry)
    }

    fn remove(&self, key: &CacheKey) -> bool {
        let mut map = self.entries.write().unwrap_or_else(|e| e.into_inner());
        map.remove(key).is_some()
    }

    fn supersede(
        &self,
        old: &CacheEntry,
        key: CacheKey,
        meta: CacheEntryMeta,
    ) -> Arc<CacheEntry> {
        if key != *old.key() {
            self.remove(old.key());
        }
        let entry = Arc::new(CacheEntry::new(key, meta, old.body().clone()));
        self.insert(entry.clone());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VaryValues;
    use http::{HeaderMap, Method};
    use std::time::{Duration, SystemTime};

    fn meta() -> CacheEntryMeta {
        let now = SystemTime::now();
        CacheEntryMeta {
            vary: VaryValues::default(),
            reason: "OK".to_string(),
            headers: HeaderMap::new(),
            request_time: now,
            response_time: now,
            expires: None,
        }
    }

    fn key(path: &str) -> CacheKey {
        CacheKey::new(&Method::GET, &format!("http://example.com{path}"))
    }

    #[test]
    fn commit_and_lookup() {
        let store = MemoryCacheStore::new(1024, 16);
        let mut writer = store.create(key("/a"), Some(5));
        writer.write(b"hel").unwrap();
        writer.write(b"lo").unwrap();
        let entry = store.commit(writer, meta()).unwrap();
        assert_eq!(entry.body().as_ref(), b"hello");

        let found = store.lookup(&key("/a")).unwrap();
        assert_eq!(found.size(), 5);
        assert!(store.lookup(&key("/b")).is_none());

        assert!(store.remove(&key("/a")));
        assert!(!store.remove(&key("/a")));
        assert!(store.is_empty());
    }

    #[test]
    fn too_large() {
        let store = MemoryCacheStore::new(4, 16);
        let mut writer = store.create(key("/a"), None);
        writer.write(b"1234").unwrap();
        assert!(matches!(
            writer.write(b"5"),
            Err(CacheStoreError::ObjectTooLarge(4))
        ));
        assert!(writer.is_failed());
        assert!(store.commit(writer, meta()).is_err());
        assert!(store.lookup(&key("/a")).is_none());
    }

    #[test]
    fn truncated() {
        let store = MemoryCacheStore::new(1024, 16);
        let mut writer = store.create(key("/a"), Some(10));
        writer.write(b"12345").unwrap();
        assert!(matches!(
            store.commit(writer, meta()),
            Err(CacheStoreError::Truncated {
                expected: 10,
                received: 5
            })
        ));
        assert!(store.lookup(&key("/a")).is_none());
    }

    #[test]
    fn evict_oldest() {
        let store = MemoryCacheStore::new(1024, 2);
        for path in ["/1", "/2", "/3"] {
            let writer = store.create(key(path), None);
            store.commit(writer, meta()).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(store.len(), 2);
        assert!(store.lookup(&key("/1")).is_none());
        assert!(store.lookup(&key("/3")).is_some());
    }

    #[test]
    fn supersede() {
        let store = MemoryCacheStore::new(1024, 16);
        let mut writer = store.create(key("/a"), None);
        writer.write(b"body").unwrap();
        let old = store.commit(writer, meta()).unwrap();

        let mut new_meta = old.meta();
        new_meta
            .headers
            .insert(http::header::ETAG, http::HeaderValue::from_static("\"v2\""));
        let new = store.supersede(&old, old.key().clone(), new_meta);
        assert_eq!(new.body().as_ref(), b"body");

        let found = store.lookup(&key("/a")).unwrap();
        assert_eq!(found.headers.get(http::header::ETAG).unwrap(), "\"v2\"");
        assert!(old.headers.get(http::header::ETAG).is_none());
    }
}
