/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

mod cache_control;
pub use cache_control::CacheControl;

mod etag;
pub use etag::{EntityTag, EntityTagList};

mod entry;
pub use entry::{CacheEntry, CacheEntryMeta, CacheKey, VaryValues};

mod store;
pub use store::{CacheStore, CacheStoreError, CacheWriter, MemoryCacheStore};

pub mod validator;
