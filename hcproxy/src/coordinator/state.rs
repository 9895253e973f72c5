/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

/// A permission which starts granted and, once revoked, stays revoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Flag(bool);

impl Default for Flag {
    fn default() -> Self {
        Flag(true)
    }
}

impl Flag {
    #[inline]
    pub(crate) fn get(&self) -> bool {
        self.0
    }

    #[inline]
    pub(crate) fn revoke(&mut self) {
        self.0 = false;
    }

    #[inline]
    pub(crate) fn and(&mut self, v: bool) {
        self.0 &= v;
    }
}

/// Per request permissions, reset only when the next request begins.
#[derive(Clone, Debug, Default)]
pub(crate) struct ConnectionState {
    pub(crate) keep_alive: Flag,
    pub(crate) may_use_cache: Flag,
    pub(crate) may_cache: Flag,
    pub(crate) may_filter: Flag,
    pub(crate) must_revalidate: bool,
    pub(crate) chunked_out: bool,
}

impl ConnectionState {
    /// Revoke every cache permission, used for requests which never touch the cache.
    pub(crate) fn bypass_cache(&mut self) {
        self.may_use_cache.revoke();
        self.may_cache.revoke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial() {
        let s = ConnectionState::default();
        assert!(s.keep_alive.get());
        assert!(s.may_use_cache.get());
        assert!(s.may_cache.get());
        assert!(s.may_filter.get());
        assert!(!s.must_revalidate);
        assert!(!s.chunked_out);
    }

    #[test]
    fn monotonic() {
        let mut s = ConnectionState::default();
        let ops: [fn(&mut ConnectionState, bool); 4] = [
            |s, v| s.keep_alive.and(v),
            |s, v| s.may_use_cache.and(v),
            |s, v| s.may_cache.and(v),
            |s, v| s.may_filter.and(v),
        ];
        for (i, op) in ops.iter().enumerate() {
            op(&mut s, true);
            op(&mut s, false);
            for _ in 0..3 {
                op(&mut s, true);
            }
            let values = [
                s.keep_alive.get(),
                s.may_use_cache.get(),
                s.may_cache.get(),
                s.may_filter.get(),
            ];
            assert!(!values[i]);
            // flags not touched yet are still granted
            for v in &values[i + 1..] {
                assert!(*v);
            }
        }

        s.bypass_cache();
        s.may_cache.and(true);
        assert!(!s.may_cache.get());
        assert!(!s.may_use_cache.get());
    }
}
