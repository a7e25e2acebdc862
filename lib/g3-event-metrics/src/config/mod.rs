/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::time::Duration;

use chrono::{DateTime, Utc};

#[cfg(feature = "yaml")]
mod yaml;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaStoreConfig {
    pub(crate) emit_first: bool,
    pub(crate) expire: Option<Duration>,
}

impl Default for DeltaStoreConfig {
    fn default() -> Self {
        DeltaStoreConfig {
            emit_first: true,
            expire: None,
        }
    }
}

impl DeltaStoreConfig {
    #[inline]
    pub fn set_emit_first(&mut self, emit: bool) {
        self.emit_first = emit;
    }

    #[inline]
    pub fn emit_first(&self) -> bool {
        self.emit_first
    }

    /// Set the max age of the retained reading, zero to disable
    pub fn set_expire(&mut self, expire: Duration) {
        if expire.is_zero() {
            self.expire = None;
        } else {
            self.expire = Some(expire);
        }
    }

    #[inline]
    pub fn expire(&self) -> Option<Duration> {
        self.expire
    }

    pub(crate) fn is_expired(&self, retained: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(expire) = self.expire else {
            return false;
        };
        match now.signed_duration_since(retained).to_std() {
            Ok(age) => age > expire,
            Err(_) => false,
        }
    }
}
