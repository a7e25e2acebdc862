/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::{DeltaStoreConfig, MetricError, MetricRecord, MetricType};

/// Turn successive cumulative readings into per interval deltas.
///
/// The last reading of each distinct record, as identified by
/// [`MetricRecord::key`], is retained to be subtracted from the next one.
pub struct DeltaStore {
    config: DeltaStoreConfig,
    last: AHashMap<String, MetricRecord>,
}

impl DeltaStore {
    pub fn new(config: DeltaStoreConfig) -> Self {
        DeltaStore {
            config,
            last: AHashMap::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &DeltaStoreConfig {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.last.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }

    /// Get the record to export for this reading.
    ///
    /// Gauge records are returned as is. `None` is returned for the first
    /// reading of a cumulative record if `emit_first` is off.
    pub fn process(&mut self, record: &MetricRecord) -> Result<Option<MetricRecord>, MetricError> {
        if record.metric_type() == MetricType::Gauge {
            return Ok(Some(record.clone()));
        }

        let key = record.key();
        let Some(previous) = self.last.get_mut(&key) else {
            self.last.insert(key, record.clone());
            return Ok(self.first_reading(record));
        };

        if self
            .config
            .is_expired(previous.timestamp(), record.timestamp())
        {
            debug!(
                "retained reading of {key} at {} expired",
                previous.timestamp().timestamp()
            );
            *previous = record.clone();
            return Ok(self.first_reading(record));
        }

        match record.reset_aware_delta(previous) {
            Ok((delta, reset)) => {
                if reset {
                    debug!("counter reset detected for {key}");
                }
                *previous = record.clone();
                Ok(Some(delta))
            }
            Err(e) => {
                warn!("unable to get delta for {key}: {e}, the retained reading is replaced");
                *previous = record.clone();
                Err(e)
            }
        }
    }

    fn first_reading(&self, record: &MetricRecord) -> Option<MetricRecord> {
        if self.config.emit_first {
            Some(record.clone())
        } else {
            None
        }
    }

    /// Drop all retained readings that expired at `now`
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last.len();
        self.last
            .retain(|_, r| !self.config.is_expired(r.timestamp(), now));
        before - self.last.len()
    }
}
