/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use indexmap::IndexMap;

use crate::{MetricError, MetricRecord};

/// Fold partial records of the same interval into one record per key.
#[derive(Default)]
pub struct RecordAccumulator {
    records: IndexMap<String, MetricRecord>,
}

impl RecordAccumulator {
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn add(&mut self, record: MetricRecord) -> Result<(), MetricError> {
        let key = record.key();
        match self.records.get_mut(&key) {
            Some(r) => r.update(&record),
            None => {
                self.records.insert(key, record);
                Ok(())
            }
        }
    }

    /// Take out all folded records, in the order their keys were first seen
    pub fn drain(&mut self) -> impl Iterator<Item = MetricRecord> + '_ {
        self.records.drain(..).map(|(_, r)| r)
    }
}
