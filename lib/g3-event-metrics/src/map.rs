/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::{self, Write};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use indexmap::IndexMap;

use crate::{MetricError, MetricValue, ValueKind};

const MAP_PREFIX: &str = "map:";

/// Accumulators keyed by a sub category, e.g. counts per response code.
///
/// Keys keep the order they were first seen in, and two maps are only equal
/// if their keys are in the same order.
#[derive(Debug, Clone)]
pub struct MetricMap {
    name: String,
    kind: ValueKind,
    entries: IndexMap<String, MetricValue>,
}

impl MetricMap {
    pub fn new(name: impl Into<String>) -> Self {
        MetricMap::with_kind(name, ValueKind::Signed)
    }

    pub fn with_kind(name: impl Into<String>, kind: ValueKind) -> Self {
        MetricMap {
            name: name.into(),
            kind,
            entries: IndexMap::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Get the accumulator for `key`, zero if the key has never been seen
    pub fn get(&self, key: &str) -> MetricValue {
        self.entries
            .get(key)
            .copied()
            .unwrap_or(MetricValue::zero(self.kind))
    }

    pub fn increment_by<T>(&mut self, key: &str, amount: T) -> Result<(), MetricError>
    where
        T: Into<MetricValue>,
    {
        let amount = amount.into();
        if amount.kind() != self.kind {
            return Err(MetricError::SchemaMismatch(format!(
                "unable to add {} value to {} map {}",
                amount.kind(),
                self.kind,
                self.name
            )));
        }
        self.add_entry(key, amount)
    }

    fn add_entry(&mut self, key: &str, amount: MetricValue) -> Result<(), MetricError> {
        match self.entries.get_mut(key) {
            Some(v) => *v = v.add(&amount)?,
            None => {
                self.entries.insert(key.to_string(), amount);
            }
        }
        Ok(())
    }

    pub(crate) fn check_schema(&self, other: &MetricMap) -> Result<(), MetricError> {
        if self.name != other.name || self.kind != other.kind {
            return Err(MetricError::SchemaMismatch(format!(
                "map {}({}) is not compatible with map {}({})",
                self.name, self.kind, other.name, other.kind
            )));
        }
        Ok(())
    }

    /// Sum up matching keys, keys only in `other` are appended in their order
    pub fn merge(&self, other: &MetricMap) -> Result<MetricMap, MetricError> {
        self.check_schema(other)?;
        let mut merged = self.clone();
        for (k, v) in &other.entries {
            merged.add_entry(k, *v)?;
        }
        Ok(merged)
    }

    /// Subtract the `older` reading from this one, key by key.
    ///
    /// The returned flag is set if any shared key went backwards. Keys only
    /// found in this map are kept as is after the shared ones, and keys only
    /// found in `older` are dropped.
    pub fn delta(&self, older: &MetricMap) -> Result<(MetricMap, bool), MetricError> {
        self.check_schema(older)?;

        let mut entries = IndexMap::with_capacity(self.entries.len());
        let mut reset = false;
        for (k, v) in &self.entries {
            if let Some(o) = older.entries.get(k) {
                let (d, r) = v.delta(o)?;
                reset |= r;
                entries.insert(k.clone(), d);
            }
        }
        for (k, v) in &self.entries {
            if !older.entries.contains_key(k) {
                entries.insert(k.clone(), *v);
            }
        }

        let map = MetricMap {
            name: self.name.clone(),
            kind: self.kind,
            entries,
        };
        Ok((map, reset))
    }
}

impl PartialEq for MetricMap {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.entries.iter().eq(other.entries.iter())
    }
}

impl fmt::Display for MetricMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MAP_PREFIX)?;
        f.write_str(&self.name)?;
        for (k, v) in &self.entries {
            f.write_char(',')?;
            f.write_str(k)?;
            f.write_char(':')?;
            fmt::Display::fmt(v, f)?;
        }
        Ok(())
    }
}

impl FromStr for MetricMap {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix(MAP_PREFIX)
            .ok_or_else(|| anyhow!("no {MAP_PREFIX} prefix found"))?;

        let mut iter = s.split(',');
        let name = iter.next().unwrap_or_default();
        if name.is_empty() {
            return Err(anyhow!("empty map name"));
        }

        let mut map: Option<MetricMap> = None;
        for part in iter {
            let (key, value) = part
                .rsplit_once(':')
                .ok_or_else(|| anyhow!("no value found in map entry {part}"))?;
            if key.is_empty() {
                return Err(anyhow!("empty key in map entry {part}"));
            }
            let value =
                MetricValue::from_str(value).context(format!("invalid value for key {key}"))?;

            let map = map.get_or_insert_with(|| MetricMap::with_kind(name, value.kind()));
            if map.entries.contains_key(key) {
                return Err(anyhow!("duplicate map key {key}"));
            }
            map.increment_by(key, value)
                .context(format!("invalid value for key {key}"))?;
        }

        Ok(map.unwrap_or_else(|| MetricMap::new(name)))
    }
}
