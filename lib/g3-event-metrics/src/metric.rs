/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use crate::{MetricError, MetricMap, MetricValue};

#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Value(MetricValue),
    Map(MetricMap),
}

impl Metric {
    pub fn as_value(&self) -> Option<&MetricValue> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&MetricMap> {
        match self {
            Metric::Value(_) => None,
            Metric::Map(m) => Some(m),
        }
    }

    pub(crate) fn check_schema(&self, other: &Metric) -> Result<(), MetricError> {
        match (self, other) {
            (Metric::Value(v1), Metric::Value(v2)) => {
                if v1.kind() == v2.kind() {
                    Ok(())
                } else {
                    Err(MetricError::SchemaMismatch(format!(
                        "{} value is not compatible with {} value",
                        v1.kind(),
                        v2.kind()
                    )))
                }
            }
            (Metric::Map(m1), Metric::Map(m2)) => m1.check_schema(m2),
            _ => Err(self.variant_mismatch(other)),
        }
    }

    fn variant_mismatch(&self, other: &Metric) -> MetricError {
        let name = match (self, other) {
            (Metric::Map(m), _) | (_, Metric::Map(m)) => m.name(),
            _ => "",
        };
        MetricError::SchemaMismatch(format!("map {name} is not compatible with plain value"))
    }

    pub fn add(&self, other: &Metric) -> Result<Metric, MetricError> {
        match (self, other) {
            (Metric::Value(v1), Metric::Value(v2)) => v1.add(v2).map(Metric::Value),
            (Metric::Map(m1), Metric::Map(m2)) => m1.merge(m2).map(Metric::Map),
            _ => Err(self.variant_mismatch(other)),
        }
    }

    /// Reset aware subtraction of the `older` reading from this one
    pub fn delta(&self, older: &Metric) -> Result<(Metric, bool), MetricError> {
        match (self, older) {
            (Metric::Value(v1), Metric::Value(v2)) => {
                v1.delta(v2).map(|(v, reset)| (Metric::Value(v), reset))
            }
            (Metric::Map(m1), Metric::Map(m2)) => {
                m1.delta(m2).map(|(m, reset)| (Metric::Map(m), reset))
            }
            _ => Err(self.variant_mismatch(older)),
        }
    }
}

impl From<MetricValue> for Metric {
    fn from(value: MetricValue) -> Self {
        Metric::Value(value)
    }
}

impl From<i64> for Metric {
    fn from(value: i64) -> Self {
        Metric::Value(MetricValue::Signed(value))
    }
}

impl From<f64> for Metric {
    fn from(value: f64) -> Self {
        Metric::Value(MetricValue::Double(value))
    }
}

impl From<MetricMap> for Metric {
    fn from(value: MetricMap) -> Self {
        Metric::Map(value)
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("map:") {
            MetricMap::from_str(s).map(Metric::Map)
        } else {
            MetricValue::from_str(s).map(Metric::Value)
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => fmt::Display::fmt(v, f),
            Metric::Map(m) => fmt::Display::fmt(m, f),
        }
    }
}
