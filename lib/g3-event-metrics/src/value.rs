/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

use crate::MetricError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Signed,
    Double,
}

impl ValueKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Signed => "signed",
            ValueKind::Double => "double",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Signed(i64),
    Double(f64),
}

impl MetricValue {
    pub const fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Signed => MetricValue::Signed(0),
            ValueKind::Double => MetricValue::Double(0.0),
        }
    }

    pub const fn kind(&self) -> ValueKind {
        match self {
            MetricValue::Signed(_) => ValueKind::Signed,
            MetricValue::Double(_) => ValueKind::Double,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Signed(i) => *i as f64,
            MetricValue::Double(f) => *f,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Signed(i) => Some(*i),
            MetricValue::Double(_) => None,
        }
    }

    pub fn add(&self, rhs: &MetricValue) -> Result<MetricValue, MetricError> {
        match (self, rhs) {
            (MetricValue::Signed(i1), MetricValue::Signed(i2)) => {
                Ok(MetricValue::Signed(i1.wrapping_add(*i2)))
            }
            (MetricValue::Double(f1), MetricValue::Double(f2)) => Ok(MetricValue::Double(f1 + f2)),
            _ => Err(MetricError::SchemaMismatch(format!(
                "unable to add {} value to {} value",
                rhs.kind(),
                self.kind()
            ))),
        }
    }

    /// Subtract an `older` reading of the same counter from this one.
    ///
    /// If the counter went backwards it has been reset, and this reading is
    /// returned as is with the reset flag set.
    pub fn delta(&self, older: &MetricValue) -> Result<(MetricValue, bool), MetricError> {
        match (self, older) {
            (MetricValue::Signed(n), MetricValue::Signed(o)) => {
                if n < o {
                    return Ok((*self, true));
                }
                match n.checked_sub(*o) {
                    Some(d) => Ok((MetricValue::Signed(d), false)),
                    // out of range even though it grew, start over from this reading
                    None => Ok((*self, true)),
                }
            }
            (MetricValue::Double(n), MetricValue::Double(o)) => {
                if n >= o {
                    Ok((MetricValue::Double(n - o), false))
                } else {
                    Ok((*self, true))
                }
            }
            _ => Err(MetricError::SchemaMismatch(format!(
                "unable to subtract {} value from {} value",
                older.kind(),
                self.kind()
            ))),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Signed(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

impl FromStr for MetricValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(anyhow!("empty string"));
        }

        match memchr::memchr3(b'.', b'e', b'E', s.as_bytes()) {
            Some(_) => {
                let f = f64::from_str(s).map_err(|e| anyhow!("invalid f64 string: {e}"))?;
                Ok(MetricValue::Double(f))
            }
            None => match i64::from_str(s) {
                Ok(i) => Ok(MetricValue::Signed(i)),
                // inf / NaN
                Err(e) => f64::from_str(s)
                    .map(MetricValue::Double)
                    .map_err(|_| anyhow!("invalid i64 string: {e}")),
            },
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Signed(i) => f.write_str(itoa::Buffer::new().format(*i)),
            MetricValue::Double(v) => f.write_str(ryu::Buffer::new().format(*v)),
        }
    }
}
