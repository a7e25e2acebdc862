/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::{self, Write};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{Metric, MetricError};

const LABELS_PREFIX: &str = "labels=";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetricType {
    #[default]
    Cumulative,
    Gauge,
}

/// A snapshot of named metrics and labels, captured once per interval.
///
/// Metrics and labels are kept in the order they were added. That order is
/// part of the identity of the record, see [`MetricRecord::key`], and is
/// also the order they are rendered in, and records with the same contents
/// in a different order are not equal.
#[derive(Clone, Debug)]
pub struct MetricRecord {
    timestamp: DateTime<Utc>,
    r#type: MetricType,
    metrics: IndexMap<String, Metric>,
    labels: IndexMap<String, String>,
}

impl MetricRecord {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        MetricRecord {
            timestamp,
            r#type: MetricType::Cumulative,
            metrics: IndexMap::new(),
            labels: IndexMap::new(),
        }
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[inline]
    pub fn metric_type(&self) -> MetricType {
        self.r#type
    }

    pub fn set_type(&mut self, r#type: MetricType) -> &mut Self {
        self.r#type = r#type;
        self
    }

    /// Number of metrics in this record
    #[inline]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn add_metric<T>(&mut self, name: &str, value: T) -> Result<&mut Self, MetricError>
    where
        T: Into<Metric>,
    {
        if self.metrics.contains_key(name) {
            return Err(MetricError::DuplicateName(name.to_string()));
        }
        self.metrics.insert(name.to_string(), value.into());
        Ok(self)
    }

    /// Set a label, an existing label keeps its position and gets the new value
    pub fn add_label(&mut self, name: &str, value: &str) -> &mut Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(|k| k.as_str())
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&str, &Metric)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(|k| k.as_str())
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(|v| v.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn check_schema(&self, other: &MetricRecord) -> Result<(), MetricError> {
        if self.metrics.len() != other.metrics.len() {
            return Err(MetricError::SchemaMismatch(format!(
                "metric count {} is not equal to {}",
                self.metrics.len(),
                other.metrics.len()
            )));
        }
        for (name, m) in &self.metrics {
            let o = other.metric_for(name)?;
            m.check_schema(o).map_err(|e| match e {
                MetricError::SchemaMismatch(s) => {
                    MetricError::SchemaMismatch(format!("metric {name}: {s}"))
                }
                e => e,
            })?;
        }
        Ok(())
    }

    fn metric_for(&self, name: &str) -> Result<&Metric, MetricError> {
        self.metrics
            .get(name)
            .ok_or_else(|| MetricError::SchemaMismatch(format!("no metric {name} found")))
    }

    /// Add up the metrics of `other`, which should have exactly the same
    /// metric names and value kinds.
    ///
    /// Labels are left untouched. Nothing is changed if an error is returned.
    pub fn update(&mut self, other: &MetricRecord) -> Result<(), MetricError> {
        self.check_schema(other)?;
        for (name, m) in self.metrics.iter_mut() {
            let o = other.metric_for(name)?;
            *m = m.add(o)?;
        }
        Ok(())
    }

    /// Get the delta between this reading and the `previous` one.
    ///
    /// If any counter went backwards, the measured process is considered to
    /// have been restarted, and the returned record carries the raw values of
    /// this reading for all metrics.
    pub fn subtract_last(&self, previous: &MetricRecord) -> Result<MetricRecord, MetricError> {
        self.reset_aware_delta(previous).map(|(r, _)| r)
    }

    pub(crate) fn reset_aware_delta(
        &self,
        previous: &MetricRecord,
    ) -> Result<(MetricRecord, bool), MetricError> {
        self.check_schema(previous)?;

        let mut metrics = IndexMap::with_capacity(self.metrics.len());
        let mut reset = false;
        for (name, m) in &self.metrics {
            let (d, r) = m.delta(previous.metric_for(name)?)?;
            reset |= r;
            metrics.insert(name.clone(), d);
        }

        let record = MetricRecord {
            timestamp: self.timestamp,
            r#type: self.r#type,
            metrics: if reset {
                self.metrics.clone()
            } else {
                metrics
            },
            labels: self.labels.clone(),
        };
        Ok((record, reset))
    }

    /// The identity of this record.
    ///
    /// Only records with the same key should be merged or subtracted.
    pub fn key(&self) -> String {
        let mut key = String::new();
        let mut first = true;
        for name in self.metrics.keys() {
            if !first {
                key.push(',');
            }
            first = false;
            key.push_str(name);
        }
        for (name, value) in &self.labels {
            if !first {
                key.push(',');
            }
            first = false;
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key
    }
}

impl PartialEq for MetricRecord {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.r#type == other.r#type
            && self.metrics.iter().eq(other.metrics.iter())
            && self.labels.iter().eq(other.labels.iter())
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(itoa::Buffer::new().format(self.timestamp.timestamp()))?;

        let mut labels = self.labels.iter();
        if let Some((name, value)) = labels.next() {
            f.write_char(' ')?;
            f.write_str(LABELS_PREFIX)?;
            f.write_str(name)?;
            f.write_char('=')?;
            f.write_str(value)?;
            for (name, value) in labels {
                f.write_char(',')?;
                f.write_str(name)?;
                f.write_char('=')?;
                f.write_str(value)?;
            }
        }

        for (name, m) in &self.metrics {
            f.write_char(' ')?;
            f.write_str(name)?;
            f.write_char('=')?;
            fmt::Display::fmt(m, f)?;
        }
        Ok(())
    }
}

impl FromStr for MetricRecord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.split_ascii_whitespace();

        let ts = iter.next().ok_or_else(|| anyhow!("empty string"))?;
        let secs = i64::from_str(ts).map_err(|e| anyhow!("invalid timestamp {ts}: {e}"))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| anyhow!("out of range timestamp {secs}"))?;
        let mut record = MetricRecord::new(timestamp);

        let parts: Vec<&str> = iter.collect();
        let mut metrics = parts.as_slice();
        if let Some((first, left)) = parts.split_first() {
            if let Some(labels) = first.strip_prefix(LABELS_PREFIX) {
                for label in labels.split(',') {
                    let (name, value) = label
                        .split_once('=')
                        .ok_or_else(|| anyhow!("no value found for label {label}"))?;
                    if name.is_empty() {
                        return Err(anyhow!("empty label name"));
                    }
                    record.add_label(name, value);
                }
                metrics = left;
            }
        }

        for part in metrics {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| anyhow!("no value found for metric {part}"))?;
            if name.is_empty() {
                return Err(anyhow!("empty metric name"));
            }
            let metric =
                Metric::from_str(value).context(format!("invalid value for metric {name}"))?;
            record.add_metric(name, metric)?;
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricMap, MetricValue, ValueKind};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn new_record(sent: i64, rcvd: i64, rtt: i64, resp_codes: &[(&str, i64)]) -> MetricRecord {
        let mut resp_code = MetricMap::new("code");
        for (k, v) in resp_codes {
            resp_code.increment_by(k, *v).unwrap();
        }
        let mut record = MetricRecord::new(ts(1_700_000_000));
        record
            .add_metric("sent", sent)
            .unwrap()
            .add_metric("rcvd", rcvd)
            .unwrap()
            .add_metric("rtt", rtt)
            .unwrap()
            .add_metric("resp-code", resp_code)
            .unwrap();
        record
    }

    fn verify_record(
        record: &MetricRecord,
        sent: i64,
        rcvd: i64,
        rtt: i64,
        resp_codes: &[(&str, i64)],
    ) {
        assert_eq!(
            record.metric_names().collect::<Vec<_>>(),
            ["sent", "rcvd", "rtt", "resp-code"]
        );
        for (name, expected) in [("sent", sent), ("rcvd", rcvd), ("rtt", rtt)] {
            let v = record.metric(name).and_then(|m| m.as_value()).unwrap();
            assert_eq!(*v, MetricValue::Signed(expected), "metric {name}");
        }
        let map = record
            .metric("resp-code")
            .and_then(|m| m.as_map())
            .unwrap();
        assert_eq!(map.len(), resp_codes.len());
        for (k, expected) in resp_codes {
            assert_eq!(map.get(k), MetricValue::Signed(*expected), "key {k}");
        }
    }

    #[test]
    fn order() {
        let mut record = MetricRecord::new(ts(0));
        for name in ["z", "a", "m", "0", "b"] {
            record.add_metric(name, 1i64).unwrap();
        }
        assert_eq!(
            record.metric_names().collect::<Vec<_>>(),
            ["z", "a", "m", "0", "b"]
        );
        assert_eq!(record.len(), 5);
    }

    #[test]
    fn eq_order() {
        let mut a = MetricRecord::new(ts(0));
        a.add_metric("sent", 1i64).unwrap().add_metric("rcvd", 1i64).unwrap();
        let mut b = MetricRecord::new(ts(0));
        b.add_metric("rcvd", 1i64).unwrap().add_metric("sent", 1i64).unwrap();
        assert_ne!(a.key(), b.key());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let mut c = a.clone();
        c.add_label("ptype", "http").add_label("probe", "dns");
        let mut d = a.clone();
        d.add_label("probe", "dns").add_label("ptype", "http");
        assert_ne!(c, d);

        let mut e = a.clone();
        e.set_type(MetricType::Gauge);
        assert_ne!(a, e);
        let mut f = MetricRecord::new(ts(1));
        f.add_metric("sent", 1i64).unwrap().add_metric("rcvd", 1i64).unwrap();
        assert_ne!(a, f);
    }

    #[test]
    fn duplicate_name() {
        let mut record = MetricRecord::new(ts(0));
        record.add_metric("sent", 1i64).unwrap();
        let e = record.add_metric("sent", 2i64).unwrap_err();
        assert_eq!(e, MetricError::DuplicateName("sent".to_string()));
        assert_eq!(
            record.metric("sent").and_then(|m| m.as_value()),
            Some(&MetricValue::Signed(1))
        );
        assert!(record.metric("rcvd").is_none());
    }

    #[test]
    fn label_last_write_wins() {
        let mut record = MetricRecord::new(ts(0));
        record
            .add_label("ptype", "http")
            .add_label("probe", "homepage")
            .add_label("ptype", "dns");
        assert_eq!(record.label("ptype"), Some("dns"));
        assert_eq!(record.label("dst"), None);
        assert_eq!(
            record.labels().collect::<Vec<_>>(),
            [("ptype", "dns"), ("probe", "homepage")]
        );
        assert_eq!(record.label_names().collect::<Vec<_>>(), ["ptype", "probe"]);
    }

    #[test]
    fn update() {
        let mut m = new_record(0, 0, 0, &[]);
        m.add_label("ptype", "http");

        let m2 = new_record(32, 22, 220100, &[("200", 22)]);
        m.update(&m2).unwrap();
        let m_clone = m.clone();
        verify_record(&m, 32, 22, 220100, &[("200", 22)]);

        let m3 = new_record(30, 30, 300100, &[("200", 22), ("204", 8)]);
        m.update(&m3).unwrap();
        verify_record(&m, 62, 52, 520200, &[("200", 44), ("204", 8)]);
        assert_eq!(m.label("ptype"), Some("http"));

        // the clone is not affected by later updates
        verify_record(&m_clone, 32, 22, 220100, &[("200", 22)]);

        assert_eq!(
            m.to_string(),
            "1700000000 labels=ptype=http sent=62 rcvd=52 rtt=520200 resp-code=map:code,200:44,204:8"
        );
    }

    #[test]
    fn clone_independent() {
        let mut m = new_record(1, 1, 1, &[("200", 1)]);
        let c = m.clone();
        m.update(&new_record(1, 1, 1, &[("204", 1)])).unwrap();
        m.add_metric("lost", 1i64).unwrap();
        m.add_label("ptype", "http");
        verify_record(&c, 1, 1, 1, &[("200", 1)]);
        assert_eq!(c.len(), 4);
        assert_eq!(c.label("ptype"), None);
    }

    #[test]
    fn update_schema_mismatch() {
        let mut m = new_record(1, 1, 1, &[("200", 1)]);

        let mut other = new_record(1, 1, 1, &[]);
        other.add_metric("lost", 1i64).unwrap();
        assert!(matches!(
            m.update(&other),
            Err(MetricError::SchemaMismatch(_))
        ));

        let mut other = MetricRecord::new(ts(0));
        other
            .add_metric("sent", 1i64)
            .unwrap()
            .add_metric("rcvd", 1i64)
            .unwrap()
            .add_metric("rtt", 1.0f64)
            .unwrap()
            .add_metric("resp-code", MetricMap::new("code"))
            .unwrap();
        assert!(m.update(&other).is_err());

        let mut other = MetricRecord::new(ts(0));
        other
            .add_metric("sent", 1i64)
            .unwrap()
            .add_metric("rcvd", 1i64)
            .unwrap()
            .add_metric("rtt", 1i64)
            .unwrap()
            .add_metric("resp-code", MetricMap::new("status"))
            .unwrap();
        assert!(m.update(&other).is_err());

        let mut other = MetricRecord::new(ts(0));
        other
            .add_metric("sent", 1i64)
            .unwrap()
            .add_metric("rcvd", 1i64)
            .unwrap()
            .add_metric("latency", 1i64)
            .unwrap()
            .add_metric("resp-code", MetricMap::new("code"))
            .unwrap();
        assert!(m.update(&other).is_err());

        // nothing changed by failed updates
        verify_record(&m, 1, 1, 1, &[("200", 1)]);
    }

    #[test]
    fn subtract_counters() {
        let mut m = new_record(10, 10, 1000, &[]);
        m.add_label("ptype", "http");

        // first run
        let m2 = new_record(32, 22, 220100, &[("200", 22)]);
        let delta = m2.subtract_last(&m).unwrap();
        verify_record(&delta, 22, 12, 219100, &[("200", 22)]);

        // second run
        let m3 = new_record(42, 31, 300100, &[("200", 24), ("204", 8)]);
        let delta = m3.subtract_last(&m2).unwrap();
        verify_record(&delta, 10, 9, 80000, &[("200", 2), ("204", 8)]);

        // third run, expect reset
        let m4 = new_record(10, 8, 1100, &[("200", 8)]);
        let (delta, reset) = m4.reset_aware_delta(&m3).unwrap();
        assert!(reset);
        verify_record(&delta, 10, 8, 1100, &[("200", 8)]);

        // operands are not changed
        verify_record(&m3, 42, 31, 300100, &[("200", 24), ("204", 8)]);
        verify_record(&m4, 10, 8, 1100, &[("200", 8)]);
    }

    #[test]
    fn subtract_reset_by_map_key() {
        let older = new_record(10, 10, 100, &[("200", 5), ("404", 3)]);
        let newer = new_record(20, 20, 200, &[("200", 4), ("204", 1)]);
        let delta = newer.subtract_last(&older).unwrap();
        verify_record(&delta, 20, 20, 200, &[("200", 4), ("204", 1)]);
    }

    #[test]
    fn subtract_keeps_newer_meta() {
        let mut older = new_record(1, 1, 1, &[]);
        older.add_label("dst", "a");
        let mut newer = MetricRecord::new(ts(1_700_000_060));
        newer
            .add_metric("sent", 2i64)
            .unwrap()
            .add_metric("rcvd", 2i64)
            .unwrap()
            .add_metric("rtt", 2i64)
            .unwrap()
            .add_metric("resp-code", MetricMap::new("code"))
            .unwrap();
        newer.add_label("dst", "b").set_type(MetricType::Gauge);

        let delta = newer.subtract_last(&older).unwrap();
        assert_eq!(delta.timestamp(), ts(1_700_000_060));
        assert_eq!(delta.label("dst"), Some("b"));
        assert_eq!(delta.metric_type(), MetricType::Gauge);
        verify_record(&delta, 1, 1, 1, &[]);
    }

    #[test]
    fn subtract_schema_mismatch() {
        let older = new_record(1, 1, 1, &[]);
        let mut newer = MetricRecord::new(ts(0));
        newer.add_metric("sent", 2i64).unwrap();
        assert!(matches!(
            newer.subtract_last(&older),
            Err(MetricError::SchemaMismatch(_))
        ));
        assert!(matches!(
            older.subtract_last(&newer),
            Err(MetricError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn double_values() {
        let mut older = MetricRecord::new(ts(0));
        older
            .add_metric("latency", 1.5f64)
            .unwrap()
            .add_metric("lat-by-dst", MetricMap::with_kind("dst", ValueKind::Double))
            .unwrap();
        let mut newer = older.clone();
        newer.update(&older).unwrap();

        let delta = newer.subtract_last(&older).unwrap();
        assert_eq!(
            delta.metric("latency").and_then(|m| m.as_value()),
            Some(&MetricValue::Double(1.5))
        );
        assert_eq!(delta.to_string(), "0 latency=1.5 lat-by-dst=map:dst");
    }

    #[test]
    fn subtract_reset_by_nan() {
        let mut older = MetricRecord::new(ts(0));
        older
            .add_metric("sent", 4i64)
            .unwrap()
            .add_metric("latency", 1.0f64)
            .unwrap();
        let mut newer = MetricRecord::new(ts(60));
        newer
            .add_metric("sent", 10i64)
            .unwrap()
            .add_metric("latency", f64::NAN)
            .unwrap();

        let (delta, reset) = newer.reset_aware_delta(&older).unwrap();
        assert!(reset);
        assert_eq!(
            delta.metric("sent").and_then(|m| m.as_value()),
            Some(&MetricValue::Signed(10))
        );
        let latency = delta.metric("latency").and_then(|m| m.as_value()).unwrap();
        assert!(latency.as_f64().is_nan());
    }

    #[test]
    fn key() {
        let mut m = new_record(42, 31, 300100, &[("200", 24), ("204", 8)]);
        m.add_label("probe", "google-homepage");
        assert_eq!(m.key(), "sent,rcvd,rtt,resp-code,probe=google-homepage");

        m.add_label("dst", "www.google.com");
        assert_eq!(
            m.key(),
            "sent,rcvd,rtt,resp-code,probe=google-homepage,dst=www.google.com"
        );

        let m = new_record(0, 0, 0, &[]);
        assert_eq!(m.key(), "sent,rcvd,rtt,resp-code");

        let mut m = MetricRecord::new(ts(0));
        m.add_label("probe", "dns");
        assert_eq!(m.key(), "probe=dns");

        assert_eq!(MetricRecord::new(ts(0)).key(), "");
    }

    #[test]
    fn display() {
        let m = new_record(32, 22, 220100, &[("200", 22)]);
        assert_eq!(
            m.to_string(),
            "1700000000 sent=32 rcvd=22 rtt=220100 resp-code=map:code,200:22"
        );

        let mut m = MetricRecord::new(ts(10));
        m.add_label("ptype", "http").add_label("probe", "homepage");
        assert_eq!(m.to_string(), "10 labels=ptype=http,probe=homepage");

        assert_eq!(MetricRecord::new(ts(10)).to_string(), "10");
    }

    #[test]
    fn parse() {
        let s = "1700000000 labels=ptype=http sent=62 rcvd=52 rtt=520200 resp-code=map:code,200:44,204:8";
        let record = MetricRecord::from_str(s).unwrap();
        assert_eq!(record.timestamp(), ts(1_700_000_000));
        assert_eq!(record.label("ptype"), Some("http"));
        verify_record(&record, 62, 52, 520200, &[("200", 44), ("204", 8)]);
        assert_eq!(record.to_string(), s);

        let record = MetricRecord::from_str("10 latency=0.25").unwrap();
        assert_eq!(record.labels().count(), 0);
        assert_eq!(
            record.metric("latency").and_then(|m| m.as_value()),
            Some(&MetricValue::Double(0.25))
        );

        assert!(MetricRecord::from_str("").is_err());
        assert!(MetricRecord::from_str("abc sent=1").is_err());
        assert!(MetricRecord::from_str("10 sent").is_err());
        assert!(MetricRecord::from_str("10 sent=1 sent=2").is_err());
        assert!(MetricRecord::from_str("10 =1").is_err());
        assert!(MetricRecord::from_str("10 labels=ptype sent=1").is_err());
        assert!(MetricRecord::from_str("10 sent=map:").is_err());
    }
}
