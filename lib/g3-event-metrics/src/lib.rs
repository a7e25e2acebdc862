/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::MetricError;

mod value;
pub use value::{MetricValue, ValueKind};

mod map;
pub use map::MetricMap;

mod metric;
pub use metric::Metric;

mod record;
pub use record::{MetricRecord, MetricType};

mod accumulate;
pub use accumulate::RecordAccumulator;

mod delta;
pub use delta::DeltaStore;

mod config;
pub use config::DeltaStoreConfig;
