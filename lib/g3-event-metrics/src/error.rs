/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("duplicate metric name: {0}")]
    DuplicateName(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}
