// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the configuration-search engine.
//!
//! Configuration-level errors abort the whole run; per-candidate data gaps are
//! recorded as [`crate::filter::DropReason`] on the candidate report and never
//! abort the sweep. Cancellation is not an error either: the run returns a
//! partial result flagged as degraded.

use thiserror::Error;

use crate::curve::CurveError;
use crate::perf::OpType;
use crate::quant::QuantMode;

/// Run-aborting errors surfaced to the caller before or during setup.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid `TaskConfig`; detected before the sweep starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A requested quant mode is neither measured nor compute-equivalent to a
    /// measured one for the given operator.
    #[error("quant mode {mode} is not supported for {op} and has no measured equivalent")]
    UnsupportedQuantMode { op: OpType, mode: QuantMode },

    /// Query shape fell outside the measured range under the `Error` policy.
    #[error("query shape out of measured range for {op}: {source}")]
    ShapeOutOfRange {
        op: OpType,
        #[source]
        source: CurveError,
    },

    /// Malformed performance curve detected at construction time.
    #[error(transparent)]
    Curve(#[from] CurveError),
}
