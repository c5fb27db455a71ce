// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! SLA and concurrency-cap feasibility filtering.
//!
//! The SLA filter and the concurrency-cap filter commute: applying them in
//! either order yields the same surviving set, and filtering is idempotent.
//! An empty surviving set is a warning condition for the caller, never an
//! error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidate::CandidateConfig;
use crate::config::SlaConstraints;
use crate::estimate::{EstimateError, Metrics};

/// Why a candidate was excluded from the feasible set.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    #[error("ttft exceeds SLA")]
    TtftExceeded,

    #[error("tpot exceeds SLA")]
    TpotExceeded,

    #[error("concurrency above the configured cap")]
    ConcurrencyCapExceeded,

    #[error("model does not fit GPU memory")]
    InsufficientMemory,

    #[error("prefill pool cannot keep pace with decode admissions")]
    PrefillSaturated,

    #[error("estimation failed: {0}")]
    EstimationFailed(String),
}

impl From<EstimateError> for DropReason {
    fn from(err: EstimateError) -> Self {
        match err {
            EstimateError::InsufficientMemory { .. } => DropReason::InsufficientMemory,
            EstimateError::PrefillSaturated { .. } => DropReason::PrefillSaturated,
            EstimateError::Lookup(e) => DropReason::EstimationFailed(e.to_string()),
        }
    }
}

/// First violated constraint, or `None` when the candidate is feasible.
///
/// Check order is fixed for reproducible reporting; it does not affect the
/// surviving set.
pub fn violation(
    candidate: &CandidateConfig,
    metrics: &Metrics,
    sla: &SlaConstraints,
) -> Option<DropReason> {
    if metrics.ttft_ms > sla.ttft_ms {
        return Some(DropReason::TtftExceeded);
    }
    if metrics.tpot_ms > sla.tpot_ms {
        return Some(DropReason::TpotExceeded);
    }
    if let Some(cap) = sla.max_concurrency {
        if candidate.concurrency > cap {
            return Some(DropReason::ConcurrencyCapExceeded);
        }
    }
    None
}

/// Retain the feasible subset of `(candidate, metrics)` pairs.
pub fn feasible_set(
    pairs: &[(CandidateConfig, Metrics)],
    sla: &SlaConstraints,
) -> Vec<(CandidateConfig, Metrics)> {
    pairs
        .iter()
        .filter(|(candidate, metrics)| violation(candidate, metrics, sla).is_none())
        .cloned()
        .collect()
}
