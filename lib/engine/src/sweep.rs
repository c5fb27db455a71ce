// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The engine driver: generate -> estimate -> filter -> select.
//!
//! Per-candidate estimation is independent and side-effect free, so the
//! estimation stage fans out across a rayon pool. Cancellation is checked
//! between candidate evaluations; already-computed candidates are retained and
//! the run proceeds over the partial set, flagged as degraded, rather than
//! failing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::candidate::{CandidateConfig, CandidateGenerator};
use crate::config::{ServingMode, TaskConfig};
use crate::error::Error;
use crate::estimate::{estimate, Metrics};
use crate::filter::{self, DropReason};
use crate::pareto;
use crate::perf::{OpType, PerfDatabase};
use crate::quant::QuantMode;

/// Outcome for one evaluated candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub config: CandidateConfig,
    /// `None` when estimation itself failed (see `reason`).
    pub metrics: Option<Metrics>,
    pub feasible: bool,
    pub reason: Option<DropReason>,
}

/// Complete result of one engine run.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentResult {
    pub all_candidates: Vec<CandidateReport>,
    /// Non-dominated feasible candidates, deterministically ordered.
    pub pareto_front: Vec<(CandidateConfig, Metrics)>,
    /// Picker output per serving mode.
    pub best_configs: BTreeMap<ServingMode, Vec<CandidateConfig>>,
    /// Set when the sweep was cancelled and the result covers a partial grid.
    pub degraded: bool,
    /// Set when every candidate was filtered out; a warning, not an error.
    pub empty_feasible: bool,
}

impl ExperimentResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// The `(operator, quant mode)` tables one task will query.
fn required_tables(task: &TaskConfig) -> Vec<(OpType, QuantMode)> {
    let model = &task.model;
    let mut tables = vec![
        (OpType::Gemm, model.gemm_quant),
        (OpType::ContextAttention, model.kv_cache_quant),
        (OpType::GenerationAttention, model.kv_cache_quant),
    ];
    if model.moe.is_some() {
        tables.push((OpType::Moe, model.moe_quant));
    }
    // Comm tables only matter once the grid can shard or split pools.
    if task.total_gpus > 1 {
        tables.push((OpType::AllReduce, QuantMode::Float16));
        tables.push((OpType::P2p, QuantMode::Float16));
    }
    tables
}

/// Run one full configuration sweep.
///
/// Configuration-level problems abort the run before the sweep starts; a
/// single candidate's data gap never does.
pub fn run(
    task: &TaskConfig,
    db: &PerfDatabase,
    cancel: CancellationToken,
) -> Result<ExperimentResult, Error> {
    task.validate()
        .map_err(|e| Error::Configuration(e.to_string()))?;
    for (op, mode) in required_tables(task) {
        db.validate_supported(op, mode)?;
    }

    let generator = CandidateGenerator::new(task)?;
    let candidates: Vec<CandidateConfig> = generator.iter().collect();
    tracing::info!(
        model = %task.model.name,
        system = %task.system.name,
        backend = %task.backend,
        candidates = candidates.len(),
        "starting configuration sweep"
    );

    let degraded = AtomicBool::new(false);
    let all_candidates: Vec<CandidateReport> = candidates
        .par_iter()
        .filter_map(|candidate| {
            if cancel.is_cancelled() {
                degraded.store(true, Ordering::Relaxed);
                return None;
            }
            let report = match estimate(candidate, task, db) {
                Ok(metrics) => {
                    let reason = filter::violation(candidate, &metrics, &task.sla);
                    CandidateReport {
                        config: *candidate,
                        metrics: Some(metrics),
                        feasible: reason.is_none(),
                        reason,
                    }
                }
                Err(e) => {
                    tracing::debug!(candidate = ?candidate.degree_tuple(), error = %e, "candidate dropped");
                    CandidateReport {
                        config: *candidate,
                        metrics: None,
                        feasible: false,
                        reason: Some(e.into()),
                    }
                }
            };
            Some(report)
        })
        .collect();

    let feasible: Vec<(CandidateConfig, Metrics)> = all_candidates
        .iter()
        .filter(|report| report.feasible)
        .filter_map(|report| report.metrics.map(|metrics| (report.config, metrics)))
        .collect();

    let empty_feasible = feasible.is_empty();
    if empty_feasible {
        tracing::warn!("every candidate was filtered out; returning an empty frontier");
    }

    let pareto_front = pareto::pareto_front(&feasible);

    let mut best_configs = BTreeMap::new();
    for mode in &task.serving_modes {
        let members: Vec<_> = pareto_front
            .iter()
            .filter(|(candidate, _)| candidate.serving_mode() == *mode)
            .cloned()
            .collect();
        best_configs.insert(*mode, pareto::top_n(&members, task.pick_policy, task.top_n));
    }

    let degraded = degraded.load(Ordering::Relaxed);
    tracing::info!(
        evaluated = all_candidates.len(),
        feasible = feasible.len(),
        frontier = pareto_front.len(),
        degraded,
        "sweep complete"
    );

    Ok(ExperimentResult {
        all_candidates,
        pareto_front,
        best_configs,
        degraded,
        empty_feasible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pareto::dominates;
    use crate::testutil;

    #[test]
    fn full_sweep_produces_a_frontier() {
        let task = testutil::task();
        let db = testutil::synthetic_db();
        let result = run(&task, &db, CancellationToken::new()).unwrap();

        assert!(!result.all_candidates.is_empty());
        assert!(!result.pareto_front.is_empty());
        assert!(!result.degraded);
        assert!(!result.empty_feasible);

        // Anti-chain invariant over the reported frontier.
        for (i, (_, a)) in result.pareto_front.iter().enumerate() {
            for (j, (_, b)) in result.pareto_front.iter().enumerate() {
                if i != j {
                    assert!(!dominates(a, b));
                }
            }
        }
    }

    #[test]
    fn reports_cover_every_generated_candidate() {
        let task = testutil::task();
        let db = testutil::synthetic_db();
        let result = run(&task, &db, CancellationToken::new()).unwrap();
        let generator = CandidateGenerator::new(&task).unwrap();
        assert_eq!(result.all_candidates.len(), generator.iter().count());
        // Deterministic report order matches enumeration order.
        let reported: Vec<_> = result.all_candidates.iter().map(|r| r.config).collect();
        let generated: Vec<_> = generator.iter().collect();
        assert_eq!(reported, generated);
    }

    #[test]
    fn best_configs_only_cover_requested_modes() {
        let mut task = testutil::task();
        task.serving_modes = vec![ServingMode::Aggregated];
        let db = testutil::synthetic_db();
        let result = run(&task, &db, CancellationToken::new()).unwrap();
        assert_eq!(result.best_configs.len(), 1);
        let picks = &result.best_configs[&ServingMode::Aggregated];
        assert!(!picks.is_empty());
        assert!(picks.len() <= task.top_n);
        assert!(picks
            .iter()
            .all(|c| c.serving_mode() == ServingMode::Aggregated));
    }

    #[test]
    fn unsatisfiable_sla_yields_empty_frontier_without_error() {
        let mut task = testutil::task();
        task.sla.ttft_ms = 0.0001;
        task.sla.tpot_ms = 0.0001;
        let db = testutil::synthetic_db();
        let result = run(&task, &db, CancellationToken::new()).unwrap();
        assert!(result.empty_feasible);
        assert!(result.pareto_front.is_empty());
        assert!(result.best_configs.values().all(|v| v.is_empty()));
        // Candidates were still evaluated and carry their drop reasons.
        assert!(result
            .all_candidates
            .iter()
            .all(|r| !r.feasible && r.reason.is_some()));
    }

    #[test]
    fn mid_sweep_cancellation_retains_completed_candidates() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        use ndarray::{array, Array1};
        use ndarray_interp::InterpolateError;

        use crate::curve::{AxisInterpolator, InterpolationKind, PerfCurve};
        use crate::perf::DatabaseMode;

        // Cancels the sweep from inside the first gemm lookup; candidates
        // already being estimated finish, the rest are skipped.
        struct CancelAfterQueries {
            cancel: CancellationToken,
            remaining: AtomicUsize,
        }

        impl AxisInterpolator for CancelAfterQueries {
            fn interp(&self, _x: f64) -> Result<f64, InterpolateError> {
                if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    self.cancel.cancel();
                }
                Ok(0.001)
            }
        }

        let cancel = CancellationToken::new();
        let gemm = PerfCurve::Axis {
            xs: Array1::from_vec(vec![1.0, 1_000_000.0]),
            interp: Arc::new(CancelAfterQueries {
                cancel: cancel.clone(),
                remaining: AtomicUsize::new(1),
            }),
        };
        let attention = |scale: f64| {
            PerfCurve::grid(
                vec![1.0, 1024.0],
                vec![1.0, 16384.0],
                array![
                    [scale, scale * 16384.0],
                    [scale * 1024.0, scale * 1024.0 * 16384.0]
                ],
                InterpolationKind::Linear,
            )
            .unwrap()
        };
        let comm = PerfCurve::axis(
            vec![1.0, 1e12],
            vec![0.01, 10000.01],
            InterpolationKind::Linear,
        )
        .unwrap();
        let db = PerfDatabase::builder("h200_sxm", "trtllm", DatabaseMode::Silicon)
            .table(OpType::Gemm, QuantMode::Float16, gemm)
            .table(OpType::ContextAttention, QuantMode::Float16, attention(0.0001))
            .table(OpType::GenerationAttention, QuantMode::Float16, attention(0.00005))
            .table(OpType::AllReduce, QuantMode::Float16, comm.clone())
            .table(OpType::P2p, QuantMode::Float16, comm)
            .build();

        let task = testutil::task();
        let total = CandidateGenerator::new(&task).unwrap().iter().count();
        let result = run(&task, &db, cancel).unwrap();

        assert!(result.degraded);
        assert!(!result.all_candidates.is_empty());
        assert!(result.all_candidates.len() < total);
    }

    #[test]
    fn pre_cancelled_sweep_degrades_instead_of_failing() {
        let task = testutil::task();
        let db = testutil::synthetic_db();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run(&task, &db, cancel).unwrap();
        assert!(result.degraded);
        assert!(result.all_candidates.is_empty());
        assert!(result.pareto_front.is_empty());
    }

    #[test]
    fn unsupported_quant_mode_aborts_before_the_sweep() {
        let mut task = testutil::task();
        task.model.gemm_quant = QuantMode::Nvfp4;
        let db = testutil::synthetic_db();
        let err = run(&task, &db, CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedQuantMode {
                op: OpType::Gemm,
                mode: QuantMode::Nvfp4
            }
        ));
    }

    #[test]
    fn invalid_task_is_a_configuration_error() {
        let mut task = testutil::task();
        task.max_concurrency = 0;
        let db = testutil::synthetic_db();
        assert!(matches!(
            run(&task, &db, CancellationToken::new()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn concurrency_cap_excludes_higher_levels_end_to_end() {
        let mut task = testutil::task();
        task.max_concurrency = 512;
        task.sla.max_concurrency = Some(64);
        let db = testutil::synthetic_db();
        let result = run(&task, &db, CancellationToken::new()).unwrap();
        assert!(result
            .all_candidates
            .iter()
            .filter(|r| r.feasible)
            .all(|r| r.config.concurrency <= 64));
        assert!(result
            .all_candidates
            .iter()
            .any(|r| r.reason == Some(DropReason::ConcurrencyCapExceeded)));
    }
}
