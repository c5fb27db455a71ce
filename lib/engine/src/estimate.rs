// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end latency estimation for one candidate.
//!
//! [`estimate`] is a pure function of `(candidate, task, database)`: it
//! composes per-operator database queries into TTFT, TPOT and throughput for
//! the candidate's serving topology. No side effects, no shared mutable state,
//! so candidates can be estimated concurrently.

use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateConfig, ServingTopology};
use crate::config::TaskConfig;
use crate::error::Error;
use crate::perf::{OpType, PerfDatabase};
use crate::quant::QuantMode;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Estimated serving metrics for one candidate. Never mutated after
/// estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub ttft_ms: f64,
    pub tpot_ms: f64,
    /// Output tokens per second per GPU.
    pub throughput_per_gpu: f64,
    pub gpu_count: u32,
    /// Set when any contributing lookup was clamped to a table boundary.
    pub low_confidence: bool,
}

/// Why a single candidate could not be estimated. Recorded on the candidate
/// report; never fatal to the sweep.
#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("insufficient GPU memory: requires {required_gb:.1} GiB, capacity {available_gb:.1} GiB")]
    InsufficientMemory {
        required_gb: f64,
        available_gb: f64,
    },

    #[error("prefill pool saturated: utilization {utilization:.2} at steady state")]
    PrefillSaturated { utilization: f64 },

    #[error(transparent)]
    Lookup(#[from] Error),
}

/// Accumulates per-operator latencies and their confidence.
struct CostAccumulator<'a> {
    db: &'a PerfDatabase,
    low_confidence: bool,
}

impl<'a> CostAccumulator<'a> {
    fn new(db: &'a PerfDatabase) -> Self {
        Self {
            db,
            low_confidence: false,
        }
    }

    fn query(&mut self, op: OpType, mode: QuantMode, shape: &[f64]) -> Result<f64, Error> {
        let estimate = self.db.query(op, mode, shape)?;
        self.low_confidence |= estimate.low_confidence;
        Ok(estimate.latency_ms)
    }
}

/// One transformer-layer latency for the prefill phase.
fn prefill_layer_ms(
    acc: &mut CostAccumulator,
    task: &TaskConfig,
    batch: u32,
    tp: u32,
) -> Result<f64, Error> {
    let model = &task.model;
    let tokens = batch as f64 * task.isl as f64;

    let attention = acc.query(
        OpType::ContextAttention,
        model.kv_cache_quant,
        &[batch as f64, task.isl as f64],
    )? / tp as f64;
    let gemm = acc.query(OpType::Gemm, model.gemm_quant, &[tokens])? / tp as f64;
    let moe = match model.moe {
        Some(_) => acc.query(OpType::Moe, model.moe_quant, &[tokens])? / tp as f64,
        None => 0.0,
    };
    let allreduce = if tp > 1 {
        let bytes = tokens * model.hidden_size as f64 * 2.0;
        acc.query(OpType::AllReduce, QuantMode::Float16, &[bytes])?
    } else {
        0.0
    };
    Ok(attention + gemm + moe + allreduce)
}

/// One transformer-layer latency for a single decode step.
fn decode_layer_ms(
    acc: &mut CostAccumulator,
    task: &TaskConfig,
    batch: u32,
    tp: u32,
) -> Result<f64, Error> {
    let model = &task.model;
    // Average context over the generation phase.
    let context = task.isl as f64 + task.osl as f64 / 2.0;

    let attention = acc.query(
        OpType::GenerationAttention,
        model.kv_cache_quant,
        &[batch as f64, context],
    )? / tp as f64;
    let gemm = acc.query(OpType::Gemm, model.gemm_quant, &[batch as f64])? / tp as f64;
    let moe = match model.moe {
        Some(_) => acc.query(OpType::Moe, model.moe_quant, &[batch as f64])? / tp as f64,
        None => 0.0,
    };
    let allreduce = if tp > 1 {
        let bytes = batch as f64 * model.hidden_size as f64 * 2.0;
        acc.query(OpType::AllReduce, QuantMode::Float16, &[bytes])?
    } else {
        0.0
    };
    Ok(attention + gemm + moe + allreduce)
}

/// Inter-stage activation hand-off across `pp - 1` pipeline boundaries.
/// Zero for `pp == 1`.
fn pipeline_hops_ms(
    acc: &mut CostAccumulator,
    task: &TaskConfig,
    batch: u32,
    pp: u32,
) -> Result<f64, Error> {
    if pp <= 1 {
        return Ok(0.0);
    }
    let bytes = batch as f64 * task.model.hidden_size as f64 * 2.0;
    let hop = acc.query(OpType::P2p, QuantMode::Float16, &[bytes])?;
    Ok(hop * (pp - 1) as f64)
}

fn check_capacity(task: &TaskConfig, batch: u32, context_len: u32, tp: u32, pp: u32) -> Result<(), EstimateError> {
    let model = &task.model;
    let required = model.weight_bytes_per_gpu(tp, pp)
        + model.kv_cache_bytes_per_gpu(batch, context_len, tp, pp);
    let available = task.system.gpu_memory_bytes as f64;
    if required > available {
        return Err(EstimateError::InsufficientMemory {
            required_gb: required / GIB,
            available_gb: available / GIB,
        });
    }
    Ok(())
}

/// Estimate serving metrics for one candidate configuration.
pub fn estimate(
    candidate: &CandidateConfig,
    task: &TaskConfig,
    db: &PerfDatabase,
) -> Result<Metrics, EstimateError> {
    let tp = candidate.parallel.tp;
    let pp = candidate.parallel.pp;
    let layers = task.model.num_layers as f64;
    let full_context = task.isl + task.osl;
    let mut acc = CostAccumulator::new(db);

    let (ttft_ms, tpot_ms) = match candidate.topology {
        ServingTopology::Aggregated => {
            let batch = candidate.concurrency;
            check_capacity(task, batch, full_context, tp, pp)?;

            let ttft = layers * prefill_layer_ms(&mut acc, task, batch, tp)?
                + pipeline_hops_ms(&mut acc, task, batch, pp)?;
            let tpot = layers * decode_layer_ms(&mut acc, task, batch, tp)?
                + pipeline_hops_ms(&mut acc, task, batch, pp)?;
            (ttft, tpot)
        }
        ServingTopology::Disaggregated {
            prefill_workers,
            decode_workers,
        } => {
            // Prefill requests run unbatched; the decode batch splits across
            // the decode pool.
            let decode_batch = candidate.concurrency.div_ceil(decode_workers);
            check_capacity(task, 1, task.isl, tp, pp)?;
            check_capacity(task, decode_batch, full_context, tp, pp)?;

            let transfer = acc.query(
                OpType::P2p,
                QuantMode::Float16,
                &[task.model.kv_transfer_bytes(task.isl)],
            )?;
            let prefill_ms = layers * prefill_layer_ms(&mut acc, task, 1, tp)?
                + pipeline_hops_ms(&mut acc, task, 1, pp)?;
            let tpot = layers * decode_layer_ms(&mut acc, task, decode_batch, tp)?
                + pipeline_hops_ms(&mut acc, task, decode_batch, pp)?;

            // Steady state: the decode pool finishes one request every
            // `osl * tpot` ms per concurrency slot, and every finished request
            // admits a new prefill. The prefill pool must absorb that rate.
            let admission_rate = candidate.concurrency as f64 / (task.osl as f64 * tpot);
            let utilization = admission_rate * prefill_ms / prefill_workers as f64;
            if utilization > 1.0 {
                return Err(EstimateError::PrefillSaturated { utilization });
            }
            // Backlog grows with pool utilization; an idle pool adds nothing.
            let queue_ms = prefill_ms * utilization;
            (prefill_ms + queue_ms + transfer, tpot)
        }
    };

    let gpu_count = candidate.gpu_count();
    // Decode-side output rate: every replica emits one token per request per step.
    let replicas = match candidate.topology {
        ServingTopology::Aggregated => candidate.parallel.dp as f64,
        ServingTopology::Disaggregated { .. } => 1.0,
    };
    let tokens_per_second = replicas * candidate.concurrency as f64 * 1000.0 / tpot_ms;

    Ok(Metrics {
        ttft_ms,
        tpot_ms,
        throughput_per_gpu: tokens_per_second / gpu_count as f64,
        gpu_count,
        low_confidence: acc.low_confidence,
    })
}
