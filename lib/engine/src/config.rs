// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Task configuration: the frozen input to one engine run.
//!
//! All configuration values are immutable once built and validated exactly
//! once at construction; the sweep never re-validates or mutates them.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use validator::{Validate, ValidationError};

use crate::pareto::PickPolicy;
use crate::perf::DatabaseMode;
use crate::quant::QuantMode;

/// Default upper bound on concurrency when the task does not set one.
pub const DEFAULT_MAX_CONCURRENCY: u32 = 512;

/// How one worker group maps onto the two inference phases.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServingMode {
    /// One worker group performs both prefill and decode.
    Aggregated,
    /// Separate prefill and decode worker pools.
    Disaggregated,
}

/// Step policy for the concurrency sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyGrid {
    /// `1, 2, 4, …` up to the cap; the cap itself is always included.
    #[default]
    PowersOfTwo,
    /// `1, step, 2*step, …` up to the cap; the cap itself is always included.
    Dense { step: u32 },
}

impl ConcurrencyGrid {
    /// Concurrency levels in ascending order, all within `1..=max`.
    pub fn levels(&self, max: u32) -> Vec<u32> {
        let mut levels = vec![1];
        match self {
            ConcurrencyGrid::PowersOfTwo => {
                let mut level = 2u32;
                while level <= max {
                    levels.push(level);
                    let Some(next) = level.checked_mul(2) else {
                        break;
                    };
                    level = next;
                }
            }
            ConcurrencyGrid::Dense { step } => {
                let step = (*step).max(1);
                let mut level = step;
                while level <= max {
                    if level > 1 {
                        levels.push(level);
                    }
                    let Some(next) = level.checked_add(step) else {
                        break;
                    };
                    level = next;
                }
            }
        }
        if *levels.last().unwrap_or(&0) != max {
            levels.push(max);
        }
        levels
    }
}

/// Latency service-level objectives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaConstraints {
    /// Time-to-first-token target in milliseconds.
    pub ttft_ms: f64,
    /// Time-per-output-token target in milliseconds.
    pub tpot_ms: f64,
    /// Optional hard cap on candidate concurrency.
    pub max_concurrency: Option<u32>,
}

/// Mixture-of-experts shape parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoeSpec {
    pub num_experts: u32,
    pub top_k: u32,
}

/// GPU system the deployment targets. Used for capacity checks only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSpec {
    pub name: String,
    pub gpu_memory_bytes: u64,
}

/// Model architecture and per-operator quantization choices.
#[derive(Debug, Clone, PartialEq, Builder, Validate, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct ModelSpec {
    pub name: String,

    #[validate(range(min = 1))]
    pub num_layers: u32,

    #[validate(range(min = 1))]
    pub hidden_size: u32,

    #[validate(range(min = 1))]
    pub inter_size: u32,

    #[validate(range(min = 1))]
    pub num_heads: u32,

    #[validate(range(min = 1))]
    pub num_kv_heads: u32,

    #[builder(default = "128")]
    pub head_size: u32,

    #[builder(default)]
    pub moe: Option<MoeSpec>,

    #[builder(default = "QuantMode::Float16")]
    pub gemm_quant: QuantMode,

    #[builder(default = "QuantMode::Float16")]
    pub moe_quant: QuantMode,

    #[builder(default = "QuantMode::Float16")]
    pub kv_cache_quant: QuantMode,
}

impl ModelSpec {
    pub fn builder() -> ModelSpecBuilder {
        ModelSpecBuilder::default()
    }

    fn attention_params(&self) -> f64 {
        let qkv = self.hidden_size as f64
            * (self.num_heads + 2 * self.num_kv_heads) as f64
            * self.head_size as f64;
        let proj = self.num_heads as f64 * self.head_size as f64 * self.hidden_size as f64;
        qkv + proj
    }

    /// Per-GPU weight footprint in bytes at the given parallelism shard.
    ///
    /// Footprint always uses the original quant mode's memory cost, even when
    /// latency lookups were served by a compute-equivalent table.
    pub fn weight_bytes_per_gpu(&self, tp: u32, pp: u32) -> f64 {
        let attention = self.attention_params() * self.gemm_quant.memory_bytes_per_param();
        // Gated FFN / expert MLP: gate, up and down projections.
        let ffn = match &self.moe {
            Some(moe) => {
                3.0 * self.hidden_size as f64
                    * self.inter_size as f64
                    * moe.num_experts as f64
                    * self.moe_quant.memory_bytes_per_param()
            }
            None => {
                3.0 * self.hidden_size as f64
                    * self.inter_size as f64
                    * self.gemm_quant.memory_bytes_per_param()
            }
        };
        (attention + ffn) * self.num_layers as f64 / (tp as f64 * pp as f64)
    }

    /// Per-GPU KV-cache footprint in bytes for a batch of requests at the
    /// given context length.
    pub fn kv_cache_bytes_per_gpu(&self, batch: u32, context_len: u32, tp: u32, pp: u32) -> f64 {
        2.0 * self.num_layers as f64
            * self.num_kv_heads as f64
            * self.head_size as f64
            * self.kv_cache_quant.memory_bytes_per_param()
            * batch as f64
            * context_len as f64
            / (tp as f64 * pp as f64)
    }

    /// KV bytes one finished prefill hands to the decode pool.
    pub fn kv_transfer_bytes(&self, context_len: u32) -> f64 {
        2.0 * self.num_layers as f64
            * self.num_kv_heads as f64
            * self.head_size as f64
            * self.kv_cache_quant.memory_bytes_per_param()
            * context_len as f64
    }
}

fn validate_sla(sla: &SlaConstraints) -> Result<(), ValidationError> {
    if !(sla.ttft_ms.is_finite() && sla.ttft_ms > 0.0) {
        return Err(ValidationError::new("ttft_ms must be finite and positive"));
    }
    if !(sla.tpot_ms.is_finite() && sla.tpot_ms > 0.0) {
        return Err(ValidationError::new("tpot_ms must be finite and positive"));
    }
    if sla.max_concurrency == Some(0) {
        return Err(ValidationError::new("max_concurrency cap must be at least 1"));
    }
    Ok(())
}

/// The frozen input to one engine run.
#[derive(Debug, Clone, Builder, Validate, Serialize, Deserialize)]
#[builder(pattern = "owned", build_fn(validate = "Self::validate"))]
pub struct TaskConfig {
    #[validate]
    pub model: ModelSpec,

    pub system: SystemSpec,

    /// Active inference backend name (e.g. `trtllm`, `vllm`).
    pub backend: String,

    #[builder(default)]
    pub database_mode: DatabaseMode,

    #[validate(custom = "validate_sla")]
    pub sla: SlaConstraints,

    /// Upper bound of the concurrency sweep.
    #[builder(default = "DEFAULT_MAX_CONCURRENCY")]
    #[validate(range(min = 1))]
    pub max_concurrency: u32,

    /// GPU budget for one replica group.
    #[validate(range(min = 1))]
    pub total_gpus: u32,

    /// Input sequence length of the modeled workload.
    #[validate(range(min = 1))]
    pub isl: u32,

    /// Output sequence length of the modeled workload.
    #[validate(range(min = 1))]
    pub osl: u32,

    #[builder(default = "vec![ServingMode::Aggregated, ServingMode::Disaggregated]")]
    #[validate(length(min = 1))]
    pub serving_modes: Vec<ServingMode>,

    #[builder(default)]
    pub concurrency_grid: ConcurrencyGrid,

    #[builder(default)]
    pub pick_policy: PickPolicy,

    /// How many configurations the picker reports per serving mode.
    #[builder(default = "3")]
    #[validate(range(min = 1))]
    pub top_n: usize,
}

impl TaskConfig {
    pub fn builder() -> TaskConfigBuilder {
        TaskConfigBuilder::default()
    }
}

impl TaskConfigBuilder {
    // Cross-field checks the range attributes cannot express.
    fn validate(&self) -> Result<(), String> {
        if let Some(max_concurrency) = self.max_concurrency {
            if max_concurrency < 1 {
                return Err("max_concurrency must be at least 1".to_string());
            }
        }
        if let Some(total_gpus) = self.total_gpus {
            if total_gpus < 1 {
                return Err("total_gpus must be at least 1".to_string());
            }
        }
        if let Some(sla) = self.sla.as_ref() {
            validate_sla(sla).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}
