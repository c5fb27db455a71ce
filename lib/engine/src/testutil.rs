// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for unit tests: a small dense model and a synthetic
//! performance database with simple linear cost curves.

use ndarray::array;

use crate::config::{ModelSpec, SlaConstraints, SystemSpec, TaskConfig};
use crate::curve::{InterpolationKind, PerfCurve};
use crate::perf::{DatabaseMode, OpType, PerfDatabase};
use crate::quant::QuantMode;

pub(crate) fn model() -> ModelSpec {
    ModelSpec::builder()
        .name("tiny-llama".to_string())
        .num_layers(4)
        .hidden_size(1024)
        .inter_size(4096)
        .num_heads(16)
        .num_kv_heads(4)
        .head_size(64)
        .build()
        .unwrap()
}

pub(crate) fn task() -> TaskConfig {
    TaskConfig::builder()
        .model(model())
        .system(SystemSpec {
            name: "h200_sxm".to_string(),
            gpu_memory_bytes: 80 * 1024 * 1024 * 1024,
        })
        .backend("trtllm".to_string())
        .sla(SlaConstraints {
            ttft_ms: 300.0,
            tpot_ms: 10.0,
            max_concurrency: None,
        })
        .max_concurrency(64)
        .total_gpus(8)
        .isl(512)
        .osl(128)
        .build()
        .unwrap()
}

fn axis(xs: Vec<f64>, ys: Vec<f64>) -> PerfCurve {
    PerfCurve::axis(xs, ys, InterpolationKind::Linear).unwrap()
}

/// Synthetic curves, linear in their inputs:
/// GEMM/MoE ~ 1 us/token, context attention ~ 0.1 us * batch * seq,
/// generation attention ~ 0.05 us * batch * context, allreduce ~ 10 ns/byte,
/// p2p ~ 1 ns/byte.
pub(crate) fn synthetic_db() -> PerfDatabase {
    PerfDatabase::builder("h200_sxm", "trtllm", DatabaseMode::Silicon)
        .table(
            OpType::Gemm,
            QuantMode::Float16,
            axis(vec![1.0, 1_000_000.0], vec![0.001, 1000.0]),
        )
        .table(
            OpType::Moe,
            QuantMode::Float16,
            axis(vec![1.0, 1_000_000.0], vec![0.001, 1000.0]),
        )
        .table(
            OpType::ContextAttention,
            QuantMode::Float16,
            PerfCurve::grid(
                vec![1.0, 1024.0],
                vec![1.0, 16384.0],
                array![[0.0001, 1.6384], [0.1024, 1677.7216]],
                InterpolationKind::Linear,
            )
            .unwrap(),
        )
        .table(
            OpType::GenerationAttention,
            QuantMode::Float16,
            PerfCurve::grid(
                vec![1.0, 1024.0],
                vec![1.0, 16384.0],
                array![[0.00005, 0.8192], [0.0512, 838.8608]],
                InterpolationKind::Linear,
            )
            .unwrap(),
        )
        .table(
            OpType::AllReduce,
            QuantMode::Float16,
            axis(vec![1.0, 1e12], vec![0.01, 10000.01]),
        )
        .table(
            OpType::P2p,
            QuantMode::Float16,
            axis(vec![1.0, 1e12], vec![0.005, 1000.005]),
        )
        .build()
}
