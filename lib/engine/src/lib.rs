// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Performance-modeling and constrained-search engine for LLM serving deployments.
//!
//! Given a validated [`TaskConfig`] and an immutable [`PerfDatabase`] of measured
//! operator latencies, the engine sweeps a bounded grid of parallelism degrees and
//! concurrency levels, estimates end-to-end latency for every candidate, filters
//! by latency SLOs, and selects the Pareto-optimal configurations.
//!
//! The engine is in-process and side-effect free: CLI parsing, config-file
//! loading and result presentation live in the layers above it.

pub mod candidate;
pub mod config;
pub mod curve;
pub mod error;
pub mod estimate;
pub mod filter;
pub mod pareto;
pub mod perf;
pub mod quant;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use candidate::{CandidateConfig, CandidateGenerator, ParallelismSpec, ServingTopology};
pub use config::{
    ConcurrencyGrid, ModelSpec, MoeSpec, ServingMode, SlaConstraints, SystemSpec, TaskConfig,
    TaskConfigBuilder,
};
pub use curve::{InterpolationKind, OutOfRangePolicy, PerfCurve, PerfEstimate};
pub use error::Error;
pub use estimate::Metrics;
pub use filter::DropReason;
pub use pareto::PickPolicy;
pub use perf::{DatabaseMode, OpType, PerfDatabase, PerfDatabaseBuilder};
pub use quant::{QuantMapping, QuantMode};
pub use sweep::{run, CandidateReport, ExperimentResult};
