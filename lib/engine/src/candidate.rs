// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Candidate enumeration over the bounded search grid.
//!
//! The generator produces a lazy, finite, restartable sequence of
//! [`CandidateConfig`] values in a deterministic order: ascending concurrency,
//! then ascending lexicographic parallelism-degree tuple. Reproducible output
//! depends on this ordering; do not reorder.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::{ServingMode, TaskConfig};
use crate::error::Error;

/// Parallelism degrees for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParallelismSpec {
    pub tp: u32,
    pub pp: u32,
    pub dp: u32,
}

/// Worker-pool topology of a candidate deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingTopology {
    Aggregated,
    /// Separate pools; prefill requests run at batch size 1, the decode batch
    /// is the candidate's concurrency split across decode workers.
    Disaggregated {
        prefill_workers: u32,
        decode_workers: u32,
    },
}

/// One point of the search space. Immutable once generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub parallel: ParallelismSpec,
    /// Aggregated: batch size of the single pool. Disaggregated: total decode
    /// batch across the decode pool.
    pub concurrency: u32,
    pub topology: ServingTopology,
}

impl CandidateConfig {
    pub fn serving_mode(&self) -> ServingMode {
        match self.topology {
            ServingTopology::Aggregated => ServingMode::Aggregated,
            ServingTopology::Disaggregated { .. } => ServingMode::Disaggregated,
        }
    }

    /// GPUs consumed by this candidate.
    pub fn gpu_count(&self) -> u32 {
        let per_worker = self.parallel.tp * self.parallel.pp;
        match self.topology {
            ServingTopology::Aggregated => per_worker * self.parallel.dp,
            ServingTopology::Disaggregated {
                prefill_workers,
                decode_workers,
            } => (prefill_workers + decode_workers) * per_worker,
        }
    }

    /// Lexicographic ordering key; also the deterministic tie-breaker for
    /// frontier candidates with identical objectives.
    pub fn degree_tuple(&self) -> (u32, u32, u32, u32, u32) {
        match self.topology {
            ServingTopology::Aggregated => {
                (self.parallel.tp, self.parallel.pp, self.parallel.dp, 0, 0)
            }
            ServingTopology::Disaggregated {
                prefill_workers,
                decode_workers,
            } => (
                self.parallel.tp,
                self.parallel.pp,
                self.parallel.dp,
                prefill_workers,
                decode_workers,
            ),
        }
    }
}

fn powers_of_two_up_to(max: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut v = 1u32;
    while v <= max {
        out.push(v);
        let Some(next) = v.checked_mul(2) else {
            break;
        };
        v = next;
    }
    out
}

/// Enumerates the bounded grid of parallelism degrees and concurrency levels.
pub struct CandidateGenerator {
    levels: Vec<u32>,
    modes: Vec<ServingMode>,
    aggregated: Vec<ParallelismSpec>,
    disaggregated: Vec<(ParallelismSpec, u32, u32)>,
}

impl CandidateGenerator {
    pub fn new(task: &TaskConfig) -> Result<Self, Error> {
        if task.max_concurrency < 1 {
            return Err(Error::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        let levels = task.concurrency_grid.levels(task.max_concurrency);
        let degrees = powers_of_two_up_to(task.total_gpus);

        let aggregated = degrees
            .iter()
            .cartesian_product(degrees.iter())
            .cartesian_product(degrees.iter())
            .map(|((&tp, &pp), &dp)| ParallelismSpec { tp, pp, dp })
            .filter(|p| p.tp * p.pp * p.dp <= task.total_gpus)
            .sorted_by_key(|p| (p.tp, p.pp, p.dp))
            .collect();

        // Prefill and decode pools are enumerated independently under the
        // shared GPU budget; both pools run the same tp/pp shard.
        let mut disaggregated = Vec::new();
        for (&tp, &pp) in degrees.iter().cartesian_product(degrees.iter()) {
            let per_worker = tp * pp;
            if per_worker * 2 > task.total_gpus {
                continue;
            }
            let max_workers = task.total_gpus / per_worker;
            for prefill in 1..=max_workers {
                for decode in 1..=(max_workers - prefill) {
                    disaggregated.push((ParallelismSpec { tp, pp, dp: 1 }, prefill, decode));
                }
            }
        }
        disaggregated.sort_by_key(|(p, prefill, decode)| (p.tp, p.pp, p.dp, *prefill, *decode));

        Ok(Self {
            levels,
            modes: task.serving_modes.clone(),
            aggregated,
            disaggregated,
        })
    }

    /// Restartable iteration over the full grid; every call starts over.
    pub fn iter(&self) -> impl Iterator<Item = CandidateConfig> + '_ {
        self.levels.iter().flat_map(move |&concurrency| {
            let mut batch: Vec<CandidateConfig> = Vec::new();
            if self.modes.contains(&ServingMode::Aggregated) {
                batch.extend(self.aggregated.iter().map(|&parallel| CandidateConfig {
                    parallel,
                    concurrency,
                    topology: ServingTopology::Aggregated,
                }));
            }
            if self.modes.contains(&ServingMode::Disaggregated) {
                batch.extend(self.disaggregated.iter().map(|&(parallel, prefill, decode)| {
                    CandidateConfig {
                        parallel,
                        concurrency,
                        topology: ServingTopology::Disaggregated {
                            prefill_workers: prefill,
                            decode_workers: decode,
                        },
                    }
                }));
            }
            batch.sort_by_key(|c| c.degree_tuple());
            batch.into_iter()
        })
    }
}
