// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pareto frontier computation and configuration picking.
//!
//! Objectives: maximize throughput-per-GPU, minimize GPU count. Dominance is
//! checked pairwise in O(n^2); sweep sizes are bounded (grid x concurrency
//! levels, typically well under 10^4 candidates), so correctness wins over
//! asymptotics here.

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateConfig;
use crate::estimate::Metrics;

/// True iff `a` is at least as good as `b` on every objective and strictly
/// better on at least one.
pub fn dominates(a: &Metrics, b: &Metrics) -> bool {
    let no_worse = a.throughput_per_gpu >= b.throughput_per_gpu && a.gpu_count <= b.gpu_count;
    let strictly_better =
        a.throughput_per_gpu > b.throughput_per_gpu || a.gpu_count < b.gpu_count;
    no_worse && strictly_better
}

fn objectives_equal(a: &Metrics, b: &Metrics) -> bool {
    a.throughput_per_gpu == b.throughput_per_gpu && a.gpu_count == b.gpu_count
}

/// Non-dominated subset of the feasible candidates.
///
/// Candidates tied on every objective collapse to the lexicographically
/// smallest parallelism-degree tuple, keeping the frontier deterministic
/// across runs. The result is ordered by ascending GPU count, then descending
/// throughput, then ascending degree tuple.
pub fn pareto_front(
    feasible: &[(CandidateConfig, Metrics)],
) -> Vec<(CandidateConfig, Metrics)> {
    let mut front: Vec<(CandidateConfig, Metrics)> = Vec::new();
    for (i, (candidate, metrics)) in feasible.iter().enumerate() {
        let dominated = feasible.iter().enumerate().any(|(j, (other, other_metrics))| {
            if i == j {
                return false;
            }
            if dominates(other_metrics, metrics) {
                return true;
            }
            // Full-objective tie: only the smallest degree tuple survives.
            objectives_equal(other_metrics, metrics)
                && other.degree_tuple() < candidate.degree_tuple()
        });
        if !dominated {
            front.push((*candidate, *metrics));
        }
    }
    front.sort_by(|(ca, ma), (cb, mb)| {
        ma.gpu_count
            .cmp(&mb.gpu_count)
            .then(mb.throughput_per_gpu.total_cmp(&ma.throughput_per_gpu))
            .then(ca.degree_tuple().cmp(&cb.degree_tuple()))
    });
    front
}

/// Secondary selection policy over the frontier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickPolicy {
    /// Fewest GPUs first, throughput as the tie-breaker.
    #[default]
    MinGpu,
    /// Highest throughput-per-GPU first, GPU count as the tie-breaker.
    MaxThroughput,
    /// The frontier point whose concurrency is the largest value not
    /// exceeding the expected load; falls back to the minimum-concurrency
    /// point when none qualifies.
    LoadMatch { expected_concurrency: u32 },
}

/// Top-N frontier configurations under the given policy.
pub fn top_n(
    front: &[(CandidateConfig, Metrics)],
    policy: PickPolicy,
    n: usize,
) -> Vec<CandidateConfig> {
    match policy {
        PickPolicy::MinGpu => {
            let mut ranked: Vec<_> = front.to_vec();
            ranked.sort_by(|(ca, ma), (cb, mb)| {
                ma.gpu_count
                    .cmp(&mb.gpu_count)
                    .then(mb.throughput_per_gpu.total_cmp(&ma.throughput_per_gpu))
                    .then(ca.degree_tuple().cmp(&cb.degree_tuple()))
            });
            ranked.into_iter().take(n).map(|(c, _)| c).collect()
        }
        PickPolicy::MaxThroughput => {
            let mut ranked: Vec<_> = front.to_vec();
            ranked.sort_by(|(ca, ma), (cb, mb)| {
                mb.throughput_per_gpu
                    .total_cmp(&ma.throughput_per_gpu)
                    .then(ma.gpu_count.cmp(&mb.gpu_count))
                    .then(ca.degree_tuple().cmp(&cb.degree_tuple()))
            });
            ranked.into_iter().take(n).map(|(c, _)| c).collect()
        }
        PickPolicy::LoadMatch {
            expected_concurrency,
        } => load_match(front, expected_concurrency)
            .into_iter()
            .collect(),
    }
}

/// Largest-concurrency frontier point not exceeding the expected load, else
/// the minimum-concurrency point.
fn load_match(
    front: &[(CandidateConfig, Metrics)],
    expected_concurrency: u32,
) -> Option<CandidateConfig> {
    let best_under = front
        .iter()
        .filter(|(c, _)| c.concurrency <= expected_concurrency)
        .max_by_key(|(c, _)| (c.concurrency, std::cmp::Reverse(c.degree_tuple())));
    match best_under {
        Some((c, _)) => Some(*c),
        None => front
            .iter()
            .min_by_key(|(c, _)| (c.concurrency, c.degree_tuple()))
            .map(|(c, _)| *c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{ParallelismSpec, ServingTopology};
    use proptest::prelude::*;

    fn entry(
        tp: u32,
        pp: u32,
        concurrency: u32,
        throughput: f64,
        gpus: u32,
    ) -> (CandidateConfig, Metrics) {
        (
            CandidateConfig {
                parallel: ParallelismSpec { tp, pp, dp: 1 },
                concurrency,
                topology: ServingTopology::Aggregated,
            },
            Metrics {
                ttft_ms: 100.0,
                tpot_ms: 5.0,
                throughput_per_gpu: throughput,
                gpu_count: gpus,
                low_confidence: false,
            },
        )
    }

    #[test]
    fn dominated_points_are_excluded() {
        let feasible = vec![
            entry(1, 1, 8, 100.0, 1),
            entry(2, 1, 8, 90.0, 2), // worse on both axes
            entry(4, 1, 8, 120.0, 4),
        ];
        let front = pareto_front(&feasible);
        assert_eq!(front.len(), 2);
        assert!(front.iter().all(|(c, _)| c.parallel.tp != 2));
    }

    #[test]
    fn frontier_is_an_anti_chain() {
        let feasible = vec![
            entry(1, 1, 1, 50.0, 1),
            entry(2, 1, 2, 80.0, 2),
            entry(4, 1, 4, 100.0, 4),
            entry(8, 1, 8, 90.0, 8),
        ];
        let front = pareto_front(&feasible);
        for (i, (_, a)) in front.iter().enumerate() {
            for (j, (_, b)) in front.iter().enumerate() {
                if i != j {
                    assert!(!dominates(a, b), "frontier member dominates another");
                }
            }
        }
    }

    #[test]
    fn full_tie_keeps_lexicographically_smaller_tuple() {
        // (2,1) vs (1,2): identical objectives, (1,2) must survive.
        let feasible = vec![entry(2, 1, 8, 100.0, 2), entry(1, 2, 8, 100.0, 2)];
        let front = pareto_front(&feasible);
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].0.degree_tuple(), (1, 2, 1, 0, 0));

        // Same outcome regardless of input order.
        let reversed = vec![entry(1, 2, 8, 100.0, 2), entry(2, 1, 8, 100.0, 2)];
        assert_eq!(pareto_front(&reversed), front);
    }

    #[test]
    fn empty_input_yields_empty_frontier() {
        assert!(pareto_front(&[]).is_empty());
    }

    #[test]
    fn min_gpu_policy_prefers_small_deployments() {
        let front = vec![entry(4, 1, 8, 120.0, 4), entry(1, 1, 8, 100.0, 1)];
        let picked = top_n(&pareto_front(&front), PickPolicy::MinGpu, 2);
        assert_eq!(picked[0].parallel.tp, 1);
        assert_eq!(picked[1].parallel.tp, 4);
    }

    #[test]
    fn max_throughput_policy_prefers_fast_deployments() {
        let front = vec![entry(4, 1, 8, 120.0, 4), entry(1, 1, 8, 100.0, 1)];
        let picked = top_n(&pareto_front(&front), PickPolicy::MaxThroughput, 1);
        assert_eq!(picked[0].parallel.tp, 4);
    }

    #[test]
    fn load_match_takes_largest_concurrency_under_expected() {
        let front = pareto_front(&[
            entry(1, 1, 8, 100.0, 1),
            entry(2, 1, 32, 150.0, 2),
            entry(4, 1, 128, 200.0, 4),
        ]);
        let picked = top_n(
            &front,
            PickPolicy::LoadMatch {
                expected_concurrency: 64,
            },
            1,
        );
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].concurrency, 32);
    }

    #[test]
    fn load_match_falls_back_to_minimum_concurrency() {
        let front = pareto_front(&[entry(2, 1, 32, 150.0, 2), entry(4, 1, 128, 200.0, 4)]);
        let picked = top_n(
            &front,
            PickPolicy::LoadMatch {
                expected_concurrency: 4,
            },
            1,
        );
        assert_eq!(picked[0].concurrency, 32);
    }

    proptest! {
        #[test]
        fn frontier_never_contains_a_dominated_pair(
            entries in proptest::collection::vec((1u32..=8, 1u32..=8, 1.0f64..1000.0), 1..60)
        ) {
            let feasible: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, &(tp, gpus, throughput))| {
                    entry(tp, 1 + (i as u32 % 4), 8, throughput, gpus)
                })
                .collect();
            let front = pareto_front(&feasible);
            prop_assert!(!front.is_empty());
            for (i, (_, a)) in front.iter().enumerate() {
                for (j, (_, b)) in front.iter().enumerate() {
                    if i != j {
                        prop_assert!(!dominates(a, b));
                    }
                }
            }
        }
    }
}
