// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Quantization mode registry.
//!
//! Every mode carries a [`QuantMapping`]: bytes-per-parameter for footprint
//! math and a relative compute factor for table equivalence. The compute
//! factor is the *sole* determinant of equivalence; memory cost never
//! participates in table lookup.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Cost model attached to a quantization mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantMapping {
    /// Weight footprint in bytes per parameter.
    pub memory: f64,
    /// Relative compute cost (1.0 = half-precision baseline).
    pub compute: f64,
    /// Human-readable label, as it appears in collected databases.
    pub name: &'static str,
}

/// Closed set of supported quantization modes.
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
pub enum QuantMode {
    Float16,
    Fp8,
    /// FP8 with static (per-tensor) scales. Compute-equivalent to [`QuantMode::Fp8`].
    Fp8Static,
    /// INT8 weight-only; dequantized to half precision before compute.
    Int8Wo,
    /// 4-bit MXFP4 weights with 16-bit activations; computes at half precision.
    W4a16Mxfp4,
    Nvfp4,
}

/// Canonical modes, i.e. the representatives of each compute-equivalence class.
/// Collected databases are measured against these.
const CANONICAL: [QuantMode; 3] = [QuantMode::Float16, QuantMode::Fp8, QuantMode::Nvfp4];

impl QuantMode {
    /// Memory/compute cost mapping for this mode.
    pub const fn mapping(&self) -> QuantMapping {
        match self {
            QuantMode::Float16 => QuantMapping {
                memory: 2.0,
                compute: 1.0,
                name: "float16",
            },
            QuantMode::Fp8 => QuantMapping {
                memory: 1.0,
                compute: 0.5,
                name: "fp8",
            },
            QuantMode::Fp8Static => QuantMapping {
                memory: 1.0,
                compute: 0.5,
                name: "fp8_static",
            },
            QuantMode::Int8Wo => QuantMapping {
                memory: 1.0,
                compute: 1.0,
                name: "int8_wo",
            },
            QuantMode::W4a16Mxfp4 => QuantMapping {
                memory: 0.5,
                compute: 1.0,
                name: "w4a16_mxfp4",
            },
            QuantMode::Nvfp4 => QuantMapping {
                memory: 0.5,
                compute: 0.25,
                name: "nvfp4",
            },
        }
    }

    /// Bytes per parameter for this mode.
    pub const fn memory_bytes_per_param(&self) -> f64 {
        self.mapping().memory
    }

    /// The canonical mode sharing this mode's compute factor.
    ///
    /// Used strictly for performance-table lookup; footprint math must keep
    /// using the original mode's `memory` bytes.
    pub fn table_equivalent(&self) -> QuantMode {
        let compute = self.mapping().compute;
        for canonical in CANONICAL {
            if canonical.mapping().compute == compute {
                return canonical;
            }
        }
        // Every variant's compute factor appears in CANONICAL; checked in tests.
        *self
    }
}
