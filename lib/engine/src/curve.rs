// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shape-indexed performance curves.
//!
//! A [`PerfCurve`] maps a 1-D (`tokens`) or 2-D (`batch x seq`) query shape to a
//! latency in milliseconds, interpolating between measured grid points. The
//! interpolation strategy is pluggable: linear (default, backed by
//! `ndarray-interp`) or nearest-neighbour. Out-of-range queries follow an
//! explicit policy: clamp to the measured boundary and mark the estimate
//! low-confidence (default), or fail.

use std::sync::Arc;

use anyhow::Context;
use ndarray::{Array1, Array2};
use ndarray_interp::interp1d::{Interp1DBuilder, Linear};
use ndarray_interp::interp2d::{Bilinear, Interp2DBuilder};
use ndarray_interp::InterpolateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or querying a curve.
///
/// Construction-time errors (`EmptyAxis`, `AxisNotAscending`, shape mismatches)
/// surface when the database is built, never during a sweep.
#[derive(Debug, Error)]
pub enum CurveError {
    #[error("curve axis {axis} is empty")]
    EmptyAxis { axis: usize },

    #[error("curve axis {axis} is not strictly ascending")]
    AxisNotAscending { axis: usize },

    #[error("curve data length mismatch: {points} grid points, {values} values")]
    DataLengthMismatch { points: usize, values: usize },

    #[error("query shape has {got} dimensions, curve expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("coordinate {value} on axis {axis} outside measured range [{min}, {max}]")]
    OutOfRange {
        axis: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("failed to build interpolator: {0}")]
    Build(#[source] anyhow::Error),

    #[error("interpolation failed: {0}")]
    Interpolate(#[source] anyhow::Error),
}

/// Behaviour for query shapes outside the measured grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Clamp each coordinate to the nearest measured boundary and mark the
    /// result low-confidence.
    #[default]
    Clamp,
    /// Fail the lookup with [`CurveError::OutOfRange`].
    Error,
}

/// Interpolation strategy between measured grid points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationKind {
    /// Linear (1-D) / bilinear (2-D) interpolation.
    #[default]
    Linear,
    /// Snap to the closest measured point on every axis.
    Nearest,
}

/// Latency estimate for a single operator instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerfEstimate {
    pub latency_ms: f64,
    /// Set when the query was clamped to the measured boundary.
    pub low_confidence: bool,
}

/// Trait to abstract over 1D interpolation strategies
pub trait AxisInterpolator: Send + Sync {
    fn interp(&self, x: f64) -> Result<f64, InterpolateError>;
}

/// Trait to abstract over 2D interpolation strategies
pub trait GridInterpolator: Send + Sync {
    fn interp(&self, x: f64, y: f64) -> Result<f64, InterpolateError>;
}

/// Wrapper to implement AxisInterpolator for the concrete Interp1D type
struct LinearAxis {
    inner: ndarray_interp::interp1d::Interp1D<
        ndarray::OwnedRepr<f64>,
        ndarray::OwnedRepr<f64>,
        ndarray::Ix1,
        Linear,
    >,
}

impl AxisInterpolator for LinearAxis {
    fn interp(&self, x: f64) -> Result<f64, InterpolateError> {
        self.inner.interp_scalar(x)
    }
}

/// Wrapper to implement GridInterpolator for the concrete Interp2D type
struct BilinearGrid {
    inner: ndarray_interp::interp2d::Interp2D<
        ndarray::OwnedRepr<f64>,
        ndarray::OwnedRepr<f64>,
        ndarray::OwnedRepr<f64>,
        ndarray::Ix2,
        Bilinear,
    >,
}

impl GridInterpolator for BilinearGrid {
    fn interp(&self, x: f64, y: f64) -> Result<f64, InterpolateError> {
        self.inner.interp_scalar(x, y)
    }
}

/// Nearest-neighbour lookup along one axis.
struct NearestAxis {
    xs: Array1<f64>,
    ys: Array1<f64>,
}

impl AxisInterpolator for NearestAxis {
    fn interp(&self, x: f64) -> Result<f64, InterpolateError> {
        Ok(self.ys[nearest_index(&self.xs, x)])
    }
}

/// Nearest-neighbour lookup on a 2-D grid.
struct NearestGrid {
    xs: Array1<f64>,
    ys: Array1<f64>,
    zs: Array2<f64>,
}

impl GridInterpolator for NearestGrid {
    fn interp(&self, x: f64, y: f64) -> Result<f64, InterpolateError> {
        Ok(self.zs[[nearest_index(&self.xs, x), nearest_index(&self.ys, y)]])
    }
}

/// Index of the grid point closest to `x`. Ties resolve to the lower index.
fn nearest_index(axis: &Array1<f64>, x: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &xi) in axis.iter().enumerate() {
        let dist = (x - xi).abs();
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// A measured performance curve over a 1-D or 2-D query shape.
///
/// Interpolators are built once at construction and stored as trait objects.
pub enum PerfCurve {
    Axis {
        xs: Array1<f64>,
        interp: Arc<dyn AxisInterpolator>,
    },
    Grid {
        xs: Array1<f64>,
        ys: Array1<f64>,
        interp: Arc<dyn GridInterpolator>,
    },
}

impl Clone for PerfCurve {
    fn clone(&self) -> Self {
        match self {
            PerfCurve::Axis { xs, interp } => PerfCurve::Axis {
                xs: xs.clone(),
                interp: Arc::clone(interp),
            },
            PerfCurve::Grid { xs, ys, interp } => PerfCurve::Grid {
                xs: xs.clone(),
                ys: ys.clone(),
                interp: Arc::clone(interp),
            },
        }
    }
}

impl std::fmt::Debug for PerfCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerfCurve::Axis { xs, .. } => write!(f, "PerfCurve::Axis {{ points: {} }}", xs.len()),
            PerfCurve::Grid { xs, ys, .. } => {
                write!(f, "PerfCurve::Grid {{ grid: {}x{} }}", xs.len(), ys.len())
            }
        }
    }
}

fn validate_axis(axis: &[f64], index: usize) -> Result<(), CurveError> {
    if axis.is_empty() {
        return Err(CurveError::EmptyAxis { axis: index });
    }
    if axis.windows(2).any(|w| w[0] >= w[1]) {
        return Err(CurveError::AxisNotAscending { axis: index });
    }
    Ok(())
}

/// Clamp `value` into `[min, max]` per policy; reports whether clamping occurred.
fn apply_policy(
    value: f64,
    axis: &Array1<f64>,
    index: usize,
    policy: OutOfRangePolicy,
) -> Result<(f64, bool), CurveError> {
    let (min, max) = (axis[0], axis[axis.len() - 1]);
    if value >= min && value <= max {
        return Ok((value, false));
    }
    match policy {
        OutOfRangePolicy::Clamp => Ok((value.clamp(min, max), true)),
        OutOfRangePolicy::Error => Err(CurveError::OutOfRange {
            axis: index,
            value,
            min,
            max,
        }),
    }
}

impl PerfCurve {
    /// Build a 1-D curve from `(xs[i], latencies_ms[i])` samples.
    pub fn axis(
        xs: Vec<f64>,
        latencies_ms: Vec<f64>,
        kind: InterpolationKind,
    ) -> Result<Self, CurveError> {
        validate_axis(&xs, 0)?;
        if xs.len() != latencies_ms.len() {
            return Err(CurveError::DataLengthMismatch {
                points: xs.len(),
                values: latencies_ms.len(),
            });
        }
        let xs = Array1::from_vec(xs);
        let ys = Array1::from_vec(latencies_ms);

        let interp: Arc<dyn AxisInterpolator> = match kind {
            InterpolationKind::Linear => {
                let inner = Interp1DBuilder::new(ys)
                    .x(xs.clone())
                    .strategy(Linear::new().extrapolate(true))
                    .build()
                    .map_err(|e| CurveError::Build(anyhow::Error::new(e)))?;
                Arc::new(LinearAxis { inner })
            }
            InterpolationKind::Nearest => Arc::new(NearestAxis {
                xs: xs.clone(),
                ys,
            }),
        };
        Ok(PerfCurve::Axis { xs, interp })
    }

    /// Build a 2-D curve from a `xs.len() x ys.len()` latency grid.
    pub fn grid(
        xs: Vec<f64>,
        ys: Vec<f64>,
        latencies_ms: Array2<f64>,
        kind: InterpolationKind,
    ) -> Result<Self, CurveError> {
        validate_axis(&xs, 0)?;
        validate_axis(&ys, 1)?;
        if latencies_ms.nrows() != xs.len() || latencies_ms.ncols() != ys.len() {
            return Err(CurveError::DataLengthMismatch {
                points: xs.len() * ys.len(),
                values: latencies_ms.len(),
            });
        }
        let xs = Array1::from_vec(xs);
        let ys = Array1::from_vec(ys);

        let interp: Arc<dyn GridInterpolator> = match kind {
            InterpolationKind::Linear => {
                let inner = Interp2DBuilder::new(latencies_ms)
                    .x(xs.clone())
                    .y(ys.clone())
                    .strategy(Bilinear::new().extrapolate(true))
                    .build()
                    .map_err(|e| CurveError::Build(anyhow::Error::new(e)))?;
                Arc::new(BilinearGrid { inner })
            }
            InterpolationKind::Nearest => Arc::new(NearestGrid {
                xs: xs.clone(),
                ys: ys.clone(),
                zs: latencies_ms,
            }),
        };
        Ok(PerfCurve::Grid { xs, ys, interp })
    }

    /// Number of query-shape dimensions this curve expects.
    pub fn dims(&self) -> usize {
        match self {
            PerfCurve::Axis { .. } => 1,
            PerfCurve::Grid { .. } => 2,
        }
    }

    /// Evaluate the curve at `shape`, applying the out-of-range policy.
    pub fn eval(
        &self,
        shape: &[f64],
        policy: OutOfRangePolicy,
    ) -> Result<PerfEstimate, CurveError> {
        if shape.len() != self.dims() {
            return Err(CurveError::DimensionMismatch {
                expected: self.dims(),
                got: shape.len(),
            });
        }
        let (latency, clamped) = match self {
            PerfCurve::Axis { xs, interp } => {
                let (x, clamped) = apply_policy(shape[0], xs, 0, policy)?;
                let latency = interp
                    .interp(x)
                    .context("1-D curve query")
                    .map_err(CurveError::Interpolate)?;
                (latency, clamped)
            }
            PerfCurve::Grid { xs, ys, interp } => {
                let (x, cx) = apply_policy(shape[0], xs, 0, policy)?;
                let (y, cy) = apply_policy(shape[1], ys, 1, policy)?;
                let latency = interp
                    .interp(x, y)
                    .context("2-D curve query")
                    .map_err(CurveError::Interpolate)?;
                (latency, cx || cy)
            }
        };
        Ok(PerfEstimate {
            // Measured latencies are non-negative; interpolation must not undershoot.
            latency_ms: latency.max(0.0),
            low_confidence: clamped,
        })
    }
}
