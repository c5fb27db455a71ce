// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory performance database.
//!
//! The single entry-point for latency queries from the estimator. Tables are
//! keyed by `(operator type, quant mode)`; when the requested mode is not
//! directly measured, the lookup falls back to its compute-equivalent mode.
//! The database is constructed once and read-only for the rest of the run, so
//! concurrent sweeps can share it without locking.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::curve::{CurveError, OutOfRangePolicy, PerfCurve, PerfEstimate};
use crate::error::Error;
use crate::quant::QuantMode;

/// Closed set of operator types the estimator composes.
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
pub enum OpType {
    Gemm,
    ContextAttention,
    GenerationAttention,
    Moe,
    AllReduce,
    P2p,
}

/// Data-source selection for a collected database.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DatabaseMode {
    /// Measured on silicon.
    #[default]
    Silicon,
    /// Measured where available, modeled elsewhere.
    Hybrid,
    /// Speed-of-light analytical model.
    Sol,
}

/// Immutable collection of measured performance tables for one
/// `(system, backend)` pair.
#[derive(Debug, Clone)]
pub struct PerfDatabase {
    system: String,
    backend: String,
    mode: DatabaseMode,
    policy: OutOfRangePolicy,
    tables: HashMap<(OpType, QuantMode), PerfCurve>,
}

/// Builder for [`PerfDatabase`]. The on-disk collection format is out of
/// scope here; loaders populate the builder table by table.
pub struct PerfDatabaseBuilder {
    system: String,
    backend: String,
    mode: DatabaseMode,
    policy: OutOfRangePolicy,
    tables: HashMap<(OpType, QuantMode), PerfCurve>,
}

impl PerfDatabaseBuilder {
    pub fn new(system: impl Into<String>, backend: impl Into<String>, mode: DatabaseMode) -> Self {
        Self {
            system: system.into(),
            backend: backend.into(),
            mode,
            policy: OutOfRangePolicy::default(),
            tables: HashMap::new(),
        }
    }

    /// Register a measured curve. Overwrites any previously registered curve
    /// for the same `(op, mode)` key.
    pub fn table(mut self, op: OpType, mode: QuantMode, curve: PerfCurve) -> Self {
        if self.tables.insert((op, mode), curve).is_some() {
            tracing::info!("overwriting existing table for ({op}, {mode})");
        }
        self
    }

    /// Override the out-of-range query policy (default: clamp).
    pub fn out_of_range_policy(mut self, policy: OutOfRangePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> PerfDatabase {
        tracing::info!(
            system = %self.system,
            backend = %self.backend,
            mode = %self.mode,
            tables = self.tables.len(),
            "loaded performance database"
        );
        PerfDatabase {
            system: self.system,
            backend: self.backend,
            mode: self.mode,
            policy: self.policy,
            tables: self.tables,
        }
    }
}

impl PerfDatabase {
    pub fn builder(
        system: impl Into<String>,
        backend: impl Into<String>,
        mode: DatabaseMode,
    ) -> PerfDatabaseBuilder {
        PerfDatabaseBuilder::new(system, backend, mode)
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn mode(&self) -> DatabaseMode {
        self.mode
    }

    pub fn out_of_range_policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    /// Directly measured quant modes for an operator.
    pub fn supported_quant_modes(&self, op: OpType) -> BTreeSet<QuantMode> {
        self.tables
            .keys()
            .filter(|(table_op, _)| *table_op == op)
            .map(|(_, mode)| *mode)
            .collect()
    }

    /// Map a quant mode to the measured mode used for table lookup.
    ///
    /// Identity when the mode is measured directly; otherwise the
    /// compute-equivalent canonical mode, when that one is measured. Returns
    /// `None` when neither resolves. Idempotent, and the result is always a
    /// member of [`Self::supported_quant_modes`].
    pub fn normalize_for_table(&self, op: OpType, mode: QuantMode) -> Option<QuantMode> {
        if self.tables.contains_key(&(op, mode)) {
            return Some(mode);
        }
        let equivalent = mode.table_equivalent();
        if self.tables.contains_key(&(op, equivalent)) {
            tracing::debug!("normalizing {mode} -> {equivalent} for {op} table lookup");
            return Some(equivalent);
        }
        None
    }

    /// Check that a quant mode resolves for an operator. Run once per task,
    /// before the sweep starts.
    pub fn validate_supported(&self, op: OpType, mode: QuantMode) -> Result<(), Error> {
        match self.normalize_for_table(op, mode) {
            Some(_) => Ok(()),
            None => Err(Error::UnsupportedQuantMode { op, mode }),
        }
    }

    /// Latency lookup for one operator instance.
    ///
    /// The quant mode is normalized for the table lookup only; callers doing
    /// footprint math must keep using the original mode's memory cost.
    pub fn query(&self, op: OpType, mode: QuantMode, shape: &[f64]) -> Result<PerfEstimate, Error> {
        let table_mode = self
            .normalize_for_table(op, mode)
            .ok_or(Error::UnsupportedQuantMode { op, mode })?;
        let curve = &self.tables[&(op, table_mode)];
        curve.eval(shape, self.policy).map_err(|e| match e {
            CurveError::OutOfRange { .. } => Error::ShapeOutOfRange { op, source: e },
            other => Error::Curve(other),
        })
    }
}
