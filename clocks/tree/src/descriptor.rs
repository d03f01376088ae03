// Licensed under the Apache-2.0 license

//! Serialized forms: the descriptor table the graph is built from and the
//! per-clock summary handed to inspection front ends.

use crate::clock::ClockId;
use serde::{Deserialize, Serialize};

/// One row of the clock table.
///
/// `gate`, `div`, `frac` and `mux` hold short-form register specs such as
/// `G21[8]` or `S12[14:8]|S13[1]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDescriptor {
    pub id: ClockId,
    pub clkname: String,
    pub module: String,
    #[serde(default)]
    pub parents: Vec<ClockId>,
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub div: Option<String>,
    #[serde(default)]
    pub frac: Option<String>,
    #[serde(default)]
    pub mux: Option<String>,
}

impl ClockDescriptor {
    pub fn new(id: ClockId, clkname: &str, module: &str) -> Self {
        Self {
            id,
            clkname: clkname.to_string(),
            module: module.to_string(),
            ..Default::default()
        }
    }

    pub fn parents(mut self, parents: &[ClockId]) -> Self {
        self.parents = parents.to_vec();
        self
    }

    pub fn gate(mut self, spec: &str) -> Self {
        self.gate = Some(spec.to_string());
        self
    }

    pub fn div(mut self, spec: &str) -> Self {
        self.div = Some(spec.to_string());
        self
    }

    pub fn frac(mut self, spec: &str) -> Self {
        self.frac = Some(spec.to_string());
        self
    }

    pub fn mux(mut self, spec: &str) -> Self {
        self.mux = Some(spec.to_string());
        self
    }
}

/// Snapshot of one clock for inspection front ends.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSummary {
    pub id: ClockId,
    pub clkname: String,
    pub module: String,
    pub parents: Vec<ClockId>,
    /// Computed rate in Hz; `None` when gated, powered down or unknown.
    pub clk: Option<f64>,
    /// Why `clk` could not be computed, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clk_error: Option<String>,
    /// Register of a programmable divider, or the fixed divisor.
    pub divider: Option<String>,
    pub frac: Option<String>,
    pub gate: Vec<String>,
    pub mux: Option<String>,
    pub mux_selection: Option<u32>,
    pub gate_enabled: Vec<Option<bool>>,
}
