// Licensed under the Apache-2.0 license

//! The clock manager: graph construction, lookup, frequency resolution and
//! live edits.
//!
//! ## Construction
//!
//! Descriptors refer to each other by id, possibly forward, so the graph is
//! built in three passes over an arena of clocks:
//!
//! 1. anchors (oscillator/IO inputs) become fixed clocks;
//! 2. every other clock is created, PLLs with handles to both anchors, and
//!    its gate/divider/frac/mux specs are parsed into register fields;
//! 3. parent ids are resolved to arena indices and muxes are attached.
//!
//! A failure in any pass discards the whole graph.

use crate::clock::{
    Clock, ClockId, ClockIdx, ClockKind, FieldLookup, Pll, PllRegisters, PLL_FRAC_DENOMINATOR,
    PLL_WORK_MODE_DEEP_SLOW, PLL_WORK_MODE_NORMAL, PLL_WORK_MODE_SLOW,
};
use crate::config::{GateMode, ManagerConfig, PllBypassOrder};
use crate::descriptor::{ClockDescriptor, ClockSummary};
use crate::error::{ClockError, ClockResult};
use crate::node::{ClockDivider, Divider, FixedDivider, Frac, Gate, Mux};
use crate::register::RegisterField;
use crate::shorthand::{parse_accessors, Accessor};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

/// Owner of a clock graph.
#[derive(Clone, Debug)]
pub struct ClockManager {
    pub(crate) config: ManagerConfig,
    pub(crate) clocks: Vec<Clock>,
    pub(crate) by_id: BTreeMap<ClockId, ClockIdx>,
    pub(crate) by_name: HashMap<String, ClockIdx>,
    unknown_rates: Vec<ClockId>,
}

impl ClockManager {
    /// Builds the graph from a descriptor table.
    pub fn build(descriptors: &[ClockDescriptor], config: ManagerConfig) -> ClockResult<Self> {
        let mut seen = HashSet::new();
        for desc in descriptors {
            if !seen.insert(desc.id) {
                return Err(ClockError::DuplicateId {
                    id: desc.id,
                    name: desc.clkname.clone(),
                });
            }
        }

        let (anchors, others): (Vec<_>, Vec<_>) = descriptors
            .iter()
            .partition(|d| config.is_anchor(&d.module));

        let mut manager = Self {
            config,
            clocks: Vec::with_capacity(descriptors.len()),
            by_id: BTreeMap::new(),
            by_name: HashMap::new(),
            unknown_rates: Vec::new(),
        };
        let mut muxes = Vec::with_capacity(descriptors.len());

        for desc in anchors {
            let rate = manager.config.known_rates.get(&desc.clkname).copied();
            if rate.is_none() {
                warn!("unknown clock rate for anchor clock {}", desc.clkname);
                manager.unknown_rates.push(desc.id);
            }
            muxes.push(manager.add_clock(desc, ClockKind::Fixed { rate })?);
        }
        debug!("loaded {} anchor clocks", manager.clocks.len());

        for desc in others {
            let kind = if desc.module == manager.config.pll_module {
                ClockKind::Pll(Box::new(manager.new_pll(desc)?))
            } else {
                ClockKind::Plain
            };
            muxes.push(manager.add_clock(desc, kind)?);
        }
        debug!("loaded {} clocks", manager.clocks.len());

        manager.link(muxes)?;
        Ok(manager)
    }

    fn add_clock(
        &mut self,
        desc: &ClockDescriptor,
        kind: ClockKind,
    ) -> ClockResult<Option<RegisterField>> {
        let name = desc.clkname.as_str();
        if desc.parents.len() > 1 && desc.mux.is_none() {
            return Err(ClockError::MultiParentWithoutMux {
                id: desc.id,
                name: name.to_string(),
                parents: desc.parents.len(),
            });
        }
        if desc.div.is_some() && desc.frac.is_some() {
            return Err(ClockError::DividerAndFrac {
                id: desc.id,
                name: name.to_string(),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(ClockError::DuplicateName {
                name: name.to_string(),
            });
        }

        let naming = &self.config.naming;
        let mut clock = Clock::new(desc.id, name, &desc.module, kind);
        clock.parent_ids = desc.parents.clone();

        if let Some(spec) = &desc.gate {
            for accessor in parse_accessors(spec, naming, name)? {
                match accessor {
                    Accessor::Register(field) => clock.gates.push(Gate::new(field)),
                    Accessor::Invert => {}
                    Accessor::Fixed(_) => {
                        return Err(malformed(name, spec, "a gate cannot be a fixed divisor"))
                    }
                }
            }
        }

        if let Some(spec) = &desc.div {
            let accessors = parse_accessors(spec, naming, name)?;
            clock.divider = match without_invert(&accessors).as_slice() {
                [Accessor::Register(field)] => {
                    Some(ClockDivider::Programmable(Divider::new((*field).clone())))
                }
                [Accessor::Fixed(divisor)] => Some(ClockDivider::Fixed(FixedDivider {
                    divisor: *divisor,
                })),
                [] if !accessors.is_empty() => None,
                _ => return Err(malformed(name, spec, "expected exactly one divider")),
            };
        }

        if let Some(spec) = &desc.frac {
            clock.frac = Some(Frac::new(single_register(spec, self, name)?));
        }

        let mux = match &desc.mux {
            Some(spec) => Some(single_register(spec, self, name)?),
            None => None,
        };

        let idx = self.clocks.len();
        self.clocks.push(clock);
        self.by_id.insert(desc.id, idx);
        self.by_name.insert(name.to_string(), idx);
        Ok(mux)
    }

    fn new_pll(&self, desc: &ClockDescriptor) -> ClockResult<Pll> {
        let anchor = |name: &str| {
            self.by_name
                .get(name)
                .copied()
                .ok_or_else(|| ClockError::MissingAnchor {
                    name: name.to_string(),
                    pll: desc.clkname.clone(),
                })
        };
        let reference = anchor(&self.config.reference_clock)?;
        let deep_sleep = anchor(&self.config.deep_sleep_clock)?;

        let first = self.config.pll_register(&desc.clkname, 0);
        let peripheral = self.config.naming.peripheral_of(&first).ok_or_else(|| {
            ClockError::InvalidRegisterField {
                register: first.clone(),
                reason: "PLL register belongs to no known peripheral".to_string(),
            }
        })?;
        let registers = PllRegisters::from_layout(&self.config.pll_layout, &peripheral, |con| {
            self.config.pll_register(&desc.clkname, con)
        })?;
        Ok(Pll::new(registers, reference, deep_sleep))
    }

    /// Third pass: resolve parent ids and attach muxes.
    fn link(&mut self, muxes: Vec<Option<RegisterField>>) -> ClockResult<()> {
        for (idx, mux) in muxes.into_iter().enumerate() {
            let clock = &self.clocks[idx];
            let parents = clock
                .parent_ids
                .iter()
                .map(|parent| {
                    self.by_id
                        .get(parent)
                        .copied()
                        .ok_or_else(|| ClockError::UnknownParent {
                            id: clock.id,
                            name: clock.name.clone(),
                            parent: *parent,
                        })
                })
                .collect::<ClockResult<Vec<_>>>()?;
            if parents.is_empty() && !clock.is_fixed() {
                return Err(ClockError::Orphan {
                    id: clock.id,
                    name: clock.name.clone(),
                });
            }

            let clock = &mut self.clocks[idx];
            clock.parents = Some(parents);
            clock.mux = mux.map(Mux::new);
        }
        Ok(())
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn clock(&self, id: ClockId) -> Option<&Clock> {
        self.by_id.get(&id).map(|&idx| &self.clocks[idx])
    }

    pub fn clock_by_name(&self, name: &str) -> Option<&Clock> {
        self.by_name.get(name).map(|&idx| &self.clocks[idx])
    }

    /// All clocks in id order.
    pub fn clocks(&self) -> impl Iterator<Item = &Clock> {
        self.by_id.values().map(move |&idx| &self.clocks[idx])
    }

    /// Anchors that were built without a known rate.
    pub fn unknown_rate_anchors(&self) -> &[ClockId] {
        &self.unknown_rates
    }

    pub fn parents(&self, clock: &Clock) -> ClockResult<Vec<&Clock>> {
        Ok(linked_parents(clock)?
            .iter()
            .map(|&idx| &self.clocks[idx])
            .collect())
    }

    pub(crate) fn index_of(&self, name: &str) -> ClockResult<ClockIdx> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ClockError::UnknownClock {
                clock: name.to_string(),
            })
    }

    /// Output rate of clock `id` in Hz, or `None` if it is gated or
    /// powered down.
    pub fn frequency(&self, id: ClockId) -> ClockResult<Option<f64>> {
        let idx = self
            .by_id
            .get(&id)
            .copied()
            .ok_or_else(|| ClockError::UnknownClock {
                clock: id.to_string(),
            })?;
        self.resolve(idx, 0)
    }

    pub fn frequency_by_name(&self, name: &str) -> ClockResult<Option<f64>> {
        self.resolve(self.index_of(name)?, 0)
    }

    fn resolve(&self, idx: ClockIdx, depth: usize) -> ClockResult<Option<f64>> {
        let clock = &self.clocks[idx];
        if depth > self.clocks.len() {
            return Err(ClockError::Cycle {
                clock: clock.name.clone(),
            });
        }
        if self.is_gated(clock)? {
            return Ok(None);
        }
        match &clock.kind {
            ClockKind::Fixed { rate } => rate.map(Some).ok_or_else(|| ClockError::UnknownRate {
                clock: clock.name.clone(),
            }),
            ClockKind::Pll(pll) => self.resolve_pll(clock, pll, depth),
            ClockKind::Plain => self.resolve_plain(clock, depth),
        }
    }

    fn is_gated(&self, clock: &Clock) -> ClockResult<bool> {
        for (i, gate) in clock
            .active_gates(self.config.gate_mode)
            .iter()
            .enumerate()
        {
            match gate.clocking_enabled {
                None => {
                    return Err(ClockError::UndefinedGateState {
                        clock: clock.name.clone(),
                        gate: format!("{} ({})", Clock::gate_name(i), gate.register),
                    })
                }
                Some(false) => return Ok(true),
                Some(true) => {}
            }
        }
        Ok(false)
    }

    /// Rate entering the clock: the mux selection, or the only parent.
    fn source(&self, clock: &Clock, depth: usize) -> ClockResult<Option<f64>> {
        let parents = linked_parents(clock)?;
        let src = match &clock.mux {
            Some(mux) => {
                let sel = mux.selected.ok_or_else(|| unset(clock, "mux.sel"))?;
                *parents.get(sel as usize).ok_or_else(|| {
                    invalid(
                        clock,
                        "mux.sel",
                        format!("selects input {sel} of {}", parents.len()),
                    )
                })?
            }
            None => match parents {
                [parent] => *parent,
                [] => {
                    return Err(ClockError::Disconnected {
                        clock: clock.name.clone(),
                    })
                }
                _ => {
                    return Err(ClockError::MultiParentWithoutMux {
                        id: clock.id,
                        name: clock.name.clone(),
                        parents: parents.len(),
                    })
                }
            },
        };
        self.resolve(src, depth + 1)
    }

    fn resolve_plain(&self, clock: &Clock, depth: usize) -> ClockResult<Option<f64>> {
        let Some(input) = self.source(clock, depth)? else {
            return Ok(None);
        };
        match (&clock.divider, &clock.frac) {
            (Some(_), Some(_)) => Err(ClockError::DividerAndFrac {
                id: clock.id,
                name: clock.name.clone(),
            }),
            (Some(ClockDivider::Programmable(div)), None) => {
                let factor = div.factor().ok_or_else(|| unset(clock, "divider.div"))?;
                Ok(Some(input / factor as f64))
            }
            (Some(ClockDivider::Fixed(fixed)), None) => {
                Ok(Some(input / f64::from(fixed.divisor)))
            }
            (None, Some(frac)) => {
                let (Some(numerator), Some(denominator)) = (frac.numerator, frac.denominator)
                else {
                    return Err(unset(clock, "frac.ratio"));
                };
                if denominator == 0 {
                    return Err(invalid(clock, "frac.ratio", "denominator is zero".into()));
                }
                Ok(Some(
                    input * f64::from(numerator) / f64::from(denominator),
                ))
            }
            (None, None) => Ok(Some(input)),
        }
    }

    fn resolve_pll(&self, clock: &Clock, pll: &Pll, depth: usize) -> ClockResult<Option<f64>> {
        if pll.is_powered_down() {
            return Ok(None);
        }
        let order = self.config.pll_bypass_order;
        if order == PllBypassOrder::BeforeWorkMode && pll.is_bypassed() {
            return self.source(clock, depth);
        }
        let mode = pll.work_mode.ok_or_else(|| unset(clock, "work_mode"))?;
        match mode {
            PLL_WORK_MODE_SLOW => self.resolve(pll.reference, depth + 1),
            PLL_WORK_MODE_NORMAL => {
                if order == PllBypassOrder::AfterWorkMode && pll.is_bypassed() {
                    return self.source(clock, depth);
                }
                match self.source(clock, depth)? {
                    Some(fref) => pll_output(clock, pll, fref).map(Some),
                    None => Ok(None),
                }
            }
            PLL_WORK_MODE_DEEP_SLOW => self.resolve(pll.deep_sleep, depth + 1),
            other => Err(invalid(
                clock,
                "work_mode",
                format!("{other} is not a work mode"),
            )),
        }
    }

    /// Sets a register field in memory. `child` names a child block such as
    /// `mux` or `gate1`; `None` addresses the clock's own fields.
    pub fn set_field(
        &mut self,
        clock: &str,
        child: Option<&str>,
        field: &str,
        value: u32,
    ) -> ClockResult<()> {
        let idx = self.index_of(clock)?;
        apply_field(
            &mut self.clocks[idx],
            child,
            field,
            value,
            self.config.gate_mode,
        )
    }

    /// Applies several edits, all or none.
    pub fn apply_edits(&mut self, edits: &[FieldEdit]) -> ClockResult<()> {
        let mut staged = self.clocks.clone();
        for edit in edits {
            let idx = self.index_of(&edit.clock)?;
            apply_field(
                &mut staged[idx],
                edit.child.as_deref(),
                &edit.field,
                edit.value,
                self.config.gate_mode,
            )?;
        }
        self.clocks = staged;
        Ok(())
    }

    pub fn field_value(
        &self,
        clock: &str,
        child: Option<&str>,
        field: &str,
    ) -> ClockResult<Option<u32>> {
        let clock = &self.clocks[self.index_of(clock)?];
        if let Some(lookup) = missing_child(clock, child, self.config.gate_mode) {
            return Err(lookup_error(clock, child, field, lookup));
        }
        clock
            .get_field(child, field)
            .ok_or_else(|| lookup_error(clock, child, field, FieldLookup::NoField))
    }

    /// Inspection snapshot of clock `id`.
    pub fn summary(&self, id: ClockId) -> Option<ClockSummary> {
        let idx = *self.by_id.get(&id)?;
        let clock = &self.clocks[idx];
        let (clk, clk_error) = match self.resolve(idx, 0) {
            Ok(clk) => (clk, None),
            Err(err) => (None, Some(err.to_string())),
        };
        Some(ClockSummary {
            id: clock.id,
            clkname: clock.name.clone(),
            module: clock.module.clone(),
            parents: clock.parent_ids.clone(),
            clk,
            clk_error,
            divider: clock.divider.as_ref().map(|d| match d {
                ClockDivider::Programmable(d) => d.register.to_string(),
                ClockDivider::Fixed(f) => format!("/{}", f.divisor),
            }),
            frac: clock.frac.as_ref().map(|f| f.register.to_string()),
            gate: clock.gates.iter().map(|g| g.register.to_string()).collect(),
            mux: clock.mux.as_ref().map(|m| m.register.to_string()),
            mux_selection: clock.mux.as_ref().and_then(|m| m.selected),
            gate_enabled: clock.gates.iter().map(|g| g.clocking_enabled).collect(),
        })
    }

    pub fn summaries(&self) -> Vec<ClockSummary> {
        self.by_id
            .keys()
            .filter_map(|&id| self.summary(id))
            .collect()
    }
}

/// A single `clock[.child].field = value` assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldEdit {
    pub clock: String,
    pub child: Option<String>,
    pub field: String,
    pub value: u32,
}

impl FromStr for FieldEdit {
    type Err = String;

    /// Parses `lpll.postdiv1=1` or `clk_uart2.mux.sel=0x2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, value) = s
            .split_once('=')
            .ok_or_else(|| format!("{s:?} is not of the form clock[.child].field=value"))?;
        let value = value.trim();
        let value = match value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => value.parse(),
        }
        .map_err(|e| format!("bad value in {s:?}: {e}"))?;
        let parts: Vec<&str> = path.trim().split('.').collect();
        let (clock, child, field) = match parts.as_slice() {
            [clock, field] => (*clock, None, *field),
            [clock, child, field] => (*clock, Some(child.to_string()), *field),
            _ => return Err(format!("{s:?} is not of the form clock[.child].field=value")),
        };
        Ok(Self {
            clock: clock.to_string(),
            child,
            field: field.to_string(),
            value,
        })
    }
}

pub(crate) fn apply_field(
    clock: &mut Clock,
    child: Option<&str>,
    field: &str,
    value: u32,
    mode: GateMode,
) -> ClockResult<()> {
    if let Some(lookup) = missing_child(clock, child, mode) {
        return Err(lookup_error(clock, child, field, lookup));
    }
    if let Some(register) = clock.field_register(child, field) {
        if !register.fits(value) {
            return Err(invalid(
                clock,
                &field_label(child, field),
                format!("0x{value:x} does not fit in {register}"),
            ));
        }
    }
    clock
        .set_field(child, field, value)
        .map_err(|lookup| lookup_error(clock, child, field, lookup))
}

fn missing_child(clock: &Clock, child: Option<&str>, mode: GateMode) -> Option<FieldLookup> {
    match child {
        Some(child) if !clock.has_child(child, mode) => Some(FieldLookup::NoChild),
        _ => None,
    }
}

fn lookup_error(clock: &Clock, child: Option<&str>, field: &str, lookup: FieldLookup) -> ClockError {
    match (lookup, child) {
        (FieldLookup::NoChild, Some(child)) => ClockError::UnknownChild {
            clock: clock.name.clone(),
            child: child.to_string(),
        },
        _ => ClockError::UnknownField {
            clock: clock.name.clone(),
            field: field_label(child, field),
        },
    }
}

pub(crate) fn field_label(child: Option<&str>, field: &str) -> String {
    match child {
        Some(child) => format!("{child}.{field}"),
        None => field.to_string(),
    }
}

fn linked_parents(clock: &Clock) -> ClockResult<&[ClockIdx]> {
    clock
        .parent_indices()
        .ok_or_else(|| ClockError::Disconnected {
            clock: clock.name.clone(),
        })
}

/// `foutpostdiv` of a PLL running in normal mode from `fref`.
fn pll_output(clock: &Clock, pll: &Pll, fref: f64) -> ClockResult<f64> {
    let get = |field: &str, value: Option<u32>| value.ok_or_else(|| unset(clock, field));
    let check = |field: &str, value: u32, lo: u32, hi: u32| {
        if (lo..=hi).contains(&value) {
            Ok(value)
        } else {
            Err(invalid(clock, field, format!("{value} is outside {lo}..={hi}")))
        }
    };

    let refdiv = check("refdiv", get("refdiv", pll.refdiv)?, 1, 63)?;
    let fbdiv = get("fbdiv", pll.fbdiv)?;
    let foutvco = match get("dsmpd", pll.dsmpd)? {
        // integer mode
        1 => {
            let fbdiv = check("fbdiv", fbdiv, 16, 3200)?;
            fref / f64::from(refdiv) * f64::from(fbdiv)
        }
        // fractional mode
        0 => {
            let fbdiv = check("fbdiv", fbdiv, 20, 320)?;
            let fracdiv = get("fracdiv", pll.fracdiv)?;
            fref / f64::from(refdiv)
                * (f64::from(fbdiv) + f64::from(fracdiv) / PLL_FRAC_DENOMINATOR)
        }
        other => return Err(invalid(clock, "dsmpd", format!("{other} is not 0 or 1"))),
    };

    let postdiv1 = check("postdiv1", get("postdiv1", pll.postdiv1)?, 1, u32::MAX)?;
    let postdiv2 = check("postdiv2", get("postdiv2", pll.postdiv2)?, 1, u32::MAX)?;
    Ok(foutvco / f64::from(postdiv1) / f64::from(postdiv2))
}

fn single_register(spec: &str, manager: &ClockManager, clock: &str) -> ClockResult<RegisterField> {
    let accessors = parse_accessors(spec, &manager.config.naming, clock)?;
    match without_invert(&accessors).as_slice() {
        [Accessor::Register(field)] => Ok((*field).clone()),
        _ => Err(malformed(clock, spec, "expected exactly one register")),
    }
}

/// `INVERT` entries carry no register access.
fn without_invert(accessors: &[Accessor]) -> Vec<&Accessor> {
    accessors
        .iter()
        .filter(|a| !matches!(a, Accessor::Invert))
        .collect()
}

fn malformed(clock: &str, spec: &str, reason: &str) -> ClockError {
    ClockError::MalformedSpec {
        clock: clock.to_string(),
        spec: spec.to_string(),
        reason: reason.to_string(),
    }
}

fn unset(clock: &Clock, field: &str) -> ClockError {
    ClockError::UnsetField {
        clock: clock.name.clone(),
        field: field.to_string(),
    }
}

fn invalid(clock: &Clock, field: &str, reason: String) -> ClockError {
    ClockError::InvalidField {
        clock: clock.name.clone(),
        field: field.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OSC: ClockId = 0;
    const SLOW: ClockId = 1;
    const LPLL: ClockId = 2;
    const CPLL: ClockId = 3;
    const UART_SRC: ClockId = 4;
    const UART_DIV: ClockId = 5;
    const UART_FRAC: ClockId = 6;
    const UART: ClockId = 7;

    fn descriptors() -> Vec<ClockDescriptor> {
        vec![
            // PLLs reference the oscillator before it is defined
            ClockDescriptor::new(LPLL, "lpll", "PLL").parents(&[OSC]),
            ClockDescriptor::new(CPLL, "cpll", "PLL").parents(&[OSC]),
            ClockDescriptor::new(UART_SRC, "clk_uart_src", "UART")
                .parents(&[LPLL, CPLL])
                .mux("S33[15]")
                .gate("G9[10]"),
            ClockDescriptor::new(UART_DIV, "clk_uart2_div", "UART")
                .parents(&[UART_SRC])
                .div("S33[6:0]")
                .gate("G9[11]"),
            ClockDescriptor::new(UART_FRAC, "clk_uart2_frac", "UART")
                .parents(&[UART_DIV])
                .frac("S101")
                .gate("G9[12]"),
            ClockDescriptor::new(UART, "clk_uart2", "UART")
                .parents(&[UART_DIV, UART_FRAC, OSC])
                .mux("S33[9:8]"),
            ClockDescriptor::new(OSC, "clk_24m<IO>", "IO_CLK"),
            ClockDescriptor::new(SLOW, "clk_32k<IO>", "IO_CLK"),
        ]
    }

    fn manager() -> ClockManager {
        ClockManager::build(&descriptors(), ManagerConfig::with_defaults()).unwrap()
    }

    fn set_pll(m: &mut ClockManager, pll: &str, fields: &[(&str, u32)]) {
        for (field, value) in fields {
            m.set_field(pll, None, field, *value).unwrap();
        }
    }

    fn pll_mut<'a>(m: &'a mut ClockManager, name: &str) -> &'a mut Pll {
        let idx = m.index_of(name).unwrap();
        match &mut m.clocks[idx].kind {
            ClockKind::Pll(pll) => &mut **pll,
            other => panic!("{name} is not a PLL: {other:?}"),
        }
    }

    /// 24 MHz * 20 / 300. The post-dividers are assigned directly since
    /// 300 does not fit the 3-bit register field.
    fn integer_pll(m: &mut ClockManager, name: &str) {
        let pll = pll_mut(m, name);
        pll.power_down = Some(0);
        pll.bypass = Some(0);
        pll.work_mode = Some(PLL_WORK_MODE_NORMAL);
        pll.dsmpd = Some(1);
        pll.refdiv = Some(1);
        pll.fbdiv = Some(20);
        pll.postdiv1 = Some(1);
        pll.postdiv2 = Some(300);
    }

    #[test]
    fn test_lookup() {
        let m = manager();
        assert_eq!(m.len(), 8);
        assert_eq!(m.clock(UART).unwrap().name, "clk_uart2");
        assert_eq!(m.clock_by_name("lpll").unwrap().id, LPLL);
        let ids: Vec<_> = m.clocks().map(|c| c.id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        let parents: Vec<_> = m
            .parents(m.clock(UART).unwrap())
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(parents, [UART_DIV, UART_FRAC, OSC]);
        assert!(m.unknown_rate_anchors().is_empty());
    }

    #[test]
    fn test_fixed_clock_rate() {
        let m = manager();
        assert_eq!(m.frequency(OSC).unwrap(), Some(24_000_000.0));
        assert_eq!(m.frequency(SLOW).unwrap(), Some(32_768.0));
    }

    #[test]
    fn test_pll_integer_mode() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        assert_eq!(m.frequency(LPLL).unwrap(), Some(1_600_000.0));
    }

    #[test]
    fn test_pll_fractional_mode() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        set_pll(
            &mut m,
            "lpll",
            &[("dsmpd", 0), ("fbdiv", 20), ("fracdiv", 1 << 23), ("postdiv2", 1)],
        );
        // 24 MHz * 20.5
        assert_eq!(m.frequency(LPLL).unwrap(), Some(492_000_000.0));
    }

    #[test]
    fn test_pll_fbdiv_domain() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        set_pll(&mut m, "lpll", &[("dsmpd", 0), ("fracdiv", 0), ("fbdiv", 16)]);
        let err = m.frequency(LPLL).unwrap_err();
        assert!(matches!(err, ClockError::InvalidField { ref field, .. } if field == "fbdiv"));
        assert!(err.is_recoverable());

        set_pll(&mut m, "lpll", &[("dsmpd", 1), ("refdiv", 0)]);
        let err = m.frequency(LPLL).unwrap_err();
        assert!(matches!(err, ClockError::InvalidField { ref field, .. } if field == "refdiv"));
    }

    #[test]
    fn test_pll_bypass_and_power_down() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        set_pll(&mut m, "lpll", &[("bypass", 1), ("fbdiv", 3000)]);
        assert_eq!(m.frequency(LPLL).unwrap(), Some(24_000_000.0));

        set_pll(&mut m, "lpll", &[("power_down", 1)]);
        assert_eq!(m.frequency(LPLL).unwrap(), None);
    }

    #[test]
    fn test_pll_bypass_order() {
        let config =
            ManagerConfig::with_defaults().pll_bypass_order(PllBypassOrder::AfterWorkMode);
        let mut m = ClockManager::build(&descriptors(), config).unwrap();
        integer_pll(&mut m, "lpll");
        set_pll(&mut m, "lpll", &[("bypass", 1), ("work_mode", 2)]);
        // deep slow mode wins over bypass
        assert_eq!(m.frequency(LPLL).unwrap(), Some(32_768.0));
        set_pll(&mut m, "lpll", &[("work_mode", 1)]);
        assert_eq!(m.frequency(LPLL).unwrap(), Some(24_000_000.0));

        let mut m = manager();
        integer_pll(&mut m, "lpll");
        set_pll(&mut m, "lpll", &[("bypass", 1), ("work_mode", 2)]);
        assert_eq!(m.frequency(LPLL).unwrap(), Some(24_000_000.0));
    }

    #[test]
    fn test_pll_work_modes() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        set_pll(&mut m, "lpll", &[("work_mode", 0)]);
        assert_eq!(m.frequency(LPLL).unwrap(), Some(24_000_000.0));
        set_pll(&mut m, "lpll", &[("work_mode", 2)]);
        assert_eq!(m.frequency(LPLL).unwrap(), Some(32_768.0));
        set_pll(&mut m, "lpll", &[("work_mode", 3)]);
        assert!(matches!(
            m.frequency(LPLL),
            Err(ClockError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_divider_frac_and_mux_chain() {
        let mut m = manager();
        integer_pll(&mut m, "cpll");
        set_pll(&mut m, "cpll", &[("postdiv2", 1)]);

        m.set_field("clk_uart_src", Some("gate"), "disable", 0).unwrap();
        m.set_field("clk_uart_src", Some("mux"), "sel", 1).unwrap();
        assert_eq!(m.frequency(UART_SRC).unwrap(), Some(480_000_000.0));

        m.set_field("clk_uart2_div", Some("gate"), "disable", 0).unwrap();
        m.set_field("clk_uart2_div", Some("divider"), "div", 9).unwrap();
        assert_eq!(m.frequency(UART_DIV).unwrap(), Some(48_000_000.0));

        m.set_field("clk_uart2_frac", Some("gate"), "disable", 0).unwrap();
        m.set_field("clk_uart2_frac", Some("frac"), "ratio", 0x0001_0004)
            .unwrap();
        assert_eq!(m.frequency(UART_FRAC).unwrap(), Some(12_000_000.0));

        m.set_field("clk_uart2", Some("mux"), "sel", 1).unwrap();
        assert_eq!(m.frequency(UART).unwrap(), Some(12_000_000.0));
        m.set_field("clk_uart2", Some("mux"), "sel", 2).unwrap();
        assert_eq!(m.frequency_by_name("clk_uart2").unwrap(), Some(24_000_000.0));
    }

    #[test]
    fn test_gate_absence_propagates() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        m.set_field("clk_uart_src", Some("mux"), "sel", 0).unwrap();
        m.set_field("clk_uart_src", Some("gate"), "disable", 1).unwrap();
        m.set_field("clk_uart2_div", Some("gate"), "disable", 0).unwrap();
        m.set_field("clk_uart2_div", Some("divider"), "div", 0).unwrap();
        m.set_field("clk_uart2", Some("mux"), "sel", 0).unwrap();

        assert_eq!(m.frequency(UART_SRC).unwrap(), None);
        assert_eq!(m.frequency(UART_DIV).unwrap(), None);
        assert_eq!(m.frequency(UART).unwrap(), None);
    }

    #[test]
    fn test_undefined_gate_is_an_error() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        let err = m.frequency(UART_SRC).unwrap_err();
        assert!(matches!(err, ClockError::UndefinedGateState { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_all_gates_versus_first_only() {
        let descriptors = vec![
            ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
            ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
            ClockDescriptor::new(2, "aclk_x", "X")
                .parents(&[0])
                .gate("G1[0]|G1[1]"),
        ];
        let mut m = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap();
        m.set_field("aclk_x", Some("gate"), "disable", 0).unwrap();
        m.set_field("aclk_x", Some("gate1"), "disable", 1).unwrap();
        assert_eq!(m.frequency(2).unwrap(), None);

        let config = ManagerConfig::with_defaults().gate_mode(GateMode::FirstOnly);
        let mut m = ClockManager::build(&descriptors, config).unwrap();
        m.set_field("aclk_x", Some("gate"), "disable", 0).unwrap();
        assert_eq!(m.frequency(2).unwrap(), Some(24_000_000.0));
        // the second gate is not addressable in this mode
        assert!(matches!(
            m.set_field("aclk_x", Some("gate1"), "disable", 1),
            Err(ClockError::UnknownChild { .. })
        ));
        assert!(matches!(
            m.field_value("aclk_x", Some("gate1"), "disable"),
            Err(ClockError::UnknownChild { .. })
        ));
        assert!(m.clock(2).unwrap().gates[1].clocking_enabled.is_none());
    }

    #[test]
    fn test_duplicate_id() {
        let mut descriptors = descriptors();
        descriptors.push(ClockDescriptor::new(UART, "clk_uart3", "UART").parents(&[OSC]));
        let err = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap_err();
        assert_eq!(
            err,
            ClockError::DuplicateId {
                id: UART,
                name: "clk_uart3".to_string()
            }
        );
    }

    #[test]
    fn test_structural_errors() {
        let base = || {
            vec![
                ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
                ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
            ]
        };
        let build = |extra: ClockDescriptor| {
            let mut d = base();
            d.push(extra);
            ClockManager::build(&d, ManagerConfig::with_defaults()).unwrap_err()
        };

        assert!(matches!(
            build(ClockDescriptor::new(2, "x", "X").parents(&[0, 1])),
            ClockError::MultiParentWithoutMux { parents: 2, .. }
        ));
        assert!(matches!(
            build(
                ClockDescriptor::new(2, "x", "X")
                    .parents(&[0])
                    .div("S1[3:0]")
                    .frac("S2")
            ),
            ClockError::DividerAndFrac { id: 2, .. }
        ));
        assert!(matches!(
            build(ClockDescriptor::new(2, "x", "X").parents(&[9])),
            ClockError::UnknownParent { parent: 9, .. }
        ));
        assert!(matches!(
            build(ClockDescriptor::new(2, "x", "X")),
            ClockError::Orphan { id: 2, .. }
        ));
        assert!(matches!(
            build(ClockDescriptor::new(2, "x", "X").parents(&[0]).div("S1[3:0]|S2[1:0]")),
            ClockError::MalformedSpec { .. }
        ));
        assert!(matches!(
            build(ClockDescriptor::new(2, "clk_24m<IO>", "X").parents(&[0])),
            ClockError::DuplicateName { .. }
        ));
    }

    #[test]
    fn test_pll_needs_anchors() {
        let descriptors = vec![
            ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
            ClockDescriptor::new(2, "lpll", "PLL").parents(&[0]),
        ];
        let err = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap_err();
        assert!(matches!(err, ClockError::MissingAnchor { ref name, .. } if name == "clk_32k<IO>"));
    }

    #[test]
    fn test_unknown_anchor_rate() {
        let mut descriptors = descriptors();
        descriptors.push(ClockDescriptor::new(20, "clk_hdmiphy<PHY>", "IO_CLK"));
        let m = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap();
        assert_eq!(m.unknown_rate_anchors(), [20]);
        let err = m.frequency(20).unwrap_err();
        assert!(matches!(err, ClockError::UnknownRate { .. }));
    }

    #[test]
    fn test_fixed_divider_and_invert() {
        let descriptors = vec![
            ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
            ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
            ClockDescriptor::new(2, "clk_half", "X").parents(&[0]).div("F2"),
            ClockDescriptor::new(3, "clk_inv", "X").parents(&[2]).div("INVERT"),
        ];
        let m = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap();
        assert_eq!(m.frequency(2).unwrap(), Some(12_000_000.0));
        assert!(m.clock(3).unwrap().divider.is_none());
        assert_eq!(m.frequency(3).unwrap(), Some(12_000_000.0));
    }

    #[test]
    fn test_invert_does_not_count_as_register() {
        let descriptors = vec![
            ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
            ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
            ClockDescriptor::new(2, "clk_div", "X")
                .parents(&[0])
                .div("S1[3:0]|INVERT"),
            ClockDescriptor::new(3, "clk_sel", "X")
                .parents(&[0, 1])
                .mux("S1[7]|INVERT"),
            ClockDescriptor::new(4, "clk_frac", "X")
                .parents(&[0])
                .frac("INVERT|S2"),
        ];
        let mut m = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap();
        assert_eq!(
            m.summary(2).unwrap().divider.as_deref(),
            Some("CRU_CLKSEL_CON1[3:0]")
        );
        assert_eq!(
            m.summary(3).unwrap().mux.as_deref(),
            Some("CRU_CLKSEL_CON1[7]")
        );
        assert!(m.clock(4).unwrap().frac.is_some());

        m.set_field("clk_div", Some("divider"), "div", 3).unwrap();
        assert_eq!(m.frequency(2).unwrap(), Some(6_000_000.0));
        m.set_field("clk_sel", Some("mux"), "sel", 1).unwrap();
        assert_eq!(m.frequency(3).unwrap(), Some(32_768.0));

        let err = ClockManager::build(
            &[
                ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
                ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
                ClockDescriptor::new(2, "x", "X").parents(&[0, 1]).mux("INVERT"),
            ],
            ManagerConfig::with_defaults(),
        )
        .unwrap_err();
        assert!(matches!(err, ClockError::MalformedSpec { .. }));
    }

    #[test]
    fn test_unlinked_clock_is_disconnected() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        assert!(m.frequency(LPLL).unwrap().is_some());

        let idx = m.index_of("lpll").unwrap();
        m.clocks[idx].parents = None;
        let err = m.frequency(LPLL).unwrap_err();
        assert_eq!(
            err,
            ClockError::Disconnected {
                clock: "lpll".to_string()
            }
        );
        assert!(err.is_recoverable());
        let summary = m.summary(LPLL).unwrap();
        assert!(summary.clk.is_none());
        assert!(summary.clk_error.is_some());
    }

    #[test]
    fn test_cycle_detected() {
        let descriptors = vec![
            ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
            ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
            ClockDescriptor::new(2, "a", "X").parents(&[3]),
            ClockDescriptor::new(3, "b", "X").parents(&[2]),
        ];
        let m = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap();
        assert!(matches!(m.frequency(2), Err(ClockError::Cycle { .. })));
    }

    #[test]
    fn test_set_field_errors() {
        let mut m = manager();
        assert!(matches!(
            m.set_field("nope", None, "div", 1),
            Err(ClockError::UnknownClock { .. })
        ));
        assert!(matches!(
            m.set_field("clk_uart2", Some("frac"), "ratio", 1),
            Err(ClockError::UnknownChild { .. })
        ));
        assert!(matches!(
            m.set_field("clk_uart2", Some("mux"), "div", 1),
            Err(ClockError::UnknownField { .. })
        ));
        assert!(matches!(
            m.set_field("clk_uart2", Some("mux"), "sel", 4),
            Err(ClockError::InvalidField { .. })
        ));
        assert_eq!(m.field_value("clk_uart2", Some("mux"), "sel").unwrap(), None);
        assert!(matches!(
            m.field_value("clk_uart2", Some("gate"), "disable"),
            Err(ClockError::UnknownChild { .. })
        ));
    }

    #[test]
    fn test_apply_edits_is_atomic() {
        let mut m = manager();
        let edits = vec![
            "lpll.postdiv1=1".parse::<FieldEdit>().unwrap(),
            "clk_uart2.nothing.sel=0x1".parse::<FieldEdit>().unwrap(),
        ];
        assert!(m.apply_edits(&edits).is_err());
        assert_eq!(m.field_value("lpll", None, "postdiv1").unwrap(), None);

        m.apply_edits(&edits[..1]).unwrap();
        assert_eq!(m.field_value("lpll", None, "postdiv1").unwrap(), Some(1));
    }

    #[test]
    fn test_field_edit_parse() {
        assert_eq!(
            "clk_uart2.mux.sel=0x2".parse::<FieldEdit>().unwrap(),
            FieldEdit {
                clock: "clk_uart2".to_string(),
                child: Some("mux".to_string()),
                field: "sel".to_string(),
                value: 2,
            }
        );
        assert_eq!("lpll.fbdiv=0X1F".parse::<FieldEdit>().unwrap().value, 0x1f);
        assert_eq!("lpll.fbdiv= 20".parse::<FieldEdit>().unwrap().value, 20);
        assert!("lpll=1".parse::<FieldEdit>().is_err());
        assert!("lpll.fbdiv=zz".parse::<FieldEdit>().is_err());
    }

    #[test]
    fn test_summary() {
        let mut m = manager();
        integer_pll(&mut m, "lpll");
        let summary = m.summary(LPLL).unwrap();
        assert_eq!(summary.clk, Some(1_600_000.0));
        assert!(summary.clk_error.is_none());

        let summary = m.summary(UART).unwrap();
        assert_eq!(summary.mux.as_deref(), Some("CRU_CLKSEL_CON33[9:8]"));
        assert_eq!(summary.parents, [UART_DIV, UART_FRAC, OSC]);
        assert!(summary.clk.is_none());
        assert!(summary.clk_error.is_some());
        assert_eq!(m.summaries().len(), 8);
    }
}
