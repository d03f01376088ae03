// Licensed under the Apache-2.0 license

//! Clock vertices.
//!
//! A [`Clock`] is one vertex of the clock graph. Its behaviour depends on its
//! [`ClockKind`]: plain clocks derive their rate from their parents through
//! an optional mux and divider, fixed clocks are oscillator anchors, and PLLs
//! synthesise their rate from a reference.
//!
//! Clocks live in the arena owned by [`crate::ClockManager`] and refer to
//! each other by arena index.

use crate::config::{GateMode, PllLayout};
use crate::node::{ClockDivider, FieldAccess, FieldTable, FieldView, Frac, Gate, Mux};
use crate::register::RegisterField;

/// Graph-wide clock identifier from the descriptor table.
pub type ClockId = u32;

/// Index of a clock in the manager's arena.
pub type ClockIdx = usize;

/// PLL parameters and the registers holding them.
#[derive(Clone, Debug)]
pub struct Pll {
    pub fbdiv: Option<u32>,
    pub refdiv: Option<u32>,
    /// 24-bit fractional feedback, denominator 2^24.
    pub fracdiv: Option<u32>,
    /// 1 = integer mode, 0 = fractional mode.
    pub dsmpd: Option<u32>,
    pub postdiv1: Option<u32>,
    pub postdiv2: Option<u32>,
    pub power_down: Option<u32>,
    pub bypass: Option<u32>,
    /// Index into `[reference, self, deep_sleep]`.
    pub work_mode: Option<u32>,
    pub registers: PllRegisters,
    /// Slow-mode source.
    pub reference: ClockIdx,
    /// Deep-sleep source.
    pub deep_sleep: ClockIdx,
}

/// Register fields backing each PLL parameter.
#[derive(Clone, Debug)]
pub struct PllRegisters {
    pub fbdiv: RegisterField,
    pub refdiv: RegisterField,
    pub fracdiv: RegisterField,
    pub dsmpd: RegisterField,
    pub postdiv1: RegisterField,
    pub postdiv2: RegisterField,
    pub power_down: RegisterField,
    pub bypass: RegisterField,
    pub work_mode: RegisterField,
}

/// Work-mode mux position that routes the PLL output itself.
pub const PLL_WORK_MODE_NORMAL: u32 = 1;
pub const PLL_WORK_MODE_SLOW: u32 = 0;
pub const PLL_WORK_MODE_DEEP_SLOW: u32 = 2;

/// Fractional-mode denominator.
pub const PLL_FRAC_DENOMINATOR: f64 = (1u32 << 24) as f64;

impl PllRegisters {
    /// Builds the PLL register fields for `layout`, naming each control word
    /// with `register(con)`.
    pub fn from_layout(
        layout: &PllLayout,
        peripheral: &str,
        register: impl Fn(u8) -> String,
    ) -> crate::ClockResult<Self> {
        let field = |l: &crate::config::PllFieldLayout| -> crate::ClockResult<RegisterField> {
            let f = RegisterField::new(&register(l.con), peripheral, l.bits)?;
            if l.write_mask {
                f.with_write_mask()
            } else {
                Ok(f)
            }
        };
        Ok(Self {
            fbdiv: field(&layout.fbdiv)?,
            refdiv: field(&layout.refdiv)?,
            fracdiv: field(&layout.fracdiv)?,
            dsmpd: field(&layout.dsmpd)?,
            postdiv1: field(&layout.postdiv1)?,
            postdiv2: field(&layout.postdiv2)?,
            power_down: field(&layout.power_down)?,
            bypass: field(&layout.bypass)?,
            work_mode: field(&layout.work_mode)?,
        })
    }
}

impl Pll {
    pub fn new(registers: PllRegisters, reference: ClockIdx, deep_sleep: ClockIdx) -> Self {
        Self {
            fbdiv: None,
            refdiv: None,
            fracdiv: None,
            dsmpd: None,
            postdiv1: None,
            postdiv2: None,
            power_down: None,
            bypass: None,
            work_mode: None,
            registers,
            reference,
            deep_sleep,
        }
    }

    pub fn is_powered_down(&self) -> bool {
        self.power_down == Some(1)
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass == Some(1)
    }
}

impl FieldTable for Pll {
    const FIELDS: &'static [FieldAccess<Self>] = &[
        FieldAccess {
            name: "fbdiv",
            get: |p| p.fbdiv,
            set: |p, v| p.fbdiv = Some(v),
            register: |p| Some(&p.registers.fbdiv),
        },
        FieldAccess {
            name: "refdiv",
            get: |p| p.refdiv,
            set: |p, v| p.refdiv = Some(v),
            register: |p| Some(&p.registers.refdiv),
        },
        FieldAccess {
            name: "fracdiv",
            get: |p| p.fracdiv,
            set: |p, v| p.fracdiv = Some(v),
            register: |p| Some(&p.registers.fracdiv),
        },
        FieldAccess {
            name: "dsmpd",
            get: |p| p.dsmpd,
            set: |p, v| p.dsmpd = Some(v),
            register: |p| Some(&p.registers.dsmpd),
        },
        FieldAccess {
            name: "postdiv1",
            get: |p| p.postdiv1,
            set: |p, v| p.postdiv1 = Some(v),
            register: |p| Some(&p.registers.postdiv1),
        },
        FieldAccess {
            name: "postdiv2",
            get: |p| p.postdiv2,
            set: |p, v| p.postdiv2 = Some(v),
            register: |p| Some(&p.registers.postdiv2),
        },
        FieldAccess {
            name: "power_down",
            get: |p| p.power_down,
            set: |p, v| p.power_down = Some(v),
            register: |p| Some(&p.registers.power_down),
        },
        FieldAccess {
            name: "bypass",
            get: |p| p.bypass,
            set: |p, v| p.bypass = Some(v),
            register: |p| Some(&p.registers.bypass),
        },
        FieldAccess {
            name: "work_mode",
            get: |p| p.work_mode,
            set: |p, v| p.work_mode = Some(v),
            register: |p| Some(&p.registers.work_mode),
        },
    ];
}

/// How a clock produces its rate.
#[derive(Clone, Debug)]
pub enum ClockKind {
    /// Derived from parents through the clock's own mux/divider/frac.
    Plain,
    /// Oscillator or IO anchor. `None` when the rate is not known.
    Fixed { rate: Option<f64> },
    Pll(Box<Pll>),
}

/// A vertex of the clock graph.
#[derive(Clone, Debug)]
pub struct Clock {
    pub id: ClockId,
    pub name: String,
    pub module: String,
    pub kind: ClockKind,
    pub divider: Option<ClockDivider>,
    pub frac: Option<Frac>,
    pub gates: Vec<Gate>,
    pub mux: Option<Mux>,
    /// Parent ids as listed by the descriptor.
    pub parent_ids: Vec<ClockId>,
    /// Resolved parents; `None` until the graph is linked.
    pub(crate) parents: Option<Vec<ClockIdx>>,
}

/// Borrowed view of one register-programmed child of a clock.
#[derive(Clone, Copy, Debug)]
pub enum ChildRef<'a> {
    Divider(&'a ClockDivider),
    Frac(&'a Frac),
    Mux(&'a Mux),
    Gate(&'a Gate),
}

impl<'a> ChildRef<'a> {
    pub fn fields(self) -> Vec<FieldView<'a>> {
        match self {
            ChildRef::Divider(ClockDivider::Programmable(d)) => d.field_views(),
            ChildRef::Divider(ClockDivider::Fixed(d)) => d.field_views(),
            ChildRef::Frac(f) => f.field_views(),
            ChildRef::Mux(m) => m.field_views(),
            ChildRef::Gate(g) => g.field_views(),
        }
    }
}

impl Clock {
    pub fn new(id: ClockId, name: &str, module: &str, kind: ClockKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            module: module.to_string(),
            kind,
            divider: None,
            frac: None,
            gates: Vec::new(),
            mux: None,
            parent_ids: Vec::new(),
            parents: None,
        }
    }

    pub fn pll(&self) -> Option<&Pll> {
        match &self.kind {
            ClockKind::Pll(pll) => Some(pll.as_ref()),
            _ => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, ClockKind::Fixed { .. })
    }

    /// Arena indices of the resolved parents, if linked.
    pub fn parent_indices(&self) -> Option<&[ClockIdx]> {
        self.parents.as_deref()
    }

    /// Gates that take part in rate evaluation and dumps.
    pub fn active_gates(&self, mode: GateMode) -> &[Gate] {
        match mode {
            GateMode::AllGates => &self.gates,
            GateMode::FirstOnly => &self.gates[..self.gates.len().min(1)],
        }
    }

    /// Dump name of the gate at `index`: `gate`, `gate1`, `gate2`, ...
    pub fn gate_name(index: usize) -> String {
        if index == 0 {
            "gate".to_string()
        } else {
            format!("gate{index}")
        }
    }

    /// Register fields that belong to the clock itself rather than a child.
    pub fn direct_fields(&self) -> Vec<FieldView<'_>> {
        match &self.kind {
            ClockKind::Pll(pll) => pll.field_views(),
            _ => Vec::new(),
        }
    }

    /// Children in dump order.
    pub fn children(&self, mode: GateMode) -> Vec<(String, ChildRef<'_>)> {
        let mut children = Vec::new();
        if let Some(mux) = &self.mux {
            children.push(("mux".to_string(), ChildRef::Mux(mux)));
        }
        if let Some(divider) = &self.divider {
            children.push(("divider".to_string(), ChildRef::Divider(divider)));
        }
        if let Some(frac) = &self.frac {
            children.push(("frac".to_string(), ChildRef::Frac(frac)));
        }
        for (i, gate) in self.active_gates(mode).iter().enumerate() {
            children.push((Self::gate_name(i), ChildRef::Gate(gate)));
        }
        children
    }

    /// Reads a field by name, from a child when `child` is given.
    ///
    /// The outer `Option` is `None` when the clock has no such child or
    /// field; the inner one is `None` when the field was never set.
    pub fn get_field(&self, child: Option<&str>, field: &str) -> Option<Option<u32>> {
        match child {
            None => match &self.kind {
                ClockKind::Pll(pll) => pll.get_field(field),
                _ => None,
            },
            Some(child) => self.child_fields(child)?.into_iter().find_map(|v| {
                if v.name == field {
                    Some(v.value)
                } else {
                    None
                }
            }),
        }
    }

    /// Register backing a field, if any.
    pub fn field_register(&self, child: Option<&str>, field: &str) -> Option<&RegisterField> {
        match child {
            None => match &self.kind {
                ClockKind::Pll(pll) => pll.field_register(field),
                _ => None,
            },
            Some("mux") => self.mux.as_ref()?.field_register(field),
            Some("divider") => match self.divider.as_ref()? {
                ClockDivider::Programmable(d) => d.field_register(field),
                ClockDivider::Fixed(_) => None,
            },
            Some("frac") => self.frac.as_ref()?.field_register(field),
            Some(name) => self.gates.get(gate_index(name)?)?.field_register(field),
        }
    }

    fn child_fields(&self, child: &str) -> Option<Vec<FieldView<'_>>> {
        let child = match child {
            "mux" => ChildRef::Mux(self.mux.as_ref()?),
            "divider" => ChildRef::Divider(self.divider.as_ref()?),
            "frac" => ChildRef::Frac(self.frac.as_ref()?),
            name => ChildRef::Gate(self.gates.get(gate_index(name)?)?),
        };
        Some(child.fields())
    }

    /// Writes a field by name. Fails with a description of what is missing.
    pub(crate) fn set_field(
        &mut self,
        child: Option<&str>,
        field: &str,
        value: u32,
    ) -> Result<(), FieldLookup> {
        let found = match child {
            None => match &mut self.kind {
                ClockKind::Pll(pll) => pll.set_field(field, value),
                _ => false,
            },
            Some(name) => {
                let known = match name {
                    "mux" => self.mux.as_mut().map(|m| m.set_field(field, value)),
                    "divider" => self.divider.as_mut().map(|d| match d {
                        ClockDivider::Programmable(d) => d.set_field(field, value),
                        ClockDivider::Fixed(_) => false,
                    }),
                    "frac" => self.frac.as_mut().map(|f| f.set_field(field, value)),
                    name => gate_index(name)
                        .and_then(|i| self.gates.get_mut(i))
                        .map(|g| g.set_field(field, value)),
                };
                match known {
                    Some(found) => found,
                    None => return Err(FieldLookup::NoChild),
                }
            }
        };
        if found {
            Ok(())
        } else {
            Err(FieldLookup::NoField)
        }
    }

    /// True if the clock has a child called `name` under `mode`. Gates
    /// outside [`Clock::active_gates`] are not children.
    pub fn has_child(&self, name: &str, mode: GateMode) -> bool {
        match name {
            "mux" => self.mux.is_some(),
            "divider" => self.divider.is_some(),
            "frac" => self.frac.is_some(),
            name => gate_index(name).is_some_and(|i| i < self.active_gates(mode).len()),
        }
    }
}

/// Why a named field could not be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldLookup {
    NoChild,
    NoField,
}

fn gate_index(name: &str) -> Option<usize> {
    let rest = name.strip_prefix("gate")?;
    if rest.is_empty() {
        return Some(0);
    }
    match rest.parse::<usize>() {
        // `gate0` is spelled `gate`
        Ok(0) => None,
        Ok(i) if !rest.starts_with('0') => Some(i),
        _ => None,
    }
}
