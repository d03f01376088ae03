// Licensed under the Apache-2.0 license

//! Composable clock nodes: gates, dividers, fractional dividers and muxes.
//!
//! Every node that is programmed through registers publishes a static table
//! of named fields ([`FieldTable`]). The dump codec, live edits and the
//! firmware emitter all go through these tables instead of looking fields up
//! by reflection.

use crate::register::RegisterField;

/// A named, register-backed value of a node.
pub struct FieldAccess<T: 'static> {
    pub name: &'static str,
    pub get: fn(&T) -> Option<u32>,
    pub set: fn(&mut T, u32),
    pub register: fn(&T) -> Option<&RegisterField>,
}

/// Nodes exposing their fields by name.
pub trait FieldTable: Sized + 'static {
    const FIELDS: &'static [FieldAccess<Self>];

    fn field_names() -> Vec<&'static str> {
        Self::FIELDS.iter().map(|f| f.name).collect()
    }

    fn field_views(&self) -> Vec<FieldView<'_>> {
        Self::FIELDS
            .iter()
            .map(|f| FieldView {
                name: f.name,
                value: (f.get)(self),
                register: (f.register)(self),
            })
            .collect()
    }

    fn get_field(&self, name: &str) -> Option<Option<u32>> {
        Self::FIELDS
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f.get)(self))
    }

    fn field_register(&self, name: &str) -> Option<&RegisterField> {
        Self::FIELDS
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| (f.register)(self))
    }

    /// Assigns a field. Returns false if the node has no such field.
    fn set_field(&mut self, name: &str, value: u32) -> bool {
        match Self::FIELDS.iter().find(|f| f.name == name) {
            Some(f) => {
                (f.set)(self, value);
                true
            }
            None => false,
        }
    }
}

/// Read-only snapshot of one field.
#[derive(Clone, Debug)]
pub struct FieldView<'a> {
    pub name: &'static str,
    pub value: Option<u32>,
    pub register: Option<&'a RegisterField>,
}

/// On/off control. The register reads 0 when the clock runs and 1 when it
/// is gated.
#[derive(Clone, Debug)]
pub struct Gate {
    pub register: RegisterField,
    pub clocking_enabled: Option<bool>,
}

impl Gate {
    pub fn new(register: RegisterField) -> Self {
        Self {
            register,
            clocking_enabled: None,
        }
    }

    pub fn reg_value(&self) -> Option<u32> {
        self.clocking_enabled.map(|enabled| u32::from(!enabled))
    }

    pub fn from_reg_value(&mut self, value: u32) {
        self.clocking_enabled = Some(value == 0);
    }
}

impl FieldTable for Gate {
    const FIELDS: &'static [FieldAccess<Self>] = &[FieldAccess {
        name: "disable",
        get: Gate::reg_value,
        set: Gate::from_reg_value,
        register: |g| Some(&g.register),
    }];
}

/// Programmable divider. The register holds the factor minus one.
#[derive(Clone, Debug)]
pub struct Divider {
    pub register: RegisterField,
    pub div: Option<u32>,
}

impl Divider {
    pub fn new(register: RegisterField) -> Self {
        Self {
            register,
            div: None,
        }
    }

    pub fn factor(&self) -> Option<u64> {
        self.div.map(|div| u64::from(div) + 1)
    }
}

impl FieldTable for Divider {
    const FIELDS: &'static [FieldAccess<Self>] = &[FieldAccess {
        name: "div",
        get: |d| d.div,
        set: |d, v| d.div = Some(v),
        register: |d| Some(&d.register),
    }];
}

/// Divider with a compiled-in divisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDivider {
    pub divisor: u32,
}

impl FieldTable for FixedDivider {
    const FIELDS: &'static [FieldAccess<Self>] = &[];
}

/// Either kind of integer divider a clock can own.
#[derive(Clone, Debug)]
pub enum ClockDivider {
    Programmable(Divider),
    Fixed(FixedDivider),
}

/// Fractional divider: `numerator << 16 | denominator` in one 32-bit word.
#[derive(Clone, Debug)]
pub struct Frac {
    pub register: RegisterField,
    pub numerator: Option<u32>,
    pub denominator: Option<u32>,
}

impl Frac {
    pub fn new(register: RegisterField) -> Self {
        Self {
            register,
            numerator: None,
            denominator: None,
        }
    }

    pub fn reg_value(&self) -> Option<u32> {
        Some(self.numerator? << 16 | self.denominator?)
    }

    pub fn from_reg_value(&mut self, value: u32) {
        self.numerator = Some(value >> 16);
        self.denominator = Some(value & 0xffff);
    }
}

impl FieldTable for Frac {
    const FIELDS: &'static [FieldAccess<Self>] = &[FieldAccess {
        name: "ratio",
        get: Frac::reg_value,
        set: Frac::from_reg_value,
        register: |f| Some(&f.register),
    }];
}

/// Source selector. Candidates are the owning clock's parents, in order.
#[derive(Clone, Debug)]
pub struct Mux {
    pub register: RegisterField,
    pub selected: Option<u32>,
}

impl Mux {
    pub fn new(register: RegisterField) -> Self {
        Self {
            register,
            selected: None,
        }
    }

    pub fn select(&mut self, index: u32) {
        self.selected = Some(index);
    }
}

impl FieldTable for Mux {
    const FIELDS: &'static [FieldAccess<Self>] = &[FieldAccess {
        name: "sel",
        get: |m| m.selected,
        set: Mux::select,
        register: |m| Some(&m.register),
    }];
}
